use docnorm::engine::{OsdSignal, Recognition, Rotation, TextBox};
use docnorm::engines::fake::{marker_page, FakeEngine};
use docnorm::preprocessing::steps::rotate::{rotate_bound, rotate_cardinal};
use docnorm::preprocessing::{CropRegion, PipelineConfig, PipelineRunner, Rationale, Step};
use docnorm::PipelineError;
use image::{DynamicImage, GrayImage, Luma};

fn runner(steps: Vec<Step>) -> PipelineRunner {
    PipelineRunner::new(PipelineConfig::default().with_steps(steps)).unwrap()
}

fn runner_without_deskew(steps: Vec<Step>) -> PipelineRunner {
    let mut config = PipelineConfig::default().with_steps(steps);
    config.orientation.deskew = false;
    PipelineRunner::new(config).unwrap()
}

fn luma(img: GrayImage) -> DynamicImage {
    DynamicImage::ImageLuma8(img)
}

#[test]
fn test_page_rotated_clockwise_is_turned_back() {
    // Upright 800x1000 page turned 90 degrees clockwise: a 1000x800 input
    let input = rotate_cardinal(&marker_page(800, 1000), Rotation::Deg90);
    assert_eq!(input.dimensions(), (1000, 800));

    let runner = runner(vec![Step::CorrectOrientation, Step::ResizeNormalize]);
    let engine = FakeEngine::upright_marker();

    let first = runner.run(&luma(input.clone()), &engine, &engine).unwrap();
    let decision = first.orientation.as_ref().unwrap();
    assert_eq!(decision.chosen_angle, Rotation::Deg270);
    assert_eq!(decision.rationale, Rationale::OcrScoreWin);
    assert_eq!(first.width, 800);
    assert_eq!(first.image.width(), 800);

    let second = runner.run(&luma(input), &engine, &engine).unwrap();
    assert_eq!(second.orientation, first.orientation);
    assert_eq!(second.image, first.image);
}

#[test]
fn test_confident_detector_agreement() {
    let input = rotate_cardinal(&marker_page(800, 1000), Rotation::Deg90);
    let runner = runner(vec![Step::CorrectOrientation, Step::ResizeNormalize]);
    let engine = FakeEngine::upright_marker().with_osd(OsdSignal::Detected {
        angle: Rotation::Deg270,
        confidence: 10.0,
    });

    let output = runner.run(&luma(input), &engine, &engine).unwrap();
    let decision = output.orientation.unwrap();
    assert_eq!(decision.chosen_angle, Rotation::Deg270);
    assert_eq!(decision.rationale, Rationale::OsdAgreement);
    assert_eq!(output.width, 800);
}

#[test]
fn test_every_cardinal_rotation_is_recovered() {
    let upright = marker_page(160, 200);
    let runner = runner_without_deskew(vec![Step::CorrectOrientation]);

    for applied in Rotation::ALL {
        let engine = FakeEngine::upright_marker();
        let input = rotate_cardinal(&upright, applied);
        let output = runner.run(&luma(input), &engine, &engine).unwrap();

        let expected = Rotation::from_degrees(-(applied.degrees() as i32)).unwrap();
        let decision = output.orientation.unwrap();
        assert_eq!(decision.chosen_angle, expected, "applied {:?}", applied);
        assert_eq!(output.image, upright, "applied {:?}", applied);
        assert_eq!(engine.osd_calls(), 1);
    }
}

#[test]
fn test_skewed_upside_down_page_is_levelled_then_turned() {
    let tilted = rotate_bound(&marker_page(800, 1000), 4.0, 255);
    let input = rotate_cardinal(&tilted, Rotation::Deg180);

    let runner = runner(vec![Step::CorrectOrientation]);
    let engine = FakeEngine::upright_marker();
    let output = runner.run(&luma(input), &engine, &engine).unwrap();

    let decision = output.orientation.unwrap();
    assert_eq!(decision.chosen_angle, Rotation::Deg180);
    assert_eq!(decision.rationale, Rationale::OcrScoreWin);

    let skew = decision.skew.expect("tilted page should yield a skew estimate");
    assert!(
        (skew.correction_degrees + 4.0).abs() <= 0.5,
        "correction {}",
        skew.correction_degrees
    );
}

#[test]
fn test_illegible_page_falls_back_deterministically() {
    let input = luma(GrayImage::from_fn(120, 90, |x, y| Luma([((x * 7 + y * 13) % 256) as u8])));
    let runner = runner(vec![Step::CorrectOrientation]);
    let engine = FakeEngine::constant("~~ |/ .. ::").with_osd(OsdSignal::Detected {
        angle: Rotation::Deg90,
        confidence: 50.0,
    });

    let outputs: Vec<_> = (0..3)
        .map(|_| runner.run(&input, &engine, &engine).unwrap())
        .collect();

    for output in &outputs {
        let decision = output.orientation.as_ref().unwrap();
        assert_eq!(decision.chosen_angle, Rotation::Deg0);
        assert_eq!(decision.rationale, Rationale::DefaultFallback);
        assert_eq!(output.image, outputs[0].image);
    }
}

#[test]
fn test_equal_scores_keep_zero() {
    let input = luma(marker_page(80, 100));
    let runner = runner(vec![Step::CorrectOrientation]);
    let engine = FakeEngine::constant("Invoice 42");

    let decision = runner
        .run(&input, &engine, &engine)
        .unwrap()
        .orientation
        .unwrap();
    assert_eq!(decision.chosen_angle, Rotation::Deg0);
    assert_eq!(decision.rationale, Rationale::OcrScoreWin);
}

#[test]
fn test_tie_without_zero_prefers_smaller_angle() {
    // Legible only in portrait: 90 and 270 tie on a landscape input
    let engine = FakeEngine::new(|img| {
        let text = if img.height() > img.width() { "Total 12345" } else { "" };
        Ok(Recognition {
            text: text.to_string(),
            boxes: Vec::new(),
        })
    });
    let input = luma(GrayImage::from_pixel(200, 100, Luma([255])));
    let output = runner_without_deskew(vec![Step::CorrectOrientation])
        .run(&input, &engine, &engine)
        .unwrap();

    assert_eq!(output.orientation.unwrap().chosen_angle, Rotation::Deg90);
    assert_eq!(output.image.dimensions(), (100, 200));
}

#[test]
fn test_crop_to_confident_text() {
    let engine = FakeEngine::new(|_| {
        Ok(Recognition {
            text: "Total 42".to_string(),
            boxes: vec![
                TextBox::new(10, 10, 50, 20, 80.0),
                TextBox::new(200, 200, 10, 10, 90.0),
                TextBox::new(280, 0, 10, 10, 20.0),
            ],
        })
    });
    let mut config = PipelineConfig::default().with_steps(vec![Step::CropToText]);
    config.crop.margin = 5;
    let runner = PipelineRunner::new(config).unwrap();

    let input = luma(GrayImage::from_pixel(300, 300, Luma([255])));
    let output = runner.run(&input, &engine, &engine).unwrap();
    assert_eq!(
        output.crop,
        Some(CropRegion {
            left: 5,
            top: 5,
            right: 215,
            bottom: 215
        })
    );
    assert_eq!(output.image.dimensions(), (210, 210));
}

#[test]
fn test_crop_without_boxes_is_identity() {
    let engine = FakeEngine::constant("");
    let runner = runner(vec![Step::CropToText]);
    let input = marker_page(64, 48);
    let output = runner.run(&luma(input.clone()), &engine, &engine).unwrap();
    assert_eq!(output.crop, Some(CropRegion::full(64, 48)));
    assert_eq!(output.image, input);
}

#[test]
fn test_resize_normalize_twice_is_noop() {
    let engine = FakeEngine::constant("");
    let runner = runner(vec![Step::ResizeNormalize]);
    let input = luma(GrayImage::from_fn(517, 301, |x, y| {
        Luma([(40 + (x * 3 + y) % 150) as u8])
    }));

    let once = runner.run(&input, &engine, &engine).unwrap();
    let twice = runner.run(&luma(once.image.clone()), &engine, &engine).unwrap();
    assert_eq!(once.width, 800);
    assert_eq!(once.image, twice.image);
}

#[test]
fn test_unknown_step_is_configuration_error() {
    let err = Step::parse_list("denoise, sparkle").unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));

    let json = r#"{"steps": ["resize_normalize", "sparkle"]}"#;
    assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
}

#[test]
fn test_out_of_range_parameters_fail_before_running() {
    let mut config = PipelineConfig::default();
    config.crop.margin = -1;
    assert!(matches!(
        PipelineRunner::new(config),
        Err(PipelineError::Configuration(_))
    ));
}

#[test]
fn test_backend_failure_reaches_caller() {
    let engine = FakeEngine::unavailable("tesseract exited");
    let err = runner(vec![Step::EnhanceContrast, Step::CorrectOrientation])
        .run(&luma(marker_page(40, 40)), &engine, &engine)
        .unwrap_err();
    assert!(matches!(err, PipelineError::BackendUnavailable(_)));
}

#[test]
fn test_standard_order_end_to_end() {
    let mut config = PipelineConfig::default();
    config.denoise.template_window = 3;
    config.denoise.search_window = 7;
    config.resize.target_width = 160;
    config.crop.margin = 5;
    let runner = PipelineRunner::new(config).unwrap();
    let engine = FakeEngine::upright_marker();

    let input = rotate_cardinal(&marker_page(160, 200), Rotation::Deg180);
    let output = runner.run(&luma(input), &engine, &engine).unwrap();

    let names: Vec<&str> = output.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "enhance_contrast",
            "denoise",
            "sharpen",
            "edge_enhance",
            "correct_orientation",
            "resize_normalize",
            "crop_to_text"
        ]
    );
    assert_eq!(
        output.orientation.as_ref().unwrap().chosen_angle,
        Rotation::Deg180
    );

    let crop = output.crop.unwrap();
    assert!(crop.right > crop.left && crop.bottom > crop.top);
    assert_eq!(output.image.dimensions(), (crop.width(), crop.height()));
    assert!(output.width < 160);
}
