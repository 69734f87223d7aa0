use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docnorm::config::Config;
use docnorm::engines::EngineRegistry;
use docnorm::preprocessing::{PipelineConfig, PipelineRunner, Preset, Step};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docnorm")]
#[command(about = "Normalize and orient document images for OCR")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Normalize a single image file
    Process(ProcessArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Engine to load ("ocrs" or "tesseract"); all compiled-in engines when unset
    #[arg(long, env = "DOCNORM_ENGINE")]
    engine: Option<String>,

    /// Default language for OCR (e.g., "eng", "english", "pol")
    #[arg(long, env = "DOCNORM_DEFAULT_LANGUAGE", default_value = "eng")]
    default_language: String,

    /// Path to tessdata directory (downloaded to the cache dir if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    tessdata_path: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "DOCNORM_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "DOCNORM_PORT", default_value = "9292")]
    port: u16,

    /// Maximum file size in bytes (default: 50MB)
    #[arg(long, env = "DOCNORM_MAX_FILE_SIZE", default_value = "52428800")]
    max_file_size: usize,

    /// Per-request processing timeout in seconds
    #[arg(long, env = "DOCNORM_REQUEST_TIMEOUT", default_value = "120")]
    request_timeout: u64,

    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Image to normalize
    input: PathBuf,

    /// Where to write the normalized PNG
    #[arg(short, long)]
    output: PathBuf,

    /// Preset: none, minimal, default, aggressive
    #[arg(long, default_value = "default")]
    preset: String,

    /// Comma separated step order, overriding the preset
    #[arg(long)]
    steps: Option<String>,

    /// JSON pipeline configuration file, overriding the preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// OCR language (defaults to the engine default language)
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    target_width: Option<u32>,

    /// Crop margin in pixels
    #[arg(long)]
    margin: Option<i64>,

    /// Minimum word confidence (0-100) for the text crop
    #[arg(long)]
    min_conf: Option<f32>,

    #[command(flatten)]
    engine: EngineArgs,
}

impl ServeArgs {
    fn into_config(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            default_language: self.engine.default_language,
            max_file_size: self.max_file_size,
            request_timeout: Duration::from_secs(self.request_timeout),
            engine: self.engine.engine,
            tessdata_path: self.engine.tessdata_path,
        }
    }
}

impl ProcessArgs {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid pipeline config in {}", path.display()))?
            }
            None => {
                let preset = Preset::from_name(&self.preset)
                    .with_context(|| format!("Unknown preset '{}'", self.preset))?;
                let mut config = PipelineConfig::from_preset(preset);
                config.language = self.engine.default_language.clone();
                config
            }
        };

        if let Some(list) = &self.steps {
            config.steps = Step::parse_list(list)?;
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(width) = self.target_width {
            config.resize.target_width = width;
        }
        if let Some(margin) = self.margin {
            config.crop.margin = margin;
        }
        if let Some(min_conf) = self.min_conf {
            config.crop.min_conf = min_conf;
        }
        Ok(config)
    }

    fn engine_config(&self) -> Config {
        Config {
            default_language: self.engine.default_language.clone(),
            engine: self.engine.engine.clone(),
            tessdata_path: self.engine.tessdata_path.clone(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve(args) => {
            let config = args.into_config();
            tracing::info!("Starting docnorm server v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Binding to {}:{}", config.host, config.port);
            docnorm::server::run(config).await
        }
        Command::Process(args) => tokio::task::spawn_blocking(move || process(args)).await?,
    }
}

fn process(args: ProcessArgs) -> anyhow::Result<()> {
    let runner = PipelineRunner::new(args.pipeline_config()?)?;

    let image = image::open(&args.input)
        .with_context(|| format!("Failed to load image {}", args.input.display()))?;

    let registry = EngineRegistry::new(&args.engine_config())?;
    let engine = registry
        .default()
        .context("No OCR engine initialized")?;
    tracing::info!("Processing {} with engine '{}'", args.input.display(), engine.name());

    let output = runner.run(&image, engine.as_ref(), engine.as_ref())?;
    output
        .image
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
