use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Language used when a request does not name one
    pub default_language: String,
    pub max_file_size: usize,
    /// Upper bound on one request's pipeline and backend work
    pub request_timeout: Duration,
    /// Restrict startup to a single engine ("ocrs", "tesseract")
    pub engine: Option<String>,
    pub tessdata_path: Option<String>,
}

impl Config {
    /// Whether the named engine should be initialized
    pub fn wants(&self, engine: &str) -> bool {
        self.engine.as_deref().map_or(true, |name| name == engine)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9292,
            default_language: "eng".to_string(),
            max_file_size: 50 * 1024 * 1024,
            request_timeout: Duration::from_secs(120),
            engine: None,
            tessdata_path: None,
        }
    }
}
