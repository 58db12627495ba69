//! Configuration module
//!
//! Server configuration is read from the environment (and an optional `.env`
//! file). Every field has a default so the service starts with no setup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const SERVER_PORT: u16 = 3000;
const SCRATCH_DIR: &str = "temp";
const PYTHON_PATH: &str = "python";
const ONNXRUNTIME_DEFAULT_VERSION: &str = "1.17.0";
const JPEG_QUALITY: u8 = 95;
const MAX_UPLOAD_MB: usize = 25;
const CHROMA_KEY_TOLERANCE: u8 = 48;

/// Which background-removal engine executes jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// `rembg` running in an external Python process.
    Rembg,
    /// In-process corner-colour keying; no Python required.
    ChromaKey,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Rembg => "rembg",
            EngineKind::ChromaKey => "chroma-key",
        }
    }
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rembg" => Ok(EngineKind::Rembg),
            "chroma-key" | "chroma_key" | "chromakey" => Ok(EngineKind::ChromaKey),
            other => Err(anyhow::anyhow!(
                "Unsupported ENGINE '{}'. Expected 'rembg' or 'chroma-key'",
                other
            )),
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    /// Shared working directory for job input/output files.
    pub scratch_dir: PathBuf,
    pub engine: EngineKind,
    pub python_path: String,
    /// Explicit requirements file; when unset the provisioner looks in the
    /// working directory and then its parent.
    pub requirements_path: Option<PathBuf>,
    pub onnxruntime_default_version: String,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
    /// Reject requests without `X-Request-Id` instead of deriving a key.
    pub require_request_id: bool,
    pub chroma_key_tolerance: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            cors_origins: vec!["*".to_string()],
            scratch_dir: PathBuf::from(SCRATCH_DIR),
            engine: EngineKind::Rembg,
            python_path: PYTHON_PATH.to_string(),
            requirements_path: None,
            onnxruntime_default_version: ONNXRUNTIME_DEFAULT_VERSION.to_string(),
            jpeg_quality: JPEG_QUALITY,
            max_upload_bytes: MAX_UPLOAD_MB * 1024 * 1024,
            require_request_id: false,
            chroma_key_tolerance: CHROMA_KEY_TOLERANCE,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_upload_mb = env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_MB.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_UPLOAD_MB);

        let config = Config {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            cors_origins,
            scratch_dir: env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            engine: env::var("ENGINE")
                .ok()
                .map(|s| s.parse::<EngineKind>())
                .transpose()?
                .unwrap_or(defaults.engine),
            python_path: env::var("PYTHON_PATH").unwrap_or(defaults.python_path),
            requirements_path: env::var("REQUIREMENTS_PATH").ok().map(PathBuf::from),
            onnxruntime_default_version: env::var("ONNXRUNTIME_DEFAULT_VERSION")
                .unwrap_or(defaults.onnxruntime_default_version),
            jpeg_quality: env::var("JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(JPEG_QUALITY),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            require_request_id: env::var("REQUIRE_REQUEST_ID")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(false),
            chroma_key_tolerance: env::var("CHROMA_KEY_TOLERANCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CHROMA_KEY_TOLERANCE),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("JPEG_QUALITY must be between 1 and 100"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_MB cannot be 0"));
        }
        if self.python_path.trim().is_empty() && self.engine == EngineKind::Rembg {
            return Err(anyhow::anyhow!("PYTHON_PATH cannot be empty"));
        }
        Ok(())
    }
}
