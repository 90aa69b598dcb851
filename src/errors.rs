use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Decision error: {0}")]
    Decision(String),

    #[error("Invalid action code: {0}")]
    ActionParse(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Agent error: {0}")]
    Agent(String),
}

impl serde::Serialize for ScreenPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ScreenPilotResult<T> = Result<T, ScreenPilotError>;
