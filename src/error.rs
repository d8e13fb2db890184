use thiserror::Error;

/// Failures while acquiring a transcript from a caption source
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("could not extract video ID from: {0}")]
    InvalidUrl(String),

    #[error("captions are disabled for video {0}")]
    CaptionsDisabled(String),

    #[error("no transcript found for video {0}")]
    NoTranscriptFound(String),

    #[error("caption track '{0}' has no downloadable format")]
    NoUsableFormat(String),

    #[error("transcript too short ({len} chars, minimum {min})")]
    TooShort { len: usize, min: usize },

    #[error("{0} not found. Install it to enable this caption source:\n  pip install {0}\n  or: brew install {0}")]
    ToolMissing(&'static str),

    #[error("{tool} failed: {message}")]
    Extractor { tool: &'static str, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("all caption sources failed for {video}: {}", render_attempts(.attempts))]
    Exhausted {
        video: String,
        attempts: Vec<(String, CaptionError)>,
    },
}

fn render_attempts(attempts: &[(String, CaptionError)]) -> String {
    if attempts.is_empty() {
        return "no caption sources configured".to_string();
    }
    attempts
        .iter()
        .map(|(source, err)| format!("[{source}] {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
