pub mod acquire;
pub mod chat;
pub mod config;
pub mod error;
pub mod normalize;
pub mod output;
pub mod select;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::LazyLock;

use regex::Regex;

/// A single captioned segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Whether a caption track was authored by a human or generated by speech recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionKind {
    Manual,
    Generated,
}

impl std::fmt::Display for CaptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptionKind::Manual => write!(f, "manual"),
            CaptionKind::Generated => write!(f, "generated"),
        }
    }
}

/// Normalized transcript for a single video
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub video_id: String,
    pub title: String,
    pub language: String,
    pub kind: CaptionKind,
    /// Name of the caption source that produced this transcript
    pub source: String,
    pub text: String,
}

impl Transcript {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// A video as supplied by the user: the raw URL plus the video ID, when one could be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    url: String,
    id: Option<String>,
}

impl VideoRef {
    pub fn new(input: &str) -> Self {
        let url = input.trim().to_string();
        let id = extract_video_id(&url);
        Self { url, id }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn video_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Video ID when known, otherwise the raw input
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }
}

impl std::fmt::Display for VideoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

static BARE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("bare id regex"));

static URL_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // youtube.com/watch?v=ID
        r"[?&]v=([a-zA-Z0-9_-]{11})",
        // youtu.be/ID
        r"youtu\.be/([a-zA-Z0-9_-]{11})",
        // youtube.com/embed/ID
        r"embed/([a-zA-Z0-9_-]{11})",
        // youtube.com/shorts/ID
        r"youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("video id regex"))
    .collect()
});

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if BARE_ID_RE.is_match(input) {
        return Some(input.to_string());
    }

    URL_ID_RES
        .iter()
        .find_map(|re| re.captures(input).map(|caps| caps[1].to_string()))
}

/// Split a comma-separated list of URLs, dropping empty entries
pub fn split_urls(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
