use std::path::Path;

use eyre::{Result, WrapErr};
use log::debug;

use crate::Transcript;

/// Characters of transcript shown before the summary starts
pub const PREVIEW_CHARS: usize = 500;

/// Overwrite `path` with the transcript text
pub fn write_transcript(path: &Path, transcript: &Transcript) -> Result<()> {
    std::fs::write(path, &transcript.text).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    debug!("Transcript written to {}", path.display());
    Ok(())
}

/// First `max_chars` characters of `text`, with an ellipsis when truncated
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Horizontal rule used to frame streamed output
pub fn rule(width: usize) -> String {
    "=".repeat(width)
}

/// One-line description of where a transcript came from
pub fn describe(transcript: &Transcript) -> String {
    format!(
        "{} ({}) via {}: {} captions in {}, {} characters",
        transcript.title,
        transcript.video_id,
        transcript.source,
        transcript.kind,
        transcript.language,
        transcript.char_count(),
    )
}
