//! Caption payload cleanup.
//!
//! Every payload ends up in [`normalize`]: tags are dropped, a small fixed set of
//! HTML entities is decoded, and whitespace runs collapse into single spaces.
//! Format-aware helpers peel container structure (json3 events, WebVTT cue
//! timings) off first so that only cue text reaches the normalizer.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Entities decoded by [`normalize`], applied in this order
const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

/// Reduce raw caption markup to a single line of plain text
pub fn normalize(raw: &str) -> String {
    let mut text = TAG_RE.replace_all(raw, "").into_owned();

    for &(entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }

    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Convert a downloaded caption payload to plain text based on its format label
pub fn payload_to_text(ext: &str, payload: &str) -> String {
    match ext {
        "json3" => match json3_to_text(payload) {
            Some(text) => normalize(&text),
            None => normalize(payload),
        },
        "vtt" => normalize(&vtt_cue_text(payload)),
        _ => normalize(payload),
    }
}

#[derive(Deserialize)]
struct Json3Payload {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

fn json3_to_text(payload: &str) -> Option<String> {
    let parsed: Json3Payload = serde_json::from_str(payload).ok()?;
    Some(
        parsed
            .events
            .iter()
            .map(|e| e.segs.iter().map(|s| s.utf8.as_str()).collect::<String>())
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn vtt_cue_text(vtt: &str) -> String {
    let lines: Vec<&str> = vtt.lines().map(str::trim).collect();
    let mut cues: Vec<String> = Vec::new();
    for (i, line) in lines.iter().copied().enumerate() {
        if line.is_empty() || line.eq_ignore_ascii_case("webvtt") || line.contains("-->") {
            continue;
        }
        if line.starts_with("Kind:") || line.starts_with("Language:") {
            continue;
        }
        if is_cue_identifier(line, &lines[i + 1..]) {
            continue;
        }
        let cue = normalize(line);
        // auto captions repeat the previous line while the next one rolls in
        if cue.is_empty() || cues.last() == Some(&cue) {
            continue;
        }
        cues.push(cue);
    }
    cues.join(" ")
}

/// A numeric line only names a cue when the timing line follows it
fn is_cue_identifier(line: &str, rest: &[&str]) -> bool {
    line.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .find(|l| !l.is_empty())
            .is_some_and(|next| next.contains("-->"))
}
