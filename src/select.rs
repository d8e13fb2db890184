use std::collections::BTreeMap;

use log::debug;

use crate::CaptionKind;
use crate::error::CaptionError;

/// Language preference used when the config file does not override it
pub const DEFAULT_LANGUAGES: &[&str] = &["pt-BR", "pt-br", "pt", "pt-PT", "en", "en-US", "en-GB"];

/// One downloadable rendition of a caption track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionFormat {
    pub ext: String,
    pub url: Option<String>,
}

impl CaptionFormat {
    pub fn fetch_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub language: String,
    pub kind: CaptionKind,
    pub formats: Vec<CaptionFormat>,
}

/// Caption tracks keyed by language code, in lexicographic order
pub type TrackMap = BTreeMap<String, CaptionTrack>;

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub track: &'a CaptionTrack,
    pub format: &'a CaptionFormat,
    pub url: &'a str,
}

/// Manual tracks win whenever the video has any; otherwise fall back to generated ones
pub fn prefer_manual(manual: TrackMap, generated: TrackMap) -> TrackMap {
    if manual.is_empty() { generated } else { manual }
}

/// First language from `priorities` present in `tracks`, else the lexicographically first track
pub fn select_language<'a>(tracks: &'a TrackMap, priorities: &[String]) -> Option<&'a CaptionTrack> {
    priorities
        .iter()
        .find_map(|lang| tracks.get(lang))
        .or_else(|| tracks.values().next())
}

/// First format of the track that exposes a fetch URL
pub fn select_format(track: &CaptionTrack) -> Option<&CaptionFormat> {
    track.formats.iter().find(|f| f.fetch_url().is_some())
}

/// Pick a track and a format for `video_id`, or explain why none is usable
pub fn select<'a>(tracks: &'a TrackMap, priorities: &[String], video_id: &str) -> Result<Selection<'a>, CaptionError> {
    let track =
        select_language(tracks, priorities).ok_or_else(|| CaptionError::NoTranscriptFound(video_id.to_string()))?;

    let format = select_format(track).ok_or_else(|| CaptionError::NoUsableFormat(track.language.clone()))?;
    let url = format
        .fetch_url()
        .ok_or_else(|| CaptionError::NoUsableFormat(track.language.clone()))?;

    debug!(
        "Selected caption track: lang={} kind={} format={}",
        track.language, track.kind, format.ext
    );

    Ok(Selection { track, format, url })
}

/// Available language codes, for diagnostics
pub fn languages(tracks: &TrackMap) -> Vec<&str> {
    tracks.keys().map(String::as_str).collect()
}
