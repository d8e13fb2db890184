use std::sync::LazyLock;

use async_trait::async_trait;
use log::{debug, info};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;

use super::{CaptionSource, USER_AGENT, fetch_text};
use crate::error::CaptionError;
use crate::normalize::normalize;
use crate::select::{self, CaptionFormat, CaptionTrack, TrackMap};
use crate::{CaptionKind, Segment, Transcript, VideoRef};

pub const NAME: &str = "innertube";

/// Format label for the default timed-text XML served at `baseUrl`
const TIMEDTEXT_EXT: &str = "srv1";

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    captions: Option<CaptionsData>,
    #[serde(rename = "videoDetails")]
    video_details: Option<VideoDetails>,
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<PlayerCaptionTrack>>,
}

#[derive(Debug, Deserialize)]
struct PlayerCaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    /// "asr" for speech-recognition tracks, absent for manual ones
    kind: Option<String>,
}

/// Lists caption tracks through YouTube's InnerTube player API and parses the timed-text XML
pub struct InnerTubeSource {
    client: reqwest::Client,
    languages: Vec<String>,
}

impl InnerTubeSource {
    pub fn new(client: reqwest::Client, languages: Vec<String>) -> Self {
        Self { client, languages }
    }

    async fn player(&self, video_id: &str) -> Result<InnerTubePlayerResponse, CaptionError> {
        // Step 1: Fetch the watch page to get the InnerTube API key
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        debug!("Fetching watch page: {watch_url}");

        let page_html = fetch_text(&self.client, &watch_url).await?;
        let api_key = extract_api_key(&page_html)?;
        debug!("Extracted InnerTube API key: {api_key}");

        // Step 2: Call InnerTube player endpoint
        let player_url = format!("https://www.youtube.com/youtubei/v1/player?key={api_key}&prettyPrint=false");
        let hl = self.languages.first().map(String::as_str).unwrap_or("en");

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": hl,
                    "gl": "US",
                    "clientName": "WEB",
                    "clientVersion": "2.20241126.01.00"
                }
            },
            "videoId": video_id
        });

        let resp = self
            .client
            .post(&player_url)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(resp)
    }
}

#[async_trait]
impl CaptionSource for InnerTubeSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_transcript(&self, video: &VideoRef) -> Result<Transcript, CaptionError> {
        let video_id = video
            .video_id()
            .ok_or_else(|| CaptionError::InvalidUrl(video.url().to_string()))?;

        let resp = self.player(video_id).await?;
        let title = resp
            .video_details
            .as_ref()
            .and_then(|vd| vd.title.clone())
            .unwrap_or_default();
        info!("{NAME}: player response for {video_id} ({title})");

        let tracks = tracks_from_player(resp, video_id)?;
        debug!("{NAME}: available languages: {}", select::languages(&tracks).join(", "));

        let selection = select::select(&tracks, &self.languages, video_id)?;

        // Step 3: Fetch the caption XML
        let caption_xml = fetch_text(&self.client, selection.url).await?;
        let segments = parse_caption_xml(&caption_xml)?;
        debug!("{NAME}: parsed {} caption segments", segments.len());

        let joined = segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");

        Ok(Transcript {
            video_id: video_id.to_string(),
            title,
            language: selection.track.language.clone(),
            kind: selection.track.kind,
            source: NAME.to_string(),
            text: normalize(&joined),
        })
    }
}

fn tracks_from_player(resp: InnerTubePlayerResponse, video_id: &str) -> Result<TrackMap, CaptionError> {
    if resp.captions.is_none() {
        let status = resp.playability_status.as_ref();
        match status.and_then(|s| s.status.as_deref()) {
            Some(state) if state != "OK" => {
                return Err(CaptionError::Extractor {
                    tool: NAME,
                    message: status
                        .and_then(|s| s.reason.clone())
                        .unwrap_or_else(|| format!("video {video_id} is {state}")),
                });
            }
            _ => {}
        }
    }

    let renderer = resp
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .ok_or_else(|| CaptionError::CaptionsDisabled(video_id.to_string()))?;

    let mut manual = TrackMap::new();
    let mut generated = TrackMap::new();

    for track in renderer.caption_tracks.unwrap_or_default() {
        let kind = match track.kind.as_deref() {
            Some("asr") => CaptionKind::Generated,
            _ => CaptionKind::Manual,
        };
        let target = match kind {
            CaptionKind::Manual => &mut manual,
            CaptionKind::Generated => &mut generated,
        };
        target.entry(track.language_code.clone()).or_insert_with(|| CaptionTrack {
            language: track.language_code,
            kind,
            formats: vec![CaptionFormat {
                ext: TIMEDTEXT_EXT.to_string(),
                url: Some(track.base_url),
            }],
        });
    }

    Ok(select::prefer_manual(manual, generated))
}

/// Where the watch page has carried the InnerTube key over time, newest first
static API_KEY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#,
        r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("api key regex"))
    .collect()
});

fn extract_api_key(html: &str) -> Result<String, CaptionError> {
    API_KEY_PATTERNS
        .iter()
        .find_map(|re| re.captures(html))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CaptionError::Parse("could not extract InnerTube API key from watch page".to_string()))
}

fn attr_seconds(value: &[u8]) -> Option<f64> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}

/// Timed-text XML (`<text start=".." dur="..">..</text>`) into segments; blank cues are dropped
fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>, CaptionError> {
    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    // (start, duration) of the <text> element being read
    let mut open_cue: Option<(f64, f64)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"text" => {
                let mut start = None;
                let mut duration = 0.0;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"start" => start = attr_seconds(&attr.value),
                        // the last cue of a track sometimes omits dur
                        b"dur" => duration = attr_seconds(&attr.value).unwrap_or(0.0),
                        _ => {}
                    }
                }
                open_cue = start.map(|s| (s, duration));
            }
            Ok(Event::Text(e)) => {
                let Some((start, duration)) = open_cue.take() else {
                    continue;
                };
                let raw = e.unescape().unwrap_or_default();
                let text = html_escape::decode_html_entities(&raw).into_owned();
                if !text.trim().is_empty() {
                    segments.push(Segment { text, start, duration });
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"text" => open_cue = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(CaptionError::Parse(format!("invalid caption XML: {e}"))),
            _ => {}
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(json: serde_json::Value) -> InnerTubePlayerResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_api_key_from_watch_page() {
        let current = r#"ytcfg.set({"INNERTUBE_API_KEY": "AIzaCurrent", "HL": "en"});"#;
        let legacy = r#"window.yt = {innertubeApiKey:"AIzaLegacy"};"#;
        assert_eq!(extract_api_key(current).unwrap(), "AIzaCurrent");
        assert_eq!(extract_api_key(legacy).unwrap(), "AIzaLegacy");
        assert!(matches!(
            extract_api_key("<html>consent wall</html>"),
            Err(CaptionError::Parse(_))
        ));
    }

    #[test]
    fn test_tracks_split_manual_and_generated() {
        let resp = player(serde_json::json!({
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {"baseUrl": "https://example.com/en-asr", "languageCode": "en", "kind": "asr"},
                        {"baseUrl": "https://example.com/pt", "languageCode": "pt"},
                        {"baseUrl": "https://example.com/fr", "languageCode": "fr"}
                    ]
                }
            }
        }));
        let tracks = tracks_from_player(resp, "abc").unwrap();
        assert_eq!(select::languages(&tracks), vec!["fr", "pt"]);
        assert_eq!(tracks["pt"].kind, CaptionKind::Manual);
        assert_eq!(tracks["pt"].formats[0].fetch_url(), Some("https://example.com/pt"));
    }

    #[test]
    fn test_tracks_generated_only() {
        let resp = player(serde_json::json!({
            "captions": {
                "playerCaptionsTracklistRenderer": {
                    "captionTracks": [
                        {"baseUrl": "https://example.com/en-asr", "languageCode": "en", "kind": "asr"}
                    ]
                }
            }
        }));
        let tracks = tracks_from_player(resp, "abc").unwrap();
        assert_eq!(tracks["en"].kind, CaptionKind::Generated);
    }

    #[test]
    fn test_missing_captions_block_means_disabled() {
        let resp = player(serde_json::json!({
            "videoDetails": {"title": "No captions"},
            "playabilityStatus": {"status": "OK"}
        }));
        assert!(matches!(
            tracks_from_player(resp, "abc"),
            Err(CaptionError::CaptionsDisabled(ref id)) if id == "abc"
        ));
    }

    #[test]
    fn test_unplayable_video_reports_reason() {
        let resp = player(serde_json::json!({
            "playabilityStatus": {"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}
        }));
        let err = tracks_from_player(resp, "abc").unwrap_err();
        assert_eq!(err.to_string(), "innertube failed: Sign in to confirm your age");
    }

    #[test]
    fn test_empty_track_list_is_no_transcript() {
        let resp = player(serde_json::json!({
            "captions": {"playerCaptionsTracklistRenderer": {"captionTracks": []}}
        }));
        let tracks = tracks_from_player(resp, "abc").unwrap();
        assert!(matches!(
            select::select(&tracks, &["en".to_string()], "abc"),
            Err(CaptionError::NoTranscriptFound(_))
        ));
    }

    #[test]
    fn test_timedtext_segments() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript>
<text start="0" dur="1.5">Olá &amp;amp; bem-vindos</text>
<text start="1.5" dur="0.5">   </text>
<text start="2" dur="2.25">it&amp;#39;s &amp;quot;live&amp;quot;</text>
<text start="4.25">fim</text>
</transcript>"#;

        let segments = parse_caption_xml(xml).unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Olá & bem-vindos", "it's \"live\"", "fim"]);
        assert_eq!((segments[1].start, segments[1].duration), (2.0, 2.25));
        assert_eq!((segments[2].start, segments[2].duration), (4.25, 0.0));
    }

    #[test]
    fn test_timedtext_without_cues() {
        assert!(parse_caption_xml("<transcript></transcript>").unwrap().is_empty());
        assert!(parse_caption_xml("<transcript><text start=\"0\">a</p></transcript>").is_err());
    }

    #[tokio::test]
    async fn test_requires_video_id() {
        let source = InnerTubeSource::new(reqwest::Client::new(), vec![]);
        let err = source
            .fetch_transcript(&VideoRef::new("https://vimeo.com/123456"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptionError::InvalidUrl(_)));
    }
}
