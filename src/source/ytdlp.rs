use std::collections::HashMap;
use std::process::Command;

use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use super::{CaptionSource, fetch_text};
use crate::error::CaptionError;
use crate::normalize::payload_to_text;
use crate::select::{self, CaptionFormat, CaptionTrack, TrackMap};
use crate::{CaptionKind, Transcript, VideoRef};

pub const NAME: &str = "yt-dlp";

/// Pseudo-language yt-dlp reports for live chat replays
const LIVE_CHAT: &str = "live_chat";

/// Lists caption tracks through `yt-dlp --dump-json` and downloads the chosen one over HTTP
pub struct YtDlpSource {
    client: reqwest::Client,
    languages: Vec<String>,
    binary: String,
}

impl YtDlpSource {
    pub fn new(client: reqwest::Client, languages: Vec<String>) -> Self {
        Self {
            client,
            languages,
            binary: NAME.to_string(),
        }
    }

    /// Use a specific yt-dlp executable instead of the one on PATH
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn dump_info(&self, url: &str) -> Result<Vec<u8>, CaptionError> {
        debug!("Extracting video info via {}: {url}", self.binary);

        let output = Command::new(&self.binary)
            .args([
                "--dump-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                "--no-check-certificate",
                url,
            ])
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CaptionError::ToolMissing(NAME),
                _ => CaptionError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptionError::Extractor {
                tool: NAME,
                message: first_error_line(&stderr).unwrap_or_else(|| format!("exited with status {}", output.status)),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl CaptionSource for YtDlpSource {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_transcript(&self, video: &VideoRef) -> Result<Transcript, CaptionError> {
        let info = parse_info(&self.dump_info(video.url())?)?;
        let video_id = info.id.clone().unwrap_or_else(|| video.label().to_string());
        let title = info.title.clone().unwrap_or_default();
        info!("{NAME}: extracted info for {video_id} ({title})");

        let tracks = info.tracks();
        debug!("{NAME}: available languages: {}", select::languages(&tracks).join(", "));

        let selection = select::select(&tracks, &self.languages, &video_id)?;
        let payload = fetch_text(&self.client, selection.url).await?;
        let text = payload_to_text(&selection.format.ext, &payload);

        Ok(Transcript {
            video_id,
            title,
            language: selection.track.language.clone(),
            kind: selection.track.kind,
            source: NAME.to_string(),
            text,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    id: Option<String>,
    title: Option<String>,
    subtitles: Option<HashMap<String, Vec<FormatInfo>>>,
    automatic_captions: Option<HashMap<String, Vec<FormatInfo>>>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    ext: Option<String>,
    url: Option<String>,
}

impl VideoInfo {
    /// Manual subtitles when present, automatic captions otherwise
    fn tracks(&self) -> TrackMap {
        select::prefer_manual(
            to_track_map(self.subtitles.as_ref(), CaptionKind::Manual),
            to_track_map(self.automatic_captions.as_ref(), CaptionKind::Generated),
        )
    }
}

fn parse_info(json: &[u8]) -> Result<VideoInfo, CaptionError> {
    Ok(serde_json::from_slice(json)?)
}

fn to_track_map(entries: Option<&HashMap<String, Vec<FormatInfo>>>, kind: CaptionKind) -> TrackMap {
    entries
        .into_iter()
        .flatten()
        .filter(|(lang, formats)| lang.as_str() != LIVE_CHAT && !formats.is_empty())
        .map(|(lang, formats)| {
            let track = CaptionTrack {
                language: lang.clone(),
                kind,
                formats: formats
                    .iter()
                    .map(|f| CaptionFormat {
                        ext: f.ext.clone().unwrap_or_else(|| "unknown".to_string()),
                        url: f.url.clone(),
                    })
                    .collect(),
            };
            (lang.clone(), track)
        })
        .collect()
}

fn first_error_line(stderr: &str) -> Option<String> {
    let lines = || stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    lines()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines().last())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Route};

    const INFO: &str = r#"{
        "id": "dQw4w9WgXcQ",
        "title": "Never Gonna Give You Up",
        "subtitles": {
            "en": [
                {"ext": "json3", "url": "https://example.com/en.json3"},
                {"ext": "vtt", "url": "https://example.com/en.vtt"}
            ],
            "live_chat": [{"ext": "json", "url": "https://example.com/chat"}]
        },
        "automatic_captions": {
            "pt": [{"ext": "vtt", "url": "https://example.com/pt.vtt"}]
        }
    }"#;

    #[test]
    fn test_parse_info_prefers_manual_tracks() {
        let info = parse_info(INFO.as_bytes()).unwrap();
        assert_eq!(info.id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(info.title.as_deref(), Some("Never Gonna Give You Up"));

        let tracks = info.tracks();
        assert_eq!(select::languages(&tracks), vec!["en"]);
        assert_eq!(tracks["en"].kind, CaptionKind::Manual);
        assert_eq!(tracks["en"].formats.len(), 2);
        assert_eq!(tracks["en"].formats[0].ext, "json3");
    }

    #[test]
    fn test_parse_info_uses_automatic_when_no_manual() {
        let json = r#"{
            "id": "abc",
            "subtitles": {},
            "automatic_captions": {
                "en": [{"ext": "vtt", "url": "https://example.com/en.vtt"}],
                "pt-BR": [{"ext": "srv1"}, {"ext": "vtt", "url": "https://example.com/pt.vtt"}]
            }
        }"#;
        let tracks = parse_info(json.as_bytes()).unwrap().tracks();
        assert_eq!(tracks["pt-BR"].kind, CaptionKind::Generated);

        let priorities = vec!["pt-BR".to_string(), "en".to_string()];
        let selection = select::select(&tracks, &priorities, "abc").unwrap();
        assert_eq!(selection.track.language, "pt-BR");
        assert_eq!(selection.url, "https://example.com/pt.vtt");
    }

    #[test]
    fn test_parse_info_without_captions() {
        let json = r#"{"id": "abc", "title": "Silent", "subtitles": null}"#;
        let tracks = parse_info(json.as_bytes()).unwrap().tracks();
        assert!(tracks.is_empty());
        assert!(matches!(
            select::select(&tracks, &[], "abc"),
            Err(CaptionError::NoTranscriptFound(_))
        ));
    }

    #[test]
    fn test_parse_info_invalid_json() {
        assert!(matches!(parse_info(b"not json"), Err(CaptionError::Json(_))));
    }

    #[test]
    fn test_first_error_line() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(
            first_error_line(stderr).as_deref(),
            Some("ERROR: [youtube] abc: Video unavailable")
        );
        assert_eq!(first_error_line("only warning\n").as_deref(), Some("only warning"));
        assert_eq!(first_error_line("  \n"), None);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let source = YtDlpSource::new(reqwest::Client::new(), vec![])
            .with_binary("ytresume-test-nonexistent-yt-dlp");
        let err = source
            .fetch_transcript(&VideoRef::new("https://youtu.be/dQw4w9WgXcQ"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaptionError::ToolMissing(NAME)));
    }

    /// Shell script standing in for yt-dlp that prints `info` as its dump
    #[cfg(unix)]
    fn fake_yt_dlp(dir: &std::path::Path, info: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\ncat <<'INFO'\n{info}\nINFO\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_transcript_downloads_selected_track() {
        let json3 = serde_json::json!({
            "events": [
                {"tStartMs": 0, "segs": [{"utf8": "Never gonna "}, {"utf8": "give you up,"}]},
                {"tStartMs": 2000},
                {"tStartMs": 4000, "segs": [{"utf8": "never gonna &amp; let you down"}]}
            ]
        });
        let server = testing::serve(vec![
            Route::ok("/en.json3", "application/json", json3.to_string()),
            Route::ok("/pt.vtt", "text/vtt", "WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nnunca\n"),
        ])
        .await;

        let info = serde_json::json!({
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "subtitles": {
                "en": [{"ext": "json3", "url": server.url("/en.json3")}],
                "pt": [{"ext": "vtt", "url": server.url("/pt.vtt")}]
            },
            "automatic_captions": {}
        });
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_yt_dlp(dir.path(), &info.to_string());

        let source = YtDlpSource::new(testing::client(), vec!["en".to_string(), "pt".to_string()]).with_binary(binary);
        let transcript = source
            .fetch_transcript(&VideoRef::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ"))
            .await
            .unwrap();

        assert_eq!(transcript.video_id, "dQw4w9WgXcQ");
        assert_eq!(transcript.title, "Never Gonna Give You Up");
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.kind, CaptionKind::Manual);
        assert_eq!(transcript.source, NAME);
        assert_eq!(transcript.text, "Never gonna give you up, never gonna & let you down");

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].head.starts_with("GET /en.json3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_transcript_reports_extractor_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yt-dlp");
        std::fs::write(&path, "#!/bin/sh\necho 'ERROR: [youtube] abc: Private video' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let source = YtDlpSource::new(testing::client(), vec![]).with_binary(path.display().to_string());
        let err = source.fetch_transcript(&VideoRef::new("abcdefghijk")).await.unwrap_err();
        match err {
            CaptionError::Extractor { tool, message } => {
                assert_eq!(tool, NAME);
                assert_eq!(message, "ERROR: [youtube] abc: Private video");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
