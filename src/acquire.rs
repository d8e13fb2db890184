//! Ordered fallback across caption sources.
//!
//! Each video is offered to every configured source in turn. A source error,
//! a selection failure, or a transcript shorter than the minimum length moves
//! on to the next source; the first transcript that passes wins. Every source
//! is tried at most once per video.

use log::{info, warn};

use crate::error::CaptionError;
use crate::source::CaptionSource;
use crate::{Transcript, VideoRef};

/// Transcripts shorter than this (in characters) are treated as unusable
pub const DEFAULT_MIN_CHARS: usize = 50;

/// Progress notifications emitted while acquiring a transcript
#[derive(Debug)]
pub enum AcquireEvent<'a> {
    VideoStarted {
        index: usize,
        total: usize,
        video: &'a VideoRef,
    },
    SourceStarted {
        source: &'static str,
    },
    SourceFailed {
        source: &'static str,
        error: &'a CaptionError,
    },
    Succeeded {
        transcript: &'a Transcript,
    },
    VideoFailed {
        index: usize,
        total: usize,
        error: &'a CaptionError,
    },
}

pub struct Acquirer {
    sources: Vec<Box<dyn CaptionSource>>,
    min_chars: usize,
}

impl Acquirer {
    pub fn new(sources: Vec<Box<dyn CaptionSource>>, min_chars: usize) -> Self {
        Self { sources, min_chars }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run the sources in order for one video, stopping at the first usable transcript
    pub async fn acquire<F>(&self, video: &VideoRef, observe: &mut F) -> Result<Transcript, CaptionError>
    where
        F: FnMut(AcquireEvent<'_>),
    {
        let mut attempts = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let name = source.name();
            info!("Trying caption source {name} for {video}");
            observe(AcquireEvent::SourceStarted { source: name });

            let outcome = match source.fetch_transcript(video).await {
                Ok(transcript) => self.validate(transcript),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(transcript) => {
                    info!(
                        "Caption source {name} succeeded: lang={} kind={} chars={}",
                        transcript.language,
                        transcript.kind,
                        transcript.char_count()
                    );
                    observe(AcquireEvent::Succeeded {
                        transcript: &transcript,
                    });
                    return Ok(transcript);
                }
                Err(e) => {
                    warn!("Caption source {name} failed for {video}: {e}");
                    observe(AcquireEvent::SourceFailed {
                        source: name,
                        error: &e,
                    });
                    attempts.push((name.to_string(), e));
                }
            }
        }

        Err(CaptionError::Exhausted {
            video: video.label().to_string(),
            attempts,
        })
    }

    /// Process videos in order until one yields a usable transcript
    pub async fn acquire_first<F>(&self, videos: &[VideoRef], mut observe: F) -> Option<Transcript>
    where
        F: FnMut(AcquireEvent<'_>),
    {
        let total = videos.len();
        for (index, video) in videos.iter().enumerate() {
            observe(AcquireEvent::VideoStarted { index, total, video });
            match self.acquire(video, &mut observe).await {
                Ok(transcript) => return Some(transcript),
                Err(error) => {
                    warn!("Giving up on {video}: {error}");
                    observe(AcquireEvent::VideoFailed {
                        index,
                        total,
                        error: &error,
                    });
                }
            }
        }
        None
    }

    fn validate(&self, transcript: Transcript) -> Result<Transcript, CaptionError> {
        let len = transcript.text.trim().chars().count();
        if len < self.min_chars {
            return Err(CaptionError::TooShort {
                len,
                min: self.min_chars,
            });
        }
        Ok(transcript)
    }
}
