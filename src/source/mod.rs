//! Caption sources.
//!
//! Each source wraps one way of listing and downloading the caption tracks of a
//! video. They share the language/format selection in [`crate::select`] and
//! hand back a normalized [`Transcript`]; ordering and fallback between them
//! live in [`crate::acquire`].

pub mod innertube;
pub mod ytdlp;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::error::CaptionError;
use crate::{Transcript, VideoRef};

pub use innertube::InnerTubeSource;
pub use ytdlp::YtDlpSource;

pub(crate) const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Attempts per caption download before giving up
const FETCH_ATTEMPTS: u32 = 3;
const FETCH_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default order in which sources are tried
pub const DEFAULT_SOURCES: &[&str] = &[ytdlp::NAME, innertube::NAME];

#[async_trait]
pub trait CaptionSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_transcript(&self, video: &VideoRef) -> Result<Transcript, CaptionError>;
}

/// Construct a caption source from its configured name
pub fn by_name(name: &str, client: &reqwest::Client, languages: &[String]) -> Option<Box<dyn CaptionSource>> {
    match name {
        ytdlp::NAME => Some(Box::new(YtDlpSource::new(client.clone(), languages.to_vec()))),
        innertube::NAME => Some(Box::new(InnerTubeSource::new(client.clone(), languages.to_vec()))),
        _ => None,
    }
}

/// Retry an async operation with exponential backoff
pub(crate) async fn retry<F, Fut, T, E>(max_attempts: u32, base_delay: Duration, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt + 1 < max_attempts => {
                let delay = base_delay * 2u32.pow(attempt);
                debug!("Attempt {} failed: {e}, retrying in {delay:?}", attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// GET a caption payload as text
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, CaptionError> {
    retry(FETCH_ATTEMPTS, FETCH_BASE_DELAY, move || async move {
        debug!("Fetching caption payload: {url}");
        let text = client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok::<_, CaptionError>(text)
    })
    .await
}
