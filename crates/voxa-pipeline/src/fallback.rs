//! Pre-generated fallback audio for degraded and failed runs.

use crate::error::FallbackError;
use std::sync::RwLock;
use tracing::{info, warn};
use voxa_types::FALLBACK_REPLY_TEXT;
use voxa_voice::{AudioContainer, AudioStore, Synthesizer};

/// File stem of the fallback clip inside the audio store.
pub const FALLBACK_AUDIO_STEM: &str = "fallback";

/// Holds the fallback reply text and, once provisioned, its audio URL.
///
/// The URL is written at most once per provisioning and read on every
/// degraded request. An unprovisioned provider yields `None`.
#[derive(Debug)]
pub struct FallbackProvider {
    audio_url: RwLock<Option<String>>,
    store: AudioStore,
}

impl FallbackProvider {
    pub fn new(store: AudioStore) -> Self {
        Self {
            audio_url: RwLock::new(None),
            store,
        }
    }

    /// Provider with a known clip URL, e.g. one hosted outside the audio store.
    pub fn with_audio_url(store: AudioStore, audio_url: impl Into<String>) -> Self {
        Self {
            audio_url: RwLock::new(Some(audio_url.into())),
            store,
        }
    }

    pub fn text(&self) -> &str {
        FALLBACK_REPLY_TEXT
    }

    pub fn audio_url(&self) -> Option<String> {
        match self.audio_url.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_audio_url(&self, url: String) {
        match self.audio_url.write() {
            Ok(mut guard) => *guard = Some(url),
            Err(poisoned) => *poisoned.into_inner() = Some(url),
        }
    }

    /// Makes sure a fallback clip exists in the audio store.
    ///
    /// Reuses an existing `fallback.*` file when it holds recognizable audio;
    /// an unreadable or unrecognized one is removed. Otherwise the
    /// fallback phrase is synthesized, fetched, and written as
    /// `fallback.<ext>` with the extension taken from the audio header.
    pub async fn provision(
        &self,
        synthesizer: &dyn Synthesizer,
        voice_id: &str,
        http: &reqwest::Client,
    ) -> Result<String, FallbackError> {
        if let Some(url) = self.audio_url() {
            return Ok(url);
        }

        if let Some(url) = self.reusable_clip().await {
            info!(url = %url, "reusing existing fallback audio");
            self.set_audio_url(url.clone());
            return Ok(url);
        }

        let generated = synthesizer
            .synthesize(self.text(), voice_id)
            .await
            .map_err(FallbackError::Synthesis)?;
        let bytes = self.fetch(&generated, http).await?;
        if bytes.is_empty() {
            return Err(FallbackError::Download(format!("{} returned no audio", generated)));
        }

        let extension = match AudioContainer::detect(&bytes) {
            Some(container) => container.extension(),
            None => {
                warn!(url = %generated, "unrecognized fallback audio header, assuming mp3");
                "mp3"
            }
        };
        let file_name = format!("{}.{}", FALLBACK_AUDIO_STEM, extension);
        let url = self
            .store
            .write(&file_name, &bytes)
            .await
            .map_err(FallbackError::Storage)?;

        info!(url = %url, bytes = bytes.len(), "fallback audio provisioned");
        self.set_audio_url(url.clone());
        Ok(url)
    }

    async fn reusable_clip(&self) -> Option<String> {
        let url = self.store.find_by_stem(FALLBACK_AUDIO_STEM).await?;
        let path = self.store.path_for(&url)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) if AudioContainer::detect(&bytes).is_some() => return Some(url),
            Ok(bytes) => warn!(url = %url, bytes = bytes.len(), "discarding unrecognized fallback audio"),
            Err(e) => warn!(url = %url, error = %e, "discarding unreadable fallback audio"),
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(url = %url, error = %e, "failed to remove stale fallback audio");
        }
        None
    }

    async fn fetch(&self, url: &str, http: &reqwest::Client) -> Result<Vec<u8>, FallbackError> {
        if let Some(path) = self.store.path_for(url) {
            return tokio::fs::read(&path)
                .await
                .map_err(|e| FallbackError::Download(format!("{}: {}", path.display(), e)));
        }

        let response = http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FallbackError::Download(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FallbackError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
