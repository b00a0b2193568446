use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use ytranscript::{TranscriptConfig, TranscriptResponse, YoutubeTranscript};

use crate::error::panic_message;
use crate::formatter::{clean_caption_text, join_fragments};

/// One timed snippet of caption text.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionFragment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// One language-selection attempt in the retrieval sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageStrategy {
    /// Let the provider pick the track.
    Auto,
    Language(String),
}

impl LanguageStrategy {
    pub fn label(&self) -> &str {
        match self {
            LanguageStrategy::Auto => "auto",
            LanguageStrategy::Language(code) => code,
        }
    }

    pub fn lang(&self) -> Option<&str> {
        match self {
            LanguageStrategy::Auto => None,
            LanguageStrategy::Language(code) => Some(code),
        }
    }
}

impl FromStr for LanguageStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        if tag.is_empty() {
            return Err("language tag must not be empty".to_string());
        }
        if tag.eq_ignore_ascii_case("auto") {
            return Ok(LanguageStrategy::Auto);
        }
        if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err("language tag may only contain letters, digits, '-' and '_'".to_string());
        }
        Ok(LanguageStrategy::Language(tag.to_string()))
    }
}

impl fmt::Display for LanguageStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// Source of caption fragments for a video, optionally in a given language.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch(&self, video_id: &str, lang: Option<&str>) -> Result<Vec<CaptionFragment>, ProviderError>;
}

/// Fetches timed text straight from YouTube.
pub struct YoutubeProvider;

impl YoutubeProvider {
    fn from_entry(entry: TranscriptResponse) -> CaptionFragment {
        CaptionFragment {
            text: clean_caption_text(&entry.text),
            start: entry.offset,
            duration: entry.duration,
        }
    }
}

#[async_trait]
impl TranscriptProvider for YoutubeProvider {
    async fn fetch(&self, video_id: &str, lang: Option<&str>) -> Result<Vec<CaptionFragment>, ProviderError> {
        let config = lang.map(|lang| TranscriptConfig {
            lang: Some(lang.to_string()),
        });

        let entries = YoutubeTranscript::fetch_transcript(video_id, config)
            .await
            .map_err(|e| ProviderError(e.to_string()))?;

        Ok(entries.into_iter().map(Self::from_entry).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Character count of `text`.
    pub length: usize,
    /// Label of the strategy that produced the transcript.
    pub language: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptError {
    #[error("{}", not_found_message(.last_error))]
    NotFound { last_error: Option<String> },
}

fn not_found_message(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!("No transcript available for this video. Error: {}", e),
        None => "No transcript available for this video.".to_string(),
    }
}

pub struct TranscriptService {
    provider: Arc<dyn TranscriptProvider>,
    strategies: Vec<LanguageStrategy>,
    attempt_timeout: Duration,
    error_detail: bool,
}

impl TranscriptService {
    pub fn new(
        provider: Arc<dyn TranscriptProvider>,
        strategies: Vec<LanguageStrategy>,
        attempt_timeout: Duration,
        error_detail: bool,
    ) -> Self {
        Self {
            provider,
            strategies,
            attempt_timeout,
            error_detail,
        }
    }

    pub fn strategies(&self) -> &[LanguageStrategy] {
        &self.strategies
    }

    /// Tries each strategy in order and returns the first non-empty transcript.
    pub async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError> {
        let mut last_error = None;

        for strategy in &self.strategies {
            match self.attempt(video_id, strategy).await {
                Ok(fragments) => {
                    let text = join_fragments(&fragments);
                    let length = text.chars().count();
                    let covered = fragments.last().map(|f| f.start + f.duration).unwrap_or_default();
                    log::info!(
                        "Transcript for {} found with language {}: {} characters over {:.1}s",
                        video_id,
                        strategy,
                        length,
                        covered
                    );
                    return Ok(Transcript {
                        text,
                        length,
                        language: strategy.label().to_string(),
                    });
                }
                Err(e) => {
                    log::warn!("Failed with {} for {}: {}", strategy, video_id, e);
                    last_error = Some(e.0);
                }
            }
        }

        log::warn!("No transcript found for video {}", video_id);
        Err(TranscriptError::NotFound {
            last_error: last_error.filter(|_| self.error_detail),
        })
    }

    /// Runs one provider call on its own task so a panic fails only this strategy.
    async fn attempt(&self, video_id: &str, strategy: &LanguageStrategy) -> Result<Vec<CaptionFragment>, ProviderError> {
        let provider = Arc::clone(&self.provider);
        let video_id = video_id.to_string();
        let lang = strategy.lang().map(str::to_string);
        let mut call = tokio::spawn(async move { provider.fetch(&video_id, lang.as_deref()).await });

        let joined = match tokio::time::timeout(self.attempt_timeout, &mut call).await {
            Ok(joined) => joined,
            Err(_) => {
                call.abort();
                return Err(ProviderError(format!("timed out after {:?}", self.attempt_timeout)));
            }
        };

        let fragments = joined.map_err(|e| match e.try_into_panic() {
            Ok(payload) => ProviderError(format!("provider panicked: {}", panic_message(&*payload))),
            Err(e) => ProviderError(format!("provider task failed: {}", e)),
        })??;

        if fragments.is_empty() {
            return Err(ProviderError("transcript is empty".to_string()));
        }
        Ok(fragments)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub fn fragment(text: &str) -> CaptionFragment {
        CaptionFragment {
            text: text.to_string(),
            start: 0.0,
            duration: 1.0,
        }
    }

    /// Answers from a fixed table keyed by strategy label and records every call.
    /// Labels missing from the table fail with "no captions for <label>".
    #[derive(Default)]
    pub struct ScriptedProvider {
        answers: HashMap<String, Result<Vec<CaptionFragment>, ProviderError>>,
        stall: Vec<String>,
        explode: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn succeed(mut self, label: &str, texts: &[&str]) -> Self {
            self.answers
                .insert(label.to_string(), Ok(texts.iter().map(|t| fragment(t)).collect()));
            self
        }

        pub fn fail(mut self, label: &str, message: &str) -> Self {
            self.answers
                .insert(label.to_string(), Err(ProviderError(message.to_string())));
            self
        }

        /// Never answers for `label`.
        pub fn stall(mut self, label: &str) -> Self {
            self.stall.push(label.to_string());
            self
        }

        /// Panics when asked for `label`.
        pub fn explode(mut self, label: &str) -> Self {
            self.explode.push(label.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscriptProvider for ScriptedProvider {
        async fn fetch(&self, _video_id: &str, lang: Option<&str>) -> Result<Vec<CaptionFragment>, ProviderError> {
            let label = lang.unwrap_or("auto").to_string();
            self.calls.lock().unwrap().push(label.clone());
            if self.stall.contains(&label) {
                std::future::pending::<()>().await;
            }
            if self.explode.contains(&label) {
                panic!("caption track list is empty for {}", label);
            }
            self.answers
                .get(&label)
                .cloned()
                .unwrap_or_else(|| Err(ProviderError(format!("no captions for {}", label))))
        }
    }

    pub fn strategies(tags: &str) -> Vec<LanguageStrategy> {
        tags.split(',').map(|t| t.parse().unwrap()).collect()
    }
}
