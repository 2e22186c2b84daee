//! Chunked long-text synthesis.
//!
//! ```text
//! text ─▶ TextChunker ─▶ [TtsClient × n, retried] ─▶ ordered WAV slots
//!      ─▶ wav::merge ─▶ FileStorage
//! ```
//!
//! Chunk requests run sequentially by default. With `concurrency > 1` up to
//! that many requests are in flight at once on the caller's task; every
//! result lands in the slot of its chunk index and the merge only starts once
//! all slots are filled. The first terminal chunk failure returns
//! immediately and drops every other in-flight request. Dropping the future
//! returned by any method here cancels the request the same way: nothing is
//! merged or saved afterwards.

use std::{path::PathBuf, sync::Arc, time::Duration};

use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    chunker::TextChunker,
    client::TtsClient,
    config::{AppConfig, SynthesisOptions},
    error::{ErrorKind, SynthesisError, TtsError},
    storage::FileStorage,
    wav::{self, MergeOptions},
};

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Where a synthesis request currently is.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SynthesisStage {
    #[default]
    Idle,
    Chunking,
    Synthesizing { completed: usize, total: usize },
    Merging,
    Completed { duration: Duration },
    Failed { kind: ErrorKind, message: String },
}

impl SynthesisStage {
    /// Overall progress in `[0, 1]`.
    ///
    /// Synthesis dominates wall time, so it spans almost the whole bar.
    pub fn fraction(&self) -> f32 {
        match self {
            Self::Idle | Self::Failed { .. } => 0.0,
            Self::Chunking => 0.02,
            Self::Synthesizing { completed, total } => {
                let done = if *total == 0 { 0.0 } else { *completed as f32 / *total as f32 };
                0.05 + 0.9 * done.min(1.0)
            }
            Self::Merging => 0.97,
            Self::Completed { .. } => 1.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

type Progress<'a> = Option<&'a watch::Sender<SynthesisStage>>;

fn report(progress: Progress<'_>, stage: SynthesisStage) {
    if let Some(tx) = progress {
        tx.send_replace(stage);
    }
}

fn report_failure<T>(
    progress: Progress<'_>,
    result: Result<T, SynthesisError>,
) -> Result<T, SynthesisError> {
    if let Err(e) = &result {
        report(progress, SynthesisStage::Failed { kind: e.kind(), message: e.to_string() });
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthesizer
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted synthesis result.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutput {
    /// Location returned by the storage backend.
    pub path: PathBuf,
    pub relative_path: String,
    pub duration: Duration,
    pub size_bytes: u64,
    pub chunk_count: usize,
}

/// Turns long text into one WAV file through a [`TtsClient`].
pub struct Synthesizer {
    client: Arc<dyn TtsClient>,
    storage: Arc<dyn FileStorage>,
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(
        client: Arc<dyn TtsClient>,
        storage: Arc<dyn FileStorage>,
        options: SynthesisOptions,
    ) -> Self {
        Self { client, storage, options }
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    pub fn storage(&self) -> &Arc<dyn FileStorage> {
        &self.storage
    }

    /// Synthesize and merge `text`, returning the WAV bytes without saving.
    pub async fn render(&self, text: &str, config: &AppConfig) -> Result<Vec<u8>, SynthesisError> {
        self.render_inner(text, config, None).await.map(|(audio, _)| audio)
    }

    /// [`render`](Self::render), publishing every stage on `progress`.
    pub async fn render_with_progress(
        &self,
        text: &str,
        config: &AppConfig,
        progress: &watch::Sender<SynthesisStage>,
    ) -> Result<Vec<u8>, SynthesisError> {
        let result = self.render_inner(text, config, Some(progress)).await.map(|(audio, _)| audio);
        if let Ok(audio) = &result {
            let duration = wav::duration(audio).unwrap_or_default();
            report(Some(progress), SynthesisStage::Completed { duration });
        }
        report_failure(Some(progress), result)
    }

    /// Synthesize `text`, merge the chunks and save the result at `relative_path`.
    pub async fn synthesize_long(
        &self,
        text: &str,
        config: &AppConfig,
        relative_path: &str,
    ) -> Result<SynthesisOutput, SynthesisError> {
        self.synthesize_long_inner(text, config, relative_path, None).await
    }

    /// [`synthesize_long`](Self::synthesize_long), publishing every stage on `progress`.
    pub async fn synthesize_long_with_progress(
        &self,
        text: &str,
        config: &AppConfig,
        relative_path: &str,
        progress: &watch::Sender<SynthesisStage>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        let result = self.synthesize_long_inner(text, config, relative_path, Some(progress)).await;
        report_failure(Some(progress), result)
    }

    async fn synthesize_long_inner(
        &self,
        text: &str,
        config: &AppConfig,
        relative_path: &str,
        progress: Progress<'_>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        let (audio, chunk_count) = self.render_inner(text, config, progress).await?;
        let duration = wav::duration(&audio).unwrap_or_default();

        let path = self.storage.save(relative_path, &audio).await?;
        info!(
            path = %path.display(),
            bytes = audio.len(),
            duration_s = duration.as_secs_f64(),
            "audio saved"
        );
        report(progress, SynthesisStage::Completed { duration });

        Ok(SynthesisOutput {
            path,
            relative_path: relative_path.to_string(),
            duration,
            size_bytes: audio.len() as u64,
            chunk_count,
        })
    }

    /// Steps shared by every entry point: validate, chunk, synthesize, merge.
    async fn render_inner(
        &self,
        text: &str,
        config: &AppConfig,
        progress: Progress<'_>,
    ) -> Result<(Vec<u8>, usize), SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidArgument("text is empty".into()));
        }
        config.validate()?;
        if self.options.max_chunk_len == 0 {
            return Err(SynthesisError::InvalidArgument("max_chunk_len must be positive".into()));
        }
        if self.options.request_timeout_ms == 0 {
            return Err(SynthesisError::InvalidArgument(
                "request_timeout_ms must be positive".into(),
            ));
        }

        report(progress, SynthesisStage::Chunking);
        let chunker = TextChunker::with_unit(self.options.max_chunk_len, self.options.length_unit);
        let chunks = chunker.chunk(text);
        if chunks.is_empty() {
            return Err(SynthesisError::InvalidArgument("text has no speakable content".into()));
        }
        let total = chunks.len();
        info!(
            chunks = total,
            chars = text.chars().count(),
            backend = self.client.name(),
            concurrency = self.options.concurrency.max(1),
            "starting synthesis"
        );

        report(progress, SynthesisStage::Synthesizing { completed: 0, total });
        let buffers = self.synthesize_chunks(&chunks, config, progress).await?;

        report(progress, SynthesisStage::Merging);
        let merge_options = MergeOptions {
            insert_silence: self.options.insert_silence,
            silence_ms: self.options.silence_ms,
        };
        let merged = wav::merge(&buffers, &merge_options)?;
        debug!(bytes = merged.len(), segments = total, "merged chunks");
        Ok((merged, total))
    }

    async fn synthesize_chunks(
        &self,
        chunks: &[String],
        config: &AppConfig,
        progress: Progress<'_>,
    ) -> Result<Vec<Vec<u8>>, SynthesisError> {
        let total = chunks.len();
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total];
        let mut completed = 0;

        let mut pending = stream::iter(chunks.iter().enumerate())
            .map(|(i, chunk)| async move {
                (i, self.synthesize_chunk(i + 1, total, chunk, config).await)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((i, result)) = pending.next().await {
            slots[i] = Some(result?);
            completed += 1;
            report(progress, SynthesisStage::Synthesizing { completed, total });
        }

        let buffers: Vec<Vec<u8>> = slots.into_iter().flatten().collect();
        debug_assert_eq!(buffers.len(), total);
        Ok(buffers)
    }

    /// One chunk with timeout, retry and response validation. `index` is 1-based.
    async fn synthesize_chunk(
        &self,
        index: usize,
        total: usize,
        text: &str,
        config: &AppConfig,
    ) -> Result<Vec<u8>, SynthesisError> {
        let policy = self.options.retry;
        let timeout = self.options.request_timeout();
        let mut attempt = 0u32;

        loop {
            let attempt_result =
                tokio::time::timeout(timeout, self.client.synthesize(text, config)).await;
            let result = match attempt_result {
                Ok(result) => result,
                Err(_) => Err(TtsError::Timeout(timeout)),
            };

            match result {
                Ok(audio) => {
                    if !wav::validate_wav_format(&audio) {
                        return Err(SynthesisError::MalformedAudio {
                        index,
                        total,
                        len: audio.len(),
                    });
                    }
                    debug!(
                    chunk = index,
                    total,
                    bytes = audio.len(),
                    attempts = attempt + 1,
                    "chunk synthesized"
                );
                    return Ok(audio);
                }
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        chunk = index,
                        total,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chunk failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    warn!(
                        chunk = index,
                        total,
                        attempts = attempt + 1,
                        error = %source,
                        "chunk failed"
                    );
                    return Err(SynthesisError::Chunk {
                        index,
                        total,
                        attempts: attempt + 1,
                        source,
                    });
                }
            }
        }
    }
}
