//! # audiofy
//!
//! Long-form text to narrated audio: split text into TTS-sized chunks,
//! synthesize each chunk through a pluggable TTS backend, and losslessly
//! reassemble the PCM fragments into one playable WAV file.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use audiofy::{AppConfig, LocalFileStorage, SynthesisOptions, Synthesizer};
//!
//! # #[cfg(feature = "proxy")] {
//! let client = Arc::new(audiofy::client::ProxyTtsClient::new()?);
//! let storage = Arc::new(LocalFileStorage::new("/tmp/audiofy"));
//! let synth = Synthesizer::new(client, storage, SynthesisOptions::default());
//!
//! let config = AppConfig::load("config.json".as_ref())?;
//! let path = audiofy::storage::new_audio_path("podcast-1");
//! let out = synth.synthesize_long("很长的一段文字。……", &config, &path).await?;
//! println!("{} ({:.1} s)", out.path.display(), out.duration.as_secs_f64());
//! # }
//! # Ok(())
//! # }
//! ```
//!
//! The leaf pieces are plain synchronous functions:
//!
//! ```
//! let chunks = audiofy::chunk("第一句。第二句。", 4);
//! assert_eq!(chunks, ["第一句。", "第二句。"]);
//! ```
//!
//! ## Pipeline
//! 1. **Chunking**: split after sentence punctuation (`。？！…?!` and newlines),
//!    pack sentences greedily up to the limit, fall back to clause punctuation
//!    and finally to fixed-size slices.
//! 2. **Synthesis**: one [`TtsClient`] call per chunk with timeout and
//!    exponential backoff on rate limits, server errors and timeouts.
//! 3. **Merge**: concatenate PCM payloads in chunk order with 100 ms of silence
//!    between segments and rewrite the RIFF / data sizes.
//! 4. **Store**: hand the merged WAV to a [`FileStorage`].
//!
//! ## Mobile (iOS / Android)
//!
//! The crate builds as a `staticlib`; [`ffi`] exposes the chunker and merger
//! to Swift / Kotlin. The default feature set has no HTTP stack, so hosts can
//! keep their own networking and implement [`TtsClient`] only on the Rust side
//! when they want the full orchestrator.

pub mod chunker;
pub mod client;
pub mod config;
pub mod error;
pub mod storage;
pub mod synthesis;
pub mod wav;

// C FFI for iOS / Android: audiofy_chunk_text / merge_wav / describe_wav.
pub mod ffi;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use chunker::{chunk, ChunkStats, LengthUnit, TextChunker};
pub use client::TtsClient;
pub use config::{AppConfig, RetryPolicy, SynthesisOptions};
pub use error::{ErrorKind, StorageError, SynthesisError, TtsError};
pub use storage::{FileStorage, LocalFileStorage, MemoryStorage};
pub use synthesis::{SynthesisOutput, SynthesisStage, Synthesizer};
pub use wav::{merge, validate_wav_format, MergeOptions};
