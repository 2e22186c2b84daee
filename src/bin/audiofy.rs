//! `audiofy` command-line tool.
//!
//! ```text
//! audiofy chunk article.txt --max 600 --bytes
//! audiofy merge -o out.wav part1.wav part2.wav part3.wav
//! audiofy info out.wav
//! audiofy synthesize --config config.json article.txt --podcast-id p42
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use audiofy::{
    chunker::{ChunkStats, LengthUnit, TextChunker, DEFAULT_MAX_LEN},
    client::{DashScopeTtsClient, ProxyTtsClient, TtsClient},
    config::{AppConfig, SynthesisOptions},
    storage::{new_audio_path, LocalFileStorage},
    synthesis::{SynthesisStage, Synthesizer},
    wav::{self, MergeOptions, DEFAULT_SILENCE_MS},
};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "audiofy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Long-form text to narrated audio")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a text file into TTS-sized chunks and print them
    Chunk {
        file: PathBuf,
        /// Maximum chunk length
        #[arg(long, default_value_t = DEFAULT_MAX_LEN)]
        max: usize,
        /// Measure lengths in UTF-8 bytes instead of characters
        #[arg(long)]
        bytes: bool,
    },

    /// Concatenate WAV files of the same PCM format
    Merge {
        #[arg(short, long)]
        output: PathBuf,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Do not insert silence between segments
        #[arg(long)]
        no_silence: bool,
        #[arg(long, default_value_t = DEFAULT_SILENCE_MS)]
        silence_ms: u32,
    },

    /// Print the header summary of a WAV file
    Info { file: PathBuf },

    /// Synthesize a text file into one WAV under the data directory
    Synthesize {
        /// JSON config with ttsApiKey, ttsVoice, proxyUrl, ...
        #[arg(long)]
        config: PathBuf,
        file: PathBuf,
        /// Storage root (default ~/.audiofy/data)
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long, default_value = "cli")]
        podcast_id: String,
        /// Concurrent chunk requests
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Chunk by UTF-8 bytes instead of characters
        #[arg(long)]
        bytes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Args::parse().command {
        Command::Chunk { file, max, bytes } => chunk(file, max, bytes),
        Command::Merge { output, inputs, no_silence, silence_ms } => {
            merge(output, inputs, !no_silence, silence_ms)
        }
        Command::Info { file } => {
            let buf = std::fs::read(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            println!("{}", wav::describe(&buf));
            Ok(())
        }
        Command::Synthesize { config, file, data_dir, podcast_id, concurrency, bytes } => {
            synthesize(config, file, data_dir, podcast_id, concurrency, bytes).await
        }
    }
}

fn length_unit(bytes: bool) -> LengthUnit {
    if bytes {
        LengthUnit::Utf8Bytes
    } else {
        LengthUnit::Chars
    }
}

fn chunk(file: PathBuf, max: usize, bytes: bool) -> Result<()> {
    if max == 0 {
        bail!("--max must be positive");
    }
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Cannot read {}", file.display()))?;
    let chunker = TextChunker::with_unit(max, length_unit(bytes));
    let chunks = chunker.chunk(&text);
    for (i, c) in chunks.iter().enumerate() {
        println!(
            "── chunk {}/{} ({} chars, {} bytes)",
            i + 1,
            chunks.len(),
            c.chars().count(),
            c.len()
        );
        println!("{c}");
    }
    println!("{}", ChunkStats::from_chunks(&text, &chunks));
    Ok(())
}

fn merge(
    output: PathBuf,
    inputs: Vec<PathBuf>,
    insert_silence: bool,
    silence_ms: u32,
) -> Result<()> {
    let mut buffers = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let buf = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
        if !wav::validate_wav_format(&buf) {
            bail!("{} is not a WAV file", path.display());
        }
        buffers.push(buf);
    }
    let merged = wav::merge(&buffers, &MergeOptions { insert_silence, silence_ms })?;
    std::fs::write(&output, &merged).with_context(|| format!("Cannot write {}", output.display()))?;
    info!(inputs = inputs.len(), bytes = merged.len(), "merged → {}", output.display());
    println!("{}", wav::describe(&merged));
    Ok(())
}

async fn synthesize(
    config: PathBuf,
    file: PathBuf,
    data_dir: Option<PathBuf>,
    podcast_id: String,
    concurrency: usize,
    bytes: bool,
) -> Result<()> {
    let config = AppConfig::load(&config)?.apply_env();
    info!(?config, "loaded config");
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("Cannot read {}", file.display()))?;

    let root = match data_dir {
        Some(dir) => dir,
        None => LocalFileStorage::default_location()
            .context("Cannot locate home directory; pass --data-dir")?,
    };
    let client: Arc<dyn TtsClient> = if config.proxy_url.is_some() {
        Arc::new(ProxyTtsClient::new()?)
    } else {
        Arc::new(DashScopeTtsClient::new()?)
    };
    let options = SynthesisOptions {
        concurrency,
        length_unit: length_unit(bytes),
        ..SynthesisOptions::default()
    };
    let synth = Synthesizer::new(client, Arc::new(LocalFileStorage::new(root)), options);

    let (tx, mut rx) = watch::channel(SynthesisStage::Idle);
    let reporter = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let stage = rx.borrow_and_update().clone();
            if let SynthesisStage::Synthesizing { completed, total } = stage {
                info!("synthesizing {completed}/{total} ({:.0}%)", stage.fraction() * 100.0);
            }
            if stage.is_terminal() {
                break;
            }
        }
    });

    let relative = new_audio_path(&podcast_id);
    let result = synth.synthesize_long_with_progress(&text, &config, &relative, &tx).await;
    drop(tx);
    let _ = reporter.await;

    let out = result?;
    println!(
        "saved {} ({} chunks, {} bytes, {:.2} s)",
        out.path.display(),
        out.chunk_count,
        out.size_bytes,
        out.duration.as_secs_f64()
    );
    Ok(())
}
