//! Canonical PCM WAV handling and lossless concatenation.
//!
//! Every buffer handled here is a 44-byte canonical header followed by raw
//! little-endian PCM:
//!
//! | Offset | Size | Field           | Value                        |
//! |--------|------|-----------------|------------------------------|
//! | 0      | 4    | ChunkID         | `"RIFF"`                     |
//! | 4      | 4    | ChunkSize       | file size − 8                |
//! | 8      | 4    | Format          | `"WAVE"`                     |
//! | 12     | 4    | Subchunk1ID     | `"fmt "`                     |
//! | 16     | 4    | Subchunk1Size   | 16                           |
//! | 20     | 2    | AudioFormat     | 1 (PCM)                      |
//! | 22     | 2    | NumChannels     |                              |
//! | 24     | 4    | SampleRate      |                              |
//! | 28     | 4    | ByteRate        | rate × channels × bytes      |
//! | 32     | 2    | BlockAlign      | channels × bytes             |
//! | 34     | 2    | BitsPerSample   |                              |
//! | 36     | 4    | Subchunk2ID     | `"data"`                     |
//! | 40     | 4    | Subchunk2Size   | PCM payload size             |

use std::{io::Cursor, time::Duration};

use anyhow::{Context, Result};

use crate::error::SynthesisError;

/// Size of the canonical PCM header.
pub const HEADER_LEN: usize = 44;

/// Gap inserted between merged segments unless configured otherwise.
pub const DEFAULT_SILENCE_MS: u32 = 100;

const CHUNK_SIZE_OFFSET: usize = 4;
const DATA_SIZE_OFFSET: usize = 40;

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn write_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

// ─────────────────────────────────────────────────────────────────────────────
// Header inspection
// ─────────────────────────────────────────────────────────────────────────────

/// `true` iff `buf` is at least a header long and carries the RIFF/WAVE markers.
pub fn validate_wav_format(buf: &[u8]) -> bool {
    buf.len() >= HEADER_LEN && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE"
}

/// Format fields read from the canonical header offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WavFormat {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if !validate_wav_format(buf) {
            return None;
        }
        Self::from_header(buf)
    }

    /// Read the format fields without checking the RIFF/WAVE markers.
    /// `None` only when `buf` is shorter than a header.
    pub fn from_header(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            audio_format: read_u16(buf, 20),
            channels: read_u16(buf, 22),
            sample_rate: read_u32(buf, 24),
            byte_rate: read_u32(buf, 28),
            block_align: read_u16(buf, 32),
            bits_per_sample: read_u16(buf, 34),
        })
    }

    /// Bytes per second of PCM payload, computed from rate × width × channels.
    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * (self.bits_per_sample / 8) as u64 * self.channels as u64
    }
}

/// PCM payload following the header; empty for buffers shorter than a header.
pub fn pcm_payload(buf: &[u8]) -> &[u8] {
    buf.get(HEADER_LEN..).unwrap_or_default()
}

/// Playback duration of `buf`, or `None` for an invalid or zero-rate header.
pub fn duration(buf: &[u8]) -> Option<Duration> {
    let format = WavFormat::parse(buf)?;
    let bps = format.bytes_per_second();
    if bps == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(pcm_payload(buf).len() as f64 / bps as f64))
}

/// Human-readable summary of a WAV buffer.
pub fn describe(buf: &[u8]) -> String {
    let Some(format) = WavFormat::parse(buf) else {
        return "invalid WAV format".to_string();
    };
    let payload = pcm_payload(buf).len();
    let secs = duration(buf).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    let layout = match format.channels {
        1 => " (mono)",
        2 => " (stereo)",
        _ => "",
    };
    format!(
        concat!(
            "WAV file:\n",
            "  size:        {} bytes\n",
            "  PCM payload: {} bytes\n",
            "  sample rate: {} Hz\n",
            "  bit depth:   {} bit\n",
            "  channels:    {}{}\n",
            "  duration:    {:.2} s",
        ),
        buf.len(),
        payload,
        format.sample_rate,
        format.bits_per_sample,
        format.channels,
        layout,
        secs,
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Merging
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Insert zero-valued samples between consecutive segments.
    pub insert_silence: bool,
    pub silence_ms: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { insert_silence: true, silence_ms: DEFAULT_SILENCE_MS }
    }
}

/// Payload length of `ms` milliseconds of silence in `format`.
pub fn silence_len(format: &WavFormat, ms: u32) -> usize {
    let samples = (format.sample_rate as f64 * ms as f64 / 1000.0).round() as usize;
    samples * (format.bits_per_sample / 8) as usize * format.channels as usize
}

/// Concatenate WAV buffers into one, rewriting the size fields.
///
/// The first buffer's header is the template for the output. Sample rate,
/// channel count and bit depth of later buffers are **not** checked: callers
/// must pass segments in one PCM format, otherwise the result is structurally
/// valid but plays back wrong.
///
/// A single buffer is returned as-is. An empty slice is an
/// [`SynthesisError::InvalidArgument`].
pub fn merge<B: AsRef<[u8]>>(
    buffers: &[B],
    options: &MergeOptions,
) -> Result<Vec<u8>, SynthesisError> {
    let first = match buffers {
        [] => return Err(SynthesisError::InvalidArgument("WAV buffer list is empty".into())),
        [only] => return Ok(only.as_ref().to_vec()),
        [first, ..] => first.as_ref(),
    };
    if first.len() < HEADER_LEN {
        return Err(SynthesisError::InvalidArgument(format!(
            "first WAV buffer is {} bytes, shorter than the {HEADER_LEN}-byte header",
            first.len()
        )));
    }

    // Markers are the caller's concern; silence only needs the format fields.
    let gap = match (options.insert_silence, WavFormat::from_header(first)) {
        (true, Some(format)) => silence_len(&format, options.silence_ms),
        _ => 0,
    };

    let payload_len: usize = buffers.iter().map(|b| pcm_payload(b.as_ref()).len()).sum::<usize>()
        + gap * (buffers.len() - 1);
    let mut out = Vec::with_capacity(HEADER_LEN + payload_len);
    out.extend_from_slice(&first[..HEADER_LEN]);

    for (i, buf) in buffers.iter().enumerate() {
        out.extend_from_slice(pcm_payload(buf.as_ref()));
        if i + 1 < buffers.len() {
            out.resize(out.len() + gap, 0);
        }
    }

    write_u32(&mut out, CHUNK_SIZE_OFFSET, (HEADER_LEN + payload_len - 8) as u32);
    write_u32(&mut out, DATA_SIZE_OFFSET, payload_len as u32);
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode interleaved 16-bit samples as a canonical PCM WAV buffer.
pub fn encode_pcm16(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + samples.len() * 2));
    {
        let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("Cannot start WAV writer")?;
        let mut pcm = writer.get_i16_writer(samples.len() as u32);
        for &s in samples {
            pcm.write_sample(s);
        }
        pcm.flush().context("WAV write error")?;
        writer.finalize().context("WAV finalise error")?;
    }
    Ok(cursor.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
