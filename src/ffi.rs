//! C FFI: exposes the chunker and the WAV merger to iOS / Android callers.
//!
//! Functions are `#[no_mangle] extern "C"` so Swift / Kotlin can call them
//! through a thin bridging header. Network synthesis stays in the host app;
//! these are the pure, synchronous pieces of the pipeline.
//!
//! ## Memory contract
//!
//! | Function                   | Caller frees with         |
//! |----------------------------|---------------------------|
//! | [`audiofy_chunk_text`]     | [`audiofy_free_string`]   |
//! | [`audiofy_describe_wav`]   | [`audiofy_free_string`]   |
//! | [`audiofy_merge_wav`]      | [`audiofy_free_buffer`]   |

use std::ffi::{c_char, CStr, CString};

use tracing::warn;

use crate::{
    chunker::{LengthUnit, TextChunker},
    wav::{self, MergeOptions},
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Borrow a non-null `*const c_char` as UTF-8, replacing invalid sequences.
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Heap-allocate an owned C string. Returns null on interior nul bytes.
fn to_c_str(s: &str) -> *const c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => std::ptr::null(),
    }
}

/// Borrow `len` bytes at `ptr`; null is only accepted for an empty slice.
unsafe fn bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    match (ptr.is_null(), len) {
        (true, 0) => Some(&[]),
        (true, _) => None,
        (false, _) => Some(unsafe { std::slice::from_raw_parts(ptr, len) }),
    }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Split `text` into TTS-sized chunks.
///
/// @param text        UTF-8 text.
/// @param max_len     Maximum chunk length; must be positive.
/// @param utf8_bytes  Measure lengths in UTF-8 bytes instead of characters.
/// @return            JSON array of strings, e.g. `["第一段。","第二段。"]`, or
///                    `NULL` on a null/zero argument. Free with
///                    [`audiofy_free_string`].
#[no_mangle]
pub unsafe extern "C" fn audiofy_chunk_text(
    text: *const c_char,
    max_len: usize,
    utf8_bytes: bool,
) -> *const c_char {
    let Some(text) = (unsafe { cstr_to_string(text) }) else {
        warn!("audiofy_chunk_text: null text");
        return std::ptr::null();
    };
    if max_len == 0 {
        warn!("audiofy_chunk_text: max_len must be positive");
        return std::ptr::null();
    }
    let unit = if utf8_bytes { LengthUnit::Utf8Bytes } else { LengthUnit::Chars };
    let chunks = TextChunker::with_unit(max_len, unit).chunk(&text);
    match serde_json::to_string(&chunks) {
        Ok(json) => to_c_str(&json),
        Err(e) => {
            warn!("audiofy_chunk_text: {e}");
            std::ptr::null()
        }
    }
}

/// Merge `count` WAV buffers into one.
///
/// @param buffers         Array of `count` pointers to WAV bytes.
/// @param lens            Array of `count` buffer lengths.
/// @param insert_silence  Insert silence between consecutive buffers.
/// @param silence_ms      Silence duration in milliseconds (100 is typical).
/// @param out_len         Receives the merged length.
/// @return                Merged WAV bytes, or `NULL` on a null argument or an
///                        empty list. Free with [`audiofy_free_buffer`].
#[no_mangle]
pub unsafe extern "C" fn audiofy_merge_wav(
    buffers: *const *const u8,
    lens: *const usize,
    count: usize,
    insert_silence: bool,
    silence_ms: u32,
    out_len: *mut usize,
) -> *mut u8 {
    if buffers.is_null() || lens.is_null() || out_len.is_null() {
        warn!("audiofy_merge_wav: null argument");
        return std::ptr::null_mut();
    }
    let ptrs = unsafe { std::slice::from_raw_parts(buffers, count) };
    let lens = unsafe { std::slice::from_raw_parts(lens, count) };

    let mut inputs = Vec::with_capacity(count);
    for (i, (&ptr, &len)) in ptrs.iter().zip(lens).enumerate() {
        match unsafe { bytes(ptr, len) } {
            Some(buf) => inputs.push(buf),
            None => {
                warn!("audiofy_merge_wav: buffer {i} is null");
                return std::ptr::null_mut();
            }
        }
    }

    match wav::merge(&inputs, &MergeOptions { insert_silence, silence_ms }) {
        Ok(merged) => {
            let merged = merged.into_boxed_slice();
            unsafe { *out_len = merged.len() };
            Box::into_raw(merged) as *mut u8
        }
        Err(e) => {
            warn!("audiofy_merge_wav: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Human-readable summary of a WAV buffer (size, format, duration).
///
/// @return  Heap-allocated UTF-8 string, or `NULL` if `ptr` is null.
///          Free with [`audiofy_free_string`].
#[no_mangle]
pub unsafe extern "C" fn audiofy_describe_wav(ptr: *const u8, len: usize) -> *const c_char {
    if ptr.is_null() {
        return std::ptr::null();
    }
    let buf = unsafe { std::slice::from_raw_parts(ptr, len) };
    to_c_str(&wav::describe(buf))
}

/// Free a string returned by this library.
#[no_mangle]
pub unsafe extern "C" fn audiofy_free_string(s: *const c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s as *mut c_char) });
    }
}

/// Free a buffer returned by [`audiofy_merge_wav`]. `len` must be the value
/// written to `out_len`.
#[no_mangle]
pub unsafe extern "C" fn audiofy_free_buffer(ptr: *mut u8, len: usize) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
    }
}
