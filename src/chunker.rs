//! Sentence-aware text chunker.
//!
//! Splits arbitrarily long text into pieces that fit a single TTS request.
//!
//! 1. Text already within the limit is returned untouched as one chunk.
//! 2. Otherwise it is cut *after* every sentence terminator
//!    (`。？！…?!` and newline), keeping the terminator on the left piece.
//! 3. Sentences are packed greedily, joined by a single space, until the next
//!    one would overflow the limit.
//! 4. A sentence longer than the limit is re-split after clause punctuation
//!    (`，,;；、`) and packed the same way, without separators.
//! 5. A clause still longer than the limit is hard-sliced.
//!
//! Every emitted chunk is whitespace-trimmed. Output order always equals input
//! order and the result is fully deterministic.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default per-request ceiling of the reference TTS provider.
pub const DEFAULT_MAX_LEN: usize = 600;

static RE_SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[。？！…?!\n]").unwrap());
static RE_CLAUSE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[，,;；、]").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Length measurement
// ─────────────────────────────────────────────────────────────────────────────

/// Unit in which `max_len` and every intermediate length are measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// UTF-8 encoded bytes. Qwen3 TTS Flash limits requests to 600 bytes,
    /// which is only 200 CJK characters.
    Utf8Bytes,
}

impl LengthUnit {
    pub fn measure(self, s: &str) -> usize {
        match self {
            Self::Chars => s.chars().count(),
            Self::Utf8Bytes => s.len(),
        }
    }

    fn measure_char(self, c: char) -> usize {
        match self {
            Self::Chars => 1,
            Self::Utf8Bytes => c.len_utf8(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Splitting helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Split `text` immediately after every match of `boundary`, keeping the
/// boundary character on the preceding piece. Blank pieces are dropped.
fn split_after<'a>(text: &'a str, boundary: &Regex) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        pieces.push(&text[start..m.end()]);
        start = m.end();
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.trim().is_empty());
    pieces
}

/// Greedy packer shared by the sentence and clause passes.
struct Packer {
    unit: LengthUnit,
    max_len: usize,
    separator: &'static str,
    current: String,
    current_len: usize,
    chunks: Vec<String>,
}

impl Packer {
    fn new(unit: LengthUnit, max_len: usize, separator: &'static str) -> Self {
        Self {
            unit,
            max_len,
            separator,
            current: String::new(),
            current_len: 0,
            chunks: Vec::new(),
        }
    }

    /// Returns `false` when `piece` would overflow the buffer, flushing it.
    fn try_append(&mut self, piece: &str, piece_len: usize) -> bool {
        let sep_len = if self.current.is_empty() { 0 } else { self.unit.measure(self.separator) };
        if self.current_len + sep_len + piece_len > self.max_len {
            self.flush();
            return false;
        }
        if !self.current.is_empty() {
            self.current.push_str(self.separator);
        }
        self.current.push_str(piece);
        self.current_len += sep_len + piece_len;
        true
    }

    fn start_with(&mut self, piece: &str, piece_len: usize) {
        self.current.push_str(piece);
        self.current_len = piece_len;
    }

    fn emit(&mut self, chunk: &str) {
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            self.chunks.push(chunk.to_string());
        }
    }

    fn flush(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.current_len = 0;
        self.emit(&current);
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TextChunker
// ─────────────────────────────────────────────────────────────────────────────

/// Reusable chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    max_len: usize,
    unit: LengthUnit,
}

impl TextChunker {
    /// Character-measured chunker.
    ///
    /// # Panics
    /// If `max_len` is zero.
    pub fn new(max_len: usize) -> Self {
        Self::with_unit(max_len, LengthUnit::Chars)
    }

    /// # Panics
    /// If `max_len` is zero.
    pub fn with_unit(max_len: usize, unit: LengthUnit) -> Self {
        assert!(max_len > 0, "chunk max_len must be positive");
        Self { max_len, unit }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn unit(&self) -> LengthUnit {
        self.unit
    }

    /// Split `text` into ordered chunks, each at most `max_len` long.
    ///
    /// An empty string yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if self.unit.measure(text) <= self.max_len {
            return vec![text.to_string()];
        }

        let mut packer = Packer::new(self.unit, self.max_len, " ");
        for sentence in split_after(text, &RE_SENTENCE_END) {
            let sentence = sentence.trim();
            let len = self.unit.measure(sentence);
            if packer.try_append(sentence, len) {
                continue;
            }
            if len > self.max_len {
                for clause in self.split_long_sentence(sentence) {
                    packer.emit(&clause);
                }
            } else {
                packer.start_with(sentence, len);
            }
        }
        packer.finish()
    }

    /// Second pass for a sentence that alone exceeds the limit.
    fn split_long_sentence(&self, sentence: &str) -> Vec<String> {
        let mut packer = Packer::new(self.unit, self.max_len, "");
        for clause in split_after(sentence, &RE_CLAUSE_END) {
            let len = self.unit.measure(clause);
            if packer.try_append(clause, len) {
                continue;
            }
            if len > self.max_len {
                for slice in self.hard_split(clause) {
                    packer.emit(&slice);
                }
            } else {
                packer.start_with(clause, len);
            }
        }
        packer.finish()
    }

    /// Fixed-size slices of at most `max_len`; never splits inside a code point.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let mut slices = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;
        for c in text.chars() {
            let c_len = self.unit.measure_char(c);
            if current_len + c_len > self.max_len && !current.is_empty() {
                slices.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += c_len;
        }
        if !current.is_empty() {
            slices.push(current);
        }
        slices
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LEN)
    }
}

/// Character-measured chunking with `max_len`. See [`TextChunker::chunk`].
///
/// # Panics
/// If `max_len` is zero.
pub fn chunk(text: &str, max_len: usize) -> Vec<String> {
    TextChunker::new(max_len).chunk(text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one chunking run, for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStats {
    pub total_chars: usize,
    pub total_bytes: usize,
    pub chunk_count: usize,
    pub avg_chunk_bytes: usize,
    pub min_chunk_bytes: usize,
    pub max_chunk_bytes: usize,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
}

impl ChunkStats {
    pub fn from_chunks(text: &str, chunks: &[String]) -> Self {
        let bytes: Vec<usize> = chunks.iter().map(String::len).collect();
        let chars: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
        let avg_chunk_bytes =
            if bytes.is_empty() { 0 } else { bytes.iter().sum::<usize>() / bytes.len() };
        Self {
            total_chars: text.chars().count(),
            total_bytes: text.len(),
            chunk_count: chunks.len(),
            avg_chunk_bytes,
            min_chunk_bytes: bytes.iter().copied().min().unwrap_or(0),
            max_chunk_bytes: bytes.iter().copied().max().unwrap_or(0),
            min_chunk_chars: chars.iter().copied().min().unwrap_or(0),
            max_chunk_chars: chars.iter().copied().max().unwrap_or(0),
        }
    }

    pub fn compute(text: &str, chunker: &TextChunker) -> Self {
        Self::from_chunks(text, &chunker.chunk(text))
    }
}

impl fmt::Display for ChunkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chunk statistics:")?;
        writeln!(f, "  total:   {} chars ({} bytes)", self.total_chars, self.total_bytes)?;
        writeln!(f, "  chunks:  {}", self.chunk_count)?;
        writeln!(f, "  average: {} bytes", self.avg_chunk_bytes)?;
        writeln!(f, "  longest: {} bytes ({} chars)", self.max_chunk_bytes, self.max_chunk_chars)?;
        write!(f, "  shortest: {} bytes ({} chars)", self.min_chunk_bytes, self.min_chunk_chars)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_short_text_unchanged() {
        let text = "这是一段短文本。";
        assert_eq!(chunk(text, 600), vec![text]);
        // No trimming on the fast path.
        assert_eq!(chunk("  padded  ", 600), vec!["  padded  "]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk("", 600).is_empty());
    }

    #[test]
    fn test_exact_limit_is_one_chunk() {
        let text = "这".repeat(200);
        let c = chunk(&text, 200);
        assert_eq!(c.len(), 1);
        assert_eq!(char_len(&c[0]), 200);
    }

    #[test]
    fn test_sentence_boundaries_keep_punctuation() {
        let text = "第一句话。第二句话。第三句话。第四句话。第五句话。";
        let c = chunk(text, 12);
        assert!(c.len() >= 2, "got: {:?}", c);
        for piece in &c {
            assert!(char_len(piece) <= 12, "too long: {piece}");
            assert!(piece.contains('。'), "lost terminator: {piece}");
        }
        assert_eq!(c[0], "第一句话。 第二句话。");
    }

    #[test]
    fn test_mixed_punctuation() {
        let text = "第一句话。第二句话？第三句话！第四句话……第五句话\n第六句话。";
        let c = chunk(text, 12);
        assert!(c.len() >= 2, "got: {:?}", c);
        let joined = c.join(" ");
        for mark in ['。', '？', '！', '…'] {
            assert!(joined.contains(mark), "missing {mark} in {joined}");
        }
        assert!(c.iter().all(|p| char_len(p) <= 12));
    }

    #[test]
    fn test_english_text() {
        let text =
            "This is the first sentence. This is the second sentence! Is this the third sentence?";
        let c = chunk(text, 40);
        assert!(c.len() >= 2, "got: {:?}", c);
        assert!(c.iter().all(|p| char_len(p) <= 40), "got: {:?}", c);
        // '.' is not a terminator: only the '!' and '?' boundaries split.
        assert_eq!(c[c.len() - 1], "Is this the third sentence?");
    }

    #[test]
    fn test_hard_split_without_punctuation() {
        let text = "字".repeat(700);
        let c = chunk(&text, 600);
        assert_eq!(c.len(), 2);
        assert_eq!(char_len(&c[0]), 600);
        assert_eq!(char_len(&c[1]), 100);
    }

    #[test]
    fn test_secondary_split_on_clauses() {
        let clause = format!("{}，", "甲".repeat(9)); // 10 chars
        let text = format!("{}。", clause.repeat(5)); // 51 chars, a single sentence
        let c = chunk(&text, 25);
        assert_eq!(c.len(), 3, "got: {:?}", c);
        assert_eq!(c[0], clause.repeat(2));
        assert_eq!(c[1], clause.repeat(2));
        assert_eq!(c[2], format!("{clause}。"));
    }

    #[test]
    fn test_oversized_clause_falls_through_to_hard_split() {
        let text = format!("甲，{}。", "乙".repeat(30));
        let c = chunk(&text, 10);
        let ten = "乙".repeat(10);
        assert_eq!(
            c,
            vec!["甲，".to_string(), ten.clone(), ten.clone(), ten, "。".to_string()]
        );
        assert!(c.iter().all(|p| char_len(p) <= 10), "got: {:?}", c);
        assert_eq!(c.concat(), text);
    }

    #[test]
    fn test_oversized_sentence_flushes_buffer_first() {
        let text = format!("短句。{}。尾句。", "长".repeat(30));
        let c = chunk(&text, 20);
        assert_eq!(c[0], "短句。");
        assert_eq!(c.last().map(String::as_str), Some("尾句。"));
        assert!(c.iter().all(|p| char_len(p) <= 20), "got: {:?}", c);
    }

    #[test]
    fn test_paragraph_scenario() {
        let sentence = "这是第一段测试文字内容。"; // 12 chars
        let paragraph = sentence.repeat(25); // 300 chars
        let text = format!("{paragraph}\n{paragraph}\n{paragraph}");
        let c = chunk(&text, 600);
        assert!((2..=3).contains(&c.len()), "got {} chunks", c.len());
        for piece in &c {
            assert!(char_len(piece) <= 600);
            assert!(piece.contains('。'));
        }
        let kept: usize = c.iter().map(|p| char_len(p)).sum();
        assert!(kept as f64 >= char_len(&text) as f64 * 0.95);
    }

    #[test]
    fn test_order_and_determinism() {
        let text: String = (0..80).map(|i| format!("Sentence number {i}! ")).collect();
        let a = chunk(&text, 100);
        let b = chunk(&text, 100);
        assert_eq!(a, b);
        let joined = a.join(" ");
        let mut last = 0;
        for i in 0..80 {
            let needle = format!("number {i}!");
            let pos = joined.find(&needle).expect("sentence lost");
            assert!(pos >= last, "sentence {i} out of order");
            last = pos;
        }
    }

    #[test]
    fn test_byte_mode() {
        let chunker = TextChunker::with_unit(600, LengthUnit::Utf8Bytes);
        // 200 CJK chars = exactly 600 bytes.
        let exact = "这".repeat(200);
        assert_eq!(chunker.chunk(&exact), vec![exact.clone()]);

        let long = format!("这{}一个超长句子。", "是".repeat(700));
        let c = chunker.chunk(&long);
        assert!(c.len() >= 2);
        for piece in &c {
            assert!(piece.len() <= 600, "{} bytes", piece.len());
        }
        assert_eq!(c[0].len(), 600);
    }

    #[test]
    fn test_byte_mode_mixed_scripts_never_split_code_points() {
        let chunker = TextChunker::with_unit(7, LengthUnit::Utf8Bytes);
        let c = chunker.chunk("ab中文cd字符ef");
        assert!(c.iter().all(|p| p.len() <= 7), "got: {:?}", c);
        assert_eq!(c.concat(), "ab中文cd字符ef");
    }

    #[test]
    fn test_stats() {
        let text = "这是测试文本。".repeat(100);
        let stats = ChunkStats::compute(&text, &TextChunker::with_unit(600, LengthUnit::Utf8Bytes));
        assert_eq!(stats.total_chars, 700);
        assert_eq!(stats.total_bytes, 2100);
        assert!(stats.chunk_count >= 4);
        assert!(stats.max_chunk_bytes <= 600);
        let rendered = stats.to_string();
        assert!(rendered.contains("chunks:"), "got: {rendered}");
        assert!(rendered.contains("bytes"), "got: {rendered}");
    }

    #[test]
    #[should_panic(expected = "max_len must be positive")]
    fn test_zero_limit_panics() {
        TextChunker::new(0);
    }
}
