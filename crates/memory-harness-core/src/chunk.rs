//! Sliding-window text chunker and content fingerprints.
//!
//! Splits knowledge-file text into overlapping fixed-size character
//! windows, the unit stored in the vector index. Each file also gets a
//! SHA-256 fingerprint of its full text; the indexer compares it against
//! the fingerprint stored with chunk 0 to decide whether a file changed.
//!
//! # Algorithm
//!
//! 1. Remove carriage returns (`\r\n` → `\n`).
//! 2. Take a window of `window` characters starting at 0.
//! 3. Advance the start by `window - overlap` characters.
//! 4. Stop once a window reaches the end of the text.
//! 5. Drop windows that are empty after trimming.
//!
//! Windows are measured in characters (Unicode scalar values), never
//! bytes, so multi-byte text is never split inside a code point.
//!
//! # Example
//!
//! ```rust
//! use memory_harness_core::chunk::ChunkParams;
//!
//! let params = ChunkParams::new(10, 2).unwrap();
//! let windows = params.split("abcdefghijklmnop");
//! assert_eq!(windows, vec!["abcdefghij", "ijklmnop"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::models::{Chunk, KnowledgeFile};

/// Default window size in characters (~200 tokens).
pub const DEFAULT_WINDOW: usize = 800;

/// Default overlap between consecutive windows, in characters.
pub const DEFAULT_OVERLAP: usize = 100;

/// Validated chunking parameters.
///
/// Construction rejects a zero window and an overlap that is not strictly
/// smaller than the window, so [`split`](ChunkParams::split) always makes
/// forward progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    window: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(window: usize, overlap: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if overlap >= window {
            return Err(ConfigError::OverlapTooLarge { window, overlap });
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive window starts. Always `>= 1`.
    pub fn step(&self) -> usize {
        self.window - self.overlap
    }

    /// Split `text` into overlapping windows.
    ///
    /// Returns an empty vector for empty or whitespace-only text. Every
    /// returned window is at most `window` characters long and non-empty
    /// after trimming; only the last one may be shorter than `window`.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.replace('\r', "");
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char start, plus the end of the string.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.window).min(char_count);
            let piece = &text[bounds[start]..bounds[end]];
            if !piece.trim().is_empty() {
                windows.push(piece.to_string());
            }
            if end == char_count {
                break;
            }
            start += self.step();
        }

        windows
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// SHA-256 of the full text, lowercase hex.
///
/// Used only to detect change between indexing runs.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunk a knowledge file, attaching path, tier, ordinals and fingerprint.
///
/// Ordinals are contiguous from 0 in the order the windows appear.
pub fn chunk_file(file: &KnowledgeFile, params: &ChunkParams) -> Vec<Chunk> {
    let path = file.key();
    params
        .split(&file.text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            path: path.clone(),
            tier: file.tier,
            chunk_index: i as i64,
            text,
            fingerprint: file.fingerprint.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tier;
    use std::path::PathBuf;

    /// Rebuild the source from windows by dropping each later window's overlap.
    fn reconstruct(windows: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, w) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(w);
            } else {
                out.extend(w.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_rejects_zero_window() {
        assert_eq!(ChunkParams::new(0, 0), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn test_rejects_overlap_equal_to_window() {
        assert!(matches!(
            ChunkParams::new(100, 100),
            Err(ConfigError::OverlapTooLarge { .. })
        ));
        assert!(ChunkParams::new(100, 250).is_err());
    }

    #[test]
    fn test_step_is_positive() {
        let p = ChunkParams::new(5, 4).unwrap();
        assert_eq!(p.step(), 1);
    }

    #[test]
    fn test_short_text_single_window() {
        let p = ChunkParams::default();
        let w = p.split("We decided to use PostgreSQL for storage.");
        assert_eq!(w, vec!["We decided to use PostgreSQL for storage."]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let p = ChunkParams::default();
        assert!(p.split("").is_empty());
        assert!(p.split("   \n\r\n\t ").is_empty());
    }

    #[test]
    fn test_windows_bounded_and_non_empty() {
        let text = (0..200)
            .map(|i| format!("line {} of the memory file", i))
            .collect::<Vec<_>>()
            .join("\n");
        let p = ChunkParams::new(120, 30).unwrap();
        let windows = p.split(&text);
        assert!(windows.len() > 1);
        for w in &windows {
            assert!(w.chars().count() <= 120);
            assert!(!w.trim().is_empty());
        }
    }

    #[test]
    fn test_reconstruction_with_overlap_removed() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        for (window, overlap) in [(50, 10), (64, 0), (800, 100), (7, 6)] {
            let p = ChunkParams::new(window, overlap).unwrap();
            let windows = p.split(&text);
            assert_eq!(
                reconstruct(&windows, overlap),
                text,
                "window={} overlap={}",
                window,
                overlap
            );
        }
    }

    #[test]
    fn test_crlf_normalized() {
        let p = ChunkParams::default();
        let windows = p.split("first\r\nsecond\r\n");
        assert_eq!(windows, vec!["first\nsecond\n"]);
    }

    #[test]
    fn test_multibyte_chars_not_split() {
        let text = "┌──────────────────┐\n│ héllo wörld      │\n└──────────────────┘";
        let p = ChunkParams::new(7, 2).unwrap();
        let windows = p.split(text);
        for w in &windows {
            assert!(w.chars().count() <= 7);
        }
        assert_eq!(reconstruct(&windows, 2), text);
    }

    #[test]
    fn test_stops_when_window_reaches_end() {
        let p = ChunkParams::new(10, 2).unwrap();
        // 10 chars exactly: a single window, no redundant tail.
        assert_eq!(p.split("0123456789"), vec!["0123456789"]);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a = fingerprint("We decided to use PostgreSQL for storage.");
        let b = fingerprint("We decided to use PostgreSQL for storage.");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_single_byte_change() {
        let base = "We decided to use PostgreSQL for storage.";
        let original = fingerprint(base);
        for i in 0..base.len() {
            let mut bytes = base.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
            let changed = String::from_utf8(bytes).unwrap();
            assert_ne!(fingerprint(&changed), original, "collision at byte {}", i);
        }
    }

    #[test]
    fn test_chunk_file_attaches_metadata() {
        let text = "a".repeat(25);
        let file = KnowledgeFile {
            path: PathBuf::from("/mem/project/tasks.md"),
            tier: Tier::Project,
            fingerprint: fingerprint(&text),
            text,
            modified: chrono::Utc::now(),
        };
        let chunks = chunk_file(&file, &ChunkParams::new(10, 0).unwrap());
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.path, "/mem/project/tasks.md");
            assert_eq!(c.tier, Tier::Project);
            assert_eq!(c.fingerprint, file.fingerprint);
        }
    }
}
