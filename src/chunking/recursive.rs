//! Recursive character splitter.
//!
//! Tries separators from coarsest to finest:
//! 1. Paragraphs (blank lines)
//! 2. Lines
//! 3. Words
//! 4. Characters
//!
//! Pieces under the budget are merged back together so that each chunk is as
//! close to `chunk_size` characters as possible, and consecutive chunks share
//! up to `chunk_overlap` characters of trailing context.

use crate::error::{Error, Result};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Split("chunk size must be greater than zero".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Split(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks of at most `chunk_size` characters.
    ///
    /// A single word longer than the budget is split at character level.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text; "" always matches.
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = *sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }

        chunks
    }

    /// Greedily join pieces up to the budget, carrying the tail of each chunk
    /// into the next one as overlap.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if !window.is_empty() && total + len + sep_len > self.chunk_size {
                push_chunk(&mut chunks, &window, separator);

                // Drop from the front until the remainder fits as overlap.
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + len + sep_len > self.chunk_size)
                {
                    let removed = char_len(window[0]) + if window.len() > 1 { sep_len } else { 0 };
                    total -= removed;
                    window.remove(0);
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push(piece);
        }

        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &[&str], separator: &str) {
    let chunk = window.join(separator);
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
