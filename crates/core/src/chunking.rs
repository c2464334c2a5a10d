use crate::error::IngestError;
use crate::models::{IngestionOptions, TextChunk};

/// Split points tried in order before falling back to a hard character cut.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping character windows.
///
/// Every chunk is a verbatim slice of the input. Chunk `n + 1` starts
/// `overlap` characters before chunk `n` ends, so the span
/// `[offset_n, offset_n+1)` of each chunk plus the whole final chunk
/// reassemble the input exactly.
pub fn chunk_text(
    source_document: &str,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<TextChunk>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    if chars.is_empty() {
        return Ok(chunks);
    }

    let mut start = 0usize;
    loop {
        let end = if chars.len() - start <= config.chunk_size {
            chars.len()
        } else {
            find_cut(&chars, start, config)
        };

        chunks.push(TextChunk {
            text: chars[start..end].iter().collect(),
            source_document: source_document.to_string(),
            sequence_index: chunks.len() as u64,
            offset: start,
        });

        if end == chars.len() {
            break;
        }
        start = end - config.overlap;
    }

    Ok(chunks)
}

/// End (exclusive) of the chunk starting at `start`. Always `> start + overlap`.
fn find_cut(chars: &[char], start: usize, config: ChunkingConfig) -> usize {
    let window_end = start + config.chunk_size;
    let min_cut = start + config.overlap;

    for separator in SEPARATORS {
        let pattern: Vec<char> = separator.chars().collect();
        if pattern.len() > config.chunk_size {
            continue;
        }

        let mut position = window_end - pattern.len();
        loop {
            let cut = position + pattern.len();
            if cut <= min_cut {
                break;
            }
            if chars[position..cut] == pattern[..] {
                return cut;
            }
            if position == start {
                break;
            }
            position -= 1;
        }
    }

    window_end
}
