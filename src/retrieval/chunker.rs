// Recursive character splitting: try paragraph, line, then word boundaries,
// falling back to single characters, and merge pieces back up to the
// chunk size with a trailing overlap.

use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Page boundary in text exported from paginated documents.
pub const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based page number the chunk came from.
    pub page: usize,
    pub text: String,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split a source document into pages, then each page into chunks.
pub fn chunk_document(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    text.split(PAGE_BREAK)
        .enumerate()
        .flat_map(|(index, page)| {
            split_text(page, chunk_size, chunk_overlap)
                .into_iter()
                .map(move |text| Chunk {
                    page: index + 1,
                    text,
                })
        })
        .collect()
}

/// Split text into chunks of at most `chunk_size` characters where possible.
/// An unbreakable run longer than the size is kept whole only when no
/// separator (including the per-character fallback) applies.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let (index, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map_or((separators.len(), ""), |(i, sep)| (i, *sep));
    let remaining = separators.get(index + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    };

    let mut chunks = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) < chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            chunks.extend(merge_splits(&fitting, separator, chunk_size, chunk_overlap));
            fitting.clear();
        }
        if remaining.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, chunk_size, chunk_overlap));
        }
    }
    if !fitting.is_empty() {
        chunks.extend(merge_splits(&fitting, separator, chunk_size, chunk_overlap));
    }
    chunks
}

fn join_trimmed(parts: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn merge_splits(
    splits: &[&str],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut docs = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &split in splits {
        let len = char_len(split);
        let joiner = if current.is_empty() { 0 } else { separator_len };
        if total + len + joiner > chunk_size && !current.is_empty() {
            docs.extend(join_trimmed(&current, separator));
            // keep a tail of at most `chunk_overlap` characters
            while total > chunk_overlap
                || (total > 0
                    && total + len + if current.is_empty() { 0 } else { separator_len }
                        > chunk_size)
            {
                let Some(first) = current.front() else {
                    break;
                };
                let removed = char_len(first) + if current.len() > 1 { separator_len } else { 0 };
                current.pop_front();
                total = total.saturating_sub(removed);
            }
        }
        if !current.is_empty() {
            total += separator_len;
        }
        current.push_back(split);
        total += len;
    }

    docs.extend(join_trimmed(&current, separator));
    docs
}
