//! Sentence-aware document segmentation.
//!
//! [`Segmenter`] cuts normalized text into overlapping chunks that never
//! split a sentence. Chunk text is always a byte-identical slice of the
//! normalized document, so overlapping regions of adjacent chunks match
//! exactly and `start_offset..end_offset` can be used to locate a chunk.
//!
//! The section-aware mode recognises LaTeX `\section{}`, `\subsection{}`,
//! `\subsubsection{}` and Markdown `#` headings and segments each region on
//! its own, tagging chunks with the heading title.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::document::Chunk;
use crate::error::{RagError, Result};

/// Default lower bound for chunk length in characters.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 100;

static STYLE_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:textbf|textit|emph|texttt)\{([^{}]*)\}")
        .expect("unreachable error: invalid style markup pattern")
});
static REFERENCE_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:cite|ref|label)\{[^{}]*\}")
        .expect("unreachable error: invalid reference markup pattern")
});
static HORIZONTAL_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t]+").expect("unreachable error: invalid whitespace pattern")
});
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n{3,}").expect("unreachable error: invalid blank line pattern")
});
// Terminal punctuation, optional closing quotes/brackets, then whitespace or end of text.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?]+["'”’)\]]*(?:\s+|$)"#)
        .expect("unreachable error: invalid sentence pattern")
});
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\\(?:sub){0,2}section\*?\{([^{}]*)\}|^#{1,6}[ ]+([^\n]+?)[ ]*$")
        .expect("unreachable error: invalid heading pattern")
});

/// A strategy for splitting document text into chunks.
///
/// Implementations produce [`Chunk`]s with text and offsets but no
/// embeddings. Embeddings are attached later by the [`Indexer`](crate::Indexer).
pub trait Chunker: Send + Sync {
    /// Split `text` belonging to `source_id` into chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for blank text and
    /// [`RagError::NoSegmentableContent`] when no sentence boundary exists.
    fn chunk(&self, text: &str, source_id: &str) -> Result<Vec<Chunk>>;
}

/// Normalize document text before segmentation.
///
/// Strips cosmetic LaTeX markup (`\textbf{x}` becomes `x`, `\cite{..}` is
/// dropped), collapses runs of spaces and tabs, collapses three or more
/// newlines to a paragraph break and trims the result.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = STYLE_MARKUP.replace_all(&text, "$1");
    let text = REFERENCE_MARKUP.replace_all(&text, "");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Segment `text` with the default chunk floor.
///
/// Shorthand for `Segmenter::new(target_size, overlap_size).segment(..)`.
pub fn segment(
    text: &str,
    source_id: &str,
    target_size: usize,
    overlap_size: usize,
) -> Result<Vec<Chunk>> {
    Segmenter::new(target_size, overlap_size).segment(text, source_id)
}

/// Splits documents into sentence-aligned chunks with backward overlap.
///
/// Sentences accumulate until the next one would push the chunk past
/// `chunk_size` characters. The following chunk is seeded with the longest
/// run of trailing sentences that fits in `chunk_overlap` characters. A
/// chunk shorter than `min_chunk_size` keeps growing instead of being
/// emitted, and a short final remainder is merged into the previous chunk.
///
/// # Example
///
/// ```rust,ignore
/// use archivist_rag::Segmenter;
///
/// let segmenter = Segmenter::new(2000, 200);
/// let chunks = segmenter.segment(&paper_text, "attention-is-all-you-need")?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmenter {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
    respect_sections: bool,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// A sentence as byte and character ranges into the normalized text.
#[derive(Debug, Clone, Copy)]
struct Sentence {
    start: usize,
    end: usize,
    start_char: usize,
    end_char: usize,
}

impl Segmenter {
    /// Create a segmenter with the given target and overlap sizes.
    ///
    /// The floor defaults to [`DEFAULT_MIN_CHUNK_SIZE`], capped at
    /// `chunk_size`. Section awareness is off.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE.min(chunk_size),
            respect_sections: false,
        }
    }

    /// Build a segmenter from configuration.
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_chunk_size: config.min_chunk_size,
            respect_sections: config.respect_sections,
        }
    }

    /// Set the chunk floor in characters.
    pub fn with_min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    /// Make [`Chunker::chunk`] use section-aware segmentation.
    pub fn with_sections(mut self, enabled: bool) -> Self {
        self.respect_sections = enabled;
        self
    }

    /// Segment a whole document, ignoring headings.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] when the text is blank after
    /// normalization and [`RagError::NoSegmentableContent`] when it
    /// contains no terminal punctuation.
    pub fn segment(&self, text: &str, source_id: &str) -> Result<Vec<Chunk>> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(RagError::EmptyInput(format!("document '{source_id}' has no text")));
        }
        self.segment_range(&normalized, 0, normalized.len(), source_id, None, 0)
    }

    /// Segment a document region by region, following its headings.
    ///
    /// Chunk indices are numbered across the whole document and each chunk
    /// carries its heading title in `section`. Text before the first heading
    /// forms an untitled region. Regions that cannot be segmented are
    /// skipped; when the document has no headings, or no region yields a
    /// chunk, the whole text is segmented as with [`Segmenter::segment`].
    ///
    /// # Errors
    ///
    /// Same as [`Segmenter::segment`].
    pub fn segment_sections(&self, text: &str, source_id: &str) -> Result<Vec<Chunk>> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Err(RagError::EmptyInput(format!("document '{source_id}' has no text")));
        }

        let regions = split_regions(&normalized);
        if regions.iter().all(|r| r.title.is_none()) {
            return self.segment_range(&normalized, 0, normalized.len(), source_id, None, 0);
        }

        let mut chunks = Vec::new();
        for region in &regions {
            let title = region.title.as_deref();
            match self.segment_range(
                &normalized,
                region.start,
                region.end,
                source_id,
                title,
                chunks.len(),
            ) {
                Ok(region_chunks) => chunks.extend(region_chunks),
                Err(e) => {
                    debug!(
                        source_id,
                        section = ?title,
                        error = %e,
                        "skipping unsegmentable section"
                    );
                }
            }
        }

        if chunks.is_empty() {
            debug!(source_id, "no section produced chunks, segmenting whole document");
            return self.segment_range(&normalized, 0, normalized.len(), source_id, None, 0);
        }
        Ok(chunks)
    }

    /// Segment `normalized[start..end]`, reporting offsets into `normalized`.
    fn segment_range(
        &self,
        normalized: &str,
        start: usize,
        end: usize,
        source_id: &str,
        section: Option<&str>,
        first_index: usize,
    ) -> Result<Vec<Chunk>> {
        let body = &normalized[start..end];
        if body.trim().is_empty() {
            return Err(RagError::EmptyInput(format!("document '{source_id}' has no text")));
        }
        if !SENTENCE_END.is_match(body) {
            return Err(RagError::NoSegmentableContent { source_id: source_id.to_string() });
        }

        let sentences = split_sentences(body);
        if sentences.is_empty() {
            return Err(RagError::NoSegmentableContent { source_id: source_id.to_string() });
        }
        let groups = self.group(&sentences);

        let chunks = groups
            .into_iter()
            .enumerate()
            .map(|(i, (first, last))| {
                let chunk_start = start + sentences[first].start;
                let chunk_end = start + sentences[last].end;
                Chunk {
                    text: normalized[chunk_start..chunk_end].to_string(),
                    index: first_index + i,
                    source_id: source_id.to_string(),
                    section: section.map(str::to_string),
                    start_offset: chunk_start,
                    end_offset: chunk_end,
                    metadata: Default::default(),
                }
            })
            .collect();
        Ok(chunks)
    }

    /// Group sentences into chunks, returning inclusive sentence index ranges.
    fn group(&self, sentences: &[Sentence]) -> Vec<(usize, usize)> {
        let span =
            |first: usize, last: usize| sentences[last].end_char - sentences[first].start_char;

        let mut groups: Vec<(usize, usize)> = Vec::new();
        let mut buf_start = 0;

        for i in 1..sentences.len() {
            // Buffer is sentences[buf_start..i], never empty here.
            if span(buf_start, i) <= self.chunk_size || span(buf_start, i - 1) < self.min_chunk_size
            {
                continue;
            }
            groups.push((buf_start, i - 1));

            // Longest trailing run that fits the overlap and leaves room for
            // sentence i, excluding the emitted chunk's first sentence.
            let mut seed = i;
            while seed > buf_start + 1
                && span(seed - 1, i - 1) <= self.chunk_overlap
                && span(seed - 1, i) <= self.chunk_size
            {
                seed -= 1;
            }
            buf_start = seed;
        }

        let last = sentences.len() - 1;
        match groups.last_mut() {
            Some(previous) if span(buf_start, last) < self.min_chunk_size => previous.1 = last,
            _ => groups.push((buf_start, last)),
        }
        groups
    }
}

impl Chunker for Segmenter {
    fn chunk(&self, text: &str, source_id: &str) -> Result<Vec<Chunk>> {
        if self.respect_sections {
            self.segment_sections(text, source_id)
        } else {
            self.segment(text, source_id)
        }
    }
}

/// Split text into sentence spans. Trailing text without terminal
/// punctuation forms a final sentence.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut spans = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let end = m.start() + m.as_str().trim_end().len();
        push_span(text, &mut spans, start, end);
        start = m.end();
    }
    if start < text.len() {
        let tail = text[start..].trim_end();
        push_span(text, &mut spans, start, start + tail.len());
    }

    let mut sentences = Vec::with_capacity(spans.len());
    let mut byte_pos = 0;
    let mut char_pos = 0;
    for (start, end) in spans {
        char_pos += text[byte_pos..start].chars().count();
        let start_char = char_pos;
        char_pos += text[start..end].chars().count();
        byte_pos = end;
        sentences.push(Sentence { start, end, start_char, end_char: char_pos });
    }
    sentences
}

fn push_span(text: &str, spans: &mut Vec<(usize, usize)>, start: usize, end: usize) {
    let slice = &text[start..end];
    let trimmed = slice.trim_start();
    if !trimmed.is_empty() {
        spans.push((start + (slice.len() - trimmed.len()), end));
    }
}

/// A heading-delimited region of the normalized text.
#[derive(Debug)]
struct Region {
    title: Option<String>,
    start: usize,
    end: usize,
}

fn split_regions(text: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut title: Option<String> = None;
    let mut body_start = 0;

    for caps in HEADING.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        regions.push(Region { title: title.take(), start: body_start, end: whole.start() });
        title = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().trim().to_string());
        body_start = whole.end();
    }
    regions.push(Region { title, start: body_start, end: text.len() });

    regions.retain(|r| !text[r.start..r.end].trim().is_empty());
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_markup_and_whitespace() {
        let text =
            "  We use \\textbf{attention}\\cite{vaswani}.\t\tIt   works.\n\n\n\nNext \\emph{part}.  ";
        assert_eq!(normalize(text), "We use attention. It works.\n\nNext part.");
    }

    #[test]
    fn sentences_include_closing_quotes() {
        let text = "He said \"stop.\" Then left! Why? tail";
        let spans: Vec<&str> =
            split_sentences(text).iter().map(|s| &text[s.start..s.end]).collect();
        assert_eq!(spans, vec!["He said \"stop.\"", "Then left!", "Why?", "tail"]);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let text = "Accuracy rose to 3.5 points. Done.";
        assert_eq!(split_sentences(text).len(), 2);
    }

    #[test]
    fn regions_follow_latex_and_markdown_headings() {
        let text = "Preamble.\n\\section{Intro}\nFirst.\n## Method\nSecond.";
        let regions = split_regions(text);
        let titles: Vec<Option<&str>> = regions.iter().map(|r| r.title.as_deref()).collect();
        assert_eq!(titles, vec![None, Some("Intro"), Some("Method")]);
        assert_eq!(text[regions[1].start..regions[1].end].trim(), "First.");
    }
}
