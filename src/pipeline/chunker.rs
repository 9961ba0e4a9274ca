// TALKREEL Chunker - Paragraph Batching
// Copyright (c) 2026 Xing_The_Creator | TALKREEL
//
// Splits narration into paragraphs and groups them into fixed-size
// batches. Batch numbers assigned here follow every artifact downstream.

use serde::{Deserialize, Serialize};

/// A bounded group of consecutive paragraphs processed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based, assigned once and never renumbered.
    pub batch_number: usize,
    pub paragraphs: Vec<String>,
    pub text: String,
    /// Filled in by the rewrite stage.
    pub rewritten_text: Option<String>,
    pub char_count: usize,
}

impl Batch {
    /// Text to narrate: the rewrite if one exists, otherwise the raw batch.
    pub fn narration(&self) -> &str {
        self.rewritten_text.as_deref().unwrap_or(&self.text)
    }
}

/// Non-empty, trimmed lines in their original order.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Group paragraphs into batches of at most `batch_size`. A size of zero is
/// treated as one.
pub fn chunk(text: &str, batch_size: usize) -> Vec<Batch> {
    let size = batch_size.max(1);
    split_into_paragraphs(text)
        .chunks(size)
        .enumerate()
        .map(|(idx, group)| {
            let text = group.join("\n\n");
            Batch {
                batch_number: idx + 1,
                paragraphs: group.to_vec(),
                char_count: text.chars().count(),
                text,
                rewritten_text: None,
            }
        })
        .collect()
}
