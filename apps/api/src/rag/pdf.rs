use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RagConfig;
use crate::llm_client::ChatModel;
use crate::rag::prompts::{PART_NOTE, STRUCTURE_SYSTEM, STRUCTURE_TEMPLATE};
use crate::rag::RawDocument;

const CHUNK_PAUSE: Duration = Duration::from_millis(500);
const MIN_OVERLAP_WORDS: usize = 6;
const MAX_OVERLAP_WORDS: usize = 50;

static EXTRA_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Turns PDF files into raw documents, optionally restructuring the
/// extracted text with the chat model.
pub struct PdfProcessor {
    chat: Option<Arc<dyn ChatModel>>,
    max_chunk_size: usize,
    chunk_overlap: usize,
    enable_chunking: bool,
}

impl PdfProcessor {
    /// `chat` is only used for restructuring, and only when
    /// `structure_with_llm` is set; otherwise text is stored as extracted.
    pub fn new(chat: Option<Arc<dyn ChatModel>>, rag: &RagConfig) -> Self {
        Self {
            chat: chat.filter(|_| rag.structure_with_llm),
            max_chunk_size: rag.structure_max_chunk_size.max(1),
            chunk_overlap: rag.structure_chunk_overlap,
            enable_chunking: rag.structure_enable_chunking,
        }
    }

    /// `Ok(None)` when the file yields no text.
    pub async fn process(&self, path: &Path) -> anyhow::Result<Option<RawDocument>> {
        info!("Processing PDF: {}", path.display());
        let file_size = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("PDF file not found: {}", path.display()))?
            .len();

        let owned = path.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
            .await
            .context("PDF extraction task failed")?
            .map_err(|e| anyhow::anyhow!("Cannot extract text from {}: {e}", path.display()))?;

        if raw.trim().is_empty() {
            warn!("No text extracted from {}", path.display());
            return Ok(None);
        }

        let content = self.structure(&raw).await;
        let source = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        let document = self.build_document(&source, content, file_size);

        info!("Processed {}: {} characters", path.display(), document.content.chars().count());
        Ok(Some(document))
    }

    fn build_document(&self, source: &Path, content: String, file_size: u64) -> RawDocument {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        RawDocument {
            id: Uuid::new_v4().simple().to_string(),
            metadata: json!({
                "source": source.display().to_string(),
                "title": stem,
                "file_name": file_name,
                "file_size": file_size,
                "file_type": "pdf",
                "source_type": "local_pdf",
                "created_at": Utc::now().to_rfc3339(),
                "processed_with_llm": self.chat.is_some(),
                "character_count": content.chars().count(),
                "word_count": content.split_whitespace().count(),
            }),
            content,
        }
    }

    /// Restructured text, or the input unchanged when no model is configured.
    pub async fn structure(&self, text: &str) -> String {
        let Some(chat) = &self.chat else {
            return text.to_string();
        };

        if text.chars().count() <= self.max_chunk_size {
            return structure_one(chat.as_ref(), text, None).await;
        }

        if !self.enable_chunking {
            warn!("Text too long, truncating to {} chars (chunking disabled)", self.max_chunk_size);
            let truncated: String = text.chars().take(self.max_chunk_size).collect();
            return structure_one(chat.as_ref(), &truncated, None).await;
        }

        let chunks = overlapping_chunks(text, self.max_chunk_size, self.chunk_overlap);
        info!("Large document, restructuring in {} chunks", chunks.len());

        let mut processed = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("Restructuring chunk {}/{} ({} chars)", i + 1, chunks.len(), chunk.chars().count());
            processed.push(structure_one(chat.as_ref(), chunk, Some(i + 1)).await);
            if i + 1 < chunks.len() {
                tokio::time::sleep(CHUNK_PAUSE).await;
            }
        }
        merge_chunks(&processed)
    }
}

/// Falls back to the input text when the model call fails.
async fn structure_one(chat: &dyn ChatModel, text: &str, part: Option<usize>) -> String {
    let prompt = STRUCTURE_TEMPLATE
        .replace(
            "{chunk_info}",
            &part.map(|n| format!(" (chunk {n})")).unwrap_or_default(),
        )
        .replace("{part_note}", if part.is_some() { PART_NOTE } else { "" })
        .replace("{text}", text);

    match chat.complete(STRUCTURE_SYSTEM, &prompt).await {
        Ok(structured) => structured,
        Err(e) => {
            warn!("Restructuring failed, keeping original text: {e}");
            text.to_string()
        }
    }
}

fn rfind(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

/// Splits `text` into windows of `size` chars that reach back `overlap`
/// chars into the previous window. Each window ends at the last paragraph
/// break past 70%, else sentence end past 80%, else space past 90%.
pub fn overlapping_chunks(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < n {
        let end = start + size;
        let from = if start > 0 { start.saturating_sub(overlap) } else { start };

        let piece: &[char] = if end >= n {
            &chars[from..]
        } else {
            let window = &chars[from..end];
            let len = window.len() as f64;

            let (piece, next) = if let Some(p) = rfind(window, &['\n', '\n']).filter(|&p| p as f64 > len * 0.7) {
                (&window[..p], from + p + 2)
            } else if let Some(p) = rfind(window, &['.', ' ']).filter(|&p| p as f64 > len * 0.8) {
                (&window[..p + 1], from + p + 2)
            } else if let Some(p) = rfind(window, &[' ']).filter(|&p| p as f64 > len * 0.9) {
                (&window[..p], from + p + 1)
            } else {
                (window, end)
            };

            start = if next > start { next } else { end };
            piece
        };

        let piece: String = piece.iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(piece.trim().to_string());
        }
        if end >= n {
            break;
        }
    }
    chunks
}

/// Drops the words `current` repeats from the end of `previous`.
fn remove_overlap(previous: &str, current: &str) -> String {
    let prev: Vec<&str> = previous.split_whitespace().collect();
    let curr: Vec<&str> = current.split_whitespace().collect();
    if prev.len() < 10 || curr.len() < 10 {
        return current.to_string();
    }

    let largest = MAX_OVERLAP_WORDS.min(prev.len()).min(curr.len());
    for size in (MIN_OVERLAP_WORDS..=largest).rev() {
        let tail = prev[prev.len() - size..].join(" ");
        let head = curr[..size].join(" ");
        if tail.to_lowercase() == head.to_lowercase() {
            return curr[size..].join(" ");
        }
    }
    current.to_string()
}

pub fn merge_chunks(chunks: &[String]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let clean = chunk.trim();
        match parts.last() {
            None => parts.push(clean.to_string()),
            Some(previous) => {
                let rest = remove_overlap(previous, clean);
                if !rest.trim().is_empty() {
                    parts.push(rest);
                }
            }
        }
    }
    let merged = parts.join("\n\n");
    EXTRA_BLANK_LINES.replace_all(&merged, "\n\n").trim().to_string()
}

/// Every `*.pdf` under `root`, recursively, sorted.
pub async fn find_pdfs(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("Cannot read directory {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
