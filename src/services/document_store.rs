//! Session-scoped document store used for context injection.
//!
//! Uploaded documents (plain text, Markdown, CSV, PDF and DOCX) are
//! reduced to text and split into overlapping chunks. At chat time
//! the chunks that share the most terms with the user's question are
//! assembled into a context block.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::core::config::DocumentConfig;

const CHUNK_CHARS: usize = 3000;
const CHUNK_OVERLAP: usize = 300;
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "txt", "md", "csv"];

/// Upload rejection reasons. Each maps to a stable API error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("unsupported file type")]
    UnsupportedFileType,

    #[error("file exceeds the upload size limit")]
    FileTooLarge,

    #[error("document contains no text")]
    EmptyDocument,

    /// The file has an allowed extension but its contents could not be parsed
    #[error("document could not be read: {0}")]
    Unreadable(String),
}

impl DocumentError {
    pub const fn code(&self) -> &'static str {
        match self {
            DocumentError::UnsupportedFileType => "unsupported_file_type",
            DocumentError::FileTooLarge => "file_too_large",
            DocumentError::EmptyDocument => "empty_document",
            DocumentError::Unreadable(_) => "upload_failed",
        }
    }
}

/// A processed upload.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub file_id: String,
    pub session_id: String,
    pub filename: String,
    pub content_type: String,
    pub text: String,
    pub chunks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Source of retrieved document context for chat requests.
pub trait DocumentStore: Send + Sync {
    /// Validate, extract and index an upload for a session.
    fn add_document(
        &self,
        session_id: &str,
        filename: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<Arc<StoredDocument>, DocumentError>;

    /// Remove a document. Returns false when it does not exist or belongs
    /// to another session.
    fn remove_document(&self, session_id: &str, file_id: &str) -> bool;

    /// Documents of a session, oldest first.
    fn list_session_documents(&self, session_id: &str) -> Vec<Arc<StoredDocument>>;

    /// Context block for `query`, or an empty string when there is nothing
    /// to inject. `file_ids` narrows the selection to those documents.
    fn build_context(&self, session_id: &str, file_ids: Option<&[String]>, query: &str) -> String;
}

/// Process-local [`DocumentStore`]. Contents are lost on restart.
pub struct InMemoryDocumentStore {
    documents: DashMap<String, Arc<StoredDocument>>,
    max_upload_bytes: usize,
    max_context_chars: usize,
    max_chunks: usize,
}

impl InMemoryDocumentStore {
    pub fn new(config: &DocumentConfig) -> Self {
        Self {
            documents: DashMap::new(),
            max_upload_bytes: config.max_upload_mb.saturating_mul(1024 * 1024),
            max_context_chars: config.max_context_chars,
            max_chunks: config.max_chunks,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new(&DocumentConfig::default())
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn add_document(
        &self,
        session_id: &str,
        filename: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<Arc<StoredDocument>, DocumentError> {
        let extension = file_extension(filename).ok_or(DocumentError::UnsupportedFileType)?;
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DocumentError::UnsupportedFileType);
        }
        if content.len() > self.max_upload_bytes {
            return Err(DocumentError::FileTooLarge);
        }

        let text = extract_text(&extension, content).map_err(|e| {
            tracing::warn!(filename = %filename, error = %e, "Text extraction failed");
            e
        })?;
        if text.is_empty() {
            return Err(DocumentError::EmptyDocument);
        }

        let chunks = chunk_text(&text, CHUNK_CHARS, CHUNK_OVERLAP);
        let document = Arc::new(StoredDocument {
            file_id: uuid::Uuid::new_v4().simple().to_string(),
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            text,
            chunks,
            created_at: Utc::now(),
        });

        tracing::info!(
            session_id = %session_id,
            file_id = %document.file_id,
            filename = %filename,
            chunks = document.chunks.len(),
            "Document stored"
        );
        self.documents
            .insert(document.file_id.clone(), document.clone());
        Ok(document)
    }

    fn remove_document(&self, session_id: &str, file_id: &str) -> bool {
        self.documents
            .remove_if(file_id, |_, doc| doc.session_id == session_id)
            .is_some()
    }

    fn list_session_documents(&self, session_id: &str) -> Vec<Arc<StoredDocument>> {
        let mut docs: Vec<_> = self
            .documents
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        docs
    }

    fn build_context(&self, session_id: &str, file_ids: Option<&[String]>, query: &str) -> String {
        let selected: Vec<Arc<StoredDocument>> = match file_ids {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .filter_map(|id| self.documents.get(id).map(|d| d.value().clone()))
                .filter(|doc| doc.session_id == session_id)
                .collect(),
            _ => self.list_session_documents(session_id),
        };
        if selected.is_empty() {
            return String::new();
        }

        let terms = &query_terms(query);
        let mut scored: Vec<(usize, &str, &str)> = selected
            .iter()
            .flat_map(|doc| {
                doc.chunks.iter().map(move |chunk| {
                    (score_chunk(chunk, terms), doc.filename.as_str(), chunk.as_str())
                })
            })
            .collect();
        // Stable: equal scores keep document and chunk order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let mut parts = Vec::new();
        let mut consumed = 0;
        for (_, filename, chunk) in scored {
            if parts.len() >= self.max_chunks {
                break;
            }
            let len = chunk.chars().count();
            if consumed + len > self.max_context_chars {
                continue;
            }
            parts.push(format!("[Source: {}]\n{}", filename, chunk));
            consumed += len;
        }
        parts.join("\n\n")
    }
}

fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

// ============================================================================
// Text extraction
// ============================================================================

/// Reduce an upload to trimmed plain text according to its extension.
fn extract_text(extension: &str, content: &[u8]) -> Result<String, DocumentError> {
    let text = match extension {
        "pdf" => extract_pdf(content)?,
        "docx" => extract_docx(content)?,
        "csv" => extract_csv(content)?,
        _ => String::from_utf8_lossy(content).into_owned(),
    };
    Ok(text.trim().to_string())
}

fn extract_pdf(content: &[u8]) -> Result<String, DocumentError> {
    // The parser panics on some malformed inputs
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(content))
        .map_err(|_| DocumentError::Unreadable("malformed PDF".to_string()))?;
    extracted.map_err(|e| DocumentError::Unreadable(format!("PDF: {}", e)))
}

/// Paragraph texts joined by newlines. Tables, headers and footers are
/// not part of the paragraph flow and are skipped.
fn extract_docx(content: &[u8]) -> Result<String, DocumentError> {
    use docx_rs::{DocumentChild, ParagraphChild, RunChild};

    let docx = docx_rs::read_docx(content)
        .map_err(|e| DocumentError::Unreadable(format!("DOCX: {}", e)))?;

    let paragraphs: Vec<String> = docx
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph),
            _ => None,
        })
        .map(|paragraph| {
            let mut text = String::new();
            for child in &paragraph.children {
                if let ParagraphChild::Run(run) = child {
                    for run_child in &run.children {
                        match run_child {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push('\t'),
                            _ => {}
                        }
                    }
                }
            }
            text
        })
        .collect();
    Ok(paragraphs.join("\n"))
}

/// Rows rendered as trimmed cells joined by ` | `. Quoted cells may span
/// lines and contain commas.
fn extract_csv(content: &[u8]) -> Result<String, DocumentError> {
    let raw = String::from_utf8_lossy(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DocumentError::Unreadable(format!("CSV: {}", e)))?;
        rows.push(record.iter().map(str::trim).collect::<Vec<_>>().join(" | "));
    }
    Ok(rows.join("\n"))
}

/// Drop blank lines, right-trim the rest, then cut into windows of
/// `size` characters overlapping by `overlap`.
fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let compact = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let chars: Vec<char> = compact.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step_back = overlap.min(size.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = end - step_back;
    }
    chunks
}

fn query_terms(query: &str) -> HashSet<String> {
    query
        .split_whitespace()
        .filter(|term| term.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn score_chunk(chunk: &str, terms: &HashSet<String>) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let lower = chunk.to_lowercase();
    terms.iter().filter(|term| lower.contains(term.as_str())).count()
}
