use serde::Serialize;
use std::fs;
use std::path::Path;

pub const PREVIEW_CHARS: usize = 1000;

/// Parsed document content
pub struct ParsedDocument {
    pub content: String,
    pub file_type: String,
}

/// What the local file tool shows for a parsed file.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DocumentReport {
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    pub char_count: usize,
    pub preview: String,
}

/// Parse a document file into plain text
pub fn parse_file(path: &Path) -> Result<ParsedDocument, String> {
    let ext = extension(path);

    match ext.as_str() {
        "txt" => {
            let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
            Ok(ParsedDocument {
                content,
                file_type: "txt".into(),
            })
        }
        "md" | "markdown" => {
            let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
            Ok(ParsedDocument {
                content,
                file_type: "md".into(),
            })
        }
        "pdf" => {
            let bytes = fs::read(path).map_err(|e| e.to_string())?;
            let content = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| format!("PDF parse error: {}", e))?;
            Ok(ParsedDocument {
                content,
                file_type: "pdf".into(),
            })
        }
        _ => Err(format!("Unsupported file type: .{}", ext)),
    }
}

pub fn report(path: &Path) -> Result<DocumentReport, String> {
    let size = fs::metadata(path).map_err(|e| e.to_string())?.len();
    let parsed = parse_file(path)?;
    let content = parsed.content.trim();

    Ok(DocumentReport {
        file_name: file_name(path),
        file_type: parsed.file_type,
        size,
        char_count: content.chars().count(),
        preview: preview(content, PREVIEW_CHARS),
    })
}

/// First `limit` characters, with `...` appended when the text was cut.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

pub fn mime_for(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => "application/pdf",
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
