//! Attachment kind classification by MIME type and file extension.

use parley_core::types::AttachmentKind;

/// Fallback MIME type for unknown content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extensions treated as text regardless of the reported MIME type.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "tsv", "json", "yaml", "yml", "toml", "xml", "html", "htm",
    "css", "js", "ts", "tsx", "jsx", "rs", "py", "rb", "go", "java", "c", "h", "cpp", "hpp", "sh",
    "log", "ini", "cfg", "sql",
];

/// Classify a file by MIME prefix, then by extension.
///
/// Precedence: `image/*`, `video/*`, `audio/*`, then `text/*` (or a
/// structured-text MIME, or a text-like extension), else `Data`. A missing MIME
/// is guessed from the file name first.
pub fn classify(mime_type: Option<&str>, name: &str) -> AttachmentKind {
    let mime = resolve_mime_type(mime_type, name);
    if mime.starts_with("image/") {
        AttachmentKind::Image
    } else if mime.starts_with("video/") {
        AttachmentKind::Video
    } else if mime.starts_with("audio/") {
        AttachmentKind::Audio
    } else if mime.starts_with("text/") || is_structured_text(&mime) || has_text_extension(name)
    {
        AttachmentKind::Text
    } else {
        AttachmentKind::Data
    }
}

/// The MIME type recorded on an attachment.
///
/// A non-empty reported type wins (parameters stripped, lowercased).
/// Otherwise text-like extensions resolve to a `text/*` type and anything
/// else is guessed from the extension, falling back to `application/octet-stream`.
pub fn resolve_mime_type(mime_type: Option<&str>, name: &str) -> String {
    if let Some(essence) = mime_type.map(mime_essence).filter(|m| !m.is_empty()) {
        return essence;
    }

    let guessed = mime_guess::from_path(name).first_raw();
    if has_text_extension(name) {
        return match guessed {
            Some(m) if m.starts_with("text/") => m.to_string(),
            _ => "text/plain".to_string(),
        };
    }
    guessed.unwrap_or(OCTET_STREAM).to_string()
}

fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_structured_text(mime: &str) -> bool {
    matches!(mime, "application/json" | "application/xml")
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

fn has_text_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
