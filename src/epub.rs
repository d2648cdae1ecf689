mod archive;
mod book;
mod fetch;
mod loader;
pub mod templates;

pub use archive::{Blob, serialize};
pub use book::{
    Book, Chapter, ContentEncoding, Creator, Document, DocumentSlot, FileEntry, Resource,
    new_guid,
};
pub use fetch::{FetchRequest, FetchResponse, HttpFetcher, ResourceFetchDelegate};
pub use loader::{DEFAULT_TIMEOUT, LoadOptions, ResourceLoader};

/// Media type of the finished package.
pub const EPUB_MIME_TYPE: &str = "application/epub+zip";

/// Media type of XHTML chapters.
pub const XHTML_MIME_TYPE: &str = "application/xhtml+xml";

/// Media type of the OPF package document.
pub const OPF_MIME_TYPE: &str = "application/oebps-package+xml";

/// Media type of the NCX navigation document.
pub const NCX_MIME_TYPE: &str = "application/x-dtbncx+xml";

/// Map a file extension to its media type.
pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_lowercase().as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "html" | "htm" => "text/html",
        "xhtml" => XHTML_MIME_TYPE,
        "epub" => EPUB_MIME_TYPE,
        "css" => "text/css",
        "js" => "application/javascript",
        "ncx" => NCX_MIME_TYPE,
        "opf" => OPF_MIME_TYPE,
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Normalize a declared media type.
///
/// Bare extensions (`"png"`) are mapped through the table, anything else
/// passes through unchanged.
pub fn normalize_mime_type(declared: &str) -> String {
    mime_type_for_extension(declared)
        .map(String::from)
        .unwrap_or_else(|| declared.to_string())
}

/// Extension of the last path segment, if any.
pub fn extension_of(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Normalize a package-relative path.
///
/// Empty, `.` and `..` segments are dropped so the result always stays below
/// `OEBPS/`. Returns `None` when nothing is left.
pub fn clean_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Media type derived from a file name, or the bare extension when unknown.
pub fn mime_type_for_name(name: &str) -> Option<String> {
    extension_of(name).map(normalize_mime_type)
}
