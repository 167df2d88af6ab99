use std::path::Path;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// The generic fallback type. Never memoized: a later file with the same
/// extension deserves a fresh attempt at something more specific.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Sniffing never looks past this many bytes.
const SNIFF_LEN: usize = 512;

// Extensions every static tree serves, resolved without touching mime_guess
// or file contents.
static SEED_TYPES: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        (".js", "text/javascript; charset=utf-8"),
        (".css", "text/css; charset=utf-8"),
        (".html", "text/html; charset=utf-8"),
        (".svg", "image/svg+xml"),
        (".ico", "image/x-icon"),
    ]
    .into_iter()
    .collect()
});

/// Extension → content-type map, keyed with the leading dot and the case the
/// request used. Starts from the seed table and grows by memoizing registry
/// and sniffing results for the process lifetime.
///
/// Memoization is keyed by extension, not by path: two files sharing an
/// extension but holding different content get whichever type was resolved
/// first. The extension is assumed to predict the type for files from the
/// same tree.
pub struct TypeMap {
    types: RwLock<FxHashMap<String, String>>,
}

impl TypeMap {
    pub fn new() -> Self {
        let types = SEED_TYPES
            .iter()
            .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
            .collect();
        Self {
            types: RwLock::new(types),
        }
    }

    /// Resolve a content type for `path` holding `content`. Never fails.
    ///
    /// Order, short-circuiting on the first hit: memoized extension map,
    /// registry lookup, content sniffing. Non-generic results for a non-empty
    /// extension are memoized for every later file with that extension.
    pub fn resolve(&self, path: &Path, content: &[u8]) -> String {
        let ext = extension_of(path);
        if ext.is_empty() {
            // No hint to key on; sniff every time.
            return sniff(content).to_string();
        }

        if let Some(ty) = self.get(&ext) {
            return ty;
        }

        let mut ty = registry_lookup(&ext);
        if ty.is_empty() || ty == OCTET_STREAM {
            // A registry answer of the generic type is no answer; the bytes
            // may still identify themselves.
            ty = sniff(content).to_string();
        }
        if ty != OCTET_STREAM {
            self.memoize(&ext, &ty);
        }
        ty
    }

    pub fn get(&self, ext: &str) -> Option<String> {
        self.types.read().get(ext).cloned()
    }

    // Concurrent resolvers may race here; same key means same value, so last
    // writer wins without ceremony.
    fn memoize(&self, ext: &str, ty: &str) {
        self.types.write().insert(ext.to_string(), ty.to_string());
    }
}

impl Default for TypeMap {
    fn default() -> Self {
        Self::new()
    }
}

/// File extension including the leading dot, case preserved. Empty string
/// when the path has none.
pub fn extension_of(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!(".{ext}"),
        _ => String::new(),
    }
}

fn registry_lookup(ext: &str) -> String {
    mime_guess::from_ext(ext.trim_start_matches('.'))
        .first_raw()
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Signature-based content detection over at most the first 512 bytes.
/// Always returns a usable type: unmatched content falls back to plain text
/// when it scans clean, `application/octet-stream` otherwise.
pub fn sniff(content: &[u8]) -> &'static str {
    let data = &content[..content.len().min(SNIFF_LEN)];

    if let Some(ty) = sniff_text_bom(data) {
        return ty;
    }
    if let Some(ty) = sniff_markup(data) {
        return ty;
    }
    if let Some(ty) = sniff_exact(data) {
        return ty;
    }
    if data.iter().all(|&b| !is_binary_byte(b)) {
        return "text/plain; charset=utf-8";
    }
    OCTET_STREAM
}

fn sniff_text_bom(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some("text/plain; charset=utf-8")
    } else if data.starts_with(&[0xFE, 0xFF]) {
        Some("text/plain; charset=utf-16be")
    } else if data.starts_with(&[0xFF, 0xFE]) {
        Some("text/plain; charset=utf-16le")
    } else {
        None
    }
}

const HTML_TAGS: &[&str] = &[
    "<!DOCTYPE HTML",
    "<HTML",
    "<HEAD",
    "<SCRIPT",
    "<IFRAME",
    "<H1",
    "<DIV",
    "<FONT",
    "<TABLE",
    "<A",
    "<STYLE",
    "<TITLE",
    "<B",
    "<BODY",
    "<BR",
    "<P",
    "<!--",
];

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    let first = data
        .iter()
        .position(|&b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))?;
    let data = &data[first..];

    for tag in HTML_TAGS {
        if matches_tag(data, tag.as_bytes()) {
            return Some("text/html; charset=utf-8");
        }
    }
    if data.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    None
}

// Case-insensitive tag match; the tag must terminate with a space or '>'
// so "<b>" doesn't claim "<base64...".
fn matches_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    if tag == b"<!--" {
        return true;
    }
    matches!(data.get(tag.len()), Some(&b' ') | Some(&b'>'))
}

fn sniff_exact(data: &[u8]) -> Option<&'static str> {
    const SIGS: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"%!PS-Adobe-", "application/postscript"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"BM", "image/bmp"),
        (b"OggS", "application/ogg"),
        (b"ID3", "audio/mpeg"),
        (b"\x1a\x45\xdf\xa3", "video/webm"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
        (b"Rar!\x1a\x07\x00", "application/x-rar-compressed"),
        (b"\x00\x01\x00\x00", "font/ttf"),
        (b"OTTO", "font/otf"),
        (b"ttcf", "font/collection"),
        (b"wOFF", "font/woff"),
        (b"wOF2", "font/woff2"),
        (b"\x00asm", "application/wasm"),
    ];

    for &(sig, ty) in SIGS {
        if data.starts_with(sig) {
            return Some(ty);
        }
    }

    // Container formats keyed past the first bytes.
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        return match &data[8..12] {
            b"WEBP" => Some("image/webp"),
            b"WAVE" => Some("audio/wave"),
            b"AVI " => Some("video/avi"),
            _ => None,
        };
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    None
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
