use crate::job::{Intent, SourceRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Bytes inspected when an extension is not conclusive.
const SNIFF_BYTES: usize = 8 * 1024;

pub const UNDETERMINED_NOTE: &str = "uncertain type, defaulting to generate";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub source: SourceRef,
    pub intent: Intent,
    pub note: Option<String>,
}

fn image_ext() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^.*\.(?:png|jpg|jpeg|bmp|gif|tiff?|webp)$").expect("static regex")
    })
}

fn text_ext() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^.*\.(?:txt|json|rfa)$").expect("static regex"))
}

pub fn classify(source: &SourceRef) -> Classification {
    let (intent, note) = match source {
        SourceRef::Text(_) => (Intent::Generate, None),
        SourceRef::File(path) => classify_path(path),
    };
    debug!(source = %source.identifier(), ?intent, "classified input");
    Classification {
        source: source.clone(),
        intent,
        note,
    }
}

fn classify_path(path: &Path) -> (Intent, Option<String>) {
    let name = path.to_string_lossy();
    if image_ext().is_match(&name) {
        return (Intent::Decode, None);
    }
    if text_ext().is_match(&name) {
        return (Intent::Generate, None);
    }

    match sniff(path) {
        Some(head) if looks_like_image(&head) => (
            Intent::Decode,
            Some("recognised image signature".to_string()),
        ),
        Some(head) if looks_like_text(&head) => (Intent::Generate, None),
        _ => (Intent::Undetermined, Some(UNDETERMINED_NOTE.to_string())),
    }
}

fn sniff(path: &Path) -> Option<Vec<u8>> {
    let file = std::fs::File::open(path).ok()?;
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    file.take(SNIFF_BYTES as u64).read_to_end(&mut head).ok()?;
    Some(head)
}

pub fn looks_like_image(head: &[u8]) -> bool {
    const SIGNATURES: &[&[u8]] = &[
        b"\x89PNG\r\n\x1a\n",
        b"\xff\xd8\xff",
        b"GIF87a",
        b"GIF89a",
        b"II*\0",
        b"MM\0*",
    ];
    if SIGNATURES.iter().any(|sig| head.starts_with(sig)) {
        return true;
    }
    // BMP: "BM" then two reserved zero words at offset 6.
    if head.len() >= 14 && head.starts_with(b"BM") && head[6..10] == [0, 0, 0, 0] {
        return true;
    }
    head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP"
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // A multi-byte sequence may be cut at the sniff boundary.
        Err(e) => e.error_len().is_none() && head.len() == SNIFF_BYTES,
    }
}
