//! Frame sources for live scanning.

use crate::classify::looks_like_image;
use crate::error::{Error, Result};
use crate::util::sha256_hex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use time::OffsetDateTime;
use tracing::{debug, info};

/// One encoded still image pulled from a capture source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub captured_at: OffsetDateTime,
}

impl Frame {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let (width, height) = image_size(&data).unwrap_or((0, 0));
        Self {
            data,
            width,
            height,
            captured_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A camera-like producer of frames.
///
/// `latest_frame` is a non-blocking poll: it returns `None` when nothing new
/// arrived since the previous call.
pub trait CaptureSource: Send {
    fn id(&self) -> String;

    fn acquire(&mut self) -> Result<()>;

    fn latest_frame(&mut self) -> Option<Frame>;

    fn release(&mut self);
}

/// Treats the newest image in a directory as the current camera frame.
///
/// An external grabber is expected to keep writing snapshots into the
/// directory. A frame counts as new when the newest image's content changes.
pub struct DirectoryCapture {
    dir: PathBuf,
    acquired: bool,
    last_fingerprint: Option<String>,
}

impl DirectoryCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            acquired: false,
            last_fingerprint: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn newest_image(&self) -> Option<(PathBuf, Vec<u8>)> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let path = entry.path();
            let newer = match &newest {
                None => true,
                Some((t, p)) => modified > *t || (modified == *t && path > *p),
            };
            if newer {
                newest = Some((modified, path));
            }
        }
        let (_, path) = newest?;
        let bytes = std::fs::read(&path).ok()?;
        looks_like_image(&bytes).then_some((path, bytes))
    }
}

impl CaptureSource for DirectoryCapture {
    fn id(&self) -> String {
        self.dir.display().to_string()
    }

    fn acquire(&mut self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(Error::SourceUnavailable {
                source_id: self.id(),
                reason: "not a directory".into(),
            });
        }
        std::fs::read_dir(&self.dir).map_err(|e| Error::SourceUnavailable {
            source_id: self.id(),
            reason: e.to_string(),
        })?;
        self.acquired = true;
        self.last_fingerprint = None;
        info!(source = %self.id(), "capture acquired");
        Ok(())
    }

    fn latest_frame(&mut self) -> Option<Frame> {
        if !self.acquired {
            return None;
        }
        let (path, bytes) = self.newest_image()?;
        let fingerprint = sha256_hex(&bytes);
        if self.last_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return None;
        }
        debug!(path = %path.display(), "new frame");
        self.last_fingerprint = Some(fingerprint);
        Some(Frame::new(bytes))
    }

    fn release(&mut self) {
        if self.acquired {
            self.acquired = false;
            info!(source = %self.id(), "capture released");
        }
    }
}

/// Pixel size read from a PNG, GIF, BMP or JPEG header.
pub fn image_size(data: &[u8]) -> Option<(u32, u32)> {
    let be32 = |b: &[u8]| u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
    let le16 = |b: &[u8]| u16::from_le_bytes([b[0], b[1]]) as u32;
    let be16 = |b: &[u8]| u16::from_be_bytes([b[0], b[1]]) as u32;

    if data.len() >= 24 && data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some((be32(&data[16..20]), be32(&data[20..24])));
    }
    if data.len() >= 10 && (data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        return Some((le16(&data[6..8]), le16(&data[8..10])));
    }
    if data.len() >= 26 && data.starts_with(b"BM") {
        let w = i32::from_le_bytes([data[18], data[19], data[20], data[21]]);
        let h = i32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        return Some((w.unsigned_abs(), h.unsigned_abs()));
    }
    if data.starts_with(b"\xff\xd8") {
        let mut i = 2;
        while i + 9 < data.len() {
            if data[i] != 0xff {
                i += 1;
                continue;
            }
            let marker = data[i + 1];
            // SOF0..SOF15 minus DHT, JPG and DAC.
            if (0xc0..=0xcf).contains(&marker) && ![0xc4, 0xc8, 0xcc].contains(&marker) {
                return Some((be16(&data[i + 7..i + 9]), be16(&data[i + 5..i + 7])));
            }
            if marker == 0xff || marker == 0xd8 || (0xd0..=0xd7).contains(&marker) {
                i += if marker == 0xff { 1 } else { 2 };
                continue;
            }
            i += 2 + be16(&data[i + 2..i + 4]) as usize;
        }
    }
    None
}

/// File extension matching an encoded image's signature.
pub fn image_extension(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "png"
    } else if data.starts_with(b"\xff\xd8") {
        "jpg"
    } else if data.starts_with(b"GIF8") {
        "gif"
    } else if data.starts_with(b"BM") {
        "bmp"
    } else if data.len() >= 12 && &data[8..12] == b"WEBP" {
        "webp"
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        "tiff"
    } else {
        "bin"
    }
}
