use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const STAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second][subsecond digits:3]");

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).map_err(|source| Error::WriteFailed {
        path: p.to_path_buf(),
        source,
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

pub fn now_rfc3339() -> String {
    rfc3339(OffsetDateTime::now_utc())
}

pub fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// `YYYY-MM-DD hh:mm:ss`, as shown in reports.
pub fn display_time(t: OffsetDateTime) -> String {
    t.format(DISPLAY_FORMAT)
        .unwrap_or_else(|_| "1970-01-01 00:00:00".to_string())
}

/// Filesystem-safe stamp, e.g. `20240131T235959123`.
pub fn file_stamp(t: OffsetDateTime) -> String {
    t.format(STAMP_FORMAT)
        .unwrap_or_else(|_| "19700101T000000000".to_string())
}
