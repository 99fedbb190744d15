#![allow(dead_code)]

use scanline::codec::{Codec, CodecDiag, DecodeHit, Symbology};
use scanline::error::{CodecFailure, Error, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Images starting with this prefix decode to the rest of their bytes.
pub const BARCODE_PREFIX: &[u8] = b"BARCODE:";

/// In-memory codec that counts calls.
#[derive(Default)]
pub struct FakeCodec {
    pub generate_calls: AtomicUsize,
    pub decode_calls: AtomicUsize,
    pub delay: Duration,
}

impl FakeCodec {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn generates(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn decodes(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

impl Codec for FakeCodec {
    fn doctor(&self) -> Result<CodecDiag> {
        Ok(CodecDiag {
            program: "fake".into(),
            version: Some("1".into()),
            ok: true,
            error: None,
        })
    }

    fn generate(
        &self,
        payload: &[u8],
        format: Symbology,
        width_px: u32,
        height_px: u32,
        _use_base64: bool,
    ) -> Result<Vec<u8>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if payload.is_empty() {
            return Err(Error::codec(CodecFailure::InvalidPayload, "empty"));
        }
        if payload.starts_with(b"bad") {
            return Err(Error::codec(CodecFailure::InternalError, "refused"));
        }
        let mut out = format!("{format}:{width_px}x{height_px}:").into_bytes();
        out.extend_from_slice(payload);
        Ok(out)
    }

    fn decode(
        &self,
        image: &[u8],
        formats: &BTreeSet<Symbology>,
        _use_base64: bool,
    ) -> Result<DecodeHit> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if image.is_empty() {
            return Err(CodecFailure::InvalidImage.into());
        }
        if !formats.is_empty() && !formats.contains(&Symbology::QRCode) {
            return Err(CodecFailure::NotRecognized.into());
        }
        match image.strip_prefix(BARCODE_PREFIX) {
            Some(rest) => Ok(DecodeHit {
                format: Symbology::QRCode,
                content: rest.to_vec(),
            }),
            None => Err(CodecFailure::NotRecognized.into()),
        }
    }
}
