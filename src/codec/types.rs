use super::Symbology;
use crate::error::CodecFailure;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecDiag {
    pub program: String,
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// A successful decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeHit {
    pub format: Symbology,
    pub content: Vec<u8>,
}

impl DecodeHit {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Request sent to an external codec process on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CodecRequest {
    Doctor,
    Generate {
        text: String,
        format: Symbology,
        width: u32,
        height: u32,
        margin: u32,
    },
    Decode {
        image_b64: String,
        formats: Vec<Symbology>,
        try_all_formats: bool,
    },
}

/// Reply read from an external codec process on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecReply {
    pub ok: bool,
    #[serde(default)]
    pub image_b64: Option<String>,
    #[serde(default)]
    pub format: Option<Symbology>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error_kind: Option<CodecFailure>,
    #[serde(default)]
    pub error: Option<String>,
}
