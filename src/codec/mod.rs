pub mod process;
pub mod types;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use types::{CodecDiag, DecodeHit};

/// Barcode generation and decoding capability.
///
/// Implementations must be safe to call from several worker threads at once.
pub trait Codec: Send + Sync {
    fn doctor(&self) -> Result<CodecDiag>;

    fn generate(
        &self,
        payload: &[u8],
        format: Symbology,
        width_px: u32,
        height_px: u32,
        use_base64: bool,
    ) -> Result<Vec<u8>>;

    /// Decode `image`, restricted to `formats`. An empty set means any format.
    fn decode(&self, image: &[u8], formats: &BTreeSet<Symbology>, use_base64: bool)
        -> Result<DecodeHit>;
}

impl<C: Codec + ?Sized> Codec for std::sync::Arc<C> {
    fn doctor(&self) -> Result<CodecDiag> {
        (**self).doctor()
    }

    fn generate(
        &self,
        payload: &[u8],
        format: Symbology,
        width_px: u32,
        height_px: u32,
        use_base64: bool,
    ) -> Result<Vec<u8>> {
        (**self).generate(payload, format, width_px, height_px, use_base64)
    }

    fn decode(
        &self,
        image: &[u8],
        formats: &BTreeSet<Symbology>,
        use_base64: bool,
    ) -> Result<DecodeHit> {
        (**self).decode(image, formats, use_base64)
    }
}

macro_rules! symbologies {
    ($($variant:ident),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum Symbology {
            $($variant),+
        }

        impl Symbology {
            pub const ALL: &'static [Symbology] = &[$(Symbology::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $(Symbology::$variant => stringify!($variant)),+
                }
            }
        }
    };
}

symbologies!(
    QRCode,
    MicroQRCode,
    RMQRCode,
    Aztec,
    DataMatrix,
    PDF417,
    MaxiCode,
    Code128,
    Code39,
    Code93,
    Codabar,
    EAN8,
    EAN13,
    UPCA,
    UPCE,
    ITF,
    DataBar,
    DataBarExpanded,
    DataBarLimited,
    DXFilmEdge,
);

impl Symbology {
    /// Formats the usual codecs can read but not write.
    pub fn default_read_only() -> BTreeSet<Symbology> {
        [
            Symbology::MaxiCode,
            Symbology::MicroQRCode,
            Symbology::RMQRCode,
            Symbology::DataBar,
            Symbology::DataBarExpanded,
            Symbology::DataBarLimited,
            Symbology::DXFilmEdge,
        ]
        .into_iter()
        .collect()
    }

    pub fn all() -> BTreeSet<Symbology> {
        Self::ALL.iter().copied().collect()
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Symbology {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| crate::error::Error::InvalidConfig(format!("unknown symbology: {wanted}")))
    }
}
