use crate::codec::Symbology;
use crate::units::{Dimensions, SizeUnit};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub sizing: Sizing,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub codec: Codec,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
    pub dump_effective_config: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            dump_effective_config: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
        }
    }
}

/// Persisted output size. `resolution` is pixels per inch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Sizing {
    pub unit: SizeUnit,
    pub width: f64,
    pub height: f64,
    pub resolution: f64,
}
impl Default for Sizing {
    fn default() -> Self {
        Self {
            unit: SizeUnit::Pixel,
            width: 300.0,
            height: 300.0,
            resolution: 300.0,
        }
    }
}
impl Sizing {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
            unit: self.unit,
            resolution: self.resolution,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    pub format: Symbology,
    pub use_base64: bool,
    pub workers: usize,
    pub failure_display_cap: usize,
    pub read_only_formats: BTreeSet<Symbology>,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            format: Symbology::QRCode,
            use_base64: true,
            workers: 4,
            failure_display_cap: 10,
            read_only_formats: Symbology::default_read_only(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Codec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_seconds: u64,
    pub doctor_timeout_seconds: u64,
    pub margin: u32,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Codec {
    fn default() -> Self {
        Self {
            program: "scanline-codec".into(),
            args: Vec::new(),
            timeout_seconds: 30,
            doctor_timeout_seconds: 10,
            margin: 1,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionMode {
    Immediate,
    Window,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scan {
    pub interval_ms: u64,
    pub decode_timeout_ms: u64,
    pub use_base64: bool,
    /// Empty means every known symbology.
    pub formats: BTreeSet<Symbology>,
    pub suppression: SuppressionMode,
    pub suppression_window_ms: u64,
    pub debug_frames_dir: String,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            decode_timeout_ms: 2_000,
            use_base64: false,
            formats: BTreeSet::new(),
            suppression: SuppressionMode::Immediate,
            suppression_window_ms: 3_000,
            debug_frames_dir: "".into(),
        }
    }
}
impl Scan {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms.max(1))
    }

    pub fn initial_filter(&self) -> BTreeSet<Symbology> {
        if self.formats.is_empty() {
            Symbology::all()
        } else {
            self.formats.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Export {
    pub include_images: bool,
    pub title: String,
}
impl Default for Export {
    fn default() -> Self {
        Self {
            include_images: true,
            title: "Scan results".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
