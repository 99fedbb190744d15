use crate::{
    capture::DirectoryCapture,
    classify::classify,
    codec::{Codec, Symbology, process::ProcessCodec},
    config::Config,
    export::{batch_records, export, scan_records, sink_for_path},
    job::{Action, ConversionJob, SourceRef},
    pipeline::{BatchSettings, Pipeline},
    report::{Detail, FinalReport},
    save::persist,
    scan::{ScanAggregator, ScanSettings},
    units::{Dimensions, SizeUnit},
    util::{display_time, ensure_dir},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{Receiver, bounded, never};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scanline")]
#[command(about = "Batch barcode generation/decoding and live scan logging")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./scanline.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write the effective config next to the outputs.
    #[arg(long)]
    pub dump_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Use the classifier's verdict per input.
    Auto,
    Generate,
    Decode,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    Classify {
        #[arg(long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,
    },
    Convert {
        #[arg(long, num_args = 1..)]
        input: Vec<PathBuf>,
        /// Encode this text directly instead of (or besides) files.
        #[arg(long)]
        text: Option<String>,
        #[arg(long, value_enum, default_value_t = Mode::Auto)]
        mode: Mode,
        /// Symbology for generated images, e.g. QRCode or Code128.
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Size unit: px or cm.
        #[arg(long)]
        unit: Option<String>,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
        /// Pixels per inch, used with --unit cm.
        #[arg(long)]
        resolution: Option<f64>,
        #[arg(long)]
        no_base64: bool,
        /// List every failed item instead of the first few.
        #[arg(long)]
        detailed: bool,
        /// Also export the per-job table (.html, .xlsx or .json).
        #[arg(long)]
        export: Option<PathBuf>,
    },
    Scan {
        /// Directory a frame grabber writes snapshots into.
        #[arg(long)]
        source: PathBuf,
        /// Stop after this many seconds; otherwise run until Ctrl+C.
        #[arg(long)]
        seconds: Option<u64>,
        /// Comma-separated symbologies to decode.
        #[arg(long, value_delimiter = ',')]
        formats: Vec<String>,
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    cfg.global.dump_effective_config |= args.dump_config;

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Classify { input } => classify_inputs(&cfg, &input),
        Command::Convert {
            input,
            text,
            mode,
            format,
            out_dir,
            unit,
            width,
            height,
            resolution,
            no_base64,
            detailed,
            export,
        } => {
            let mut dims = cfg.sizing.dimensions();
            if let Some(u) = unit {
                dims.unit = u.parse::<SizeUnit>()?;
            }
            dims.width = width.unwrap_or(dims.width);
            dims.height = height.unwrap_or(dims.height);
            dims.resolution = resolution.unwrap_or(dims.resolution);
            let opts = ConvertOpts {
                inputs: input,
                text,
                mode,
                format: match format {
                    Some(f) => f.parse()?,
                    None => cfg.batch.format,
                },
                out_dir: out_dir.unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir)),
                dimensions: dims,
                use_base64: cfg.batch.use_base64 && !no_base64,
                detailed,
                export,
            };
            convert(&cfg, opts)
        }
        Command::Scan {
            source,
            seconds,
            formats,
            export,
        } => {
            let filter = if formats.is_empty() {
                cfg.scan.initial_filter()
            } else {
                formats
                    .iter()
                    .map(|f| f.parse::<Symbology>())
                    .collect::<crate::error::Result<BTreeSet<_>>>()?
            };
            scan(&cfg, &source, filter, seconds.map(Duration::from_secs), export.as_deref())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["scanline.toml", "scanline.example.toml"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("scanline.log"))
}

/// Fires once on Ctrl+C.
fn interrupt_channel() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    }) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }
    rx
}

fn dump_config(cfg: &Config, dir: &Path) -> Result<()> {
    if !cfg.global.dump_effective_config {
        return Ok(());
    }
    ensure_dir(dir)?;
    let raw = toml::to_string(cfg).context("serializing config")?;
    std::fs::write(dir.join("effective-config.toml"), raw)?;
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let codec = ProcessCodec::new(cfg)?;
    let diag = codec.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!("codec is not usable: {}", diag.error.unwrap_or_default()));
    }
    Ok(())
}

fn classify_inputs(cfg: &Config, inputs: &[PathBuf]) -> Result<()> {
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        validate_input(cfg, input)?;
        out.push(classify(&SourceRef::File(input.clone())));
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

struct ConvertOpts {
    inputs: Vec<PathBuf>,
    text: Option<String>,
    mode: Mode,
    format: Symbology,
    out_dir: PathBuf,
    dimensions: Dimensions,
    use_base64: bool,
    detailed: bool,
    export: Option<PathBuf>,
}

fn build_jobs(cfg: &Config, opts: &ConvertOpts) -> Result<Vec<ConversionJob>> {
    let mut jobs = Vec::with_capacity(opts.inputs.len() + 1);
    for input in &opts.inputs {
        validate_input(cfg, input)?;
        let verdict = classify(&SourceRef::File(input.clone()));
        let mut job = ConversionJob::from_file(input, verdict.intent);
        if let Some(note) = verdict.note {
            job.annotate(note);
        }
        match opts.mode {
            Mode::Auto => {}
            Mode::Generate => job.override_intent(Action::Generate),
            Mode::Decode => job.override_intent(Action::Decode),
        }
        jobs.push(job);
    }
    if let Some(text) = &opts.text {
        jobs.push(ConversionJob::from_text(text.clone()));
    }
    Ok(jobs
        .into_iter()
        .map(|j| {
            j.with_format(opts.format)
                .with_dimensions(opts.dimensions)
                .with_base64(opts.use_base64)
        })
        .collect())
}

fn convert(cfg: &Config, opts: ConvertOpts) -> Result<()> {
    let jobs = build_jobs(cfg, &opts)?;
    let codec = ProcessCodec::new(cfg)?;
    let started = Instant::now();

    let handle = Pipeline::new(codec, BatchSettings::from_config(cfg)).spawn(jobs);
    let interrupt = interrupt_channel();
    loop {
        crossbeam_channel::select! {
            recv(handle.progress()) -> msg => match msg {
                Ok(p) => info!("[{}/{}] {} {:?}", p.completed, p.total, p.identifier, p.status),
                Err(_) => break,
            },
            recv(interrupt) -> _ => {
                warn!("interrupted; cancelling jobs that have not started");
                handle.cancel();
            }
        }
    }
    let result = handle.join()?;

    let saved = persist(&result.jobs, &opts.out_dir)?;
    dump_config(cfg, &opts.out_dir)?;
    let report = FinalReport::merge(&result.summary, &saved, &opts.out_dir);
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "convert finished");

    if let Some(dest) = &opts.export {
        let records = batch_records(&result.summary)?;
        let sink = sink_for_path(dest, &cfg.export)?;
        export(sink.as_ref(), &records, dest)?;
    }

    if cfg.global.print_summary {
        let detail = if opts.detailed {
            Detail::Full
        } else {
            Detail::Short {
                cap: cfg.batch.failure_display_cap,
            }
        };
        println!("{}", report.render(detail));
    }
    Ok(())
}

fn scan(
    cfg: &Config,
    source: &Path,
    filter: BTreeSet<Symbology>,
    limit: Option<Duration>,
    export_to: Option<&Path>,
) -> Result<()> {
    let codec: Arc<dyn Codec> = Arc::new(ProcessCodec::new(cfg)?);
    let mut aggregator = ScanAggregator::new(codec, ScanSettings::from_config(&cfg.scan));
    let events = aggregator.subscribe();
    aggregator.start(Box::new(DirectoryCapture::new(source)), filter)?;

    let interrupt = interrupt_channel();
    let deadline = limit.map(crossbeam_channel::after).unwrap_or_else(never);
    loop {
        crossbeam_channel::select! {
            recv(events) -> ev => match ev {
                Ok(ev) => println!("{}\t{}\t{}", display_time(ev.timestamp), ev.format, ev.content),
                Err(_) => break,
            },
            recv(interrupt) -> _ => break,
            recv(deadline) -> _ => break,
        }
    }
    aggregator.stop();

    let log = aggregator.snapshot();
    info!(events = log.len(), "scan session closed");
    dump_config(cfg, Path::new(&cfg.paths.out_dir))?;

    if let Some(dest) = export_to {
        let records = scan_records(&log)?;
        let sink = sink_for_path(dest, &cfg.export)?;
        export(sink.as_ref(), &records, dest)?;
        println!("exported {} record(s) to {}", records.len(), dest.display());
    }
    Ok(())
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }
    if !input.is_file() {
        return Err(anyhow!("input is not a readable file: {}", input.display()));
    }
    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
