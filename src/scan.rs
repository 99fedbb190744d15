//! Live scanning: sample a capture source, decode frames, keep a session log.

use crate::{
    capture::{CaptureSource, Frame, image_extension},
    codec::{Codec, DecodeHit, Symbology},
    config,
    error::{Error, Result},
    util::{ensure_dir, file_stamp},
};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, tick, unbounded};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, trace, warn};

/// One decode hit. Never changed after it is recorded.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub timestamp: OffsetDateTime,
    pub format: Symbology,
    pub content: String,
    /// Encoded source frame; only expanded when exported.
    pub raw_image: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl ScanEvent {
    pub fn key(&self) -> (Symbology, &str) {
        (self.format, &self.content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Drop a hit equal to the most recent entry.
    Immediate,
    /// Drop a hit equal to the most recent entry only while it is younger
    /// than the window.
    Window(Duration),
}

impl Suppression {
    pub fn from_config(cfg: &config::Scan) -> Self {
        match cfg.suppression {
            config::SuppressionMode::Immediate => Suppression::Immediate,
            config::SuppressionMode::Window => {
                Suppression::Window(Duration::from_millis(cfg.suppression_window_ms))
            }
        }
    }
}

#[derive(Debug)]
pub struct ScanSession {
    events: Vec<ScanEvent>,
    filter: BTreeSet<Symbology>,
    suppression: Suppression,
}

impl ScanSession {
    pub fn new(filter: BTreeSet<Symbology>, suppression: Suppression) -> Self {
        Self {
            events: Vec::new(),
            filter,
            suppression,
        }
    }

    pub fn events(&self) -> &[ScanEvent] {
        &self.events
    }

    pub fn filter(&self) -> &BTreeSet<Symbology> {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn is_repeat(&self, hit: &DecodeHit, content: &str, at: OffsetDateTime) -> bool {
        let Some(last) = self.events.last() else {
            return false;
        };
        if last.key() != (hit.format, content) {
            return false;
        }
        match self.suppression {
            Suppression::Immediate => true,
            Suppression::Window(window) => {
                let window = time::Duration::try_from(window).unwrap_or(time::Duration::MAX);
                at - last.timestamp < window
            }
        }
    }

    /// Append a hit unless it repeats the most recent entry.
    fn record(&mut self, hit: &DecodeHit, frame: &Frame) -> Option<ScanEvent> {
        let content = hit.text();
        if self.is_repeat(hit, &content, frame.captured_at) {
            trace!(format = %hit.format, "repeat suppressed");
            return None;
        }
        let event = ScanEvent {
            timestamp: frame.captured_at,
            format: hit.format,
            content,
            raw_image: Arc::clone(&frame.data),
            width: frame.width,
            height: frame.height,
        };
        self.events.push(event.clone());
        Some(event)
    }

    fn delete_selected(&mut self, indices: &[usize]) -> usize {
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        let before = self.events.len();
        let mut i = 0;
        self.events.retain(|_| {
            let keep = !doomed.contains(&i);
            i += 1;
            keep
        });
        before - self.events.len()
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub interval: Duration,
    pub decode_timeout: Duration,
    pub use_base64: bool,
    pub suppression: Suppression,
    pub debug_frames_dir: Option<PathBuf>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::from_config(&config::Scan::default())
    }
}

impl ScanSettings {
    pub fn from_config(cfg: &config::Scan) -> Self {
        let dir = cfg.debug_frames_dir.trim();
        Self {
            interval: cfg.interval(),
            decode_timeout: cfg.decode_timeout(),
            use_base64: cfg.use_base64,
            suppression: Suppression::from_config(cfg),
            debug_frames_dir: (!dir.is_empty()).then(|| PathBuf::from(dir)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Active,
}

fn active_sources() -> &'static Mutex<HashSet<String>> {
    static ACTIVE: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

fn claim_source(id: &str) -> bool {
    active_sources()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id.to_string())
}

fn release_claim(id: &str) {
    active_sources()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(id);
}

type Subscribers = Arc<Mutex<Vec<Sender<ScanEvent>>>>;

struct ActiveScan {
    source_id: String,
    stop_tx: Sender<()>,
    sampler: thread::JoinHandle<()>,
}

/// Drives one capture source through the Idle/Active cycle.
///
/// The session log is written only by the sampler thread; everything else
/// reads snapshots. Once `stop` returns the source is released and the log
/// no longer grows.
pub struct ScanAggregator {
    codec: Arc<dyn Codec>,
    settings: ScanSettings,
    session: Arc<RwLock<ScanSession>>,
    subscribers: Subscribers,
    active: Option<ActiveScan>,
}

impl ScanAggregator {
    pub fn new(codec: Arc<dyn Codec>, settings: ScanSettings) -> Self {
        let session = ScanSession::new(Symbology::all(), settings.suppression);
        Self {
            codec,
            settings,
            session: Arc::new(RwLock::new(session)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            active: None,
        }
    }

    pub fn state(&self) -> ScanState {
        if self.active.is_some() {
            ScanState::Active
        } else {
            ScanState::Idle
        }
    }

    pub fn start(
        &mut self,
        mut source: Box<dyn CaptureSource>,
        filter: BTreeSet<Symbology>,
    ) -> Result<()> {
        let source_id = source.id();
        if let Some(active) = &self.active {
            return Err(Error::ScanAlreadyActive {
                source_id: active.source_id.clone(),
            });
        }
        if !claim_source(&source_id) {
            return Err(Error::ScanAlreadyActive { source_id });
        }
        if let Err(e) = source.acquire() {
            release_claim(&source_id);
            return Err(e);
        }

        write(&self.session).filter = filter;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let sampler = Sampler {
            source,
            codec: Arc::clone(&self.codec),
            settings: self.settings.clone(),
            session: Arc::clone(&self.session),
            subscribers: Arc::clone(&self.subscribers),
        };
        let handle = thread::spawn(move || sampler.run(stop_rx));

        info!(source = %source_id, interval_ms = self.settings.interval.as_millis() as u64, "scan started");
        self.active = Some(ActiveScan {
            source_id,
            stop_tx,
            sampler: handle,
        });
        Ok(())
    }

    /// Stop sampling and release the source. A no-op when Idle.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let _ = active.stop_tx.send(());
        if active.sampler.join().is_err() {
            warn!(source = %active.source_id, "sampler thread panicked");
        }
        release_claim(&active.source_id);
        info!(source = %active.source_id, events = self.len(), "scan stopped");
    }

    /// Receive every event appended from now on.
    pub fn subscribe(&self) -> Receiver<ScanEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Consistent copy of the log.
    pub fn snapshot(&self) -> Vec<ScanEvent> {
        read(&self.session).events.clone()
    }

    pub fn len(&self) -> usize {
        read(&self.session).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.session).is_empty()
    }

    pub fn clear(&self) {
        write(&self.session).events.clear();
    }

    /// Remove the entries at `indices`; out-of-range indices are ignored.
    pub fn delete_selected(&self, indices: &[usize]) -> usize {
        write(&self.session).delete_selected(indices)
    }

    pub fn filter(&self) -> BTreeSet<Symbology> {
        read(&self.session).filter.clone()
    }

    pub fn set_filter(&self, filter: BTreeSet<Symbology>) {
        debug!(formats = filter.len(), "format filter replaced");
        write(&self.session).filter = filter;
    }

    pub fn select_all(&self) {
        self.set_filter(Symbology::all());
    }

    pub fn clear_filter(&self) {
        self.set_filter(BTreeSet::new());
    }

    pub fn toggle_format(&self, format: Symbology, enabled: bool) {
        let mut session = write(&self.session);
        if enabled {
            session.filter.insert(format);
        } else {
            session.filter.remove(&format);
        }
    }
}

impl Drop for ScanAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read(session: &RwLock<ScanSession>) -> RwLockReadGuard<'_, ScanSession> {
    session.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(session: &RwLock<ScanSession>) -> RwLockWriteGuard<'_, ScanSession> {
    session.write().unwrap_or_else(PoisonError::into_inner)
}

struct DecodeTask {
    seq: u64,
    frame: Frame,
    formats: BTreeSet<Symbology>,
}

struct DecodeDone {
    seq: u64,
    frame: Frame,
    result: Result<DecodeHit>,
}

enum Wait {
    Done(DecodeDone),
    TimedOut,
    Stopped,
}

struct Sampler {
    source: Box<dyn CaptureSource>,
    codec: Arc<dyn Codec>,
    settings: ScanSettings,
    session: Arc<RwLock<ScanSession>>,
    subscribers: Subscribers,
}

impl Sampler {
    fn run(mut self, stop_rx: Receiver<()>) {
        let (task_tx, task_rx) = bounded::<DecodeTask>(1);
        let (done_tx, done_rx) = bounded::<DecodeDone>(1);
        let worker = spawn_decoder(Arc::clone(&self.codec), self.settings.use_base64, task_rx, done_tx);

        let ticker = tick(self.settings.interval);
        let mut seq = 0u64;
        // Sequence number of a decode that outlived its timeout.
        let mut overdue: Option<u64> = None;

        loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => break,
                recv(ticker) -> _ => {}
            }

            if let Some(late) = overdue {
                match done_rx.try_recv() {
                    Ok(done) => {
                        overdue = None;
                        if !stop_rx.is_empty() {
                            debug!(seq = done.seq, "discarding decode finished after stop");
                            break;
                        }
                        debug!(seq = done.seq, expected = late, "late decode settled");
                        self.settle(done);
                    }
                    Err(TryRecvError::Empty) => continue,
                    Err(TryRecvError::Disconnected) => break,
                }
            }

            let Some(frame) = self.source.latest_frame() else {
                trace!("no new frame");
                continue;
            };

            let formats = read(&self.session).filter.clone();
            if formats.is_empty() {
                trace!("format filter empty, frame skipped");
                continue;
            }

            seq += 1;
            if task_tx.send(DecodeTask { seq, frame, formats }).is_err() {
                warn!("decoder thread gone");
                break;
            }

            match self.wait(&done_rx, &stop_rx) {
                Wait::Done(done) => self.settle(done),
                Wait::TimedOut => {
                    debug!(seq, timeout_ms = self.settings.decode_timeout.as_millis() as u64, "decode timed out");
                    overdue = Some(seq);
                }
                Wait::Stopped => break,
            }
        }

        drop(task_tx);
        self.source.release();
        // The decoder is detached; a call still in flight when stopped finishes
        // into a closed channel.
        drop(worker);
    }

    fn wait(&self, done_rx: &Receiver<DecodeDone>, stop_rx: &Receiver<()>) -> Wait {
        crossbeam_channel::select! {
            recv(done_rx) -> done => match done {
                Ok(_) if !stop_rx.is_empty() => Wait::Stopped,
                Ok(done) => Wait::Done(done),
                Err(_) => Wait::Stopped,
            },
            recv(stop_rx) -> _ => Wait::Stopped,
            default(self.settings.decode_timeout) => Wait::TimedOut,
        }
    }

    fn settle(&self, done: DecodeDone) {
        let hit = match done.result {
            Ok(hit) => hit,
            Err(Error::Codec { failure, detail }) => {
                debug!(seq = done.seq, %failure, detail = detail.as_deref().unwrap_or(""), "no match");
                return;
            }
            Err(e) => {
                warn!(seq = done.seq, error = %e, "decode error");
                return;
            }
        };

        let event = write(&self.session).record(&hit, &done.frame);
        let Some(event) = event else { return };
        info!(format = %event.format, content = %event.content, "new detection");

        if let Some(dir) = &self.settings.debug_frames_dir {
            save_debug_frame(dir, &event);
        }

        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn spawn_decoder(
    codec: Arc<dyn Codec>,
    use_base64: bool,
    task_rx: Receiver<DecodeTask>,
    done_tx: Sender<DecodeDone>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for task in task_rx.iter() {
            let result = codec.decode(&task.frame.data, &task.formats, use_base64);
            let done = DecodeDone {
                seq: task.seq,
                frame: task.frame,
                result,
            };
            if done_tx.send(done).is_err() {
                break;
            }
        }
    })
}

fn save_debug_frame(dir: &std::path::Path, event: &ScanEvent) {
    if let Err(e) = ensure_dir(dir) {
        warn!(error = %e, "debug frame dir");
        return;
    }
    let path = dir.join(format!(
        "frame_{}_{}.{}",
        file_stamp(event.timestamp),
        event.format,
        image_extension(&event.raw_image)
    ));
    match std::fs::write(&path, &event.raw_image) {
        Ok(()) => debug!(path = %path.display(), "debug frame saved"),
        Err(e) => warn!(path = %path.display(), error = %e, "debug frame not saved"),
    }
}
