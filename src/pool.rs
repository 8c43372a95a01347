use crate::charset::Category;
use crate::codec::FontCodec;
use crate::error::FontSplitError;
use crate::font::{FontBuffer, FontType};
use crate::perf::PerfLogger;
use crate::plan::Subset;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

/// How a pool slot executes the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerStrategy {
    /// Each task runs on its own short-lived thread, joined as soon as the
    /// task finishes. A misbehaving codec never shares a stack with the next task.
    #[default]
    SpawnPerTask,
    /// Tasks run directly on the long-lived pool threads.
    Persistent,
}

impl FromStr for WorkerStrategy {
    type Err = FontSplitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spawn" | "spawn-per-task" => Ok(WorkerStrategy::SpawnPerTask),
            "persistent" => Ok(WorkerStrategy::Persistent),
            other => Err(FontSplitError::InvalidConfiguration(format!(
                "unknown worker strategy {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Open,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub strategy: WorkerStrategy,
    /// Number of tasks the completion channel is sized for.
    pub task_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct SubsetTask {
    pub subset: Subset,
    pub destination: PathBuf,
    pub font_type: FontType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDescriptor {
    pub subset_index: usize,
    pub category: Category,
    pub codepoint_count: usize,
    /// Hex SHA-256 of the artifact bytes; also the file stem.
    pub artifact_id: String,
    pub byte_size: u64,
    pub path: PathBuf,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ConversionFailed,
    Panicked,
    WriteFailed,
    SpawnFailed,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ConversionFailed => "conversion failed",
            FailureKind::Panicked => "codec panicked",
            FailureKind::WriteFailed => "artifact write failed",
            FailureKind::SpawnFailed => "worker spawn failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub subset_index: usize,
    pub category: Category,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subset {} ({}): {}: {}",
            self.subset_index,
            self.category,
            self.kind.as_str(),
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(ResultDescriptor),
    Failed(TaskFailure),
}

impl TaskOutcome {
    pub fn subset_index(&self) -> usize {
        match self {
            TaskOutcome::Succeeded(descriptor) => descriptor.subset_index,
            TaskOutcome::Failed(failure) => failure.subset_index,
        }
    }

    pub fn descriptor(&self) -> Option<&ResultDescriptor> {
        match self {
            TaskOutcome::Succeeded(descriptor) => Some(descriptor),
            TaskOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskOutcome::Succeeded(_) => None,
            TaskOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Bounded pool that runs one codec invocation per submitted subset.
///
/// `Open` accepts tasks, `await_all` moves to `Draining`, `shutdown` (or drop)
/// releases the threads and ends in `Terminated`.
pub struct WorkerPool {
    config: PoolConfig,
    state: PoolState,
    threads: Option<rayon::ThreadPool>,
    sender: Option<SyncSender<TaskOutcome>>,
    receiver: Receiver<TaskOutcome>,
    exits: Receiver<usize>,
    shared: Arc<Shared>,
    submitted: usize,
    received: usize,
}

struct Shared {
    font: FontBuffer,
    codec: Arc<dyn FontCodec>,
    strategy: WorkerStrategy,
    active: AtomicUsize,
    peak: AtomicUsize,
    perf: Option<PerfLogger>,
}

struct Artifact {
    artifact_id: String,
    byte_size: u64,
    path: PathBuf,
}

struct TaskError {
    kind: FailureKind,
    message: String,
}

impl TaskError {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl WorkerPool {
    pub fn initialize(
        config: PoolConfig,
        font: FontBuffer,
        codec: Arc<dyn FontCodec>,
    ) -> Result<Self, FontSplitError> {
        Self::initialize_with_perf(config, font, codec, None)
    }

    pub(crate) fn initialize_with_perf(
        config: PoolConfig,
        font: FontBuffer,
        codec: Arc<dyn FontCodec>,
        perf: Option<PerfLogger>,
    ) -> Result<Self, FontSplitError> {
        if config.pool_size == 0 {
            return Err(FontSplitError::InvalidConfiguration(
                "pool_size must be at least 1".to_string(),
            ));
        }
        let (exit_sender, exits) = mpsc::channel();
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pool_size)
            .thread_name(|idx| format!("fontsplit-worker-{idx}"))
            .exit_handler(move |idx| {
                let _ = exit_sender.send(idx);
            })
            .build()
            .map_err(|err| FontSplitError::ResourceExhaustion(err.to_string()))?;
        // Every task reports exactly once, so a channel sized to the task count never blocks a worker.
        let (sender, receiver) = mpsc::sync_channel(config.task_capacity.max(1));
        log::debug!(
            "worker pool open: {} slots, {:?}, capacity for {} tasks",
            config.pool_size,
            config.strategy,
            config.task_capacity
        );
        Ok(Self {
            config,
            state: PoolState::Open,
            threads: Some(threads),
            sender: Some(sender),
            receiver,
            exits,
            shared: Arc::new(Shared {
                font,
                codec,
                strategy: config.strategy,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                perf,
            }),
            submitted: 0,
            received: 0,
        })
    }

    /// Hands the task to the pool without waiting for a free slot.
    pub fn submit(&mut self, task: SubsetTask) -> Result<(), FontSplitError> {
        if self.state != PoolState::Open {
            return Err(FontSplitError::InvalidConfiguration(format!(
                "worker pool is {:?} and no longer accepts tasks",
                self.state
            )));
        }
        if self.submitted >= self.config.task_capacity {
            return Err(FontSplitError::ResourceExhaustion(format!(
                "worker pool was sized for {} tasks",
                self.config.task_capacity
            )));
        }
        let (Some(threads), Some(sender)) = (self.threads.as_ref(), self.sender.as_ref()) else {
            return Err(FontSplitError::ResourceExhaustion(
                "worker pool threads were released".to_string(),
            ));
        };
        let sender = sender.clone();
        let shared = Arc::clone(&self.shared);
        threads.spawn(move || {
            let outcome = shared.run(task);
            let _ = sender.send(outcome);
        });
        self.submitted += 1;
        Ok(())
    }

    /// Blocks until every submitted task has reported. Outcomes are ordered by subset index.
    pub fn await_all(&mut self) -> Result<Vec<TaskOutcome>, FontSplitError> {
        if self.state == PoolState::Terminated {
            return Err(FontSplitError::InvalidConfiguration(
                "worker pool already terminated".to_string(),
            ));
        }
        self.state = PoolState::Draining;
        // Only worker-held senders remain, so a lost task closes the channel instead of hanging.
        self.sender = None;
        let mut outcomes = Vec::with_capacity(self.submitted - self.received);
        while self.received < self.submitted {
            match self.receiver.recv() {
                Ok(outcome) => {
                    self.received += 1;
                    outcomes.push(outcome);
                }
                Err(_) => {
                    return Err(FontSplitError::ResourceExhaustion(format!(
                        "completion channel closed after {} of {} tasks",
                        self.received, self.submitted
                    )));
                }
            }
        }
        outcomes.sort_by_key(TaskOutcome::subset_index);
        Ok(outcomes)
    }

    /// Drains anything still in flight, then releases the pool threads and waits
    /// for each of them to exit. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == PoolState::Terminated {
            return;
        }
        self.state = PoolState::Draining;
        self.sender = None;
        while self.received < self.submitted {
            if self.receiver.recv().is_err() {
                break;
            }
            self.received += 1;
        }
        self.threads = None;
        // The handler's sender is dropped with the registry, so this ends even
        // if a worker never reports.
        let mut exited = 0;
        while exited < self.config.pool_size && self.exits.recv().is_ok() {
            exited += 1;
        }
        self.state = PoolState::Terminated;
        log::debug!(
            "worker pool terminated after {} tasks (peak {} active)",
            self.submitted,
            self.peak_active()
        );
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.config.pool_size
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Highest number of tasks observed executing at the same time.
    pub fn peak_active(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn run(&self, task: SubsetTask) -> TaskOutcome {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let started = Instant::now();
        let result = match self.strategy {
            WorkerStrategy::SpawnPerTask => self.run_isolated(&task),
            WorkerStrategy::Persistent => {
                contain_panic(|| convert_and_write(&self.font, self.codec.as_ref(), &task))
            }
        };
        let elapsed = started.elapsed();
        self.active.fetch_sub(1, Ordering::SeqCst);

        let subset = task.subset;
        if let Some(perf) = self.perf.as_ref() {
            perf.log_span_ms("task.convert", Some(subset.index), elapsed.as_secs_f64() * 1000.0);
        }
        match result {
            Ok(artifact) => {
                log::debug!(
                    "subset {} ({} codepoints) -> {} ({} bytes) in {:.2?}",
                    subset.index,
                    subset.codepoints.len(),
                    artifact.path.display(),
                    artifact.byte_size,
                    elapsed
                );
                TaskOutcome::Succeeded(ResultDescriptor {
                    subset_index: subset.index,
                    category: subset.category,
                    codepoint_count: subset.codepoints.len(),
                    artifact_id: artifact.artifact_id,
                    byte_size: artifact.byte_size,
                    path: artifact.path,
                    elapsed,
                })
            }
            Err(err) => {
                let failure = TaskFailure {
                    subset_index: subset.index,
                    category: subset.category,
                    kind: err.kind,
                    message: err.message,
                };
                log::warn!("{failure}");
                TaskOutcome::Failed(failure)
            }
        }
    }

    fn run_isolated(&self, task: &SubsetTask) -> Result<Artifact, TaskError> {
        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name(format!("fontsplit-subset-{}", task.subset.index))
                .spawn_scoped(scope, || {
                    convert_and_write(&self.font, self.codec.as_ref(), task)
                })
                .map_err(|err| TaskError::new(FailureKind::SpawnFailed, err.to_string()))?;
            handle.join().unwrap_or_else(|payload| {
                Err(TaskError::new(
                    FailureKind::Panicked,
                    panic_message(&*payload),
                ))
            })
        })
    }
}

fn contain_panic(
    f: impl FnOnce() -> Result<Artifact, TaskError>,
) -> Result<Artifact, TaskError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(TaskError::new(
            FailureKind::Panicked,
            panic_message(&*payload),
        ))
    })
}

fn convert_and_write(
    font: &FontBuffer,
    codec: &dyn FontCodec,
    task: &SubsetTask,
) -> Result<Artifact, TaskError> {
    let bytes = codec
        .convert(font.bytes(), &task.subset.codepoints, task.font_type)
        .map_err(|err| TaskError::new(FailureKind::ConversionFailed, err.to_string()))?;
    if bytes.is_empty() {
        return Err(TaskError::new(
            FailureKind::ConversionFailed,
            "codec returned an empty buffer",
        ));
    }
    let artifact_id = hex_sha256(&bytes);
    let path = task
        .destination
        .join(format!("{artifact_id}.{}", task.font_type.extension()));
    fs::write(&path, &bytes).map_err(|err| {
        TaskError::new(FailureKind::WriteFailed, format!("{}: {}", path.display(), err))
    })?;
    Ok(Artifact {
        artifact_id,
        byte_size: bytes.len() as u64,
        path,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
