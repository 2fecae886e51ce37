//! Control bridge between the render thread and the script worker.
//!
//! The bridge owns the worker thread. MIDI coming from the render thread
//! travels through a lock-free ring ([`BridgeSender::post_midi`]); anything
//! that must not be lost, or that is not MIDI, goes through the deferred
//! task queue. The worker alternates between draining the ring into the
//! script handler and one pass of the task queue.
//!
//! ```text
//! Stopped --start--> Starting --spawn--> Running --stop--> Stopping --join--> Stopped
//! ```

use crate::console::Console;
use crate::error::PlayerError;
use crate::midi::MidiMessage;
use crate::queue::{task_queue, RunState, TaskId, TaskQueue, TaskRunner};
use crate::ring::{ring_channel, RingConsumer, RingProducer};
use crate::script::ScriptHost;
use crate::{log_debug, log_error, log_println};
use crossbeam_channel::{bounded, Sender};
use player_engine::EngineHandle;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thread_priority::ThreadBuilder;

pub const DEFAULT_RING_CAPACITY: usize = 1024;
pub const SYNC_TIMEOUT: Duration = Duration::from_millis(100);

/// Work executed on the worker thread.
pub enum WorkerTask {
    Midi(MidiMessage),
    /// Handled like `Midi`, then the sender is signalled.
    MidiSync(MidiMessage, Sender<()>),
    Call(Box<dyn FnOnce(&mut ScriptHost) + Send>),
    /// Script callback scheduled with `set_timeout`.
    Script(rhai::FnPtr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BridgeState::Starting,
            2 => BridgeState::Running,
            3 => BridgeState::Stopping,
            _ => BridgeState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub ring_capacity: usize,
    pub sync_timeout: Duration,
    pub content_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            sync_timeout: SYNC_TIMEOUT,
            content_dir: PathBuf::new(),
        }
    }
}

struct BridgeShared {
    state: AtomicU8,
    dropped: AtomicU64,
    sync_timeout_us: AtomicU64,
}

impl BridgeShared {
    fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: BridgeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn sync_timeout(&self) -> Duration {
        Duration::from_micros(self.sync_timeout_us.load(Ordering::Relaxed))
    }
}

/// Worker-side ends, parked in the bridge while no worker runs.
struct WorkerEnds {
    runner: TaskRunner<WorkerTask>,
    events: RingConsumer<MidiMessage>,
}

/// Sending half used by the audio side.
pub struct BridgeSender {
    events: RingProducer<MidiMessage>,
    tasks: TaskQueue<WorkerTask>,
    shared: Arc<BridgeShared>,
}

impl BridgeSender {
    /// Queues `message` without blocking. With `notify` the worker is woken
    /// right away; otherwise the event waits for the next wake-up, which
    /// lets a caller batch several events behind one [`notify`](Self::notify).
    /// Returns false when the ring is full and the event was dropped.
    #[inline]
    pub fn post_midi(&mut self, message: MidiMessage, notify: bool) -> bool {
        if !self.events.send(message) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if notify {
            self.tasks.interrupt();
        }
        true
    }

    #[inline]
    pub fn notify(&self) {
        self.tasks.interrupt();
    }

    /// Delivers `message` and waits until the handler has run. Gives up
    /// after the sync timeout (100 ms by default) or when the bridge is not
    /// running.
    pub fn send_midi(&self, message: MidiMessage) -> bool {
        if self.shared.state() != BridgeState::Running {
            return false;
        }
        let (done_tx, done_rx) = bounded(1);
        if self
            .tasks
            .post(WorkerTask::MidiSync(message, done_tx))
            .is_none()
        {
            return false;
        }
        done_rx.recv_timeout(self.shared.sync_timeout()).is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == BridgeState::Running
    }
}

pub struct ControlBridge {
    engine: EngineHandle,
    console: Console,
    tasks: TaskQueue<WorkerTask>,
    parked: Option<WorkerEnds>,
    worker: Option<JoinHandle<WorkerEnds>>,
    shared: Arc<BridgeShared>,
    content_dir: PathBuf,
}

impl ControlBridge {
    pub fn new(
        engine: EngineHandle,
        console: Console,
        config: BridgeConfig,
    ) -> (Self, BridgeSender) {
        let (producer, consumer) = ring_channel(config.ring_capacity);
        let (tasks, runner) = task_queue();
        // Closed until a worker is started.
        tasks.shutdown(false);
        let shared = Arc::new(BridgeShared {
            state: AtomicU8::new(BridgeState::Stopped as u8),
            dropped: AtomicU64::new(0),
            sync_timeout_us: AtomicU64::new(config.sync_timeout.as_micros() as u64),
        });
        let sender = BridgeSender {
            events: producer,
            tasks: tasks.clone(),
            shared: Arc::clone(&shared),
        };
        let bridge = Self {
            engine,
            console,
            tasks,
            parked: Some(WorkerEnds {
                runner,
                events: consumer,
            }),
            worker: None,
            shared,
            content_dir: config.content_dir,
        };
        (bridge, sender)
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == BridgeState::Running
    }

    /// MIDI events dropped because the ring was full.
    pub fn dropped_events(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn set_sync_timeout(&self, timeout: Duration) {
        self.shared
            .sync_timeout_us
            .store(timeout.as_micros() as u64, Ordering::Relaxed);
    }

    /// Takes effect at the next [`start`](Self::start).
    pub fn set_content_folder(&mut self, path: impl Into<PathBuf>) {
        self.content_dir = path.into();
    }

    pub fn content_folder(&self) -> &Path {
        &self.content_dir
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Loads `script` on the calling thread, then starts the worker. A
    /// running worker is stopped first. Script errors are reported on the
    /// console and do not prevent the worker from starting.
    pub fn start(&mut self, script: &str) -> Result<(), PlayerError> {
        self.stop()?;
        let mut ends = self.parked.take().ok_or(PlayerError::WorkerPanicked)?;
        self.shared.set_state(BridgeState::Starting);

        ends.runner.reopen();
        while ends.events.receive().is_some() {}

        let mut host = ScriptHost::new(
            self.engine.clone(),
            self.console.clone(),
            self.tasks.clone(),
            self.content_dir.clone(),
        );
        host.load(script);

        let engine = self.engine.clone();
        let shared = Arc::clone(&self.shared);
        let spawned = ThreadBuilder::default()
            .name("player-worker")
            .spawn(move |_| run_worker(host, ends, engine, shared));
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.shared.set_state(BridgeState::Running);
                log_debug!("[+] Control bridge running");
                Ok(())
            }
            Err(e) => {
                self.tasks.shutdown(false);
                self.shared.set_state(BridgeState::Stopped);
                Err(PlayerError::Spawn(e))
            }
        }
    }

    /// Drains due tasks, discards the rest and joins the worker. Does nothing
    /// when already stopped.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.set_state(BridgeState::Stopping);
        self.tasks.shutdown(true);
        let joined = worker.join();
        self.shared.set_state(BridgeState::Stopped);
        self.engine.collect_garbage();
        match joined {
            Ok(ends) => {
                self.parked = Some(ends);
                log_debug!("[-] Control bridge stopped");
                Ok(())
            }
            Err(_) => Err(PlayerError::WorkerPanicked),
        }
    }

    /// Runs `f` on the worker with the script host. `None` when the bridge
    /// is not running.
    pub fn post_message(&self, f: impl FnOnce(&mut ScriptHost) + Send + 'static) -> Option<TaskId> {
        self.tasks.post(WorkerTask::Call(Box::new(f)))
    }

    pub fn post_message_delayed(
        &self,
        f: impl FnOnce(&mut ScriptHost) + Send + 'static,
        delay: Duration,
    ) -> Option<TaskId> {
        self.tasks.post_delayed(WorkerTask::Call(Box::new(f)), delay)
    }
}

impl Drop for ControlBridge {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs one piece of control logic. A panic is reported on the console and
/// goes no further.
fn guarded(host: &mut ScriptHost, f: impl FnOnce(&mut ScriptHost)) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(&mut *host))) {
        host.console().post_message("*** Error ***");
        host.console().post_message(panic_message(panic.as_ref()));
    }
}

fn execute(host: &mut ScriptHost, task: WorkerTask) {
    match task {
        WorkerTask::Midi(message) => guarded(host, |host| host.handle_midi(&message)),
        WorkerTask::MidiSync(message, done) => {
            guarded(host, |host| host.handle_midi(&message));
            let _ = done.try_send(());
        }
        WorkerTask::Call(f) => guarded(host, f),
        WorkerTask::Script(callback) => guarded(host, |host| host.run_callback(&callback)),
    }
}

/// One iteration of the worker loop.
fn run_pass(host: &mut ScriptHost, ends: &mut WorkerEnds) -> RunState {
    while let Some(message) = ends.events.receive() {
        guarded(host, |host| host.handle_midi(&message));
    }
    ends.runner.run_once(|task| execute(host, task))
}

fn run_worker(
    mut host: ScriptHost,
    mut ends: WorkerEnds,
    engine: EngineHandle,
    #[cfg_attr(not(debug_assertions), allow(unused_variables))] shared: Arc<BridgeShared>,
) -> WorkerEnds {
    log_println!("[+] Starting control worker");
    #[cfg(debug_assertions)]
    let mut reported_drops = shared.dropped.load(Ordering::Relaxed);
    loop {
        let pass = catch_unwind(AssertUnwindSafe(|| run_pass(&mut host, &mut ends)));
        engine.collect_garbage();

        #[cfg(debug_assertions)]
        {
            let dropped = shared.dropped.load(Ordering::Relaxed);
            if dropped != reported_drops {
                crate::log_warn!(
                    "[!] {} MIDI event(s) dropped, event ring full",
                    dropped - reported_drops
                );
                reported_drops = dropped;
            }
        }

        match pass {
            Ok(RunState::Continue) => {}
            Ok(RunState::Shutdown) => break,
            // The ends are still ours, so a later start can reuse them.
            Err(panic) => {
                log_error!(
                    "[!] Control worker failed: {}",
                    panic_message(panic.as_ref())
                );
                break;
            }
        }
    }
    log_println!("[-] Exiting control worker...");
    ends
}

#[cfg(test)]
mod tests;
