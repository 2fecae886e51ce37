//! Deferred task queue owned by a single worker thread.
//!
//! Any thread may post tasks, immediately or after a delay, through a
//! cloneable [`TaskQueue`]. Only the [`TaskRunner`] executes them, in
//! scheduled-time order with ties broken by post order. The runner keeps
//! pending tasks in a heap and sleeps on the inbox until the next one is
//! due or someone calls [`TaskQueue::interrupt`].

use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

pub type TaskId = NonZeroU64;

/// Upper bound for delays that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

struct Scheduled<T> {
    id: TaskId,
    fire_at: Instant,
    task: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    // Reversed: BinaryHeap is a max-heap and the earliest task must be on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

enum Envelope<T> {
    Task(Scheduled<T>),
    Shutdown { cutoff: Instant, drain: bool },
}

struct QueueState {
    next_id: AtomicU64,
    closed: RwLock<bool>,
}

/// Posting side of the queue.
pub struct TaskQueue<T> {
    inbox: Sender<Envelope<T>>,
    wake: Sender<()>,
    state: Arc<QueueState>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            wake: self.wake.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

/// What the worker loop should do after a [`TaskRunner::run_once`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Shutdown,
}

/// Executing side of the queue, owned by the worker thread.
pub struct TaskRunner<T> {
    inbox: Receiver<Envelope<T>>,
    wake: Receiver<()>,
    state: Arc<QueueState>,
    pending: BinaryHeap<Scheduled<T>>,
    shutdown: Option<(Instant, bool)>,
}

pub fn task_queue<T: Send>() -> (TaskQueue<T>, TaskRunner<T>) {
    let (inbox_tx, inbox_rx) = unbounded();
    // One pending wake-up is enough; further interrupts coalesce.
    let (wake_tx, wake_rx) = bounded(1);
    let state = Arc::new(QueueState {
        next_id: AtomicU64::new(1),
        closed: RwLock::new(false),
    });
    (
        TaskQueue {
            inbox: inbox_tx,
            wake: wake_tx,
            state: Arc::clone(&state),
        },
        TaskRunner {
            inbox: inbox_rx,
            wake: wake_rx,
            state,
            pending: BinaryHeap::new(),
            shutdown: None,
        },
    )
}

impl<T> TaskQueue<T> {
    /// Queues `task` for immediate processing. Returns `None` once the queue
    /// has been shut down.
    pub fn post(&self, task: T) -> Option<TaskId> {
        self.post_delayed(task, Duration::ZERO)
    }

    /// Queues `task` to run once `delay` has elapsed from now.
    pub fn post_delayed(&self, task: T, delay: Duration) -> Option<TaskId> {
        // Held across the send so a concurrent shutdown is ordered after
        // every task it did not reject.
        let closed = self.state.closed.read().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return None;
        }
        let id = NonZeroU64::new(self.state.next_id.fetch_add(1, AtomicOrdering::Relaxed))?;
        let now = Instant::now();
        let fire_at = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.inbox
            .send(Envelope::Task(Scheduled { id, fire_at, task }))
            .ok()?;
        Some(id)
    }

    /// Wakes the worker if it is waiting. Never blocks or allocates.
    #[inline]
    pub fn interrupt(&self) {
        let _ = self.wake.try_send(());
    }

    /// Stops accepting tasks. The worker runs the tasks already due when
    /// `drain` is set, discards everything else and leaves its loop.
    pub fn shutdown(&self, drain: bool) {
        let mut closed = self.state.closed.write().unwrap_or_else(|e| e.into_inner());
        if *closed {
            return;
        }
        *closed = true;
        let _ = self.inbox.send(Envelope::Shutdown {
            cutoff: Instant::now(),
            drain,
        });
    }

    pub fn is_closed(&self) -> bool {
        *self.state.closed.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> TaskRunner<T> {
    /// Runs one scheduler pass. When nothing is due yet, first waits until
    /// the next task is due, a new task arrives or the queue is interrupted;
    /// then executes every task that is due.
    pub fn run_once(&mut self, mut execute: impl FnMut(T)) -> RunState {
        self.collect();
        if self.shutdown.is_none() && !self.has_due_task() {
            self.wait();
            self.collect();
        }
        if let Some((cutoff, drain)) = self.shutdown.take() {
            self.finish(cutoff, drain, &mut execute);
            return RunState::Shutdown;
        }

        let now = Instant::now();
        while self.pending.peek().is_some_and(|next| next.fire_at <= now) {
            if let Some(next) = self.pending.pop() {
                execute(next.task);
            }
        }
        RunState::Continue
    }

    /// Number of accepted tasks not yet executed.
    pub fn pending(&self) -> usize {
        self.pending.len() + self.inbox.len()
    }

    /// Reopens a queue after shutdown. Anything left over is discarded.
    pub fn reopen(&mut self) {
        let mut closed = self.state.closed.write().unwrap_or_else(|e| e.into_inner());
        while self.inbox.try_recv().is_ok() {}
        while self.wake.try_recv().is_ok() {}
        self.pending.clear();
        self.shutdown = None;
        *closed = false;
    }

    fn accept(&mut self, envelope: Envelope<T>) {
        match envelope {
            Envelope::Task(task) => self.pending.push(task),
            Envelope::Shutdown { cutoff, drain } => {
                self.shutdown.get_or_insert((cutoff, drain));
            }
        }
    }

    fn has_due_task(&self) -> bool {
        let now = Instant::now();
        self.pending.peek().is_some_and(|next| next.fire_at <= now)
    }

    fn collect(&mut self) {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.accept(envelope);
        }
    }

    fn wait(&mut self) {
        let timeout = self
            .pending
            .peek()
            .map(|next| next.fire_at.saturating_duration_since(Instant::now()));
        if timeout == Some(Duration::ZERO) {
            return;
        }

        let mut select = Select::new();
        let inbox = select.recv(&self.inbox);
        select.recv(&self.wake);
        let operation = match timeout {
            Some(timeout) => match select.select_timeout(timeout) {
                Ok(operation) => operation,
                Err(_) => return,
            },
            None => select.select(),
        };

        let received = if operation.index() == inbox {
            operation.recv(&self.inbox).map(Some)
        } else {
            operation.recv(&self.wake).map(|()| None)
        };
        drop(select);
        match received {
            Ok(Some(envelope)) => self.accept(envelope),
            Ok(None) => {}
            // Every handle dropped means nobody can post or stop us any more.
            Err(_) => {
                self.shutdown.get_or_insert((Instant::now(), false));
            }
        }
    }

    fn finish(&mut self, cutoff: Instant, drain: bool, execute: &mut impl FnMut(T)) {
        self.collect();
        if drain {
            while self.pending.peek().is_some_and(|next| next.fire_at <= cutoff) {
                if let Some(next) = self.pending.pop() {
                    execute(next.task);
                }
            }
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_until<T>(
        runner: &mut TaskRunner<T>,
        done: impl Fn(&[T]) -> bool,
    ) -> (Vec<T>, RunState) {
        let mut seen = Vec::new();
        let start = Instant::now();
        loop {
            let state = runner.run_once(|task| seen.push(task));
            if state == RunState::Shutdown || done(&seen) {
                return (seen, state);
            }
            assert!(start.elapsed() < Duration::from_secs(5), "queue stalled");
        }
    }

    #[test]
    fn immediate_tasks_run_in_post_order() {
        let (queue, mut runner) = task_queue();
        for i in 0..10 {
            assert!(queue.post(i).is_some());
        }
        let (seen, state) = run_until(&mut runner, |seen| seen.len() == 10);
        assert_eq!(state, RunState::Continue);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn shorter_delay_runs_first() {
        let (queue, mut runner) = task_queue();
        queue.post_delayed("late", Duration::from_millis(40));
        queue.post_delayed("early", Duration::from_millis(10));
        queue.post("now");
        let (seen, _) = run_until(&mut runner, |seen| seen.len() == 3);
        assert_eq!(seen, vec!["now", "early", "late"]);
    }

    #[test]
    fn delayed_task_waits_for_its_time() {
        let (queue, mut runner) = task_queue();
        let posted = Instant::now();
        queue.post_delayed((), Duration::from_millis(30));
        run_until(&mut runner, |seen| seen.len() == 1);
        assert!(posted.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn ids_are_non_zero_and_increasing() {
        let (queue, _runner) = task_queue();
        let a = queue.post(()).unwrap();
        let b = queue.post_delayed((), Duration::from_secs(1)).unwrap();
        assert!(a.get() >= 1);
        assert!(b > a);
    }

    #[test]
    fn draining_shutdown_runs_due_tasks_only() {
        let (queue, mut runner) = task_queue();
        queue.post("a");
        queue.post("b");
        queue.post_delayed("later", Duration::from_secs(10));
        queue.shutdown(true);
        assert!(queue.is_closed());
        assert!(queue.post("rejected").is_none());

        let mut seen = Vec::new();
        let state = runner.run_once(|task| seen.push(task));
        assert_eq!(state, RunState::Shutdown);
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(runner.pending(), 0);
    }

    #[test]
    fn forced_shutdown_discards_everything() {
        let (queue, mut runner) = task_queue();
        queue.post(1);
        queue.shutdown(false);
        let mut seen = Vec::new();
        assert_eq!(runner.run_once(|task| seen.push(task)), RunState::Shutdown);
        assert!(seen.is_empty());
    }

    #[test]
    fn interrupt_wakes_idle_worker() {
        let (queue, mut runner) = task_queue::<()>();
        let (tx, rx) = bounded(1);
        let worker = thread::spawn(move || {
            let state = runner.run_once(|_| {});
            let _ = tx.send(state);
        });
        thread::sleep(Duration::from_millis(20));
        queue.interrupt();
        let state = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(state, RunState::Continue);
        worker.join().unwrap();
    }

    #[test]
    fn tasks_run_on_the_worker_thread() {
        let (queue, mut runner) = task_queue::<Box<dyn FnOnce() + Send>>();
        let (tx, rx) = bounded(1);
        let worker = thread::spawn(move || {
            let id = thread::current().id();
            while runner.run_once(|task| task()) == RunState::Continue {}
            id
        });

        let poster = thread::spawn(move || {
            let poster_id = thread::current().id();
            queue.post_delayed(
                Box::new(move || {
                    let _ = tx.send(thread::current().id());
                }),
                Duration::ZERO,
            );
            (poster_id, queue)
        });
        let (poster_id, queue) = poster.join().unwrap();
        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        queue.shutdown(true);
        let worker_id = worker.join().unwrap();

        assert_eq!(ran_on, worker_id);
        assert_ne!(ran_on, poster_id);
    }

    #[test]
    fn dropping_every_handle_stops_the_runner() {
        let (queue, mut runner) = task_queue::<u8>();
        drop(queue);
        let (_, state) = run_until(&mut runner, |_| false);
        assert_eq!(state, RunState::Shutdown);
    }

    #[test]
    fn reopen_accepts_new_tasks() {
        let (queue, mut runner) = task_queue();
        queue.post_delayed(1, Duration::from_secs(10));
        queue.shutdown(true);
        assert_eq!(runner.run_once(|_| {}), RunState::Shutdown);

        runner.reopen();
        assert!(!queue.is_closed());
        queue.post(2);
        let (seen, _) = run_until(&mut runner, |seen| !seen.is_empty());
        assert_eq!(seen, vec![2]);
    }
}
