//! Console collaborator: where scripts print and errors are reported.
//!
//! Posting never blocks. Lines are buffered in a bounded channel and
//! delivered to listeners when the owning thread calls [`Console::dispatch`].

use crate::log_debug;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CONSOLE_CAPACITY: usize = 1024;

/// Receives console lines on the thread that calls [`Console::dispatch`].
pub trait ConsoleListener: Send {
    fn console_message(&mut self, text: &str);
}

impl<F: FnMut(&str) + Send> ConsoleListener for F {
    fn console_message(&mut self, text: &str) {
        self(text)
    }
}

struct ConsoleInner {
    tx: Sender<String>,
    rx: Receiver<String>,
    listeners: Mutex<Vec<Box<dyn ConsoleListener>>>,
}

#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let (tx, rx) = bounded(CONSOLE_CAPACITY);
        Self {
            inner: Arc::new(ConsoleInner {
                tx,
                rx,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queues a line. When the buffer is full the oldest pending line is
    /// discarded.
    pub fn post_message(&self, text: impl Into<String>) {
        let text = text.into();
        log_debug!("[console] {}", text);
        let mut pending = text;
        loop {
            match self.inner.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    let _ = self.inner.rx.try_recv();
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn add_listener(&self, listener: Box<dyn ConsoleListener>) {
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push(listener);
        }
    }

    /// Delivers every pending line to the listeners. Returns how many lines
    /// were delivered.
    pub fn dispatch(&self) -> usize {
        let lines = self.drain();
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            for line in &lines {
                for listener in listeners.iter_mut() {
                    listener.console_message(line);
                }
            }
        }
        lines.len()
    }

    /// Takes every pending line without notifying listeners.
    pub fn drain(&self) -> Vec<String> {
        self.inner.rx.try_iter().collect()
    }

    /// Waits up to `timeout` for the next line.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        match self.inner.rx.recv_timeout(timeout) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn drops_oldest_when_full() {
        let console = Console::new();
        for i in 0..CONSOLE_CAPACITY + 3 {
            console.post_message(format!("line {}", i));
        }
        let lines = console.drain();
        assert_eq!(lines.len(), CONSOLE_CAPACITY);
        assert_eq!(lines[0], "line 3");
        assert_eq!(lines.last().map(String::as_str), Some("line 1026"));
    }

    #[test]
    fn dispatch_reaches_listeners() {
        let console = Console::new();
        let (tx, rx) = unbounded();
        console.add_listener(Box::new(move |text: &str| {
            let _ = tx.send(text.to_string());
        }));
        console.post_message("hello");
        console.post_message("world");
        assert_eq!(console.dispatch(), 2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["hello", "world"]);
        assert_eq!(console.dispatch(), 0);
    }
}
