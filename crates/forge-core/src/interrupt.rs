//! §4.6 InterruptBus: a concurrent, non-blocking input channel for
//! keyboard input while the main flow is busy.
//!
//! The UI owns reading raw lines (e.g. a background terminal key-reader) and
//! pushes them in through the [`InterruptSender`] half; the control loop
//! owns the [`InterruptBus`] half and polls it between suspension points.

use tokio::sync::mpsc;

/// The reserved line that aborts the current stream/tool step.
pub const CANCEL_TOKEN: &str = "ESC";

/// One line captured from the user while the loop was busy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// The cancel token was received.
    Cancel,
    /// Any other line — a pending instruction to apply after the current step.
    Line(String),
}

impl From<String> for Interrupt {
    fn from(line: String) -> Self {
        if line == CANCEL_TOKEN {
            Interrupt::Cancel
        } else {
            Interrupt::Line(line)
        }
    }
}

/// Create a bound sender/receiver pair for interrupts.
pub fn channel() -> (InterruptSender, InterruptBus) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InterruptSender(tx), InterruptBus { rx })
}

/// Feeds lines into the bus. Cheap to clone; held by the UI's reader task.
#[derive(Clone)]
pub struct InterruptSender(mpsc::UnboundedSender<String>);

impl InterruptSender {
    /// Push a raw input line. Silently dropped if the bus was torn down.
    pub fn send(&self, line: impl Into<String>) {
        let _ = self.0.send(line.into());
    }
}

/// Consumer side, polled by the control loop between suspension points.
pub struct InterruptBus {
    rx: mpsc::UnboundedReceiver<String>,
}

impl InterruptBus {
    /// Non-blocking dequeue of the next interrupt, if any.
    pub fn poll(&mut self) -> Option<Interrupt> {
        self.rx.try_recv().ok().map(Interrupt::from)
    }

    /// Drain everything currently queued.
    pub fn flush(&mut self) -> Vec<Interrupt> {
        let mut drained = Vec::new();
        while let Some(interrupt) = self.poll() {
            drained.push(interrupt);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_recognized() {
        assert_eq!(Interrupt::from(CANCEL_TOKEN.to_string()), Interrupt::Cancel);
    }

    #[test]
    fn other_lines_are_pending_instructions() {
        assert_eq!(
            Interrupt::from("also check for TODOs".to_string()),
            Interrupt::Line("also check for TODOs".to_string())
        );
    }

    #[test]
    fn poll_is_non_blocking_and_fifo() {
        let (tx, mut bus) = channel();
        assert!(bus.poll().is_none());
        tx.send("first");
        tx.send("second");
        assert_eq!(bus.poll(), Some(Interrupt::Line("first".to_string())));
        assert_eq!(bus.poll(), Some(Interrupt::Line("second".to_string())));
        assert!(bus.poll().is_none());
    }

    #[test]
    fn flush_drains_everything_in_order() {
        let (tx, mut bus) = channel();
        tx.send("a");
        tx.send("b");
        tx.send(CANCEL_TOKEN);
        let drained = bus.flush();
        assert_eq!(
            drained,
            vec![
                Interrupt::Line("a".to_string()),
                Interrupt::Line("b".to_string()),
                Interrupt::Cancel,
            ]
        );
    }
}
