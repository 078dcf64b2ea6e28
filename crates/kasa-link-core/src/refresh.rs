//! Coalescing "registry changed, please refresh" signal.
//!
//! Raising never blocks and never fails. Raises that happen while nobody is
//! listening collapse into one pending change.

use tokio::sync::watch;

#[derive(Debug)]
pub struct RefreshSignal {
    tx: watch::Sender<u64>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    /// Signal that the device set changed.
    pub fn raise(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Number of raises so far.
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> RefreshListener {
        RefreshListener {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct RefreshListener {
    rx: watch::Receiver<u64>,
}

impl RefreshListener {
    /// Wait for the next raise. Returns the generation seen, or None once the signal is gone.
    pub async fn changed(&mut self) -> Option<u64> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// True if a raise happened since the last `changed`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}
