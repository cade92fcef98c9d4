//! Per-bulb workers.
//!
//! Each bulb gets one long-lived task draining a single-slot mailbox, so at
//! most one command per bulb is in flight and a slow bulb only delays its
//! own updates.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::bulb::BulbControl;
use crate::mailbox::{Receiver, Sender, mailbox};
use crate::runtime::{self, Instant, JoinHandle, Mutex};
use crate::stats::{StatsSink, observe};
use crate::types::Color;

pub(crate) type SharedBulb = Arc<Mutex<Box<dyn BulbControl>>>;

/// A bulb plus the identity the coordinator needs without locking it.
pub(crate) struct BulbSlot {
    pub(crate) label: String,
    pub(crate) placement: String,
    pub(crate) vendor: &'static str,
    pub(crate) bulb: SharedBulb,
}

impl BulbSlot {
    pub(crate) fn new(bulb: Box<dyn BulbControl>) -> Self {
        Self {
            label: bulb.label().to_string(),
            placement: bulb.placement().to_string(),
            vendor: bulb.vendor(),
            bulb: Arc::new(Mutex::new(bulb)),
        }
    }
}

pub(crate) struct BulbWorker {
    label: String,
    handle: JoinHandle<()>,
}

impl BulbWorker {
    /// Start the worker for `slot` and return the mailbox feeding it.
    pub(crate) fn spawn(slot: &BulbSlot, stats: Arc<dyn StatsSink>) -> (Sender<Color>, Self) {
        let (tx, rx) = mailbox();
        let handle = runtime::spawn(run_worker(
            slot.label.clone(),
            Arc::clone(&slot.bulb),
            rx,
            stats,
        ));
        let worker = BulbWorker {
            label: slot.label.clone(),
            handle,
        };
        (tx, worker)
    }

    /// Wait up to `limit` for the worker to exit after its mailbox was
    /// closed. A worker still busy after that is left to finish on its own.
    pub(crate) async fn finish(self, limit: Duration) {
        match runtime::timeout(limit, self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Worker for {} ended abnormally: {e}", self.label),
            Err(_) => warn!(
                "Worker for {} still busy after {limit:?}; leaving it to finish",
                self.label
            ),
        }
    }
}

async fn run_worker(
    label: String,
    bulb: SharedBulb,
    mut inbox: Receiver<Color>,
    stats: Arc<dyn StatsSink>,
) {
    while let Some(color) = inbox.recv().await {
        let started = Instant::now();
        bulb.lock().await.set_color(color).await;
        let elapsed = started.elapsed();
        observe(|| stats.record_timing("set_color", elapsed));
    }
    debug!("Worker for {label} exited");
}

/// Send `color` to every bulb in the background without waiting.
///
/// Each send first waits out the bulb's rate-limit cooldown so the color is
/// not dropped by the limiter.
pub(crate) fn dispatch_final_color(slots: &[BulbSlot], color: Color) {
    for slot in slots {
        let bulb = Arc::clone(&slot.bulb);
        let label = slot.label.clone();
        // Dropping the handle detaches the task.
        drop(runtime::spawn(async move {
            let mut bulb = bulb.lock().await;
            let cooldown = bulb.cooldown();
            if !cooldown.is_zero() {
                runtime::sleep(cooldown).await;
            }
            bulb.set_color(color).await;
            debug!("Sent final color {color} to {label}");
        }));
    }
}
