//! The update loop and its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::bulb::{BulbControl, DeviceInfo};
use crate::config::CoordinatorConfig;
use crate::dispatch::{BulbSlot, BulbWorker, dispatch_final_color};
use crate::errors::Error;
use crate::mailbox::Sender;
use crate::processor::{CENTER_ZONE, ColorProcessor};
use crate::runtime::{self, JoinHandle};
use crate::stats::{NoopStats, StatsSink, observe};
use crate::types::{Brightness, Color, Mode};

type Result<T> = std::result::Result<T, Error>;

/// Mode and brightness, read by the update loop at the start of every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub mode: Mode,
    pub brightness: Brightness,
}

struct Shared {
    running: AtomicBool,
    settings: Mutex<Settings>,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn settings(&self) -> Settings {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.settings.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

/// Cloneable handle for changing mode and brightness from other tasks or
/// threads while the coordinator runs.
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
}

impl CoordinatorHandle {
    /// Takes effect from the next tick.
    pub fn set_mode(&self, mode: Mode) {
        self.shared.update(|s| s.mode = mode);
    }

    /// Clamped to 1-100; takes effect from the next tick.
    pub fn set_brightness(&self, level: i32) {
        self.shared.update(|s| s.brightness = Brightness::clamp(level));
    }

    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

/// Snapshot of one bulb, as returned by [`Coordinator::status_all`].
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulbReport {
    pub label: String,
    pub vendor: String,
    pub placement: String,
    pub connected: bool,
    pub last_color: Option<Color>,
    pub status: Option<DeviceInfo>,
}

struct Active {
    /// Cleared to stop this run's loop. Every run gets a fresh flag, so a
    /// loop detached by a slow `stop()` can never be revived.
    alive: Arc<AtomicBool>,
    update_loop: JoinHandle<()>,
    mailboxes: Arc<[Sender<Color>]>,
    workers: Vec<BulbWorker>,
}

/// Drives the sampling loop and fans colors out to the bulbs.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use screen_sync::{Coordinator, KasaBulb, KasaBulbConfig, Mode};
///
/// let bulbs: Vec<Box<dyn screen_sync::BulbControl>> = vec![
///     Box::new(KasaBulb::new(KasaBulbConfig::new("Desk Lamp", "center-left"))),
///     Box::new(KasaBulb::new(KasaBulbConfig::new("Shelf", "center-right"))),
/// ];
/// let mut coordinator = Coordinator::new(bulbs, Arc::new(my_processor));
/// coordinator.connect_all().await;
/// coordinator.start()?;
/// coordinator.set_mode(Mode::Shooter);
/// // ...
/// coordinator.stop().await;
/// ```
pub struct Coordinator {
    bulbs: Vec<BulbSlot>,
    processor: Arc<dyn ColorProcessor>,
    stats: Arc<dyn StatsSink>,
    config: CoordinatorConfig,
    shared: Arc<Shared>,
    active: Option<Active>,
}

impl Coordinator {
    pub fn new(bulbs: Vec<Box<dyn BulbControl>>, processor: Arc<dyn ColorProcessor>) -> Self {
        Coordinator {
            bulbs: bulbs.into_iter().map(BulbSlot::new).collect(),
            processor,
            stats: Arc::new(NoopStats),
            config: CoordinatorConfig::default(),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                settings: Mutex::new(Settings::default()),
            }),
            active: None,
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    /// Takes effect from the next tick.
    pub fn set_mode(&self, mode: Mode) {
        self.handle().set_mode(mode);
    }

    /// Clamped to 1-100; takes effect from the next tick.
    pub fn set_brightness(&self, level: i32) {
        self.handle().set_brightness(level);
    }

    /// `(label, placement)` of every bulb, in order.
    pub fn bulbs(&self) -> Vec<(&str, &str)> {
        self.bulbs
            .iter()
            .map(|slot| (slot.label.as_str(), slot.placement.as_str()))
            .collect()
    }

    /// Start the update loop and one worker per bulb.
    ///
    /// Fails with [`Error::AlreadyRunning`], and changes nothing, if the
    /// loop is already running. Must be called from within the async
    /// runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.active.is_some() {
            warn!("Start requested while screen sync is already running");
            return Err(Error::AlreadyRunning);
        }

        info!("Starting screen sync with {} bulb(s)", self.bulbs.len());
        for slot in &self.bulbs {
            info!(
                "  - {} - {} (placement: {})",
                slot.vendor, slot.label, slot.placement
            );
        }

        let mut senders = Vec::with_capacity(self.bulbs.len());
        let mut workers = Vec::with_capacity(self.bulbs.len());
        for slot in &self.bulbs {
            let (tx, worker) = BulbWorker::spawn(slot, Arc::clone(&self.stats));
            senders.push(tx);
            workers.push(worker);
        }
        let mailboxes: Arc<[Sender<Color>]> = senders.into();

        let alive = Arc::new(AtomicBool::new(true));
        self.shared.running.store(true, Ordering::SeqCst);
        let update_loop = runtime::spawn(run_update_loop(UpdateLoop {
            alive: Arc::clone(&alive),
            shared: Arc::clone(&self.shared),
            processor: Arc::clone(&self.processor),
            stats: Arc::clone(&self.stats),
            zones: self.bulbs.iter().map(|s| s.placement.clone()).collect(),
            mailboxes: Arc::clone(&mailboxes),
            config: self.config.clone(),
        }));

        self.active = Some(Active {
            alive,
            update_loop,
            mailboxes,
            workers,
        });
        info!("Screen sync started");
        Ok(())
    }

    /// Stop the loop and drive every bulb to the shutdown color.
    ///
    /// Waits a bounded time for the loop and for each worker, logging a
    /// warning for anything that overruns, then sends the shutdown color in
    /// the background and returns without waiting for it. Does nothing when
    /// already stopped.
    pub async fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            debug!("Stop requested but screen sync is not running");
            return;
        };

        info!("Stopping screen sync...");
        active.alive.store(false, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);

        let limit = self.config.loop_stop_timeout;
        match runtime::timeout(limit, active.update_loop).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Update loop ended abnormally: {e}"),
            Err(_) => warn!("Update loop still running after {limit:?}; detaching it"),
        }

        for mailbox in active.mailboxes.iter() {
            mailbox.close();
        }
        let limit = self.config.dispatch_stop_timeout;
        join_all(active.workers.into_iter().map(|w| w.finish(limit))).await;

        dispatch_final_color(&self.bulbs, self.config.shutdown_color);
        info!("Screen sync stopped");
    }

    /// Replace the bulb set. A running coordinator is stopped first (including
    /// the shutdown color) and restarted with the new set.
    pub async fn update_bulbs(&mut self, bulbs: Vec<Box<dyn BulbControl>>) -> Result<()> {
        let was_running = self.is_running();
        if was_running {
            self.stop().await;
        }
        self.bulbs = bulbs.into_iter().map(BulbSlot::new).collect();
        debug!("Bulb set replaced ({} bulb(s))", self.bulbs.len());
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// Connect every bulb concurrently. Returns how many succeeded; failures
    /// are already logged by the bulbs.
    pub async fn connect_all(&self) -> usize {
        let results = join_all(self.bulbs.iter().map(|slot| async move {
            slot.bulb.lock().await.connect().await.is_ok()
        }))
        .await;
        let connected = results.into_iter().filter(|ok| *ok).count();
        info!("Connected {connected} of {} bulb(s)", self.bulbs.len());
        connected
    }

    /// Query every bulb concurrently.
    pub async fn status_all(&self) -> Vec<BulbReport> {
        join_all(self.bulbs.iter().map(|slot| async move {
            let mut bulb = slot.bulb.lock().await;
            let status = bulb.status().await;
            BulbReport {
                label: slot.label.clone(),
                vendor: slot.vendor.to_string(),
                placement: slot.placement.clone(),
                connected: bulb.is_connected(),
                last_color: bulb.last_color(),
                status,
            }
        }))
        .await
    }

    /// Turn every bulb on or off.
    pub async fn power_all(&self, on: bool) {
        join_all(self.bulbs.iter().map(|slot| async move {
            let mut bulb = slot.bulb.lock().await;
            if on {
                bulb.turn_on().await;
            } else {
                bulb.turn_off().await;
            }
        }))
        .await;
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        // The loop notices before its next sample and exits; its workers
        // follow once the mailboxes are dropped.
        if let Some(active) = &self.active {
            active.alive.store(false, Ordering::SeqCst);
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

struct UpdateLoop {
    alive: Arc<AtomicBool>,
    shared: Arc<Shared>,
    processor: Arc<dyn ColorProcessor>,
    stats: Arc<dyn StatsSink>,
    zones: Vec<String>,
    mailboxes: Arc<[Sender<Color>]>,
    config: CoordinatorConfig,
}

async fn run_update_loop(ctx: UpdateLoop) {
    debug!("Update loop started");
    while ctx.is_alive() {
        observe(|| ctx.stats.record_update());
        match ctx.tick().await {
            Ok(()) => runtime::sleep(ctx.config.tick_interval).await,
            Err(e) => {
                warn!("Screen sync tick failed: {e}");
                runtime::sleep(ctx.config.error_backoff).await;
            }
        }
    }
    debug!("Update loop exited");
}

impl UpdateLoop {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn tick(&self) -> Result<()> {
        let settings = self.shared.settings();
        match settings.mode {
            Mode::Shooter => {
                let sampled = self.sample(CENTER_ZONE, Mode::Shooter).await?;
                let color = settings.brightness.apply(&sampled);
                for mailbox in self.mailboxes.iter() {
                    mailbox.post(color);
                }
            }
            Mode::Normal => {
                for (zone, mailbox) in self.zones.iter().zip(self.mailboxes.iter()) {
                    if !self.is_alive() {
                        break;
                    }
                    let sampled = self.sample(zone, Mode::Normal).await?;
                    mailbox.post(settings.brightness.apply(&sampled));
                }
            }
        }
        Ok(())
    }

    async fn sample(&self, zone: &str, mode: Mode) -> Result<Color> {
        runtime::timeout(
            self.config.sample_timeout,
            self.processor.process_screen_zone(zone, mode),
        )
        .await
        .map_err(|_| Error::SamplingTimeout(zone.to_string()))?
    }
}
