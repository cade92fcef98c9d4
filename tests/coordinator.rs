#![cfg(feature = "runtime-tokio")]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use screen_sync::{
    BulbControl, CENTER_ZONE, Color, ColorProcessor, CommandGate, Coordinator, CoordinatorConfig,
    DeviceInfo, Error, Mode, RateLimiter, RuntimeStats, StatsSink, async_trait,
};

#[derive(Clone, Default)]
struct Recorder {
    colors: Arc<Mutex<Vec<Color>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    power: Arc<Mutex<Option<bool>>>,
}

impl Recorder {
    fn colors(&self) -> Vec<Color> {
        self.colors.lock().unwrap().clone()
    }

    fn last(&self) -> Option<Color> {
        self.colors.lock().unwrap().last().copied()
    }
}

struct MockBulb {
    label: String,
    placement: String,
    delay: Duration,
    connected: bool,
    gate: CommandGate,
    recorder: Recorder,
}

impl MockBulb {
    fn new(label: &str, placement: &str) -> (Self, Recorder) {
        let recorder = Recorder::default();
        let bulb = MockBulb {
            label: label.to_string(),
            placement: placement.to_string(),
            delay: Duration::ZERO,
            connected: false,
            gate: CommandGate::new(RateLimiter::new(Duration::ZERO)),
            recorder: recorder.clone(),
        };
        (bulb, recorder)
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn boxed(self) -> Box<dyn BulbControl> {
        Box::new(self)
    }
}

#[async_trait]
impl BulbControl for MockBulb {
    fn label(&self) -> &str {
        &self.label
    }

    fn placement(&self) -> &str {
        &self.placement
    }

    fn vendor(&self) -> &'static str {
        "Mock"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), Error> {
        self.connected = true;
        Ok(())
    }

    async fn set_color(&mut self, color: Color) {
        if !self.gate.admit_color(&color) {
            return;
        }
        let now = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.recorder.colors.lock().unwrap().push(color);
        self.gate.record_color(color);
    }

    async fn set_brightness(&mut self, _level: u8) {}

    async fn turn_on(&mut self) {
        *self.recorder.power.lock().unwrap() = Some(true);
    }

    async fn turn_off(&mut self) {
        *self.recorder.power.lock().unwrap() = Some(false);
    }

    async fn status(&mut self) -> Option<DeviceInfo> {
        self.connected.then(|| DeviceInfo {
            name: self.label.clone(),
            color: self.gate.last_color(),
            ..DeviceInfo::default()
        })
    }

    fn last_color(&self) -> Option<Color> {
        self.gate.last_color()
    }
}

/// Fixed color per zone; records every call.
#[derive(Default)]
struct ZoneColors {
    colors: HashMap<String, Color>,
    calls: Mutex<Vec<(String, Mode)>>,
    failing: AtomicBool,
}

impl ZoneColors {
    fn new(colors: &[(&str, Color)]) -> Arc<Self> {
        Arc::new(ZoneColors {
            colors: colors.iter().map(|(z, c)| (z.to_string(), *c)).collect(),
            ..ZoneColors::default()
        })
    }

    fn calls(&self) -> Vec<(String, Mode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ColorProcessor for ZoneColors {
    async fn process_screen_zone(&self, zone: &str, mode: Mode) -> Result<Color, Error> {
        self.calls.lock().unwrap().push((zone.to_string(), mode));
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::sampling(zone, "capture failed"));
        }
        Ok(self.colors.get(zone).copied().unwrap_or_default())
    }
}

/// A new red level on every call, so nothing is deduplicated.
#[derive(Default)]
struct Fading(AtomicU8);

#[async_trait]
impl ColorProcessor for Fading {
    async fn process_screen_zone(&self, _zone: &str, _mode: Mode) -> Result<Color, Error> {
        let red = self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Color::rgb(red, 0, 0))
    }
}

/// Takes `delay` per sample and tracks how many samples overlap.
struct Sluggish {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Sluggish {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Sluggish {
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ColorProcessor for Sluggish {
    async fn process_screen_zone(&self, _zone: &str, _mode: Mode) -> Result<Color, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GREEN)
    }
}

/// Counts ticks.
#[derive(Default)]
struct TickCounter(AtomicUsize);

impl StatsSink for TickCounter {
    fn record_update(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn record_timing(&self, _operation: &str, _elapsed: Duration) {}
}

const RED: Color = Color::rgb(255, 0, 0);
const GREEN: Color = Color::rgb(0, 255, 0);
const BLUE: Color = Color::rgb(0, 0, 255);
const SHUTDOWN: Color = Color::rgb(127, 110, 75);

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        tick_interval: Duration::from_millis(1),
        error_backoff: Duration::from_millis(5),
        ..CoordinatorConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_normal_mode_mirrors_each_zone() {
    let (left, left_rec) = MockBulb::new("left bulb", "left");
    let (right, right_rec) = MockBulb::new("right bulb", "right");
    let processor = ZoneColors::new(&[("left", RED), ("right", BLUE), (CENTER_ZONE, GREEN)]);

    let mut coordinator =
        Coordinator::new(vec![left.boxed(), right.boxed()], processor.clone()).with_config(fast_config());
    coordinator.start().unwrap();

    assert!(wait_until(|| left_rec.last() == Some(RED) && right_rec.last() == Some(BLUE)).await);
    coordinator.stop().await;

    let calls = processor.calls();
    assert!(calls.iter().all(|(_, mode)| *mode == Mode::Normal));
    assert!(calls.iter().all(|(zone, _)| zone != CENTER_ZONE));
}

#[tokio::test]
async fn test_shooter_mode_shares_center_color() {
    let (left, left_rec) = MockBulb::new("left bulb", "left");
    let (right, right_rec) = MockBulb::new("right bulb", "right");
    let processor = ZoneColors::new(&[("left", RED), ("right", BLUE), (CENTER_ZONE, GREEN)]);

    let mut coordinator =
        Coordinator::new(vec![left.boxed(), right.boxed()], processor.clone()).with_config(fast_config());
    coordinator.set_mode(Mode::Shooter);
    coordinator.start().unwrap();

    assert!(wait_until(|| left_rec.last() == Some(GREEN) && right_rec.last() == Some(GREEN)).await);
    coordinator.stop().await;

    assert!(!left_rec.colors().contains(&RED));
    assert!(!right_rec.colors().contains(&BLUE));
    assert!(
        processor
            .calls()
            .iter()
            .all(|(zone, mode)| zone == CENTER_ZONE && *mode == Mode::Shooter)
    );
}

#[tokio::test]
async fn test_shooter_mode_samples_once_per_tick() {
    let mut bulbs = Vec::new();
    let mut recorders = Vec::new();
    for (label, placement) in [("a", "left"), ("b", "center-left"), ("c", "right"), ("d", "top")] {
        let (bulb, rec) = MockBulb::new(label, placement);
        bulbs.push(bulb.boxed());
        recorders.push(rec);
    }
    let processor = ZoneColors::new(&[(CENTER_ZONE, GREEN)]);
    let ticks = Arc::new(TickCounter::default());

    let mut coordinator = Coordinator::new(bulbs, processor.clone())
        .with_config(fast_config())
        .with_stats(ticks.clone());
    coordinator.set_mode(Mode::Shooter);
    coordinator.start().unwrap();

    assert!(wait_until(|| recorders.iter().all(|r| r.last() == Some(GREEN))).await);
    assert!(wait_until(|| ticks.0.load(Ordering::SeqCst) >= 10).await);
    coordinator.stop().await;

    let calls = processor.calls().len();
    let ticks = ticks.0.load(Ordering::SeqCst);
    assert!(calls > 0);
    assert!(calls <= ticks, "{calls} samples for {ticks} ticks");
}

#[tokio::test]
async fn test_brightness_scales_colors() {
    let (bulb, rec) = MockBulb::new("bulb", "left");
    let processor = ZoneColors::new(&[("left", RED)]);

    let mut coordinator = Coordinator::new(vec![bulb.boxed()], processor).with_config(fast_config());
    coordinator.set_brightness(50);
    coordinator.start().unwrap();

    assert!(wait_until(|| rec.last() == Some(Color::rgb(127, 0, 0))).await);
    assert!(!rec.colors().contains(&RED));

    // clamped to 100
    coordinator.set_brightness(250);
    assert_eq!(coordinator.settings().brightness.value(), 100);
    assert!(wait_until(|| rec.last() == Some(RED)).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_stop_sends_shutdown_color() {
    let (left, left_rec) = MockBulb::new("left bulb", "left");
    let (right, right_rec) = MockBulb::new("right bulb", "right");
    let processor = ZoneColors::new(&[("left", RED), ("right", BLUE)]);

    let mut coordinator =
        Coordinator::new(vec![left.boxed(), right.boxed()], processor).with_config(fast_config());
    coordinator.start().unwrap();
    assert!(wait_until(|| left_rec.last().is_some() && right_rec.last().is_some()).await);

    coordinator.stop().await;
    assert!(!coordinator.is_running());
    assert!(wait_until(|| left_rec.last() == Some(SHUTDOWN) && right_rec.last() == Some(SHUTDOWN)).await);

    // Nothing is sent after the shutdown color.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(left_rec.last(), Some(SHUTDOWN));
    assert_eq!(right_rec.last(), Some(SHUTDOWN));
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (bulb, _rec) = MockBulb::new("bulb", "left");
    let processor = ZoneColors::new(&[("left", RED)]);

    let mut coordinator = Coordinator::new(vec![bulb.boxed()], processor).with_config(fast_config());
    coordinator.start().unwrap();
    assert_eq!(coordinator.start().unwrap_err().to_string(), Error::AlreadyRunning.to_string());
    assert!(coordinator.is_running());
    assert!(coordinator.handle().is_running());

    coordinator.stop().await;
    assert!(!coordinator.handle().is_running());
    // stopping again does nothing
    coordinator.stop().await;

    coordinator.start().unwrap();
    assert!(coordinator.is_running());
    coordinator.stop().await;
}

#[tokio::test]
async fn test_update_bulbs_while_running() {
    let (old, old_rec) = MockBulb::new("old", "left");
    let (new, new_rec) = MockBulb::new("new", "right");
    let processor = ZoneColors::new(&[("left", RED), ("right", BLUE)]);

    let mut coordinator = Coordinator::new(vec![old.boxed()], processor).with_config(fast_config());
    coordinator.start().unwrap();
    assert!(wait_until(|| old_rec.last() == Some(RED)).await);

    coordinator.update_bulbs(vec![new.boxed()]).await.unwrap();
    assert!(coordinator.is_running());
    assert_eq!(coordinator.bulbs(), vec![("new", "right")]);

    assert!(wait_until(|| new_rec.last() == Some(BLUE)).await);
    assert!(wait_until(|| old_rec.last() == Some(SHUTDOWN)).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_update_bulbs_while_stopped_stays_stopped() {
    let (old, _) = MockBulb::new("old", "left");
    let (new, new_rec) = MockBulb::new("new", "right");
    let processor = ZoneColors::new(&[("right", BLUE)]);

    let mut coordinator = Coordinator::new(vec![old.boxed()], processor);
    coordinator.update_bulbs(vec![new.boxed()]).await.unwrap();
    assert!(!coordinator.is_running());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(new_rec.colors().is_empty());
}

#[tokio::test]
async fn test_sampling_errors_are_survived() {
    let (bulb, rec) = MockBulb::new("bulb", "left");
    let processor = ZoneColors::new(&[("left", GREEN)]);
    processor.failing.store(true, Ordering::SeqCst);

    let mut coordinator = Coordinator::new(vec![bulb.boxed()], processor.clone()).with_config(fast_config());
    coordinator.start().unwrap();

    assert!(wait_until(|| processor.calls().len() >= 3).await);
    assert!(rec.colors().is_empty());
    assert!(coordinator.is_running());

    processor.failing.store(false, Ordering::SeqCst);
    assert!(wait_until(|| rec.last() == Some(GREEN)).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_slow_bulb_does_not_hold_back_others() {
    let (slow, slow_rec) = MockBulb::new("slow", "left");
    let slow = slow.slow(Duration::from_millis(300));
    let (fast, fast_rec) = MockBulb::new("fast", "right");

    let mut coordinator = Coordinator::new(vec![slow.boxed(), fast.boxed()], Arc::new(Fading::default()))
        .with_config(fast_config());
    coordinator.start().unwrap();

    assert!(wait_until(|| fast_rec.colors().len() >= 5).await);
    assert!(slow_rec.colors().len() <= 1);
    coordinator.stop().await;

    assert_eq!(slow_rec.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(fast_rec.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_mode_switch_from_another_thread() {
    let (bulb, rec) = MockBulb::new("bulb", "left");
    let processor = ZoneColors::new(&[("left", RED), (CENTER_ZONE, GREEN)]);

    let mut coordinator = Coordinator::new(vec![bulb.boxed()], processor).with_config(fast_config());
    coordinator.start().unwrap();
    assert!(wait_until(|| rec.last() == Some(RED)).await);

    let handle = coordinator.handle();
    std::thread::spawn(move || handle.set_mode(Mode::Shooter))
        .join()
        .unwrap();
    assert_eq!(coordinator.settings().mode, Mode::Shooter);
    assert!(wait_until(|| rec.last() == Some(GREEN)).await);

    coordinator.set_mode(Mode::Normal);
    assert!(wait_until(|| rec.last() == Some(RED)).await);
    coordinator.stop().await;
}

#[tokio::test]
async fn test_stats_are_recorded() {
    let (bulb, rec) = MockBulb::new("bulb", "left");
    let stats = Arc::new(RuntimeStats::new());

    let mut coordinator = Coordinator::new(vec![bulb.boxed()], Arc::new(Fading::default()))
        .with_config(fast_config())
        .with_stats(stats.clone());
    coordinator.start().unwrap();
    assert!(wait_until(|| rec.colors().len() >= 3).await);
    coordinator.stop().await;

    let summary = stats.summary();
    assert!(summary.updates >= 3);
    let set_color = summary
        .operations
        .iter()
        .find(|op| op.name == "set_color")
        .unwrap();
    assert!(set_color.count >= 3);
}

#[tokio::test]
async fn test_maintenance_operations() {
    let (left, left_rec) = MockBulb::new("left bulb", "left");
    let (right, right_rec) = MockBulb::new("right bulb", "right");
    let coordinator = Coordinator::new(vec![left.boxed(), right.boxed()], ZoneColors::new(&[]));

    let before = coordinator.status_all().await;
    assert!(before.iter().all(|r| !r.connected && r.status.is_none()));

    assert_eq!(coordinator.connect_all().await, 2);
    let after = coordinator.status_all().await;
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].label, "left bulb");
    assert_eq!(after[0].vendor, "Mock");
    assert_eq!(after[1].placement, "right");
    assert!(after.iter().all(|r| r.connected));
    assert_eq!(after[1].status.as_ref().unwrap().name, "right bulb");

    coordinator.power_all(false).await;
    assert_eq!(*left_rec.power.lock().unwrap(), Some(false));
    assert_eq!(*right_rec.power.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_stop_interrupts_a_long_normal_tick() {
    let mut bulbs = Vec::new();
    for (label, placement) in [("a", "left"), ("b", "center"), ("c", "right")] {
        bulbs.push(MockBulb::new(label, placement).0.boxed());
    }
    let processor = Sluggish::new(Duration::from_millis(900));

    let mut coordinator = Coordinator::new(bulbs, processor.clone()).with_config(fast_config());
    coordinator.start().unwrap();
    assert!(wait_until(|| processor.calls.load(Ordering::SeqCst) >= 1).await);

    // One tick samples three zones (2.7 s); stop must not wait for all of them.
    let started = Instant::now();
    coordinator.stop().await;
    assert!(started.elapsed() < coordinator.config().loop_stop_timeout);

    let calls = processor.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(processor.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn test_restart_never_revives_a_detached_loop() {
    let zones = ["left", "center", "right"];
    let bulbs = || zones.iter().map(|z| MockBulb::new(z, z).0.boxed()).collect::<Vec<_>>();
    let processor = Sluggish::new(Duration::from_millis(300));

    let mut coordinator = Coordinator::new(bulbs(), processor.clone()).with_config(CoordinatorConfig {
        // give up on the old loop while it is still mid-sample
        loop_stop_timeout: Duration::from_millis(50),
        ..fast_config()
    });
    coordinator.start().unwrap();
    assert!(wait_until(|| processor.calls.load(Ordering::SeqCst) >= 1).await);

    coordinator.update_bulbs(bulbs()).await.unwrap();
    assert!(coordinator.is_running());

    // The detached loop finishes its sample and exits; only the new one remains.
    tokio::time::sleep(Duration::from_millis(700)).await;
    processor.max_in_flight.store(processor.in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(processor.max_in_flight.load(Ordering::SeqCst), 1);

    coordinator.stop().await;
}
