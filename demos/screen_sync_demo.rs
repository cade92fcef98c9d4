//! Drive real bulbs from a synthetic screen.
//!
//! This demo wires Kasa and Wiz bulbs to a color processor that slowly cycles
//! through the hue wheel, each zone offset from the others, so the effect of
//! placements, modes and brightness can be watched without a screen capture
//! backend.
//!
//! Run with: cargo run --example screen_sync_demo -- --help

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Parser, Subcommand};
use screen_sync::{
    BulbControl, CENTER_ZONE, Color, ColorProcessor, Coordinator, Error, Hsv, KasaBulb,
    KasaBulbConfig, Mode, RuntimeStats, WizBulb, WizBulbConfig, async_trait, discover_kasa,
    discover_wiz,
};
use strum::IntoEnumIterator;

#[derive(Parser)]
#[command(name = "screen-sync-demo")]
#[command(about = "Mirror a synthetic screen onto smart bulbs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover Kasa and Wiz bulbs on the network
    Discover {
        /// Discovery timeout in seconds (default: 3)
        #[arg(short, long, default_value = "3")]
        timeout: u64,
    },

    /// Connect to the bulbs and print their status
    Status {
        #[command(flatten)]
        bulbs: BulbArgs,
    },

    /// Run the sync loop for a while, then restore the bulbs
    Run {
        #[command(flatten)]
        bulbs: BulbArgs,

        /// Sampling mode
        #[arg(short, long, default_value = "normal", value_parser = mode_parser())]
        mode: Mode,

        /// Brightness (1-100)
        #[arg(short, long, default_value = "100")]
        brightness: i32,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "30")]
        seconds: u64,
    },
}

#[derive(clap::Args)]
struct BulbArgs {
    /// Kasa bulb as ALIAS@PLACEMENT (repeatable)
    #[arg(long = "kasa", value_name = "ALIAS@PLACEMENT")]
    kasa: Vec<String>,

    /// Wiz bulb as MAC@PLACEMENT or IP@PLACEMENT (repeatable)
    #[arg(long = "wiz", value_name = "ID@PLACEMENT")]
    wiz: Vec<String>,
}

impl BulbArgs {
    fn build(&self) -> Result<Vec<Box<dyn BulbControl>>, String> {
        let mut bulbs: Vec<Box<dyn BulbControl>> = Vec::new();
        for arg in &self.kasa {
            let (alias, placement) = split_placement(arg)?;
            bulbs.push(Box::new(KasaBulb::new(KasaBulbConfig::new(alias, placement))));
        }
        for arg in &self.wiz {
            let (id, placement) = split_placement(arg)?;
            let config = match id.parse::<IpAddr>() {
                Ok(ip) => WizBulbConfig::with_host(ip, placement),
                Err(_) => WizBulbConfig::with_mac(id, placement),
            };
            bulbs.push(Box::new(WizBulb::new(config)));
        }
        if bulbs.is_empty() {
            return Err("no bulbs given; use --kasa and/or --wiz".into());
        }
        Ok(bulbs)
    }
}

fn mode_parser() -> impl TypedValueParser<Value = Mode> {
    PossibleValuesParser::new(Mode::iter().map(<&'static str>::from))
        .try_map(|name| Mode::parse(&name))
}

fn split_placement(arg: &str) -> Result<(&str, &str), String> {
    arg.rsplit_once('@')
        .filter(|(id, placement)| !id.is_empty() && !placement.is_empty())
        .ok_or_else(|| format!("expected ID@PLACEMENT, got '{arg}'"))
}

/// Cycles the hue wheel once every `period`; every zone gets its own offset.
struct HueCycle {
    started: Instant,
    period: Duration,
}

impl HueCycle {
    fn offset(zone: &str) -> u16 {
        match zone {
            CENTER_ZONE => 0,
            "left" | "center-left" => 90,
            "right" | "center-right" => 180,
            other => (other.bytes().map(u32::from).sum::<u32>() * 37 % 360) as u16,
        }
    }
}

#[async_trait]
impl ColorProcessor for HueCycle {
    async fn process_screen_zone(&self, zone: &str, mode: Mode) -> Result<Color, Error> {
        let progress = self.started.elapsed().as_secs_f64() / self.period.as_secs_f64();
        let hue = ((progress.fract() * 360.0) as u16 + Self::offset(zone)) % 360;
        // Shooter sampling is usually a tighter, more saturated crop.
        let saturation = if mode == Mode::Shooter { 100 } else { 80 };
        Hsv::create(hue, saturation, 100)
            .map(|hsv| hsv.to_color())
            .ok_or_else(|| Error::sampling(zone, "hue out of range"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { timeout } => {
            let window = Duration::from_secs(timeout);
            println!("Discovering bulbs for {timeout}s...");

            let (kasa, wiz) = tokio::join!(discover_kasa(window), discover_wiz(window));
            let kasa = kasa?;
            let wiz = wiz?;

            println!("Found {} Kasa device(s):", kasa.len());
            for device in &kasa {
                println!(
                    "  - {} at {} ({})",
                    device.alias,
                    device.addr.ip(),
                    device.model.as_deref().unwrap_or("unknown model")
                );
            }
            println!("Found {} Wiz bulb(s):", wiz.len());
            for bulb in &wiz {
                println!("  - {} at {}", bulb.mac, bulb.addr.ip());
            }
        }

        Commands::Status { bulbs } => {
            let coordinator = Coordinator::new(bulbs.build()?, Arc::new(hue_cycle()));
            coordinator.connect_all().await;
            for report in coordinator.status_all().await {
                println!("{} {} (placement: {})", report.vendor, report.label, report.placement);
                match report.status {
                    Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                    None if report.connected => println!("  ✗ no answer"),
                    None => println!("  ✗ not connected"),
                }
            }
        }

        Commands::Run {
            bulbs,
            mode,
            brightness,
            seconds,
        } => {
            let stats = Arc::new(RuntimeStats::new());
            let mut coordinator = Coordinator::new(bulbs.build()?, Arc::new(hue_cycle()))
                .with_stats(stats.clone());

            let connected = coordinator.connect_all().await;
            if connected == 0 {
                eprintln!("No bulb could be connected.");
                return Ok(());
            }

            coordinator.set_mode(mode);
            coordinator.set_brightness(brightness);
            coordinator.start()?;
            println!("Syncing {connected} bulb(s) in {mode} mode for {seconds}s (Ctrl+C to stop early)...");

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => println!("\nInterrupted."),
            }

            coordinator.stop().await;
            // Give the shutdown color a moment to reach the bulbs.
            tokio::time::sleep(Duration::from_millis(500)).await;

            println!("{}", serde_json::to_string_pretty(&stats.summary())?);
        }
    }

    Ok(())
}

fn hue_cycle() -> HueCycle {
    HueCycle {
        started: Instant::now(),
        period: Duration::from_secs(20),
    }
}
