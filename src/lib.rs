//! # screen_sync
//!
//! Mirror the colors on your screen onto networked smart bulbs in near real time.
//!
//! This crate is the coordination and dispatch engine: it repeatedly asks a
//! [`ColorProcessor`] for the average color of screen zones, applies a global
//! brightness, and fans the result out to a set of bulbs. Screen capture
//! itself lives outside the crate.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use screen_sync::{BulbControl, Coordinator, KasaBulb, KasaBulbConfig, Mode, WizBulb, WizBulbConfig};
//!
//! async fn run(processor: Arc<dyn screen_sync::ColorProcessor>) -> Result<(), screen_sync::Error> {
//!     let bulbs: Vec<Box<dyn BulbControl>> = vec![
//!         Box::new(KasaBulb::new(KasaBulbConfig::new("Desk Lamp", "center-left"))),
//!         Box::new(WizBulb::new(WizBulbConfig::with_mac("a8bb50000001", "center-right"))),
//!     ];
//!
//!     let mut coordinator = Coordinator::new(bulbs, processor);
//!     coordinator.connect_all().await;
//!     coordinator.start()?;
//!
//!     // Switch to a single shared color and dim everything.
//!     coordinator.set_mode(Mode::Shooter);
//!     coordinator.set_brightness(60);
//!
//!     // ...
//!     coordinator.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Two Modes**: Per-zone colors in [`Mode::Normal`], one shared center color in [`Mode::Shooter`]
//! - **Live Settings**: Change mode and [`Brightness`] from any thread through a [`CoordinatorHandle`]
//! - **Bounded Dispatch**: One worker per bulb with a latest-value mailbox, so a slow bulb never delays the others
//! - **Rate Limiting and Dedup**: Every bulb owns a [`CommandGate`]
//! - **Vendors**: TP-Link Kasa ([`KasaBulb`]) and Wiz ([`WizBulb`]), or your own [`BulbControl`]
//! - **Discovery**: Find bulbs with [`discover_kasa`] and [`discover_wiz`]
//! - **Statistics**: Tick rate and command latency via [`RuntimeStats`]
//!
//! ## Communication
//!
//! Kasa bulbs are reached over UDP port 9999 and Wiz bulbs over UDP port
//! 38899. Both must be on the same local network.
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! screen-sync = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! screen-sync = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! screen-sync = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod bulb;
mod config;
mod coordinator;
mod dispatch;
mod errors;
mod kasa;
mod mailbox;
mod processor;
mod rate_limiter;
pub mod runtime;
mod stats;
mod transport;
mod types;
mod wiz;

// Re-export public API
pub use async_trait::async_trait;
pub use bulb::{BulbControl, CommandGate, DeviceInfo};
pub use config::{CoordinatorConfig, RetryPolicy};
pub use coordinator::{BulbReport, Coordinator, CoordinatorHandle, Settings};
pub use errors::Error;
pub use kasa::{KasaBulb, KasaBulbConfig, KasaDevice, discover_kasa};
pub use processor::{CENTER_ZONE, ColorProcessor};
pub use rate_limiter::RateLimiter;
pub use stats::{NoopStats, OperationSummary, RuntimeStats, StatsSink, StatsSummary};
pub use types::{Brightness, Color, Hsv, Mode};
pub use wiz::{WizBulb, WizBulbConfig, WizDevice, discover_wiz};
