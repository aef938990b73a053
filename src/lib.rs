//! captcha-pilot - Captcha Detection & Solving over Scripted Surfaces
//!
//! This crate detects captcha challenges on a live automation surface,
//! classifies the variant, extracts image evidence, asks a remote
//! recognition service for the answer, and replays that answer as
//! humanized pointer input, verifying and retrying until the challenge
//! clears or the attempt budget runs out.
//!
//! # Features
//!
//! - **Detection**: marker-based presence scan with a polled appearance
//!   window and deterministic variant tie-breaking
//! - **Evidence Extraction**: fixed-geometry screenshot crops per
//!   challenge variant, with circular masking for the rotate pair
//! - **Remote Solving**: one HTTP round trip per attempt against the
//!   recognition API, camelCase JSON on the wire
//! - **Actuation**: humanized drags and click sequences over the Chrome
//!   DevTools Protocol
//! - **Retry Orchestration**: scan, solve, actuate, verify, with attempt
//!   accounting and per-attempt wall-clock budgets
//!
//! # Architecture
//!
//! ```text
//! Orchestrator          scan ▶ extract ▶ solve ▶ actuate ▶ verify
//!   ├── Detector ──────▶ driver.query_presence (markers)
//!   ├── Extractor ─────▶ driver.capture_image (crops + masks)
//!   ├── SolverClient ──▶ recognition service (one HTTP POST/attempt)
//!   └── Actuator ──────▶ driver.pointer_drag / pointer_click
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use captcha_pilot::{CdpDriver, Orchestrator, SolverClient, SolverConfig, Surface};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SolverConfig::from_env()?;
//!     let surface = Surface::DesktopBrowser;
//!
//!     let driver = CdpDriver::launch(surface).await?;
//!     driver.goto("https://example.com/login").await?;
//!
//!     let client = SolverClient::new(&config)?;
//!     let orchestrator = Orchestrator::new(driver, client, surface, config)?;
//!     match orchestrator.solve_if_present().await {
//!         Ok(solved) => println!("clear after {} attempt(s)", solved.attempts_used),
//!         Err(gave_up) => eprintln!("{gave_up}"),
//!     }
//!
//!     orchestrator.into_driver().close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod challenge;
pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod pipeline;

// Re-exports for convenience
pub use challenge::{
    CaptchaChallenge, ChallengeVariant, Evidence, Solution, SolveResult, Solved, Surface,
};
pub use config::SolverConfig;
pub use driver::{AutomationDriver, CdpDriver, DriverConfig};
pub use error::{Error, GaveUp, Result};
pub use pipeline::{ChallengeSolver, Orchestrator, SolverClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
