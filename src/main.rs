//! captcha-pilot CLI
//!
//! Opens a page on a browser surface and solves whatever captcha
//! challenge is present there.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use captcha_pilot::metrics::global_metrics;
use captcha_pilot::{CdpDriver, DriverConfig, Orchestrator, SolverClient, SolverConfig, Surface};

/// Captcha detection and solving over a scripted browser surface
#[derive(Parser, Debug)]
#[command(name = "captcha-pilot")]
#[command(version)]
#[command(about = "Detects and solves captcha challenges on a live browser surface")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a URL and solve the captcha there, if any
    Solve {
        /// Page to open
        #[arg(long)]
        url: String,

        /// Surface profile to emulate
        #[arg(long, value_enum, default_value_t = SurfaceArg::Desktop)]
        surface: SurfaceArg,

        /// Attempt budget before giving up (overrides config)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Per-attempt wall-clock budget in seconds (overrides config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Run the browser headless
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        headless: bool,

        /// Path to a Chrome/Chromium executable
        #[arg(long)]
        chrome_path: Option<String>,
    },
}

/// CLI spelling of the browser surfaces with a bundled driver
#[derive(ValueEnum, Clone, Copy, Debug)]
enum SurfaceArg {
    /// Desktop browser viewport
    Desktop,
    /// Emulated mobile browser viewport
    Mobile,
}

impl From<SurfaceArg> for Surface {
    fn from(arg: SurfaceArg) -> Self {
        match arg {
            SurfaceArg::Desktop => Surface::DesktopBrowser,
            SurfaceArg::Mobile => Surface::MobileBrowser,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Solve {
            url,
            surface,
            max_attempts,
            timeout,
            headless,
            chrome_path,
        } => {
            solve(
                &url,
                surface.into(),
                max_attempts,
                timeout,
                headless,
                chrome_path,
            )
            .await
        }
    }
}

async fn solve(
    url: &str,
    surface: Surface,
    max_attempts: Option<u32>,
    timeout: Option<u64>,
    headless: bool,
    chrome_path: Option<String>,
) -> anyhow::Result<()> {
    let mut config = SolverConfig::from_env().context("loading solver config")?;
    if let Some(attempts) = max_attempts {
        config.max_attempts = attempts;
    }
    if let Some(secs) = timeout {
        config.attempt_timeout_ms = secs * 1000;
    }

    let mut driver_config = DriverConfig::for_surface(surface);
    driver_config.headless = headless;
    driver_config.chrome_path = chrome_path;

    let driver = CdpDriver::with_config(driver_config, surface)
        .await
        .context("launching browser")?;
    driver.goto(url).await.context("opening page")?;

    let client = SolverClient::new(&config).context("building solver client")?;
    let orchestrator = Orchestrator::new(driver, client, surface, config)?;
    let result = orchestrator.solve_if_present().await;

    info!(metrics = ?global_metrics().snapshot(), "run finished");
    orchestrator
        .into_driver()
        .close()
        .await
        .context("closing browser")?;

    match result {
        Ok(solved) => {
            info!(attempts_used = solved.attempts_used, "surface clear");
            Ok(())
        }
        Err(gave_up) => Err(gave_up.into()),
    }
}
