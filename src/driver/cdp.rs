//! CDP-backed automation driver
//!
//! Drives the desktop and mobile browser surfaces over the Chrome DevTools
//! Protocol. CSS markers are answered in the DOM; pixel-region markers are
//! answered with a clipped capture and a signature comparison, so the same
//! marker tables work on surfaces without a queryable document.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, CaptureScreenshotParams,
    Viewport,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::challenge::Surface;
use crate::driver::{input, pixel_signature_matches, AutomationDriver};
use crate::error::{DetectError, DriverError, Error, ExtractError, Result};
use crate::geometry::{geometry_for, Marker, Point, Region};

/// Configuration for the browser under automation
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Viewport width (default: 1920)
    pub width: u32,
    /// Viewport height (default: 1080)
    pub height: u32,
    /// Enable the Chrome sandbox (default: true)
    pub sandbox: bool,
    /// User agent override (None = browser default)
    pub user_agent: Option<String>,
    /// Navigation timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Path to a Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Install anti-detection init scripts (default: true)
    pub stealth: bool,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: 1920,
            height: 1080,
            sandbox: true,
            user_agent: None,
            timeout_ms: 30000,
            chrome_path: None,
            stealth: true,
            extra_args: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Create a new config builder
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Config preset whose viewport matches the calibration tables for
    /// the given surface.
    pub fn for_surface(surface: Surface) -> Self {
        let bounds = geometry_for(surface).bounds;
        Self {
            width: bounds.width,
            height: bounds.height,
            ..Self::default()
        }
    }
}

/// Builder for DriverConfig
#[derive(Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set user agent
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.config.user_agent = Some(ua.into());
        self
    }

    /// Set navigation timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Enable/disable stealth init scripts
    pub fn stealth(mut self, stealth: bool) -> Self {
        self.config.stealth = stealth;
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.config.extra_args.push(arg.into());
        self
    }

    /// Build the config
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

/// Browser driver for the desktop and mobile web surfaces
pub struct CdpDriver {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    surface: Surface,
    config: DriverConfig,
}

impl CdpDriver {
    /// Launch a browser profiled for `surface` with the preset config
    #[instrument]
    pub async fn launch(surface: Surface) -> Result<Self> {
        Self::with_config(DriverConfig::for_surface(surface), surface).await
    }

    /// Launch a browser with a custom config
    #[instrument(skip(config))]
    pub async fn with_config(config: DriverConfig, surface: Surface) -> Result<Self> {
        if surface == Surface::NativeApp {
            return Err(DriverError::LaunchFailed(
                "native app surfaces are driven by an app harness, not CDP".to_string(),
            )
            .into());
        }

        info!(%surface, headless = config.headless, "launching browser");

        let mobile = surface == Surface::MobileBrowser;
        let mut builder = CdpBrowserConfig::builder();

        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: config.width,
            height: config.height,
            device_scale_factor: None,
            emulating_mobile: mobile,
            is_landscape: !mobile,
            has_touch: mobile,
        });

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        if let Some(ref ua) = config.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }

        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("browser handler event error");
                    break;
                }
            }
            debug!("browser handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        if config.stealth {
            install_stealth(&page, surface).await?;
        }

        info!("browser launched");

        Ok(Self {
            browser,
            handler: handler_task,
            page,
            surface,
            config,
        })
    }

    /// Navigate to the page hosting the challenge
    #[instrument(skip(self))]
    pub async fn goto(&self, url: &str) -> Result<()> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        tokio::time::timeout(timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| DriverError::Timeout(self.config.timeout_ms))??;

        debug!(url, "navigation complete");
        Ok(())
    }

    /// Surface this driver was launched for
    pub fn surface(&self) -> Surface {
        self.surface
    }

    /// Driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The underlying chromiumoxide page
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        info!("closing browser");

        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        // Wait for the handler to drain
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handler).await;

        info!("browser closed");
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for CdpDriver {
    async fn capture_image(&self, region: Option<Region>) -> Result<Vec<u8>> {
        let mut builder = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .from_surface(true);

        if let Some(region) = region {
            builder = builder.clip(Viewport {
                x: region.x as f64,
                y: region.y as f64,
                width: region.width as f64,
                height: region.height as f64,
                scale: 1.0,
            });
        }

        let resp = self.page.execute(builder.build()).await?;
        let data_b64: &str = resp.data.as_ref();
        let bytes = BASE64
            .decode(data_b64.as_bytes())
            .map_err(|e| ExtractError::DecodeFailed(e.to_string()))?;

        debug!(
            bytes = bytes.len(),
            clipped = region.is_some(),
            "captured screenshot"
        );
        Ok(bytes)
    }

    async fn query_presence(&self, marker: &Marker) -> Result<bool> {
        match marker {
            Marker::Css(selector) => {
                let script = format!(
                    r#"
                    (() => {{
                        const el = document.querySelector('{}');
                        return !!el && el.getClientRects().length > 0;
                    }})()
                    "#,
                    selector.replace('\'', "\\'")
                );

                let present: bool = self
                    .page
                    .evaluate(script.as_str())
                    .await
                    .map_err(|e| DetectError::ScanFailed(e.to_string()))?
                    .into_value()
                    .map_err(|e| DetectError::ScanFailed(e.to_string()))?;
                Ok(present)
            }
            Marker::PixelRegion {
                region,
                sample,
                tolerance,
            } => {
                let bytes = self.capture_image(Some(*region)).await?;
                pixel_signature_matches(&bytes, *sample, *tolerance)
            }
        }
    }

    async fn pointer_drag(&self, from: Point, to: Point, duration_ms: u64) -> Result<()> {
        input::humanized_drag(&self.page, from, to, duration_ms).await
    }

    async fn pointer_click(&self, point: Point) -> Result<()> {
        input::humanized_click(&self.page, point).await
    }

    async fn read_text(&self, marker: &Marker) -> Result<String> {
        match marker {
            Marker::Css(selector) => {
                let script = format!(
                    r#"
                    (() => {{
                        const el = document.querySelector('{}');
                        return el ? el.innerText : null;
                    }})()
                    "#,
                    selector.replace('\'', "\\'")
                );

                let text: Option<String> = self
                    .page
                    .evaluate(script.as_str())
                    .await
                    .map_err(|e| ExtractError::TextUnavailable(e.to_string()))?
                    .into_value()
                    .map_err(|e| ExtractError::TextUnavailable(e.to_string()))?;
                text.ok_or_else(|| DriverError::ElementNotFound(selector.to_string()).into())
            }
            Marker::PixelRegion { .. } => {
                Err(DriverError::MarkerUnsupported(marker.to_string()).into())
            }
        }
    }
}

/// Anti-detection init scripts, installed before any navigation.
///
/// The challenge widget fingerprints the environment before it renders, so
/// `navigator.webdriver` and friends are patched on every new document.
async fn install_stealth(page: &Page, surface: Surface) -> Result<()> {
    debug!("installing stealth init scripts");

    inject_on_new_document(page, HIDE_WEBDRIVER).await?;
    inject_on_new_document(page, MOCK_CHROME_RUNTIME).await?;
    inject_on_new_document(page, MOCK_LANGUAGES).await?;

    // Touch capability has to agree with the emulated viewport.
    let touch_points = if surface == Surface::MobileBrowser { 5 } else { 0 };
    let touch_script = format!(
        "Object.defineProperty(navigator, 'maxTouchPoints', {{ get: () => {touch_points}, configurable: true }});"
    );
    inject_on_new_document(page, &touch_script).await?;

    Ok(())
}

const HIDE_WEBDRIVER: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
"#;

const MOCK_CHROME_RUNTIME: &str = r#"
    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: function() {},
            sendMessage: function() {},
            onMessage: {
                addListener: function() {},
                removeListener: function() {}
            }
        };
    }
"#;

const MOCK_LANGUAGES: &str = r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });

    Object.defineProperty(navigator, 'language', {
        get: () => 'en-US',
        configurable: true
    });
"#;

async fn inject_on_new_document(page: &Page, script: &str) -> Result<()> {
    let params = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(script)
        .build()
        .map_err(Error::cdp)?;
    page.execute(params).await?;
    Ok(())
}
