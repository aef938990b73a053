//! Challenge detection
//!
//! Scans a surface for the challenge wrapper and classifies which variant
//! is showing. A scan is a fixed ladder: wrapper gates first (no gate
//! answering means no challenge at all), then each variant's markers in
//! priority order. When markers for more than one variant answer at once,
//! the scan logs the ambiguity and keeps the highest-priority variant.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::challenge::{CaptchaChallenge, ChallengeVariant, Surface};
use crate::driver::AutomationDriver;
use crate::error::Result;
use crate::geometry::{geometry_for, Marker, SurfaceGeometry};
use crate::metrics::global_metrics;

/// Classifies what is currently blocking a surface
pub struct Detector {
    surface: Surface,
    geometry: &'static SurfaceGeometry,
}

impl Detector {
    /// Detector over one surface's marker tables
    pub fn new(surface: Surface) -> Self {
        Self {
            surface,
            geometry: geometry_for(surface),
        }
    }

    /// Single-shot scan.
    ///
    /// `Ok(None)` means nothing is blocking the surface: either no wrapper
    /// gate answered, or a wrapper answered but no variant markers did
    /// (the widget has not rendered its body yet).
    #[instrument(skip(self, driver), fields(surface = %self.surface))]
    pub async fn scan<D>(&self, driver: &D) -> Result<Option<CaptchaChallenge>>
    where
        D: AutomationDriver + ?Sized,
    {
        if !self.any_present(driver, self.geometry.gates).await? {
            debug!("no challenge wrapper on surface");
            global_metrics().record_scan(false);
            return Ok(None);
        }

        let mut hits: Vec<ChallengeVariant> = Vec::new();
        for variant in ChallengeVariant::PRIORITY {
            if self
                .any_present(driver, self.geometry.markers_for(variant))
                .await?
            {
                hits.push(variant);
            }
        }

        match hits.as_slice() {
            [] => {
                debug!("wrapper present but no variant markers answered");
                global_metrics().record_scan(false);
                Ok(None)
            }
            [variant] => {
                debug!(variant = %variant, "challenge detected");
                global_metrics().record_scan(true);
                Ok(Some(CaptchaChallenge::new(*variant, self.surface)))
            }
            [winner, ..] => {
                warn!(
                    ?hits,
                    winner = %winner,
                    "markers for multiple variants answered; keeping highest priority"
                );
                global_metrics().record_ambiguous_detection();
                global_metrics().record_scan(true);
                Ok(Some(CaptchaChallenge::new(*winner, self.surface)))
            }
        }
    }

    /// Polls [`scan`](Self::scan) until a challenge shows or `window`
    /// elapses. A zero window degenerates to a single scan.
    ///
    /// Only the initial scan is polled this way, because the widget may
    /// still be rendering when the caller asks. Retry and verification
    /// scans are single-shot.
    pub async fn scan_with_window<D>(
        &self,
        driver: &D,
        window: Duration,
        interval: Duration,
    ) -> Result<Option<CaptchaChallenge>>
    where
        D: AutomationDriver + ?Sized,
    {
        if window.is_zero() {
            return self.scan(driver).await;
        }

        let deadline = Instant::now() + window;
        loop {
            if let Some(challenge) = self.scan(driver).await? {
                return Ok(Some(challenge));
            }
            if Instant::now() >= deadline {
                debug!(
                    window_ms = window.as_millis() as u64,
                    "detect window elapsed without a challenge"
                );
                return Ok(None);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn any_present<D>(&self, driver: &D, markers: &[Marker]) -> Result<bool>
    where
        D: AutomationDriver + ?Sized,
    {
        for marker in markers {
            if driver.query_presence(marker).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Region};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WRAPPER: &str = ".captcha-disable-scroll";
    const ROTATE_INNER: &str = "[data-testid=whirl-inner-img]";
    const PUZZLE_PIECE: &str = "img.captcha_verify_img_slide";
    const ICON_IMAGE: &str = "#captcha-verify-image[src*=\"/icon\"]";

    /// Driver stub with a fixed set of present selectors
    struct MarkerBoard {
        present: HashSet<&'static str>,
    }

    impl MarkerBoard {
        fn new(present: &[&'static str]) -> Self {
            Self {
                present: present.iter().copied().collect(),
            }
        }
    }

    #[async_trait]
    impl AutomationDriver for MarkerBoard {
        async fn capture_image(&self, _region: Option<Region>) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn query_presence(&self, marker: &Marker) -> Result<bool> {
            match marker {
                Marker::Css(sel) => Ok(self.present.contains(sel)),
                Marker::PixelRegion { .. } => Ok(false),
            }
        }

        async fn pointer_drag(&self, _from: Point, _to: Point, _duration_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn pointer_click(&self, _point: Point) -> Result<()> {
            Ok(())
        }

        async fn read_text(&self, _marker: &Marker) -> Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn no_wrapper_means_no_challenge() {
        let driver = MarkerBoard::new(&[ROTATE_INNER]);
        let detector = Detector::new(Surface::DesktopBrowser);
        assert!(detector.scan(&driver).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrapper_alone_is_not_a_challenge() {
        let driver = MarkerBoard::new(&[WRAPPER]);
        let detector = Detector::new(Surface::DesktopBrowser);
        assert!(detector.scan(&driver).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_markers_classify_rotate() {
        let driver = MarkerBoard::new(&[WRAPPER, ROTATE_INNER]);
        let detector = Detector::new(Surface::DesktopBrowser);
        let challenge = detector.scan(&driver).await.unwrap().unwrap();
        assert_eq!(challenge.variant, ChallengeVariant::Rotate);
        assert_eq!(challenge.surface, Surface::DesktopBrowser);
    }

    #[tokio::test]
    async fn puzzle_piece_classifies_slide_puzzle() {
        let driver = MarkerBoard::new(&[WRAPPER, PUZZLE_PIECE]);
        let detector = Detector::new(Surface::DesktopBrowser);
        let challenge = detector.scan(&driver).await.unwrap().unwrap();
        assert_eq!(challenge.variant, ChallengeVariant::SlidePuzzle);
    }

    #[tokio::test]
    async fn icon_image_classifies_icon_select() {
        let driver = MarkerBoard::new(&[WRAPPER, ICON_IMAGE]);
        let detector = Detector::new(Surface::MobileBrowser);
        let challenge = detector.scan(&driver).await.unwrap().unwrap();
        assert_eq!(challenge.variant, ChallengeVariant::IconSelect);
        assert_eq!(challenge.surface, Surface::MobileBrowser);
    }

    #[tokio::test]
    async fn ambiguous_markers_keep_priority_winner() {
        let driver = MarkerBoard::new(&[WRAPPER, ROTATE_INNER, PUZZLE_PIECE]);
        let detector = Detector::new(Surface::DesktopBrowser);
        let challenge = detector.scan(&driver).await.unwrap().unwrap();
        assert_eq!(challenge.variant, ChallengeVariant::Rotate);
    }

    /// Driver stub whose challenge renders only after a few scans
    struct LateBoard {
        visible_from_scan: usize,
        gate_queries: AtomicUsize,
    }

    impl LateBoard {
        fn rendered(&self) -> bool {
            self.gate_queries.load(Ordering::SeqCst) >= self.visible_from_scan
        }
    }

    #[async_trait]
    impl AutomationDriver for LateBoard {
        async fn capture_image(&self, _region: Option<Region>) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn query_presence(&self, marker: &Marker) -> Result<bool> {
            match marker {
                Marker::Css(WRAPPER) => {
                    self.gate_queries.fetch_add(1, Ordering::SeqCst);
                    Ok(self.rendered())
                }
                Marker::Css(ROTATE_INNER) => Ok(self.rendered()),
                _ => Ok(false),
            }
        }

        async fn pointer_drag(&self, _from: Point, _to: Point, _duration_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn pointer_click(&self, _point: Point) -> Result<()> {
            Ok(())
        }

        async fn read_text(&self, _marker: &Marker) -> Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn polling_window_catches_late_challenge() {
        let driver = LateBoard {
            visible_from_scan: 3,
            gate_queries: AtomicUsize::new(0),
        };
        let detector = Detector::new(Surface::DesktopBrowser);
        let challenge = detector
            .scan_with_window(&driver, Duration::from_secs(2), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(challenge.unwrap().variant, ChallengeVariant::Rotate);
        assert!(driver.gate_queries.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn zero_window_scans_exactly_once() {
        let driver = LateBoard {
            visible_from_scan: 3,
            gate_queries: AtomicUsize::new(0),
        };
        let detector = Detector::new(Surface::DesktopBrowser);
        let challenge = detector
            .scan_with_window(&driver, Duration::ZERO, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(challenge.is_none());
        assert_eq!(driver.gate_queries.load(Ordering::SeqCst), 1);
    }
}
