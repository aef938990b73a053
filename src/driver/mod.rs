//! Automation driver abstraction
//!
//! The solving pipeline talks to the surface under automation through the
//! [`AutomationDriver`] trait: screenshots, marker presence checks, pointer
//! gestures, and text reads. A CDP-backed implementation for browser
//! surfaces lives in [`cdp`]; native surfaces plug in their own impl.

pub mod cdp;
pub mod input;

pub use cdp::{CdpDriver, DriverConfig};

use async_trait::async_trait;

use crate::error::{ExtractError, Result};
use crate::geometry::{Marker, Point, Region};

/// Capabilities the pipeline requires from the surface under automation.
///
/// Implementations are expected to be `Send + Sync` so the orchestrator can
/// hold one across await points. All coordinates are in surface pixels.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Captures a screenshot of the surface as encoded PNG bytes.
    ///
    /// When `region` is given the capture is clipped to that rectangle,
    /// otherwise the full viewport is returned.
    async fn capture_image(&self, region: Option<Region>) -> Result<Vec<u8>>;

    /// Reports whether the marker is currently present on the surface.
    async fn query_presence(&self, marker: &Marker) -> Result<bool>;

    /// Performs a humanized pointer drag from `from` to `to`, spread over
    /// roughly `duration_ms` milliseconds.
    async fn pointer_drag(&self, from: Point, to: Point, duration_ms: u64) -> Result<()>;

    /// Performs a single humanized click or tap at `point`.
    async fn pointer_click(&self, point: Point) -> Result<()>;

    /// Reads the visible text identified by the marker.
    async fn read_text(&self, marker: &Marker) -> Result<String>;
}

/// Compares a captured region against a pixel signature.
///
/// Decodes `png_bytes`, averages its RGB channels, and reports whether every
/// channel lies within `tolerance` of `sample`. This is how pixel-region
/// markers are answered on surfaces without a queryable DOM.
pub fn pixel_signature_matches(png_bytes: &[u8], sample: [u8; 3], tolerance: u8) -> Result<bool> {
    let mean = mean_rgb(png_bytes)?;
    let hit = mean
        .iter()
        .zip(sample.iter())
        .all(|(m, s)| m.abs_diff(*s) <= tolerance);
    Ok(hit)
}

/// Mean RGB of an encoded image, rounded to the nearest channel value.
pub fn mean_rgb(png_bytes: &[u8]) -> Result<[u8; 3]> {
    let img = image::load_from_memory(png_bytes)
        .map_err(|e| ExtractError::DecodeFailed(e.to_string()))?
        .to_rgb8();
    let pixel_count = (img.width() as u64 * img.height() as u64).max(1);

    let mut sums = [0u64; 3];
    for pixel in img.pixels() {
        sums[0] += pixel[0] as u64;
        sums[1] += pixel[1] as u64;
        sums[2] += pixel[2] as u64;
    }
    Ok([
        (sums[0] / pixel_count) as u8,
        (sums[1] / pixel_count) as u8,
        (sums[2] / pixel_count) as u8,
    ])
}
