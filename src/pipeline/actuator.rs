//! Solution actuation
//!
//! Turns a typed [`Solution`] into real pointer input: one drag gesture
//! for the slider variants, an ordered click sequence plus a confirm
//! click for the point variants. The coordinate math is the inverse of
//! the extractor's crop transform, so a solution only makes sense
//! against the geometry table its evidence was cropped with.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::challenge::{CaptchaChallenge, Solution, Surface};
use crate::driver::AutomationDriver;
use crate::error::{ActuateError, Result};
use crate::geometry::{geometry_for, ClickGeometry, DragTrack, Point, SurfaceGeometry};

/// Shortest pause after a solution-point click, milliseconds
const CLICK_PAUSE_MIN_MS: u64 = 400;
/// Longest pause after a solution-point click, milliseconds
const CLICK_PAUSE_MAX_MS: u64 = 900;

/// Replays solutions as pointer input against one surface
pub struct Actuator {
    geometry: &'static SurfaceGeometry,
}

impl Actuator {
    /// Actuator bound to a surface's geometry table
    pub fn new(surface: Surface) -> Self {
        Self {
            geometry: geometry_for(surface),
        }
    }

    /// Replay `solution` against the live surface. Input goes out only
    /// after every target point has passed the surface bounds check.
    #[instrument(skip(self, driver, challenge, solution), fields(variant = %challenge.variant))]
    pub async fn actuate<D>(
        &self,
        driver: &D,
        challenge: &CaptchaChallenge,
        solution: &Solution,
    ) -> Result<()>
    where
        D: AutomationDriver + ?Sized,
    {
        if solution.variant() != challenge.variant {
            return Err(ActuateError::SolutionMismatch {
                challenge: challenge.variant.as_str(),
                solution: solution.variant().as_str(),
            }
            .into());
        }

        match solution {
            Solution::Rotate { angle } => {
                let track = &self.geometry.rotate.track;
                self.drag(driver, track, track.offset_for_angle(*angle))
                    .await
            }
            Solution::SlidePuzzle { slide_proportion } => {
                let track = &self.geometry.puzzle.track;
                self.drag(driver, track, track.offset_for_proportion(*slide_proportion))
                    .await
            }
            Solution::ShapeClick { points } => {
                self.click_sequence(driver, &self.geometry.shapes, points)
                    .await
            }
            Solution::IconSelect { points } => {
                self.click_sequence(driver, &self.geometry.icon, points)
                    .await
            }
        }
    }

    async fn drag<D>(&self, driver: &D, track: &DragTrack, offset: f64) -> Result<()>
    where
        D: AutomationDriver + ?Sized,
    {
        let end = track.end_point(offset);
        self.check_bounds(end)?;
        debug!(from = ?track.start, to = ?end, "dragging slider");
        driver.pointer_drag(track.start, end, track.duration_ms).await
    }

    async fn click_sequence<D>(
        &self,
        driver: &D,
        click: &ClickGeometry,
        points: &[Point],
    ) -> Result<()>
    where
        D: AutomationDriver + ?Sized,
    {
        // The service answers in crop-relative proportions and does not
        // guarantee they stay in [0, 1]. Validate the whole sequence
        // before dispatching anything; a half-actuated sequence would
        // burn the attempt on the surface side.
        let mut targets = Vec::with_capacity(points.len());
        for point in points {
            let target = click.region.denormalize(*point);
            self.check_bounds(target)?;
            targets.push(target);
        }

        for target in targets {
            debug!(point = ?target, "clicking solution point");
            driver.pointer_click(target).await?;
            tokio::time::sleep(Duration::from_millis(click_pause_ms())).await;
        }

        debug!(point = ?click.confirm, "clicking confirm");
        driver.pointer_click(click.confirm).await
    }

    fn check_bounds(&self, p: Point) -> Result<()> {
        if !self.geometry.bounds.contains(p) {
            return Err(ActuateError::PointOutOfBounds { x: p.x, y: p.y }.into());
        }
        Ok(())
    }
}

fn click_pause_ms() -> u64 {
    CLICK_PAUSE_MIN_MS + rand::random::<u64>() % (CLICK_PAUSE_MAX_MS - CLICK_PAUSE_MIN_MS + 1)
}
