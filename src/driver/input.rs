//! Humanized pointer input
//!
//! Synthesizes drag and click gestures that read as human rather than
//! scripted: a pixel-stepped sweep with a shallow arc, a small overshoot
//! past the target, a correction wobble back through it, and a settle onto
//! the exact end point. Events go out as raw `Input.dispatchMouseEvent`
//! commands so no synthetic-event flags are set on the page.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::Page;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Point;

/// Pixels the sweep runs past the target before correcting back.
const OVERSHOOT_PX: f64 = 5.0;
/// Waypoints spent walking back off the overshoot.
const WOBBLE_STEPS: usize = 7;
/// Waypoints spent easing onto the exact end point.
const SETTLE_STEPS: usize = 6;
/// Floor on per-waypoint pacing so fast drags still emit distinct events.
const MIN_STEP_DELAY_MS: u64 = 2;

/// Drags the pointer from `from` to `to` over roughly `duration_ms`.
///
/// The pointer moves to the start, presses, sweeps along [`drag_path`] with
/// jittered pacing, pauses, and releases on the exact end point.
pub async fn humanized_drag(page: &Page, from: Point, to: Point, duration_ms: u64) -> Result<()> {
    debug!(from = ?from, to = ?to, duration_ms, "dispatching humanized drag");

    mouse_move(page, from, false).await?;
    natural_pause(80, 180).await;
    mouse_button(page, DispatchMouseEventType::MousePressed, from).await?;
    natural_pause(120, 260).await;

    let path = drag_path(from, to);
    let base_delay = (duration_ms / path.len().max(1) as u64).max(MIN_STEP_DELAY_MS);
    for waypoint in &path {
        mouse_move(page, *waypoint, true).await?;
        let delay = base_delay + rand::random::<u64>() % (base_delay / 2 + 1);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    natural_pause(180, 340).await;
    mouse_button(page, DispatchMouseEventType::MouseReleased, to).await?;
    Ok(())
}

/// Clicks at `point` with a short randomized press-release gap.
pub async fn humanized_click(page: &Page, point: Point) -> Result<()> {
    debug!(point = ?point, "dispatching humanized click");

    mouse_move(page, point, false).await?;
    natural_pause(60, 180).await;
    mouse_button(page, DispatchMouseEventType::MousePressed, point).await?;
    natural_pause(40, 90).await;
    mouse_button(page, DispatchMouseEventType::MouseReleased, point).await?;
    Ok(())
}

/// Waypoints for a drag from `from` to `to`.
///
/// Three phases: a one-pixel-stepped sweep along a shallow random arc that
/// overshoots the target by a few pixels, a wobbled walk back through the
/// target, and an eased settle whose final waypoint is exactly `to`.
pub fn drag_path(from: Point, to: Point) -> Vec<Point> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1.0 {
        return vec![to];
    }
    let (ux, uy) = (dx / length, dy / length);
    let (px, py) = (-uy, ux);

    let sweep_len = length + OVERSHOOT_PX;
    let steps = sweep_len.ceil() as usize;
    let arc_height = arc_amplitude(length);

    let mut path = Vec::with_capacity(steps + WOBBLE_STEPS + SETTLE_STEPS);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let along = sweep_len * t;
        let arc = arc_height * 4.0 * t * (1.0 - t);
        path.push(Point::new(
            from.x + ux * along + px * arc,
            from.y + uy * along + py * arc,
        ));
    }

    for i in 0..WOBBLE_STEPS {
        let back = OVERSHOOT_PX - i as f64;
        let drift = (i as f64 - 3.0) * 0.4;
        path.push(Point::new(
            to.x + ux * back + px * drift,
            to.y + uy * back + py * drift,
        ));
    }

    let settle_from = match path.last() {
        Some(p) => *p,
        None => from,
    };
    for i in 1..SETTLE_STEPS {
        let t = i as f64 / SETTLE_STEPS as f64;
        let ease = 1.0 - (1.0 - t).powi(3);
        path.push(Point::new(
            settle_from.x + (to.x - settle_from.x) * ease,
            settle_from.y + (to.y - settle_from.y) * ease,
        ));
    }
    path.push(to);

    path
}

/// Arc height for a sweep of the given length, capped so short slider
/// drags stay close to the track.
fn arc_amplitude(length: f64) -> f64 {
    let cap = (length / 20.0).min(8.0);
    let sign = if rand::random::<bool>() { 1.0 } else { -1.0 };
    sign * rand::random::<f64>() * cap
}

async fn natural_pause(min_ms: u64, max_ms: u64) {
    let delay = rand::random::<u64>() % (max_ms - min_ms) + min_ms;
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

async fn mouse_move(page: &Page, point: Point, held: bool) -> Result<()> {
    let mut builder = DispatchMouseEventParams::builder()
        .r#type(DispatchMouseEventType::MouseMoved)
        .x(point.x)
        .y(point.y);
    if held {
        builder = builder.button(MouseButton::Left);
    }
    let params = builder.build().map_err(Error::cdp)?;
    page.execute(params).await?;
    Ok(())
}

async fn mouse_button(page: &Page, kind: DispatchMouseEventType, point: Point) -> Result<()> {
    let params = DispatchMouseEventParams::builder()
        .r#type(kind)
        .x(point.x)
        .y(point.y)
        .button(MouseButton::Left)
        .click_count(1)
        .build()
        .map_err(Error::cdp)?;
    page.execute(params).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_ends_exactly_on_target() {
        let from = Point::new(818.0, 768.0);
        let to = Point::new(930.75, 768.0);
        let path = drag_path(from, to);
        assert_eq!(*path.last().unwrap(), to);
    }

    #[test]
    fn path_overshoots_then_corrects() {
        let from = Point::new(100.0, 500.0);
        let to = Point::new(212.0, 500.0);
        let path = drag_path(from, to);
        let max_x = path.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        assert!(max_x >= to.x + OVERSHOOT_PX - 1.0, "max_x = {max_x}");
        assert!(max_x <= to.x + OVERSHOOT_PX + 2.0, "max_x = {max_x}");
    }

    #[test]
    fn path_is_pixel_stepped() {
        let from = Point::new(0.0, 0.0);
        let to = Point::new(150.0, 0.0);
        let path = drag_path(from, to);
        assert!(path.len() >= 150, "len = {}", path.len());
    }

    #[test]
    fn horizontal_path_stays_near_track() {
        let from = Point::new(60.0, 570.0);
        let to = Point::new(260.0, 570.0);
        for p in drag_path(from, to) {
            assert!((p.y - 570.0).abs() <= 9.0, "strayed to {:?}", p);
        }
    }

    #[test]
    fn zero_length_drag_is_a_single_waypoint() {
        let p = Point::new(42.0, 42.0);
        assert_eq!(drag_path(p, p), vec![p]);
    }

    #[test]
    fn leftward_drag_still_lands_on_target() {
        let from = Point::new(300.0, 400.0);
        let to = Point::new(180.0, 400.0);
        let path = drag_path(from, to);
        assert_eq!(*path.last().unwrap(), to);
        let min_x = path.iter().map(|p| p.x).fold(f64::MAX, f64::min);
        assert!(min_x <= to.x - OVERSHOOT_PX + 1.0, "min_x = {min_x}");
    }
}
