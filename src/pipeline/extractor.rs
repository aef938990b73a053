//! Evidence extraction
//!
//! Builds the variant-shaped payload the solving service expects out of a
//! single fresh surface capture: crop the calibrated regions, apply the
//! rotate ring/disk masks, and base64 the PNG re-encodings. Evidence is
//! built per attempt and never cached, because the widget rotates its
//! imagery between retries.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{imageops, ImageFormat, RgbaImage};
use tracing::{debug, instrument};

use crate::challenge::{CaptchaChallenge, ChallengeVariant, Evidence, Surface};
use crate::driver::AutomationDriver;
use crate::error::{ExtractError, Result};
use crate::geometry::{geometry_for, Point, Region, SurfaceGeometry};

/// Cuts service evidence from the live surface
pub struct Extractor {
    geometry: &'static SurfaceGeometry,
}

impl Extractor {
    /// Extractor over one surface's crop tables
    pub fn new(surface: Surface) -> Self {
        Self {
            geometry: geometry_for(surface),
        }
    }

    /// Capture the surface and cut the evidence for `challenge`
    #[instrument(skip(self, driver, challenge), fields(variant = %challenge.variant))]
    pub async fn extract<D>(&self, driver: &D, challenge: &CaptchaChallenge) -> Result<Evidence>
    where
        D: AutomationDriver + ?Sized,
    {
        let shot = driver.capture_image(None).await?;
        if shot.is_empty() {
            return Err(
                ExtractError::CaptureFailed("driver returned an empty capture".to_string()).into(),
            );
        }
        debug!(bytes = shot.len(), "surface captured");

        match challenge.variant {
            ChallengeVariant::Rotate => self.rotate_evidence(&shot),
            ChallengeVariant::SlidePuzzle => self.puzzle_evidence(&shot),
            ChallengeVariant::ShapeClick => self.shapes_evidence(&shot),
            ChallengeVariant::IconSelect => self.icon_evidence(driver, &shot).await,
        }
    }

    fn rotate_evidence(&self, shot: &[u8]) -> Result<Evidence> {
        let rotate = &self.geometry.rotate;
        let mut outer = crop_png(shot, &rotate.outer)?;
        let mut inner = crop_png(shot, &rotate.inner)?;

        // The disk sits concentric inside the ring. Mask the disk crop to a
        // circle and punch the matching hole out of the ring crop, so each
        // image carries only its own pixels.
        let radius = rotate.disk_radius();
        let disk_center = center_of(&inner);
        circle_keep(&mut inner, disk_center, radius);
        circle_clear(&mut outer, rotate.disk_center_in_outer(), radius);

        Ok(Evidence::Rotate {
            outer_b64: encode_b64(&outer)?,
            inner_b64: encode_b64(&inner)?,
        })
    }

    fn puzzle_evidence(&self, shot: &[u8]) -> Result<Evidence> {
        let puzzle = &self.geometry.puzzle;
        let background = crop_png(shot, &puzzle.puzzle)?;
        let piece = crop_png(shot, &puzzle.piece)?;

        Ok(Evidence::SlidePuzzle {
            puzzle_b64: encode_b64(&background)?,
            piece_b64: encode_b64(&piece)?,
        })
    }

    fn shapes_evidence(&self, shot: &[u8]) -> Result<Evidence> {
        let crop = crop_png(shot, &self.geometry.shapes.region)?;
        Ok(Evidence::ShapeClick {
            shapes_b64: encode_b64(&crop)?,
        })
    }

    async fn icon_evidence<D>(&self, driver: &D, shot: &[u8]) -> Result<Evidence>
    where
        D: AutomationDriver + ?Sized,
    {
        let icon = &self.geometry.icon;
        let marker = icon.instruction.as_ref().ok_or_else(|| {
            ExtractError::TextUnavailable(
                "no instruction marker calibrated for this surface".to_string(),
            )
        })?;

        let text = driver.read_text(marker).await?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ExtractError::TextUnavailable("instruction bar is empty".to_string()).into());
        }
        debug!(instruction = %text, "instruction read");

        let crop = crop_png(shot, &icon.region)?;
        Ok(Evidence::IconSelect {
            challenge_text: text,
            icon_b64: encode_b64(&crop)?,
        })
    }
}

/// Decode a PNG capture and cut one region out of it
fn crop_png(png: &[u8], region: &Region) -> Result<RgbaImage> {
    let img = image::load_from_memory(png)
        .map_err(|e| ExtractError::DecodeFailed(e.to_string()))?
        .to_rgba8();

    if region.x + region.width > img.width() || region.y + region.height > img.height() {
        return Err(ExtractError::CropOutOfBounds {
            region: region.to_string(),
            width: img.width(),
            height: img.height(),
        }
        .into());
    }

    Ok(imageops::crop_imm(&img, region.x, region.y, region.width, region.height).to_image())
}

/// Re-encode a crop as PNG and base64 it for the wire
fn encode_b64(img: &RgbaImage) -> Result<String> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ExtractError::EncodeFailed(e.to_string()))?;
    Ok(BASE64.encode(png))
}

fn center_of(img: &RgbaImage) -> Point {
    Point::new(img.width() as f64 / 2.0, img.height() as f64 / 2.0)
}

/// Zero the alpha of every pixel farther than `radius` from `center`
fn circle_keep(img: &mut RgbaImage, center: Point, radius: f64) {
    apply_circle(img, center, radius, false);
}

/// Zero the alpha of every pixel within `radius` of `center`
fn circle_clear(img: &mut RgbaImage, center: Point, radius: f64) {
    apply_circle(img, center, radius, true);
}

fn apply_circle(img: &mut RgbaImage, center: Point, radius: f64, clear_inside: bool) {
    let r2 = radius * radius;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - center.x;
        let dy = y as f64 + 0.5 - center.y;
        let inside = dx * dx + dy * dy <= r2;
        if inside == clear_inside {
            pixel[3] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MOBILE;
    use async_trait::async_trait;
    use image::Rgba;

    /// Driver stub that replays one prepared capture
    struct ShotDriver {
        png: Vec<u8>,
        text: String,
    }

    #[async_trait]
    impl AutomationDriver for ShotDriver {
        async fn capture_image(&self, _region: Option<Region>) -> Result<Vec<u8>> {
            Ok(self.png.clone())
        }

        async fn query_presence(&self, _marker: &crate::geometry::Marker) -> Result<bool> {
            Ok(false)
        }

        async fn pointer_drag(&self, _from: Point, _to: Point, _duration_ms: u64) -> Result<()> {
            Ok(())
        }

        async fn pointer_click(&self, _point: Point) -> Result<()> {
            Ok(())
        }

        async fn read_text(&self, _marker: &crate::geometry::Marker) -> Result<String> {
            Ok(self.text.clone())
        }
    }

    fn png_of(img: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Mobile-sized viewport with a marker pixel at the rotate outer origin
    fn mobile_viewport_png() -> Vec<u8> {
        let mut img = RgbaImage::from_pixel(390, 844, Rgba([240, 240, 240, 255]));
        let outer = MOBILE.rotate.outer;
        img.put_pixel(outer.x, outer.y, Rgba([255, 0, 0, 255]));
        png_of(&img)
    }

    fn decode_b64_png(b64: &str) -> RgbaImage {
        let bytes = BASE64.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    #[test]
    fn crop_matches_region_origin_and_size() {
        let png = mobile_viewport_png();
        let crop = crop_png(&png, &MOBILE.rotate.outer).unwrap();
        assert_eq!((crop.width(), crop.height()), (284, 284));
        assert_eq!(crop.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn crop_out_of_bounds_is_rejected() {
        let png = png_of(&RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])));
        let err = crop_png(&png, &Region::new(90, 90, 20, 20)).unwrap_err();
        assert!(err.to_string().contains("exceeds capture bounds"));
    }

    #[test]
    fn circle_keep_clears_corners_only() {
        let mut img = RgbaImage::from_pixel(142, 142, Rgba([10, 20, 30, 255]));
        circle_keep(&mut img, Point::new(71.0, 71.0), 71.0);
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(71, 71).0[3], 255);
        assert_eq!(img.get_pixel(71, 3).0[3], 255);
    }

    #[test]
    fn circle_clear_punches_the_center() {
        let mut img = RgbaImage::from_pixel(284, 284, Rgba([10, 20, 30, 255]));
        circle_clear(&mut img, Point::new(142.0, 142.0), 71.0);
        assert_eq!(img.get_pixel(142, 142).0[3], 0);
        assert_eq!(img.get_pixel(0, 0).0[3], 255);
        assert_eq!(img.get_pixel(283, 283).0[3], 255);
    }

    #[tokio::test]
    async fn rotate_evidence_masks_ring_and_disk() {
        let driver = ShotDriver {
            png: mobile_viewport_png(),
            text: String::new(),
        };
        let extractor = Extractor::new(Surface::MobileBrowser);
        let challenge = CaptchaChallenge::new(ChallengeVariant::Rotate, Surface::MobileBrowser);

        let evidence = extractor.extract(&driver, &challenge).await.unwrap();
        let Evidence::Rotate {
            outer_b64,
            inner_b64,
        } = evidence
        else {
            panic!("expected rotate evidence");
        };

        let outer = decode_b64_png(&outer_b64);
        assert_eq!((outer.width(), outer.height()), (284, 284));
        // Disk area punched out of the ring, ring corners kept.
        assert_eq!(outer.get_pixel(142, 142).0[3], 0);
        assert_eq!(outer.get_pixel(0, 0).0[3], 255);

        let inner = decode_b64_png(&inner_b64);
        assert_eq!((inner.width(), inner.height()), (142, 142));
        // Disk kept, corners outside the circle cleared.
        assert_eq!(inner.get_pixel(71, 71).0[3], 255);
        assert_eq!(inner.get_pixel(0, 0).0[3], 0);
    }

    #[tokio::test]
    async fn puzzle_evidence_cuts_background_and_piece() {
        let driver = ShotDriver {
            png: mobile_viewport_png(),
            text: String::new(),
        };
        let extractor = Extractor::new(Surface::MobileBrowser);
        let challenge =
            CaptchaChallenge::new(ChallengeVariant::SlidePuzzle, Surface::MobileBrowser);

        let evidence = extractor.extract(&driver, &challenge).await.unwrap();
        let Evidence::SlidePuzzle {
            puzzle_b64,
            piece_b64,
        } = evidence
        else {
            panic!("expected puzzle evidence");
        };

        let background = decode_b64_png(&puzzle_b64);
        assert_eq!((background.width(), background.height()), (340, 212));
        let piece = decode_b64_png(&piece_b64);
        assert_eq!((piece.width(), piece.height()), (68, 212));
    }

    #[tokio::test]
    async fn icon_evidence_carries_instruction_text() {
        let driver = ShotDriver {
            png: mobile_viewport_png(),
            text: "  Select 2 objects that are the same shape  ".to_string(),
        };
        let extractor = Extractor::new(Surface::MobileBrowser);
        let challenge =
            CaptchaChallenge::new(ChallengeVariant::IconSelect, Surface::MobileBrowser);

        let evidence = extractor.extract(&driver, &challenge).await.unwrap();
        let Evidence::IconSelect {
            challenge_text,
            icon_b64,
        } = evidence
        else {
            panic!("expected icon evidence");
        };

        assert_eq!(challenge_text, "Select 2 objects that are the same shape");
        let icon = decode_b64_png(&icon_b64);
        assert_eq!((icon.width(), icon.height()), (340, 340));
    }

    #[tokio::test]
    async fn empty_instruction_bar_is_an_error() {
        let driver = ShotDriver {
            png: mobile_viewport_png(),
            text: "   ".to_string(),
        };
        let extractor = Extractor::new(Surface::MobileBrowser);
        let challenge =
            CaptchaChallenge::new(ChallengeVariant::IconSelect, Surface::MobileBrowser);

        let err = extractor.extract(&driver, &challenge).await.unwrap_err();
        assert!(err.to_string().contains("Instruction text unavailable"));
    }

    #[tokio::test]
    async fn empty_capture_is_an_error() {
        let driver = ShotDriver {
            png: Vec::new(),
            text: String::new(),
        };
        let extractor = Extractor::new(Surface::MobileBrowser);
        let challenge = CaptchaChallenge::new(ChallengeVariant::Rotate, Surface::MobileBrowser);

        let err = extractor.extract(&driver, &challenge).await.unwrap_err();
        assert!(err.to_string().contains("Surface capture failed"));
    }
}
