//! Geometry tables and coordinate transforms
//!
//! Per-surface, per-variant constants: crop rectangles for evidence
//! extraction, drag tracks for slider actuation, presence markers for
//! detection, and the transforms between normalized solution coordinates
//! and surface pixels. All rectangles are fixed calibration values keyed
//! by [`Surface`]; nothing here inspects the live page. When a captcha
//! renderer changes layout, these tables change and the algorithms do not.

use crate::challenge::{ChallengeVariant, Surface};
use serde::{Deserialize, Serialize};

/// A point in surface pixels, or a normalized point in [0, 1] x [0, 1]
/// depending on context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Construct a point
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Construct a region
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of the region in surface pixels
    pub fn center(&self) -> Point {
        Point {
            x: self.x as f64 + self.width as f64 / 2.0,
            y: self.y as f64 + self.height as f64 / 2.0,
        }
    }

    /// Whether a surface point falls inside this region
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x as f64
            && p.y >= self.y as f64
            && p.x <= (self.x + self.width) as f64
            && p.y <= (self.y + self.height) as f64
    }

    /// Map a normalized point in [0, 1] x [0, 1] to surface pixels.
    /// Inverse of [`Region::normalize`].
    pub fn denormalize(&self, p: Point) -> Point {
        Point {
            x: self.x as f64 + p.x * self.width as f64,
            y: self.y as f64 + p.y * self.height as f64,
        }
    }

    /// Map a surface point to normalized coordinates relative to this
    /// region. Inverse of [`Region::denormalize`].
    pub fn normalize(&self, p: Point) -> Point {
        Point {
            x: (p.x - self.x as f64) / self.width as f64,
            y: (p.y - self.y as f64) / self.height as f64,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// A presence signature the detector can ask the driver about
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marker {
    /// CSS selector, resolvable on web surfaces
    Css(&'static str),
    /// Calibrated pixel signature for surfaces without a DOM: the mean
    /// color of the region must sit within `tolerance` of `sample` per
    /// channel
    PixelRegion {
        /// Sampled region in surface pixels
        region: Region,
        /// Expected mean color, RGB
        sample: [u8; 3],
        /// Per-channel tolerance
        tolerance: u8,
    },
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Marker::Css(selector) => f.write_str(selector),
            Marker::PixelRegion { region, .. } => write!(f, "pixel-region {}", region),
        }
    }
}

/// A horizontal slider calibration: where the thumb starts and how far a
/// solution maps along the track.
///
/// The rotate map and the puzzle map use independently calibrated
/// `drag_min`/`drag_max` pairs per surface; there is no shared derivation
/// between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragTrack {
    /// Thumb rest position in surface pixels
    pub start: Point,
    /// Offset corresponding to angle 0 / proportion 0.0
    pub drag_min: f64,
    /// Offset corresponding to angle 360 / proportion 1.0
    pub drag_max: f64,
    /// Gesture duration; instant pointer jumps are an automation tell
    pub duration_ms: u64,
}

impl DragTrack {
    /// Linear map from rotation degrees to a horizontal drag offset:
    /// `drag_min + (drag_max - drag_min) * angle / 360`.
    pub fn offset_for_angle(&self, angle: f64) -> f64 {
        let angle = angle.clamp(0.0, 360.0);
        self.drag_min + (self.drag_max - self.drag_min) * angle / 360.0
    }

    /// Linear map from a slide proportion to a horizontal drag offset:
    /// `drag_min + (drag_max - drag_min) * proportion`.
    pub fn offset_for_proportion(&self, proportion: f64) -> f64 {
        let proportion = proportion.clamp(0.0, 1.0);
        self.drag_min + (self.drag_max - self.drag_min) * proportion
    }

    /// Where a drag of `offset` pixels ends
    pub fn end_point(&self, offset: f64) -> Point {
        Point {
            x: self.start.x + offset,
            y: self.start.y,
        }
    }
}

/// Rotate-variant geometry: two concentric crop boxes and the slider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotateGeometry {
    /// Outer square enclosing the full ring
    pub outer: Region,
    /// Inner square enclosing the fixed disk, concentric with `outer`
    pub inner: Region,
    /// Rotation slider calibration
    pub track: DragTrack,
}

impl RotateGeometry {
    /// Radius of the inner disk in pixels
    pub fn disk_radius(&self) -> f64 {
        self.inner.width.min(self.inner.height) as f64 / 2.0
    }

    /// Inner disk center expressed in the outer crop's local pixels
    pub fn disk_center_in_outer(&self) -> Point {
        let c = self.inner.center();
        Point {
            x: c.x - self.outer.x as f64,
            y: c.y - self.outer.y as f64,
        }
    }
}

/// Slide-puzzle geometry: the gap image, the piece strip, and the slider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuzzleGeometry {
    /// Full puzzle area showing the gap
    pub puzzle: Region,
    /// Strip containing the draggable piece
    pub piece: Region,
    /// Puzzle slider calibration
    pub track: DragTrack,
}

/// Click-variant geometry (shapes and icons): one interactive crop, a
/// confirm control, and optionally an instruction marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickGeometry {
    /// The interactive area solutions are normalized against
    pub region: Region,
    /// Center of the confirm control clicked after the point sequence
    pub confirm: Point,
    /// Where the instruction text lives (icon variants only)
    pub instruction: Option<Marker>,
}

/// Everything the pipeline needs to know about one surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    /// Viewport the table is calibrated against. Actuation points are
    /// validated against this rectangle before any input is dispatched.
    pub bounds: Region,
    /// Wrapper signatures: none present means no challenge at all
    pub gates: &'static [Marker],
    /// Rotate presence markers
    pub rotate_markers: &'static [Marker],
    /// Slide-puzzle presence markers
    pub puzzle_markers: &'static [Marker],
    /// Shape-click presence markers
    pub shapes_markers: &'static [Marker],
    /// Icon-select presence markers
    pub icon_markers: &'static [Marker],
    /// Rotate crop/drag constants
    pub rotate: RotateGeometry,
    /// Puzzle crop/drag constants
    pub puzzle: PuzzleGeometry,
    /// Shape-click crop/click constants
    pub shapes: ClickGeometry,
    /// Icon-select crop/click constants
    pub icon: ClickGeometry,
}

impl SurfaceGeometry {
    /// Presence markers for one variant
    pub fn markers_for(&self, variant: ChallengeVariant) -> &'static [Marker] {
        match variant {
            ChallengeVariant::Rotate => self.rotate_markers,
            ChallengeVariant::SlidePuzzle => self.puzzle_markers,
            ChallengeVariant::ShapeClick => self.shapes_markers,
            ChallengeVariant::IconSelect => self.icon_markers,
        }
    }
}

/// Look up the geometry table for a surface
pub fn geometry_for(surface: Surface) -> &'static SurfaceGeometry {
    match surface {
        Surface::DesktopBrowser => &DESKTOP,
        Surface::MobileBrowser => &MOBILE,
        Surface::NativeApp => &NATIVE,
    }
}

// Challenge wrapper and widget selectors observed on the web surfaces.
const WRAPPER_V1: &str = ".captcha-disable-scroll";
const WRAPPER_V2: &str = ".captcha-verify-container";
const ROTATE_INNER: &str = "[data-testid=whirl-inner-img]";
const ROTATE_OUTER: &str = "[data-testid=whirl-outer-img]";
const PUZZLE_PIECE: &str = "img.captcha_verify_img_slide";
const SHAPES_IMAGE: &str = "#captcha-verify-image[src*=\"/3d\"]";
const ICON_IMAGE: &str = "#captcha-verify-image[src*=\"/icon\"]";
const ICON_TEXT_BAR: &str = ".captcha_verify_bar";

const WEB_GATES: &[Marker] = &[Marker::Css(WRAPPER_V1), Marker::Css(WRAPPER_V2)];
const WEB_ROTATE_MARKERS: &[Marker] = &[Marker::Css(ROTATE_INNER), Marker::Css(ROTATE_OUTER)];
const WEB_PUZZLE_MARKERS: &[Marker] = &[Marker::Css(PUZZLE_PIECE)];
const WEB_SHAPES_MARKERS: &[Marker] = &[Marker::Css(SHAPES_IMAGE)];
const WEB_ICON_MARKERS: &[Marker] = &[Marker::Css(ICON_IMAGE), Marker::Css(ICON_TEXT_BAR)];

/// Desktop browser table, calibrated against a 1920x1080 viewport with the
/// challenge dialog centered. Only the rotate drag span (55..286) is a
/// verified constant; rectangles are re-measured when the renderer shifts.
pub static DESKTOP: SurfaceGeometry = SurfaceGeometry {
    bounds: Region::new(0, 0, 1920, 1080),
    gates: WEB_GATES,
    rotate_markers: WEB_ROTATE_MARKERS,
    puzzle_markers: WEB_PUZZLE_MARKERS,
    shapes_markers: WEB_SHAPES_MARKERS,
    icon_markers: WEB_ICON_MARKERS,
    rotate: RotateGeometry {
        outer: Region::new(790, 370, 340, 340),
        inner: Region::new(875, 455, 170, 170),
        track: DragTrack {
            start: Point { x: 818.0, y: 768.0 },
            drag_min: 55.0,
            drag_max: 286.0,
            duration_ms: 900,
        },
    },
    puzzle: PuzzleGeometry {
        puzzle: Region::new(790, 430, 340, 212),
        piece: Region::new(790, 430, 68, 212),
        track: DragTrack {
            start: Point { x: 818.0, y: 700.0 },
            drag_min: 46.0,
            drag_max: 278.0,
            duration_ms: 800,
        },
    },
    shapes: ClickGeometry {
        region: Region::new(790, 370, 340, 340),
        confirm: Point {
            x: 1064.0,
            y: 758.0,
        },
        instruction: None,
    },
    icon: ClickGeometry {
        region: Region::new(790, 370, 340, 340),
        confirm: Point {
            x: 1064.0,
            y: 758.0,
        },
        instruction: Some(Marker::Css(ICON_TEXT_BAR)),
    },
};

/// Mobile browser table, calibrated against a 390x844 emulated viewport.
/// The mobile web challenge reuses the desktop DOM, so the markers match
/// and only the rectangles differ.
pub static MOBILE: SurfaceGeometry = SurfaceGeometry {
    bounds: Region::new(0, 0, 390, 844),
    gates: WEB_GATES,
    rotate_markers: WEB_ROTATE_MARKERS,
    puzzle_markers: WEB_PUZZLE_MARKERS,
    shapes_markers: WEB_SHAPES_MARKERS,
    icon_markers: WEB_ICON_MARKERS,
    rotate: RotateGeometry {
        outer: Region::new(53, 280, 284, 284),
        inner: Region::new(124, 351, 142, 142),
        track: DragTrack {
            start: Point { x: 78.0, y: 610.0 },
            drag_min: 34.0,
            drag_max: 262.0,
            duration_ms: 700,
        },
    },
    puzzle: PuzzleGeometry {
        puzzle: Region::new(25, 316, 340, 212),
        piece: Region::new(25, 316, 68, 212),
        track: DragTrack {
            start: Point { x: 60.0, y: 570.0 },
            drag_min: 30.0,
            drag_max: 280.0,
            duration_ms: 700,
        },
    },
    shapes: ClickGeometry {
        region: Region::new(25, 252, 340, 340),
        confirm: Point { x: 330.0, y: 640.0 },
        instruction: None,
    },
    icon: ClickGeometry {
        region: Region::new(25, 252, 340, 340),
        confirm: Point { x: 330.0, y: 640.0 },
        instruction: Some(Marker::Css(ICON_TEXT_BAR)),
    },
};

/// Native app table, calibrated against a 1080x2340 device profile. The
/// app has no DOM, so presence markers are pixel signatures over stable
/// chrome: the dialog backdrop, the slider thumb, the piece strip, the
/// confirm button fill, and the instruction bar.
pub static NATIVE: SurfaceGeometry = SurfaceGeometry {
    bounds: Region::new(0, 0, 1080, 2340),
    gates: &[Marker::PixelRegion {
        region: Region::new(90, 620, 900, 60),
        sample: [247, 247, 247],
        tolerance: 10,
    }],
    rotate_markers: &[Marker::PixelRegion {
        region: Region::new(190, 1580, 80, 80),
        sample: [235, 237, 240],
        tolerance: 12,
    }],
    puzzle_markers: &[Marker::PixelRegion {
        region: Region::new(90, 800, 60, 120),
        sample: [210, 214, 219],
        tolerance: 14,
    }],
    shapes_markers: &[Marker::PixelRegion {
        region: Region::new(470, 1720, 140, 60),
        sample: [254, 44, 85],
        tolerance: 16,
    }],
    icon_markers: &[Marker::PixelRegion {
        region: Region::new(90, 640, 900, 40),
        sample: [252, 252, 252],
        tolerance: 8,
    }],
    rotate: RotateGeometry {
        outer: Region::new(150, 700, 780, 780),
        inner: Region::new(345, 895, 390, 390),
        track: DragTrack {
            start: Point {
                x: 210.0,
                y: 1600.0,
            },
            drag_min: 120.0,
            drag_max: 840.0,
            duration_ms: 650,
        },
    },
    puzzle: PuzzleGeometry {
        puzzle: Region::new(90, 800, 900, 560),
        piece: Region::new(90, 800, 180, 560),
        track: DragTrack {
            start: Point {
                x: 160.0,
                y: 1450.0,
            },
            drag_min: 80.0,
            drag_max: 820.0,
            duration_ms: 650,
        },
    },
    shapes: ClickGeometry {
        region: Region::new(90, 700, 900, 900),
        confirm: Point {
            x: 540.0,
            y: 1750.0,
        },
        instruction: None,
    },
    icon: ClickGeometry {
        region: Region::new(90, 700, 900, 900),
        confirm: Point {
            x: 540.0,
            y: 1750.0,
        },
        instruction: Some(Marker::PixelRegion {
            region: Region::new(90, 640, 900, 40),
            sample: [252, 252, 252],
            tolerance: 8,
        }),
    },
};
