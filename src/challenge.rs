//! Core challenge data model
//!
//! Value types shared by the detection, extraction, solving, and actuation
//! stages: which challenge is on screen, what evidence was captured for it,
//! and what the remote solver answered.

use crate::error::GaveUp;
use crate::geometry::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The challenge types this pipeline can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChallengeVariant {
    /// Rotating-disk challenge: align inner and outer images
    Rotate,
    /// Slide-puzzle challenge: drag a piece into its gap
    SlidePuzzle,
    /// Click shapes in a prescribed order
    ShapeClick,
    /// Click icons matching an instruction text
    IconSelect,
}

impl ChallengeVariant {
    /// All variants in detection-priority order (highest first).
    /// When markers for more than one variant match simultaneously, the
    /// earliest entry here wins the tie-break.
    pub const PRIORITY: [ChallengeVariant; 4] = [
        ChallengeVariant::Rotate,
        ChallengeVariant::SlidePuzzle,
        ChallengeVariant::ShapeClick,
        ChallengeVariant::IconSelect,
    ];

    /// Stable lowercase name for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeVariant::Rotate => "rotate",
            ChallengeVariant::SlidePuzzle => "slide_puzzle",
            ChallengeVariant::ShapeClick => "shape_click",
            ChallengeVariant::IconSelect => "icon_select",
        }
    }

    /// Position in the tie-break order; lower wins
    pub fn precedence(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|v| v == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl std::fmt::Display for ChallengeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of automated environment hosting the challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Surface {
    /// Desktop browser session
    DesktopBrowser,
    /// Mobile browser session (emulated or real device viewport)
    MobileBrowser,
    /// Native mobile application
    NativeApp,
}

impl Surface {
    /// Stable lowercase name for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::DesktopBrowser => "desktop_browser",
            Surface::MobileBrowser => "mobile_browser",
            Surface::NativeApp => "native_app",
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A challenge observed on the surface by one detector scan.
///
/// Every positive scan produces a fresh value, even when the surface looks
/// identical to the previous scan: the remote service treats each attempt
/// as stateless, and solutions must never outlive the challenge value they
/// were produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaChallenge {
    /// Which challenge type was recognized
    pub variant: ChallengeVariant,
    /// Which surface it was seen on
    pub surface: Surface,
    /// Scan timestamp (UTC)
    pub detected_at: DateTime<Utc>,
}

impl CaptchaChallenge {
    /// Record a detection made just now
    pub fn new(variant: ChallengeVariant, surface: Surface) -> Self {
        Self {
            variant,
            surface,
            detected_at: Utc::now(),
        }
    }
}

/// Variant-shaped payload sent to the solving service.
///
/// Built fresh per attempt and never cached: the service may rotate the
/// challenge imagery between retries, so stale evidence describes a
/// challenge that no longer exists.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    /// Outer ring and masked inner disk images
    Rotate {
        /// Outer region with the disk area punched out, PNG base64
        outer_b64: String,
        /// Inner disk under a circular alpha mask, PNG base64
        inner_b64: String,
    },
    /// Background-with-gap and piece images
    SlidePuzzle {
        /// Full puzzle area showing the gap, PNG base64
        puzzle_b64: String,
        /// The draggable piece region, PNG base64
        piece_b64: String,
    },
    /// The interactive shapes region
    ShapeClick {
        /// Cropped shapes area, PNG base64
        shapes_b64: String,
    },
    /// The interactive icon region plus its instruction
    IconSelect {
        /// Instruction text shown to the user
        challenge_text: String,
        /// Cropped icon area, PNG base64
        icon_b64: String,
    },
}

impl Evidence {
    /// The variant this evidence was extracted for
    pub fn variant(&self) -> ChallengeVariant {
        match self {
            Evidence::Rotate { .. } => ChallengeVariant::Rotate,
            Evidence::SlidePuzzle { .. } => ChallengeVariant::SlidePuzzle,
            Evidence::ShapeClick { .. } => ChallengeVariant::ShapeClick,
            Evidence::IconSelect { .. } => ChallengeVariant::IconSelect,
        }
    }
}

/// Typed answer from the solving service, consumed exactly once by the
/// actuator against the challenge that produced its evidence.
#[derive(Debug, Clone, PartialEq)]
pub enum Solution {
    /// Disk rotation in degrees, 0 to 360
    Rotate {
        /// Degrees the inner disk must rotate
        angle: f64,
    },
    /// Horizontal slide as a proportion of the drag range, 0.0 to 1.0
    SlidePuzzle {
        /// Proportion of the slider track to traverse
        slide_proportion: f64,
    },
    /// Ordered click points, normalized against the shapes crop
    ShapeClick {
        /// Points in required click order
        points: Vec<Point>,
    },
    /// Ordered click points, normalized against the icon crop
    IconSelect {
        /// Points in required click order
        points: Vec<Point>,
    },
}

impl Solution {
    /// The variant this solution answers
    pub fn variant(&self) -> ChallengeVariant {
        match self {
            Solution::Rotate { .. } => ChallengeVariant::Rotate,
            Solution::SlidePuzzle { .. } => ChallengeVariant::SlidePuzzle,
            Solution::ShapeClick { .. } => ChallengeVariant::ShapeClick,
            Solution::IconSelect { .. } => ChallengeVariant::IconSelect,
        }
    }
}

/// Terminal success outcome of a solve run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solved {
    /// Attempts spent; zero when no challenge was present
    pub attempts_used: u32,
}

/// Public outcome of `solve_if_present`
pub type SolveResult = std::result::Result<Solved, GaveUp>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let p = ChallengeVariant::PRIORITY;
        assert_eq!(p[0], ChallengeVariant::Rotate);
        assert_eq!(p[1], ChallengeVariant::SlidePuzzle);
        assert_eq!(p[2], ChallengeVariant::ShapeClick);
        assert_eq!(p[3], ChallengeVariant::IconSelect);
        assert!(
            ChallengeVariant::Rotate.precedence() < ChallengeVariant::IconSelect.precedence()
        );
    }

    #[test]
    fn test_challenge_serialization() {
        let challenge = CaptchaChallenge::new(ChallengeVariant::Rotate, Surface::DesktopBrowser);
        let json = serde_json::to_string(&challenge).unwrap();
        assert!(json.contains("\"variant\":\"rotate\""));
        assert!(json.contains("\"surface\":\"desktopBrowser\""));
        assert!(json.contains("\"detectedAt\""));

        let parsed: CaptchaChallenge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, challenge);
    }

    #[test]
    fn test_fresh_challenge_per_scan() {
        let a = CaptchaChallenge::new(ChallengeVariant::ShapeClick, Surface::MobileBrowser);
        let b = CaptchaChallenge::new(ChallengeVariant::ShapeClick, Surface::MobileBrowser);
        // Same variant and surface, but independent values with their own
        // timestamps.
        assert_eq!(a.variant, b.variant);
        assert!(a.detected_at <= b.detected_at);
    }

    #[test]
    fn test_evidence_variant_mapping() {
        let ev = Evidence::IconSelect {
            challenge_text: "Select two matching icons".to_string(),
            icon_b64: "aWNvbg==".to_string(),
        };
        assert_eq!(ev.variant(), ChallengeVariant::IconSelect);

        let ev = Evidence::Rotate {
            outer_b64: "b3V0ZXI=".to_string(),
            inner_b64: "aW5uZXI=".to_string(),
        };
        assert_eq!(ev.variant(), ChallengeVariant::Rotate);
    }

    #[test]
    fn test_solution_variant_mapping() {
        let sol = Solution::SlidePuzzle {
            slide_proportion: 0.42,
        };
        assert_eq!(sol.variant(), ChallengeVariant::SlidePuzzle);

        let sol = Solution::ShapeClick {
            points: vec![Point { x: 0.1, y: 0.9 }],
        };
        assert_eq!(sol.variant(), ChallengeVariant::ShapeClick);
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(ChallengeVariant::Rotate.as_str(), "rotate");
        assert_eq!(ChallengeVariant::SlidePuzzle.to_string(), "slide_puzzle");
        assert_eq!(Surface::NativeApp.as_str(), "native_app");
    }
}
