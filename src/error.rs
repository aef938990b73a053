//! Error types for captcha-pilot
//!
//! This module provides the error type hierarchy using `thiserror`. Component
//! failures are caught at the orchestrator boundary and folded into a
//! retry-or-give-up decision; [`GaveUp`] is the only failure the caller sees.

use thiserror::Error;

/// The main error type for captcha-pilot operations
#[derive(Error, Debug)]
pub enum Error {
    /// Automation driver errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Challenge detection errors
    #[error("Detect error: {0}")]
    Detect(#[from] DetectError),

    /// Evidence extraction errors
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Solver service client errors
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Actuation errors
    #[error("Actuate error: {0}")]
    Actuate(#[from] ActuateError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// An attempt exceeded its wall-clock budget
    #[error("Attempt timed out after {0}ms")]
    AttemptTimeout(u64),

    /// The challenge survived an actuated attempt
    #[error("Challenge still present after actuation")]
    StillPresent,

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Automation driver faults (launch, connection, input dispatch)
#[derive(Error, Debug)]
pub enum DriverError {
    /// Failed to launch the browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Driver connection lost mid-session
    #[error("Driver connection lost")]
    ConnectionLost,

    /// A marker's target element does not exist on the surface
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The driver cannot answer this marker kind
    #[error("Unsupported marker for this driver: {0}")]
    MarkerUnsupported(String),

    /// Timeout waiting on the driver
    #[error("Driver operation timed out after {0}ms")]
    Timeout(u64),
}

/// Challenge detection faults (scan plumbing, not absence)
#[derive(Error, Debug)]
pub enum DetectError {
    /// A presence query failed at the driver level
    #[error("Marker scan failed: {0}")]
    ScanFailed(String),

    /// A pixel-region capture could not be decoded for comparison
    #[error("Signature capture undecodable: {0}")]
    BadCapture(String),
}

/// Evidence extraction faults
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The surface did not yield a capturable image
    #[error("Surface capture failed: {0}")]
    CaptureFailed(String),

    /// Captured bytes were not a decodable image
    #[error("Capture decode failed: {0}")]
    DecodeFailed(String),

    /// A crop could not be re-encoded as PNG
    #[error("Evidence encode failed: {0}")]
    EncodeFailed(String),

    /// A crop rectangle falls outside the captured image
    #[error("Crop {region} exceeds capture bounds {width}x{height}")]
    CropOutOfBounds {
        /// Offending crop rectangle, rendered as x,y,WxH
        region: String,
        /// Capture width in pixels
        width: u32,
        /// Capture height in pixels
        height: u32,
    },

    /// Instruction text could not be read
    #[error("Instruction text unavailable: {0}")]
    TextUnavailable(String),
}

/// Solver service client faults
#[derive(Error, Debug)]
pub enum ClientError {
    /// The service rejected the API key
    #[error("Service rejected API key (HTTP {status})")]
    AuthRejected {
        /// HTTP status code (401 or 403)
        status: u16,
    },

    /// Non-success HTTP status from the service
    #[error("Service error HTTP {status}: {message}")]
    Service {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Response parsed but lacks the field expected for the variant
    #[error("Response schema mismatch: {0}")]
    Schema(String),

    /// Connectivity failure before any HTTP status was produced
    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Actuation faults
#[derive(Error, Debug)]
pub enum ActuateError {
    /// Pointer input dispatch failed
    #[error("Pointer input failed: {0}")]
    InputFailed(String),

    /// A denormalized click point is outside the surface
    #[error("Click point ({x:.1}, {y:.1}) outside surface")]
    PointOutOfBounds {
        /// Surface x coordinate
        x: f64,
        /// Surface y coordinate
        y: f64,
    },

    /// The solution answers a different variant than the challenge
    #[error("Solution for {solution} cannot actuate a {challenge} challenge")]
    SolutionMismatch {
        /// Variant the challenge was classified as
        challenge: &'static str,
        /// Variant the solution answers
        solution: &'static str,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// API key absent from config and environment
    #[error("API key is required")]
    MissingApiKey,

    /// Required environment variable absent
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    /// A URL field failed to parse
    #[error("Invalid URL for {field}: {message}")]
    InvalidUrl {
        /// Config field name
        field: &'static str,
        /// Parse failure detail
        message: String,
    },

    /// A configured request header could not be parsed
    #[error("Invalid header {name}: {message}")]
    InvalidHeader {
        /// Header name as configured
        name: String,
        /// Parse failure detail
        message: String,
    },

    /// max_attempts must be at least 1
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
}

/// Terminal give-up outcome: the challenge was not cleared within the
/// attempt budget. Carries the attempt tally and the error that ended
/// the final attempt.
#[derive(Error, Debug)]
#[error("Gave up after {attempts_used} attempt(s): {last_error}")]
pub struct GaveUp {
    /// Attempts spent before giving up
    pub attempts_used: u32,
    /// The failure that ended the final attempt
    pub last_error: Error,
}

/// Result type alias for captcha-pilot operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Stable short label for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Driver(_) => "driver",
            Error::Detect(_) => "detect",
            Error::Extract(_) => "extract",
            Error::Client(_) => "client",
            Error::Actuate(_) => "actuate",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Cdp(_) => "cdp",
            Error::AttemptTimeout(_) => "attempt_timeout",
            Error::StillPresent => "still_present",
            Error::Generic(_) => "generic",
        }
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Driver(DriverError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_client_auth_error() {
        let err = ClientError::AuthRejected { status: 401 };
        assert_eq!(err.to_string(), "Service rejected API key (HTTP 401)");
    }

    #[test]
    fn test_extract_error() {
        let err = ExtractError::CropOutOfBounds {
            region: "450,210 340x340".to_string(),
            width: 320,
            height: 240,
        };
        assert!(err.to_string().contains("exceeds capture bounds"));
        assert!(err.to_string().contains("320x240"));
    }

    #[test]
    fn test_actuate_error() {
        let err = ActuateError::PointOutOfBounds { x: -4.0, y: 12.5 };
        assert!(err.to_string().contains("(-4.0, 12.5)"));
    }

    #[test]
    fn test_gave_up_display() {
        let gave_up = GaveUp {
            attempts_used: 3,
            last_error: Error::StillPresent,
        };
        assert!(gave_up.to_string().contains("3 attempt(s)"));
        assert!(gave_up.to_string().contains("still present"));
    }

    #[test]
    fn test_generic_error() {
        let err = Error::generic("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_error_kind_labels() {
        let client: Error = ClientError::AuthRejected { status: 403 }.into();
        assert_eq!(client.kind(), "client");
        assert_eq!(Error::StillPresent.kind(), "still_present");
        assert_eq!(Error::AttemptTimeout(60000).kind(), "attempt_timeout");
    }
}
