//! The solve pipeline
//!
//! Five stages behind one orchestrator: scan the surface for a challenge,
//! extract its evidence images, ask the solving service for an answer,
//! actuate that answer with humanized input, and verify the challenge
//! cleared. [`Orchestrator::solve_if_present`] runs the retry loop that
//! strings them together.

pub mod actuator;
pub mod client;
pub mod detector;
pub mod extractor;
pub mod orchestrator;

pub use actuator::Actuator;
pub use client::{ChallengeSolver, SolverClient};
pub use detector::Detector;
pub use extractor::Extractor;
pub use orchestrator::Orchestrator;
