//! Turning URLs into displayable previews.
//!
//! Generic pages try the OpenGraph image, then a screenshot. Doc-like pages
//! get a placeholder card immediately while the screenshot is taken in the
//! background.

mod orchestrator;
mod result;
pub mod upgrade;

pub use orchestrator::{Acquisition, Orchestrator};
pub use result::AcquisitionResult;
