//! Record mode: forward, capture, persist

mod capture;
mod conditional;
mod engine;

pub use capture::CapturingSink;
pub use conditional::{strip_conditional_headers, CONDITIONAL_HEADERS};
pub use engine::RecordingEngine;
