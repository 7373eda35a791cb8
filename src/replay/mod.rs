//! Replay mode: serve stored responses, never contacting the backend

mod engine;

pub use engine::{build_response, ReplayEngine};
