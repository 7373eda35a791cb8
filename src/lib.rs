//! Chameleon - HTTP record/replay/passthrough proxy
//!
//! Requests are keyed by a SHA-256 fingerprint of method, path and body.
//! Record mode forwards to the backend and stores each response as a JSON
//! document named by that fingerprint; replay mode serves those documents
//! without touching the backend; passthrough mode only forwards.

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod network;
pub mod proxy;
pub mod recording;
pub mod replay;
pub mod stats;
pub mod storage;

pub use error::{ChameleonError, Result};
