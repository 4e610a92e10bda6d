//! Engine module: owned detector instances driven by capture backends.
//!
//! `backend` holds the capture implementations and their factory; `core`
//! holds [`EngineHandle`], the lifecycle and parameter surface.

pub mod backend;
pub mod core;

pub use backend::{
    create_backend, BackendKind, CaptureBackend, CpalBackend, SharedDetector, SyntheticBackend,
    SyntheticFeeder,
};
pub use core::{EngineEvent, EngineEventKind, EngineHandle};
