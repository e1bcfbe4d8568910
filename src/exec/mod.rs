// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] defines the `ProcessBackend` trait the scheduler drives,
//!   and the event types it streams.
//! - [`command`] is the production backend on `tokio::process`.
//! - [`output`] defines the sink that receives presentation settings and
//!   streamed lines.

pub mod backend;
pub mod command;
pub mod output;

pub use backend::{
    OutputStream, ProcessBackend, ProcessEvent, ProcessHandle, SpawnRequest, Terminator,
};
pub use command::RealProcessBackend;
pub use output::{ConsoleSink, OutputSink, OutputTarget, TracingSink};
