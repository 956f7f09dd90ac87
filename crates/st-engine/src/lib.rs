//! st-engine: the media engine seam for segtrim.
//!
//! - [`Engine`] is the raw capability surface (load, virtual files, exec).
//! - [`EngineHandle`] adds lifecycle rules on top of any engine.
//! - [`Workspace`] tracks virtual files so they can be purged.
//! - [`FfmpegEngine`] runs commands through the ffmpeg CLI in a private
//!   temporary directory.

pub mod command;
pub mod engine;
pub mod ffmpeg;
pub mod handle;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use engine::{render_args, Engine, ProgressFn};
pub use ffmpeg::{FfmpegEngine, ProgressParser};
pub use handle::{EngineHandle, EngineState};
#[cfg(any(test, feature = "test-util"))]
pub use memory::{ClipInfo, EngineCall, MemoryEngine};
pub use probe::probe_duration;
pub use progress::{ProgressListeners, SubscriptionId};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::{Workspace, WorkspaceEntry};
