//! Validity filtering, reconstruction and segment statistics for
//! pupil-diameter recordings.
//!
//! ```text
//!  Session ──► job ──► pipeline::preprocess ──► derived channel ──► Session
//!                           │
//!                           ├─ preprocess::ValidityFilter
//!                           ├─ preprocess::Reconstructor / EyeCombiner
//!                           └─ preprocess::attach_segment_stats
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod preprocess;

pub use config::{SettingsOverride, ValiditySettings};
pub use error::{InvalidInput, Result};
pub use job::{run_job, Job, JobFile};
pub use pipeline::{preprocess, EyeInput, Processed};
