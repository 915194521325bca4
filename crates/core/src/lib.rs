//! Pure domain types for analysis progress tracking.
//!
//! Nothing in this crate performs I/O. The realtime sources and the
//! reconciler in the other workspace crates exchange the types defined
//! here.

pub mod error;
pub mod job_events;
pub mod progress;
pub mod steps;
pub mod time_format;
pub mod types;

pub use error::CoreError;
pub use progress::{EventSource, JobStatus, ProgressEvent};
pub use types::{JobId, Timestamp};
