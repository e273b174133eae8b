//! Business logic services.

pub mod cleanup;
pub mod processor;

pub use cleanup::{
    attach_to_response, cleanup_guard, spawn_output_sweeper, CleanupGuard, CleanupPlan,
};
pub use processor::{ProcessOutcome, VideoProcessor};
