//! Cleanup frames and exception landing pads.
//!
//! - [`action`]: the emittable cleanup obligations
//! - [`frame`]: per-scope frames, normal close, unwind chains, cache invalidation
//! - [`landing_pad`]: landing pad construction for cleanup-only and try regions
//! - [`catch`]: incomplete catch selectors and their completion
//!
//! Frames live in the [`crate::context::Context`] frame table and refer to
//! their enclosing frame by [`FrameId`]; the context's current-frame pointer
//! is the only path that keeps a frame active.

pub mod action;
pub mod catch;
pub mod frame;
pub mod landing_pad;

pub use action::{CallCleanup, CleanupAction};
pub use catch::{CatchClause, CatchData, IncompleteCatchSelector};
pub use frame::{CleanupEntry, CleanupFrame};

/// Index of a frame in the context's frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);
