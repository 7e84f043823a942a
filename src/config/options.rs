//! API options for the block-update engine.
//!
//! This module provides the `UpdateOptions` struct, which controls the size of
//! the precomputed transfer descriptor cache, whether batch requests may be
//! queued outside an open batch epoch, and which non-fatal conditions are
//! reported through `tracing`.

use bitflags::bitflags;

use crate::error::GtmError;

/// Largest row or column count that gets a precomputed transfer descriptor.
pub const DEFAULT_CACHED_SHAPE_MAX: usize = 16;

bitflags! {
    /// Non-fatal conditions reported through the diagnostic channel.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Diagnostics: u32 {
        /// Out-of-bounds or zero-area rectangles that were ignored.
        const REPORT_INVALID_RANGE     = 0b0001;
        /// Batch requests queued while no batch epoch was open.
        const REPORT_QUEUE_OUTSIDE     = 0b0010;
        /// Descriptor path chosen for every remote write.
        const TRACE_DESCRIPTORS        = 0b0100;
        const ALL = Self::REPORT_INVALID_RANGE.bits()
            | Self::REPORT_QUEUE_OUTSIDE.bits()
            | Self::TRACE_DESCRIPTORS.bits();
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics::REPORT_INVALID_RANGE
    }
}

/// What happens to a batch request issued while no batch epoch is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Queue it anyway; it is dropped by the next `start` or replayed by an `execute`.
    #[default]
    Permissive,
    /// Reject it with `GtmError::BatchNotOpen`.
    Strict,
}

/// Block-update options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Cached-shape ceiling: shapes up to `max x max` use precomputed descriptors.
    pub cached_shape_max: usize,

    /// Queueing rule outside an open batch epoch.
    pub queue_policy: QueuePolicy,

    /// Conditions reported through `tracing`.
    pub diagnostics: Diagnostics,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            cached_shape_max: DEFAULT_CACHED_SHAPE_MAX,
            queue_policy: QueuePolicy::default(),
            diagnostics: Diagnostics::default(),
        }
    }
}

impl UpdateOptions {
    pub fn with_cached_shape_max(mut self, max: usize) -> Self {
        self.cached_shape_max = max;
        self
    }
    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn validate(&self) -> Result<(), GtmError> {
        if self.cached_shape_max == 0 {
            return Err(GtmError::InvalidOptions(
                "cached_shape_max must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
