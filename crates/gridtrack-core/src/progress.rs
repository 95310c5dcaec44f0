//! Progress reporting seam
//!
//! The pipeline reports snippet progress through an injected sink
//! instead of printing or holding a global bar; the CLI plugs in a
//! terminal bar, library callers and tests use [`NullProgress`].

/// Receives coarse progress events from a pipeline run
pub trait ProgressSink: Send {
    /// A pass over `total` snippets is starting
    fn begin(&self, total: u64);

    /// One snippet finished
    fn advance(&self);

    /// The pass is complete
    fn finish(&self);
}

/// Sink that swallows all events
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn begin(&self, _total: u64) {}
    fn advance(&self) {}
    fn finish(&self) {}
}
