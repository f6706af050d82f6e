//! Progress sink abstraction.
//!
//! The core reports byte-level progress for hashing and downloading through
//! this interface so it carries zero rendering dependency. The CLI plugs in
//! an indicatif-backed sink; tests and quiet runs use [`NullProgress`].
//!
//! Events are strictly observational - nothing in the pipeline consumes a
//! return value from the sink.

/// A live progress handle for one operation (hashing one file, downloading
/// one file).
pub trait ProgressHandle: Send {
    /// Records `delta` more bytes consumed.
    fn advance(&self, delta: u64);

    /// Marks the operation complete; the handle must not be used afterwards.
    fn finish(&self);
}

/// Factory for progress handles.
pub trait ProgressSink: Send + Sync {
    /// Begins reporting one operation.
    ///
    /// `total_bytes` is `None` when the transport did not reveal a length
    /// and no expected size is known.
    fn begin(&self, label: &str, total_bytes: Option<u64>) -> Box<dyn ProgressHandle>;
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

struct NullHandle;

impl ProgressHandle for NullHandle {
    fn advance(&self, _delta: u64) {}
    fn finish(&self) {}
}

impl ProgressSink for NullProgress {
    fn begin(&self, _label: &str, _total_bytes: Option<u64>) -> Box<dyn ProgressHandle> {
        Box::new(NullHandle)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A counting sink shared by checksum and download tests.

    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    pub struct CountingHandle {
        bytes: Arc<AtomicU64>,
    }

    impl ProgressHandle for CountingHandle {
        fn advance(&self, delta: u64) {
            self.bytes.fetch_add(delta, Ordering::SeqCst);
        }
        fn finish(&self) {}
    }

    /// Sink wrapper handing out [`CountingHandle`]s against shared counters.
    #[derive(Debug, Clone, Default)]
    pub struct SharedCountingSink {
        pub operations: Arc<AtomicUsize>,
        pub bytes: Arc<AtomicU64>,
    }

    impl ProgressSink for SharedCountingSink {
        fn begin(&self, _label: &str, _total_bytes: Option<u64>) -> Box<dyn ProgressHandle> {
            self.operations.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingHandle {
                bytes: Arc::clone(&self.bytes),
            })
        }
    }
}
