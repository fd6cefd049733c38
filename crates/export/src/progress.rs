//! Export progress accounting.

use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    size: u64,
    finished: bool,
}

/// Mutex-protected byte count shared between the export driver and the
/// progress reporter. Readers never block the writer for longer than the
/// field updates.
#[derive(Default)]
pub struct Progress {
    inner: Mutex<Inner>,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `more` bytes from the source. Zero-length chunks leave the
    /// count unchanged.
    pub fn add(&self, more: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.size += more;
    }

    /// Mark the export finished.
    pub fn finish(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.finished = true;
    }

    /// Current `(size, finished)` snapshot.
    pub fn progress(&self) -> (u64, bool) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        (inner.size, inner.finished)
    }
}
