//! Optimizer pass instrumentation.
//!
//! Each optimizer pass emits one [`PassEvent`] to the installed sink. The
//! sink is diagnostics-only: nothing in the pipeline depends on whether one
//! is installed.

use std::sync::{Arc, OnceLock, RwLock};

/// Snapshot of a completed optimizer pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassEvent {
    pub pass: &'static str,
    /// Layer count after the pass ran.
    pub layers: usize,
    /// Structural rewrites the pass applied (inserted or replaced layers).
    pub rewrites: usize,
}

/// Receiver for pass events; implementations must tolerate concurrent calls.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &PassEvent);
}

static SINK: OnceLock<RwLock<Option<Arc<dyn TraceSink>>>> = OnceLock::new();

fn sink_cell() -> &'static RwLock<Option<Arc<dyn TraceSink>>> {
    SINK.get_or_init(|| RwLock::new(None))
}

pub fn install_sink(sink: Arc<dyn TraceSink>) {
    *sink_cell().write().expect("trace sink poisoned") = Some(sink);
}

pub fn clear_sink() {
    *sink_cell().write().expect("trace sink poisoned") = None;
}

pub(crate) fn emit(event: PassEvent) {
    if let Some(sink) = sink_cell().read().expect("trace sink poisoned").as_ref() {
        sink.record(&event);
    }
}
