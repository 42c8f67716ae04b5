//! Error reporting for long-running components.
//!
//! Recoverable failures inside the playback loop, the ingest workers and the
//! transcription link are absorbed where they happen; this trait is how they
//! surface without killing the component.

use crate::error::BanterError;

/// Trait for reporting recoverable component errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a component. The component keeps running.
    fn report(&self, component: &str, error: &BanterError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, component: &str, error: &BanterError) {
        eprintln!("banter: [{}] {}", component, error);
    }
}
