//! Reporting of diagnostics to the application.

use std::fmt;

/// The severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for MessageSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            MessageSeverity::Info => "info",
            MessageSeverity::Warning => "warning",
            MessageSeverity::Error => "error",
            MessageSeverity::Fatal => "fatal",
        })
    }
}

/// Receives the diagnostics produced while recording.
///
/// Invalid requests on a [`CommandList`] don't return an error; the offending operation is
/// skipped and a message with [`MessageSeverity::Error`] is sent here instead.
///
/// [`CommandList`]: crate::CommandList
pub trait MessageCallback: Send + Sync {
    fn message(&self, severity: MessageSeverity, text: &str);
}

/// A [`MessageCallback`] that forwards every message to [`tracing`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingMessageCallback;

impl MessageCallback for TracingMessageCallback {
    fn message(&self, severity: MessageSeverity, text: &str) {
        match severity {
            MessageSeverity::Info => tracing::info!("{text}"),
            MessageSeverity::Warning => tracing::warn!("{text}"),
            MessageSeverity::Error | MessageSeverity::Fatal => {
                tracing::error!(%severity, "{text}")
            }
        }
    }
}
