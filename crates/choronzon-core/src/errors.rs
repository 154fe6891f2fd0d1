//! Structured error types shared across choronzon crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ChoronzonError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (identifiers, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the choronzon engine.
///
/// `Config` and persistent `TargetSpawn` errors are campaign-fatal,
/// `Parse` is fatal only if no seed survives, `Serialization` is per-trial
/// and non-fatal, and `Timeout` is a termination reason rather than a true
/// error. A campaign-level interrupt is not represented here; it is a
/// scheduler stop reason, not a failure, and surfaces once the current
/// trial finishes and the checkpoint is flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ChoronzonError {
    /// Invalid or incomplete run configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// A format plug-in failed to parse a seed or candidate.
    #[error("parse error: {0}")]
    Parse(ErrorInfo),
    /// A format plug-in failed to serialize a chromosome.
    #[error("serialization error: {0}")]
    Serialization(ErrorInfo),
    /// The coverage wire protocol was malformed or truncated without a sentinel.
    #[error("tracer error: {0}")]
    Tracer(ErrorInfo),
    /// The target process could not be spawned.
    #[error("target spawn error: {0}")]
    TargetSpawn(ErrorInfo),
    /// A trial exceeded its wall-clock budget.
    #[error("timeout error: {0}")]
    Timeout(ErrorInfo),
    /// Filesystem or other I/O failure.
    #[error("io error: {0}")]
    Io(ErrorInfo),
}

impl ChoronzonError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ChoronzonError::Config(info)
            | ChoronzonError::Parse(info)
            | ChoronzonError::Serialization(info)
            | ChoronzonError::Tracer(info)
            | ChoronzonError::TargetSpawn(info)
            | ChoronzonError::Timeout(info)
            | ChoronzonError::Io(info) => info,
        }
    }

    /// Returns true for error families the scheduler treats as fatal to the
    /// whole campaign rather than to a single trial.
    pub fn is_campaign_fatal(&self) -> bool {
        matches!(
            self,
            ChoronzonError::Config(_) | ChoronzonError::TargetSpawn(_)
        )
    }

    /// Builds an I/O error from a [`std::io::Error`], attaching a path hint.
    pub fn io(code: &str, path: impl Into<String>, err: std::io::Error) -> Self {
        ChoronzonError::Io(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.into()),
        )
    }
}
