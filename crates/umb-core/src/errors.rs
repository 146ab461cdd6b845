//! Structured error types shared across umbrella sampling crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`UmbError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (window indices, bias centers, paths).
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

/// Canonical error type for the umbrella sampling workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum UmbError {
    /// Invalid inputs, configuration or output layout. Raised before engine work.
    #[error("configuration error: {0}")]
    Config(ErrorInfo),
    /// Non-finite energies or coordinates observed while driving the engine.
    #[error("numerical instability: {0}")]
    Numerical(ErrorInfo),
    /// Trajectory files that cannot be created, written or finalized.
    #[error("resource error: {0}")]
    Resource(ErrorInfo),
    /// Misuse of a simulation context (shape mismatches, bad state).
    #[error("engine error: {0}")]
    Engine(ErrorInfo),
    /// Serialization and schema errors for run artefacts.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Run stopped at a window boundary by a cancellation request.
    #[error("cancelled: {0}")]
    Cancelled(ErrorInfo),
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

impl UmbError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            UmbError::Config(info)
            | UmbError::Numerical(info)
            | UmbError::Resource(info)
            | UmbError::Engine(info)
            | UmbError::Serde(info)
            | UmbError::Cancelled(info) => info,
        }
    }

    /// Returns the family label used in manifests and logs.
    pub fn family(&self) -> &'static str {
        match self {
            UmbError::Config(_) => "config",
            UmbError::Numerical(_) => "numerical",
            UmbError::Resource(_) => "resource",
            UmbError::Engine(_) => "engine",
            UmbError::Serde(_) => "serde",
            UmbError::Cancelled(_) => "cancelled",
        }
    }

    /// Returns a copy of the error with an extra context entry attached.
    pub fn with_context(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let attach = |info: ErrorInfo| info.with_context(key, value);
        match self {
            UmbError::Config(info) => UmbError::Config(attach(info)),
            UmbError::Numerical(info) => UmbError::Numerical(attach(info)),
            UmbError::Resource(info) => UmbError::Resource(attach(info)),
            UmbError::Engine(info) => UmbError::Engine(attach(info)),
            UmbError::Serde(info) => UmbError::Serde(attach(info)),
            UmbError::Cancelled(info) => UmbError::Cancelled(attach(info)),
        }
    }
}
