//! Processor configuration
//!
//! Isolation is decided per store. `Auto` keeps single-concurrency execution
//! environments working without any setup, `Required` is what a
//! multi-concurrency environment needs, where a missing invocation scope is a
//! wiring bug and must not silently fall back to shared state.

use std::env;

use serde::{Deserialize, Serialize};

use crate::{BatchError, Result};

/// Set by the execution environment when one process serves several
/// invocations at once
pub const MAX_CONCURRENCY_ENV: &str = "AWS_LAMBDA_MAX_CONCURRENCY";

/// Explicit isolation override, `auto` or `required`
pub const ISOLATION_ENV: &str = "BATCH_PROCESSING_ISOLATION";

/// How a state store behaves when no invocation scope is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Isolated inside an invocation scope, shared outside of one
    #[default]
    Auto,
    /// Isolated inside an invocation scope, an error outside of one
    Required,
}

impl std::str::FromStr for IsolationMode {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(IsolationMode::Auto),
            "required" => Ok(IsolationMode::Required),
            other => Err(BatchError::Config(format!(
                "unknown isolation mode '{}', expected 'auto' or 'required'",
                other
            ))),
        }
    }
}

/// Configuration for a processor and its state store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Isolation behaviour of the state store
    pub isolation: IsolationMode,
}

impl ProcessorConfig {
    /// Configuration with an explicit isolation mode
    pub fn with_isolation(isolation: IsolationMode) -> Self {
        Self { isolation }
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through a lookup function, so callers and tests can
    /// supply their own environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let isolation = match lookup(ISOLATION_ENV) {
            Some(explicit) => explicit.parse()?,
            None if lookup(MAX_CONCURRENCY_ENV).is_some() => IsolationMode::Required,
            None => IsolationMode::Auto,
        };

        Ok(Self { isolation })
    }
}
