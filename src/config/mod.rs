//! Console configuration.
//!
//! Read from an optional JSON file; every field has a default, unknown
//! keys are rejected. Command-line flags override what the file says.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_DEPTH, DEFAULT_PROMPT, DEFAULT_SOURCE_LABEL, MAX_DEPTH_LIMIT,
};
use crate::interpreter::script::ScriptConfig;
use crate::terminal::CloseDecision;

/// How to settle closing a terminal that is still evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClosePolicy {
    /// Ask every time.
    #[default]
    Ask,
    /// Stop the evaluation.
    Kill,
    /// Let it finish unseen.
    Background,
}

impl ClosePolicy {
    /// The decision this policy makes on its own, if any.
    pub fn decision(self) -> Option<CloseDecision> {
        match self {
            ClosePolicy::Ask => None,
            ClosePolicy::Kill => Some(CloseDecision::Kill),
            ClosePolicy::Background => Some(CloseDecision::RunInBackground),
        }
    }

    /// What a forced exit (EOF, Ctrl-C) does with in-flight commands.
    pub fn exit_decision(self) -> CloseDecision {
        match self {
            ClosePolicy::Background => CloseDecision::RunInBackground,
            ClosePolicy::Ask | ClosePolicy::Kill => CloseDecision::Kill,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    /// Prompt text after the terminal tag.
    pub prompt: String,
    pub close_policy: ClosePolicy,
    /// Deepest call nesting of the built-in language.
    pub max_depth: usize,
    /// File name used in failure traces.
    pub source_label: String,
    /// Write logs here instead of stderr.
    pub log_file: Option<PathBuf>,
    /// `tracing` filter used when `HOTCONSOLE_LOG` is unset.
    pub log_filter: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            close_policy: ClosePolicy::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            log_file: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Flag values that win over the file. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub prompt: Option<String>,
    pub close_policy: Option<ClosePolicy>,
    pub max_depth: Option<usize>,
    pub source_label: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl ConsoleConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// The file at `path` if given, defaults otherwise, then `overrides`.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(prompt) = overrides.prompt {
            self.prompt = prompt;
        }
        if let Some(policy) = overrides.close_policy {
            self.close_policy = policy;
        }
        if let Some(depth) = overrides.max_depth {
            self.max_depth = depth;
        }
        if let Some(label) = overrides.source_label {
            self.source_label = label;
        }
        if let Some(file) = overrides.log_file {
            self.log_file = Some(file);
        }
        if let Some(filter) = overrides.log_filter {
            self.log_filter = filter;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_depth > 0, "max_depth must be at least 1");
        anyhow::ensure!(
            self.max_depth <= MAX_DEPTH_LIMIT,
            "max_depth must be at most {MAX_DEPTH_LIMIT}"
        );
        anyhow::ensure!(
            !self.source_label.is_empty(),
            "source_label must not be empty"
        );
        Ok(())
    }

    pub fn script(&self) -> ScriptConfig {
        ScriptConfig {
            source_label: self.source_label.clone(),
            max_depth: self.max_depth,
        }
    }
}
