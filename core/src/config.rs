use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::StackError;
use crate::stack::VALUES_PER_STACK_FRAME;

/// Default reservation: 512Ki value slots (4 MiB).
pub const DEFAULT_CAPACITY_VALS: usize = 512 * 1024;
/// Default commit granularity: 16Ki value slots.
pub const DEFAULT_COMMIT_VALS: usize = 16 * 1024;
/// Head room JIT code may use above a frame without checking.
pub const DEFAULT_JIT_EXTRA_VALS: usize = (VALUES_PER_STACK_FRAME + 18) * 10;

const ENV_CAPACITY: &str = "VMSTACK_CAPACITY_VALS";
const ENV_COMMIT: &str = "VMSTACK_COMMIT_VALS";
const ENV_JIT_EXTRA: &str = "VMSTACK_JIT_EXTRA_VALS";

/// Sizing of a thread's stack reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    pub capacity_vals: usize,
    pub commit_vals: usize,
    pub jit_extra_vals: usize,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            capacity_vals: DEFAULT_CAPACITY_VALS,
            commit_vals: DEFAULT_COMMIT_VALS,
            jit_extra_vals: DEFAULT_JIT_EXTRA_VALS,
        }
    }
}

impl StackConfig {
    pub fn validate(&self) -> Result<(), StackError> {
        if self.commit_vals == 0 {
            return Err(StackError::InvalidConfig("commit_vals must be non-zero".into()));
        }
        if self.commit_vals > self.capacity_vals {
            return Err(StackError::InvalidConfig(format!(
                "commit_vals ({}) exceeds capacity_vals ({})",
                self.commit_vals, self.capacity_vals
            )));
        }
        if self.capacity_vals % self.commit_vals != 0 {
            return Err(StackError::InvalidConfig(format!(
                "capacity_vals ({}) must be a multiple of commit_vals ({})",
                self.capacity_vals, self.commit_vals
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(src: &str) -> anyhow::Result<Self> {
        let config: StackConfig = toml::from_str(src).context("parse stack config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let src =
            std::fs::read_to_string(path).with_context(|| format!("read stack config {}", path.display()))?;
        Self::from_toml_str(&src)
    }

    /// Apply `VMSTACK_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str, raw: String| -> anyhow::Result<usize> {
            raw.trim()
                .parse::<usize>()
                .with_context(|| format!("{key} must be a slot count, got '{raw}'"))
        };
        if let Some(raw) = lookup(ENV_CAPACITY) {
            self.capacity_vals = parse(ENV_CAPACITY, raw)?;
        }
        if let Some(raw) = lookup(ENV_COMMIT) {
            self.commit_vals = parse(ENV_COMMIT, raw)?;
        }
        if let Some(raw) = lookup(ENV_JIT_EXTRA) {
            self.jit_extra_vals = parse(ENV_JIT_EXTRA, raw)?;
        }
        self.validate()?;
        Ok(self)
    }
}
