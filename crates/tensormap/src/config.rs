use tensormap_core::{Error, Result};

/// Configuration shared by a container and every container derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMapConfig {
    /// Separator for key paths (`get("obs.pixels")`, `set_path`, `leaves`).
    pub separator: String,
}

impl Default for TensorMapConfig {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
        }
    }
}

impl TensorMapConfig {
    pub fn separator(mut self, sep: impl Into<String>) -> Self {
        self.separator = sep.into();
        self
    }

    /// Reject configurations that would make key paths ambiguous.
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(Error::InvalidKey("key path separator cannot be empty".into()));
        }
        Ok(())
    }
}
