//! # Core Configuration
//!
//! Startup settings for the core primitives, loaded once from TOML.
//!
//! ```toml
//! buffer_depth = 3
//! bounds_check = "checked"
//! stats_window = 120
//! max_handle = 65535
//! track_handles = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::sync::BufferDepth;

/// Selects the indexed-access path for [`StateBuffer`](crate::StateBuffer)
/// and [`BitFlags`](crate::BitFlags).
///
/// `Checked` validates every index and returns
/// [`CoreError::IndexOutOfRange`]. `Unchecked` skips the explicit range test;
/// an out-of-range index then panics in the slice access instead of
/// producing an error. No configuration makes out-of-range access undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsCheck {
    /// Every access is range-checked and reported as an error.
    #[default]
    Checked,
    /// Range test skipped; out-of-range access panics.
    Unchecked,
}

impl BoundsCheck {
    /// Returns true when accesses must be range-checked.
    #[inline]
    #[must_use]
    pub const fn is_checked(self) -> bool {
        matches!(self, Self::Checked)
    }
}

/// Configuration for the core primitives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Number of state snapshots kept per entity (`N`, at least 2).
    pub buffer_depth: usize,
    /// Indexed-access policy for buffers and flags.
    pub bounds_check: BoundsCheck,
    /// Number of step-time samples kept for pacing decisions.
    pub stats_window: usize,
    /// Largest handle value the allocator may mint. `None` means unbounded.
    pub max_handle: Option<u32>,
    /// Detect double release and release of never-issued handles.
    pub track_handles: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            buffer_depth: BufferDepth::TRIPLE.get(),
            bounds_check: BoundsCheck::Checked,
            stats_window: 120,
            max_handle: None,
            track_handles: false,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// Missing keys fall back to [`CoreConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the text is not valid TOML for
    /// this structure or fails [`CoreConfig::validate`].
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the file cannot be read or
    /// parsed, or fails validation.
    pub fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the invariants the primitives rely on.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDepth`] for a depth below 2 and
    /// [`CoreError::InvalidConfig`] for an empty stats window.
    pub fn validate(&self) -> CoreResult<()> {
        BufferDepth::new(self.buffer_depth)?;
        if self.stats_window == 0 {
            return Err(CoreError::InvalidConfig(
                "stats_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the validated buffer depth.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDepth`] if `buffer_depth < 2`.
    pub fn depth(&self) -> CoreResult<BufferDepth> {
        BufferDepth::new(self.buffer_depth)
    }
}
