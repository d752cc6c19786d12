//! Analysis configuration.
//!
//! Everything that used to live as ambient package-level state (significance
//! threshold, confidence level, composite-key separator) is an explicit
//! configuration object threaded through every pipeline stage.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PhytostatError, Result};

/// Shared settings for every experiment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Significance threshold for ANOVA terms and pairwise comparisons
    pub alpha: f64,

    /// Confidence level for estimated-mean intervals
    pub confidence: f64,

    /// Separator used when deriving composite grouping keys
    pub separator: String,

    /// Directory holding the input CSV files
    pub data_dir: PathBuf,

    /// Directory where composite figures are written
    pub figure_dir: PathBuf,

    /// Figure dimensions in pixels (width, height)
    pub figure_size: (u32, u32),
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            confidence: 0.95,
            separator: "_".to_string(),
            data_dir: PathBuf::from("data"),
            figure_dir: PathBuf::from("figures"),
            figure_size: (1200, 800),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PhytostatError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PhytostatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(PhytostatError::Config(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(PhytostatError::Config(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.separator.is_empty() {
            return Err(PhytostatError::Config(
                "separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
