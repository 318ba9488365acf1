// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Each use case wires the lower layers together for one goal:
// training the models, writing the exploratory report, or
// forecasting a store's sales.
//
// Rules for this layer:
//   - No model math here (Layer 5)
//   - No printing or argument parsing (Layer 1)
//   - File access goes through the loader and ArtifactStore
//   - Only workflow coordination

// Load → clean → features → cross-validate → fit → artefacts
pub mod train_use_case;

// Exploratory statistics report
pub mod analyze_use_case;

// Forecasts from saved artefacts (CLI and HTTP)
pub mod predict_use_case;

use std::path::{Path, PathBuf};

use crate::config::{project_root, ForecastConfig};

/// A loaded config together with the root its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: ForecastConfig,
    pub root:   PathBuf,
}

impl Workspace {
    pub fn load(config_path: &Path) -> anyhow::Result<Self> {
        let config = ForecastConfig::load(config_path)?;
        let root   = project_root(config_path);
        Ok(Self { config, root })
    }
}
