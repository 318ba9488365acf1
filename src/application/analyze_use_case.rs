// ============================================================
// Layer 2 — AnalyzeUseCase
// ============================================================
//   Step 1: Load config and tables     (Layer 4 - data)
//   Step 2: Run the toggled analyses   (Layer 4 - data)
//   Step 3: Write the JSON report

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::Workspace;
use crate::config::resolve;
use crate::data::{
    analysis::{AnalysisReport, RossmannAnalyzer},
    loader::{merge_store_data, CsvSalesSource},
};
use crate::domain::traits::SalesSource;

pub struct AnalyzeUseCase {
    config_path: PathBuf,
    /// Replaces analysis.output when set
    output:      Option<PathBuf>,
}

impl AnalyzeUseCase {
    pub fn new(config_path: PathBuf, output: Option<PathBuf>) -> Self {
        Self { config_path, output }
    }

    /// Returns the report and the path it was written to.
    pub fn execute(&self) -> Result<(AnalysisReport, PathBuf)> {
        // ── Step 1: Load ──────────────────────────────────────────────────────
        let Workspace { config, root } = Workspace::load(&self.config_path)?;
        let source = CsvSalesSource::from_config(&config, &root);
        let (train, test) = source.load_sales()?;
        let stores = source.load_stores()?;
        let train = merge_store_data(train, &stores);

        // ── Step 2: Analyse ───────────────────────────────────────────────────
        let report = RossmannAnalyzer::new(&train, &test).run(&config.analysis);

        // ── Step 3: Write ─────────────────────────────────────────────────────
        let output = match &self.output {
            Some(path) => path.clone(),
            None => resolve(&root, &config.analysis.output),
        };
        write_report(&output, &report)?;
        tracing::info!("Analysis report written to '{}'", output.display());
        Ok((report, output))
    }
}

fn write_report(path: &Path, report: &AnalysisReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}
