// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. `clap` parses the
// arguments; every subcommand is delegated to a Layer 2 use
// case, except `serve`, which hands a loaded use case to the
// HTTP server on a tokio runtime.

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{AnalyzeArgs, Commands, PredictArgs, ServeArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "rossmann-forecast",
    version,
    about = "Forecast Rossmann store sales with a random forest and an LSTM, and serve the forecasts over HTTP."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. No computation here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Analyze(args) => run_analyze(args),
            Commands::Serve(args)   => run_serve(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training with config '{}'", args.common.config.display());
    let artifacts = args.common.artifacts_dir.clone();
    let summary = TrainUseCase::new(args.into()).execute()?;

    if let Some(forest) = &summary.random_forest {
        for (metric, value) in &forest.cross_validation.mean {
            println!("random forest  CV {metric:<6} {value:.4}");
        }
    }
    if let Some(lstm) = &summary.lstm {
        for (metric, value) in &lstm.validation {
            println!("lstm           val {metric:<6} {value:.4}");
        }
    }
    println!("Training complete. Artefacts saved to '{}'.", artifacts.display());
    Ok(())
}

fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    use crate::application::analyze_use_case::AnalyzeUseCase;

    let (_, path) = AnalyzeUseCase::new(args.config, args.output).execute()?;
    println!("Analysis report written to '{}'.", path.display());
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
    use crate::server::{serve, AppState};

    let state = AppState::load(&args.common.config, &args.common.artifacts_dir)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start tokio runtime")?;
    runtime.block_on(serve(state, &args.host, args.port))
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::load(&args.common.config, &args.common.artifacts_dir)?;
    let response = use_case.predict(&(&args).into())?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{ModelSelection, TrainConfig};
    use std::path::PathBuf;

    #[test]
    fn test_train_defaults() {
        let cli = Cli::try_parse_from(["rossmann-forecast", "train"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.config_path, PathBuf::from("config/model_config.yaml"));
        assert_eq!(cfg.artifacts_dir, PathBuf::from("artifacts"));
        assert_eq!(cfg.model, ModelSelection::All);
        assert_eq!(cfg.epochs, None);
    }

    #[test]
    fn test_train_overrides() {
        let cli = Cli::try_parse_from([
            "rossmann-forecast", "train", "--model", "random-forest", "--epochs", "3",
            "--artifacts-dir", "out",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.model, ModelSelection::RandomForest);
        assert_eq!(cfg.epochs, Some(3));
        assert_eq!(cfg.artifacts_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_predict_args() {
        let cli = Cli::try_parse_from([
            "rossmann-forecast", "predict", "--store", "5", "--date", "2015-09-17",
            "--days", "7", "--promo", "1",
        ])
        .unwrap();
        let Commands::Predict(args) = cli.command else { panic!("expected predict") };
        let request: crate::application::predict_use_case::ForecastRequest = (&args).into();
        assert_eq!(request.store, 5);
        assert_eq!(request.days, 7);
        assert_eq!(request.promo, 1);
        assert_eq!(request.open, 1);
        assert_eq!(request.state_holiday, "0");
    }

    #[test]
    fn test_serve_host_and_port() {
        let cli = Cli::try_parse_from([
            "rossmann-forecast", "serve", "--host", "localhost", "--port", "9000",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else { panic!("expected serve") };
        assert_eq!(args.host, "localhost");
        assert_eq!(args.port, 9000);

        // HOST / PORT are only read by this test
        std::env::set_var("HOST", "127.0.0.1");
        std::env::set_var("PORT", "9100");
        let from_env = Cli::try_parse_from(["rossmann-forecast", "serve"]);
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        let Commands::Serve(args) = from_env.unwrap().command else { panic!("expected serve") };
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 9100);
    }

    #[test]
    fn test_predict_requires_store() {
        assert!(Cli::try_parse_from(["rossmann-forecast", "predict", "--date", "2015-09-17"]).is_err());
    }
}
