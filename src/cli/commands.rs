// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Four subcommands share --config and (except `analyze`)
// --artifacts-dir:
//
//   train    fit preprocessing, random forest and LSTM
//   analyze  write the exploratory statistics report
//   serve    start the HTTP prediction API
//   predict  one forecast, printed as the API's JSON
//
// clap's derive macros generate help text, error messages
// for missing args, and type conversion.

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{
    predict_use_case::ForecastRequest,
    train_use_case::{ModelSelection, TrainConfig},
};
use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the models and write artefacts
    Train(TrainArgs),

    /// Run the exploratory analyses and write a JSON report
    Analyze(AnalyzeArgs),

    /// Serve POST /predict over HTTP
    Serve(ServeArgs),

    /// Forecast one store from the command line
    Predict(PredictArgs),
}

/// Flags every subcommand takes.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// YAML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory for trained artefacts
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    All,
    RandomForest,
    Lstm,
}

impl From<ModelArg> for ModelSelection {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::All          => ModelSelection::All,
            ModelArg::RandomForest => ModelSelection::RandomForest,
            ModelArg::Lstm         => ModelSelection::Lstm,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Which model(s) to train
    #[arg(long, value_enum, default_value_t = ModelArg::All)]
    pub model: ModelArg,

    /// Override model_params.lstm.epochs
    #[arg(long)]
    pub epochs: Option<usize>,
}

/// Boundary between Layer 1 and Layer 2: the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            config_path:   a.common.config,
            artifacts_dir: a.common.artifacts_dir,
            model:         a.model.into(),
            epochs:        a.epochs,
        }
    }
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// YAML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Write the report here instead of analysis.output
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub store: u32,

    /// First forecast day, YYYY-MM-DD
    #[arg(long)]
    pub date: NaiveDate,

    #[arg(long, default_value_t = 1)]
    pub days: usize,

    #[arg(long, default_value_t = 0)]
    pub promo: u8,

    /// 0, a (public), b (Easter) or c (Christmas)
    #[arg(long, default_value = "0")]
    pub state_holiday: String,

    #[arg(long, default_value_t = 0)]
    pub school_holiday: u8,

    #[arg(long, default_value_t = 1)]
    pub open: u8,
}

impl From<&PredictArgs> for ForecastRequest {
    fn from(a: &PredictArgs) -> Self {
        ForecastRequest {
            store:          a.store,
            date:           a.date,
            days:           a.days,
            promo:          a.promo,
            state_holiday:  a.state_holiday.clone(),
            school_holiday: a.school_holiday,
            open:           a.open,
        }
    }
}
