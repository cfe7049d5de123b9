use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{chart::ChartKind, config::Theme, export::{CsvStyle, ExportFormat}};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Analyze spreadsheets: column statistics, chart series, and exports",
    long_about = None
)]
pub struct Cli {
    /// Session config file (defaults to $SHEET_ANALYTICS_CONFIG or ./sheet-analytics.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Preview the first rows of a spreadsheet in a formatted table
    Preview(PreviewArgs),
    /// Produce per-column statistics
    Stats(StatsArgs),
    /// Map two columns into a chart series and optionally export it
    Chart(ChartArgs),
    /// Upload, analyze, and save a spreadsheet for the signed-in user
    Analyze(AnalyzeArgs),
    /// List saved analyses for the signed-in user
    History(HistoryArgs),
    /// Hide a saved analysis from the history
    Delete(DeleteArgs),
    /// List stored insights
    Insights(InsightsArgs),
    /// Manage the signed-in user and theme
    Session(SessionArgs),
}

/// The spreadsheet to read.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input .xlsx, .xls, or .csv file (`-` reads stdin and requires --mime)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Declared MIME type, used when the file name has no recognized extension
    #[arg(long)]
    pub mime: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Number of records to display
    #[arg(long, default_value_t = 5)]
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Columns to summarize (defaults to every column)
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ChartArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// X-axis column (defaults to the first column)
    #[arg(short = 'x', long = "x")]
    pub x: Option<String>,
    /// Y-axis column (defaults to the second column)
    #[arg(short = 'y', long = "y")]
    pub y: Option<String>,
    /// Chart kind (defaults to bar)
    #[arg(long, value_enum)]
    pub kind: Option<ChartKind>,
    /// Export formats to write, comma separated
    #[arg(long, value_enum, value_delimiter = ',')]
    pub export: Vec<ExportFormat>,
    /// Directory for exported files (defaults to the working directory)
    #[arg(long = "out-dir")]
    pub out_dir: Option<PathBuf>,
    /// Quote CSV export fields containing separators, quotes, or newlines
    #[arg(long)]
    pub quote: bool,
    /// Skip printing the mapped series
    #[arg(short, long)]
    pub quiet: bool,
}

impl ChartArgs {
    pub fn csv_style(&self) -> CsvStyle {
        if self.quote {
            CsvStyle::Quoted
        } else {
            CsvStyle::Raw
        }
    }
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// X-axis column stored with the analysis
    #[arg(short = 'x', long = "x")]
    pub x: Option<String>,
    /// Y-axis column stored with the analysis
    #[arg(short = 'y', long = "y")]
    pub y: Option<String>,
    /// Chart kind stored with the analysis
    #[arg(long, value_enum)]
    pub kind: Option<ChartKind>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Analysis id as shown by `history`
    pub id: String,
}

#[derive(Debug, Args)]
pub struct InsightsArgs {
    /// Only insights of this analysis id (defaults to the most recent insights)
    #[arg(long)]
    pub analysis: Option<String>,
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub action: SessionAction,
}

#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// Show the signed-in user and theme
    Show,
    /// Sign in as the given user
    Login {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        email: String,
        /// Display name (defaults to the part of the email before '@')
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out
    Logout,
    /// Set the color theme
    Theme {
        #[arg(value_enum)]
        theme: Theme,
    },
}
