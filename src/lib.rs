pub mod chart;
pub mod cli;
pub mod config;
pub mod data;
pub mod decode;
pub mod export;
pub mod insights;
pub mod intake;
pub mod io_utils;
pub mod normalize;
pub mod pipeline;
pub mod preview;
pub mod stats;
pub mod store;
pub mod table;

use std::{
    env,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    chart::ChartSelection,
    cli::{
        AnalyzeArgs, Cli, Commands, DeleteArgs, HistoryArgs, InsightsArgs, OutputFormat,
        SessionAction, SessionArgs,
    },
    config::{AppConfig, SessionUser},
    insights::{CannedInsights, InsightSummary},
    pipeline::AnalysisPipeline,
    store::{AnalysisStore, InsightScope, LocalStore},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_analytics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config_path = AppConfig::resolve_path(cli.config.as_deref());
    debug!("Using config {config_path:?}");
    match cli.command {
        Commands::Preview(args) => preview::execute(&args),
        Commands::Stats(args) => stats::execute(&args),
        Commands::Chart(args) => chart::execute(&args),
        Commands::Analyze(args) => handle_analyze(&config_path, &args),
        Commands::History(args) => handle_history(&config_path, &args),
        Commands::Delete(args) => handle_delete(&config_path, &args),
        Commands::Insights(args) => handle_insights(&config_path, &args),
        Commands::Session(args) => handle_session(&config_path, &args),
    }
}

/// A relative store directory is resolved against the config file's folder.
fn store_root(config_path: &Path, config: &AppConfig) -> PathBuf {
    if config.store_dir.is_absolute() {
        return config.store_dir.clone();
    }
    config_path
        .parent()
        .map(|parent| parent.join(&config.store_dir))
        .unwrap_or_else(|| config.store_dir.clone())
}

fn open_session(config_path: &Path) -> Result<(SessionUser, LocalStore)> {
    let config = AppConfig::load(config_path)?;
    let user = config.require_user()?.clone();
    let root = store_root(config_path, &config);
    let store = LocalStore::open(&root).with_context(|| format!("Opening store at {root:?}"))?;
    Ok((user, store))
}

fn handle_analyze(config_path: &Path, args: &AnalyzeArgs) -> Result<()> {
    let (user, store) = open_session(config_path)?;
    let generator = CannedInsights;
    let runner = AnalysisPipeline::new(&store, &generator);
    let selection = ChartSelection {
        x: args.x.clone(),
        y: args.y.clone(),
        kind: args.kind,
    };
    let selection = (selection != ChartSelection::default()).then_some(selection);
    let outcome = pipeline::analyze_path(
        &runner,
        &args.input.input,
        args.input.mime.as_deref(),
        &user,
        selection,
    )?;

    table::print_table(&stats::report_headers(), &outcome.statistics.render_rows());
    let summary = InsightSummary::from_drafts(&outcome.insights);
    println!(
        "{} insight(s), {} high priority, average confidence {}%",
        summary.total, summary.high_priority, summary.average_confidence
    );

    let file_name = &outcome.file_name;
    let saved = outcome
        .persistence
        .with_context(|| format!("Saving the analysis of '{file_name}' did not complete"))?;
    println!("Saved analysis {}", saved.analysis_id);
    info!(
        "Stored '{}' as {} with {} insight(s)",
        outcome.file_name,
        saved.file.url,
        saved.insight_ids.len()
    );
    Ok(())
}

fn handle_history(config_path: &Path, args: &HistoryArgs) -> Result<()> {
    let (user, store) = open_session(config_path)?;
    let analyses = store.list_analyses(&user.uid)?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&analyses)?),
        OutputFormat::Table => {
            let headers = ["id", "file", "date", "chart", "status", "rows", "insights"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>();
            let rows = analyses
                .iter()
                .map(|record| {
                    let analysis = &record.analysis;
                    vec![
                        record.id.clone(),
                        analysis.file_name.clone(),
                        analysis.date.format("%Y-%m-%d %H:%M").to_string(),
                        analysis.chart_type.clone(),
                        label(&analysis.status),
                        analysis.data.len().to_string(),
                        analysis.insights.to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            table::print_table(&headers, &rows);
        }
    }
    info!("Listed {} analysis record(s) for {}", analyses.len(), user.display_name);
    Ok(())
}

fn handle_delete(config_path: &Path, args: &DeleteArgs) -> Result<()> {
    let (user, store) = open_session(config_path)?;
    let record = store
        .get_analysis(&args.id)?
        .filter(|record| record.analysis.owner_id == user.uid && !record.deleted)
        .ok_or_else(|| anyhow!("No saved analysis with id '{}'", args.id))?;
    store.delete_analysis(&record.id)?;
    info!("Deleted analysis {} of '{}'", record.id, record.analysis.file_name);
    Ok(())
}

fn handle_insights(config_path: &Path, args: &InsightsArgs) -> Result<()> {
    let (_user, store) = open_session(config_path)?;
    let scope = match &args.analysis {
        Some(id) => InsightScope::Analysis(id.clone()),
        None => InsightScope::Recent,
    };
    let insights = store.list_insights(&scope)?;
    let summary = InsightSummary::from_drafts(insights.iter().map(|stored| &stored.draft));
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&insights)?),
        OutputFormat::Table => {
            let headers = ["type", "priority", "confidence", "title", "action"]
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>();
            let rows = insights
                .iter()
                .map(|stored| {
                    let draft = &stored.draft;
                    vec![
                        label(&draft.kind),
                        label(&draft.priority),
                        format!("{}%", draft.confidence),
                        draft.title.clone(),
                        draft.action.clone(),
                    ]
                })
                .collect::<Vec<_>>();
            table::print_table(&headers, &rows);
            println!(
                "{} insight(s), {} high priority, average confidence {}%",
                summary.total, summary.high_priority, summary.average_confidence
            );
        }
    }
    Ok(())
}

fn handle_session(config_path: &Path, args: &SessionArgs) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    match &args.action {
        SessionAction::Show => {
            match &config.user {
                Some(user) => println!("Signed in as {} <{}>", user.display_name, user.email),
                None => println!("Not signed in"),
            }
            println!("Theme: {}", label(&config.theme));
            return Ok(());
        }
        SessionAction::Login { uid, email, name } => {
            let user = SessionUser::new(uid, email, name.as_deref());
            info!("Signed in as {}", user.display_name);
            config.sign_in(user);
        }
        SessionAction::Logout => {
            config.clear_session();
            info!("Signed out");
        }
        SessionAction::Theme { theme } => config.theme = *theme,
    }
    config
        .save(config_path)
        .with_context(|| format!("Writing config to {config_path:?}"))
}

/// The serialized name of a unit enum variant.
fn label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|json| json.as_str().map(str::to_string))
        .unwrap_or_default()
}
