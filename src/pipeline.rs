//! The upload-and-analyze flow.
//!
//! Decoding, statistics, and insight generation run first and locally; a
//! file that cannot be decoded is never uploaded. Persistence follows:
//! upload the bytes, save the analysis document, save its insights. When the
//! analysis save fails after a successful upload, the uploaded object is
//! deleted again so no orphan is left behind. Persistence failures are
//! reported in [`AnalysisOutcome::persistence`] and never discard the local
//! results.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{info, warn};

use crate::{
    chart::{ChartKind, ChartSelection},
    config::SessionUser,
    decode::{self, DecodeGeneration},
    insights::{InsightDraft, InsightGenerator},
    io_utils::{self, LoadedInput},
    normalize::Dataset,
    stats::{self, ColumnStatsReport},
    store::{
        ANALYSIS_SAMPLE_LIMIT, AnalysisStatus, AnalysisStore, FileMetadata, NewAnalysis,
        NewInsight, StoreError,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct SavedAnalysis {
    pub file: FileMetadata,
    pub analysis_id: String,
    pub insight_ids: Vec<String>,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub file_name: String,
    pub dataset: Dataset,
    pub statistics: ColumnStatsReport,
    pub insights: Vec<InsightDraft>,
    pub persistence: Result<SavedAnalysis, StoreError>,
}

pub struct AnalysisPipeline<'a> {
    store: &'a dyn AnalysisStore,
    generator: &'a dyn InsightGenerator,
    generation: DecodeGeneration,
}

impl<'a> AnalysisPipeline<'a> {
    pub fn new(store: &'a dyn AnalysisStore, generator: &'a dyn InsightGenerator) -> Self {
        Self {
            store,
            generator,
            generation: DecodeGeneration::new(),
        }
    }

    /// Decodes on a worker thread. Fails when a newer request superseded
    /// this one before it finished.
    pub fn decode(&self, input: &LoadedInput) -> Result<Dataset> {
        let ticket = self.generation.begin();
        let handle = decode::decode_in_background(input.bytes.clone(), Some(input.kind), ticket);
        let outcome = handle
            .join()
            .map_err(|_| anyhow!("Decoding worker for '{}' panicked", input.name))?
            .ok_or_else(|| anyhow!("Decoding '{}' was superseded by a newer file", input.name))?;
        io_utils::dataset_from_decode(&input.name, outcome)
    }

    pub fn analyze(
        &self,
        input: &LoadedInput,
        owner: &SessionUser,
        chart: Option<ChartSelection>,
    ) -> Result<AnalysisOutcome> {
        let dataset = self.decode(input)?;
        let statistics = stats::compute_column_stats(&dataset.columns, &dataset.records);
        let insights = self.generator.generate(&dataset.records, &dataset.columns);
        info!(
            "Analyzed '{}': {} row(s), {} column(s), {} insight(s)",
            input.name,
            dataset.row_count(),
            dataset.column_count(),
            insights.len()
        );

        let persistence = self.persist(input, owner, &dataset, &insights, chart);
        if let Err(err) = &persistence {
            warn!("Saving analysis of '{}' did not complete: {err}", input.name);
        }
        Ok(AnalysisOutcome {
            file_name: input.name.clone(),
            dataset,
            statistics,
            insights,
            persistence,
        })
    }

    fn persist(
        &self,
        input: &LoadedInput,
        owner: &SessionUser,
        dataset: &Dataset,
        insights: &[InsightDraft],
        chart: Option<ChartSelection>,
    ) -> Result<SavedAnalysis, StoreError> {
        let file = self.store.upload_binary(
            &input.bytes,
            &owner.uid,
            &input.name,
            input.kind.mime_type(),
        )?;
        let analysis = new_analysis(owner, &file, dataset, insights.len(), chart)?;
        let analysis_id = match self.store.save_analysis(&analysis) {
            Ok(id) => id,
            Err(err) => {
                match self.store.delete_binary(&file.url) {
                    Ok(()) => warn!("Removed uploaded object {} after failed save", file.url),
                    Err(cleanup) => warn!("Uploaded object {} is orphaned: {cleanup}", file.url),
                }
                return Err(err);
            }
        };

        let drafts = insights
            .iter()
            .map(|draft| NewInsight {
                analysis_id: analysis_id.clone(),
                draft: draft.clone(),
            })
            .collect::<Vec<_>>();
        let insight_ids = if drafts.is_empty() {
            Vec::new()
        } else {
            match self.store.save_insights(&drafts) {
                Ok(ids) => ids,
                Err(err) => {
                    if let Err(status_err) =
                        self.store.update_status(&analysis_id, AnalysisStatus::Failed)
                    {
                        warn!("Could not mark analysis {analysis_id} failed: {status_err}");
                    }
                    return Err(err);
                }
            }
        };
        Ok(SavedAnalysis {
            file,
            analysis_id,
            insight_ids,
        })
    }
}

fn new_analysis(
    owner: &SessionUser,
    file: &FileMetadata,
    dataset: &Dataset,
    insight_count: usize,
    chart: Option<ChartSelection>,
) -> Result<NewAnalysis, StoreError> {
    let data = dataset
        .sample(ANALYSIS_SAMPLE_LIMIT)
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| StoreError::Rejected(format!("record sample is not serializable: {err}")))?;
    let kind = chart
        .as_ref()
        .and_then(|selection| selection.kind)
        .unwrap_or(ChartKind::Bar);
    Ok(NewAnalysis {
        owner_id: owner.uid.clone(),
        file_name: file.name.clone(),
        file_url: file.url.clone(),
        date: Utc::now(),
        chart_type: kind.label().to_string(),
        status: AnalysisStatus::Completed,
        insights: insight_count,
        columns: dataset.columns.clone(),
        data,
        chart_config: chart,
    })
}

/// Loads `input` and runs the whole flow, attaching file context to errors.
pub fn analyze_path(
    pipeline: &AnalysisPipeline<'_>,
    input: &std::path::Path,
    mime: Option<&str>,
    owner: &SessionUser,
    chart: Option<ChartSelection>,
) -> Result<AnalysisOutcome> {
    let loaded = io_utils::read_input(input, mime)?;
    pipeline
        .analyze(&loaded, owner, chart)
        .with_context(|| format!("Analyzing {input:?}"))
}
