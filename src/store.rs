//! Persistence for uploaded files, analyses, and insights.
//!
//! [`AnalysisStore`] is the boundary to whatever keeps these documents.
//! [`LocalStore`] implements it on a directory:
//!
//! ```text
//! <root>/uploads/<owner>/<millis>-<file name>   raw bytes
//! <root>/files/<id>.json                        file metadata
//! <root>/analyses/<id>.json                     analysis documents
//! <root>/insights/<id>.json                     insight documents
//! ```
//!
//! Every failure surfaces as a [`StoreError`]; results computed locally stay
//! valid when a store operation fails.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::{chart::ChartSelection, insights::InsightDraft};

/// Most analyses returned by [`AnalysisStore::list_analyses`].
pub const ANALYSIS_LIST_LIMIT: usize = 50;
/// Records kept with a saved analysis.
pub const ANALYSIS_SAMPLE_LIMIT: usize = 100;
pub const RECENT_INSIGHTS_LIMIT: usize = 25;
pub const ANALYSIS_INSIGHTS_LIMIT: usize = 100;

const FILE_URL_PREFIX: &str = "file://";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Store document {path:?} is invalid: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Analysis '{0}' not found")]
    AnalysisNotFound(String),
    #[error("Object reference '{0}' does not belong to this store")]
    ForeignObject(String),
    #[error("Store rejected the operation: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Processing,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub url: String,
    pub owner_id: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
    pub mime_type: String,
    pub sha256: String,
}

/// An analysis document before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnalysis {
    pub owner_id: String,
    pub file_name: String,
    pub file_url: String,
    pub date: DateTime<Utc>,
    pub chart_type: String,
    pub status: AnalysisStatus,
    pub insights: usize,
    pub columns: Vec<String>,
    /// At most [`ANALYSIS_SAMPLE_LIMIT`] records.
    pub data: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    #[serde(flatten)]
    pub analysis: NewAnalysis,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInsight {
    pub analysis_id: String,
    #[serde(flatten)]
    pub draft: InsightDraft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredInsight {
    pub id: String,
    pub analysis_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub draft: InsightDraft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightScope {
    /// Newest insights across all analyses.
    Recent,
    Analysis(String),
}

pub trait AnalysisStore {
    /// Stores raw file bytes and returns their metadata, including a
    /// fetchable reference in `url`.
    fn upload_binary(
        &self,
        bytes: &[u8],
        owner_id: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<FileMetadata, StoreError>;
    fn delete_binary(&self, url: &str) -> Result<(), StoreError>;
    fn list_files(&self, owner_id: &str) -> Result<Vec<FileMetadata>, StoreError>;
    fn save_analysis(&self, analysis: &NewAnalysis) -> Result<String, StoreError>;
    fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError>;
    /// Most recent first, at most [`ANALYSIS_LIST_LIMIT`], deleted ones hidden.
    fn list_analyses(&self, owner_id: &str) -> Result<Vec<AnalysisRecord>, StoreError>;
    fn update_status(&self, id: &str, status: AnalysisStatus) -> Result<(), StoreError>;
    /// Marks the analysis deleted; the document itself is kept.
    fn delete_analysis(&self, id: &str) -> Result<(), StoreError>;
    fn save_insights(&self, insights: &[NewInsight]) -> Result<Vec<String>, StoreError>;
    fn list_insights(&self, scope: &InsightScope) -> Result<Vec<StoredInsight>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        for dir in ["uploads", "files", "analyses", "insights"] {
            let path = store.root.join(dir);
            fs::create_dir_all(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(store)
    }

    fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    fn write_document<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let path = self.document_path(collection, id);
        let file = File::create(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value).map_err(|source| StoreError::Document {
            path: path.clone(),
            source,
        })?;
        writer
            .flush()
            .map_err(|source| StoreError::Io { path, source })
    }

    fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Document {
            path: path.to_path_buf(),
            source,
        })
    }

    fn read_collection<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        let dir = self.root.join(collection);
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut documents = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                documents.push(Self::read_document(&path)?);
            }
        }
        Ok(documents)
    }

    fn object_path(&self, url: &str) -> Result<PathBuf, StoreError> {
        let path = url
            .strip_prefix(FILE_URL_PREFIX)
            .map(PathBuf::from)
            .ok_or_else(|| StoreError::ForeignObject(url.to_string()))?;
        let escapes = path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
        if !escapes && path.starts_with(self.root.join("uploads")) {
            Ok(path)
        } else {
            Err(StoreError::ForeignObject(url.to_string()))
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn object_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}

impl AnalysisStore for LocalStore {
    fn upload_binary(
        &self,
        bytes: &[u8],
        owner_id: &str,
        file_name: &str,
        mime_type: &str,
    ) -> Result<FileMetadata, StoreError> {
        let uploaded_at = Utc::now();
        let dir = self.root.join("uploads").join(object_segment(owner_id));
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!(
            "{}-{}",
            uploaded_at.timestamp_millis(),
            object_segment(file_name)
        ));
        fs::write(&path, bytes).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let metadata = FileMetadata {
            id: new_id(),
            name: file_name.to_string(),
            url: format!("{FILE_URL_PREFIX}{}", path.display()),
            owner_id: owner_id.to_string(),
            uploaded_at,
            size: bytes.len() as u64,
            mime_type: mime_type.to_string(),
            sha256: format!("{:x}", Sha256::digest(bytes)),
        };
        self.write_document("files", &metadata.id, &metadata)?;
        debug!("Stored {} byte(s) at {}", metadata.size, metadata.url);
        Ok(metadata)
    }

    fn delete_binary(&self, url: &str) -> Result<(), StoreError> {
        let path = self.object_path(url)?;
        fs::remove_file(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        for file in self.read_collection::<FileMetadata>("files")? {
            if file.url == url {
                let doc = self.document_path("files", &file.id);
                fs::remove_file(&doc).map_err(|source| StoreError::Io { path: doc, source })?;
            }
        }
        Ok(())
    }

    fn list_files(&self, owner_id: &str) -> Result<Vec<FileMetadata>, StoreError> {
        let mut files = self
            .read_collection::<FileMetadata>("files")?
            .into_iter()
            .filter(|file| file.owner_id == owner_id)
            .collect::<Vec<_>>();
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(files)
    }

    fn save_analysis(&self, analysis: &NewAnalysis) -> Result<String, StoreError> {
        let record = AnalysisRecord {
            id: new_id(),
            analysis: analysis.clone(),
            deleted: false,
        };
        self.write_document("analyses", &record.id, &record)?;
        Ok(record.id)
    }

    fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let path = self.document_path("analyses", id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_document(&path).map(Some)
    }

    fn list_analyses(&self, owner_id: &str) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut analyses = self
            .read_collection::<AnalysisRecord>("analyses")?
            .into_iter()
            .filter(|record| record.analysis.owner_id == owner_id && !record.deleted)
            .collect::<Vec<_>>();
        analyses.sort_by(|a, b| {
            b.analysis
                .date
                .cmp(&a.analysis.date)
                .then_with(|| a.id.cmp(&b.id))
        });
        analyses.truncate(ANALYSIS_LIST_LIMIT);
        Ok(analyses)
    }

    fn update_status(&self, id: &str, status: AnalysisStatus) -> Result<(), StoreError> {
        let mut record = self
            .get_analysis(id)?
            .ok_or_else(|| StoreError::AnalysisNotFound(id.to_string()))?;
        record.analysis.status = status;
        self.write_document("analyses", id, &record)
    }

    fn delete_analysis(&self, id: &str) -> Result<(), StoreError> {
        let mut record = self
            .get_analysis(id)?
            .ok_or_else(|| StoreError::AnalysisNotFound(id.to_string()))?;
        record.deleted = true;
        self.write_document("analyses", id, &record)
    }

    fn save_insights(&self, insights: &[NewInsight]) -> Result<Vec<String>, StoreError> {
        let created_at = Utc::now();
        insights
            .iter()
            .map(|insight| {
                let stored = StoredInsight {
                    id: new_id(),
                    analysis_id: insight.analysis_id.clone(),
                    created_at,
                    draft: insight.draft.clone(),
                };
                self.write_document("insights", &stored.id, &stored)?;
                Ok(stored.id)
            })
            .collect()
    }

    fn list_insights(&self, scope: &InsightScope) -> Result<Vec<StoredInsight>, StoreError> {
        let (filter, limit) = match scope {
            InsightScope::Recent => (None, RECENT_INSIGHTS_LIMIT),
            InsightScope::Analysis(id) => (Some(id.as_str()), ANALYSIS_INSIGHTS_LIMIT),
        };
        let mut insights = self
            .read_collection::<StoredInsight>("insights")?
            .into_iter()
            .filter(|insight| filter.is_none_or(|id| insight.analysis_id == id))
            .collect::<Vec<_>>();
        insights.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        insights.truncate(limit);
        Ok(insights)
    }
}
