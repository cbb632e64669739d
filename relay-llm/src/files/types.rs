use openai_dive::v1::error::APIError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Intended use of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePurpose {
    Assistants,
    UserData,
    Vision,
    Batch,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilePurpose::Assistants => "assistants",
            FilePurpose::UserData => "user_data",
            FilePurpose::Vision => "vision",
            FilePurpose::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

/// Indexing status of a file attached to a vector store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreFileStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for VectorStoreFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VectorStoreFileStatus::InProgress => "in_progress",
            VectorStoreFileStatus::Completed => "completed",
            VectorStoreFileStatus::Failed => "failed",
            VectorStoreFileStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    pub status: VectorStoreFileStatus,
    #[serde(default)]
    pub last_error: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("api error: {0}")]
    Api(#[from] APIError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },
    #[error("file {file_id} is not attached to vector store {vector_store_id}")]
    NotAttached { vector_store_id: String, file_id: String },
    #[error("indexing of file {file_id} ended with status {status}")]
    IndexingFailed { file_id: String, status: VectorStoreFileStatus },
    #[error("file {file_id} still in progress after {attempts} attempts")]
    NotReady { file_id: String, attempts: u32 },
}
