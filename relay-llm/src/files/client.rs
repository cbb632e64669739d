use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use super::types::*;
use crate::responses::ResponsesClient;

/// Files and vector stores endpoints
impl ResponsesClient {
    /// POST /files
    pub async fn upload_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        purpose: FilePurpose,
    ) -> Result<FileObject, FileError> {
        debug!(target: "llm::http", filename, size = bytes.len(), "POST /files");

        let form = Form::new()
            .text("purpose", purpose.as_str())
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));

        let result = self
            .build_request(Method::POST, "/files")
            .multipart(form)
            .send()
            .await;

        Ok(Self::parse_body(result).await?)
    }

    /// Upload a local file for file search
    pub async fn upload_path(&self, path: impl AsRef<Path>) -> Result<FileObject, FileError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        self.upload_file(&filename, bytes, FilePurpose::Assistants).await
    }

    /// Download a remote document and upload it for file search
    pub async fn upload_url(&self, url: &str) -> Result<FileObject, FileError> {
        let download_error = |reason: String| FileError::Download { url: url.to_string(), reason };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_error(format!("status {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| download_error(e.to_string()))?;
        self.upload_file(filename_from_url(url), bytes.to_vec(), FilePurpose::Assistants)
            .await
    }

    /// POST /vector_stores
    pub async fn create_vector_store(&self, name: &str) -> Result<VectorStore, FileError> {
        debug!(target: "llm::http", name, "POST /vector_stores");

        let result = self
            .build_request(Method::POST, "/vector_stores")
            .json(&json!({ "name": name }))
            .send()
            .await;

        Ok(Self::parse_body(result).await?)
    }

    /// POST /vector_stores/{id}/files
    pub async fn attach_file(&self, vector_store_id: &str, file_id: &str) -> Result<VectorStoreFile, FileError> {
        debug!(target: "llm::http", vector_store_id, file_id, "POST /vector_stores/{{id}}/files");

        let result = self
            .build_request(Method::POST, &format!("/vector_stores/{}/files", vector_store_id))
            .json(&json!({ "file_id": file_id }))
            .send()
            .await;

        Ok(Self::parse_body(result).await?)
    }

    /// GET /vector_stores/{id}/files
    pub async fn list_vector_store_files(&self, vector_store_id: &str) -> Result<Vec<VectorStoreFile>, FileError> {
        let result = self
            .build_request(Method::GET, &format!("/vector_stores/{}/files", vector_store_id))
            .send()
            .await;

        let list: ListResponse<VectorStoreFile> = Self::parse_body(result).await?;
        Ok(list.data)
    }

    /// Poll the vector store until the file is indexed
    pub async fn wait_for_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<VectorStoreFile, FileError> {
        for attempt in 1..=max_attempts {
            let files = self.list_vector_store_files(vector_store_id).await?;
            let file = files
                .into_iter()
                .find(|f| f.id == file_id)
                .ok_or_else(|| FileError::NotAttached {
                    vector_store_id: vector_store_id.to_string(),
                    file_id: file_id.to_string(),
                })?;

            debug!(target: "llm::http", file_id, attempt, status = %file.status, "vector store file status");

            match file.status {
                VectorStoreFileStatus::Completed => return Ok(file),
                VectorStoreFileStatus::Failed | VectorStoreFileStatus::Cancelled => {
                    return Err(FileError::IndexingFailed {
                        file_id: file_id.to_string(),
                        status: file.status,
                    });
                }
                VectorStoreFileStatus::InProgress => {
                    if attempt < max_attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        Err(FileError::NotReady { file_id: file_id.to_string(), attempts: max_attempts })
    }
}

/// Last path segment of a url, without query string
pub(crate) fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);
    path.split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .last()
        .unwrap_or("download")
}
