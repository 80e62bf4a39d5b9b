//! Document upload endpoints.
//!
//! Uploaded files are attached to a chat session and later injected as
//! context into that session's chat completions.

use crate::api::handlers::AppState;
use crate::api::models::{
    DeleteFileResponse, ErrorBody, SessionFile, SessionFilesResponse, UploadRequest,
    UploadResponse,
};
use crate::core::logging::get_request_id;
use crate::core::{AppError, Result};
use crate::services::DocumentError;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

/// Fields collected from an upload form.
#[derive(Default)]
struct UploadForm {
    session_id: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    content: Option<Vec<u8>>,
}

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Document(DocumentError::FileTooLarge)
    } else {
        AppError::Upload(error.body_text())
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                form.filename = field.file_name().map(str::to_string);
                form.content_type = field.content_type().map(str::to_string);
                form.content = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            Some("session_id") => {
                form.session_id = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Upload a document into a session
///
/// Accepts `multipart/form-data` with a `file` part and a `session_id`
/// field. Supported types are `.pdf`, `.docx`, `.txt`, `.md` and `.csv`.
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "documents",
    request_body(content = UploadRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Document processed", body = UploadResponse),
        (status = 400, description = "Upload rejected or unreadable", body = ErrorBody),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip_all, fields(request_id = %get_request_id()))]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    state.verify_auth(&headers)?;

    let multipart = multipart.map_err(|e| AppError::Upload(e.body_text()))?;
    let form = read_upload_form(multipart).await?;

    let session_id = form
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Upload("missing session_id field".to_string()))?;
    let content = form
        .content
        .ok_or_else(|| AppError::Upload("missing file field".to_string()))?;
    let filename = form
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::Upload("file part has no filename".to_string()))?;
    let content_type = form
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    // PDF and DOCX parsing is CPU-bound
    let documents = Arc::clone(&state.documents);
    let (task_session, task_filename) = (session_id.clone(), filename.clone());
    let bytes = content.len();
    let document = tokio::task::spawn_blocking(move || {
        documents.add_document(&task_session, &task_filename, &content_type, &content)
    })
    .await
    .map_err(|e| AppError::Internal(format!("document processing task failed: {}", e)))?
    .map_err(|e| {
        tracing::warn!(filename = %filename, error = %e, "Upload rejected");
        e
    })?;

    tracing::info!(
        session_id = %session_id,
        file_id = %document.file_id,
        filename = %document.filename,
        bytes,
        chunks = document.chunks.len(),
        "Document uploaded"
    );

    Ok(Json(UploadResponse {
        file_id: document.file_id.clone(),
        filename: document.filename.clone(),
        status: "processed".to_string(),
        session_id,
        chunks: document.chunks.len(),
    }))
}

/// List documents of a session
#[utoipa::path(
    get,
    path = "/sessions/{session_id}/files",
    tag = "documents",
    params(
        ("session_id" = String, Path, description = "Chat session ID")
    ),
    responses(
        (status = 200, description = "Session documents, oldest first", body = SessionFilesResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_session_files(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<SessionFilesResponse>> {
    state.verify_auth(&headers)?;

    let files = state
        .documents
        .list_session_documents(&session_id)
        .into_iter()
        .map(|doc| SessionFile {
            file_id: doc.file_id.clone(),
            filename: doc.filename.clone(),
            created_at: doc.created_at.timestamp(),
        })
        .collect();

    Ok(Json(SessionFilesResponse { session_id, files }))
}

/// Delete a document from a session
#[utoipa::path(
    delete,
    path = "/sessions/{session_id}/files/{file_id}",
    tag = "documents",
    params(
        ("session_id" = String, Path, description = "Chat session ID"),
        ("file_id" = String, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document deleted", body = DeleteFileResponse),
        (status = 401, description = "Unauthorized", body = ErrorBody),
        (status = 404, description = "Document not found in this session", body = ErrorBody)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_session_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((session_id, file_id)): Path<(String, String)>,
) -> Result<Json<DeleteFileResponse>> {
    state.verify_auth(&headers)?;

    if !state.documents.remove_document(&session_id, &file_id) {
        return Err(AppError::NotFound(format!(
            "file {} not found in session {}",
            file_id, session_id
        )));
    }
    tracing::info!(session_id = %session_id, file_id = %file_id, "Document deleted");

    Ok(Json(DeleteFileResponse { ok: true }))
}
