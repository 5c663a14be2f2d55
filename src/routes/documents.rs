use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::services::documents::{DocumentView, NewUpload};
use crate::state::AppState;

const UPLOAD_FIELD: &str = "document";

#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListScope {
    #[default]
    User,
    College,
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub scope: ListScope,
}

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub message: &'static str,
    pub document: DocumentView,
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut upload: Option<NewUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().map(str::to_string).unwrap_or_default();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        upload = Some(NewUpload {
            bytes,
            original_name,
            content_type,
        });
    }

    let upload = upload.ok_or_else(|| {
        error!("upload rejected: missing document field");
        AppError::bad_request("no file uploaded")
    })?;

    let original_name = upload.original_name.clone();
    let document = state
        .documents
        .create(&user.user_id, upload)
        .await
        .map_err(|err| {
            error!(error = %err, original_name = %original_name, "document upload failed");
            AppError::from(err)
        })?;

    info!(
        document_id = %document.record.document_id,
        original_name = %document.record.original_name,
        "document upload succeeded"
    );

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            message: "Document uploaded",
            document,
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DocumentListQuery>,
) -> AppResult<Json<Vec<DocumentView>>> {
    let documents = match query.scope {
        ListScope::User => state.documents.list_for_owner(&user.user_id).await?,
        ListScope::College => state.documents.list_for_college(&user.user_id).await?,
    };
    Ok(Json(documents))
}

pub async fn list_user_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentView>>> {
    Ok(Json(state.documents.list_for_owner(&user.user_id).await?))
}

pub async fn list_college_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentView>>> {
    Ok(Json(state.documents.list_for_college(&user.user_id).await?))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentView>> {
    Ok(Json(state.documents.get(&user.user_id, document_id).await?))
}

pub async fn update_document_status(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> AppResult<Json<DocumentResponse>> {
    let Json(payload) = payload?;
    let status = payload.status.unwrap_or_default();
    let document = state
        .documents
        .transition(&user.user_id, document_id, &status, payload.remark)
        .await?;
    Ok(Json(DocumentResponse {
        message: "Status updated successfully",
        document,
    }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.documents.delete(&user.user_id, document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
