use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::require_admin;
use crate::config::DeletePolicy;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{DocumentRecord, DocumentStatus, ProfileRole, ReviewUpdate};
use crate::records::RecordStore;
use crate::storage::{document_object_key, ObjectStorage};

pub struct NewUpload {
    pub bytes: Bytes,
    pub original_name: String,
    pub content_type: Option<String>,
}

/// A document record with a read link minted for this response only.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub record: DocumentRecord,
    pub url: String,
    pub url_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DocumentService {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn ObjectStorage>,
    link_ttl: Duration,
    delete_policy: DeletePolicy,
    cleanup_on_failure: bool,
}

impl DocumentService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        link_ttl: Duration,
        delete_policy: DeletePolicy,
        cleanup_on_failure: bool,
    ) -> Self {
        Self {
            records,
            storage,
            link_ttl,
            delete_policy,
            cleanup_on_failure,
        }
    }

    pub async fn create(&self, owner_id: &str, upload: NewUpload) -> ServiceResult<DocumentView> {
        let NewUpload {
            bytes,
            original_name,
            content_type,
        } = upload;

        if bytes.is_empty() {
            return Err(ServiceError::invalid_input("uploaded file must not be empty"));
        }
        let original_name = original_name.trim().to_string();
        if original_name.is_empty() {
            return Err(ServiceError::invalid_input("filename is required"));
        }

        let college_id = self
            .records
            .get_profile(owner_id, ProfileRole::Student)
            .await
            .map_err(ServiceError::upstream("failed to load student profile"))?
            .map(|profile| profile.college_id)
            .filter(|college_id| !college_id.trim().is_empty())
            .ok_or(ServiceError::ProfileIncomplete)?;

        let document_id = Uuid::new_v4();
        let object_key = document_object_key(owner_id, document_id, &original_name);
        let content_type = content_type.or_else(|| {
            mime_guess::from_path(&original_name)
                .first()
                .map(|mime| mime.to_string())
        });

        self.storage
            .put_object(
                &object_key,
                bytes,
                content_type.clone(),
                inline_content_disposition(&original_name),
            )
            .await
            .map_err(|err| {
                error!(error = %err, key = %object_key, "failed to store document");
                ServiceError::upstream("failed to store document")(err)
            })?;

        let record = DocumentRecord {
            document_id,
            owner_id: owner_id.to_string(),
            college_id,
            object_key: object_key.clone(),
            original_name,
            content_type,
            status: DocumentStatus::Pending,
            remark: String::new(),
            uploaded_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };

        if let Err(err) = self.records.insert_document(record.clone()).await {
            warn!(
                document_id = %document_id,
                key = %object_key,
                error = %err,
                "document record not persisted; stored object is orphaned"
            );
            if self.cleanup_on_failure {
                match self.storage.delete_object(&object_key).await {
                    Ok(()) => info!(key = %object_key, "removed orphaned upload"),
                    Err(cleanup_err) => {
                        warn!(key = %object_key, error = %cleanup_err, "orphan cleanup failed")
                    }
                }
            }
            return Err(ServiceError::upstream("failed to persist document record")(err));
        }

        info!(
            document_id = %document_id,
            owner_id = %record.owner_id,
            college_id = %record.college_id,
            "document uploaded"
        );
        self.with_link(record).await
    }

    pub async fn get(&self, caller_id: &str, document_id: Uuid) -> ServiceResult<DocumentView> {
        let record = self.load(document_id).await?;
        if record.owner_id != caller_id {
            return Err(ServiceError::forbidden(
                "not authorized to access this document",
            ));
        }
        self.with_link(record).await
    }

    pub async fn list_for_owner(&self, caller_id: &str) -> ServiceResult<Vec<DocumentView>> {
        let records = self
            .records
            .documents_by_owner(caller_id)
            .await
            .map_err(ServiceError::upstream("failed to load documents"))?;
        self.with_links(records).await
    }

    pub async fn list_for_college(&self, caller_id: &str) -> ServiceResult<Vec<DocumentView>> {
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let records = self
            .records
            .documents_by_college(&admin.college_id)
            .await
            .map_err(ServiceError::upstream("failed to load documents"))?;
        self.with_links(records).await
    }

    /// One student's documents, restricted to the admin's own college.
    pub async fn list_for_student(
        &self,
        caller_id: &str,
        student_id: &str,
    ) -> ServiceResult<Vec<DocumentView>> {
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let records = self
            .records
            .documents_by_owner(student_id)
            .await
            .map_err(ServiceError::upstream("failed to load documents"))?
            .into_iter()
            .filter(|record| record.college_id == admin.college_id)
            .collect();
        self.with_links(records).await
    }

    /// Any current status may be reviewed again; only the caller's college is checked.
    pub async fn transition(
        &self,
        caller_id: &str,
        document_id: Uuid,
        status: &str,
        remark: Option<String>,
    ) -> ServiceResult<DocumentView> {
        let status = DocumentStatus::parse_review_target(status)
            .ok_or_else(|| ServiceError::InvalidStatus(status.to_string()))?;
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let record = self.load(document_id).await?;

        if record.college_id != admin.college_id {
            warn!(
                document_id = %document_id,
                admin_id = %caller_id,
                "review rejected: document belongs to another college"
            );
            return Err(ServiceError::forbidden(
                "not authorized to modify this document",
            ));
        }

        let update = ReviewUpdate {
            status,
            remark: remark.unwrap_or_default(),
            reviewed_at: Utc::now(),
            reviewed_by: caller_id.to_string(),
        };

        let updated = self
            .records
            .apply_review(document_id, update)
            .await
            .map_err(ServiceError::upstream("failed to update document status"))?
            .ok_or(ServiceError::NotFound("document"))?;

        info!(
            document_id = %document_id,
            status = %updated.status,
            reviewed_by = %caller_id,
            "document reviewed"
        );
        self.with_link(updated).await
    }

    /// Removes the stored object first; the record goes only once that succeeded.
    pub async fn delete(&self, caller_id: &str, document_id: Uuid) -> ServiceResult<()> {
        let record = self.load(document_id).await?;

        if self.delete_policy == DeletePolicy::OwnerOnly && record.owner_id != caller_id {
            return Err(ServiceError::forbidden(
                "not authorized to delete this document",
            ));
        }

        self.storage
            .delete_object(&record.object_key)
            .await
            .map_err(|err| {
                error!(error = %err, key = %record.object_key, "failed to delete stored object");
                ServiceError::upstream("failed to delete stored document")(err)
            })?;

        let removed = self
            .records
            .delete_document(document_id)
            .await
            .map_err(ServiceError::upstream("failed to delete document record"))?;
        if !removed {
            // Deleted concurrently between the lookup and now.
            return Err(ServiceError::NotFound("document"));
        }

        info!(document_id = %document_id, deleted_by = %caller_id, "document deleted");
        Ok(())
    }

    async fn load(&self, document_id: Uuid) -> ServiceResult<DocumentRecord> {
        self.records
            .get_document(document_id)
            .await
            .map_err(ServiceError::upstream("failed to load document"))?
            .ok_or(ServiceError::NotFound("document"))
    }

    async fn with_link(&self, record: DocumentRecord) -> ServiceResult<DocumentView> {
        let issued_at = Utc::now();
        let url = self
            .storage
            .presign_get_object(&record.object_key, self.link_ttl)
            .await
            .map_err(ServiceError::upstream("failed to generate read URL"))?;
        let url_expires_at = issued_at
            + chrono::Duration::from_std(self.link_ttl).unwrap_or(chrono::Duration::zero());

        Ok(DocumentView {
            record,
            url,
            url_expires_at,
        })
    }

    async fn with_links(&self, records: Vec<DocumentRecord>) -> ServiceResult<Vec<DocumentView>> {
        try_join_all(records.into_iter().map(|record| self.with_link(record))).await
    }
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    // The quoted form must stay plain ASCII; the RFC 5987 form carries the real name.
    let fallback: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if !ch.is_ascii() || ch.is_ascii_control() => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(filename, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
}
