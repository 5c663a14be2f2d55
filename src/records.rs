use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{DocumentRecord, Profile, ProfileRole, ReviewUpdate};
use crate::schema::{documents, profiles};

/// Structured persistence for profiles and document metadata.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Inserts or fully replaces the profile keyed by `(user_id, role)`.
    async fn upsert_profile(&self, profile: Profile) -> Result<()>;

    async fn get_profile(&self, user_id: &str, role: ProfileRole) -> Result<Option<Profile>>;

    async fn insert_document(&self, record: DocumentRecord) -> Result<()>;

    async fn get_document(&self, document_id: Uuid) -> Result<Option<DocumentRecord>>;

    async fn documents_by_owner(&self, owner_id: &str) -> Result<Vec<DocumentRecord>>;

    async fn documents_by_college(&self, college_id: &str) -> Result<Vec<DocumentRecord>>;

    /// Returns the updated record, or `None` when the document does not exist.
    async fn apply_review(
        &self,
        document_id: Uuid,
        update: ReviewUpdate,
    ) -> Result<Option<DocumentRecord>>;

    /// Returns whether a record was removed.
    async fn delete_document(&self, document_id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("database task panicked")?
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(profiles::table)
                .values(&profile)
                .on_conflict((profiles::user_id, profiles::role))
                .do_update()
                .set((
                    profiles::email.eq(&profile.email),
                    profiles::name.eq(&profile.name),
                    profiles::prn.eq(&profile.prn),
                    profiles::college_name.eq(&profile.college_name),
                    profiles::college_id.eq(&profile.college_id),
                    profiles::additional_info.eq(&profile.additional_info),
                    profiles::created_at.eq(profile.created_at),
                ))
                .execute(conn)
                .context("failed to upsert profile")?;
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: &str, role: ProfileRole) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            profiles::table
                .find((user_id, role))
                .select(Profile::as_select())
                .first(conn)
                .optional()
                .context("failed to load profile")
        })
        .await
    }

    async fn insert_document(&self, record: DocumentRecord) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(documents::table)
                .values(&record)
                .execute(conn)
                .context("failed to insert document record")?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        self.with_conn(move |conn| {
            documents::table
                .find(document_id)
                .select(DocumentRecord::as_select())
                .first(conn)
                .optional()
                .context("failed to load document record")
        })
        .await
    }

    async fn documents_by_owner(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            documents::table
                .filter(documents::owner_id.eq(owner_id))
                .order(documents::uploaded_at.desc())
                .select(DocumentRecord::as_select())
                .load(conn)
                .context("failed to load documents by owner")
        })
        .await
    }

    async fn documents_by_college(&self, college_id: &str) -> Result<Vec<DocumentRecord>> {
        let college_id = college_id.to_string();
        self.with_conn(move |conn| {
            documents::table
                .filter(documents::college_id.eq(college_id))
                .order(documents::uploaded_at.desc())
                .select(DocumentRecord::as_select())
                .load(conn)
                .context("failed to load documents by college")
        })
        .await
    }

    async fn apply_review(
        &self,
        document_id: Uuid,
        update: ReviewUpdate,
    ) -> Result<Option<DocumentRecord>> {
        self.with_conn(move |conn| {
            diesel::update(documents::table.find(document_id))
                .set(&update)
                .returning(DocumentRecord::as_returning())
                .get_result(conn)
                .optional()
                .context("failed to update document status")
        })
        .await
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<bool> {
        self.with_conn(move |conn| {
            let removed = diesel::delete(documents::table.find(document_id))
                .execute(conn)
                .context("failed to delete document record")?;
            Ok(removed > 0)
        })
        .await
    }
}
