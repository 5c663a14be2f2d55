use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::identity::IdentityVerifier,
    config::AppConfig,
    mailer::Mailer,
    records::RecordStore,
    services::{
        documents::DocumentService, notifications::NotificationService, profiles::ProfileService,
    },
    storage::ObjectStorage,
};

/// Process-wide handles, built once at startup and handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub documents: DocumentService,
    pub profiles: ProfileService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn ObjectStorage>,
        identity: Arc<dyn IdentityVerifier>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let documents = DocumentService::new(
            records.clone(),
            storage,
            Duration::from_secs(config.presigned_url_expiry_seconds),
            config.delete_policy,
            config.upload_cleanup_on_failure,
        );
        let profiles = ProfileService::new(records.clone());
        let notifications = NotificationService::new(records, mailer, config.mail_from.clone());

        Self {
            config: Arc::new(config),
            identity,
            documents,
            profiles,
            notifications,
        }
    }
}
