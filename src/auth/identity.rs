use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The caller behind a verified bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid identity token: {0}")]
    Invalid(String),
    #[error("identity provider error: {0:#}")]
    Upstream(anyhow::Error),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}
