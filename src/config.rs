use std::env;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

const GOOGLE_SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Who may delete a document record once its id is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePolicy {
    AnyAuthenticated,
    OwnerOnly,
}

impl FromStr for DeletePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "any-authenticated" | "any_authenticated" | "any" => Ok(Self::AnyAuthenticated),
            "owner-only" | "owner_only" | "owner" => Ok(Self::OwnerOnly),
            other => bail!("unknown document delete policy `{other}`"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum IdentityKeySource {
    Secret(String),
    Jwks(Url),
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub issuer: String,
    pub audience: String,
    pub key_source: IdentityKeySource,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub presigned_url_expiry_seconds: u64,
    pub upload_max_bytes: usize,
    pub identity: IdentityConfig,
    pub resend_api_key: Option<String>,
    pub resend_api_url: String,
    pub mail_from: String,
    pub delete_policy: DeletePolicy,
    pub upload_cleanup_on_failure: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET_NAME").context("S3_BUCKET_NAME must be set")?;
        let presigned_url_expiry_seconds = env::var("PRESIGNED_URL_EXPIRY_SECONDS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .context("PRESIGNED_URL_EXPIRY_SECONDS must be an integer")?;
        let upload_max_bytes = env::var("UPLOAD_MAX_BYTES")
            .unwrap_or_else(|_| (25 * 1024 * 1024).to_string())
            .parse()
            .context("UPLOAD_MAX_BYTES must be an integer")?;
        let identity = identity_from_env()?;
        let resend_api_key = env::var("RESEND_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let resend_api_url =
            env::var("RESEND_API_URL").unwrap_or_else(|_| "https://api.resend.com".to_string());
        let mail_from = env::var("MAIL_FROM")
            .unwrap_or_else(|_| "DocVerify System <onboarding@resend.dev>".to_string());
        let delete_policy = env::var("DOCUMENT_DELETE_POLICY")
            .ok()
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or(DeletePolicy::AnyAuthenticated);
        let upload_cleanup_on_failure = env::var("UPLOAD_CLEANUP_ON_FAILURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            presigned_url_expiry_seconds,
            upload_max_bytes,
            identity,
            resend_api_key,
            resend_api_url,
            mail_from,
            delete_policy,
            upload_cleanup_on_failure,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn identity_from_env() -> Result<IdentityConfig> {
    let project_id = env::var("FIREBASE_PROJECT_ID").ok();
    let issuer = env::var("IDENTITY_ISSUER")
        .ok()
        .or_else(|| {
            project_id
                .as_ref()
                .map(|id| format!("https://securetoken.google.com/{id}"))
        })
        .context("IDENTITY_ISSUER or FIREBASE_PROJECT_ID must be set")?;
    let audience = env::var("IDENTITY_AUDIENCE")
        .ok()
        .or_else(|| project_id.clone())
        .context("IDENTITY_AUDIENCE or FIREBASE_PROJECT_ID must be set")?;

    let jwks_url = env::var("IDENTITY_JWKS_URL")
        .ok()
        .or_else(|| project_id.as_ref().map(|_| GOOGLE_SECURETOKEN_JWKS_URL.to_string()));
    let secret = env::var("IDENTITY_JWT_SECRET").ok();

    let key_source = match (jwks_url, secret) {
        (_, Some(secret)) if !secret.is_empty() => IdentityKeySource::Secret(secret),
        (Some(url), _) => IdentityKeySource::Jwks(
            Url::parse(&url).context("IDENTITY_JWKS_URL must be a valid URL")?,
        ),
        _ => bail!("one of IDENTITY_JWKS_URL, IDENTITY_JWT_SECRET or FIREBASE_PROJECT_ID must be set"),
    };

    Ok(IdentityConfig {
        issuer,
        audience,
        key_source,
    })
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
