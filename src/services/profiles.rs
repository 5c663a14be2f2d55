use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::require_admin;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{DocumentStatus, Profile, ProfileRole};
use crate::records::RecordStore;

const UNKNOWN: &str = "Unknown";

/// Registration form fields. Identity fields come from the verified token.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prn: String,
    #[serde(default, alias = "collegeName")]
    pub college_name: String,
    #[serde(default, alias = "collegeId")]
    pub college_id: String,
    #[serde(default, alias = "additionalInfo")]
    pub additional_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub prn: String,
    pub document_count: usize,
    pub has_pending: bool,
}

#[derive(Default)]
struct Tally {
    document_count: usize,
    has_pending: bool,
}

#[derive(Clone)]
pub struct ProfileService {
    records: Arc<dyn RecordStore>,
}

impl ProfileService {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// Upserts: registering again under the same subject replaces the profile.
    pub async fn register(
        &self,
        role: ProfileRole,
        user_id: &str,
        email: Option<&str>,
        registration: ProfileRegistration,
    ) -> ServiceResult<Profile> {
        let email = email
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| ServiceError::invalid_input("identity token carries no email"))?;
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid_input("name is required"));
        }
        let college_id = registration.college_id.trim();
        if college_id.is_empty() {
            return Err(ServiceError::invalid_input("college_id is required"));
        }

        let additional_info = match role {
            ProfileRole::Admin => registration.additional_info.trim().to_string(),
            ProfileRole::Student => String::new(),
        };

        let profile = Profile {
            user_id: user_id.to_string(),
            role,
            email: email.to_string(),
            name: name.to_string(),
            prn: registration.prn.trim().to_string(),
            college_name: registration.college_name.trim().to_string(),
            college_id: college_id.to_string(),
            additional_info,
            created_at: Utc::now(),
        };

        self.records
            .upsert_profile(profile.clone())
            .await
            .map_err(ServiceError::upstream("failed to save profile"))?;

        info!(user_id = %user_id, role = %role, college_id = %profile.college_id, "profile registered");
        Ok(profile)
    }

    pub async fn fetch(&self, user_id: &str, role: ProfileRole) -> ServiceResult<Profile> {
        self.records
            .get_profile(user_id, role)
            .await
            .map_err(ServiceError::upstream("failed to load profile"))?
            .ok_or(match role {
                ProfileRole::Student => ServiceError::NotFound("student"),
                ProfileRole::Admin => ServiceError::NotFound("admin"),
            })
    }

    /// A student's profile as seen by an admin of the same college.
    pub async fn student_for_admin(
        &self,
        caller_id: &str,
        student_id: &str,
    ) -> ServiceResult<Profile> {
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let student = self.fetch(student_id, ProfileRole::Student).await?;
        if student.college_id != admin.college_id {
            return Err(ServiceError::forbidden("student belongs to another college"));
        }
        Ok(student)
    }

    /// Students are discovered through their uploads: a registered student
    /// without documents does not appear.
    pub async fn roster(&self, caller_id: &str) -> ServiceResult<Vec<RosterEntry>> {
        let admin = require_admin(self.records.as_ref(), caller_id).await?;
        let documents = self
            .records
            .documents_by_college(&admin.college_id)
            .await
            .map_err(ServiceError::upstream("failed to load college documents"))?;

        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for document in documents {
            let tally = tallies.entry(document.owner_id).or_default();
            tally.document_count += 1;
            tally.has_pending |= document.status == DocumentStatus::Pending;
        }

        let records = self.records.as_ref();
        let entries = try_join_all(tallies.into_iter().map(|(user_id, tally)| async move {
            let profile = records
                .get_profile(&user_id, ProfileRole::Student)
                .await
                .map_err(ServiceError::upstream("failed to load student profile"))?;
            let (name, email, prn) = match profile {
                Some(profile) => (profile.name, profile.email, profile.prn),
                None => (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string()),
            };
            Ok::<_, ServiceError>(RosterEntry {
                user_id,
                name,
                email,
                prn,
                document_count: tally.document_count,
                has_pending: tally.has_pending,
            })
        }))
        .await?;

        Ok(entries)
    }
}
