pub mod documents;
pub mod notifications;
pub mod profiles;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Profile, ProfileRole};
use crate::records::RecordStore;

/// Resolves the caller's own admin profile. College scoping is always taken
/// from here, never from request input.
pub(crate) async fn require_admin(
    records: &dyn RecordStore,
    caller_id: &str,
) -> ServiceResult<Profile> {
    let profile = records
        .get_profile(caller_id, ProfileRole::Admin)
        .await
        .map_err(ServiceError::upstream("failed to load admin profile"))?
        .ok_or_else(|| ServiceError::forbidden("admin profile not found"))?;

    if profile.college_id.trim().is_empty() {
        return Err(ServiceError::forbidden("admin profile has no college"));
    }

    Ok(profile)
}
