use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;

use super::students::RegistrationResponse;
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{Profile, ProfileRole};
use crate::services::documents::DocumentView;
use crate::services::profiles::{ProfileRegistration, RosterEntry};
use crate::state::AppState;

pub async fn register_admin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ProfileRegistration>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RegistrationResponse>)> {
    let Json(payload) = payload?;
    let profile = state
        .profiles
        .register(
            ProfileRole::Admin,
            &user.user_id,
            user.email.as_deref(),
            payload,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            message: "Admin registered successfully",
            profile,
        }),
    ))
}

pub async fn get_admin(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.profiles.fetch(&user_id, ProfileRole::Admin).await?))
}

pub async fn list_students(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<RosterEntry>>> {
    Ok(Json(state.profiles.roster(&user.user_id).await?))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<Profile>> {
    Ok(Json(
        state
            .profiles
            .student_for_admin(&user.user_id, &student_id)
            .await?,
    ))
}

pub async fn list_student_documents(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentView>>> {
    Ok(Json(
        state
            .documents
            .list_for_student(&user.user_id, &student_id)
            .await?,
    ))
}
