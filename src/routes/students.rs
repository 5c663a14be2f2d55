use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{Profile, ProfileRole};
use crate::services::profiles::ProfileRegistration;
use crate::state::AppState;

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub message: &'static str,
    pub profile: Profile,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn register_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ProfileRegistration>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RegistrationResponse>)> {
    let Json(payload) = payload?;
    let profile = state
        .profiles
        .register(
            ProfileRole::Student,
            &user.user_id,
            user.email.as_deref(),
            payload,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            message: "Student registered successfully",
            profile,
        }),
    ))
}

pub async fn get_student(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Profile>> {
    Ok(Json(
        state.profiles.fetch(&user_id, ProfileRole::Student).await?,
    ))
}

pub async fn send_status_email(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<MessageResponse>> {
    state
        .notifications
        .send_status_email(&user.user_id, &student_id)
        .await?;
    Ok(Json(MessageResponse {
        message: "Email sent successfully",
    }))
}
