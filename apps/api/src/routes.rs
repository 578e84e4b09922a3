//! # HTTP Routes
//!
//! | Method | Path                           | Handler  | Auth  |
//! |--------|--------------------------------|----------|-------|
//! | GET    | `/health`                      | health   | -     |
//! | POST   | `/login`                       | login    | -     |
//! | POST   | `/prescription`                | register | user  |
//! | PATCH  | `/prescription`                | modify   | user  |
//! | DELETE | `/prescription`                | delete   | admin |
//! | POST   | `/prescription/detail`         | detail   | user  |
//! | POST   | `/prescription/print`          | print    | user  |
//! | POST   | `/prescription/{params}/{val}` | list     | user  |

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use apotek_core::payload::{
    DateRangePayload, DeletePrescriptionPayload, MessageResponse, ModifyPrescriptionPayload,
    PrescriptionArtifactsResponse, PrescriptionIdPayload, RegisterPrescriptionPayload,
};
use apotek_core::{PrescriptionDetail, PrescriptionListing, User};
use apotek_db::password::verify_password;
use apotek_db::CatalogRepository;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::services::bundle::{self, BUNDLE_FILENAME};
use crate::services::prescription::PrescriptionService;
use crate::state::AppState;

/// Preflight cache lifetime (20 days).
const CORS_MAX_AGE: Duration = Duration::from_secs(1_728_000);

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::POST,
            Method::OPTIONS,
            Method::PATCH,
            Method::GET,
            Method::DELETE,
        ])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            CONTENT_TYPE,
            AUTHORIZATION,
        ])
        .max_age(CORS_MAX_AGE);

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route(
            "/prescription",
            post(register_prescription)
                .patch(modify_prescription)
                .delete(delete_prescription),
        )
        .route("/prescription/detail", post(prescription_detail))
        .route("/prescription/print", post(print_prescription))
        .route("/prescription/{params}/{val}", post(list_prescriptions))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Unwraps a JSON body, reporting malformed input as `{"error": ...}`.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

// =============================================================================
// Health / Login
// =============================================================================

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.db.health_check().await;

    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": if database { "connected" } else { "unavailable" },
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    name: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let request = body(payload)?;

    let credentials = {
        let mut conn = state.db.acquire().await?;
        CatalogRepository::new(&mut conn)
            .get_credentials(&request.name)
            .await?
    };

    let credentials = credentials
        .filter(|c| verify_password(&request.password, &c.password_hash))
        .ok_or_else(|| ApiError::Auth("invalid user name or password".to_string()))?;

    let token = state.jwt.generate_token(&credentials.user)?;
    info!(user = %credentials.user.name, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: credentials.user,
    }))
}

// =============================================================================
// Prescriptions
// =============================================================================

async fn register_prescription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<RegisterPrescriptionPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PrescriptionArtifactsResponse>)> {
    let payload = body(payload)?;
    let response = PrescriptionService::new(state).register(&user, &payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn list_prescriptions(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path((params, val)): Path<(String, String)>,
    payload: Result<Json<DateRangePayload>, JsonRejection>,
) -> ApiResult<Json<Vec<PrescriptionListing>>> {
    let range = body(payload)?;
    let rows = PrescriptionService::new(state)
        .list(&range.start_date, &range.end_date, &params, &val)
        .await?;
    Ok(Json(rows))
}

async fn prescription_detail(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    payload: Result<Json<PrescriptionIdPayload>, JsonRejection>,
) -> ApiResult<Json<PrescriptionDetail>> {
    let request = body(payload)?;
    let detail = PrescriptionService::new(state).detail(request.prescription_id).await?;
    Ok(Json(detail))
}

async fn delete_prescription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<DeletePrescriptionPayload>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let request = body(payload)?;
    let success = PrescriptionService::new(state).delete(&user, request.id).await?;
    Ok(Json(MessageResponse { success }))
}

async fn modify_prescription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ModifyPrescriptionPayload>, JsonRejection>,
) -> ApiResult<Json<PrescriptionArtifactsResponse>> {
    let payload = body(payload)?;
    let response = PrescriptionService::new(state).modify(&user, &payload).await?;
    Ok(Json(response))
}

async fn print_prescription(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    payload: Result<Json<PrescriptionIdPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let request = body(payload)?;
    let bytes = bundle::assemble(&state.db, &state.config.static_dir, request.prescription_id).await?;
    let disposition = format!("attachment; filename={}", BUNDLE_FILENAME);

    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

// =============================================================================
// Scenario Tests
// =============================================================================
