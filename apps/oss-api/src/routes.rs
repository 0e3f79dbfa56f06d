use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{StatusCode, request::Parts},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use oss_service::{Error as ServiceError, simulate::RoutingSimulationRequest};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new().route("/health", get(health)).with_state(state)
}

/// The admin control surface consumed by the (out-of-scope) API layer. That
/// layer authenticates the operator and forwards the organization scope in
/// `x-organization-id`; every handler threads it into the service.
pub fn admin_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/mailboxes/sync", get(mailbox_sync_summary))
		.route("/v1/mailboxes/{mailbox_id}/backfill", post(trigger_backfill))
		.route("/v1/mailboxes/{mailbox_id}/history", post(trigger_history))
		.route("/v1/mailboxes/{mailbox_id}/pause", post(pause_mailbox))
		.route("/v1/mailboxes/{mailbox_id}/resume", post(resume_mailbox))
		.route("/v1/ops/jobs/dlq", get(list_dead_jobs))
		.route("/v1/ops/jobs/{job_id}/replay", post(replay_dead_job))
		.route("/v1/ops/routing/simulate", post(simulate_routing))
		.route("/v1/ops/messages/collisions", get(list_collision_groups))
		.route("/v1/ops/messages/collisions/backfill", post(collision_backfill))
		.route("/v1/ops/metrics/overview", get(metrics_overview))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn mailbox_sync_summary(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
) -> Result<Json<serde_json::Value>, ApiError> {
	let views = state.service.mailbox_sync_summary(organization_id).await?;

	Ok(Json(serde_json::json!({ "mailboxes": views })))
}

#[derive(Debug, Serialize)]
struct EnqueuedResponse {
	job_id: Uuid,
}

async fn trigger_backfill(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Path(mailbox_id): Path<Uuid>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
	let job_id = state.service.trigger_backfill(organization_id, mailbox_id).await?;

	Ok(Json(EnqueuedResponse { job_id }))
}

async fn trigger_history(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Path(mailbox_id): Path<Uuid>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
	let job_id = state.service.trigger_history_sync(organization_id, mailbox_id).await?;

	Ok(Json(EnqueuedResponse { job_id }))
}

#[derive(Debug, Deserialize)]
struct PauseRequest {
	minutes: u64,
}

async fn pause_mailbox(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Path(mailbox_id): Path<Uuid>,
	Json(payload): Json<PauseRequest>,
) -> Result<StatusCode, ApiError> {
	state.service.pause_mailbox(organization_id, mailbox_id, payload.minutes).await?;

	Ok(StatusCode::NO_CONTENT)
}

async fn resume_mailbox(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Path(mailbox_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
	state.service.resume_mailbox(organization_id, mailbox_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
	limit: Option<i64>,
}

async fn list_dead_jobs(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let jobs = state
		.service
		.list_dead_jobs(organization_id, query.limit.unwrap_or(50))
		.await?;

	Ok(Json(serde_json::json!({ "jobs": jobs })))
}

async fn replay_dead_job(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Path(job_id): Path<Uuid>,
) -> Result<Json<EnqueuedResponse>, ApiError> {
	let job_id = state.service.replay_dead_job(organization_id, job_id).await?;

	Ok(Json(EnqueuedResponse { job_id }))
}

async fn simulate_routing(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Json(payload): Json<RoutingSimulationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let result = state.service.simulate_routing(organization_id, payload).await?;

	Ok(Json(serde_json::to_value(result).expect("Simulation result serializes.")))
}

async fn list_collision_groups(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
	Query(query): Query<LimitQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
	let groups = state
		.service
		.list_collision_groups(organization_id, query.limit.unwrap_or(50))
		.await?;

	Ok(Json(serde_json::json!({ "groups": groups })))
}

async fn collision_backfill(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
) -> Result<Json<serde_json::Value>, ApiError> {
	let report = state.service.collision_backfill(organization_id).await?;

	Ok(Json(serde_json::to_value(report).expect("Backfill report serializes.")))
}

async fn metrics_overview(
	State(state): State<AppState>,
	OrgId(organization_id): OrgId,
) -> Result<Json<serde_json::Value>, ApiError> {
	let overview = state.service.metrics_overview(organization_id).await?;

	Ok(Json(serde_json::to_value(overview).expect("Overview serializes.")))
}

/// Organization scope, forwarded by the authenticating layer.
pub struct OrgId(pub Uuid);
impl<S> axum::extract::FromRequestParts<S> for OrgId
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let raw = parts
			.headers
			.get("x-organization-id")
			.and_then(|value| value.to_str().ok())
			.ok_or_else(|| {
				json_error(
					StatusCode::BAD_REQUEST,
					"missing_organization",
					"The x-organization-id header is required.",
				)
			})?;

		Uuid::parse_str(raw.trim()).map(OrgId).map_err(|_| {
			json_error(
				StatusCode::BAD_REQUEST,
				"invalid_organization",
				"The x-organization-id header is not a UUID.",
			)
		})
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let (status, code) = match &err {
			ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
			ServiceError::InvalidRequest { .. } | ServiceError::InvalidPayload { .. } =>
				(StatusCode::BAD_REQUEST, "invalid_request"),
			ServiceError::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
			ServiceError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
			_ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
		};

		json_error(status, code, err.to_string())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
