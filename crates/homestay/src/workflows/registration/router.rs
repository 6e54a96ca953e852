use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;

use super::domain::{Actor, ApplicationId, Role};
use super::inspection::InspectionFindings;
use super::record::ApplicationRecord;
use super::repository::{ApplicationRepository, EventPublisher};
use super::requests::{
    ConsoleRequest, CreateApplication, DtdoAcceptRequest, FeePreviewRequest,
    HimKoshInitiateRequest, ListQuery, ManualPaymentReport, PaymentDecision, ReconcileRequest,
    RemarksRequest, ReviewRequest, ScrutinyRequest, StartPaymentRequest, UpdateApplication,
};
use super::service::{RegistrationError, RegistrationService, ResetOperation, SeedKind};
use crate::payments::GatewayKind;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, E> = Arc<RegistrationService<R, E>>;
type ApiResult = Result<Response, ApiError>;

/// Router builder exposing the registration workflow under `/api/v1`.
pub fn registration_router<R, E>(service: SharedService<R, E>) -> Router
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(create_handler::<R, E>).get(list_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:id",
            get(get_handler::<R, E>).patch(update_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:id/submit",
            post(submit_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:id/review",
            post(review_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:id/payment",
            post(manual_payment_handler::<R, E>),
        )
        .route(
            "/api/v1/da/applications/:id/start-scrutiny",
            post(start_scrutiny_handler::<R, E>),
        )
        .route(
            "/api/v1/da/applications/:id/save-scrutiny",
            post(save_scrutiny_handler::<R, E>),
        )
        .route(
            "/api/v1/da/applications/:id/forward-to-dtdo",
            post(forward_handler::<R, E>),
        )
        .route(
            "/api/v1/da/applications/:id/send-back",
            post(send_back_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/applications/:id/start-review",
            post(dtdo_start_review_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/applications/:id/accept",
            post(dtdo_accept_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/applications/:id/reject",
            post(dtdo_reject_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/applications/:id/revert",
            post(dtdo_revert_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/applications/:id/inspection-report",
            post(inspection_report_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/inspection-report/:id/approve",
            post(report_approve_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/inspection-report/:id/reject",
            post(report_reject_handler::<R, E>),
        )
        .route(
            "/api/v1/dtdo/inspection-report/:id/objections",
            post(report_objections_handler::<R, E>),
        )
        .route("/api/v1/himkosh/initiate", post(himkosh_handler::<R, E>))
        .route("/api/v1/payments", post(start_payment_handler::<R, E>))
        .route(
            "/api/v1/payments/reconcile",
            post(reconcile_handler::<R, E>),
        )
        .route(
            "/api/v1/payments/:id",
            patch(verify_payment_handler::<R, E>),
        )
        .route("/api/v1/fees/preview", post(fee_preview_handler::<R, E>))
        .route("/api/v1/admin/reset-db", post(reset_db_handler::<R, E>))
        .route(
            "/api/v1/admin/reset/:operation",
            post(reset_handler::<R, E>),
        )
        .route("/api/v1/admin/seed/:kind", post(seed_handler::<R, E>))
        .route(
            "/api/v1/admin/db-console/execute",
            post(console_handler::<R, E>),
        )
        .with_state(service)
}

/// HTTP failure: either a workflow error or a request the handlers never got to see.
#[derive(Debug)]
pub enum ApiError {
    Registration(RegistrationError),
    BadRequest(String),
    Unauthenticated(String),
}

impl From<RegistrationError> for ApiError {
    fn from(error: RegistrationError) -> Self {
        ApiError::Registration(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, payload) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::Unauthenticated(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ApiError::Registration(RegistrationError::Validation { field, message }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "field": field }),
            ),
            ApiError::Registration(error) => {
                let status = match &error {
                    RegistrationError::Authorization(_) => StatusCode::FORBIDDEN,
                    RegistrationError::NotFound(_) => StatusCode::NOT_FOUND,
                    RegistrationError::Conflict(_) => StatusCode::CONFLICT,
                    RegistrationError::ExternalGateway(_) => StatusCode::BAD_GATEWAY,
                    RegistrationError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                    RegistrationError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, json!({ "error": error.to_string() }))
            }
        };
        (status, Json(payload)).into_response()
    }
}

/// Callers identify themselves with `x-actor-id` and `x-actor-role`.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let user_id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {ACTOR_ID_HEADER} header")))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| {
                ApiError::Unauthenticated(format!("missing {ACTOR_ROLE_HEADER} header"))
            })?
            .parse::<Role>()
            .map_err(ApiError::Unauthenticated)?;

        Ok(Actor::new(user_id, role))
    }
}

fn view(status: StatusCode, record: &ApplicationRecord, actor: &Actor) -> Response {
    (status, Json(record.view_for(actor.role))).into_response()
}

pub(crate) async fn create_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    payload: Result<Json<CreateApplication>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.create(&actor, request)?;
    Ok(view(StatusCode::CREATED, &record, &actor))
}

pub(crate) async fn list_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let records = service.list(&actor, &query)?;
    let views: Vec<_> = records
        .iter()
        .map(|record| record.view_for(actor.role))
        .collect();
    Ok((
        StatusCode::OK,
        Json(json!({ "count": views.len(), "applications": views })),
    )
        .into_response())
}

pub(crate) async fn get_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let record = service.get(&actor, &ApplicationId(id))?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn update_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<UpdateApplication>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.update(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn submit_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let record = service.submit(&actor, &ApplicationId(id))?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn review_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.review(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn manual_payment_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<ManualPaymentReport>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(report) = payload?;
    let record = service.report_manual_payment(&actor, &ApplicationId(id), report)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn start_scrutiny_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let record = service.start_scrutiny(&actor, &ApplicationId(id))?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn save_scrutiny_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<ScrutinyRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.save_scrutiny(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn forward_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<ScrutinyRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.forward_to_dtdo(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn send_back_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.send_back(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn dtdo_start_review_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let record = service.dtdo_start_review(&actor, &ApplicationId(id))?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn dtdo_accept_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<DtdoAcceptRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.dtdo_accept(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn dtdo_reject_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.dtdo_reject(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn dtdo_revert_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.dtdo_revert(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn inspection_report_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<InspectionFindings>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(findings) = payload?;
    let record = service.submit_inspection_report(&actor, &ApplicationId(id), findings)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn report_approve_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.approve_inspection(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn report_reject_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.reject_inspection(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn report_objections_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(id): Path<String>,
    payload: Result<Json<RemarksRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let record = service.raise_objections(&actor, &ApplicationId(id), request)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

async fn start_payment<R, E>(
    service: &RegistrationService<R, E>,
    actor: &Actor,
    id: &ApplicationId,
    gateway: GatewayKind,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let start = service.initiate_payment(actor, id, gateway).await?;
    let payload = json!({
        "application": start.application.view_for(actor.role),
        "payment": start.payment.view(),
        "instruction": start.instruction,
    });
    Ok((StatusCode::CREATED, Json(payload)).into_response())
}

pub(crate) async fn himkosh_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    payload: Result<Json<HimKoshInitiateRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    start_payment(&service, &actor, &request.application_id, GatewayKind::Himkosh).await
}

pub(crate) async fn start_payment_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    payload: Result<Json<StartPaymentRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    start_payment(&service, &actor, &request.application_id, request.gateway).await
}

pub(crate) async fn verify_payment_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(reference): Path<String>,
    payload: Result<Json<PaymentDecision>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(decision) = payload?;
    let record = service.verify_payment(&actor, &reference, decision)?;
    Ok(view(StatusCode::OK, &record, &actor))
}

pub(crate) async fn reconcile_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let outcome = service.reconcile_payment(&request.external_ref).await?;
    let payload = json!({
        "application": outcome.application.view_for(actor.role),
        "payment": outcome.payment.view(),
    });
    Ok((StatusCode::OK, Json(payload)).into_response())
}

pub(crate) async fn fee_preview_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    payload: Result<Json<FeePreviewRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let fee = service.preview_fee(&request)?;
    Ok((StatusCode::OK, Json(fee)).into_response())
}

pub(crate) async fn reset_db_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let summary = service.reset_database(&actor)?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

pub(crate) async fn reset_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(operation): Path<String>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let operation = operation
        .parse::<ResetOperation>()
        .map_err(ApiError::BadRequest)?;
    let summary = service.reset(&actor, operation)?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

pub(crate) async fn seed_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    Path(kind): Path<String>,
    body: String,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let kind = kind.parse::<SeedKind>().map_err(ApiError::BadRequest)?;
    let summary = service.seed(&actor, kind, &body)?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

pub(crate) async fn console_handler<R, E>(
    State(service): State<SharedService<R, E>>,
    actor: Actor,
    payload: Result<Json<ConsoleRequest>, JsonRejection>,
) -> ApiResult
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    let Json(request) = payload?;
    let result = service.console(&actor, &request.statement)?;
    Ok((StatusCode::OK, Json(result)).into_response())
}
