use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::document::DocumentDraft;
use super::domain::{
    Caller, Capability, DocumentId, DocumentType, FileUpload, RoleName, UserId, VerificationId,
};
use super::error::{ErrorKind, VerificationError};
use super::repository::{FileStore, NotificationPublisher, VerificationRepository};
use super::service::VerificationOrchestrator;
use super::views::DocumentView;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_CAPABILITY_HEADER: &str = "x-caller-capability";

/// Headroom above the upload limit so oversize files reach upload validation.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

type Orchestrator<R, N, F> = Arc<VerificationOrchestrator<R, N, F>>;

/// Router builder exposing the verification workflow over HTTP.
pub fn verification_router<R, N, F>(service: Orchestrator<R, N, F>) -> Router
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let body_limit =
        usize::try_from(service.upload_policy().max_bytes).unwrap_or(usize::MAX);

    Router::new()
        .route(
            "/api/v1/verification/registrations",
            post(register_handler::<R, N, F>),
        )
        .route("/api/v1/verification/me", get(my_status_handler::<R, N, F>))
        .route(
            "/api/v1/verification/me/documents",
            get(my_documents_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/documents",
            post(upload_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/documents/pending",
            get(pending_documents_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/documents/:document_id",
            delete(delete_document_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/documents/:document_id/verify",
            post(verify_document_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/documents/:document_id/reject",
            post(reject_document_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records",
            get(list_by_role_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records/pending",
            get(list_pending_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records/:record_id",
            get(record_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records/:record_id/approve",
            post(approve_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records/:record_id/reject",
            post(reject_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/records/:record_id/request-documents",
            post(request_documents_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/review-queue",
            get(review_queue_handler::<R, N, F>),
        )
        .route(
            "/api/v1/verification/statistics",
            get(statistics_handler::<R, N, F>),
        )
        .layer(DefaultBodyLimit::max(
            body_limit.saturating_add(BODY_LIMIT_SLACK),
        ))
        .with_state(service)
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::UnknownRole => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let payload = json!({
            "error": self.to_string(),
            "kind": kind,
        });
        (status, axum::Json(payload)).into_response()
    }
}

/// Resolves the caller established by the upstream identity layer.
pub(crate) fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let user_id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let capability = headers
        .get(CALLER_CAPABILITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(Capability::parse);

    match (user_id, capability) {
        (Some(user_id), Some(capability)) => Ok(Caller {
            user_id: UserId(user_id.to_string()),
            capability,
        }),
        _ => {
            let payload = json!({
                "error": format!(
                    "{CALLER_ID_HEADER} and {CALLER_CAPABILITY_HEADER} headers are required"
                ),
                "kind": "unauthenticated",
            });
            Err((StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response())
        }
    }
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, VerificationError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Review commands accept an empty body; anything else must be a JSON object.
fn optional_json_body<T>(body: &Bytes) -> Result<T, VerificationError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| VerificationError::Validation(format!("malformed request body: {err}")))
}

macro_rules! caller_or_reject {
    ($headers:expr) => {
        match caller_from_headers(&$headers) {
            Ok(caller) => caller,
            Err(response) => return response,
        }
    };
}

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub role: String,
    /// Admins may register on behalf of another user.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentsRequest {
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub document_type: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleQuery {
    #[serde(default)]
    pub role: Option<String>,
}

pub(crate) async fn register_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<RegistrationRequest>,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let subject = match request.user_id {
        Some(user_id) if user_id != caller.user_id.0 => {
            if !caller.is_admin() {
                return VerificationError::Forbidden(
                    "only admins may register other users".to_string(),
                )
                .into_response();
            }
            Caller::applicant(user_id)
        }
        _ => caller,
    };

    let result = service
        .register(&subject.user_id, &RoleName::new(&request.role))
        .and_then(|_| service.my_status(&subject));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn my_status_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.my_status(&caller))
}

pub(crate) async fn my_documents_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.my_documents(&caller))
}

pub(crate) async fn upload_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let draft = DocumentDraft {
        document_type: DocumentType::new(&params.document_type),
        title: params.title,
        description: params.description,
    };
    let upload = FileUpload::new(params.file_name, content_type, body.to_vec());

    let result = service
        .upload_document(&caller, draft, upload)
        .map(|document| DocumentView::build(&document, service.registry()));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn delete_document_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    match service.delete_document(&caller, &DocumentId(document_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn verify_document_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let request: NotesRequest = match optional_json_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let result = service
        .verify_document(&caller, &DocumentId(document_id), request.notes.as_deref())
        .map(|document| DocumentView::build(&document, service.registry()));
    respond(StatusCode::OK, result)
}

pub(crate) async fn reject_document_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let request: ReasonRequest = match optional_json_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let result = service
        .reject_document(&caller, &DocumentId(document_id), &request.reason)
        .map(|document| DocumentView::build(&document, service.registry()));
    respond(StatusCode::OK, result)
}

pub(crate) async fn pending_documents_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.pending_documents(&caller))
}

pub(crate) async fn list_pending_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.list_pending(&caller))
}

pub(crate) async fn list_by_role_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Query(query): Query<RoleQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let result = match query.role.as_deref().map(str::trim) {
        Some(role) if !role.is_empty() => service.list_by_role(&caller, &RoleName::new(role)),
        _ => Err(VerificationError::Validation(
            "role query parameter is required".to_string(),
        )),
    };
    respond(StatusCode::OK, result)
}

pub(crate) async fn record_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(
        StatusCode::OK,
        service.record(&caller, &VerificationId(record_id)),
    )
}

pub(crate) async fn approve_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let request: NotesRequest = match optional_json_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let record_id = VerificationId(record_id);
    let result = service
        .approve(&caller, &record_id, request.notes.as_deref())
        .and_then(|_| service.record(&caller, &record_id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn reject_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let request: ReasonRequest = match optional_json_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let record_id = VerificationId(record_id);
    let result = service
        .reject(&caller, &record_id, &request.reason)
        .and_then(|_| service.record(&caller, &record_id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn request_documents_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    let request: DocumentsRequest = match optional_json_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let record_id = VerificationId(record_id);
    let document_types = request
        .document_types
        .iter()
        .map(DocumentType::new)
        .collect();
    let result = service
        .request_documents(&caller, &record_id, document_types, &request.message)
        .and_then(|_| service.record(&caller, &record_id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn review_queue_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.users_needing_review(&caller))
}

pub(crate) async fn statistics_handler<R, N, F>(
    State(service): State<Orchestrator<R, N, F>>,
    headers: HeaderMap,
) -> Response
where
    R: VerificationRepository + 'static,
    N: NotificationPublisher + 'static,
    F: FileStore + 'static,
{
    let caller = caller_or_reject!(headers);
    respond(StatusCode::OK, service.statistics(&caller))
}
