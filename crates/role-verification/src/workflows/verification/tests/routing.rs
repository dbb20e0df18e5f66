use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::verification::{
    verification_router, Caller, InMemoryFileStore, RecordingNotifier, VerificationOrchestrator,
    CALLER_CAPABILITY_HEADER, CALLER_ID_HEADER,
};

fn request(method: Method, uri: &str, caller: Option<&Caller>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        let capability = if caller.is_admin() { "admin" } else { "applicant" };
        builder = builder
            .header(CALLER_ID_HEADER, caller.user_id.0.as_str())
            .header(CALLER_CAPABILITY_HEADER, capability);
    }
    builder.body(body).expect("valid request")
}

fn json_request(
    method: Method,
    uri: &str,
    caller: &Caller,
    payload: serde_json::Value,
) -> Request<Body> {
    let mut request = request(
        method,
        uri,
        Some(caller),
        Body::from(serde_json::to_vec(&payload).expect("serialize")),
    );
    request.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    request
}

#[tokio::test]
async fn missing_caller_headers_are_unauthorized() {
    let (service, _, _, _) = build_orchestrator();
    let router = verification_router(Arc::new(service));

    let response = router
        .oneshot(request(
            Method::GET,
            "/api/v1/verification/me",
            None,
            Body::empty(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "unauthenticated");
}

#[tokio::test]
async fn registration_returns_record_view_with_requirements() {
    let (service, _, _, _) = build_orchestrator();
    let router = verification_router(Arc::new(service));
    let applicant = Caller::applicant("http-adv-1");

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/verification/registrations",
            &applicant,
            json!({ "role": "Advocate" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["role"], "advocate");
    assert_eq!(body["progress"], 20.0);
    assert_eq!(body["required_documents"].as_array().map(Vec::len), Some(3));

    let duplicate = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/verification/registrations",
            &applicant,
            json!({ "role": "advocate" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn applicants_cannot_register_other_users() {
    let (service, _, _, _) = build_orchestrator();
    let router = verification_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/verification/registrations",
            &Caller::applicant("http-user-1"),
            json!({ "role": "citizen", "user_id": "someone-else" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/verification/registrations",
            &admin(),
            json!({ "role": "citizen", "user_id": "backfilled-user" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["user_id"], "backfilled-user");
    assert_eq!(body["status"], "verified");
}

#[tokio::test]
async fn raw_body_upload_validates_type_and_format() {
    let (service, _, _, files) = build_orchestrator();
    let (applicant, _) = enroll(&service, "http-lawyer-1", "lawyer");
    let router = verification_router(Arc::new(service));

    let mut upload = request(
        Method::POST,
        "/api/v1/verification/documents?document_type=professional_cert&title=Certificate&file_name=cert.pdf",
        Some(&applicant),
        Body::from(b"%PDF-1.7".to_vec()),
    );
    upload.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/pdf"),
    );
    let response = router.clone().oneshot(upload).await.expect("responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["format"], "pdf");
    assert_eq!(body["document_type_label"], "Professional Certificate");
    assert_eq!(files.len(), 1);

    let foreign = request(
        Method::POST,
        "/api/v1/verification/documents?document_type=practice_license&title=License&file_name=license.pdf",
        Some(&applicant),
        Body::from(b"%PDF-1.7".to_vec()),
    );
    let response = router.clone().oneshot(foreign).await.expect("responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation");

    let mut text = request(
        Method::POST,
        "/api/v1/verification/documents?document_type=employment_letter&title=Letter&file_name=letter.txt",
        Some(&applicant),
        Body::from("plain text".as_bytes().to_vec()),
    );
    text.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain"),
    );
    let response = router.oneshot(text).await.expect("responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn review_routes_map_state_errors_to_conflict() {
    let (service, _, _, _) = build_orchestrator();
    let (applicant, record) = enroll(&service, "http-adv-2", "advocate");
    let documents = upload_all(&service, &applicant, &ADVOCATE_DOCUMENTS);
    let router = verification_router(Arc::new(service));

    let verify_uri = format!("/api/v1/verification/documents/{}/verify", documents[0].id);
    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &verify_uri,
            &admin(),
            json!({ "notes": "matches registry" }),
        ))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "verified");
    assert_eq!(body["reviewed_by"], "admin-1");

    let again = router
        .clone()
        .oneshot(json_request(Method::POST, &verify_uri, &admin(), json!({})))
        .await
        .expect("responds");
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let approve_uri = format!("/api/v1/verification/records/{}/approve", record.id);
    let response = router
        .clone()
        .oneshot(json_request(Method::POST, &approve_uri, &admin(), json!({})))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "state_conflict");

    let reject_uri = format!("/api/v1/verification/records/{}/reject", record.id);
    let blank = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &reject_uri,
            &admin(),
            json!({ "reason": " " }),
        ))
        .await
        .expect("responds");
    assert_eq!(blank.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let forbidden = router
        .oneshot(json_request(
            Method::POST,
            &approve_uri,
            &applicant,
            json!({}),
        ))
        .await
        .expect("responds");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn request_documents_route_returns_updated_record() {
    let (service, _, notifier, _) = build_orchestrator();
    let (_, record) = enroll(&service, "http-lawyer-2", "lawyer");
    let router = verification_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            Method::POST,
            &format!(
                "/api/v1/verification/records/{}/request-documents",
                record.id
            ),
            &admin(),
            json!({
                "document_types": ["employment_letter"],
                "message": "Letter must be signed"
            }),
        ))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(
        body["document_requests"][0]["message"],
        "Letter must be signed"
    );
    assert_eq!(notifier.events().len(), 1);
}

#[tokio::test]
async fn delete_route_returns_no_content_for_pending_uploads() {
    let (service, _, _, _) = build_orchestrator();
    let (applicant, _) = enroll(&service, "http-firm-1", "law_firm");
    let documents = upload_all(&service, &applicant, &["firm_documents"]);
    let router = verification_router(Arc::new(service));
    let uri = format!("/api/v1/verification/documents/{}", documents[0].id);

    let response = router
        .clone()
        .oneshot(request(Method::DELETE, &uri, Some(&applicant), Body::empty()))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let missing = router
        .oneshot(request(Method::DELETE, &uri, Some(&applicant), Body::empty()))
        .await
        .expect("responds");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_listings_and_role_filters() {
    let (service, _, _, _) = build_orchestrator();
    let (applicant, _) = enroll(&service, "http-adv-3", "advocate");
    upload_all(&service, &applicant, &ADVOCATE_DOCUMENTS);
    enroll(&service, "http-citizen-1", "citizen");
    let router = verification_router(Arc::new(service));

    let cases = [
        ("/api/v1/verification/records/pending", StatusCode::OK, Some(1)),
        ("/api/v1/verification/records?role=citizen", StatusCode::OK, Some(1)),
        ("/api/v1/verification/records?role=notary", StatusCode::BAD_REQUEST, None),
        ("/api/v1/verification/records", StatusCode::UNPROCESSABLE_ENTITY, None),
        ("/api/v1/verification/documents/pending", StatusCode::OK, Some(3)),
        ("/api/v1/verification/review-queue", StatusCode::OK, Some(1)),
        ("/api/v1/verification/records/ver-999999", StatusCode::NOT_FOUND, None),
    ];

    for (uri, status, count) in cases {
        let response = router
            .clone()
            .oneshot(request(Method::GET, uri, Some(&admin()), Body::empty()))
            .await
            .expect("responds");
        assert_eq!(response.status(), status, "{uri}");
        if let Some(count) = count {
            let body = read_json_body(response).await;
            assert_eq!(body.as_array().map(Vec::len), Some(count), "{uri}");
        }
    }

    let statistics = router
        .oneshot(request(
            Method::GET,
            "/api/v1/verification/statistics",
            Some(&admin()),
            Body::empty(),
        ))
        .await
        .expect("responds");
    assert_eq!(statistics.status(), StatusCode::OK);
    let body = read_json_body(statistics).await;
    assert_eq!(body["overview"]["total"], 2);
    assert_eq!(body["overview"]["verification_rate"], 50.0);
}

#[tokio::test]
async fn statistics_handler_reports_unavailable_storage() {
    let service = Arc::new(VerificationOrchestrator::new(
        Arc::new(UnavailableRepository),
        Arc::new(RecordingNotifier::default()),
        Arc::new(InMemoryFileStore::default()),
    ));
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(CALLER_ID_HEADER, "admin-1".parse().expect("header"));
    headers.insert(CALLER_CAPABILITY_HEADER, "admin".parse().expect("header"));

    let response = crate::workflows::verification::router::statistics_handler::<
        UnavailableRepository,
        RecordingNotifier,
        InMemoryFileStore,
    >(axum::extract::State(service), headers)
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn review_commands_accept_an_empty_body() {
    let (service, _, _, _) = build_orchestrator();
    let (applicant, record) = enroll(&service, "http-adv-4", "advocate");
    let documents = upload_all(&service, &applicant, &ADVOCATE_DOCUMENTS);
    let router = verification_router(Arc::new(service));

    for document in &documents {
        let response = router
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/v1/verification/documents/{}/verify", document.id),
                Some(&admin()),
                Body::empty(),
            ))
            .await
            .expect("responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let approve_uri = format!("/api/v1/verification/records/{}/approve", record.id);
    let response = router
        .clone()
        .oneshot(request(Method::POST, &approve_uri, Some(&admin()), Body::empty()))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "verified");
    assert_eq!(body["verified_by"], "admin-1");

    let reject_uri = format!("/api/v1/verification/records/{}/reject", record.id);
    let response = router
        .oneshot(request(Method::POST, &reject_uri, Some(&admin()), Body::empty()))
        .await
        .expect("responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn malformed_review_bodies_use_the_error_envelope() {
    let (service, _, _, _) = build_orchestrator();
    let (_, record) = enroll(&service, "http-lawyer-3", "lawyer");
    let router = verification_router(Arc::new(service));

    let mut malformed = request(
        Method::POST,
        &format!("/api/v1/verification/records/{}/approve", record.id),
        Some(&admin()),
        Body::from("{notes: unquoted"),
    );
    malformed.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    let response = router.oneshot(malformed).await.expect("responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation");
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("malformed request body")));
}
