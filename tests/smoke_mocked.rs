/// Smoke checks and API client against a mocked platform API
use ead_ops::api_client::{PlatformClient, RegisterRequest};
use ead_ops::errors::OpsError;
use ead_ops::report::Report;
use ead_ops::smoke::{default_suite, register_user, run_suite};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> PlatformClient {
    PlatformClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

async fn mount_login(server: &MockServer) {
    let body = json!({
        "success": true,
        "data": {
            "user": { "id": "u-1", "email": "student.e2e@test.com", "role": "student" },
            "tokens": { "accessToken": "access-123", "refreshToken": "refresh-456" }
        }
    });
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_reads_tokens() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    let session = client_for(&server)
        .login("student.e2e@test.com", "Senha123!")
        .await
        .unwrap();

    assert_eq!(session.access_token, "access-123");
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-456"));
    assert_eq!(session.user["email"], "student.e2e@test.com");
}

#[tokio::test]
async fn test_login_failure_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": { "message": "Credenciais inválidas" } })),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .login("student.e2e@test.com", "errada123")
        .await
        .unwrap_err();

    match err {
        OpsError::Http { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Credenciais"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_me_sends_bearer_token() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("Authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1", "email": "student.e2e@test.com", "role": "student"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.login("student.e2e@test.com", "Senha123!").await.unwrap();
    let me = client.me(&session).await.unwrap();

    assert_eq!(me["role"], "student");
}

#[tokio::test]
async fn test_register_existing_user_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "error": "Email já cadastrado" })))
        .mount(&server)
        .await;

    let request = RegisterRequest::student("Aluno E2E", "student.e2e@test.com", "Senha123!");
    let outcome = register_user(&client_for(&server), &request).await.unwrap();

    assert!(!outcome.created);
    assert!(outcome.render().contains("já existe"));
}

#[tokio::test]
async fn test_register_rejects_short_password_before_calling_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let request = RegisterRequest::student("Aluno", "aluno@test.com", "123");
    let err = register_user(&client_for(&server), &request).await.unwrap_err();

    assert!(matches!(err, OpsError::InvalidInput(_)));
}

#[tokio::test]
async fn test_non_json_body_is_kept_as_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
        .mount(&server)
        .await;

    let response = client_for(&server).get_json("/health", None).await.unwrap();

    assert_eq!(response.status, 429);
    assert_eq!(response.body, json!("Too many requests"));
}

fn plan_not_found() -> serde_json::Value {
    json!({ "error": { "code": "PLAN_NOT_FOUND", "message": "Plan not found or inactive" } })
}

async fn mount_healthy_api(server: &MockServer) {
    mount_login(server).await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/subscriptions/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "p-1", "name": "Mensal", "price": "49.90", "currency": "BRL", "interval": "month" }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/subscriptions/plans/[0-9a-f-]{36}$"))
        .respond_with(ResponseTemplate::new(404).set_body_json(plan_not_found()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions"))
        .and(header("Authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(404).set_body_json(plan_not_found()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("Authorization", "Bearer access-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1", "email": "student.e2e@test.com", "role": "student"
        })))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(2)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/courses/instructor/my-courses"))
        .respond_with(ResponseTemplate::new(403))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_default_suite_passes_against_healthy_api() {
    let server = MockServer::start().await;
    mount_healthy_api(&server).await;

    let client = client_for(&server);
    let session = client.login("student.e2e@test.com", "Senha123!").await.unwrap();
    let report = run_suite(&client, Some(&session), &default_suite()).await;

    let failures: Vec<_> = report.failures().map(|r| (&r.path, &r.reason)).collect();
    assert!(report.passed(), "failures: {:?}", failures);
    assert!(report.is_ok());
    assert_eq!(report.results.len(), default_suite().len());
}

#[tokio::test]
async fn test_plan_checks_fail_when_routes_are_missing() {
    // A server with only login mounted answers 404 to everything else.
    let server = MockServer::start().await;
    mount_login(&server).await;

    let client = client_for(&server);
    let session = client.login("student.e2e@test.com", "Senha123!").await.unwrap();
    let checks: Vec<_> = default_suite()
        .into_iter()
        .filter(|c| c.path.starts_with("/api/subscriptions/plans/") || c.path == "/api/subscriptions")
        .collect();
    assert_eq!(checks.len(), 2);
    let report = run_suite(&client, Some(&session), &checks).await;

    assert!(report.results.iter().all(|r| r.status == Some(404)));
    assert!(report.results.iter().all(|r| !r.passed));
    assert!(report
        .failures()
        .all(|r| r.reason.as_deref().unwrap_or("").contains("error.code")));
}

#[tokio::test]
async fn test_suite_reports_server_errors() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/courses/instructor/my-courses"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let session = client.login("student.e2e@test.com", "Senha123!").await.unwrap();
    let checks: Vec<_> = default_suite()
        .into_iter()
        .filter(|c| c.path == "/api/courses/instructor/my-courses")
        .collect();
    let report = run_suite(&client, Some(&session), &checks).await;

    assert!(!report.passed());
    assert_eq!(report.results[0].status, Some(500));
    assert!(report.render().contains("❌"));
}

#[tokio::test]
async fn test_unreachable_server_fails_checks_without_panicking() {
    // Nothing listens on port 9 on loopback.
    let client = PlatformClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    let checks: Vec<_> = default_suite()
        .into_iter()
        .filter(|c| !c.authenticated)
        .collect();
    let report = run_suite(&client, None, &checks).await;

    assert!(!report.passed());
    assert!(report.results.iter().all(|r| r.status.is_none()));
}
