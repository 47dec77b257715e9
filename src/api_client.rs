use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::errors::OpsError;

/// Client for the platform's REST API.
#[derive(Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    base_url: String,
}

/// Tokens returned by a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub gdpr_consent: bool,
}

impl RegisterRequest {
    pub fn student(name: &str, email: &str, password: &str) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: "student".to_string(),
            gdpr_consent: true,
        }
    }
}

/// A response of any status. Bodies that are not JSON are kept as a string.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_result(self) -> Result<Value, OpsError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            let body = match self.body {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Err(OpsError::Http {
                status: self.status,
                body,
            })
        }
    }
}

impl PlatformClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OpsError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OpsError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        session: Option<&Session>,
    ) -> Result<ApiResponse, OpsError> {
        let url = self.url(path);
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(session) = session {
            request = request.bearer_auth(&session.access_token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OpsError::Transport(format!("{} {} failed: {}", method, url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OpsError::Transport(format!("reading body of {} failed: {}", url, e)))?;

        tracing::debug!("{} {} -> {}", method, url, status);
        Ok(ApiResponse {
            status: status.as_u16(),
            body: parse_body(&text),
        })
    }

    pub async fn get_json(&self, path: &str, session: Option<&Session>) -> Result<ApiResponse, OpsError> {
        self.send(Method::GET, path, None, session).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        session: Option<&Session>,
    ) -> Result<ApiResponse, OpsError> {
        self.send(Method::POST, path, Some(body), session).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, OpsError> {
        tracing::info!("Logging in as {}", email);
        let body = self
            .post_json(
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?
            .into_result()?;
        session_from_login(&body)
    }

    /// Registers a user. An existing email comes back as
    /// `OpsError::Http { status: 409, .. }`.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Value, OpsError> {
        tracing::info!("Registering {} as {}", request.email, request.role);
        let body = serde_json::to_value(request)
            .map_err(|e| OpsError::Unexpected(format!("serializing register request: {}", e)))?;
        self.post_json("/api/auth/register", &body, None)
            .await?
            .into_result()
    }

    pub async fn me(&self, session: &Session) -> Result<Value, OpsError> {
        self.get_json("/api/auth/me", Some(session))
            .await?
            .into_result()
    }
}

pub fn is_conflict(err: &OpsError) -> bool {
    matches!(err.root(), OpsError::Http { status, .. } if *status == StatusCode::CONFLICT.as_u16())
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Extracts tokens from the `{ data: { user, tokens: { accessToken, refreshToken } } }` envelope.
pub fn session_from_login(body: &Value) -> Result<Session, OpsError> {
    let data = body.get("data").unwrap_or(body);
    let access_token = data
        .pointer("/tokens/accessToken")
        .and_then(Value::as_str)
        .ok_or_else(|| OpsError::Unexpected("login response has no data.tokens.accessToken".to_string()))?
        .to_string();
    let refresh_token = data
        .pointer("/tokens/refreshToken")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Session {
        access_token,
        refresh_token,
        user: data.get("user").cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_login_envelope() {
        let body = json!({
            "success": true,
            "data": {
                "user": { "id": "u1", "email": "student.e2e@test.com", "role": "student" },
                "tokens": { "accessToken": "aaa", "refreshToken": "rrr" }
            }
        });
        let session = session_from_login(&body).unwrap();
        assert_eq!(session.access_token, "aaa");
        assert_eq!(session.refresh_token.as_deref(), Some("rrr"));
        assert_eq!(session.user["role"], "student");
    }

    #[test]
    fn test_session_without_token_fails() {
        let body = json!({ "data": { "user": {} } });
        assert!(session_from_login(&body).is_err());
    }

    #[test]
    fn test_parse_body_keeps_non_json() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("[1]"), json!([1]));
        assert_eq!(
            parse_body("Too many requests"),
            Value::String("Too many requests".into())
        );
    }

    #[test]
    fn test_register_request_is_camel_case() {
        let req = RegisterRequest::student("Aluno", "a@example.com", "Senha123!");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["gdprConsent"], true);
        assert_eq!(v["role"], "student");
    }

    #[test]
    fn test_url_joining() {
        let client = PlatformClient::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url("/health"), "http://localhost:3000/health");
        assert_eq!(client.url("health"), "http://localhost:3000/health");
    }
}
