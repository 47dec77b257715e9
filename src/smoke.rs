//! HTTP smoke checks against a running API.

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use uuid::Uuid;

use crate::api_client::{is_conflict, PlatformClient, RegisterRequest, Session};
use crate::errors::OpsError;
use crate::report::Report;
use crate::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedStatus {
    Exact(u16),
    /// Anything below 500; for endpoints whose answer depends on the role.
    NotServerError,
}

impl ExpectedStatus {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            ExpectedStatus::Exact(code) => code == status,
            ExpectedStatus::NotServerError => status < 500,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Expectation {
    pub status: ExpectedStatus,
    pub required_fields: Vec<String>,
    /// Dotted paths that must hold exactly this value.
    pub required_values: Vec<(String, Value)>,
}

impl Expectation {
    pub fn status(code: u16) -> Self {
        Self {
            status: ExpectedStatus::Exact(code),
            required_fields: Vec::new(),
            required_values: Vec::new(),
        }
    }

    pub fn not_server_error() -> Self {
        Self {
            status: ExpectedStatus::NotServerError,
            required_fields: Vec::new(),
            required_values: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.required_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_value(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.required_values.push((path.to_string(), value.into()));
        self
    }

    /// A 404 carrying the API's `error.code`, so a missing route does not pass.
    pub fn api_not_found(code: &str) -> Self {
        Self::status(404).with_value("error.code", code)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SmokeCheck {
    pub name: String,
    #[serde(serialize_with = "serialize_method")]
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub authenticated: bool,
    pub expect: Expectation,
}

fn serialize_method<S: serde::Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl SmokeCheck {
    pub fn get(name: &str, path: &str, expect: Expectation) -> Self {
        Self {
            name: name.to_string(),
            method: Method::GET,
            path: path.to_string(),
            body: None,
            authenticated: true,
            expect,
        }
    }

    pub fn post(name: &str, path: &str, body: Value, expect: Expectation) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(name, path, expect)
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// Resolves a dotted path such as `data.tokens.accessToken` or `[0].name`.
///
/// A trailing `[]` segment only asserts that the value there is an array.
pub fn check_shape<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indexes) = match segment.find('[') {
            Some(pos) => (&segment[..pos], &segment[pos..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        let mut rest = indexes;
        while let Some(stripped) = rest.strip_prefix('[') {
            let end = stripped.find(']')?;
            let inner = &stripped[..end];
            if inner.is_empty() {
                current.as_array()?;
            } else {
                let idx: usize = inner.parse().ok()?;
                current = current.get(idx)?;
            }
            rest = &stripped[end + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(current)
}

/// Checks run against any deployment; ids are random so they never exist.
pub fn default_suite() -> Vec<SmokeCheck> {
    let unknown = Uuid::new_v4();
    vec![
        SmokeCheck::get("health", "/health", Expectation::status(200)).anonymous(),
        SmokeCheck::get(
            "plans listing",
            "/api/subscriptions/plans",
            Expectation::status(200).with_fields(&["[]"]),
        ),
        SmokeCheck::get(
            "plan by unknown id",
            &format!("/api/subscriptions/plans/{}", unknown),
            Expectation::api_not_found("PLAN_NOT_FOUND"),
        ),
        SmokeCheck::post(
            "checkout with unknown plan",
            "/api/subscriptions",
            serde_json::json!({ "planId": unknown }),
            Expectation::api_not_found("PLAN_NOT_FOUND"),
        ),
        SmokeCheck::get(
            "current user",
            "/api/auth/me",
            Expectation::status(200).with_fields(&["id", "email", "role"]),
        ),
        SmokeCheck::get("current user without token", "/api/auth/me", Expectation::status(401))
            .anonymous(),
        SmokeCheck::get(
            "instructor courses",
            "/api/courses/instructor/my-courses",
            Expectation::not_server_error(),
        ),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub method: String,
    pub path: String,
    pub status: Option<u16>,
    pub passed: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SmokeReport {
    pub base_url: String,
    pub results: Vec<CheckResult>,
}

impl SmokeReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

impl Report for SmokeReport {
    fn render(&self) -> String {
        let mut out = format!("🚦 Smoke test em {}\n\n", self.base_url);
        for r in &self.results {
            let icon = if r.passed { "✅" } else { "❌" };
            let status = r
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "---".to_string());
            let _ = write!(out, "{} [{}] {} {} · {}", icon, status, r.method, r.path, r.name);
            if let Some(reason) = &r.reason {
                let _ = write!(out, "\n      {}", reason);
            }
            out.push('\n');
        }
        let failed = self.failures().count();
        let _ = write!(
            out,
            "\n{} de {} verificações passaram",
            self.results.len() - failed,
            self.results.len()
        );
        out
    }

    fn is_ok(&self) -> bool {
        self.passed()
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterOutcome {
    pub email: String,
    pub role: String,
    pub created: bool,
    pub response: Value,
}

impl Report for RegisterOutcome {
    fn render(&self) -> String {
        if self.created {
            format!("✅ Usuário {} registrado como {}", self.email, self.role)
        } else {
            format!("ℹ️  Usuário {} já existe (409)", self.email)
        }
    }
}

/// Registers through the public endpoint; an existing user is not an error.
pub async fn register_user(
    client: &PlatformClient,
    request: &RegisterRequest,
) -> Result<RegisterOutcome, OpsError> {
    validate::email(&request.email)?;
    validate::password(&request.password)?;

    let (created, response) = match client.register(request).await {
        Ok(body) => (true, body),
        Err(e) if is_conflict(&e) => (false, Value::Null),
        Err(e) => return Err(e),
    };
    Ok(RegisterOutcome {
        email: request.email.clone(),
        role: request.role.clone(),
        created,
        response,
    })
}

/// Evaluates a response against an expectation; `None` means it passed.
pub fn evaluate(expect: &Expectation, status: u16, body: &Value) -> Option<String> {
    if !expect.status.accepts(status) {
        let wanted = match expect.status {
            ExpectedStatus::Exact(code) => code.to_string(),
            ExpectedStatus::NotServerError => "< 500".to_string(),
        };
        return Some(format!("expected status {}, got {}", wanted, status));
    }
    let missing: Vec<&str> = expect
        .required_fields
        .iter()
        .filter(|f| check_shape(body, f).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Some(format!("missing field(s): {}", missing.join(", ")));
    }
    expect
        .required_values
        .iter()
        .find(|(path, wanted)| check_shape(body, path) != Some(wanted))
        .map(|(path, wanted)| {
            let got = check_shape(body, path)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "nothing".to_string());
            format!("expected {} = {}, got {}", path, wanted, got)
        })
}

/// Runs the checks one after another. Transport failures fail the check
/// instead of aborting the suite.
pub async fn run_suite(
    client: &PlatformClient,
    session: Option<&Session>,
    checks: &[SmokeCheck],
) -> SmokeReport {
    let mut results = Vec::with_capacity(checks.len());
    for check in checks {
        let auth = if check.authenticated { session } else { None };
        let outcome: Result<_, OpsError> = client
            .send(check.method.clone(), &check.path, check.body.as_ref(), auth)
            .await;

        let (status, reason) = match outcome {
            Ok(response) => (
                Some(response.status),
                evaluate(&check.expect, response.status, &response.body),
            ),
            Err(e) => (None, Some(e.to_string())),
        };
        match &reason {
            None => tracing::info!("PASS {} {}", check.method, check.path),
            Some(r) => tracing::warn!("FAIL {} {}: {}", check.method, check.path, r),
        }

        results.push(CheckResult {
            name: check.name.clone(),
            method: check.method.to_string(),
            path: check.path.clone(),
            status,
            passed: reason.is_none(),
            reason,
        });
    }

    SmokeReport {
        base_url: client.base_url().to_string(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_shape_paths() {
        let body = json!({
            "data": { "tokens": { "accessToken": "abc" } },
            "items": [{ "name": "Mensal" }]
        });
        assert_eq!(
            check_shape(&body, "data.tokens.accessToken"),
            Some(&json!("abc"))
        );
        assert_eq!(check_shape(&body, "items[0].name"), Some(&json!("Mensal")));
        assert!(check_shape(&body, "items[]").is_some());
        assert!(check_shape(&body, "items[1]").is_none());
        assert!(check_shape(&body, "data[]").is_none());
        assert!(check_shape(&body, "data.missing").is_none());
    }

    #[test]
    fn test_check_shape_on_root_array() {
        let body = json!([{ "name": "Anual" }]);
        assert!(check_shape(&body, "[]").is_some());
        assert_eq!(check_shape(&body, "[0].name"), Some(&json!("Anual")));
    }

    #[test]
    fn test_evaluate() {
        let expect = Expectation::status(200).with_fields(&["id", "role"]);
        assert!(evaluate(&expect, 200, &json!({"id": 1, "role": "student"})).is_none());
        assert!(evaluate(&expect, 200, &json!({"id": 1}))
            .unwrap()
            .contains("role"));
        assert!(evaluate(&expect, 500, &json!({}))
            .unwrap()
            .contains("expected status 200"));
        assert!(evaluate(&Expectation::not_server_error(), 403, &Value::Null).is_none());
        assert!(evaluate(&Expectation::not_server_error(), 502, &Value::Null).is_some());
    }

    #[test]
    fn test_evaluate_requires_error_code() {
        let expect = Expectation::api_not_found("PLAN_NOT_FOUND");
        let body = json!({ "error": { "code": "PLAN_NOT_FOUND", "message": "Plan not found" } });
        assert!(evaluate(&expect, 404, &body).is_none());
        // A bare 404 from a router with no such route must not pass.
        assert!(evaluate(&expect, 404, &Value::Null)
            .unwrap()
            .contains("error.code"));
        let other = json!({ "error": { "code": "STUDENT_NOT_FOUND" } });
        assert!(evaluate(&expect, 404, &other)
            .unwrap()
            .contains("STUDENT_NOT_FOUND"));
    }

    #[test]
    fn test_default_suite_has_anonymous_checks() {
        let suite = default_suite();
        assert!(suite.iter().any(|c| c.path == "/health" && !c.authenticated));
        assert!(suite
            .iter()
            .any(|c| c.path == "/api/auth/me" && c.expect.status == ExpectedStatus::Exact(401)));
    }

    #[test]
    fn test_report_passed() {
        let report = SmokeReport {
            base_url: "http://localhost:3000".into(),
            results: vec![CheckResult {
                name: "health".into(),
                method: "GET".into(),
                path: "/health".into(),
                status: Some(503),
                passed: false,
                reason: Some("expected status 200, got 503".into()),
            }],
        };
        assert!(!report.passed());
        assert!(report.render().contains("0 de 1"));
    }
}
