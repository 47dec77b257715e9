//! Row types for the platform schema and the small enums derived from them.
//!
//! Queries cast columns explicitly (`::text`, `::float8`, `::timestamptz`) so these
//! structs decode the same regardless of which migration generation created the
//! column.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TableColumn {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CheckConstraint {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    /// `None` when the table does not exist in this database.
    pub rows: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentRow {
    pub id: Uuid,
    pub subscription_status: Option<String>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub total_study_time: Option<i64>,
    pub gdpr_consent: Option<bool>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InstructorRow {
    pub id: Uuid,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub status: Option<String>,
    pub instructor_email: Option<String>,
    pub has_image: bool,
    pub module_count: i64,
    pub lesson_count: i64,
    pub assessment_count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourseRow {
    pub id: Uuid,
    pub title: String,
    pub status: Option<String>,
    pub instructor_id: Option<Uuid>,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ModuleRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LessonRow {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AssessmentRow {
    pub id: Uuid,
    pub title: String,
    pub course_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
    pub passing_score: Option<f64>,
}

impl AssessmentRow {
    pub fn scope(&self) -> AssessmentScope {
        AssessmentScope::classify(self.course_id, self.module_id)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub text: String,
    pub options: Option<Value>,
    pub correct_answer: Option<i32>,
    pub points: Option<f64>,
}

impl QuestionRow {
    /// Number of answer options, when `options` is a JSON array.
    pub fn option_count(&self) -> Option<usize> {
        self.options.as_ref().and_then(|v| v.as_array()).map(|a| a.len())
    }

    /// Whether `correct_answer` points at an existing option.
    pub fn has_valid_answer(&self) -> bool {
        match (self.correct_answer, self.option_count()) {
            (Some(idx), Some(count)) => idx >= 0 && (idx as usize) < count,
            // Free-text questions carry no options.
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub price: BigDecimal,
    pub currency: String,
    pub interval: String,
    pub is_active: bool,
    pub duration_days: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub gateway_subscription_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SubscriptionRow {
    /// Active status with a period end still in the future.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        SubscriptionStatus::parse(&self.status) == SubscriptionStatus::Active
            && self.current_period_end.is_some_and(|end| end > now)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PixPaymentRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub amount: BigDecimal,
    pub discount: Option<BigDecimal>,
    pub final_amount: BigDecimal,
    pub created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub gateway_charge_id: Option<String>,
    pub student_name: String,
    pub student_email: String,
    pub plan_name: String,
}

impl PixPaymentRow {
    pub fn pix_status(&self) -> PixStatus {
        PixStatus::parse(&self.status)
    }

    /// Charges created by the development gateway mock.
    pub fn is_mock(&self) -> bool {
        self.gateway_charge_id
            .as_deref()
            .is_some_and(|id| id.starts_with("pi_mock_"))
    }

    /// Still pending although its QR code already expired.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.pix_status() == PixStatus::Pending && self.expires_at.is_some_and(|exp| exp < now)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount: BigDecimal,
    pub status: String,
    pub payment_method: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProgressRow {
    pub course_id: Uuid,
    pub course_title: String,
    pub completed_lessons: i64,
    pub total_lessons: i64,
    pub progress_percentage: Option<f64>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DuplicateResourceGroup {
    pub lesson_id: Uuid,
    pub title: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub resource_type: String,
    pub count: i64,
}

/// Where an assessment hangs in the content tree.
///
/// The current schema requires exactly one of `course_id` / `module_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentScope {
    Course,
    Module,
    Both,
    Neither,
}

impl AssessmentScope {
    pub fn classify(course_id: Option<Uuid>, module_id: Option<Uuid>) -> Self {
        match (course_id, module_id) {
            (Some(_), None) => AssessmentScope::Course,
            (None, Some(_)) => AssessmentScope::Module,
            (Some(_), Some(_)) => AssessmentScope::Both,
            (None, None) => AssessmentScope::Neither,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, AssessmentScope::Course | AssessmentScope::Module)
    }
}

impl fmt::Display for AssessmentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssessmentScope::Course => "course",
            AssessmentScope::Module => "module",
            AssessmentScope::Both => "both course and module",
            AssessmentScope::Neither => "neither course nor module",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
    Other(String),
}

impl PixStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => PixStatus::Pending,
            "paid" => PixStatus::Paid,
            "expired" => PixStatus::Expired,
            "cancelled" | "canceled" => PixStatus::Cancelled,
            _ => PixStatus::Other(raw.to_string()),
        }
    }
}

impl fmt::Display for PixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixStatus::Pending => f.write_str("pending"),
            PixStatus::Paid => f.write_str("paid"),
            PixStatus::Expired => f.write_str("expired"),
            PixStatus::Cancelled => f.write_str("cancelled"),
            PixStatus::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    Expired,
    Cancelled,
    Pending,
    Other(String),
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "inactive" => SubscriptionStatus::Inactive,
            "expired" => SubscriptionStatus::Expired,
            "cancelled" | "canceled" => SubscriptionStatus::Cancelled,
            "pending" => SubscriptionStatus::Pending,
            _ => SubscriptionStatus::Other(raw.to_string()),
        }
    }
}
