//! Read-only diagnostics. Every function here issues SELECTs only.

pub mod assessments;
pub mod billing;
pub mod courses;
pub mod progress;
pub mod schema;
pub mod users;

pub use assessments::{assessment_integrity, assessment_questions, IntegrityReport, QuestionsReport};
pub use billing::{pix_payments, plans, user_subscriptions, PixReport, PlansReport, SubscriptionsReport};
pub use courses::{course_overview, course_tree, CourseOverview, CourseTree};
pub use progress::{student_progress, ProgressReport};
pub use schema::{describe_table, list_tables, table_counts, TableCounts, TableDescription, TableList};
pub use users::{lookup_user, UserLookup};
