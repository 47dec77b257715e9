use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use std::fmt::Write;

use crate::errors::{OpsError, ResultExt};
use crate::fmt;
use crate::models::{InstructorRow, StudentRow, UserRow};
use crate::report::Report;

#[derive(Debug, Serialize)]
pub struct UserLookup {
    pub user: UserRow,
    pub student: Option<StudentRow>,
    pub instructor: Option<InstructorRow>,
}

impl UserLookup {
    /// Profile rows the user's role requires but that are missing.
    ///
    /// Users created before the registration flow wrote profile rows end up
    /// with `role = 'student'` and no `students` row, which breaks login.
    pub fn profile_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self.user.role.as_str() {
            "student" if self.student.is_none() => {
                problems.push("role is student but no students row exists".to_string())
            }
            "instructor" if self.instructor.is_none() => {
                problems.push("role is instructor but no instructors row exists".to_string())
            }
            _ => {}
        }
        problems
    }
}

impl Report for UserLookup {
    fn render(&self) -> String {
        let u = &self.user;
        let mut out = String::from("📋 Usuário encontrado:\n");
        let _ = writeln!(out, "   ID:     {}", u.id);
        let _ = writeln!(out, "   Nome:   {}", u.name);
        let _ = writeln!(out, "   Email:  {}", u.email);
        let _ = writeln!(out, "   Role:   {}", u.role);
        let _ = writeln!(out, "   Criado: {}", fmt::datetime(u.created_at));

        match &self.student {
            Some(s) => {
                let _ = writeln!(out, "\n🎓 Registro em students:");
                let _ = writeln!(
                    out,
                    "   Subscription status:     {}",
                    s.subscription_status.as_deref().unwrap_or("-")
                );
                let _ = writeln!(
                    out,
                    "   Subscription expires at: {}",
                    fmt::date(s.subscription_expires_at)
                );
                let _ = writeln!(
                    out,
                    "   Tempo de estudo:         {}",
                    s.total_study_time.unwrap_or(0)
                );
            }
            None => out.push_str("\n🎓 Sem registro em students\n"),
        }
        match &self.instructor {
            Some(_) => out.push_str("👩‍🏫 Registro em instructors presente\n"),
            None => out.push_str("👩‍🏫 Sem registro em instructors\n"),
        }

        for problem in self.profile_problems() {
            let _ = writeln!(out, "⚠️  {}", problem);
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.profile_problems().is_empty()
    }
}

pub async fn find_user<'e, E>(executor: E, email: &str) -> Result<UserRow, OpsError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as(
        r#"
        SELECT id, name, email, role::text AS role, created_at::timestamptz AS created_at
        FROM users
        WHERE lower(email) = lower($1)
        "#,
    )
    .bind(email.trim())
    .fetch_optional(executor)
    .await
    .with_context(|| format!("looking up user {}", email))?
    .ok_or_else(|| OpsError::NotFound(format!("user with email {}", email)))
}

pub async fn find_student<'e, E>(
    executor: E,
    user_id: uuid::Uuid,
) -> Result<Option<StudentRow>, OpsError>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as(
        r#"
        SELECT id,
               subscription_status::text AS subscription_status,
               subscription_expires_at::timestamptz AS subscription_expires_at,
               total_study_time::int8 AS total_study_time,
               gdpr_consent
        FROM students
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .context("loading student profile")
}

pub async fn lookup_user(pool: &PgPool, email: &str) -> Result<UserLookup, OpsError> {
    let user = find_user(pool, email).await?;
    let student = find_student(pool, user.id).await?;

    let instructor: Option<InstructorRow> = sqlx::query_as(
        "SELECT id, created_at::timestamptz AS created_at FROM instructors WHERE id = $1",
    )
    .bind(user.id)
    .fetch_optional(pool)
    .await
    .context("loading instructor profile")?;

    Ok(UserLookup {
        user,
        student,
        instructor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: "Aluno Teste".into(),
            email: "student.e2e@test.com".into(),
            role: role.into(),
            created_at: None,
        }
    }

    #[test]
    fn test_student_without_profile_is_flagged() {
        let lookup = UserLookup {
            user: user("student"),
            student: None,
            instructor: None,
        };
        assert_eq!(lookup.profile_problems().len(), 1);
        assert!(!lookup.is_ok());
        assert!(lookup.render().contains("Sem registro em students"));
    }

    #[test]
    fn test_admin_needs_no_profile() {
        let lookup = UserLookup {
            user: user("admin"),
            student: None,
            instructor: None,
        };
        assert!(lookup.is_ok());
    }

    #[test]
    fn test_student_with_profile_is_ok() {
        let u = user("student");
        let lookup = UserLookup {
            student: Some(StudentRow {
                id: u.id,
                subscription_status: Some("inactive".into()),
                subscription_expires_at: None,
                total_study_time: Some(0),
                gdpr_consent: Some(true),
            }),
            user: u,
            instructor: None,
        };
        assert!(lookup.is_ok());
        assert!(lookup.render().contains("inactive"));
    }
}
