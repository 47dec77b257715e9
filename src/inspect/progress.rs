use serde::Serialize;
use sqlx::PgPool;
use std::fmt::Write;

use crate::errors::{OpsError, ResultExt};
use crate::fmt;
use crate::inspect::users::find_user;
use crate::models::{ProgressRow, UserRow};
use crate::report::Report;

#[derive(Debug, Serialize)]
pub struct ProgressReport {
    pub user: UserRow,
    pub courses: Vec<ProgressRow>,
}

/// Completion percentage recomputed from lesson counts, rounded to one decimal.
pub fn computed_percentage(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = (completed.min(total) as f64 / total as f64) * 100.0;
    (pct * 10.0).round() / 10.0
}

impl ProgressReport {
    /// Rows whose stored percentage drifted from the lesson counts by more than one point.
    pub fn drifted(&self) -> Vec<&ProgressRow> {
        self.courses
            .iter()
            .filter(|row| {
                let expected = computed_percentage(row.completed_lessons, row.total_lessons);
                (row.progress_percentage.unwrap_or(0.0) - expected).abs() > 1.0
            })
            .collect()
    }
}

impl Report for ProgressReport {
    fn render(&self) -> String {
        let mut out = format!("📈 Progresso de {} <{}>\n", self.user.name, self.user.email);
        if self.courses.is_empty() {
            out.push_str(
                "\n⚠️  Nenhum registro de progresso. Os cursos só aparecem em \"Meus Cursos\" \
                 depois do primeiro acesso ou da primeira aula concluída.\n",
            );
            return out;
        }
        for row in &self.courses {
            let _ = writeln!(out, "\n  - {} ({})", row.course_title, row.course_id);
            let _ = writeln!(
                out,
                "    Aulas: {}/{} | Salvo: {:.1}% | Calculado: {:.1}%",
                row.completed_lessons,
                row.total_lessons,
                row.progress_percentage.unwrap_or(0.0),
                computed_percentage(row.completed_lessons, row.total_lessons)
            );
            let _ = writeln!(out, "    Último acesso: {}", fmt::datetime(row.last_accessed_at));
        }
        let drifted = self.drifted();
        if !drifted.is_empty() {
            let _ = write!(
                out,
                "\n⚠️  {} curso(s) com porcentagem divergente",
                drifted.len()
            );
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.drifted().is_empty()
    }
}

pub async fn student_progress(pool: &PgPool, email: &str) -> Result<ProgressReport, OpsError> {
    let user = find_user(pool, email).await?;

    // completed_lessons is an array column; to_jsonb normalizes uuid[] and jsonb alike.
    let courses: Vec<ProgressRow> = sqlx::query_as(
        r#"
        SELECT sp.course_id,
               c.title AS course_title,
               COALESCE(jsonb_array_length(to_jsonb(sp.completed_lessons)), 0)::int8
                   AS completed_lessons,
               (SELECT COUNT(*) FROM lessons l JOIN modules m ON l.module_id = m.id
                 WHERE m.course_id = sp.course_id) AS total_lessons,
               sp.progress_percentage::float8 AS progress_percentage,
               sp.last_accessed_at::timestamptz AS last_accessed_at
        FROM student_progress sp
        JOIN courses c ON sp.course_id = c.id
        WHERE sp.student_id = $1
        ORDER BY sp.last_accessed_at DESC NULLS LAST
        "#,
    )
    .bind(user.id)
    .fetch_all(pool)
    .await
    .context("loading student progress")?;

    Ok(ProgressReport { user, courses })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_computed_percentage() {
        assert_eq!(computed_percentage(0, 0), 0.0);
        assert_eq!(computed_percentage(1, 3), 33.3);
        assert_eq!(computed_percentage(3, 3), 100.0);
        // A lesson removed after completion must not push past 100%.
        assert_eq!(computed_percentage(5, 4), 100.0);
    }

    #[test]
    fn test_drift_detection() {
        let row = |completed, total, stored| ProgressRow {
            course_id: Uuid::new_v4(),
            course_title: "Curso".into(),
            completed_lessons: completed,
            total_lessons: total,
            progress_percentage: Some(stored),
            last_accessed_at: None,
        };
        let report = ProgressReport {
            user: UserRow {
                id: Uuid::new_v4(),
                name: "Aluno".into(),
                email: "aluno@test.com".into(),
                role: "student".into(),
                created_at: None,
            },
            courses: vec![row(2, 4, 50.0), row(1, 4, 0.0)],
        };
        assert_eq!(report.drifted().len(), 1);
        assert!(!report.is_ok());
    }
}
