use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::fmt::Write;
use uuid::Uuid;

use crate::errors::{OpsError, ResultExt};
use crate::models::{AssessmentRow, AssessmentScope, QuestionRow};
use crate::report::Report;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScopeViolation {
    pub id: Uuid,
    pub title: String,
    pub course_id: Option<Uuid>,
    pub module_id: Option<Uuid>,
}

impl ScopeViolation {
    pub fn scope(&self) -> AssessmentScope {
        AssessmentScope::classify(self.course_id, self.module_id)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrphanAssessment {
    pub id: Uuid,
    pub title: String,
    /// The id that points nowhere.
    pub missing_id: Uuid,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourseMismatch {
    pub assessment_id: Uuid,
    pub assessment_title: String,
    pub assessment_course_title: Option<String>,
    pub module_title: String,
    pub module_course_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CrowdedModule {
    pub module_id: Uuid,
    pub module_title: String,
    pub course_title: String,
    pub assessment_count: i64,
    pub assessment_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct AssessmentStats {
    pub total_assessments: i64,
    pub by_course: i64,
    pub by_module: i64,
    pub total_modules: i64,
    pub modules_with_assessment: i64,
    pub total_courses: i64,
}

impl AssessmentStats {
    pub fn modules_without_assessment(&self) -> i64 {
        (self.total_modules - self.modules_with_assessment).max(0)
    }
}

#[derive(Debug, Serialize)]
pub struct IntegrityReport {
    pub scope_violations: Vec<ScopeViolation>,
    pub missing_module: Vec<OrphanAssessment>,
    pub missing_course: Vec<OrphanAssessment>,
    pub course_mismatch: Vec<CourseMismatch>,
    pub crowded_modules: Vec<CrowdedModule>,
    pub stats: AssessmentStats,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.scope_violations.is_empty()
            && self.missing_module.is_empty()
            && self.missing_course.is_empty()
            && self.course_mismatch.is_empty()
            && self.crowded_modules.is_empty()
    }
}

fn section<T>(out: &mut String, heading: &str, ok: &str, rows: &[T], line: impl Fn(&T) -> String) {
    let _ = writeln!(out, "\n{}", heading);
    if rows.is_empty() {
        let _ = writeln!(out, "✅ {}", ok);
        return;
    }
    let _ = writeln!(out, "❌ {} ocorrência(s):", rows.len());
    for (i, row) in rows.iter().enumerate() {
        let _ = writeln!(out, "   {}. {}", i + 1, line(row));
    }
}

impl Report for IntegrityReport {
    fn render(&self) -> String {
        let mut out = String::from("🔍 Integridade de avaliações\n");
        out.push_str(&"=".repeat(70));
        out.push('\n');

        section(
            &mut out,
            "1️⃣ Exatamente um de course_id / module_id",
            "Todas as avaliações respeitam a regra",
            &self.scope_violations,
            |v| format!("{} ({}) - {}", v.title, v.id, v.scope()),
        );
        section(
            &mut out,
            "2️⃣ Avaliações com módulo inexistente",
            "Nenhuma avaliação órfã (módulo)",
            &self.missing_module,
            |o| format!("{} ({}) - módulo {}", o.title, o.id, o.missing_id),
        );
        section(
            &mut out,
            "3️⃣ Avaliações com curso inexistente",
            "Nenhuma avaliação órfã (curso)",
            &self.missing_course,
            |o| format!("{} ({}) - curso {}", o.title, o.id, o.missing_id),
        );
        section(
            &mut out,
            "4️⃣ Consistência módulo → curso",
            "Todas as avaliações estão consistentes",
            &self.course_mismatch,
            |m| {
                format!(
                    "{}: curso da avaliação '{}' ≠ curso do módulo '{}' ({})",
                    m.assessment_title,
                    m.assessment_course_title.as_deref().unwrap_or("?"),
                    m.module_course_title.as_deref().unwrap_or("?"),
                    m.module_title
                )
            },
        );
        section(
            &mut out,
            "5️⃣ Módulos com múltiplas avaliações",
            "Cada módulo tem no máximo 1 avaliação",
            &self.crowded_modules,
            |c| {
                format!(
                    "{} ({}) em '{}': {} avaliações [{}]",
                    c.module_title,
                    c.module_id,
                    c.course_title,
                    c.assessment_count,
                    c.assessment_titles.join(", ")
                )
            },
        );

        let s = &self.stats;
        out.push_str("\n📊 Estatísticas:\n");
        let _ = writeln!(out, "   Total de avaliações:   {}", s.total_assessments);
        let _ = writeln!(out, "   Por curso (legado):    {}", s.by_course);
        let _ = writeln!(out, "   Por módulo:            {}", s.by_module);
        let _ = writeln!(out, "   Total de módulos:      {}", s.total_modules);
        let _ = writeln!(out, "   Módulos com avaliação: {}", s.modules_with_assessment);
        let _ = writeln!(out, "   Módulos sem avaliação: {}", s.modules_without_assessment());
        let _ = writeln!(out, "   Total de cursos:       {}", s.total_courses);

        out.push('\n');
        out.push_str(&"=".repeat(70));
        if self.is_healthy() {
            out.push_str("\n✅ INTEGRIDADE OK");
        } else {
            out.push_str("\n❌ PROBLEMAS ENCONTRADOS (veja: ead-ops patch cleanup-assessments)");
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.is_healthy()
    }
}

pub async fn assessment_integrity(pool: &PgPool) -> Result<IntegrityReport, OpsError> {
    let scope_violations: Vec<ScopeViolation> = sqlx::query_as(
        r#"
        SELECT id, title, course_id, module_id
        FROM assessments
        WHERE NOT ((course_id IS NOT NULL AND module_id IS NULL)
                OR (course_id IS NULL AND module_id IS NOT NULL))
        ORDER BY title
        "#,
    )
    .fetch_all(pool)
    .await
    .context("checking assessment scope")?;

    let missing_module: Vec<OrphanAssessment> = sqlx::query_as(
        r#"
        SELECT a.id, a.title, a.module_id AS missing_id
        FROM assessments a
        LEFT JOIN modules m ON a.module_id = m.id
        WHERE a.module_id IS NOT NULL AND m.id IS NULL
        "#,
    )
    .fetch_all(pool)
    .await
    .context("checking orphan assessments (module)")?;

    let missing_course: Vec<OrphanAssessment> = sqlx::query_as(
        r#"
        SELECT a.id, a.title, a.course_id AS missing_id
        FROM assessments a
        LEFT JOIN courses c ON a.course_id = c.id
        WHERE a.course_id IS NOT NULL AND c.id IS NULL
        "#,
    )
    .fetch_all(pool)
    .await
    .context("checking orphan assessments (course)")?;

    let course_mismatch: Vec<CourseMismatch> = sqlx::query_as(
        r#"
        SELECT a.id AS assessment_id,
               a.title AS assessment_title,
               c1.title AS assessment_course_title,
               m.title AS module_title,
               c2.title AS module_course_title
        FROM assessments a
        JOIN modules m ON a.module_id = m.id
        LEFT JOIN courses c1 ON a.course_id = c1.id
        LEFT JOIN courses c2 ON m.course_id = c2.id
        WHERE a.course_id IS NOT NULL AND a.course_id <> m.course_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("checking module/course consistency")?;

    let crowded_modules: Vec<CrowdedModule> = sqlx::query_as(
        r#"
        SELECT m.id AS module_id,
               m.title AS module_title,
               c.title AS course_title,
               COUNT(a.id) AS assessment_count,
               array_agg(a.title::text ORDER BY a.title) AS assessment_titles
        FROM modules m
        JOIN courses c ON m.course_id = c.id
        JOIN assessments a ON m.id = a.module_id
        GROUP BY m.id, m.title, c.title
        HAVING COUNT(a.id) > 1
        "#,
    )
    .fetch_all(pool)
    .await
    .context("checking modules with several assessments")?;

    let stats: AssessmentStats = sqlx::query_as(
        r#"
        SELECT COUNT(*) AS total_assessments,
               COUNT(*) FILTER (WHERE course_id IS NOT NULL AND module_id IS NULL) AS by_course,
               COUNT(*) FILTER (WHERE course_id IS NULL AND module_id IS NOT NULL) AS by_module,
               (SELECT COUNT(*) FROM modules) AS total_modules,
               (SELECT COUNT(DISTINCT module_id) FROM assessments WHERE module_id IS NOT NULL)
                   AS modules_with_assessment,
               (SELECT COUNT(*) FROM courses) AS total_courses
        FROM assessments
        "#,
    )
    .fetch_one(pool)
    .await
    .context("computing assessment statistics")?;

    Ok(IntegrityReport {
        scope_violations,
        missing_module,
        missing_course,
        course_mismatch,
        crowded_modules,
        stats,
    })
}

#[derive(Debug, Serialize)]
pub struct QuestionsReport {
    pub assessment: AssessmentRow,
    pub questions: Vec<QuestionRow>,
}

impl QuestionsReport {
    pub fn passing_score_in_range(&self) -> bool {
        self.assessment
            .passing_score
            .is_some_and(|s| (0.0..=100.0).contains(&s))
    }

    pub fn invalid_answers(&self) -> Vec<&QuestionRow> {
        self.questions.iter().filter(|q| !q.has_valid_answer()).collect()
    }

    pub fn total_points(&self) -> f64 {
        self.questions.iter().filter_map(|q| q.points).sum()
    }
}

impl Report for QuestionsReport {
    fn render(&self) -> String {
        let a = &self.assessment;
        let mut out = format!("📝 {} ({})\n", a.title, a.id);
        let _ = writeln!(out, "   Vinculada a: {}", a.scope());
        let _ = writeln!(
            out,
            "   Nota mínima: {} {}",
            a.passing_score.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            if self.passing_score_in_range() { "✅" } else { "❌ fora de 0..100" }
        );
        let _ = writeln!(out, "   Total de pontos: {}", self.total_points());

        for (i, q) in self.questions.iter().enumerate() {
            let _ = writeln!(out, "\n   {}. {}", i + 1, q.text);
            if let Some(options) = q.options.as_ref().and_then(|o| o.as_array()) {
                for (idx, opt) in options.iter().enumerate() {
                    let marker = if q.correct_answer == Some(idx as i32) { "→" } else { " " };
                    let label = opt.as_str().map(str::to_string).unwrap_or_else(|| opt.to_string());
                    let _ = writeln!(out, "      {} {}: {}", marker, idx, label);
                }
            }
            if !q.has_valid_answer() {
                let _ = writeln!(
                    out,
                    "      ❌ correct_answer inválido: {:?}",
                    q.correct_answer
                );
            }
        }
        out
    }

    fn is_ok(&self) -> bool {
        self.passing_score_in_range() && self.invalid_answers().is_empty()
    }
}

pub async fn assessment_questions(
    pool: &PgPool,
    assessment_id: Uuid,
) -> Result<QuestionsReport, OpsError> {
    let assessment: AssessmentRow = sqlx::query_as(
        r#"
        SELECT id, title, course_id, module_id, passing_score::float8 AS passing_score
        FROM assessments
        WHERE id = $1
        "#,
    )
    .bind(assessment_id)
    .fetch_optional(pool)
    .await
    .context("loading assessment")?
    .ok_or_else(|| OpsError::NotFound(format!("assessment {}", assessment_id)))?;

    let questions: Vec<QuestionRow> = sqlx::query_as(
        r#"
        SELECT id, assessment_id, text,
               to_jsonb(options) AS options,
               correct_answer::int4 AS correct_answer,
               points::float8 AS points
        FROM questions
        WHERE assessment_id = $1
        ORDER BY order_index, created_at
        "#,
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await
    .context("loading questions")?;

    Ok(QuestionsReport {
        assessment,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty_report() -> IntegrityReport {
        IntegrityReport {
            scope_violations: vec![],
            missing_module: vec![],
            missing_course: vec![],
            course_mismatch: vec![],
            crowded_modules: vec![],
            stats: AssessmentStats {
                total_assessments: 4,
                by_course: 1,
                by_module: 3,
                total_modules: 5,
                modules_with_assessment: 3,
                total_courses: 2,
            },
        }
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = empty_report();
        assert!(report.is_healthy());
        assert_eq!(report.stats.modules_without_assessment(), 2);
        assert!(report.render().contains("INTEGRIDADE OK"));
    }

    #[test]
    fn test_violation_makes_report_unhealthy() {
        let mut report = empty_report();
        report.scope_violations.push(ScopeViolation {
            id: Uuid::new_v4(),
            title: "Quiz duplicado".into(),
            course_id: Some(Uuid::new_v4()),
            module_id: Some(Uuid::new_v4()),
        });
        assert!(!report.is_healthy());
        let text = report.render();
        assert!(text.contains("both course and module"));
        assert!(text.contains("PROBLEMAS ENCONTRADOS"));
    }

    #[test]
    fn test_questions_report_flags() {
        let assessment_id = Uuid::new_v4();
        let report = QuestionsReport {
            assessment: AssessmentRow {
                id: assessment_id,
                title: "Quiz".into(),
                course_id: None,
                module_id: Some(Uuid::new_v4()),
                passing_score: Some(7000.0),
            },
            questions: vec![
                QuestionRow {
                    id: Uuid::new_v4(),
                    assessment_id,
                    text: "Teste de criação".into(),
                    options: Some(json!(["sim", "não"])),
                    correct_answer: None,
                    points: Some(5.0),
                },
                QuestionRow {
                    id: Uuid::new_v4(),
                    assessment_id,
                    text: "Rust tem GC?".into(),
                    options: Some(json!(["sim", "não"])),
                    correct_answer: Some(1),
                    points: Some(5.0),
                },
            ],
        };
        assert!(!report.passing_score_in_range());
        assert_eq!(report.invalid_answers().len(), 1);
        assert_eq!(report.total_points(), 10.0);
        assert!(!report.is_ok());
        assert!(report.render().contains("→ 1: não"));
    }
}
