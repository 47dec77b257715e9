use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt::Write;
use uuid::Uuid;

use crate::errors::{OpsError, ResultExt};
use crate::models::{AssessmentRow, CourseRow, CourseSummary, LessonRow, ModuleRow};
use crate::report::Report;

#[derive(Debug, Serialize)]
pub struct CourseOverview {
    pub status_filter: Option<String>,
    pub courses: Vec<CourseSummary>,
}

impl Report for CourseOverview {
    fn render(&self) -> String {
        let mut out = match &self.status_filter {
            Some(status) => format!("📚 Cursos com status '{}':\n\n", status),
            None => String::from("📚 Cursos:\n\n"),
        };
        if self.courses.is_empty() {
            out.push_str("  Nenhum curso encontrado\n");
            return out;
        }
        for c in &self.courses {
            let _ = writeln!(out, "  - {} ({})", c.title, c.id);
            let _ = writeln!(
                out,
                "    Status: {} | Instrutor: {} | Imagem: {}",
                c.status.as_deref().unwrap_or("-"),
                c.instructor_email.as_deref().unwrap_or("-"),
                if c.has_image { "✅" } else { "❌" }
            );
            let _ = writeln!(
                out,
                "    Módulos: {} | Aulas: {} | Avaliações: {}",
                c.module_count, c.lesson_count, c.assessment_count
            );
        }
        let _ = write!(out, "\nTotal: {} curso(s)", self.courses.len());
        out
    }
}

pub async fn course_overview(
    pool: &PgPool,
    status_filter: Option<&str>,
) -> Result<CourseOverview, OpsError> {
    let courses: Vec<CourseSummary> = sqlx::query_as(
        r#"
        SELECT c.id,
               c.title,
               c.status::text AS status,
               u.email AS instructor_email,
               (c.cover_image IS NOT NULL AND c.cover_image <> '') AS has_image,
               (SELECT COUNT(*) FROM modules m WHERE m.course_id = c.id) AS module_count,
               (SELECT COUNT(*) FROM lessons l JOIN modules m ON l.module_id = m.id
                 WHERE m.course_id = c.id) AS lesson_count,
               (SELECT COUNT(*) FROM assessments a
                 LEFT JOIN modules m ON a.module_id = m.id
                 WHERE a.course_id = c.id OR m.course_id = c.id) AS assessment_count
        FROM courses c
        LEFT JOIN users u ON c.instructor_id = u.id
        WHERE $1::text IS NULL OR c.status::text = $1
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(status_filter)
    .fetch_all(pool)
    .await
    .context("loading course overview")?;

    Ok(CourseOverview {
        status_filter: status_filter.map(str::to_string),
        courses,
    })
}

#[derive(Debug, Serialize)]
pub struct ModuleNode {
    pub module: ModuleRow,
    pub lessons: Vec<LessonRow>,
    pub assessments: Vec<AssessmentRow>,
}

#[derive(Debug, Serialize)]
pub struct CourseTree {
    pub course: CourseRow,
    pub modules: Vec<ModuleNode>,
    /// Assessments attached to the course itself (legacy layout).
    pub course_assessments: Vec<AssessmentRow>,
}

impl Report for CourseTree {
    fn render(&self) -> String {
        let mut out = format!("📘 {} ({})\n", self.course.title, self.course.id);
        let _ = writeln!(
            out,
            "   Status: {} | Imagem: {}",
            self.course.status.as_deref().unwrap_or("-"),
            self.course.cover_image.as_deref().unwrap_or("-")
        );
        for node in &self.modules {
            let _ = writeln!(
                out,
                "\n   📦 [{}] {} ({})",
                node.module.order_index.unwrap_or(0),
                node.module.title,
                node.module.id
            );
            if node.lessons.is_empty() {
                out.push_str("      (sem aulas)\n");
            }
            for lesson in &node.lessons {
                let _ = writeln!(
                    out,
                    "      📄 [{}] {}",
                    lesson.order_index.unwrap_or(0),
                    lesson.title
                );
            }
            for a in &node.assessments {
                let _ = writeln!(
                    out,
                    "      📝 {} (nota mínima: {})",
                    a.title,
                    a.passing_score.map(|s| s.to_string()).unwrap_or_else(|| "-".into())
                );
            }
        }
        if !self.course_assessments.is_empty() {
            out.push_str("\n   Avaliações do curso:\n");
            for a in &self.course_assessments {
                let _ = writeln!(out, "      📝 {} ({})", a.title, a.id);
            }
        }
        out
    }
}

/// Groups flat lesson and assessment rows under their modules, keeping module order.
pub fn assemble_tree(
    course: CourseRow,
    modules: Vec<ModuleRow>,
    lessons: Vec<LessonRow>,
    assessments: Vec<AssessmentRow>,
) -> CourseTree {
    let mut lessons_by_module: HashMap<Uuid, Vec<LessonRow>> = HashMap::new();
    for lesson in lessons {
        lessons_by_module.entry(lesson.module_id).or_default().push(lesson);
    }

    let mut assessments_by_module: HashMap<Uuid, Vec<AssessmentRow>> = HashMap::new();
    let mut course_assessments = Vec::new();
    for a in assessments {
        match a.module_id {
            Some(module_id) => assessments_by_module.entry(module_id).or_default().push(a),
            None => course_assessments.push(a),
        }
    }

    let modules = modules
        .into_iter()
        .map(|module| ModuleNode {
            lessons: lessons_by_module.remove(&module.id).unwrap_or_default(),
            assessments: assessments_by_module.remove(&module.id).unwrap_or_default(),
            module,
        })
        .collect();

    CourseTree {
        course,
        modules,
        course_assessments,
    }
}

pub async fn course_tree(pool: &PgPool, course_id: Uuid) -> Result<CourseTree, OpsError> {
    let course: CourseRow = sqlx::query_as(
        "SELECT id, title, status::text AS status, instructor_id, cover_image FROM courses WHERE id = $1",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await
    .context("loading course")?
    .ok_or_else(|| OpsError::NotFound(format!("course {}", course_id)))?;

    let modules: Vec<ModuleRow> = sqlx::query_as(
        r#"
        SELECT id, course_id, title, order_index::int4 AS order_index
        FROM modules
        WHERE course_id = $1
        ORDER BY order_index, created_at
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("loading modules")?;

    let lessons: Vec<LessonRow> = sqlx::query_as(
        r#"
        SELECT l.id, l.module_id, l.title, l.order_index::int4 AS order_index
        FROM lessons l
        JOIN modules m ON l.module_id = m.id
        WHERE m.course_id = $1
        ORDER BY l.order_index, l.created_at
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("loading lessons")?;

    let assessments: Vec<AssessmentRow> = sqlx::query_as(
        r#"
        SELECT a.id, a.title, a.course_id, a.module_id, a.passing_score::float8 AS passing_score
        FROM assessments a
        LEFT JOIN modules m ON a.module_id = m.id
        WHERE a.course_id = $1 OR m.course_id = $1
        ORDER BY a.created_at
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("loading assessments")?;

    Ok(assemble_tree(course, modules, lessons, assessments))
}
