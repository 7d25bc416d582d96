use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    Assignment, AttendanceMark, AttendanceSession, Course, Student, Submission,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_course(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO course_analytics.courses (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_student(pool: &PgPool, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO course_analytics.students (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn ensure_enrollment(pool: &PgPool, course_id: Uuid, student_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_analytics.enrollments (course_id, student_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_assignment(pool: &PgPool, course_id: Uuid, title: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO course_analytics.assignments (id, course_id, title)
        VALUES ($1, $2, $3)
        ON CONFLICT (course_id, title) DO UPDATE SET title = EXCLUDED.title
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course_id)
    .bind(title)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn upsert_session(pool: &PgPool, course_id: Uuid, held_at: NaiveDate) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO course_analytics.attendance_sessions (id, course_id, held_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (course_id, held_at) DO UPDATE SET held_at = EXCLUDED.held_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course_id)
    .bind(held_at)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_submission(
    pool: &PgPool,
    assignment_id: Uuid,
    student_id: Uuid,
    submitted_at: DateTime<Utc>,
    total_score: f64,
    source_key: &str,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO course_analytics.submissions
        (assignment_id, student_id, submitted_at, total_score, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(assignment_id)
    .bind(student_id)
    .bind(submitted_at)
    .bind(total_score)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let course_id = upsert_course(pool, "Biology 101").await?;

    let students = vec![
        ("Avery Lee", "avery.lee@example.edu"),
        ("Jules Moreno", "jules.moreno@example.edu"),
        ("Kiara Patel", "kiara.patel@example.edu"),
    ];

    let mut student_ids = Vec::new();
    for (full_name, email) in students {
        let student_id = upsert_student(pool, full_name, email).await?;
        ensure_enrollment(pool, course_id, student_id).await?;
        student_ids.push(student_id);
    }

    let now = Utc::now();
    let assignments = vec![
        (
            "Cell Structure Lab",
            vec![("seed-001", 0usize, 3i64, 88.0), ("seed-002", 1, 2, 64.0)],
        ),
        (
            "Genetics Problem Set",
            vec![("seed-003", 0, 10, 92.0), ("seed-004", 2, 12, 47.0)],
        ),
    ];

    for (title, submissions) in assignments {
        let assignment_id = upsert_assignment(pool, course_id, title).await?;
        for (source_key, student_idx, days_ago, score) in submissions {
            insert_submission(
                pool,
                assignment_id,
                student_ids[student_idx],
                now - Duration::days(days_ago),
                score,
                source_key,
            )
            .await?;
        }
    }

    let sessions = vec![
        (14i64, vec!["present", "present", "absent"]),
        (7, vec!["present", "absent", "excused"]),
        (0, vec!["present", "present", "present"]),
    ];

    for (days_ago, statuses) in sessions {
        let held_at = (now - Duration::days(days_ago)).date_naive();
        let session_id = upsert_session(pool, course_id, held_at).await?;
        for (student_id, status) in student_ids.iter().zip(statuses) {
            sqlx::query(
                r#"
                INSERT INTO course_analytics.attendance_marks
                (session_id, student_id, status)
                VALUES ($1, $2, $3)
                ON CONFLICT (session_id, student_id) DO NOTHING
                "#,
            )
            .bind(session_id)
            .bind(student_id)
            .bind(status)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

pub async fn import_submissions_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        course: String,
        assignment: String,
        student_name: String,
        student_email: String,
        submitted_at: DateTime<Utc>,
        total_score: f64,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let course_id = upsert_course(pool, &row.course).await?;
        let student_id = upsert_student(pool, &row.student_name, &row.student_email).await?;
        ensure_enrollment(pool, course_id, student_id).await?;
        let assignment_id = upsert_assignment(pool, course_id, &row.assignment).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let affected = insert_submission(
            pool,
            assignment_id,
            student_id,
            row.submitted_at,
            row.total_score,
            &source_key,
        )
        .await?;
        if affected > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_attendance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        course: String,
        held_at: NaiveDate,
        student_name: String,
        student_email: String,
        status: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let course_id = upsert_course(pool, &row.course).await?;
        let student_id = upsert_student(pool, &row.student_name, &row.student_email).await?;
        ensure_enrollment(pool, course_id, student_id).await?;
        let session_id = upsert_session(pool, course_id, row.held_at).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO course_analytics.attendance_marks
            (session_id, student_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, student_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(&row.status)
        .execute(pool)
        .await?;
        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn list_courses(pool: &PgPool) -> anyhow::Result<Vec<(Uuid, String)>> {
    let rows = sqlx::query("SELECT id, name FROM course_analytics.courses ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("name")))
        .collect())
}

/// Loads a fully populated course snapshot by name. Submissions and
/// attendance marks come back in insertion order (serial id), which the
/// analytics engine relies on for last-submission-wins behavior.
pub async fn fetch_course(pool: &PgPool, name: &str) -> anyhow::Result<Course> {
    let course_row = sqlx::query("SELECT id, name FROM course_analytics.courses WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no course named {name:?}"))?;

    let course_id: Uuid = course_row.get("id");
    fetch_course_by_id(pool, course_id, course_row.get("name")).await
}

pub async fn fetch_course_by_id(
    pool: &PgPool,
    course_id: Uuid,
    name: String,
) -> anyhow::Result<Course> {
    let roster_rows = sqlx::query(
        r#"
        SELECT st.id, st.full_name, st.email
        FROM course_analytics.enrollments e
        JOIN course_analytics.students st ON st.id = e.student_id
        WHERE e.course_id = $1
        ORDER BY st.full_name
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let roster = roster_rows
        .into_iter()
        .map(|row| Student {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
        })
        .collect();

    let assignment_rows = sqlx::query(
        r#"
        SELECT id, title FROM course_analytics.assignments
        WHERE course_id = $1
        ORDER BY title
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let mut assignments: Vec<Assignment> = assignment_rows
        .into_iter()
        .map(|row| Assignment {
            id: row.get("id"),
            title: row.get("title"),
            submissions: Vec::new(),
        })
        .collect();

    let submission_rows = sqlx::query(
        r#"
        SELECT s.assignment_id, s.student_id, s.submitted_at, s.total_score
        FROM course_analytics.submissions s
        JOIN course_analytics.assignments a ON a.id = s.assignment_id
        WHERE a.course_id = $1
        ORDER BY s.id
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    for row in submission_rows {
        let assignment_id: Uuid = row.get("assignment_id");
        if let Some(assignment) = assignments.iter_mut().find(|a| a.id == assignment_id) {
            assignment.submissions.push(Submission {
                student_id: row.get("student_id"),
                submitted_at: row.get("submitted_at"),
                total_score: row.get("total_score"),
            });
        }
    }

    let session_rows = sqlx::query(
        r#"
        SELECT id, held_at FROM course_analytics.attendance_sessions
        WHERE course_id = $1
        ORDER BY held_at
        "#,
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let mut sessions = Vec::new();
    for row in session_rows {
        let session_id: Uuid = row.get("id");
        let mark_rows = sqlx::query(
            r#"
            SELECT student_id, status FROM course_analytics.attendance_marks
            WHERE session_id = $1
            ORDER BY id
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        sessions.push(AttendanceSession {
            held_at: row.get("held_at"),
            marks: mark_rows
                .into_iter()
                .map(|mark| AttendanceMark {
                    student_id: mark.get("student_id"),
                    status: mark.get("status"),
                })
                .collect(),
        });
    }

    Ok(Course {
        id: course_id,
        name,
        roster,
        assignments,
        sessions,
    })
}

/// The time-filtered load behind the engagement trend: submissions for one
/// course with `submitted_at` on or after `since`.
pub async fn fetch_recent_submissions(
    pool: &PgPool,
    course_id: Uuid,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<Submission>> {
    let rows = sqlx::query(
        r#"
        SELECT s.student_id, s.submitted_at, s.total_score
        FROM course_analytics.submissions s
        JOIN course_analytics.assignments a ON a.id = s.assignment_id
        WHERE a.course_id = $1 AND s.submitted_at >= $2
        ORDER BY s.id
        "#,
    )
    .bind(course_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Submission {
            student_id: row.get("student_id"),
            submitted_at: row.get("submitted_at"),
            total_score: row.get("total_score"),
        })
        .collect())
}
