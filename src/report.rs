use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::analytics::PRESENT_STATUS;
use crate::models::{AnalyticsResult, Course, Student, SCORE_BUCKETS};

const TREND_WEEK_LABELS: [&str; 4] = ["3 weeks ago", "2 weeks ago", "last week", "this week"];

fn perfect_attendance<'a>(course: &'a Course) -> Vec<&'a Student> {
    course
        .roster
        .iter()
        .filter(|student| {
            !course.sessions.is_empty()
                && course.sessions.iter().all(|session| {
                    session
                        .marks
                        .iter()
                        .any(|mark| mark.student_id == student.id && mark.status == PRESENT_STATUS)
                })
        })
        .collect()
}

pub fn build_report(course: &Course, result: &AnalyticsResult, now: DateTime<Utc>) -> String {
    let students: HashMap<Uuid, &Student> = course
        .roster
        .iter()
        .map(|student| (student.id, student))
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Course Analytics: {}", course.name);
    let _ = writeln!(
        output,
        "Generated {} over {} students, {} assignments, {} sessions",
        now.date_naive(),
        course.roster.len(),
        course.assignments.len(),
        course.sessions.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    let _ = writeln!(output, "Average attendance rate: {:.1}%", result.attendance_rate);

    for session in course.sessions.iter() {
        let present = session
            .marks
            .iter()
            .filter(|mark| mark.status == PRESENT_STATUS)
            .count();
        let _ = writeln!(
            output,
            "- {}: {} of {} marked present",
            session.held_at,
            present,
            session.marks.len()
        );
    }

    let perfect = perfect_attendance(course);
    if !perfect.is_empty() {
        let names: Vec<&str> = perfect
            .iter()
            .map(|student| student.full_name.as_str())
            .collect();
        let _ = writeln!(output, "Perfect attendance: {}", names.join(", "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assignments");

    if course.assignments.is_empty() {
        let _ = writeln!(output, "No assignments recorded yet.");
    } else {
        for assignment in course.assignments.iter() {
            let _ = writeln!(
                output,
                "- {}: {} submissions",
                assignment.title,
                assignment.submissions.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Completion");

    if result.completion.is_empty() {
        let _ = writeln!(output, "No submissions recorded yet.");
    } else {
        let mut completion = result.completion.clone();
        completion.sort_by(|a, b| {
            b.rate
                .partial_cmp(&a.rate)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for entry in completion.iter() {
            // a submission from outside the roster still shows up, keyed by id
            match students.get(&entry.student_id) {
                Some(student) => {
                    let _ = writeln!(
                        output,
                        "- {} ({}): {:.1}%",
                        student.full_name, student.email, entry.rate
                    );
                }
                None => {
                    let _ = writeln!(output, "- {}: {:.1}%", entry.student_id, entry.rate);
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Distribution");

    for bucket in SCORE_BUCKETS {
        let _ = writeln!(
            output,
            "- {}: {} students",
            bucket.label(),
            result.score_distribution.count(bucket)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement (last 4 weeks)");

    let total: u64 = result.engagement_trend.iter().sum();
    if total == 0 {
        let _ = writeln!(output, "No submissions in the last four weeks.");
    } else {
        for (label, count) in TREND_WEEK_LABELS.iter().zip(result.engagement_trend.iter()) {
            let _ = writeln!(output, "- {}: {} submissions", label, count);
        }
    }

    output
}
