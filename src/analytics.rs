use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AnalyticsResult, Assignment, AttendanceSession, CompletionEntry, Course, DashboardSummary,
    ScoreBucket, ScoreDistribution, Student, Submission,
};

/// Attendance status string that counts toward the attendance rate. Matched
/// by exact equality; "late", "excused", and anything else never count.
pub const PRESENT_STATUS: &str = "present";

/// Number of trailing 7-day windows in the engagement trend.
pub const TREND_WEEKS: usize = 4;

/// Size of the engagement window in days.
pub const TREND_WINDOW_DAYS: i64 = TREND_WEEKS as i64 * 7;

/// Average attendance percentage across the given sessions.
///
/// The denominator is session count times the FIRST session's mark count,
/// even when later sessions have a different roster size. Known limitation,
/// kept for compatibility with existing reports.
pub fn attendance_rate(sessions: &[AttendanceSession]) -> f64 {
    let Some(first) = sessions.first() else {
        return 0.0;
    };

    let expected = sessions.len() * first.marks.len();
    if expected == 0 {
        return 0.0;
    }

    let present = sessions
        .iter()
        .flat_map(|session| session.marks.iter())
        .filter(|mark| mark.status == PRESENT_STATUS)
        .count();

    present as f64 / expected as f64 * 100.0
}

// Per-student lookup for one assignment. Later submissions overwrite earlier
// ones, so a duplicate student/assignment pair resolves to the last
// submission in input order.
fn latest_submissions(assignment: &Assignment) -> HashMap<Uuid, &Submission> {
    let mut latest = HashMap::new();
    for submission in assignment.submissions.iter() {
        latest.insert(submission.student_id, submission);
    }
    latest
}

/// Per-student completion percentage over all assignments in the course.
///
/// Students with zero submissions produce no entry at all; result order is
/// not significant.
pub fn completion_rates(assignments: &[Assignment]) -> Vec<CompletionEntry> {
    if assignments.is_empty() {
        return Vec::new();
    }

    let mut completed: HashMap<Uuid, usize> = HashMap::new();
    for assignment in assignments.iter() {
        for student_id in latest_submissions(assignment).into_keys() {
            *completed.entry(student_id).or_insert(0) += 1;
        }
    }

    completed
        .into_iter()
        .map(|(student_id, count)| CompletionEntry {
            student_id,
            rate: count as f64 / assignments.len() as f64 * 100.0,
        })
        .collect()
}

/// Histogram of per-student average scores across all assignments.
///
/// A missing submission counts as a zero score, not as excluded from the
/// average. With no assignments there is no average to take, so every
/// student is skipped and the distribution stays empty.
pub fn score_distribution(roster: &[Student], assignments: &[Assignment]) -> ScoreDistribution {
    let mut distribution = ScoreDistribution::default();
    if assignments.is_empty() {
        return distribution;
    }

    let lookups: Vec<HashMap<Uuid, &Submission>> =
        assignments.iter().map(latest_submissions).collect();

    for student in roster.iter() {
        let total: f64 = lookups
            .iter()
            .map(|lookup| {
                lookup
                    .get(&student.id)
                    .map_or(0.0, |submission| submission.total_score)
            })
            .sum();
        let average = total / assignments.len() as f64;
        distribution.counts[ScoreBucket::for_average(average).index()] += 1;
    }

    distribution
}

/// Submission counts for the trailing four weeks, oldest week first.
///
/// `now` must be captured once by the caller and reused for every call in
/// the same invocation; the engine never reads the clock itself. Submissions
/// older than the window or timestamped in the future are dropped.
pub fn engagement_trend(submissions: &[Submission], now: DateTime<Utc>) -> [u64; TREND_WEEKS] {
    // index 0 = most recent week until the reversal below
    let mut weekly = [0u64; TREND_WEEKS];

    for submission in submissions.iter() {
        if submission.submitted_at > now {
            continue;
        }
        let days_ago = (now - submission.submitted_at).num_days();
        let week = (days_ago / 7) as usize;
        if week < TREND_WEEKS {
            weekly[week] += 1;
        }
    }

    weekly.reverse();
    weekly
}

/// Composes all four metrics into one result for a course.
///
/// `recent_submissions` is the time-filtered load for the engagement window
/// (last [`TREND_WINDOW_DAYS`] days), fetched by the caller.
pub fn aggregate(
    course: &Course,
    recent_submissions: &[Submission],
    now: DateTime<Utc>,
) -> AnalyticsResult {
    AnalyticsResult {
        course_id: course.id,
        course_name: course.name.clone(),
        attendance_rate: attendance_rate(&course.sessions),
        completion: completion_rates(&course.assignments),
        score_distribution: score_distribution(&course.roster, &course.assignments),
        engagement_trend: engagement_trend(recent_submissions, now),
    }
}

/// Cross-course roll-up for the dashboard. A course that failed to load
/// contributes nothing and never aborts the roll-up.
pub fn dashboard_totals<I>(courses: I) -> DashboardSummary
where
    I: IntoIterator<Item = anyhow::Result<Course>>,
{
    let mut summary = DashboardSummary {
        course_count: 0,
        total_students: 0,
    };

    for course in courses {
        match course {
            Ok(course) => {
                summary.course_count += 1;
                summary.total_students += course.roster.len();
            }
            Err(error) => {
                tracing::warn!(%error, "skipping course that failed to load");
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use crate::models::{AttendanceMark, SCORE_BUCKETS};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn student(seed: u128) -> Student {
        Student {
            id: Uuid::from_u128(seed),
            full_name: format!("Student {seed}"),
            email: format!("student{seed}@example.com"),
        }
    }

    fn session(day: u32, statuses: &[(u128, &str)]) -> AttendanceSession {
        AttendanceSession {
            held_at: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            marks: statuses
                .iter()
                .map(|(seed, status)| AttendanceMark {
                    student_id: Uuid::from_u128(*seed),
                    status: status.to_string(),
                })
                .collect(),
        }
    }

    fn assignment(title: &str, submissions: Vec<Submission>) -> Assignment {
        Assignment {
            id: Uuid::new_v4(),
            title: title.to_string(),
            submissions,
        }
    }

    fn submission(student_seed: u128, days_ago: i64, score: f64) -> Submission {
        Submission {
            student_id: Uuid::from_u128(student_seed),
            submitted_at: now() - Duration::days(days_ago),
            total_score: score,
        }
    }

    #[test]
    fn attendance_rate_of_no_sessions_is_zero() {
        assert_eq!(attendance_rate(&[]), 0.0);
    }

    #[test]
    fn attendance_rate_counts_only_present() {
        let sessions = vec![
            session(2, &[(1, "present"), (2, "absent"), (3, "excused")]),
            session(9, &[(1, "present"), (2, "present"), (3, "late")]),
        ];
        // 3 present marks over 2 sessions x 3 students
        assert_eq!(attendance_rate(&sessions), 50.0);
    }

    #[test]
    fn attendance_rate_pins_denominator_to_first_session() {
        let sessions = vec![
            session(2, &[(1, "present"), (2, "present")]),
            session(9, &[(1, "present"), (2, "present"), (3, "present")]),
        ];
        // 5 present over 2 x 2 expected, not 2 + 3
        assert_eq!(attendance_rate(&sessions), 125.0);
    }

    #[test]
    fn attendance_rate_tolerates_empty_first_session() {
        let sessions = vec![session(2, &[]), session(9, &[(1, "present")])];
        assert_eq!(attendance_rate(&sessions), 0.0);
    }

    #[test]
    fn completion_omits_students_with_no_submissions() {
        let assignments = vec![assignment("Essay 1", vec![submission(1, 3, 90.0)])];

        let rates = completion_rates(&assignments);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].student_id, Uuid::from_u128(1));
        assert_eq!(rates[0].rate, 100.0);
    }

    #[test]
    fn completion_rates_are_per_assignment_fractions() {
        let assignments = vec![
            assignment("Essay 1", vec![submission(1, 10, 80.0), submission(2, 9, 70.0)]),
            assignment("Essay 2", vec![submission(1, 3, 60.0)]),
        ];

        let mut rates = completion_rates(&assignments);
        rates.sort_by_key(|entry| entry.student_id);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].rate, 100.0);
        assert_eq!(rates[1].rate, 50.0);
    }

    #[test]
    fn completion_counts_duplicate_submissions_once() {
        let assignments = vec![assignment(
            "Quiz",
            vec![submission(1, 5, 40.0), submission(1, 2, 95.0)],
        )];

        let rates = completion_rates(&assignments);
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].rate, 100.0);
    }

    #[test]
    fn completion_of_zero_assignments_is_empty() {
        assert!(completion_rates(&[]).is_empty());
    }

    #[test]
    fn distribution_places_one_student_per_bucket() {
        let roster: Vec<Student> = (1..=5).map(student).collect();
        let assignments = vec![assignment(
            "Exam",
            vec![
                submission(1, 1, 10.0),
                submission(2, 1, 25.0),
                submission(3, 1, 45.0),
                submission(4, 1, 65.0),
                submission(5, 1, 95.0),
            ],
        )];

        let distribution = score_distribution(&roster, &assignments);
        assert_eq!(distribution.counts, [1, 1, 1, 1, 1]);
    }

    #[test]
    fn distribution_boundaries_are_inclusive() {
        for (score, bucket) in [
            (20.0, ScoreBucket::UpTo20),
            (40.0, ScoreBucket::UpTo40),
            (60.0, ScoreBucket::UpTo60),
            (80.0, ScoreBucket::UpTo80),
        ] {
            let roster = vec![student(1)];
            let assignments = vec![assignment("Exam", vec![submission(1, 1, score)])];
            let distribution = score_distribution(&roster, &assignments);
            assert_eq!(distribution.count(bucket), 1, "score {score}");
        }
    }

    #[test]
    fn distribution_treats_missing_submissions_as_zero() {
        let roster = vec![student(1)];
        let assignments = vec![
            assignment("Essay 1", vec![submission(1, 1, 80.0)]),
            assignment("Essay 2", vec![]),
        ];

        // average is (80 + 0) / 2 = 40, inclusive upper bound of 21-40
        let distribution = score_distribution(&roster, &assignments);
        assert_eq!(distribution.count(ScoreBucket::UpTo40), 1);
    }

    #[test]
    fn distribution_uses_last_duplicate_submission() {
        let roster = vec![student(1)];
        let assignments = vec![assignment(
            "Quiz",
            vec![submission(1, 5, 10.0), submission(1, 2, 90.0)],
        )];

        let distribution = score_distribution(&roster, &assignments);
        assert_eq!(distribution.count(ScoreBucket::UpTo100), 1);
        assert_eq!(distribution.count(ScoreBucket::UpTo20), 0);
    }

    #[test]
    fn distribution_passes_unvalidated_scores_to_the_top_bucket() {
        assert_eq!(ScoreBucket::for_average(f64::NAN), ScoreBucket::UpTo100);
        assert_eq!(ScoreBucket::for_average(140.0), ScoreBucket::UpTo100);

        let roster = vec![student(1)];
        let assignments = vec![assignment("Quiz", vec![submission(1, 1, f64::NAN)])];
        let distribution = score_distribution(&roster, &assignments);
        assert_eq!(distribution.count(ScoreBucket::UpTo100), 1);
    }

    #[test]
    fn distribution_of_zero_assignments_is_empty() {
        let roster: Vec<Student> = (1..=3).map(student).collect();
        let distribution = score_distribution(&roster, &[]);
        assert_eq!(distribution, ScoreDistribution::default());
    }

    #[test]
    fn distribution_ignores_submissions_outside_roster() {
        let roster = vec![student(1)];
        let assignments = vec![assignment(
            "Exam",
            vec![submission(1, 1, 95.0), submission(99, 1, 95.0)],
        )];

        let distribution = score_distribution(&roster, &assignments);
        let total: usize = distribution.counts.iter().sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn trend_orders_weeks_oldest_first() {
        let submissions = vec![
            submission(1, 1, 50.0),
            submission(2, 8, 50.0),
            submission(3, 15, 50.0),
            submission(4, 22, 50.0),
        ];

        assert_eq!(engagement_trend(&submissions, now()), [1, 1, 1, 1]);
    }

    #[test]
    fn trend_aggregates_within_a_week() {
        let submissions = vec![
            submission(1, 0, 50.0),
            submission(2, 3, 50.0),
            submission(3, 6, 50.0),
            submission(4, 10, 50.0),
        ];

        assert_eq!(engagement_trend(&submissions, now()), [0, 0, 1, 3]);
    }

    #[test]
    fn trend_drops_submissions_outside_window() {
        let submissions = vec![submission(1, 30, 50.0)];
        assert_eq!(engagement_trend(&submissions, now()), [0, 0, 0, 0]);
    }

    #[test]
    fn trend_drops_future_submissions() {
        let submissions = vec![submission(1, -1, 50.0)];
        assert_eq!(engagement_trend(&submissions, now()), [0, 0, 0, 0]);
    }

    #[test]
    fn aggregate_composes_all_metrics() {
        let course = Course {
            id: Uuid::from_u128(10),
            name: "Biology 101".to_string(),
            roster: vec![student(1), student(2)],
            assignments: vec![assignment("Lab 1", vec![submission(1, 2, 88.0)])],
            sessions: vec![session(2, &[(1, "present"), (2, "absent")])],
        };
        let recent = vec![submission(1, 2, 88.0)];

        let result = aggregate(&course, &recent, now());
        assert_eq!(result.course_id, course.id);
        assert_eq!(result.attendance_rate, 50.0);
        assert_eq!(result.completion.len(), 1);
        // student 1 averages 88, student 2 averages 0
        assert_eq!(result.score_distribution.counts, [1, 0, 0, 0, 1]);
        assert_eq!(result.engagement_trend, [0, 0, 0, 1]);
    }

    #[test]
    fn calculators_are_idempotent_over_the_same_input() {
        let roster: Vec<Student> = (1..=3).map(student).collect();
        let assignments = vec![assignment(
            "Exam",
            vec![submission(1, 2, 70.0), submission(2, 9, 30.0)],
        )];
        let sessions = vec![session(2, &[(1, "present"), (2, "absent")])];
        let recent = vec![submission(1, 2, 70.0)];

        assert_eq!(attendance_rate(&sessions), attendance_rate(&sessions));
        let completion_pairs = |entries: Vec<CompletionEntry>| {
            let mut pairs: Vec<(Uuid, f64)> = entries
                .into_iter()
                .map(|entry| (entry.student_id, entry.rate))
                .collect();
            pairs.sort_by_key(|(student_id, _)| *student_id);
            pairs
        };
        assert_eq!(
            completion_pairs(completion_rates(&assignments)),
            completion_pairs(completion_rates(&assignments))
        );
        assert_eq!(
            score_distribution(&roster, &assignments),
            score_distribution(&roster, &assignments)
        );
        assert_eq!(
            engagement_trend(&recent, now()),
            engagement_trend(&recent, now())
        );
    }

    #[test]
    fn dashboard_totals_skip_failed_courses() {
        let courses = vec![
            Ok(Course {
                id: Uuid::from_u128(10),
                name: "Biology 101".to_string(),
                roster: vec![student(1), student(2)],
                assignments: vec![],
                sessions: vec![],
            }),
            Err(anyhow::anyhow!("course vanished")),
            Ok(Course {
                id: Uuid::from_u128(11),
                name: "Chemistry 101".to_string(),
                roster: vec![student(3)],
                assignments: vec![],
                sessions: vec![],
            }),
        ];

        let summary = dashboard_totals(courses);
        assert_eq!(summary.course_count, 2);
        assert_eq!(summary.total_students, 3);
    }

    #[test]
    fn bucket_labels_cover_the_closed_set() {
        let labels: Vec<&str> = SCORE_BUCKETS.iter().map(|b| b.label()).collect();
        assert_eq!(labels, ["0-20", "21-40", "41-60", "61-80", "81-100"]);
    }
}
