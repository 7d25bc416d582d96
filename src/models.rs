use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct AttendanceSession {
    pub held_at: NaiveDate,
    pub marks: Vec<AttendanceMark>,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub student_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub total_score: f64,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub roster: Vec<Student>,
    pub assignments: Vec<Assignment>,
    pub sessions: Vec<AttendanceSession>,
}

/// One of the five closed score ranges the distribution histogram counts.
/// Upper bounds are inclusive: an average of exactly 20 belongs to `0-20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBucket {
    UpTo20 = 0,
    UpTo40 = 1,
    UpTo60 = 2,
    UpTo80 = 3,
    UpTo100 = 4,
}

pub const SCORE_BUCKETS: [ScoreBucket; 5] = [
    ScoreBucket::UpTo20,
    ScoreBucket::UpTo40,
    ScoreBucket::UpTo60,
    ScoreBucket::UpTo80,
    ScoreBucket::UpTo100,
];

impl ScoreBucket {
    pub fn label(self) -> &'static str {
        match self {
            ScoreBucket::UpTo20 => "0-20",
            ScoreBucket::UpTo40 => "21-40",
            ScoreBucket::UpTo60 => "41-60",
            ScoreBucket::UpTo80 => "61-80",
            ScoreBucket::UpTo100 => "81-100",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Classifies an average score. Scores are not validated: anything above
    /// 80, including NaN and out-of-range values, lands in the top bucket.
    pub fn for_average(average: f64) -> Self {
        if average <= 20.0 {
            ScoreBucket::UpTo20
        } else if average <= 40.0 {
            ScoreBucket::UpTo40
        } else if average <= 60.0 {
            ScoreBucket::UpTo60
        } else if average <= 80.0 {
            ScoreBucket::UpTo80
        } else {
            ScoreBucket::UpTo100
        }
    }
}

/// Student counts per score bucket, indexed by [`ScoreBucket::index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreDistribution {
    pub counts: [usize; 5],
}

impl ScoreDistribution {
    pub fn count(&self, bucket: ScoreBucket) -> usize {
        self.counts[bucket.index()]
    }
}

// Serialized as a label-keyed map so callers can hand the result straight
// to a template or JSON consumer.
impl Serialize for ScoreDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SCORE_BUCKETS.len()))?;
        for bucket in SCORE_BUCKETS {
            map.serialize_entry(bucket.label(), &self.counts[bucket.index()])?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionEntry {
    pub student_id: Uuid,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResult {
    pub course_id: Uuid,
    pub course_name: String,
    pub attendance_rate: f64,
    pub completion: Vec<CompletionEntry>,
    pub score_distribution: ScoreDistribution,
    pub engagement_trend: [u64; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub course_count: usize,
    pub total_students: usize,
}
