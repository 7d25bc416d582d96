use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod analytics;
mod db;
mod models;
mod report;

#[derive(Parser)]
#[command(name = "course-analytics")]
#[command(about = "Course roster, submission, and attendance analytics for instructors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic demo course
    Seed,
    /// Import submissions or attendance marks from a CSV file
    #[command(group(
        ArgGroup::new("source")
            .args(["submissions", "attendance"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        submissions: Option<PathBuf>,
        #[arg(long)]
        attendance: Option<PathBuf>,
    },
    /// Compute analytics for a single course
    Analytics {
        #[arg(long)]
        course: String,
        #[arg(long)]
        json: bool,
    },
    /// Roll up roster totals across every course
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown analytics report for a course
    Report {
        #[arg(long)]
        course: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            submissions,
            attendance,
        } => {
            if let Some(csv) = submissions {
                let inserted = db::import_submissions_csv(&pool, &csv).await?;
                println!("Inserted {inserted} submissions from {}.", csv.display());
            } else if let Some(csv) = attendance {
                let inserted = db::import_attendance_csv(&pool, &csv).await?;
                println!(
                    "Inserted {inserted} attendance marks from {}.",
                    csv.display()
                );
            }
        }
        Commands::Analytics { course, json } => {
            // one clock read per invocation; every week bucket derives from it
            let now = Utc::now();
            let loaded = db::fetch_course(&pool, &course).await?;
            let recent = db::fetch_recent_submissions(
                &pool,
                loaded.id,
                now - Duration::days(analytics::TREND_WINDOW_DAYS),
            )
            .await?;
            let result = analytics::aggregate(&loaded, &recent, now);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Analytics for {}:", result.course_name);
                println!("- attendance rate: {:.1}%", result.attendance_rate);
                println!(
                    "- students with submissions: {} of {}",
                    result.completion.len(),
                    loaded.roster.len()
                );
                for bucket in models::SCORE_BUCKETS {
                    println!(
                        "- score bucket {}: {} students",
                        bucket.label(),
                        result.score_distribution.count(bucket)
                    );
                }
                println!(
                    "- submissions per week (oldest first): {:?}",
                    result.engagement_trend
                );
            }
        }
        Commands::Dashboard { json } => {
            let mut courses = Vec::new();
            for (course_id, name) in db::list_courses(&pool).await? {
                courses.push(db::fetch_course_by_id(&pool, course_id, name).await);
            }
            let summary = analytics::dashboard_totals(courses);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} students across {} courses.",
                    summary.total_students, summary.course_count
                );
            }
        }
        Commands::Report { course, out } => {
            let now = Utc::now();
            let loaded = db::fetch_course(&pool, &course).await?;
            let recent = db::fetch_recent_submissions(
                &pool,
                loaded.id,
                now - Duration::days(analytics::TREND_WINDOW_DAYS),
            )
            .await?;
            let result = analytics::aggregate(&loaded, &recent, now);
            let report = report::build_report(&loaded, &result, now);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
