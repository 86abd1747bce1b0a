use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

mod api;
mod config;
mod dashboard;
mod export;
mod filter;
mod models;
mod normalize;
mod report;
mod risk;
mod summarize;

use api::{AnalyticsApi, HttpAnalyticsClient};
use config::Config;
use dashboard::{Dashboard, LoadState};
use filter::{CompletionFilter, FilterPatch, RiskFilter, SortKey, SortOrder};
use models::{H5pQuery, InterventionAction};
use report::H5pView;

#[derive(Parser)]
#[command(name = "risk-dashboard")]
#[command(about = "Teacher dashboard for student risk analytics", long_about = None)]
struct Cli {
    /// Analytics service base URL (overrides ANALYTICS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct FilterArgs {
    /// ALL, HIGH, MEDIUM or LOW
    #[arg(long)]
    risk: Option<RiskFilter>,
    /// all, completed or not_completed
    #[arg(long)]
    completion: Option<CompletionFilter>,
    /// risk_score, name, grade or last_activity
    #[arg(long)]
    sort_by: Option<SortKey>,
    /// asc or desc
    #[arg(long)]
    order: Option<SortOrder>,
    /// Case-insensitive match on name, email or user id
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    fn into_patch(self) -> FilterPatch {
        FilterPatch {
            risk_level: self.risk,
            completion: self.completion,
            sort_by: self.sort_by,
            order: self.order,
            search_query: self.search,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the analytics service is reachable
    Health,
    /// List courses
    Courses,
    /// List students of a course after filtering and sorting
    Students {
        /// Course id; defaults to the first course
        #[arg(long)]
        course: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one student's detail and risk explanation
    Detail {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        user: i64,
    },
    /// Show which factors push one student's risk up or down
    Explain {
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        user: i64,
    },
    /// Show today's tasks and recent alerts
    Summary {
        #[arg(long)]
        course: Option<String>,
    },
    /// Record a teacher intervention
    Intervene {
        #[arg(long)]
        course: String,
        #[arg(long)]
        user: i64,
        /// e.g. email, call, meeting
        #[arg(long)]
        action: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Export the filtered student list to CSV
    Export {
        #[arg(long)]
        course: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
        /// Target directory (overrides EXPORT_DIR)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Rank the course's H5P activities by how much students struggle with them
    H5p {
        #[arg(long)]
        course: Option<String>,
        /// Activities requested from the service
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Skip activities attempted by fewer students
        #[arg(long, default_value_t = 3)]
        min_students: u32,
        /// Show the best-scoring activities instead of the hardest
        #[arg(long)]
        easy: bool,
        /// Activities printed
        #[arg(long, default_value_t = 10)]
        show: usize,
    },
    /// Refresh a course periodically and print its overview on every change
    Watch {
        #[arg(long)]
        course: Option<String>,
        /// Seconds between refreshes
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        course: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 25)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

/// Selects `course`, or mounts and lets the dashboard pick the first one.
async fn open<A: AnalyticsApi>(
    dashboard: &Dashboard<A>,
    course: Option<String>,
    filters: FilterArgs,
) -> anyhow::Result<()> {
    // No course is selected yet, so this only merges.
    dashboard.set_filters(filters.into_patch()).await;
    match course {
        Some(course_id) => dashboard.select_course(course_id).await,
        None => dashboard.mount().await,
    }

    let state = dashboard.snapshot();
    if let Some(error) = state.error {
        bail!(error);
    }
    if state.selected_course.is_none() {
        bail!("the analytics service has no courses");
    }
    Ok(())
}

async fn watch<A: AnalyticsApi>(dashboard: &Dashboard<A>, interval: u64) -> anyhow::Result<()> {
    let mut updates = dashboard.subscribe();
    let mut last_shown = report::overview_line(&updates.borrow_and_update());
    if let Some(line) = &last_shown {
        println!("{line}");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        dashboard.refresh().await;
        if !updates.has_changed()? {
            continue;
        }
        let line = report::overview_line(&updates.borrow_and_update());
        if line.is_some() && line != last_shown {
            println!("{}", line.as_deref().unwrap_or_default());
            last_shown = line;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    let client =
        HttpAnalyticsClient::new(&config).context("failed to build analytics HTTP client")?;

    match cli.command {
        Commands::Health => {
            let status = client.health().await.context("analytics service unreachable")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Courses => {
            let dashboard = Dashboard::new(client);
            dashboard.mount().await;
            let state = dashboard.snapshot();
            if let Some(error) = state.error {
                bail!(error);
            }
            if state.courses.is_empty() {
                println!("No courses found.");
                return Ok(());
            }
            for course in &state.courses {
                println!("- {} ({} students)", course.course_id, course.student_count);
            }
        }
        Commands::Students {
            course,
            filters,
            limit,
        } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, filters).await?;
            let state = dashboard.snapshot();
            let visible = state.visible_students();

            if visible.is_empty() {
                println!("No students match these filters.");
                return Ok(());
            }

            println!(
                "{} of {} students in {}:",
                visible.len(),
                state.students.len(),
                state.selected_course.as_deref().unwrap_or_default()
            );
            for student in visible.iter().take(limit) {
                println!(
                    "- #{} {} ({}) {} score {:.1}, grade {:.1}%, {}",
                    student.user_id,
                    student.full_name,
                    student.email,
                    student.risk_level,
                    student.fail_risk_score,
                    student.mooc_grade_percentage,
                    risk::activity_label(student.days_since_last_activity)
                );
            }
        }
        Commands::Detail { course, user } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, FilterArgs::default()).await?;
            dashboard.select_student(user).await;
            let state = dashboard.snapshot();

            match (&state.detail.data, &state.detail.error) {
                (Some(detail), _) => print!("{}", report::render_detail(detail)),
                (None, Some(error)) => bail!("student {user}: {error}"),
                (None, None) => bail!("student {user}: no detail returned"),
            }
            match (&state.explanation.data, &state.explanation.error) {
                (Some(explanation), _) => {
                    println!();
                    print!("{}", report::render_explanation(explanation));
                }
                (None, Some(error)) => println!("\nRisk explanation unavailable: {error}"),
                (None, None) => {}
            }
        }
        Commands::Explain { course, user } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, FilterArgs::default()).await?;
            dashboard.select_student(user).await;
            let state = dashboard.snapshot();

            match (state.explanation.data, state.explanation.error) {
                (Some(explanation), _) => print!("{}", report::render_explanation(&explanation)),
                (None, Some(error)) => bail!("student {user}: {error}"),
                (None, None) => bail!("student {user}: no explanation returned"),
            }
        }
        Commands::Summary { course } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, FilterArgs::default()).await?;
            let state = dashboard.snapshot();
            if state.summary.status == LoadState::Failed {
                bail!(state.summary.error.unwrap_or_default());
            }
            let Some(summary) = state.summary.data else {
                bail!("summary did not load");
            };

            println!("Today's tasks:");
            if summary.today_tasks.is_empty() {
                println!("  nothing urgent");
            }
            for task in summary.today_tasks.iter().take(5) {
                println!(
                    "  [{:?}] #{} {} ({} {:.1}): {}",
                    task.urgency,
                    task.user_id,
                    task.full_name,
                    task.risk_level(),
                    task.fail_risk_score,
                    task.reason
                );
            }
            println!("Recent alerts:");
            let now = chrono::Utc::now();
            for alert in &summary.recent_alerts {
                let when = risk::relative_time(&alert.created_at, now)
                    .unwrap_or_else(|| alert.created_at.clone());
                println!(
                    "  {} #{} {}: {} ({})",
                    report::alert_label(alert.alert_type),
                    alert.user_id,
                    alert.full_name,
                    alert.message,
                    when
                );
            }
        }
        Commands::Intervene {
            course,
            user,
            action,
            notes,
        } => {
            let dashboard = Dashboard::new(client);
            dashboard.set_course(course);
            let receipt = dashboard
                .record_intervention(user, InterventionAction { action, notes })
                .await?;
            if !receipt.success {
                bail!("service rejected the intervention: {}", receipt.message);
            }
            println!("{}", receipt.message);
        }
        Commands::Export {
            course,
            filters,
            out_dir,
        } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, filters).await?;
            let state = dashboard.snapshot();
            let visible = state.visible_students();
            if visible.is_empty() {
                println!("No students match these filters; nothing exported.");
                return Ok(());
            }
            let dir = out_dir.unwrap_or(config.export_dir);
            let today = chrono::Local::now().date_naive();
            let path = export::export_students(
                &dir,
                state.selected_course.as_deref(),
                &visible,
                today,
            )?;
            println!("Exported {} students to {}.", visible.len(), path.display());
        }
        Commands::H5p {
            course,
            limit,
            min_students,
            easy,
            show,
        } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, FilterArgs::default()).await?;
            dashboard
                .load_h5p(H5pQuery {
                    limit,
                    min_students,
                })
                .await;
            let state = dashboard.snapshot();
            let Some(performance) = state.h5p.data else {
                bail!(state
                    .h5p
                    .error
                    .unwrap_or_else(|| "H5P analytics did not load".to_string()));
            };
            let view = if easy { H5pView::Easy } else { H5pView::Difficult };
            print!("{}", report::render_h5p(&performance, view, show));
        }
        Commands::Watch { course, interval } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, FilterArgs::default()).await?;
            watch(&dashboard, interval).await?;
        }
        Commands::Report {
            course,
            filters,
            limit,
            out,
        } => {
            let dashboard = Dashboard::new(client);
            open(&dashboard, course, filters).await?;
            let report = report::build_report(&dashboard.snapshot(), limit, chrono::Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
