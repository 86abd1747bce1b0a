use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::dashboard::DashboardState;
use crate::models::{
    AlertType, H5pContent, H5pPerformance, RecentAlert, ShapExplanation, Student, StudentDetail,
};
use crate::risk;
use crate::summarize::{factor_bars, FactorKind, DONUT_RADIUS};

const BAR_CELLS: usize = 40;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertTypeSummary {
    pub alert_type: AlertType,
    pub count: usize,
}

pub fn alert_label(alert_type: AlertType) -> &'static str {
    match alert_type {
        AlertType::RiskIncrease => "risk increase",
        AlertType::Inactive => "inactive",
        AlertType::LowProgress => "low progress",
    }
}

pub fn summarize_alerts(alerts: &[RecentAlert]) -> Vec<AlertTypeSummary> {
    let mut counts: HashMap<AlertType, usize> = HashMap::new();
    for alert in alerts {
        *counts.entry(alert.alert_type).or_insert(0) += 1;
    }

    let mut summaries: Vec<AlertTypeSummary> = counts
        .into_iter()
        .map(|(alert_type, count)| AlertTypeSummary { alert_type, count })
        .collect();
    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| alert_label(a.alert_type).cmp(alert_label(b.alert_type)))
    });
    summaries
}

/// Text bar `width` percent long.
pub fn bar(width: f64) -> String {
    let filled = ((width.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_CELLS - filled))
}

fn student_line(student: &Student) -> String {
    let flag = if risk::is_inactive(student.days_since_last_activity) {
        " (inactive)"
    } else {
        ""
    };
    format!(
        "| {} | {} | {} | {} | {:.1} | {:.1}% | {:.1}% | {}{flag} |",
        student.user_id,
        student.full_name,
        student.email,
        student.risk_level,
        student.fail_risk_score,
        student.mooc_grade_percentage,
        student.mooc_completion_rate,
        risk::activity_label(student.days_since_last_activity),
    )
}

pub fn build_report(state: &DashboardState, limit: usize, now: DateTime<Utc>) -> String {
    let mut output = String::new();
    let course = state.selected_course.as_deref().unwrap_or("no course selected");

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(output, "Course {} (generated {})", course, now.format("%Y-%m-%d %H:%M UTC"));

    if let Some(error) = &state.error {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Error: {error}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    match (&state.statistics, state.risk_arcs()) {
        (None, _) | (_, None) => {
            let _ = writeln!(output, "No statistics loaded.");
        }
        (Some(stats), Some(arcs)) => {
            let _ = writeln!(output, "- Students: {}", stats.total_students);
            let _ = writeln!(output, "- Average risk score: {:.1}", stats.avg_risk_score);
            let _ = writeln!(output, "- Average grade: {:.1}%", stats.avg_grade);
            let _ = writeln!(output, "- Average completion: {:.1}%", stats.avg_completion_rate);
            let _ = writeln!(output, "- Completed the course: {}", stats.completed_count);

            let _ = writeln!(output);
            let _ = writeln!(output, "## Risk Distribution");
            let _ = writeln!(output, "```");
            for arc in arcs {
                let (dash, dash_offset) = arc.stroke(DONUT_RADIUS);
                let _ = writeln!(
                    output,
                    "{:<6} {:>5} {} {:>5.1}% (from {:.1}%, stroke {:.1} at {:.1})",
                    arc.level,
                    arc.count,
                    bar(arc.percent),
                    arc.percent,
                    arc.offset,
                    dash,
                    dash_offset
                );
            }
            let _ = writeln!(output, "```");
        }
    }

    let visible = state.visible_students();
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Students ({} shown, risk {}, sorted by {} {})",
        visible.len(),
        state.filters.risk_level,
        state.filters.sort_by.as_str(),
        state.filters.order.as_str()
    );
    if visible.is_empty() {
        let _ = writeln!(output, "No students match the current filters.");
    } else {
        let _ = writeln!(
            output,
            "| ID | Name | Email | Risk | Score | Grade | Completion | Last activity |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
        for student in visible.iter().take(limit) {
            let _ = writeln!(output, "{}", student_line(student));
        }
        if visible.len() > limit {
            let _ = writeln!(output, "\n...and {} more.", visible.len() - limit);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Today's Tasks");
    match &state.summary.data {
        None => {
            let reason = state.summary.error.as_deref().unwrap_or("summary not loaded");
            let _ = writeln!(output, "Unavailable: {reason}.");
        }
        Some(summary) if summary.today_tasks.is_empty() => {
            let _ = writeln!(output, "Nothing urgent today.");
        }
        Some(summary) => {
            for task in summary.today_tasks.iter().take(5) {
                let _ = writeln!(
                    output,
                    "- [{:?}] {} ({}, {} {:.1}): {}",
                    task.urgency,
                    task.full_name,
                    task.email,
                    task.risk_level(),
                    task.fail_risk_score,
                    task.reason
                );
            }
        }
    }

    if let Some(summary) = &state.summary.data {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Recent Alerts");
        let stats = &summary.quick_stats;
        let _ = writeln!(
            output,
            "{} new high risk, {} inactive, {} interventions pending",
            stats.new_high_risk_count, stats.inactive_students_count, stats.intervention_pending
        );
        for entry in summarize_alerts(&summary.recent_alerts) {
            let _ = writeln!(output, "- {}: {}", alert_label(entry.alert_type), entry.count);
        }
        for alert in summary.recent_alerts.iter().take(10) {
            let when = risk::relative_time(&alert.created_at, now)
                .unwrap_or_else(|| alert.created_at.clone());
            let _ = writeln!(output, "- {} ({}): {}", alert.full_name, when, alert.message);
        }
    }

    output
}

/// One-line course overview, or `None` while nothing has loaded.
pub fn overview_line(state: &DashboardState) -> Option<String> {
    let course = state.selected_course.as_deref().unwrap_or_default();
    if let Some(error) = &state.error {
        return Some(format!("[{course}] {error}"));
    }
    let arcs = state.risk_arcs()?;
    let pending = state
        .summary
        .data
        .as_ref()
        .map_or(0, |summary| summary.quick_stats.intervention_pending);
    Some(format!(
        "[{course}] {} students: {} high {:.0}%, {} medium {:.0}%, {} low {:.0}%; {pending} interventions pending",
        state.students.len(),
        arcs[0].count,
        arcs[0].percent,
        arcs[1].count,
        arcs[1].percent,
        arcs[2].count,
        arcs[2].percent
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum H5pView {
    /// Service order, hardest first.
    #[default]
    Difficult,
    /// Highest average score first.
    Easy,
}

pub fn h5p_display(performance: &H5pPerformance, view: H5pView, limit: usize) -> Vec<&H5pContent> {
    let mut contents: Vec<&H5pContent> = performance.contents.iter().collect();
    if view == H5pView::Easy {
        contents.sort_by(|a, b| {
            b.avg_score
                .partial_cmp(&a.avg_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    contents.truncate(limit);
    contents
}

pub fn render_h5p(performance: &H5pPerformance, view: H5pView, limit: usize) -> String {
    let mut output = String::new();
    let stats = &performance.statistics;
    let _ = writeln!(
        output,
        "{} activities analyzed, avg completion {:.1}%, avg score {:.1}%, {} hard, {} need attention",
        stats.total_contents_analyzed,
        stats.avg_completion_rate,
        stats.avg_score_all,
        stats.high_difficulty_count,
        stats.needs_attention_count
    );

    let shown = h5p_display(performance, view, limit);
    if shown.is_empty() {
        let _ = writeln!(output, "No H5P activity data.");
        return output;
    }
    for content in shown {
        let flag = if content.needs_attention() { " !" } else { "" };
        let _ = writeln!(
            output,
            "{:<6} {} ({}){flag}",
            content.difficulty(),
            content.content_title,
            content.folder_name
        );
        let _ = writeln!(
            output,
            "       score {:.1}%, completed {:.1}%, below max {:.1}% of {} students, {:.1} min",
            content.avg_score,
            content.completion_rate,
            content.not_max_rate,
            content.total_students,
            content.avg_time_spent_minutes
        );
    }
    output
}

pub fn render_detail(detail: &StudentDetail) -> String {
    let mut output = String::new();
    let student = &detail.student;
    let _ = writeln!(output, "{} <{}> #{}", student.full_name, student.email, student.user_id);
    let _ = writeln!(
        output,
        "Risk {} ({:.1}), grade {:.1}%, completion {:.1}%, {}",
        student.risk_level,
        student.fail_risk_score,
        student.mooc_grade_percentage,
        student.mooc_completion_rate,
        risk::activity_label(student.days_since_last_activity)
    );
    if detail.total_blocks > 0 {
        let _ = writeln!(
            output,
            "Progress {}/{} blocks, {} active days, {} quiz attempts",
            detail.completed_blocks, detail.total_blocks, detail.active_days, detail.quiz_attempts
        );
    }
    if !detail.suggestions.is_empty() {
        let _ = writeln!(output, "Suggested interventions:");
        for suggestion in &detail.suggestions {
            let _ = writeln!(
                output,
                "  {} [{:?}] {}: {}",
                suggestion.icon, suggestion.priority, suggestion.title, suggestion.description
            );
        }
    }
    output
}

pub fn render_explanation(explanation: &ShapExplanation) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Class baseline {:.1}%, this student {:.1}%",
        explanation.base_value * 100.0,
        explanation.fail_risk_score
    );

    let bars = factor_bars(explanation);
    for (kind, heading) in [
        (FactorKind::Risk, "Raising risk"),
        (FactorKind::Protective, "Protective"),
    ] {
        let group: Vec<_> = bars.iter().filter(|b| b.kind == kind).collect();
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(output, "{heading}:");
        for entry in group {
            let _ = writeln!(
                output,
                "  {:<32} = {:<8} {} {}",
                entry.factor.label,
                entry.factor.display_value(),
                bar(entry.width),
                entry.signed_label()
            );
        }
    }
    output
}
