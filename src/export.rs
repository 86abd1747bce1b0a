use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{RiskLevel, Student};

const MAX_COURSE_CHARS: usize = 80;

const HEADERS: [&str; 8] = [
    "user_id",
    "full_name",
    "email",
    "risk_level",
    "fail_risk_score",
    "mooc_grade_percentage",
    "mooc_completion_rate",
    "days_since_last_activity",
];

#[derive(Serialize)]
struct ExportRow<'a> {
    user_id: i64,
    full_name: &'a str,
    email: &'a str,
    risk_level: RiskLevel,
    fail_risk_score: String,
    mooc_grade_percentage: String,
    mooc_completion_rate: String,
    days_since_last_activity: Option<u32>,
}

impl<'a> From<&'a Student> for ExportRow<'a> {
    fn from(student: &'a Student) -> Self {
        Self {
            user_id: student.user_id,
            full_name: &student.full_name,
            email: &student.email,
            risk_level: student.risk_level,
            fail_risk_score: plain_number(student.fail_risk_score),
            mooc_grade_percentage: plain_number(student.mooc_grade_percentage),
            mooc_completion_rate: plain_number(student.mooc_completion_rate),
            days_since_last_activity: student.days_since_last_activity,
        }
    }
}

/// Shortest decimal form, so whole numbers carry no `.0`.
fn plain_number(value: f64) -> String {
    value.to_string()
}

/// `early_warning_<course>_<yyyymmdd>.csv` with separators in the course id flattened to `_`.
pub fn export_filename(course_id: Option<&str>, date: NaiveDate) -> String {
    let safe_course: String = course_id
        .filter(|id| !id.is_empty())
        .unwrap_or("course")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_COURSE_CHARS)
        .collect();
    format!("early_warning_{safe_course}_{}.csv", date.format("%Y%m%d"))
}

pub fn write_students<W: io::Write>(writer: W, students: &[Student]) -> anyhow::Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    // serialize() only emits the header alongside the first row
    if students.is_empty() {
        csv_writer.write_record(HEADERS)?;
    }
    for student in students {
        csv_writer.serialize(ExportRow::from(student))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_students(
    dir: &Path,
    course_id: Option<&str>,
    students: &[Student],
    date: NaiveDate,
) -> anyhow::Result<PathBuf> {
    let path = dir.join(export_filename(course_id, date));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_students(file, students)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: i64, name: &str) -> Student {
        Student {
            user_id: id,
            full_name: name.to_string(),
            email: "lee@example.com".to_string(),
            risk_level: RiskLevel::High,
            fail_risk_score: 81.5,
            mooc_grade_percentage: 42.0,
            mooc_completion_rate: 10.25,
            days_since_last_activity: None,
            video_completion_rate: 0.0,
            quiz_avg_score: 0.0,
            discussion_total_interactions: 0,
            completion_status: None,
        }
    }

    #[test]
    fn filename_flattens_course_separators() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            export_filename(Some("course-v1:UEL+NLTT241225+2025_12"), date),
            "early_warning_course-v1_UEL_NLTT241225_2025_12_20260307.csv"
        );
        assert_eq!(export_filename(None, date), "early_warning_course_20260307.csv");
    }

    #[test]
    fn filename_truncates_long_ids() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let long = "x".repeat(200);
        let name = export_filename(Some(&long), date);
        assert_eq!(name.len(), "early_warning_".len() + 80 + "_20260101.csv".len());
    }

    #[test]
    fn rows_are_quoted_when_needed() {
        let mut out = Vec::new();
        write_students(
            &mut out,
            &[student(7, "Lee, \"Avery\""), student(8, "Nguyễn Văn An")],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "user_id,full_name,email,risk_level,fail_risk_score,mooc_grade_percentage,mooc_completion_rate,days_since_last_activity"
        );
        assert_eq!(
            lines[1],
            "7,\"Lee, \"\"Avery\"\"\",lee@example.com,HIGH,81.5,42,10.25,"
        );
        assert!(lines[2].starts_with("8,Nguyễn Văn An,"));
        assert!(!text.contains('\r'));
    }

    #[test]
    fn whole_numbers_drop_the_fraction() {
        let mut row = student(3, "Noah Kim");
        row.fail_risk_score = 70.0;
        row.mooc_grade_percentage = 0.0;
        row.mooc_completion_rate = 33.333;
        row.days_since_last_activity = Some(12);
        let mut out = Vec::new();
        write_students(&mut out, &[row]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("3,Noah Kim,lee@example.com,HIGH,70,0,33.333,12")
        );
    }

    #[test]
    fn empty_view_still_gets_a_header() {
        let mut out = Vec::new();
        write_students(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{}\n", HEADERS.join(",")));
    }

    #[test]
    fn export_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let path = export_students(dir.path(), Some("org:code+term"), &[student(1, "A")], date)
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "early_warning_org_code_term_20260214.csv"
        );
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
