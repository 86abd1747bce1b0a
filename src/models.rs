use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::normalize::{
    lenient_f64, lenient_i64, lenient_opt_f64, lenient_opt_u32, lenient_string, lenient_u32,
};
use crate::risk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Some(RiskLevel::High),
            "MEDIUM" => Some(RiskLevel::Medium),
            "LOW" => Some(RiskLevel::Low),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn lenient_risk_level<'de, D>(deserializer: D) -> Result<Option<RiskLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(RiskLevel::parse))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    NotPassed,
    InProgress,
}

fn lenient_completion<'de, D>(deserializer: D) -> Result<Option<CompletionStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(deserialize_with = "lenient_string")]
    pub course_id: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub student_count: u32,
}

/// Wire shape of a student row before the risk level is settled.
#[derive(Deserialize)]
struct StudentRecord {
    #[serde(default, deserialize_with = "lenient_i64")]
    user_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    full_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    email: String,
    #[serde(default, deserialize_with = "lenient_risk_level")]
    risk_level: Option<RiskLevel>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fail_risk_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    mooc_grade_percentage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    mooc_completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_opt_u32")]
    days_since_last_activity: Option<u32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    video_completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    quiz_avg_score: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    discussion_total_interactions: u32,
    #[serde(default, deserialize_with = "lenient_completion")]
    completion_status: Option<CompletionStatus>,
}

impl From<StudentRecord> for Student {
    fn from(record: StudentRecord) -> Self {
        let risk_level = record
            .risk_level
            .unwrap_or_else(|| risk::classify(record.fail_risk_score));
        Student {
            user_id: record.user_id,
            full_name: record.full_name,
            email: record.email,
            risk_level,
            fail_risk_score: record.fail_risk_score,
            mooc_grade_percentage: record.mooc_grade_percentage,
            mooc_completion_rate: record.mooc_completion_rate,
            days_since_last_activity: record.days_since_last_activity,
            video_completion_rate: record.video_completion_rate,
            quiz_avg_score: record.quiz_avg_score,
            discussion_total_interactions: record.discussion_total_interactions,
            completion_status: record.completion_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StudentRecord")]
pub struct Student {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    pub risk_level: RiskLevel,
    pub fail_risk_score: f64,
    pub mooc_grade_percentage: f64,
    pub mooc_completion_rate: f64,
    pub days_since_last_activity: Option<u32>,
    pub video_completion_rate: f64,
    pub quiz_avg_score: f64,
    pub discussion_total_interactions: u32,
    pub completion_status: Option<CompletionStatus>,
}

impl Student {
    pub fn is_completed(&self) -> bool {
        self.completion_status == Some(CompletionStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionSuggestion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    pub priority: Priority,
}

/// Everything the detail view shows for one (student, course) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDetail {
    #[serde(flatten)]
    pub student: Student,
    #[serde(default, deserialize_with = "lenient_string")]
    pub course_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub mssv: Option<String>,
    #[serde(default)]
    pub class_code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub enrollment_mode: Option<String>,
    #[serde(default)]
    pub enrollment_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub weeks_since_enrollment: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub progress_percent: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub completed_blocks: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_blocks: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub active_days: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub video_watch_rate: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub quiz_attempts: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quiz_completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub discussion_threads_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub discussion_comments_count: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h5p_overall_percentage: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub dropout_risk_score: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub predicted_at: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<InterventionSuggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseStatistics {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_students: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_risk_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_grade: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub high_risk_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub medium_risk_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub low_risk_count: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high_risk_percentage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub medium_risk_percentage: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low_risk_percentage: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub inactive_students: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub failing_students: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub completed_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub not_passed_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub in_progress_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodayTask {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_risk_level")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fail_risk_score: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: String,
    pub urgency: Urgency,
}

impl TodayTask {
    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
            .unwrap_or_else(|| risk::classify(self.fail_risk_score))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    RiskIncrease,
    Inactive,
    LowProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentAlert {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub full_name: String,
    pub alert_type: AlertType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickStats {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub new_high_risk_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub inactive_students_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub intervention_pending: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    #[serde(default, deserialize_with = "lenient_string")]
    pub course_id: String,
    #[serde(default)]
    pub today_tasks: Vec<TodayTask>,
    #[serde(default)]
    pub recent_alerts: Vec<RecentAlert>,
    #[serde(default)]
    pub quick_stats: QuickStats,
}

/// Raw value of the feature behind an explanation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) if v.fract() == 0.0 => write!(f, "{}", *v as i64),
            FeatureValue::Number(v) => write!(f, "{v:.2}"),
            FeatureValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapFactor {
    #[serde(default, deserialize_with = "lenient_string")]
    pub feature: String,
    #[serde(default, alias = "label_vi", deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub shap_value: f64,
    #[serde(default)]
    pub feature_value: Option<FeatureValue>,
}

impl ShapFactor {
    pub fn display_value(&self) -> String {
        match &self.feature_value {
            Some(value) => value.to_string(),
            None => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapExplanation {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub base_value: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fail_risk_score: f64,
    #[serde(default)]
    pub risk_factors: Vec<ShapFactor>,
    #[serde(default)]
    pub protective_factors: Vec<ShapFactor>,
}

/// One H5P activity with its class-wide completion and score figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H5pContent {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub content_id: i64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content_title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub folder_name: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_students: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub completed_students: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub students_not_max_score: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub not_max_rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_score: f64,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub avg_score_completed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_score: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_time_spent_minutes: f64,
    #[serde(default, deserialize_with = "lenient_risk_level")]
    pub difficulty_level: Option<RiskLevel>,
    #[serde(default)]
    pub needs_attention: Option<bool>,
}

impl H5pContent {
    pub fn difficulty(&self) -> RiskLevel {
        self.difficulty_level.unwrap_or_else(|| {
            risk::h5p_difficulty(self.not_max_rate, self.avg_score, self.completion_rate)
        })
    }

    pub fn needs_attention(&self) -> bool {
        self.needs_attention.unwrap_or_else(|| {
            risk::h5p_needs_attention(self.not_max_rate, self.avg_score, self.completion_rate)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct H5pStatistics {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_contents_analyzed: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_completion_rate: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_score_all: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub high_difficulty_count: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub needs_attention_count: u32,
}

/// H5P activities of a course, hardest first as ranked by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct H5pPerformance {
    #[serde(default, deserialize_with = "lenient_string")]
    pub course_id: String,
    #[serde(default)]
    pub statistics: H5pStatistics,
    #[serde(default)]
    pub contents: Vec<H5pContent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H5pQuery {
    pub limit: u32,
    pub min_students: u32,
}

impl Default for H5pQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            min_students: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterventionAction {
    pub action: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterventionReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn student_risk_level_falls_back_to_score() {
        let student: Student = serde_json::from_value(json!({
            "user_id": "17",
            "full_name": "Avery Lee",
            "email": "avery@example.com",
            "risk_level": "bogus",
            "fail_risk_score": "72.5",
        }))
        .unwrap();
        assert_eq!(student.user_id, 17);
        assert_eq!(student.risk_level, RiskLevel::High);
        assert_eq!(student.days_since_last_activity, None);
    }

    #[test]
    fn student_keeps_server_risk_level() {
        let student: Student = serde_json::from_value(json!({
            "user_id": 3,
            "risk_level": "low",
            "fail_risk_score": 95,
            "completion_status": "completed",
            "days_since_last_activity": 4,
        }))
        .unwrap();
        assert_eq!(student.risk_level, RiskLevel::Low);
        assert!(student.is_completed());
        assert_eq!(student.days_since_last_activity, Some(4));
    }

    #[test]
    fn unknown_completion_status_is_dropped() {
        let student: Student =
            serde_json::from_value(json!({"user_id": 1, "completion_status": "paused"})).unwrap();
        assert_eq!(student.completion_status, None);
    }

    #[test]
    fn detail_flattens_summary_fields() {
        let detail: StudentDetail = serde_json::from_value(json!({
            "user_id": 9,
            "course_id": "course-v1:UEL+NLTT+2025",
            "full_name": "Kiara Patel",
            "fail_risk_score": 41.0,
            "risk_level": "MEDIUM",
            "quiz_attempts": "3",
            "suggestions": [
                {"icon": "!", "title": "Call", "description": "Reach out", "priority": "high"}
            ]
        }))
        .unwrap();
        assert_eq!(detail.student.user_id, 9);
        assert_eq!(detail.student.risk_level, RiskLevel::Medium);
        assert_eq!(detail.quiz_attempts, 3);
        assert_eq!(detail.suggestions[0].priority, Priority::High);
    }

    #[test]
    fn statistics_absorb_string_and_null_fields() {
        let stats: CourseStatistics = serde_json::from_value(json!({
            "total_students": "10",
            "avg_risk_score": null,
            "high_risk_count": 3,
            "medium_risk_count": "4",
            "low_risk_count": 3.0,
            "avg_grade": "NaN",
        }))
        .unwrap();
        assert_eq!(stats.total_students, 10);
        assert_eq!(stats.avg_risk_score, 0.0);
        assert_eq!(stats.medium_risk_count, 4);
        assert_eq!(stats.low_risk_count, 3);
        assert_eq!(stats.avg_grade, 0.0);
    }

    #[test]
    fn h5p_contents_decode_leniently() {
        let performance: H5pPerformance = serde_json::from_value(json!({
            "success": true,
            "course_id": "c1",
            "statistics": {"total_contents_analyzed": 2, "needs_attention_count": "1"},
            "contents": [
                {
                    "content_id": 41,
                    "content_title": "Unit 3 quiz",
                    "total_students": "25",
                    "not_max_rate": "88.5",
                    "completion_rate": 92.0,
                    "avg_score": 74.25,
                    "avg_score_completed": null,
                    "difficulty_level": "HIGH",
                    "needs_attention": true
                },
                {"content_id": "42", "not_max_rate": 10, "completion_rate": 95, "avg_score": 91}
            ]
        }))
        .unwrap();
        assert_eq!(performance.statistics.needs_attention_count, 1);
        let first = &performance.contents[0];
        assert_eq!(first.total_students, 25);
        assert_eq!(first.not_max_rate, 88.5);
        assert_eq!(first.avg_score_completed, None);
        assert_eq!(first.difficulty(), RiskLevel::High);
        assert!(first.needs_attention());

        let second = &performance.contents[1];
        assert_eq!(second.content_id, 42);
        assert_eq!(second.difficulty(), RiskLevel::Low);
        assert!(!second.needs_attention());
    }

    #[test]
    fn feature_values_format_like_the_dashboard() {
        assert_eq!(FeatureValue::Number(4.0).to_string(), "4");
        assert_eq!(FeatureValue::Number(0.456).to_string(), "0.46");
        assert_eq!(FeatureValue::Text("yes".into()).to_string(), "yes");

        let factor: ShapFactor = serde_json::from_value(json!({
            "feature": "days_since_last_activity",
            "label_vi": "Days inactive",
            "shap_value": 0.12,
            "feature_value": null,
        }))
        .unwrap();
        assert_eq!(factor.label, "Days inactive");
        assert_eq!(factor.display_value(), "N/A");
    }
}
