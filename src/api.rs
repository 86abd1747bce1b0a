//! Client for the remote analytics service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Config;
use crate::filter::StudentFilters;
use crate::models::{
    Course, CourseStatistics, DashboardSummary, H5pPerformance, H5pQuery, InterventionAction,
    InterventionReceipt, ShapExplanation, Student, StudentDetail,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn health(&self) -> Result<Value, ApiError>;
    async fn courses(&self) -> Result<Vec<Course>, ApiError>;
    async fn students(
        &self,
        course_id: &str,
        filters: &StudentFilters,
    ) -> Result<Vec<Student>, ApiError>;
    async fn student_detail(&self, user_id: i64, course_id: &str)
        -> Result<StudentDetail, ApiError>;
    async fn statistics(&self, course_id: &str) -> Result<CourseStatistics, ApiError>;
    async fn explanation(&self, user_id: i64, course_id: &str)
        -> Result<ShapExplanation, ApiError>;
    async fn summary(&self, course_id: &str) -> Result<DashboardSummary, ApiError>;
    async fn h5p_low_performance(
        &self,
        course_id: &str,
        query: H5pQuery,
    ) -> Result<H5pPerformance, ApiError>;
    async fn record_intervention(
        &self,
        user_id: i64,
        course_id: &str,
        action: &InterventionAction,
    ) -> Result<InterventionReceipt, ApiError>;
}

#[derive(Deserialize)]
struct CoursesResponse {
    #[serde(default)]
    courses: Vec<Course>,
}

#[derive(Deserialize)]
struct StudentsResponse {
    #[serde(default)]
    students: Vec<Student>,
}

#[derive(Deserialize)]
struct StatisticsResponse {
    #[serde(default)]
    statistics: CourseStatistics,
}

/// Percent-encodes a composite id such as `course-v1:ORG+CODE+TERM` for use as one path segment.
pub fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Human-readable message for a non-success response.
pub fn status_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["error", "message"]
                .iter()
                .find_map(|key| json.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {status}"))
}

pub struct HttpAnalyticsClient {
    client: Client,
    base: String,
}

impl HttpAnalyticsClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn decode<T: DeserializeOwned>(
        method: &str,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = status_message(status.as_u16(), &body);
            log::warn!("{method} {path} -> {status}: {message}");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        log::debug!("GET {path}");
        let response = self.client.get(self.url(path)).query(query).send().await?;
        Self::decode("GET", path, response).await
    }
}

#[async_trait]
impl AnalyticsApi for HttpAnalyticsClient {
    async fn health(&self) -> Result<Value, ApiError> {
        self.get("/health", &[]).await
    }

    async fn courses(&self) -> Result<Vec<Course>, ApiError> {
        let response: CoursesResponse = self.get("/courses", &[]).await?;
        Ok(response.courses)
    }

    async fn students(
        &self,
        course_id: &str,
        filters: &StudentFilters,
    ) -> Result<Vec<Student>, ApiError> {
        let path = format!("/students/{}", encode_segment(course_id));
        let response: StudentsResponse = self.get(&path, &filters.server_query()).await?;
        Ok(response.students)
    }

    async fn student_detail(
        &self,
        user_id: i64,
        course_id: &str,
    ) -> Result<StudentDetail, ApiError> {
        let path = format!("/student/{user_id}/{}", encode_segment(course_id));
        self.get(&path, &[]).await
    }

    async fn statistics(&self, course_id: &str) -> Result<CourseStatistics, ApiError> {
        let path = format!("/statistics/{}", encode_segment(course_id));
        let response: StatisticsResponse = self.get(&path, &[]).await?;
        Ok(response.statistics)
    }

    async fn explanation(
        &self,
        user_id: i64,
        course_id: &str,
    ) -> Result<ShapExplanation, ApiError> {
        let path = format!("/student/{user_id}/{}/explain", encode_segment(course_id));
        self.get(&path, &[]).await
    }

    async fn summary(&self, course_id: &str) -> Result<DashboardSummary, ApiError> {
        let path = format!("/dashboard-summary/{}", encode_segment(course_id));
        self.get(&path, &[]).await
    }

    async fn h5p_low_performance(
        &self,
        course_id: &str,
        query: H5pQuery,
    ) -> Result<H5pPerformance, ApiError> {
        let path = format!("/h5p-analytics/{}/low-performance", encode_segment(course_id));
        let params = [
            ("limit", query.limit.to_string()),
            ("min_students", query.min_students.to_string()),
        ];
        self.get(&path, &params).await
    }

    async fn record_intervention(
        &self,
        user_id: i64,
        course_id: &str,
        action: &InterventionAction,
    ) -> Result<InterventionReceipt, ApiError> {
        let path = format!("/interventions/{user_id}/{}", encode_segment(course_id));
        log::debug!("POST {path}");
        // Older backends read the action from `type`.
        let body = serde_json::json!({
            "action": action.action,
            "type": action.action,
            "notes": action.notes,
        });
        let response = self.client.post(self.url(&path)).json(&body).send().await?;
        Self::decode("POST", &path, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_course_ids_are_encoded() {
        assert_eq!(
            encode_segment("course-v1:UEL+NLTT241225+2025_12"),
            "course-v1%3AUEL%2BNLTT241225%2B2025_12"
        );
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn status_message_prefers_body_error() {
        assert_eq!(
            status_message(404, r#"{"error": "Student not found"}"#),
            "Student not found"
        );
        assert_eq!(
            status_message(503, r#"{"message": "Model service not available"}"#),
            "Model service not available"
        );
    }

    #[test]
    fn status_message_falls_back_to_code() {
        assert_eq!(
            status_message(500, "<html>oops</html>"),
            "Request failed with status code 500"
        );
        assert_eq!(
            status_message(502, r#"{"error": ""}"#),
            "Request failed with status code 502"
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let config = Config {
            api_base_url: "http://analytics.test/api/".to_string(),
            ..Config::default()
        };
        let client = HttpAnalyticsClient::new(&config).unwrap();
        assert_eq!(client.url("/courses"), "http://analytics.test/api/courses");
    }

    #[test]
    fn envelopes_decode_leniently() {
        let stats: StatisticsResponse = serde_json::from_str(
            r#"{"course_id": "c1", "statistics": {"total_students": "10", "high_risk_count": 3}}"#,
        )
        .unwrap();
        assert_eq!(stats.statistics.total_students, 10);

        let courses: CoursesResponse = serde_json::from_str(
            r#"{"courses": [{"course_id": "c1", "student_count": "10"}], "total": 1}"#,
        )
        .unwrap();
        assert_eq!(courses.courses[0].student_count, 10);
    }
}
