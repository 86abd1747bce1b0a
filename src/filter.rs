use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{RiskLevel, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskFilter {
    #[default]
    All,
    Only(RiskLevel),
}

impl RiskFilter {
    pub fn matches(self, level: RiskLevel) -> bool {
        match self {
            RiskFilter::All => true,
            RiskFilter::Only(wanted) => wanted == level,
        }
    }
}

impl FromStr for RiskFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(RiskFilter::All);
        }
        RiskLevel::parse(s)
            .map(RiskFilter::Only)
            .ok_or_else(|| format!("unknown risk level `{s}` (expected ALL, HIGH, MEDIUM or LOW)"))
    }
}

impl fmt::Display for RiskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFilter::All => f.write_str("ALL"),
            RiskFilter::Only(level) => write!(f, "{level}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFilter {
    #[default]
    All,
    Completed,
    NotCompleted,
}

impl CompletionFilter {
    pub fn matches(self, student: &Student) -> bool {
        match self {
            CompletionFilter::All => true,
            CompletionFilter::Completed => student.is_completed(),
            CompletionFilter::NotCompleted => !student.is_completed(),
        }
    }
}

impl FromStr for CompletionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(CompletionFilter::All),
            "completed" => Ok(CompletionFilter::Completed),
            "not_completed" | "not-completed" => Ok(CompletionFilter::NotCompleted),
            other => Err(format!(
                "unknown completion filter `{other}` (expected all, completed or not_completed)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    RiskScore,
    Name,
    Grade,
    LastActivity,
}

impl SortKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::RiskScore => "risk_score",
            SortKey::Name => "name",
            SortKey::Grade => "grade",
            SortKey::LastActivity => "last_activity",
        }
    }

    fn compare(self, a: &Student, b: &Student) -> Ordering {
        match self {
            SortKey::RiskScore => a
                .fail_risk_score
                .partial_cmp(&b.fail_risk_score)
                .unwrap_or(Ordering::Equal),
            SortKey::Grade => a
                .mooc_grade_percentage
                .partial_cmp(&b.mooc_grade_percentage)
                .unwrap_or(Ordering::Equal),
            // Never active sorts as the longest idle.
            SortKey::LastActivity => a
                .days_since_last_activity
                .unwrap_or(u32::MAX)
                .cmp(&b.days_since_last_activity.unwrap_or(u32::MAX)),
            SortKey::Name => a
                .full_name
                .to_lowercase()
                .cmp(&b.full_name.to_lowercase()),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "risk_score" | "risk" => Ok(SortKey::RiskScore),
            "name" => Ok(SortKey::Name),
            "grade" => Ok(SortKey::Grade),
            "last_activity" | "activity" => Ok(SortKey::LastActivity),
            other => Err(format!(
                "unknown sort key `{other}` (expected risk_score, name, grade or last_activity)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order `{other}` (expected asc or desc)")),
        }
    }
}

/// What the student list should currently show.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudentFilters {
    pub risk_level: RiskFilter,
    pub completion: CompletionFilter,
    pub sort_by: SortKey,
    pub order: SortOrder,
    pub search_query: String,
}

/// Partial update for [`StudentFilters`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub risk_level: Option<RiskFilter>,
    pub completion: Option<CompletionFilter>,
    pub sort_by: Option<SortKey>,
    pub order: Option<SortOrder>,
    pub search_query: Option<String>,
}

impl FilterPatch {
    pub fn risk_level(mut self, value: RiskFilter) -> Self {
        self.risk_level = Some(value);
        self
    }

    pub fn completion(mut self, value: CompletionFilter) -> Self {
        self.completion = Some(value);
        self
    }

    pub fn sort_by(mut self, value: SortKey) -> Self {
        self.sort_by = Some(value);
        self
    }

    pub fn order(mut self, value: SortOrder) -> Self {
        self.order = Some(value);
        self
    }

    pub fn search(mut self, value: impl Into<String>) -> Self {
        self.search_query = Some(value.into());
        self
    }
}

impl StudentFilters {
    /// Applies `patch` and reports whether the server-side query changed.
    pub fn merge(&mut self, patch: FilterPatch) -> bool {
        let before = self.clone();
        if let Some(value) = patch.risk_level {
            self.risk_level = value;
        }
        if let Some(value) = patch.completion {
            self.completion = value;
        }
        if let Some(value) = patch.sort_by {
            self.sort_by = value;
        }
        if let Some(value) = patch.order {
            self.order = value;
        }
        if let Some(value) = patch.search_query {
            self.search_query = value;
        }

        before.risk_level != self.risk_level
            || before.sort_by != self.sort_by
            || before.order != self.order
            || before.search_query != self.search_query
    }

    /// Query string pairs for the student list endpoint. `ALL` is sent as no filter.
    pub fn server_query(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let RiskFilter::Only(level) = self.risk_level {
            params.push(("risk_level", level.as_str().to_string()));
        }
        params.push(("sort_by", self.sort_by.as_str().to_string()));
        params.push(("order", self.order.as_str().to_string()));
        params
    }
}

pub fn matches_search(student: &Student, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    student.full_name.to_lowercase().contains(&needle)
        || student.email.to_lowercase().contains(&needle)
        || student.user_id.to_string().contains(&needle)
}

/// Filtered, ordered copy of `students`. Ties keep their input order in both directions.
pub fn apply_filters(students: &[Student], filters: &StudentFilters) -> Vec<Student> {
    let mut visible: Vec<Student> = students
        .iter()
        .filter(|s| filters.risk_level.matches(s.risk_level))
        .filter(|s| filters.completion.matches(s))
        .filter(|s| matches_search(s, &filters.search_query))
        .cloned()
        .collect();

    let key = filters.sort_by;
    match filters.order {
        SortOrder::Asc => visible.sort_by(|a, b| key.compare(a, b)),
        SortOrder::Desc => visible.sort_by(|a, b| key.compare(b, a)),
    }
    visible
}
