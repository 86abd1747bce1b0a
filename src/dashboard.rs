//! Owner of all dashboard state.
//!
//! `Dashboard` is the only writer. Readers take snapshots or subscribe to the
//! watch channel. Every fetch is tagged with a per-resource generation; a
//! completion is applied only if its generation is still the latest one
//! issued for that resource, so overlapping loads resolve to the most recent
//! request no matter which response arrives last.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::api::{AnalyticsApi, ApiError};
use crate::filter::{apply_filters, FilterPatch, StudentFilters};
use crate::models::{
    Course, CourseStatistics, DashboardSummary, H5pPerformance, H5pQuery, InterventionAction,
    InterventionReceipt, ShapExplanation, Student, StudentDetail,
};
use crate::summarize::{risk_arcs_for, ArcSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// A resource with its own lifecycle and error slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource<T> {
    pub status: LoadState,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Default for Resource<T> {
    fn default() -> Self {
        Self {
            status: LoadState::Idle,
            data: None,
            error: None,
        }
    }
}

impl<T> Resource<T> {
    fn loading(&mut self) {
        self.status = LoadState::Loading;
        self.data = None;
        self.error = None;
    }

    fn settle(&mut self, result: Result<T, ApiError>) {
        match result {
            Ok(data) => {
                self.status = LoadState::Ready;
                self.data = Some(data);
                self.error = None;
            }
            Err(e) => {
                self.status = LoadState::Failed;
                self.data = None;
                self.error = Some(e.to_string());
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub courses_status: LoadState,
    pub courses: Vec<Course>,
    pub selected_course: Option<String>,
    pub filters: StudentFilters,
    pub students_status: LoadState,
    /// Student list as the service returned it for the current query.
    pub students: Vec<Student>,
    pub statistics: Option<CourseStatistics>,
    /// Page-level error from the courses or students+statistics loads.
    pub error: Option<String>,
    pub selected_student: Option<i64>,
    pub detail: Resource<StudentDetail>,
    pub explanation: Resource<ShapExplanation>,
    pub summary: Resource<DashboardSummary>,
    pub h5p: Resource<H5pPerformance>,
}

impl DashboardState {
    pub fn visible_students(&self) -> Vec<Student> {
        apply_filters(&self.students, &self.filters)
    }

    pub fn risk_arcs(&self) -> Option<[ArcSegment; 3]> {
        self.statistics.as_ref().map(risk_arcs_for)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("no course selected")]
    NoCourseSelected,
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Default)]
struct Generations {
    courses: AtomicU64,
    students: AtomicU64,
    detail: AtomicU64,
    summary: AtomicU64,
    h5p: AtomicU64,
}

fn next_generation(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

pub struct Dashboard<A> {
    api: A,
    state: watch::Sender<DashboardState>,
    generations: Generations,
}

impl<A: AnalyticsApi> Dashboard<A> {
    pub fn new(api: A) -> Self {
        let (state, _) = watch::channel(DashboardState::default());
        Self {
            api,
            state,
            generations: Generations::default(),
        }
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    pub fn visible_students(&self) -> Vec<Student> {
        self.state.borrow().visible_students()
    }

    /// Applies `update` only if `generation` is still the latest for `counter`.
    fn apply_if_current(
        &self,
        counter: &AtomicU64,
        generation: u64,
        resource: &str,
        update: impl FnOnce(&mut DashboardState),
    ) -> bool {
        self.state.send_if_modified(|state| {
            let current = counter.load(Ordering::SeqCst);
            if current != generation {
                log::debug!(
                    "discarding stale {resource} result (generation {generation}, latest {current})"
                );
                return false;
            }
            update(state);
            true
        })
    }

    /// Loads the course list and selects the first course if nothing is selected yet.
    pub async fn mount(&self) {
        let generation = next_generation(&self.generations.courses);
        self.state.send_modify(|state| state.courses_status = LoadState::Loading);

        let result = self.api.courses().await;

        let mut auto_select = None;
        self.apply_if_current(&self.generations.courses, generation, "courses", |state| {
            match result {
                Ok(courses) => {
                    log::info!("loaded {} courses", courses.len());
                    if state.selected_course.is_none() {
                        auto_select = courses.first().map(|c| c.course_id.clone());
                    }
                    state.courses = courses;
                    state.courses_status = LoadState::Ready;
                    state.error = None;
                }
                Err(e) => {
                    log::warn!("course list failed: {e}");
                    state.courses.clear();
                    state.courses_status = LoadState::Failed;
                    state.error = Some(format!("failed to load courses: {e}"));
                }
            }
        });

        if let Some(course_id) = auto_select {
            self.select_course(course_id).await;
        }
    }

    /// Points the dashboard at `course_id` and drops everything shown for the
    /// previous course, without fetching anything.
    pub fn set_course(&self, course_id: impl Into<String>) {
        let course_id = course_id.into();
        log::info!("selecting course {course_id}");
        next_generation(&self.generations.detail);
        next_generation(&self.generations.h5p);
        self.state.send_modify(|state| {
            state.selected_course = Some(course_id);
            state.students.clear();
            state.statistics = None;
            state.error = None;
            state.selected_student = None;
            state.detail.reset();
            state.explanation.reset();
            state.summary.reset();
            state.h5p.reset();
        });
    }

    /// Switches course, dropping everything shown for the previous one before loading.
    pub async fn select_course(&self, course_id: impl Into<String>) {
        self.set_course(course_id);
        tokio::join!(self.reload_students(), self.load_summary());
    }

    /// Merges `patch` into the filters and re-queries the service if the query changed.
    pub async fn set_filters(&self, patch: FilterPatch) {
        let mut query_changed = false;
        self.state.send_modify(|state| {
            query_changed = state.filters.merge(patch);
        });
        if query_changed {
            self.reload_students().await;
        }
    }

    /// Re-issues the students+statistics pair and the summary for the current course.
    pub async fn refresh(&self) {
        tokio::join!(self.reload_students(), self.load_summary());
    }

    async fn reload_students(&self) {
        let generation = next_generation(&self.generations.students);
        let mut request = None;
        self.state.send_modify(|state| {
            if let Some(course_id) = &state.selected_course {
                state.students_status = LoadState::Loading;
                request = Some((course_id.clone(), state.filters.clone()));
            }
        });
        let Some((course_id, filters)) = request else {
            return;
        };

        let (students, statistics) = tokio::join!(
            self.api.students(&course_id, &filters),
            self.api.statistics(&course_id)
        );

        self.apply_if_current(&self.generations.students, generation, "students", |state| {
            match (students, statistics) {
                (Ok(students), Ok(statistics)) => {
                    log::info!("loaded {} students for {course_id}", students.len());
                    state.students = students;
                    state.statistics = Some(statistics);
                    state.students_status = LoadState::Ready;
                    state.error = None;
                }
                (Err(e), _) | (_, Err(e)) => {
                    log::warn!("students for {course_id} failed: {e}");
                    state.students.clear();
                    state.statistics = None;
                    state.students_status = LoadState::Failed;
                    state.error = Some(format!("failed to load students: {e}"));
                }
            }
        });
    }

    pub async fn load_summary(&self) {
        let generation = next_generation(&self.generations.summary);
        let mut course = None;
        self.state.send_modify(|state| {
            if let Some(course_id) = &state.selected_course {
                state.summary.loading();
                course = Some(course_id.clone());
            }
        });
        let Some(course_id) = course else {
            return;
        };

        let result = self.api.summary(&course_id).await;
        self.apply_if_current(&self.generations.summary, generation, "summary", |state| {
            state.summary.settle(result);
        });
    }

    /// Loads the H5P activity ranking for the current course into its own slot.
    pub async fn load_h5p(&self, query: H5pQuery) {
        let generation = next_generation(&self.generations.h5p);
        let mut course = None;
        self.state.send_modify(|state| {
            if let Some(course_id) = &state.selected_course {
                state.h5p.loading();
                course = Some(course_id.clone());
            }
        });
        let Some(course_id) = course else {
            return;
        };

        let result = self.api.h5p_low_performance(&course_id, query).await;
        if let Err(e) = &result {
            log::warn!("h5p analytics for {course_id} failed: {e}");
        }
        self.apply_if_current(&self.generations.h5p, generation, "h5p", |state| {
            state.h5p.settle(result);
        });
    }

    /// Opens the detail view for `user_id` in the current course.
    pub async fn select_student(&self, user_id: i64) {
        let generation = next_generation(&self.generations.detail);
        let mut course = None;
        self.state.send_modify(|state| {
            if let Some(course_id) = &state.selected_course {
                state.selected_student = Some(user_id);
                state.detail.loading();
                state.explanation.loading();
                course = Some(course_id.clone());
            }
        });
        let Some(course_id) = course else {
            log::warn!("cannot open student {user_id}: no course selected");
            return;
        };

        let detail = async {
            let result = self.api.student_detail(user_id, &course_id).await;
            self.apply_if_current(&self.generations.detail, generation, "detail", |state| {
                state.detail.settle(result);
            });
        };
        let explanation = async {
            let result = self.api.explanation(user_id, &course_id).await;
            self.apply_if_current(&self.generations.detail, generation, "explanation", |state| {
                state.explanation.settle(result);
            });
        };
        tokio::join!(detail, explanation);
    }

    pub fn close_student(&self) {
        next_generation(&self.generations.detail);
        self.state.send_modify(|state| {
            state.selected_student = None;
            state.detail.reset();
            state.explanation.reset();
        });
    }

    pub async fn record_intervention(
        &self,
        user_id: i64,
        action: InterventionAction,
    ) -> Result<InterventionReceipt, DashboardError> {
        let course_id = self
            .state
            .borrow()
            .selected_course
            .clone()
            .ok_or(DashboardError::NoCourseSelected)?;
        let receipt = self
            .api
            .record_intervention(user_id, &course_id, &action)
            .await?;
        log::info!("recorded `{}` for student {user_id} in {course_id}", action.action);
        Ok(receipt)
    }
}
