// Read-only catalog views: the week-by-week course, theory lessons, and the
// single-lesson loader used by the player screen.

mod lesson;

pub use lesson::{LessonDetail, LessonLoader, LoadOutcome};

use crate::api_client::{SavoaClient, TheoryLesson, WeekLesson, WeekResponse};
use crate::error::ApiError;
use crate::progress::ProgressMap;

/// Weeks without an `order_index` go last.
const MISSING_WEEK_ORDER: i64 = 999;

#[derive(Debug, Clone, PartialEq)]
pub struct CourseWeek {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_id: Option<String>,
    pub order_index: i64,
    pub lessons: Vec<CourseLesson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseLesson {
    pub lesson: WeekLesson,
    /// From the local progress map.
    pub completed: bool,
}

/// Order weeks and their lessons and attach local completion.
pub fn build_course(weeks: Vec<WeekResponse>, progress: &ProgressMap) -> Vec<CourseWeek> {
    let mut weeks: Vec<CourseWeek> = weeks
        .into_iter()
        .map(|w| {
            let mut lessons = w.lessons;
            lessons.sort_by_key(|l| l.day_order.unwrap_or(0));
            CourseWeek {
                order_index: w.order_index.unwrap_or(MISSING_WEEK_ORDER),
                id: w.id,
                title: w.title,
                description: w.description,
                image_id: w.image_id,
                lessons: lessons
                    .into_iter()
                    .map(|lesson| CourseLesson {
                        completed: progress.get(&lesson.id).is_some_and(|r| r.completed),
                        lesson,
                    })
                    .collect(),
            }
        })
        .collect();
    weeks.sort_by_key(|w| w.order_index);
    weeks
}

/// Active theory lessons in display order.
pub fn active_theory_lessons(mut lessons: Vec<TheoryLesson>) -> Vec<TheoryLesson> {
    lessons.retain(|l| l.is_active != Some(false));
    lessons.sort_by_key(|l| l.order_index.unwrap_or(0));
    lessons
}

#[tracing::instrument(level = "debug", skip(client, progress))]
pub async fn fetch_course(
    client: &SavoaClient,
    progress: &ProgressMap,
) -> Result<Vec<CourseWeek>, ApiError> {
    let weeks = client.get_course_weeks().await?;
    tracing::debug!(weeks = weeks.len(), "course weeks fetched");
    Ok(build_course(weeks, progress))
}

#[tracing::instrument(level = "debug", skip(client))]
pub async fn fetch_theory(client: &SavoaClient) -> Result<Vec<TheoryLesson>, ApiError> {
    Ok(active_theory_lessons(client.get_theory_lessons().await?))
}
