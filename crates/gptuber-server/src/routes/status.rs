use axum::extract::State;
use axum::Json;
use gptuber_core::scheduler::SchedulerStatus;

use crate::state::AppState;

/// GET /api/status: queue depth by source and whether an action is playing.
pub async fn get_status(State(app): State<AppState>) -> Json<SchedulerStatus> {
    Json(app.scheduler.status())
}
