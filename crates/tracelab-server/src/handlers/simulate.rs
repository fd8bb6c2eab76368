//! Single-tracer handler.

use axum::extract::State;
use axum::Json;
use tracelab_check::tracer::resolve_entry;
use tracelab_check::{build_recursion_tree, final_table, traversal_order, TracerKind};

use crate::error::ApiError;
use crate::schema::common::{parse_topic, validate_code};
use crate::schema::simulate::{Artifact, SimulateRequest, SimulateResponse};
use crate::state::AppState;

/// Runs the tracer for one topic and returns its events and artifact.
///
/// `POST /simulate`
pub async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SimulateResponse>, ApiError> {
    validate_code(&req.code)?;
    let topic = match parse_topic(req.topic.as_deref())? {
        Some(topic) => topic,
        None => state.pipeline.classify(&req.code).topic,
    };
    let tracer = TracerKind::for_topic(topic).ok_or_else(|| {
        ApiError::BadRequest(format!("no tracer available for topic '{}'", topic))
    })?;

    let entry = resolve_entry(&req.code, req.entry_function.as_deref(), req.entry_args);
    let report = state
        .pipeline
        .trace(tracer, &req.code, &req.input, &entry)
        .await?;

    let artifact = match tracer {
        TracerKind::Execution => None,
        TracerKind::Recursion => Some(Artifact::RecursionTree {
            tree: build_recursion_tree(&report.events),
        }),
        TracerKind::DpBottomUp | TracerKind::DpTopDown => Some(Artifact::DpTable {
            table: final_table(&report.events),
        }),
        TracerKind::GraphBfs | TracerKind::GraphDfs => Some(Artifact::GraphTraversal {
            order: traversal_order(&report.events),
        }),
    };

    Ok(Json(SimulateResponse {
        topic,
        tracer,
        entry,
        report,
        artifact,
    }))
}
