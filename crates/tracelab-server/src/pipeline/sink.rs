//! Destinations for stage envelopes.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// Closed set of envelope stage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Runtime,
    Trace,
    Analysis,
    DpAnalysis,
    Recursion,
    DpStep,
    GraphStep,
    Skipped,
    RecursionTree,
    DpTable,
    GraphTraversal,
    Issues,
    Explanation,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Classification => "classification",
            Stage::Runtime => "runtime",
            Stage::Trace => "trace",
            Stage::Analysis => "analysis",
            Stage::DpAnalysis => "dp_analysis",
            Stage::Recursion => "recursion",
            Stage::DpStep => "dp_step",
            Stage::GraphStep => "graph_step",
            Stage::Skipped => "skipped",
            Stage::RecursionTree => "recursion_tree",
            Stage::DpTable => "dp_table",
            Stage::GraphTraversal => "graph_traversal",
            Stage::Issues => "issues",
            Stage::Explanation => "explanation",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }

    /// True for the two stages that end a sequence.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }
}

/// One unit of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEnvelope {
    pub stage: Stage,
    pub payload: JsonValue,
}

impl StageEnvelope {
    pub fn new(stage: Stage, payload: JsonValue) -> Self {
        StageEnvelope { stage, payload }
    }
}

/// The receiving side went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client disconnected")]
pub struct Disconnected;

#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn send(&self, envelope: StageEnvelope) -> Result<(), Disconnected>;

    /// Polled between stages; once true the pipeline stops sending.
    fn is_disconnected(&self) -> bool;
}

/// Forwards envelopes to a channel. Disconnected once the receiver is
/// dropped, which is what happens when an SSE client goes away.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StageEnvelope>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StageEnvelope>) -> Self {
        ChannelSink { tx }
    }
}

#[async_trait]
impl EnvelopeSink for ChannelSink {
    async fn send(&self, envelope: StageEnvelope) -> Result<(), Disconnected> {
        self.tx.send(envelope).await.map_err(|_| Disconnected)
    }

    fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Keeps every envelope in memory. Never disconnects.
#[derive(Debug, Default)]
pub struct CollectingSink {
    envelopes: Mutex<Vec<StageEnvelope>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_envelopes(self) -> Vec<StageEnvelope> {
        self.envelopes
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EnvelopeSink for CollectingSink {
    async fn send(&self, envelope: StageEnvelope) -> Result<(), Disconnected> {
        self.envelopes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope);
        Ok(())
    }

    fn is_disconnected(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_names_match_serde() {
        for stage in [Stage::Classification, Stage::DpAnalysis, Stage::DpStep, Stage::GraphTraversal, Stage::Done] {
            assert_eq!(serde_json::to_value(stage).unwrap(), json!(stage.as_str()));
        }
        assert!(Stage::Error.is_terminal());
        assert!(!Stage::Issues.is_terminal());
    }

    #[tokio::test]
    async fn channel_sink_notices_dropped_receiver() {
        let (tx, rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx);
        sink.send(StageEnvelope::new(Stage::Issues, json!([])))
            .await
            .unwrap();
        assert!(!sink.is_disconnected());

        drop(rx);
        assert!(sink.is_disconnected());
        assert_eq!(
            sink.send(StageEnvelope::new(Stage::Done, json!({}))).await,
            Err(Disconnected)
        );
    }
}
