//! The streaming orchestrator.
//!
//! A submission moves through `classification`, runtime-or-trace, static
//! analysis, structure-build, `issues`, `explanation` and `done`. After every
//! envelope the sink is polled; once the client is gone the pipeline returns
//! without sending anything else. Anything unexpected, a panicking
//! collaborator included, becomes a single `error` envelope that ends the
//! sequence.

pub mod sink;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use tracelab_check::tracer::{resolve_entry, run_trace, EntryPoint, TraceConfig, TraceInput};
use tracelab_check::{
    analyze, build_recursion_tree, final_table, traversal_order, ClassificationResult,
    Classifier, HeuristicClassifier, Issue, IssueScanner, RecursionTreeNode, RuleScanner,
    StaticAnalysis, Topic, TraceReport, TracerKind,
};

use crate::config::ServerConfig;
use crate::explain::{explain_prompt, explainer_from_config, ExplainError, Explainer};
use crate::sandbox::{ExecutionRecord, Runner, SandboxCommand, SandboxRunner};

pub use sink::{ChannelSink, CollectingSink, Disconnected, EnvelopeSink, Stage, StageEnvelope};

/// One program to analyze. Immutable once accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub code: String,
    /// Text fed to the program's stdin.
    #[serde(default)]
    pub input: String,
    /// Replaces the classified topic when set.
    #[serde(default)]
    pub topic: Option<Topic>,
    #[serde(default)]
    pub entry_function: Option<String>,
    #[serde(default)]
    pub entry_args: Option<Vec<JsonValue>>,
    /// Ask for a short explanation.
    #[serde(default)]
    pub concise: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("client disconnected")]
    Cancelled,

    #[error("trace task failed: {0}")]
    TaskFailed(String),

    #[error("pipeline stage panicked: {0}")]
    Panicked(String),

    #[error("failed to encode {stage} payload: {source}")]
    Encode {
        stage: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Payload of the `classification` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStage {
    /// The topic that drives tracer selection.
    pub topic: Topic,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub topic_overridden: bool,
    /// Entry function and arguments the recursion tracers will use.
    pub entry: EntryPoint,
}

/// Aggregate of every stage; the `done` payload and the synchronous
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub topic: Topic,
    pub classification: ClassificationStage,
    pub runtime: Option<ExecutionRecord>,
    pub trace: Option<TraceReport>,
    /// Indexing or DP report for the topics that have one.
    pub analysis: Option<StaticAnalysis>,
    pub recursion_tree: Option<RecursionTreeNode>,
    pub dp_table: Option<JsonValue>,
    pub graph: Option<Vec<JsonValue>>,
    pub issues: Vec<Issue>,
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_error: Option<String>,
    /// Why no tracer ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl Summary {
    fn new(classification: ClassificationStage) -> Self {
        Summary {
            topic: classification.topic,
            classification,
            runtime: None,
            trace: None,
            analysis: None,
            recursion_tree: None,
            dp_table: None,
            graph: None,
            issues: Vec::new(),
            explanation: None,
            explanation_error: None,
            skipped: None,
        }
    }
}

/// Sends envelopes and polls for disconnection after each one.
struct Emitter<'a> {
    sink: &'a dyn EnvelopeSink,
}

impl Emitter<'_> {
    async fn emit<T>(&self, stage: Stage, payload: &T) -> Result<(), PipelineError>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.send(stage, payload).await?;
        if self.sink.is_disconnected() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    async fn send<T>(&self, stage: Stage, payload: &T) -> Result<(), PipelineError>
    where
        T: Serialize + ?Sized + Sync,
    {
        let payload = serde_json::to_value(payload).map_err(|source| PipelineError::Encode {
            stage: stage.as_str(),
            source,
        })?;
        self.sink
            .send(StageEnvelope::new(stage, payload))
            .await
            .map_err(|_| PipelineError::Cancelled)
    }
}

/// Per-request orchestrator over shared, immutable collaborators.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    scanner: Arc<dyn IssueScanner>,
    explainer: Arc<dyn Explainer>,
    runner: Arc<dyn Runner>,
    config: TraceConfig,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        scanner: Arc<dyn IssueScanner>,
        explainer: Arc<dyn Explainer>,
        runner: Arc<dyn Runner>,
        config: TraceConfig,
    ) -> Self {
        Pipeline {
            classifier,
            scanner,
            explainer,
            runner,
            config,
        }
    }

    /// Default collaborators: heuristic classifier, rule scanner, this
    /// binary as the sandbox child, and the configured explainer.
    pub fn from_config(config: &ServerConfig) -> std::io::Result<Self> {
        let runner = SandboxRunner::new(SandboxCommand::current_exe()?, config.run_timeout);
        Ok(Pipeline::new(
            Arc::new(HeuristicClassifier),
            Arc::new(RuleScanner),
            explainer_from_config(&config.llm),
            Arc::new(runner),
            config.trace_config(),
        ))
    }

    pub fn classify(&self, code: &str) -> ClassificationResult {
        self.classifier.classify(code)
    }

    pub fn scan(&self, code: &str) -> Vec<Issue> {
        self.scanner.scan(code)
    }

    /// Static analysis for `topic`, or for the classified topic when unset.
    pub fn analyze(&self, code: &str, topic: Option<Topic>) -> (Topic, Option<StaticAnalysis>) {
        let topic = topic.unwrap_or_else(|| self.classifier.classify(code).topic);
        (topic, analyze(code, topic))
    }

    pub async fn execute(&self, code: &str, input: &str) -> ExecutionRecord {
        self.runner.run(code, input).await
    }

    pub async fn explain(&self, prompt: &str) -> Result<String, ExplainError> {
        self.explainer.explain(prompt).await
    }

    /// Runs one tracer on the blocking pool.
    pub async fn trace(
        &self,
        kind: TracerKind,
        code: &str,
        input: &str,
        entry: &EntryPoint,
    ) -> Result<TraceReport, PipelineError> {
        let code = code.to_string();
        let input = input.to_string();
        let entry = entry.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let trace_input = TraceInput {
                source: &code,
                stdin: &input,
                entry: &entry,
            };
            run_trace(kind, &trace_input, &config)
        })
        .await
        .map_err(|err| PipelineError::TaskFailed(err.to_string()))
    }

    /// Streams every stage of `submission` into `sink`. The sequence ends in
    /// `done` or `error`, unless the client disconnects first.
    pub async fn run(&self, submission: Submission, sink: &dyn EnvelopeSink) {
        let id = Uuid::new_v4();
        tracing::info!(%id, bytes = submission.code.len(), "processing submission");

        match self.guarded_stages(&submission, sink, id).await {
            Ok(summary) => tracing::info!(%id, topic = %summary.topic, "submission done"),
            Err(PipelineError::Cancelled) => {
                tracing::info!(%id, "client disconnected, stopping pipeline")
            }
            Err(err) => {
                tracing::warn!(%id, "pipeline failed: {}", err);
                if !sink.is_disconnected() {
                    let envelope =
                        StageEnvelope::new(Stage::Error, json!({ "error": err.to_string() }));
                    if sink.send(envelope).await.is_err() {
                        tracing::debug!(%id, "client gone before error envelope");
                    }
                }
            }
        }
    }

    /// The synchronous protocol: every stage, collected into one summary.
    pub async fn process(&self, submission: Submission) -> Result<Summary, PipelineError> {
        let id = Uuid::new_v4();
        tracing::info!(%id, bytes = submission.code.len(), "processing submission (sync)");
        self.guarded_stages(&submission, &CollectingSink::new(), id)
            .await
    }

    /// [`Self::run_stages`] with panics turned into [`PipelineError::Panicked`].
    async fn guarded_stages(
        &self,
        submission: &Submission,
        sink: &dyn EnvelopeSink,
        id: Uuid,
    ) -> Result<Summary, PipelineError> {
        AssertUnwindSafe(self.run_stages(submission, sink, id))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(PipelineError::Panicked(panic_message(payload.as_ref())))
            })
    }

    async fn run_stages(
        &self,
        submission: &Submission,
        sink: &dyn EnvelopeSink,
        id: Uuid,
    ) -> Result<Summary, PipelineError> {
        let out = Emitter { sink };
        let code = submission.code.as_str();

        let classified = self.classifier.classify(code);
        let topic = submission.topic.unwrap_or(classified.topic);
        let entry = resolve_entry(
            code,
            submission.entry_function.as_deref(),
            submission.entry_args.clone(),
        );
        let classification = ClassificationStage {
            topic,
            confidence: classified.confidence,
            reasons: classified.reasons,
            topic_overridden: submission.topic.is_some(),
            entry,
        };
        tracing::debug!(%id, %topic, confidence = classification.confidence, "classified");
        out.emit(Stage::Classification, &classification).await?;

        let mut summary = Summary::new(classification);
        let kind = TracerKind::for_topic(topic);
        let analysis = analyze(code, topic);

        match kind {
            None => {
                let reason = format!("no tracer available for topic '{}'", topic);
                out.emit(Stage::Skipped, &json!({ "reason": reason })).await?;
                summary.skipped = Some(reason);
            }
            Some(kind) => {
                if kind == TracerKind::Execution {
                    let record = self.runner.run(code, &submission.input).await;
                    tracing::debug!(%id, timed_out = record.timed_out, "sandbox finished");
                    out.emit(Stage::Runtime, &record).await?;
                    summary.runtime = Some(record);
                }

                let report = self
                    .trace(kind, code, &submission.input, &summary.classification.entry)
                    .await?;
                tracing::debug!(
                    %id,
                    events = report.events.len(),
                    status = ?report.status,
                    "trace finished"
                );

                match kind {
                    TracerKind::Execution => {
                        out.emit(Stage::Trace, &report).await?;
                        if let Some(analysis) = &analysis {
                            out.emit(Stage::Analysis, analysis).await?;
                        }
                    }
                    TracerKind::Recursion => out.emit(Stage::Recursion, &report).await?,
                    TracerKind::DpBottomUp | TracerKind::DpTopDown => {
                        if let Some(analysis) = &analysis {
                            out.emit(Stage::DpAnalysis, analysis).await?;
                        }
                        for event in &report.events {
                            out.emit(Stage::DpStep, event).await?;
                        }
                    }
                    TracerKind::GraphBfs | TracerKind::GraphDfs => {
                        for event in &report.events {
                            out.emit(Stage::GraphStep, event).await?;
                        }
                    }
                }

                match kind {
                    TracerKind::Execution => {}
                    TracerKind::Recursion => {
                        let tree = build_recursion_tree(&report.events);
                        out.emit(Stage::RecursionTree, &json!({ "tree": tree })).await?;
                        summary.recursion_tree = tree;
                    }
                    TracerKind::DpBottomUp | TracerKind::DpTopDown => {
                        let table = final_table(&report.events);
                        out.emit(Stage::DpTable, &json!({ "table": table })).await?;
                        summary.dp_table = table;
                    }
                    TracerKind::GraphBfs | TracerKind::GraphDfs => {
                        let order = traversal_order(&report.events);
                        out.emit(Stage::GraphTraversal, &json!({ "order": order })).await?;
                        summary.graph = Some(order);
                    }
                }
                summary.trace = Some(report);
                summary.analysis = analysis;
            }
        }

        summary.issues = self.scanner.scan(code);
        tracing::debug!(%id, issues = summary.issues.len(), "scanned");
        out.emit(Stage::Issues, &summary.issues).await?;

        let analysis = serde_json::to_value(&summary).map_err(|source| PipelineError::Encode {
            stage: Stage::Explanation.as_str(),
            source,
        })?;
        let prompt = explain_prompt(code, &analysis, submission.concise);
        match self.explainer.explain(&prompt).await {
            Ok(text) => {
                out.emit(Stage::Explanation, &json!({ "explanation": text }))
                    .await?;
                summary.explanation = Some(text);
            }
            Err(err) => {
                tracing::warn!(%id, "explanation unavailable: {}", err);
                let error = err.to_string();
                out.emit(
                    Stage::Explanation,
                    &json!({ "explanation": null, "error": error }),
                )
                .await?;
                summary.explanation_error = Some(error);
            }
        }

        out.send(Stage::Done, &summary).await?;
        Ok(summary)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
