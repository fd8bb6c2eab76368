//! Instrumented runs that turn a program's execution into trace events.
//!
//! Each tracer installs its own [`ExecutionHook`] for exactly one
//! interpreter run; the hook is dropped on every exit path together with the
//! interpreter, so nothing persists across invocations. Reporting is bounded
//! by the [`EventRecorder`] budget while execution itself continues until
//! completion, error or timeout.
//!
//! [`ExecutionHook`]: crate::interpreter::ExecutionHook

pub mod dp;
pub mod entry;
pub mod event;
pub mod execution;
pub mod graph;
pub mod recorder;
pub mod recursion;
pub mod snapshot;

pub use entry::{resolve_entry, EntryPoint, EntrySource};
pub use event::{EventKind, GraphStepKind, TableDimension, TableIndex, TraceEvent};
pub use recorder::EventRecorder;

use serde::{Deserialize, Serialize};
use tracelab_core::{parse_program, Program, SyntaxError};

use crate::classify::Topic;
use crate::interpreter::{with_large_stack, Interpreter, InterpreterConfig, RuntimeError};

/// How a traced run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Completed,
    Error,
    TimedOut,
}

/// Outcome of one tracer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    pub events: Vec<TraceEvent>,
    pub status: TraceStatus,
    /// True when the event budget cut reporting short.
    pub truncated: bool,
    /// Captured program output.
    pub output: String,
    /// Repr of the entry function's return value (recursion tracer only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub event_budget: usize,
    pub interpreter: InterpreterConfig,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            event_budget: EventRecorder::DEFAULT_BUDGET,
            interpreter: InterpreterConfig::default(),
        }
    }
}

/// Failures that end a trace before or during the run.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("dp table not found (bottom-up DP requires 'dp')")]
    MissingTable,

    #[error("dp must be a list for bottom-up DP visualization")]
    TableNotSequence,

    #[error("Variable 'graph' not found")]
    MissingGraph,

    #[error("Graph is empty or invalid")]
    InvalidGraph,
}

impl TraceError {
    pub fn line(&self) -> Option<u32> {
        match self {
            TraceError::Syntax(err) => Some(err.line),
            TraceError::Runtime(err) => err.line(),
            _ => None,
        }
    }

    fn is_timeout(&self) -> bool {
        matches!(self, TraceError::Runtime(err) if err.is_timeout())
    }
}

/// Which tracer variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracerKind {
    /// Generic per-line trace.
    Execution,
    Recursion,
    DpBottomUp,
    DpTopDown,
    GraphBfs,
    GraphDfs,
}

impl TracerKind {
    /// Tracer selected by a topic; `None` for topics nothing can trace.
    pub fn for_topic(topic: Topic) -> Option<TracerKind> {
        match topic {
            Topic::Recursion => Some(TracerKind::Recursion),
            Topic::DpTopDown => Some(TracerKind::DpTopDown),
            Topic::DpBottomUp => Some(TracerKind::DpBottomUp),
            Topic::GraphBfs => Some(TracerKind::GraphBfs),
            Topic::GraphDfs => Some(TracerKind::GraphDfs),
            Topic::Array | Topic::String | Topic::Pointer => Some(TracerKind::Execution),
            Topic::Unknown => None,
        }
    }
}

/// What a tracer runs.
#[derive(Debug, Clone)]
pub struct TraceInput<'a> {
    pub source: &'a str,
    pub stdin: &'a str,
    /// Entry function and arguments for the recursion and top-down tracers.
    pub entry: &'a EntryPoint,
}

/// Parses and traces `input` with the chosen tracer on an enlarged stack.
pub fn run_trace(kind: TracerKind, input: &TraceInput<'_>, config: &TraceConfig) -> TraceReport {
    let outcome = with_large_stack(|| {
        let program = match parse_program(input.source) {
            Ok(program) => program,
            Err(err) => return failed(config, err.into()),
        };
        match kind {
            TracerKind::Execution => execution::trace_execution(&program, input.stdin, config),
            TracerKind::Recursion => recursion::trace_recursion(&program, input, config),
            TracerKind::DpBottomUp => dp::trace_bottom_up(&program, input.stdin, config),
            TracerKind::DpTopDown => dp::trace_top_down(&program, input, config),
            TracerKind::GraphBfs => graph::trace_bfs(&program, input.stdin, config),
            TracerKind::GraphDfs => graph::trace_dfs(&program, input.stdin, config),
        }
    });
    outcome.unwrap_or_else(|err| {
        let mut recorder = EventRecorder::new(config.event_budget);
        recorder.push_error(format!("failed to start interpreter thread: {}", err), None);
        TraceReport {
            events: recorder.into_events(),
            status: TraceStatus::Error,
            truncated: false,
            output: String::new(),
            result: None,
        }
    })
}

/// Fresh interpreter for one traced run.
pub(crate) fn interpreter(stdin: &str, config: &TraceConfig) -> Interpreter {
    Interpreter::new(config.interpreter.clone()).with_stdin(stdin)
}

/// Runs the module body without observing it.
pub(crate) fn run_unobserved(
    interp: &mut Interpreter,
    program: &Program,
) -> Result<(), TraceError> {
    interp
        .run_module(program, &mut crate::interpreter::NoopHook)
        .map_err(TraceError::from)
}

/// Builds the report for a finished run, appending the terminal error event
/// when the run failed.
pub(crate) fn conclude(
    mut recorder: EventRecorder,
    interp: &Interpreter,
    outcome: Result<Option<String>, TraceError>,
) -> TraceReport {
    let (status, result) = match outcome {
        Ok(result) => (TraceStatus::Completed, result),
        Err(err) => {
            recorder.push_error(err.to_string(), err.line());
            let status = if err.is_timeout() {
                TraceStatus::TimedOut
            } else {
                TraceStatus::Error
            };
            (status, None)
        }
    };
    TraceReport {
        truncated: recorder.is_truncated(),
        events: recorder.into_events(),
        status,
        output: interp.output().to_string(),
        result,
    }
}

/// Report for a trace that failed before producing any events.
pub(crate) fn failed(config: &TraceConfig, err: TraceError) -> TraceReport {
    let interp = Interpreter::new(config.interpreter.clone());
    conclude(EventRecorder::new(config.event_budget), &interp, Err(err))
}
