//! Generic line tracer.
//!
//! Emits one `line_update` per executed statement whose effect changed the
//! frame's bindings. Changes are attributed to the statement that produced
//! them: the diff observed when line B is about to run is reported against
//! the previously executed line A of the same frame.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracelab_core::Program;

use super::event::EventKind;
use super::recorder::EventRecorder;
use super::snapshot::{bindings_snapshot, changed_bindings};
use super::{conclude, interpreter, TraceConfig, TraceReport};
use crate::interpreter::{ExecutionHook, FrameView, Value, MODULE_FRAME_ID};

struct FrameState {
    function: String,
    line: u32,
    bindings: Map<String, JsonValue>,
}

pub(crate) struct LineTracer {
    recorder: EventRecorder,
    frames: HashMap<u64, FrameState>,
}

impl LineTracer {
    pub(crate) fn new(budget: usize) -> Self {
        LineTracer {
            recorder: EventRecorder::new(budget),
            frames: HashMap::new(),
        }
    }

    /// Records the change since the last observation of `frame_id`, then
    /// makes `bindings` the new baseline at `line`.
    fn observe(
        &mut self,
        frame_id: u64,
        function: &str,
        line: u32,
        bindings: &IndexMap<String, Value>,
    ) {
        if self.recorder.is_truncated() {
            return;
        }
        let current = bindings_snapshot(bindings);
        match self.frames.get_mut(&frame_id) {
            Some(state) => {
                let changed = changed_bindings(Some(&state.bindings), &current);
                let removed = state.bindings.keys().any(|k| !current.contains_key(k));
                if !changed.is_empty() || removed {
                    self.recorder.push(EventKind::LineUpdate {
                        function: state.function.clone(),
                        line: state.line,
                        changed,
                        locals: current.clone(),
                    });
                }
                state.line = line;
                state.bindings = current;
            }
            None => {
                self.frames.insert(
                    frame_id,
                    FrameState {
                        function: function.to_string(),
                        line,
                        bindings: current,
                    },
                );
            }
        }
    }

    /// Flushes the module frame's final state.
    pub(crate) fn finish(&mut self, globals: &IndexMap<String, Value>) {
        let line = self
            .frames
            .get(&MODULE_FRAME_ID)
            .map(|state| state.line)
            .unwrap_or(0);
        self.observe(MODULE_FRAME_ID, crate::interpreter::MODULE_FUNCTION, line, globals);
    }

    pub(crate) fn into_recorder(self) -> EventRecorder {
        self.recorder
    }
}

impl ExecutionHook for LineTracer {
    fn on_call(&mut self, frame: &FrameView<'_>) {
        self.frames.remove(&frame.frame_id);
        self.observe(frame.frame_id, frame.function, frame.line, frame.locals);
    }

    fn on_line(&mut self, frame: &FrameView<'_>) {
        self.observe(frame.frame_id, frame.function, frame.line, frame.locals);
    }

    fn on_return(&mut self, frame: &FrameView<'_>, _value: &Value) {
        self.observe(frame.frame_id, frame.function, frame.line, frame.locals);
        self.frames.remove(&frame.frame_id);
    }
}

/// Runs the module body under the line tracer.
pub fn trace_execution(program: &Program, stdin: &str, config: &TraceConfig) -> TraceReport {
    let mut interp = interpreter(stdin, config);
    let mut tracer = LineTracer::new(config.event_budget);
    let outcome = interp.run_module(program, &mut tracer);
    if outcome.is_ok() {
        tracer.finish(interp.globals());
    }
    conclude(
        tracer.into_recorder(),
        &interp,
        outcome.map(|()| None).map_err(Into::into),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::TraceStatus;
    use serde_json::json;
    use tracelab_core::parse_program;

    fn trace(source: &str) -> TraceReport {
        let program = parse_program(source).unwrap();
        trace_execution(&program, "", &TraceConfig::default())
    }

    fn updates(report: &TraceReport) -> Vec<(String, u32, JsonValue)> {
        report
            .events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::LineUpdate {
                    function,
                    line,
                    changed,
                    ..
                } => Some((function.clone(), *line, JsonValue::Object(changed.clone()))),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn changes_are_attributed_to_the_line_that_made_them() {
        let report = trace("x = 1\ny = x + 1\nx = 1\nz = [x, y]\n");
        assert_eq!(report.status, TraceStatus::Completed);
        assert_eq!(
            updates(&report),
            vec![
                ("<module>".to_string(), 1, json!({"x": 1})),
                ("<module>".to_string(), 2, json!({"y": 2})),
                ("<module>".to_string(), 4, json!({"z": [1, 2]})),
            ]
        );
    }

    #[test]
    fn function_frames_are_tracked_separately() {
        let report = trace("def f(a):\n    b = a * 2\n    return b\n\nr = f(3)\n");
        let updates = updates(&report);
        assert!(updates.contains(&("f".to_string(), 2, json!({"b": 6}))));
        assert!(updates.contains(&("<module>".to_string(), 1, json!({"f": "<function f>"}))));
        assert!(updates.contains(&("<module>".to_string(), 5, json!({"r": 6}))));
    }

    #[test]
    fn runtime_errors_end_with_an_error_event() {
        let report = trace("a = [1]\nb = a[3]\n");
        assert_eq!(report.status, TraceStatus::Error);
        match &report.events.last().unwrap().kind {
            EventKind::Error { message, line } => {
                assert!(message.starts_with("IndexError"));
                assert_eq!(*line, Some(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn output_is_captured() {
        let report = trace("print('hi')\n");
        assert_eq!(report.output, "hi\n");
        assert!(report.result.is_none());
    }
}
