//! Recursion tracer: `call`/`return` events around one entry invocation.

use tracelab_core::Program;

use super::event::EventKind;
use super::recorder::EventRecorder;
use super::snapshot::bindings_snapshot;
use super::{conclude, interpreter, run_unobserved, TraceConfig, TraceError, TraceInput, TraceReport};
use crate::interpreter::{ExecutionHook, FrameView, RuntimeError, Value};

pub(crate) struct CallTracer {
    recorder: EventRecorder,
}

impl ExecutionHook for CallTracer {
    fn on_call(&mut self, frame: &FrameView<'_>) {
        if self.recorder.is_truncated() {
            return;
        }
        self.recorder.push(EventKind::Call {
            function: frame.function.to_string(),
            line: frame.line,
            frame_id: frame.frame_id,
            depth: frame.depth,
            locals: bindings_snapshot(frame.locals),
        });
    }

    fn on_return(&mut self, frame: &FrameView<'_>, value: &Value) {
        if self.recorder.is_truncated() {
            return;
        }
        self.recorder.push(EventKind::Return {
            function: frame.function.to_string(),
            line: frame.line,
            frame_id: frame.frame_id,
            depth: frame.depth,
            return_value: value.repr(),
            locals: bindings_snapshot(frame.locals),
        });
    }
}

/// Runs the module unobserved, then calls the entry function with its
/// arguments under the call tracer.
pub fn trace_recursion(program: &Program, input: &TraceInput<'_>, config: &TraceConfig) -> TraceReport {
    let mut interp = interpreter(input.stdin, config);
    let mut tracer = CallTracer {
        recorder: EventRecorder::new(config.event_budget),
    };
    let outcome = (|| -> Result<Option<String>, TraceError> {
        run_unobserved(&mut interp, program)?;
        let name = input
            .entry
            .function
            .as_deref()
            .ok_or_else(|| RuntimeError::name_error("<entry function>"))?;
        let args = input
            .entry
            .args
            .iter()
            .map(Value::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        let result = interp.call_function(name, args, &mut tracer)?;
        Ok(Some(result.repr()))
    })();
    conclude(tracer.recorder, &interp, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::{resolve_entry, TraceStatus};
    use tracelab_core::parse_program;

    fn trace(source: &str, budget: usize) -> TraceReport {
        let program = parse_program(source).unwrap();
        let entry = resolve_entry(source, None, None);
        let input = TraceInput {
            source,
            stdin: "",
            entry: &entry,
        };
        let config = TraceConfig {
            event_budget: budget,
            ..TraceConfig::default()
        };
        trace_recursion(&program, &input, &config)
    }

    const FACT: &str = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n\nprint(fact(3))\n";

    #[test]
    fn calls_and_returns_pair_up() {
        let report = trace(FACT, 300);
        assert_eq!(report.status, TraceStatus::Completed);
        assert_eq!(report.result.as_deref(), Some("6"));
        let kinds: Vec<&str> = report.events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(
            kinds,
            vec!["call", "call", "call", "return", "return", "return"]
        );
        match &report.events[0].kind {
            EventKind::Call { function, locals, depth, .. } => {
                assert_eq!(function, "fact");
                assert_eq!(locals["n"], serde_json::json!(3));
                assert_eq!(*depth, 1);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &report.events[3].kind {
            EventKind::Return { return_value, .. } => assert_eq!(return_value, "1"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn module_output_is_kept_but_not_traced() {
        let report = trace(FACT, 300);
        assert_eq!(report.output, "6\n");
        assert!(report
            .events
            .iter()
            .all(|e| !matches!(&e.kind, EventKind::Call { function, .. } if function != "fact")));
    }

    #[test]
    fn budget_truncates_reporting_not_execution() {
        let report = trace(FACT, 2);
        assert!(report.truncated);
        assert_eq!(report.events.len(), 3);
        assert_eq!(report.result.as_deref(), Some("6"));
    }

    #[test]
    fn missing_entry_is_an_error() {
        let report = trace("x = 1\n", 300);
        assert_eq!(report.status, TraceStatus::Error);
        assert_eq!(report.events.len(), 1);
    }
}
