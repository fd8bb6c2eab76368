//! Budgeted, sequence-numbered event collection.

use super::event::{EventKind, TraceEvent};

/// Reason carried by the single `truncated` event.
pub const TRUNCATION_REASON: &str = "event budget exceeded";

/// Collects events with contiguous sequence numbers starting at zero.
///
/// At most `budget` data events are kept. The first event offered beyond
/// the budget is replaced by exactly one `truncated` event; later offers are
/// dropped.
///
/// The one exception is the terminal `error` event, which bypasses the
/// budget. A run that is truncated and then fails therefore ends with
/// `truncated` followed by `error`: `budget + 2` events in total.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    budget: usize,
    events: Vec<TraceEvent>,
    data_events: usize,
    truncated: bool,
}

impl EventRecorder {
    pub const DEFAULT_BUDGET: usize = 300;

    pub fn new(budget: usize) -> Self {
        EventRecorder {
            budget,
            events: Vec::new(),
            data_events: 0,
            truncated: false,
        }
    }

    /// Offers a data event. Returns `false` once the budget is exhausted,
    /// signalling the caller that further reporting is pointless.
    pub fn push(&mut self, kind: EventKind) -> bool {
        if self.truncated {
            return false;
        }
        if self.data_events >= self.budget {
            self.append(EventKind::Truncated {
                reason: TRUNCATION_REASON.to_string(),
            });
            self.truncated = true;
            return false;
        }
        self.append(kind);
        self.data_events += 1;
        true
    }

    /// Appends a terminal error event regardless of the budget.
    pub fn push_error(&mut self, message: impl Into<String>, line: Option<u32>) {
        self.append(EventKind::Error {
            message: message.into(),
            line,
        });
    }

    fn append(&mut self, kind: EventKind) {
        let seq = self.events.len() as u64;
        self.events.push(TraceEvent { seq, kind });
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        EventRecorder::new(Self::DEFAULT_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> EventKind {
        EventKind::Truncated {
            reason: "placeholder".into(),
        }
    }

    #[test]
    fn budget_yields_exactly_one_truncation() {
        let mut recorder = EventRecorder::new(3);
        let accepted = (0..10).filter(|_| recorder.push(data())).count();
        assert_eq!(accepted, 3);
        assert_eq!(recorder.len(), 4);
        assert!(recorder.is_truncated());
        let last = recorder.events().last().unwrap();
        assert_eq!(
            last.kind,
            EventKind::Truncated {
                reason: TRUNCATION_REASON.into()
            }
        );
    }

    #[test]
    fn exact_budget_is_not_truncated() {
        let mut recorder = EventRecorder::new(2);
        assert!(recorder.push(data()));
        assert!(recorder.push(data()));
        assert!(!recorder.is_truncated());
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn errors_bypass_the_budget() {
        let mut recorder = EventRecorder::new(1);
        recorder.push(data());
        recorder.push(data());
        recorder.push_error("boom", Some(4));
        let seqs: Vec<u64> = recorder.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(matches!(recorder.events()[1].kind, EventKind::Truncated { ref reason } if reason == TRUNCATION_REASON));
        assert!(matches!(recorder.events()[2].kind, EventKind::Error { .. }));
        assert_eq!(recorder.len(), 1 + 2);
    }
}
