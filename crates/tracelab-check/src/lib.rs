//! Instrumented execution for Tracelang submissions.
//!
//! - [`interpreter`]: the tree-walking interpreter with its explicit
//!   per-run [`interpreter::ExecutionHook`].
//! - [`tracer`]: hooks that turn a run into an ordered, budgeted sequence of
//!   [`tracer::TraceEvent`]s (generic line trace, recursion, DP and graph
//!   variants).
//! - [`builders`]: pure reducers from event sequences to derived artifacts.
//! - [`classify`] and [`issues`]: the default heuristic topic classifier and
//!   static issue scanner.
//! - [`analysis`]: per-topic static reports (indexing timeline, DP write
//!   sites) read straight off the syntax tree.

pub mod analysis;
pub mod builders;
pub mod classify;
pub mod interpreter;
pub mod issues;
mod pattern;
pub mod tracer;

pub use analysis::{analyze, DpAnalysis, DpStyle, IndexAnalysis, StaticAnalysis};
pub use builders::{build_recursion_tree, final_table, traversal_order, RecursionTreeNode};
pub use classify::{ClassificationResult, Classifier, HeuristicClassifier, Topic};
pub use issues::{Issue, IssueScanner, RuleScanner, Severity};
pub use tracer::{TraceConfig, TraceEvent, TraceReport, TraceStatus, TracerKind};
