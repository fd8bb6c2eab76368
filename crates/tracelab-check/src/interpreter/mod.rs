//! Tree-walking interpreter for Tracelang programs.
//!
//! Executes a parsed [`Program`] and reports progress to an
//! [`ExecutionHook`] so tracers can observe function calls, line steps and
//! returns together with the live bindings of the executing frame.
//!
//! # Architecture
//!
//! - [`Interpreter`] owns the global namespace, the call stack and the
//!   resource budgets from [`InterpreterConfig`].
//! - [`ExecutionHook`] is passed explicitly into every run; there is no
//!   process-global tracing state, so independent runs never interfere.
//! - [`FrameView`] is the read-only view of the current frame handed to a
//!   hook. The module body is reported as frame id `0` named `<module>`.
//! - [`Value`] is the runtime representation of all values and
//!   [`RuntimeError`] the set of exceptions a run can end with.
//!
//! # Usage
//!
//! ```ignore
//! let program = parse_program(source)?;
//! let mut interp = Interpreter::new(InterpreterConfig::default());
//! interp.run_module(&program, &mut NoopHook)?;
//! let result = interp.call_function("fib", vec![Value::Int(10)], &mut NoopHook)?;
//! ```

pub mod builtins;
pub mod error;
pub mod eval;
pub mod methods;
pub mod value;

pub use builtins::Builtin;
pub use error::RuntimeError;
pub use value::{Key, Value};

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::rc::Rc;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use tracelab_core::ast::{BoolOp, FStringPart, UnaryOp};
use tracelab_core::{parse_program, Expr, Program, Stmt, StmtKind, SyntaxError, Target};

use value::{BoundMethod, Function, Module};

/// Frame id reported for the module body.
pub const MODULE_FRAME_ID: u64 = 0;

/// Function name reported for the module body.
pub const MODULE_FUNCTION: &str = "<module>";

/// Stack size for threads that run the interpreter. Deep user recursion
/// maps onto native recursion of the tree walker.
pub const INTERPRETER_STACK_BYTES: usize = 256 * 1024 * 1024;

/// Resource limits for one interpreter run.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Maximum user-function call depth (default 256).
    pub max_recursion_depth: usize,
    /// Maximum executed statements and loop iterations, if bounded.
    pub max_steps: Option<u64>,
    /// Wall-clock budget measured from the first executed statement.
    pub time_limit: Option<Duration>,
    /// Cap on captured stdout; longer output is cut off silently.
    pub max_output_bytes: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_recursion_depth: 256,
            max_steps: Some(10_000_000),
            time_limit: Some(Duration::from_secs(2)),
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Observer of interpreter progress. All methods default to no-ops.
pub trait ExecutionHook {
    /// A user function frame was pushed; its parameters are bound.
    fn on_call(&mut self, _frame: &FrameView<'_>) {}

    /// A statement (or loop header re-check) is about to execute.
    fn on_line(&mut self, _frame: &FrameView<'_>) {}

    /// A user function is returning `value`. Not fired when the frame is
    /// unwound by an error.
    fn on_return(&mut self, _frame: &FrameView<'_>, _value: &Value) {}
}

/// Hook that observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl ExecutionHook for NoopHook {}

/// Read-only view of the executing frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub function: &'a str,
    pub frame_id: u64,
    pub line: u32,
    /// Number of user frames on the stack; `0` for the module body.
    pub depth: usize,
    /// The frame's own bindings (the globals for the module body).
    pub locals: &'a IndexMap<String, Value>,
    pub globals: &'a IndexMap<String, Value>,
}

impl FrameView<'_> {
    pub fn is_module(&self) -> bool {
        self.frame_id == MODULE_FRAME_ID
    }
}

#[derive(Debug)]
struct Frame {
    id: u64,
    function: Rc<Function>,
    locals: IndexMap<String, Value>,
    global_names: HashSet<String>,
    line: u32,
}

type ClauseBody<'b> =
    dyn FnMut(&mut Interpreter, &mut dyn ExecutionHook) -> Result<(), RuntimeError> + 'b;

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

enum Output {
    Captured(String),
    Streamed(Box<dyn Write>),
}

/// Lazily produced loop values; ranges are not materialized.
enum ValueIter {
    Range { next: i64, stop: i64, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range { next, stop, step } => {
                let live = if *step > 0 { *next < *stop } else { *next > *stop };
                if !live {
                    return None;
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
            ValueIter::Items(items) => items.next(),
        }
    }
}

/// A Tracelang interpreter instance. One instance runs one program; state
/// persists between [`Interpreter::run_module`] and
/// [`Interpreter::call_function`].
pub struct Interpreter {
    config: InterpreterConfig,
    globals: IndexMap<String, Value>,
    frames: Vec<Frame>,
    module_line: u32,
    next_frame_id: u64,
    steps: u64,
    started: Option<Instant>,
    output: Output,
    output_truncated: bool,
    stdin: VecDeque<String>,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Interpreter {
            config,
            globals: IndexMap::new(),
            frames: Vec::new(),
            module_line: 0,
            next_frame_id: MODULE_FRAME_ID + 1,
            steps: 0,
            started: None,
            output: Output::Captured(String::new()),
            output_truncated: false,
            stdin: VecDeque::new(),
        }
    }

    /// Supplies the text `input()` and `sys.stdin.readline()` read from.
    pub fn with_stdin(mut self, text: &str) -> Self {
        self.stdin = text.lines().map(str::to_string).collect();
        self
    }

    /// Writes program output to `out` instead of capturing it.
    pub fn with_output_stream(mut self, out: Box<dyn Write>) -> Self {
        self.output = Output::Streamed(out);
        self
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn globals(&self) -> &IndexMap<String, Value> {
        &self.globals
    }

    /// Captured output so far; empty when output is streamed.
    pub fn output(&self) -> &str {
        match &self.output {
            Output::Captured(text) => text,
            Output::Streamed(_) => "",
        }
    }

    pub fn output_truncated(&self) -> bool {
        self.output_truncated
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Executes the module body.
    pub fn run_module(
        &mut self,
        program: &Program,
        hook: &mut dyn ExecutionHook,
    ) -> Result<(), RuntimeError> {
        self.started.get_or_insert_with(Instant::now);
        match self.exec_block(&program.body, hook)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(RuntimeError::unsupported("'return' outside function")),
            Flow::Break | Flow::Continue => {
                Err(RuntimeError::unsupported("'break' or 'continue' outside loop"))
            }
        }
    }

    /// Calls a global function by name with positional arguments.
    pub fn call_function(
        &mut self,
        name: &str,
        args: Vec<Value>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Value, RuntimeError> {
        self.started.get_or_insert_with(Instant::now);
        let callee = self
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::name_error(name))?;
        self.call_value(&callee, args, Vec::new(), hook)
    }

    /// Flushes streamed output.
    pub fn flush_output(&mut self) -> Result<(), RuntimeError> {
        if let Output::Streamed(out) = &mut self.output {
            out.flush()
                .map_err(|e| RuntimeError::internal(format!("failed to flush output: {}", e)))?;
        }
        Ok(())
    }

    fn view(&self) -> FrameView<'_> {
        match self.frames.last() {
            Some(frame) => FrameView {
                function: &frame.function.def.name,
                frame_id: frame.id,
                line: frame.line,
                depth: self.frames.len(),
                locals: &frame.locals,
                globals: &self.globals,
            },
            None => FrameView {
                function: MODULE_FUNCTION,
                frame_id: MODULE_FRAME_ID,
                line: self.module_line,
                depth: 0,
                locals: &self.globals,
                globals: &self.globals,
            },
        }
    }

    fn set_line(&mut self, line: u32) {
        match self.frames.last_mut() {
            Some(frame) => frame.line = line,
            None => self.module_line = line,
        }
    }

    fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::Timeout {
                    reason: format!("step limit of {} exceeded", max),
                    line: 0,
                });
            }
        }
        if let Some(limit) = self.config.time_limit {
            let started = *self.started.get_or_insert_with(Instant::now);
            if started.elapsed() > limit {
                return Err(RuntimeError::Timeout {
                    reason: format!("time limit of {} ms exceeded", limit.as_millis()),
                    line: 0,
                });
            }
        }
        Ok(())
    }

    fn enter_line(&mut self, line: u32, hook: &mut dyn ExecutionHook) -> Result<(), RuntimeError> {
        self.set_line(line);
        self.tick()?;
        hook.on_line(&self.view());
        Ok(())
    }

    pub(crate) fn write_output(&mut self, text: &str) -> Result<(), RuntimeError> {
        match &mut self.output {
            Output::Captured(buf) => {
                if self.output_truncated {
                    return Ok(());
                }
                let remaining = self.config.max_output_bytes.saturating_sub(buf.len());
                if text.len() > remaining {
                    let mut cut = remaining;
                    while !text.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    buf.push_str(&text[..cut]);
                    self.output_truncated = true;
                } else {
                    buf.push_str(text);
                }
                Ok(())
            }
            Output::Streamed(out) => out
                .write_all(text.as_bytes())
                .map_err(|e| RuntimeError::internal(format!("failed to write output: {}", e))),
        }
    }

    pub(crate) fn read_line(&mut self) -> Option<String> {
        self.stdin.pop_front()
    }

    // ---- names -------------------------------------------------------

    fn load_name(&self, name: &str) -> Result<Value, RuntimeError> {
        if let Some(frame) = self.frames.last() {
            if !frame.global_names.contains(name) {
                if let Some(v) = frame.locals.get(name) {
                    return Ok(v.clone());
                }
                if let Some(captured) = &frame.function.captured {
                    if let Some(v) = captured.get(name) {
                        return Ok(v.clone());
                    }
                    if frame.function.def.name == name {
                        return Ok(Value::Function(frame.function.clone()));
                    }
                }
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| RuntimeError::name_error(name))
    }

    fn store_name(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) if !frame.global_names.contains(name) => {
                frame.locals.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    fn scope_binding(&self, name: &str) -> Option<Value> {
        match self.frames.last() {
            Some(frame) => frame.locals.get(name).cloned(),
            None => self.globals.get(name).cloned(),
        }
    }

    fn restore_binding(&mut self, name: &str, previous: Option<Value>) {
        let scope = match self.frames.last_mut() {
            Some(frame) => &mut frame.locals,
            None => &mut self.globals,
        };
        match previous {
            Some(v) => {
                scope.insert(name.to_string(), v);
            }
            None => {
                scope.shift_remove(name);
            }
        }
    }

    // ---- statements --------------------------------------------------

    fn exec_block(
        &mut self,
        body: &[Stmt],
        hook: &mut dyn ExecutionHook,
    ) -> Result<Flow, RuntimeError> {
        for stmt in body {
            match self.exec_stmt(stmt, hook)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, hook: &mut dyn ExecutionHook) -> Result<Flow, RuntimeError> {
        let line = stmt.span.line;
        self.enter_line(line, hook)
            .and_then(|_| self.exec_stmt_kind(stmt, hook))
            .map_err(|e| e.at_line(line))
    }

    fn exec_stmt_kind(
        &mut self,
        stmt: &Stmt,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Flow, RuntimeError> {
        let line = stmt.span.line;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.eval(e, hook)?;
            }
            StmtKind::Assign { targets, value } => {
                let v = self.eval(value, hook)?;
                for target in targets {
                    self.assign(target, v.clone(), hook)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, hook)?;
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test, hook)?.is_truthy() {
                        return self.exec_block(body, hook);
                    }
                }
                return self.exec_block(orelse, hook);
            }
            StmtKind::While { test, body } => {
                let mut first = true;
                loop {
                    if !first {
                        self.enter_line(line, hook)?;
                    }
                    first = false;
                    if !self.eval(test, hook)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body, hook)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter, hook)?;
                let mut items = iter_values(&iterable)?;
                let mut first = true;
                loop {
                    if !first {
                        self.enter_line(line, hook)?;
                    }
                    first = false;
                    let Some(item) = items.next() else { break };
                    self.assign(target, item, hook)?;
                    match self.exec_block(body, hook)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(e) => Some(self.eval(e, hook)?),
                        None => None,
                    });
                }
                let captured = self.frames.last().map(|f| Rc::new(f.locals.clone()));
                let function = Function {
                    def: def.clone(),
                    defaults,
                    captured,
                };
                self.store_name(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e, hook)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(v));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    for name in names {
                        frame.locals.shift_remove(name);
                        frame.global_names.insert(name.clone());
                    }
                }
            }
            StmtKind::Import {
                module,
                names,
                alias,
            } => self.import(module, names, alias.as_deref())?,
        }
        Ok(Flow::Normal)
    }

    fn import(
        &mut self,
        module: &str,
        names: &[(String, Option<String>)],
        alias: Option<&str>,
    ) -> Result<(), RuntimeError> {
        let resolved = Module::from_name(module)
            .ok_or_else(|| RuntimeError::import_error(format!("No module named '{}'", module)))?;
        if names.is_empty() {
            self.store_name(alias.unwrap_or(module), Value::Module(resolved));
            return Ok(());
        }
        for (name, bind_as) in names {
            let value = resolved.attribute(name).ok_or_else(|| {
                RuntimeError::import_error(format!(
                    "cannot import name '{}' from '{}'",
                    name, module
                ))
            })?;
            self.store_name(bind_as.as_deref().unwrap_or(name), value);
        }
        Ok(())
    }

    fn assign(
        &mut self,
        target: &Target,
        value: Value,
        hook: &mut dyn ExecutionHook,
    ) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                self.store_name(name, value);
                Ok(())
            }
            Target::Subscript { object, index } => {
                let container = self.eval(object, hook)?;
                if let Expr::Slice { .. } = **index {
                    return Err(RuntimeError::unsupported("slice assignment is not supported"));
                }
                let key = self.eval(index, hook)?;
                eval::set_item(&container, &key, value)
            }
            Target::Tuple(targets) => {
                let items = eval::to_items(&value)?;
                if items.len() > targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                if items.len() < targets.len() {
                    return Err(RuntimeError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                for (t, v) in targets.iter().zip(items) {
                    self.assign(t, v, hook)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: tracelab_core::ast::BinOp,
        value: &Expr,
        hook: &mut dyn ExecutionHook,
    ) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name) => {
                let current = self.load_name(name)?;
                let rhs = self.eval(value, hook)?;
                let updated = in_place(op, &current, &rhs)?;
                self.store_name(name, updated);
                Ok(())
            }
            Target::Subscript { object, index } => {
                let container = self.eval(object, hook)?;
                let key = self.eval(index, hook)?;
                let current = eval::get_item(&container, &key)?;
                let rhs = self.eval(value, hook)?;
                let updated = in_place(op, &current, &rhs)?;
                eval::set_item(&container, &key, updated)
            }
            Target::Tuple(_) => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    // ---- calls -------------------------------------------------------

    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(f) => self.invoke(f.clone(), args, kwargs, hook),
            Value::Builtin(b) => self.call_builtin(*b, args, kwargs, hook),
            Value::Method(m) => self.call_method(&m.receiver, &m.name, args, kwargs, hook),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn invoke(
        &mut self,
        function: Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Value, RuntimeError> {
        if self.frames.len() >= self.config.max_recursion_depth {
            return Err(RuntimeError::RecursionLimitExceeded {
                limit: self.config.max_recursion_depth,
                line: 0,
            });
        }
        let locals = bind_arguments(&function, args, kwargs)?;
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.push(Frame {
            id,
            function: function.clone(),
            locals,
            global_names: HashSet::new(),
            line: function.def.span.line,
        });
        hook.on_call(&self.view());
        let value = match self.exec_block(&function.def.body, hook) {
            Ok(Flow::Return(v)) => v,
            Ok(Flow::Normal) => Value::None,
            Ok(Flow::Break | Flow::Continue) => {
                self.frames.pop();
                return Err(RuntimeError::unsupported("'break' or 'continue' outside loop"));
            }
            Err(e) => {
                self.frames.pop();
                return Err(e);
            }
        };
        hook.on_return(&self.view(), &value);
        self.frames.pop();
        Ok(value)
    }

    // ---- expressions -------------------------------------------------

    fn eval_all(
        &mut self,
        exprs: &[Expr],
        hook: &mut dyn ExecutionHook,
    ) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval(e, hook)).collect()
    }

    fn eval(&mut self, expr: &Expr, hook: &mut dyn ExecutionHook) -> Result<Value, RuntimeError> {
        Ok(match expr {
            Expr::None => Value::None,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::str(s.as_str()),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => out.push_str(text),
                        FStringPart::Expr(e, spec) => {
                            let v = self.eval(e, hook)?;
                            out.push_str(&format_field(&v, spec.as_deref())?);
                        }
                    }
                }
                Value::str(out)
            }
            Expr::Name(name) => self.load_name(name)?,
            Expr::List(items) => Value::list(self.eval_all(items, hook)?),
            Expr::Tuple(items) => Value::tuple(self.eval_all(items, hook)?),
            Expr::Dict(pairs) => {
                let mut entries = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = Key::from_value(&self.eval(k, hook)?)?;
                    let value = self.eval(v, hook)?;
                    entries.insert(key, value);
                }
                Value::dict(entries)
            }
            Expr::Set(items) => {
                let mut keys = IndexSet::with_capacity(items.len());
                for item in items {
                    keys.insert(Key::from_value(&self.eval(item, hook)?)?);
                }
                Value::set(keys)
            }
            Expr::ListComp {
                element,
                target,
                iter,
                condition,
            } => {
                let mut out = Vec::new();
                let mut push = |interp: &mut Interpreter, hook: &mut dyn ExecutionHook| {
                    out.push(interp.eval(element, hook)?);
                    eval::check_len(out.len())
                };
                self.comprehension(target, iter, condition.as_deref(), hook, &mut push)?;
                Value::list(out)
            }
            Expr::DictComp {
                key,
                value,
                target,
                iter,
                condition,
            } => {
                let mut entries = IndexMap::new();
                let mut insert = |interp: &mut Interpreter, hook: &mut dyn ExecutionHook| {
                    let k = Key::from_value(&interp.eval(key, hook)?)?;
                    let v = interp.eval(value, hook)?;
                    entries.insert(k, v);
                    eval::check_len(entries.len())
                };
                self.comprehension(target, iter, condition.as_deref(), hook, &mut insert)?;
                Value::dict(entries)
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand, hook)?;
                match op {
                    UnaryOp::Neg => eval::negate(&v)?,
                    UnaryOp::Pos => eval::positive(&v)?,
                    UnaryOp::Not => Value::Bool(!v.is_truthy()),
                }
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, hook)?;
                let r = self.eval(right, hook)?;
                eval::binary_op(*op, &l, &r)?
            }
            Expr::BoolOp { op, left, right } => {
                let l = self.eval(left, hook)?;
                match (op, l.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => l,
                    _ => self.eval(right, hook)?,
                }
            }
            Expr::Compare { left, ops } => {
                let mut l = self.eval(left, hook)?;
                for (op, e) in ops {
                    let r = self.eval(e, hook)?;
                    if !eval::compare_op(*op, &l, &r)? {
                        return Ok(Value::Bool(false));
                    }
                    l = r;
                }
                Value::Bool(true)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, hook)?.is_truthy() {
                    self.eval(body, hook)?
                } else {
                    self.eval(orelse, hook)?
                }
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func, hook)?;
                let args = self.eval_all(args, hook)?;
                let mut kw = Vec::with_capacity(kwargs.len());
                for (name, e) in kwargs {
                    kw.push((name.clone(), self.eval(e, hook)?));
                }
                self.call_value(&callee, args, kw, hook)?
            }
            Expr::Attribute { object, name } => {
                let receiver = self.eval(object, hook)?;
                get_attribute(receiver, name)?
            }
            Expr::Subscript { object, index } => {
                let container = self.eval(object, hook)?;
                match &**index {
                    Expr::Slice { lower, upper, step } => {
                        let lower = self.slice_bound(lower.as_deref(), hook)?;
                        let upper = self.slice_bound(upper.as_deref(), hook)?;
                        let step = self.slice_bound(step.as_deref(), hook)?;
                        eval::get_slice(&container, lower, upper, step)?
                    }
                    other => {
                        let key = self.eval(other, hook)?;
                        eval::get_item(&container, &key)?
                    }
                }
            }
            Expr::Slice { .. } => {
                return Err(RuntimeError::type_error(
                    "slice syntax is only valid inside a subscript",
                ))
            }
        })
    }

    fn slice_bound(
        &mut self,
        bound: Option<&Expr>,
        hook: &mut dyn ExecutionHook,
    ) -> Result<Option<i64>, RuntimeError> {
        let Some(e) = bound else { return Ok(None) };
        match self.eval(e, hook)? {
            Value::None => Ok(None),
            v => v.as_index().map(Some).ok_or_else(|| {
                RuntimeError::type_error("slice indices must be integers or None")
            }),
        }
    }

    /// Runs one comprehension clause. The loop variable does not leak:
    /// whatever the target names were bound to before is restored after.
    fn comprehension(
        &mut self,
        target: &Target,
        iter: &Expr,
        condition: Option<&Expr>,
        hook: &mut dyn ExecutionHook,
        body: &mut ClauseBody<'_>,
    ) -> Result<(), RuntimeError> {
        let iterable = self.eval(iter, hook)?;
        let items = iter_values(&iterable)?;
        let mut names = Vec::new();
        target_names(target, &mut names);
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|n| {
                let previous = self.scope_binding(&n);
                (n, previous)
            })
            .collect();
        let result = self.comprehension_loop(target, items, condition, hook, body);
        for (name, previous) in saved {
            self.restore_binding(&name, previous);
        }
        result
    }

    fn comprehension_loop(
        &mut self,
        target: &Target,
        items: ValueIter,
        condition: Option<&Expr>,
        hook: &mut dyn ExecutionHook,
        body: &mut ClauseBody<'_>,
    ) -> Result<(), RuntimeError> {
        for item in items {
            self.tick()?;
            self.assign(target, item, hook)?;
            if let Some(c) = condition {
                if !self.eval(c, hook)?.is_truthy() {
                    continue;
                }
            }
            body(self, hook)?;
        }
        Ok(())
    }
}

fn iter_values(value: &Value) -> Result<ValueIter, RuntimeError> {
    match value {
        Value::Range { start, stop, step } => Ok(ValueIter::Range {
            next: *start,
            stop: *stop,
            step: *step,
        }),
        other => Ok(ValueIter::Items(eval::to_items(other)?.into_iter())),
    }
}

fn target_names(target: &Target, out: &mut Vec<String>) {
    match target {
        Target::Name(n) => out.push(n.clone()),
        Target::Tuple(items) => items.iter().for_each(|t| target_names(t, out)),
        Target::Subscript { .. } => {}
    }
}

/// `+=` on a list extends it in place; every other operator rebinds.
fn in_place(
    op: tracelab_core::ast::BinOp,
    current: &Value,
    rhs: &Value,
) -> Result<Value, RuntimeError> {
    if let (tracelab_core::ast::BinOp::Add, Value::List(list)) = (op, current) {
        let extra = eval::to_items(rhs)?;
        let mut items = list.borrow_mut();
        eval::check_len(items.len() + extra.len())?;
        items.extend(extra);
        return Ok(current.clone());
    }
    eval::binary_op(op, current, rhs)
}

fn get_attribute(receiver: Value, name: &str) -> Result<Value, RuntimeError> {
    match &receiver {
        Value::Module(m) => m.attribute(name).ok_or_else(|| {
            RuntimeError::attribute_error(format!(
                "module '{}' has no attribute '{}'",
                m.name(),
                name
            ))
        }),
        _ if methods::has_method(&receiver, name) => Ok(Value::Method(Rc::new(BoundMethod {
            receiver,
            name: name.to_string(),
        }))),
        other => Err(RuntimeError::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn bind_arguments(
    function: &Function,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> Result<IndexMap<String, Value>, RuntimeError> {
    let def = &function.def;
    let params = &def.params;
    if args.len() > params.len() {
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} positional argument(s) but {} were given",
            def.name,
            params.len(),
            args.len()
        )));
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, arg) in slots.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    for (key, value) in kwargs {
        let pos = params.iter().position(|p| p.name == key).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, key
            ))
        })?;
        if slots[pos].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                def.name, key
            )));
        }
        slots[pos] = Some(value);
    }
    let mut locals = IndexMap::with_capacity(params.len());
    for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
        let value = match (slot, default) {
            (Some(v), _) => v,
            (None, Some(d)) => d.clone(),
            (None, None) => {
                return Err(RuntimeError::type_error(format!(
                    "{}() missing required positional argument: '{}'",
                    def.name, param.name
                )))
            }
        };
        locals.insert(param.name.clone(), value);
    }
    Ok(locals)
}

/// Renders an f-string placeholder with its optional format spec. Supports
/// alignment (`<`, `>`, `^`), width, precision and the `f`, `d`, `%`, `s`
/// presentation types.
fn format_field(value: &Value, spec: Option<&str>) -> Result<String, RuntimeError> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value.to_str());
    };
    let (align, rest) = match spec.chars().next() {
        Some(c @ ('<' | '>' | '^')) => (Some(c), &spec[1..]),
        _ => (None, spec),
    };
    let width_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let width = format_bound(&rest[..width_end], "width")?.unwrap_or(0);
    let rest = &rest[width_end..];
    let (precision, kind) = match rest.strip_prefix('.') {
        Some(r) => {
            let end = r.find(|c: char| !c.is_ascii_digit()).unwrap_or(r.len());
            (format_bound(&r[..end], "precision")?, &r[end..])
        }
        None => (None, rest),
    };
    let numeric = value.as_num().is_some();
    let body = match kind {
        "f" | "%" | "" if precision.is_some() || !kind.is_empty() => {
            let num = value.as_num().ok_or_else(|| {
                RuntimeError::value_error(format!(
                    "unknown format code '{}' for object of type '{}'",
                    if kind.is_empty() { "f" } else { kind },
                    value.type_name()
                ))
            })?;
            let places = precision.unwrap_or(6);
            if kind == "%" {
                format!("{:.*}%", places, num.as_f64() * 100.0)
            } else {
                format!("{:.*}", places, num.as_f64())
            }
        }
        "d" => match value {
            Value::Int(i) => i.to_string(),
            Value::Bool(b) => (*b as i64).to_string(),
            other => {
                return Err(RuntimeError::value_error(format!(
                    "unknown format code 'd' for object of type '{}'",
                    other.type_name()
                )))
            }
        },
        _ => value.to_str(),
    };
    let len = body.chars().count();
    if len >= width {
        return Ok(body);
    }
    let pad = width - len;
    let align = align.unwrap_or(if numeric { '>' } else { '<' });
    Ok(match align {
        '>' => format!("{}{}", " ".repeat(pad), body),
        '^' => format!(
            "{}{}{}",
            " ".repeat(pad / 2),
            body,
            " ".repeat(pad - pad / 2)
        ),
        _ => format!("{}{}", body, " ".repeat(pad)),
    })
}

/// Parses a width or precision digit run, rejecting values above
/// [`eval::MAX_SEQUENCE_LEN`].
fn format_bound(digits: &str, what: &str) -> Result<Option<usize>, RuntimeError> {
    if digits.is_empty() {
        return Ok(None);
    }
    match digits.parse::<usize>() {
        Ok(n) if n <= eval::MAX_SEQUENCE_LEN => Ok(Some(n)),
        _ => Err(RuntimeError::value_error(format!(
            "format {} exceeds the limit of {}",
            what,
            eval::MAX_SEQUENCE_LEN
        ))),
    }
}

/// Errors from running a whole script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses and runs `source` as a script, streaming its output to `out`.
/// This is what the sandboxed child process executes.
pub fn run_script(
    source: &str,
    stdin: &str,
    config: InterpreterConfig,
    out: Box<dyn Write>,
) -> Result<(), ScriptError> {
    let program = parse_program(source)?;
    let mut interp = Interpreter::new(config)
        .with_stdin(stdin)
        .with_output_stream(out);
    let result = interp.run_module(&program, &mut NoopHook);
    interp.flush_output()?;
    result.map_err(ScriptError::from)
}

/// Runs `f` on a scoped thread with [`INTERPRETER_STACK_BYTES`] of stack.
pub fn with_large_stack<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        let handle = std::thread::Builder::new()
            .name("tracelab-interpreter".to_string())
            .stack_size(INTERPRETER_STACK_BYTES)
            .spawn_scoped(scope, f)?;
        match handle.join() {
            Ok(value) => Ok(value),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Result<Interpreter, RuntimeError> {
        let program = parse_program(source).expect("parse");
        let mut interp = Interpreter::new(InterpreterConfig::default());
        interp.run_module(&program, &mut NoopHook)?;
        Ok(interp)
    }

    fn output(source: &str) -> String {
        run(source).expect("run").output().to_string()
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(String, usize)>,
        lines: Vec<(String, u32)>,
        returns: Vec<(String, String)>,
    }

    impl ExecutionHook for Recorder {
        fn on_call(&mut self, frame: &FrameView<'_>) {
            self.calls.push((frame.function.to_string(), frame.depth));
        }
        fn on_line(&mut self, frame: &FrameView<'_>) {
            self.lines.push((frame.function.to_string(), frame.line));
        }
        fn on_return(&mut self, frame: &FrameView<'_>, value: &Value) {
            self.returns.push((frame.function.to_string(), value.repr()));
        }
    }

    #[test]
    fn arithmetic_and_printing() {
        assert_eq!(output("print(1 + 2 * 3, 7 // 2, 2 ** 10)"), "7 3 1024\n");
        assert_eq!(output("print(1, 2, sep='-', end='!')"), "1-2!");
        assert_eq!(output("x = 0.1 + 0.2\nprint(x)"), "0.30000000000000004\n");
    }

    #[test]
    fn functions_and_recursion() {
        let src = "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nprint(fib(15))\n";
        assert_eq!(output(src), "610\n");
    }

    #[test]
    fn defaults_and_keyword_arguments() {
        let src = "def f(a, b=10, c=20):\n    return a + b + c\nprint(f(1), f(1, c=2), f(a=1, b=1, c=1))\n";
        assert_eq!(output(src), "31 13 3\n");
        let err = run("def f(a):\n    return a\nf()\n").err().unwrap();
        assert!(matches!(err, RuntimeError::Type { line: 3, .. }));
    }

    #[test]
    fn containers_alias() {
        let src = "a = [1]\nb = a\nb.append(2)\nd = {}\nd['k'] = a\nprint(a, d)\n";
        assert_eq!(output(src), "[1, 2] {'k': [1, 2]}\n");
    }

    #[test]
    fn loops_and_control_flow() {
        let src = "total = 0\nfor i in range(10):\n    if i % 2 == 0:\n        continue\n    if i > 7:\n        break\n    total += i\nprint(total)\nwhile total > 0:\n    total -= 5\nprint(total)\n";
        assert_eq!(output(src), "16\n-4\n");
    }

    #[test]
    fn comprehensions_do_not_leak() {
        let src = "x = 'outer'\nsquares = [x * x for x in range(4) if x != 2]\nprint(squares, x)\nd = {k: v for k, v in [(1, 'a'), (2, 'b')]}\nprint(d)\n";
        assert_eq!(output(src), "[0, 1, 9] outer\n{1: 'a', 2: 'b'}\n");
    }

    #[test]
    fn globals_and_closures() {
        let src = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\nprint(count)\ndef outer(n):\n    def helper(k):\n        if k == 0:\n            return n\n        return helper(k - 1)\n    return helper(3)\nprint(outer(9))\n";
        assert_eq!(output(src), "2\n9\n");
    }

    #[test]
    fn imports_resolve_curated_modules() {
        let src = "import math\nfrom collections import deque\nq = deque([1, 2])\nq.appendleft(0)\nprint(math.sqrt(16), q.popleft(), list(q))\n";
        assert_eq!(output(src), "4.0 0 [1, 2]\n");
        let err = run("import os\n").err().unwrap();
        assert!(matches!(err, RuntimeError::Import { line: 1, .. }));
    }

    #[test]
    fn f_strings_format_fields() {
        let src = "name = 'bfs'\nratio = 2 / 3\nprint(f'{name}: {ratio:.2f} [{7:>3}] {{x}}')\n";
        assert_eq!(output(src), "bfs: 0.67 [  7] {x}\n");
    }

    #[test]
    fn f_string_width_and_precision_are_bounded() {
        let err = run("x = 1\ns = f\"{x:999999999999999}\"\n").err().unwrap();
        assert!(matches!(err, RuntimeError::Value { .. }));
        let err = run("x = 1.5\ns = f\"{x:.99999999999999999999999f}\"\n").err().unwrap();
        assert!(matches!(err, RuntimeError::Value { .. }));
        assert_eq!(output("print(f'[{1:<4}]')\n"), "[1   ]\n");
    }

    #[test]
    fn errors_carry_lines() {
        let err = run("x = 1\ny = x / 0\n").err().unwrap();
        assert!(matches!(err, RuntimeError::ZeroDivision { line: 2, .. }));
        let err = with_large_stack(|| run("def f(n):\n    return f(n + 1)\nf(0)\n").err())
            .unwrap()
            .unwrap();
        assert!(matches!(err, RuntimeError::RecursionLimitExceeded { limit: 256, line: 2 }));
        let err = run("print(missing)\n").err().unwrap();
        assert!(matches!(err, RuntimeError::Name { ref name, line: 1 } if name == "missing"));
    }

    #[test]
    fn step_budget_stops_infinite_loops() {
        let program = parse_program("while True:\n    pass\n").unwrap();
        let mut interp = Interpreter::new(InterpreterConfig {
            max_steps: Some(1000),
            ..InterpreterConfig::default()
        });
        let err = interp.run_module(&program, &mut NoopHook).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn stdin_feeds_input() {
        let program = parse_program("a = int(input())\nb = input()\nprint(a * 2, b)\n").unwrap();
        let mut interp = Interpreter::new(InterpreterConfig::default()).with_stdin("21\nhi\n");
        interp.run_module(&program, &mut NoopHook).unwrap();
        assert_eq!(interp.output(), "42 hi\n");
    }

    #[test]
    fn captured_output_is_capped() {
        let program = parse_program("for i in range(100):\n    print('xxxxxxxxxx')\n").unwrap();
        let mut interp = Interpreter::new(InterpreterConfig {
            max_output_bytes: 25,
            ..InterpreterConfig::default()
        });
        interp.run_module(&program, &mut NoopHook).unwrap();
        assert_eq!(interp.output().len(), 25);
        assert!(interp.output_truncated());
    }

    #[test]
    fn hook_sees_calls_lines_and_returns() {
        let src = "def double(x):\n    y = x * 2\n    return y\nz = double(4)\n";
        let program = parse_program(src).unwrap();
        let mut interp = Interpreter::new(InterpreterConfig::default());
        let mut hook = Recorder::default();
        interp.run_module(&program, &mut hook).unwrap();
        assert_eq!(hook.calls, vec![("double".to_string(), 1)]);
        assert_eq!(hook.returns, vec![("double".to_string(), "8".to_string())]);
        assert_eq!(
            hook.lines,
            vec![
                ("<module>".to_string(), 1),
                ("<module>".to_string(), 4),
                ("double".to_string(), 2),
                ("double".to_string(), 3),
            ]
        );
    }

    #[test]
    fn loop_headers_report_each_iteration() {
        let program = parse_program("for i in range(2):\n    pass\n").unwrap();
        let mut interp = Interpreter::new(InterpreterConfig::default());
        let mut hook = Recorder::default();
        interp.run_module(&program, &mut hook).unwrap();
        let lines: Vec<u32> = hook.lines.iter().map(|(_, l)| *l).collect();
        assert_eq!(lines, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn call_function_after_module() {
        let program = parse_program("def add(a, b):\n    return a + b\n").unwrap();
        let mut interp = Interpreter::new(InterpreterConfig::default());
        interp.run_module(&program, &mut NoopHook).unwrap();
        let v = interp
            .call_function("add", vec![Value::Int(2), Value::Int(3)], &mut NoopHook)
            .unwrap();
        assert!(matches!(v, Value::Int(5)));
        assert!(matches!(
            interp.call_function("nope", vec![], &mut NoopHook),
            Err(RuntimeError::Name { .. })
        ));
    }

    #[test]
    fn large_stack_allows_deep_recursion() {
        let out = with_large_stack(|| {
            let src = "def depth(n):\n    if n == 0:\n        return 0\n    return 1 + depth(n - 1)\nprint(depth(900))\n";
            let program = parse_program(src).unwrap();
            let mut interp = Interpreter::new(InterpreterConfig {
                max_recursion_depth: 1000,
                ..InterpreterConfig::default()
            });
            interp.run_module(&program, &mut NoopHook).unwrap();
            interp.output().to_string()
        })
        .unwrap();
        assert_eq!(out, "900\n");
    }
}
