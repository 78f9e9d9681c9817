//! Restricted Python interpreter that runs SCons scripts against an
//! emulated builder API. Every build-relevant call lands in a
//! [`BuildGraph`]; nothing is ever compiled or spawned.

use core::fmt;
use std::rc::Rc;
use std::time::Instant;

use hashbrown::HashSet;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::ConvertOptions;
use crate::error::IncludeError;
use crate::graph::BuildGraph;
use crate::loader::{Begin, ModuleHandle, ModuleRegistry};
use crate::parser::{
    Argument, BinaryOperator, Comprehension, Expr, ExceptHandler, FormatPart, FunctionDef,
    Statement, StatementKind, parse_script,
};
use crate::path::Path;
use crate::runtime::{self, Runtime};

mod builtins;
pub mod error;
mod ops;
pub mod value;

pub use error::InterpreterError;
use error::{ErrorContext, bail_runtime_error, bail_type_error};
use builtins::environment::{Environment, is_flag_var};
use builtins::modules::{Opaque, ScriptModule};
pub use value::{Function, Kwargs, Namespace, ScriptObject, Value};
use value::namespace;

const DEFAULT_MAX_DEPTH: usize = 100;

/// What the loader keeps about a finished script.
#[derive(Debug)]
pub struct ModuleState {
    /// Keeps functions defined by the script callable after it finished.
    pub globals: Namespace,
    /// Names the script exported, with their final values.
    pub exported: IndexMap<String, Value>,
    /// Value passed to `Return(...)`, if any.
    pub returned: Value,
}

/// Result of one interpreter session.
#[derive(Debug)]
pub struct Execution {
    pub graph: BuildGraph,
    pub registry: ModuleRegistry<ModuleState>,
    pub warnings: usize,
}

#[derive(Debug)]
struct Frame {
    globals: Namespace,
    /// `None` at module level, where assignments go to `globals`.
    locals: Option<Namespace>,
    closure: Vec<Namespace>,
    global_names: HashSet<String>,
}

impl Frame {
    fn module(globals: Namespace) -> Self {
        Self {
            globals,
            locals: None,
            closure: Vec::new(),
            global_names: HashSet::new(),
        }
    }

    /// Scopes a function created in this frame closes over.
    fn enclosing(&self) -> Vec<Namespace> {
        let mut closure = self.closure.clone();
        closure.extend(self.locals.clone());
        closure
    }
}

/// Per-script bookkeeping for `Export`/`Import`/`Return`.
#[derive(Debug)]
struct ScriptContext {
    path: Path,
    /// Values this script may `Import`, plus those it `Export`ed itself.
    pool: IndexMap<String, Value>,
    exported: Vec<String>,
    returned: Option<Value>,
    /// Call depth at which the script's module level runs.
    depth: usize,
}

pub struct Interpreter {
    runtime: Rc<dyn Runtime>,
    options: Rc<ConvertOptions>,
    project_root: Path,
    graph: BuildGraph,
    registry: ModuleRegistry<ModuleState>,
    frames: Vec<Frame>,
    scripts: Vec<ScriptContext>,
    /// Predefined names such as `ARGUMENTS`.
    builtins: IndexMap<String, Value>,
    default_env: Option<Value>,
    /// Values of `AddOption` declarations, by `dest`.
    cli_options: IndexMap<String, Value>,
    /// Globals of the outermost script, exported as graph variables.
    top_globals: Option<Namespace>,
    break_flag: bool,
    continue_flag: bool,
    return_value: Option<Value>,
    depth: usize,
    max_depth: usize,
    deadline: Option<Instant>,
    /// Incremented by every platform query; see [`Interpreter::execute_if`].
    platform_probes: usize,
    platform_depth: usize,
    line: usize,
    warnings: usize,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("project_root", &self.project_root)
            .field("options", &self.options)
            .field("depth", &self.depth)
            .field("warnings", &self.warnings)
            .finish()
    }
}

enum Callee {
    Method(Value, String),
    Value(Value),
    Unknown(String),
}

impl Interpreter {
    pub fn new(
        runtime: Rc<dyn Runtime>,
        options: Rc<ConvertOptions>,
        project_root: Path,
        registry: ModuleRegistry<ModuleState>,
    ) -> Self {
        let mut interp = Self {
            runtime,
            options,
            project_root,
            graph: BuildGraph::new(),
            registry,
            frames: Vec::new(),
            scripts: Vec::new(),
            builtins: IndexMap::new(),
            default_env: None,
            cli_options: IndexMap::new(),
            top_globals: None,
            break_flag: false,
            continue_flag: false,
            return_value: None,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            deadline: None,
            platform_probes: 0,
            platform_depth: 0,
            line: 0,
            warnings: 0,
        };
        builtins::init_constants(&mut interp);
        interp
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    /// Starts the clock and records the project identity. Must run before
    /// the first script.
    pub fn start(&mut self, project_name: &str) {
        self.deadline = self.options.timeout.map(|limit| Instant::now() + limit);
        builtins::project::prepare(self, project_name);
    }

    /// Runs a script through the registry: a script already executed in
    /// this run is replayed from its recorded contributions.
    pub fn run_script(
        &mut self,
        path: &Path,
    ) -> Result<Rc<ModuleHandle<ModuleState>>, IncludeError> {
        self.load_script(path, IndexMap::new(), IndexMap::new())
    }

    /// Ends the session, exporting the outermost script's top-scope
    /// variables into the graph. Works after failures too.
    pub fn finish(mut self) -> Execution {
        if let Some(globals) = self.top_globals.take() {
            let globals = globals.borrow();
            for (name, value) in globals.iter() {
                if name.starts_with('_') {
                    continue;
                }
                if let Some(var) = value.to_var() {
                    self.graph.set_variable(name.clone(), var);
                }
            }
        }
        Execution {
            graph: self.graph,
            registry: self.registry,
            warnings: self.warnings,
        }
    }

    /// Loads a nested script. `pool` is what it may `Import`; `bound` is
    /// bound in its globals before the first statement.
    pub(crate) fn load_script(
        &mut self,
        path: &Path,
        pool: IndexMap<String, Value>,
        bound: IndexMap<String, Value>,
    ) -> Result<Rc<ModuleHandle<ModuleState>>, IncludeError> {
        let name = path.logical_name();
        let pending = match self.registry.begin(&name, path, &mut self.graph)? {
            Begin::Cached(handle) => {
                if self.scripts.is_empty() {
                    self.top_globals = Some(handle.payload.globals.clone());
                }
                return Ok(handle);
            }
            Begin::Fresh(pending) => pending,
        };
        let result = self.execute_file(&name, path, pool, bound);
        self.registry.finish(pending, result, &mut self.graph)
    }

    fn execute_file(
        &mut self,
        name: &str,
        path: &Path,
        pool: IndexMap<String, Value>,
        bound: IndexMap<String, Value>,
    ) -> Result<ModuleState, IncludeError> {
        let host = self.host_path(path);
        if !self.runtime.is_file(&host).unwrap_or(false) {
            return Err(IncludeError::NotFound {
                name: name.to_string(),
                path: path.clone(),
            });
        }
        let source = runtime::read_to_string(&*self.runtime, &host).map_err(|e| IncludeError::Io {
            name: name.to_string(),
            path: path.clone(),
            message: format!("{e:#}"),
        })?;
        let statements = parse_script(&source).map_err(|source| IncludeError::Syntax {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;
        self.run_statements(name, path, &statements, pool, bound)
            .map_err(|source| IncludeError::Execution {
                name: name.to_string(),
                path: path.clone(),
                source: Box::new(source),
            })
    }

    fn run_statements(
        &mut self,
        name: &str,
        path: &Path,
        statements: &[Statement],
        pool: IndexMap<String, Value>,
        bound: IndexMap<String, Value>,
    ) -> Result<ModuleState, InterpreterError> {
        let globals = namespace();
        {
            let mut globals = globals.borrow_mut();
            globals.extend(bound);
            let module_name = match path.extension() {
                Some("py") => path.file_stem().to_string(),
                _ => "SCons.Script".to_string(),
            };
            globals.insert("__name__".into(), Value::String(module_name));
            globals.insert("__file__".into(), Value::String(self.host_path(path).to_string()));
        }
        if self.scripts.is_empty() {
            self.top_globals = Some(globals.clone());
        }
        debug!("executing {name} ({} statements)", statements.len());

        let saved_line = self.line;
        self.frames.push(Frame::module(globals.clone()));
        self.scripts.push(ScriptContext {
            path: path.clone(),
            pool,
            exported: Vec::new(),
            returned: None,
            depth: self.depth,
        });
        let result = self.execute_block(statements);
        self.return_value = None;
        self.break_flag = false;
        self.continue_flag = false;
        self.frames.pop();
        let script = self.scripts.pop();
        self.line = saved_line;

        match result {
            Err(err) if matches!(err.root(), InterpreterError::Exit(0)) => {
                debug!("{name} exited early");
            }
            Err(err) => return Err(err),
            Ok(()) => {}
        }

        let (exported, returned) = match script {
            Some(script) => {
                let exported = script
                    .exported
                    .iter()
                    .filter_map(|name| script.pool.get(name).map(|v| (name.clone(), v.clone())))
                    .collect();
                (exported, script.returned.unwrap_or(Value::None))
            }
            None => (IndexMap::new(), Value::None),
        };
        Ok(ModuleState {
            globals,
            exported,
            returned,
        })
    }

    // Paths and locations.

    pub(crate) fn script_path(&self) -> Path {
        self.scripts
            .last()
            .map(|script| script.path.clone())
            .unwrap_or_default()
    }

    pub(crate) fn script_dir(&self) -> Path {
        self.script_path().parent()
    }

    /// Resolves a script-relative path (`#` = project root) to a
    /// normalized project-relative one.
    pub(crate) fn resolve_path(&self, raw: &str) -> Path {
        if let Some(rest) = raw.strip_prefix('#') {
            return Path::from(rest.trim_start_matches(['/', '\\'])).normalize();
        }
        let path = Path::from(raw);
        if path.is_absolute() {
            return path.strip_prefix(&self.project_root).unwrap_or(path).normalize();
        }
        self.script_dir().join(raw).normalize()
    }

    /// Where a project-relative path lives for the runtime.
    pub(crate) fn host_path(&self, path: &Path) -> Path {
        if path.is_absolute() {
            path.clone()
        } else {
            self.project_root.join(path.as_str()).normalize()
        }
    }

    pub(crate) fn warning(&mut self, message: impl fmt::Display) {
        warn!("{}:{}: {}", self.script_path(), self.line, message);
        self.warnings += 1;
    }

    /// Records a call to a name outside the builder API and yields an
    /// opaque stand-in for its result.
    pub(crate) fn unrecognized(&mut self, name: &str) -> Value {
        self.warning(format_args!("unrecognized call '{name}' ignored"));
        let script = self.script_path();
        self.graph.record_unrecognized(name, script.as_str(), self.line);
        Opaque::new(name).into_object()
    }

    /// Notes a platform query for branch scoping.
    pub(crate) fn probe_platform(&mut self) {
        self.platform_probes += 1;
    }

    pub(crate) fn in_platform_region(&self) -> bool {
        self.platform_depth > 0
    }

    fn check_deadline(&self) -> Result<(), InterpreterError> {
        match (self.deadline, self.options.timeout) {
            (Some(deadline), Some(limit)) if Instant::now() >= deadline => {
                Err(InterpreterError::Timeout(limit))
            }
            _ => Ok(()),
        }
    }

    // Scopes.

    fn frame(&self) -> Result<&Frame, InterpreterError> {
        self.frames.last().context_runtime("no active scope")
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(frame) = self.frames.last() {
            if !frame.global_names.contains(name) {
                if let Some(value) = frame.locals.as_ref().and_then(|l| l.borrow().get(name).cloned()) {
                    return Some(value);
                }
                for scope in frame.closure.iter().rev() {
                    if let Some(value) = scope.borrow().get(name) {
                        return Some(value.clone());
                    }
                }
            }
            if let Some(value) = frame.globals.borrow().get(name) {
                return Some(value.clone());
            }
        }
        if let Some(value) = self.builtins.get(name) {
            return Some(value.clone());
        }
        builtins::lookup_global(name).map(Value::Builtin)
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) -> Result<(), InterpreterError> {
        let frame = self.frame()?;
        let scope = match &frame.locals {
            Some(locals) if !frame.global_names.contains(name) => locals,
            _ => &frame.globals,
        };
        scope.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn unbind(&mut self, name: &str) -> Result<(), InterpreterError> {
        let frame = self.frame()?;
        let scope = match &frame.locals {
            Some(locals) if !frame.global_names.contains(name) => locals,
            _ => &frame.globals,
        };
        if scope.borrow_mut().shift_remove(name).is_none() {
            return Err(InterpreterError::UndefinedVariable(name.to_string().into()));
        }
        Ok(())
    }

    // Statements.

    fn execute_block(&mut self, statements: &[Statement]) -> Result<(), InterpreterError> {
        for statement in statements {
            self.execute_statement(statement)?;
            if self.break_flag || self.continue_flag || self.return_value.is_some() {
                break;
            }
        }
        Ok(())
    }

    fn execute_statement(&mut self, statement: &Statement) -> Result<(), InterpreterError> {
        self.check_deadline()?;
        self.line = statement.line;
        self.execute_kind(&statement.kind).map_err(|e| {
            let script = self.script_path();
            e.at(script.as_str(), statement.line)
        })
    }

    fn execute_kind(&mut self, kind: &StatementKind) -> Result<(), InterpreterError> {
        match kind {
            StatementKind::Expression(expr) => {
                self.evaluate(expr)?;
            }
            StatementKind::Assignment(targets, value) => {
                let value = self.evaluate(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StatementKind::AugAssignment(target, op, value) => {
                self.augmented_assign(target, *op, value)?;
            }
            StatementKind::If(condition, then, elifs, otherwise) => {
                self.execute_if(condition, then, elifs, otherwise.as_deref())?;
            }
            StatementKind::For(target, iterable, body, otherwise) => {
                let items = self.evaluate(iterable)?.iterate()?;
                let mut broke = false;
                for item in items {
                    self.check_deadline()?;
                    self.assign(target, item)?;
                    self.execute_block(body)?;
                    self.continue_flag = false;
                    if self.break_flag {
                        self.break_flag = false;
                        broke = true;
                        break;
                    }
                    if self.return_value.is_some() {
                        return Ok(());
                    }
                }
                if let Some(otherwise) = otherwise.as_deref().filter(|_| !broke) {
                    self.execute_block(otherwise)?;
                }
            }
            StatementKind::While(condition, body) => {
                while self.evaluate(condition)?.truthy() {
                    self.check_deadline()?;
                    self.execute_block(body)?;
                    self.continue_flag = false;
                    if self.break_flag {
                        self.break_flag = false;
                        break;
                    }
                    if self.return_value.is_some() {
                        break;
                    }
                }
            }
            StatementKind::FunctionDef(def) => {
                let function = self.make_function(def.clone())?;
                self.bind(&def.name, function)?;
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::None,
                };
                self.return_value = Some(value);
            }
            StatementKind::Import(names) => {
                for import in names {
                    let module = self.import(&import.name)?;
                    match &import.alias {
                        Some(alias) => self.bind(alias, module)?,
                        None => {
                            let top = import.name.split('.').next().unwrap_or(&import.name);
                            let bound = if top == import.name {
                                module
                            } else {
                                self.import(top)?
                            };
                            self.bind(top, bound)?;
                        }
                    }
                }
            }
            StatementKind::FromImport(module_name, names) => {
                let module = self.import(module_name)?;
                if names.is_empty() {
                    if let Some(module) = module.as_object::<ScriptModule>() {
                        for (name, value) in module.public_names() {
                            self.bind(&name, value)?;
                        }
                    }
                } else {
                    for import in names {
                        let value = self.get_attribute(&module, &import.name)?;
                        self.bind(import.alias.as_ref().unwrap_or(&import.name), value)?;
                    }
                }
            }
            StatementKind::Try(body, handlers, otherwise, finally) => {
                self.execute_try(body, handlers, otherwise.as_deref(), finally.as_deref())?;
            }
            StatementKind::With(context, alias, body) => {
                let value = self.evaluate(context)?;
                if let Some(alias) = alias {
                    self.assign(alias, value)?;
                }
                self.execute_block(body)?;
            }
            StatementKind::Raise(value) => {
                let message = match value {
                    Some(expr) => self.evaluate(expr)?.coerce_string(),
                    None => "exception re-raised".to_string(),
                };
                return Err(InterpreterError::Raised(message.into()));
            }
            StatementKind::Assert(condition, message) => {
                if !self.evaluate(condition)?.truthy() {
                    let message = match message {
                        Some(expr) => self.evaluate(expr)?.coerce_string(),
                        None => String::new(),
                    };
                    return Err(InterpreterError::Raised(
                        format!("AssertionError: {message}").into(),
                    ));
                }
            }
            StatementKind::Global(names) => {
                let frame = self.frames.last_mut().context_runtime("no active scope")?;
                frame.global_names.extend(names.iter().cloned());
            }
            StatementKind::Del(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
            }
            StatementKind::Pass => {}
            StatementKind::Break => self.break_flag = true,
            StatementKind::Continue => self.continue_flag = true,
        }
        Ok(())
    }

    /// A branch whose condition asked about the platform and came out true
    /// is a platform region: flag merges inside it are also recorded in the
    /// platform block.
    fn execute_if(
        &mut self,
        condition: &Expr,
        then: &[Statement],
        elifs: &[(Expr, Vec<Statement>)],
        otherwise: Option<&[Statement]>,
    ) -> Result<(), InterpreterError> {
        let branches = core::iter::once((condition, then)).chain(elifs.iter().map(|(c, b)| (c, b.as_slice())));
        for (condition, body) in branches {
            let probes = self.platform_probes;
            if self.evaluate(condition)?.truthy() {
                let scoped = self.platform_probes != probes;
                if scoped {
                    self.platform_depth += 1;
                }
                let result = self.execute_block(body);
                if scoped {
                    self.platform_depth -= 1;
                }
                return result;
            }
        }
        match otherwise {
            Some(body) => self.execute_block(body),
            None => Ok(()),
        }
    }

    fn execute_try(
        &mut self,
        body: &[Statement],
        handlers: &[ExceptHandler],
        otherwise: Option<&[Statement]>,
        finally: Option<&[Statement]>,
    ) -> Result<(), InterpreterError> {
        let result = match self.execute_block(body) {
            Err(err) if !err.is_fatal() && !handlers.is_empty() => {
                debug!("exception caught: {err}");
                let handler = &handlers[0];
                match &handler.binding {
                    Some(binding) => self.bind(binding, Value::String(err.message())),
                    None => Ok(()),
                }
                .and_then(|()| self.execute_block(&handler.body))
            }
            Err(err) => Err(err),
            Ok(()) => match otherwise {
                Some(otherwise) if self.return_value.is_none() && !self.break_flag && !self.continue_flag => {
                    self.execute_block(otherwise)
                }
                _ => Ok(()),
            },
        };

        if let Some(finally) = finally {
            let pending = (self.return_value.take(), self.break_flag, self.continue_flag);
            self.break_flag = false;
            self.continue_flag = false;
            self.execute_block(finally)?;
            if self.return_value.is_none() && !self.break_flag && !self.continue_flag {
                (self.return_value, self.break_flag, self.continue_flag) = pending;
            }
        }
        result
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), InterpreterError> {
        match target {
            Expr::Identifier(name) => self.bind(name, value),
            Expr::Tuple(targets) | Expr::List(targets) => {
                let items = value.iterate()?;
                let star = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
                match star {
                    None => {
                        if items.len() != targets.len() {
                            bail_runtime_error!(
                                "ValueError: expected {} values to unpack, got {}",
                                targets.len(),
                                items.len()
                            );
                        }
                        for (target, item) in targets.iter().zip(items) {
                            self.assign(target, item)?;
                        }
                    }
                    Some(star) => {
                        let after = targets.len() - star - 1;
                        if items.len() < targets.len() - 1 {
                            bail_runtime_error!("ValueError: not enough values to unpack");
                        }
                        let rest_end = items.len() - after;
                        for (target, item) in targets[..star].iter().zip(&items[..star]) {
                            self.assign(target, item.clone())?;
                        }
                        if let Expr::Starred(inner) = &targets[star] {
                            self.assign(inner, Value::list(items[star..rest_end].to_vec()))?;
                        }
                        for (target, item) in targets[star + 1..].iter().zip(&items[rest_end..]) {
                            self.assign(target, item.clone())?;
                        }
                    }
                }
                Ok(())
            }
            Expr::Attribute(object, name) => {
                let object = self.evaluate(object)?;
                match &object {
                    Value::Object(obj) => obj.clone().set_attr(name, value, self),
                    other => bail_type_error!(
                        "cannot set attribute '{}' on '{}'",
                        name,
                        other.type_name()
                    ),
                }
            }
            Expr::Subscript(container, key) => {
                let container = self.evaluate(container)?;
                if let Expr::Slice(..) = key.as_ref() {
                    bail_type_error!("slice assignment is not supported");
                }
                let key = self.evaluate(key)?;
                self.set_item(&container, &key, value)
            }
            other => bail_runtime_error!("cannot assign to {:?}", other),
        }
    }

    fn augmented_assign(
        &mut self,
        target: &Expr,
        op: BinaryOperator,
        value: &Expr,
    ) -> Result<(), InterpreterError> {
        if let Expr::Subscript(container, key) = target {
            if !matches!(key.as_ref(), Expr::Slice(..)) {
                let container = self.evaluate(container)?;
                let key = self.evaluate(key)?;
                let rhs = self.evaluate(value)?;
                if let Some(env) = container.as_object::<Environment>() {
                    let name = key.coerce_string();
                    if op == BinaryOperator::Add && is_flag_var(&name) {
                        return env.append_var(&name, rhs, self);
                    }
                }
                let current = self.get_item(&container, &key)?;
                let updated = Self::combine(current, op, rhs)?;
                return self.set_item(&container, &key, updated);
            }
        }
        let current = self.evaluate(target)?;
        let rhs = self.evaluate(value)?;
        let in_place = matches!((op, &current), (BinaryOperator::Add, Value::List(_)));
        let updated = Self::combine(current, op, rhs)?;
        match target {
            Expr::Identifier(_) if in_place => Ok(()),
            _ => self.assign(target, updated),
        }
    }

    /// `current op rhs`, except that `list += iterable` extends in place so
    /// aliases observe it.
    fn combine(current: Value, op: BinaryOperator, rhs: Value) -> Result<Value, InterpreterError> {
        if let (BinaryOperator::Add, Value::List(items)) = (op, &current) {
            let extra = rhs.iterate()?;
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
        ops::binary(&current, op, &rhs)
    }

    fn delete(&mut self, target: &Expr) -> Result<(), InterpreterError> {
        match target {
            Expr::Identifier(name) => self.unbind(name),
            Expr::Subscript(container, key) => {
                let container = self.evaluate(container)?;
                let key = self.evaluate(key)?;
                match &container {
                    Value::Dict(dict) => {
                        let key = key.dict_key()?;
                        if dict.borrow_mut().shift_remove(&key).is_none() {
                            bail_runtime_error!("KeyError: '{}'", key);
                        }
                        Ok(())
                    }
                    Value::List(items) => {
                        let mut items = items.borrow_mut();
                        let len = items.len() as i64;
                        let index = key.as_integer()?;
                        let index = if index < 0 { index + len } else { index };
                        if !(0..len).contains(&index) {
                            bail_runtime_error!("IndexError: list assignment index out of range");
                        }
                        items.remove(index as usize);
                        Ok(())
                    }
                    other => bail_type_error!("'{}' object does not support item deletion", other.type_name()),
                }
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
                Ok(())
            }
            other => bail_runtime_error!("cannot delete {:?}", other),
        }
    }

    fn make_function(&mut self, def: Rc<FunctionDef>) -> Result<Value, InterpreterError> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.evaluate(expr)?),
                None => None,
            });
        }
        let frame = self.frame()?;
        Ok(Value::Function(Rc::new(Function {
            globals: Rc::downgrade(&frame.globals),
            closure: frame.enclosing(),
            def,
            defaults,
        })))
    }

    // Expressions.

    pub(crate) fn evaluate(&mut self, expr: &Expr) -> Result<Value, InterpreterError> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Integer(i) => Ok(Value::Integer(*i)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::FormatString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FormatPart::Literal(text) => out.push_str(text),
                        FormatPart::Expr(expr, spec) => {
                            let value = self.evaluate(expr)?;
                            match spec {
                                Some(spec) => out.push_str(&ops::format_spec(&value, spec)?),
                                None => out.push_str(&value.coerce_string()),
                            }
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Identifier(name) => self
                .lookup(name)
                .ok_or_else(|| InterpreterError::UndefinedVariable(name.clone().into())),
            Expr::List(items) => Ok(Value::list(self.evaluate_items(items)?)),
            Expr::Tuple(items) => Ok(Value::Tuple(self.evaluate_items(items)?)),
            Expr::Dict(entries) => {
                let mut dict = IndexMap::new();
                for (key, value) in entries {
                    if let Expr::None = key {
                        match self.evaluate(value)? {
                            Value::Dict(other) => {
                                dict.extend(other.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                            }
                            other => bail_type_error!("'{}' object is not a mapping", other.type_name()),
                        }
                        continue;
                    }
                    let key = self.evaluate(key)?.dict_key()?;
                    let value = self.evaluate(value)?;
                    dict.insert(key, value);
                }
                Ok(Value::dict(dict))
            }
            Expr::ListComp(element, clauses) => {
                let mut out = Vec::new();
                self.with_comprehension_scope(|interp| {
                    interp.comprehend(clauses, &mut |interp: &mut Interpreter| {
                        out.push(interp.evaluate(element)?);
                        Ok(())
                    })
                })?;
                Ok(Value::list(out))
            }
            Expr::DictComp(key, value, clauses) => {
                let mut out = IndexMap::new();
                self.with_comprehension_scope(|interp| {
                    interp.comprehend(clauses, &mut |interp: &mut Interpreter| {
                        let k = interp.evaluate(key)?.dict_key()?;
                        let v = interp.evaluate(value)?;
                        out.insert(k, v);
                        Ok(())
                    })
                })?;
                Ok(Value::dict(out))
            }
            Expr::Attribute(object, name) => {
                let object = self.evaluate(object)?;
                self.get_attribute(&object, name)
            }
            Expr::Subscript(container, key) => {
                let container = self.evaluate(container)?;
                if let Expr::Slice(start, stop, step) = key.as_ref() {
                    let start = self.evaluate_bound(start.as_deref())?;
                    let stop = self.evaluate_bound(stop.as_deref())?;
                    let step = self.evaluate_bound(step.as_deref())?;
                    return ops::slice(&container, start, stop, step);
                }
                let key = self.evaluate(key)?;
                self.get_item(&container, &key)
            }
            Expr::Slice(..) => bail_runtime_error!("slice outside of a subscript"),
            Expr::Call(callee, arguments) => self.evaluate_call(callee, arguments),
            Expr::BinaryOp(left, BinaryOperator::And, right) => {
                let left = self.evaluate(left)?;
                if left.truthy() { self.evaluate(right) } else { Ok(left) }
            }
            Expr::BinaryOp(left, BinaryOperator::Or, right) => {
                let left = self.evaluate(left)?;
                if left.truthy() { Ok(left) } else { self.evaluate(right) }
            }
            Expr::BinaryOp(left, op, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                ops::binary(&left, *op, &right)
            }
            Expr::UnaryOp(op, operand) => {
                let operand = self.evaluate(operand)?;
                ops::unary(*op, &operand)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.evaluate(first)?;
                for (op, right) in rest {
                    let right = self.evaluate(right)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Boolean(false));
                    }
                    left = right;
                }
                Ok(Value::Boolean(true))
            }
            Expr::TernaryOp(condition, if_true, if_false) => {
                if self.evaluate(condition)?.truthy() {
                    self.evaluate(if_true)
                } else {
                    self.evaluate(if_false)
                }
            }
            Expr::Lambda(def) => self.make_function(def.clone()),
            Expr::Starred(_) => bail_runtime_error!("starred expression outside of a list or call"),
        }
    }

    fn evaluate_items(&mut self, items: &[Expr]) -> Result<Vec<Value>, InterpreterError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Starred(inner) => out.extend(self.evaluate(inner)?.iterate()?),
                other => out.push(self.evaluate(other)?),
            }
        }
        Ok(out)
    }

    fn evaluate_bound(&mut self, expr: Option<&Expr>) -> Result<Option<i64>, InterpreterError> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.evaluate(expr)? {
                Value::None => Ok(None),
                value => value.as_integer().map(Some),
            },
        }
    }

    fn with_comprehension_scope<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, InterpreterError>,
    ) -> Result<T, InterpreterError> {
        let frame = self.frame()?;
        let scope = Frame {
            globals: frame.globals.clone(),
            locals: Some(namespace()),
            closure: frame.enclosing(),
            global_names: HashSet::new(),
        };
        self.frames.push(scope);
        let result = body(self);
        self.frames.pop();
        result
    }

    fn comprehend(
        &mut self,
        clauses: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> Result<(), InterpreterError>,
    ) -> Result<(), InterpreterError> {
        let Some((clause, rest)) = clauses.split_first() else {
            return emit(self);
        };
        for item in self.evaluate(&clause.iter)?.iterate()? {
            self.check_deadline()?;
            self.assign(&clause.target, item)?;
            let mut keep = true;
            for condition in &clause.conditions {
                if !self.evaluate(condition)?.truthy() {
                    keep = false;
                    break;
                }
            }
            if keep {
                self.comprehend(rest, emit)?;
            }
        }
        Ok(())
    }

    fn compare(
        &mut self,
        op: crate::parser::CompareOperator,
        left: &Value,
        right: &Value,
    ) -> Result<bool, InterpreterError> {
        use crate::parser::CompareOperator;
        if let (CompareOperator::In | CompareOperator::NotIn, Value::Object(obj)) = (op, right) {
            let found = obj.clone().contains(left, self)?;
            return Ok(if op == CompareOperator::In { found } else { !found });
        }
        ops::compare(op, left, right)
    }

    pub(crate) fn get_item(&mut self, container: &Value, key: &Value) -> Result<Value, InterpreterError> {
        match container {
            Value::Object(obj) => obj.clone().get_item(key, self),
            other => ops::index(other, key),
        }
    }

    pub(crate) fn set_item(
        &mut self,
        container: &Value,
        key: &Value,
        value: Value,
    ) -> Result<(), InterpreterError> {
        match container {
            Value::Object(obj) => obj.clone().set_item(key, value, self),
            Value::Dict(_) => {
                builtins::builders::note_builder(self, &key.dict_key()?, &value);
                ops::set_index(container, key, value)
            }
            other => ops::set_index(other, key, value),
        }
    }

    pub(crate) fn get_attribute(&mut self, value: &Value, name: &str) -> Result<Value, InterpreterError> {
        match value {
            Value::Object(obj) => {
                let obj = obj.clone();
                if let Some(attr) = obj.get_attr(name, self)? {
                    return Ok(attr);
                }
                if obj.has_method(name) || obj.has_fallback(name) {
                    return Ok(Value::Method(Box::new(value.clone()), name.to_string()));
                }
                bail_runtime_error!("AttributeError: '{}' object has no attribute '{}'", obj.class_name(), name)
            }
            Value::Function(function) if name == "__name__" => Ok(Value::String(function.def.name.clone())),
            Value::String(_) | Value::List(_) | Value::Dict(_) | Value::Tuple(_) => {
                Ok(Value::Method(Box::new(value.clone()), name.to_string()))
            }
            other => bail_runtime_error!(
                "AttributeError: '{}' object has no attribute '{}'",
                other.type_name(),
                name
            ),
        }
    }

    // Calls.

    fn evaluate_call(&mut self, callee: &Expr, arguments: &[Argument]) -> Result<Value, InterpreterError> {
        let callee = match callee {
            Expr::Attribute(object, name) => Callee::Method(self.evaluate(object)?, name.clone()),
            Expr::Identifier(name) => match self.lookup(name) {
                Some(value) => Callee::Value(value),
                None => Callee::Unknown(name.clone()),
            },
            other => Callee::Value(self.evaluate(other)?),
        };

        let mut args = Vec::with_capacity(arguments.len());
        let mut kwargs = Kwargs::new();
        for argument in arguments {
            match argument {
                Argument::Positional(expr) => args.push(self.evaluate(expr)?),
                Argument::Keyword(name, expr) => {
                    let value = self.evaluate(expr)?;
                    kwargs.insert(name.clone(), value);
                }
                Argument::Star(expr) => args.extend(self.evaluate(expr)?.iterate()?),
                Argument::DoubleStar(expr) => match self.evaluate(expr)? {
                    Value::Dict(dict) => {
                        kwargs.extend(dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    other => bail_type_error!("argument after ** must be a mapping, not {}", other.type_name()),
                },
            }
        }

        match callee {
            Callee::Method(receiver, name) => self.call_method(&receiver, &name, args, kwargs),
            Callee::Value(value) => self.call_value(&value, args, kwargs),
            Callee::Unknown(name) => Ok(self.unrecognized(&name)),
        }
    }

    pub(crate) fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, InterpreterError> {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(name) => builtins::call_global(name, args, kwargs, self),
            Value::Method(receiver, name) => self.call_method(receiver, name, args, kwargs),
            Value::Object(obj) => obj.clone().call(args, kwargs, self),
            other => bail_type_error!("'{}' object is not callable", other.type_name()),
        }
    }

    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value, InterpreterError> {
        match receiver {
            Value::Object(obj) => {
                let obj = obj.clone();
                if obj.has_method(name) {
                    return obj.call_method(name, args, kwargs, self);
                }
                if let Some(attr) = obj.get_attr(name, self)? {
                    if attr.is_callable() {
                        return self.call_value(&attr, args, kwargs);
                    }
                    if !obj.has_fallback(name) {
                        bail_type_error!("'{}' object is not callable", attr.type_name());
                    }
                }
                obj.fallback_method(name, args, kwargs, self)
            }
            Value::String(s) => builtins::string::call(s, name, args, kwargs, self),
            Value::List(items) => builtins::list::call(items, name, args, kwargs, self),
            Value::Tuple(items) => builtins::list::call_tuple(items, name, args),
            Value::Dict(dict) => builtins::dict::call(dict, name, args, kwargs, self),
            other => bail_runtime_error!(
                "AttributeError: '{}' object has no attribute '{}'",
                other.type_name(),
                name
            ),
        }
    }

    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        mut kwargs: Kwargs,
    ) -> Result<Value, InterpreterError> {
        if self.depth >= self.max_depth {
            bail_runtime_error!("RecursionError: maximum recursion depth ({}) exceeded", self.max_depth);
        }
        let def = &function.def;
        let globals = function
            .globals
            .upgrade()
            .context_runtime("function outlived its defining script")?;

        let locals = namespace();
        {
            let mut scope = locals.borrow_mut();
            let mut args = args.into_iter();
            for (param, default) in def.params.iter().zip(&function.defaults) {
                let value = match args.next() {
                    Some(value) => {
                        if kwargs.contains_key(&param.name) {
                            bail_type_error!("{}() got multiple values for argument '{}'", def.name, param.name);
                        }
                        value
                    }
                    None => match kwargs.shift_remove(&param.name).or_else(|| default.clone()) {
                        Some(value) => value,
                        None => bail_type_error!("{}() missing required argument: '{}'", def.name, param.name),
                    },
                };
                scope.insert(param.name.clone(), value);
            }
            let extra: Vec<Value> = args.collect();
            match &def.varargs {
                Some(name) => {
                    scope.insert(name.clone(), Value::Tuple(extra));
                }
                None if !extra.is_empty() => bail_type_error!(
                    "{}() takes {} positional arguments but {} were given",
                    def.name,
                    def.params.len(),
                    def.params.len() + extra.len()
                ),
                None => {}
            }
            match &def.kwargs {
                Some(name) => {
                    scope.insert(name.clone(), Value::dict(kwargs));
                }
                None => {
                    if let Some(name) = kwargs.keys().next() {
                        bail_type_error!("{}() got an unexpected keyword argument '{}'", def.name, name);
                    }
                }
            }
        }

        self.frames.push(Frame {
            globals,
            locals: Some(locals),
            closure: function.closure.clone(),
            global_names: HashSet::new(),
        });
        self.depth += 1;
        let def = function.def.clone();
        let result = self.execute_block(&def.body);
        self.depth -= 1;
        self.frames.pop();
        let returned = self.return_value.take();
        self.break_flag = false;
        self.continue_flag = false;
        result?;
        Ok(returned.unwrap_or(Value::None))
    }

    // Imports.

    fn import(&mut self, name: &str) -> Result<Value, InterpreterError> {
        if let Some(module) = builtins::modules::host_module(name) {
            return Ok(module);
        }
        if name == "SCons" || name.starts_with("SCons.") {
            return Ok(Opaque::new(name).into_object());
        }

        let relative = format!("{}.py", name.replace('.', "/"));
        let candidates = [
            self.script_dir().join(&relative),
            Path::from(&relative),
            Path::from("site_scons").join(&relative),
        ];
        for candidate in candidates {
            let candidate = candidate.normalize();
            if !self.runtime.is_file(&self.host_path(&candidate)).unwrap_or(false) {
                continue;
            }
            return match self.load_script(&candidate, IndexMap::new(), IndexMap::new()) {
                Ok(handle) => Ok(ScriptModule::new(name, handle.payload.globals.clone()).into_object()),
                Err(err) if err.is_timeout() => Err(InterpreterError::Include(Box::new(err))),
                Err(err) => {
                    self.warning(format_args!("import of '{name}' failed: {err}"));
                    Ok(Opaque::new(name).into_object())
                }
            };
        }
        debug!("import {name}: not a project module, binding an opaque module");
        Ok(Opaque::new(name).into_object())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use core::time::Duration;

    use super::*;
    use crate::runtime::memory::MemoryRuntime;

    pub(crate) fn interpreter(runtime: MemoryRuntime, options: ConvertOptions) -> Interpreter {
        let mut interp = Interpreter::new(
            Rc::new(runtime),
            Rc::new(options),
            Path::new(),
            ModuleRegistry::new(),
        );
        interp.start("test");
        interp
    }

    /// Runs `source` as the root script and returns the session.
    pub(crate) fn run_with(
        source: &str,
        runtime: MemoryRuntime,
        options: ConvertOptions,
    ) -> (Result<(), IncludeError>, Execution) {
        let mut interp = interpreter(runtime.with_file("SConstruct", source), options);
        let result = interp.run_script(&Path::from("SConstruct")).map(|_| ());
        (result, interp.finish())
    }

    pub(crate) fn run(source: &str) -> Execution {
        let (result, execution) = run_with(source, MemoryRuntime::new(), ConvertOptions::default());
        if let Err(err) = result {
            panic!("script failed: {err}");
        }
        execution
    }

    pub(crate) fn var(execution: &Execution, name: &str) -> String {
        match execution.graph.variables().get(name) {
            Some(value) => format!("{value:?}"),
            None => panic!("variable {name} not exported"),
        }
    }

    fn string_var(execution: &Execution, name: &str) -> String {
        match execution.graph.variables().get(name) {
            Some(crate::graph::VarValue::Scalar(crate::graph::Scalar::String(s))) => s.clone(),
            other => panic!("{name} is not a string: {other:?}"),
        }
    }

    fn int_var(execution: &Execution, name: &str) -> i64 {
        match execution.graph.variables().get(name) {
            Some(crate::graph::VarValue::Scalar(crate::graph::Scalar::Integer(i))) => *i,
            other => panic!("{name} is not an int: {other:?}"),
        }
    }

    #[test]
    fn test_control_flow() {
        let execution = run(r#"
total = 0
for i in range(10):
    if i % 2:
        continue
    if i > 6:
        break
    total += i
else:
    total = -1
n = 0
while True:
    n += 1
    if n == 3:
        break
"#);
        assert_eq!(int_var(&execution, "total"), 12);
        assert_eq!(int_var(&execution, "n"), 3);
    }

    #[test]
    fn test_functions_and_closures() {
        let execution = run(r#"
def make_prefixer(prefix, sep="-"):
    def apply(name, *rest, **opts):
        return prefix + sep + name + str(len(rest)) + opts.get("suffix", "")
    return apply

p = make_prefixer("lib")
name = p("core", 1, 2, suffix=".a")
square = lambda x: x * x
sq = square(7)

def fact(n):
    return 1 if n <= 1 else n * fact(n - 1)
f = fact(10)
"#);
        assert_eq!(string_var(&execution, "name"), "lib-core2.a");
        assert_eq!(int_var(&execution, "sq"), 49);
        assert_eq!(int_var(&execution, "f"), 3628800);
        assert!(!execution.graph.variables().contains_key("p"));
    }

    #[test]
    fn test_globals_and_unpacking() {
        let execution = run(r#"
counter = 0
def bump():
    global counter
    counter += 1
bump()
bump()
a, (b, c) = 1, [2, 3]
first, *rest = "xyz"
"#);
        assert_eq!(int_var(&execution, "counter"), 2);
        assert_eq!(int_var(&execution, "c"), 3);
        assert_eq!(string_var(&execution, "first"), "x");
        assert_eq!(var(&execution, "rest"), var(&run("rest = ['y', 'z']"), "rest"));
    }

    #[test]
    fn test_comprehensions_do_not_leak() {
        let execution = run(r#"
files = ["a.cpp", "b.h", "c.cpp"]
srcs = [f.upper() for f in files if f.endswith(".cpp")]
lookup = {f: i for i, f in enumerate(files)}
b_index = lookup["b.h"]
"#);
        assert_eq!(var(&execution, "srcs"), var(&run("srcs = ['A.CPP', 'C.CPP']"), "srcs"));
        assert_eq!(int_var(&execution, "b_index"), 1);
        assert!(!execution.graph.variables().contains_key("f"));
    }

    #[test]
    fn test_list_aliasing_and_in_place_add() {
        let execution = run(r#"
a = ["x"]
b = a
b += ["y"]
c = a + ["z"]
count = len(a)
"#);
        assert_eq!(int_var(&execution, "count"), 2);
        assert_eq!(var(&execution, "c"), var(&run("c = ['x', 'y', 'z']"), "c"));
    }

    #[test]
    fn test_try_except_finally() {
        let execution = run(r#"
log = []
try:
    raise ValueError("bad value")
except Exception as e:
    log.append(str(e))
finally:
    log.append("done")
try:
    missing_name
except:
    log.append("caught")
else:
    log.append("unreachable")
"#);
        assert_eq!(
            var(&execution, "log"),
            var(&run("log = ['bad value', 'done', 'caught']"), "log")
        );
    }

    #[test]
    fn test_undefined_variable_is_located() {
        let (result, _) = run_with("x = 1\ny = nope\n", MemoryRuntime::new(), ConvertOptions::default());
        let err = result.unwrap_err();
        let IncludeError::Execution { source, .. } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(source.to_string(), "SConstruct:2: Undefined variable: nope");
    }

    #[test]
    fn test_unknown_call_is_recorded_and_execution_continues() {
        let execution = run("before = 1\nresult = frobnicate(1, 2)\nafter = 2\n");
        assert_eq!(int_var(&execution, "after"), 2);
        let calls = execution.graph.unrecognized_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "frobnicate");
        assert_eq!(calls[0].line, 2);
        assert_eq!(execution.warnings, 1);
    }

    #[test]
    fn test_recursion_limit() {
        let mut interp = interpreter(
            MemoryRuntime::new().with_file("SConstruct", "def f(n):\n    return f(n + 1)\nf(0)\n"),
            ConvertOptions::default(),
        );
        interp.set_max_depth(20);
        let err = interp.run_script(&Path::from("SConstruct")).unwrap_err();
        assert!(err.to_string().contains("maximum recursion depth"), "{err}");
    }

    #[test]
    fn test_timeout_keeps_partial_graph() {
        let options = ConvertOptions {
            timeout: Some(Duration::from_millis(50)),
            ..ConvertOptions::default()
        };
        let (result, execution) = run_with(
            "Program('early', ['a.c'])\nwhile True:\n    pass\n",
            MemoryRuntime::new(),
            options,
        );
        assert!(result.unwrap_err().is_timeout());
        assert_eq!(execution.graph.targets().len(), 1);
    }

    #[test]
    fn test_exit_zero_is_success() {
        let execution = run("a = 1\nExit(0)\nb = 2\n");
        assert_eq!(int_var(&execution, "a"), 1);
        assert!(!execution.graph.variables().contains_key("b"));
    }

    #[test]
    fn test_formatting() {
        let execution = run(r#"
name = "core"
a = f"lib{name}.{1 + 1:03d}"
b = "%s-%d" % (name, 4)
c = "{}/{name}".format("src", name=name)
d = "-".join(sorted(["b", "a"]))
"#);
        assert_eq!(string_var(&execution, "a"), "libcore.002");
        assert_eq!(string_var(&execution, "b"), "core-4");
        assert_eq!(string_var(&execution, "c"), "src/core");
        assert_eq!(string_var(&execution, "d"), "a-b");
    }

    #[test]
    fn test_local_python_module_import() {
        let runtime = MemoryRuntime::new().with_file(
            "methods.py",
            "def lib_name(n):\n    return 'lib' + n\nVALUE = 3\n",
        );
        let (result, execution) = run_with(
            "import methods\nfrom methods import VALUE as v\nname = methods.lib_name('x')\n",
            runtime,
            ConvertOptions::default(),
        );
        result.unwrap();
        assert_eq!(string_var(&execution, "name"), "libx");
        assert_eq!(int_var(&execution, "v"), 3);
    }
}
