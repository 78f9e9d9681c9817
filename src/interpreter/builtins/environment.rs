//! Construction environments: an ordered map of construction variables
//! with the SCons method table on top.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{Mode, python_platform};
use crate::graph::{PlatformSetting, TargetKind, VarValue};
use crate::interpreter::builtins::{builders, builtin_impl, call_global, godot, script, targets, utils, variables};
use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::value::{CopyMemo, Visiting, py_eq};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};

/// Variables that always hold lists and merge additively.
const FLAG_VARS: &[&str] = &[
    "CCFLAGS",
    "CFLAGS",
    "CXXFLAGS",
    "LINKFLAGS",
    "CPPDEFINES",
    "CPPPATH",
    "LIBS",
    "LIBPATH",
];

/// Bookkeeping variables that are never exported as graph variables.
const INTERNAL_VARS: &[&str] = &["BUILDERS", "ENV", "TOOLS"];

/// Global builders that are also available as environment methods.
const FORWARDED: &[&str] = &[
    "Glob",
    "File",
    "Dir",
    "Entry",
    "Value",
    "Object",
    "StaticObject",
    "SharedObject",
    "Alias",
    "Default",
    "Install",
    "InstallAs",
    "Clean",
    "NoClean",
    "AlwaysBuild",
    "NoCache",
    "Ignore",
    "Precious",
    "SideEffect",
    "AddPostAction",
    "AddPreAction",
    "SConsignFile",
    "CacheDir",
    "Decider",
    "SetOption",
    "GetOption",
    "WhereIs",
    "Split",
    "Flatten",
    "Help",
    "Builder",
    "Action",
    "Command",
    "Export",
    "Import",
    "Return",
];

pub(crate) fn is_flag_var(name: &str) -> bool {
    FLAG_VARS.contains(&name)
}

#[derive(Debug, Default)]
struct EnvState {
    /// Construction variables the scripts set or touched.
    vars: RefCell<IndexMap<String, Value>>,
    /// Plain Python attributes such as `env.core_sources`.
    attrs: RefCell<IndexMap<String, Value>>,
}

/// A construction environment. Cloning the handle shares the state;
/// `env.Clone()` copies it.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    state: Rc<EnvState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Append,
    AppendUnique,
    Prepend,
    PrependUnique,
    Replace,
}

impl Merge {
    fn unique(self) -> bool {
        matches!(self, Merge::AppendUnique | Merge::PrependUnique)
    }

    fn prepend(self) -> bool {
        matches!(self, Merge::Prepend | Merge::PrependUnique)
    }
}

fn define(name: &str, value: &Value) -> Value {
    match value {
        Value::None => Value::string(name),
        value => Value::String(format!("{name}={}", value.coerce_string())),
    }
}

/// `CPPDEFINES` entries as `NAME` / `NAME=VALUE` strings.
fn defines(value: &Value) -> Vec<Value> {
    match value {
        Value::None => Vec::new(),
        Value::Tuple(items) if items.len() == 2 && !matches!(items[0], Value::List(_) | Value::Tuple(_)) => {
            vec![define(&items[0].coerce_string(), &items[1])]
        }
        Value::Tuple(items) => items.iter().flat_map(defines).collect(),
        Value::List(items) => items.borrow().iter().flat_map(defines).collect(),
        Value::Dict(dict) => dict.borrow().iter().map(|(k, v)| define(k, v)).collect(),
        Value::String(s) => vec![Value::String(s.clone())],
        other => vec![Value::String(other.coerce_string())],
    }
}

/// Items a flag variable holds after merging `value` into it.
pub(crate) fn flag_items(name: &str, value: &Value) -> Vec<Value> {
    if name == "CPPDEFINES" {
        return defines(value);
    }
    let split = name.ends_with("FLAGS");
    let mut out = Vec::new();
    for item in utils::flatten([value]) {
        match item {
            Value::None => {}
            Value::String(s) if split => out.extend(s.split_whitespace().map(Value::string)),
            other => out.push(other),
        }
    }
    out
}

/// Items of a non-flag value being merged into a list.
fn plain_items(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.clone(),
        Value::None => Vec::new(),
        other => vec![other.clone()],
    }
}

fn merge_lists(current: &mut Vec<Value>, items: Vec<Value>, mode: Merge) {
    let items: Vec<Value> = if mode.unique() {
        let mut unique: Vec<Value> = Vec::new();
        for item in items {
            if !current.iter().chain(&unique).any(|seen| py_eq(seen, &item)) {
                unique.push(item);
            }
        }
        unique
    } else {
        items
    };
    if mode.prepend() {
        current.splice(0..0, items);
    } else {
        current.extend(items);
    }
}

fn platform_setting(name: &str) -> Option<PlatformSetting> {
    match name {
        "CPPDEFINES" => Some(PlatformSetting::Definition),
        "CCFLAGS" | "CFLAGS" | "CXXFLAGS" => Some(PlatformSetting::CompileOption),
        "LIBS" => Some(PlatformSetting::LinkLibrary),
        _ => None,
    }
}

/// Default of a construction variable nobody set, for the target platform.
fn default_var(name: &str, interp: &mut Interpreter) -> Option<Value> {
    let platform = interp.options.platform.clone();
    let windows = platform == "windows";
    let value = match name {
        "CC" => if windows { "cl" } else { "cc" },
        "CXX" => if windows { "cl" } else { "c++" },
        "LINK" => if windows { "link" } else { "c++" },
        "AR" => if windows { "lib" } else { "ar" },
        "LIBPREFIX" | "SHLIBPREFIX" => if windows { "" } else { "lib" },
        "LIBSUFFIX" => if windows { ".lib" } else { ".a" },
        "SHLIBSUFFIX" => match platform.as_str() {
            "windows" => ".dll",
            "macos" | "ios" => ".dylib",
            _ => ".so",
        },
        "PROGSUFFIX" => if windows { ".exe" } else { "" },
        "OBJSUFFIX" => if windows { ".obj" } else { ".o" },
        "SHOBJSUFFIX" => if windows { ".obj" } else { ".os" },
        "PLATFORM" | "HOST_OS" => {
            interp.probe_platform();
            match python_platform(&platform) {
                "linux" => "posix",
                other => other,
            }
        }
        "TARGET_ARCH" | "HOST_ARCH" => {
            interp.probe_platform();
            return Some(Value::String(interp.options.arch.clone()));
        }
        _ => return None,
    };
    Some(Value::string(value))
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Value {
        self.clone().into_object()
    }

    pub fn same(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Items of a list variable as the scripts set them; empty when unset.
    pub(crate) fn list(&self, name: &str) -> Vec<Value> {
        match self.state.vars.borrow().get(name) {
            Some(value) if is_flag_var(name) => flag_items(name, value),
            Some(value) => plain_items(value),
            None => Vec::new(),
        }
    }

    /// A stored variable, without defaults or side effects.
    pub(crate) fn stored(&self, name: &str) -> Option<Value> {
        self.state.vars.borrow().get(name).cloned()
    }

    pub(crate) fn set(&self, name: &str, value: Value) {
        let value = if is_flag_var(name) {
            Value::list(flag_items(name, &value))
        } else {
            value
        };
        self.state.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// `env[name]`: reserved keys, stored variables, then defaults.
    pub(crate) fn lookup(&self, name: &str, interp: &mut Interpreter) -> Option<Value> {
        match name {
            "platform" => {
                interp.probe_platform();
                return Some(Value::String(interp.options.platform.clone()));
            }
            "arch" => {
                interp.probe_platform();
                return Some(Value::String(interp.options.arch.clone()));
            }
            _ => {}
        }
        if let Some(value) = self.stored(name) {
            return Some(value);
        }
        // Containers are created on first read so in-place edits stick.
        let created = match name {
            "BUILDERS" | "ENV" => Some(Value::dict(IndexMap::new())),
            name if is_flag_var(name) => Some(Value::list(Vec::new())),
            _ => None,
        };
        if let Some(value) = created {
            self.state.vars.borrow_mut().insert(name.to_string(), value.clone());
            return Some(value);
        }
        if interp.options.mode == Mode::Godot {
            if let Some(value) = godot::default_var(name, interp) {
                return Some(value);
            }
        }
        default_var(name, interp)
    }

    fn contains_var(&self, name: &str) -> bool {
        matches!(name, "platform" | "arch") || self.state.vars.borrow().contains_key(name)
    }

    /// `env[name] += value` on a flag variable, merged like `Append` so a
    /// platform branch records it too.
    pub(crate) fn append_var(&self, name: &str, value: Value, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        let mut kwargs = Kwargs::new();
        kwargs.insert(name.to_string(), value);
        self.merge(kwargs, Merge::Append, interp)
    }

    fn merge(&self, kwargs: Kwargs, mode: Merge, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        for (name, value) in kwargs {
            if name == "BUILDERS" {
                self.merge_builders(&value, interp)?;
                continue;
            }
            if is_flag_var(&name) {
                let items = flag_items(&name, &value);
                if mode != Merge::Replace && interp.in_platform_region() {
                    if let Some(setting) = platform_setting(&name) {
                        let platform = interp.options.platform.clone();
                        let values = items.iter().filter_map(targets::link_name).collect();
                        interp.graph.add_platform_setting(&platform, setting, values);
                    }
                }
                let mut current = match mode {
                    Merge::Replace => Vec::new(),
                    _ => self.list(&name),
                };
                merge_lists(&mut current, items, mode);
                self.state.vars.borrow_mut().insert(name, Value::list(current));
                continue;
            }

            let current = self.stored(&name);
            let merged = match (mode, current) {
                (Merge::Replace, _) | (_, None) => match &value {
                    Value::List(items) => Value::list(items.borrow().clone()),
                    _ => value,
                },
                (_, Some(Value::List(items))) => {
                    let mut current = items.borrow().clone();
                    merge_lists(&mut current, plain_items(&value), mode);
                    Value::list(current)
                }
                (_, Some(Value::Dict(dict))) if matches!(value, Value::Dict(_)) => {
                    let mut current = dict.borrow().clone();
                    if let Value::Dict(extra) = &value {
                        current.extend(extra.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    Value::dict(current)
                }
                (_, Some(Value::String(current))) if matches!(value, Value::String(_)) && !mode.unique() => {
                    let extra = value.coerce_string();
                    if mode.prepend() {
                        Value::String(format!("{extra}{current}"))
                    } else {
                        Value::String(format!("{current}{extra}"))
                    }
                }
                (_, Some(current)) => {
                    let mut list = vec![current];
                    merge_lists(&mut list, plain_items(&value), mode);
                    Value::list(list)
                }
            };
            self.state.vars.borrow_mut().insert(name, merged);
        }
        Ok(())
    }

    fn merge_builders(&self, value: &Value, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        let Value::Dict(entries) = value else {
            bail_runtime_error!("BUILDERS must be a dictionary, got {}", value.type_name());
        };
        let entries: Vec<(String, Value)> = entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let builders = self.lookup("BUILDERS", interp).unwrap_or(Value::None);
        let Value::Dict(table) = builders else {
            bail_runtime_error!("BUILDERS was replaced by a non-dictionary");
        };
        for (name, builder) in entries {
            builders::note_builder(interp, &name, &builder);
            table.borrow_mut().insert(name, builder);
        }
        Ok(())
    }

    /// Independent copy of the variables and attributes.
    pub fn copy(&self) -> Environment {
        self.copy_with(&mut CopyMemo::default())
    }

    fn copy_with(&self, memo: &mut CopyMemo) -> Environment {
        let key = Rc::as_ptr(&self.state).cast::<()>();
        if let Some(Value::Object(copy)) = memo.get(key) {
            if let Some(env) = copy.downcast::<Environment>() {
                return env.clone();
            }
        }
        let copy = Environment::default();
        memo.insert(key, Value::Object(Rc::new(copy.clone())));
        let copy_map = |map: &RefCell<IndexMap<String, Value>>, memo: &mut CopyMemo| {
            map.borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.deep_copy_with(memo)))
                .collect::<IndexMap<_, _>>()
        };
        let vars = copy_map(&self.state.vars, memo);
        let attrs = copy_map(&self.state.attrs, memo);
        *copy.state.vars.borrow_mut() = vars;
        *copy.state.attrs.borrow_mut() = attrs;
        copy
    }

    /// `$VAR` / `${VAR}` expansion; unknown variables expand to nothing.
    pub(crate) fn substitute(&self, text: &str, interp: &mut Interpreter) -> String {
        let mut current = text.to_string();
        for _ in 0..8 {
            if !current.contains('$') {
                break;
            }
            let expanded = self.substitute_once(&current, interp);
            if expanded == current {
                break;
            }
            current = expanded;
        }
        current
    }

    fn substitute_once(&self, text: &str, interp: &mut Interpreter) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let name = match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                        name.push(c);
                    }
                    name
                }
                _ => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if !(c.is_ascii_alphanumeric() || c == '_') {
                            break;
                        }
                        name.push(c);
                        chars.next();
                    }
                    if name.is_empty() {
                        out.push('$');
                        continue;
                    }
                    name
                }
            };
            match self.lookup(&name, interp) {
                Some(Value::List(items)) => {
                    let items: Vec<String> = items.borrow().iter().map(Value::coerce_string).collect();
                    out.push_str(&items.join(" "));
                }
                Some(Value::None) | None => {}
                Some(value) => out.push_str(&value.coerce_string()),
            }
        }
        out
    }

    // Script-visible methods.

    fn clone_method(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let copy = self.copy();
        let kwargs = strip_tool_kwargs(kwargs);
        copy.merge(kwargs, Merge::Replace, interp)?;
        Ok(copy.handle())
    }

    fn append(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.merge(kwargs, Merge::Append, interp)?;
        Ok(Value::None)
    }

    fn append_unique(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.merge(kwargs, Merge::AppendUnique, interp)?;
        Ok(Value::None)
    }

    fn prepend(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.merge(kwargs, Merge::Prepend, interp)?;
        Ok(Value::None)
    }

    fn prepend_unique(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.merge(kwargs, Merge::PrependUnique, interp)?;
        Ok(Value::None)
    }

    fn replace(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.merge(kwargs, Merge::Replace, interp)?;
        Ok(Value::None)
    }

    fn set_default(&self, _args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let missing: Kwargs = kwargs
            .into_iter()
            .filter(|(name, _)| !self.contains_var(name))
            .collect();
        self.merge(missing, Merge::Replace, interp)?;
        Ok(Value::None)
    }

    fn get(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let name = args.first().context_type("get() expects a key")?.coerce_string();
        let found = self.lookup(&name, interp).filter(|v| !v.is_none());
        Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
    }

    fn has_key(&self, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let name = args.first().context_type("has_key() expects a key")?.coerce_string();
        Ok(Value::Boolean(self.contains_var(&name)))
    }

    fn keys(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let keys = self.state.vars.borrow().keys().cloned().map(Value::String).collect();
        Ok(Value::list(keys))
    }

    fn dictionary(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        if args.is_empty() {
            return Ok(Value::dict(self.state.vars.borrow().clone()));
        }
        let mut out = IndexMap::new();
        for name in utils::strings(&args) {
            let value = self.lookup(&name, interp).unwrap_or(Value::None);
            out.insert(name, value);
        }
        Ok(Value::dict(out))
    }

    fn subst(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let text = args.first().context_type("subst() expects a string")?.coerce_string();
        Ok(Value::String(self.substitute(&text, interp)))
    }

    fn tool(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let Some(Value::List(tools)) = self.lookup("TOOLS", interp).or_else(|| {
            let tools = Value::list(Vec::new());
            self.state.vars.borrow_mut().insert("TOOLS".into(), tools.clone());
            Some(tools)
        }) else {
            return Ok(Value::None);
        };
        tools.borrow_mut().extend(utils::strings(&args).into_iter().map(Value::String));
        Ok(Value::None)
    }

    /// `-I`, `-D`, `-L` and `-l` go to their variables, the rest to
    /// `CCFLAGS`.
    fn merge_flags(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let unique = args.get(1).or(kwargs.get("unique")).is_none_or(Value::truthy);
        let mode = if unique { Merge::AppendUnique } else { Merge::Append };
        match args.first() {
            Some(Value::Dict(dict)) => {
                let kwargs: Kwargs = dict.borrow().clone();
                self.merge(kwargs, mode, interp)?;
            }
            Some(value) => {
                let parsed = parse_flags(&utils::strings([value]));
                self.merge(parsed, mode, interp)?;
            }
            None => {}
        }
        Ok(Value::None)
    }

    fn parse_flags(&self, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::dict(parse_flags(&utils::strings(&args))))
    }

    fn parse_config(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let command = utils::strings(&args).join(" ");
        interp.warning(format_args!("ParseConfig('{command}') not run; flags it would add are missing"));
        Ok(Value::None)
    }

    fn detect(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        for program in utils::names(&args) {
            if interp.runtime.find_program(&program).is_ok() {
                return Ok(Value::String(program));
            }
        }
        Ok(Value::None)
    }

    fn env_path(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let name = args.first().context_type("expected a variable name")?.coerce_string();
        let Some(Value::Dict(env)) = self.lookup("ENV", interp) else {
            return Ok(Value::None);
        };
        let extra = utils::strings(args.get(1..).unwrap_or_default());
        let mut env = env.borrow_mut();
        let mut parts: Vec<String> = match env.get(&name) {
            Some(current) => vec![current.coerce_string()],
            None => Vec::new(),
        };
        parts.extend(extra);
        env.insert(name, Value::String(parts.join(":")));
        Ok(Value::None)
    }

    fn program(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::declare(self, TargetKind::Executable, args, kwargs, interp)
    }

    fn static_library(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::declare(self, TargetKind::StaticLibrary, args, kwargs, interp)
    }

    fn shared_library(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::declare(self, TargetKind::SharedLibrary, args, kwargs, interp)
    }

    fn loadable_module(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::declare(self, TargetKind::Module, args, kwargs, interp)
    }

    fn depends(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::depends(args, kwargs, interp)
    }

    fn sconscript(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        script::sconscript(args, kwargs, interp)
    }

    fn add_method(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        builders::add_method(args, kwargs, interp)
    }

    fn add_source_files(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        targets::add_source_files_to(Some(self), args, kwargs, interp)
    }

    fn configure(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Configure { env: self.clone() }.into_object())
    }

    fn godot_library(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("add_library", args, kwargs, interp, |env, a, k, i| godot::add_library(env, a, k, i))
    }

    fn godot_program(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("add_program", args, kwargs, interp, |env, a, k, i| godot::add_program(env, a, k, i))
    }

    fn godot_shared_library(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("add_shared_library", args, kwargs, interp, |env, a, k, i| {
            godot::add_shared_library(env, a, k, i)
        })
    }

    fn godot_version_string(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("add_module_version_string", args, kwargs, interp, |env, a, k, i| {
            godot::add_module_version_string(env, a, k, i)
        })
    }

    fn godot_disable_warnings(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("disable_warnings", args, kwargs, interp, |env, a, k, i| {
            godot::disable_warnings(env, a, k, i)
        })
    }

    fn godot_command(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("CommandNoCache", args, kwargs, interp, |_, a, k, i| builders::command(a, k, i))
    }

    fn godot_run(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        self.godot_only("Run", args, kwargs, interp, |_, a, k, i| builders::action(a, k, i))
    }

    fn godot_only(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        interp: &mut Interpreter,
        method: impl FnOnce(&Environment, Vec<Value>, Kwargs, &mut Interpreter) -> Result<Value, InterpreterError>,
    ) -> Result<Value, InterpreterError> {
        if interp.options.mode == Mode::Godot {
            method(self, args, kwargs, interp)
        } else {
            self.fallback_method(name, args, kwargs, interp)
        }
    }

    fn is_builder(&self, name: &str, interp: &Interpreter) -> bool {
        let in_table = match self.state.vars.borrow().get("BUILDERS") {
            Some(Value::Dict(table)) => table.borrow().contains_key(name),
            _ => false,
        };
        in_table || interp.graph.has_custom_builder(name)
    }
}

/// Tool selection keywords have no build-graph meaning.
fn strip_tool_kwargs(mut kwargs: Kwargs) -> Kwargs {
    for name in ["tools", "toolpath", "platform", "parse_flags"] {
        kwargs.shift_remove(name);
    }
    kwargs
}

fn parse_flags(flags: &[String]) -> Kwargs {
    let mut parsed: IndexMap<&str, Vec<Value>> = IndexMap::new();
    let words: Vec<&str> = flags.iter().flat_map(|f| f.split_whitespace()).collect();
    let mut words = words.into_iter();
    while let Some(word) = words.next() {
        let (name, value) = if let Some(rest) = word.strip_prefix("-I") {
            ("CPPPATH", rest)
        } else if let Some(rest) = word.strip_prefix("-D") {
            ("CPPDEFINES", rest)
        } else if let Some(rest) = word.strip_prefix("-L") {
            ("LIBPATH", rest)
        } else if let Some(rest) = word.strip_prefix("-l") {
            ("LIBS", rest)
        } else if word.starts_with("-Wl,") {
            ("LINKFLAGS", word)
        } else {
            ("CCFLAGS", word)
        };
        // `-I dir` with a separate argument.
        let value = if value.is_empty() && name != "CCFLAGS" {
            words.next().unwrap_or_default()
        } else {
            value
        };
        parsed.entry(name).or_default().push(Value::string(value));
    }
    parsed
        .into_iter()
        .map(|(name, items)| (name.to_string(), Value::list(items)))
        .collect()
}

impl ScriptObject for Environment {
    fn class_name(&self) -> &'static str {
        "SConsEnvironment"
    }

    builtin_impl!(
        "Clone" => clone_method,
        "Append" => append,
        "AppendUnique" => append_unique,
        "Prepend" => prepend,
        "PrependUnique" => prepend_unique,
        "Replace" => replace,
        "SetDefault" => set_default,
        "get" => get,
        "has_key" => has_key,
        "keys" => keys,
        "Dictionary" => dictionary,
        "subst" => subst,
        "Tool" => tool,
        "MergeFlags" => merge_flags,
        "ParseFlags" => parse_flags,
        "ParseConfig" => parse_config,
        "Detect" => detect,
        "AppendENVPath" => env_path,
        "PrependENVPath" => env_path,
        "Program" => program,
        "StaticLibrary" => static_library,
        "Library" => static_library,
        "SharedLibrary" => shared_library,
        "LoadableModule" => loadable_module,
        "Depends" => depends,
        "Requires" => depends,
        "SConscript" => sconscript,
        "AddMethod" => add_method,
        "add_source_files" => add_source_files,
        "Configure" => configure,
        "add_library" => godot_library,
        "add_program" => godot_program,
        "add_shared_library" => godot_shared_library,
        "add_module_version_string" => godot_version_string,
        "disable_warnings" => godot_disable_warnings,
        "CommandNoCache" => godot_command,
        "Run" => godot_run,
    );

    /// Forwarded globals, builders from `BUILDERS` or `AddMethod`, and
    /// anything else as an unrecognized call.
    fn fallback_method(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        if FORWARDED.contains(&name) {
            return call_global(name, args, kwargs, interp);
        }
        if self.is_builder(name, interp) {
            return builders::invoke(name, args, kwargs, interp);
        }
        Ok(interp.unrecognized(&format!("env.{name}")))
    }

    fn has_fallback(&self, _name: &str) -> bool {
        true
    }

    fn get_attr(&self, name: &str, interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        if let Some(value) = self.state.attrs.borrow().get(name) {
            return Ok(Some(value.clone()));
        }
        if self.has_method(name) || FORWARDED.contains(&name) || self.is_builder(name, interp) {
            return Ok(None);
        }
        if let Some(value) = self.lookup(name, interp) {
            return Ok(Some(value));
        }
        // Unknown capitalized names are builders the scripts expect to
        // exist; anything else reads as unset.
        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return Ok(None);
        }
        debug!("env.{name} is not set");
        Ok(Some(Value::None))
    }

    fn set_attr(&self, name: &str, value: Value, _interp: &mut Interpreter) -> Result<(), InterpreterError> {
        let is_var = name.starts_with(|c: char| c.is_ascii_uppercase()) || self.state.vars.borrow().contains_key(name);
        if is_var {
            self.set(name, value);
        } else {
            self.state.attrs.borrow_mut().insert(name.to_string(), value);
        }
        Ok(())
    }

    fn get_item(&self, key: &Value, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let name = key.coerce_string();
        match self.lookup(&name, interp) {
            Some(value) => Ok(value),
            None => {
                debug!("env['{name}'] is not set");
                Ok(Value::None)
            }
        }
    }

    fn set_item(&self, key: &Value, value: Value, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        let name = key.coerce_string();
        if name == "BUILDERS" {
            self.state.vars.borrow_mut().shift_remove("BUILDERS");
            return self.merge_builders(&value, interp);
        }
        self.set(&name, value);
        Ok(())
    }

    fn contains(&self, item: &Value, _interp: &mut Interpreter) -> Result<bool, InterpreterError> {
        Ok(self.contains_var(&item.coerce_string()))
    }

    fn iterate(&self) -> Result<Vec<Value>, InterpreterError> {
        Ok(self.state.vars.borrow().keys().cloned().map(Value::String).collect())
    }

    fn deep_copy(&self, memo: &mut CopyMemo) -> Option<Rc<dyn ScriptObject>> {
        Some(Rc::new(self.copy_with(memo)))
    }

    fn is_equal(&self, other: &dyn ScriptObject) -> bool {
        other.downcast::<Environment>().is_some_and(|other| self.same(other))
    }

    fn to_var(&self, visiting: &mut Visiting) -> Option<VarValue> {
        let key = Rc::as_ptr(&self.state).cast::<()>();
        if visiting.contains(&key) {
            return None;
        }
        visiting.push(key);
        let vars = self.state.vars.borrow();
        let map = vars
            .iter()
            .filter(|(name, _)| !INTERNAL_VARS.contains(&name.as_str()))
            .filter(|(_, value)| !matches!(value, Value::List(items) if items.borrow().is_empty()))
            .filter_map(|(name, value)| value.to_var_with(visiting).map(|var| (name.clone(), var)))
            .collect();
        visiting.pop();
        Some(VarValue::Map(map))
    }
}

/// The object `Configure(env)` returns: every check passes.
#[derive(Debug)]
pub struct Configure {
    env: Environment,
}

impl Configure {
    fn finish(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(self.env.handle())
    }
}

impl ScriptObject for Configure {
    fn class_name(&self) -> &'static str {
        "SConfBase"
    }

    builtin_impl!(
        "Finish" => finish,
    );

    fn fallback_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        if name.starts_with("Check") {
            return Ok(Value::Boolean(true));
        }
        Ok(interp.unrecognized(&format!("conf.{name}")))
    }

    fn has_fallback(&self, _name: &str) -> bool {
        true
    }

    fn get_attr(&self, name: &str, _interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        Ok((name == "env").then(|| self.env.handle()))
    }
}

fn build_environment(kwargs: Kwargs, interp: &mut Interpreter) -> Result<Environment, InterpreterError> {
    let mut kwargs = strip_tool_kwargs(kwargs);
    let options = kwargs.shift_remove("variables");
    let env = Environment::new();
    env.merge(kwargs, Merge::Replace, interp)?;
    if let Some(options) = options {
        variables::update(&options, &env, interp)?;
    }
    Ok(env)
}

pub fn environment(_args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(build_environment(kwargs, interp)?.handle())
}

/// The environment global builders such as `Program` use.
pub(crate) fn default_env(interp: &mut Interpreter) -> Result<Environment, InterpreterError> {
    if let Some(env) = interp.default_env.as_ref().and_then(|v| v.as_object::<Environment>()) {
        return Ok(env.clone());
    }
    let env = Environment::new();
    interp.default_env = Some(env.handle());
    Ok(env)
}

pub fn default_environment(_args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let env = default_env(interp)?;
    env.merge(strip_tool_kwargs(kwargs), Merge::Replace, interp)?;
    Ok(env.handle())
}

pub fn configure(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let env = match args.first().and_then(|v| v.as_object::<Environment>()) {
        Some(env) => env.clone(),
        None => default_env(interp)?,
    };
    Ok(Configure { env }.into_object())
}

/// The environment a value refers to, if it is one.
pub(crate) fn as_environment(value: &Value) -> Option<Environment> {
    value.as_object::<Environment>().cloned()
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::graph::VarValue;
    use crate::interpreter::tests::{run, run_with, var};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_flag_merges_are_additive() {
        let execution = run(r#"
env = Environment(CCFLAGS="-O2")
env.Append(CCFLAGS=["-Wall", "-g -pipe"])
env.Prepend(CPPPATH=["include"])
env.AppendUnique(CCFLAGS="-Wall")
env.Append(CPPDEFINES=["A", ("B", 2), {"C": None}])
env["LIBS"].append("m")
flags = env["CCFLAGS"]
defs = env["CPPDEFINES"]
libs = env["LIBS"]
"#);
        assert_eq!(var(&execution, "flags"), var(&run("flags = ['-O2', '-Wall', '-g', '-pipe']"), "flags"));
        assert_eq!(var(&execution, "defs"), var(&run("defs = ['A', 'B=2', 'C']"), "defs"));
        assert_eq!(var(&execution, "libs"), var(&run("libs = ['m']"), "libs"));
    }

    #[test]
    fn test_clone_is_independent() {
        let execution = run(r#"
env = Environment(CPPPATH=["a"])
child = env.Clone(CC="clang")
child.Append(CPPPATH=["b"])
parent_paths = env["CPPPATH"]
child_paths = child["CPPPATH"]
cc = child.subst("$CC and ${CC}")
missing = env.get("NOPE", "dflt")
has = "CPPPATH" in env
"#);
        assert_eq!(var(&execution, "parent_paths"), var(&run("parent_paths = ['a']"), "parent_paths"));
        assert_eq!(var(&execution, "child_paths"), var(&run("child_paths = ['a', 'b']"), "child_paths"));
        assert_eq!(execution.graph.lookup("cc"), Some(&VarValue::string("clang and clang")));
        assert_eq!(execution.graph.lookup("missing"), Some(&VarValue::string("dflt")));
        assert_eq!(execution.graph.lookup("has"), Some(&VarValue::boolean(true)));
    }

    #[test]
    fn test_environment_is_exported_as_map() {
        let execution = run("env = Environment(CC='gcc')\nenv.Append(CCFLAGS=['-O2'])\nenv.Tool('default')\n");
        let Some(VarValue::Map(map)) = execution.graph.variables().get("env") else {
            panic!("env not exported as a map");
        };
        assert_eq!(map.get("CC"), Some(&VarValue::string("gcc")));
        assert_eq!(map.get("CCFLAGS"), Some(&VarValue::List(vec![VarValue::string("-O2")])));
        assert!(!map.contains_key("TOOLS"));
    }

    #[test]
    fn test_platform_branch_records_platform_block() {
        let options = ConvertOptions {
            platform: "windows".into(),
            ..ConvertOptions::default()
        };
        let (result, execution) = run_with(
            r#"
env = Environment()
if env["platform"] == "windows":
    env.Append(CPPDEFINES=["WIN32_LEAN"], LIBS=["ws2_32"])
else:
    env.Append(CPPDEFINES=["POSIX"])
if True:
    env.Append(CCFLAGS=["-g"])
"#,
            MemoryRuntime::new(),
            options,
        );
        result.unwrap();
        let blocks: Vec<_> = execution.graph.platform_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].platform, "windows");
        assert_eq!(blocks[0].definitions, vec!["WIN32_LEAN".to_string()]);
        assert_eq!(blocks[0].link_libraries, vec!["ws2_32".to_string()]);
        assert!(blocks[0].compile_options.is_empty());
    }

    #[test]
    fn test_augmented_flag_assignment_in_platform_branch() {
        let options = ConvertOptions {
            platform: "windows".into(),
            ..ConvertOptions::default()
        };
        let (result, execution) = run_with(
            r#"
env = Environment(CCFLAGS=["/O2"])
if env["platform"] == "windows":
    env["CCFLAGS"] += ["/EHsc"]
    env["LIBS"] += ["ws2_32"]
    env["NAME"] = "app"
    env["NAME"] += "_win"
flags = env["CCFLAGS"]
name = env["NAME"]
"#,
            MemoryRuntime::new(),
            options,
        );
        result.unwrap();
        let blocks: Vec<_> = execution.graph.platform_blocks().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].compile_options, vec!["/EHsc".to_string()]);
        assert_eq!(blocks[0].link_libraries, vec!["ws2_32".to_string()]);
        assert_eq!(
            execution.graph.lookup("flags"),
            Some(&VarValue::List(vec![VarValue::string("/O2"), VarValue::string("/EHsc")]))
        );
        assert_eq!(execution.graph.lookup("name"), Some(&VarValue::string("app_win")));
    }

    #[test]
    fn test_unknown_env_method_is_recorded() {
        let execution = run("env = Environment()\nenv.Frobnicate('x')\nflag = env.some_flag\n");
        let calls = execution.graph.unrecognized_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "env.Frobnicate");
        assert!(execution.graph.variables().get("flag").is_none());
    }

    #[test]
    fn test_configure_checks_pass() {
        let execution = run(r#"
env = Environment()
conf = Configure(env)
ok = conf.CheckLib("m") and conf.CheckCHeader("stdio.h")
env = conf.Finish()
"#);
        assert_eq!(execution.graph.lookup("ok"), Some(&VarValue::boolean(true)));
    }
}
