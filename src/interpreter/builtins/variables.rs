//! Build options: `Variables` containers, typed variables, `AddOption`
//! and the literal `add_option`. Every declaration ends up in the graph.

use std::cell::RefCell;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::graph::{BuildOption, OptionKind, VarValue};
use crate::interpreter::builtins::environment::{Environment, as_environment};
use crate::interpreter::builtins::{builtin_impl, utils};
use crate::interpreter::error::{ErrorContext, bail_runtime_error, bail_type_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};

const TRUE_WORDS: &[&str] = &["y", "yes", "true", "t", "1", "on", "all"];
const FALSE_WORDS: &[&str] = &["n", "no", "false", "f", "0", "off", "none"];

/// One declared variable, as `BoolVariable` and friends return it.
#[derive(Debug, Clone)]
pub struct Variable {
    key: String,
    help: String,
    default: Value,
    kind: Option<OptionKind>,
    allowed: Vec<String>,
    /// Enum/list aliases, `map={...}`.
    aliases: IndexMap<String, String>,
    ignore_case: bool,
}

impl Variable {
    fn new(key: impl Into<String>, help: impl Into<String>, default: Value, kind: Option<OptionKind>) -> Self {
        Self {
            key: key.into(),
            help: help.into(),
            default,
            kind,
            allowed: Vec::new(),
            aliases: IndexMap::new(),
            ignore_case: false,
        }
    }

    /// `(key, help, default)` tuples and positional forms.
    fn from_args(args: &[Value], kwargs: &Kwargs) -> Result<Self, InterpreterError> {
        let arg = |index: usize, name: &str| args.get(index).or(kwargs.get(name)).cloned();
        let key = match arg(0, "key").context_type("Add() expects a key")? {
            // A list of keys declares aliases; the first one is the name.
            Value::List(keys) => keys.borrow().first().map(Value::coerce_string).unwrap_or_default(),
            key => key.coerce_string(),
        };
        let help = arg(1, "help").map(|v| v.coerce_string()).unwrap_or_default();
        let default = arg(2, "default").unwrap_or(Value::None);
        Ok(Self::new(key, help, default, None))
    }

    fn convert(&self, raw: &Value) -> Result<Value, InterpreterError> {
        match self.kind {
            Some(OptionKind::Bool) => to_bool(&self.key, raw).map(Value::Boolean),
            Some(OptionKind::Enum) => self.convert_enum(raw),
            Some(OptionKind::List) => self.convert_list(raw),
            Some(OptionKind::Path) | Some(OptionKind::String) => Ok(Value::String(raw.coerce_string())),
            None => Ok(raw.clone()),
        }
    }

    fn convert_enum(&self, raw: &Value) -> Result<Value, InterpreterError> {
        let raw = raw.coerce_string();
        let value = self.aliases.get(&raw).cloned().unwrap_or(raw);
        let found = self.allowed.iter().find(|allowed| {
            if self.ignore_case {
                allowed.eq_ignore_ascii_case(&value)
            } else {
                **allowed == value
            }
        });
        match found {
            Some(allowed) => Ok(Value::String(allowed.clone())),
            None => bail_runtime_error!(
                "Invalid value for enum variable '{}': '{}'. Valid values are: {}",
                self.key,
                value,
                self.allowed.join(", ")
            ),
        }
    }

    fn convert_list(&self, raw: &Value) -> Result<Value, InterpreterError> {
        let names: Vec<String> = match raw {
            Value::String(s) => s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect(),
            other => utils::strings([other]),
        };
        let names = match names.as_slice() {
            [only] if only == "all" => self.allowed.clone(),
            [only] if only == "none" => Vec::new(),
            _ => names
                .into_iter()
                .map(|name| self.aliases.get(&name).cloned().unwrap_or(name))
                .collect(),
        };
        if let Some(bad) = names.iter().find(|name| !self.allowed.is_empty() && !self.allowed.contains(name)) {
            bail_runtime_error!("Invalid value(s) for option '{}': {}", self.key, bad);
        }
        Ok(Value::list(names.into_iter().map(Value::String).collect()))
    }

    fn record(&self, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        let default = match &self.default {
            Value::None => VarValue::string(""),
            // Declared defaults are recorded in their converted form.
            value => self.convert(value)?.to_var().unwrap_or_else(|| VarValue::string(value.coerce_string())),
        };
        debug!("option '{}' declared", self.key);
        interp.graph.add_option(BuildOption {
            name: self.key.clone(),
            description: self.help.clone(),
            default,
            kind: self.kind,
            allowed_values: self.allowed.clone(),
        });
        Ok(())
    }

    fn help_text(&self, actual: Option<&Value>) -> String {
        let mut text = format!("\n{}: {}", self.key, self.help);
        match self.kind {
            Some(OptionKind::Bool) => text.push_str(" (yes|no)"),
            Some(OptionKind::Enum) => text.push_str(&format!(" ({})", self.allowed.join("|"))),
            Some(OptionKind::List) => {
                text.push_str(&format!("\n    (all|none|comma-separated list of names)\n    allowed names: {}", self.allowed.join(" ")))
            }
            Some(OptionKind::Path) => text.push_str(" ( /path/to/dir )"),
            _ => {}
        }
        text.push_str(&format!("\n    default: {}", self.default.coerce_string()));
        if let Some(actual) = actual {
            text.push_str(&format!("\n    actual: {}", display(actual)));
        }
        text.push('\n');
        text
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::List(items) => items.borrow().iter().map(Value::coerce_string).collect::<Vec<_>>().join(","),
        other => other.coerce_string(),
    }
}

fn to_bool(key: &str, raw: &Value) -> Result<bool, InterpreterError> {
    match raw {
        Value::Boolean(b) => Ok(*b),
        Value::Integer(i) => Ok(*i != 0),
        Value::None => Ok(false),
        other => {
            let word = other.coerce_string().to_ascii_lowercase();
            if TRUE_WORDS.contains(&word.as_str()) {
                Ok(true)
            } else if FALSE_WORDS.contains(&word.as_str()) {
                Ok(false)
            } else {
                bail_runtime_error!("Invalid value for boolean variable '{}': '{}'", key, word)
            }
        }
    }
}

impl ScriptObject for Variable {
    fn class_name(&self) -> &'static str {
        "Variable"
    }

    fn call_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        _interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        bail_runtime_error!("'Variable' object has no attribute '{}'", name)
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn get_attr(&self, name: &str, _interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        Ok(match name {
            "key" => Some(Value::String(self.key.clone())),
            "help" => Some(Value::String(self.help.clone())),
            "default" => Some(self.default.clone()),
            _ => None,
        })
    }

    /// Indexing like the `(key, help, default, ...)` tuple SCons returns.
    fn get_item(&self, key: &Value, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        match key.as_integer()? {
            0 => Ok(Value::String(self.key.clone())),
            1 => Ok(Value::String(self.help.clone())),
            2 => Ok(self.default.clone()),
            _ => Ok(Value::None),
        }
    }
}

/// A `Variables(files, args)` container.
#[derive(Debug)]
pub struct Variables {
    declared: RefCell<Vec<Variable>>,
    arguments: IndexMap<String, Value>,
}

impl Variables {
    fn add_one(&self, variable: Variable, interp: &mut Interpreter) -> Result<(), InterpreterError> {
        variable.record(interp)?;
        let mut declared = self.declared.borrow_mut();
        match declared.iter_mut().find(|v| v.key == variable.key) {
            Some(existing) => *existing = variable,
            None => declared.push(variable),
        }
        Ok(())
    }

    fn variable_of(value: &Value) -> Result<Variable, InterpreterError> {
        match value {
            Value::Object(obj) => match obj.downcast::<Variable>() {
                Some(variable) => Ok(variable.clone()),
                None => bail_type_error!("cannot add '{}' as a variable", obj.class_name()),
            },
            Value::Tuple(items) => Variable::from_args(items, &Kwargs::new()),
            Value::List(items) => Variable::from_args(&items.borrow(), &Kwargs::new()),
            other => Variable::from_args(std::slice::from_ref(other), &Kwargs::new()),
        }
    }

    fn add(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let variable = match args.first() {
            Some(Value::Object(_)) | Some(Value::Tuple(_)) if args.len() == 1 => Self::variable_of(&args[0])?,
            _ => Variable::from_args(&args, &kwargs)?,
        };
        self.add_one(variable, interp)?;
        Ok(Value::None)
    }

    fn add_variables(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        for arg in &args {
            self.add_one(Self::variable_of(arg)?, interp)?;
        }
        Ok(Value::None)
    }

    fn update_method(&self, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let env = args
            .first()
            .or(kwargs.get("env"))
            .and_then(as_environment)
            .context_type("Update() expects an environment")?;
        let extra = match args.get(1).or(kwargs.get("args")) {
            Some(Value::Dict(dict)) => dict.borrow().clone(),
            _ => IndexMap::new(),
        };
        self.apply(&env, &extra)?;
        Ok(Value::None)
    }

    /// Defaults first, then command-line values converted per type.
    fn apply(&self, env: &Environment, extra: &IndexMap<String, Value>) -> Result<(), InterpreterError> {
        let declared = self.declared.borrow().clone();
        for variable in &declared {
            let raw = extra.get(&variable.key).or(self.arguments.get(&variable.key));
            let value = match raw {
                Some(raw) => variable.convert(raw)?,
                None if variable.default.is_none() => continue,
                None => variable.convert(&variable.default)?,
            };
            env.set(&variable.key, value);
        }
        Ok(())
    }

    fn generate_help_text(&self, args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let env = args.first().and_then(as_environment);
        let mut declared = self.declared.borrow().clone();
        if kwargs.get("sort").is_some_and(Value::truthy) {
            declared.sort_by(|a, b| a.key.cmp(&b.key));
        }
        let text: String = declared
            .iter()
            .map(|variable| {
                let actual = env.as_ref().and_then(|env| env.stored(&variable.key));
                variable.help_text(actual.as_ref())
            })
            .collect();
        Ok(Value::String(text))
    }

    fn unknown_variables(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let declared = self.declared.borrow();
        let unknown = self
            .arguments
            .iter()
            .filter(|(key, _)| !declared.iter().any(|v| &v.key == *key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Value::dict(unknown))
    }

    fn keys(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::list(
            self.declared.borrow().iter().map(|v| Value::String(v.key.clone())).collect(),
        ))
    }

    fn save(&self, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        debug!("Variables.Save({}) skipped", utils::strings(args.first()).join(""));
        Ok(Value::None)
    }
}

impl ScriptObject for Variables {
    fn class_name(&self) -> &'static str {
        "Variables"
    }

    builtin_impl!(
        "Add" => add,
        "AddVariables" => add_variables,
        "Update" => update_method,
        "GenerateHelpText" => generate_help_text,
        "UnknownVariables" => unknown_variables,
        "keys" => keys,
        "Save" => save,
    );
}

/// `opts.Update(env)` for `Environment(variables=opts)`.
pub(crate) fn update(options: &Value, env: &Environment, _interp: &mut Interpreter) -> Result<(), InterpreterError> {
    match options.as_object::<Variables>() {
        Some(options) => options.apply(env, &IndexMap::new()),
        None => bail_type_error!("variables= expects a Variables object, got {}", options.type_name()),
    }
}

pub fn variables(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    if let Some(files) = args.first().or(kwargs.get("files")) {
        for file in utils::strings([files]) {
            debug!("option file '{file}' is not read");
        }
    }
    let arguments = match args.get(1).or(kwargs.get("args")) {
        Some(Value::Dict(dict)) => dict.borrow().clone(),
        _ => interp
            .options
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    };
    Ok(Variables {
        declared: RefCell::new(Vec::new()),
        arguments,
    }
    .into_object())
}

fn typed(args: &[Value], kwargs: &Kwargs, kind: OptionKind) -> Result<Variable, InterpreterError> {
    let mut variable = Variable::from_args(args, kwargs)?;
    variable.kind = Some(kind);
    Ok(variable)
}

pub fn bool_variable(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(typed(&args, &kwargs, OptionKind::Bool)?.into_object())
}

fn allowed_and_aliases(variable: &mut Variable, args: &[Value], kwargs: &Kwargs, names_key: &str) {
    if let Some(allowed) = args.get(3).or(kwargs.get(names_key)) {
        variable.allowed = utils::strings([allowed]);
    }
    if let Some(Value::Dict(map)) = args.get(4).or(kwargs.get("map")) {
        variable.aliases = map.borrow().iter().map(|(k, v)| (k.clone(), v.coerce_string())).collect();
    }
}

pub fn enum_variable(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut variable = typed(&args, &kwargs, OptionKind::Enum)?;
    allowed_and_aliases(&mut variable, &args, &kwargs, "allowed_values");
    variable.ignore_case = args.get(5).or(kwargs.get("ignorecase")).is_some_and(Value::truthy);
    Ok(variable.into_object())
}

pub fn list_variable(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut variable = typed(&args, &kwargs, OptionKind::List)?;
    allowed_and_aliases(&mut variable, &args, &kwargs, "names");
    Ok(variable.into_object())
}

pub fn path_variable(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(typed(&args, &kwargs, OptionKind::Path)?.into_object())
}

/// `AddOption('--name', dest=..., default=..., help=...)`.
pub fn add_option_flag(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let flag = utils::strings(&args)
        .into_iter()
        .find(|flag| flag.starts_with("--"))
        .or_else(|| utils::strings(&args).into_iter().next())
        .context_type("AddOption() expects an option string")?;
    let dest = match kwargs.get("dest") {
        Some(dest) => dest.coerce_string(),
        None => flag.trim_start_matches('-').replace('-', "_"),
    };
    let action = kwargs.get("action").map(Value::coerce_string).unwrap_or_default();
    let (kind, default) = match action.as_str() {
        "store_true" => (OptionKind::Bool, kwargs.get("default").cloned().unwrap_or(Value::Boolean(false))),
        "store_false" => (OptionKind::Bool, kwargs.get("default").cloned().unwrap_or(Value::Boolean(true))),
        _ => (OptionKind::String, kwargs.get("default").cloned().unwrap_or(Value::None)),
    };
    let help = kwargs.get("help").map(Value::coerce_string).unwrap_or_default();

    let mut variable = Variable::new(dest.clone(), help, default.clone(), Some(kind));
    if let Some(choices) = kwargs.get("choices") {
        variable.allowed = utils::strings([choices]);
    }
    variable.record(interp)?;
    interp.cli_options.insert(dest, default);
    Ok(Value::None)
}

pub fn get_option(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let name = args.first().context_type("GetOption() expects a name")?.coerce_string();
    if let Some(value) = interp.cli_options.get(&name) {
        return Ok(value.clone());
    }
    // SCons' own command-line options, as in a plain `scons` run.
    Ok(match name.as_str() {
        "num_jobs" => Value::Integer(1),
        "help" | "clean" | "silent" | "no_exec" | "question" => Value::Boolean(false),
        _ => Value::None,
    })
}

/// Literal `add_option(name, description, default, type=None)`.
pub fn add_option(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut variable = Variable::from_args(&args, &kwargs)?;
    if variable.help.is_empty() {
        if let Some(description) = kwargs.get("description") {
            variable.help = description.coerce_string();
        }
    }
    let kind = args.get(3).or(kwargs.get("type")).filter(|v| !v.is_none()).map(Value::coerce_string);
    variable.kind = match kind.as_deref() {
        None => None,
        Some("bool" | "boolean") => Some(OptionKind::Bool),
        Some("enum" | "combo") => Some(OptionKind::Enum),
        Some("path") => Some(OptionKind::Path),
        Some("list" | "array") => Some(OptionKind::List),
        Some("string" | "str") => Some(OptionKind::String),
        Some(other) => bail_runtime_error!("unknown option type '{}'", other),
    };
    if let Some(allowed) = kwargs.get("allowed_values").or(kwargs.get("choices")) {
        variable.allowed = utils::strings([allowed]);
    }
    info!("option '{}' added", variable.key);
    variable.record(interp)?;
    match interp.options.arguments.get(&variable.key) {
        Some(raw) => variable.convert(&Value::String(raw.clone())),
        None => Ok(variable.default.clone()),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::graph::{OptionKind, Scalar, VarValue};
    use crate::interpreter::tests::{run, run_with};
    use crate::runtime::memory::MemoryRuntime;

    const SCRIPT: &str = r#"
opts = Variables("custom.py", ARGUMENTS)
opts.Add(BoolVariable("tests", "Build the unit tests", False))
opts.Add("prefix", "Install prefix", "/usr/local")
opts.Add(EnumVariable("target", "Build target", "editor", ("editor", "template_debug", "template_release")))
opts.Add(ListVariable("modules", "Enabled modules", "all", ["gdscript", "mono"]))
env = Environment(variables=opts)
tests = env["tests"]
target = env["target"]
modules = env["modules"]
help = opts.GenerateHelpText(env)
unknown = opts.UnknownVariables()
"#;

    #[test]
    fn test_variables_defaults_and_declarations() {
        let execution = run(SCRIPT);
        let options: Vec<_> = execution.graph.options().collect();
        assert_eq!(options.len(), 4);
        assert_eq!(options[0].name, "tests");
        assert_eq!(options[0].kind, Some(OptionKind::Bool));
        assert_eq!(options[0].default, VarValue::boolean(false));
        assert_eq!(options[1].default, VarValue::string("/usr/local"));
        assert_eq!(options[1].kind, None);
        assert_eq!(options[2].allowed_values, vec!["editor", "template_debug", "template_release"]);
        assert_eq!(execution.graph.lookup("target"), Some(&VarValue::string("editor")));
        assert_eq!(execution.graph.lookup("tests"), Some(&VarValue::boolean(false)));
        let Some(VarValue::Scalar(Scalar::String(help))) = execution.graph.lookup("help") else {
            panic!("help text missing");
        };
        assert!(help.contains("tests: Build the unit tests (yes|no)"));
    }

    #[test]
    fn test_arguments_override_defaults() {
        let mut options = ConvertOptions::default();
        for (k, v) in [("tests", "yes"), ("target", "template_release"), ("modules", "mono"), ("extra", "1")] {
            options.arguments.insert(k.into(), v.into());
        }
        let (result, execution) = run_with(SCRIPT, MemoryRuntime::new(), options);
        result.unwrap();
        assert_eq!(execution.graph.lookup("tests"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("target"), Some(&VarValue::string("template_release")));
        assert_eq!(execution.graph.lookup("modules"), Some(&VarValue::List(vec![VarValue::string("mono")])));
        assert_eq!(execution.graph.lookup("unknown.extra"), Some(&VarValue::string("1")));
    }

    #[test]
    fn test_invalid_enum_value_fails() {
        let mut options = ConvertOptions::default();
        options.arguments.insert("target".into(), "bogus".into());
        let (result, _) = run_with(SCRIPT, MemoryRuntime::new(), options);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_option_and_literal_form() {
        let execution = run(r#"
AddOption("--enable-docs", action="store_true", help="Build docs")
docs = GetOption("enable_docs")
jobs = GetOption("num_jobs")
level = add_option("level", "Optimization level", "2", type="enum", allowed_values=["0", "1", "2"])
add_option("level", "Optimization level", "3")
"#);
        assert_eq!(execution.graph.lookup("docs"), Some(&VarValue::boolean(false)));
        assert_eq!(execution.graph.lookup("jobs"), Some(&VarValue::Scalar(Scalar::Integer(1))));
        assert_eq!(execution.graph.lookup("level"), Some(&VarValue::string("2")));
        let options: Vec<_> = execution.graph.options().collect();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].name, "enable_docs");
        assert_eq!(options[1].default, VarValue::string("3"));
    }
}
