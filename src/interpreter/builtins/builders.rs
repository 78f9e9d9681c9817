//! Custom builders. Their declarations and invocations are recorded; the
//! actions themselves never run.

use tracing::debug;

use crate::interpreter::builtins::files::FileNode;
use crate::interpreter::builtins::{builtin_impl, utils};
use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};
use crate::path::Path;

/// Summary recorded for an action: the command line, or the function it
/// would call.
fn action_summary(value: &Value) -> String {
    match value {
        Value::String(command) => command.clone(),
        Value::List(items) => items.borrow().iter().map(action_summary).collect::<Vec<_>>().join(" && "),
        Value::Tuple(items) => items.iter().map(action_summary).collect::<Vec<_>>().join(" && "),
        Value::Function(function) => format!("<function {}>", function.def.name),
        Value::Builtin(name) => format!("<builtin {name}>"),
        Value::Method(_, name) => format!("<method {name}>"),
        Value::Object(obj) => match obj.downcast::<Action>() {
            Some(action) => action.summary.clone(),
            None => obj.to_string(),
        },
        Value::None => String::new(),
        other => other.coerce_string(),
    }
}

/// `Action(command_or_function, ...)`.
#[derive(Debug)]
pub struct Action {
    summary: String,
}

impl ScriptObject for Action {
    fn class_name(&self) -> &'static str {
        "Action"
    }

    fn call_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        _interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        bail_runtime_error!("'Action' object has no attribute '{}'", name)
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    /// Actions never run.
    fn call(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        debug!("action '{}' not executed", self.summary);
        Ok(Value::Integer(0))
    }

    fn to_string(&self) -> String {
        self.summary.clone()
    }
}

/// `Builder(action=..., suffix=..., src_suffix=...)`.
#[derive(Debug)]
pub struct Builder {
    action: String,
    suffix: String,
    src_suffix: String,
}

impl Builder {
    fn action_attr(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::String(self.action.clone()))
    }
}

impl ScriptObject for Builder {
    fn class_name(&self) -> &'static str {
        "BuilderBase"
    }

    builtin_impl!(
        "get_action" => action_attr,
    );

    fn get_attr(&self, name: &str, _interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        let value = match name {
            "action" => &self.action,
            "suffix" => &self.suffix,
            "src_suffix" => &self.src_suffix,
            _ => return Ok(None),
        };
        Ok(Some(Value::String(value.clone())))
    }

    fn to_string(&self) -> String {
        format!("<Builder {}>", self.action)
    }
}

fn register(name: &str, action: &str, interp: &mut Interpreter) {
    if interp.graph.has_custom_builder(name) {
        return;
    }
    debug!("custom builder '{name}' registered");
    let script = interp.script_path();
    interp.graph.register_custom_builder(name, action, script.as_str());
}

/// Registers a `Builder` stored under a dictionary key such as
/// `env['BUILDERS'][key]`. Other values are ignored.
pub fn note_builder(interp: &mut Interpreter, key: &str, value: &Value) {
    if let Some(builder) = value.as_object::<Builder>() {
        let action = builder.action.clone();
        register(key, &action, interp);
    }
}

/// Target paths named by the first argument or `target=`.
fn target_paths(args: &[Value], kwargs: &Kwargs, interp: &mut Interpreter) -> Vec<Path> {
    let Some(target) = kwargs.get("target").or(args.first()) else {
        return Vec::new();
    };
    utils::flatten([target])
        .iter()
        .filter_map(|value| match value {
            Value::Object(obj) => obj.downcast::<FileNode>().map(|node| node.path().clone()),
            Value::None => None,
            other => Some(interp.resolve_path(&other.coerce_string())),
        })
        .collect()
}

fn record_invocation(name: &str, targets: &[Path], interp: &mut Interpreter) -> Value {
    interp
        .graph
        .record_builder_invocation(name, targets.iter().map(|p| p.to_string()).collect());
    Value::list(targets.iter().map(|path| FileNode::file(path.clone()).into_object()).collect())
}

/// `env.Name(target, source, ...)` for a registered builder.
pub(crate) fn invoke(name: &str, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    register(name, "<unknown action>", interp);
    let targets = target_paths(&args, &kwargs, interp);
    Ok(record_invocation(name, &targets, interp))
}

pub fn builder(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let action = kwargs
        .get("action")
        .or(kwargs.get("generator"))
        .or(args.first())
        .map(action_summary)
        .unwrap_or_default();
    let text = |key: &str| kwargs.get(key).map(Value::coerce_string).unwrap_or_default();
    Ok(Builder {
        action,
        suffix: text("suffix"),
        src_suffix: text("src_suffix"),
    }
    .into_object())
}

pub fn action(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let summary = args.first().or(kwargs.get("action")).map(action_summary).unwrap_or_default();
    Ok(Action { summary }.into_object())
}

/// `Command(target, source, action)`: a one-off builder named after its
/// first target.
pub fn command(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let targets = target_paths(&args, &kwargs, interp);
    let first = targets.first().context_type("Command() expects a target")?;
    let name = format!("Command:{}", first.file_name());
    let action = args.get(2).or(kwargs.get("action")).map(action_summary).unwrap_or_default();
    register(&name, &action, interp);
    Ok(record_invocation(&name, &targets, interp))
}

/// `env.AddMethod(function, name)`.
pub(crate) fn add_method(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let function = args.first().or(kwargs.get("function")).context_type("AddMethod() expects a function")?;
    let name = match (args.get(1).or(kwargs.get("name")), function) {
        (Some(name), _) => name.coerce_string(),
        (None, Value::Function(function)) => function.def.name.clone(),
        (None, other) => bail_runtime_error!("AddMethod() needs a name for {}", other.type_name()),
    };
    let action = action_summary(function);
    register(&name, &action, interp);
    Ok(Value::None)
}

/// Literal `register_custom_builder(name, action)`.
pub fn register_custom_builder(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let name = args
        .first()
        .or(kwargs.get("name"))
        .context_type("register_custom_builder() expects a name")?
        .coerce_string();
    let action = args.get(1).or(kwargs.get("action")).map(action_summary).unwrap_or_default();
    register(&name, &action, interp);
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use crate::interpreter::tests::run;

    #[test]
    fn test_builders_are_recorded_not_run() {
        let execution = run(r#"
def generate(target, source, env):
    raise Exception("must not run")

env = Environment()
env.Append(BUILDERS={"Gen": Builder(action=generate, suffix=".h")})
env["BUILDERS"]["Bin2C"] = Builder(action="bin2c $SOURCE > $TARGET")
env.Gen("version.h", "version.py")
env.Bin2C("icon.gen.c", "icon.png")
env.Bin2C(target="logo.gen.c", source="logo.png")

def make_docs(env, target):
    raise Exception("must not run")

env.AddMethod(make_docs, "MakeDocs")
env.MakeDocs("docs")
env.Command("out/stamp.txt", "in.txt", "touch $TARGET")
register_custom_builder("Shaders", "glsl_builder")
"#);
        let builders: Vec<_> = execution.graph.custom_builders().collect();
        let names: Vec<&str> = builders.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Gen", "Bin2C", "MakeDocs", "Command:stamp.txt", "Shaders"]);
        assert_eq!(builders[0].action, "<function generate>");
        assert_eq!(builders[0].invocations, vec![vec!["version.h".to_string()]]);
        assert_eq!(builders[1].action, "bin2c $SOURCE > $TARGET");
        assert_eq!(builders[1].invocations.len(), 2);
        assert_eq!(builders[2].invocations, vec![vec!["docs".to_string()]]);
        assert_eq!(builders[3].invocations, vec![vec!["out/stamp.txt".to_string()]]);
        assert!(builders[4].invocations.is_empty());
        assert!(execution.graph.unrecognized_calls().is_empty());
    }
}
