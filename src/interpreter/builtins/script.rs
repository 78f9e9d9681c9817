//! Script inclusion: `SConscript`, `Export`, `Import`, `Return` and the
//! literal `include_script`.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::IncludeError;
use crate::interpreter::builtins::modules::Opaque;
use crate::interpreter::builtins::utils;
use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};
use crate::path::Path;

/// Name/value pairs from `'a b'`, `['a', 'b']`, `{'a': v}` or a mix.
fn named_values(values: &[Value], interp: &mut Interpreter) -> IndexMap<String, Value> {
    let mut out = IndexMap::new();
    for value in utils::flatten(values) {
        match value {
            Value::Dict(dict) => out.extend(dict.borrow().iter().map(|(k, v)| (k.clone(), v.clone()))),
            Value::None => {}
            other => {
                for name in other.coerce_string().split_whitespace() {
                    match interp.lookup(name) {
                        Some(value) => {
                            out.insert(name.to_string(), value);
                        }
                        None => interp.warning(format_args!("cannot export undefined name '{name}'")),
                    }
                }
            }
        }
    }
    out
}

fn deep_copies<'a>(values: impl IntoIterator<Item = (&'a String, &'a Value)>) -> IndexMap<String, Value> {
    values.into_iter().map(|(k, v)| (k.clone(), v.deep_copy())).collect()
}

/// Whether a failed include stops the including script.
fn is_fatal_include(err: &IncludeError, must_exist: bool, interp: &Interpreter) -> bool {
    match err {
        _ if interp.options.strict_includes => true,
        IncludeError::NotFound { .. } => must_exist,
        _ => err.is_fatal(),
    }
}

/// Runs one nested script and copies what it exported back into the
/// caller's scope. Failed includes are skipped unless fatal.
fn include(
    path: &Path,
    pool: IndexMap<String, Value>,
    bound: IndexMap<String, Value>,
    copy_back: &[String],
    must_exist: bool,
    interp: &mut Interpreter,
) -> Result<Option<Value>, InterpreterError> {
    debug!("including {path}");
    let handle = match interp.load_script(path, pool, bound) {
        Ok(handle) => handle,
        Err(err) if is_fatal_include(&err, must_exist, interp) => {
            return Err(InterpreterError::Include(Box::new(err)));
        }
        Err(err) => {
            interp.warning(format_args!("include skipped: {err}"));
            return Ok(None);
        }
    };

    let mut exported = deep_copies(&handle.payload.exported);
    {
        let globals = handle.payload.globals.borrow();
        for name in copy_back {
            if let Some(value) = globals.get(name) {
                exported.insert(name.clone(), value.deep_copy());
            }
        }
    }
    for (name, value) in exported {
        interp.bind(&name, value.clone())?;
        if let Some(script) = interp.scripts.last_mut() {
            script.pool.insert(name, value);
        }
    }
    Ok(Some(handle.payload.returned.deep_copy()))
}

/// The pool a child sees: the caller's exports plus `extra`, copied.
fn child_pool(extra: IndexMap<String, Value>, interp: &Interpreter) -> IndexMap<String, Value> {
    let mut pool = match interp.scripts.last() {
        Some(script) => deep_copies(&script.pool),
        None => IndexMap::new(),
    };
    pool.extend(deep_copies(&extra));
    pool
}

pub fn sconscript(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut scripts: Vec<String> = Vec::new();
    if let Some(dirs) = kwargs.get("dirs") {
        let name = match kwargs.get("name") {
            Some(name) => name.coerce_string(),
            None => interp.options.mode.nested_script_name().to_string(),
        };
        for dir in utils::strings([dirs]) {
            scripts.push(Path::from(dir).join(&name).to_string());
        }
    }
    if let Some(script) = args.first().or(kwargs.get("script")) {
        scripts.extend(utils::strings([script]));
    }
    if scripts.is_empty() {
        bail_runtime_error!("SConscript() expects a script path or dirs=");
    }
    for ignored in ["variant_dir", "duplicate", "src_dir"] {
        if kwargs.contains_key(ignored) {
            debug!("SConscript: {ignored}= has no effect on the generated project");
        }
    }
    let must_exist = kwargs.get("must_exist").is_some_and(Value::truthy);
    let exports = match args.get(1).or(kwargs.get("exports")) {
        Some(exports) => named_values(std::slice::from_ref(exports), interp),
        None => IndexMap::new(),
    };

    let mut results = Vec::new();
    for script in &scripts {
        let path = interp.resolve_path(script);
        let pool = child_pool(exports.clone(), interp);
        if let Some(returned) = include(&path, pool, IndexMap::new(), &[], must_exist, interp)? {
            results.push(returned);
        }
    }
    Ok(match results.len() {
        0 => Value::None,
        1 if scripts.len() == 1 => results.remove(0),
        _ => Value::list(results),
    })
}

/// `include_script(path, imports=[...], exports=[...])`: imports are bound
/// in the child directly and the listed exports come back from its globals.
pub fn include_script(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let script = args
        .first()
        .or(kwargs.get("path"))
        .context_type("include_script() expects a path")?
        .coerce_string();
    let imports = match args.get(1).or(kwargs.get("imports")) {
        Some(imports) => named_values(std::slice::from_ref(imports), interp),
        None => IndexMap::new(),
    };
    let exports = match args.get(2).or(kwargs.get("exports")) {
        Some(exports) => utils::names([exports]),
        None => Vec::new(),
    };
    let path = interp.resolve_path(&script);
    let pool = child_pool(imports.clone(), interp);
    let bound = deep_copies(&imports);
    let must_exist = kwargs.get("must_exist").is_none_or(Value::truthy);
    Ok(include(&path, pool, bound, &exports, must_exist, interp)?.unwrap_or(Value::None))
}

pub fn export(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let mut values = named_values(&args, interp);
    values.extend(kwargs);
    let script = interp.scripts.last_mut().context_runtime("Export() outside a script")?;
    for (name, value) in values {
        if !script.exported.contains(&name) {
            script.exported.push(name.clone());
        }
        script.pool.insert(name, value);
    }
    Ok(Value::None)
}

pub fn import(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let pool = match interp.scripts.last() {
        Some(script) => script.pool.clone(),
        None => IndexMap::new(),
    };
    let mut last = Value::None;
    for name in utils::names(&args) {
        if name == "*" {
            for (name, value) in &pool {
                interp.bind(name, value.clone())?;
                last = value.clone();
            }
            continue;
        }
        let value = match pool.get(&name) {
            Some(value) => value.clone(),
            None => {
                interp.warning(format_args!("Import('{name}'): nothing exported under that name"));
                Opaque::new(name.as_str()).into_object()
            }
        };
        interp.bind(&name, value.clone())?;
        last = value;
    }
    Ok(last)
}

/// `Return('a b', stop=True)`. The named values come back to the caller
/// and stop the script unless `stop=False`.
pub fn return_(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let names = utils::names(&args);
    let mut values = Vec::new();
    for name in &names {
        match interp.lookup(name) {
            Some(value) => values.push(value),
            None => {
                interp.warning(format_args!("Return('{name}'): name is not defined"));
                values.push(Value::None);
            }
        }
    }
    let returned = match values.len() {
        0 => Value::None,
        1 => values.remove(0),
        _ => Value::Tuple(values),
    };
    let stop = kwargs.get("stop").is_none_or(Value::truthy);
    let depth = interp.depth;
    let script = interp.scripts.last_mut().context_runtime("Return() outside a script")?;
    script.returned = Some(returned);
    if stop && script.depth == depth {
        interp.return_value = Some(Value::None);
    }
    Ok(Value::None)
}

/// `Exit(code)`: a zero status ends the script quietly.
pub fn exit(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let code = match args.first() {
        Some(code) => code.as_integer()?,
        None => 0,
    };
    if code != 0 {
        warn!("script requested exit with status {code}");
    }
    Err(InterpreterError::Exit(code))
}

pub fn get_launch_dir(_args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::String(interp.host_path(&Path::new()).to_string()))
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::graph::{Scalar, VarValue};
    use crate::interpreter::tests::{run, run_with};
    use crate::runtime::memory::MemoryRuntime;

    fn options() -> ConvertOptions {
        ConvertOptions::default()
    }

    #[test]
    fn test_exports_are_copied_both_ways() {
        let runtime = MemoryRuntime::new().with_file(
            "lib/SConscript",
            r#"
Import("settings", "extra")
settings["flags"].append("-g")
inner = "child only"
result = settings["flags"] + [extra]
Export("result")
Return("inner")
"#,
        );
        let (result, execution) = run_with(
            r#"
settings = {"flags": ["-O2"]}
Export("settings")
returned = SConscript("lib/SConscript", exports={"extra": "x"})
flags = settings["flags"]
"#,
            runtime,
            options(),
        );
        result.unwrap();
        // The child worked on copies.
        assert_eq!(
            execution.graph.lookup("flags"),
            Some(&VarValue::List(vec![VarValue::string("-O2")]))
        );
        assert_eq!(
            execution.graph.lookup("result"),
            Some(&VarValue::List(vec![VarValue::string("-O2"), VarValue::string("-g"), VarValue::string("x")]))
        );
        assert_eq!(execution.graph.lookup("returned"), Some(&VarValue::string("child only")));
        assert!(execution.graph.lookup("inner").is_none());
    }

    #[test]
    fn test_child_scope_is_isolated() {
        let runtime = MemoryRuntime::new().with_file(
            "sub/SConscript",
            "private = 1\nvalue = 42\nExport('value')\n",
        );
        let (result, execution) = run_with(
            "before = 'unset'\nSConscript(dirs=['sub'])\nafter = value\n",
            runtime,
            options(),
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("after"), Some(&VarValue::Scalar(Scalar::Integer(42))));
        assert!(execution.graph.lookup("private").is_none());
    }

    #[test]
    fn test_self_referencing_export() {
        let runtime = MemoryRuntime::new().with_file(
            "sub/SConscript",
            "Import('loop')\nloop.append(2)\ntext = str(loop)\nExport('loop', 'text')\n",
        );
        let (result, execution) = run_with(
            "loop = [1]\nloop.append(loop)\nExport('loop')\nSConscript('sub/SConscript')\nshown = str(loop)\n",
            runtime,
            options(),
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("text"), Some(&VarValue::string("[1, [...], 2]")));
        assert_eq!(execution.graph.lookup("shown"), Some(&VarValue::string("[1, [...], 2]")));
        assert_eq!(
            execution.graph.lookup("loop"),
            Some(&VarValue::List(vec![
                VarValue::Scalar(Scalar::Integer(1)),
                VarValue::Scalar(Scalar::Integer(2)),
            ]))
        );
    }

    #[test]
    fn test_missing_include_is_skipped_unless_required() {
        let (result, execution) = run_with(
            "SConscript('nope/SConscript')\nafter = 1\n",
            MemoryRuntime::new(),
            options(),
        );
        result.unwrap();
        assert!(execution.graph.lookup("after").is_some());
        assert_eq!(execution.warnings, 1);

        let (result, _) = run_with(
            "SConscript('nope/SConscript', must_exist=True)\n",
            MemoryRuntime::new(),
            options(),
        );
        assert!(result.is_err());

        let strict = ConvertOptions {
            strict_includes: true,
            ..options()
        };
        let (result, _) = run_with("SConscript('nope/SConscript')\n", MemoryRuntime::new(), strict);
        assert!(result.is_err());
    }

    #[test]
    fn test_import_missing_name_is_opaque() {
        let execution = run("Import('ghost')\nghost.Frobnicate()\nafter = 'ok'\n");
        assert_eq!(execution.graph.lookup("after"), Some(&VarValue::string("ok")));
        assert_eq!(execution.graph.unrecognized_calls()[0].name, "ghost.Frobnicate");
    }

    #[test]
    fn test_literal_include_script() {
        let runtime = MemoryRuntime::new().with_file("parts/common.scons", "flags = base + ['-Wall']\nhidden = 1\n");
        let (result, execution) = run_with(
            "base = ['-O2']\ninclude_script('parts/common.scons', imports=['base'], exports=['flags'])\n",
            runtime,
            options(),
        );
        result.unwrap();
        assert_eq!(
            execution.graph.lookup("flags"),
            Some(&VarValue::List(vec![VarValue::string("-O2"), VarValue::string("-Wall")]))
        );
        assert!(execution.graph.lookup("hidden").is_none());
    }

    #[test]
    fn test_return_stops_script() {
        let runtime = MemoryRuntime::new().with_file("a/SConscript", "x = 1\nReturn('x')\nProgram('never', ['n.c'])\n");
        let (result, execution) = run_with("got = SConscript('a/SConscript')\n", runtime, options());
        result.unwrap();
        assert_eq!(execution.graph.lookup("got"), Some(&VarValue::Scalar(Scalar::Integer(1))));
        assert!(execution.graph.targets().is_empty());
    }
}
