//! Target declarations and dependency edges.

use tracing::{debug, info};

use crate::graph::{Target, TargetKind};
use crate::interpreter::builtins::environment::{self, Environment, flag_items};
use crate::interpreter::builtins::files::{self, FileNode};
use crate::interpreter::builtins::utils;
use crate::interpreter::error::{ErrorContext, bail_runtime_error, bail_type_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};
use crate::path::Path;

/// Extensions SCons adds to build outputs; a target path may carry them.
const OUTPUT_EXTENSIONS: &[&str] = &["exe", "a", "lib", "so", "dll", "dylib", "o", "obj", "os"];

/// Variables a builder call may override for that one target.
const OVERRIDES: &[&str] = &[
    "CPPPATH",
    "CPPDEFINES",
    "LIBS",
    "LIBPATH",
    "CCFLAGS",
    "CFLAGS",
    "CXXFLAGS",
    "LINKFLAGS",
];

/// The node a builder call returns; usable in `LIBS` and `Depends`.
#[derive(Debug)]
pub struct TargetNode {
    name: String,
    /// Project-relative output path.
    path: Path,
}

impl TargetNode {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScriptObject for TargetNode {
    fn class_name(&self) -> &'static str {
        "Node"
    }

    fn call_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        match name {
            "get_path" | "srcnode" => Ok(Value::String(self.path.to_string())),
            "get_abspath" => Ok(Value::String(interp.host_path(&self.path).to_string())),
            _ => bail_runtime_error!("'Node' object has no attribute '{}'", name),
        }
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "get_path" | "get_abspath" | "srcnode")
    }

    fn get_attr(&self, name: &str, interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        let value = match name {
            "name" => self.name.clone(),
            "path" => self.path.to_string(),
            "abspath" => interp.host_path(&self.path).to_string(),
            _ => return Ok(None),
        };
        Ok(Some(Value::String(value)))
    }

    fn to_string(&self) -> String {
        self.path.to_string()
    }

    fn is_equal(&self, other: &dyn ScriptObject) -> bool {
        other.downcast::<TargetNode>().is_some_and(|other| other.name == self.name)
    }
}

/// What a `LIBS` entry links against.
pub(crate) fn link_name(value: &Value) -> Option<String> {
    match value {
        Value::None => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => {
            if let Some(node) = obj.downcast::<TargetNode>() {
                Some(node.name.clone())
            } else {
                obj.downcast::<FileNode>().map(|node| node.path().to_string())
            }
        }
        other => Some(other.coerce_string()),
    }
}

fn strip_output_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && OUTPUT_EXTENSIONS.contains(&extension) => stem,
        _ => file_name,
    }
}

/// Target name for an output path: its stem with characters CMake does
/// not accept in target names replaced.
pub(crate) fn target_name(path: &str) -> String {
    let file_name = Path::from(path).file_name().to_string();
    strip_output_extension(&file_name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `(target, source)`, `(source)` and the keyword forms.
fn split_target_args(mut args: Vec<Value>, kwargs: &mut Kwargs) -> (Option<Value>, Value) {
    let target = kwargs.shift_remove("target");
    let source = kwargs.shift_remove("source");
    let mut positional = args.drain(..);
    match (target, source) {
        (target, Some(source)) => (target.or_else(|| positional.next()), source),
        (Some(target), None) => (Some(target), positional.next().unwrap_or(Value::None)),
        (None, None) => {
            let first = positional.next();
            match positional.next() {
                Some(source) => (first, source),
                None => (None, first.unwrap_or(Value::None)),
            }
        }
    }
}

/// Items of a variable for one call: the override keyword if given,
/// otherwise the environment's value at declaration.
fn setting(env: &Environment, kwargs: &Kwargs, name: &str) -> Vec<Value> {
    match kwargs.get(name) {
        Some(value) => flag_items(name, value),
        None => env.list(name),
    }
}

fn expand(env: &Environment, values: Vec<Value>, interp: &mut Interpreter) -> Vec<Value> {
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) if s.contains('$') => Value::String(env.substitute(&s, interp)),
            other => other,
        })
        .collect()
}

/// Directories, resolved against the declaring script.
fn directories(env: &Environment, values: Vec<Value>, interp: &mut Interpreter) -> Vec<String> {
    let mut dirs = Vec::new();
    for value in expand(env, values, interp) {
        let dir = match &value {
            Value::Object(obj) => match obj.downcast::<FileNode>() {
                Some(node) => node.path().to_string(),
                None => continue,
            },
            Value::None => continue,
            other => {
                let raw = other.coerce_string();
                if raw.is_empty() {
                    continue;
                }
                interp.resolve_path(&raw).to_string()
            }
        };
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

fn push_unique(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
    for item in items {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

/// Declares a target built by `env`, snapshotting its settings.
pub fn declare(
    env: &Environment,
    kind: TargetKind,
    args: Vec<Value>,
    kwargs: Kwargs,
    interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    let mut kwargs = kwargs;
    let (target, source) = split_target_args(args, &mut kwargs);
    let sources = files::resolve_sources(&[source], interp)?;

    let raw_target = match target.as_ref().map(|t| utils::strings([t])) {
        Some(names) if !names.is_empty() => names[0].clone(),
        _ => match sources.first() {
            Some(first) => Path::from(first).file_stem().to_string(),
            None => bail_type_error!("{} needs a target or at least one source", kind.as_str()),
        },
    };
    let raw_target = if raw_target.contains('$') {
        env.substitute(&raw_target, interp)
    } else {
        raw_target
    };
    let output = interp.resolve_path(&raw_target);
    let name = target_name(&raw_target);
    if name.is_empty() {
        bail_runtime_error!("cannot derive a target name from '{}'", raw_target);
    }

    let mut declared = Target::new(&name, kind);
    declared.script = interp.script_path().to_string();
    declared.sources = sources;
    declared.include_dirs = directories(env, setting(env, &kwargs, "CPPPATH"), interp);
    declared.link_directories = directories(env, setting(env, &kwargs, "LIBPATH"), interp);
    declared.definitions = utils::strings(&expand(env, setting(env, &kwargs, "CPPDEFINES"), interp));
    for flags in ["CCFLAGS", "CFLAGS", "CXXFLAGS"] {
        let flags = utils::strings(&expand(env, setting(env, &kwargs, flags), interp));
        push_unique(&mut declared.compile_options, flags);
    }
    declared.link_options = utils::strings(&expand(env, setting(env, &kwargs, "LINKFLAGS"), interp));
    let libraries = expand(env, setting(env, &kwargs, "LIBS"), interp);
    push_unique(&mut declared.link_libraries, libraries.iter().filter_map(link_name));

    let stem = strip_output_extension(Path::from(&raw_target).file_name()).to_string();
    if stem != name {
        declared.properties.insert("OUTPUT_NAME".into(), stem);
    }
    if !Path::from(&raw_target).parent().as_str().is_empty() {
        let property = match kind {
            TargetKind::Executable => "RUNTIME_OUTPUT_DIRECTORY",
            TargetKind::StaticLibrary => "ARCHIVE_OUTPUT_DIRECTORY",
            TargetKind::SharedLibrary | TargetKind::Module => "LIBRARY_OUTPUT_DIRECTORY",
        };
        declared.properties.insert(property.into(), output.parent().to_string());
    }
    for (keyword, property) in [
        ("LIBPREFIX", "PREFIX"),
        ("SHLIBPREFIX", "PREFIX"),
        ("LIBSUFFIX", "SUFFIX"),
        ("SHLIBSUFFIX", "SUFFIX"),
        ("PROGSUFFIX", "SUFFIX"),
    ] {
        if let Some(value) = kwargs.get(keyword) {
            declared.properties.insert(property.into(), value.coerce_string());
        }
    }
    for unused in kwargs.keys().filter(|k| !OVERRIDES.contains(&k.as_str())) {
        debug!("{name}: keyword '{unused}' has no CMake counterpart");
    }

    info!("{} '{}' declared in {}", kind.as_str(), name, declared.script);
    interp.graph.add_target(declared);
    Ok(Value::list(vec![TargetNode { name, path: output }.into_object()]))
}

fn declare_default(kind: TargetKind, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let env = environment::default_env(interp)?;
    declare(&env, kind, args, kwargs, interp)
}

pub fn program(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    declare_default(TargetKind::Executable, args, kwargs, interp)
}

pub fn static_library(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    declare_default(TargetKind::StaticLibrary, args, kwargs, interp)
}

pub fn shared_library(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    declare_default(TargetKind::SharedLibrary, args, kwargs, interp)
}

pub fn loadable_module(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    declare_default(TargetKind::Module, args, kwargs, interp)
}

/// `add_target(name, type, sources, includes, defines)`.
pub fn add_target(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let arg = |index: usize, name: &str| args.get(index).or(kwargs.get(name)).cloned();
    let name = arg(0, "name").context_type("add_target() expects a name")?.coerce_string();
    let kind_name = arg(1, "type").context_type("add_target() expects a type")?.coerce_string();
    let Some(kind) = TargetKind::parse(&kind_name) else {
        bail_runtime_error!("unknown target type '{}'", kind_name);
    };
    let sources = arg(2, "sources").unwrap_or(Value::None);
    let includes = arg(3, "includes").unwrap_or(Value::None);
    let defines = arg(4, "defines").unwrap_or(Value::None);

    let mut target = Target::new(&name, kind);
    target.script = interp.script_path().to_string();
    target.sources = files::resolve_sources(&[sources], interp)?;
    target.include_dirs = utils::strings([&includes])
        .iter()
        .map(|dir| interp.resolve_path(dir).to_string())
        .collect();
    target.definitions = utils::strings(&flag_items("CPPDEFINES", &defines));
    interp.graph.add_target(target);
    Ok(Value::list(vec![TargetNode { name: name.clone(), path: interp.resolve_path(&name) }.into_object()]))
}

/// Appends source nodes for `files` (patterns expanded) to a list, or to
/// the environment list variable a string names.
pub(crate) fn add_source_files_to(
    env: Option<&Environment>,
    args: Vec<Value>,
    kwargs: Kwargs,
    interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    let destination = args
        .first()
        .or(kwargs.get("sources"))
        .context_type("add_source_files() expects a destination")?
        .clone();
    let patterns = args.get(1).or(kwargs.get("files")).cloned().unwrap_or(Value::None);
    let nodes: Vec<Value> = files::resolve_sources(&[patterns], interp)?
        .into_iter()
        .map(|path| FileNode::file(Path::from(path)).into_object())
        .collect();

    match destination {
        Value::List(items) => items.borrow_mut().extend(nodes),
        Value::String(name) => {
            let env = match env {
                Some(env) => env.clone(),
                None => environment::default_env(interp)?,
            };
            let mut current = env.list(&name);
            current.extend(nodes);
            env.set(&name, Value::list(current));
        }
        other => bail_type_error!("add_source_files() cannot add to '{}'", other.type_name()),
    }
    Ok(Value::None)
}

pub fn add_source_files(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    add_source_files_to(None, args, kwargs, interp)
}

/// Target name a `Depends` argument refers to. File dependencies have no
/// target and are dropped.
fn dependency_name(value: &Value, interp: &Interpreter) -> Option<String> {
    match value {
        Value::Object(obj) => obj.downcast::<TargetNode>().map(|node| node.name.clone()),
        Value::String(raw) => {
            let name = target_name(raw);
            let declared = interp.graph.target(&name).is_some();
            let looks_like_file = Path::from(raw.as_str()).extension().is_some();
            (declared || !looks_like_file).then_some(name)
        }
        _ => None,
    }
}

/// `Depends(target, dependency)`: one edge per pair.
pub fn depends(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let dependents = args.first().or(kwargs.get("target")).cloned().unwrap_or(Value::None);
    let dependencies = args.get(1).or(kwargs.get("dependency")).cloned().unwrap_or(Value::None);
    let dependents: Vec<String> = utils::flatten([&dependents])
        .iter()
        .filter_map(|v| dependency_name(v, interp))
        .collect();
    let dependencies: Vec<String> = utils::flatten([&dependencies])
        .iter()
        .filter_map(|v| dependency_name(v, interp))
        .collect();
    for dependent in &dependents {
        for dependency in &dependencies {
            interp.graph.add_dependency(dependent.clone(), dependency.clone());
        }
    }
    Ok(Value::None)
}

/// Literal `add_dependency(dependent, dependency)`; names are taken as given.
pub fn add_dependency(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let dependents = args.first().or(kwargs.get("dependent")).cloned().unwrap_or(Value::None);
    let dependencies = args.get(1).or(kwargs.get("dependency")).cloned().unwrap_or(Value::None);
    let names = |value: &Value| -> Vec<String> {
        utils::flatten([value])
            .iter()
            .filter_map(|v| match v.as_object::<TargetNode>() {
                Some(node) => Some(node.name.clone()),
                None => link_name(v),
            })
            .collect()
    };
    for dependent in names(&dependents) {
        for dependency in names(&dependencies) {
            interp.graph.add_dependency(dependent.clone(), dependency);
        }
    }
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::interpreter::tests::{run, run_with};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_target_name() {
        assert_eq!(target_name("bin/my app.exe"), "my_app");
        assert_eq!(target_name("libfoo.so"), "libfoo");
        assert_eq!(target_name("engine.linuxbsd.editor"), "engine.linuxbsd.editor");
    }

    #[test]
    fn test_program_snapshots_environment() {
        let execution = run(r##"
env = Environment(CPPPATH=["include"], CPPDEFINES=["NDEBUG"])
env.Append(CCFLAGS="-O2 -Wall", LIBS=["m"], LIBPATH=["#lib"])
core = env.StaticLibrary("core", ["core.c"])
env.Program("bin/app", ["main.c", "util.c"], LIBS=[core, "pthread"], CPPDEFINES=["DEBUG"])
env.Append(CPPPATH=["late"])
"##);
        let app = execution.graph.target("app").unwrap();
        assert_eq!(app.kind, TargetKind::Executable);
        assert_eq!(app.sources, vec!["main.c", "util.c"]);
        assert_eq!(app.include_dirs, vec!["include"]);
        assert_eq!(app.definitions, vec!["DEBUG"]);
        assert_eq!(app.compile_options, vec!["-O2", "-Wall"]);
        assert_eq!(app.link_libraries, vec!["core", "pthread"]);
        assert_eq!(app.link_directories, vec!["lib"]);
        assert_eq!(app.properties.get("RUNTIME_OUTPUT_DIRECTORY").map(String::as_str), Some("bin"));
        assert_eq!(app.script, "SConstruct");

        let core = execution.graph.target("core").unwrap();
        assert_eq!(core.kind, TargetKind::StaticLibrary);
        assert_eq!(core.definitions, vec!["NDEBUG"]);
        assert_eq!(core.link_libraries, vec!["m"]);
    }

    #[test]
    fn test_source_only_form_and_properties() {
        let execution = run(r#"
SharedLibrary(source=["src/plugin.cpp"], SHLIBSUFFIX=".plugin")
LoadableModule("my-mod.so", "mod.cpp", LIBPREFIX="")
"#);
        let plugin = execution.graph.target("plugin").unwrap();
        assert_eq!(plugin.kind, TargetKind::SharedLibrary);
        assert_eq!(plugin.properties.get("SUFFIX").map(String::as_str), Some(".plugin"));
        let module = execution.graph.target("my-mod").unwrap();
        assert_eq!(module.properties.get("PREFIX").map(String::as_str), Some(""));
        assert!(!module.properties.contains_key("OUTPUT_NAME"));
    }

    #[test]
    fn test_nested_script_paths() {
        let runtime = MemoryRuntime::new()
            .with_file("src/SConscript", "Import('env')\nenv.Program('tool', Glob('*.c'), CPPPATH=['.', '#include'])\n")
            .with_file("src/a.c", "")
            .with_file("src/b.c", "");
        let (result, execution) = run_with(
            "env = Environment()\nExport('env')\nSConscript('src/SConscript')\n",
            runtime,
            ConvertOptions::default(),
        );
        result.unwrap();
        let tool = execution.graph.target("tool").unwrap();
        assert_eq!(tool.sources, vec!["src/a.c", "src/b.c"]);
        assert_eq!(tool.include_dirs, vec!["src", "include"]);
        assert_eq!(tool.script, "src/SConscript");
    }

    #[test]
    fn test_depends_and_literal_forms() {
        let execution = run(r#"
lib = add_target("lib", "static_library", ["lib.c"], ["inc"], ["X=1"])
app = Program("app", ["main.c"])
Depends(app, lib)
Depends("app", "generated.h")
add_dependency(["app"], ["lib", "tools"])
"#);
        let lib = execution.graph.target("lib").unwrap();
        assert_eq!(lib.include_dirs, vec!["inc"]);
        assert_eq!(lib.definitions, vec!["X=1"]);
        let edges: Vec<(&str, &str)> = execution
            .graph
            .dependencies()
            .iter()
            .map(|e| (e.dependent.as_str(), e.dependency.as_str()))
            .collect();
        assert_eq!(edges, vec![("app", "lib"), ("app", "tools")]);
        assert_eq!(execution.graph.target("app").unwrap().dependencies, ["lib", "tools"]);
    }

    #[test]
    fn test_add_source_files() {
        let runtime = MemoryRuntime::new()
            .with_file("core/a.cpp", "")
            .with_file("core/b.cpp", "")
            .with_file("core/SCsub", "Import('env')\nenv.add_source_files(env.core_sources, '*.cpp')\nenv.add_source_files('extra_sources', ['c.cpp'])\nExport('env')\n");
        let (result, execution) = run_with(
            r#"
env = Environment()
env.core_sources = []
Export('env')
SConscript('core/SCsub')
env.Program('engine', env.core_sources + env['extra_sources'])
"#,
            runtime,
            ConvertOptions::default(),
        );
        result.unwrap();
        let engine = execution.graph.target("engine").unwrap();
        assert_eq!(engine.sources, vec!["core/a.cpp", "core/b.cpp", "core/c.cpp"]);
    }
}
