//! Godot engine conventions, active in [`Mode::Godot`](crate::config::Mode).

use indexmap::IndexMap;
use tracing::debug;

use crate::config::godot_platform_definitions;
use crate::graph::{PlatformSetting, TargetKind};
use crate::interpreter::builtins::environment::Environment;
use crate::interpreter::builtins::project::DEFAULT_VERSION;
use crate::interpreter::builtins::{targets, utils};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};
use crate::path::Path;
use crate::runtime;

const VERSION_FILE: &str = "version.py";
const DEFAULT_TARGET: &str = "editor";
const MODULES_DIR: &str = "modules";

/// Top-level `name = value` assignments of `version.py`.
fn parse_version_file(source: &str) -> IndexMap<String, Value> {
    let mut fields = IndexMap::new();
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let value = value.trim();
        let value = if let Ok(number) = value.parse::<i64>() {
            Value::Integer(number)
        } else {
            Value::String(value.trim_matches(|c| c == '"' || c == '\'').to_string())
        };
        fields.insert(key.to_string(), value);
    }
    fields
}

/// Project identity from `version.py`; also binds `version_info` and the
/// engine's platform definitions.
pub(crate) fn prepare(interp: &mut Interpreter) -> (String, String) {
    let host = interp.host_path(&Path::from(VERSION_FILE));
    let mut info = match runtime::read_to_string(&*interp.runtime, &host) {
        Ok(source) => parse_version_file(&source),
        Err(err) => {
            debug!("no {VERSION_FILE}: {err}");
            IndexMap::new()
        }
    };
    let number = |key: &str| info.get(key).and_then(|v| v.as_integer().ok());
    let version = match (number("major"), number("minor")) {
        (Some(major), Some(minor)) => format!("{major}.{minor}.{}", number("patch").unwrap_or(0)),
        _ => DEFAULT_VERSION.to_string(),
    };
    info.entry("short_name".into()).or_insert_with(|| Value::string("godot"));
    interp.builtins.insert("version_info".into(), Value::dict(info));

    let platform = interp.options.platform.clone();
    let mut definitions: Vec<String> = godot_platform_definitions(&platform).iter().map(|d| d.to_string()).collect();
    let modules = enabled_modules(interp);
    debug!("enabled modules: {}", modules.join(", "));
    definitions.extend(modules.iter().map(|m| format!("MODULE_{}_ENABLED", m.to_ascii_uppercase())));
    interp.graph.add_platform_setting(&platform, PlatformSetting::Definition, definitions);
    ("godot".to_string(), version)
}

/// `module_<name>_enabled` -> `<name>`.
fn module_switch(var: &str) -> Option<&str> {
    var.strip_prefix("module_")?
        .strip_suffix("_enabled")
        .filter(|name| !name.is_empty())
}

fn has_module_dir(interp: &Interpreter, module: &str) -> bool {
    let scsub = interp.host_path(&Path::from(MODULES_DIR).join(module).join("SCsub"));
    interp.runtime.is_file(&scsub).unwrap_or(false)
}

/// An explicit `module_<name>_enabled=` argument wins; otherwise a module
/// is enabled when its directory has an `SCsub`.
fn module_enabled(interp: &Interpreter, module: &str) -> bool {
    match argument(interp, &format!("module_{module}_enabled")) {
        Some(_) => truthy_argument(interp, &format!("module_{module}_enabled")),
        None => has_module_dir(interp, module),
    }
}

/// Modules found under `modules/` plus those switched on by argument,
/// sorted.
fn enabled_modules(interp: &Interpreter) -> Vec<String> {
    let dir = interp.host_path(&Path::from(MODULES_DIR));
    let mut modules: Vec<String> = interp.runtime.read_dir(&dir).unwrap_or_default();
    modules.extend(interp.options.arguments.keys().filter_map(|key| module_switch(key)).map(str::to_string));
    modules.sort();
    modules.dedup();
    modules.retain(|module| module_enabled(interp, module));
    modules
}

fn argument(interp: &Interpreter, key: &str) -> Option<String> {
    interp.options.arguments.get(key).cloned()
}

fn truthy_argument(interp: &Interpreter, key: &str) -> bool {
    argument(interp, key).is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "yes" | "true" | "1" | "on" | "y"))
}

/// Construction variables the engine's SConstruct derives from the
/// command line.
pub(crate) fn default_var(name: &str, interp: &mut Interpreter) -> Option<Value> {
    let target = argument(interp, "target").unwrap_or_else(|| DEFAULT_TARGET.to_string());
    let value = match name {
        "target" => Value::String(target),
        "editor_build" | "tools" => Value::Boolean(target == "editor"),
        "debug_features" => Value::Boolean(target != "template_release"),
        "dev_build" => Value::Boolean(truthy_argument(interp, "dev_build")),
        "production" => Value::Boolean(truthy_argument(interp, "production")),
        "module_version_string" => Value::string(""),
        name => Value::Boolean(module_enabled(interp, module_switch(name)?)),
    };
    Some(value)
}

/// `env.add_library(name, sources, **overrides)`.
pub fn add_library(env: &Environment, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    targets::declare(env, TargetKind::StaticLibrary, args, kwargs, interp)
}

pub fn add_program(env: &Environment, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    targets::declare(env, TargetKind::Executable, args, kwargs, interp)
}

pub fn add_shared_library(env: &Environment, args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    targets::declare(env, TargetKind::SharedLibrary, args, kwargs, interp)
}

pub fn add_module_version_string(env: &Environment, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let current = env
        .lookup("module_version_string", interp)
        .map(|v| v.coerce_string())
        .unwrap_or_default();
    let mut updated = current;
    for part in utils::strings(&args) {
        updated.push('.');
        updated.push_str(&part);
    }
    env.set("module_version_string", Value::String(updated));
    Ok(Value::None)
}

/// Drops warning flags from the compile flags and silences the compiler.
pub fn disable_warnings(env: &Environment, _args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let msvc = interp.options.platform == "windows";
    for name in ["CCFLAGS", "CFLAGS", "CXXFLAGS"] {
        let mut flags: Vec<Value> = env
            .list(name)
            .into_iter()
            .filter(|flag| {
                let flag = flag.coerce_string();
                if msvc {
                    !(flag.starts_with("/W") || flag.starts_with("/w"))
                } else {
                    !flag.starts_with("-W")
                }
            })
            .collect();
        if name == "CCFLAGS" {
            flags.push(Value::string(if msvc { "/w" } else { "-w" }));
        }
        env.set(name, Value::list(flags));
    }
    Ok(Value::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvertOptions, Mode};
    use crate::graph::VarValue;
    use crate::interpreter::tests::run_with;
    use crate::runtime::memory::MemoryRuntime;

    fn godot() -> ConvertOptions {
        ConvertOptions {
            mode: Mode::Godot,
            ..ConvertOptions::default()
        }
    }

    #[test]
    fn test_parse_version_file() {
        let fields = parse_version_file("short_name = \"godot\"\nmajor = 4\n# note\nstatus = 'dev'\n");
        assert_eq!(fields.get("major").and_then(|v| v.as_integer().ok()), Some(4));
        assert_eq!(fields.get("status").map(Value::coerce_string).as_deref(), Some("dev"));
    }

    #[test]
    fn test_godot_conventions() {
        let runtime = MemoryRuntime::new()
            .with_file("version.py", "major = 4\nminor = 3\npatch = 1\nstatus = \"stable\"\n")
            .with_file("core/SCsub", "Import('env')\nenv.add_library('core', ['core.cpp'])\n")
            .with_file("core/core.cpp", "");
        let (result, execution) = run_with(
            r#"
env = Environment(CCFLAGS=["-Wall", "-O2"])
status = version_info["status"]
editor = env.editor_build
env.add_module_version_string("custom")
mvs = env["module_version_string"]
env.disable_warnings()
flags = env["CCFLAGS"]
Export("env")
SConscript("core/SCsub")
env.add_program("godot", ["main.cpp"])
"#,
            runtime,
            godot(),
        );
        result.unwrap();
        assert_eq!(execution.graph.project().name, "godot");
        assert_eq!(execution.graph.project().version, "4.3.1");
        assert_eq!(execution.graph.lookup("status"), Some(&VarValue::string("stable")));
        assert_eq!(execution.graph.lookup("editor"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("mvs"), Some(&VarValue::string(".custom")));
        assert_eq!(
            execution.graph.lookup("flags"),
            Some(&VarValue::List(vec![VarValue::string("-O2"), VarValue::string("-w")]))
        );
        assert!(execution.graph.target("core").is_some());
        assert!(execution.graph.target("godot").is_some());
        let block = execution.graph.platform_blocks().next().unwrap();
        assert_eq!(block.platform, "linuxbsd");
        assert_eq!(block.definitions, vec!["UNIX_ENABLED", "LINUX_ENABLED"]);
    }

    #[test]
    fn test_module_detection() {
        let runtime = MemoryRuntime::new()
            .with_file("modules/gdscript/SCsub", "")
            .with_file("modules/mono/SCsub", "")
            .with_file("modules/notes/README.md", "");
        let mut options = godot();
        options.arguments.insert("module_mono_enabled".into(), "no".into());
        options.arguments.insert("module_extra_enabled".into(), "yes".into());
        let (result, execution) = run_with(
            "env = Environment()\ngdscript = env.module_gdscript_enabled\nmono = env['module_mono_enabled']\nnotes = env.module_notes_enabled\n",
            runtime,
            options,
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("gdscript"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("mono"), Some(&VarValue::boolean(false)));
        assert_eq!(execution.graph.lookup("notes"), Some(&VarValue::boolean(false)));
        let block = execution.graph.platform_blocks().next().unwrap();
        assert_eq!(
            block.definitions,
            vec!["UNIX_ENABLED", "LINUX_ENABLED", "MODULE_EXTRA_ENABLED", "MODULE_GDSCRIPT_ENABLED"]
        );
    }

    #[test]
    fn test_godot_helpers_are_unrecognized_in_generic_mode() {
        let (result, execution) = run_with(
            "env = Environment()\nenv.add_library('core', ['core.cpp'])\n",
            MemoryRuntime::new(),
            ConvertOptions::default(),
        );
        result.unwrap();
        assert!(execution.graph.targets().is_empty());
        assert_eq!(execution.graph.unrecognized_calls()[0].name, "env.add_library");
    }
}
