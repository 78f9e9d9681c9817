//! Modules a script can import: the host-facing `os`, `os.path`, `sys`
//! and `platform`, project-local Python files, and opaque placeholders
//! for everything else.

use crate::config::{python_platform, system_name};
use crate::interpreter::builtins::{builtin_impl, lookup_global};
use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Namespace, ScriptObject, Value};
use crate::path::Path;

/// Stand-in for anything the converter cannot model: a module outside the
/// project, the result of an unrecognized call, a missing import. Every
/// use is absorbed and calls are recorded as unrecognized.
#[derive(Debug)]
pub struct Opaque {
    name: String,
}

impl Opaque {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ScriptObject for Opaque {
    fn class_name(&self) -> &'static str {
        "opaque"
    }

    fn call_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        Ok(interp.unrecognized(&format!("{}.{name}", self.name)))
    }

    fn has_method(&self, _name: &str) -> bool {
        true
    }

    fn get_attr(&self, name: &str, _interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        // `SCons.Script.Glob` and friends are the ordinary builtins.
        if self.name.starts_with("SCons") {
            if let Some(builtin) = lookup_global(name) {
                return Ok(Some(Value::Builtin(builtin)));
            }
        }
        Ok(Some(Opaque::new(format!("{}.{name}", self.name)).into_object()))
    }

    fn set_attr(&self, _name: &str, _value: Value, _interp: &mut Interpreter) -> Result<(), InterpreterError> {
        Ok(())
    }

    fn get_item(&self, key: &Value, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Opaque::new(format!("{}[{}]", self.name, key.repr())).into_object())
    }

    fn set_item(&self, _key: &Value, _value: Value, _interp: &mut Interpreter) -> Result<(), InterpreterError> {
        Ok(())
    }

    fn contains(&self, _item: &Value, _interp: &mut Interpreter) -> Result<bool, InterpreterError> {
        Ok(false)
    }

    fn iterate(&self) -> Result<Vec<Value>, InterpreterError> {
        Ok(Vec::new())
    }

    fn call(&self, _args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(interp.unrecognized(&self.name))
    }

    fn to_string(&self) -> String {
        format!("<{}>", self.name)
    }

    fn truthy(&self) -> bool {
        false
    }
}

/// A project-local `.py` file, imported through the loader.
#[derive(Debug)]
pub struct ScriptModule {
    name: String,
    globals: Namespace,
}

impl ScriptModule {
    pub fn new(name: impl Into<String>, globals: Namespace) -> Self {
        Self {
            name: name.into(),
            globals,
        }
    }

    /// Names `from module import *` binds.
    pub fn public_names(&self) -> Vec<(String, Value)> {
        self.globals
            .borrow()
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl ScriptObject for ScriptModule {
    fn class_name(&self) -> &'static str {
        "module"
    }

    fn call_method(
        &self,
        name: &str,
        _args: Vec<Value>,
        _kwargs: Kwargs,
        _interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        bail_runtime_error!("AttributeError: module '{}' has no attribute '{}'", self.name, name)
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn get_attr(&self, name: &str, _interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        match self.globals.borrow().get(name) {
            Some(value) => Ok(Some(value.clone())),
            None => bail_runtime_error!("AttributeError: module '{}' has no attribute '{}'", self.name, name),
        }
    }

    fn set_attr(&self, name: &str, value: Value, _interp: &mut Interpreter) -> Result<(), InterpreterError> {
        self.globals.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    fn to_string(&self) -> String {
        format!("<module '{}'>", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Host {
    Os,
    OsPath,
    Sys,
    Platform,
}

/// Host modules answer from the configured target, never from the
/// machine running the conversion.
#[derive(Debug)]
pub struct HostModule {
    kind: Host,
}

pub fn host_module(name: &str) -> Option<Value> {
    let kind = match name {
        "os" => Host::Os,
        "os.path" => Host::OsPath,
        "sys" => Host::Sys,
        "platform" => Host::Platform,
        _ => return None,
    };
    Some(HostModule { kind }.into_object())
}

fn string_arg(args: &[Value], index: usize, function: &str) -> Result<String, InterpreterError> {
    args.get(index)
        .map(Value::coerce_string)
        .with_context_type(|| format!("{function}() missing argument {}", index + 1))
}

impl HostModule {
    fn module_name(&self) -> &'static str {
        match self.kind {
            Host::Os => "os",
            Host::OsPath => "os.path",
            Host::Sys => "sys",
            Host::Platform => "platform",
        }
    }

    fn path_call(&self, name: &str, args: Vec<Value>, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let value = match name {
            "join" => {
                let mut path = Path::new();
                for arg in &args {
                    path = path.join(arg.coerce_string());
                }
                Value::String(path.to_string())
            }
            "exists" | "isfile" | "isdir" => {
                let path = interp.resolve_path(&string_arg(&args, 0, name)?);
                let host = interp.host_path(&path);
                let runtime = interp.runtime.clone();
                let found = match name {
                    "isfile" => runtime.is_file(&host),
                    "isdir" => runtime.is_dir(&host),
                    _ => runtime.exists(&host),
                };
                Value::Boolean(found.unwrap_or(false))
            }
            "basename" => Value::String(Path::from(string_arg(&args, 0, name)?).file_name().to_string()),
            "dirname" => Value::String(Path::from(string_arg(&args, 0, name)?).parent().to_string()),
            "splitext" => {
                let raw = string_arg(&args, 0, name)?;
                let path = Path::from(&raw);
                let (root, ext) = match path.extension() {
                    Some(ext) => {
                        let cut = raw.len() - ext.len() - 1;
                        (raw[..cut].to_string(), raw[cut..].to_string())
                    }
                    _ => (raw.clone(), String::new()),
                };
                Value::Tuple(vec![Value::String(root), Value::String(ext)])
            }
            "split" => {
                let path = Path::from(string_arg(&args, 0, name)?);
                Value::Tuple(vec![
                    Value::String(path.parent().to_string()),
                    Value::String(path.file_name().to_string()),
                ])
            }
            "abspath" | "realpath" => {
                let path = interp.resolve_path(&string_arg(&args, 0, name)?);
                Value::String(interp.host_path(&path).to_string())
            }
            "normpath" => Value::String(Path::from(string_arg(&args, 0, name)?).normalize().to_string()),
            "relpath" => {
                let path = Path::from(string_arg(&args, 0, name)?);
                let base = match args.get(1) {
                    Some(base) => Path::from(base.coerce_string()),
                    None => interp.host_path(&interp.script_dir()),
                };
                Value::String(path.relative_to(&base).to_string())
            }
            "expanduser" => args.first().cloned().unwrap_or(Value::None),
            _ => return Ok(interp.unrecognized(&format!("os.path.{name}"))),
        };
        Ok(value)
    }

    fn os_call(&self, name: &str, args: Vec<Value>, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let value = match name {
            "getcwd" => Value::String(interp.host_path(&interp.script_dir()).to_string()),
            "getenv" => {
                let key = string_arg(&args, 0, name)?;
                match interp.runtime.get_env(&key) {
                    Some(value) => Value::String(value),
                    None => args.get(1).cloned().unwrap_or(Value::None),
                }
            }
            "listdir" => {
                let raw = args.first().map(Value::coerce_string).unwrap_or_else(|| ".".into());
                let path = interp.resolve_path(&raw);
                let host = interp.host_path(&path);
                let entries = interp
                    .runtime
                    .read_dir(&host)
                    .with_context_runtime(|| format!("OSError: cannot list '{raw}'"))?;
                Value::list(entries.into_iter().map(Value::String).collect())
            }
            "cpu_count" => Value::Integer(1),
            _ => return Ok(interp.unrecognized(&format!("os.{name}"))),
        };
        Ok(value)
    }
}

impl ScriptObject for HostModule {
    fn class_name(&self) -> &'static str {
        "module"
    }

    fn call_method(
        &self,
        name: &str,
        args: Vec<Value>,
        _kwargs: Kwargs,
        interp: &mut Interpreter,
    ) -> Result<Value, InterpreterError> {
        match self.kind {
            Host::OsPath => self.path_call(name, args, interp),
            Host::Os => self.os_call(name, args, interp),
            Host::Sys => match name {
                "exit" => {
                    let code = match args.first() {
                        None | Some(Value::None) => 0,
                        Some(Value::Integer(code)) => *code,
                        Some(_) => 1,
                    };
                    Err(InterpreterError::Exit(code))
                }
                _ => Ok(interp.unrecognized(&format!("sys.{name}"))),
            },
            Host::Platform => match name {
                "system" => {
                    interp.probe_platform();
                    Ok(Value::string(system_name(&interp.options.platform)))
                }
                "machine" => {
                    interp.probe_platform();
                    Ok(Value::String(interp.options.arch.clone()))
                }
                _ => Ok(interp.unrecognized(&format!("platform.{name}"))),
            },
        }
    }

    fn has_method(&self, name: &str) -> bool {
        !matches!(
            (self.kind, name),
            (Host::Os, "path" | "sep" | "name" | "environ" | "pathsep" | "linesep")
                | (Host::Sys, "platform" | "version_info" | "argv" | "path" | "maxsize")
                | (Host::OsPath, "sep")
        )
    }

    fn get_attr(&self, name: &str, interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        let windows = interp.options.platform == "windows";
        let value = match (self.kind, name) {
            (Host::Os, "path") => HostModule { kind: Host::OsPath }.into_object(),
            (Host::Os | Host::OsPath, "sep") => Value::string(if windows { "\\" } else { "/" }),
            (Host::Os, "pathsep") => Value::string(if windows { ";" } else { ":" }),
            (Host::Os, "linesep") => Value::string(if windows { "\r\n" } else { "\n" }),
            (Host::Os, "name") => {
                interp.probe_platform();
                Value::string(if windows { "nt" } else { "posix" })
            }
            (Host::Os, "environ") => Environ.into_object(),
            (Host::Sys, "platform") => {
                interp.probe_platform();
                Value::string(python_platform(&interp.options.platform))
            }
            (Host::Sys, "version_info") => Value::Tuple(vec![
                Value::Integer(3),
                Value::Integer(11),
                Value::Integer(0),
                Value::string("final"),
                Value::Integer(0),
            ]),
            (Host::Sys, "argv") => Value::list(vec![Value::string("scons")]),
            (Host::Sys, "path") => Value::list(Vec::new()),
            (Host::Sys, "maxsize") => Value::Integer(i64::MAX),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn to_string(&self) -> String {
        format!("<module '{}'>", self.module_name())
    }
}

/// `os.environ`, read through the runtime.
#[derive(Debug)]
struct Environ;

impl Environ {
    fn get(&self, args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let key = string_arg(&args, 0, "get")?;
        Ok(match interp.runtime.get_env(&key) {
            Some(value) => Value::String(value),
            None => args.get(1).cloned().unwrap_or(Value::None),
        })
    }

    fn copy(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::dict(Default::default()))
    }
}

impl ScriptObject for Environ {
    fn class_name(&self) -> &'static str {
        "environ"
    }

    builtin_impl!(
        "get" => get,
        "copy" => copy,
    );

    fn get_item(&self, key: &Value, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let key = key.coerce_string();
        interp
            .runtime
            .get_env(&key)
            .map(Value::String)
            .with_context_runtime(|| format!("KeyError: '{key}'"))
    }

    fn contains(&self, item: &Value, interp: &mut Interpreter) -> Result<bool, InterpreterError> {
        Ok(interp.runtime.get_env(&item.coerce_string()).is_some())
    }

    fn iterate(&self) -> Result<Vec<Value>, InterpreterError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::graph::VarValue;
    use crate::interpreter::tests::{run, run_with};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_host_modules_follow_target_platform() {
        let options = ConvertOptions {
            platform: "windows".into(),
            ..ConvertOptions::default()
        };
        let runtime = MemoryRuntime::new().with_env("SDK_ROOT", "/opt/sdk");
        let (result, execution) = run_with(
            r#"
import os, sys, platform
is_win = sys.platform == "win32"
system = platform.system()
joined = os.path.join("core", "io", "file.cpp")
stem, ext = os.path.splitext("core/io/file.cpp")
sdk = os.environ.get("SDK_ROOT", "")
home = os.getenv("NOPE", "none")
"#,
            runtime,
            options,
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("is_win"), Some(&VarValue::boolean(true)));
        assert_eq!(execution.graph.lookup("system"), Some(&VarValue::string("Windows")));
        assert_eq!(execution.graph.lookup("joined"), Some(&VarValue::string("core/io/file.cpp")));
        assert_eq!(execution.graph.lookup("stem"), Some(&VarValue::string("core/io/file")));
        assert_eq!(execution.graph.lookup("ext"), Some(&VarValue::string(".cpp")));
        assert_eq!(execution.graph.lookup("sdk"), Some(&VarValue::string("/opt/sdk")));
        assert_eq!(execution.graph.lookup("home"), Some(&VarValue::string("none")));
    }

    #[test]
    fn test_opaque_modules_absorb_use() {
        let execution = run(r#"
import subprocess
out = subprocess.check_output(["git", "rev-parse", "HEAD"])
flag = bool(out)
from SCons.Script import Glob
g = Glob("*.nothing")
"#);
        assert_eq!(execution.graph.lookup("flag"), Some(&VarValue::boolean(false)));
        let calls = execution.graph.unrecognized_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "subprocess.check_output");
    }

    #[test]
    fn test_sys_exit_stops_script() {
        let execution = run("import sys\na = 1\nsys.exit()\nb = 2\n");
        assert!(execution.graph.lookup("a").is_some());
        assert!(execution.graph.lookup("b").is_none());
    }
}
