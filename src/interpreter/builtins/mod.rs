//! The builder API and Python builtins visible to scripts.

pub mod builders;
pub mod debug;
pub mod dict;
pub mod environment;
pub mod files;
pub mod godot;
pub mod list;
pub mod modules;
pub mod project;
pub mod python;
pub mod script;
pub mod string;
pub mod targets;
pub mod utils;
pub mod variables;
pub mod version;

use indexmap::IndexMap;

use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

/// Implements the method table of a [`ScriptObject`](crate::interpreter::ScriptObject):
/// script-visible names on the left, inherent methods on the right.
/// Anything else goes to `fallback_method`.
macro_rules! builtin_impl {
    ($($name:literal => $method:ident),* $(,)?) => {
        fn call_method(
            &self,
            name: &str,
            _args: std::vec::Vec<crate::interpreter::Value>,
            _kwargs: crate::interpreter::Kwargs,
            _interp: &mut crate::interpreter::Interpreter,
        ) -> Result<crate::interpreter::Value, crate::interpreter::InterpreterError> {
            match name {
                $($name => self.$method(_args, _kwargs, _interp),)*
                _ => self.fallback_method(name, _args, _kwargs, _interp),
            }
        }

        fn has_method(&self, name: &str) -> bool {
            const METHODS: &[&str] = &[$($name),*];
            METHODS.contains(&name)
        }
    };
}

pub(crate) use builtin_impl;

pub type BuiltinFn = fn(Vec<Value>, Kwargs, &mut Interpreter) -> Result<Value, InterpreterError>;

const GLOBALS: &[(&str, BuiltinFn)] = &[
    // Python builtins.
    ("len", python::len),
    ("str", python::str),
    ("int", python::int),
    ("float", python::float),
    ("bool", python::bool),
    ("list", python::list),
    ("tuple", python::tuple),
    ("dict", python::dict),
    ("set", python::set),
    ("range", python::range),
    ("sorted", python::sorted),
    ("reversed", python::reversed),
    ("enumerate", python::enumerate),
    ("zip", python::zip),
    ("min", python::min),
    ("max", python::max),
    ("sum", python::sum),
    ("any", python::any),
    ("all", python::all),
    ("map", python::map),
    ("filter", python::filter),
    ("abs", python::abs),
    ("repr", python::repr),
    ("isinstance", python::isinstance),
    ("callable", python::callable),
    ("getattr", python::getattr),
    ("hasattr", python::hasattr),
    ("Exception", python::exception),
    ("ValueError", python::exception),
    ("RuntimeError", python::exception),
    ("TypeError", python::exception),
    ("KeyError", python::exception),
    ("ImportError", python::exception),
    ("OSError", python::exception),
    ("IOError", python::exception),
    ("AttributeError", python::exception),
    ("NameError", python::exception),
    ("NotImplementedError", python::exception),
    ("print", debug::print),
    // Diagnostics.
    ("print_info", debug::print_info),
    ("print_warning", debug::print_warning),
    ("print_error", debug::print_error),
    ("EnsureSConsVersion", version::ensure_scons_version),
    ("EnsurePythonVersion", version::ensure_python_version),
    ("GetSConsVersion", version::get_scons_version),
    // Environments.
    ("Environment", environment::environment),
    ("DefaultEnvironment", environment::default_environment),
    ("Configure", environment::configure),
    // Targets and dependencies.
    ("Program", targets::program),
    ("StaticLibrary", targets::static_library),
    ("Library", targets::static_library),
    ("SharedLibrary", targets::shared_library),
    ("LoadableModule", targets::loadable_module),
    ("add_target", targets::add_target),
    ("add_source_files", targets::add_source_files),
    ("Depends", targets::depends),
    ("Requires", targets::depends),
    ("add_dependency", targets::add_dependency),
    // Files and nodes.
    ("Object", files::object),
    ("StaticObject", files::object),
    ("SharedObject", files::object),
    ("Glob", files::glob),
    ("File", files::file),
    ("Dir", files::dir),
    ("Entry", files::file),
    ("Value", files::value),
    ("WhereIs", files::where_is),
    ("Split", utils::split),
    ("Flatten", utils::flatten_builtin),
    // Options.
    ("Variables", variables::variables),
    ("BoolVariable", variables::bool_variable),
    ("EnumVariable", variables::enum_variable),
    ("PathVariable", variables::path_variable),
    ("ListVariable", variables::list_variable),
    ("AddOption", variables::add_option_flag),
    ("GetOption", variables::get_option),
    ("add_option", variables::add_option),
    // Includes.
    ("SConscript", script::sconscript),
    ("Export", script::export),
    ("Import", script::import),
    ("Return", script::return_),
    ("include_script", script::include_script),
    ("Exit", script::exit),
    ("GetLaunchDir", script::get_launch_dir),
    // Custom builders.
    ("Builder", builders::builder),
    ("Action", builders::action),
    ("Command", builders::command),
    ("register_custom_builder", builders::register_custom_builder),
    // Accepted without effect on the graph.
    ("Alias", accepted_nodes),
    ("Install", accepted_nodes),
    ("InstallAs", accepted_nodes),
    ("AlwaysBuild", accepted),
    ("Default", accepted),
    ("Clean", accepted),
    ("NoClean", accepted),
    ("NoCache", accepted),
    ("Precious", accepted),
    ("SideEffect", accepted),
    ("Ignore", accepted),
    ("AddPostAction", accepted),
    ("AddPreAction", accepted),
    ("SConsignFile", accepted),
    ("CacheDir", accepted),
    ("Decider", accepted),
    ("SetOption", accepted),
    ("SConscriptChdir", accepted),
    ("Help", accepted),
    ("Progress", accepted),
];

/// Registered name of a global builtin. The returned `&'static str` is
/// what [`Value::Builtin`] carries.
pub fn lookup_global(name: &str) -> Option<&'static str> {
    GLOBALS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(name, _)| *name)
}

pub fn call_global(
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    interp: &mut Interpreter,
) -> Result<Value, InterpreterError> {
    match GLOBALS.iter().find(|(candidate, _)| *candidate == name) {
        Some((_, function)) => function(args, kwargs, interp),
        None => Ok(interp.unrecognized(name)),
    }
}

/// Predefined SCons globals.
pub(crate) fn init_constants(interp: &mut Interpreter) {
    let arguments: IndexMap<String, Value> = interp
        .options
        .arguments
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let arglist = interp
        .options
        .arguments
        .iter()
        .map(|(k, v)| Value::Tuple(vec![Value::String(k.clone()), Value::String(v.clone())]))
        .collect();

    interp.builtins.insert("ARGUMENTS".into(), Value::dict(arguments));
    interp.builtins.insert("ARGLIST".into(), Value::list(arglist));
    for name in ["COMMAND_LINE_TARGETS", "BUILD_TARGETS", "DEFAULT_TARGETS"] {
        interp.builtins.insert(name.into(), Value::list(Vec::new()));
    }
}

fn accepted(_args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::None)
}

/// No-op builders whose result scripts may still pass around.
fn accepted_nodes(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::list(args.into_iter().take(1).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::tests::run;

    #[test]
    fn test_lookup_global() {
        assert_eq!(lookup_global("SConscript"), Some("SConscript"));
        assert_eq!(lookup_global("Frobnicate"), None);
    }

    #[test]
    fn test_arguments_are_visible() {
        use crate::config::ConvertOptions;
        use crate::interpreter::tests::run_with;
        use crate::runtime::memory::MemoryRuntime;

        let mut options = ConvertOptions::default();
        options.arguments.insert("target".into(), "editor".into());
        let (result, execution) = run_with(
            "target = ARGUMENTS.get('target', 'debug')\nmissing = ARGUMENTS.get('x', 'dflt')\n",
            MemoryRuntime::new(),
            options,
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("target"), Some(&crate::graph::VarValue::string("editor")));
        assert_eq!(execution.graph.lookup("missing"), Some(&crate::graph::VarValue::string("dflt")));
    }

    #[test]
    fn test_accepted_calls_leave_no_trace() {
        let execution = run("Default('x')\nAlias('all', 'x')\nSConsignFile('.sconsign')\n");
        assert!(execution.graph.unrecognized_calls().is_empty());
        assert!(execution.graph.targets().is_empty());
    }
}
