use crate::interpreter::error::{ErrorContext, bail_runtime_error};
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, Value};

/// The SCons release scripts observe.
pub const SCONS_VERSION: &str = "4.0.0";

fn emulated() -> Result<semver::Version, InterpreterError> {
    semver::Version::parse(SCONS_VERSION).with_context_runtime(|| format!("Invalid version string '{SCONS_VERSION}'"))
}

fn component(args: &[Value], kwargs: &Kwargs, index: usize, name: &str) -> Result<u64, InterpreterError> {
    match args.get(index).or(kwargs.get(name)) {
        Some(value) => {
            let n = value.as_integer()?;
            u64::try_from(n).with_context_type(|| format!("{name} must not be negative"))
        }
        None => Ok(0),
    }
}

/// `EnsureSConsVersion(major, minor, revision=0)`.
pub fn ensure_scons_version(args: Vec<Value>, kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let required = semver::Version::new(
        component(&args, &kwargs, 0, "major")?,
        component(&args, &kwargs, 1, "minor")?,
        component(&args, &kwargs, 2, "revision")?,
    );
    let requirement = semver::VersionReq::parse(&format!(">={required}"))
        .with_context_runtime(|| format!("Invalid version requirement '{required}'"))?;
    let version = emulated()?;
    if !requirement.matches(&version) {
        bail_runtime_error!("SCons {} or greater required, but you have SCons {}", required, version);
    }
    Ok(Value::None)
}

pub fn ensure_python_version(_args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(Value::None)
}

/// `GetSConsVersion()` as a `(major, minor, revision)` tuple.
pub fn get_scons_version(_args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let version = emulated()?;
    Ok(Value::Tuple(
        [version.major, version.minor, version.patch]
            .into_iter()
            .map(|part| Value::Integer(part as i64))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::interpreter::tests::{run, run_with, var};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_version_checks() {
        let execution = run("EnsureSConsVersion(3, 0)\nEnsureSConsVersion(4, 0, 0)\nEnsurePythonVersion(3, 6)\nv = GetSConsVersion()\n");
        assert_eq!(var(&execution, "v"), var(&run("v = [4, 0, 0]"), "v"));

        let (result, _) = run_with("EnsureSConsVersion(4, 5)\n", MemoryRuntime::new(), ConvertOptions::default());
        assert!(result.is_err());
    }
}
