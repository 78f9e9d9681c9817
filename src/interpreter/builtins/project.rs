use tracing::debug;

use crate::config::Mode;
use crate::interpreter::Interpreter;
use crate::interpreter::builtins::godot;

/// Version recorded when neither the options nor the scripts give one.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Records the project identity before the root script runs. Explicit
/// options win over what the mode derives.
pub(crate) fn prepare(interp: &mut Interpreter, project_name: &str) {
    let (name, version) = match interp.options.mode {
        Mode::Godot => godot::prepare(interp),
        Mode::Generic => (project_name.to_string(), DEFAULT_VERSION.to_string()),
    };
    let name = interp.options.project_name.clone().unwrap_or(name);
    let version = interp.options.project_version.clone().unwrap_or(version);
    debug!("project {name} {version}");
    interp.graph.set_project(name, version);
}

#[cfg(test)]
mod tests {
    use crate::config::ConvertOptions;
    use crate::interpreter::tests::{run, run_with};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_generic_project_identity() {
        let execution = run("x = 1\n");
        assert_eq!(execution.graph.project().name, "test");
        assert_eq!(execution.graph.project().version, "0.1.0");

        let options = ConvertOptions {
            project_name: Some("demo".into()),
            project_version: Some("2.1.0".into()),
            ..ConvertOptions::default()
        };
        let (result, execution) = run_with("x = 1\n", MemoryRuntime::new(), options);
        result.unwrap();
        assert_eq!(execution.graph.project().name, "demo");
        assert_eq!(execution.graph.project().version, "2.1.0");
    }
}
