//! Translates SCons build scripts into CMake project files.
//!
//! Each script runs in a restricted interpreter that records every
//! build-relevant call into a [`BuildGraph`]. A graph that validates is
//! rendered to `CMakeLists.txt` next to the script it came from.

pub mod codegen;
pub mod config;
pub mod error;
pub mod graph;
mod interpreter;
pub mod loader;
mod parser;
pub mod path;
pub mod runtime;

use core::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::{error, info};

use crate::codegen::{CMakeGenerator, Generator};
pub use crate::config::{ConvertOptions, Mode};
pub use crate::error::{ConvertError, IncludeError, ValidationError};
pub use crate::graph::BuildGraph;
use crate::interpreter::{Interpreter, ModuleState};
pub use crate::interpreter::InterpreterError;
use crate::loader::ModuleRegistry;
pub use crate::parser::{ParseError, ParseErrorKind};
use crate::path::Path;
use crate::runtime::Runtime;

/// Converts the scripts of one project tree. Scripts converted by the same
/// `Converter` share one module registry, so a nested script included from
/// several roots runs only once.
pub struct Converter {
    runtime: Rc<dyn Runtime>,
    project_root: Path,
    options: ConvertOptions,
    registry: ModuleRegistry<ModuleState>,
    dry_run: bool,
}

/// What converting one script produced. The graph is kept even when the
/// conversion failed part way.
#[derive(Debug)]
pub struct Conversion {
    pub script: Path,
    pub graph: BuildGraph,
    pub warnings: usize,
    /// The rendered `CMakeLists.txt`, or why there is none.
    pub outcome: Result<String, ConvertError>,
}

impl Conversion {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug)]
pub enum FileStatus {
    Converted {
        output: Path,
        targets: usize,
        warnings: usize,
        written: bool,
    },
    Failed(ConvertError),
}

#[derive(Debug)]
pub struct FileReport {
    pub script: Path,
    pub status: FileStatus,
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, FileStatus::Converted { .. })
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            FileStatus::Converted {
                output,
                targets,
                warnings,
                written,
            } => {
                let verb = if *written { "converted" } else { "checked" };
                write!(
                    f,
                    "{verb:<9} {} -> {output} ({targets} target(s), {warnings} warning(s))",
                    self.script
                )
            }
            FileStatus::Failed(err) => write!(f, "{:<9} {err}", "failed"),
        }
    }
}

/// Per-file outcomes of a batch run, in processing order.
#[derive(Debug, Default)]
pub struct Manifest {
    pub reports: Vec<FileReport>,
}

impl Manifest {
    pub fn converted(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(FileReport::is_success)
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.reports {
            writeln!(f, "{report}")?;
        }
        write!(
            f,
            "{} converted, {} failed",
            self.converted().count(),
            self.failed().count()
        )
    }
}

impl Converter {
    pub fn new(runtime: impl Runtime, project_root: impl AsRef<str>) -> Self {
        Self {
            runtime: Rc::new(runtime),
            project_root: Path::from(project_root.as_ref()),
            options: ConvertOptions::default(),
            registry: ModuleRegistry::new(),
            dry_run: false,
        }
    }

    pub fn options(&mut self, options: ConvertOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Adds one `ARGUMENTS` entry, as `key=value` would on an SCons
    /// command line.
    pub fn argument(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.options.arguments.insert(key.into(), value.into());
        self
    }

    pub fn platform(&mut self, platform: &str) -> &mut Self {
        self.options.platform = config::normalize_platform(platform);
        self
    }

    pub fn arch(&mut self, arch: &str) -> &mut Self {
        self.options.arch = config::normalize_arch(arch);
        self
    }

    pub fn mode(&mut self, mode: Mode) -> &mut Self {
        self.options.mode = mode;
        self
    }

    /// Render and report, but write nothing.
    pub fn dry_run(&mut self, dry_run: bool) -> &mut Self {
        self.dry_run = dry_run;
        self
    }

    fn project_name(&self) -> String {
        match self.project_root.normalize().file_name() {
            "" | "." | ".." => "project".to_string(),
            name => name.to_string(),
        }
    }

    fn host_path(&self, path: &Path) -> Path {
        self.project_root.join(path.as_str()).normalize()
    }

    /// Executes, validates and renders one script. `script` is relative to
    /// the project root.
    pub fn convert(&mut self, script: &Path) -> Conversion {
        let script = script.normalize();
        let started = Instant::now();
        let options = Rc::new(self.options.clone());
        let registry = core::mem::take(&mut self.registry);
        let mut interp = Interpreter::new(
            self.runtime.clone(),
            options,
            self.project_root.clone(),
            registry,
        );
        interp.start(&self.project_name());
        let result = interp.run_script(&script);
        let execution = interp.finish();
        self.registry = execution.registry;
        let graph = execution.graph;

        let outcome = match result {
            Err(err) => Err(include_failure(&script, err, started)),
            Ok(_) => match graph::validate(&graph, self.options.allow_unresolved_references) {
                Err(errors) => Err(ConvertError::Validation {
                    path: script.clone(),
                    errors,
                }),
                Ok(()) => Ok(CMakeGenerator::from_options(&self.options).generate(&graph, &script)),
            },
        };
        Conversion {
            script,
            graph,
            warnings: execution.warnings,
            outcome,
        }
    }

    /// Converts `script` and writes `CMakeLists.txt` beside it. Nothing is
    /// written when the conversion fails.
    pub fn convert_and_write(&mut self, script: &Path) -> FileReport {
        let conversion = self.convert(script);
        let script = conversion.script;
        let text = match conversion.outcome {
            Ok(text) => text,
            Err(err) => {
                error!("{err}");
                return FileReport {
                    script,
                    status: FileStatus::Failed(err),
                };
            }
        };

        let output = script.parent().join(CMakeGenerator::default().file_name());
        if !self.dry_run {
            let host = self.host_path(&output);
            if let Err(err) = self.runtime.write_file(&host, text.as_bytes()) {
                let err = ConvertError::Io {
                    path: output,
                    message: format!("{err:#}"),
                };
                error!("{err}");
                return FileReport {
                    script,
                    status: FileStatus::Failed(err),
                };
            }
        }
        info!("{script} -> {output}");
        FileReport {
            script,
            status: FileStatus::Converted {
                output,
                targets: conversion.graph.targets().len(),
                warnings: conversion.warnings,
                written: !self.dry_run,
            },
        }
    }

    /// Converts every script, root scripts first. A failure only affects
    /// its own file.
    pub fn convert_all(&mut self, scripts: &[Path]) -> Manifest {
        let mut ordered: Vec<Path> = scripts.iter().map(Path::normalize).collect();
        ordered.sort_by_key(|path| (path.file_name() != config::ROOT_SCRIPT, path.clone()));
        ordered.dedup();
        let reports = ordered.iter().map(|script| self.convert_and_write(script)).collect();
        Manifest { reports }
    }
}

fn include_failure(script: &Path, err: IncludeError, started: Instant) -> ConvertError {
    if err.is_timeout() {
        return ConvertError::Timeout {
            path: script.clone(),
            elapsed: started.elapsed(),
        };
    }
    match err {
        IncludeError::Syntax { source, .. } => ConvertError::Syntax {
            path: script.clone(),
            source,
        },
        IncludeError::Execution { source, .. } => ConvertError::Execution {
            path: script.clone(),
            source: *source,
        },
        IncludeError::NotFound { .. } | IncludeError::Io { .. } => ConvertError::Io {
            path: script.clone(),
            message: err.to_string(),
        },
        err @ (IncludeError::Recursive { .. } | IncludeError::Failed { .. }) => ConvertError::Include {
            path: script.clone(),
            source: err,
        },
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;
    use crate::graph::{Scalar, VarValue};
    use crate::runtime::memory::MemoryRuntime;

    /// A converter over a fresh in-memory tree, plus a handle to inspect it.
    fn converter(files: &[(&str, &str)]) -> (Converter, Rc<MemoryRuntime>) {
        let runtime = files
            .iter()
            .fold(MemoryRuntime::new(), |rt, (path, text)| rt.with_file(path, text));
        let runtime = Rc::new(runtime);
        let converter = Converter {
            runtime: runtime.clone(),
            project_root: Path::new(),
            options: ConvertOptions::default(),
            registry: ModuleRegistry::new(),
            dry_run: false,
        };
        (converter, runtime)
    }

    fn output(conversion: &Conversion) -> &str {
        match &conversion.outcome {
            Ok(text) => text,
            Err(err) => panic!("conversion failed: {err}"),
        }
    }

    #[test]
    fn test_flags_and_shared_library() {
        let (mut converter, _) = converter(&[(
            "SConstruct",
            r#"
env = Environment()
flags = ["-O2", "-Wall"]
env.Append(CCFLAGS=flags)
env.StaticLibrary("core", ["core.cpp"])
engine = env.SharedLibrary("engine", ["a.cpp", "b.cpp"])
env.Depends(engine, "core")
"#,
        )]);
        let conversion = converter.convert(&Path::from("SConstruct"));
        let text = output(&conversion);
        assert!(text.contains("set(flags -O2 -Wall)"));
        assert!(text.contains("add_library(engine SHARED\n  a.cpp\n  b.cpp\n)"));
        let core = text.find("add_library(core STATIC").unwrap();
        let edge = text.find("add_dependencies(engine core)").unwrap();
        assert!(core < edge);
        assert!(text.starts_with("# Generated by scons2cmake from SConstruct"));
    }

    #[test]
    fn test_duplicate_target_writes_nothing() {
        let nested = "env = Environment()\nenv.StaticLibrary('core', ['core.cpp'])\n";
        let (mut converter, runtime) = converter(&[
            ("SConstruct", "SConscript(['a/SConscript', 'b/SConscript'])\n"),
            ("a/SConscript", nested),
            ("b/SConscript", nested),
        ]);
        let report = converter.convert_and_write(&Path::from("SConstruct"));
        let FileStatus::Failed(err) = &report.status else {
            panic!("expected a validation failure");
        };
        assert_eq!(
            err.validation_errors(),
            [ValidationError::DuplicateTarget { name: "core".into() }]
        );
        assert_eq!(runtime.contents("CMakeLists.txt"), None);
    }

    #[test]
    fn test_dangling_dependency() {
        let (mut converter, runtime) = converter(&[(
            "SConstruct",
            "add_target('app', 'executable', ['main.cpp'])\nadd_dependency('app', 'ghost')\n",
        )]);
        let report = converter.convert_and_write(&Path::from("SConstruct"));
        let FileStatus::Failed(err) = &report.status else {
            panic!("expected a validation failure");
        };
        assert_eq!(
            err.validation_errors(),
            [ValidationError::DanglingDependency {
                dependent: "app".into(),
                missing: "ghost".into(),
            }]
        );
        assert!(err.to_string().contains("ghost"));
        assert_eq!(runtime.contents("CMakeLists.txt"), None);
    }

    #[test]
    fn test_shared_script_runs_once() {
        let (mut converter, runtime) = converter(&[
            ("SConstruct", "SConscript('common/SConscript')\n"),
            ("tools/SConstruct", "SConscript('#common/SConscript')\n"),
            (
                "common/SConscript",
                "env = Environment()\nenv.StaticLibrary('common', ['common.cpp'])\n",
            ),
        ]);
        let manifest = converter.convert_all(&[
            Path::from("common/SConscript"),
            Path::from("tools/SConstruct"),
            Path::from("SConstruct"),
        ]);
        assert!(manifest.is_success(), "{manifest}");
        let order: Vec<&str> = manifest.reports.iter().map(|r| r.script.as_str()).collect();
        assert_eq!(order, ["SConstruct", "tools/SConstruct", "common/SConscript"]);
        assert_eq!(runtime.read_count("common/SConscript"), 1);

        let tools = runtime.contents("tools/CMakeLists.txt").unwrap();
        assert_eq!(tools.matches("add_library(common STATIC").count(), 1);
        assert!(tools.contains("../common/common.cpp"));
        let common = runtime.contents("common/CMakeLists.txt").unwrap();
        assert!(common.contains("add_library(common STATIC\n  common.cpp\n)"));
    }

    #[test]
    fn test_scope_isolation() {
        let (mut converter, _) = converter(&[
            ("SConstruct", "SConscript('sub/SConscript')\nseen = shared\n"),
            ("sub/SConscript", "hidden = 1\nshared = 2\nExport('shared')\n"),
        ]);
        let conversion = converter.convert(&Path::from("SConstruct"));
        output(&conversion);
        assert!(conversion.graph.variables().contains_key("seen"));
        assert!(!conversion.graph.variables().contains_key("hidden"));
    }

    #[test]
    fn test_failing_shared_script_runs_once() {
        let (mut converter, runtime) = converter(&[
            ("SConstruct", "SConscript('a/SConscript')\nSConscript('b/SConscript')\n"),
            ("a/SConscript", "SConscript('#common/SConscript')\n"),
            ("b/SConscript", "SConscript('#common/SConscript')\n"),
            ("common/SConscript", "Program('x', ['x.c'])\nboom = undefined_name\n"),
        ]);
        let conversion = converter.convert(&Path::from("SConstruct"));
        let text = output(&conversion);
        assert_eq!(runtime.read_count("common/SConscript"), 1);
        assert_eq!(text.matches("add_executable(x").count(), 1);
        assert!(conversion.warnings >= 2);

        // Converting the failed script itself reports the cached failure.
        let conversion = converter.convert(&Path::from("common/SConscript"));
        assert!(matches!(
            conversion.outcome,
            Err(ConvertError::Include {
                source: IncludeError::Failed { .. },
                ..
            })
        ));
        assert_eq!(runtime.read_count("common/SConscript"), 1);
    }

    #[test]
    fn test_exports_copy_back_on_completion() {
        let (mut converter, _) = converter(&[
            (
                "SConstruct",
                "shared = 'parent'\nSConscript('broken/SConscript')\nbefore = shared\nSConscript('ok/SConscript')\nafter = shared\n",
            ),
            ("broken/SConscript", "shared = 'broken'\nExport('shared')\nboom = undefined_name\n"),
            ("ok/SConscript", "shared = 'ok'\nExport('shared')\nshared = 'ignored'\n"),
        ]);
        let conversion = converter.convert(&Path::from("SConstruct"));
        output(&conversion);
        let variables = conversion.graph.variables();
        let string = |s: &str| VarValue::Scalar(Scalar::String(s.into()));
        assert_eq!(variables.get("before"), Some(&string("parent")));
        assert_eq!(variables.get("after"), Some(&string("ok")));
    }

    #[test]
    fn test_unknown_call_is_not_fatal() {
        let (mut converter, _) = converter(&[(
            "SConstruct",
            r#"
env = Environment()
env.Program("before", ["a.cpp"])
Frobnicate("x")
env.Program("after", ["b.cpp"])
"#,
        )]);
        let conversion = converter.convert(&Path::from("SConstruct"));
        let text = output(&conversion);
        assert!(text.contains("add_executable(before"));
        assert!(text.contains("add_executable(after"));
        assert_eq!(conversion.graph.unrecognized_calls()[0].name, "Frobnicate");
        assert!(conversion.warnings >= 1);
    }

    #[test]
    fn test_output_is_deterministic() {
        let script = r#"
vars = Variables()
vars.Add(BoolVariable("tests", "Build tests", False))
env = Environment(variables=vars, CPPDEFINES=[("VERSION", "1"), "NDEBUG"])
if env["PLATFORM"] == "win32":
    env.Append(LIBS=["ws2_32"])
lib = env.Library("util", Glob("*.cpp"))
env.Program("app", ["main.cpp"], LIBS=[lib])
"#;
        let files = [("SConstruct", script), ("a.cpp", ""), ("b.cpp", "")];
        let (mut first, _) = converter(&files);
        let (mut second, _) = converter(&files);
        let a = first.convert(&Path::from("SConstruct"));
        let b = second.convert(&Path::from("SConstruct"));
        assert_eq!(output(&a), output(&b));
    }

    #[test]
    fn test_timeout_keeps_partial_graph() {
        let (mut converter, runtime) = converter(&[(
            "SConstruct",
            "env = Environment()\nenv.Program('early', ['a.cpp'])\nwhile True:\n    pass\n",
        )]);
        converter.options(ConvertOptions {
            timeout: Some(Duration::from_millis(50)),
            ..ConvertOptions::default()
        });
        let conversion = converter.convert(&Path::from("SConstruct"));
        assert!(matches!(conversion.outcome, Err(ConvertError::Timeout { .. })));
        assert!(conversion.graph.target("early").is_some());

        let report = converter.convert_and_write(&Path::from("SConstruct"));
        assert!(!report.is_success());
        assert_eq!(runtime.contents("CMakeLists.txt"), None);
    }

    #[test]
    fn test_syntax_error_fails_only_that_file() {
        let (mut converter, runtime) = converter(&[
            ("SConstruct", "env = Environment(\n"),
            ("lib/SConstruct", "Environment().Program('tool', ['tool.c'])\n"),
        ]);
        let manifest = converter.convert_all(&[Path::from("SConstruct"), Path::from("lib/SConstruct")]);
        assert!(!manifest.is_success());
        let failed: Vec<_> = manifest.failed().collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(
            failed[0].status,
            FileStatus::Failed(ConvertError::Syntax { .. })
        ));
        assert!(runtime.contents("lib/CMakeLists.txt").is_some());
        assert!(manifest.to_string().ends_with("1 converted, 1 failed"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (mut converter, runtime) = converter(&[("SConstruct", "Program('app', ['main.c'])\n")]);
        converter.dry_run(true);
        let report = converter.convert_and_write(&Path::from("SConstruct"));
        assert!(matches!(report.status, FileStatus::Converted { written: false, targets: 1, .. }));
        assert_eq!(runtime.contents("CMakeLists.txt"), None);
    }
}
