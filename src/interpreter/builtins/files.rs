//! File and directory nodes, globbing and source resolution.

use tracing::debug;

use crate::interpreter::builtins::targets::TargetNode;
use crate::interpreter::builtins::{builtin_impl, utils};
use crate::interpreter::error::ErrorContext;
use crate::interpreter::{Interpreter, InterpreterError, Kwargs, ScriptObject, Value};
use crate::path::Path;

/// A `File()` / `Dir()` node, or a source passed through `Object()`.
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Project-relative.
    path: Path,
    is_dir: bool,
}

impl FileNode {
    pub fn file(path: Path) -> Self {
        Self { path, is_dir: false }
    }

    pub fn dir(path: Path) -> Self {
        Self { path, is_dir: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn srcnode(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(self.clone().into_object())
    }

    fn get_abspath(&self, _args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::String(interp.host_path(&self.path).to_string()))
    }

    fn get_path(&self, _args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        Ok(Value::String(self.path.to_string()))
    }

    fn exists(&self, _args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let host = interp.host_path(&self.path);
        Ok(Value::Boolean(interp.runtime.exists(&host).unwrap_or(false)))
    }

    fn child(&self, args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
        let name = args.first().context_type("expected a name")?.coerce_string();
        Ok(FileNode::file(self.path.join(name).normalize()).into_object())
    }
}

impl ScriptObject for FileNode {
    fn class_name(&self) -> &'static str {
        if self.is_dir { "Dir" } else { "File" }
    }

    builtin_impl!(
        "srcnode" => srcnode,
        "get_abspath" => get_abspath,
        "get_path" => get_path,
        "exists" => exists,
        "File" => child,
        "Dir" => child,
    );

    fn get_attr(&self, name: &str, interp: &mut Interpreter) -> Result<Option<Value>, InterpreterError> {
        let value = match name {
            "path" => self.path.to_string(),
            "abspath" => interp.host_path(&self.path).to_string(),
            "name" => self.path.file_name().to_string(),
            "dir" => return Ok(Some(FileNode::dir(self.path.parent()).into_object())),
            _ => return Ok(None),
        };
        Ok(Some(Value::String(value)))
    }

    fn to_string(&self) -> String {
        self.path.to_string()
    }

    fn is_equal(&self, other: &dyn ScriptObject) -> bool {
        other.downcast::<FileNode>().is_some_and(|other| other.path == self.path)
    }
}

fn has_wildcard(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Shell-style match of one path component: `*`, `?` and `[...]` classes.
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    matches_from(&pattern, &name)
}

fn matches_from(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => (0..=name.len()).any(|skip| matches_from(&pattern[1..], &name[skip..])),
        Some('?') => !name.is_empty() && matches_from(&pattern[1..], &name[1..]),
        Some('[') => {
            let Some(end) = pattern.iter().skip(1).position(|&c| c == ']').map(|i| i + 1) else {
                return name.first() == Some(&'[') && matches_from(&pattern[1..], &name[1..]);
            };
            let Some(&c) = name.first() else {
                return false;
            };
            let class = &pattern[1..end];
            let (negated, class) = match class.first() {
                Some('!') | Some('^') => (true, &class[1..]),
                _ => (false, class),
            };
            let mut found = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == '-' {
                    found |= class[i] <= c && c <= class[i + 2];
                    i += 3;
                } else {
                    found |= class[i] == c;
                    i += 1;
                }
            }
            found != negated && matches_from(&pattern[end + 1..], &name[1..])
        }
        Some(&c) => name.first() == Some(&c) && matches_from(&pattern[1..], &name[1..]),
    }
}

/// Project-relative paths matching a script-relative pattern, sorted.
pub(crate) fn glob_paths(pattern: &str, interp: &mut Interpreter) -> Vec<Path> {
    let resolved = interp.resolve_path(pattern);
    let mut candidates = vec![if resolved.is_absolute() { Path::from("/") } else { Path::new() }];
    for component in resolved.as_str().split('/').filter(|c| !c.is_empty()) {
        let mut next = Vec::new();
        for base in &candidates {
            if !has_wildcard(component) {
                next.push(base.join(component));
                continue;
            }
            let host = interp.host_path(base);
            let names = interp.runtime.read_dir(&host).unwrap_or_else(|err| {
                debug!("cannot list {host}: {err}");
                Vec::new()
            });
            next.extend(
                names
                    .iter()
                    .filter(|name| !name.starts_with('.') || component.starts_with('.'))
                    .filter(|name| wildcard_match(component, name))
                    .map(|name| base.join(name)),
            );
        }
        candidates = next;
    }
    let mut found: Vec<Path> = candidates
        .into_iter()
        .filter(|path| {
            let host = interp.host_path(path);
            interp.runtime.exists(&host).unwrap_or(false)
        })
        .collect();
    found.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    found.dedup();
    found
}

/// Project-relative source paths named by strings, nodes and lists of
/// them. Patterns are expanded.
pub(crate) fn resolve_sources(values: &[Value], interp: &mut Interpreter) -> Result<Vec<String>, InterpreterError> {
    let mut sources = Vec::new();
    for value in utils::flatten(values) {
        match &value {
            Value::String(raw) if has_wildcard(raw) => {
                sources.extend(glob_paths(raw, interp).into_iter().map(|p| p.to_string()));
            }
            Value::String(raw) => {
                for raw in raw.split_whitespace() {
                    sources.push(interp.resolve_path(raw).to_string());
                }
            }
            Value::None => {}
            Value::Object(obj) => {
                if let Some(node) = obj.downcast::<FileNode>() {
                    sources.push(node.path.to_string());
                } else if let Some(node) = obj.downcast::<TargetNode>() {
                    sources.push(node.path().to_string());
                } else {
                    debug!("ignoring source {}", obj.to_string());
                }
            }
            other => sources.push(interp.resolve_path(&other.coerce_string()).to_string()),
        }
    }
    Ok(sources)
}

pub fn glob(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let pattern = args
        .first()
        .or(kwargs.get("pattern"))
        .context_type("Glob() expects a pattern")?
        .coerce_string();
    let as_strings = kwargs.get("strings").is_some_and(Value::truthy);
    let excludes: Vec<Path> = match kwargs.get("exclude") {
        Some(exclude) => utils::strings([exclude])
            .iter()
            .flat_map(|pattern| glob_paths(pattern, interp))
            .collect(),
        None => Vec::new(),
    };
    let script_dir = interp.script_dir();
    let matches = glob_paths(&pattern, interp)
        .into_iter()
        .filter(|path| !excludes.contains(path))
        .map(|path| {
            if as_strings {
                // Strings stay relative to the calling script, like the
                // pattern was.
                Value::String(path.relative_to(&script_dir).to_string())
            } else {
                FileNode::file(path).into_object()
            }
        })
        .collect();
    Ok(Value::list(matches))
}

fn nodes(args: &[Value], interp: &mut Interpreter, is_dir: bool) -> Value {
    let make = |path: Path| {
        if is_dir { FileNode::dir(path) } else { FileNode::file(path) }.into_object()
    };
    match args.first() {
        Some(Value::List(_)) | Some(Value::Tuple(_)) => {
            let paths = utils::strings(args);
            Value::list(paths.iter().map(|p| make(interp.resolve_path(p))).collect())
        }
        Some(Value::Object(obj)) if obj.downcast::<FileNode>().is_some() => Value::Object(obj.clone()),
        Some(value) => make(interp.resolve_path(&value.coerce_string())),
        None => make(interp.script_dir()),
    }
}

pub fn file(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(nodes(&args, interp, false))
}

pub fn dir(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(nodes(&args, interp, true))
}

/// `Value(x)` nodes behave like the wrapped value.
pub fn value(args: Vec<Value>, _kwargs: Kwargs, _interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    Ok(args.into_iter().next().unwrap_or(Value::None))
}

pub fn where_is(args: Vec<Value>, _kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let program = args.first().context_type("WhereIs() expects a program name")?.coerce_string();
    match interp.runtime.find_program(&program) {
        Ok(path) => Ok(Value::String(path.to_string())),
        Err(err) => {
            debug!("WhereIs({program}): {err}");
            Ok(Value::None)
        }
    }
}

/// `Object(source)` compiles nothing by itself: the sources come back as
/// nodes that a later target picks up.
pub fn object(args: Vec<Value>, kwargs: Kwargs, interp: &mut Interpreter) -> Result<Value, InterpreterError> {
    let source = match (kwargs.get("source"), args.len()) {
        (Some(source), _) => source.clone(),
        (None, 2..) => args[1].clone(),
        (None, _) => args.first().cloned().unwrap_or(Value::None),
    };
    let sources = resolve_sources(&[source], interp)?;
    Ok(Value::list(
        sources
            .into_iter()
            .map(|path| FileNode::file(Path::from(path)).into_object())
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvertOptions;
    use crate::interpreter::tests::{run_with, var};
    use crate::runtime::memory::MemoryRuntime;

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*.cpp", "main.cpp"));
        assert!(!wildcard_match("*.cpp", "main.c"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(wildcard_match("[a-c]x", "bx"));
        assert!(!wildcard_match("[!a-c]x", "bx"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn test_glob_is_sorted_and_script_relative() {
        let runtime = MemoryRuntime::new()
            .with_file("src/b.cpp", "")
            .with_file("src/a.cpp", "")
            .with_file("src/a.h", "")
            .with_file("src/skip.cpp", "");
        let (result, execution) = run_with(
            r#"
nodes = [str(n) for n in Glob("src/*.cpp")]
names = Glob("src/*.cpp", strings=True, exclude=["src/skip.cpp"])
none = Glob("missing/*.cpp")
"#,
            runtime,
            ConvertOptions::default(),
        );
        result.unwrap();
        let expected = |source: &str| {
            let (_, execution) = run_with(source, MemoryRuntime::new(), ConvertOptions::default());
            execution
        };
        assert_eq!(
            var(&execution, "nodes"),
            var(&expected("nodes = ['src/a.cpp', 'src/b.cpp', 'src/skip.cpp']"), "nodes")
        );
        assert_eq!(var(&execution, "names"), var(&expected("names = ['src/a.cpp', 'src/b.cpp']"), "names"));
        assert_eq!(var(&execution, "none"), var(&expected("none = []"), "none"));
    }

    #[test]
    fn test_file_nodes() {
        let (result, execution) = run_with(
            "f = File('#include/api.h')\npath = f.path\nname = f.name\nfound = WhereIs('gcc')\nmissing = WhereIs('nope')\n",
            MemoryRuntime::new().with_program("gcc"),
            ConvertOptions::default(),
        );
        result.unwrap();
        assert_eq!(execution.graph.lookup("path"), Some(&crate::graph::VarValue::string("include/api.h")));
        assert_eq!(execution.graph.lookup("name"), Some(&crate::graph::VarValue::string("api.h")));
        assert!(execution.graph.lookup("found").is_some());
        assert!(execution.graph.lookup("missing").is_none());
    }

    #[test]
    fn test_target_node_as_source() {
        let (result, execution) = run_with(
            "helper = Program('bin/helper', ['helper.c'])\nProgram('app', ['main.c', helper])\n",
            MemoryRuntime::new(),
            ConvertOptions::default(),
        );
        result.unwrap();
        let app = execution.graph.target("app").unwrap();
        assert_eq!(app.sources, vec!["main.c", "bin/helper"]);
    }
}
