//! Registry of executed scripts, keyed by dotted logical name.
//!
//! A script runs at most once per conversion run. Later inclusions, from
//! the same root or another one, replay the contributions recorded the
//! first time instead of executing the file again. A script that failed
//! is not retried either: later inclusions replay what it recorded before
//! failing and get [`IncludeError::Failed`].

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::IncludeError;
use crate::graph::{BuildGraph, Checkpoint, Contributions};
use crate::path::Path;

/// A successfully executed script.
#[derive(Debug)]
pub struct ModuleHandle<T> {
    pub name: String,
    pub path: Path,
    /// Everything the script recorded, bracketed by its module markers.
    pub contributions: Contributions,
    /// Whatever the executor keeps about the finished script.
    pub payload: T,
}

/// What is kept of a script whose execution failed.
#[derive(Debug)]
struct FailedLoad {
    path: Path,
    contributions: Contributions,
    message: String,
    fatal: bool,
}

impl FailedLoad {
    fn error(&self, name: &str) -> IncludeError {
        IncludeError::Failed {
            name: name.to_string(),
            path: self.path.clone(),
            message: self.message.clone(),
            fatal: self.fatal,
        }
    }
}

#[derive(Debug)]
enum Entry<T> {
    /// Intermediate level implied by a dotted name.
    Package,
    Module(Rc<ModuleHandle<T>>),
    Failed(FailedLoad),
}

/// Outcome of [`ModuleRegistry::begin`].
#[derive(Debug)]
pub enum Begin<T> {
    /// Already loaded; its contributions have been merged into the graph.
    Cached(Rc<ModuleHandle<T>>),
    /// Not loaded yet. Execute it, then hand the result to
    /// [`ModuleRegistry::finish`].
    Fresh(PendingLoad),
}

#[derive(Debug)]
#[must_use]
pub struct PendingLoad {
    name: String,
    path: Path,
    checkpoint: Checkpoint,
}

impl PendingLoad {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append-only map of logical names to loaded modules. Shared by every
/// root script of one conversion run; never global.
#[derive(Debug)]
pub struct ModuleRegistry<T> {
    entries: IndexMap<String, Entry<T>>,
    loading: Vec<String>,
    executions: usize,
}

impl<T> Default for ModuleRegistry<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            loading: Vec::new(),
            executions: 0,
        }
    }
}

impl<T> ModuleRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts loading `name`. A cached module is merged into `graph` and
    /// returned; otherwise the caller must execute the script and call
    /// [`finish`](Self::finish) with the result.
    pub fn begin(
        &mut self,
        name: &str,
        path: &Path,
        graph: &mut BuildGraph,
    ) -> Result<Begin<T>, IncludeError> {
        if self.loading.iter().any(|loading| loading == name) {
            return Err(IncludeError::Recursive {
                name: name.to_string(),
                path: path.clone(),
            });
        }

        match self.entries.get(name) {
            Some(Entry::Module(handle)) => {
                debug!("module {name} cached; replaying {} contributions", handle.contributions.len());
                graph.merge(&handle.contributions);
                return Ok(Begin::Cached(handle.clone()));
            }
            Some(Entry::Failed(failed)) => {
                debug!("module {name} failed earlier; not running it again");
                graph.merge(&failed.contributions);
                return Err(failed.error(name));
            }
            Some(Entry::Package) | None => {}
        }

        debug!("loading module {name} from {path}");
        self.loading.push(name.to_string());
        self.executions += 1;
        let checkpoint = graph.checkpoint();
        graph.begin_module(name);
        Ok(Begin::Fresh(PendingLoad {
            name: name.to_string(),
            path: path.clone(),
            checkpoint,
        }))
    }

    /// Completes a load started by [`begin`](Self::begin). Whatever the
    /// script recorded stays in `graph` either way. A script that could
    /// not be read is not registered, and neither is one that timed out.
    pub fn finish(
        &mut self,
        pending: PendingLoad,
        result: Result<T, IncludeError>,
        graph: &mut BuildGraph,
    ) -> Result<Rc<ModuleHandle<T>>, IncludeError> {
        let PendingLoad {
            name,
            path,
            checkpoint,
        } = pending;
        self.loading.retain(|loading| *loading != name);
        graph.end_module(&name);

        let contributions = graph.contributions_since(checkpoint);
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                if matches!(err, IncludeError::Syntax { .. } | IncludeError::Execution { .. }) && !err.is_timeout() {
                    let failed = FailedLoad {
                        path,
                        contributions,
                        message: err.to_string(),
                        fatal: err.is_fatal(),
                    };
                    self.register(&name, Entry::Failed(failed));
                }
                return Err(err);
            }
        };
        let handle = Rc::new(ModuleHandle {
            name: name.clone(),
            path,
            contributions,
            payload,
        });
        self.register(&name, Entry::Module(handle.clone()));
        Ok(handle)
    }

    /// Loads `name` with `execute`, which receives the registry back so
    /// that it can load nested modules itself.
    pub fn load<F>(
        &mut self,
        name: &str,
        path: &Path,
        graph: &mut BuildGraph,
        execute: F,
    ) -> Result<Rc<ModuleHandle<T>>, IncludeError>
    where
        F: FnOnce(&mut Self, &mut BuildGraph) -> Result<T, IncludeError>,
    {
        match self.begin(name, path, graph)? {
            Begin::Cached(handle) => Ok(handle),
            Begin::Fresh(pending) => {
                let result = execute(self, graph);
                self.finish(pending, result, graph)
            }
        }
    }

    fn register(&mut self, name: &str, entry: Entry<T>) {
        let mut prefix = String::new();
        let parts: Vec<&str> = name.split('.').collect();
        if let Some((_, packages)) = parts.split_last() {
            for part in packages {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                self.entries.entry(prefix.clone()).or_insert(Entry::Package);
            }
        }
        // A real module replaces a placeholder of the same name.
        self.entries.insert(name.to_string(), entry);
    }

    pub fn get(&self, name: &str) -> Option<Rc<ModuleHandle<T>>> {
        match self.entries.get(name)? {
            Entry::Module(handle) => Some(handle.clone()),
            Entry::Package | Entry::Failed(_) => None,
        }
    }

    /// True for loaded or failed modules and for placeholder packages.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_package(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Entry::Package))
    }

    /// Number of scripts actually executed (cache misses).
    pub fn executions(&self) -> usize {
        self.executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InterpreterError;
    use crate::graph::{Target, TargetKind};

    fn declare(name: &'static str) -> impl FnOnce(&mut ModuleRegistry<()>, &mut BuildGraph) -> Result<(), IncludeError> {
        move |_, graph| {
            graph.add_target(Target::new(name, TargetKind::StaticLibrary));
            Ok(())
        }
    }

    #[test]
    fn test_load_is_idempotent() {
        let mut registry = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let path = Path::from("core/SConscript");
        registry.load("core.SConscript", &path, &mut graph, declare("core")).unwrap();
        registry.load("core.SConscript", &path, &mut graph, declare("core")).unwrap();
        assert_eq!(registry.executions(), 1);
        assert_eq!(graph.targets().len(), 1);
    }

    #[test]
    fn test_cached_module_replays_into_other_graph() {
        let mut registry = ModuleRegistry::new();
        let path = Path::from("core/SConscript");
        let mut first = BuildGraph::new();
        registry.load("core.SConscript", &path, &mut first, declare("core")).unwrap();

        let mut second = BuildGraph::new();
        registry.load("core.SConscript", &path, &mut second, declare("other")).unwrap();
        assert_eq!(registry.executions(), 1);
        assert_eq!(second.targets().len(), 1);
        assert_eq!(second.targets()[0].name, "core");
    }

    #[test]
    fn test_diamond_inclusion() {
        // root -> a -> c, root -> b -> c
        let mut registry: ModuleRegistry<()> = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        for parent in ["a", "b"] {
            registry
                .load(parent, &Path::from(parent), &mut graph, |registry, graph| {
                    registry.load("c", &Path::from("c"), graph, declare("c"))?;
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(registry.executions(), 3);
        assert_eq!(graph.targets().len(), 1);

        // A later root that replays both parents still sees `c` once.
        let mut other = BuildGraph::new();
        registry.load("a", &Path::from("a"), &mut other, declare("x")).unwrap();
        registry.load("b", &Path::from("b"), &mut other, declare("x")).unwrap();
        assert_eq!(other.targets().len(), 1);
    }

    #[test]
    fn test_placeholder_packages() {
        let mut registry = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let path = Path::from("modules/gdscript/SCsub");
        registry
            .load("modules.gdscript.SCsub", &path, &mut graph, declare("gdscript"))
            .unwrap();
        assert!(registry.is_package("modules"));
        assert!(registry.is_package("modules.gdscript"));
        assert!(registry.get("modules.gdscript").is_none());
        assert!(registry.get("modules.gdscript.SCsub").is_some());

        // A real module may later take over a placeholder's name.
        registry.load("modules", &Path::from("modules"), &mut graph, declare("m")).unwrap();
        assert!(!registry.is_package("modules"));
        assert!(registry.get("modules").is_some());
    }

    #[test]
    fn test_recursive_load() {
        let mut registry: ModuleRegistry<()> = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let err = registry
            .load("a", &Path::from("a"), &mut graph, |registry, graph| {
                registry.load("a", &Path::from("a"), graph, declare("a"))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, IncludeError::Recursive { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_failure_keeps_partial_state_but_does_not_register() {
        let mut registry: ModuleRegistry<()> = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let path = Path::from("broken/SConscript");
        let err = registry
            .load("broken.SConscript", &path, &mut graph, |_, graph| {
                graph.add_target(Target::new("half", TargetKind::Executable));
                Err(IncludeError::NotFound {
                    name: "x".into(),
                    path: Path::from("x"),
                })
            })
            .unwrap_err();
        assert!(matches!(err, IncludeError::NotFound { .. }));
        assert_eq!(graph.targets().len(), 1);
        assert!(!registry.contains("broken.SConscript"));

        // Not cached, so a retry executes again.
        registry.load("broken.SConscript", &path, &mut graph, declare("whole")).unwrap();
        assert_eq!(registry.executions(), 2);
    }

    #[test]
    fn test_failed_module_is_not_run_again() {
        let mut registry: ModuleRegistry<()> = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let path = Path::from("common/SConscript");
        let fail = |_: &mut ModuleRegistry<()>, graph: &mut BuildGraph| {
            graph.add_target(Target::new("x", TargetKind::Executable));
            Err(IncludeError::Execution {
                name: "common.SConscript".into(),
                path: Path::from("common/SConscript"),
                source: Box::new(InterpreterError::RuntimeError("boom".into())),
            })
        };
        let first = registry.load("common.SConscript", &path, &mut graph, fail).unwrap_err();
        assert!(matches!(first, IncludeError::Execution { .. }));

        let second = registry.load("common.SConscript", &path, &mut graph, fail).unwrap_err();
        assert!(matches!(second, IncludeError::Failed { fatal: false, ref message, .. } if message.contains("boom")));
        assert_eq!(registry.executions(), 1);
        assert_eq!(graph.targets().len(), 1);
        assert!(registry.contains("common.SConscript"));
        assert!(registry.get("common.SConscript").is_none());

        // Another root sees what the script recorded before failing.
        let mut other = BuildGraph::new();
        registry.load("common.SConscript", &path, &mut other, fail).unwrap_err();
        assert_eq!(registry.executions(), 1);
        assert_eq!(other.targets().len(), 1);
    }

    #[test]
    fn test_timeout_is_not_cached() {
        let mut registry: ModuleRegistry<()> = ModuleRegistry::new();
        let mut graph = BuildGraph::new();
        let path = Path::from("slow/SConscript");
        let err = registry
            .load("slow.SConscript", &path, &mut graph, |_, _| {
                Err(IncludeError::Execution {
                    name: "slow.SConscript".into(),
                    path: Path::from("slow/SConscript"),
                    source: Box::new(InterpreterError::Timeout(core::time::Duration::from_secs(1))),
                })
            })
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!registry.contains("slow.SConscript"));
    }
}
