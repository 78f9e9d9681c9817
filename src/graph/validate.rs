use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use super::{BuildGraph, VarValue};
use crate::error::ValidationError;

/// Checks a finished graph. Every problem is collected; nothing is
/// reported until the whole graph has been inspected.
pub fn validate(graph: &BuildGraph, allow_unresolved: bool) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut declared = HashSet::new();
    let mut duplicates = HashSet::new();
    for target in graph.targets() {
        if !declared.insert(target.name.as_str()) && duplicates.insert(target.name.as_str()) {
            errors.push(ValidationError::DuplicateTarget {
                name: target.name.clone(),
            });
        }
    }

    for edge in graph.dependencies() {
        for side in [&edge.dependent, &edge.dependency] {
            if !declared.contains(side.as_str()) {
                errors.push(ValidationError::DanglingDependency {
                    dependent: edge.dependent.clone(),
                    missing: side.clone(),
                });
            }
        }
    }

    let references = ReferenceGraph::build(graph, allow_unresolved, &mut errors);
    references.find_cycles(&mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Qualified variable names and the names their deferred references (or
/// map entries) point at.
struct ReferenceGraph {
    edges: IndexMap<String, Vec<String>>,
}

impl ReferenceGraph {
    fn build(graph: &BuildGraph, allow_unresolved: bool, errors: &mut Vec<ValidationError>) -> Self {
        let mut this = Self {
            edges: IndexMap::new(),
        };
        for (name, value) in graph.variables() {
            this.walk(graph, name, None, value, allow_unresolved, errors);
        }
        this
    }

    fn walk(
        &mut self,
        graph: &BuildGraph,
        qualified: &str,
        scope: Option<&str>,
        value: &VarValue,
        allow_unresolved: bool,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut targets = Vec::new();
        match value {
            VarValue::Scalar(_) => {}
            VarValue::Deferred(reference) => {
                let resolved = resolve(graph, qualified, scope, reference, allow_unresolved, errors);
                targets.extend(resolved);
            }
            VarValue::List(items) => {
                for item in flatten_deferred(items) {
                    let resolved = resolve(graph, qualified, scope, item, allow_unresolved, errors);
                    targets.extend(resolved);
                }
            }
            VarValue::Map(map) => {
                for (key, child) in map {
                    let child_name = format!("{qualified}.{key}");
                    targets.push(child_name.clone());
                    self.walk(graph, &child_name, Some(qualified), child, allow_unresolved, errors);
                }
            }
        }
        self.edges.insert(qualified.to_string(), targets);
    }

    /// Iterative depth-first search with visiting/visited marks. Each back
    /// edge is reported with the full path that closes the cycle.
    fn find_cycles(&self, errors: &mut Vec<ValidationError>) {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Visited,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for start in self.edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }
            marks.insert(start.as_str(), Mark::Visiting);
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

            while let Some(&(node, next)) = stack.last() {
                let edges = self.edges.get(node).map(Vec::as_slice).unwrap_or(&[]);
                let Some(successor) = edges.get(next) else {
                    marks.insert(node, Mark::Visited);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }

                match marks.get(successor.as_str()) {
                    Some(Mark::Visiting) => {
                        let from = stack
                            .iter()
                            .position(|(n, _)| *n == successor.as_str())
                            .unwrap_or(0);
                        let mut path: Vec<String> =
                            stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                        path.push(successor.clone());
                        errors.push(ValidationError::ReferenceCycle { path });
                    }
                    Some(Mark::Visited) => {}
                    None => {
                        marks.insert(successor.as_str(), Mark::Visiting);
                        stack.push((successor.as_str(), 0));
                    }
                }
            }
        }
    }
}

fn resolve(
    graph: &BuildGraph,
    qualified: &str,
    scope: Option<&str>,
    reference: &str,
    allow_unresolved: bool,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    let resolved = graph.resolve_reference(scope, reference);
    if resolved.is_none() && !allow_unresolved {
        errors.push(ValidationError::UnresolvedReference {
            variable: qualified.to_string(),
            reference: reference.to_string(),
        });
    }
    resolved
}

fn flatten_deferred(items: &[VarValue]) -> Vec<&String> {
    let mut out = Vec::new();
    for item in items {
        match item {
            VarValue::Deferred(name) => out.push(name),
            VarValue::List(nested) => out.extend(flatten_deferred(nested)),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Target, TargetKind};

    fn graph_with_targets(names: &[&str]) -> BuildGraph {
        let mut graph = BuildGraph::new();
        for name in names {
            graph.add_target(Target::new(*name, TargetKind::StaticLibrary));
        }
        graph
    }

    #[test]
    fn test_valid_graph() {
        let mut graph = graph_with_targets(&["core", "engine"]);
        graph.add_dependency("engine", "core");
        graph.set_variable("FLAGS", VarValue::List(vec![VarValue::string("-O2")]));
        graph.set_variable("ALIAS", VarValue::Deferred("FLAGS".into()));
        assert_eq!(validate(&graph, false), Ok(()));
    }

    #[test]
    fn test_dangling_dependencies_are_collected() {
        let mut graph = graph_with_targets(&["engine"]);
        graph.add_dependency("engine", "core");
        graph.add_dependency("engine", "net");
        let errors = validate(&graph, false).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DanglingDependency {
                    dependent: "engine".into(),
                    missing: "core".into()
                },
                ValidationError::DanglingDependency {
                    dependent: "engine".into(),
                    missing: "net".into()
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_target_reported_once() {
        let graph = graph_with_targets(&["core", "core", "core"]);
        let errors = validate(&graph, false).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateTarget {
                name: "core".into()
            }]
        );
    }

    #[test]
    fn test_reference_cycle_path() {
        let mut graph = BuildGraph::new();
        graph.set_variable("A", VarValue::Deferred("B".into()));
        graph.set_variable("B", VarValue::List(vec![VarValue::Deferred("C".into())]));
        graph.set_variable("C", VarValue::Deferred("A".into()));
        let errors = validate(&graph, false).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ReferenceCycle {
                path: vec!["A".into(), "B".into(), "C".into(), "A".into()]
            }]
        );
    }

    #[test]
    fn test_self_reference_in_map() {
        let mut graph = BuildGraph::new();
        let mut env = IndexMap::new();
        env.insert("LINK".to_string(), VarValue::Deferred("LINK".into()));
        graph.set_variable("env", VarValue::Map(env));
        let errors = validate(&graph, false).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ReferenceCycle {
                path: vec!["env.LINK".into(), "env.LINK".into()]
            }]
        );
    }

    #[test]
    fn test_unresolved_reference_relaxation() {
        let mut graph = BuildGraph::new();
        graph.set_variable("LINK", VarValue::Deferred("CXX".into()));
        let errors = validate(&graph, false).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnresolvedReference {
                variable: "LINK".into(),
                reference: "CXX".into()
            }]
        );
        assert_eq!(validate(&graph, true), Ok(()));
    }
}
