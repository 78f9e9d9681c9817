//! The normalized intermediate representation produced by executing a
//! script and consumed by the generators.
//!
//! Every collection keeps declaration order. Everything recorded through
//! [`BuildGraph::record`] is also appended to a journal so the loader can
//! slice out and replay what one script contributed.

use core::fmt;

use hashbrown::HashSet;
use indexmap::IndexMap;

mod validate;

pub use validate::validate;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{s}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Boolean(b) => write!(f, "{}", if *b { "ON" } else { "OFF" }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Scalar(Scalar),
    List(Vec<VarValue>),
    Map(IndexMap<String, VarValue>),
    /// Lazy reference to another variable by name.
    Deferred(String),
}

impl VarValue {
    /// A string that is exactly `$NAME` or `${NAME}` becomes a deferred
    /// reference; anything else stays a plain string.
    pub fn from_string(s: impl Into<String>) -> Self {
        let s = s.into();
        match deferred_name(&s) {
            Some(name) => VarValue::Deferred(name.to_string()),
            None => VarValue::Scalar(Scalar::String(s)),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        VarValue::Scalar(Scalar::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        VarValue::Scalar(Scalar::Boolean(b))
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, VarValue>> {
        match self {
            VarValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

fn deferred_name(s: &str) -> Option<&str> {
    let rest = s.strip_prefix('$')?;
    let name = match rest.strip_prefix('{') {
        Some(inner) => inner.strip_suffix('}')?,
        None => rest,
    };
    let mut chars = name.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
    Module,
}

impl TargetKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "executable" | "program" => Some(TargetKind::Executable),
            "static_library" | "static" | "library" => Some(TargetKind::StaticLibrary),
            "shared_library" | "shared" => Some(TargetKind::SharedLibrary),
            "module" | "loadable_module" => Some(TargetKind::Module),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::StaticLibrary => "static_library",
            TargetKind::SharedLibrary => "shared_library",
            TargetKind::Module => "module",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub sources: Vec<String>,
    pub include_dirs: Vec<String>,
    pub definitions: Vec<String>,
    pub compile_options: Vec<String>,
    pub link_options: Vec<String>,
    pub link_directories: Vec<String>,
    pub link_libraries: Vec<String>,
    /// Targets this one depends on, mirroring the graph's edges.
    pub dependencies: Vec<String>,
    pub properties: IndexMap<String, String>,
    /// Project-relative path of the declaring script.
    pub script: String,
}

impl Target {
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sources: Vec::new(),
            include_dirs: Vec::new(),
            definitions: Vec::new(),
            compile_options: Vec::new(),
            link_options: Vec::new(),
            link_directories: Vec::new(),
            link_libraries: Vec::new(),
            dependencies: Vec::new(),
            properties: IndexMap::new(),
            script: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Enum,
    Path,
    List,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildOption {
    pub name: String,
    pub description: String,
    pub default: VarValue,
    pub kind: Option<OptionKind>,
    pub allowed_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSetting {
    Definition,
    CompileOption,
    LinkLibrary,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlatformBlock {
    pub platform: String,
    pub definitions: Vec<String>,
    pub compile_options: Vec<String>,
    pub link_libraries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomBuilder {
    pub name: String,
    pub action: String,
    pub script: String,
    /// Target lists of each deferred invocation.
    pub invocations: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedCall {
    pub name: String,
    pub script: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub version: String,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: "project".into(),
            version: "0.1.0".into(),
        }
    }
}

/// One build-relevant side effect of executing a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    Project(Project),
    Target(Target),
    Option(BuildOption),
    Dependency(DependencyEdge),
    Platform {
        platform: String,
        setting: PlatformSetting,
        values: Vec<String>,
    },
    CustomBuilder {
        name: String,
        action: String,
        script: String,
    },
    BuilderInvocation {
        name: String,
        targets: Vec<String>,
    },
    Unrecognized(UnrecognizedCall),
    /// Brackets everything a nested script recorded, including the scripts
    /// it included in turn.
    ModuleStart(String),
    ModuleEnd(String),
}

/// Everything one script (and the scripts it included) recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contributions(Vec<Contribution>);

impl Contributions {
    pub fn iter(&self) -> impl Iterator<Item = &Contribution> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    project: Project,
    variables: IndexMap<String, VarValue>,
    targets: Vec<Target>,
    options: IndexMap<String, BuildOption>,
    dependencies: Vec<DependencyEdge>,
    platform_blocks: IndexMap<String, PlatformBlock>,
    custom_builders: IndexMap<String, CustomBuilder>,
    unrecognized: Vec<UnrecognizedCall>,
    modules: HashSet<String>,
    journal: Vec<Contribution>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, contribution: Contribution) {
        self.apply(&contribution);
        self.journal.push(contribution);
    }

    fn apply(&mut self, contribution: &Contribution) {
        match contribution {
            Contribution::Project(project) => self.project = project.clone(),
            Contribution::Target(target) => {
                let mut target = target.clone();
                for edge in self.dependencies.iter().filter(|edge| edge.dependent == target.name) {
                    if !target.dependencies.contains(&edge.dependency) {
                        target.dependencies.push(edge.dependency.clone());
                    }
                }
                self.targets.push(target);
            }
            Contribution::Option(option) => match self.options.get_mut(&option.name) {
                // A redeclaration keeps the first position
                Some(existing) => *existing = option.clone(),
                None => {
                    self.options.insert(option.name.clone(), option.clone());
                }
            },
            Contribution::Dependency(edge) => {
                if !self.dependencies.contains(edge) {
                    self.dependencies.push(edge.clone());
                }
                for target in self.targets.iter_mut().filter(|t| t.name == edge.dependent) {
                    if !target.dependencies.contains(&edge.dependency) {
                        target.dependencies.push(edge.dependency.clone());
                    }
                }
            }
            Contribution::Platform {
                platform,
                setting,
                values,
            } => {
                let block = self
                    .platform_blocks
                    .entry(platform.clone())
                    .or_insert_with(|| PlatformBlock {
                        platform: platform.clone(),
                        ..Default::default()
                    });
                let list = match setting {
                    PlatformSetting::Definition => &mut block.definitions,
                    PlatformSetting::CompileOption => &mut block.compile_options,
                    PlatformSetting::LinkLibrary => &mut block.link_libraries,
                };
                for value in values {
                    if !list.contains(value) {
                        list.push(value.clone());
                    }
                }
            }
            Contribution::CustomBuilder {
                name,
                action,
                script,
            } => {
                self.custom_builders
                    .entry(name.clone())
                    .or_insert_with(|| CustomBuilder {
                        name: name.clone(),
                        action: action.clone(),
                        script: script.clone(),
                        invocations: Vec::new(),
                    });
            }
            Contribution::BuilderInvocation { name, targets } => {
                if let Some(builder) = self.custom_builders.get_mut(name) {
                    builder.invocations.push(targets.clone());
                }
            }
            Contribution::Unrecognized(call) => self.unrecognized.push(call.clone()),
            Contribution::ModuleStart(name) => {
                self.modules.insert(name.clone());
            }
            Contribution::ModuleEnd(_) => {}
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    pub fn contributions_since(&self, checkpoint: Checkpoint) -> Contributions {
        Contributions(self.journal[checkpoint.0.min(self.journal.len())..].to_vec())
    }

    /// Replays contributions recorded by another run. A module region whose
    /// module already contributed to this graph is skipped whole, so
    /// replaying the same module twice (directly or nested inside another
    /// cached module) never duplicates anything.
    pub fn merge(&mut self, contributions: &Contributions) {
        let mut skipping: Option<&str> = None;
        for contribution in contributions.iter() {
            if let Some(name) = skipping {
                if matches!(contribution, Contribution::ModuleEnd(end) if end == name) {
                    skipping = None;
                }
                continue;
            }
            if let Contribution::ModuleStart(name) = contribution {
                if self.modules.contains(name) {
                    skipping = Some(name);
                    continue;
                }
            }
            self.record(contribution.clone());
        }
    }

    pub fn begin_module(&mut self, name: &str) {
        self.record(Contribution::ModuleStart(name.to_string()));
    }

    pub fn end_module(&mut self, name: &str) {
        self.record(Contribution::ModuleEnd(name.to_string()));
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    pub fn set_project(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.record(Contribution::Project(Project {
            name: name.into(),
            version: version.into(),
        }));
    }

    pub fn add_target(&mut self, target: Target) {
        for dependency in &target.dependencies {
            self.record(Contribution::Dependency(DependencyEdge {
                dependent: target.name.clone(),
                dependency: dependency.clone(),
            }));
        }
        self.record(Contribution::Target(target));
    }

    pub fn add_option(&mut self, option: BuildOption) {
        self.record(Contribution::Option(option));
    }

    pub fn add_dependency(&mut self, dependent: impl Into<String>, dependency: impl Into<String>) {
        self.record(Contribution::Dependency(DependencyEdge {
            dependent: dependent.into(),
            dependency: dependency.into(),
        }));
    }

    pub fn add_platform_setting(
        &mut self,
        platform: &str,
        setting: PlatformSetting,
        values: Vec<String>,
    ) {
        if values.is_empty() {
            return;
        }
        self.record(Contribution::Platform {
            platform: platform.to_string(),
            setting,
            values,
        });
    }

    pub fn register_custom_builder(&mut self, name: &str, action: &str, script: &str) {
        self.record(Contribution::CustomBuilder {
            name: name.to_string(),
            action: action.to_string(),
            script: script.to_string(),
        });
    }

    pub fn has_custom_builder(&self, name: &str) -> bool {
        self.custom_builders.contains_key(name)
    }

    pub fn record_builder_invocation(&mut self, name: &str, targets: Vec<String>) {
        self.record(Contribution::BuilderInvocation {
            name: name.to_string(),
            targets,
        });
    }

    pub fn record_unrecognized(&mut self, name: &str, script: &str, line: usize) {
        self.record(Contribution::Unrecognized(UnrecognizedCall {
            name: name.to_string(),
            script: script.to_string(),
            line,
        }));
    }

    /// Top-scope variables are derived from the finished scope rather
    /// than journaled.
    pub fn set_variable(&mut self, name: impl Into<String>, value: VarValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn variables(&self) -> &IndexMap<String, VarValue> {
        &self.variables
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn options(&self) -> impl Iterator<Item = &BuildOption> {
        self.options.values()
    }

    pub fn dependencies(&self) -> &[DependencyEdge] {
        &self.dependencies
    }

    pub fn platform_blocks(&self) -> impl Iterator<Item = &PlatformBlock> {
        self.platform_blocks.values()
    }

    pub fn custom_builders(&self) -> impl Iterator<Item = &CustomBuilder> {
        self.custom_builders.values()
    }

    pub fn unrecognized_calls(&self) -> &[UnrecognizedCall] {
        &self.unrecognized
    }

    /// Looks up a dotted name such as `env.CPPPATH` through nested maps.
    pub fn lookup(&self, qualified: &str) -> Option<&VarValue> {
        let mut parts = qualified.split('.');
        let mut value = self.variables.get(parts.next()?)?;
        for part in parts {
            value = value.as_map()?.get(part)?;
        }
        Some(value)
    }

    /// Resolves a deferred reference made from inside the map `scope`:
    /// sibling keys first, then top-level variables.
    pub fn resolve_reference(&self, scope: Option<&str>, name: &str) -> Option<String> {
        if let Some(scope) = scope {
            let sibling = format!("{scope}.{name}");
            if self.lookup(&sibling).is_some() {
                return Some(sibling);
            }
        }
        self.variables.contains_key(name).then(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_detection() {
        assert_eq!(VarValue::from_string("$CC"), VarValue::Deferred("CC".into()));
        assert_eq!(VarValue::from_string("${CXX}"), VarValue::Deferred("CXX".into()));
        assert_eq!(VarValue::from_string("$CC -O2"), VarValue::string("$CC -O2"));
        assert_eq!(VarValue::from_string("${1X}"), VarValue::string("${1X}"));
        assert_eq!(VarValue::from_string("$"), VarValue::string("$"));
    }

    #[test]
    fn test_contributions_replay() {
        let mut graph = BuildGraph::new();
        graph.add_target(Target::new("core", TargetKind::StaticLibrary));
        let checkpoint = graph.checkpoint();
        let mut engine = Target::new("engine", TargetKind::SharedLibrary);
        engine.dependencies.push("core".into());
        graph.add_target(engine);
        graph.add_platform_setting("windows", PlatformSetting::Definition, vec!["WIN".into()]);
        let delta = graph.contributions_since(checkpoint);
        assert_eq!(delta.len(), 3);

        let mut other = BuildGraph::new();
        other.merge(&delta);
        assert_eq!(other.targets().len(), 1);
        assert_eq!(other.targets()[0].name, "engine");
        assert_eq!(other.dependencies().len(), 1);
        assert_eq!(other.platform_blocks().count(), 1);
    }

    #[test]
    fn test_target_dependencies_follow_edges() {
        let mut graph = BuildGraph::new();
        graph.add_dependency("app", "early");
        graph.add_target(Target::new("app", TargetKind::Executable));
        graph.add_dependency("app", "late");
        graph.add_dependency("app", "late");
        graph.add_dependency("other", "app");
        assert_eq!(graph.target("app").unwrap().dependencies, ["early", "late"]);
        assert_eq!(graph.dependencies().len(), 3);
    }

    #[test]
    fn test_merge_skips_known_modules() {
        let mut source = BuildGraph::new();
        source.begin_module("core.SCsub");
        source.add_target(Target::new("core", TargetKind::StaticLibrary));
        source.end_module("core.SCsub");
        source.add_target(Target::new("main", TargetKind::Executable));
        let all = source.contributions_since(Checkpoint(0));

        let mut other = BuildGraph::new();
        other.merge(&all);
        other.merge(&all);
        let names: Vec<_> = other.targets().iter().map(|t| t.name.as_str()).collect();
        // The module region is replayed once; loose contributions are not
        // bracketed and replay each time.
        assert_eq!(names, ["core", "main", "main"]);
        assert!(other.has_module("core.SCsub"));
    }

    #[test]
    fn test_option_redeclaration_keeps_position() {
        let mut graph = BuildGraph::new();
        for (name, default) in [("a", "1"), ("b", "2"), ("a", "3")] {
            graph.add_option(BuildOption {
                name: name.into(),
                description: String::new(),
                default: VarValue::string(default),
                kind: None,
                allowed_values: Vec::new(),
            });
        }
        let options: Vec<_> = graph.options().collect();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].name, "a");
        assert_eq!(options[0].default, VarValue::string("3"));
    }

    #[test]
    fn test_resolve_reference() {
        let mut graph = BuildGraph::new();
        let mut env = IndexMap::new();
        env.insert("CC".to_string(), VarValue::string("gcc"));
        env.insert("LINK".to_string(), VarValue::Deferred("CC".into()));
        graph.set_variable("env", VarValue::Map(env));
        graph.set_variable("CXX", VarValue::string("g++"));

        assert_eq!(graph.resolve_reference(Some("env"), "CC").as_deref(), Some("env.CC"));
        assert_eq!(graph.resolve_reference(Some("env"), "CXX").as_deref(), Some("CXX"));
        assert_eq!(graph.resolve_reference(None, "CC"), None);
    }
}
