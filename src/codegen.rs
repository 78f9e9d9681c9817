//! Rendering of a validated [`BuildGraph`] into CMake.
//!
//! Output is a pure function of the graph: every collection is walked in
//! declaration order, so the same graph always renders to the same bytes.

use core::fmt::Write as _;

use hashbrown::{HashMap, HashSet};
use indexmap::IndexMap;

use crate::config::{self, ConvertOptions};
use crate::graph::{BuildGraph, BuildOption, OptionKind, Scalar, Target, TargetKind, VarValue};
use crate::path::Path;

pub trait Generator {
    /// Name of the file written next to each converted script.
    fn file_name(&self) -> &'static str;

    /// Renders `graph`. `script` is the project-relative path of the script
    /// the graph was produced from; relative paths are emitted against its
    /// directory.
    fn generate(&self, graph: &BuildGraph, script: &Path) -> String;
}

#[derive(Debug, Clone)]
pub struct CMakeGenerator {
    minimum_version: String,
}

impl CMakeGenerator {
    pub fn new(minimum_version: impl Into<String>) -> Self {
        Self {
            minimum_version: minimum_version.into(),
        }
    }

    pub fn from_options(options: &ConvertOptions) -> Self {
        Self::new(options.cmake_minimum_version.clone())
    }
}

impl Default for CMakeGenerator {
    fn default() -> Self {
        Self::from_options(&ConvertOptions::default())
    }
}

impl Generator for CMakeGenerator {
    fn file_name(&self) -> &'static str {
        "CMakeLists.txt"
    }

    fn generate(&self, graph: &BuildGraph, script: &Path) -> String {
        let mut writer = Writer {
            graph,
            output_dir: script.parent(),
            names: variable_names(graph),
            out: String::new(),
        };
        writer.header(&self.minimum_version, script);
        writer.options();
        writer.variables();
        writer.platform_blocks();
        writer.targets();
        writer.custom_builders();
        writer.dependencies();
        writer.out
    }
}

/// One rendered argument. References are emitted verbatim so CMake expands
/// them; literals go through [`quote`].
enum Arg {
    Literal(String),
    Reference(String),
}

impl Arg {
    fn render(&self) -> String {
        match self {
            Arg::Literal(s) => quote(s),
            Arg::Reference(name) => format!("${{{name}}}"),
        }
    }
}

struct Writer<'a> {
    graph: &'a BuildGraph,
    output_dir: Path,
    /// Dotted graph name to CMake variable name.
    names: HashMap<String, String>,
    out: String,
}

impl Writer<'_> {
    fn cmake_name(&self, qualified: &str) -> String {
        self.names.get(qualified).cloned().unwrap_or_else(|| identifier(qualified))
    }

    fn section(&mut self, title: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        let _ = writeln!(self.out, "# {title}");
    }

    fn header(&mut self, minimum_version: &str, script: &Path) {
        let project = self.graph.project();
        let _ = writeln!(
            self.out,
            "# Generated by scons2cmake from {}. Do not edit.",
            script.file_name()
        );
        let _ = writeln!(self.out, "cmake_minimum_required(VERSION {minimum_version})");
        let _ = writeln!(
            self.out,
            "project({} VERSION {} LANGUAGES C CXX)",
            quote(&project.name),
            cmake_version(&project.version)
        );
    }

    fn options(&mut self) {
        let graph = self.graph;
        let options: Vec<&BuildOption> = graph.options().collect();
        if options.is_empty() {
            return;
        }
        self.section("Options");
        for option in options {
            let name = identifier(&option.name);
            let description = quote(&option.description);
            match option.kind {
                Some(OptionKind::Bool) => {
                    let state = if truthy(&option.default) { "ON" } else { "OFF" };
                    let _ = writeln!(self.out, "option({name} {description} {state})");
                }
                kind => {
                    let cache_type = match kind {
                        Some(OptionKind::Path) => "PATH",
                        _ => "STRING",
                    };
                    let default = quote(&flatten_default(&option.default));
                    let _ = writeln!(
                        self.out,
                        "set({name} {default} CACHE {cache_type} {description})"
                    );
                    if kind == Some(OptionKind::Enum) && !option.allowed_values.is_empty() {
                        let values: Vec<String> =
                            option.allowed_values.iter().map(|v| quote(v)).collect();
                        let _ = writeln!(
                            self.out,
                            "set_property(CACHE {name} PROPERTY STRINGS {})",
                            values.join(" ")
                        );
                    }
                }
            }
        }
    }

    fn variables(&mut self) {
        let mut lines = Vec::new();
        let graph = self.graph;
        for (name, value) in graph.variables() {
            self.variable(name, None, value, &mut lines);
        }
        if lines.is_empty() {
            return;
        }
        self.section("Variables");
        for line in lines {
            self.out.push_str(&line);
            self.out.push('\n');
        }
    }

    /// `qualified` is the dotted graph name; maps flatten to `NAME_KEY`.
    fn variable(
        &self,
        qualified: &str,
        scope: Option<&str>,
        value: &VarValue,
        lines: &mut Vec<String>,
    ) {
        if let VarValue::Map(map) = value {
            for (key, child) in map {
                self.variable(&format!("{qualified}.{key}"), Some(qualified), child, lines);
            }
            return;
        }

        let mut args = Vec::new();
        self.value_args(scope, value, &mut args);
        let rendered = if args.is_empty() {
            quote("")
        } else {
            args.iter().map(Arg::render).collect::<Vec<_>>().join(" ")
        };
        lines.push(format!("set({} {rendered})", self.cmake_name(qualified)));
    }

    fn value_args(&self, scope: Option<&str>, value: &VarValue, args: &mut Vec<Arg>) {
        match value {
            VarValue::Scalar(scalar) => args.push(Arg::Literal(scalar.to_string())),
            VarValue::List(items) => {
                for item in items {
                    self.value_args(scope, item, args);
                }
            }
            VarValue::Deferred(reference) => {
                // Unresolved references only survive validation when relaxed;
                // they render as a placeholder for the user to define.
                let resolved = self
                    .graph
                    .resolve_reference(scope, reference)
                    .unwrap_or_else(|| reference.clone());
                args.push(Arg::Reference(self.cmake_name(&resolved)));
            }
            // Nested maps inside lists have no CMake list form.
            VarValue::Map(_) => {}
        }
    }

    fn platform_blocks(&mut self) {
        let graph = self.graph;
        let blocks: Vec<_> = graph
            .platform_blocks()
            .filter_map(|block| {
                config::cmake_system_name(&block.platform).map(|system| (system, block))
            })
            .collect();
        if blocks.is_empty() {
            return;
        }
        self.section("Platform settings");
        for (system, block) in blocks {
            let _ = writeln!(self.out, "if(CMAKE_SYSTEM_NAME STREQUAL {})", quote(system));
            for (command, values) in [
                ("add_compile_definitions", &block.definitions),
                ("add_compile_options", &block.compile_options),
                ("link_libraries", &block.link_libraries),
            ] {
                if values.is_empty() {
                    continue;
                }
                let values: Vec<String> = values.iter().map(|v| quote(v)).collect();
                let _ = writeln!(self.out, "  {command}({})", values.join(" "));
            }
            self.out.push_str("endif()\n");
        }
    }

    fn targets(&mut self) {
        let graph = self.graph;
        let targets = graph.targets();
        if targets.is_empty() {
            return;
        }
        self.section("Targets");
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.target(target);
        }
    }

    fn target(&mut self, target: &Target) {
        let name = quote(&target.name);
        let head = match target.kind {
            TargetKind::Executable => format!("add_executable({name}"),
            TargetKind::StaticLibrary => format!("add_library({name} STATIC"),
            TargetKind::SharedLibrary => format!("add_library({name} SHARED"),
            TargetKind::Module => format!("add_library({name} MODULE"),
        };
        let sources: Vec<String> = target.sources.iter().map(|s| self.local_path(s)).collect();
        self.block(&head, &sources);

        let include_dirs: Vec<String> =
            target.include_dirs.iter().map(|s| self.local_path(s)).collect();
        let link_dirs: Vec<String> = target
            .link_directories
            .iter()
            .map(|s| self.local_path(s))
            .collect();

        for (command, values) in [
            ("target_include_directories", &include_dirs),
            ("target_compile_definitions", &target.definitions),
            ("target_compile_options", &target.compile_options),
            ("target_link_directories", &link_dirs),
            ("target_link_libraries", &target.link_libraries),
            ("target_link_options", &target.link_options),
        ] {
            if values.is_empty() {
                continue;
            }
            let quoted: Vec<String> = values.iter().map(|v| quote(v)).collect();
            self.block(&format!("{command}({name} PRIVATE"), &quoted);
        }

        if !target.properties.is_empty() {
            let properties: Vec<String> = target
                .properties
                .iter()
                .map(|(key, value)| {
                    // Output directories are project-relative like sources.
                    if key.ends_with("_OUTPUT_DIRECTORY") {
                        format!("{key} {}", self.local_path(value))
                    } else {
                        format!("{key} {}", quote(value))
                    }
                })
                .collect();
            self.block(&format!("set_target_properties({name} PROPERTIES"), &properties);
        }
    }

    /// `head` followed by one already-rendered item per line.
    fn block(&mut self, head: &str, items: &[String]) {
        if items.is_empty() {
            let _ = writeln!(self.out, "{head})");
            return;
        }
        let _ = writeln!(self.out, "{head}");
        for item in items {
            let _ = writeln!(self.out, "  {item}");
        }
        self.out.push_str(")\n");
    }

    /// A project-relative path re-expressed against the output directory.
    fn local_path(&self, path: &str) -> String {
        let path = Path::from(path);
        if path.is_absolute() {
            return quote(path.as_str());
        }
        let relative = path.relative_to(&self.output_dir);
        if relative.as_str().is_empty() {
            ".".into()
        } else {
            quote(relative.as_str())
        }
    }

    fn custom_builders(&mut self) {
        let graph = self.graph;
        let builders: Vec<_> = graph.custom_builders().collect();
        if builders.is_empty() {
            return;
        }
        self.section("Custom builders (recorded, not translated)");
        for builder in builders {
            let _ = writeln!(
                self.out,
                "#   {}: {} [{}]",
                builder.name,
                one_line(&builder.action),
                builder.script
            );
            for targets in &builder.invocations {
                let _ = writeln!(self.out, "#     -> {}", one_line(&targets.join(" ")));
            }
        }
    }

    fn dependencies(&mut self) {
        let graph = self.graph;
        let edges = graph.dependencies();
        if edges.is_empty() {
            return;
        }
        self.section("Dependencies");
        for edge in edges {
            let _ = writeln!(
                self.out,
                "add_dependencies({} {})",
                quote(&edge.dependent),
                quote(&edge.dependency)
            );
        }
    }
}

/// CMake's bracket-free argument quoting.
pub fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '#' | '"' | '\\' | ';' | '$'));
    if !needs_quotes {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// CMake names for every leaf variable of the graph. Map entries flatten
/// to `NAME_KEY`; one that lands on a name already taken gets a numeric
/// suffix. Top-level variables keep their own names.
fn variable_names(graph: &BuildGraph) -> HashMap<String, String> {
    fn leaves(qualified: String, value: &VarValue, out: &mut Vec<String>) {
        match value {
            VarValue::Map(map) => {
                for (key, child) in map {
                    leaves(format!("{qualified}.{key}"), child, out);
                }
            }
            _ => out.push(qualified),
        }
    }

    let mut all = Vec::new();
    for (name, value) in graph.variables() {
        leaves(name.clone(), value, &mut all);
    }
    let (top, nested): (Vec<String>, Vec<String>) = all.into_iter().partition(|name| !name.contains('.'));

    let mut names = HashMap::new();
    let mut taken = HashSet::new();
    for name in top {
        let id = identifier(&name);
        taken.insert(id.clone());
        names.insert(name, id);
    }
    for name in nested {
        let base = identifier(&name);
        let mut id = base.clone();
        let mut n = 2;
        while !taken.insert(id.clone()) {
            id = format!("{base}_{n}");
            n += 1;
        }
        names.insert(name, id);
    }
    names
}

/// Graph names use dots for map nesting; CMake variables use underscores.
fn identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Leading `major[.minor[.patch[.tweak]]]` of a version string.
fn cmake_version(version: &str) -> String {
    let parts: Vec<&str> = version
        .split('.')
        .map_while(|part| {
            let digits = part.trim_end_matches(|c: char| !c.is_ascii_digit());
            (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
        })
        .take(4)
        .collect();
    if parts.is_empty() {
        "0.1.0".into()
    } else {
        parts.join(".")
    }
}

fn truthy(value: &VarValue) -> bool {
    match value {
        VarValue::Scalar(Scalar::Boolean(b)) => *b,
        VarValue::Scalar(Scalar::Integer(i)) => *i != 0,
        VarValue::Scalar(Scalar::Float(x)) => *x != 0.0,
        VarValue::Scalar(Scalar::String(s)) => {
            matches!(s.to_ascii_lowercase().as_str(), "1" | "yes" | "true" | "on" | "y")
        }
        VarValue::List(items) => !items.is_empty(),
        VarValue::Map(map) => !map.is_empty(),
        VarValue::Deferred(_) => false,
    }
}

fn flatten_default(value: &VarValue) -> String {
    match value {
        VarValue::Scalar(scalar) => scalar.to_string(),
        VarValue::List(items) => items.iter().map(flatten_default).collect::<Vec<_>>().join(";"),
        VarValue::Map(map) => flatten_map(map),
        VarValue::Deferred(name) => format!("${{{name}}}"),
    }
}

fn flatten_map(map: &IndexMap<String, VarValue>) -> String {
    map.iter()
        .map(|(k, v)| format!("{k}={}", flatten_default(v)))
        .collect::<Vec<_>>()
        .join(";")
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PlatformSetting;

    fn render(graph: &BuildGraph) -> String {
        CMakeGenerator::default().generate(graph, &Path::from("SConstruct"))
    }

    fn scenario_graph() -> BuildGraph {
        let mut graph = BuildGraph::new();
        graph.set_variable(
            "FLAGS",
            VarValue::List(vec![VarValue::string("-O2"), VarValue::string("-Wall")]),
        );
        let mut core = Target::new("core", TargetKind::StaticLibrary);
        core.sources.push("core/core.cpp".into());
        graph.add_target(core);
        let mut engine = Target::new("engine", TargetKind::SharedLibrary);
        engine.sources.extend(["a.cpp".into(), "b.cpp".into()]);
        engine.dependencies.push("core".into());
        graph.add_target(engine);
        graph
    }

    #[test]
    fn test_shared_library_scenario() {
        let output = render(&scenario_graph());
        assert!(output.contains("set(FLAGS -O2 -Wall)\n"));
        assert!(output.contains("add_library(engine SHARED\n  a.cpp\n  b.cpp\n)\n"));
        let core = output.find("add_library(core STATIC").unwrap();
        let dependency = output.find("add_dependencies(engine core)").unwrap();
        assert!(core < dependency);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let graph = scenario_graph();
        assert_eq!(render(&graph), render(&graph));
    }

    #[test]
    fn test_section_order() {
        let mut graph = scenario_graph();
        graph.add_option(BuildOption {
            name: "tools".into(),
            description: "Build tools".into(),
            default: VarValue::boolean(true),
            kind: Some(OptionKind::Bool),
            allowed_values: Vec::new(),
        });
        graph.add_platform_setting("linuxbsd", PlatformSetting::Definition, vec!["X11".into()]);
        graph.register_custom_builder("Gen", "python gen.py", "SConstruct");
        let output = render(&graph);

        let positions: Vec<usize> = [
            "cmake_minimum_required(VERSION 3.20)",
            "option(tools \"Build tools\" ON)",
            "set(FLAGS",
            "if(CMAKE_SYSTEM_NAME STREQUAL Linux)",
            "add_library(core",
            "#   Gen: python gen.py [SConstruct]",
            "add_dependencies(engine core)",
        ]
        .iter()
        .map(|needle| output.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{output}");
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote("VERSION=\"1\""), "\"VERSION=\\\"1\\\"\"");
        assert_eq!(quote("a;b"), "\"a;b\"");
        assert_eq!(quote("$HOME"), "\"\\$HOME\"");
        assert_eq!(quote("C:\\x"), "\"C:\\\\x\"");
    }

    #[test]
    fn test_map_variables_and_references() {
        let mut graph = BuildGraph::new();
        let mut env = IndexMap::new();
        env.insert("CC".to_string(), VarValue::string("gcc"));
        env.insert("LINK".to_string(), VarValue::Deferred("CC".into()));
        env.insert("LIBS".to_string(), VarValue::List(Vec::new()));
        graph.set_variable("env", VarValue::Map(env));
        graph.set_variable("DEBUG", VarValue::boolean(false));
        graph.set_variable("MISSING", VarValue::Deferred("NOPE".into()));
        let output = render(&graph);
        assert!(output.contains("set(env_CC gcc)\n"));
        assert!(output.contains("set(env_LINK ${env_CC})\n"));
        assert!(output.contains("set(env_LIBS \"\")\n"));
        assert!(output.contains("set(DEBUG OFF)\n"));
        assert!(output.contains("set(MISSING ${NOPE})\n"));
    }

    #[test]
    fn test_flattened_names_do_not_collide() {
        let mut graph = BuildGraph::new();
        let mut env = IndexMap::new();
        env.insert("CC".to_string(), VarValue::string("gcc"));
        env.insert("LINK".to_string(), VarValue::Deferred("CC".into()));
        graph.set_variable("env", VarValue::Map(env));
        graph.set_variable("env_CC", VarValue::string("clang"));
        graph.set_variable("cc", VarValue::Deferred("env_CC".into()));
        let output = render(&graph);
        assert!(output.contains("set(env_CC_2 gcc)\n"), "{output}");
        assert!(output.contains("set(env_LINK ${env_CC_2})\n"), "{output}");
        assert!(output.contains("set(env_CC clang)\n"), "{output}");
        assert!(output.contains("set(cc ${env_CC})\n"), "{output}");
    }

    #[test]
    fn test_paths_relative_to_script() {
        let mut graph = BuildGraph::new();
        let mut target = Target::new("drivers", TargetKind::StaticLibrary);
        target.sources.push("drivers/gl/gl.cpp".into());
        target.include_dirs.extend(["drivers".into(), "thirdparty/glad".into()]);
        target.properties.insert("OUTPUT_NAME".into(), "gl drivers".into());
        graph.add_target(target);
        let output = CMakeGenerator::default().generate(&graph, &Path::from("drivers/SCsub"));
        assert!(output.contains("add_library(drivers STATIC\n  gl/gl.cpp\n)\n"));
        assert!(output.contains(
            "target_include_directories(drivers PRIVATE\n  .\n  ../thirdparty/glad\n)\n"
        ));
        assert!(output.contains("set_target_properties(drivers PROPERTIES\n  OUTPUT_NAME \"gl drivers\"\n)\n"));
    }

    #[test]
    fn test_options_rendering() {
        let mut graph = BuildGraph::new();
        graph.add_option(BuildOption {
            name: "target".into(),
            description: "Build target".into(),
            default: VarValue::string("editor"),
            kind: Some(OptionKind::Enum),
            allowed_values: vec!["editor".into(), "template_release".into()],
        });
        graph.add_option(BuildOption {
            name: "prefix".into(),
            description: String::new(),
            default: VarValue::string("/usr"),
            kind: Some(OptionKind::Path),
            allowed_values: Vec::new(),
        });
        let output = render(&graph);
        assert!(output.contains("set(target editor CACHE STRING \"Build target\")\n"));
        assert!(output.contains("set_property(CACHE target PROPERTY STRINGS editor template_release)\n"));
        assert!(output.contains("set(prefix /usr CACHE PATH \"\")\n"));
    }

    #[test]
    fn test_cmake_version() {
        assert_eq!(cmake_version("4.3.0"), "4.3.0");
        assert_eq!(cmake_version("4.3-stable"), "4.3");
        assert_eq!(cmake_version("dev"), "0.1.0");
    }
}
