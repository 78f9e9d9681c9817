use core::time::Duration;

use indexmap::IndexMap;

/// Which script conventions receive specialised recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Generic,
    /// Godot engine conventions: `SCsub` scripts, `env.add_*` helpers,
    /// `*_ENABLED` platform definitions.
    Godot,
}

pub const ROOT_SCRIPT: &str = "SConstruct";

impl Mode {
    pub fn nested_script_name(&self) -> &'static str {
        match self {
            Mode::Generic => "SConscript",
            Mode::Godot => "SCsub",
        }
    }

    /// File names that discovery should hand to the converter.
    pub fn script_names(&self) -> [&'static str; 2] {
        [ROOT_SCRIPT, self.nested_script_name()]
    }
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub platform: String,
    pub arch: String,
    pub mode: Mode,
    /// `ARGUMENTS` as passed on an SCons command line.
    pub arguments: IndexMap<String, String>,
    pub timeout: Option<Duration>,
    pub allow_unresolved_references: bool,
    pub strict_includes: bool,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub cmake_minimum_version: String,
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            platform: "linuxbsd".into(),
            arch: "x86_64".into(),
            mode: Mode::Generic,
            arguments: IndexMap::new(),
            timeout: Some(DEFAULT_TIMEOUT),
            allow_unresolved_references: false,
            strict_includes: false,
            project_name: None,
            project_version: None,
            cmake_minimum_version: "3.20".into(),
        }
    }
}

const PLATFORM_ALIASES: &[(&str, &str)] = &[
    ("osx", "macos"),
    ("iphone", "ios"),
    ("x11", "linuxbsd"),
    ("linux", "linuxbsd"),
    ("javascript", "web"),
    ("win32", "windows"),
];

const ARCH_ALIASES: &[(&str, &str)] = &[
    ("x86", "x86_32"),
    ("x64", "x86_64"),
    ("amd64", "x86_64"),
    ("armv7", "arm32"),
    ("armv8", "arm64"),
    ("arm64v8", "arm64"),
    ("aarch64", "arm64"),
    ("rv", "rv64"),
    ("riscv", "rv64"),
    ("riscv64", "rv64"),
    ("ppcle", "ppc32"),
    ("ppc", "ppc32"),
    ("ppc64le", "ppc64"),
    ("loong64", "loongarch64"),
];

fn lookup(aliases: &[(&str, &'static str)], name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    aliases
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lower)
}

pub fn normalize_platform(name: &str) -> String {
    lookup(PLATFORM_ALIASES, name)
}

pub fn normalize_arch(name: &str) -> String {
    lookup(ARCH_ALIASES, name)
}

/// Value of `sys.platform` a script would observe for a platform identifier.
pub fn python_platform(platform: &str) -> &'static str {
    match platform {
        "windows" => "win32",
        "macos" | "ios" => "darwin",
        "web" => "emscripten",
        _ => "linux",
    }
}

/// Value of `platform.system()` for a platform identifier.
pub fn system_name(platform: &str) -> &'static str {
    match platform {
        "windows" => "Windows",
        "macos" | "ios" => "Darwin",
        "android" => "Android",
        "web" => "Emscripten",
        _ => "Linux",
    }
}

/// `CMAKE_SYSTEM_NAME` spelling of a platform identifier, if it has one.
pub fn cmake_system_name(platform: &str) -> Option<&'static str> {
    match platform {
        "windows" => Some("Windows"),
        "linuxbsd" => Some("Linux"),
        "macos" => Some("Darwin"),
        "android" => Some("Android"),
        "ios" => Some("iOS"),
        "web" => Some("Emscripten"),
        _ => None,
    }
}

/// Engine-wide definitions Godot enables for a platform.
pub fn godot_platform_definitions(platform: &str) -> &'static [&'static str] {
    match platform {
        "windows" => &["WINDOWS_ENABLED"],
        "linuxbsd" => &["UNIX_ENABLED", "LINUX_ENABLED"],
        "macos" => &["UNIX_ENABLED", "APPLE_ENABLED", "MACOS_ENABLED"],
        "ios" => &["UNIX_ENABLED", "APPLE_ENABLED", "IPHONE_ENABLED"],
        "android" => &["UNIX_ENABLED", "ANDROID_ENABLED"],
        "web" => &["UNIX_ENABLED", "WEB_ENABLED"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_aliases() {
        assert_eq!(normalize_platform("osx"), "macos");
        assert_eq!(normalize_platform("X11"), "linuxbsd");
        assert_eq!(normalize_platform("windows"), "windows");
        assert_eq!(normalize_arch("amd64"), "x86_64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("wasm32"), "wasm32");
    }

    #[test]
    fn test_mode_script_names() {
        assert_eq!(Mode::Generic.script_names(), ["SConstruct", "SConscript"]);
        assert_eq!(Mode::Godot.nested_script_name(), "SCsub");
    }
}
