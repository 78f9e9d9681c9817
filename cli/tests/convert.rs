use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (path, contents) in files {
        let path = dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn scons2cmake(root: &Path, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scons2cmake"))
        .arg(root)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn converts_a_project_tree() {
    let dir = project(&[
        (
            "SConstruct",
            "env = Environment(CPPPATH=['#include'])\nExport('env')\nSConscript('src/SConscript')\n",
        ),
        (
            "src/SConscript",
            "Import('env')\nlib = env.Library('util', Glob('util*.cpp'))\nenv.Program('app', ['main.cpp'], LIBS=[lib])\n",
        ),
        ("src/main.cpp", "int main() {}\n"),
        ("src/util.cpp", ""),
        (".git/SConstruct", "this is not python\n"),
    ]);

    let output = scons2cmake(dir.path(), &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("2 converted, 0 failed"), "{stdout}");

    let root = fs::read_to_string(dir.path().join("CMakeLists.txt")).unwrap();
    assert!(root.contains("add_library(util STATIC\n  src/util.cpp\n)"), "{root}");
    assert!(root.contains("target_link_libraries(app PRIVATE\n  util\n)"), "{root}");
    let nested = fs::read_to_string(dir.path().join("src/CMakeLists.txt")).unwrap();
    assert!(nested.contains("target_include_directories(app PRIVATE\n  ../include\n)"), "{nested}");
    assert!(!dir.path().join(".git/CMakeLists.txt").exists());
}

#[test]
fn failing_file_sets_exit_code() {
    let dir = project(&[
        ("SConstruct", "Program('app', ['main.c'])\nDepends('app', 'missing')\n"),
        ("tool/SConstruct", "Program('tool', ['tool.c'])\n"),
    ]);

    let output = scons2cmake(dir.path(), &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1), "{stdout}");
    assert!(stdout.contains("missing"), "{stdout}");
    assert!(stdout.contains("1 converted, 1 failed"), "{stdout}");
    assert!(!dir.path().join("CMakeLists.txt").exists());
    assert!(dir.path().join("tool/CMakeLists.txt").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = project(&[("SConstruct", "Program('app', ['main.c'])\n")]);
    let output = scons2cmake(dir.path(), &["--dry-run"]);
    assert!(output.status.success());
    assert!(!dir.path().join("CMakeLists.txt").exists());
}

#[test]
fn godot_mode_reads_scsub_and_arguments() {
    let dir = project(&[
        ("version.py", "major = 4\nminor = 2\npatch = 0\n"),
        (
            "SConstruct",
            "env = Environment()\nExport('env')\nSConscript('core/SCsub')\n",
        ),
        (
            "core/SCsub",
            "Import('env')\nif env.editor_build:\n    env.add_library('core', ['core.cpp'])\nelse:\n    env.add_library('core_runtime', ['core.cpp'])\n",
        ),
        ("core/core.cpp", ""),
    ]);

    let output = scons2cmake(dir.path(), &["--godot", "target=template_release"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{stdout}");
    let root = fs::read_to_string(dir.path().join("CMakeLists.txt")).unwrap();
    assert!(root.contains("project(godot VERSION 4.2.0"), "{root}");
    assert!(root.contains("add_library(core_runtime STATIC"), "{root}");
    assert!(root.contains("LINUX_ENABLED"), "{root}");
    assert!(dir.path().join("core/CMakeLists.txt").exists());
}
