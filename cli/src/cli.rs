use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use scons2cmake::{ConvertOptions, Mode};

#[derive(Parser, Debug)]
#[command(name = "scons2cmake")]
#[command(about = "Translate SCons build scripts into CMakeLists.txt files")]
#[command(version)]
pub struct Args {
    /// Project root to scan for SConstruct and SConscript files
    pub root: PathBuf,

    /// Log loader and interpreter steps
    #[arg(short, long)]
    pub verbose: bool,

    /// Recognize Godot engine conventions (SCsub scripts, env.add_* helpers)
    #[arg(long)]
    pub godot: bool,

    /// Target platform the scripts should observe
    #[arg(long, value_name = "platform", default_value = "linuxbsd")]
    pub platform: String,

    /// Target architecture the scripts should observe
    #[arg(long, value_name = "arch", default_value = "x86_64")]
    pub arch: String,

    /// Per-file time budget in seconds, 0 for none
    #[arg(long, value_name = "secs", default_value_t = 30)]
    pub timeout: u64,

    /// Render references to undefined variables instead of failing
    #[arg(long)]
    pub allow_unresolved: bool,

    /// Fail a script when one of its nested scripts fails
    #[arg(long)]
    pub strict_includes: bool,

    /// Report what would be written without writing it
    #[arg(long)]
    pub dry_run: bool,

    /// SCons ARGUMENTS (can be used multiple times)
    #[arg(value_name = "key=value")]
    pub arguments: Vec<Define>,
}

#[derive(Debug, Clone)]
pub struct Define {
    pub key: String,
    pub value: String,
}

impl FromStr for Define {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s.split_once("=").context("No value specified for argument")?;
        Ok(Define {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.godot { Mode::Godot } else { Mode::Generic }
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            platform: scons2cmake::config::normalize_platform(&self.platform),
            arch: scons2cmake::config::normalize_arch(&self.arch),
            mode: self.mode(),
            arguments: self
                .arguments
                .iter()
                .map(|d| (d.key.clone(), d.value.clone()))
                .collect(),
            timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
            allow_unresolved_references: self.allow_unresolved,
            strict_includes: self.strict_includes,
            ..ConvertOptions::default()
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_and_flags() {
        let args = Args::try_parse_from([
            "scons2cmake",
            "proj",
            "--godot",
            "--platform",
            "osx",
            "--timeout",
            "0",
            "target=template_release",
            "dev_build=yes",
        ])
        .unwrap();
        let options = args.convert_options();
        assert_eq!(options.mode, Mode::Godot);
        assert_eq!(options.platform, "macos");
        assert_eq!(options.timeout, None);
        assert_eq!(options.arguments.get("target").map(String::as_str), Some("template_release"));
        assert_eq!(options.arguments.len(), 2);
    }

    #[test]
    fn test_argument_without_value_is_rejected() {
        assert!(Args::try_parse_from(["scons2cmake", "proj", "novalue"]).is_err());
    }
}
