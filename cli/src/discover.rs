use std::path::Path;

use anyhow::Context;
use scons2cmake::Mode;
use scons2cmake::path::Path as ScriptPath;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Every root or nested script under `root`, relative to it, in walk order.
pub fn scripts(root: &Path, mode: Mode) -> anyhow::Result<Vec<ScriptPath>> {
    let names = mode.script_names();
    let mut found = Vec::new();
    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !names.contains(&name) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        debug!("found {}", relative.display());
        found.push(ScriptPath::from(relative.to_string_lossy()));
    }
    Ok(found)
}
