use std::path::Path;
use std::{env, fs};

use scons2cmake::path::Path as ScriptPath;
use scons2cmake::runtime;

/// The real filesystem and process environment.
pub struct Host;

impl runtime::Runtime for Host {
    fn read_file(&self, path: &ScriptPath) -> runtime::Result<Vec<u8>> {
        Ok(fs::read(path.as_str())?)
    }

    fn write_file(&self, path: &ScriptPath, data: &[u8]) -> runtime::Result<()> {
        Ok(fs::write(path.as_str(), data)?)
    }

    fn exists(&self, path: &ScriptPath) -> runtime::Result<bool> {
        Ok(Path::new(path.as_str()).exists())
    }
    fn is_file(&self, path: &ScriptPath) -> runtime::Result<bool> {
        Ok(Path::new(path.as_str()).is_file())
    }
    fn is_dir(&self, path: &ScriptPath) -> runtime::Result<bool> {
        Ok(Path::new(path.as_str()).is_dir())
    }

    fn read_dir(&self, path: &ScriptPath) -> runtime::Result<Vec<String>> {
        let mut names = fs::read_dir(path.as_str())?
            .map(|entry| Ok(entry?.file_name().to_string_lossy().into_owned()))
            .collect::<runtime::Result<Vec<String>>>()?;
        names.sort();
        Ok(names)
    }

    fn find_program(&self, name: &str) -> runtime::Result<ScriptPath> {
        let found = which::which(name)?;
        Ok(ScriptPath::from(found.to_string_lossy()))
    }

    fn get_env(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
