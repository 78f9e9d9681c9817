use crate::path::Path;

pub type Result<T> = anyhow::Result<T>;

/// Host services the converter needs. The library never touches the
/// filesystem or the process environment directly.
pub trait Runtime: 'static {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> Result<bool>;
    fn is_file(&self, path: &Path) -> Result<bool>;
    fn is_dir(&self, path: &Path) -> Result<bool>;

    /// Names of the entries directly inside `path`, sorted.
    fn read_dir(&self, path: &Path) -> Result<Vec<String>>;

    fn find_program(&self, name: &str) -> Result<Path>;
    fn get_env(&self, key: &str) -> Option<String>;
}

pub(crate) fn read_to_string(runtime: &dyn Runtime, path: &Path) -> Result<String> {
    let bytes = runtime.read_file(path)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use anyhow::{anyhow, bail};
    use hashbrown::HashMap;

    use super::{Result, Runtime};
    use crate::path::Path;

    /// In-memory filesystem used by the unit tests.
    #[derive(Default)]
    pub struct MemoryRuntime {
        files: RefCell<BTreeMap<String, Vec<u8>>>,
        reads: RefCell<HashMap<String, usize>>,
        env: HashMap<String, String>,
        programs: Vec<String>,
    }

    impl MemoryRuntime {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(self, path: &str, contents: &str) -> Self {
            self.files
                .borrow_mut()
                .insert(path.to_string(), contents.as_bytes().to_vec());
            self
        }

        pub fn with_env(mut self, key: &str, value: &str) -> Self {
            self.env.insert(key.into(), value.into());
            self
        }

        pub fn with_program(mut self, name: &str) -> Self {
            self.programs.push(name.into());
            self
        }

        pub fn contents(&self, path: &str) -> Option<String> {
            self.files
                .borrow()
                .get(path)
                .map(|b| String::from_utf8_lossy(b).into_owned())
        }

        pub fn read_count(&self, path: &str) -> usize {
            self.reads.borrow().get(path).copied().unwrap_or(0)
        }

        fn key(path: &Path) -> String {
            path.normalize().as_str().to_string()
        }
    }

    impl Runtime for MemoryRuntime {
        fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
            let key = Self::key(path);
            *self.reads.borrow_mut().entry(key.clone()).or_insert(0) += 1;
            self.files
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow!("No such file: {key}"))
        }

        fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
            self.files.borrow_mut().insert(Self::key(path), data.to_vec());
            Ok(())
        }

        fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.is_file(path)? || self.is_dir(path)?)
        }

        fn is_file(&self, path: &Path) -> Result<bool> {
            Ok(self.files.borrow().contains_key(&Self::key(path)))
        }

        fn is_dir(&self, path: &Path) -> Result<bool> {
            let key = Self::key(path);
            if key.is_empty() {
                return Ok(true);
            }
            let prefix = format!("{key}/");
            Ok(self.files.borrow().keys().any(|k| k.starts_with(&prefix)))
        }

        fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
            let key = Self::key(path);
            let prefix = if key.is_empty() {
                String::new()
            } else {
                format!("{key}/")
            };
            let mut names: Vec<String> = self
                .files
                .borrow()
                .keys()
                .filter_map(|k| k.strip_prefix(&prefix))
                .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
                .collect();
            names.sort();
            names.dedup();
            if names.is_empty() && !self.is_dir(path)? {
                bail!("No such directory: {key}");
            }
            Ok(names)
        }

        fn find_program(&self, name: &str) -> Result<Path> {
            if self.programs.iter().any(|p| p == name) {
                Ok(Path::from("/usr/bin").join(name))
            } else {
                bail!("Program not found: {name}")
            }
        }

        fn get_env(&self, key: &str) -> Option<String> {
            self.env.get(key).cloned()
        }
    }
}
