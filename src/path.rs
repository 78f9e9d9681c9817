use core::fmt;

/// A '/'-separated path that behaves the same on every host.
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Path(String);

const SEP: &str = "/";

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.0)
    }
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().replace('\\', SEP))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEP) || self.0.as_bytes().get(1) == Some(&b':')
    }

    pub fn join(&self, path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', SEP);
        if path.starts_with(SEP) || self.0.is_empty() || self.0 == "." {
            return Self(path);
        }
        if path.is_empty() || path == "." {
            return self.clone();
        }

        let mut new_path = String::from(self.0.trim_end_matches(SEP));
        new_path.push_str(SEP);
        new_path.push_str(&path);
        Self(new_path)
    }

    pub fn parent(&self) -> Path {
        match self.0.trim_end_matches(SEP).rfind(SEP) {
            Some(0) => Self(SEP.into()),
            Some(i) => Self(self.0[..i].into()),
            None => Self::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        let trimmed = self.0.trim_end_matches(SEP);
        match trimmed.rfind(SEP) {
            Some(i) => &trimmed[i + 1..],
            None => trimmed,
        }
    }

    /// File name without its last extension.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(i) => &name[..i],
        }
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(&name[i + 1..]),
        }
    }

    pub fn set_extension(&self, suffix: &str) -> Self {
        let path = &self.0;
        let search_start = path.rfind(SEP).map(|i| i + 1).unwrap_or(0);
        let last_dot = path[search_start..].rfind('.').map(|i| search_start + i);

        let mut new_path = match last_dot {
            Some(dot_pos) if dot_pos > search_start => String::from(&path[..dot_pos]),
            _ => String::from(path.as_str()),
        };
        if !suffix.starts_with('.') {
            new_path.push('.');
        }
        new_path.push_str(suffix);
        Self(new_path)
    }

    /// Collapses `.` and `..` components without touching the filesystem.
    pub fn normalize(&self) -> Self {
        let absolute = self.0.starts_with(SEP);
        let mut parts: Vec<&str> = Vec::new();
        for part in self.0.split(SEP) {
            match part {
                "" | "." => {}
                ".." => match parts.last() {
                    Some(&last) if last != ".." => {
                        parts.pop();
                    }
                    _ if absolute => {}
                    _ => parts.push(".."),
                },
                _ => parts.push(part),
            }
        }
        let joined = parts.join(SEP);
        if absolute {
            Self(format!("{SEP}{joined}"))
        } else {
            Self(joined)
        }
    }

    pub fn strip_prefix(&self, base: &Path) -> Option<Path> {
        let base = base.normalize();
        let this = self.normalize();
        if base.0.is_empty() {
            return Some(this);
        }
        if this.0 == base.0 {
            return Some(Path::new());
        }
        let prefix = format!("{}{SEP}", base.0.trim_end_matches(SEP));
        this.0.strip_prefix(&prefix).map(Path::from)
    }

    /// Expresses `self` relative to `base`, climbing with `..` where needed.
    /// Both paths must be relative to the same root.
    pub fn relative_to(&self, base: &Path) -> Path {
        let this = self.normalize();
        let base = base.normalize();
        if this.is_absolute() != base.is_absolute() {
            return this;
        }
        let ours: Vec<&str> = this.0.split(SEP).filter(|p| !p.is_empty()).collect();
        let theirs: Vec<&str> = base.0.split(SEP).filter(|p| !p.is_empty()).collect();
        let common = ours
            .iter()
            .zip(theirs.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts = vec![".."; theirs.len() - common];
        parts.extend_from_slice(&ours[common..]);
        Path(parts.join(SEP))
    }

    /// Dotted name of a project-relative script path, e.g. `core/SCsub` -> `core.SCsub`.
    pub fn logical_name(&self) -> String {
        let normalized = self.normalize();
        normalized
            .as_str()
            .trim_start_matches(SEP)
            .split(SEP)
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_parent() {
        let p = Path::from("core").join("io/file.cpp");
        assert_eq!(p.as_str(), "core/io/file.cpp");
        assert_eq!(p.parent().as_str(), "core/io");
        assert_eq!(p.file_name(), "file.cpp");
        assert_eq!(p.file_stem(), "file");
        assert_eq!(Path::from("").join("a").as_str(), "a");
        assert_eq!(Path::from("a").join("/abs").as_str(), "/abs");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Path::from("a/./b/../c").normalize().as_str(), "a/c");
        assert_eq!(Path::from("../x/y").normalize().as_str(), "../x/y");
        assert_eq!(Path::from("a\\b").as_str(), "a/b");
    }

    #[test]
    fn test_relative_to() {
        let src = Path::from("core/math/vector.cpp");
        assert_eq!(src.relative_to(&Path::from("core")).as_str(), "math/vector.cpp");
        assert_eq!(
            src.relative_to(&Path::from("drivers/gl")).as_str(),
            "../../core/math/vector.cpp"
        );
        assert_eq!(Path::from("main.cpp").relative_to(&Path::new()).as_str(), "main.cpp");
    }

    #[test]
    fn test_set_extension() {
        assert_eq!(Path::from("a/b.cpp").set_extension("o").as_str(), "a/b.o");
        assert_eq!(Path::from("a.d/b").set_extension(".o").as_str(), "a.d/b.o");
    }

    #[test]
    fn test_logical_name() {
        assert_eq!(Path::from("core/SCsub").logical_name(), "core.SCsub");
        assert_eq!(Path::from("./SConstruct").logical_name(), "SConstruct");
    }
}
