use crate::error::StoreError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Durable home of the server configuration document.
pub trait ConfigStorage {
    /// Location shown in errors and logs.
    fn location(&self) -> &Path;

    /// Read the whole document.
    fn read(&self) -> Result<String, StoreError>;

    /// Replace the whole document. Either the new contents land in full or the
    /// previous contents are left untouched.
    fn replace(&self, contents: &str) -> Result<(), StoreError>;
}

/// A YAML file on local disk, replaced by write-to-temp and rename.
#[derive(Debug, Clone)]
pub struct YamlFile {
    path: PathBuf,
}

impl YamlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl ConfigStorage for YamlFile {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, StoreError> {
        fs::read_to_string(&self.path).map_err(|e| StoreError::Unavailable {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn replace(&self, contents: &str) -> Result<(), StoreError> {
        let io = |e: std::io::Error| StoreError::Write(format!("{}: {e}", self.path.display()));
        let mut tmp = NamedTempFile::new_in(self.dir()).map_err(io)?;
        tmp.write_all(contents.as_bytes()).map_err(io)?;
        tmp.as_file().sync_all().map_err(io)?;
        tmp.persist(&self.path).map_err(|e| io(e.error))?;
        Ok(())
    }
}

impl<T: ConfigStorage + ?Sized> ConfigStorage for std::sync::Arc<T> {
    fn location(&self) -> &Path {
        (**self).location()
    }

    fn read(&self) -> Result<String, StoreError> {
        (**self).read()
    }

    fn replace(&self, contents: &str) -> Result<(), StoreError> {
        (**self).replace(contents)
    }
}
