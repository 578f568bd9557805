use crate::error::StoreError;
use crate::storage::ConfigStorage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process configuration storage with switchable write faults.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    contents: Mutex<String>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(contents: &str) -> Self {
        Self {
            contents: Mutex::new(contents.to_string()),
            ..Self::default()
        }
    }

    /// Make every following `replace` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful replacements.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> String {
        self.contents
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl ConfigStorage for MemoryStorage {
    fn location(&self) -> &Path {
        Path::new("memory://config.yaml")
    }

    fn read(&self) -> Result<String, StoreError> {
        self.contents
            .lock()
            .map(|c| c.clone())
            .map_err(|e| StoreError::Unavailable {
                path: self.location().to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn replace(&self, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write fault".to_string()));
        }
        let mut guard = self
            .contents
            .lock()
            .map_err(|e| StoreError::Write(e.to_string()))?;
        *guard = contents.to_string();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
