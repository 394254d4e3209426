use std::collections::HashMap;

use crate::error::{Error, Result};

/// Abstract file capability backing a vault document. Concrete adapters
/// (local disk, cloud drive) live outside the core; calls may block and the
/// core never retries them.
pub trait Transport {
    fn read(&self, path: &str) -> Result<String>;
    /// Overwrite an existing file. Fails if `path` does not exist; use
    /// [`Transport::create`] first.
    fn write(&mut self, path: &str, contents: &str) -> Result<()>;
    fn create(&mut self, path: &str, initial: &str) -> Result<()>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&mut self, path: &str) -> Result<()>;
}

/// Map-backed transport for prototyping and tests. Tracks the write count so
/// tests can assert on I/O behavior (e.g. save idempotence).
#[derive(Default)]
pub struct MemoryTransport {
    files: HashMap<String, String>,
    writes: u64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded transport, convenient for open-path tests.
    pub fn with_file(path: &str, contents: &str) -> Self {
        let mut t = Self::new();
        t.files.insert(path.to_string(), contents.to_string());
        t
    }

    pub fn contents(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

impl Transport for MemoryTransport {
    fn read(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no such file: {path}")))
    }

    fn write(&mut self, path: &str, contents: &str) -> Result<()> {
        let Some(slot) = self.files.get_mut(path) else {
            return Err(Error::Transport(format!(
                "cannot write, no such file: {path}"
            )));
        };
        *slot = contents.to_string();
        self.writes += 1;
        Ok(())
    }

    fn create(&mut self, path: &str, initial: &str) -> Result<()> {
        self.files.insert(path.to_string(), initial.to_string());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Transport(format!("cannot delete, no such file: {path}")))
    }
}
