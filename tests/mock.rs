//! Test in a mock environment

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use kati::World;
use smol_str::SmolStr;

/// A mock [`World`] implementation that works entirely in-memory.
///
/// Recipes in these tests are plain lines: the first line is a bare command
/// name used for logging/failure injection, and any following `touch <path>`
/// line marks that path as freshly written — mirroring what a real recipe's
/// shell commands would do to the filesystem, without actually running one.
pub struct MockWorld {
    inner: Mutex<MockWorldInner>,
}

pub type MockCallback = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct MockWorldInner {
    /// A number that roughly represents a mocked system time. Increases every
    /// time a file is touched.
    epoch: u64,
    /// Map from in-memory file list to their modification epoch
    files: HashMap<PathBuf, u64>,
    /// A log of executed command names, in execution order.
    exec_log: Vec<String>,
    /// Execution callback: given a command name, returns whether it fails.
    callback: Option<MockCallback>,
}

impl MockWorldInner {
    fn touch(&mut self, path: &str) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.files.insert(PathBuf::from(path), epoch);
    }
}

impl World for MockWorld {
    fn exists(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(path)
    }

    fn mtime(&self, path: &Path) -> std::io::Result<SystemTime> {
        let inner = self.inner.lock().unwrap();
        let epoch = inner.files.get(path).ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))?;
        Ok(UNIX_EPOCH + Duration::from_secs(*epoch))
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn run_recipe(&self, lines: &[SmolStr]) -> std::io::Result<bool> {
        for line in lines {
            if let Some(path) = line.as_str().strip_prefix("touch ") {
                self.inner.lock().unwrap().touch(path);
                continue;
            }
            let should_fail = {
                let mut inner = self.inner.lock().unwrap();
                inner.exec_log.push(line.to_string());
                inner.callback.as_ref().map(|cb| cb(line.as_str())).unwrap_or(false)
            };
            if should_fail {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[allow(unused)]
impl MockWorld {
    pub fn new() -> Self {
        Self { inner: Mutex::new(MockWorldInner { epoch: 0, files: HashMap::new(), exec_log: Vec::new(), callback: None }) }
    }

    /// Set a file as existing, updating its modification time to the current epoch.
    pub fn touch_file(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.touch(&path.as_ref().to_string_lossy());
    }

    /// Remove a file from the mock world.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.files.remove(path.as_ref());
    }

    /// Whether `path` currently exists in the mock world.
    pub fn file_exists(&self, path: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.files.contains_key(Path::new(path))
    }

    /// Take and clear the execution log.
    pub fn take_log(&self) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.exec_log)
    }

    /// Set an execution callback to customize command execution behavior.
    pub fn set_callback(&self, callback: MockCallback) {
        let mut inner = self.inner.lock().unwrap();
        inner.callback = Some(callback);
    }
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}
