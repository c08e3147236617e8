//! Abstracts the filesystem/process operations the executor needs, so
//! tests can supply an in-memory double instead of touching real files or
//! spawning real processes.
//!
//! All file and execution operations the executor performs go through
//! this trait. You may implement this trait to customize the view of the
//! world as seen by the executor — for example a mock world for tests, or
//! a remote world that executes commands on a different machine.
//!
//! A default implementation is available at [`LocalWorld`].
//!
//! # Implementation notes
//!
//! The implementation of this trait will be executed in a threadpool.

use std::path::Path;
use std::process::Command;
use std::time::SystemTime;

use smol_str::SmolStr;

pub trait World: Send + Sync {
    /// Test whether a file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Get the modification time of a file.
    fn mtime(&self, path: &Path) -> std::io::Result<SystemTime>;

    /// Get the current time. Implementations may return a mocked monotonic time.
    fn now(&self) -> SystemTime;

    /// Runs a node's recipe, one shell line at a time, stopping at the
    /// first failing line (GNU make's default, non-`-k`, behavior).
    /// Returns whether every line succeeded.
    fn run_recipe(&self, lines: &[SmolStr]) -> std::io::Result<bool>;
}

/// The default implementation of [`World`], which interacts with the local
/// filesystem and spawns local processes.
pub struct LocalWorld;
pub static LOCAL_WORLD: LocalWorld = LocalWorld;

impl World for LocalWorld {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn mtime(&self, path: &Path) -> std::io::Result<SystemTime> {
        path.metadata()?.modified()
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn run_recipe(&self, lines: &[SmolStr]) -> std::io::Result<bool> {
        for line in lines {
            // FIXME: n2 reports that `Command::spawn` leaks file descriptors.
            // See: https://github.com/rust-lang/rust/issues/95584
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c").arg(line.as_str());
            let status = cmd.spawn()?.wait()?;
            if !status.success() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
