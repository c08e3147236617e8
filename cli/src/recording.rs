//! An [`EvalIo`] wrapper that mirrors every filesystem/process observation
//! an evaluation run makes into a [`Stamp`], so `--regen`/`--ninja` have
//! real data to check staleness against on the next invocation.

use std::cell::RefCell;

use kati::eval::{EvalIo, OsEvalIo};
use kati::stamp::Stamp;

/// Wraps any [`EvalIo`] — in practice [`OsEvalIo`], optionally underneath a
/// `kati::eval::FindEmulatingEvalIo` — to also record every observation into
/// a [`Stamp`]. Generic so the find emulator can be layered underneath
/// without this wrapper needing to know about it.
pub struct RecordingEvalIo<I = OsEvalIo> {
    inner: I,
    stamp: RefCell<Stamp>,
}

impl RecordingEvalIo<OsEvalIo> {
    pub fn new() -> Self {
        Self { inner: OsEvalIo, stamp: RefCell::new(Stamp::new()) }
    }
}

impl<I: EvalIo> RecordingEvalIo<I> {
    pub fn wrapping(inner: I) -> Self {
        Self { inner, stamp: RefCell::new(Stamp::new()) }
    }

    /// Records an environment variable consulted during bootstrap, outside
    /// the [`EvalIo`] surface (environment seeding happens before any
    /// statement is evaluated).
    pub fn record_env(&self, name: &str, value: Option<String>) {
        self.stamp.borrow_mut().record_env(name, value);
    }

    pub fn into_stamp(self) -> Stamp {
        self.stamp.into_inner()
    }
}

impl Default for RecordingEvalIo<OsEvalIo> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: EvalIo> EvalIo for RecordingEvalIo<I> {
    fn glob(&self, pattern: &str) -> std::io::Result<Vec<String>> {
        let matched = self.inner.glob(pattern)?;
        self.stamp.borrow_mut().record_glob(pattern, matched.clone());
        Ok(matched)
    }

    fn canonicalize(&self, path: &str) -> Option<String> {
        self.inner.canonicalize(path)
    }

    fn abspath(&self, path: &str) -> String {
        self.inner.abspath(path)
    }

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        let content = self.inner.read_file(path)?;
        self.stamp.borrow_mut().record_file(path);
        Ok(content)
    }

    fn write_file(&self, path: &str, content: &str, append: bool) -> std::io::Result<()> {
        self.inner.write_file(path, content, append)
    }

    fn run_shell(&self, command: &str) -> std::io::Result<(String, i32)> {
        let (output, status) = self.inner.run_shell(command)?;
        self.stamp.borrow_mut().record_shell(command, &output);
        Ok((output, status))
    }
}
