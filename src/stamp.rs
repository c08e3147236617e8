//! The kati stamp: a binary record of every input observed during one
//! evaluation run (files read, globs expanded, env vars consulted, shell
//! command output captured), used to decide whether a re-run needs to
//! regenerate the ninja file before building anything.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub const STAMP_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub mtime: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobRecord {
    pub pattern: String,
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRecord {
    pub command: String,
    pub output: String,
}

/// The complete set of observations a run made, persisted to
/// `.kati_stamp` (or `<ninja_suffix>.kati_stamp`) via `bincode`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stamp {
    pub version: u32,
    pub files: Vec<FileRecord>,
    pub globs: Vec<GlobRecord>,
    pub env_vars: HashMap<String, Option<String>>,
    pub shell_commands: Vec<ShellRecord>,
    /// Content hash of the kati binary that produced the stamp, so
    /// `--regen_ignoring_kati_binary` can skip this particular check
    /// without disabling the rest.
    pub binary_hash: Option<String>,
}

impl Stamp {
    pub fn new() -> Self {
        Stamp { version: STAMP_VERSION, binary_hash: compute_binary_hash(), ..Default::default() }
    }

    pub fn record_file(&mut self, path: &str) {
        let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok()).and_then(|t| to_unix(t));
        self.files.push(FileRecord { path: path.to_string(), mtime });
    }

    pub fn record_glob(&mut self, pattern: &str, matched: Vec<String>) {
        self.globs.push(GlobRecord { pattern: pattern.to_string(), matched });
    }

    pub fn record_env(&mut self, name: &str, value: Option<String>) {
        self.env_vars.insert(name.to_string(), value);
    }

    pub fn record_shell(&mut self, command: &str, output: &str) {
        self.shell_commands.push(ShellRecord { command: command.to_string(), output: output.to_string() });
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StampError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(StampError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StampError> {
        let (stamp, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(StampError::Decode)?;
        Ok(stamp)
    }

    pub fn load(path: &Path) -> Result<Self, StampError> {
        let bytes = std::fs::read(path).map_err(StampError::Io)?;
        Self::from_bytes(&bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), StampError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(StampError::Io)
    }
}

fn to_unix(t: SystemTime) -> Option<i64> {
    t.duration_since(SystemTime::UNIX_EPOCH).ok().map(|d| d.as_secs() as i64)
}

#[derive(Debug, thiserror::Error)]
pub enum StampError {
    #[error(transparent)]
    Io(std::io::Error),
    #[error("failed to encode stamp: {0}")]
    Encode(bincode::error::EncodeError),
    #[error("failed to decode stamp: {0}")]
    Decode(bincode::error::DecodeError),
}

/// The outcome of checking a stamp against current filesystem/environment
/// state: either everything still matches (`Clean`) or something changed
/// and the ninja file must be regenerated (`Dirty`, with the reason).
#[derive(Debug, PartialEq, Eq)]
pub enum RegenStatus {
    Clean,
    Dirty(String),
}

pub struct RegenOptions {
    pub ignore_dirty_patterns: Vec<String>,
    pub ignore_kati_binary: bool,
}

/// Checks whether `stamp` is still valid, running the file, glob-replay and
/// shell-command-replay checks concurrently via `rayon::join` — they are
/// independent of each other and each can be the expensive one depending on
/// the makefile, so running them in parallel (rather than sequentially
/// bailing out on the first dirty result) keeps the common case of
/// "everything is clean" from serializing several slow scans.
pub fn check_stamp(stamp: &Stamp, opts: &RegenOptions) -> RegenStatus {
    let (file_status, (glob_status, command_status)) = rayon::join(
        || check_files(stamp, opts),
        || rayon::join(|| check_globs(stamp), || check_commands(stamp)),
    );
    if let RegenStatus::Dirty(reason) = file_status {
        return RegenStatus::Dirty(reason);
    }
    if let RegenStatus::Dirty(reason) = glob_status {
        return RegenStatus::Dirty(reason);
    }
    if let RegenStatus::Dirty(reason) = command_status {
        return RegenStatus::Dirty(reason);
    }
    for (name, recorded) in &stamp.env_vars {
        let current = std::env::var(name).ok();
        if &current != recorded {
            return RegenStatus::Dirty(format!("environment variable {name} changed"));
        }
    }
    RegenStatus::Clean
}

fn check_files(stamp: &Stamp, opts: &RegenOptions) -> RegenStatus {
    for f in &stamp.files {
        if opts.ignore_dirty_patterns.iter().any(|p| crate::find::glob_match(p, &f.path)) {
            continue;
        }
        let current = std::fs::metadata(&f.path).ok().and_then(|m| m.modified().ok()).and_then(to_unix);
        if current != f.mtime {
            return RegenStatus::Dirty(format!("input file {} changed", f.path));
        }
    }
    if !opts.ignore_kati_binary {
        if let (Some(recorded), Some(current)) = (&stamp.binary_hash, compute_binary_hash()) {
            if recorded != &current {
                return RegenStatus::Dirty("kati binary changed".to_string());
            }
        }
    }
    RegenStatus::Clean
}

fn check_globs(stamp: &Stamp) -> RegenStatus {
    for g in &stamp.globs {
        let current = crate::find::glob(&g.pattern).unwrap_or_default();
        if current != g.matched {
            return RegenStatus::Dirty(format!("glob {} result changed", g.pattern));
        }
    }
    RegenStatus::Clean
}

/// Replays each recorded `$(shell ...)` invocation and compares its output
/// against what was captured when the stamp was written — a command whose
/// output now differs (e.g. a version string or generated file list) means
/// the makefile's evaluation would come out differently too.
fn check_commands(stamp: &Stamp) -> RegenStatus {
    for c in &stamp.shell_commands {
        let output = std::process::Command::new("/bin/sh").arg("-c").arg(&c.command).output();
        let current = match output {
            Ok(o) => String::from_utf8_lossy(&o.stdout).into_owned(),
            Err(_) => return RegenStatus::Dirty(format!("shell command `{}` could no longer be run", c.command)),
        };
        if current != c.output {
            return RegenStatus::Dirty(format!("shell command `{}` changed", c.command));
        }
    }
    RegenStatus::Clean
}

/// A content hash of the currently-running kati binary, used to detect a
/// kati upgrade between a `--ninja` run and a later `--regen`.
pub fn compute_binary_hash() -> Option<String> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let exe = std::env::current_exe().ok()?;
    let bytes = std::fs::read(exe).ok()?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Some(format!("{:x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bincode() {
        let mut s = Stamp::new();
        s.record_env("PATH", Some("/usr/bin".into()));
        s.record_glob("*.c", vec!["a.c".into()]);
        let bytes = s.to_bytes().unwrap();
        let back = Stamp::from_bytes(&bytes).unwrap();
        assert_eq!(back.env_vars.get("PATH"), Some(&Some("/usr/bin".to_string())));
        assert_eq!(back.globs.len(), 1);
    }

    #[test]
    fn dirty_when_env_var_changed() {
        let mut s = Stamp::new();
        s.record_env("KATI_TEST_STAMP_VAR_DOES_NOT_EXIST", Some("old".into()));
        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: false });
        assert_eq!(status, RegenStatus::Dirty("environment variable KATI_TEST_STAMP_VAR_DOES_NOT_EXIST changed".into()));
    }

    #[test]
    fn clean_when_nothing_recorded() {
        let s = Stamp::new();
        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: false });
        assert_eq!(status, RegenStatus::Clean);
    }

    #[test]
    fn dirty_when_shell_command_output_changed() {
        let mut s = Stamp::new();
        s.record_shell("echo hi", "stale output\n");
        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: false });
        assert_eq!(status, RegenStatus::Dirty("shell command `echo hi` changed".into()));
    }

    #[test]
    fn clean_when_shell_command_output_matches() {
        let mut s = Stamp::new();
        s.record_shell("echo hi", "hi\n");
        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: false });
        assert_eq!(status, RegenStatus::Clean);
    }

    #[test]
    fn new_stamp_records_a_binary_hash() {
        let s = Stamp::new();
        assert!(s.binary_hash.is_some());
    }

    #[test]
    fn dirty_when_binary_hash_differs_unless_ignored() {
        let mut s = Stamp::new();
        s.binary_hash = Some("not-the-real-hash".to_string());
        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: false });
        assert_eq!(status, RegenStatus::Dirty("kati binary changed".into()));

        let status = check_stamp(&s, &RegenOptions { ignore_dirty_patterns: vec![], ignore_kati_binary: true });
        assert_eq!(status, RegenStatus::Clean);
    }
}
