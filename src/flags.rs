//! The shared configuration surface threaded through evaluation, execution
//! and ninja generation. One `Flags` value is built once at the CLI
//! boundary and passed down by reference, rather than kept as a process
//! global.

/// Runtime configuration mirroring the external interface in spec.md §6.
/// The CLI crate is responsible for populating this from argv/`MAKEFLAGS`;
/// this crate only defines the shape and a few derived helpers.
#[derive(Debug, Clone)]
pub struct Flags {
    pub makefile: Option<String>,
    pub working_dir: Option<String>,
    pub is_syntax_check_only: bool,
    pub is_dry_run: bool,
    pub generate_ninja: bool,
    pub regen: bool,
    pub regen_debug: bool,
    pub regen_ignoring_kati_binary: bool,
    pub dump_kati_stamp: bool,

    pub ignore_optional_include_pattern: Option<String>,
    pub ignore_dirty_pattern: Option<String>,
    pub no_ignore_dirty_pattern: Option<String>,
    pub writable: Vec<String>,

    pub use_find_emulator: bool,
    pub goma_dir: Option<String>,
    pub ninja_suffix: String,
    pub ninja_dir: Option<String>,
    pub num_jobs: usize,
    pub remote_num_jobs: usize,

    pub color_warnings: bool,
    pub werror_find_emulator: bool,
    pub werror_overriding_commands: bool,
    pub warn_implicit_rules: bool,
    pub werror_implicit_rules: bool,
    pub warn_suffix_rules: bool,
    pub werror_suffix_rules: bool,

    /// `VAR=value` arguments from argv, applied as command-line-origin
    /// variables (highest precedence except readonly).
    pub cl_vars: Vec<(String, String)>,
    /// Bare-word arguments from argv: explicit build goals.
    pub targets: Vec<String>,
}

impl Default for Flags {
    fn default() -> Self {
        Flags {
            makefile: None,
            working_dir: None,
            is_syntax_check_only: false,
            is_dry_run: false,
            generate_ninja: false,
            regen: false,
            regen_debug: false,
            regen_ignoring_kati_binary: false,
            dump_kati_stamp: false,
            ignore_optional_include_pattern: None,
            ignore_dirty_pattern: None,
            no_ignore_dirty_pattern: None,
            writable: Vec::new(),
            use_find_emulator: false,
            goma_dir: None,
            ninja_suffix: String::new(),
            ninja_dir: None,
            num_jobs: 1,
            remote_num_jobs: 1,
            color_warnings: false,
            werror_find_emulator: false,
            werror_overriding_commands: false,
            warn_implicit_rules: false,
            werror_implicit_rules: false,
            warn_suffix_rules: false,
            werror_suffix_rules: false,
            cl_vars: Vec::new(),
            targets: Vec::new(),
        }
    }
}

impl Flags {
    /// Parses `MAKEFLAGS`-style tokens (space-separated, non-flag tokens
    /// containing `=`) into command-line variable assignments, matching
    /// the bootstrap order in spec.md §6: `MAKEFLAGS` is parsed before argv.
    pub fn parse_makeflags(makeflags: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for tok in makeflags.split_ascii_whitespace() {
            if tok.starts_with('-') {
                continue;
            }
            if let Some((k, v)) = tok.split_once('=') {
                out.push((k.to_string(), v.to_string()));
            }
        }
        out
    }

    /// The stamp file path derived from `--ninja_dir`/`--ninja_suffix`.
    pub fn stamp_path(&self) -> String {
        let dir = self.ninja_dir.as_deref().unwrap_or(".");
        format!("{dir}/ninja{}.stamp", self.ninja_suffix)
    }

    /// The ninja output file path derived from `--ninja_dir`/`--ninja_suffix`.
    pub fn ninja_path(&self) -> String {
        let dir = self.ninja_dir.as_deref().unwrap_or(".");
        format!("{dir}/ninja{}.ninja", self.ninja_suffix)
    }

    /// The companion shell-script wrapper path.
    pub fn ninja_shell_script_path(&self) -> String {
        let dir = self.ninja_dir.as_deref().unwrap_or(".");
        format!("{dir}/ninja{}.sh", self.ninja_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_makeflags_tokens() {
        let parsed = Flags::parse_makeflags("-j4 FOO=bar -s BAZ=qux");
        assert_eq!(parsed, vec![("FOO".to_string(), "bar".to_string()), ("BAZ".to_string(), "qux".to_string())]);
    }

    #[test]
    fn default_paths_use_current_dir() {
        let f = Flags { ninja_suffix: "_test".to_string(), ..Default::default() };
        assert_eq!(f.ninja_path(), "./ninja_test.ninja");
        assert_eq!(f.stamp_path(), "./ninja_test.stamp");
    }
}
