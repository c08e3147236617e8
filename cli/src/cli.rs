use clap::Parser;

/// A GNU-make-compatible evaluator, direct executor and ninja generator.
#[derive(Debug, Parser)]
#[clap(name = "kati", version, author, rename_all = "snake_case")]
pub struct Args {
    /// Read FILE as the makefile.
    #[clap(short = 'f', value_name = "FILE")]
    pub makefile: Option<String>,

    /// Change to DIR before doing anything else.
    #[clap(short = 'C', value_name = "DIR")]
    pub chdir: Option<String>,

    /// Syntax check only; do not build or generate anything.
    #[clap(short = 'c')]
    pub syntax_check_only: bool,

    /// Generate a ninja build file instead of building directly.
    #[clap(long)]
    pub ninja: bool,

    /// Check whether a previously generated ninja file is still valid,
    /// regenerating it if any recorded input changed.
    #[clap(long)]
    pub regen: bool,

    /// Skip the kati-binary identity check during `--regen`.
    #[clap(long)]
    pub regen_ignoring_kati_binary: bool,

    /// Print the stamp file used by `--regen` and exit.
    #[clap(long)]
    pub dump_kati_stamp: bool,

    /// Glob patterns matching optional includes that may be missing.
    #[clap(long, value_name = "PATTERN")]
    pub ignore_optional_include: Option<String>,

    /// Glob patterns of inputs to ignore when checking staleness.
    #[clap(long, value_name = "PATTERN")]
    pub ignore_dirty: Option<String>,

    /// Glob patterns of inputs that should NOT be ignored (overrides `--ignore_dirty`).
    #[clap(long, value_name = "PATTERN")]
    pub no_ignore_dirty: Option<String>,

    /// Directory prefixes whose outputs are writable by recipes; may repeat.
    #[clap(long, value_name = "PREFIX")]
    pub writable: Vec<String>,

    /// Emulate `find`/`findleaves.py` shell pipelines instead of shelling out.
    #[clap(long)]
    pub use_find_emulator: bool,

    /// Directory holding a goma compiler wrapper, if any.
    #[clap(long, value_name = "PATH")]
    pub goma_dir: Option<String>,

    /// Suffix appended to the generated ninja file and stamp names.
    #[clap(long, value_name = "SUFFIX", default_value = "")]
    pub ninja_suffix: String,

    /// Directory the generated ninja file and stamp are written into.
    #[clap(long, value_name = "DIR")]
    pub ninja_dir: Option<String>,

    /// Number of local jobs to run in parallel.
    #[clap(short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Number of remote jobs to run in parallel.
    #[clap(long, value_name = "N")]
    pub remote_num_jobs: Option<usize>,

    /// Color `warning:`/`error:` labels.
    #[clap(long)]
    pub color_warnings: bool,

    #[clap(long)]
    pub werror_find_emulator: bool,
    #[clap(long)]
    pub werror_overriding_commands: bool,
    #[clap(long)]
    pub warn_implicit_rules: bool,
    #[clap(long)]
    pub werror_implicit_rules: bool,
    #[clap(long)]
    pub warn_suffix_rules: bool,
    #[clap(long)]
    pub werror_suffix_rules: bool,

    /// `VAR=value` command-line assignments and bare build-goal targets.
    pub free_args: Vec<String>,
}

impl Args {
    /// Splits [`Self::free_args`] into `VAR=value` assignments and bare
    /// target names, in source order.
    pub fn split_free_args(&self) -> (Vec<(String, String)>, Vec<String>) {
        let mut vars = Vec::new();
        let mut targets = Vec::new();
        for arg in &self.free_args {
            if let Some((k, v)) = arg.split_once('=') {
                vars.push((k.to_string(), v.to_string()));
            } else {
                targets.push(arg.clone());
            }
        }
        (vars, targets)
    }
}
