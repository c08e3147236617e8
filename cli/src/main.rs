use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use kati::eval::{FindEmulatingEvalIo, OsEvalIo};
use kati::progress::DumbConsoleProgress;
use kati::rule::{merge_rules, split_static_pattern_rules};
use kati::stamp::{check_stamp, RegenOptions, RegenStatus, Stamp};
use kati::symtab::Symtab;
use kati::{DepGraph, Evaluator, ExecConfig, Executor, Flags, GraphBuilder};
use tracing::{error, warn};

mod cli;
mod recording;

use cli::Args;
use recording::RecordingEvalIo;

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let args = Args::parse();

    if let Some(dir) = &args.chdir {
        if let Err(e) = std::env::set_current_dir(dir) {
            error!(%dir, %e, "failed to change directory");
            return ExitCode::FAILURE;
        }
    }

    let flags = build_flags(&args);

    if flags.dump_kati_stamp {
        return dump_stamp(&flags);
    }

    if flags.regen {
        match regen_status(&flags) {
            Ok(RegenStatus::Clean) => {
                println!("No need to regenerate ninja file");
                return ExitCode::SUCCESS;
            }
            Ok(RegenStatus::Dirty(reason)) => {
                println!("Regenerating: {reason}");
            }
            Err(e) => {
                warn!(%e, "could not read existing stamp, regenerating unconditionally");
            }
        }
    }

    let (graph, stamp) = match evaluate(&flags) {
        Ok(v) => v,
        Err(code) => return code,
    };

    if flags.is_syntax_check_only {
        return ExitCode::SUCCESS;
    }

    if flags.generate_ninja || flags.regen {
        if let Err(e) = kati::ninja_emit::generate(&graph, &flags) {
            error!(%e, "failed to write ninja file");
            return ExitCode::FAILURE;
        }
        if let Err(e) = stamp.save(Path::new(&flags.stamp_path())) {
            error!(%e, "failed to write stamp file");
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    run_build(&graph, &flags)
}

/// Builds the shared [`Flags`] value from argv and `MAKEFLAGS`, matching
/// the bootstrap order: `MAKEFLAGS` tokens are parsed before argv, and
/// argv's own `VAR=value` arguments take final precedence.
fn build_flags(args: &Args) -> Flags {
    let (cl_vars_from_argv, targets) = args.split_free_args();
    let makeflags_env = std::env::var("MAKEFLAGS").unwrap_or_default();
    let mut cl_vars = Flags::parse_makeflags(&makeflags_env);
    cl_vars.extend(cl_vars_from_argv);

    Flags {
        makefile: args.makefile.clone(),
        working_dir: std::env::current_dir().ok().map(|p| p.to_string_lossy().into_owned()),
        is_syntax_check_only: args.syntax_check_only,
        is_dry_run: false,
        generate_ninja: args.ninja,
        regen: args.regen,
        regen_debug: false,
        regen_ignoring_kati_binary: args.regen_ignoring_kati_binary,
        dump_kati_stamp: args.dump_kati_stamp,
        ignore_optional_include_pattern: args.ignore_optional_include.clone(),
        ignore_dirty_pattern: args.ignore_dirty.clone(),
        no_ignore_dirty_pattern: args.no_ignore_dirty.clone(),
        writable: args.writable.clone(),
        use_find_emulator: args.use_find_emulator,
        goma_dir: args.goma_dir.clone(),
        ninja_suffix: args.ninja_suffix.clone(),
        ninja_dir: args.ninja_dir.clone(),
        num_jobs: args.jobs.unwrap_or(1).max(1),
        remote_num_jobs: args.remote_num_jobs.unwrap_or(1).max(1),
        color_warnings: args.color_warnings,
        werror_find_emulator: args.werror_find_emulator,
        werror_overriding_commands: args.werror_overriding_commands,
        warn_implicit_rules: args.warn_implicit_rules,
        werror_implicit_rules: args.werror_implicit_rules,
        warn_suffix_rules: args.warn_suffix_rules,
        werror_suffix_rules: args.werror_suffix_rules,
        cl_vars,
        targets,
    }
}

fn dump_stamp(flags: &Flags) -> ExitCode {
    match Stamp::load(Path::new(&flags.stamp_path())) {
        Ok(stamp) => {
            println!("{stamp:#?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(%e, "failed to load stamp file");
            ExitCode::FAILURE
        }
    }
}

fn regen_status(flags: &Flags) -> Result<RegenStatus, kati::stamp::StampError> {
    let stamp = Stamp::load(Path::new(&flags.stamp_path()))?;
    let opts = RegenOptions {
        ignore_dirty_patterns: flags.ignore_dirty_pattern.iter().cloned().collect(),
        ignore_kati_binary: flags.regen_ignoring_kati_binary,
    };
    Ok(check_stamp(&stamp, &opts))
}

/// Bootstrap variables and suffix rules injected before the real makefile
/// is read, matching `make`'s own builtin environment.
fn bootstrap_makefile(flags: &Flags) -> String {
    let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let cxx = std::env::var("CXX").unwrap_or_else(|_| "c++".to_string());
    let ar = std::env::var("AR").unwrap_or_else(|_| "ar".to_string());
    let kati_bin = std::env::current_exe().ok().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
    let curdir = flags.working_dir.clone().unwrap_or_default();
    let goals = flags.targets.join(" ");
    format!(
        "CC ?= {cc}\n\
         CXX ?= {cxx}\n\
         AR ?= {ar}\n\
         MAKE := make\n\
         MAKE_VERSION := 4.2.1\n\
         KATI := {kati_bin}\n\
         SHELL := /bin/sh\n\
         MAKECMDGOALS := {goals}\n\
         CURDIR := {curdir}\n\
         .c.o:\n\t$(CC) -c $< -o $@\n\
         .cc.o:\n\t$(CXX) -c $< -o $@\n"
    )
}

fn evaluate(flags: &Flags) -> Result<(DepGraph, Stamp), ExitCode> {
    let find_io = FindEmulatingEvalIo::new(OsEvalIo, flags.use_find_emulator, flags.werror_find_emulator);
    let io = Rc::new(RecordingEvalIo::wrapping(find_io));
    for (k, v) in std::env::vars() {
        io.record_env(&k, Some(v));
    }

    let symtab = Rc::new(Symtab::new());
    let mut ev = Evaluator::new(symtab, io.clone());
    ev.bootstrap_environment(std::env::vars(), &flags.cl_vars);

    if let Err(e) = ev.eval_text_as_statements(&bootstrap_makefile(flags)) {
        error!(%e, "failed to evaluate bootstrap makefile");
        return Err(ExitCode::FAILURE);
    }

    let makefile_path = flags.makefile.clone().unwrap_or_else(|| "Makefile".to_string());
    let text = match ev.world().read_file(&makefile_path) {
        Ok(t) => t,
        Err(e) => {
            error!(path = %makefile_path, %e, "failed to read makefile");
            return Err(ExitCode::FAILURE);
        }
    };
    if let Err(e) = ev.eval_file(&text, &makefile_path) {
        error!(%e, "evaluation failed");
        return Err(ExitCode::FAILURE);
    }

    ev.apply_exports();

    for diag in &ev.diagnostics {
        eprintln!("{diag}");
    }

    let static_patterns = split_static_pattern_rules(&ev.rules);
    let rules = merge_rules(&ev.rules);
    let syntax_check_only = flags.is_syntax_check_only;
    let target_scopes = std::mem::take(&mut ev.target_scopes);
    drop(ev);
    let stamp = Rc::try_unwrap(io).map(RecordingEvalIo::into_stamp).unwrap_or_default();

    if syntax_check_only {
        return Ok((GraphBuilder::new().build().expect("empty graph always builds"), stamp));
    }

    let mut gb = GraphBuilder::new();
    for r in rules {
        gb.add_rule(r);
    }
    for spr in static_patterns {
        gb.add_static_pattern(spr);
    }
    for (target, scope) in target_scopes {
        gb.add_target_scope(target, scope);
    }
    if !flags.targets.is_empty() {
        gb.set_default_targets(flags.targets.iter().map(smol_str::SmolStr::new).collect());
    }
    let graph = match gb.build() {
        Ok(g) => g,
        Err(e) => {
            error!(%e, "failed to build dependency graph");
            return Err(ExitCode::FAILURE);
        }
    };

    Ok((graph, stamp))
}

fn run_build(graph: &DepGraph, flags: &Flags) -> ExitCode {
    let cfg = ExecConfig { parallelism: flags.num_jobs };
    let progress = DumbConsoleProgress;

    let mut executor = Executor::new(&cfg, graph, &progress);
    let roots: Vec<_> = graph.default_targets.iter().filter_map(|t| graph.lookup(t)).collect();
    executor.want(roots);
    match executor.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "build failed");
            ExitCode::FAILURE
        }
    }
}
