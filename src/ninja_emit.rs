//! Ninja file emission: walks a built [`crate::dep::DepGraph`] and writes
//! `rule`/`build` statements plus a companion shell-script wrapper,
//! mirroring the file-format contract in the external-interfaces section
//! of this crate's design (a ninja file path derived from the suffix/dir
//! flags, plus `ninja<suffix>.sh`).
//!
//! This is the inverse of a ninja *parser*: it only ever writes text, never
//! reads it back.

use std::fmt::Write as _;
use std::io::Write;

use crate::dep::{DepGraph, DepId};
use crate::flags::Flags;

const GENERIC_RULE: &str = "kati_recipe";

#[derive(Debug, thiserror::Error)]
pub enum NinjaEmitError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Writes the full ninja file for `graph` to `out`.
pub fn write_ninja_file(graph: &DepGraph, flags: &Flags, out: &mut impl Write) -> Result<(), NinjaEmitError> {
    writeln!(out, "# Generated by kati. Do not edit.")?;
    writeln!(out, "ninja_required_version = 1.5")?;
    writeln!(out)?;
    writeln!(out, "rule {GENERIC_RULE}")?;
    writeln!(out, "  command = $recipe")?;
    writeln!(out, "  description = $desc")?;
    writeln!(out)?;

    for (id, _node) in graph.iter() {
        write_build_stmt(graph, id, out)?;
    }

    if !graph.default_targets.is_empty() {
        writeln!(out)?;
        write!(out, "default")?;
        for t in &graph.default_targets {
            write!(out, " {}", ninja_escape(t))?;
        }
        writeln!(out)?;
    }

    Ok(())
}

fn write_build_stmt(graph: &DepGraph, id: DepId, out: &mut impl Write) -> Result<(), NinjaEmitError> {
    let node = graph.get(id);
    let deps: Vec<String> = node.prerequisites.iter().map(|&d| ninja_escape(&graph.get(d).target)).collect();
    let order_only: Vec<String> = node.order_only.iter().map(|&d| ninja_escape(&graph.get(d).target)).collect();

    if node.is_phony {
        write!(out, "build {}: phony", ninja_escape(&node.target))?;
        for d in &deps {
            write!(out, " {d}")?;
        }
        writeln!(out)?;
        return Ok(());
    }

    write!(out, "build {}: {GENERIC_RULE}", ninja_escape(&node.target))?;
    for d in &deps {
        write!(out, " {d}")?;
    }
    if !order_only.is_empty() {
        write!(out, " ||")?;
        for d in &order_only {
            write!(out, " {d}")?;
        }
    }
    writeln!(out)?;

    let mut recipe = String::new();
    for (i, line) in node.recipe.iter().enumerate() {
        if i > 0 {
            recipe.push_str(" && ");
        }
        let _ = write!(recipe, "{line}");
    }
    writeln!(out, "  recipe = {}", ninja_escape(&recipe))?;
    writeln!(out, "  desc = building {}", node.target)?;
    if let Some(depfile) = &node.depfile {
        writeln!(out, "  depfile = {depfile}")?;
    }
    if let Some(pool) = &node.ninja_pool {
        writeln!(out, "  pool = {pool}")?;
    }

    Ok(())
}

/// Writes the companion shell-script wrapper: a thin `exec ninja -f <file>
/// "$@"` entry point, the shape kati's generated `ninja.sh` takes.
pub fn write_shell_script(flags: &Flags, out: &mut impl Write) -> Result<(), NinjaEmitError> {
    writeln!(out, "#!/bin/sh")?;
    writeln!(out, "# Generated by kati. Do not edit.")?;
    if let Some(dir) = &flags.working_dir {
        writeln!(out, "cd {}", shell_quote(dir))?;
    }
    writeln!(out, "exec ninja -f {} \"$@\"", shell_quote(&flags.ninja_path()))?;
    Ok(())
}

/// Renders both the ninja file and its wrapper script to disk at the paths
/// derived from `flags`.
pub fn generate(graph: &DepGraph, flags: &Flags) -> Result<(), NinjaEmitError> {
    let mut ninja_text = String::new();
    write_ninja_file(graph, flags, &mut ninja_text)?;
    std::fs::write(flags.ninja_path(), ninja_text)?;

    let mut script_text = String::new();
    write_shell_script(flags, &mut script_text)?;
    let script_path = flags.ninja_shell_script_path();
    std::fs::write(&script_path, script_text)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms)?;
    }

    Ok(())
}

fn ninja_escape(s: &str) -> String {
    s.replace('$', "$$").replace(':', "$:").replace(' ', "$ ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep::GraphBuilder;
    use crate::loc::Loc;
    use crate::rule::Rule;
    use smol_str::SmolStr;

    fn rule(target: &str, deps: &[&str], recipe: &[&str]) -> Rule {
        Rule {
            target: SmolStr::new(target),
            is_double_colon: false,
            prerequisites: deps.iter().map(|s| SmolStr::new(*s)).collect(),
            order_only: Vec::new(),
            recipe: recipe.iter().map(|s| SmolStr::new(*s)).collect(),
            is_pattern: false,
            is_suffix: false,
            loc: Loc::unknown(),
        }
    }

    #[test]
    fn emits_build_statement_with_recipe() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["a.o"], &[]));
        b.add_rule(rule("a.o", &[], &["cc -c a.c -o a.o"]));
        b.set_default_targets(vec!["all".into()]);
        let graph = b.build().unwrap();
        let flags = Flags::default();
        let mut out = String::new();
        write_ninja_file(&graph, &flags, &mut out).unwrap();
        assert!(out.contains("build a.o: kati_recipe"));
        assert!(out.contains("recipe = cc -c a.c -o a.o"));
        assert!(out.contains("default all"));
    }

    #[test]
    fn emits_depfile_and_pool_from_target_scope() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &[], &["cc -MD -c a.c -o all"]));
        b.add_target_scope(
            "all".into(),
            crate::dep::TargetScope { depfile: Some("all.d".into()), ninja_pool: Some("link_pool".into()), ..Default::default() },
        );
        b.set_default_targets(vec!["all".into()]);
        let graph = b.build().unwrap();
        let flags = Flags::default();
        let mut out = String::new();
        write_ninja_file(&graph, &flags, &mut out).unwrap();
        assert!(out.contains("depfile = all.d"));
        assert!(out.contains("pool = link_pool"));
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(ninja_escape("a b"), "a$ b");
        assert_eq!(ninja_escape("a:b"), "a$:b");
    }
}
