//! The find emulator: a restricted recognizer for `find`/`findleaves.py`
//! shell pipelines, executed against either the real filesystem or an
//! in-memory virtual tree (for tests and for stamp-file replay).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lexically normalizes a path: collapses `.`, resolves `..` against
/// preceding components, and removes duplicate slashes. Does not touch the
/// filesystem (unlike `canonicalize`, it works on paths that may not exist
/// yet, which `$(abspath)` requires).
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if matches!(stack.last(), Some(top) if *top != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Matches `name` against a shell glob `pattern` (`*`, `?`, `[...]`), the
/// subset GNU make's `$(wildcard)` and this crate's find emulator need.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn do_match(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => do_match(&p[1..], n) || (!n.is_empty() && do_match(p, &n[1..])),
            (Some('?'), Some(_)) => do_match(&p[1..], &n[1..]),
            (Some('['), _) if p.len() > 1 => {
                if let Some(close) = p.iter().position(|&c| c == ']') {
                    if close > 0 && !n.is_empty() {
                        let class = &p[1..close];
                        let (negate, class) = if class.first() == Some(&'!') { (true, &class[1..]) } else { (false, class) };
                        let matched = class.contains(&n[0]);
                        if matched != negate {
                            return do_match(&p[close + 1..], &n[1..]);
                        }
                    }
                    false
                } else {
                    !n.is_empty() && p[0] == n[0] && do_match(&p[1..], &n[1..])
                }
            }
            (Some(pc), Some(nc)) if pc == nc => do_match(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    do_match(&p, &n)
}

/// Expands a glob pattern against the real filesystem, splitting on `/`
/// and matching one path component at a time so a pattern like
/// `src/*/mod.rs` only lists the directories that actually contain a
/// matching entry.
pub fn glob(pattern: &str) -> std::io::Result<Vec<String>> {
    let absolute = pattern.starts_with('/');
    let components: Vec<&str> = pattern.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let base = if absolute { PathBuf::from("/") } else { PathBuf::from(".") };
    let mut results = expand(&base, &components)?;
    results.sort();
    Ok(results.into_iter().map(|p| p.to_string_lossy().into_owned()).collect())
}

fn expand(base: &Path, remaining: &[&str]) -> std::io::Result<Vec<PathBuf>> {
    let Some((first, rest)) = remaining.split_first() else {
        return Ok(vec![base.to_path_buf()]);
    };
    if !first.contains(['*', '?', '[']) {
        let next = base.join(first);
        if rest.is_empty() {
            return Ok(if next.exists() { vec![next] } else { Vec::new() });
        }
        return expand(&next, rest);
    }
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(base) {
        Ok(e) => e,
        Err(_) => return Ok(out),
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.') && !first.starts_with('.') {
            continue;
        }
        if glob_match(first, &name_str) {
            let next = base.join(&name);
            if rest.is_empty() {
                out.push(next);
            } else {
                out.extend(expand(&next, rest)?);
            }
        }
    }
    Ok(out)
}

/// Names `find`'s lazily-constructed tree never descends into: version
/// control metadata and the usual output directory.
const SKIPPED_NAMES: &[&str] = &[".git", ".repo", "out"];

/// A boolean predicate over a directory entry's basename and type letter
/// (`f`/`d`/`l`/... as `find -type` spells them), used for both
/// `print_cond` and `prune_cond`.
#[derive(Debug, Clone)]
pub enum Cond {
    Name(String),
    Type(char),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    pub fn eval(&self, name: &str, dtype: char) -> bool {
        match self {
            Cond::Name(pat) => glob_match(pat, name),
            Cond::Type(t) => *t == dtype,
            Cond::Not(c) => !c.eval(name, dtype),
            Cond::And(a, b) => a.eval(name, dtype) && b.eval(name, dtype),
            Cond::Or(a, b) => a.eval(name, dtype) || b.eval(name, dtype),
        }
    }
}

/// Which grammar arm a parsed command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindKind {
    Find,
    FindLeaves,
}

impl Default for FindKind {
    fn default() -> Self {
        FindKind::Find
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindCommand {
    pub kind: FindKind,
    pub roots: Vec<String>,
    pub follow_symlinks: bool,
    /// `if [ -d <dir> ]; then ... fi` / `test -d <dir> && ...`: the whole
    /// command is a no-op (empty output, success) when this dir is absent.
    pub testdir: Option<String>,
    pub mindepth: Option<i32>,
    pub maxdepth: Option<u32>,
    pub print_cond: Option<Cond>,
    pub prune_cond: Option<Cond>,
}

#[derive(Debug, thiserror::Error)]
pub enum FindParseError {
    #[error("unsupported find expression: {0}")]
    Unsupported(String),
}

/// Parses a `find` invocation's argv (`argv[0] == "find"`) against the
/// grammar in the find-emulator section: `['-L'] {dir} [-maxdepth N]
/// [pred_expr ['-prune' '-o' pred_expr]] ['-print']`.
pub fn parse_find_command(argv: &[&str]) -> Result<FindCommand, FindParseError> {
    let mut cmd = FindCommand { kind: FindKind::Find, ..Default::default() };
    let mut i = 1; // argv[0] is "find"
    if argv.get(i) == Some(&"-L") {
        cmd.follow_symlinks = true;
        i += 1;
    }
    while i < argv.len() && !argv[i].starts_with('-') {
        cmd.roots.push(argv[i].to_string());
        i += 1;
    }
    if cmd.roots.is_empty() {
        cmd.roots.push(".".to_string());
    }

    let mut rest: Vec<&str> = Vec::new();
    while i < argv.len() {
        match argv[i] {
            "-maxdepth" => {
                i += 1;
                let n: u32 =
                    argv.get(i).and_then(|s| s.parse().ok()).ok_or_else(|| FindParseError::Unsupported("-maxdepth".into()))?;
                cmd.maxdepth = Some(n);
            }
            "2>" => {
                i += 1; // skip the redirect target, e.g. /dev/null
            }
            other => rest.push(other),
        }
        i += 1;
    }

    let (prune_part, print_part): (Option<&[&str]>, &[&str]) = match find_top_level(&rest, "-prune") {
        Some(p) => {
            let after = &rest[p + 1..];
            let after = match after.first() {
                Some(&"-o") | Some(&"-or") => &after[1..],
                _ => return Err(FindParseError::Unsupported("-prune without a following -o".into())),
            };
            (Some(&rest[..p]), after)
        }
        None => (None, &rest[..]),
    };
    let print_part = strip_trailing(print_part, "-print");

    cmd.prune_cond = match prune_part {
        Some(p) if !p.is_empty() => Some(parse_pred_expr(p)?),
        _ => None,
    };
    cmd.print_cond = if print_part.is_empty() { None } else { Some(parse_pred_expr(print_part)?) };
    Ok(cmd)
}

/// Parses a `findleaves.py` invocation's argv: `[--prune=name |
/// --mindepth=N]* <dir>... <pattern>` — dirs first, the file-name pattern
/// to search for last.
pub fn parse_findleaves_command(argv: &[&str]) -> Result<FindCommand, FindParseError> {
    let mut cmd = FindCommand { kind: FindKind::FindLeaves, ..Default::default() };
    let mut positionals: Vec<&str> = Vec::new();
    for tok in &argv[1..] {
        if let Some(name) = tok.strip_prefix("--prune=") {
            let cond = Cond::Name(name.to_string());
            cmd.prune_cond = Some(match cmd.prune_cond.take() {
                Some(existing) => Cond::Or(Box::new(existing), Box::new(cond)),
                None => cond,
            });
        } else if let Some(n) = tok.strip_prefix("--mindepth=") {
            let d: i32 = n.parse().map_err(|_| FindParseError::Unsupported(format!("--mindepth={n}")))?;
            cmd.mindepth = Some(d);
        } else if let Some(rest) = tok.strip_prefix("--") {
            return Err(FindParseError::Unsupported(format!("--{rest}")));
        } else {
            positionals.push(tok);
        }
    }
    if positionals.len() < 2 {
        return Err(FindParseError::Unsupported("findleaves.py needs at least one directory and a pattern".into()));
    }
    let pattern = positionals.pop().expect("checked len above");
    cmd.print_cond = Some(Cond::Name(pattern.to_string()));
    cmd.roots = positionals.into_iter().map(str::to_string).collect();
    Ok(cmd)
}

fn strip_trailing<'a>(tokens: &'a [&'a str], marker: &str) -> &'a [&'a str] {
    if tokens.last() == Some(&marker) {
        &tokens[..tokens.len() - 1]
    } else {
        tokens
    }
}

fn find_top_level(tokens: &[&str], target: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, tok) in tokens.iter().enumerate() {
        match *tok {
            "(" | "\\(" => depth += 1,
            ")" | "\\)" => depth -= 1,
            t if depth == 0 && t == target => return Some(idx),
            _ => {}
        }
    }
    None
}

/// `pred_expr := term { ('-o'|'-or') term }`
fn parse_pred_expr(tokens: &[&str]) -> Result<Cond, FindParseError> {
    let mut pos = 0;
    let cond = parse_or(tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(FindParseError::Unsupported(format!("trailing tokens in predicate: {:?}", &tokens[pos..])));
    }
    Ok(cond)
}

fn parse_or(tokens: &[&str], pos: &mut usize) -> Result<Cond, FindParseError> {
    let mut cond = parse_and(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(&"-o") | Some(&"-or")) {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        cond = Cond::Or(Box::new(cond), Box::new(rhs));
    }
    Ok(cond)
}

/// `term := fact { ['-a'|'-and'] fact }` — a bare fact after another fact is
/// an implicit `-a`, same as real `find`.
fn parse_and(tokens: &[&str], pos: &mut usize) -> Result<Cond, FindParseError> {
    let mut cond = parse_fact(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(&"-a") | Some(&"-and") => {
                *pos += 1;
                let rhs = parse_fact(tokens, pos)?;
                cond = Cond::And(Box::new(cond), Box::new(rhs));
            }
            Some(&")") | Some(&"\\)") | Some(&"-o") | Some(&"-or") | None => break,
            _ => {
                let rhs = parse_fact(tokens, pos)?;
                cond = Cond::And(Box::new(cond), Box::new(rhs));
            }
        }
    }
    Ok(cond)
}

fn parse_fact(tokens: &[&str], pos: &mut usize) -> Result<Cond, FindParseError> {
    match tokens.get(*pos) {
        Some(&"-not") | Some(&"!") | Some(&"\\!") => {
            *pos += 1;
            let inner = parse_fact(tokens, pos)?;
            Ok(Cond::Not(Box::new(inner)))
        }
        Some(&"(") | Some(&"\\(") => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(&")") | Some(&"\\)") => {
                    *pos += 1;
                    Ok(inner)
                }
                other => Err(FindParseError::Unsupported(format!("unbalanced parens, found {other:?}"))),
            }
        }
        Some(&"-name") => {
            *pos += 1;
            let pat = *tokens.get(*pos).ok_or_else(|| FindParseError::Unsupported("-name with no pattern".into()))?;
            *pos += 1;
            Ok(Cond::Name(pat.to_string()))
        }
        Some(&"-type") => {
            *pos += 1;
            let t = *tokens.get(*pos).ok_or_else(|| FindParseError::Unsupported("-type with no argument".into()))?;
            *pos += 1;
            match t {
                "b" | "c" | "d" | "p" | "l" | "f" | "s" => Ok(Cond::Type(t.chars().next().unwrap())),
                other => Err(FindParseError::Unsupported(format!("-type {other}"))),
            }
        }
        other => Err(FindParseError::Unsupported(format!("unexpected token in predicate: {other:?}"))),
    }
}

fn print_if_necessary(cmd: &FindCommand, path: &str, dtype: char, depth: u32, out: &mut Vec<String>) {
    if let Some(cond) = &cmd.print_cond {
        let name = path.rsplit('/').next().unwrap_or(path);
        if !cond.eval(name, dtype) {
            return;
        }
    }
    if let Some(min) = cmd.mindepth {
        if (depth as i32) < min {
            return;
        }
    }
    out.push(path.to_string());
}

/// Runs `cmd` against the real filesystem, mirroring [`VirtualTree::walk`]'s
/// traversal order and filters but reading directories with `std::fs`
/// instead of an in-memory tree.
pub fn find_on_filesystem(cmd: &FindCommand) -> Vec<String> {
    if let Some(testdir) = &cmd.testdir {
        if !std::path::Path::new(testdir).is_dir() {
            return Vec::new();
        }
    }
    fn walk(path: &str, cmd: &FindCommand, depth: u32, out: &mut Vec<String>) {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(_) => return,
        };
        if meta.file_type().is_symlink() {
            if cmd.follow_symlinks {
                match std::fs::metadata(path) {
                    Ok(resolved) if resolved.is_dir() => {
                        let name = path.rsplit('/').next().unwrap_or(path);
                        walk_dir(path, name, 'd', cmd, depth, out);
                    }
                    Ok(_) => print_if_necessary(cmd, path, 'f', depth, out),
                    Err(_) => print_if_necessary(cmd, path, 'l', depth, out),
                }
            } else {
                print_if_necessary(cmd, path, 'l', depth, out);
            }
            return;
        }
        if meta.is_dir() {
            let name = path.rsplit('/').next().unwrap_or(path);
            walk_dir(path, name, 'd', cmd, depth, out);
        } else {
            print_if_necessary(cmd, path, 'f', depth, out);
        }
    }

    fn walk_dir(path: &str, name: &str, dtype: char, cmd: &FindCommand, depth: u32, out: &mut Vec<String>) {
        if let Some(prune) = &cmd.prune_cond {
            if prune.eval(name, dtype) {
                if cmd.kind != FindKind::FindLeaves {
                    out.push(path.to_string());
                }
                return;
            }
        }
        print_if_necessary(cmd, path, dtype, depth, out);
        if let Some(max) = cmd.maxdepth {
            if depth >= max {
                return;
            }
        }
        let Ok(entries) = std::fs::read_dir(path) else { return };
        let mut children: Vec<(String, bool)> = Vec::new();
        for entry in entries.flatten() {
            let child_name = entry.file_name().to_string_lossy().into_owned();
            if SKIPPED_NAMES.contains(&child_name.as_str()) {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            children.push((child_name, is_dir));
        }
        children.sort();

        if cmd.kind == FindKind::FindLeaves {
            let before = out.len();
            for (child_name, _) in children.iter().filter(|(_, is_dir)| !is_dir) {
                walk(&format!("{path}/{child_name}"), cmd, depth + 1, out);
                if out.len() != before {
                    return;
                }
            }
            for (child_name, _) in children.iter().filter(|(_, is_dir)| *is_dir) {
                walk(&format!("{path}/{child_name}"), cmd, depth + 1, out);
            }
        } else {
            for (child_name, _) in &children {
                walk(&format!("{path}/{child_name}"), cmd, depth + 1, out);
            }
        }
    }

    let mut out = Vec::new();
    for root in &cmd.roots {
        walk(root, cmd, 0, &mut out);
    }
    out.sort();
    out
}

/// Recognizes a `$(shell ...)` command string as a supported `find` or
/// `findleaves.py` pipeline (spec grammar: `[cd <dir> (;|&&)] [if '['
/// test ']' ; then] (find|findleaves) [fi]`), returning the optional chdir
/// directory and the parsed command. Returns `None` (not an error) for
/// anything outside the restricted grammar, so the caller can fall back to
/// a real subprocess — or, under `--werror_find_emulator`, treat that
/// fallback as fatal instead.
pub fn try_parse_shell_as_find(command: &str) -> Option<(Option<String>, FindCommand)> {
    let command = command.trim();
    let tokens = shlex::split(command)?;
    let mut toks: &[String] = &tokens;

    let mut chdir = None;
    if toks.first().map(String::as_str) == Some("cd") {
        let dir = toks.get(1)?;
        let sep = toks.get(2)?.as_str();
        if sep != ";" && sep != "&&" {
            return None;
        }
        chdir = Some(dir.clone());
        toks = toks.get(3..)?;
    }

    let mut testdir = None;
    let mut wrapped_in_if = false;
    if toks.first().map(String::as_str) == Some("if") {
        if toks.get(1).map(String::as_str) != Some("[")
            || toks.get(2).map(String::as_str) != Some("-d")
            || toks.get(4).map(String::as_str) != Some("]")
            || toks.get(5).map(String::as_str) != Some(";")
            || toks.get(6).map(String::as_str) != Some("then")
        {
            return None;
        }
        testdir = Some(toks.get(3)?.clone());
        wrapped_in_if = true;
        toks = toks.get(7..)?;
    } else if toks.first().map(String::as_str) == Some("test") {
        if toks.get(1).map(String::as_str) != Some("-d") || toks.get(3).map(String::as_str) != Some("&&") {
            return None;
        }
        testdir = Some(toks.get(2)?.clone());
        toks = toks.get(4..)?;
    }

    let mut body: &[String] = if wrapped_in_if {
        if toks.last().map(String::as_str) != Some("fi") {
            return None;
        }
        toks.get(..toks.len() - 1)?
    } else {
        toks
    };
    if wrapped_in_if && body.last().map(String::as_str) == Some(";") {
        body = &body[..body.len() - 1];
    }

    let argv: Vec<&str> = body.iter().map(String::as_str).collect();
    let mut cmd = match argv.first() {
        Some(&"find") => parse_find_command(&argv).ok()?,
        Some(s) if s.ends_with("findleaves.py") => parse_findleaves_command(&argv).ok()?,
        _ => return None,
    };
    cmd.testdir = testdir;
    Some((chdir, cmd))
}

/// A node in the in-memory directory tree used for tests and for replaying
/// a stamp's recorded find results without touching the real filesystem.
#[derive(Debug, Clone)]
pub enum VNode {
    File,
    Dir(BTreeMap<String, VNode>),
    /// A symlink to another path in the same tree (possibly dangling).
    Symlink(String),
}

#[derive(Debug, Default)]
pub struct VirtualTree {
    root: BTreeMap<String, VNode>,
}

impl VirtualTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str) {
        self.insert(path, VNode::File);
    }

    pub fn add_dir(&mut self, path: &str) {
        self.insert(path, VNode::Dir(BTreeMap::new()));
    }

    pub fn add_symlink(&mut self, path: &str, target: &str) {
        self.insert(path, VNode::Symlink(target.to_string()));
    }

    fn insert(&mut self, path: &str, leaf: VNode) {
        let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut cur = &mut self.root;
        for (i, part) in parts.iter().enumerate() {
            if i + 1 == parts.len() {
                cur.insert(part.to_string(), leaf.clone());
            } else {
                let entry = cur.entry(part.to_string()).or_insert_with(|| VNode::Dir(BTreeMap::new()));
                match entry {
                    VNode::Dir(children) => cur = children,
                    VNode::File | VNode::Symlink(_) => return,
                }
            }
        }
    }

    /// Executes `cmd` against this tree, returning matching paths in
    /// deterministic (sorted, `BTreeMap`-backed) order. If `cmd.testdir` is
    /// set and absent from the tree, returns no results (a successful
    /// no-op, matching the shell's own `if`/`test` guard).
    pub fn run(&self, cmd: &FindCommand) -> Vec<String> {
        if let Some(testdir) = &cmd.testdir {
            if self.lookup(testdir).is_none() {
                return Vec::new();
            }
        }
        let mut out = Vec::new();
        for root in &cmd.roots {
            let node = self.lookup(root);
            if let Some(node) = node {
                self.walk(root, node, cmd, 0, &mut out);
            }
        }
        out.sort();
        out
    }

    fn lookup(&self, path: &str) -> Option<&VNode> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        if parts.is_empty() {
            return None;
        }
        let mut cur = &self.root;
        let mut node = cur.get(parts[0])?;
        for part in &parts[1..] {
            match node {
                VNode::Dir(children) => {
                    cur = children;
                    node = cur.get(*part)?;
                }
                VNode::File | VNode::Symlink(_) => return None,
            }
        }
        Some(node)
    }

    fn walk(&self, path: &str, node: &VNode, cmd: &FindCommand, depth: u32, out: &mut Vec<String>) {
        match node {
            VNode::File => print_if_necessary(cmd, path, 'f', depth, out),
            VNode::Symlink(target) => {
                if cmd.follow_symlinks {
                    match self.lookup(target) {
                        Some(VNode::Dir(children)) => {
                            let name = path.rsplit('/').next().unwrap_or(path);
                            self.walk_dir(path, name, children, 'd', cmd, depth, out);
                        }
                        Some(VNode::File) => print_if_necessary(cmd, path, 'f', depth, out),
                        Some(VNode::Symlink(_)) | None => print_if_necessary(cmd, path, 'l', depth, out),
                    }
                } else {
                    print_if_necessary(cmd, path, 'l', depth, out);
                }
            }
            VNode::Dir(children) => {
                let name = path.rsplit('/').next().unwrap_or(path);
                self.walk_dir(path, name, children, 'd', cmd, depth, out);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_dir(
        &self,
        path: &str,
        name: &str,
        children: &BTreeMap<String, VNode>,
        dtype: char,
        cmd: &FindCommand,
        depth: u32,
        out: &mut Vec<String>,
    ) {
        if let Some(prune) = &cmd.prune_cond {
            if prune.eval(name, dtype) {
                if cmd.kind != FindKind::FindLeaves {
                    out.push(path.to_string());
                }
                return;
            }
        }
        print_if_necessary(cmd, path, dtype, depth, out);
        if let Some(max) = cmd.maxdepth {
            if depth >= max {
                return;
            }
        }
        if cmd.kind == FindKind::FindLeaves {
            let before = out.len();
            for (child_name, child) in children.iter().filter(|(_, c)| !matches!(c, VNode::Dir(_))) {
                self.walk(&format!("{path}/{child_name}"), child, cmd, depth + 1, out);
                if out.len() != before {
                    return;
                }
            }
            for (child_name, child) in children.iter().filter(|(_, c)| matches!(c, VNode::Dir(_))) {
                self.walk(&format!("{path}/{child_name}"), child, cmd, depth + 1, out);
            }
        } else {
            for (child_name, child) in children {
                self.walk(&format!("{path}/{child_name}"), child, cmd, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_dot_and_dots() {
        assert_eq!(normalize_path("a/./b/../c"), "a/c");
        assert_eq!(normalize_path("/a/b/../../c"), "/c");
    }

    #[test]
    fn glob_star_and_question_mark() {
        assert!(glob_match("*.c", "foo.c"));
        assert!(!glob_match("*.c", "foo.o"));
        assert!(glob_match("fo?.c", "foo.c"));
    }

    #[test]
    fn character_class() {
        assert!(glob_match("[abc].c", "a.c"));
        assert!(!glob_match("[!abc].c", "a.c"));
    }

    #[test]
    fn parses_find_with_name_and_type() {
        let cmd = parse_find_command(&["find", "src", "-name", "*.c", "-type", "f"]).unwrap();
        assert_eq!(cmd.roots, vec!["src"]);
        match cmd.print_cond.unwrap() {
            Cond::And(a, b) => {
                assert!(matches!(*a, Cond::Name(ref p) if p == "*.c"));
                assert!(matches!(*b, Cond::Type('f')));
            }
            other => panic!("expected And(Name, Type), got {other:?}"),
        }
    }

    #[test]
    fn virtual_tree_find_by_name() {
        let mut t = VirtualTree::new();
        t.add_dir("src");
        t.add_file("src/a.c");
        t.add_file("src/b.h");
        let cmd = parse_find_command(&["find", "src", "-name", "*.c"]).unwrap();
        let results = t.run(&cmd);
        assert_eq!(results, vec!["src/a.c"]);
    }

    #[test]
    fn recognizes_plain_find_command() {
        let (chdir, cmd) = try_parse_shell_as_find("find src -name '*.c'").unwrap();
        assert!(chdir.is_none());
        assert_eq!(cmd.roots, vec!["src"]);
        assert!(matches!(cmd.print_cond, Some(Cond::Name(ref p)) if p == "*.c"));
    }

    #[test]
    fn recognizes_find_with_chdir_prefix() {
        let (chdir, cmd) = try_parse_shell_as_find("cd src && find . -name '*.c'").unwrap();
        assert_eq!(chdir.as_deref(), Some("src"));
        assert_eq!(cmd.roots, vec!["."]);
    }

    #[test]
    fn finds_on_real_filesystem() {
        let dir = std::env::temp_dir().join(format!("kati-find-test-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/a.c"), "").unwrap();
        std::fs::write(dir.join("src/b.h"), "").unwrap();

        let root = dir.join("src").to_string_lossy().into_owned();
        let cmd =
            FindCommand { roots: vec![root.clone()], print_cond: Some(Cond::Name("*.c".to_string())), ..Default::default() };
        let results = find_on_filesystem(&cmd);

        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(results, vec![format!("{root}/a.c")]);
    }

    #[test]
    fn rejects_non_find_commands() {
        assert!(try_parse_shell_as_find("echo hello").is_none());
        assert!(try_parse_shell_as_find("find . -exec rm {} \\;").is_none());
    }

    #[test]
    fn virtual_tree_respects_max_depth() {
        let mut t = VirtualTree::new();
        t.add_dir("a");
        t.add_dir("a/b");
        t.add_file("a/b/c.txt");
        let mut cmd = parse_find_command(&["find", "a"]).unwrap();
        cmd.maxdepth = Some(1);
        let results = t.run(&cmd);
        assert!(!results.contains(&"a/b/c.txt".to_string()));
    }

    #[test]
    fn parses_prune_and_print_split() {
        let cmd = parse_find_command(&["find", "src", "-name", ".git", "-prune", "-o", "-name", "*.c", "-print"]).unwrap();
        assert!(matches!(cmd.prune_cond, Some(Cond::Name(ref p)) if p == ".git"));
        assert!(matches!(cmd.print_cond, Some(Cond::Name(ref p)) if p == "*.c"));
    }

    #[test]
    fn boolean_tree_and_or_not() {
        let cmd = parse_find_command(&["find", "src", "-name", "*.c", "-a", "-not", "-name", "foo.c"]).unwrap();
        let cond = cmd.print_cond.unwrap();
        assert!(cond.eval("bar.c", 'f'));
        assert!(!cond.eval("foo.c", 'f'));
        assert!(!cond.eval("bar.h", 'f'));
    }

    #[test]
    fn virtual_tree_respects_prune() {
        let mut t = VirtualTree::new();
        t.add_dir("src");
        t.add_dir("src/.git");
        t.add_file("src/.git/config");
        t.add_file("src/a.c");
        let cmd = parse_find_command(&["find", "src", "-name", ".git", "-prune", "-o", "-name", "*.c", "-print"]).unwrap();
        let results = t.run(&cmd);
        assert_eq!(results, vec!["src/a.c"]);
    }

    #[test]
    fn parses_findleaves_command() {
        let cmd = parse_findleaves_command(&[
            "findleaves.py",
            "--prune=out",
            "--mindepth=2",
            "src",
            "vendor",
            "Android.mk",
        ])
        .unwrap();
        assert_eq!(cmd.kind, FindKind::FindLeaves);
        assert_eq!(cmd.roots, vec!["src", "vendor"]);
        assert_eq!(cmd.mindepth, Some(2));
        assert!(matches!(cmd.print_cond, Some(Cond::Name(ref p)) if p == "Android.mk"));
        assert!(matches!(cmd.prune_cond, Some(Cond::Name(ref p)) if p == "out"));
    }

    #[test]
    fn recognizes_findleaves_shell_command() {
        let (chdir, cmd) = try_parse_shell_as_find("build/tools/findleaves.py src Android.mk").unwrap();
        assert!(chdir.is_none());
        assert_eq!(cmd.kind, FindKind::FindLeaves);
        assert_eq!(cmd.roots, vec!["src"]);
    }

    #[test]
    fn recognizes_testdir_wrapped_find() {
        let (_, cmd) = try_parse_shell_as_find("test -d src && find src -name '*.c'").unwrap();
        assert_eq!(cmd.testdir.as_deref(), Some("src"));
    }

    #[test]
    fn recognizes_if_testdir_wrapped_find() {
        let (_, cmd) = try_parse_shell_as_find("if [ -d src ] ; then find src -name '*.c' ; fi").unwrap();
        assert_eq!(cmd.testdir.as_deref(), Some("src"));
    }

    #[test]
    fn testdir_miss_yields_empty_result() {
        let t = VirtualTree::new();
        let mut cmd = parse_find_command(&["find", "src"]).unwrap();
        cmd.testdir = Some("src".to_string());
        assert!(t.run(&cmd).is_empty());
    }

    #[test]
    fn findleaves_stops_at_first_match_per_subtree() {
        let mut t = VirtualTree::new();
        t.add_dir("a");
        t.add_file("a/Android.mk");
        t.add_dir("a/b");
        t.add_file("a/b/Android.mk");
        t.add_dir("c");
        t.add_dir("c/d");
        t.add_file("c/d/Android.mk");
        let cmd = parse_findleaves_command(&["findleaves.py", "a", "c", "Android.mk"]).unwrap();
        let results = t.run(&cmd);
        assert_eq!(results, vec!["a/Android.mk", "c/d/Android.mk"]);
    }

    #[test]
    fn follow_symlinks_resolves_directory() {
        let mut t = VirtualTree::new();
        t.add_dir("real");
        t.add_file("real/a.c");
        t.add_symlink("link", "real");
        let mut cmd = parse_find_command(&["find", "link", "-name", "*.c"]).unwrap();
        cmd.follow_symlinks = true;
        cmd.roots = vec!["link".to_string()];
        let results = t.run(&cmd);
        assert_eq!(results, vec!["link/a.c"]);
    }
}
