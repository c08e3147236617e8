//! The evaluator: walks a parsed statement list, expanding `Value`
//! expressions against a chain of variable scopes and building up the set
//! of rules that feed the dependency builder (`crate::rule`, `crate::dep`).

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;
use tracing::{debug, instrument, warn};

use crate::expr::{ParseExprOpt, Value};
use crate::func;
use crate::loc::{Frame, FrameKind, Loc};
use crate::rule::RawRule;
use crate::stmt::{self, IfCond, RuleSeparator, Statement};
use crate::symtab::Symtab;
use crate::var::{AssignOp, Var, VarOrigin, Vars};

const MAX_CALL_DEPTH: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("*** unimplemented function: '{0}'")]
    UnknownFunction(String),
    #[error("*** {0}")]
    BadFunctionArgs(String),
    #[error("{0}")]
    UserError(String),
    #[error(transparent)]
    Readonly(#[from] crate::symtab::ReadonlyViolation),
    #[error("*** maximum recursion depth ({MAX_CALL_DEPTH}) exceeded")]
    RecursionLimit,
    #[error(transparent)]
    ExprParse(#[from] crate::expr::ParseError),
    #[error(transparent)]
    StmtParse(#[from] crate::stmt::ParseError),
    #[error("*** recursive variable '{0}' references itself (eventually)")]
    SelfReferential(SmolStr),
}

/// The filesystem/process-boundary operations the evaluator needs —
/// `$(wildcard)`, `$(shell)`, `$(realpath)`, `$(file ...)`. Abstracted
/// behind a trait (mirroring the teacher's `World`) so tests can supply an
/// in-memory double instead of touching the real filesystem.
pub trait EvalIo {
    fn glob(&self, pattern: &str) -> std::io::Result<Vec<String>>;
    fn canonicalize(&self, path: &str) -> Option<String>;
    fn abspath(&self, path: &str) -> String;
    fn read_file(&self, path: &str) -> std::io::Result<String>;
    fn write_file(&self, path: &str, content: &str, append: bool) -> std::io::Result<()>;
    fn run_shell(&self, command: &str) -> std::io::Result<(String, i32)>;
}

/// The real, OS-backed implementation of [`EvalIo`].
pub struct OsEvalIo;

impl EvalIo for OsEvalIo {
    fn glob(&self, pattern: &str) -> std::io::Result<Vec<String>> {
        crate::find::glob(pattern)
    }

    fn canonicalize(&self, path: &str) -> Option<String> {
        std::fs::canonicalize(path).ok().map(|p| p.to_string_lossy().into_owned())
    }

    fn abspath(&self, path: &str) -> String {
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            crate::find::normalize_path(path)
        } else {
            let cwd = std::env::current_dir().unwrap_or_default();
            crate::find::normalize_path(&cwd.join(path).to_string_lossy())
        }
    }

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write_file(&self, path: &str, content: &str, append: bool) -> std::io::Result<()> {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().create(true).append(append).write(true).truncate(!append).open(path)?;
        f.write_all(content.as_bytes())
    }

    fn run_shell(&self, command: &str) -> std::io::Result<(String, i32)> {
        let output = std::process::Command::new("/bin/sh").arg("-c").arg(command).output()?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok((text, output.status.code().unwrap_or(-1)))
    }
}

/// Wraps any [`EvalIo`] to intercept `run_shell` calls that match the
/// restricted `find`/`findleaves` grammar (spec.md §4.7), serving them from
/// [`crate::find::find_on_filesystem`] instead of forking a real `find`.
/// Unsupported syntax falls back to the inner implementation, unless
/// `werror` is set, in which case the fallback itself becomes an error.
pub struct FindEmulatingEvalIo<I> {
    inner: I,
    enabled: bool,
    werror: bool,
}

impl<I: EvalIo> FindEmulatingEvalIo<I> {
    pub fn new(inner: I, enabled: bool, werror: bool) -> Self {
        FindEmulatingEvalIo { inner, enabled, werror }
    }
}

impl<I: EvalIo> EvalIo for FindEmulatingEvalIo<I> {
    fn glob(&self, pattern: &str) -> std::io::Result<Vec<String>> {
        self.inner.glob(pattern)
    }

    fn canonicalize(&self, path: &str) -> Option<String> {
        self.inner.canonicalize(path)
    }

    fn abspath(&self, path: &str) -> String {
        self.inner.abspath(path)
    }

    fn read_file(&self, path: &str) -> std::io::Result<String> {
        self.inner.read_file(path)
    }

    fn write_file(&self, path: &str, content: &str, append: bool) -> std::io::Result<()> {
        self.inner.write_file(path, content, append)
    }

    fn run_shell(&self, command: &str) -> std::io::Result<(String, i32)> {
        if self.enabled {
            if let Some((chdir, mut cmd)) = crate::find::try_parse_shell_as_find(command) {
                if let Some(dir) = &chdir {
                    for root in &mut cmd.roots {
                        *root = format!("{dir}/{root}");
                    }
                    if let Some(testdir) = &cmd.testdir {
                        cmd.testdir = Some(format!("{dir}/{testdir}"));
                    }
                }
                let mut paths = crate::find::find_on_filesystem(&cmd);
                if let Some(dir) = &chdir {
                    let prefix = format!("{dir}/");
                    for p in &mut paths {
                        if let Some(stripped) = p.strip_prefix(&prefix) {
                            *p = stripped.to_string();
                        }
                    }
                }
                return Ok((paths.join(" "), 0));
            }
            if self.werror {
                return Err(std::io::Error::other(format!("find emulator: unsupported command: {command}")));
            }
        }
        self.inner.run_shell(command)
    }
}

/// Per-function-call timing, mirroring kati's `stats.cc`.
#[derive(Debug, Default)]
pub struct Stats {
    pub shell_invocations: u64,
    pub function_calls: u64,
}

pub struct Evaluator {
    pub symtab: Rc<Symtab>,
    scopes: Vec<Vars>,
    io: Rc<dyn EvalIo>,
    frame: Rc<Frame>,
    call_depth: usize,
    pub stats: Stats,
    pub rules: Vec<RawRule>,
    pub diagnostics: Vec<String>,
    last_shell_status: RefCell<Option<i32>>,
    loc: Loc,
    /// `export`/`unexport` declarations naming specific variables, in
    /// source-declaration order: `true` means export, `false` unexport.
    pub exports: indexmap::IndexMap<SmolStr, bool>,
    /// Set by a bare `export`/`unexport` with no variable names, which
    /// switches the default for variables not otherwise named above.
    pub export_all: Option<bool>,
    /// Messages registered by `$(KATI_deprecate_export ...)`/
    /// `$(KATI_obsolete_export ...)`, emitted the first time the named
    /// variable is actually exported.
    export_deprecations: std::collections::HashMap<SmolStr, SmolStr>,
    /// Target-specific variables collected from `target: VAR = value`
    /// lines, keyed by target name, fed to [`crate::dep::GraphBuilder`]
    /// after evaluation finishes.
    pub target_scopes: indexmap::IndexMap<SmolStr, crate::dep::TargetScope>,
}

impl Evaluator {
    pub fn new(symtab: Rc<Symtab>, io: Rc<dyn EvalIo>) -> Self {
        Evaluator {
            symtab,
            scopes: vec![Vars::new()],
            io,
            frame: Frame::new_root(),
            call_depth: 0,
            stats: Stats::default(),
            rules: Vec::new(),
            diagnostics: Vec::new(),
            last_shell_status: RefCell::new(None),
            loc: Loc::unknown(),
            exports: indexmap::IndexMap::new(),
            export_all: None,
            export_deprecations: std::collections::HashMap::new(),
            target_scopes: indexmap::IndexMap::new(),
        }
    }

    /// Registers a deprecation/obsoletion message for `name`, to be emitted
    /// the next time `export name` (or a later bare `export`) runs.
    pub fn mark_export_deprecated(&mut self, name: &str, msg: Option<&str>) {
        self.export_deprecations.insert(SmolStr::new(name.trim()), SmolStr::new(msg.unwrap_or("")));
    }

    pub fn world(&self) -> &dyn EvalIo {
        self.io.as_ref()
    }

    pub fn intern(&self, name: &str) -> crate::symtab::Symbol {
        self.symtab.intern(name)
    }

    /// Seeds `environ`-origin variables before the first statement runs,
    /// then re-parses `MAKEFLAGS` for `VAR=value` tokens as command-line
    /// overrides, matching GNU make's documented bootstrap order.
    pub fn bootstrap_environment<I: IntoIterator<Item = (String, String)>>(&mut self, env: I, makeflags: &[(String, String)]) {
        for (k, v) in env {
            let sym = self.symtab.intern(&k);
            let var = Rc::new(Var::simple(v, VarOrigin::Environment, AssignOp::Recursive, Loc::unknown()));
            let _ = self.symtab.set_global_var(sym, var, false);
        }
        for (k, v) in makeflags {
            let sym = self.symtab.intern(k);
            let var = Rc::new(Var::simple(v.clone(), VarOrigin::CommandLine, AssignOp::Recursive, Loc::unknown()));
            let _ = self.symtab.set_global_var(sym, var, false);
        }
    }

    #[instrument(skip_all)]
    pub fn eval_file(&mut self, text: &str, filename: &str) -> Result<(), EvalError> {
        let stmts = stmt::parse_statements(text, filename)?;
        self.eval_statements(&stmts)
    }

    pub fn eval_statements(&mut self, stmts: &[Statement]) -> Result<(), EvalError> {
        let mut pending_targets: Option<(Value, RuleSeparator, Option<Value>, Option<Value>, Loc)> = None;
        for stmt in stmts {
            match stmt {
                Statement::Assignment { lhs, op, rhs, is_override, export, loc } => {
                    self.loc = loc.clone();
                    self.eval_assignment(lhs, *op, rhs, *is_override, *export, loc)?;
                }
                Statement::Rule { targets, sep, target_pattern, normal_deps, order_only_deps, loc } => {
                    self.loc = loc.clone();
                    pending_targets = Some((targets.clone(), *sep, normal_deps.clone(), order_only_deps.clone(), loc.clone()));
                    self.rules.push(RawRule {
                        targets: self.eval_to_string(targets)?,
                        sep: *sep,
                        target_pattern: match target_pattern { Some(v) => Some(self.eval_to_string(v)?), None => None },
                        normal_deps: match normal_deps { Some(v) => self.eval_to_string(v)?, None => String::new() },
                        order_only_deps: match order_only_deps { Some(v) => self.eval_to_string(v)?, None => String::new() },
                        recipe: Vec::new(),
                        loc: loc.clone(),
                    });
                }
                Statement::TargetSpecificAssignment { targets, var_name, op, rhs, is_override, loc } => {
                    self.loc = loc.clone();
                    let _ = is_override;
                    let targets_str = self.eval_to_string(targets)?;
                    let var = self.eval_to_string(var_name)?;
                    let var = var.trim().to_string();
                    let value = self.eval_to_string(rhs)?;
                    for t in targets_str.split_ascii_whitespace() {
                        let scope = self.target_scopes.entry(SmolStr::new(t)).or_default();
                        match var.as_str() {
                            ".KATI_DEPFILE" => scope.depfile = Some(SmolStr::new(&value)),
                            ".KATI_NINJA_POOL" => scope.ninja_pool = Some(SmolStr::new(&value)),
                            ".KATI_VALIDATIONS" => {
                                scope.validations.extend(value.split_ascii_whitespace().map(SmolStr::new));
                            }
                            _ => match op {
                                AssignOp::Append => {
                                    let existing = scope.vars.get(var.as_str()).cloned().unwrap_or_default();
                                    let joined =
                                        if existing.is_empty() { value.clone() } else { format!("{existing} {value}") };
                                    scope.vars.insert(SmolStr::new(&var), SmolStr::new(&joined));
                                }
                                AssignOp::Conditional => {
                                    scope.vars.entry(SmolStr::new(&var)).or_insert_with(|| SmolStr::new(&value));
                                }
                                _ => {
                                    scope.vars.insert(SmolStr::new(&var), SmolStr::new(&value));
                                }
                            },
                        }
                    }
                }
                Statement::Recipe { line, loc } => {
                    self.loc = loc.clone();
                    let expanded = self.eval_recipe_line(line)?;
                    if let Some(rule) = self.rules.last_mut() {
                        rule.recipe.push(expanded);
                    } else {
                        warn!(%loc, "recipe line with no preceding rule, ignored");
                    }
                    let _ = &pending_targets;
                }
                Statement::Include { path, optional, loc } => {
                    self.loc = loc.clone();
                    let path_str = self.eval_to_string(path)?;
                    for p in path_str.split_ascii_whitespace() {
                        match self.io.read_file(p) {
                            Ok(text) => self.eval_file(&text, p)?,
                            Err(e) if *optional => {
                                debug!(%p, error = %e, "optional include not found");
                            }
                            Err(e) => return Err(EvalError::Io(e)),
                        }
                    }
                }
                Statement::If(ifs) => {
                    self.loc = ifs.loc.clone();
                    let take_then = self.eval_if_cond(&ifs.cond)?;
                    if take_then {
                        self.eval_statements(&ifs.then_branch)?;
                    } else {
                        self.eval_statements(&ifs.else_branch)?;
                    }
                }
                Statement::Define { name, body, loc } => {
                    self.loc = loc.clone();
                    let name_str = self.eval_to_string(name)?;
                    let mut body_loc = loc.clone();
                    let (value, _) = crate::expr::parse_expr(body, &mut body_loc, &[], ParseExprOpt::Define)?;
                    self.assign_variable(name_str.trim(), AssignOp::Recursive, value, body.clone(), VarOrigin::File, false, None, loc)?;
                }
                Statement::Export { names, enable, loc } => {
                    self.loc = loc.clone();
                    match names {
                        None => self.export_all = Some(*enable),
                        Some(v) => {
                            let text = self.eval_to_string(v)?;
                            for name in text.split_ascii_whitespace() {
                                if let Some(msg) = self.export_deprecations.remove(name) {
                                    let verb = if *enable { "export" } else { "unexport" };
                                    self.emit_diagnostic(&format!("{verb} of deprecated variable '{name}': {msg}"));
                                }
                                self.exports.insert(SmolStr::new(name), *enable);
                            }
                        }
                    }
                }
                Statement::Vpath { .. } => {
                    // vpath search-path directories are consumed by the dependency
                    // builder's implicit-rule search (crate::dep), not evaluation.
                }
            }
        }
        Ok(())
    }

    fn eval_if_cond(&mut self, cond: &IfCond) -> Result<bool, EvalError> {
        Ok(match cond {
            IfCond::Ifeq(a, b) => self.eval_to_string(a)? == self.eval_to_string(b)?,
            IfCond::Ifneq(a, b) => self.eval_to_string(a)? != self.eval_to_string(b)?,
            IfCond::Ifdef(name) => {
                let n = self.eval_to_string(name)?;
                self.symtab.get_global_var(self.symtab.intern(n.trim())).is_defined()
            }
            IfCond::Ifndef(name) => {
                let n = self.eval_to_string(name)?;
                !self.symtab.get_global_var(self.symtab.intern(n.trim())).is_defined()
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_assignment(
        &mut self,
        lhs: &Value,
        op: AssignOp,
        rhs: &Value,
        is_override: bool,
        export: Option<bool>,
        loc: &Loc,
    ) -> Result<(), EvalError> {
        let name = self.eval_to_string(lhs)?;
        let name = name.trim();
        let _ = export;

        match op {
            AssignOp::Simple => {
                let text = self.eval_to_string(rhs)?;
                self.assign_variable(name, op, Value::literal(text.clone()), text, VarOrigin::File, is_override, None, loc)?;
            }
            AssignOp::Conditional => {
                let sym = self.symtab.intern(name);
                if self.symtab.get_global_var(sym).is_defined() {
                    return Ok(());
                }
                self.assign_recursive(name, op, rhs, is_override, loc)?;
            }
            AssignOp::Append => {
                self.append_variable(name, rhs, is_override, loc)?;
            }
            AssignOp::Recursive | AssignOp::Final => {
                self.assign_recursive(name, op, rhs, is_override, loc)?;
            }
        }
        Ok(())
    }

    fn assign_recursive(&mut self, name: &str, op: AssignOp, rhs: &Value, is_override: bool, loc: &Loc) -> Result<(), EvalError> {
        let orig = rhs.to_string();
        self.assign_variable(name, op, rhs.clone(), orig, VarOrigin::File, is_override, None, loc)
    }

    #[allow(clippy::too_many_arguments)]
    fn assign_variable(
        &mut self,
        name: &str,
        op: AssignOp,
        value: Value,
        orig_text: String,
        origin: VarOrigin,
        is_override: bool,
        existing_self_ref: Option<bool>,
        loc: &Loc,
    ) -> Result<(), EvalError> {
        let sym = self.symtab.intern(name);
        let var = Rc::new(Var::recursive(Rc::new(value), orig_text, origin, op, loc.clone()));
        if let Some(r) = existing_self_ref {
            var.self_referential.set(r);
        }
        if self.scopes.len() > 1 {
            self.scopes.last_mut().unwrap().assign(sym, var)?;
        } else {
            self.symtab.set_global_var(sym, var, is_override)?;
        }
        Ok(())
    }

    fn append_variable(&mut self, name: &str, rhs: &Value, is_override: bool, loc: &Loc) -> Result<(), EvalError> {
        let sym = self.symtab.intern(name);
        let existing = self.lookup(sym);
        match existing {
            Some(v) if v.is_defined() => {
                let appended_text = self.eval_to_string(rhs)?;
                let mut combined = v.orig_text().to_string();
                if !combined.is_empty() {
                    combined.push(' ');
                }
                combined.push_str(&appended_text);
                match &v.flavor {
                    crate::var::VarFlavor::Simple(_) => {
                        self.assign_variable(name, AssignOp::Simple, Value::literal(combined.clone()), combined, v.origin, is_override, None, loc)?;
                    }
                    _ => {
                        let mut body_loc = loc.clone();
                        let mut new_orig = v.orig_text().to_string();
                        new_orig.push(' ');
                        new_orig.push_str(&rhs.to_string());
                        let (value, _) = crate::expr::parse_expr(&new_orig, &mut body_loc, &[], ParseExprOpt::Normal)?;
                        self.assign_variable(name, AssignOp::Recursive, value, new_orig, v.origin, is_override, None, loc)?;
                    }
                }
            }
            _ => {
                self.assign_recursive(name, AssignOp::Recursive, rhs, is_override, loc)?;
            }
        }
        Ok(())
    }

    fn lookup(&self, sym: crate::symtab::Symbol) -> Option<Rc<Var>> {
        for scope in self.scopes.iter().rev().take(self.scopes.len().saturating_sub(1)) {
            if let Some(v) = scope.lookup(sym) {
                return Some(v);
            }
        }
        self.symtab.peek_global_var(sym)
    }

    /// Expands `value` to its final string form, recursing into variable
    /// references and function calls. A per-call depth counter stands in
    /// for the C original's raw stack-pointer check.
    pub fn eval_to_string(&mut self, value: &Value) -> Result<String, EvalError> {
        let mut out = String::new();
        self.eval_into(value, &mut out)?;
        Ok(out)
    }

    fn eval_into(&mut self, value: &Value, out: &mut String) -> Result<(), EvalError> {
        self.call_depth += 1;
        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;
            return Err(EvalError::RecursionLimit);
        }
        let result = self.eval_into_inner(value, out);
        self.call_depth -= 1;
        result
    }

    fn eval_into_inner(&mut self, value: &Value, out: &mut String) -> Result<(), EvalError> {
        match value {
            Value::Literal(s) => out.push_str(s),
            Value::Concat(parts) => {
                for p in parts {
                    self.eval_into(p, out)?;
                }
            }
            Value::VarRef(name) => {
                let name_str = self.eval_to_string(name)?;
                self.eval_var_ref(name_str.trim(), out)?;
            }
            Value::VarSubst { name, pattern, replacement } => {
                let name_str = self.eval_to_string(name)?;
                let pat = self.eval_to_string(pattern)?;
                let repl = self.eval_to_string(replacement)?;
                let mut base = String::new();
                self.eval_var_ref(name_str.trim(), &mut base)?;
                let pat = if pat.contains('%') { pat } else { format!("%{pat}") };
                let repl = if repl.contains('%') { repl } else { format!("%{repl}") };
                let mut first = true;
                for w in base.split_ascii_whitespace() {
                    if !first {
                        out.push(' ');
                    }
                    first = false;
                    out.push_str(&func::pattern_subst_one(&pat, &repl, w));
                }
            }
            Value::FuncCall { name, args, .. } => {
                self.stats.function_calls += 1;
                func::call(name, args, self, out)?;
            }
        }
        Ok(())
    }

    fn eval_var_ref(&mut self, name: &str, out: &mut String) -> Result<(), EvalError> {
        let sym = self.symtab.intern(name);
        let var = self.lookup(sym).unwrap_or_else(|| self.symtab.get_global_var(sym));
        if !var.is_defined() {
            return Ok(());
        }
        if var.self_referential.get() {
            return Err(EvalError::SelfReferential(SmolStr::new(name)));
        }
        match &var.flavor {
            crate::var::VarFlavor::Simple(s) => out.push_str(s),
            crate::var::VarFlavor::Recursive(expr, _) => {
                var.self_referential.set(true);
                let r = self.eval_into(expr, out);
                var.self_referential.set(false);
                r?;
            }
            crate::var::VarFlavor::Undefined => {}
        }
        Ok(())
    }

    pub fn eval_foreach_iteration(&mut self, sym: crate::symtab::Symbol, word: &str, body: &Value) -> Result<String, EvalError> {
        self.scopes.push(Vars::new());
        let var = Rc::new(Var::simple(word.to_string(), VarOrigin::Automatic, AssignOp::Recursive, self.loc.clone()));
        let result = (|| {
            self.scopes.last_mut().unwrap().assign(sym, var)?;
            self.eval_to_string(body)
        })();
        self.scopes.pop();
        result
    }

    pub fn eval_call(&mut self, name: &str, params: &[String]) -> Result<String, EvalError> {
        let sym = self.symtab.intern(name);
        let var = self.lookup(sym).unwrap_or_else(|| self.symtab.get_global_var(sym));
        if !var.is_defined() {
            return Ok(String::new());
        }
        self.scopes.push(Vars::new());
        for (i, p) in params.iter().enumerate() {
            let psym = self.symtab.intern(&(i + 1).to_string());
            let pvar = Rc::new(Var::simple(p.clone(), VarOrigin::Automatic, AssignOp::Recursive, self.loc.clone()));
            self.scopes.last_mut().unwrap().assign(psym, pvar)?;
        }
        let body = Value::VarRef(Box::new(Value::literal(name)));
        let result = self.eval_to_string(&body);
        self.scopes.pop();
        result
    }

    pub fn eval_text_as_statements(&mut self, text: &str) -> Result<(), EvalError> {
        let stmts = stmt::parse_statements(text, &self.loc.filename)?;
        self.eval_statements(&stmts)
    }

    pub fn variable_orig_text(&self, name: &str) -> String {
        let sym = self.symtab.intern(name);
        self.lookup(sym).map(|v| v.orig_text().to_string()).unwrap_or_default()
    }

    pub fn variable_origin(&self, name: &str) -> crate::var::VarOrigin {
        let sym = self.symtab.intern(name);
        self.lookup(sym).map(|v| v.origin).unwrap_or(VarOrigin::Undefined)
    }

    pub fn variable_flavor(&self, name: &str) -> &'static str {
        let sym = self.symtab.intern(name);
        self.lookup(sym).map(|v| v.flavor_name()).unwrap_or("undefined")
    }

    pub fn mark_variable_deprecated(&mut self, name: &str, msg: Option<&str>) {
        let sym = self.symtab.intern(name.trim());
        if let Some(v) = self.lookup(sym) {
            *v.deprecated.borrow_mut() = Some(SmolStr::new(msg.unwrap_or("")));
        }
    }

    pub fn mark_variable_obsolete(&mut self, name: &str, msg: Option<&str>) {
        let sym = self.symtab.intern(name.trim());
        if let Some(v) = self.lookup(sym) {
            *v.obsolete.borrow_mut() = Some(SmolStr::new(msg.unwrap_or("")));
        }
    }

    pub fn run_shell(&mut self, command: &str) -> Result<String, EvalError> {
        self.stats.shell_invocations += 1;
        let (text, status) = self.io.run_shell(command)?;
        *self.last_shell_status.borrow_mut() = Some(status);
        Ok(text)
    }

    /// Materializes `export`/`unexport` declarations into the current
    /// process's environment, so that every recipe line spawned afterward
    /// (each a fresh `/bin/sh` child inheriting this process's environment)
    /// sees them. Call once evaluation has finished.
    pub fn apply_exports(&mut self) {
        let symtab = self.symtab.clone();
        if self.export_all == Some(true) {
            for sym in symtab.all_symbols() {
                let name = symtab.str(sym);
                if self.exports.contains_key(name.as_str()) {
                    continue;
                }
                if let Some(var) = symtab.peek_global_var(sym) {
                    if var.is_defined() {
                        let mut value = String::new();
                        if self.eval_var_ref(&name, &mut value).is_ok() {
                            std::env::set_var(name.as_str(), value);
                        }
                    }
                }
            }
        }
        let exports: Vec<(SmolStr, bool)> = self.exports.iter().map(|(k, v)| (k.clone(), *v)).collect();
        for (name, enable) in exports {
            if enable {
                let mut value = String::new();
                if self.eval_var_ref(&name, &mut value).is_ok() {
                    std::env::set_var(name.as_str(), value);
                }
            } else {
                std::env::remove_var(name.as_str());
            }
        }
    }

    pub fn emit_diagnostic(&mut self, msg: &str) {
        let formatted = format!("{}: {}", self.loc, msg);
        debug!(%formatted, "evaluator diagnostic");
        self.diagnostics.push(formatted);
    }

    fn eval_recipe_line(&mut self, line: &SmolStr) -> Result<String, EvalError> {
        let mut loc = self.loc.clone();
        let (value, _) = crate::expr::parse_expr(line, &mut loc, &[], ParseExprOpt::Command)?;
        self.eval_to_string(&value)
    }

    pub fn frame(&self) -> &Rc<Frame> {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullIo;
    impl EvalIo for NullIo {
        fn glob(&self, _: &str) -> std::io::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn canonicalize(&self, p: &str) -> Option<String> {
            Some(p.to_string())
        }
        fn abspath(&self, p: &str) -> String {
            p.to_string()
        }
        fn read_file(&self, _: &str) -> std::io::Result<String> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"))
        }
        fn write_file(&self, _: &str, _: &str, _: bool) -> std::io::Result<()> {
            Ok(())
        }
        fn run_shell(&self, _: &str) -> std::io::Result<(String, i32)> {
            Ok((String::new(), 0))
        }
    }

    fn new_eval() -> Evaluator {
        Evaluator::new(Rc::new(Symtab::new()), Rc::new(NullIo))
    }

    #[test]
    fn simple_and_recursive_assignment() {
        let mut ev = new_eval();
        ev.eval_file("X := 1\nY = $(X)2\nX := 3\n", "Makefile").unwrap();
        let sym = ev.intern("Y");
        let v = ev.lookup(sym).unwrap();
        let mut out = String::new();
        ev.eval_into(&crate::expr::Value::VarRef(Box::new(Value::literal("Y"))), &mut out).unwrap();
        assert_eq!(out, "32");
        let _ = v;
    }

    #[test]
    fn append_to_simple_var() {
        let mut ev = new_eval();
        ev.eval_file("X := a\nX += b\n", "Makefile").unwrap();
        let mut out = String::new();
        ev.eval_into(&Value::VarRef(Box::new(Value::literal("X"))), &mut out).unwrap();
        assert_eq!(out, "a b");
    }

    #[test]
    fn conditional_assignment_respects_existing() {
        let mut ev = new_eval();
        ev.eval_file("X := set\nX ?= other\n", "Makefile").unwrap();
        let mut out = String::new();
        ev.eval_into(&Value::VarRef(Box::new(Value::literal("X"))), &mut out).unwrap();
        assert_eq!(out, "set");
    }

    #[test]
    fn export_adds_named_vars_in_order() {
        let mut ev = new_eval();
        ev.eval_file("export FOO BAR\nunexport BAZ\n", "Makefile").unwrap();
        assert_eq!(ev.exports.get("FOO"), Some(&true));
        assert_eq!(ev.exports.get("BAR"), Some(&true));
        assert_eq!(ev.exports.get("BAZ"), Some(&false));
        assert_eq!(ev.exports.keys().collect::<Vec<_>>(), vec!["FOO", "BAR", "BAZ"]);
    }

    #[test]
    fn bare_export_sets_export_all() {
        let mut ev = new_eval();
        ev.eval_file("export\n", "Makefile").unwrap();
        assert_eq!(ev.export_all, Some(true));
    }

    #[test]
    fn export_emits_registered_deprecation_message() {
        let mut ev = new_eval();
        ev.eval_file("$(KATI_deprecate_export FOO,use BAR instead)\nexport FOO\n", "Makefile").unwrap();
        assert!(ev.diagnostics.iter().any(|d| d.contains("deprecated") && d.contains("use BAR instead")));
    }

    #[test]
    fn ifeq_picks_branch() {
        let mut ev = new_eval();
        ev.eval_file("X := 1\nifeq ($(X),1)\nA = yes\nelse\nA = no\nendif\n", "Makefile").unwrap();
        let mut out = String::new();
        ev.eval_into(&Value::VarRef(Box::new(Value::literal("A"))), &mut out).unwrap();
        assert_eq!(out, "yes");
    }

    #[test]
    fn find_emulator_falls_back_when_disabled() {
        let io = FindEmulatingEvalIo::new(NullIo, false, false);
        let (out, status) = io.run_shell("find . -name '*.c'").unwrap();
        assert_eq!((out, status), (String::new(), 0));
    }

    #[test]
    fn find_emulator_errors_under_werror_for_unsupported_commands() {
        let io = FindEmulatingEvalIo::new(NullIo, true, true);
        assert!(io.run_shell("echo hi").is_err());
    }

    #[test]
    fn find_emulator_does_not_intercept_non_find_commands_without_werror() {
        let io = FindEmulatingEvalIo::new(NullIo, true, false);
        let (out, status) = io.run_shell("echo hi").unwrap();
        assert_eq!((out, status), (String::new(), 0));
    }

    #[test]
    fn target_specific_assignment_collected_into_scope() {
        let mut ev = new_eval();
        ev.eval_file("foo.o: CFLAGS := -DFOO\n", "Makefile").unwrap();
        let scope = ev.target_scopes.get("foo.o").unwrap();
        assert_eq!(scope.vars.get("CFLAGS").map(|s| s.as_str()), Some("-DFOO"));
    }

    #[test]
    fn target_specific_assignment_applies_to_multiple_targets() {
        let mut ev = new_eval();
        ev.eval_file("foo.o bar.o: CFLAGS := -DFOO\n", "Makefile").unwrap();
        assert_eq!(ev.target_scopes.get("foo.o").unwrap().vars.get("CFLAGS").map(|s| s.as_str()), Some("-DFOO"));
        assert_eq!(ev.target_scopes.get("bar.o").unwrap().vars.get("CFLAGS").map(|s| s.as_str()), Some("-DFOO"));
    }

    #[test]
    fn target_specific_depfile_and_pool_recognized() {
        let mut ev = new_eval();
        ev.eval_file("out: .KATI_DEPFILE := out.d\nout: .KATI_NINJA_POOL := link_pool\n", "Makefile").unwrap();
        let scope = ev.target_scopes.get("out").unwrap();
        assert_eq!(scope.depfile.as_deref(), Some("out.d"));
        assert_eq!(scope.ninja_pool.as_deref(), Some("link_pool"));
    }

    #[test]
    fn target_specific_append_concatenates_with_existing() {
        let mut ev = new_eval();
        ev.eval_file("out: CFLAGS := -O2\nout: CFLAGS += -Wall\n", "Makefile").unwrap();
        let scope = ev.target_scopes.get("out").unwrap();
        assert_eq!(scope.vars.get("CFLAGS").map(|s| s.as_str()), Some("-O2 -Wall"));
    }

    #[test]
    fn patsubst_builtin() {
        let mut ev = new_eval();
        let mut out = String::new();
        let (v, _) = crate::expr::parse_expr("$(patsubst %.c,%.o,a.c b.c)", &mut Loc::unknown(), &[], ParseExprOpt::Normal).unwrap();
        ev.eval_into(&v, &mut out).unwrap();
        assert_eq!(out, "a.o b.o");
    }
}
