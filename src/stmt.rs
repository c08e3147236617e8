//! The statement-level AST and the line-oriented parser that turns makefile
//! text into a `Vec<Statement>`.
//!
//! Unlike the expression parser, which is a pure recursive-descent grammar,
//! statement parsing is inherently line-oriented: recipe lines are
//! distinguished from ordinary text purely by a leading recipe-prefix
//! character (`\t` unless `.RECIPEPREFIX` changes it) and by "are we
//! currently inside a rule", and `define`/`endif` are block delimiters that
//! nest.

use smol_str::SmolStr;

use crate::expr::{parse_expr, ParseExprOpt, Value};
use crate::loc::Loc;
use crate::var::AssignOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSeparator {
    /// `:` — targets share one rule-combination.
    Single,
    /// `::` — each matching rule is independent (double-colon rules).
    Double,
}

#[derive(Debug, Clone)]
pub enum IfCond {
    Ifeq(Value, Value),
    Ifneq(Value, Value),
    Ifdef(Value),
    Ifndef(Value),
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub cond: IfCond,
    pub then_branch: Vec<Statement>,
    /// `else` (optionally another `ifeq`/... chained, represented as a
    /// single nested `Statement::If` here) or empty.
    pub else_branch: Vec<Statement>,
    pub loc: Loc,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Assignment {
        lhs: Value,
        op: AssignOp,
        rhs: Value,
        is_override: bool,
        /// `Some(true)` for `export FOO = ...`, `Some(false)` for
        /// `unexport FOO = ...`, `None` for a plain assignment.
        export: Option<bool>,
        loc: Loc,
    },
    Rule {
        targets: Value,
        sep: RuleSeparator,
        /// `Some` for a static pattern rule (`targets: target-pattern:
        /// prereq-pattern`): the middle pattern, matched against each of
        /// `targets` to derive the stem substituted into the prerequisite
        /// patterns held in `normal_deps`/`order_only_deps`.
        target_pattern: Option<Value>,
        normal_deps: Option<Value>,
        order_only_deps: Option<Value>,
        loc: Loc,
    },
    /// A target-specific variable: `targets: VAR = value` (also `:=`, `+=`,
    /// `?=`). Scoped to `targets` and anything built to satisfy them, per
    /// GNU make's per-target variable rules.
    TargetSpecificAssignment {
        targets: Value,
        var_name: Value,
        op: AssignOp,
        rhs: Value,
        is_override: bool,
        loc: Loc,
    },
    Recipe {
        line: SmolStr,
        loc: Loc,
    },
    Include {
        path: Value,
        optional: bool,
        loc: Loc,
    },
    If(IfStatement),
    Define {
        name: Value,
        body: SmolStr,
        loc: Loc,
    },
    Export {
        names: Option<Value>,
        enable: bool,
        loc: Loc,
    },
    Vpath {
        pattern: Value,
        dirs: Option<Value>,
        loc: Loc,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}: *** missing `endif'")]
    MissingEndif(Loc),
    #[error("{0}: *** extraneous `{1}'")]
    Extraneous(Loc, &'static str),
    #[error("{0}: *** missing `endef', unterminated `define'")]
    MissingEndef(Loc),
    #[error("{0}: *** {1}")]
    Malformed(Loc, String),
    #[error(transparent)]
    Expr(#[from] crate::expr::ParseError),
}

struct LineScanner<'a> {
    text: &'a str,
    filename: SmolStr,
    byte_pos: usize,
    line: u32,
}

impl<'a> LineScanner<'a> {
    fn new(text: &'a str, filename: &str) -> Self {
        LineScanner { text, filename: SmolStr::new(filename), byte_pos: 0, line: 1 }
    }

    fn loc(&self) -> Loc {
        Loc::new(self.filename.clone(), self.line)
    }

    /// Reads one physical line (without its trailing `\n`), advancing the
    /// cursor past the newline.
    fn next_physical(&mut self) -> Option<&'a str> {
        if self.byte_pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.byte_pos..];
        let (line, advance) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        self.byte_pos += advance;
        self.line += 1;
        Some(line)
    }

    fn eof(&self) -> bool {
        self.byte_pos >= self.text.len()
    }
}

fn ends_with_odd_backslashes(s: &str) -> bool {
    let mut n = 0;
    for b in s.bytes().rev() {
        if b == b'\\' {
            n += 1;
        } else {
            break;
        }
    }
    n % 2 == 1
}

/// Parses `text` (the full contents of one makefile) into a flat list of
/// top-level statements, with `if`/`endif` blocks nested.
pub fn parse_statements(text: &str, filename: &str) -> Result<Vec<Statement>, ParseError> {
    let mut scanner = LineScanner::new(text, filename);
    let mut recipe_prefix = b'\t';
    let mut expecting_recipe = false;
    parse_block(&mut scanner, &mut recipe_prefix, &mut expecting_recipe, false)
}

/// Parses statements until EOF or (if `stop_at_block_end`) until an `else`
/// or `endif` directive is seen, which is left unconsumed by returning.
fn parse_block(
    scanner: &mut LineScanner,
    recipe_prefix: &mut u8,
    expecting_recipe: &mut bool,
    stop_at_block_end: bool,
) -> Result<Vec<Statement>, ParseError> {
    let mut out = Vec::new();
    loop {
        let start_pos = scanner.byte_pos;
        let start_line = scanner.line;
        let raw = match scanner.next_physical() {
            Some(l) => l,
            None => {
                if stop_at_block_end {
                    return Err(ParseError::MissingEndif(scanner.loc()));
                }
                return Ok(out);
            }
        };

        if *expecting_recipe && raw.as_bytes().first() == Some(recipe_prefix) {
            out.push(Statement::Recipe {
                line: SmolStr::new(&raw[1..]),
                loc: Loc::new(scanner.filename.clone(), start_line),
            });
            continue;
        }

        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            *expecting_recipe = false;
            continue;
        }

        // Join backslash-continued physical lines into one logical line.
        let mut logical = raw.to_string();
        while ends_with_odd_backslashes(&logical) {
            match scanner.next_physical() {
                Some(next) => {
                    logical.truncate(logical.len() - 1);
                    logical.push(' ');
                    logical.push_str(next.trim_start());
                }
                None => break,
            }
        }
        let loc = Loc::new(scanner.filename.clone(), start_line);
        let word = first_word(trimmed);

        match word {
            "define" => {
                let name_text = trimmed["define".len()..].trim();
                let mut name_loc = loc.clone();
                let (name, _) = parse_expr(name_text, &mut name_loc, &[], ParseExprOpt::Normal)?;
                let body = read_define_body(scanner)?;
                out.push(Statement::Define { name, body, loc });
                *expecting_recipe = false;
            }
            "endef" => {
                return Err(ParseError::Extraneous(loc, "endef"));
            }
            "ifeq" | "ifneq" | "ifdef" | "ifndef" => {
                let stmt = parse_if_chain(scanner, recipe_prefix, expecting_recipe, word, trimmed, &loc)?;
                out.push(stmt);
                *expecting_recipe = false;
            }
            "else" => {
                if stop_at_block_end {
                    // Rewind so the caller (which owns the `IfStatement`)
                    // can see this `else` and parse the following branch.
                    scanner.byte_pos = start_pos;
                    scanner.line = start_line;
                    return Ok(out);
                }
                return Err(ParseError::Extraneous(loc, "else"));
            }
            "endif" => {
                if stop_at_block_end {
                    scanner.byte_pos = start_pos;
                    scanner.line = start_line;
                    return Ok(out);
                }
                return Err(ParseError::Extraneous(loc, "endif"));
            }
            "include" | "-include" | "sinclude" => {
                let optional = word != "include";
                let path_text = trimmed[word.len()..].trim();
                let mut ploc = loc.clone();
                let (path, _) = parse_expr(path_text, &mut ploc, &[], ParseExprOpt::Normal)?;
                out.push(Statement::Include { path, optional, loc });
                *expecting_recipe = false;
            }
            "override" => {
                let rest = logical["override".len()..].trim_start().to_string();
                let stmt = parse_assignment_or_rule(&rest, &loc, true, None)?;
                out.push(stmt);
                *expecting_recipe = matches!(out.last(), Some(Statement::Rule { .. }));
            }
            "export" | "unexport" => {
                let enable = word == "export";
                let rest = logical[word.len()..].trim_start();
                if rest.is_empty() {
                    out.push(Statement::Export { names: None, enable, loc });
                } else if rest.contains('=') && looks_like_assignment(rest) {
                    let stmt = parse_assignment_or_rule(rest, &loc, false, Some(enable))?;
                    out.push(stmt);
                } else {
                    let mut nloc = loc.clone();
                    let (names, _) = parse_expr(rest, &mut nloc, &[], ParseExprOpt::Normal)?;
                    out.push(Statement::Export { names: Some(names), enable, loc });
                }
                *expecting_recipe = false;
            }
            "vpath" => {
                let rest = trimmed["vpath".len()..].trim();
                let mut vloc = loc.clone();
                if rest.is_empty() {
                    out.push(Statement::Vpath { pattern: Value::empty(), dirs: None, loc });
                } else if let Some(sp) = rest.find(char::is_whitespace) {
                    let (pattern, _) = parse_expr(&rest[..sp], &mut vloc, &[], ParseExprOpt::Normal)?;
                    let (dirs, _) = parse_expr(rest[sp..].trim_start(), &mut vloc, &[], ParseExprOpt::Normal)?;
                    out.push(Statement::Vpath { pattern, dirs: Some(dirs), loc });
                } else {
                    let (pattern, _) = parse_expr(rest, &mut vloc, &[], ParseExprOpt::Normal)?;
                    out.push(Statement::Vpath { pattern, dirs: None, loc });
                }
                *expecting_recipe = false;
            }
            _ => {
                let stmt = parse_assignment_or_rule(&logical, &loc, false, None)?;
                let is_rule = matches!(stmt, Statement::Rule { .. });
                out.push(stmt);
                *expecting_recipe = is_rule;
            }
        }
    }
}

fn first_word(s: &str) -> &str {
    let end = s.find(|c: char| c.is_whitespace()).unwrap_or(s.len());
    &s[..end]
}

fn looks_like_assignment(s: &str) -> bool {
    find_top_level_assign_op(s).is_some()
}

fn read_define_body(scanner: &mut LineScanner) -> Result<SmolStr, ParseError> {
    let mut body = String::new();
    let mut depth = 1u32;
    loop {
        match scanner.next_physical() {
            None => return Err(ParseError::MissingEndef(scanner.loc())),
            Some(raw) => {
                let trimmed = raw.trim_start();
                let word = first_word(trimmed);
                if word == "define" {
                    depth += 1;
                } else if word == "endef" {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(SmolStr::new(body.trim_end_matches('\n')));
                    }
                }
                body.push_str(raw);
                body.push('\n');
            }
        }
    }
}

fn parse_if_chain(
    scanner: &mut LineScanner,
    recipe_prefix: &mut u8,
    expecting_recipe: &mut bool,
    word: &str,
    trimmed: &str,
    loc: &Loc,
) -> Result<Statement, ParseError> {
    let cond = parse_if_cond(word, trimmed, loc)?;
    let then_branch = parse_block(scanner, recipe_prefix, expecting_recipe, true)?;

    // The next line is `else` or `endif` (left unconsumed by parse_block).
    let save_pos = scanner.byte_pos;
    let save_line = scanner.line;
    let next = scanner.next_physical();
    let else_branch = match next {
        Some(line) if first_word(line.trim_start()) == "else" => {
            let rest = line.trim_start()["else".len()..].trim();
            if rest.is_empty() {
                parse_block(scanner, recipe_prefix, expecting_recipe, true)?
            } else {
                let inner_word = first_word(rest);
                let inner_loc = Loc::new(scanner.filename.clone(), scanner.line);
                let nested = parse_if_chain(scanner, recipe_prefix, expecting_recipe, inner_word, rest, &inner_loc)?;
                vec![nested]
            }
        }
        Some(_) => {
            scanner.byte_pos = save_pos;
            scanner.line = save_line;
            Vec::new()
        }
        None => return Err(ParseError::MissingEndif(scanner.loc())),
    };

    // Consume the terminating `endif` (unless the nested-else branch above
    // already consumed its own via recursion into parse_if_chain, which
    // itself expects an enclosing `endif` too — so there is always exactly
    // one `endif` left per chain link here).
    match scanner.next_physical() {
        Some(line) if first_word(line.trim_start()) == "endif" => {}
        _ => return Err(ParseError::MissingEndif(scanner.loc())),
    }

    Ok(Statement::If(IfStatement { cond, then_branch, else_branch, loc: loc.clone() }))
}

fn parse_if_cond(word: &str, trimmed: &str, loc: &Loc) -> Result<IfCond, ParseError> {
    let args = trimmed[word.len()..].trim();
    let mut l = loc.clone();
    match word {
        "ifdef" => {
            let (v, _) = parse_expr(args, &mut l, &[], ParseExprOpt::Normal)?;
            Ok(IfCond::Ifdef(v))
        }
        "ifndef" => {
            let (v, _) = parse_expr(args, &mut l, &[], ParseExprOpt::Normal)?;
            Ok(IfCond::Ifndef(v))
        }
        "ifeq" | "ifneq" => {
            let (a, b) = parse_eq_args(args, &mut l)?;
            if word == "ifeq" {
                Ok(IfCond::Ifeq(a, b))
            } else {
                Ok(IfCond::Ifneq(a, b))
            }
        }
        _ => unreachable!(),
    }
}

/// Parses the two comma/space-delimited arguments of `ifeq`/`ifneq`, which
/// may be written either `(a,b)` or `"a" "b"` / `'a' 'b'`.
fn parse_eq_args(args: &str, loc: &mut Loc) -> Result<(Value, Value), ParseError> {
    let args = args.trim();
    if let Some(inner) = args.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        let (a, consumed) = parse_expr(inner, loc, &[b','], ParseExprOpt::Func)?;
        let rest = inner[consumed..].strip_prefix(',').unwrap_or(&inner[consumed..]);
        let (b, _) = parse_expr(rest.trim(), loc, &[], ParseExprOpt::Func)?;
        Ok((a, b))
    } else {
        let (first, rest) = split_quoted(args)
            .ok_or_else(|| ParseError::Malformed(loc.clone(), "malformed ifeq/ifneq arguments".into()))?;
        let (second, _) = split_quoted(rest.trim())
            .ok_or_else(|| ParseError::Malformed(loc.clone(), "malformed ifeq/ifneq arguments".into()))?;
        let (a, _) = parse_expr(first, loc, &[], ParseExprOpt::Normal)?;
        let (b, _) = parse_expr(second, loc, &[], ParseExprOpt::Normal)?;
        Ok((a, b))
    }
}

fn split_quoted(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let quote = s.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &s[1..];
    let end = rest.find(quote)?;
    Some((&rest[..end], &rest[end + 1..]))
}

/// The set of assignment operators, ordered so multi-byte operators are
/// matched before their single-byte prefix (`::=` before `:=` before `=`).
const ASSIGN_OPS: &[(&str, AssignOp)] = &[
    ("::=", AssignOp::Simple),
    (":=", AssignOp::Simple),
    ("+=", AssignOp::Append),
    ("?=", AssignOp::Conditional),
    ("!=", AssignOp::Simple), // shell-assignment; evaluator special-cases rhs
    ("=", AssignOp::Recursive),
];

fn find_top_level_assign_op(s: &str) -> Option<(usize, usize, AssignOp)> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            _ if depth == 0 => {
                for (op, kind) in ASSIGN_OPS {
                    if s[i..].starts_with(op) {
                        return Some((i, i + op.len(), *kind));
                    }
                }
                if bytes[i] == b':' {
                    // A bare top-level `:` not part of `::=`/`:=` is a rule
                    // separator, not an assignment operator — stop scanning
                    // rather than skip past it and find a later `=` that
                    // belongs to a target-specific variable instead.
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn parse_assignment_or_rule(
    line: &str,
    loc: &Loc,
    is_override: bool,
    export: Option<bool>,
) -> Result<Statement, ParseError> {
    if let Some((op_start, op_end, op)) = find_top_level_assign_op(line) {
        let lhs_text = line[..op_start].trim();
        let rhs_text = line[op_end..].trim_start();
        let mut l1 = loc.clone();
        let (lhs, _) = parse_expr(lhs_text, &mut l1, &[], ParseExprOpt::Normal)?;
        let mut l2 = loc.clone();
        let (rhs, _) = parse_expr(rhs_text, &mut l2, &[], ParseExprOpt::Normal)?;
        return Ok(Statement::Assignment { lhs, op, rhs, is_override, export, loc: loc.clone() });
    }
    parse_rule(line, loc, is_override)
}

fn parse_rule(line: &str, loc: &Loc, is_override: bool) -> Result<Statement, ParseError> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut colon = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            b':' if depth == 0 => {
                colon = Some(i);
                break;
            }
            _ => {}
        }
        i += 1;
    }
    let colon = colon.ok_or_else(|| ParseError::Malformed(loc.clone(), format!("missing separator in rule line: {line}")))?;
    let sep = if line.as_bytes().get(colon + 1) == Some(&b':') { RuleSeparator::Double } else { RuleSeparator::Single };
    let rhs_start = colon + if sep == RuleSeparator::Double { 2 } else { 1 };
    let targets_text = line[..colon].trim();
    let rest = line[rhs_start..].trim_start();

    let mut l1 = loc.clone();
    let (targets, _) = parse_expr(targets_text, &mut l1, &[], ParseExprOpt::Normal)?;

    // A target-specific variable: `targets: VAR = value` (no second
    // top-level colon, just an assignment operator after the first).
    if let Some((op_start, op_end, op)) = find_top_level_assign_op(rest) {
        let var_text = rest[..op_start].trim();
        let rhs_text = rest[op_end..].trim_start();
        let mut lv = loc.clone();
        let (var_name, _) = parse_expr(var_text, &mut lv, &[], ParseExprOpt::Normal)?;
        let mut lr = loc.clone();
        let (rhs, _) = parse_expr(rhs_text, &mut lr, &[], ParseExprOpt::Normal)?;
        return Ok(Statement::TargetSpecificAssignment { targets, var_name, op, rhs, is_override, loc: loc.clone() });
    }

    // A second top-level colon marks a static pattern rule:
    // `targets: target-pattern: prereq-pattern [| order-only-pattern]`.
    let (target_pattern_text, rest) = match find_top_level_colon(rest) {
        Some(colon2) => (Some(rest[..colon2].trim()), rest[colon2 + 1..].trim_start()),
        None => (None, rest),
    };

    let (normal_text, order_only_text) = match rest.find('|') {
        Some(pipe) => (rest[..pipe].trim(), Some(rest[pipe + 1..].trim())),
        None => (rest.trim(), None),
    };
    let mut l2 = loc.clone();
    let normal_deps = if normal_text.is_empty() {
        None
    } else {
        Some(parse_expr(normal_text, &mut l2, &[], ParseExprOpt::Normal)?.0)
    };
    let mut l3 = loc.clone();
    let order_only_deps = match order_only_text {
        Some(t) if !t.is_empty() => Some(parse_expr(t, &mut l3, &[], ParseExprOpt::Normal)?.0),
        _ => None,
    };
    let mut l4 = loc.clone();
    let target_pattern = match target_pattern_text {
        Some(t) if !t.is_empty() => Some(parse_expr(t, &mut l4, &[], ParseExprOpt::Normal)?.0),
        _ => None,
    };

    Ok(Statement::Rule { targets, sep, target_pattern, normal_deps, order_only_deps, loc: loc.clone() })
}

/// Finds the first top-level (paren/brace-depth-zero) `:` in `s`, used to
/// detect the middle separator of a static pattern rule.
fn find_top_level_colon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            b':' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment() {
        let stmts = parse_statements("CC = gcc\n", "Makefile").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0], Statement::Assignment { op: AssignOp::Recursive, .. }));
    }

    #[test]
    fn parses_simple_rule_and_recipe() {
        let src = "all: main.o\n\t$(CC) -o all main.o\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Statement::Rule { sep: RuleSeparator::Single, .. }));
        assert!(matches!(stmts[1], Statement::Recipe { .. }));
    }

    #[test]
    fn parses_ifeq_else_endif() {
        let src = "ifeq ($(X),1)\nA = one\nelse\nA = other\nendif\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Statement::If(ifs) => {
                assert!(matches!(ifs.cond, IfCond::Ifeq(..)));
                assert_eq!(ifs.then_branch.len(), 1);
                assert_eq!(ifs.else_branch.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_define_block() {
        let src = "define greeting\necho hello\necho world\nendef\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        match &stmts[0] {
            Statement::Define { body, .. } => {
                assert_eq!(body.as_str(), "echo hello\necho world");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn double_colon_rule() {
        let src = "foo.o:: foo.c\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        assert!(matches!(stmts[0], Statement::Rule { sep: RuleSeparator::Double, .. }));
    }

    #[test]
    fn static_pattern_rule() {
        let src = "foo.o bar.o: %.o: %.c\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        match &stmts[0] {
            Statement::Rule { target_pattern: Some(_), normal_deps: Some(_), .. } => {}
            other => panic!("expected static pattern rule, got {other:?}"),
        }
    }

    #[test]
    fn order_only_prerequisites() {
        let src = "out: in.txt | outdir\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        match &stmts[0] {
            Statement::Rule { order_only_deps: Some(_), .. } => {}
            other => panic!("expected order-only deps, got {other:?}"),
        }
    }

    #[test]
    fn target_specific_variable_assignment() {
        let src = "foo.o: CFLAGS := -DFOO\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        match &stmts[0] {
            Statement::TargetSpecificAssignment { targets, var_name, op, rhs, .. } => {
                assert_eq!(targets.to_string(), "foo.o");
                assert_eq!(var_name.to_string(), "CFLAGS");
                assert_eq!(*op, AssignOp::Simple);
                assert_eq!(rhs.to_string(), "-DFOO");
            }
            other => panic!("expected target-specific assignment, got {other:?}"),
        }
    }

    #[test]
    fn target_specific_variable_append() {
        let src = "foo.o bar.o: CFLAGS += -DBAR\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        match &stmts[0] {
            Statement::TargetSpecificAssignment { targets, op, .. } => {
                assert_eq!(targets.to_string(), "foo.o bar.o");
                assert_eq!(*op, AssignOp::Append);
            }
            other => panic!("expected target-specific assignment, got {other:?}"),
        }
    }

    #[test]
    fn static_pattern_rule_not_confused_with_target_specific_variable() {
        let src = "foo.o bar.o: %.o: %.c\n";
        let stmts = parse_statements(src, "Makefile").unwrap();
        assert!(matches!(stmts[0], Statement::Rule { target_pattern: Some(_), .. }));
    }
}
