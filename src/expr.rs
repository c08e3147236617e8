//! The dollar-expression AST (`Value`) and its recursive-descent parser.
//!
//! Literal runs accumulate into a plain `String` rather than borrowing from
//! the source buffer: unlike the ninja parser this crate is descended from
//! (which can borrow straight out of a `&'s str` for the lifetime of one
//! static file), makefile text is frequently synthesized at runtime by
//! `$(eval ...)` and `$(call ...)`, so the AST owns its strings.

use std::fmt;

use smol_str::SmolStr;

use crate::loc::Loc;

/// Controls how `#` comments and backslash-newline continuations are
/// treated while parsing a dollar-expression, mirroring the four contexts
/// GNU make itself distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseExprOpt {
    /// A normal right-hand side: `#` starts a comment, backslash-newline
    /// collapses to a single space.
    Normal,
    /// The body of a `define`/`endef` block: no comment stripping.
    Define,
    /// A recipe line: backslash-newline is preserved verbatim (the shell
    /// sees it), `#` is not special.
    Command,
    /// A function argument: terminated by `,`/`)`/`}` at depth zero in
    /// addition to whatever the caller passed.
    Func,
}

/// The dollar-expression AST. A bare literal run, a single-character
/// automatic-variable reference, a `$(name)`/`${name}` variable reference
/// (possibly with a `:pat=subst` suffix), or a function call.
#[derive(Debug, Clone)]
pub enum Value {
    Literal(SmolStr),
    /// `$(name)` / `${name}` where `name` is itself an expression. Single
    /// character references like `$@`/`$<` parse to this shape too, with
    /// `name` being a one-character literal — they are looked up in the
    /// same variable scope as any other reference.
    VarRef(Box<Value>),
    /// `$(name:pattern=replacement)`.
    VarSubst {
        name: Box<Value>,
        pattern: Box<Value>,
        replacement: Box<Value>,
    },
    /// `$(func arg1,arg2,...)`.
    FuncCall { name: SmolStr, args: Vec<Value>, loc: Loc },
    /// The concatenation of several sub-values; the common "mixed literal
    /// and reference" case.
    Concat(Vec<Value>),
}

impl Value {
    pub fn empty() -> Value {
        Value::Literal(SmolStr::default())
    }

    pub fn literal(s: impl Into<SmolStr>) -> Value {
        Value::Literal(s.into())
    }

    /// True if this value is a plain literal with no embedded reference,
    /// letting callers like `ifeq` skip evaluation entirely.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Value::Literal(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(s) => write!(f, "{s}"),
            Value::VarRef(v) => write!(f, "$({v})"),
            Value::VarSubst { name, pattern, replacement } => {
                write!(f, "$({name}:{pattern}={replacement})")
            }
            Value::FuncCall { name, args, .. } => {
                write!(f, "$({name}")?;
                for a in args {
                    write!(f, " {a},")?;
                }
                write!(f, ")")
            }
            Value::Concat(parts) => {
                for p in parts {
                    write!(f, "{p}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}: unterminated variable reference")]
    UnterminatedVarRef(Loc),
    #[error("{0}: *** unterminated call to function '{1}': missing ')'")]
    UnterminatedFuncCall(Loc, SmolStr),
}

/// The set of function names recognized by `$(name ...)`/`${name ...}`
/// syntax (as opposed to a plain variable reference). Kept here, rather
/// than importing the function table, to avoid a parser <-> evaluator
/// dependency cycle; `func.rs` asserts this list stays in sync.
pub const FUNCTION_NAMES: &[&str] = &[
    "patsubst", "strip", "subst", "findstring", "filter", "filter-out", "sort", "word",
    "wordlist", "words", "firstword", "lastword", "join", "wildcard", "dir", "notdir", "suffix",
    "basename", "addsuffix", "addprefix", "realpath", "abspath", "if", "and", "or", "foreach",
    "call", "eval", "value", "origin", "flavor", "shell", "info", "warning", "error", "file",
    "KATI_deprecated_var", "KATI_obsolete_var", "KATI_deprecate_export", "KATI_obsolete_export",
    "KATI_profile_makefile", "KATI_extra_file_deps",
];

fn is_func_name(word: &str) -> bool {
    FUNCTION_NAMES.contains(&word)
}

/// Parses a dollar-expression from `input`, stopping at end-of-input or at
/// the first unescaped byte in `terms` found at nesting depth zero.
/// Returns the parsed value and the number of bytes consumed.
pub fn parse_expr(
    input: &str,
    loc: &mut Loc,
    terms: &[u8],
    opt: ParseExprOpt,
) -> Result<(Value, usize), ParseError> {
    let bytes = input.as_bytes();
    let mut pos = 0usize;
    let mut parts: Vec<Value> = Vec::new();
    let mut buf = String::new();

    macro_rules! flush {
        () => {
            if !buf.is_empty() {
                parts.push(Value::Literal(SmolStr::new(std::mem::take(&mut buf))));
            }
        };
    }

    while pos < bytes.len() {
        let c = bytes[pos];
        if terms.contains(&c) {
            break;
        }
        match c {
            b'#' if matches!(opt, ParseExprOpt::Normal) => {
                // Comment: consume to end of line (excluding the newline).
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                break;
            }
            b'\\' if pos + 1 < bytes.len() && (bytes[pos + 1] == b'\n') => {
                if !matches!(opt, ParseExprOpt::Command) {
                    flush!();
                    parts.push(Value::Literal(SmolStr::new_static(" ")));
                } else {
                    buf.push('\\');
                    buf.push('\n');
                }
                loc.bump_line(1);
                pos += 2;
            }
            b'$' => {
                flush!();
                pos += 1;
                if pos >= bytes.len() {
                    buf.push('$');
                    break;
                }
                let c2 = bytes[pos];
                if c2 == b'$' {
                    buf.push('$');
                    pos += 1;
                } else if c2 == b'(' || c2 == b'{' {
                    let open = c2;
                    let close = if open == b'(' { b')' } else { b'}' };
                    pos += 1;
                    let (value, consumed) = parse_dollar_paren(bytes, pos, loc, close)?;
                    pos += consumed;
                    parts.push(value);
                } else {
                    // Single-character automatic/short variable: $@, $<, $x.
                    let ch_len = utf8_char_len(bytes[pos]);
                    let s = std::str::from_utf8(&bytes[pos..pos + ch_len]).unwrap_or("?");
                    parts.push(Value::VarRef(Box::new(Value::Literal(SmolStr::new(s)))));
                    pos += ch_len;
                }
            }
            b'(' | b'{' if !matches!(opt, ParseExprOpt::Func) => {
                // A literal, non-dollar paren/brace still shields nested
                // commas/terminators from view when we're inside a func-arg
                // scan; at the top level it is just ordinary text.
                buf.push(c as char);
                pos += 1;
            }
            _ => {
                let ch_len = utf8_char_len(c);
                buf.push_str(std::str::from_utf8(&bytes[pos..pos + ch_len]).unwrap_or("?"));
                pos += ch_len;
            }
        }
    }
    flush!();

    let value = match parts.len() {
        0 => Value::empty(),
        1 => parts.into_iter().next().unwrap(),
        _ => Value::Concat(parts),
    };
    Ok((value, pos))
}

fn utf8_char_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

/// Parses the content of a `$(...)`/`${...}` construct, having already
/// consumed the opening delimiter. `close` is the matching close byte.
/// Handles three shapes: a function call (`name arg,arg,...`), a pattern
/// substitution (`name:pat=subst`), and a plain variable reference.
fn parse_dollar_paren(
    bytes: &[u8],
    start: usize,
    loc: &mut Loc,
    close: u8,
) -> Result<(Value, usize), ParseError> {
    // First, scan the leading word (stopping at space/comma/close) without
    // interpreting it, to decide whether this is a function call.
    let mut i = start;
    let mut depth = 0i32;
    let word_start = i;
    while i < bytes.len() {
        let c = bytes[i];
        if depth == 0 && (c == close || c == b',' || c == b' ' || c == b'\t') {
            break;
        }
        if c == b'$' && i + 1 < bytes.len() && (bytes[i + 1] == b'(' || bytes[i + 1] == b'{') {
            // A nested reference in the leading word means this cannot be a
            // plain function-name token; bail out of the word scan early.
            break;
        }
        match c {
            b'(' | b'{' => depth += 1,
            b')' | b'}' if depth > 0 => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    let word = std::str::from_utf8(&bytes[word_start..i]).unwrap_or("");

    if i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t' || bytes[i] == b',') && is_func_name(word) {
        return parse_func_call(bytes, word, start, i, loc, close);
    }
    if i < bytes.len() && bytes[i] == close && is_func_name(word) && !word.is_empty() {
        // Zero-argument call, e.g. `$(shell)`.
        let fname = SmolStr::new(word);
        return Ok((
            Value::FuncCall { name: fname, args: Vec::new(), loc: loc.clone() },
            i + 1 - start,
        ));
    }

    // Not a function: parse the whole balanced span as a variable
    // reference, watching for a top-level `:` ... `=` pattern-substitution
    // suffix. Recursion into nested `$(...)` is what keeps "top-level"
    // meaningful without manual depth bookkeeping for dollar constructs;
    // plain parens are still tracked via `depth` for shell-style nesting.
    let span_start = start;
    let mut pos = span_start;
    let mut name_parts: Vec<Value> = Vec::new();
    let mut buf = String::new();
    let mut colon_at: Option<usize> = None; // offset into name_parts/buf boundary, tracked via flat text instead
    let mut flat = String::new();
    let mut depth = 0i32;

    while pos < bytes.len() {
        let c = bytes[pos];
        if depth == 0 && c == close {
            break;
        }
        if c == b'$' && pos + 1 < bytes.len() && (bytes[pos + 1] == b'(' || bytes[pos + 1] == b'{') {
            if !buf.is_empty() {
                name_parts.push(Value::Literal(SmolStr::new(std::mem::take(&mut buf))));
            }
            let sub_open = bytes[pos + 1];
            let sub_close = if sub_open == b'(' { b')' } else { b'}' };
            pos += 2;
            let (v, consumed) = parse_dollar_paren(bytes, pos, loc, sub_close)?;
            pos += consumed;
            flat.push('\0'); // placeholder marker; pattern-subst split below only
                              // looks at literal ':'/'=' so this never matches.
            name_parts.push(v);
            continue;
        }
        if c == b'(' || c == b'{' {
            depth += 1;
        } else if (c == b')' || c == b'}') && depth > 0 {
            depth -= 1;
        } else if depth == 0 && c == b':' && colon_at.is_none() {
            colon_at = Some(flat.len());
        }
        let ch_len = utf8_char_len(c);
        let s = std::str::from_utf8(&bytes[pos..pos + ch_len]).unwrap_or("?");
        buf.push_str(s);
        flat.push_str(s);
        pos += ch_len;
    }
    if pos >= bytes.len() {
        return Err(ParseError::UnterminatedVarRef(loc.clone()));
    }
    if !buf.is_empty() {
        name_parts.push(Value::Literal(SmolStr::new(buf)));
    }
    let consumed = pos + 1 - span_start;

    // Pattern-substitution only applies when the whole reference was a
    // single flat literal (no nested $ref before the colon) — matching
    // GNU make, which does not allow the variable-name half of `name:p=r`
    // to itself contain references in the common case we implement here.
    if let Some(colon) = colon_at {
        if name_parts.len() == 1 {
            if let Value::Literal(flat_lit) = &name_parts[0] {
                if let Some(eq) = flat_lit[colon..].find('=') {
                    let eq_abs = colon + eq;
                    let name_txt = &flat_lit[..colon];
                    let pat_txt = &flat_lit[colon + 1..eq_abs];
                    let repl_txt = &flat_lit[eq_abs + 1..];
                    let mut sub_loc = loc.clone();
                    let (name_v, _) = parse_expr(name_txt, &mut sub_loc, &[], ParseExprOpt::Normal)?;
                    let (pat_v, _) = parse_expr(pat_txt, &mut sub_loc, &[], ParseExprOpt::Normal)?;
                    let (repl_v, _) = parse_expr(repl_txt, &mut sub_loc, &[], ParseExprOpt::Normal)?;
                    return Ok((
                        Value::VarSubst {
                            name: Box::new(name_v),
                            pattern: Box::new(pat_v),
                            replacement: Box::new(repl_v),
                        },
                        consumed,
                    ));
                }
            }
        }
    }

    let name_value = match name_parts.len() {
        0 => Value::empty(),
        1 => name_parts.into_iter().next().unwrap(),
        _ => Value::Concat(name_parts),
    };
    Ok((Value::VarRef(Box::new(name_value)), consumed))
}

fn parse_func_call(
    bytes: &[u8],
    name: &str,
    start: usize,
    after_name: usize,
    loc: &mut Loc,
    close: u8,
) -> Result<(Value, usize), ParseError> {
    let fname = SmolStr::new(name);
    let call_loc = loc.clone();
    let mut pos = after_name;
    // skip exactly one separator (space/tab run, or a comma) between name
    // and the first argument.
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    let mut args = Vec::new();
    loop {
        if pos >= bytes.len() {
            return Err(ParseError::UnterminatedFuncCall(loc.clone(), fname));
        }
        if bytes[pos] == close {
            pos += 1;
            break;
        }
        if bytes[pos] == b',' {
            pos += 1;
            // allow an immediately-following comma/close to mean empty arg
            continue;
        }
        let rest = std::str::from_utf8(&bytes[pos..]).unwrap_or("");
        let terms = [b',', close];
        let (value, consumed) = parse_expr(rest, loc, &terms, ParseExprOpt::Func)?;
        args.push(value);
        pos += consumed;
    }
    let total = pos - start;
    Ok((Value::FuncCall { name: fname, args, loc: call_loc }, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        let mut loc = Loc::new("test.mk", 1);
        parse_expr(s, &mut loc, &[], ParseExprOpt::Normal).unwrap().0
    }

    #[test]
    fn literal_passthrough() {
        assert_eq!(parse("hello").to_string(), "hello");
    }

    #[test]
    fn simple_var_ref() {
        match parse("$(CC)") {
            Value::VarRef(name) => assert_eq!(name.as_literal(), Some("CC")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn automatic_variable() {
        match parse("$@.o") {
            Value::Concat(parts) => {
                assert!(matches!(&parts[0], Value::VarRef(n) if n.as_literal() == Some("@")));
                assert_eq!(parts[1].as_literal(), Some(".o"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn func_call_splits_args_at_top_level_comma() {
        match parse("$(subst a,b,abc)") {
            Value::FuncCall { name, args, .. } => {
                assert_eq!(name.as_str(), "subst");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_parens_shield_commas() {
        match parse("$(call foo,(a,b),c)") {
            Value::FuncCall { args, .. } => {
                assert_eq!(args.len(), 3);
                assert_eq!(args[1].as_literal(), Some("(a,b)"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pattern_substitution_reference() {
        match parse("$(SRCS:.c=.o)") {
            Value::VarSubst { name, pattern, replacement } => {
                assert_eq!(name.as_literal(), Some("SRCS"));
                assert_eq!(pattern.as_literal(), Some(".c"));
                assert_eq!(replacement.as_literal(), Some(".o"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dollar_dollar_is_literal_dollar() {
        assert_eq!(parse("$$HOME").to_string(), "$HOME");
    }

    #[test]
    fn comment_truncates_normal_parse() {
        assert_eq!(parse("foo # trailing comment").to_string(), "foo ");
    }
}
