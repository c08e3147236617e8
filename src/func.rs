//! The builtin function table (`$(patsubst ...)`, `$(shell ...)`, etc).
//!
//! Most builtins are pure string functions over already-expanded arguments;
//! a handful (`if`, `and`, `or`, `foreach`, `call`, `eval`) need to control
//! which arguments get expanded and when, so they take the raw `Value`
//! arguments and call back into the evaluator themselves.

use smol_str::SmolStr;

use crate::eval::{EvalError, Evaluator};
use crate::expr::Value;

pub fn is_builtin(name: &str) -> bool {
    crate::expr::FUNCTION_NAMES.contains(&name)
}

/// Dispatches a function call. `args` are the unevaluated argument
/// expressions; builtins that want eager expansion call
/// `ev.eval_to_string(arg)` themselves.
pub fn call(name: &str, args: &[Value], ev: &mut Evaluator, out: &mut String) -> Result<(), EvalError> {
    match name {
        "patsubst" => patsubst(ev, args, out),
        "strip" => strip(ev, args, out),
        "subst" => subst(ev, args, out),
        "findstring" => findstring(ev, args, out),
        "filter" => filter(ev, args, out, false),
        "filter-out" => filter(ev, args, out, true),
        "sort" => sort(ev, args, out),
        "word" => word(ev, args, out),
        "wordlist" => wordlist(ev, args, out),
        "words" => words_count(ev, args, out),
        "firstword" => firstword(ev, args, out),
        "lastword" => lastword(ev, args, out),
        "join" => join(ev, args, out),
        "wildcard" => wildcard(ev, args, out),
        "dir" => dir(ev, args, out),
        "notdir" => notdir(ev, args, out),
        "suffix" => suffix(ev, args, out),
        "basename" => basename(ev, args, out),
        "addsuffix" => addsuffix(ev, args, out),
        "addprefix" => addprefix(ev, args, out),
        "realpath" => realpath(ev, args, out),
        "abspath" => abspath(ev, args, out),
        "if" => if_func(ev, args, out),
        "and" => and_func(ev, args, out),
        "or" => or_func(ev, args, out),
        "foreach" => foreach(ev, args, out),
        "call" => call_func(ev, args, out),
        "eval" => eval_func(ev, args, out),
        "value" => value_func(ev, args, out),
        "origin" => origin_func(ev, args, out),
        "flavor" => flavor_func(ev, args, out),
        "shell" => shell_func(ev, args, out),
        "info" => diagnostic(ev, args, "", out),
        "warning" => diagnostic(ev, args, "Warning: ", out),
        "error" => diagnostic_error(ev, args),
        "file" => file_func(ev, args, out),
        "KATI_deprecated_var" => kati_deprecated_var(ev, args, out),
        "KATI_obsolete_var" => kati_obsolete_var(ev, args, out),
        "KATI_deprecate_export" | "KATI_obsolete_export" => kati_deprecate_export(ev, args, out),
        "KATI_profile_makefile" | "KATI_extra_file_deps" => Ok(()), // diagnostics-only / no-ops in this implementation
        _ => Err(EvalError::UnknownFunction(name.into())),
    }
}

fn words<'a>(s: &'a str) -> impl Iterator<Item = &'a str> {
    s.split_ascii_whitespace()
}

fn eval_args(ev: &mut Evaluator, args: &[Value]) -> Result<Vec<String>, EvalError> {
    args.iter().map(|a| ev.eval_to_string(a)).collect()
}

fn patsubst(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let (pat, repl, text) = (a.get(0).map(String::as_str).unwrap_or(""), a.get(1).map(String::as_str).unwrap_or(""), a.get(2).map(String::as_str).unwrap_or(""));
    let mut first = true;
    for w in words(text) {
        if !first {
            out.push(' ');
        }
        first = false;
        out.push_str(&pattern_subst_one(pat, repl, w));
    }
    Ok(())
}

/// Applies a single `%`-pattern substitution to `word`, the core operation
/// behind `patsubst` and `$(VAR:pat=subst)`.
pub fn pattern_subst_one(pat: &str, repl: &str, word: &str) -> String {
    if let Some(stem) = match_pattern(pat, word) {
        if let Some(pos) = repl.find('%') {
            format!("{}{}{}", &repl[..pos], stem, &repl[pos + 1..])
        } else {
            repl.to_string()
        }
    } else {
        word.to_string()
    }
}

fn match_pattern<'w>(pat: &str, word: &'w str) -> Option<&'w str> {
    match pat.find('%') {
        None => {
            if pat == word {
                Some("")
            } else {
                None
            }
        }
        Some(pos) => {
            let prefix = &pat[..pos];
            let suffix = &pat[pos + 1..];
            if word.len() >= prefix.len() + suffix.len() && word.starts_with(prefix) && word.ends_with(suffix) {
                Some(&word[prefix.len()..word.len() - suffix.len()])
            } else {
                None
            }
        }
    }
}

fn strip(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let s = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    out.push_str(&words(&s).collect::<Vec<_>>().join(" "));
    Ok(())
}

fn subst(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let (from, to, text) = (a.get(0).map(String::as_str).unwrap_or(""), a.get(1).map(String::as_str).unwrap_or(""), a.get(2).map(String::as_str).unwrap_or(""));
    if from.is_empty() {
        out.push_str(text);
    } else {
        out.push_str(&text.replace(from, to));
    }
    Ok(())
}

fn findstring(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let (needle, hay) = (a.get(0).map(String::as_str).unwrap_or(""), a.get(1).map(String::as_str).unwrap_or(""));
    if hay.contains(needle) {
        out.push_str(needle);
    }
    Ok(())
}

fn filter(ev: &mut Evaluator, args: &[Value], out: &mut String, invert: bool) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let pats: Vec<&str> = words(a.get(0).map(String::as_str).unwrap_or("")).collect();
    let text = a.get(1).map(String::as_str).unwrap_or("");
    let mut first = true;
    for w in words(text) {
        let matched = pats.iter().any(|p| match_pattern(p, w).is_some());
        if matched != invert {
            if !first {
                out.push(' ');
            }
            first = false;
            out.push_str(w);
        }
    }
    Ok(())
}

fn sort(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let s = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let mut ws: Vec<&str> = words(&s).collect();
    ws.sort_unstable();
    ws.dedup();
    out.push_str(&ws.join(" "));
    Ok(())
}

fn parse_index(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

fn word(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let n = parse_index(a.get(0).map(String::as_str).unwrap_or("")).ok_or_else(|| EvalError::BadFunctionArgs("word".into()))?;
    if n < 1 {
        return Err(EvalError::BadFunctionArgs("word: index must be >= 1".into()));
    }
    let text = a.get(1).map(String::as_str).unwrap_or("");
    if let Some(w) = words(text).nth((n - 1) as usize) {
        out.push_str(w);
    }
    Ok(())
}

fn wordlist(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let start = parse_index(a.get(0).map(String::as_str).unwrap_or("")).unwrap_or(1).max(1);
    let end = parse_index(a.get(1).map(String::as_str).unwrap_or("")).unwrap_or(0);
    let text = a.get(2).map(String::as_str).unwrap_or("");
    let ws: Vec<&str> = words(text).collect();
    let lo = (start - 1).max(0) as usize;
    let hi = end.max(0) as usize;
    let slice = if lo < ws.len() { &ws[lo..hi.min(ws.len())] } else { &[] };
    out.push_str(&slice.join(" "));
    Ok(())
}

fn words_count(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let s = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    out.push_str(&words(&s).count().to_string());
    Ok(())
}

fn firstword(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let s = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    if let Some(w) = words(&s).next() {
        out.push_str(w);
    }
    Ok(())
}

fn lastword(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let s = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    if let Some(w) = words(&s).last() {
        out.push_str(w);
    }
    Ok(())
}

fn join(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let lhs: Vec<&str> = words(a.get(0).map(String::as_str).unwrap_or("")).collect();
    let rhs: Vec<&str> = words(a.get(1).map(String::as_str).unwrap_or("")).collect();
    let n = lhs.len().max(rhs.len());
    let mut parts = Vec::with_capacity(n);
    for i in 0..n {
        parts.push(format!("{}{}", lhs.get(i).copied().unwrap_or(""), rhs.get(i).copied().unwrap_or("")));
    }
    out.push_str(&parts.join(" "));
    Ok(())
}

fn wildcard(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let pat = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let matches = ev.world().glob(&pat)?;
    out.push_str(&matches.join(" "));
    Ok(())
}

fn path_map(ev: &mut Evaluator, args: &[Value], out: &mut String, f: impl Fn(&str) -> String) -> Result<(), EvalError> {
    let text = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let parts: Vec<String> = words(&text).map(|w| f(w)).collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn dir(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    path_map(ev, args, out, |w| match w.rfind('/') {
        Some(i) => w[..=i].to_string(),
        None => "./".to_string(),
    })
}

fn notdir(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    path_map(ev, args, out, |w| match w.rfind('/') {
        Some(i) => w[i + 1..].to_string(),
        None => w.to_string(),
    })
}

fn suffix(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let text = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let parts: Vec<String> = words(&text)
        .filter_map(|w| {
            let base = w.rsplit('/').next().unwrap_or(w);
            base.rfind('.').map(|i| w[w.len() - (base.len() - i)..].to_string())
        })
        .collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn basename(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    path_map(ev, args, out, |w| {
        let base = w.rsplit('/').next().unwrap_or(w);
        match base.rfind('.') {
            Some(i) => w[..w.len() - (base.len() - i)].to_string(),
            None => w.to_string(),
        }
    })
}

fn addsuffix(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let suf = a.get(0).map(String::as_str).unwrap_or("");
    let parts: Vec<String> = words(a.get(1).map(String::as_str).unwrap_or("")).map(|w| format!("{w}{suf}")).collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn addprefix(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let pre = a.get(0).map(String::as_str).unwrap_or("");
    let parts: Vec<String> = words(a.get(1).map(String::as_str).unwrap_or("")).map(|w| format!("{pre}{w}")).collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn realpath(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let text = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let parts: Vec<String> = words(&text).filter_map(|w| ev.world().canonicalize(w)).collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn abspath(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let text = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let parts: Vec<String> = words(&text).map(|w| ev.world().abspath(w)).collect();
    out.push_str(&parts.join(" "));
    Ok(())
}

fn if_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let cond = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    if !cond.trim().is_empty() {
        if let Some(then) = args.get(1) {
            out.push_str(&ev.eval_to_string(then)?);
        }
    } else if let Some(els) = args.get(2) {
        out.push_str(&ev.eval_to_string(els)?);
    }
    Ok(())
}

fn and_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let mut last = String::new();
    for a in args {
        last = ev.eval_to_string(a)?;
        if last.trim().is_empty() {
            return Ok(());
        }
    }
    out.push_str(&last);
    Ok(())
}

fn or_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    for a in args {
        let v = ev.eval_to_string(a)?;
        if !v.trim().is_empty() {
            out.push_str(&v);
            return Ok(());
        }
    }
    Ok(())
}

fn foreach(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let var_name = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let list = ev.eval_to_string(args.get(1).unwrap_or(&Value::empty()))?;
    let body = args.get(2).cloned().unwrap_or_else(Value::empty);
    let sym = ev.intern(var_name.trim());
    let mut first = true;
    for w in words(&list).map(|w| w.to_string()).collect::<Vec<_>>() {
        let v = ev.eval_foreach_iteration(sym, &w, &body)?;
        if !first {
            out.push(' ');
        }
        first = false;
        out.push_str(&v);
    }
    Ok(())
}

fn call_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let name = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let mut params = Vec::with_capacity(args.len().saturating_sub(1));
    for a in &args[1.min(args.len())..] {
        params.push(ev.eval_to_string(a)?);
    }
    let v = ev.eval_call(name.trim(), &params)?;
    out.push_str(&v);
    Ok(())
}

fn eval_func(ev: &mut Evaluator, args: &[Value], _out: &mut String) -> Result<(), EvalError> {
    let text = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    ev.eval_text_as_statements(&text)
}

fn value_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let name = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    out.push_str(&ev.variable_orig_text(name.trim()));
    Ok(())
}

fn origin_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let name = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    out.push_str(ev.variable_origin(name.trim()).as_str());
    Ok(())
}

fn flavor_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let name = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    out.push_str(ev.variable_flavor(name.trim()));
    Ok(())
}

fn shell_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let cmd = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    let output = ev.run_shell(&cmd)?;
    out.push_str(output.trim_end_matches('\n').replace('\n', " ").as_str());
    Ok(())
}

fn diagnostic(ev: &mut Evaluator, args: &[Value], prefix: &str, _out: &mut String) -> Result<(), EvalError> {
    let msg = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    ev.emit_diagnostic(&format!("{prefix}{msg}"));
    Ok(())
}

fn diagnostic_error(ev: &mut Evaluator, args: &[Value]) -> Result<(), EvalError> {
    let msg = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    Err(EvalError::UserError(msg))
}

fn file_func(ev: &mut Evaluator, args: &[Value], out: &mut String) -> Result<(), EvalError> {
    let spec = ev.eval_to_string(args.get(0).unwrap_or(&Value::empty()))?;
    if let Some(path) = spec.strip_prefix('<') {
        out.push_str(&ev.world().read_file(path.trim())?);
    } else if let Some(rest) = spec.strip_prefix(">>").or_else(|| spec.strip_prefix('>')) {
        let append = spec.starts_with(">>");
        let content = ev.eval_to_string(args.get(1).unwrap_or(&Value::empty()))?;
        ev.world().write_file(rest.trim(), &content, append)?;
    }
    Ok(())
}

fn kati_deprecated_var(ev: &mut Evaluator, args: &[Value], _out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let name = a.get(0).cloned().unwrap_or_default();
    let msg = a.get(1).cloned();
    ev.mark_variable_deprecated(&name, msg.as_deref());
    Ok(())
}

fn kati_obsolete_var(ev: &mut Evaluator, args: &[Value], _out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let name = a.get(0).cloned().unwrap_or_default();
    let msg = a.get(1).cloned();
    ev.mark_variable_obsolete(&name, msg.as_deref());
    Ok(())
}

fn kati_deprecate_export(ev: &mut Evaluator, args: &[Value], _out: &mut String) -> Result<(), EvalError> {
    let a = eval_args(ev, args)?;
    let name = a.get(0).cloned().unwrap_or_default();
    let msg = a.get(1).cloned();
    ev.mark_export_deprecated(&name, msg.as_deref());
    Ok(())
}

pub fn smol(s: impl Into<SmolStr>) -> SmolStr {
    s.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_prefix_and_suffix() {
        assert_eq!(match_pattern("%.c", "foo.c"), Some("foo"));
        assert_eq!(match_pattern("%.c", "foo.o"), None);
        assert_eq!(match_pattern("foo", "foo"), Some(""));
    }

    #[test]
    fn patsubst_one_replaces_stem() {
        assert_eq!(pattern_subst_one("%.c", "%.o", "foo.c"), "foo.o");
        assert_eq!(pattern_subst_one("%.c", "%.o", "bar.h"), "bar.h");
    }
}
