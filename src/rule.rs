//! Rule representation and rule merging (simple/double-colon, pattern,
//! suffix and static-pattern rules).

use smol_str::SmolStr;

use crate::loc::Loc;
use crate::stmt::RuleSeparator;

/// A rule statement as it comes out of the evaluator, before merging:
/// target/prerequisite lists are still whitespace-joined strings.
#[derive(Debug, Clone)]
pub struct RawRule {
    pub targets: String,
    pub sep: RuleSeparator,
    /// `Some` for a static pattern rule (`targets: target-pattern:
    /// prereq-pattern`); `normal_deps`/`order_only_deps` then hold
    /// prerequisite *patterns* rather than literal prerequisites.
    pub target_pattern: Option<String>,
    pub normal_deps: String,
    pub order_only_deps: String,
    pub recipe: Vec<String>,
    pub loc: Loc,
}

/// A fully parsed rule: one target, its prerequisite lists, and its
/// recipe. Multiple `RawRule`s contribute to the same `Rule` when they
/// share a target and are not double-colon.
#[derive(Debug, Clone)]
pub struct Rule {
    pub target: SmolStr,
    pub is_double_colon: bool,
    pub prerequisites: Vec<SmolStr>,
    pub order_only: Vec<SmolStr>,
    pub recipe: Vec<SmolStr>,
    pub is_pattern: bool,
    /// Set when this rule was converted from an old-style suffix rule
    /// (`.c.o:`) rather than written as an explicit `%.o: %.c` pattern.
    /// Suffix rules are tried after ordinary pattern rules during implicit
    /// search (spec.md's dependency builder step ordering).
    pub is_suffix: bool,
    pub loc: Loc,
}

impl Rule {
    pub fn pattern_stem(&self, input: &str) -> Option<SmolStr> {
        if !self.is_pattern {
            return if self.target.as_str() == input { Some(SmolStr::default()) } else { None };
        }
        match_pattern_stem(&self.target, input)
    }
}

fn match_pattern_stem(pat: &str, word: &str) -> Option<SmolStr> {
    let pos = pat.find('%')?;
    let (prefix, suffix) = (&pat[..pos], &pat[pos + 1..]);
    if word.len() >= prefix.len() + suffix.len() && word.starts_with(prefix) && word.ends_with(suffix) {
        Some(SmolStr::new(&word[prefix.len()..word.len() - suffix.len()]))
    } else {
        None
    }
}

fn split_ws(s: &str) -> Vec<SmolStr> {
    s.split_ascii_whitespace().map(SmolStr::new).collect()
}

/// Splits a suffix-rule-style target like `.c.o` into the pattern-rule form
/// `("%.o", "%.c")` (target pattern, implicit prerequisite pattern), or
/// returns `None` if it doesn't look like one: it must have exactly two
/// dots (`.from.to`), since a third dot (`.c.o.bak`) is just an ordinary
/// dotted filename, not a suffix rule.
pub fn suffix_rule_to_pattern(target: &str) -> Option<(SmolStr, SmolStr)> {
    if !target.starts_with('.') {
        return None;
    }
    let rest = &target[1..];
    let dot = rest.find('.')?;
    let from = &rest[..dot];
    let to = &rest[dot + 1..];
    if from.is_empty() || to.is_empty() || from.contains('/') || to.contains('/') || to.contains('.') {
        return None;
    }
    Some((SmolStr::new(format!("%.{to}")), SmolStr::new(format!("%.{from}"))))
}

/// Merges a flat list of `RawRule`s into one `Rule` per (target, colon-kind)
/// pair. Simple-colon rules sharing a target accumulate prerequisites and
/// keep only the last-seen non-empty recipe (GNU make semantics: a target
/// may appear in several rule lines, but only one of them may carry a
/// recipe). Double-colon rules are never merged with each other.
/// Static-pattern-rule raws (`target_pattern.is_some()`) are ignored here;
/// use [`split_static_pattern_rules`] beforehand to route those to
/// [`StaticPatternRule`] instead.
pub fn merge_rules(raw: &[RawRule]) -> Vec<Rule> {
    let mut merged: Vec<Rule> = Vec::new();
    let mut simple_index: std::collections::HashMap<SmolStr, usize> = std::collections::HashMap::new();

    for r in raw {
        if r.target_pattern.is_some() {
            continue;
        }
        let targets = split_ws(&r.targets);
        let prereqs = split_ws(&r.normal_deps);
        let order_only = split_ws(&r.order_only_deps);
        let recipe: Vec<SmolStr> = r.recipe.iter().map(SmolStr::new).collect();

        for t in &targets {
            let (target, is_pattern, is_suffix, implicit_prereq) = match suffix_rule_to_pattern(t) {
                Some((pat, from_pat)) => (pat, true, true, Some(from_pat)),
                None => (t.clone(), t.contains('%'), false, None),
            };
            let mut this_prereqs = prereqs.clone();
            if let Some(p) = implicit_prereq {
                this_prereqs.insert(0, p);
            }
            match r.sep {
                RuleSeparator::Double => {
                    merged.push(Rule {
                        target,
                        is_double_colon: true,
                        prerequisites: this_prereqs,
                        order_only: order_only.clone(),
                        recipe: recipe.clone(),
                        is_pattern,
                        is_suffix,
                        loc: r.loc.clone(),
                    });
                }
                RuleSeparator::Single => {
                    if let Some(&idx) = simple_index.get(&target) {
                        let existing = &mut merged[idx];
                        existing.prerequisites.extend(this_prereqs.iter().cloned());
                        existing.order_only.extend(order_only.iter().cloned());
                        if !recipe.is_empty() {
                            existing.recipe = recipe.clone();
                        }
                    } else {
                        simple_index.insert(target.clone(), merged.len());
                        merged.push(Rule {
                            target,
                            is_double_colon: false,
                            prerequisites: this_prereqs,
                            order_only: order_only.clone(),
                            recipe: recipe.clone(),
                            is_pattern,
                            is_suffix,
                            loc: r.loc.clone(),
                        });
                    }
                }
            }
        }
    }
    merged
}

/// A static pattern rule: `targets: target-pattern: prereq-patterns`.
/// Stored separately from [`Rule`] because its prerequisite list must be
/// instantiated per concrete target via the target's matched stem, rather
/// than shared verbatim the way an ordinary rule's prerequisites are.
#[derive(Debug, Clone)]
pub struct StaticPatternRule {
    pub targets: Vec<SmolStr>,
    pub target_pattern: SmolStr,
    pub prereq_patterns: Vec<SmolStr>,
    pub order_only_patterns: Vec<SmolStr>,
    pub recipe: Vec<SmolStr>,
    pub loc: Loc,
}

impl StaticPatternRule {
    /// Instantiates the rule for one of its concrete `targets`, returning
    /// the target's prerequisite list with `%` substituted by the matched
    /// stem.
    pub fn instantiate(&self, target: &str) -> Option<Rule> {
        let stem = match_pattern_stem(&self.target_pattern, target)?;
        let expand = |p: &SmolStr| -> SmolStr {
            if p.contains('%') { SmolStr::new(p.replace('%', &stem)) } else { p.clone() }
        };
        let mut r = Rule {
            target: SmolStr::new(target),
            is_double_colon: false,
            prerequisites: self.prereq_patterns.iter().map(expand).collect(),
            order_only: self.order_only_patterns.iter().map(expand).collect(),
            recipe: self.recipe.clone(),
            is_pattern: false,
            is_suffix: false,
            loc: self.loc.clone(),
        };
        r.prerequisites.retain(|s| !s.is_empty());
        Some(r)
    }
}

/// Extracts [`StaticPatternRule`]s from a flat list of [`RawRule`]s (the
/// ones carrying `target_pattern`), one per raw rule since each may list
/// several targets sharing the same pattern and recipe.
pub fn split_static_pattern_rules(raw: &[RawRule]) -> Vec<StaticPatternRule> {
    raw.iter()
        .filter_map(|r| {
            let pattern = r.target_pattern.as_deref()?;
            Some(StaticPatternRule {
                targets: split_ws(&r.targets),
                target_pattern: SmolStr::new(pattern),
                prereq_patterns: split_ws(&r.normal_deps),
                order_only_patterns: split_ws(&r.order_only_deps),
                recipe: r.recipe.iter().map(SmolStr::new).collect(),
                loc: r.loc.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_simple_colon_rules_sharing_a_target() {
        let raws = vec![
            RawRule {
                targets: "all".into(),
                sep: RuleSeparator::Single,
                target_pattern: None,
                normal_deps: "a.o".into(),
                order_only_deps: "".into(),
                recipe: vec![],
                loc: Loc::unknown(),
            },
            RawRule {
                targets: "all".into(),
                sep: RuleSeparator::Single,
                target_pattern: None,
                normal_deps: "b.o".into(),
                order_only_deps: "".into(),
                recipe: vec!["echo done".into()],
                loc: Loc::unknown(),
            },
        ];
        let merged = merge_rules(&raws);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].prerequisites.len(), 2);
        assert_eq!(merged[0].recipe.len(), 1);
    }

    #[test]
    fn double_colon_rules_stay_separate() {
        let raws = vec![
            RawRule { targets: "all".into(), sep: RuleSeparator::Double, target_pattern: None, normal_deps: "a".into(), order_only_deps: "".into(), recipe: vec![], loc: Loc::unknown() },
            RawRule { targets: "all".into(), sep: RuleSeparator::Double, target_pattern: None, normal_deps: "b".into(), order_only_deps: "".into(), recipe: vec![], loc: Loc::unknown() },
        ];
        let merged = merge_rules(&raws);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn suffix_rule_recognized() {
        let (pat, from) = suffix_rule_to_pattern(".c.o").unwrap();
        assert_eq!(pat.as_str(), "%.o");
        assert_eq!(from.as_str(), "%.c");
    }

    #[test]
    fn suffix_rule_rejects_three_dots() {
        assert!(suffix_rule_to_pattern(".c.o.bak").is_none());
    }

    #[test]
    fn pattern_stem_matching() {
        assert_eq!(match_pattern_stem("%.o", "foo.o").as_deref(), Some("foo"));
        assert_eq!(match_pattern_stem("%.o", "foo.c"), None);
    }

    #[test]
    fn suffix_rule_converted_to_pattern_rule_by_merge() {
        let raws = vec![RawRule {
            targets: ".c.o".into(),
            sep: RuleSeparator::Single,
            target_pattern: None,
            normal_deps: "".into(),
            order_only_deps: "".into(),
            recipe: vec!["$(CC) -c $< -o $@".into()],
            loc: Loc::unknown(),
        }];
        let merged = merge_rules(&raws);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_pattern);
        assert!(merged[0].is_suffix);
        assert_eq!(merged[0].target.as_str(), "%.o");
        assert_eq!(merged[0].prerequisites, vec![SmolStr::new("%.c")]);
    }

    #[test]
    fn static_pattern_rule_split_and_instantiate() {
        let raws = vec![RawRule {
            targets: "foo.o bar.o".into(),
            sep: RuleSeparator::Single,
            target_pattern: Some("%.o".into()),
            normal_deps: "%.c".into(),
            order_only_deps: "".into(),
            recipe: vec!["$(CC) -c $< -o $@".into()],
            loc: Loc::unknown(),
        }];

        assert!(merge_rules(&raws).is_empty());

        let patterns = split_static_pattern_rules(&raws);
        assert_eq!(patterns.len(), 1);
        let rule = patterns[0].instantiate("foo.o").unwrap();
        assert_eq!(rule.prerequisites, vec![SmolStr::new("foo.c")]);
    }
}
