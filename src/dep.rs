//! The dependency builder: turns merged [`Rule`]s into an index-based
//! `DepNode` arena and a `petgraph` DAG, running implicit/pattern-rule
//! search and cycle detection.

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::prelude::DiGraphMap;
use smol_str::SmolStr;

use crate::loc::Loc;
use crate::rule::{Rule, StaticPatternRule};

/// Per-target scope data collected during evaluation (target-specific
/// variables, `.KATI_DEPFILE`/`.KATI_NINJA_POOL`/`.KATI_VALIDATIONS`),
/// threaded into the matching `DepNode` once the dependency graph is built.
#[derive(Debug, Clone, Default)]
pub struct TargetScope {
    pub vars: IndexMap<SmolStr, SmolStr>,
    pub depfile: Option<SmolStr>,
    pub ninja_pool: Option<SmolStr>,
    pub validations: Vec<SmolStr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u32);

impl DepId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Reconstructs a `DepId` from the raw `u32` node weight `petgraph`
    /// hands back during a graph traversal (the same value `index()`
    /// exposes, since `DiGraphMap<u32, ()>` is keyed by these ids directly).
    pub fn from_raw(raw: u32) -> Self {
        DepId(raw)
    }
}

#[derive(Debug, Clone)]
pub struct DepNode {
    pub target: SmolStr,
    pub prerequisites: Vec<DepId>,
    pub order_only: Vec<DepId>,
    pub recipe: Vec<SmolStr>,
    pub is_phony: bool,
    pub is_double_colon: bool,
    /// Target-specific variables in effect for this node, inherited from
    /// the node that pulled it in as a prerequisite and overridden by any
    /// bindings declared directly on this target (spec.md's scoped-binding
    /// stack, collected up the dependency chain).
    pub vars: indexmap::IndexMap<SmolStr, SmolStr>,
    pub depfile: Option<SmolStr>,
    pub ninja_pool: Option<SmolStr>,
    pub validations: Vec<SmolStr>,
    pub loc: Loc,
}

impl DepNode {
    /// A one-line description for progress reporting: the target name, plus
    /// the first recipe line if there is one (mirroring `make`'s own
    /// terse "building X" style output rather than echoing the full recipe).
    pub fn human_readable(&self) -> String {
        match self.recipe.first() {
            Some(first) => format!("{}: {}", self.target, first),
            None => self.target.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DepError {
    #[error("*** circular dependency dropped: {0}")]
    Cycle(String),
    #[error("*** no rule to make target '{0}'")]
    NoRule(SmolStr),
}

/// The built dependency graph: a `DepNode` arena plus a `petgraph`
/// `DiGraphMap` over `DepId` used purely for cycle detection and
/// topological iteration (the arena's `Vec<DepId>` edges are the
/// authoritative adjacency the executor and ninja emitter walk).
pub struct DepGraph {
    nodes: Vec<DepNode>,
    by_target: HashMap<SmolStr, DepId>,
    graph: DiGraphMap<u32, ()>,
    pub phony_targets: std::collections::HashSet<SmolStr>,
    pub default_targets: Vec<SmolStr>,
}

impl DepGraph {
    pub fn get(&self, id: DepId) -> &DepNode {
        &self.nodes[id.index()]
    }

    pub fn lookup(&self, target: &str) -> Option<DepId> {
        self.by_target.get(target).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DepId, &DepNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (DepId(i as u32), n))
    }

    /// The `petgraph` graph backing this arena, edges pointing from a
    /// consumer to its dependencies. Exposed so the executor can run
    /// `petgraph::visit::Dfs` for transitive skip-on-failure propagation.
    pub fn graph(&self) -> &DiGraphMap<u32, ()> {
        &self.graph
    }

    /// Direct prerequisites and order-only dependencies of `id`.
    pub fn dependencies(&self, id: DepId) -> impl Iterator<Item = DepId> + '_ {
        let node = &self.nodes[id.index()];
        node.prerequisites.iter().chain(node.order_only.iter()).copied()
    }

    /// Nodes that directly depend on `id` (the reverse of [`Self::dependencies`]).
    pub fn dependents(&self, id: DepId) -> impl Iterator<Item = DepId> + '_ {
        self.graph.neighbors_directed(id.0, petgraph::Direction::Incoming).map(DepId)
    }

    pub fn topo_order(&self) -> Result<Vec<DepId>, DepError> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(order) => Ok(order.into_iter().rev().map(DepId).collect()),
            Err(cycle) => {
                let node = &self.nodes[cycle.node_id() as usize];
                Err(DepError::Cycle(node.target.to_string()))
            }
        }
    }
}

/// Builds a [`DepGraph`] from merged ordinary rules, static pattern rules
/// and pattern rules (the latter used for implicit-rule search when an
/// explicit rule's target has no recipe).
pub struct GraphBuilder {
    rules: Vec<Rule>,
    static_patterns: Vec<StaticPatternRule>,
    phony_targets: std::collections::HashSet<SmolStr>,
    default_targets: Vec<SmolStr>,
    target_scopes: HashMap<SmolStr, TargetScope>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            rules: Vec::new(),
            static_patterns: Vec::new(),
            phony_targets: Default::default(),
            default_targets: Vec::new(),
            target_scopes: Default::default(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        if rule.target.as_str() == ".PHONY" {
            self.phony_targets.extend(rule.prerequisites.iter().cloned());
        } else if rule.target.as_str() == ".SUFFIXES" && rule.prerequisites.is_empty() {
            self.rules.retain(|r| !r.is_suffix);
        } else {
            self.rules.push(rule);
        }
    }

    pub fn add_static_pattern(&mut self, spr: StaticPatternRule) {
        self.static_patterns.push(spr);
    }

    pub fn set_default_targets(&mut self, targets: Vec<SmolStr>) {
        self.default_targets = targets;
    }

    /// Registers the target-specific variable scope collected for `target`
    /// during evaluation, merging with any scope already registered for it.
    pub fn add_target_scope(&mut self, target: SmolStr, scope: TargetScope) {
        let entry = self.target_scopes.entry(target).or_default();
        entry.vars.extend(scope.vars);
        if scope.depfile.is_some() {
            entry.depfile = scope.depfile;
        }
        if scope.ninja_pool.is_some() {
            entry.ninja_pool = scope.ninja_pool;
        }
        entry.validations.extend(scope.validations);
    }

    /// Finds an explicit or pattern rule producing `target`, recursing
    /// through prerequisites (memoized via `seen`) and building the arena
    /// incrementally. Implicit-rule search falls back to suffix/pattern
    /// rules (flattened into `self.rules` with `is_pattern` set by the
    /// caller before this runs) when no explicit rule matches.
    pub fn build(mut self) -> Result<DepGraph, DepError> {
        let explicit: Vec<Rule> = std::mem::take(&mut self.rules);
        let mut by_target: HashMap<SmolStr, usize> = HashMap::new();
        let mut patterns: Vec<&Rule> = Vec::new();
        let mut suffix_rules: Vec<&Rule> = Vec::new();
        for (i, r) in explicit.iter().enumerate() {
            if r.is_suffix {
                suffix_rules.push(r);
            } else if r.is_pattern {
                patterns.push(r);
            } else {
                by_target.entry(r.target.clone()).or_insert(i);
            }
        }

        let mut nodes: Vec<DepNode> = Vec::new();
        let mut node_index: HashMap<SmolStr, DepId> = HashMap::new();
        let mut graph = DiGraphMap::new();
        let mut visiting: std::collections::HashSet<SmolStr> = Default::default();

        /// A pattern rule wins only if every substituted prerequisite is
        /// producible: a known explicit/phony target, or a file that
        /// already exists on disk. Tried newest-first (most-recently
        /// registered pattern first), matching spec.md's implicit-rule
        /// search order.
        fn find_matching_pattern(
            target: &str,
            patterns: &[&Rule],
            by_target: &HashMap<SmolStr, usize>,
            phony: &std::collections::HashSet<SmolStr>,
        ) -> Option<Rule> {
            patterns.iter().rev().find_map(|p| {
                let stem = p.pattern_stem(target)?;
                let substituted: Vec<SmolStr> =
                    p.prerequisites.iter().map(|s| SmolStr::new(s.replace('%', &stem))).collect();
                let all_exist = substituted.iter().all(|s| {
                    by_target.contains_key(s) || phony.contains(s) || std::path::Path::new(s.as_str()).exists()
                });
                if !all_exist {
                    return None;
                }
                Some(Rule {
                    target: SmolStr::new(target),
                    is_double_colon: p.is_double_colon,
                    prerequisites: substituted,
                    order_only: p.order_only.iter().map(|s| SmolStr::new(s.replace('%', &stem))).collect(),
                    recipe: p.recipe.clone(),
                    is_pattern: false,
                    is_suffix: false,
                    loc: p.loc.clone(),
                })
            })
        }

        #[allow(clippy::too_many_arguments)]
        fn resolve(
            target: &str,
            explicit: &[Rule],
            by_target: &HashMap<SmolStr, usize>,
            patterns: &[&Rule],
            suffix_rules: &[&Rule],
            static_patterns: &[StaticPatternRule],
            phony: &std::collections::HashSet<SmolStr>,
            target_scopes: &HashMap<SmolStr, TargetScope>,
            inherited_vars: &IndexMap<SmolStr, SmolStr>,
            nodes: &mut Vec<DepNode>,
            node_index: &mut HashMap<SmolStr, DepId>,
            graph: &mut DiGraphMap<u32, ()>,
            visiting: &mut std::collections::HashSet<SmolStr>,
        ) -> Result<DepId, DepError> {
            if let Some(&id) = node_index.get(target) {
                return Ok(id);
            }
            if visiting.contains(target) {
                return Err(DepError::Cycle(target.to_string()));
            }
            visiting.insert(SmolStr::new(target));

            let matched: Option<Rule> = if let Some(&i) = by_target.get(target) {
                Some(explicit[i].clone())
            } else if let Some(spr) = static_patterns.iter().find_map(|s| {
                if s.targets.iter().any(|t| t.as_str() == target) {
                    s.instantiate(target)
                } else {
                    None
                }
            }) {
                Some(spr)
            } else if let Some(m) = find_matching_pattern(target, patterns, by_target, phony) {
                Some(m)
            } else {
                find_matching_pattern(target, suffix_rules, by_target, phony)
            };

            let id = DepId(nodes.len() as u32);
            let rule = matched.unwrap_or_else(|| Rule {
                target: SmolStr::new(target),
                is_double_colon: false,
                prerequisites: Vec::new(),
                order_only: Vec::new(),
                recipe: Vec::new(),
                is_pattern: false,
                is_suffix: false,
                loc: Loc::unknown(),
            });

            let own_scope = target_scopes.get(target);
            let mut vars = inherited_vars.clone();
            if let Some(s) = own_scope {
                for (k, v) in &s.vars {
                    vars.insert(k.clone(), v.clone());
                }
            }

            nodes.push(DepNode {
                target: SmolStr::new(target),
                prerequisites: Vec::new(),
                order_only: Vec::new(),
                recipe: rule.recipe.clone(),
                is_phony: phony.contains(target),
                is_double_colon: rule.is_double_colon,
                vars: vars.clone(),
                depfile: own_scope.and_then(|s| s.depfile.clone()),
                ninja_pool: own_scope.and_then(|s| s.ninja_pool.clone()),
                validations: own_scope.map(|s| s.validations.clone()).unwrap_or_default(),
                loc: rule.loc.clone(),
            });
            node_index.insert(SmolStr::new(target), id);
            graph.add_node(id.0);

            let mut prereq_ids = Vec::with_capacity(rule.prerequisites.len());
            for p in &rule.prerequisites {
                let pid = resolve(
                    p, explicit, by_target, patterns, suffix_rules, static_patterns, phony, target_scopes, &vars,
                    nodes, node_index, graph, visiting,
                )?;
                graph.add_edge(id.0, pid.0, ());
                prereq_ids.push(pid);
            }
            let mut oo_ids = Vec::with_capacity(rule.order_only.len());
            for p in &rule.order_only {
                let pid = resolve(
                    p, explicit, by_target, patterns, suffix_rules, static_patterns, phony, target_scopes, &vars,
                    nodes, node_index, graph, visiting,
                )?;
                graph.add_edge(id.0, pid.0, ());
                oo_ids.push(pid);
            }
            nodes[id.index()].prerequisites = prereq_ids;
            nodes[id.index()].order_only = oo_ids;

            visiting.remove(target);
            Ok(id)
        }

        let roots: Vec<SmolStr> = if self.default_targets.is_empty() {
            explicit.iter().filter(|r| !r.is_pattern).map(|r| r.target.clone()).collect()
        } else {
            self.default_targets.clone()
        };

        let no_vars = IndexMap::new();
        for target in &roots {
            resolve(
                target,
                &explicit,
                &by_target,
                &patterns,
                &suffix_rules,
                &self.static_patterns,
                &self.phony_targets,
                &self.target_scopes,
                &no_vars,
                &mut nodes,
                &mut node_index,
                &mut graph,
                &mut visiting,
            )?;
        }

        Ok(DepGraph {
            nodes,
            by_target: node_index,
            graph,
            phony_targets: self.phony_targets,
            default_targets: roots,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(target: &str, deps: &[&str]) -> Rule {
        Rule {
            target: SmolStr::new(target),
            is_double_colon: false,
            prerequisites: deps.iter().map(|s| SmolStr::new(*s)).collect(),
            order_only: Vec::new(),
            recipe: vec!["true".into()],
            is_pattern: target.contains('%'),
            is_suffix: false,
            loc: Loc::unknown(),
        }
    }

    #[test]
    fn builds_a_simple_chain() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["a.o"]));
        b.add_rule(rule("a.o", &["a.c"]));
        b.add_rule(rule("a.c", &[]));
        b.set_default_targets(vec!["all".into()]);
        let g = b.build().unwrap();
        assert_eq!(g.len(), 3);
        let all = g.lookup("all").unwrap();
        assert_eq!(g.get(all).prerequisites.len(), 1);
    }

    #[test]
    fn detects_cycles() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("a", &["b"]));
        b.add_rule(rule("b", &["a"]));
        b.set_default_targets(vec!["a".into()]);
        assert!(b.build().is_err());
    }

    #[test]
    fn falls_back_to_pattern_rule() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["foo.o"]));
        b.add_rule(rule("foo.c", &[]));
        let mut pat = rule("%.o", &["%.c"]);
        pat.is_pattern = true;
        b.add_rule(pat);
        b.set_default_targets(vec!["all".into()]);
        let g = b.build().unwrap();
        let foo_o = g.lookup("foo.o").unwrap();
        assert_eq!(g.get(foo_o).prerequisites.len(), 1);
        assert_eq!(g.get(g.get(foo_o).prerequisites[0]).target.as_str(), "foo.c");
    }

    #[test]
    fn pattern_rule_skipped_when_substituted_prerequisite_is_missing() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["foo.o"]));
        let mut pat = rule("%.o", &["%.c"]);
        pat.is_pattern = true;
        b.add_rule(pat);
        b.set_default_targets(vec!["all".into()]);
        // No rule, phony target or file produces "foo.c", so the pattern
        // must not match: "foo.o" falls back to a recipe-less node.
        let g = b.build().unwrap();
        let foo_o = g.lookup("foo.o").unwrap();
        assert!(g.get(foo_o).prerequisites.is_empty());
        assert!(g.get(foo_o).recipe.is_empty());
    }

    #[test]
    fn newer_pattern_rule_preferred_over_older_one() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["foo.o"]));
        b.add_rule(rule("foo.c", &[]));
        b.add_rule(rule("foo.s", &[]));
        let mut old_pat = rule("%.o", &["%.c"]);
        old_pat.is_pattern = true;
        b.add_rule(old_pat);
        let mut new_pat = rule("%.o", &["%.s"]);
        new_pat.is_pattern = true;
        b.add_rule(new_pat);
        b.set_default_targets(vec!["all".into()]);
        let g = b.build().unwrap();
        let foo_o = g.lookup("foo.o").unwrap();
        assert_eq!(g.get(g.get(foo_o).prerequisites[0]).target.as_str(), "foo.s");
    }

    #[test]
    fn suffix_rule_tried_only_after_ordinary_patterns_fail() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["foo.o"]));
        b.add_rule(rule("foo.s", &[]));
        let mut suffix = rule("%.o", &["%.c"]);
        suffix.is_pattern = true;
        suffix.is_suffix = true;
        b.add_rule(suffix);
        let mut ordinary = rule("%.o", &["%.s"]);
        ordinary.is_pattern = true;
        b.add_rule(ordinary);
        b.set_default_targets(vec!["all".into()]);
        let g = b.build().unwrap();
        let foo_o = g.lookup("foo.o").unwrap();
        assert_eq!(g.get(g.get(foo_o).prerequisites[0]).target.as_str(), "foo.s");
    }

    #[test]
    fn phony_targets_tracked() {
        let mut b = GraphBuilder::new();
        b.add_rule(Rule {
            target: ".PHONY".into(),
            is_double_colon: false,
            prerequisites: vec!["clean".into()],
            order_only: vec![],
            recipe: vec![],
            is_pattern: false,
            is_suffix: false,
            loc: Loc::unknown(),
        });
        b.add_rule(rule("clean", &[]));
        b.set_default_targets(vec!["clean".into()]);
        let g = b.build().unwrap();
        assert!(g.phony_targets.contains("clean"));
    }

    #[test]
    fn target_scope_vars_inherited_down_the_dependency_chain() {
        let mut b = GraphBuilder::new();
        b.add_rule(rule("all", &["a.o"]));
        b.add_rule(rule("a.o", &["a.c"]));
        b.add_rule(rule("a.c", &[]));
        b.add_target_scope(
            "all".into(),
            TargetScope { vars: IndexMap::from([(SmolStr::new("CFLAGS"), SmolStr::new("-O2"))]), ..Default::default() },
        );
        b.add_target_scope(
            "a.o".into(),
            TargetScope { vars: IndexMap::from([(SmolStr::new("CFLAGS"), SmolStr::new("-O0"))]), ..Default::default() },
        );
        b.set_default_targets(vec!["all".into()]);
        let g = b.build().unwrap();
        let all = g.lookup("all").unwrap();
        let a_o = g.get(all).prerequisites[0];
        let a_c = g.get(a_o).prerequisites[0];
        assert_eq!(g.get(all).vars.get("CFLAGS").unwrap().as_str(), "-O2");
        assert_eq!(g.get(a_o).vars.get("CFLAGS").unwrap().as_str(), "-O0");
        assert_eq!(g.get(a_c).vars.get("CFLAGS").unwrap().as_str(), "-O2");
    }
}
