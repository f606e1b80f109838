//! Dependency ordering of grammar specifications
//!
//! A grammar that imports another grammar's vocabulary (`options { tokenVocab = V; }`)
//! must be processed after `V`. The resolver parses every specification, builds the
//! import graph and sorts it topologically.
//!
//! Every node carries a reflexive self-edge. Self-edges are part of the graph (they
//! mark a spec as present) but never count as a cycle.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::kiln::error::{KilnError, Result};
use crate::kiln::grammar::{GrammarSpec, GrammarSyntaxError, ParsedGrammar};

/// Directed graph over grammar names. An edge `from -> to` means `from` is
/// processed before `to`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node together with its self-edge.
    pub fn add_node(&mut self, name: &str) {
        self.edges
            .entry(name.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Add `from -> to`. Both ends become nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        if let Some(targets) = self.edges.get_mut(from) {
            targets.insert(to.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|t| t.contains(to))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Kahn's algorithm with a lexically ordered ready set, so nodes without an
    /// ordering constraint come out sorted by name.
    ///
    /// Fails with the names of the nodes left on a cycle.
    pub fn topological_sort(&self) -> std::result::Result<Vec<String>, Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.edges.keys().map(|n| (n.as_str(), 0)).collect();
        for (from, targets) in &self.edges {
            for to in targets.iter().filter(|t| *t != from) {
                *in_degree.entry(to.as_str()).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            let Some(targets) = self.edges.get(name) else {
                continue;
            };
            for to in targets.iter().filter(|t| t.as_str() != name) {
                if let Some(degree) = in_degree.get_mut(to.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(to.as_str());
                    }
                }
            }
        }

        if order.len() == in_degree.len() {
            Ok(order)
        } else {
            let placed: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            Err(in_degree
                .keys()
                .filter(|n| !placed.contains(*n))
                .map(|n| n.to_string())
                .collect())
        }
    }
}

/// Outcome of resolving a batch of specifications.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Parsed grammars, each after every grammar it imports from.
    pub ordered: Vec<ParsedGrammar>,
    /// Specifications excluded because they failed to parse.
    pub rejected: Vec<(GrammarSpec, Vec<GrammarSyntaxError>)>,
    pub graph: DependencyGraph,
}

impl Resolution {
    pub fn names(&self) -> Vec<String> {
        self.ordered.iter().map(|g| g.name().to_string()).collect()
    }
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Parse, build the import graph and order the specifications.
    ///
    /// Unparseable specs are excluded (and logged). Duplicate grammar names and
    /// import cycles are configuration errors.
    pub fn resolve(specs: &[GrammarSpec]) -> Result<Resolution> {
        let mut graph = DependencyGraph::new();
        let mut parsed: BTreeMap<String, ParsedGrammar> = BTreeMap::new();
        let mut rejected = Vec::new();

        for spec in specs {
            match spec.parse() {
                Ok(grammar) => {
                    let name = grammar.name().to_string();
                    if parsed.contains_key(&name) {
                        return Err(KilnError::Configuration(format!(
                            "grammar '{}' is declared more than once (last in {})",
                            name,
                            spec.origin()
                        )));
                    }
                    graph.add_node(&name);
                    parsed.insert(name, grammar);
                }
                Err(errors) => {
                    for error in &errors {
                        warn!(origin = spec.origin(), "excluding grammar: {}", error);
                    }
                    rejected.push((spec.clone(), errors));
                }
            }
        }

        for grammar in parsed.values() {
            if let Some(vocabulary) = grammar.vocabulary() {
                if !parsed.contains_key(vocabulary) {
                    debug!(
                        grammar = grammar.name(),
                        vocabulary, "imported vocabulary is not part of the batch"
                    );
                }
                graph.add_edge(vocabulary, grammar.name());
            }
        }

        let order = graph.topological_sort().map_err(|cycle| {
            KilnError::Configuration(format!(
                "circular vocabulary imports between: {}",
                cycle.join(", ")
            ))
        })?;

        let ordered = order
            .into_iter()
            .filter_map(|name| parsed.remove(&name))
            .collect();

        Ok(Resolution {
            ordered,
            rejected,
            graph,
        })
    }
}

/// Grammar names in processing order.
pub fn resolve_dependency_order(specs: &[GrammarSpec]) -> Result<Vec<String>> {
    Ok(DependencyResolver::resolve(specs)?.names())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::testing::{calc_specs, CALC_LEXER, EXPR_GRAMMAR};

    fn spec(text: &str) -> GrammarSpec {
        GrammarSpec::from_source("inline.g4", text)
    }

    #[test]
    fn test_add_node_inserts_self_edge() {
        let mut graph = DependencyGraph::new();
        graph.add_node("A");
        assert!(graph.has_edge("A", "A"));
        assert_eq!(graph.topological_sort(), Ok(vec!["A".to_string()]));
    }

    #[test]
    fn test_lexical_tie_break() {
        let mut graph = DependencyGraph::new();
        for name in ["C", "A", "B"] {
            graph.add_node(name);
        }
        assert_eq!(
            graph.topological_sort().expect("acyclic"),
            vec!["A", "B", "C"]
        );
    }

    #[test]
    fn test_edges_override_lexical_order() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("Z", "A");
        assert_eq!(graph.topological_sort().expect("acyclic"), vec!["Z", "A"]);
    }

    #[test]
    fn test_cycle_reports_members() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B");
        graph.add_edge("B", "A");
        graph.add_node("C");
        assert_eq!(
            graph.topological_sort(),
            Err(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_vocabulary_comes_first() {
        let order = resolve_dependency_order(&calc_specs()).expect("resolves");
        assert_eq!(order, vec!["CalcLexer", "CalcParser"]);
    }

    #[test]
    fn test_import_cycle_is_configuration_error() {
        let specs = vec![
            spec("parser grammar A; options { tokenVocab = B; } a : X ;"),
            spec("parser grammar B; options { tokenVocab = A; } b : Y ;"),
        ];
        let err = DependencyResolver::resolve(&specs).expect_err("cycle");
        match err {
            KilnError::Configuration(message) => {
                assert!(message.contains('A') && message.contains('B'))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_specs_are_excluded() {
        let specs = vec![spec(EXPR_GRAMMAR), spec("grammar Broken; expr : ")];
        let resolution = DependencyResolver::resolve(&specs).expect("resolves");
        assert_eq!(resolution.names(), vec!["Expr"]);
        assert_eq!(resolution.rejected.len(), 1);
    }

    #[test]
    fn test_missing_vocabulary_is_not_emitted() {
        let specs = vec![spec("parser grammar P; options { tokenVocab = Gone; } p : X ;")];
        let resolution = DependencyResolver::resolve(&specs).expect("resolves");
        assert_eq!(resolution.names(), vec!["P"]);
        assert!(resolution.graph.has_edge("Gone", "P"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let specs = vec![spec(CALC_LEXER), spec(CALC_LEXER)];
        assert!(matches!(
            DependencyResolver::resolve(&specs),
            Err(KilnError::Configuration(_))
        ));
    }
}
