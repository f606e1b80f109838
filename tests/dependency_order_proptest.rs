//! Property-based tests for dependency ordering
//!
//! Random import forests are fed to the resolver in shuffled order. Whatever the
//! input order, every grammar must come after the grammar whose vocabulary it
//! imports, and the output must not depend on the input order.

use grammar_kiln::kiln::resolver::resolve_dependency_order;
use grammar_kiln::GrammarSpec;
use proptest::prelude::*;
use proptest::sample::Index;

/// `imports[i]` optionally names an earlier grammar that grammar `i` imports from.
fn forest() -> impl Strategy<Value = (Vec<Option<usize>>, Vec<usize>)> {
    prop::collection::vec(prop::option::of(any::<Index>()), 1..10).prop_flat_map(|picks| {
        let imports: Vec<Option<usize>> = picks
            .iter()
            .enumerate()
            .map(|(i, pick)| match pick {
                Some(index) if i > 0 => Some(index.index(i)),
                _ => None,
            })
            .collect();
        let order: Vec<usize> = (0..imports.len()).collect();
        (Just(imports), Just(order).prop_shuffle())
    })
}

fn spec(i: usize, import: Option<usize>) -> GrammarSpec {
    let text = match import {
        Some(j) => format!("parser grammar G{i};\noptions {{ tokenVocab = G{j}; }}\nr : X ;\n"),
        None => format!("lexer grammar G{i};\nX : 'x' ;\n"),
    };
    GrammarSpec::from_source(format!("G{i}.g4"), text)
}

proptest! {
    #[test]
    fn test_imports_come_first((imports, order) in forest()) {
        let specs: Vec<GrammarSpec> = order.iter().map(|&i| spec(i, imports[i])).collect();
        let resolved = resolve_dependency_order(&specs).expect("acyclic by construction");

        prop_assert_eq!(resolved.len(), imports.len());
        let position = |i: usize| {
            resolved
                .iter()
                .position(|name| *name == format!("G{i}"))
                .expect("every grammar is ordered")
        };
        for (i, import) in imports.iter().enumerate() {
            if let Some(j) = import {
                prop_assert!(position(*j) < position(i));
            }
        }

        let canonical: Vec<GrammarSpec> = (0..imports.len()).map(|i| spec(i, imports[i])).collect();
        prop_assert_eq!(resolve_dependency_order(&canonical).expect("acyclic"), resolved);
    }
}
