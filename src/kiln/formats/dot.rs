//! Graphviz output
//!
//! Rules become boxes, tokens become ellipses labelled `SYMBOL: text`. Nodes are
//! numbered in pre-order.

use super::registry::{FormatError, Formatter};
use crate::kiln::runtime::ParseTree;

#[derive(Debug, Clone, Copy, Default)]
pub struct DotFormatter;

impl Formatter for DotFormatter {
    fn name(&self) -> &str {
        "dot"
    }

    fn serialize(&self, tree: &ParseTree) -> Result<String, FormatError> {
        let mut out = String::from("digraph parse_tree {\n  node [shape=box];\n");
        let mut next = 0;
        emit(tree, None, &mut next, &mut out);
        out.push('}');
        Ok(out)
    }

    fn description(&self) -> &str {
        "Graphviz digraph"
    }
}

fn emit(tree: &ParseTree, parent: Option<usize>, next: &mut usize, out: &mut String) {
    let id = *next;
    *next += 1;

    match tree {
        ParseTree::Rule(node) => {
            out.push_str(&format!("  n{} [label=\"{}\"];\n", id, escape_label(&node.rule)));
        }
        ParseTree::Terminal(node) => {
            let label = format!("{}: {}", node.symbol, node.token.text);
            out.push_str(&format!(
                "  n{} [label=\"{}\", shape=ellipse];\n",
                id,
                escape_label(&label)
            ));
        }
    }
    if let Some(parent) = parent {
        out.push_str(&format!("  n{} -> n{};\n", parent, id));
    }
    for child in tree.children() {
        emit(child, Some(id), next, out);
    }
}

fn escape_label(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::runtime::tree::tests::{sample, terminal};
    use crate::kiln::runtime::RuleNode;

    #[test]
    fn test_dot_output() {
        let output = DotFormatter.serialize(&sample()).expect("serializes");
        insta::assert_snapshot!(output, @r###"
        digraph parse_tree {
          node [shape=box];
          n0 [label="expr"];
          n1 [label="NUM: 3", shape=ellipse];
          n0 -> n1;
          n2 [label="PLUS: +", shape=ellipse];
          n0 -> n2;
          n3 [label="NUM: 100", shape=ellipse];
          n0 -> n3;
        }
        "###);
    }

    #[test]
    fn test_labels_are_escaped() {
        let tree = ParseTree::Rule(RuleNode {
            rule: "s".into(),
            alternative: 1,
            label: None,
            children: vec![terminal("STR", "\"a\\b\"", 1)],
        });
        let output = DotFormatter.serialize(&tree).expect("serializes");
        assert!(output.contains(r#"label="STR: \"a\\b\"""#));
    }
}
