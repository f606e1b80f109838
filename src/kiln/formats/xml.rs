//! XML output
//!
//! One element per rule, named after the rule, with the matched alternative as an
//! attribute. Tokens become `<token type="SYMBOL">text</token>`.
//!
//! ```text
//! <expr alternative="1">
//!   <token type="NUM">3</token>
//!   <token type="PLUS">+</token>
//!   <token type="NUM">100</token>
//! </expr>
//! ```

use super::registry::{FormatError, Formatter};
use crate::kiln::runtime::ParseTree;

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormatter;

impl Formatter for XmlFormatter {
    fn name(&self) -> &str {
        "xml"
    }

    fn serialize(&self, tree: &ParseTree) -> Result<String, FormatError> {
        let mut serializer = XmlSerializer::default();
        serializer.visit(tree);
        Ok(serializer.output.trim_end().to_string())
    }

    fn description(&self) -> &str {
        "Nested XML elements"
    }
}

#[derive(Default)]
struct XmlSerializer {
    output: String,
    indent_level: usize,
}

impl XmlSerializer {
    fn push_indent(&mut self, s: &str) {
        self.output.push_str(&"  ".repeat(self.indent_level));
        self.output.push_str(s);
    }

    fn visit(&mut self, tree: &ParseTree) {
        match tree {
            ParseTree::Rule(node) => {
                let mut open = format!("<{} alternative=\"{}\"", node.rule, node.alternative);
                if let Some(label) = &node.label {
                    open.push_str(&format!(" label=\"{}\"", escape_xml(label)));
                }
                if node.children.is_empty() {
                    self.push_indent(&format!("{}/>\n", open));
                    return;
                }
                self.push_indent(&format!("{}>\n", open));
                self.indent_level += 1;
                for child in &node.children {
                    self.visit(child);
                }
                self.indent_level -= 1;
                self.push_indent(&format!("</{}>\n", node.rule));
            }
            ParseTree::Terminal(node) if node.token.is_eof() => {
                self.push_indent(&format!("<token type=\"{}\"/>\n", node.symbol));
            }
            ParseTree::Terminal(node) => {
                self.push_indent(&format!(
                    "<token type=\"{}\">{}</token>\n",
                    node.symbol,
                    escape_xml(&node.token.text)
                ));
            }
        }
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::runtime::tree::tests::{sample, terminal};
    use crate::kiln::runtime::RuleNode;

    #[test]
    fn test_xml_output() {
        let output = XmlFormatter.serialize(&sample()).expect("serializes");
        insta::assert_snapshot!(output, @r###"
        <expr alternative="1">
          <token type="NUM">3</token>
          <token type="PLUS">+</token>
          <token type="NUM">100</token>
        </expr>
        "###);
    }

    #[test]
    fn test_nested_and_escaped() {
        let tree = ParseTree::Rule(RuleNode {
            rule: "cmp".into(),
            alternative: 2,
            label: Some("Less".into()),
            children: vec![
                ParseTree::Rule(RuleNode {
                    rule: "empty".into(),
                    alternative: 1,
                    label: None,
                    children: vec![],
                }),
                terminal("LT", "<", 3),
            ],
        });
        let output = XmlFormatter.serialize(&tree).expect("serializes");
        assert_eq!(
            output,
            "<cmp alternative=\"2\" label=\"Less\">\n  <empty alternative=\"1\"/>\n  \
             <token type=\"LT\">&lt;</token>\n</cmp>"
        );
    }
}
