//! Parse trees

use serde::Serialize;

use super::lexer::escape_whitespace;
use super::stream::Token;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ParseTree {
    Rule(RuleNode),
    Terminal(TerminalNode),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleNode {
    pub rule: String,
    /// 1-based alternative of the production that matched
    pub alternative: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub children: Vec<ParseTree>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalNode {
    /// Symbolic token name, `EOF` for the end of input
    pub symbol: String,
    pub token: Token,
}

impl RuleNode {
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Text of every terminal below this node, EOF excluded.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }
}

impl ParseTree {
    pub fn as_rule(&self) -> Option<&RuleNode> {
        match self {
            ParseTree::Rule(node) => Some(node),
            ParseTree::Terminal(_) => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&TerminalNode> {
        match self {
            ParseTree::Terminal(node) => Some(node),
            ParseTree::Rule(_) => None,
        }
    }

    pub fn children(&self) -> &[ParseTree] {
        match self {
            ParseTree::Rule(node) => &node.children,
            ParseTree::Terminal(_) => &[],
        }
    }

    /// Number of nodes in the tree, this one included.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(ParseTree::node_count).sum::<usize>()
    }

    /// Rule nodes named `rule`, in pre-order.
    pub fn find_all<'a>(&'a self, rule: &str) -> Vec<&'a RuleNode> {
        let mut found = Vec::new();
        self.collect_rules(rule, &mut found);
        found
    }

    fn collect_rules<'a>(&'a self, rule: &str, found: &mut Vec<&'a RuleNode>) {
        if let ParseTree::Rule(node) = self {
            if node.rule == rule {
                found.push(node);
            }
            for child in &node.children {
                child.collect_rules(rule, found);
            }
        }
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            ParseTree::Rule(node) => {
                for child in &node.children {
                    child.collect_text(out);
                }
            }
            ParseTree::Terminal(node) if !node.token.is_eof() => out.push_str(&node.token.text),
            ParseTree::Terminal(_) => {}
        }
    }

    /// LISP-style rendering: `(expr 3 + 100)`.
    pub fn to_string_tree(&self) -> String {
        match self {
            ParseTree::Terminal(node) => escape_whitespace(&node.token.text),
            ParseTree::Rule(node) if node.children.is_empty() => node.rule.clone(),
            ParseTree::Rule(node) => {
                let children: Vec<String> =
                    node.children.iter().map(ParseTree::to_string_tree).collect();
                format!("({} {})", node.rule, children.join(" "))
            }
        }
    }
}
