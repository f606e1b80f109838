//! Parse tree listeners
//!
//! A listener is registered once on a compiled parser and invoked for every
//! successful parse. [`ParseTreeListener::reset`] is called before each parse so a
//! listener can drop state from the previous run.

use super::tree::{ParseTree, RuleNode, TerminalNode};

pub trait ParseTreeListener: Send {
    fn reset(&mut self) {}

    fn enter_rule(&mut self, _node: &RuleNode) {}

    fn exit_rule(&mut self, _node: &RuleNode) {}

    fn visit_terminal(&mut self, _node: &TerminalNode) {}
}

/// Depth-first walk, entering rules before their children and exiting after.
pub fn walk(listener: &mut dyn ParseTreeListener, tree: &ParseTree) {
    match tree {
        ParseTree::Rule(node) => {
            listener.enter_rule(node);
            for child in &node.children {
                walk(listener, child);
            }
            listener.exit_rule(node);
        }
        ParseTree::Terminal(node) => listener.visit_terminal(node),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ParseTreeListener for NoopListener {}

/// Records walk events as strings (`enter expr`, `terminal NUM 3`, `exit expr`).
#[derive(Debug, Default, Clone)]
pub struct RuleTraceListener {
    events: Vec<String>,
}

impl RuleTraceListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }
}

impl ParseTreeListener for RuleTraceListener {
    fn reset(&mut self) {
        self.events.clear();
    }

    fn enter_rule(&mut self, node: &RuleNode) {
        self.events.push(format!("enter {}", node.rule));
    }

    fn exit_rule(&mut self, node: &RuleNode) {
        self.events.push(format!("exit {}", node.rule));
    }

    fn visit_terminal(&mut self, node: &TerminalNode) {
        self.events
            .push(format!("terminal {} {}", node.symbol, node.token.text));
    }
}
