//! Template syntax tree.
//!
//! Every template parsed by the [`super::parser::Parser`] is represented as a
//! tree of [`Node`]s rooted at [`Node::Root`]. The tree is immutable once
//! built and owns all of its children, so `clone()` is a full structural copy
//! and a single tree can be shared between threads and built concurrently.
//!
//! The tree keeps the exact source text of every marker, which makes
//! rendering a node with `Display` lossless: `node.to_string()` reproduces
//! the template it was parsed from.

use std::fmt;

use crate::expr::Expression;

/// A node of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Top-level container.
    Root(Vec<Node>),
    /// Literal SQL, passed through untouched.
    Text(String),
    /// `/*name*/'dummy'`: bound through a placeholder.
    BindVariable(BindVariableNode),
    /// `/*#expr*/`: spliced into the SQL as raw text.
    EmbeddedVariable(EmbeddedVariableNode),
    /// A prunable clause such as `WHERE` or `ORDER BY`.
    Clause(ClauseNode),
    /// An `if` / `elseif` / `else` block.
    If(IfNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindVariableNode {
    /// The marker as written, e.g. `/*name*/`.
    pub marker: String,
    pub expression: Expression,
    /// The dummy literal after the marker; ignored when building.
    pub literal: String,
    /// Byte offset of the marker in the template.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedVariableNode {
    /// The marker as written, e.g. `/*#orderBy*/`.
    pub marker: String,
    pub expression: Expression,
    pub offset: usize,
}

/// Clause keywords that open a prunable [`ClauseNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Where,
    Having,
    OrderBy,
    GroupBy,
    Set,
    ForUpdate,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClauseKind::Where => "WHERE",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Set => "SET",
            ClauseKind::ForUpdate => "FOR UPDATE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClauseNode {
    pub kind: ClauseKind,
    /// The keyword exactly as written, e.g. `order  by`.
    pub keyword: String,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    If,
    ElseIf,
    Else,
}

/// One arm of an [`IfNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub kind: BranchKind,
    /// The opening marker as written, e.g. `/*%if a*/` or `--else`.
    pub directive: String,
    /// `None` only for the `else` arm.
    pub condition: Option<Expression>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// Branches in declaration order; the first is always the `if` arm and
    /// only the last may be an `else` arm.
    pub branches: Vec<Branch>,
    /// The closing marker as written.
    pub end: String,
}

impl Node {
    /// Direct children of container nodes. Branch bodies of an `if` block
    /// are reached through [`IfNode::branches`].
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root(children) => children,
            Node::Clause(clause) => &clause.children,
            Node::Text(_)
            | Node::BindVariable(_)
            | Node::EmbeddedVariable(_)
            | Node::If(_) => &[],
        }
    }

    /// An independently owned deep copy of this subtree.
    pub fn copy(&self) -> Node {
        self.clone()
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        let nested: usize = match self {
            Node::If(node) => node
                .branches
                .iter()
                .flat_map(|b| b.children.iter())
                .map(Node::count)
                .sum(),
            _ => self.children().iter().map(Node::count).sum(),
        };
        1 + nested
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Root(children) => write_all(f, children),
            Node::Text(text) => f.write_str(text),
            Node::BindVariable(bind) => write!(f, "{}{}", bind.marker, bind.literal),
            Node::EmbeddedVariable(embedded) => f.write_str(&embedded.marker),
            Node::Clause(clause) => {
                f.write_str(&clause.keyword)?;
                write_all(f, &clause.children)
            }
            Node::If(node) => {
                for branch in &node.branches {
                    f.write_str(&branch.directive)?;
                    write_all(f, &branch.children)?;
                }
                f.write_str(&node.end)
            }
        }
    }
}

fn write_all(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for node in nodes {
        write!(f, "{node}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Node {
        Node::Text(s.to_string())
    }

    fn sample() -> Node {
        Node::Root(vec![
            text("select * from aaa "),
            Node::Clause(ClauseNode {
                kind: ClauseKind::Where,
                keyword: "where".into(),
                children: vec![
                    text(" "),
                    Node::If(IfNode {
                        branches: vec![
                            Branch {
                                kind: BranchKind::If,
                                directive: "/*%if a*/".into(),
                                condition: Some(Expression::parse("a").unwrap()),
                                children: vec![text("x = 1")],
                            },
                            Branch {
                                kind: BranchKind::Else,
                                directive: "--else".into(),
                                condition: None,
                                children: vec![text(" y = 2")],
                            },
                        ],
                        end: "/*%end*/".into(),
                    }),
                ],
            }),
        ])
    }

    #[test]
    fn display_reproduces_source() {
        assert_eq!(
            sample().to_string(),
            "select * from aaa where /*%if a*/x = 1--else y = 2/*%end*/"
        );
    }

    #[test]
    fn count_includes_branch_bodies() {
        // root, text, clause, text, if, 2 branch texts
        assert_eq!(sample().count(), 7);
    }

    #[test]
    fn copy_is_independent() {
        let original = sample();
        let mut copy = original.copy();
        assert_eq!(copy, original);
        if let Node::Root(children) = &mut copy {
            children.push(text(" for update"));
        }
        assert_ne!(copy, original);
        assert_eq!(original.children().len(), 2);
    }

    #[test]
    fn leaf_nodes_have_no_children() {
        assert!(text("x").children().is_empty());
    }

    #[test]
    fn clause_kind_display() {
        assert_eq!(ClauseKind::OrderBy.to_string(), "ORDER BY");
        assert_eq!(ClauseKind::ForUpdate.to_string(), "FOR UPDATE");
    }
}
