//! Recursive-descent template parser.
//!
//! The entry point is [`Parser::parse`], which tokenizes the template and
//! builds a [`Node::Root`] tree. Open `if` blocks are tracked on an explicit
//! stack; a top-level clause keyword (`where`, `order by`, ...) opens a
//! [`ClauseNode`] that stays open until the next clause keyword, a set
//! operator, or the end of the input.

use crate::error::{ErrorCode, Result, TemplateError};
use crate::expr::Expression;
use crate::template::lexer::{Lexer, Token, TokenKind};
use crate::template::node::*;

/// Words that end the current clause without opening a new one.
const CLAUSE_TERMINATORS: &[&str] = &["union", "intersect", "except", "minus", "limit"];

/// An `if` block under construction.
struct OpenIf {
    node: IfNode,
    offset: usize,
}

impl OpenIf {
    fn has_else(&self) -> bool {
        self.node
            .branches
            .last()
            .map_or(false, |b| b.kind == BranchKind::Else)
    }
}

/// Builds a [`Node`] tree from a token stream.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    root: Vec<Node>,
    clause: Option<ClauseNode>,
    open_ifs: Vec<OpenIf>,
    paren_depth: usize,
}

impl<'a> Parser<'a> {
    /// Parse a template into a tree rooted at [`Node::Root`].
    pub fn parse(source: &'a str) -> Result<Node> {
        let tokens = Lexer::new(source).tokenize()?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            root: Vec::new(),
            clause: None,
            open_ifs: Vec::new(),
            paren_depth: 0,
        };
        parser.run()?;
        let root = Node::Root(parser.root);
        tracing::debug!(
            template_len = source.len(),
            nodes = root.count(),
            "parsed SQL template"
        );
        Ok(root)
    }

    // =======================================================================
    // Token helpers
    // =======================================================================

    fn current(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + offset)
    }

    fn error(&self, code: ErrorCode, offset: usize, detail: impl Into<String>) -> TemplateError {
        TemplateError::syntax(code, self.source, offset, detail)
    }

    // =======================================================================
    // Containers
    // =======================================================================

    /// The innermost open container: the current `if` branch, the open
    /// clause, or the root.
    fn container(&mut self) -> &mut Vec<Node> {
        if let Some(open) = self.open_ifs.last_mut() {
            if let Some(branch) = open.node.branches.last_mut() {
                return &mut branch.children;
            }
        }
        match self.clause.as_mut() {
            Some(clause) => &mut clause.children,
            None => &mut self.root,
        }
    }

    fn push_node(&mut self, node: Node) {
        self.container().push(node);
    }

    /// Append text, merging with a preceding text node.
    fn push_text(&mut self, text: &str) {
        let container = self.container();
        if let Some(Node::Text(last)) = container.last_mut() {
            last.push_str(text);
        } else {
            container.push(Node::Text(text.to_string()));
        }
    }

    fn close_clause(&mut self) {
        if let Some(clause) = self.clause.take() {
            self.root.push(Node::Clause(clause));
        }
    }

    // =======================================================================
    // Main loop
    // =======================================================================

    fn run(&mut self) -> Result<()> {
        while let Some(token) = self.current().cloned() {
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Text => self.push_text(token.text),
                TokenKind::OpenParen => {
                    self.paren_depth += 1;
                    self.push_text(token.text);
                }
                TokenKind::CloseParen => {
                    self.paren_depth = self.paren_depth.saturating_sub(1);
                    self.push_text(token.text);
                }
                TokenKind::Word => {
                    if self.try_clause(&token) {
                        continue;
                    }
                    self.push_text(token.text);
                }
                TokenKind::BindVariable { expression, literal } => {
                    let marker = &token.text[..token.text.len() - literal.len()];
                    self.push_node(Node::BindVariable(BindVariableNode {
                        marker: marker.to_string(),
                        expression: self.expression(&token, expression)?,
                        literal: literal.to_string(),
                        offset: token.offset,
                    }));
                }
                TokenKind::EmbeddedVariable { expression } => {
                    self.push_node(Node::EmbeddedVariable(EmbeddedVariableNode {
                        marker: token.text.to_string(),
                        expression: self.expression(&token, expression)?,
                        offset: token.offset,
                    }));
                }
                TokenKind::If { expression } => self.open_if(&token, expression)?,
                TokenKind::ElseIf { expression } => self.open_elseif(&token, expression)?,
                TokenKind::Else => self.open_else(&token)?,
                TokenKind::End => self.close_if(&token)?,
            }
            self.pos += 1;
        }

        if let Some(open) = self.open_ifs.last() {
            return Err(self.error(
                ErrorCode::UnterminatedIf,
                open.offset,
                "`%if` block is never closed with `/*%end*/`",
            ));
        }
        self.close_clause();
        Ok(())
    }

    // =======================================================================
    // Clauses
    // =======================================================================

    /// Open a clause (or end the current one) if the word at the cursor is a
    /// top-level clause keyword. Advances past the keyword on success.
    fn try_clause(&mut self, token: &Token<'a>) -> bool {
        if !self.open_ifs.is_empty() || self.paren_depth > 0 {
            return false;
        }
        if self.source[..token.offset].ends_with('.') {
            return false;
        }

        let word = token.text.to_ascii_lowercase();
        if CLAUSE_TERMINATORS.contains(&word.as_str()) {
            if self.clause.is_none() {
                return false;
            }
            self.close_clause();
            self.push_text(token.text);
            self.pos += 1;
            return true;
        }

        let (kind, len) = match word.as_str() {
            "where" => (ClauseKind::Where, 1),
            "having" => (ClauseKind::Having, 1),
            "set" => (ClauseKind::Set, 1),
            "order" if self.followed_by("by") => (ClauseKind::OrderBy, 3),
            "group" if self.followed_by("by") => (ClauseKind::GroupBy, 3),
            "for" if self.followed_by("update") => (ClauseKind::ForUpdate, 3),
            _ => return false,
        };

        let keyword: String = self.tokens[self.pos..self.pos + len]
            .iter()
            .map(|t| t.text)
            .collect();
        self.close_clause();
        self.clause = Some(ClauseNode {
            kind,
            keyword,
            children: Vec::new(),
        });
        self.pos += len;
        true
    }

    /// Whether the next two tokens are whitespace and then `word`.
    fn followed_by(&self, word: &str) -> bool {
        let gap = match self.peek_ahead(1) {
            Some(t) if t.kind == TokenKind::Text => t.text,
            _ => return false,
        };
        if gap.is_empty() || !gap.chars().all(char::is_whitespace) {
            return false;
        }
        matches!(
            self.peek_ahead(2),
            Some(t) if t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case(word)
        )
    }

    // =======================================================================
    // Conditional blocks
    // =======================================================================

    fn condition(&self, token: &Token<'a>, expression: &str) -> Result<Expression> {
        if expression.is_empty() {
            return Err(self.error(
                ErrorCode::MissingCondition,
                token.offset,
                format!("`{}` requires a condition", token.text),
            ));
        }
        self.expression(token, expression)
    }

    /// Parse a marker's expression, locating any error at the marker.
    fn expression(&self, token: &Token<'a>, expression: &str) -> Result<Expression> {
        Expression::parse(expression).map_err(|e| e.at(self.source, token.offset))
    }

    fn open_if(&mut self, token: &Token<'a>, expression: &str) -> Result<()> {
        let condition = self.condition(token, expression)?;
        self.open_ifs.push(OpenIf {
            node: IfNode {
                branches: vec![Branch {
                    kind: BranchKind::If,
                    directive: token.text.to_string(),
                    condition: Some(condition),
                    children: Vec::new(),
                }],
                end: String::new(),
            },
            offset: token.offset,
        });
        Ok(())
    }

    fn open_elseif(&mut self, token: &Token<'a>, expression: &str) -> Result<()> {
        match self.open_ifs.last() {
            None => {
                return Err(self.error(
                    ErrorCode::ElseIfWithoutIf,
                    token.offset,
                    "`elseif` outside of an `%if` block",
                ));
            }
            Some(open) if open.has_else() => {
                return Err(self.error(
                    ErrorCode::ElseIfAfterElse,
                    token.offset,
                    "`elseif` after `else` in the same block",
                ));
            }
            Some(_) => {}
        }
        let condition = self.condition(token, expression)?;
        self.push_branch(Branch {
            kind: BranchKind::ElseIf,
            directive: token.text.to_string(),
            condition: Some(condition),
            children: Vec::new(),
        });
        Ok(())
    }

    fn open_else(&mut self, token: &Token<'a>) -> Result<()> {
        match self.open_ifs.last() {
            None => {
                return Err(self.error(
                    ErrorCode::ElseWithoutIf,
                    token.offset,
                    "`else` outside of an `%if` block",
                ));
            }
            Some(open) if open.has_else() => {
                return Err(self.error(
                    ErrorCode::ElseAfterElse,
                    token.offset,
                    "more than one `else` in the same block",
                ));
            }
            Some(_) => {}
        }
        self.push_branch(Branch {
            kind: BranchKind::Else,
            directive: token.text.to_string(),
            condition: None,
            children: Vec::new(),
        });
        Ok(())
    }

    fn push_branch(&mut self, branch: Branch) {
        if let Some(open) = self.open_ifs.last_mut() {
            open.node.branches.push(branch);
        }
    }

    fn close_if(&mut self, token: &Token<'a>) -> Result<()> {
        let mut open = self.open_ifs.pop().ok_or_else(|| {
            self.error(
                ErrorCode::EndWithoutIf,
                token.offset,
                "`/*%end*/` without a matching `%if`",
            )
        })?;
        open.node.end = token.text.to_string();
        self.push_node(Node::If(open.node));
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Node {
        Parser::parse(src).unwrap()
    }

    fn root_children(node: &Node) -> &[Node] {
        match node {
            Node::Root(children) => children,
            other => panic!("expected root, got {other:?}"),
        }
    }

    fn code(src: &str) -> ErrorCode {
        Parser::parse(src).unwrap_err().code().unwrap()
    }

    #[test]
    fn plain_sql_is_one_text_node() {
        let tree = parse("select * from aaa");
        assert_eq!(root_children(&tree), &[Node::Text("select * from aaa".into())]);
    }

    #[test]
    fn bind_variables_are_nodes() {
        let tree = parse("select * from aaa where ename = /*name*/'aaa' and sal = /*salary*/-2000");
        let children = root_children(&tree);
        assert_eq!(children.len(), 2);
        let Node::Clause(clause) = &children[1] else {
            panic!("expected where clause");
        };
        assert_eq!(clause.kind, ClauseKind::Where);
        assert_eq!(clause.keyword, "where");
        let binds: Vec<&BindVariableNode> = clause
            .children
            .iter()
            .filter_map(|n| match n {
                Node::BindVariable(b) => Some(b),
                _ => None,
            })
            .collect();
        assert_eq!(binds.len(), 2);
        assert_eq!(binds[0].marker, "/*name*/");
        assert_eq!(binds[0].expression.expr.as_path(), Some("name"));
        assert_eq!(binds[0].literal, "'aaa'");
        assert_eq!(binds[1].literal, "-2000");
    }

    #[test]
    fn clause_keywords_are_case_insensitive_and_keep_spelling() {
        let tree = parse("select a from t WHERE x = 1 Group  By a Having count(*) > 1 ORDER\nBY a FOR UPDATE");
        let kinds: Vec<(ClauseKind, &str)> = root_children(&tree)
            .iter()
            .filter_map(|n| match n {
                Node::Clause(c) => Some((c.kind, c.keyword.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ClauseKind::Where, "WHERE"),
                (ClauseKind::GroupBy, "Group  By"),
                (ClauseKind::Having, "Having"),
                (ClauseKind::OrderBy, "ORDER\nBY"),
                (ClauseKind::ForUpdate, "FOR UPDATE"),
            ]
        );
    }

    #[test]
    fn clause_keywords_in_subqueries_are_text() {
        let tree = parse("select * from t where id in (select id from u where x = 1)");
        let clauses = root_children(&tree)
            .iter()
            .filter(|n| matches!(n, Node::Clause(_)))
            .count();
        assert_eq!(clauses, 1);
    }

    #[test]
    fn qualified_names_are_not_keywords() {
        let tree = parse("select t.where from t");
        assert!(root_children(&tree).iter().all(|n| matches!(n, Node::Text(_))));
    }

    #[test]
    fn order_without_by_is_text() {
        let tree = parse("select order from t");
        assert!(root_children(&tree).iter().all(|n| matches!(n, Node::Text(_))));
    }

    #[test]
    fn set_operator_closes_clause() {
        let tree = parse("select a from t where x = 1 union select a from u");
        let children = root_children(&tree);
        assert!(matches!(children[1], Node::Clause(_)));
        assert_eq!(children[2], Node::Text("union select a from u".into()));
    }

    #[test]
    fn if_elseif_else_branches() {
        let tree = parse(r#"select * from aaa where /*%if a*/x--elseif b--y--else z/*%end*/"#);
        let Node::Clause(clause) = &root_children(&tree)[1] else {
            panic!("expected clause");
        };
        let Node::If(node) = &clause.children[1] else {
            panic!("expected if, got {:?}", clause.children);
        };
        let kinds: Vec<BranchKind> = node.branches.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BranchKind::If, BranchKind::ElseIf, BranchKind::Else]);
        assert!(node.branches[2].condition.is_none());
        assert_eq!(node.branches[1].directive, "--elseif b--");
        assert_eq!(node.end, "/*%end*/");
    }

    #[test]
    fn clause_keywords_inside_if_are_text() {
        let tree = parse("select * from t /*%if a*/where x = 1/*%end*/");
        let children = root_children(&tree);
        assert!(children.iter().all(|n| !matches!(n, Node::Clause(_))));
    }

    #[test]
    fn nested_if_blocks() {
        let tree = parse("/*%if a*/x/*%if b*/y/*%end*/z/*%end*/");
        let Node::If(outer) = &root_children(&tree)[0] else {
            panic!("expected if");
        };
        assert_eq!(outer.branches[0].children.len(), 3);
        assert!(matches!(outer.branches[0].children[1], Node::If(_)));
    }

    #[test]
    fn to_string_is_lossless() {
        let sources = [
            "select * from aaa where ename = /*name*/'aaa' and sal = /*salary*/-2000",
            "select * from aaa where ename in /*name*/('aaa', 'bbb')",
            "select * from aaa where /*%if name != null*/bbb = /*name*/'ccc' /*%end*/",
            r#"select * from aaa where /*%if name == null*/bbb is null--elseif name ==""--bbb = /*name*/'ccc'/*%end*/"#,
            r#"select * from aaa where /*%if name == null*/bbb is null--elseif name == ""----else bbb = /*name*/'ccc'/*%end*/"#,
            "select a, count(*) from t where a = /*a*/1 group by a having count(*) > /*n*/10 order by a for update nowait",
            "update aaa set no = /*no*/1, set name = /*name*/'name' where id = /*id*/1",
            "select * from t -- trailing comment\n/* plain */ where /*#cond*/ and x = 'it''s'",
        ];
        for src in sources {
            assert_eq!(parse(src).to_string(), src);
        }
    }

    #[test]
    fn structural_errors() {
        assert_eq!(code("select 1 /*%end*/"), ErrorCode::EndWithoutIf);
        assert_eq!(code("select 1 /*%if a*/ x"), ErrorCode::UnterminatedIf);
        assert_eq!(code("/*%elseif a*/"), ErrorCode::ElseIfWithoutIf);
        assert_eq!(code("/*%else*/"), ErrorCode::ElseWithoutIf);
        assert_eq!(code("/*%if a*/x--else y--elseif b--z/*%end*/"), ErrorCode::ElseIfAfterElse);
        assert_eq!(code("/*%if a*/x/*%else*/y/*%else*/z/*%end*/"), ErrorCode::ElseAfterElse);
        assert_eq!(code("/*%if*/x/*%end*/"), ErrorCode::MissingCondition);
        assert_eq!(code("/*%if a*/x--elseif --y/*%end*/"), ErrorCode::MissingCondition);
        assert_eq!(code("/*%while a*/x/*%end*/"), ErrorCode::UnknownDirective);
    }

    #[test]
    fn unterminated_if_reports_opener_position() {
        let err = Parser::parse("select 1\nwhere /*%if a*/ x").unwrap_err();
        let pos = err.position().unwrap();
        assert_eq!((pos.line, pos.column), (2, 7));
    }

    #[test]
    fn malformed_condition_is_expression_error() {
        let err = Parser::parse("/*%if a ==*/x/*%end*/").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ExpressionSyntax));
        assert!(matches!(err, TemplateError::Expression { .. }));
    }

    #[test]
    fn malformed_marker_expressions_report_marker_position() {
        let cases = [
            ("select *\nfrom t\nwhere /*%if a ==*/x/*%end*/", (3, 7)),
            ("select *\nfrom t where x = 1\n  and /*%if a*/y--elseif b <--z/*%end*/", (3, 17)),
            ("select /*#a &&*/ from t", (1, 8)),
            ("select * from t where\n x = /*a +*/3", (2, 6)),
        ];
        for (src, (line, column)) in cases {
            let err = Parser::parse(src).unwrap_err();
            assert!(matches!(err, TemplateError::Expression { .. }), "{src}: {err}");
            let pos = err.position().unwrap_or_else(|| panic!("{src}: no position"));
            assert_eq!((pos.line, pos.column), (line, column), "{src}");
        }
    }
}
