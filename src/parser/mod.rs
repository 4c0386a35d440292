//! Pratt expression parser + recursive-descent statement parser (spec §4.2).
//!
//! Comments are attached in a single streaming pass rather than as a
//! separate post-order tree walk over an already-built AST: leading line
//! comments are drained immediately before each statement is parsed
//! (equivalent to "assign to the next node in pre-order"), and a suffix
//! comment on the same line as a just-finished statement is attached to it
//! (recursing into call/list/block containers to their last inner node),
//! which is equivalent to the reverse post-order walk the spec describes
//! for a token stream that is already left-to-right ordered.

use crate::ast::{
    AccessorKind, AssignOp, BinaryOp, BlockMode, Comment, Literal, Node, NodeKind, Token, TokenKind, UnaryOp,
};
use crate::error::{Err, Kind, Result};
use crate::location::LocationRange;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parse a token stream (as produced by [`crate::lexer::tokenize`]) into the
/// file's root node: a [`NodeKind::Block`] in [`BlockMode::DiscardsResult`]
/// whose statements are the file's top-level statements.
pub fn parse(tokens: Vec<Token>) -> Result<Node> {
    let mut p = Parser { tokens, pos: 0 };
    let start = p.cur().range();
    let mut statements = Vec::new();

    loop {
        let leading = p.collect_leading_comments();
        if matches!(p.cur().kind, TokenKind::Eof) {
            if !leading.is_empty() {
                let mut end = Node::new(p.cur().range(), NodeKind::EndMarker);
                end.leading_comments = leading;
                statements.push(end);
            }
            break;
        }
        let mut stmt = p.parse_statement()?;
        stmt.leading_comments = leading;
        p.try_attach_suffix(&mut stmt);
        statements.push(stmt);
    }

    let end_range = p.cur().range();
    let range = start.union(&end_range);
    Ok(Node::new(range, NodeKind::Block { mode: BlockMode::DiscardsResult, statements }))
}

impl Parser {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.cur().kind == kind
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.cur().kind == kind {
            Ok(self.bump())
        } else {
            Err(self.perr(format!("expected {}", what)))
        }
    }

    fn perr(&self, message: impl Into<String>) -> Err {
        Err::at(Kind::Parse, self.cur().range(), message)
    }

    /// Drain any `LineComment`/`BlockComment`-preceding `LineComment`
    /// tokens sitting just before the next real token. `BlockComment`
    /// tokens are handled by the statement loop itself, not here.
    fn collect_leading_comments(&mut self) -> Vec<Comment> {
        let mut out = Vec::new();
        while matches!(self.cur().kind, TokenKind::LineComment) {
            let t = self.bump();
            out.push(Comment { text: t.text, range: t.range() });
        }
        out
    }

    /// If a suffix comment follows immediately on the same source line as
    /// `node`'s end, consume it and attach it (spec §4.2: "only to nodes
    /// whose range starts and ends on the same line").
    fn try_attach_suffix(&mut self, node: &mut Node) {
        if !matches!(self.cur().kind, TokenKind::SuffixComment) {
            return;
        }
        if self.cur().location.line != node.range.end.line || !node.range.is_single_line() {
            return;
        }
        let t = self.bump();
        let comment = Comment { text: t.text, range: t.range() };
        attach_suffix_recursive(node, comment);
    }

    // -- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> Result<Node> {
        match &self.cur().kind {
            TokenKind::BlockComment => {
                let t = self.bump();
                Ok(Node::new(t.range(), NodeKind::BlockComment(t.text)))
            }
            TokenKind::If => self.parse_conditional(),
            _ => {
                let expr = self.parse_expr(0)?;
                match &expr.kind {
                    NodeKind::Call { .. } | NodeKind::Assignment { .. } => Ok(expr),
                    _ => Err(Err::at(Kind::Parse, expr.range.clone(), "expecting assignment or function call")),
                }
            }
        }
    }

    fn parse_conditional(&mut self) -> Result<Node> {
        let start = self.expect(TokenKind::If, "`if`")?.range();
        self.expect(TokenKind::LeftParen, "`(` after `if`")?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::RightParen, "`)` to close `if` condition")?;
        let then_branch = self.parse_block(BlockMode::DiscardsResult)?;
        let mut end = then_branch.range.clone();

        let else_branch = if self.check(&TokenKind::Else) {
            self.bump();
            let branch = if self.check(&TokenKind::If) {
                self.parse_conditional()?
            } else {
                self.parse_block(BlockMode::DiscardsResult)?
            };
            end = branch.range.clone();
            Some(Box::new(branch))
        } else {
            None
        };

        let range = start.union(&end);
        Ok(Node::new(
            range,
            NodeKind::Condition { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch },
        ))
    }

    fn parse_block(&mut self, mode: BlockMode) -> Result<Node> {
        let start = self.expect(TokenKind::LeftBrace, "`{`")?.range();
        let mut statements = Vec::new();
        loop {
            let leading = self.collect_leading_comments();
            if self.check(&TokenKind::RightBrace) || self.check(&TokenKind::Eof) {
                if !leading.is_empty() {
                    let mut end = Node::new(self.cur().range(), NodeKind::EndMarker);
                    end.leading_comments = leading;
                    statements.push(end);
                }
                break;
            }
            let mut stmt = self.parse_statement()?;
            stmt.leading_comments = leading;
            self.try_attach_suffix(&mut stmt);
            statements.push(stmt);
        }
        let end = self.expect(TokenKind::RightBrace, "`}` to close block")?.range();
        let range = start.union(&end);
        Ok(Node::new(range, NodeKind::Block { mode, statements }))
    }

    // -- expressions (Pratt) ---------------------------------------------

    fn parse_expr(&mut self, min_bp: u8) -> Result<Node> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.cur().kind.clone();
            if kind.is_statement_break()
                || matches!(
                    kind,
                    TokenKind::RightParen
                        | TokenKind::RightBracket
                        | TokenKind::RightBrace
                        | TokenKind::Comma
                        | TokenKind::LeftBrace
                )
            {
                break;
            }

            let Some((l_bp, r_bp, op)) = infix_binding_power(&kind) else { break };
            if l_bp < min_bp {
                break;
            }
            self.bump();

            match op {
                Op::Binary(b) => {
                    let rhs = self.parse_expr(r_bp)?;
                    let range = lhs.range.union(&rhs.range);
                    lhs = Node::new(range, NodeKind::Binary { op: b, left: Box::new(lhs), right: Box::new(rhs) });
                }
                Op::Assign(a) => {
                    if !is_assignable(&lhs.kind) {
                        return Err(Err::at(Kind::Parse, lhs.range.clone(), "left side of assignment is not assignable"));
                    }
                    let rhs = self.parse_expr(r_bp)?;
                    let range = lhs.range.union(&rhs.range);
                    lhs = Node::new(range, NodeKind::Assignment { op: a, lhs: Box::new(lhs), rhs: Box::new(rhs) });
                }
            }
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Node> {
        match &self.cur().kind {
            TokenKind::Bang => {
                let start = self.bump().range();
                let operand = self.parse_expr(PREFIX_BP)?;
                let range = start.union(&operand.range);
                Ok(Node::new(range, NodeKind::Unary { op: UnaryOp::Not, operand: Box::new(operand) }))
            }
            TokenKind::Minus => {
                let start = self.bump().range();
                let operand = self.parse_expr(PREFIX_BP)?;
                let range = start.union(&operand.range);
                Ok(Node::new(range, NodeKind::Unary { op: UnaryOp::Neg, operand: Box::new(operand) }))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut node = self.parse_primary()?;
        loop {
            match &self.cur().kind {
                TokenKind::Dot => {
                    self.bump();
                    let name_tok = self.expect(TokenKind::Identifier, "member name after `.`")?;
                    let range = node.range.union(&name_tok.range());
                    node = Node::new(
                        range,
                        NodeKind::Accessor { base: Box::new(node), accessor: AccessorKind::Member(name_tok.text) },
                    );
                }
                TokenKind::LeftBracket => {
                    self.bump();
                    let index = self.parse_expr(0)?;
                    let end = self.expect(TokenKind::RightBracket, "`]` to close index")?.range();
                    let range = node.range.union(&end);
                    node = Node::new(
                        range,
                        NodeKind::Accessor { base: Box::new(node), accessor: AccessorKind::Index(Box::new(index)) },
                    );
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        match self.cur().kind.clone() {
            TokenKind::Integer => {
                let t = self.bump();
                let value: i64 = t.text.parse().map_err(|_| Err::at(Kind::Lex, t.range(), "integer literal out of range"))?;
                Ok(Node::new(t.range(), NodeKind::Literal(Literal::Integer(value))))
            }
            TokenKind::String => {
                let t = self.bump();
                Ok(Node::new(t.range(), NodeKind::Literal(Literal::Str(t.text))))
            }
            TokenKind::True => {
                let t = self.bump();
                Ok(Node::new(t.range(), NodeKind::Literal(Literal::Bool(true))))
            }
            TokenKind::False => {
                let t = self.bump();
                Ok(Node::new(t.range(), NodeKind::Literal(Literal::Bool(false))))
            }
            TokenKind::LeftBracket => self.parse_list(),
            TokenKind::LeftBrace => self.parse_block(BlockMode::ReturnsScope),
            TokenKind::Identifier => self.parse_identifier_or_call(),
            _ => Err(self.perr("unexpected token")),
        }
    }

    fn parse_list(&mut self) -> Result<Node> {
        let start = self.expect(TokenKind::LeftBracket, "`[`")?.range();
        let mut items = Vec::new();
        loop {
            if self.check(&TokenKind::RightBracket) {
                break;
            }
            if self.check(&TokenKind::BlockComment) {
                let t = self.bump();
                items.push(Node::new(t.range(), NodeKind::BlockComment(t.text)));
                continue;
            }
            let item = self.parse_expr(0)?;
            items.push(item);
            if self.check(&TokenKind::Comma) {
                self.bump();
                continue;
            }
            if self.check(&TokenKind::RightBracket) || self.check(&TokenKind::BlockComment) {
                continue;
            }
            return Err(self.perr("expected `,` between list items"));
        }
        let end = self.expect(TokenKind::RightBracket, "`]` to close list")?.range();
        let range = start.union(&end);
        Ok(Node::new(range, NodeKind::List(items)))
    }

    fn parse_identifier_or_call(&mut self) -> Result<Node> {
        let name_tok = self.expect(TokenKind::Identifier, "identifier")?;
        if !self.check(&TokenKind::LeftParen) {
            return Ok(Node::new(name_tok.range(), NodeKind::Identifier(name_tok.text)));
        }

        self.bump(); // '('
        let mut args = Vec::new();
        loop {
            if self.check(&TokenKind::RightParen) {
                break;
            }
            args.push(self.parse_expr(0)?);
            if self.check(&TokenKind::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        let rparen = self.expect(TokenKind::RightParen, "`)` to close call arguments")?.range();

        let mut end = rparen.clone();
        let block = if self.check(&TokenKind::LeftBrace) {
            let b = self.parse_block(BlockMode::DiscardsResult)?;
            end = b.range.clone();
            Some(Box::new(b))
        } else {
            None
        };

        let range = name_tok.range().union(&end);
        Ok(Node::new(
            range,
            NodeKind::Call { name: name_tok.text, name_range: name_tok.range(), args, block },
        ))
    }
}

fn is_assignable(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::Identifier(_) | NodeKind::Accessor { .. })
}

enum Op {
    Binary(BinaryOp),
    Assign(AssignOp),
}

const PREFIX_BP: u8 = 13;

/// `(left binding power, right binding power, operator)`, ordered per the
/// spec §4.2 precedence table (low to high): ASSIGN < OR < AND < EQUALITY
/// < RELATION < SUM < PREFIX < CALL/DOT. Assignment is right-associative
/// (`r_bp == l_bp`); everything else is left-associative (`r_bp == l_bp + 1`).
fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8, Op)> {
    Some(match kind {
        TokenKind::Equals => (1, 1, Op::Assign(AssignOp::Assign)),
        TokenKind::PlusEquals => (1, 1, Op::Assign(AssignOp::AddAssign)),
        TokenKind::MinusEquals => (1, 1, Op::Assign(AssignOp::SubAssign)),
        TokenKind::OrOr => (3, 4, Op::Binary(BinaryOp::Or)),
        TokenKind::AndAnd => (5, 6, Op::Binary(BinaryOp::And)),
        TokenKind::EqualsEquals => (7, 8, Op::Binary(BinaryOp::Eq)),
        TokenKind::NotEquals => (7, 8, Op::Binary(BinaryOp::Ne)),
        TokenKind::Less => (9, 10, Op::Binary(BinaryOp::Lt)),
        TokenKind::LessEquals => (9, 10, Op::Binary(BinaryOp::Le)),
        TokenKind::Greater => (9, 10, Op::Binary(BinaryOp::Gt)),
        TokenKind::GreaterEquals => (9, 10, Op::Binary(BinaryOp::Ge)),
        TokenKind::Plus => (11, 12, Op::Binary(BinaryOp::Add)),
        TokenKind::Minus => (11, 12, Op::Binary(BinaryOp::Sub)),
        _ => return None,
    })
}

/// Recurse into container nodes to find the node a same-line suffix
/// comment should actually attach to (spec §4.2: "skipping function-
/// call/list/block container nodes... attach to their last inner node
/// instead").
fn attach_suffix_recursive(node: &mut Node, comment: Comment) {
    if !node.is_comment_container() {
        node.suffix_comment = Some(comment);
        return;
    }
    match &mut node.kind {
        NodeKind::Call { block: Some(b), .. } => attach_suffix_recursive(b, comment),
        NodeKind::Call { args, block: None, .. } => {
            if let Some(last) = args.last_mut() {
                attach_suffix_recursive(last, comment);
            } else {
                node.suffix_comment = Some(comment);
            }
        }
        NodeKind::List(items) => {
            if let Some(last) = items.last_mut() {
                attach_suffix_recursive(last, comment);
            } else {
                node.suffix_comment = Some(comment);
            }
        }
        NodeKind::Block { statements, .. } => {
            if let Some(last) = statements.last_mut() {
                attach_suffix_recursive(last, comment);
            } else {
                node.suffix_comment = Some(comment);
            }
        }
        _ => node.suffix_comment = Some(comment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::InputFile;

    fn parse_src(src: &str) -> Node {
        let input = InputFile::new("//t.gn", src.to_string());
        let tokens = crate::lexer::tokenize(&input).expect("lex");
        parse(tokens).expect("parse")
    }

    fn statements(n: &Node) -> &Vec<Node> {
        match &n.kind {
            NodeKind::Block { statements, .. } => statements,
            _ => panic!("not a block"),
        }
    }

    #[test]
    fn assignment_binds_looser_than_sum() {
        let root = parse_src("a = 1 + 2\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Assignment { rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let root = parse_src("a = b = 1\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Assignment { rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Assignment { .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn dot_binds_tighter_than_prefix_minus() {
        let root = parse_src("x = -a.b\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Assignment { rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Unary { op: UnaryOp::Neg, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn call_with_block_parses() {
        let root = parse_src("my_bag(\"foo\") { x = 1 }\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Call { name, args, block, .. } => {
                assert_eq!(name, "my_bag");
                assert_eq!(args.len(), 1);
                assert!(block.is_some());
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn bare_expression_statement_is_rejected() {
        let input = InputFile::new("//t.gn", "1 + 2\n".to_string());
        let tokens = crate::lexer::tokenize(&input).unwrap();
        assert!(parse(tokens).is_err());
    }

    #[test]
    fn if_else_if_chain_parses() {
        let root = parse_src("if (a) { x = 1 } else if (b) { x = 2 } else { x = 3 }\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Condition { else_branch, .. } => {
                let else_branch = else_branch.as_ref().unwrap();
                assert!(matches!(else_branch.kind, NodeKind::Condition { .. }));
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn list_with_trailing_comma() {
        let root = parse_src("x = [1, 2, 3,]\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Assignment { rhs, .. } => match &rhs.kind {
                NodeKind::List(items) => assert_eq!(items.len(), 3),
                other => panic!("expected list, got {:?}", other),
            },
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn block_expression_as_assignment_value() {
        let root = parse_src("x = { a = 1 }\n");
        let stmt = &statements(&root)[0];
        match &stmt.kind {
            NodeKind::Assignment { rhs, .. } => {
                assert!(matches!(rhs.kind, NodeKind::Block { mode: BlockMode::ReturnsScope, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn suffix_comment_attaches_to_statement() {
        let root = parse_src("x = 1 # note\n");
        let stmt = &statements(&root)[0];
        assert!(stmt.suffix_comment.is_some());
    }

    #[test]
    fn leading_comment_attaches_to_next_statement() {
        let root = parse_src("# leading\nx = 1\n");
        let stmt = &statements(&root)[0];
        assert_eq!(stmt.leading_comments.len(), 1);
    }
}
