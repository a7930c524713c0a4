//! Recursive-descent parser with operator-precedence (Pratt) expressions.
//!
//! The parser pulls tokens from the [`Lexer`] with two tokens of lookahead
//! (`current` and `peek`) and builds nodes into an [`Ast`] arena. It stops
//! at the first syntax error; every routine that fails releases the nodes
//! it allocated before the error propagates.

use tracing::{debug, warn};

use crate::ast::{Ast, BinaryOp, Branch, Literal, NodeId, NodeKind, Param, Property, UnaryOp};
use crate::diagnostic::Diagnostic;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::span::Position;
use crate::types::DataType;

/// Call argument lists grow by this many slots at a time.
const ARGUMENT_BLOCK: usize = 4;

/// Deepest allowed nesting of statements and expressions. Every nested
/// statement, operand and chained operator counts one level.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Binding power of infix and postfix operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Assignment,
    LogicalOr,
    LogicalAnd,
    Entangle,
    BitOr,
    BitXor,
    BitAnd,
    Equality,
    Relational,
    Additive,
    Multiplicative,
    Unary,
    Call,
    Member,
}

/// Precedence of `kind` when it follows an operand.
pub fn infix_precedence(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        Equal => Precedence::Assignment,
        OrOr => Precedence::LogicalOr,
        AndAnd => Precedence::LogicalAnd,
        Tilde => Precedence::Entangle,
        Pipe => Precedence::BitOr,
        Caret => Precedence::BitXor,
        Ampersand => Precedence::BitAnd,
        EqualEqual | BangEqual => Precedence::Equality,
        Less | LessEqual | Greater | GreaterEqual => Precedence::Relational,
        Plus | Minus => Precedence::Additive,
        Star | Slash => Precedence::Multiplicative,
        LParen => Precedence::Call,
        Dot => Precedence::Member,
        _ => Precedence::Lowest,
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    let op = match kind {
        Equal => BinaryOp::Assign,
        OrOr => BinaryOp::Or,
        AndAnd => BinaryOp::And,
        Tilde => BinaryOp::Entangle,
        Pipe => BinaryOp::BitOr,
        Caret => BinaryOp::BitXor,
        Ampersand => BinaryOp::BitAnd,
        EqualEqual => BinaryOp::Eq,
        BangEqual => BinaryOp::Ne,
        Less => BinaryOp::Lt,
        LessEqual => BinaryOp::Le,
        Greater => BinaryOp::Gt,
        GreaterEqual => BinaryOp::Ge,
        Plus => BinaryOp::Add,
        Minus => BinaryOp::Sub,
        Star => BinaryOp::Mul,
        Slash => BinaryOp::Div,
        _ => return None,
    };
    Some(op)
}

/// A parsed translation unit.
#[derive(Debug)]
pub struct ParseOutput {
    pub ast: Ast,
    pub root: NodeId,
    /// Lexical diagnostics collected while parsing.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a whole source string into a `Program` tree.
pub fn parse(source: &str) -> Result<ParseOutput, ParseError> {
    let mut parser = Parser::new(source);
    let root = parser.parse_program()?;
    let (ast, diagnostics) = parser.finish();
    Ok(ParseOutput {
        ast,
        root,
        diagnostics,
    })
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    peek: Token,
    ast: Ast,
    depth: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Parser {
            lexer,
            current,
            peek,
            ast: Ast::new(),
            depth: 0,
        }
    }

    /// Hand over the arena and the lexical diagnostics.
    pub fn finish(mut self) -> (Ast, Vec<Diagnostic>) {
        let diagnostics = self.lexer.take_diagnostics();
        (self.ast, diagnostics)
    }

    pub fn parse_program(&mut self) -> Result<NodeId, ParseError> {
        let position = self.current.position();
        let mut statements = Vec::new();
        while self.current.kind != TokenKind::Eof {
            let statement = self.parse_statement()?;
            statements.push(statement);
        }
        let root = self.node(NodeKind::Program { statements }, position)?;
        self.ast.set_root(root);
        debug!(nodes = self.ast.len(), "parsed program");
        Ok(root)
    }

    pub fn parse_statement(&mut self) -> Result<NodeId, ParseError> {
        self.nested(|p| match p.current.kind {
            TokenKind::Let => p.parse_let(true),
            TokenKind::Function => p.parse_function(),
            TokenKind::Import => p.parse_import(),
            TokenKind::Export => p.parse_export(),
            TokenKind::If => p.parse_if(),
            TokenKind::While => p.parse_while(),
            TokenKind::For => p.parse_for(),
            TokenKind::Return => p.parse_return(),
            TokenKind::Entangle => p.parse_entangle(),
            TokenKind::LBrace => p.parse_block(),
            TokenKind::Quantum
                if p.peek.kind == TokenKind::Identifier && p.peek.text == "measure" =>
            {
                p.parse_measure()
            }
            _ => p.parse_expression_statement(),
        })
    }

    /// Parse an expression whose operators all bind tighter than `min`.
    pub fn parse_expression(&mut self, min: Precedence) -> Result<NodeId, ParseError> {
        self.nested(|p| {
            let mut left = p.parse_prefix()?;
            loop {
                let precedence = infix_precedence(p.current.kind);
                if precedence <= min {
                    break;
                }
                // Each chained operator deepens the tree by one node.
                p.enter()?;
                left = match p.current.kind {
                    TokenKind::LParen => p.parse_call(left)?,
                    TokenKind::Dot => p.parse_member(left)?,
                    _ => p.parse_binary(left, precedence)?,
                };
            }
            Ok(left)
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_prefix(&mut self) -> Result<NodeId, ParseError> {
        let token = self.current.clone();
        let position = token.position();
        match token.kind {
            TokenKind::Identifier => {
                self.advance();
                self.node(NodeKind::Identifier(token.text), position)
            }
            TokenKind::Int => {
                self.advance();
                let value = token
                    .text
                    .parse::<i64>()
                    .map_err(|_| invalid_literal(&token))?;
                self.node(NodeKind::Literal(Literal::Int(value)), position)
            }
            TokenKind::Float => {
                self.advance();
                let value = token
                    .text
                    .parse::<f64>()
                    .map_err(|_| invalid_literal(&token))?;
                self.node(NodeKind::Literal(Literal::Float(value)), position)
            }
            TokenKind::String => {
                self.advance();
                self.node(NodeKind::Literal(Literal::String(unescape(&token.text))), position)
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                let value = token.kind == TokenKind::True;
                self.node(NodeKind::Literal(Literal::Bool(value)), position)
            }
            TokenKind::Null => {
                self.advance();
                self.node(NodeKind::Literal(Literal::Null), position)
            }
            TokenKind::Minus | TokenKind::Bang | TokenKind::Quantum => {
                self.advance();
                if token.kind == TokenKind::Minus && self.at_min_int_magnitude() {
                    self.advance();
                    return self.node(NodeKind::Literal(Literal::Int(i64::MIN)), position);
                }
                let op = match token.kind {
                    TokenKind::Minus => UnaryOp::Neg,
                    TokenKind::Bang => UnaryOp::Not,
                    _ => UnaryOp::Quantum,
                };
                let operand = self.parse_expression(Precedence::Unary)?;
                self.node(NodeKind::Unary { op, operand }, position)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Superposition => self.parse_superposition(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// `-9223372036854775808` has no positive counterpart in `i64`, so the
    /// minus sign folds into the literal when nothing binds to the digits
    /// more tightly than the sign does.
    fn at_min_int_magnitude(&self) -> bool {
        self.current.kind == TokenKind::Int
            && self.current.text.parse::<u64>() == Ok(i64::MIN.unsigned_abs())
            && infix_precedence(self.peek.kind) < Precedence::Call
    }

    fn parse_binary(&mut self, left: NodeId, precedence: Precedence) -> Result<NodeId, ParseError> {
        let operator = self.advance();
        let op = binary_op(operator.kind).ok_or_else(|| unexpected_token(&operator, "operator"))?;
        // Assignment is right associative.
        let right_min = if op == BinaryOp::Assign {
            Precedence::Lowest
        } else {
            precedence
        };
        let right = self.parse_expression(right_min)?;
        self.node(NodeKind::Binary { op, left, right }, operator.position())
    }

    fn parse_member(&mut self, left: NodeId) -> Result<NodeId, ParseError> {
        let dot = self.advance();
        let name = self.expect(TokenKind::Identifier, "member name")?;
        let position = name.position();
        let right = self.node(NodeKind::Identifier(name.text), position)?;
        self.node(
            NodeKind::Binary {
                op: BinaryOp::Member,
                left,
                right,
            },
            dot.position(),
        )
    }

    fn parse_call(&mut self, callee: NodeId) -> Result<NodeId, ParseError> {
        let open = self.advance();
        let mut args: Vec<NodeId> = Vec::new();
        if self.current.kind != TokenKind::RParen {
            loop {
                if args.len() == args.capacity() {
                    args.try_reserve_exact(ARGUMENT_BLOCK)
                        .map_err(|_| ParseError::ResourceExhausted {
                            what: "call arguments",
                        })?;
                }
                args.push(self.parse_expression(Precedence::Lowest)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after call arguments")?;
        self.node(NodeKind::Call { callee, args }, open.position())
    }

    fn parse_superposition(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        self.expect(TokenKind::LBrace, "'{' after 'superposition'")?;
        let mut branches = Vec::new();
        loop {
            let value = self.parse_expression(Precedence::Lowest)?;
            self.expect(TokenKind::Colon, "':' between branch value and weight")?;
            let weight = self.parse_expression(Precedence::Lowest)?;
            branches.push(Branch { value, weight });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}' after superposition branches")?;
        self.node(NodeKind::Superposition { branches }, keyword.position())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_expression_statement(&mut self) -> Result<NodeId, ParseError> {
        let position = self.current.position();
        let expr = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Semicolon, "';' after expression")?;
        self.node(NodeKind::ExprStmt { expr }, position)
    }

    fn parse_let(&mut self, terminated: bool) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let name = self.expect(TokenKind::Identifier, "variable name after 'let'")?;
        let annotation = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Equal) {
            Some(self.parse_expression(Precedence::Lowest)?)
        } else {
            None
        };
        if terminated {
            self.expect(TokenKind::Semicolon, "';' after variable declaration")?;
        }
        self.node(
            NodeKind::VarDecl {
                name: name.text,
                annotation,
                init,
            },
            keyword.position(),
        )
    }

    fn parse_function(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.expect(TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RParen {
            loop {
                let param = self.expect(TokenKind::Identifier, "parameter name")?;
                self.expect(TokenKind::Colon, "':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: param.text.clone(),
                    ty,
                    position: param.position(),
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;
        let return_type = if self.eat(TokenKind::Colon) {
            self.parse_type()?
        } else {
            DataType::Void
        };
        if self.current.kind != TokenKind::LBrace {
            return Err(self.unexpected("'{' before function body"));
        }
        let body = self.parse_block()?;
        self.node(
            NodeKind::FunctionDecl {
                name: name.text,
                params,
                return_type,
                body,
            },
            keyword.position(),
        )
    }

    fn parse_import(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let path = match self.current.kind {
            TokenKind::String => unescape(&self.advance().text),
            TokenKind::Identifier => self.advance().text,
            _ => return Err(self.unexpected("module path after 'import'")),
        };
        self.expect(TokenKind::Semicolon, "';' after import")?;
        self.node(NodeKind::Import { path }, keyword.position())
    }

    fn parse_export(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let declaration = match self.current.kind {
            TokenKind::Let => self.parse_let(true)?,
            TokenKind::Function => self.parse_function()?,
            _ => return Err(self.unexpected("declaration after 'export'")),
        };
        self.node(NodeKind::Export { declaration }, keyword.position())
    }

    fn parse_if(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        let then_branch = self.parse_statement()?;
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        self.node(
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            },
            keyword.position(),
        )
    }

    fn parse_while(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::RParen, "')' after condition")?;
        let body = self.parse_statement()?;
        self.node(NodeKind::While { condition, body }, keyword.position())
    }

    fn parse_for(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        self.expect(TokenKind::LParen, "'(' after 'for'")?;
        let init = match self.current.kind {
            TokenKind::Semicolon => None,
            TokenKind::Let => Some(self.parse_let(false)?),
            _ => {
                let position = self.current.position();
                let expr = self.parse_expression(Precedence::Lowest)?;
                Some(self.node(NodeKind::ExprStmt { expr }, position)?)
            }
        };
        self.expect(TokenKind::Semicolon, "';' after loop initializer")?;
        let condition = self.optional_expression(TokenKind::Semicolon)?;
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;
        let step = self.optional_expression(TokenKind::RParen)?;
        self.expect(TokenKind::RParen, "')' after loop header")?;
        let body = self.parse_statement()?;
        self.node(
            NodeKind::For {
                init,
                condition,
                step,
                body,
            },
            keyword.position(),
        )
    }

    fn parse_return(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let value = self.optional_expression(TokenKind::Semicolon)?;
        self.expect(TokenKind::Semicolon, "';' after return")?;
        self.node(NodeKind::Return { value }, keyword.position())
    }

    fn parse_entangle(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance();
        let mut entities = vec![self.parse_expression(Precedence::Lowest)?];
        self.expect(TokenKind::Comma, "',' between entangled values")?;
        loop {
            entities.push(self.parse_expression(Precedence::Lowest)?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let mut properties = Vec::new();
        if self.eat(TokenKind::LBrace) {
            loop {
                let name = self.expect(TokenKind::Identifier, "property name")?;
                self.expect(TokenKind::Colon, "':' after property name")?;
                let value = self.parse_expression(Precedence::Lowest)?;
                properties.push(Property {
                    name: name.text,
                    value,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "'}' after entanglement properties")?;
        }
        self.expect(TokenKind::Semicolon, "';' after entangle statement")?;
        self.node(
            NodeKind::Entangle {
                entities,
                properties,
            },
            keyword.position(),
        )
    }

    fn parse_measure(&mut self) -> Result<NodeId, ParseError> {
        let keyword = self.advance(); // quantum
        self.advance(); // measure
        let operand = self.parse_expression(Precedence::Lowest)?;
        self.expect(TokenKind::Semicolon, "';' after measurement")?;
        self.node(NodeKind::Measure { operand }, keyword.position())
    }

    fn parse_block(&mut self) -> Result<NodeId, ParseError> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}' to close block")?;
        self.node(NodeKind::Block { statements }, open.position())
    }

    /// `[quantum] (int | float | bool | string) | void | superposition | entanglement`
    fn parse_type(&mut self) -> Result<DataType, ParseError> {
        let quantum = self.eat(TokenKind::Quantum);
        let token = match self.current.kind {
            TokenKind::Identifier | TokenKind::Superposition => self.advance(),
            _ => return Err(self.unexpected("type name")),
        };
        let invalid = || ParseError::InvalidType {
            name: token.text.clone(),
            line: token.line,
            column: token.column,
        };
        let base = DataType::from_name(&token.text).ok_or_else(invalid)?;
        if !quantum {
            return Ok(base);
        }
        base.to_quantum().ok_or_else(|| ParseError::InvalidType {
            name: format!("quantum {}", token.text),
            line: token.line,
            column: token.column,
        })
    }

    fn optional_expression(&mut self, terminator: TokenKind) -> Result<Option<NodeId>, ParseError> {
        if self.current.kind == terminator {
            Ok(None)
        } else {
            self.parse_expression(Precedence::Lowest).map(Some)
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    /// Shift the lookahead window by one and return the token left behind.
    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let peek = std::mem::replace(&mut self.peek, next);
        std::mem::replace(&mut self.current, peek)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, ParseError> {
        if self.current.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        unexpected_token(&self.current, expected)
    }

    fn node(&mut self, kind: NodeKind, position: Position) -> Result<NodeId, ParseError> {
        self.ast
            .try_reserve(1)
            .map_err(|_| ParseError::ResourceExhausted { what: "syntax tree" })?;
        Ok(self.ast.alloc(kind, position))
    }

    /// Count one more nesting level, failing past [`MAX_NESTING_DEPTH`].
    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING_DEPTH {
            warn!(
                limit = MAX_NESTING_DEPTH,
                line = self.current.line,
                column = self.current.column,
                "nesting too deep"
            );
            return Err(ParseError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
                line: self.current.line,
                column: self.current.column,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// [`Parser::guarded`] one nesting level deeper. Levels entered inside
    /// `f` are given back when it returns.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let depth = self.depth;
        let result = self.guarded(|p| {
            p.enter()?;
            f(p)
        });
        self.depth = depth;
        result
    }

    /// Run `f`, releasing every node it allocated if it fails.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let mark = self.ast.mark();
        let result = f(self);
        if result.is_err() {
            self.ast.release_to(mark);
        }
        result
    }
}

fn unexpected_token(token: &Token, expected: &str) -> ParseError {
    warn!(
        found = %token.kind,
        expected,
        line = token.line,
        column = token.column,
        "syntax error"
    );
    ParseError::UnexpectedToken {
        found: token.kind,
        expected: expected.to_string(),
        line: token.line,
        column: token.column,
    }
}

fn invalid_literal(token: &Token) -> ParseError {
    ParseError::InvalidLiteral {
        kind: token.kind,
        text: token.text.clone(),
        line: token.line,
        column: token.column,
    }
}

/// Resolve backslash escapes in string literal text.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sexpr(source: &str) -> String {
        let output = parse(source).expect("parse should succeed");
        output.ast.to_sexpr(output.root)
    }

    fn expr(source: &str) -> String {
        let output = parse(&format!("{source};")).expect("parse should succeed");
        let NodeKind::Program { statements } = output.ast.kind(output.root) else {
            panic!("root is not a program");
        };
        let NodeKind::ExprStmt { expr } = output.ast.kind(statements[0]) else {
            panic!("not an expression statement");
        };
        output.ast.to_sexpr(*expr)
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(expr("1 + 2 * 3"), "(+ 1 (* 2 3))");
        assert_eq!(expr("1 * 2 + 3"), "(+ (* 1 2) 3)");
    }

    #[test]
    fn same_precedence_is_left_associative() {
        assert_eq!(expr("1 - 2 - 3"), "(- (- 1 2) 3)");
    }

    #[test]
    fn assignment_is_right_associative() {
        assert_eq!(expr("a = b = 1"), "(= a (= b 1))");
    }

    #[test]
    fn full_precedence_ladder() {
        assert_eq!(
            expr("a || b && c ~ d | e ^ f & g == h < i + j * -k"),
            "(|| a (&& b (~ c (| d (^ e (& f (== g (< h (+ i (* j (- k)))))))))))"
        );
    }

    #[test]
    fn parses_calls_members_and_grouping() {
        assert_eq!(expr("f(1, x + 2)(3)"), "(call (call f 1 (+ x 2)) 3)");
        assert_eq!(expr("-f(1)"), "(- (call f 1))");
        assert_eq!(expr("(1 + 2) * 3"), "(* (+ 1 2) 3)");
        assert_eq!(expr("a.b.c"), "(. (. a b) c)");
        assert_eq!(expr("f()"), "(call f)");
    }

    #[test]
    fn call_with_many_arguments_grows_past_first_block() {
        assert_eq!(
            expr("f(1, 2, 3, 4, 5, 6, 7, 8, 9)"),
            "(call f 1 2 3 4 5 6 7 8 9)"
        );
    }

    #[test]
    fn parses_literals() {
        assert_eq!(expr("\"a\\tb\""), "\"a\\tb\"");
        assert_eq!(expr("2.5"), "2.5");
        assert_eq!(expr("true && !false"), "(&& true (! false))");
        assert_eq!(expr("null"), "null");
    }

    #[test]
    fn parses_quantum_forms() {
        assert_eq!(expr("quantum 1 + 2"), "(+ (quantum 1) 2)");
        assert_eq!(
            expr("superposition { 1 : 0.5, x + 1 : w }"),
            "(superposition (1 : 0.5) ((+ x 1) : w))"
        );
        assert_eq!(
            sexpr("entangle a, b, c { strength: 0.9 };"),
            "(program (entangle a b c (strength: 0.9)))"
        );
        assert_eq!(sexpr("quantum measure q;"), "(program (measure q))");
    }

    #[test]
    fn parses_declarations() {
        assert_eq!(
            sexpr("let x: quantum int = 1; let y;"),
            "(program (let x: quantum int 1) (let y))"
        );
        assert_eq!(
            sexpr("function add(a: int, b: float): float { return a + b; }"),
            "(program (function add(a: int, b: float): float (block (return (+ a b)))))"
        );
        assert_eq!(
            sexpr("function noop() {}"),
            "(program (function noop(): void (block)))"
        );
        assert_eq!(
            sexpr("import \"std/io\"; import math; export let z = 1;"),
            "(program (import \"std/io\") (import \"math\") (export (let z 1)))"
        );
    }

    #[test]
    fn parses_control_flow() {
        assert_eq!(
            sexpr("if (a) { b; } else if (c) d; else { }"),
            "(program (if a (block (expr b)) (if c (expr d) (block))))"
        );
        assert_eq!(
            sexpr("while (i < 3) i = i + 1;"),
            "(program (while (< i 3) (expr (= i (+ i 1)))))"
        );
        assert_eq!(
            sexpr("for (let i = 0; i < 3; i = i + 1) { }"),
            "(program (for (let i 0) (< i 3) (= i (+ i 1)) (block)))"
        );
        assert_eq!(sexpr("for (;;) return;"), "(program (for (return)))");
    }

    #[test]
    fn quantum_without_measure_is_an_expression() {
        assert_eq!(sexpr("quantum x;"), "(program (expr (quantum x)))");
    }

    #[test]
    fn every_child_points_back_to_its_parent() {
        let output = parse(
            "let x = 5; function f(a: int): int { if (a > 0) { return f(a - 1); } return 0; } \
             entangle x, x { p: superposition { 1 : 2 } };",
        )
        .expect("parse");
        let ast = &output.ast;
        let reachable = ast.descendants(output.root);
        // Every allocated node belongs to the tree exactly once.
        assert_eq!(reachable.len(), ast.len());
        for id in reachable {
            for child in ast.children(id) {
                assert_eq!(ast.parent(child), Some(id));
            }
        }
        assert_eq!(ast.parent(output.root), None);
    }

    #[test]
    fn reports_missing_semicolon() {
        let err = parse("let x = 1").unwrap_err();
        match err {
            ParseError::UnexpectedToken {
                found,
                expected,
                line,
                column,
            } => {
                assert_eq!(found, TokenKind::Eof);
                assert!(expected.contains("';'"));
                assert_eq!((line, column), (1, 10));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn reports_unclosed_call() {
        let err = parse("f(1, 2;").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken {
                found: TokenKind::Semicolon,
                ..
            }
        ));
    }

    #[test]
    fn failed_statement_releases_its_nodes() {
        let mut parser = Parser::new("let a = 1; g(1, 2, 3");
        parser.parse_statement().expect("first statement parses");
        assert!(parser.parse_statement().is_err());
        let (ast, _) = parser.finish();
        // Only `let a = 1;` remains: the literal and the declaration.
        assert_eq!(ast.len(), 2);
    }

    #[test]
    fn rejects_unknown_and_invalid_types() {
        assert!(matches!(
            parse("let x: banana;").unwrap_err(),
            ParseError::InvalidType { .. }
        ));
        assert!(matches!(
            parse("let x: quantum void;").unwrap_err(),
            ParseError::InvalidType { .. }
        ));
    }

    #[test]
    fn rejects_integer_overflow() {
        assert!(matches!(
            parse("99999999999999999999;").unwrap_err(),
            ParseError::InvalidLiteral { .. }
        ));
    }

    #[test]
    fn most_negative_integer_is_a_literal() {
        assert_eq!(expr("-9223372036854775808"), "-9223372036854775808");
        assert_eq!(expr("1 + -9223372036854775808"), "(+ 1 -9223372036854775808)");
        assert_eq!(expr("-9223372036854775807"), "(- 9223372036854775807)");
        assert!(matches!(
            parse("9223372036854775808;").unwrap_err(),
            ParseError::InvalidLiteral { .. }
        ));
        assert!(matches!(
            parse("2 - 9223372036854775808;").unwrap_err(),
            ParseError::InvalidLiteral { .. }
        ));
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        for source in [
            format!("{}1;", "-".repeat(200_000)),
            format!("{}1;", "(".repeat(200_000)),
            "{".repeat(200_000),
            format!("a{};", " = a".repeat(200_000)),
            format!("1{};", " + 1".repeat(200_000)),
        ] {
            let err = parse(&source).unwrap_err();
            assert!(
                matches!(err, ParseError::NestingTooDeep { limit: MAX_NESTING_DEPTH, .. }),
                "{err:?}"
            );
        }
    }

    #[test]
    fn nesting_below_the_limit_parses() {
        let depth = MAX_NESTING_DEPTH / 4;
        let source = format!("{}1{};", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(expr(&source[..source.len() - 1]), "1");

        let source = format!("{}x;{}", "{ ".repeat(depth), " }".repeat(depth));
        assert!(parse(&source).is_ok());
    }

    #[test]
    fn keeps_lexical_diagnostics() {
        let output = parse("let x = 1; @").expect("unknown characters are skipped");
        assert_eq!(output.diagnostics.len(), 1);
    }

    proptest! {
        #[test]
        fn additive_chains_group_multiplication_first(
            a in 0i64..100, b in 0i64..100, c in 0i64..100,
        ) {
            prop_assert_eq!(expr(&format!("{a} + {b} * {c}")), format!("(+ {a} (* {b} {c}))"));
            prop_assert_eq!(expr(&format!("{a} * {b} - {c}")), format!("(- (* {a} {b}) {c})"));
        }

        #[test]
        fn parser_never_panics(input in "[a-z0-9 +*/(){};,=<>!&|~.:\"-]{0,48}") {
            let _ = parse(&input);
        }
    }
}
