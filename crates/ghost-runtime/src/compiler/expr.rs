//! Expression parsing
//!
//! Pratt rules: each token kind maps to an optional prefix handler, an
//! optional infix handler, and the precedence its infix form binds at.

use super::Compiler;
use crate::bytecode::Opcode;
use crate::token::TokenKind;
use crate::value::Value;

/// Operator precedence, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `or`
    Or,
    /// `and`
    And,
    /// `==` `!=`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// `!` unary `-`
    Unary,
    /// `()` `.` `[]`
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn = for<'a> fn(&mut Compiler<'a>, bool);

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

impl ParseRule {
    const fn new(
        prefix: Option<ParseFn>,
        infix: Option<ParseFn>,
        precedence: Precedence,
    ) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

fn rule(kind: TokenKind) -> ParseRule {
    use Precedence as P;
    match kind {
        TokenKind::LeftParen => ParseRule::new(Some(grouping), Some(call), P::Call),
        TokenKind::LeftBracket => ParseRule::new(Some(list), Some(subscript), P::Call),
        TokenKind::Dot => ParseRule::new(None, Some(dot), P::Call),
        TokenKind::Minus => ParseRule::new(Some(unary), Some(binary), P::Term),
        TokenKind::Plus => ParseRule::new(None, Some(binary), P::Term),
        TokenKind::Slash | TokenKind::Star => ParseRule::new(None, Some(binary), P::Factor),
        TokenKind::Bang => ParseRule::new(Some(unary), None, P::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => {
            ParseRule::new(None, Some(binary), P::Equality)
        }
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => ParseRule::new(None, Some(binary), P::Comparison),
        TokenKind::Identifier => ParseRule::new(Some(variable), None, P::None),
        TokenKind::String => ParseRule::new(Some(string), None, P::None),
        TokenKind::Number => ParseRule::new(Some(number), None, P::None),
        TokenKind::And => ParseRule::new(None, Some(and_), P::And),
        TokenKind::Or => ParseRule::new(None, Some(or_), P::Or),
        TokenKind::False | TokenKind::True | TokenKind::Null => {
            ParseRule::new(Some(literal), None, P::None)
        }
        TokenKind::Super => ParseRule::new(Some(super_), None, P::None),
        TokenKind::This => ParseRule::new(Some(this_), None, P::None),
        _ => ParseRule::new(None, None, P::None),
    }
}

impl Compiler<'_> {
    pub(super) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parse everything at `precedence` or tighter
    ///
    /// Assignment targets are validated here: only expressions parsed while
    /// assignment is still allowed may consume a trailing `=`; a leftover
    /// `=` is an invalid target.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            let infix = rule(self.previous.kind)
                .infix
                .expect("infix rule for non-None precedence");
            infix(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Parse a parenthesized argument list; returns the argument count
    fn argument_list(&mut self) -> u8 {
        let mut count: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == u8::MAX {
                    self.error("Can't have more than 255 arguments.");
                } else {
                    count += 1;
                }
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count
    }
}

fn number(c: &mut Compiler, _can_assign: bool) {
    let value: f64 = c.previous.lexeme.parse().unwrap_or(0.0);
    c.emit_constant(Value::Number(value));
}

fn string(c: &mut Compiler, _can_assign: bool) {
    // Trim the surrounding quotes.
    let lexeme = c.previous.lexeme.clone();
    let text = &lexeme[1..lexeme.len() - 1];
    let r = c.intern(text);
    c.emit_constant(Value::Obj(r));
}

fn literal(c: &mut Compiler, _can_assign: bool) {
    match c.previous.kind {
        TokenKind::False => c.emit_op(Opcode::False),
        TokenKind::True => c.emit_op(Opcode::True),
        TokenKind::Null => c.emit_op(Opcode::Null),
        _ => unreachable!("literal rule on non-literal token"),
    }
}

fn grouping(c: &mut Compiler, _can_assign: bool) {
    c.expression();
    c.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary(c: &mut Compiler, _can_assign: bool) {
    let operator = c.previous.kind;
    c.parse_precedence(Precedence::Unary);
    match operator {
        TokenKind::Minus => c.emit_op(Opcode::Negate),
        TokenKind::Bang => c.emit_op(Opcode::Not),
        _ => unreachable!("unary rule on non-unary token"),
    }
}

fn binary(c: &mut Compiler, _can_assign: bool) {
    let operator = c.previous.kind;
    c.parse_precedence(rule(operator).precedence.next());
    match operator {
        TokenKind::Plus => c.emit_op(Opcode::Add),
        TokenKind::Minus => c.emit_op(Opcode::Subtract),
        TokenKind::Star => c.emit_op(Opcode::Multiply),
        TokenKind::Slash => c.emit_op(Opcode::Divide),
        TokenKind::EqualEqual => c.emit_op(Opcode::Equal),
        TokenKind::BangEqual => {
            c.emit_op(Opcode::Equal);
            c.emit_op(Opcode::Not);
        }
        TokenKind::Greater => c.emit_op(Opcode::Greater),
        TokenKind::GreaterEqual => {
            c.emit_op(Opcode::Less);
            c.emit_op(Opcode::Not);
        }
        TokenKind::Less => c.emit_op(Opcode::Less),
        TokenKind::LessEqual => {
            c.emit_op(Opcode::Greater);
            c.emit_op(Opcode::Not);
        }
        _ => unreachable!("binary rule on non-binary token"),
    }
}

fn variable(c: &mut Compiler, can_assign: bool) {
    let name = c.previous.lexeme.clone();
    c.named_variable(&name, can_assign);
}

/// `and` short-circuits: if the left side is falsey it stays on the stack
/// as the result and the right side is skipped.
fn and_(c: &mut Compiler, _can_assign: bool) {
    let end_jump = c.emit_jump(Opcode::JumpIfFalse);
    c.emit_op(Opcode::Pop);
    c.parse_precedence(Precedence::And);
    c.patch_jump(end_jump);
}

/// `or` short-circuits: a truthy left side stays as the result.
fn or_(c: &mut Compiler, _can_assign: bool) {
    let else_jump = c.emit_jump(Opcode::JumpIfFalse);
    let end_jump = c.emit_jump(Opcode::Jump);
    c.patch_jump(else_jump);
    c.emit_op(Opcode::Pop);
    c.parse_precedence(Precedence::Or);
    c.patch_jump(end_jump);
}

fn call(c: &mut Compiler, _can_assign: bool) {
    let argc = c.argument_list();
    c.emit_ops(Opcode::Call, argc);
}

fn dot(c: &mut Compiler, can_assign: bool) {
    c.consume(TokenKind::Identifier, "Expect property name after '.'.");
    let lexeme = c.previous.lexeme.clone();
    let name = c.identifier_constant(&lexeme);
    if can_assign && c.match_token(TokenKind::Equal) {
        c.expression();
        c.emit_ops(Opcode::SetProperty, name);
    } else if c.match_token(TokenKind::LeftParen) {
        // Fused load + call for method dispatch.
        let argc = c.argument_list();
        c.emit_ops(Opcode::Invoke, name);
        c.emit_byte(argc);
    } else {
        c.emit_ops(Opcode::GetProperty, name);
    }
}

/// List literal `[a, b, c]` (trailing comma allowed)
fn list(c: &mut Compiler, _can_assign: bool) {
    let mut count: u16 = 0;
    if !c.check(TokenKind::RightBracket) {
        loop {
            c.expression();
            if count == u16::MAX {
                c.error("Too many elements in list literal.");
            } else {
                count += 1;
            }
            if !c.match_token(TokenKind::Comma) {
                break;
            }
            if c.check(TokenKind::RightBracket) {
                break;
            }
        }
    }
    c.consume(TokenKind::RightBracket, "Expect ']' after list elements.");
    c.emit_op(Opcode::BuildList);
    let line = c.previous.line;
    c.current_chunk_mut().write_u16(count, line);
}

/// Subscript access `value[index]`, as read or assignment target
fn subscript(c: &mut Compiler, can_assign: bool) {
    c.expression();
    c.consume(TokenKind::RightBracket, "Expect ']' after index.");
    if can_assign && c.match_token(TokenKind::Equal) {
        c.expression();
        c.emit_op(Opcode::StoreSubscr);
    } else {
        c.emit_op(Opcode::IndexSubscr);
    }
}

fn this_(c: &mut Compiler, _can_assign: bool) {
    if c.classes.is_empty() {
        c.error("Can't use 'this' outside of a class.");
        return;
    }
    variable(c, false);
}

/// `super.method` or `super.method(args)`
///
/// `this` and the superclass (a scoped upvalue named `super`) both go on
/// the stack so the VM can bind or invoke against the right class.
fn super_(c: &mut Compiler, _can_assign: bool) {
    match c.classes.last() {
        None => c.error("Can't use 'super' outside of a class."),
        Some(class) if !class.has_superclass => {
            c.error("Can't use 'super' in a class with no superclass.")
        }
        Some(_) => {}
    }

    c.consume(TokenKind::Dot, "Expect '.' after 'super'.");
    c.consume(TokenKind::Identifier, "Expect superclass method name.");
    let lexeme = c.previous.lexeme.clone();
    let name = c.identifier_constant(&lexeme);

    c.named_variable("this", false);
    if c.match_token(TokenKind::LeftParen) {
        let argc = c.argument_list();
        c.named_variable("super", false);
        c.emit_ops(Opcode::SuperInvoke, name);
        c.emit_byte(argc);
    } else {
        c.named_variable("super", false);
        c.emit_ops(Opcode::GetSuper, name);
    }
}
