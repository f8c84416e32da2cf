//! Single-pass compiler
//!
//! A Pratt parser that consumes tokens straight from the scanner and emits
//! bytecode as it goes; no AST is built. Each nested function under
//! compilation keeps its own locals, upvalue records, and scope depth.
//! Lexical captures resolve through the chain of enclosing functions into
//! upvalue descriptors consumed by the VM's `Closure` instruction.

mod expr;
mod stmt;

use crate::bytecode::{Chunk, Opcode};
use crate::diagnostic::Diagnostic;
use crate::heap::GcRef;
use crate::object::{Function, Obj};
use crate::scanner::Scanner;
use crate::token::{Token, TokenKind};
use crate::value::Value;
use crate::vm::Vm;

/// Locals are addressed by a 1-byte slot index.
const MAX_LOCALS: usize = 256;
/// Upvalues are addressed by a 1-byte index.
const MAX_UPVALUES: usize = 256;

/// Compile `source` into a top-level script function
///
/// The script function has arity 0 and no name; the VM wraps it in a
/// closure for execution. Returns every diagnostic if any error occurred.
pub(crate) fn compile(vm: &mut Vm, source: &str) -> Result<GcRef, Vec<Diagnostic>> {
    let mut compiler = Compiler::new(vm, source);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.finish()
}

/// What kind of function body is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    /// Top-level code
    Script,
    /// A free function
    Function,
    /// A class method
    Method,
    /// A class `init` method (implicitly returns `this`)
    Initializer,
}

/// A local variable slot
struct Local {
    name: String,
    /// `None` between declaration and the end of its initializer
    depth: Option<usize>,
    /// Set when a nested function captures this slot, so scope exit emits
    /// `CloseUpvalue` instead of `Pop`
    is_captured: bool,
}

/// One upvalue captured by the function under compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UpvalueRecord {
    /// Slot in the enclosing function's locals (`is_local`) or index into
    /// the enclosing function's upvalues
    index: u8,
    is_local: bool,
}

/// Per-function compilation state
struct FunctionState {
    function: Function,
    kind: FunctionKind,
    locals: Vec<Local>,
    upvalues: Vec<UpvalueRecord>,
    scope_depth: usize,
}

impl FunctionState {
    fn new(kind: FunctionKind, name: Option<GcRef>) -> Self {
        // Slot zero belongs to the callee: the receiver in methods, unusable
        // otherwise.
        let reserved = Local {
            name: if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
                "this".to_string()
            } else {
                String::new()
            },
            depth: Some(0),
            is_captured: false,
        };
        Self {
            function: Function::new(name),
            kind,
            locals: vec![reserved],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

/// Per-class compilation state (tracks `super` legality)
struct ClassState {
    has_superclass: bool,
}

/// Compiler state
pub(crate) struct Compiler<'a> {
    vm: &'a mut Vm,
    scanner: Scanner,
    current: Token,
    previous: Token,
    had_error: bool,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    /// Innermost function last
    functions: Vec<FunctionState>,
    /// Innermost class last
    classes: Vec<ClassState>,
}

impl<'a> Compiler<'a> {
    fn new(vm: &'a mut Vm, source: &str) -> Self {
        Self {
            vm,
            scanner: Scanner::new(source),
            current: Token::none(),
            previous: Token::none(),
            had_error: false,
            panic_mode: false,
            diagnostics: Vec::new(),
            functions: vec![FunctionState::new(FunctionKind::Script, None)],
            classes: Vec::new(),
        }
    }

    fn finish(mut self) -> Result<GcRef, Vec<Diagnostic>> {
        self.emit_return();
        if self.had_error {
            return Err(self.diagnostics);
        }
        let state = self.functions.pop().expect("script function state");
        Ok(self.vm.heap_mut().allocate(Obj::Function(state.function)))
    }

    // ── Token plumbing ────────────────────────────────────────────────────

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, Token::none());
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.clone();
            self.error_at_current(&message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ── Error reporting ───────────────────────────────────────────────────

    fn error(&mut self, message: &str) {
        let token = self.previous.clone();
        self.error_at(&token, message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current.clone();
        self.error_at(&token, message);
    }

    /// Report one diagnostic, then stay quiet until the next statement
    /// boundary (panic-mode recovery).
    fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let diagnostic = match token.kind {
            TokenKind::Eof => Diagnostic::error_at_end(token.line, message),
            TokenKind::Error => Diagnostic::error(token.line, message),
            _ => Diagnostic::error_at(token.line, &token.lexeme, message),
        };
        self.diagnostics.push(diagnostic);
    }

    /// Skip tokens until a statement boundary after an error
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ── Emitters ──────────────────────────────────────────────────────────

    fn state(&self) -> &FunctionState {
        self.functions.last().expect("function state")
    }

    fn state_mut(&mut self) -> &mut FunctionState {
        self.functions.last_mut().expect("function state")
    }

    fn current_chunk_mut(&mut self) -> &mut Chunk {
        &mut self.state_mut().function.chunk
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.current_chunk_mut().write(byte, line);
    }

    fn emit_op(&mut self, op: Opcode) {
        self.emit_byte(op as u8);
    }

    fn emit_ops(&mut self, first: Opcode, second: u8) {
        self.emit_op(first);
        self.emit_byte(second);
    }

    fn emit_return(&mut self) {
        if self.state().kind == FunctionKind::Initializer {
            // init returns its receiver
            self.emit_ops(Opcode::GetLocal, 0);
        } else {
            self.emit_op(Opcode::Null);
        }
        self.emit_op(Opcode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_ops(Opcode::Constant, index);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_chunk_mut().add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    /// Emit a forward jump with a placeholder offset; returns the offset of
    /// the operand for later patching.
    fn emit_jump(&mut self, op: Opcode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xFF);
        self.emit_byte(0xFF);
        self.current_chunk_mut().len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // -2 skips the operand itself.
        let jump = self.current_chunk_mut().len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        self.current_chunk_mut().patch_u16(offset, jump as u16);
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(Opcode::Loop);
        let offset = self.current_chunk_mut().len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let line = self.previous.line;
        self.current_chunk_mut().write_u16(offset as u16, line);
    }

    // ── GC-aware allocation ───────────────────────────────────────────────
    //
    // Compile-time allocations can trigger a collection. The functions
    // under construction are plain Rust values the collector cannot free;
    // their GC-visible children are the constants already sitting in their
    // chunks, which are marked here alongside the VM's own roots.

    fn intern(&mut self, text: &str) -> GcRef {
        if self.vm.heap().should_collect() {
            self.collect_garbage();
        }
        self.vm.heap_mut().copy_string(text)
    }

    fn collect_garbage(&mut self) {
        self.vm.mark_roots();
        for state in &self.functions {
            if let Some(name) = state.function.name {
                self.vm.heap_mut().mark_object(name);
            }
            for &constant in &state.function.chunk.constants {
                self.vm.heap_mut().mark_value(constant);
            }
        }
        self.vm.heap_mut().trace_references();
        self.vm.heap_mut().sweep();
    }

    /// Intern an identifier and store it in the constant pool
    fn identifier_constant(&mut self, name: &str) -> u8 {
        let r = self.intern(name);
        self.make_constant(Value::Obj(r))
    }

    // ── Scopes and variables ──────────────────────────────────────────────

    fn begin_scope(&mut self) {
        self.state_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state_mut().scope_depth -= 1;
        loop {
            let state = self.state();
            let Some(local) = state.locals.last() else {
                return;
            };
            if local.depth.unwrap_or(0) <= state.scope_depth {
                return;
            }
            let captured = local.is_captured;
            if captured {
                self.emit_op(Opcode::CloseUpvalue);
            } else {
                self.emit_op(Opcode::Pop);
            }
            self.state_mut().locals.pop();
        }
    }

    /// Parse a variable name; returns a constant index for globals, 0 for
    /// locals (which are addressed by slot, not name).
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme.clone();
        self.identifier_constant(&name)
    }

    /// Reserve a local slot for the name just parsed (no-op at global scope)
    fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme.clone();
        let state = self.state();
        let mut duplicate = false;
        for local in state.locals.iter().rev() {
            if local.depth.is_some_and(|d| d < state.scope_depth) {
                break;
            }
            if local.name == name {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn add_local(&mut self, name: String) {
        if self.state().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state_mut().locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn mark_initialized(&mut self) {
        let state = self.state_mut();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_ops(Opcode::DefineGlobal, global);
    }

    /// Resolve `name` against the locals of the function at `func_index`
    fn resolve_local(&mut self, func_index: usize, name: &str) -> Option<u8> {
        let mut uninitialized = false;
        let mut found = None;
        for (i, local) in self.functions[func_index].locals.iter().enumerate().rev() {
            if local.name == name {
                uninitialized = local.depth.is_none();
                found = Some(i as u8);
                break;
            }
        }
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        found
    }

    /// Resolve `name` as a capture from an enclosing function
    ///
    /// Walks outward: the enclosing function's locals first (a *local*
    /// upvalue), then its own upvalues (chaining the capture through every
    /// intermediate function). Marks captured locals so their scope exit
    /// closes the cell instead of popping it.
    fn resolve_upvalue(&mut self, func_index: usize, name: &str) -> Option<u8> {
        if func_index == 0 {
            return None;
        }
        let enclosing = func_index - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.functions[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(func_index, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(func_index, upvalue, false));
        }
        None
    }

    /// Record an upvalue, deduplicating identical captures
    fn add_upvalue(&mut self, func_index: usize, index: u8, is_local: bool) -> u8 {
        let record = UpvalueRecord { index, is_local };
        let state = &mut self.functions[func_index];
        if let Some(existing) = state.upvalues.iter().position(|u| *u == record) {
            return existing as u8;
        }
        if state.upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        state.upvalues.push(record);
        let count = state.upvalues.len();
        state.function.upvalue_count = count;
        (count - 1) as u8
    }

    /// Emit the load/store for a (possibly assigned) variable reference
    fn named_variable(&mut self, name: &str, can_assign: bool) {
        let top = self.functions.len() - 1;
        let (get_op, set_op, arg) = if let Some(local) = self.resolve_local(top, name) {
            (Opcode::GetLocal, Opcode::SetLocal, local)
        } else if let Some(upvalue) = self.resolve_upvalue(top, name) {
            (Opcode::GetUpvalue, Opcode::SetUpvalue, upvalue)
        } else {
            let constant = self.identifier_constant(name);
            (Opcode::GetGlobal, Opcode::SetGlobal, constant)
        };
        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_ops(set_op, arg);
        } else {
            self.emit_ops(get_op, arg);
        }
    }

    // ── Function bodies ───────────────────────────────────────────────────

    /// Compile a function body (parameters + block) and emit the `Closure`
    /// instruction with its upvalue descriptors. `previous` must be the
    /// function's name token.
    fn function(&mut self, kind: FunctionKind) {
        let name = self.previous.lexeme.clone();
        let name_ref = self.intern(&name);
        self.functions.push(FunctionState::new(kind, Some(name_ref)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.state().function.arity == u8::MAX {
                    self.error_at_current("Can't have more than 255 parameters.");
                } else {
                    self.state_mut().function.arity += 1;
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let (function_ref, upvalues) = self.end_function();
        let constant = self.make_constant(Value::Obj(function_ref));
        self.emit_ops(Opcode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(if upvalue.is_local { 1 } else { 0 });
            self.emit_byte(upvalue.index);
        }
    }

    /// Finish the innermost function: emit its implicit return, move it onto
    /// the heap, and hand back its upvalue descriptors for the `Closure`
    /// instruction.
    fn end_function(&mut self) -> (GcRef, Vec<UpvalueRecord>) {
        self.emit_return();
        // Collect while the finished function is still in the chain, so its
        // chunk constants count as roots; the allocation below then runs
        // against a freshly-swept heap without a second trigger.
        if self.vm.heap().should_collect() {
            self.collect_garbage();
        }
        let state = self.functions.pop().expect("nested function state");
        let function_ref = self.vm.heap_mut().allocate(Obj::Function(state.function));
        (function_ref, state.upvalues)
    }
}
