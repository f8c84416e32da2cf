//! Stack-based virtual machine
//!
//! Executes bytecode with a value stack and call frames. The VM owns the
//! heap, drives the collector (it knows the roots: the stack, the frames,
//! the open upvalues, the globals, and the interned `"init"`), and reports
//! runtime errors with a stack trace.

mod frame;

pub use frame::CallFrame;

use crate::bytecode::Opcode;
use crate::compiler;
use crate::diagnostic::Diagnostic;
use crate::heap::{GcRef, Heap};
use crate::native;
use crate::object::{BoundMethod, Class, Closure, Instance, Obj, Upvalue};
use crate::table::Table;
use crate::value::Value;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use thiserror::Error;

/// Maximum call depth
pub const FRAMES_MAX: usize = 64;
/// Value stack capacity
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// Shared writer for `print` output (defaults to stdout)
pub type OutputWriter = Rc<RefCell<dyn Write>>;

/// An [`OutputWriter`] over stdout
pub fn stdout_writer() -> OutputWriter {
    Rc::new(RefCell::new(io::stdout()))
}

/// A runtime error with its rendered stack trace
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RuntimeError {
    /// Error message
    pub message: String,
    /// `[line N] in <name>` entries, innermost frame first
    pub trace: Vec<String>,
}

/// Host-facing result of [`Vm::interpret`]
#[derive(Debug, Error)]
pub enum InterpretError {
    /// One or more compile errors; nothing was executed
    #[error("compilation failed with {} error(s)", .0.len())]
    Compile(Vec<Diagnostic>),
    /// Execution failed; the VM state has been reset
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Virtual machine state
pub struct Vm {
    heap: Heap,
    /// Value stack
    stack: Vec<Value>,
    /// Call frames
    frames: Vec<CallFrame>,
    /// Global variables
    globals: Table,
    /// Head of the open-upvalue list, ordered by decreasing stack slot
    open_upvalues: Option<GcRef>,
    /// Interned `"init"` for implicit constructor dispatch
    init_string: GcRef,
    /// Writer for `print` output
    output: OutputWriter,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a new VM with the core natives installed
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let init_string = heap.copy_string("init");
        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: None,
            init_string,
            output: stdout_writer(),
        };
        native::define_native(&mut vm, "clock", native::clock);
        vm
    }

    /// Redirect `print` output (used by tests and embedders)
    pub fn set_output_writer(&mut self, output: OutputWriter) {
        self.output = output;
    }

    /// Borrow the heap (display, disassembly)
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Render a value the way `print` would
    pub fn display(&self, value: Value) -> String {
        value.to_display_string(&self.heap)
    }

    /// Intern a string and wrap it as a value (native-function helper)
    pub fn make_string(&mut self, text: &str) -> Value {
        let r = self.intern(text);
        Value::Obj(r)
    }

    /// Compile `source` without executing it
    pub fn compile(&mut self, source: &str) -> Result<GcRef, Vec<Diagnostic>> {
        compiler::compile(self, source)
    }

    /// Compile and execute `source`
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = self
            .compile(source)
            .map_err(InterpretError::Compile)?;

        // Root the script function across the closure allocation.
        self.push(Value::Obj(function))?;
        let closure = self.alloc(Obj::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure))?;
        self.call_closure(closure, 0)?;

        match self.run() {
            Ok(()) => Ok(()),
            Err(error) => {
                self.reset_stack();
                Err(error.into())
            }
        }
    }

    // ── Allocation (GC trigger points) ────────────────────────────────────

    pub(crate) fn alloc(&mut self, obj: Obj) -> GcRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.allocate(obj)
    }

    pub(crate) fn intern(&mut self, text: &str) -> GcRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.copy_string(text)
    }

    fn intern_owned(&mut self, text: String) -> GcRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.take_string(text)
    }

    /// Mark everything reachable from the VM itself
    pub(crate) fn mark_roots(&mut self) {
        let Vm {
            heap,
            stack,
            frames,
            globals,
            open_upvalues,
            init_string,
            ..
        } = self;
        for &value in stack.iter() {
            heap.mark_value(value);
        }
        for frame in frames.iter() {
            heap.mark_object(frame.closure);
        }
        let mut current = *open_upvalues;
        while let Some(r) = current {
            heap.mark_object(r);
            current = match heap.upvalue(r) {
                Upvalue::Open { next, .. } => *next,
                Upvalue::Closed(_) => None,
            };
        }
        heap.mark_table(globals);
        heap.mark_object(*init_string);
    }

    fn collect_garbage(&mut self) {
        self.mark_roots();
        self.heap.trace_references();
        self.heap.sweep();
    }

    // ── Host rooting helpers (native module construction) ─────────────────

    /// Keep a value reachable across upcoming allocations
    pub fn push_root(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Release the most recent root
    pub fn pop_root(&mut self) {
        self.stack.pop();
    }

    /// Define a global binding directly (native installation)
    pub fn define_global(&mut self, name: GcRef, value: Value) {
        let hash = self.heap.string_hash(name);
        self.globals.set(name, hash, value);
    }

    // ── Stack primitives ──────────────────────────────────────────────────

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() == STACK_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
    }

    /// Build a runtime error with the current stack trace
    fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        let mut trace = Vec::new();
        for frame in self.frames.iter().rev() {
            let closure = self.heap.closure(frame.closure);
            let function = self.heap.function(closure.function);
            let offset = frame.ip.saturating_sub(1);
            let line = function.chunk.line_at(offset.min(function.chunk.len() - 1));
            let name = match function.name {
                Some(name) => format!("{}()", self.heap.string(name).text),
                None => "script".to_string(),
            };
            trace.push(format!("[line {}] in {}", line, name));
        }
        RuntimeError {
            message: message.into(),
            trace,
        }
    }

    // ── Instruction fetch ─────────────────────────────────────────────────

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no call frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no call frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no call frame");
        let ip = frame.ip;
        frame.ip += 1;
        let closure = frame.closure;
        let function = self.heap.closure(closure).function;
        self.heap.function(function).chunk.code[ip]
    }

    fn read_u16(&mut self) -> u16 {
        ((self.read_byte() as u16) << 8) | self.read_byte() as u16
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        let frame = self.frame();
        let function = self.heap.closure(frame.closure).function;
        self.heap.function(function).chunk.constants[index]
    }

    fn read_string(&mut self) -> GcRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("name constant is not a string: {:?}", other),
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────────

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let opcode = match Opcode::try_from(self.read_byte()) {
                Ok(op) => op,
                Err(byte) => {
                    return Err(self.runtime_error(format!("Unknown opcode {:#04x}.", byte)))
                }
            };

            match opcode {
                Opcode::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                Opcode::Null => self.push(Value::Null)?,
                Opcode::True => self.push(Value::Bool(true))?,
                Opcode::False => self.push(Value::Bool(false))?,
                Opcode::Pop => {
                    self.pop();
                }

                Opcode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().slots + slot];
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let index = self.frame().slots + slot;
                    let value = self.peek(0);
                    self.stack[index] = value;
                }
                Opcode::GetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string_hash(name);
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value)?,
                        None => {
                            return Err(self.runtime_error(format!(
                                "Undefined variable '{}'.",
                                self.heap.string(name).text
                            )))
                        }
                    }
                }
                Opcode::DefineGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string_hash(name);
                    let value = self.peek(0);
                    self.globals.set(name, hash, value);
                    self.pop();
                }
                Opcode::SetGlobal => {
                    let name = self.read_string();
                    let hash = self.heap.string_hash(name);
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // Assignment may not create a global.
                        self.globals.delete(name, hash);
                        return Err(self.runtime_error(format!(
                            "Undefined variable '{}'.",
                            self.heap.string(name).text
                        )));
                    }
                }

                Opcode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = match self.heap.upvalue(upvalue) {
                        Upvalue::Open { slot, .. } => self.stack[*slot],
                        Upvalue::Closed(value) => *value,
                    };
                    self.push(value)?;
                }
                Opcode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = self.peek(0);
                    match self.heap.upvalue_mut(upvalue) {
                        Upvalue::Open { slot, .. } => {
                            let slot = *slot;
                            self.stack[slot] = value;
                        }
                        Upvalue::Closed(cell) => *cell = value,
                    }
                }

                Opcode::GetProperty => {
                    let name = self.read_string();
                    self.get_property(name)?;
                }
                Opcode::SetProperty => {
                    let name = self.read_string();
                    self.set_property(name)?;
                }
                Opcode::GetSuper => {
                    let name = self.read_string();
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => unreachable!("superclass is not an object: {:?}", other),
                    };
                    self.bind_method(superclass, name)?;
                }

                Opcode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                Opcode::Greater | Opcode::Less => self.binary_compare(opcode)?,
                Opcode::Add => self.add()?,
                Opcode::Subtract | Opcode::Multiply | Opcode::Divide => {
                    self.binary_arithmetic(opcode)?
                }
                Opcode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                Opcode::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop();
                        self.push(Value::Number(-n))?;
                    }
                    _ => return Err(self.runtime_error("Operand must be a number.")),
                },

                Opcode::Print => {
                    let value = self.pop();
                    let text = value.to_display_string(&self.heap);
                    let _ = writeln!(self.output.borrow_mut(), "{}", text);
                }

                Opcode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                Opcode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }

                Opcode::Call => {
                    let argc = self.read_byte();
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                Opcode::Invoke => {
                    let name = self.read_string();
                    let argc = self.read_byte();
                    self.invoke(name, argc)?;
                }
                Opcode::SuperInvoke => {
                    let name = self.read_string();
                    let argc = self.read_byte();
                    let superclass = match self.pop() {
                        Value::Obj(r) => r,
                        other => unreachable!("superclass is not an object: {:?}", other),
                    };
                    self.invoke_from_class(superclass, name, argc)?;
                }

                Opcode::Closure => {
                    let function = match self.read_constant() {
                        Value::Obj(r) => r,
                        other => unreachable!("closure constant is not a function: {:?}", other),
                    };
                    let closure = self.alloc(Obj::Closure(Closure {
                        function,
                        upvalues: Vec::new(),
                    }));
                    self.push(Value::Obj(closure))?;
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let slot = self.frame().slots + index;
                            self.capture_upvalue(slot)
                        } else {
                            self.heap.closure(self.frame().closure).upvalues[index]
                        };
                        self.heap.closure_mut(closure).upvalues.push(upvalue);
                    }
                }
                Opcode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                Opcode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no call frame");
                    self.close_upvalues(frame.slots);
                    if self.frames.is_empty() {
                        // Pop the script closure; execution is complete.
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots);
                    self.push(result)?;
                }

                Opcode::Class => {
                    let name = self.read_string();
                    let class = self.alloc(Obj::Class(Class {
                        name,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class))?;
                }
                Opcode::Inherit => {
                    let superclass = match self.peek(1) {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let subclass = match self.peek(0) {
                        Value::Obj(r) => r,
                        other => unreachable!("subclass is not an object: {:?}", other),
                    };
                    let methods = self.heap.class(superclass).methods.clone();
                    self.heap.class_mut(subclass).methods.add_all(&methods);
                    self.pop();
                }
                Opcode::Method => {
                    let name = self.read_string();
                    let hash = self.heap.string_hash(name);
                    let method = self.peek(0);
                    let class = match self.peek(1) {
                        Value::Obj(r) => r,
                        other => unreachable!("method target is not a class: {:?}", other),
                    };
                    self.heap.class_mut(class).methods.set(name, hash, method);
                    self.pop();
                }

                Opcode::BuildList => {
                    let count = self.read_u16() as usize;
                    let start = self.stack.len() - count;
                    // Elements stay on the stack (rooted) during allocation.
                    let items = self.stack[start..].to_vec();
                    let list = self.alloc(Obj::List(items));
                    self.stack.truncate(start);
                    self.push(Value::Obj(list))?;
                }
                Opcode::IndexSubscr => {
                    let index = self.pop();
                    let target = self.pop();
                    let value = self.list_index(target, index)?;
                    self.push(value)?;
                }
                Opcode::StoreSubscr => {
                    let value = self.pop();
                    let index = self.pop();
                    let target = self.pop();
                    self.list_store(target, index, value)?;
                    self.push(value)?;
                }
            }
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────

    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b))
            }
            (Value::Obj(a), Value::Obj(b))
                if matches!(self.heap.get(a), Obj::String(_))
                    && matches!(self.heap.get(b), Obj::String(_)) =>
            {
                let mut text = self.heap.string(a).text.clone();
                text.push_str(&self.heap.string(b).text);
                // Operands stay on the stack while interning may collect.
                let result = self.intern_owned(text);
                self.pop();
                self.pop();
                self.push(Value::Obj(result))
            }
            _ => Err(self.runtime_error("Operands must be two numbers or two strings.")),
        }
    }

    fn binary_arithmetic(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        let result = match opcode {
            Opcode::Subtract => a - b,
            Opcode::Multiply => a * b,
            Opcode::Divide => a / b,
            _ => unreachable!("not an arithmetic opcode: {:?}", opcode),
        };
        self.push(Value::Number(result))
    }

    fn binary_compare(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        let result = match opcode {
            Opcode::Greater => a > b,
            Opcode::Less => a < b,
            _ => unreachable!("not a comparison opcode: {:?}", opcode),
        };
        self.push(Value::Bool(result))
    }

    // ── Calls ─────────────────────────────────────────────────────────────

    fn call_value(&mut self, callee: Value, argc: u8) -> Result<(), RuntimeError> {
        enum Kind {
            Closure,
            Native(crate::native::NativeFn),
            Class,
            Bound(Value, GcRef),
        }

        let Value::Obj(r) = callee else {
            return Err(self.runtime_error("Can only call functions and classes."));
        };
        let kind = match self.heap.get(r) {
            Obj::Closure(_) => Kind::Closure,
            Obj::Native(n) => Kind::Native(n.function),
            Obj::Class(_) => Kind::Class,
            Obj::BoundMethod(b) => Kind::Bound(b.receiver, b.method),
            _ => return Err(self.runtime_error("Can only call functions and classes.")),
        };

        match kind {
            Kind::Closure => self.call_closure(r, argc),
            Kind::Native(function) => self.call_native(function, argc),
            Kind::Class => self.call_class(r, argc),
            Kind::Bound(receiver, method) => {
                let slot = self.stack.len() - argc as usize - 1;
                self.stack[slot] = receiver;
                self.call_closure(method, argc)
            }
        }
    }

    fn call_closure(&mut self, closure: GcRef, argc: u8) -> Result<(), RuntimeError> {
        let arity = self.heap.function(self.heap.closure(closure).function).arity;
        if argc != arity {
            return Err(
                self.runtime_error(format!("Expected {} arguments but got {}.", arity, argc))
            );
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slots: self.stack.len() - argc as usize - 1,
        });
        Ok(())
    }

    fn call_native(
        &mut self,
        function: crate::native::NativeFn,
        argc: u8,
    ) -> Result<(), RuntimeError> {
        let start = self.stack.len() - argc as usize;
        let args: Vec<Value> = self.stack[start..].to_vec();
        match function(self, &args) {
            Ok(result) => {
                self.stack.truncate(start - 1);
                self.push(result)
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn call_class(&mut self, class: GcRef, argc: u8) -> Result<(), RuntimeError> {
        let instance = self.alloc(Obj::Instance(Instance {
            class,
            fields: Table::new(),
        }));
        let slot = self.stack.len() - argc as usize - 1;
        self.stack[slot] = Value::Obj(instance);

        let init_hash = self.heap.string_hash(self.init_string);
        let initializer = self.heap.class(class).methods.get(self.init_string, init_hash);
        match initializer {
            Some(Value::Obj(init)) => self.call_closure(init, argc),
            Some(other) => unreachable!("class initializer is not a closure: {:?}", other),
            None if argc != 0 => {
                Err(self.runtime_error(format!("Expected 0 arguments but got {}.", argc)))
            }
            None => Ok(()),
        }
    }

    // ── Properties and methods ────────────────────────────────────────────

    fn get_property(&mut self, name: GcRef) -> Result<(), RuntimeError> {
        enum Lookup {
            Found(Value),
            BindFrom(GcRef),
            Missing,
            NotAnInstance,
        }

        let hash = self.heap.string_hash(name);
        let lookup = match self.peek(0) {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Instance(instance) => match instance.fields.get(name, hash) {
                    Some(value) => Lookup::Found(value),
                    None => Lookup::BindFrom(instance.class),
                },
                Obj::NativeClass(class) => match class.methods.get(name, hash) {
                    Some(value) => Lookup::Found(value),
                    None => Lookup::Missing,
                },
                _ => Lookup::NotAnInstance,
            },
            _ => Lookup::NotAnInstance,
        };

        match lookup {
            Lookup::Found(value) => {
                self.pop();
                self.push(value)
            }
            Lookup::BindFrom(class) => self.bind_method(class, name),
            Lookup::Missing => Err(self.runtime_error(format!(
                "Undefined property '{}'.",
                self.heap.string(name).text
            ))),
            Lookup::NotAnInstance => Err(self.runtime_error("Only instances have properties.")),
        }
    }

    fn set_property(&mut self, name: GcRef) -> Result<(), RuntimeError> {
        let hash = self.heap.string_hash(name);
        let target = self.peek(1);
        let Value::Obj(r) = target else {
            return Err(self.runtime_error("Only instances have fields."));
        };
        if !matches!(self.heap.get(r), Obj::Instance(_)) {
            return Err(self.runtime_error("Only instances have fields."));
        }
        let value = self.peek(0);
        self.heap.instance_mut(r).fields.set(name, hash, value);
        // Leave the assigned value as the expression result.
        let value = self.pop();
        self.pop();
        self.push(value)
    }

    /// Resolve `name` on `class` and replace the receiver on top of the
    /// stack with a bound method.
    fn bind_method(&mut self, class: GcRef, name: GcRef) -> Result<(), RuntimeError> {
        let hash = self.heap.string_hash(name);
        let lookup = self.heap.class(class).methods.get(name, hash);
        let method = match lookup {
            Some(Value::Obj(method)) => method,
            Some(other) => unreachable!("class method is not a closure: {:?}", other),
            None => {
                return Err(self.runtime_error(format!(
                    "Undefined property '{}'.",
                    self.heap.string(name).text
                )))
            }
        };
        // The receiver stays rooted on the stack during this allocation.
        let bound = self.alloc(Obj::BoundMethod(BoundMethod {
            receiver: self.peek(0),
            method,
        }));
        self.pop();
        self.push(Value::Obj(bound))
    }

    /// `Invoke`: fused property load + call, without allocating a bound
    /// method for the common case.
    fn invoke(&mut self, name: GcRef, argc: u8) -> Result<(), RuntimeError> {
        enum Target {
            Field(Value),
            Method(GcRef),
            Native(Value),
            Missing,
            NotAnInstance,
        }

        let hash = self.heap.string_hash(name);
        let target = match self.peek(argc as usize) {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Instance(instance) => match instance.fields.get(name, hash) {
                    Some(field) => Target::Field(field),
                    None => Target::Method(instance.class),
                },
                Obj::NativeClass(class) => match class.methods.get(name, hash) {
                    Some(method) => Target::Native(method),
                    None => Target::Missing,
                },
                _ => Target::NotAnInstance,
            },
            _ => Target::NotAnInstance,
        };

        match target {
            Target::Field(field) => {
                // A field shadowing a method is called as a plain value.
                let slot = self.stack.len() - argc as usize - 1;
                self.stack[slot] = field;
                self.call_value(field, argc)
            }
            Target::Method(class) => self.invoke_from_class(class, name, argc),
            Target::Native(method) => self.call_value(method, argc),
            Target::Missing => Err(self.runtime_error(format!(
                "Undefined property '{}'.",
                self.heap.string(name).text
            ))),
            Target::NotAnInstance => Err(self.runtime_error("Only instances have methods.")),
        }
    }

    fn invoke_from_class(
        &mut self,
        class: GcRef,
        name: GcRef,
        argc: u8,
    ) -> Result<(), RuntimeError> {
        let hash = self.heap.string_hash(name);
        let method = self.heap.class(class).methods.get(name, hash);
        match method {
            Some(Value::Obj(method)) => self.call_closure(method, argc),
            Some(other) => unreachable!("class method is not a closure: {:?}", other),
            None => Err(self.runtime_error(format!(
                "Undefined property '{}'.",
                self.heap.string(name).text
            ))),
        }
    }

    // ── Upvalues ──────────────────────────────────────────────────────────

    /// Find or create the open upvalue for a stack slot
    ///
    /// Sharing is load-bearing: every closure capturing the same variable
    /// must reach the same cell, so the open list is searched before
    /// allocating.
    fn capture_upvalue(&mut self, slot: usize) -> GcRef {
        let mut prev: Option<GcRef> = None;
        let mut current = self.open_upvalues;
        while let Some(r) = current {
            let (existing_slot, next) = match self.heap.upvalue(r) {
                Upvalue::Open { slot, next } => (*slot, *next),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if existing_slot == slot {
                return r;
            }
            if existing_slot < slot {
                break;
            }
            prev = Some(r);
            current = next;
        }

        let created = self.alloc(Obj::Upvalue(Upvalue::Open {
            slot,
            next: current,
        }));
        match prev {
            None => self.open_upvalues = Some(created),
            Some(prev) => match self.heap.upvalue_mut(prev) {
                Upvalue::Open { next, .. } => *next = Some(created),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            },
        }
        created
    }

    /// Close every open upvalue at or above `last`, hoisting the stack
    /// values into the cells.
    fn close_upvalues(&mut self, last: usize) {
        while let Some(r) = self.open_upvalues {
            let (slot, next) = match self.heap.upvalue(r) {
                Upvalue::Open { slot, next } => (*slot, *next),
                Upvalue::Closed(_) => unreachable!("closed upvalue on the open list"),
            };
            if slot < last {
                break;
            }
            let value = self.stack[slot];
            *self.heap.upvalue_mut(r) = Upvalue::Closed(value);
            self.open_upvalues = next;
        }
    }

    // ── Lists ─────────────────────────────────────────────────────────────

    fn list_index(&self, target: Value, index: Value) -> Result<Value, RuntimeError> {
        let items = self.subscript_target(target)?;
        let i = self.subscript_index(index, items.len())?;
        Ok(items[i])
    }

    fn list_store(
        &mut self,
        target: Value,
        index: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let items = self.subscript_target(target)?;
        let i = self.subscript_index(index, items.len())?;
        let Value::Obj(r) = target else {
            unreachable!("subscript target already validated");
        };
        self.heap.list_mut(r)[i] = value;
        Ok(())
    }

    fn subscript_target(&self, target: Value) -> Result<&Vec<Value>, RuntimeError> {
        match target {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::List(items) => Ok(items),
                _ => Err(self.runtime_error("Can only subscript lists.")),
            },
            _ => Err(self.runtime_error("Can only subscript lists.")),
        }
    }

    fn subscript_index(&self, index: Value, len: usize) -> Result<usize, RuntimeError> {
        let Value::Number(n) = index else {
            return Err(self.runtime_error("List index must be a number."));
        };
        if n.fract() != 0.0 {
            return Err(self.runtime_error("List index must be an integer."));
        }
        if n < 0.0 || n >= len as f64 {
            return Err(self.runtime_error("List index out of range."));
        }
        Ok(n as usize)
    }
}
