//! Heap object kinds
//!
//! Every reference value the VM can produce lives here: strings, functions,
//! closures and their upvalue cells, classes, instances, bound methods,
//! native bindings, and lists. Each kind knows how to display itself and how
//! to enumerate its outgoing references for the collector.

use crate::bytecode::Chunk;
use crate::heap::{GcRef, Heap};
use crate::native::NativeFn;
use crate::table::Table;
use crate::value::Value;

/// A heap-resident object
#[derive(Debug)]
pub enum Obj {
    String(ObjString),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    NativeClass(NativeClass),
    Native(Native),
    List(Vec<Value>),
}

/// Interned string payload: owned bytes plus the cached FNV-1a hash
#[derive(Debug)]
pub struct ObjString {
    pub text: String,
    pub hash: u32,
}

/// A compiled function prototype
#[derive(Debug)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// Interned name; `None` for the top-level script
    pub name: Option<GcRef>,
}

impl Function {
    pub fn new(name: Option<GcRef>) -> Self {
        Self {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// A function paired with its captured upvalues; the callable value at runtime
#[derive(Debug)]
pub struct Closure {
    pub function: GcRef,
    pub upvalues: Vec<GcRef>,
}

/// A capture cell
///
/// Open while its source stack slot is live; closed once the slot is popped.
/// Open cells thread an intrusive list ordered by decreasing slot index so
/// the VM can find an existing capture for a slot before allocating another.
#[derive(Debug)]
pub enum Upvalue {
    Open { slot: usize, next: Option<GcRef> },
    Closed(Value),
}

/// A user-defined class
#[derive(Debug)]
pub struct Class {
    pub name: GcRef,
    /// name → closure
    pub methods: Table,
}

/// An instance of a user-defined class
#[derive(Debug)]
pub struct Instance {
    pub class: GcRef,
    pub fields: Table,
}

/// A receiver paired with a method closure, so later calls re-bind `this`
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: GcRef,
}

/// A class implemented by the host: a name plus a table of native methods
#[derive(Debug)]
pub struct NativeClass {
    pub name: GcRef,
    /// name → native function
    pub methods: Table,
}

/// A host function callable from scripts
pub struct Native {
    pub name: &'static str,
    pub function: NativeFn,
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Native").field("name", &self.name).finish()
    }
}

impl Obj {
    /// Short kind name for error messages and GC logging
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "closure",
            Obj::Upvalue(_) => "upvalue",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "bound method",
            Obj::NativeClass(_) => "native class",
            Obj::Native(_) => "native",
            Obj::List(_) => "list",
        }
    }

    /// Get a string representation of this object
    pub fn to_display_string(&self, heap: &Heap) -> String {
        match self {
            Obj::String(s) => s.text.clone(),
            Obj::Function(f) => match f.name {
                Some(name) => format!("<fn {}>", heap.string(name).text),
                None => "<script>".to_string(),
            },
            Obj::Closure(c) => heap.get(c.function).to_display_string(heap),
            Obj::Upvalue(_) => "<upvalue>".to_string(),
            Obj::Class(c) => format!("<class {}>", heap.string(c.name).text),
            Obj::Instance(i) => {
                let class = heap.class(i.class);
                format!("{} instance", heap.string(class.name).text)
            }
            Obj::BoundMethod(b) => heap.get(b.method).to_display_string(heap),
            Obj::NativeClass(c) => format!("<native class {}>", heap.string(c.name).text),
            Obj::Native(_) => "<native fn>".to_string(),
            Obj::List(items) => {
                let parts: Vec<String> =
                    items.iter().map(|v| v.to_display_string(heap)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    /// Push every outgoing object reference onto `out` (GC blacken step)
    pub fn trace(&self, out: &mut Vec<GcRef>) {
        match self {
            Obj::String(_) | Obj::Native(_) => {}
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    out.push(name);
                }
                for constant in &f.chunk.constants {
                    if let Value::Obj(r) = constant {
                        out.push(*r);
                    }
                }
            }
            Obj::Closure(c) => {
                out.push(c.function);
                out.extend(c.upvalues.iter().copied());
            }
            Obj::Upvalue(u) => match u {
                Upvalue::Open { next, .. } => {
                    if let Some(next) = next {
                        out.push(*next);
                    }
                }
                Upvalue::Closed(Value::Obj(r)) => out.push(*r),
                Upvalue::Closed(_) => {}
            },
            Obj::Class(c) => {
                out.push(c.name);
                trace_table(&c.methods, out);
            }
            Obj::Instance(i) => {
                out.push(i.class);
                trace_table(&i.fields, out);
            }
            Obj::BoundMethod(b) => {
                if let Value::Obj(r) = b.receiver {
                    out.push(r);
                }
                out.push(b.method);
            }
            Obj::NativeClass(c) => {
                out.push(c.name);
                trace_table(&c.methods, out);
            }
            Obj::List(items) => {
                for item in items {
                    if let Value::Obj(r) = item {
                        out.push(*r);
                    }
                }
            }
        }
    }

    /// Rough heap footprint used for the collection trigger
    pub fn size_estimate(&self) -> usize {
        let payload = match self {
            Obj::String(s) => s.text.capacity(),
            Obj::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * std::mem::size_of::<u32>()
                    + f.chunk.constants.capacity() * std::mem::size_of::<Value>()
            }
            Obj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<GcRef>(),
            Obj::Upvalue(_) | Obj::BoundMethod(_) | Obj::Native(_) => 0,
            Obj::Class(c) => c.methods.len() * 2 * std::mem::size_of::<Value>(),
            Obj::Instance(i) => i.fields.len() * 2 * std::mem::size_of::<Value>(),
            Obj::NativeClass(c) => c.methods.len() * 2 * std::mem::size_of::<Value>(),
            Obj::List(items) => items.capacity() * std::mem::size_of::<Value>(),
        };
        std::mem::size_of::<Obj>() + payload
    }
}

fn trace_table(table: &Table, out: &mut Vec<GcRef>) {
    for (key, value) in table.iter() {
        out.push(key);
        if let Value::Obj(r) = value {
            out.push(r);
        }
    }
}
