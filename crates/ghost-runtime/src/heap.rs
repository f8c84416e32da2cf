//! Object heap and mark-sweep garbage collector
//!
//! All reference values live in a slot arena owned by the heap. Allocation
//! claims a free slot (or appends one), sweep returns unmarked slots to the
//! free list. [`GcRef`] handles are slot indices, so they stay valid for the
//! object's whole lifetime; nothing ever moves.
//!
//! The heap does not decide *when* to collect: whoever owns the roots (the
//! VM during execution, the compiler between statements) checks
//! [`Heap::should_collect`], marks its roots, and drives
//! [`Heap::trace_references`] + [`Heap::sweep`].

use crate::object::{Obj, ObjString};
use crate::table::Table;
use crate::value::Value;

/// Collect when live bytes double since the last cycle
const GC_HEAP_GROW_FACTOR: usize = 2;
/// Floor for the next-collection threshold
const GC_NEXT_MIN: usize = 1024 * 1024;

/// FNV-1a offset basis
const FNV_OFFSET_BASIS: u32 = 2166136261;
/// FNV-1a prime
const FNV_PRIME: u32 = 16777619;

/// Handle to a heap object (a stable slot index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcRef(u32);

impl GcRef {
    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        GcRef(raw)
    }
}

struct Slot {
    marked: bool,
    obj: Obj,
}

/// The object heap
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    /// String-intern set: every live string, keyed by itself. Weak: entries
    /// whose key is unmarked are dropped before each sweep.
    strings: Table,
    /// Gray worklist: marked objects whose references are not yet traced
    gray: Vec<GcRef>,
    bytes_allocated: usize,
    next_gc: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    /// Create a new empty heap
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: Table::new(),
            gray: Vec::new(),
            bytes_allocated: 0,
            next_gc: GC_NEXT_MIN,
        }
    }

    /// Bytes currently attributed to live objects
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the growth threshold has been crossed
    ///
    /// With the `gc-stress` feature every allocation wants a collection.
    pub fn should_collect(&self) -> bool {
        if cfg!(feature = "gc-stress") {
            return true;
        }
        self.bytes_allocated > self.next_gc
    }

    /// Link a new object into the heap and return its handle
    ///
    /// Callers that might hold the only reference across a later allocation
    /// must root the handle first (canonically: push it on the VM stack).
    pub fn allocate(&mut self, obj: Obj) -> GcRef {
        self.bytes_allocated += obj.size_estimate();
        let slot = Slot { marked: false, obj };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as u32
            }
        };
        #[cfg(feature = "gc-log")]
        eprintln!(
            "[gc] alloc {:>4} {} ({} bytes live)",
            index,
            self.slots[index as usize].as_ref().unwrap().obj.kind_name(),
            self.bytes_allocated
        );
        GcRef(index)
    }

    // ── String interning ──────────────────────────────────────────────────

    /// Intern a string, copying the bytes on a miss
    pub fn copy_string(&mut self, text: &str) -> GcRef {
        let hash = hash_string(text.as_bytes());
        if let Some(existing) = self.find_interned(text, hash) {
            return existing;
        }
        self.intern_new(text.to_string(), hash)
    }

    /// Intern a string, taking ownership of an already-built buffer
    ///
    /// On an intern hit the buffer is dropped here and the canonical handle
    /// returned, so identity equals byte equality everywhere.
    pub fn take_string(&mut self, text: String) -> GcRef {
        let hash = hash_string(text.as_bytes());
        if let Some(existing) = self.find_interned(&text, hash) {
            return existing;
        }
        self.intern_new(text, hash)
    }

    fn find_interned(&self, text: &str, hash: u32) -> Option<GcRef> {
        self.strings
            .find_key(hash, |candidate| self.string(candidate).text == text)
    }

    fn intern_new(&mut self, text: String, hash: u32) -> GcRef {
        let r = self.allocate(Obj::String(ObjString { text, hash }));
        // Registering in the intern set cannot trigger a collection (table
        // growth is plain Vec memory), so the fresh string needs no root.
        self.strings.set(r, hash, Value::Null);
        r
    }

    // ── Typed accessors ───────────────────────────────────────────────────
    //
    // Kind mismatches are internal invariant violations, not script errors;
    // the VM checks kinds before it reaches for a payload.

    /// Borrow an object
    pub fn get(&self, r: GcRef) -> &Obj {
        &self.slot(r).obj
    }

    /// Mutably borrow an object
    pub fn get_mut(&mut self, r: GcRef) -> &mut Obj {
        &mut self.slot_mut(r).obj
    }

    pub fn string(&self, r: GcRef) -> &ObjString {
        match &self.slot(r).obj {
            Obj::String(s) => s,
            other => unreachable!("expected string, found {}", other.kind_name()),
        }
    }

    pub fn string_hash(&self, r: GcRef) -> u32 {
        self.string(r).hash
    }

    pub fn function(&self, r: GcRef) -> &crate::object::Function {
        match &self.slot(r).obj {
            Obj::Function(f) => f,
            other => unreachable!("expected function, found {}", other.kind_name()),
        }
    }

    pub fn closure(&self, r: GcRef) -> &crate::object::Closure {
        match &self.slot(r).obj {
            Obj::Closure(c) => c,
            other => unreachable!("expected closure, found {}", other.kind_name()),
        }
    }

    pub fn closure_mut(&mut self, r: GcRef) -> &mut crate::object::Closure {
        match &mut self.slot_mut(r).obj {
            Obj::Closure(c) => c,
            other => unreachable!("expected closure, found {}", other.kind_name()),
        }
    }

    pub fn upvalue(&self, r: GcRef) -> &crate::object::Upvalue {
        match &self.slot(r).obj {
            Obj::Upvalue(u) => u,
            other => unreachable!("expected upvalue, found {}", other.kind_name()),
        }
    }

    pub fn upvalue_mut(&mut self, r: GcRef) -> &mut crate::object::Upvalue {
        match &mut self.slot_mut(r).obj {
            Obj::Upvalue(u) => u,
            other => unreachable!("expected upvalue, found {}", other.kind_name()),
        }
    }

    pub fn class(&self, r: GcRef) -> &crate::object::Class {
        match &self.slot(r).obj {
            Obj::Class(c) => c,
            other => unreachable!("expected class, found {}", other.kind_name()),
        }
    }

    pub fn class_mut(&mut self, r: GcRef) -> &mut crate::object::Class {
        match &mut self.slot_mut(r).obj {
            Obj::Class(c) => c,
            other => unreachable!("expected class, found {}", other.kind_name()),
        }
    }

    pub fn instance(&self, r: GcRef) -> &crate::object::Instance {
        match &self.slot(r).obj {
            Obj::Instance(i) => i,
            other => unreachable!("expected instance, found {}", other.kind_name()),
        }
    }

    pub fn instance_mut(&mut self, r: GcRef) -> &mut crate::object::Instance {
        match &mut self.slot_mut(r).obj {
            Obj::Instance(i) => i,
            other => unreachable!("expected instance, found {}", other.kind_name()),
        }
    }

    pub fn list(&self, r: GcRef) -> &Vec<Value> {
        match &self.slot(r).obj {
            Obj::List(items) => items,
            other => unreachable!("expected list, found {}", other.kind_name()),
        }
    }

    pub fn list_mut(&mut self, r: GcRef) -> &mut Vec<Value> {
        match &mut self.slot_mut(r).obj {
            Obj::List(items) => items,
            other => unreachable!("expected list, found {}", other.kind_name()),
        }
    }

    fn slot(&self, r: GcRef) -> &Slot {
        self.slots[r.0 as usize]
            .as_ref()
            .unwrap_or_else(|| unreachable!("dangling heap handle {:?}", r))
    }

    fn slot_mut(&mut self, r: GcRef) -> &mut Slot {
        self.slots[r.0 as usize]
            .as_mut()
            .unwrap_or_else(|| unreachable!("dangling heap handle {:?}", r))
    }

    // ── Collection ────────────────────────────────────────────────────────

    /// Mark a value if it references a heap object
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    /// Mark an object and queue it for tracing
    pub fn mark_object(&mut self, r: GcRef) {
        let slot = self.slot_mut(r);
        if slot.marked {
            return;
        }
        slot.marked = true;
        #[cfg(feature = "gc-log")]
        eprintln!("[gc] mark {:>4} {}", r.0, slot.obj.kind_name());
        self.gray.push(r);
    }

    /// Mark every key and value of a table living outside the heap
    /// (the VM's globals)
    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Whether an object is currently marked (test hook)
    pub fn is_marked(&self, r: GcRef) -> bool {
        self.slot(r).marked
    }

    /// Drain the gray worklist, blackening each object by marking everything
    /// it references
    pub fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(r) = self.gray.pop() {
            children.clear();
            self.slot(r).obj.trace(&mut children);
            for &child in &children {
                self.mark_object(child);
            }
        }
    }

    /// Free every unmarked object and clear the marks on survivors
    ///
    /// The intern set is weeded first so it never holds a dangling key;
    /// interning alone keeps no string alive.
    pub fn sweep(&mut self) {
        let Heap {
            strings, slots, ..
        } = self;
        strings.remove_white(|r| {
            slots[r.0 as usize]
                .as_ref()
                .is_some_and(|slot| slot.marked)
        });

        for (index, entry) in self.slots.iter_mut().enumerate() {
            match entry {
                Some(slot) if slot.marked => slot.marked = false,
                Some(slot) => {
                    self.bytes_allocated -= slot.obj.size_estimate();
                    #[cfg(feature = "gc-log")]
                    eprintln!("[gc] free {:>4} {}", index, slot.obj.kind_name());
                    *entry = None;
                    self.free.push(index as u32);
                }
                None => {}
            }
        }

        self.next_gc = std::cmp::max(self.bytes_allocated * GC_HEAP_GROW_FACTOR, GC_NEXT_MIN);
        #[cfg(feature = "gc-log")]
        eprintln!(
            "[gc] sweep done: {} bytes live, next collection at {}",
            self.bytes_allocated, self.next_gc
        );
    }
}

/// 32-bit FNV-1a
pub fn hash_string(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
