//! Native-function interface
//!
//! Host functions receive the VM (for heap access) and their argument
//! window. They return a plain `Result`; an `Err` becomes a runtime error
//! with the usual stack trace. Natives must not terminate the process and
//! must not keep `Value`s across their own return; stack slots may be
//! popped as soon as the call completes.

use crate::heap::GcRef;
use crate::object::{Native, NativeClass, Obj};
use crate::table::Table;
use crate::value::Value;
use crate::vm::Vm;
use std::time::{SystemTime, UNIX_EPOCH};

/// Signature of a host function callable from scripts
pub type NativeFn = fn(vm: &mut Vm, args: &[Value]) -> Result<Value, String>;

/// Seconds since the Unix epoch, as a float
pub fn clock(_vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// Install a native function under `name` in the VM's globals
pub fn define_native(vm: &mut Vm, name: &'static str, function: NativeFn) {
    // Root the name on the stack across the second allocation.
    let name_ref = vm.intern(name);
    vm.push_root(Value::Obj(name_ref));
    let native = vm.alloc(Obj::Native(Native { name, function }));
    vm.push_root(Value::Obj(native));
    vm.define_global(name_ref, Value::Obj(native));
    vm.pop_root();
    vm.pop_root();
}

/// Install a native class: a named bundle of native methods
///
/// Follows the rooting discipline for multi-allocation construction: the
/// name, then the class, stay stack-rooted while the methods table fills in.
pub fn define_native_class(vm: &mut Vm, name: &'static str, methods: &[(&'static str, NativeFn)]) {
    let name_ref = vm.intern(name);
    vm.push_root(Value::Obj(name_ref));
    let class = vm.alloc(Obj::NativeClass(NativeClass {
        name: name_ref,
        methods: Table::new(),
    }));
    vm.push_root(Value::Obj(class));
    for &(method_name, function) in methods {
        let method_ref = vm.intern(method_name);
        let hash = vm.heap().string_hash(method_ref);
        vm.push_root(Value::Obj(method_ref));
        let native = vm.alloc(Obj::Native(Native {
            name: method_name,
            function,
        }));
        native_class_methods(vm, class).set(method_ref, hash, Value::Obj(native));
        vm.pop_root();
    }
    vm.define_global(name_ref, Value::Obj(class));
    vm.pop_root();
    vm.pop_root();
}

fn native_class_methods(vm: &mut Vm, class: GcRef) -> &mut Table {
    match vm.heap_mut().get_mut(class) {
        Obj::NativeClass(c) => &mut c.methods,
        _ => unreachable!("native class handle lost its kind"),
    }
}
