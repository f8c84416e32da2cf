//! Disassembler output and operand-width laws

use ghost_runtime::{disassemble, disassemble_instruction, GcRef, Obj, Opcode, Value, Vm};

/// Sources that together emit every opcode in the instruction set.
const COVERAGE: &[&str] = &[
    "print 1 + 2 * 3 - 4 / 5;",
    "print -1; print !true; print null;",
    "print 1 < 2; print 1 > 2; print 1 == 2; print 1 != 2; print 1 <= 2; print 1 >= 2;",
    "var g = 1; g = 2; print g;",
    "{ var a = 1; var b = a; b = 2; print b; }",
    "if (true and false or true) { print 1; } else { print 2; }",
    "while (false) { print 1; }",
    "for (var i = 0; i < 3; i = i + 1) { print i; }",
    "function f(a, b) { return a + b; } print f(1, 2);",
    "function make() { var n = 0; function inc() { n = n + 1; return n; } return inc; } make()();",
    "var f; { var x = 1; function shower() { return x; } f = shower; } f();",
    "class A { init() { this.x = 1; } m() { return this.x; } }\n\
     class B < A { m() { return super.m(); } n() { var f = super.m; return f(); } }\n\
     var b = B(); b.m(); print b.x;",
    "var l = [1, 2, 3]; l[0] = l[1]; print l[2];",
];

fn each_function(vm: &Vm, script: GcRef, mut visit: impl FnMut(&Vm, GcRef)) {
    let mut pending = vec![script];
    while let Some(r) = pending.pop() {
        visit(vm, r);
        for constant in &vm.heap().function(r).chunk.constants {
            if let Value::Obj(nested) = constant {
                if matches!(vm.heap().get(*nested), Obj::Function(_)) {
                    pending.push(*nested);
                }
            }
        }
    }
}

/// Every emitted instruction decodes with a valid operand width: walking the
/// chunk instruction by instruction lands exactly on the end of the code,
/// and every opcode byte is recognized.
#[test]
fn test_disassembler_walks_every_chunk_exactly() {
    for source in COVERAGE {
        let mut vm = Vm::new();
        let script = vm
            .compile(source)
            .unwrap_or_else(|e| panic!("source failed to compile: {:?}\n{}", e, source));
        each_function(&vm, script, |vm, r| {
            let chunk = &vm.heap().function(r).chunk;
            let mut offset = 0;
            let mut instructions = 0;
            while offset < chunk.code.len() {
                let mut line = String::new();
                let next = disassemble_instruction(chunk, offset, vm.heap(), &mut line);
                assert!(
                    !line.contains("<invalid"),
                    "undecodable instruction in {:?}: {}",
                    source,
                    line
                );
                assert!(next > offset, "decoder did not advance at {}", offset);
                offset = next;
                instructions += 1;
            }
            assert_eq!(offset, chunk.code.len(), "operand widths drifted");
            assert!(instructions > 0);
        });
    }
}

/// The coverage sources exercise the complete opcode set.
#[test]
fn test_coverage_sources_emit_every_opcode() {
    let mut seen = [false; 40];
    for source in COVERAGE {
        let mut vm = Vm::new();
        let script = vm.compile(source).expect("coverage source compiles");
        each_function(&vm, script, |vm, r| {
            let chunk = &vm.heap().function(r).chunk;
            let mut offset = 0;
            while offset < chunk.code.len() {
                let opcode = Opcode::try_from(chunk.code[offset]).expect("valid opcode");
                seen[opcode as usize] = true;
                let mut sink = String::new();
                offset = disassemble_instruction(chunk, offset, vm.heap(), &mut sink);
            }
        });
    }
    let missing: Vec<usize> = seen
        .iter()
        .enumerate()
        .filter(|(_, &s)| !s)
        .map(|(i, _)| i)
        .collect();
    assert!(missing.is_empty(), "opcodes never emitted: {:?}", missing);
}

/// Compilation is deterministic: the same source yields byte-identical
/// chunks, so a disassembly listing is a stable artifact.
#[test]
fn test_recompilation_yields_identical_bytecode() {
    for source in COVERAGE {
        let mut first = Vm::new();
        let mut second = Vm::new();
        let a = first.compile(source).expect("compiles");
        let b = second.compile(source).expect("compiles");
        let code_a = &first.heap().function(a).chunk.code;
        let code_b = &second.heap().function(b).chunk.code;
        assert_eq!(code_a, code_b, "nondeterministic compile for {:?}", source);
        let listing_a = disassemble(&first.heap().function(a).chunk, "<script>", first.heap());
        let listing_b = disassemble(&second.heap().function(b).chunk, "<script>", second.heap());
        assert_eq!(listing_a, listing_b);
    }
}

#[test]
fn test_disassembly_format() {
    let mut vm = Vm::new();
    let script = vm.compile("print 1 + 2;").expect("compiles");
    let chunk = &vm.heap().function(script).chunk;
    let listing = disassemble(chunk, "<script>", vm.heap());
    insta::assert_snapshot!(listing, @r"
    == <script> ==
    0000    1 Constant            0 '1'
    0002    | Constant            1 '2'
    0004    | Add
    0005    | Print
    0006    | Null
    0007    | Return
    ");
}

#[test]
fn test_disassembly_of_closure_lists_upvalue_pairs() {
    let mut vm = Vm::new();
    let script = vm
        .compile("var f;\n{ var x = 1; function inner() { return x; } f = inner; }\nf();")
        .expect("compiles");
    let mut listing = String::new();
    each_function(&vm, script, |vm, r| {
        let function = vm.heap().function(r);
        let name = match function.name {
            Some(n) => vm.heap().string(n).text.clone(),
            None => "<script>".to_string(),
        };
        listing.push_str(&disassemble(&function.chunk, &name, vm.heap()));
    });
    assert!(listing.contains("Closure"));
    assert!(listing.contains("local 1"), "upvalue pair missing:\n{}", listing);
    assert!(listing.contains("GetUpvalue"));
    assert!(listing.contains("CloseUpvalue"));
}
