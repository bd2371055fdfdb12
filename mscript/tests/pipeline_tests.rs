//! Pipeline-level properties: loader stages, link invariants, imports,
//! native registration, error reporting and cancellation.

mod common;

use common::{load, load_error, loaded_program, run_i32, MAIN};
use mscript::{
    CancelFlag, CompileError, Error, NativeSpec, Runtime, Val, Vm, VmError,
};
use mscript_parser::ParseError;

// ==================== link invariants ====================

#[test]
fn test_no_intermediate_opcodes_after_link() {
    let source = r#"
        int helper(int n) { return n * 2; }
        int entry(int n) {
            if (n > 0) return helper(n);
            int[] a = [1, 2, 3];
            print("tail: ", a[0], "\n");
            return a[0];
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);

    assert!(!program.opcodes().is_empty());
    for op in program.opcodes() {
        assert!(!op.is_intermediate(), "intermediate opcode survived: {:?}", op);
    }
}

#[test]
fn test_every_call_targets_a_function_entry() {
    let source = r#"
        int leaf(int n) { return n + 1; }
        int mid(int n) { return leaf(n) + leaf(n); }
        int top(int n) { return mid(n); }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);

    let entries: Vec<usize> = program.func_label_map().values().copied().collect();
    for op in program.opcodes() {
        if let mscript::Opcode::Call { target, .. } = op {
            assert!(
                entries.contains(target),
                "call target {} is not a function entry",
                target
            );
        }
    }
}

#[test]
fn test_struct_layout_invariants() {
    let source = r#"
        struct inner {
            float x, y;
        }
        struct mixed {
            int tag;
            inner pair;
            vec3 dir;
            int[] items;
        }
        int touch(mixed m) { return m.tag; }
    "#;
    let runtime = load(source);
    loaded_program(&runtime);

    for decl in runtime.types().structs() {
        let mut expected_offset = 0;
        for member in &decl.members {
            assert_eq!(
                member.offset, expected_offset,
                "member '{}' of '{}' is misplaced",
                member.name, decl.name
            );
            expected_offset += runtime.types().size(member.ty);
        }
    }
    // mixed: 4 (tag) + 8 (pair) + 12 (dir) + 4 (array handle)
    let mixed = runtime
        .types()
        .structs()
        .find(|decl| decl.name == "mixed")
        .expect("mixed not registered");
    let total: i32 = mixed
        .members
        .iter()
        .map(|m| runtime.types().size(m.ty))
        .sum();
    assert_eq!(total, 28);
}

// ==================== constant folding vs VM evaluation ====================

/// Deterministic generator so the property runs identically everywhere.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

/// Build a random `+ - *` expression over small ints, returning the source
/// text and its wrapping evaluation.
fn random_int_expr(lcg: &mut Lcg, depth: u32) -> (String, i32) {
    if depth == 0 || lcg.next() % 4 == 0 {
        let v = (lcg.next() % 97) as i32;
        return (v.to_string(), v);
    }
    let (left, lv) = random_int_expr(lcg, depth - 1);
    let (right, rv) = random_int_expr(lcg, depth - 1);
    match lcg.next() % 3 {
        0 => (format!("({} + {})", left, right), lv.wrapping_add(rv)),
        1 => (format!("({} - {})", left, right), lv.wrapping_sub(rv)),
        _ => (format!("({} * {})", left, right), lv.wrapping_mul(rv)),
    }
}

#[test]
fn test_constant_folding_agrees_with_vm() {
    let mut lcg = Lcg(0x5eed);
    for _ in 0..32 {
        let (expr, expected) = random_int_expr(&mut lcg, 3);
        // the global initializer folds at check time; the function body
        // evaluates the same expression opcode by opcode
        let source = format!(
            "int folded = {expr};\n\
             int from_fold() {{ return folded; }}\n\
             int from_vm() {{ return {expr}; }}\n"
        );
        assert_eq!(run_i32(&source, "from_fold", &[]), expected, "fold of {}", expr);
        assert_eq!(run_i32(&source, "from_vm", &[]), expected, "vm eval of {}", expr);
    }
}

// ==================== imports ====================

#[test]
fn test_import_shares_functions_globals_and_types() {
    let lib = r#"
        struct point {
            int x, y;
        }
        int scale = 3;
        int triple(int n) { return n * scale; }
    "#;
    let main = r#"
        import "lib.mscript";
        int use_lib(int n) {
            point p = {x = triple(n), y = 1};
            return p.x + p.y;
        }
    "#;
    let runtime = Runtime::from_sources(&[("lib.mscript", lib), (MAIN, main)]);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("use_lib", &[Val::Int(4)]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 13);
}

#[test]
fn test_transitive_import() {
    let base = "int base_val = 7;";
    let mid = r#"
        import "base.mscript";
        int doubled() { return base_val * 2; }
    "#;
    let main = r#"
        import "mid.mscript";
        int top() { return doubled() + base_val; }
    "#;
    let runtime = Runtime::from_sources(&[
        ("base.mscript", base),
        ("mid.mscript", mid),
        (MAIN, main),
    ]);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("top", &[]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 21);
}

#[test]
fn test_import_not_found() {
    let err = load_error(r#"import "missing.mscript";"#);
    assert!(matches!(
        err,
        Error::Compile(CompileError::ImportNotFound { .. })
    ));
}

#[test]
fn test_importing_a_broken_program_fails() {
    let broken = "int bad( { }";
    let main = r#"
        import "broken.mscript";
        int f() { return 1; }
    "#;
    let runtime = Runtime::from_sources(&[("broken.mscript", broken), (MAIN, main)]);

    let broken_program = runtime.program("broken.mscript").expect("program missing");
    assert!(matches!(broken_program.error(), Some(Error::Parse(_))));

    let main_program = runtime.program(MAIN).expect("program missing");
    assert!(matches!(
        main_program.error(),
        Some(Error::Compile(CompileError::ImportFailed { .. }))
    ));
}

#[test]
fn test_other_programs_survive_one_failure() {
    let broken = "float f() { return 1.0 }";
    let fine = "int ok() { return 5; }";
    let runtime = Runtime::from_sources(&[("broken.mscript", broken), ("fine.mscript", fine)]);

    assert!(runtime.program("broken.mscript").expect("program").error().is_some());
    let program = runtime.program("fine.mscript").expect("program");
    assert!(program.error().is_none());
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("ok", &[]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 5);
}

#[test]
fn test_nested_struct_global_round_trips_through_globals_section() {
    // the object literal folds to a constant tree, is serialized into the
    // globals section at vm creation, and reads back member by member
    let source = r#"
        struct inner {
            int a;
            float b;
        }
        struct outer {
            inner first, second;
            int tag;
        }
        outer config = {first = {a = 1, b = 2.5}, second = {a = 3, b = 4.5}, tag = 7};
        int tag() { return config.tag; }
        int second_a() { return config.second.a; }
        float second_b() { return config.second.b; }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");

    vm.run("tag", &[]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 7);
    vm.run("second_a", &[]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 3);
    vm.run("second_b", &[]).expect("run failed");
    assert_eq!(vm.stack_f32(0), 4.5);
}

#[test]
fn test_load_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("lib.mscript"), "int five() { return 5; }")
        .expect("write lib");
    std::fs::write(
        dir.path().join("tests.mscript"),
        "import \"lib.mscript\";\nint ten() { return five() * 2; }",
    )
    .expect("write main");
    // non-script files are ignored
    std::fs::write(dir.path().join("notes.txt"), "not a script").expect("write notes");

    let runtime = Runtime::create(dir.path()).expect("load_dir failed");
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("ten", &[]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 10);
}

// ==================== native functions ====================

#[test]
fn test_registered_native_is_callable() {
    let source = "float call_host(float x) { return host_scale(x, 3); }";
    let runtime = Runtime::builder()
        .native(NativeSpec::new(
            "host_scale",
            "float",
            &["float", "int"],
            |args| match (&args[0], &args[1]) {
                (Val::Float(f), Val::Int(i)) => Val::Float(f * *i as f32),
                _ => Val::Float(0.0),
            },
        ))
        .load_sources(&[(MAIN, source)]);

    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("call_host", &[Val::Float(2.5)]).expect("run failed");
    assert_eq!(vm.stack_f32(0), 7.5);
}

#[test]
fn test_import_function_binds_host_callable() {
    let source = r#"
        import_function int host_add(int a, int b);
        int use_host(int n) { return host_add(n, 5); }
    "#;
    let runtime = Runtime::builder()
        .native(NativeSpec::new(
            "host_add",
            "int",
            &["int", "int"],
            |args| match (&args[0], &args[1]) {
                (Val::Int(a), Val::Int(b)) => Val::Int(a + b),
                _ => Val::Int(0),
            },
        ))
        .load_sources(&[(MAIN, source)]);

    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("use_host", &[Val::Int(4)]).expect("run failed");
    assert_eq!(vm.stack_i32(0), 9);
}

#[test]
fn test_import_function_without_registration_fails() {
    let err = load_error(
        r#"
        import_function int host_missing(int a);
        int f() { return host_missing(1); }
    "#,
    );
    assert!(matches!(
        err,
        Error::Compile(CompileError::UndefinedFunction { .. })
    ));
}

// ==================== cancellation ====================

#[test]
fn test_instruction_limit_halts_runaway_script() {
    let source = "void spin() { for (0; true; 0) 0; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.set_instruction_limit(10_000);
    assert_eq!(vm.run("spin", &[]), Err(VmError::InstructionLimit));
}

#[test]
fn test_cancel_flag_halts_execution() {
    let source = "void spin() { for (0; true; 0) 0; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    let flag = CancelFlag::new();
    flag.request();
    vm.set_cancel_flag(flag);
    vm.set_check_cadence(64);
    assert_eq!(vm.run("spin", &[]), Err(VmError::Cancelled));
}

// ==================== error reporting ====================

#[test]
fn test_lex_errors() {
    assert!(matches!(
        load_error("int f() { return 1 @ 2; }"),
        Error::Parse(ParseError::UnknownCharacter { ch: '@', .. })
    ));
    assert!(matches!(
        load_error(r#"char* s = "\q";"#),
        Error::Parse(ParseError::InvalidEscape { .. })
    ));
}

#[test]
fn test_parse_error_reports_first_token() {
    let err = load_error("int f() {\n    return 1\n}");
    match err {
        Error::Parse(ParseError::ExpectedChar { expected, span, .. }) => {
            assert_eq!(expected, ';');
            assert_eq!(span.start_line, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_undefined_symbol_function_and_type() {
    assert!(matches!(
        load_error("int f() { return missing; }"),
        Error::Compile(CompileError::UndefinedSymbol { .. })
    ));
    assert!(matches!(
        load_error("int f() { return missing(); }"),
        Error::Compile(CompileError::UndefinedFunction { .. })
    ));
    assert!(matches!(
        load_error("int f() { widget w; return 0; }"),
        Error::Compile(CompileError::UndefinedType { .. })
    ));
}

#[test]
fn test_redeclaration_errors() {
    assert!(matches!(
        load_error("int twice = 1;\nfloat twice = 2.0;"),
        Error::Compile(CompileError::Redeclaration { .. })
    ));
    assert!(matches!(
        load_error("int f(int n) { int n = 2; return n; }"),
        Error::Compile(CompileError::Redeclaration { .. })
    ));
}

#[test]
fn test_recursive_struct_detected() {
    let err = load_error(
        r#"
        struct node {
            int value;
            node next;
        }
        int f() { return 0; }
    "#,
    );
    assert!(matches!(
        err,
        Error::Compile(CompileError::RecursiveStruct { .. })
    ));
}

#[test]
fn test_array_member_breaks_struct_cycle() {
    let source = r#"
        struct node {
            int value;
            node[] children;
        }
        int f() {
            node n = {value = 3, children = NULL};
            return n.value;
        }
    "#;
    assert_eq!(run_i32(source, "f", &[]), 3);
}

#[test]
fn test_cannot_cast_errors() {
    assert!(matches!(
        load_error("int f(vec3 v) { return v; }"),
        Error::Compile(CompileError::CannotCast { .. })
    ));
    assert!(matches!(
        load_error("int f(vec3 v, int n) { return n + v.x > 0.0; }"),
        Error::Compile(CompileError::CannotCast { .. })
    ));
}

#[test]
fn test_wrong_arg_count_and_member_name() {
    assert!(matches!(
        load_error("int f(int n) { return f(n, 1); }"),
        Error::Compile(CompileError::WrongArgCount { .. })
    ));
    let err = load_error(
        r#"
        struct point {
            int x, y;
        }
        int f(point p) { return p.z; }
    "#,
    );
    assert!(matches!(
        err,
        Error::Compile(CompileError::WrongMemberName { .. })
    ));
}

#[test]
fn test_object_literal_member_order_enforced() {
    let err = load_error(
        r#"
        struct point {
            int x, y;
        }
        int f() {
            point p = {y = 1, x = 2};
            return p.x;
        }
    "#,
    );
    assert!(matches!(
        err,
        Error::Compile(CompileError::WrongMemberName { .. })
    ));
}

#[test]
fn test_invalid_lvalue() {
    assert!(matches!(
        load_error("int f(int n) { n + 1 = 2; return n; }"),
        Error::Compile(CompileError::InvalidLvalue { .. })
    ));
}

#[test]
fn test_control_flow_errors() {
    assert!(matches!(
        load_error("int f(int n) { if (n > 0) return 1; }"),
        Error::Compile(CompileError::NotAllPathsReturn { .. })
    ));
    assert!(matches!(
        load_error("int f(int n) { return 1; return 2; }"),
        Error::Compile(CompileError::UnreachableStatement { .. })
    ));
}

#[test]
fn test_if_with_full_else_returns() {
    let source = r#"
        int sign(int n) {
            if (n > 0) return 1;
            else if (n < 0) return 0 - 1;
            else return 0;
        }
    "#;
    assert_eq!(run_i32(source, "sign", &[Val::Int(-5)]), -1);
}

#[test]
fn test_non_const_global_initializer() {
    let err = load_error(
        r#"
        int helper() { return 1; }
        int bad = helper();
    "#,
    );
    assert!(matches!(
        err,
        Error::Compile(CompileError::NonConstGlobalInitializer { .. })
    ));
}

#[test]
fn test_const_global_initializer_folds() {
    let source = r#"
        float tau = PI * 2.0;
        float get_tau() { return tau; }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("get_tau", &[]).expect("run failed");
    assert_eq!(vm.stack_f32(0), 3.14159_f32 * 2.0);
}

#[test]
fn test_untyped_literals_are_rejected() {
    assert!(matches!(
        load_error("void f() { NULL; }"),
        Error::Compile(CompileError::CannotDetermineNullType { .. })
    ));
    assert!(matches!(
        load_error("void f() { [1, 2]; }"),
        Error::Compile(CompileError::CannotDetermineArrayType { .. })
    ));
}
