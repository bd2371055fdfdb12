//! End-to-end scenarios: load a source file, invoke a named function with
//! typed arguments, and assert on the return value at the bottom of the
//! operand stack.

mod common;

use common::{load, loaded_program, run_f32, run_i32, MAIN};
use mscript::{Val, Vm, VmError};

#[test]
fn test_int_addition() {
    let source = "int int_addition(int a, int b) { return a + b; }";
    assert_eq!(
        run_i32(source, "int_addition", &[Val::Int(7), Val::Int(15)]),
        22
    );
}

#[test]
fn test_int_subtraction() {
    let source = "int int_subtraction(int a, int b) { return a - b; }";
    assert_eq!(
        run_i32(source, "int_subtraction", &[Val::Int(7), Val::Int(15)]),
        -8
    );
}

#[test]
fn test_float_arithmetic() {
    let source = "float float_madd(float a, float b, float c) { return a * b + c; }";
    let result = run_f32(
        source,
        "float_madd",
        &[Val::Float(2.5), Val::Float(4.0), Val::Float(1.5)],
    );
    assert_eq!(result, 11.5);
}

#[test]
fn test_fib() {
    let source = r#"
        int fib(int n) {
            if (n < 2) return n;
            return fib(n - 1) + fib(n - 2);
        }
    "#;
    assert_eq!(run_i32(source, "fib", &[Val::Int(10)]), 55);
}

#[test]
fn test_array_1() {
    let source = r#"
        int array_1(int n) {
            int[] a = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
            a[9] = n;
            return a[9];
        }
    "#;
    assert_eq!(run_i32(source, "array_1", &[Val::Int(10)]), 10);
}

#[test]
fn test_array_2() {
    let source = r#"
        int array_2(int n) {
            int[] a = [];
            int i;
            for (i = 0; i < n; i++) a[i] = i;
            int total = 0;
            for (i = 0; i < n; i++) total += a[i];
            return total;
        }
    "#;
    assert_eq!(run_i32(source, "array_2", &[Val::Int(10)]), 45);
}

#[test]
fn test_array_length() {
    let source = r#"
        int count(int n) {
            int[] a = [];
            int i;
            for (i = 0; i < n; i++) a[i] = i * i;
            return a.length;
        }
    "#;
    assert_eq!(run_i32(source, "count", &[Val::Int(7)]), 7);
}

#[test]
fn test_global_persists_across_calls() {
    let source = r#"
        int counter = 0;
        int global_1(int n) {
            counter += n;
            return counter;
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");

    vm.run("global_1", &[Val::Int(10)]).expect("first call");
    assert_eq!(vm.stack_i32(0), 10);
    vm.run("global_1", &[Val::Int(5)]).expect("second call");
    assert_eq!(vm.stack_i32(0), 15);
}

#[test]
fn test_two_vms_do_not_share_globals() {
    let source = r#"
        int counter = 100;
        int bump(int n) {
            counter += n;
            return counter;
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);

    let mut first = Vm::new(program).expect("vm creation failed");
    let mut second = Vm::new(program).expect("vm creation failed");
    first.run("bump", &[Val::Int(1)]).expect("run");
    second.run("bump", &[Val::Int(2)]).expect("run");

    assert_eq!(first.stack_i32(0), 101);
    assert_eq!(second.stack_i32(0), 102);
}

#[test]
fn test_vec3_scale_operand_order() {
    let source = "vec3 vec3_scale(vec3 v, float s) { return v * s; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run(
        "vec3_scale",
        &[Val::Vec3([7.0, 15.0, 23.0]), Val::Float(5.0)],
    )
    .expect("run failed");
    assert_eq!(vm.stack_vec3(0), [35.0, 75.0, 115.0]);
}

#[test]
fn test_scalar_times_vec3_swaps_operands() {
    let source = "vec3 prescale(float s, vec3 v) { return s * v; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("prescale", &[Val::Float(2.0), Val::Vec3([1.0, 2.0, 3.0])])
        .expect("run failed");
    assert_eq!(vm.stack_vec3(0), [2.0, 4.0, 6.0]);
}

#[test]
fn test_vec3_add_and_members() {
    let source = r#"
        float sum_components(vec3 a, vec3 b) {
            vec3 c = a + b;
            return c.x + c.y + c.z;
        }
    "#;
    let result = run_f32(
        source,
        "sum_components",
        &[Val::Vec3([1.0, 2.0, 3.0]), Val::Vec3([10.0, 20.0, 30.0])],
    );
    assert_eq!(result, 66.0);
}

#[test]
fn test_vec3_equality() {
    let source = "bool veq(vec3 a, vec3 b) { return a == b; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");

    vm.run("veq", &[Val::Vec3([1.0, 2.0, 3.0]), Val::Vec3([1.0, 2.0, 3.0])])
        .expect("run failed");
    assert_eq!(vm.stack_i32(0), 1);
    vm.run("veq", &[Val::Vec3([1.0, 2.0, 3.0]), Val::Vec3([1.0, 2.0, 4.0])])
        .expect("run failed");
    assert_eq!(vm.stack_i32(0), 0);
}

#[test]
fn test_vec3_literal_and_division() {
    let source = r#"
        float halved_y() {
            vec3 v = vec3(2.0, 6.0, 10.0) / 2.0;
            return v.y;
        }
    "#;
    assert_eq!(run_f32(source, "halved_y", &[]), 3.0);
}

#[test]
fn test_struct_members_and_object_literal() {
    let source = r#"
        struct point {
            int x, y;
        }
        int manhattan(int a, int b) {
            point p = {x = a, y = b};
            p.x += 1;
            return p.x + p.y;
        }
    "#;
    assert_eq!(
        run_i32(source, "manhattan", &[Val::Int(3), Val::Int(4)]),
        8
    );
}

#[test]
fn test_struct_argument_from_host() {
    let source = r#"
        struct point {
            int x, y;
        }
        int sum_point(point p) { return p.x + p.y; }
    "#;
    assert_eq!(
        run_i32(
            source,
            "sum_point",
            &[Val::Object(vec![Val::Int(3), Val::Int(4)])]
        ),
        7
    );
}

#[test]
fn test_vec2_host_value_fills_two_float_struct() {
    let source = r#"
        struct v2 {
            float x, y;
        }
        float first(v2 v) { return v.x; }
    "#;
    assert_eq!(run_f32(source, "first", &[Val::Vec2([7.5, 15.0])]), 7.5);
}

#[test]
fn test_nested_struct_layout() {
    let source = r#"
        struct inner {
            int a;
            int b;
        }
        struct outer {
            int tag;
            inner payload;
        }
        int read_b(int n) {
            outer o = {tag = 1, payload = {a = 2, b = n}};
            return o.payload.b;
        }
    "#;
    assert_eq!(run_i32(source, "read_b", &[Val::Int(42)]), 42);
}

#[test]
fn test_struct_member_through_array_element() {
    let source = r#"
        struct point {
            int x, y;
        }
        int shuffle() {
            point[] a = [{x = 1, y = 2}, {x = 3, y = 4}];
            a[1].y = 9;
            return a[0].y * 100 + a[1].x * 10 + a[1].y;
        }
    "#;
    assert_eq!(run_i32(source, "shuffle", &[]), 239);
}

#[test]
fn test_array_argument_from_host() {
    let source = "int pick(int[] a, int i) { return a[i]; }";
    assert_eq!(
        run_i32(
            source,
            "pick",
            &[
                Val::Array(vec![Val::Int(5), Val::Int(6), Val::Int(7)]),
                Val::Int(2)
            ]
        ),
        7
    );
}

#[test]
fn test_global_array_initializer() {
    let source = r#"
        int[] table = [10, 20, 30];
        int lookup(int i) { return table[i]; }
    "#;
    assert_eq!(run_i32(source, "lookup", &[Val::Int(1)]), 20);
}

#[test]
fn test_enum_values_and_comparison() {
    let source = r#"
        enum color { RED, GREEN, BLUE }
        int classify(int n) {
            color c = BLUE;
            if (n == 0) c = RED;
            if (c == BLUE) return 2;
            if (c != RED) return 1;
            return 0;
        }
    "#;
    assert_eq!(run_i32(source, "classify", &[Val::Int(0)]), 0);
    assert_eq!(run_i32(source, "classify", &[Val::Int(9)]), 2);
}

#[test]
fn test_post_increment_yields_incremented_value() {
    let source = r#"
        int inc(int n) {
            int i = n;
            int j = i++;
            return j * 10 + i;
        }
    "#;
    // post-increment leaves the incremented value on the stack
    assert_eq!(run_i32(source, "inc", &[Val::Int(4)]), 55);
}

#[test]
fn test_null_array_is_falsy() {
    let source = r#"
        int has_items(int n) {
            int[] a = NULL;
            if (n > 0) a = [1, 2];
            if (!a) return 0;
            return a.length;
        }
    "#;
    assert_eq!(run_i32(source, "has_items", &[Val::Int(0)]), 0);
    assert_eq!(run_i32(source, "has_items", &[Val::Int(1)]), 2);
}

#[test]
fn test_delete_array_clears_handle() {
    let source = r#"
        int use_after_delete() {
            int[] a = [1, 2, 3];
            delete_array(a);
            return a[0];
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    let err = vm.run("use_after_delete", &[]).unwrap_err();
    assert_eq!(err, VmError::NullArrayHandle);
}

#[test]
fn test_deleted_array_access_traps_through_alias() {
    let source = r#"
        int stale_alias() {
            int[] a = [1, 2, 3];
            int[] b = a;
            delete_array(a);
            return b[0];
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    let err = vm.run("stale_alias", &[]).unwrap_err();
    assert_eq!(err, VmError::DeletedArrayAccess);
}

#[test]
fn test_array_out_of_bounds_traps() {
    let source = r#"
        int oob() {
            int[] a = [1, 2, 3];
            return a[5];
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    let err = vm.run("oob", &[]).unwrap_err();
    assert_eq!(err, VmError::ArrayOutOfBounds);
}

#[test]
fn test_integer_division_by_zero_traps() {
    let source = "int div(int a, int b) { return a / b; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");

    vm.run("div", &[Val::Int(7), Val::Int(2)]).expect("run");
    assert_eq!(vm.stack_i32(0), 3);
    let err = vm.run("div", &[Val::Int(7), Val::Int(0)]).unwrap_err();
    assert_eq!(err, VmError::DivisionByZero);
}

#[test]
fn test_implicit_numeric_casts() {
    let source = r#"
        int mix(int a, float b) {
            float f = a + b;
            int back = f * 2.0;
            return back;
        }
    "#;
    assert_eq!(
        run_i32(source, "mix", &[Val::Int(3), Val::Float(1.5)]),
        9
    );
}

#[test]
fn test_print_output_buffer() {
    let source = r#"
        struct point {
            int x, y;
        }
        void report(int n) {
            point p = {x = n, y = 2};
            print("p = ", p, " n = ", n, "\n");
            print(n > 0);
        }
    "#;
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");
    vm.run("report", &[Val::Int(7)]).expect("run failed");
    assert_eq!(vm.output(), "p = {x: 7, y: 2} n = 7\ntrue");
}

#[test]
fn test_wrong_entry_arguments() {
    let source = "int id(int a) { return a; }";
    let runtime = load(source);
    let program = loaded_program(&runtime);
    let mut vm = Vm::new(program).expect("vm creation failed");

    assert!(matches!(
        vm.run("missing", &[]),
        Err(VmError::UnknownFunction { .. })
    ));
    assert!(matches!(
        vm.run("id", &[]),
        Err(VmError::WrongArgCount { .. })
    ));
    assert!(matches!(
        vm.run("id", &[Val::Float(1.0)]),
        Err(VmError::InvalidArgument { index: 0 })
    ));
}

#[test]
fn test_broken_program_cannot_back_a_vm() {
    let runtime = load("int broken( { }");
    let program = runtime.program(MAIN).expect("program missing");
    assert!(program.error().is_some());
    assert!(matches!(
        Vm::new(program),
        Err(VmError::BrokenProgram { .. })
    ));
}
