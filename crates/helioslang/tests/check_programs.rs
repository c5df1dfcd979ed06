use pretty_assertions::assert_eq;

use helioslang::error::CompileError;
use helioslang::{check, parse};

fn check_src(src: &str) -> Result<helioslang::texpr::TProgram, CompileError> {
    let p = parse(src)?;
    check(&[&p])
}

#[test]
fn simple_program_checks_and_monomorphises_main() {
    let prog = check_src(
        r#"
testing t
func main(a: Int, b: Int) -> Int { a + b }
"#,
    )
    .unwrap();
    assert_eq!(prog.funcs.len(), 1);
    assert!(prog.main.is_some());
    assert!(!prog.funcs[prog.main.unwrap()].recursive);
}

#[test]
fn generic_instances_are_cached_per_argument_tuple() {
    let prog = check_src(
        r#"
testing t
func id[T](x: T) -> T { x }
func main(a: Int, b: ByteArray) -> Int {
    let x: Int = id(a);
    let y: ByteArray = id(b);
    let z: Int = id[Int](x);
    assert(y.length >= 0);
    z
}
"#,
    )
    .unwrap();
    // main + id[Int] + id[ByteArray]; the repeated Int use hits the cache
    assert_eq!(prog.funcs.len(), 3);
}

#[test]
fn recursive_functions_are_marked() {
    let prog = check_src(
        r#"
testing t
func count(n: Int) -> Int {
    if (n == 0) { 0 } else { count(n - 1) + 1 }
}
func main(n: Int) -> Int { count(n) }
"#,
    )
    .unwrap();
    let rec = prog.funcs.iter().find(|f| f.name == "count").unwrap();
    assert!(rec.recursive);
}

#[test]
fn monomorphisation_cycles_are_reported() {
    let err = check_src(
        r#"
testing t
func grow[T](x: T) -> Int {
    grow([]T{x})
}
func main(a: Int) -> Int { grow(a) }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
    assert!(err.msg().contains("monomorphisation"), "{}", err);
}

#[test]
fn use_before_definition_is_a_reference_error() {
    let err = check_src(
        r#"
testing t
func main(a: Int) -> Int { helper(a) }
func helper(a: Int) -> Int { a }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Reference { .. }));
    assert!(err.msg().contains("before its definition"), "{}", err);
}

#[test]
fn undefined_names_are_reference_errors() {
    let err = check_src("testing t\nfunc main() -> Int { nope }").unwrap_err();
    assert!(matches!(err, CompileError::Reference { .. }));
}

#[test]
fn return_type_mismatch_is_a_type_error() {
    let err = check_src("testing t\nfunc main() -> Int { true }").unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
}

#[test]
fn switch_must_be_exhaustive_without_else() {
    let err = check_src(
        r#"
testing t
enum E { A, B, C }
func main(n: Int) -> Int {
    let e: E = E::A;
    e.switch {
        A => 1,
        B => 2
    }
}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
    assert!(err.msg().contains("every variant"), "{}", err);
}

#[test]
fn unreachable_else_is_rejected() {
    let err = check_src(
        r#"
testing t
enum E { A, B }
func main(n: Int) -> Int {
    let e: E = E::A;
    e.switch {
        A => 1,
        B => 2,
        else => 3
    }
}
"#,
    )
    .unwrap_err();
    assert!(err.msg().contains("unreachable"), "{}", err);
}

#[test]
fn switch_arm_binders_narrow_to_the_variant() {
    check_src(
        r#"
testing t
enum E {
    A { x: Int },
    B
}
func main(n: Int) -> Int {
    let e: E = E::A{n};
    e.switch {
        a: A => a.x,
        B => 0
    }
}
"#,
    )
    .unwrap();

    // without narrowing the field is unreachable
    let err = check_src(
        r#"
testing t
enum E {
    A { x: Int },
    B
}
func main(n: Int) -> Int {
    let e: E = E::A{n};
    e.x
}
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
}

#[test]
fn validator_main_signatures_are_enforced() {
    let err = check_src(
        r#"
spending bad
struct Datum { n: Int }
func main(d: Datum) -> Bool { true }
"#,
    )
    .unwrap_err();
    assert!(err.msg().contains("3 parameter"), "{}", err);

    let err = check_src(
        r#"
spending bad
struct Datum { n: Int }
struct Redeemer { n: Int }
struct Ctx { n: Int }
func main(d: Datum, r: Redeemer, c: Ctx) -> Int { 1 }
"#,
    )
    .unwrap_err();
    assert!(err.msg().contains("Bool"), "{}", err);
}

#[test]
fn function_types_flow_through_lambdas() {
    check_src(
        r#"
testing t
func apply_twice(f: fn(Int) -> Int, x: Int) -> Int {
    f(f(x))
}
func main(n: Int) -> Int {
    apply_twice(fn(x: Int) -> Int { x + 1 }, n)
}
"#,
    )
    .unwrap();
}

#[test]
fn equality_requires_matching_data_types() {
    let err = check_src("testing t\nfunc main(a: Int, b: ByteArray) -> Bool { a == b }")
        .unwrap_err();
    assert!(matches!(err, CompileError::Type { .. }));
}

#[test]
fn constants_check_in_declaration_order() {
    let prog = check_src(
        r#"
testing t
const BASE: Int = 10
const SCALED: Int = BASE * 3
func main() -> Int { SCALED }
"#,
    )
    .unwrap();
    assert_eq!(prog.consts.len(), 2);

    let err = check_src(
        r#"
testing t
const EARLY: Int = LATE
const LATE: Int = 1
func main() -> Int { EARLY }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::Reference { .. }));
}
