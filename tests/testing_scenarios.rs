use pretty_assertions::assert_eq;

use datacore::Data;
use helios::compile;
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::Outcome;
use uplc::term::Const;

fn run(src: &str, args: &[Data]) -> Outcome {
    let script = compile(src).unwrap();
    script
        .run(args, &CostModel::default(), ExBudget::DEFAULT_LIMIT)
        .outcome
}

fn expect_failure(out: Outcome, info: &str) {
    match out {
        Outcome::Failure { info: got, .. } => assert_eq!(got, info),
        other => panic!("expected failure {:?}, got {:?}", info, other),
    }
}

#[test]
fn int_div_divides_and_reports_zero_division() {
    let src = r#"
testing int_div
func main(a: Int, b: Int) -> Int {
    a / b
}
"#;
    assert_eq!(
        run(src, &[Data::int(10), Data::int(3)]),
        Outcome::Value(Const::int(3))
    );
    expect_failure(run(src, &[Data::int(10), Data::int(0)]), "division by zero");
}

#[test]
fn bytearray_show_renders_hex() {
    let src = r#"
testing bytearray_show
func main(b: ByteArray) -> String {
    b.show()
}
"#;
    assert_eq!(
        run(src, &[Data::bytes(vec![0xde, 0xad, 0xbe, 0xef])]),
        Outcome::Value(Const::Str("deadbeef".to_string()))
    );
    assert_eq!(
        run(src, &[Data::bytes(vec![0x00, 0x0f])]),
        Outcome::Value(Const::Str("000f".to_string()))
    );
}

#[test]
fn bool_and_short_circuits_a_failing_right_side() {
    let src = r#"
testing bool_and
func main(a: Bool, b: Int) -> Bool {
    a && (1 / b == 1)
}
"#;
    // the right side divides by zero but is never evaluated
    assert_eq!(
        run(src, &[Data::bool_(false), Data::int(0)]),
        Outcome::Value(Const::Bool(false))
    );
    assert_eq!(
        run(src, &[Data::bool_(true), Data::int(1)]),
        Outcome::Value(Const::Bool(true))
    );
    expect_failure(
        run(src, &[Data::bool_(true), Data::int(0)]),
        "division by zero",
    );
}

#[test]
fn bool_or_short_circuits_a_failing_right_side() {
    let src = r#"
testing bool_or
func main(a: Bool, b: Int) -> Bool {
    a || (1 / b == 1)
}
"#;
    assert_eq!(
        run(src, &[Data::bool_(true), Data::int(0)]),
        Outcome::Value(Const::Bool(true))
    );
}

#[test]
fn map_get_finds_first_match_or_fails() {
    let src = r#"
testing map_get
func main(m: Map[Int]Int, key: Int) -> Int {
    m.get(key)
}
"#;
    let m = Data::map(vec![
        (Data::int(1), Data::int(10)),
        (Data::int(2), Data::int(20)),
    ]);
    assert_eq!(
        run(src, &[m.clone(), Data::int(2)]),
        Outcome::Value(Const::int(20))
    );
    expect_failure(run(src, &[m, Data::int(3)]), "not found");
}

#[test]
fn option_unwrap_of_none_is_the_empty_list_failure() {
    let src = r#"
testing option_unwrap
func main(o: Option[Int]) -> Int {
    o.unwrap()
}
"#;
    expect_failure(run(src, &[Data::none()]), "empty list");
    assert_eq!(
        run(src, &[Data::some(Data::int(7))]),
        Outcome::Value(Const::int(7))
    );
}

#[test]
fn empty_list_head_fails() {
    let src = r#"
testing empty_head
func main() -> Int {
    []Int{}.head
}
"#;
    expect_failure(run(src, &[]), "empty list");
}

#[test]
fn list_get_out_of_range() {
    let src = r#"
testing list_get
func main(xs: []Int, i: Int) -> Int {
    xs.get(i)
}
"#;
    let xs = Data::list(vec![Data::int(5), Data::int(6)]);
    assert_eq!(
        run(src, &[xs.clone(), Data::int(1)]),
        Outcome::Value(Const::int(6))
    );
    expect_failure(run(src, &[xs, Data::int(2)]), "index out of range");
}

#[test]
fn list_concat_length_and_fold_sum() {
    let src = r#"
testing list_laws
func sum(xs: []Int) -> Int {
    xs.fold(fn(acc: Int, x: Int) -> Int { acc + x }, 0)
}
func main(xs: []Int, ys: []Int) -> Bool {
    let cat: []Int = xs + ys;
    assert(cat.length == xs.length + ys.length);
    assert(sum(cat) == sum(xs) + sum(ys));
    true
}
"#;
    let xs = Data::list(vec![Data::int(1), Data::int(2), Data::int(3)]);
    let ys = Data::list(vec![Data::int(10), Data::int(-4)]);
    assert_eq!(run(src, &[xs, ys]), Outcome::Value(Const::Bool(true)));
    assert_eq!(
        run(src, &[Data::list(vec![]), Data::list(vec![])]),
        Outcome::Value(Const::Bool(true))
    );
}

#[test]
fn list_map_filter_any_all() {
    let src = r#"
testing list_hof
func main(xs: []Int) -> Bool {
    let doubled: []Int = xs.map(fn(x: Int) -> Int { x * 2 });
    let evens: []Int = doubled.filter(fn(x: Int) -> Bool { x % 2 == 0 });
    assert(evens.length == doubled.length);
    assert(doubled.all(fn(x: Int) -> Bool { x % 2 == 0 }));
    assert(!xs.any(fn(x: Int) -> Bool { x == 99 }) || xs.length > 0);
    true
}
"#;
    let xs = Data::list(vec![Data::int(1), Data::int(2), Data::int(5)]);
    assert_eq!(run(src, &[xs]), Outcome::Value(Const::Bool(true)));
}

#[test]
fn map_delete_set_get_safe_contract() {
    let src = r#"
testing map_laws
func main(m: Map[Int]Int, k: Int, v: Int) -> Bool {
    assert(m.delete(k).get_safe(k).is_none());
    assert(m.delete(k).set(k, v).get(k) == v);
    assert(m.set(k, v).get(k) == v);
    true
}
"#;
    let m = Data::map(vec![
        (Data::int(1), Data::int(10)),
        (Data::int(2), Data::int(20)),
        (Data::int(1), Data::int(99)),
    ]);
    assert_eq!(
        run(src, &[m, Data::int(1), Data::int(7)]),
        Outcome::Value(Const::Bool(true))
    );
}

#[test]
fn map_fold_and_filter_preserve_insertion_order() {
    let src = r#"
testing map_order
func keys(m: Map[Int]Int) -> []Int {
    m.fold(fn(acc: []Int, k: Int, v: Int) -> []Int { acc + []Int{k} }, []Int{})
}
func main(m: Map[Int]Int) -> []Int {
    keys(m.filter(fn(k: Int, v: Int) -> Bool { v > 0 }))
}
"#;
    let m = Data::map(vec![
        (Data::int(3), Data::int(1)),
        (Data::int(1), Data::int(-1)),
        (Data::int(2), Data::int(5)),
    ]);
    assert_eq!(
        run(src, &[m]),
        Outcome::Value(Const::list_data(vec![
            Data::int(3),
            Data::int(2)
        ]))
    );
}

#[test]
fn assert_failure_info() {
    let src = r#"
testing assert_fail
func main(a: Int) -> Bool {
    assert(a > 0);
    true
}
"#;
    assert_eq!(run(src, &[Data::int(1)]), Outcome::Value(Const::Bool(true)));
    expect_failure(run(src, &[Data::int(0)]), "assert failed");
}

#[test]
fn explicit_error_info() {
    let src = r#"
testing explicit_error
func main(a: Int) -> Int {
    if (a > 0) { a } else { error("negative input") }
}
"#;
    expect_failure(run(src, &[Data::int(-1)]), "negative input");
}

#[test]
fn decode_utf8_failure_info() {
    let src = r#"
testing bad_utf8
func main(b: ByteArray) -> String {
    b.decode_utf8()
}
"#;
    expect_failure(run(src, &[Data::bytes(vec![0xff])]), "invalid utf-8");
}

#[test]
fn int_show_renders_sign_and_digits() {
    let src = r#"
testing int_show
func main(n: Int) -> String {
    n.show()
}
"#;
    assert_eq!(
        run(src, &[Data::int(0)]),
        Outcome::Value(Const::Str("0".to_string()))
    );
    assert_eq!(
        run(src, &[Data::int(1234)]),
        Outcome::Value(Const::Str("1234".to_string()))
    );
    assert_eq!(
        run(src, &[Data::int(-56)]),
        Outcome::Value(Const::Str("-56".to_string()))
    );
}

#[test]
fn serialize_matches_the_cbor_codec() {
    let src = r#"
testing ser
func main(x: Int) -> ByteArray {
    x.serialize()
}
"#;
    assert_eq!(
        run(src, &[Data::int(42)]),
        Outcome::Value(Const::Bytes(datacore::encode(&Data::int(42))))
    );
}

#[test]
fn generics_monomorphise_per_instantiation() {
    let src = r#"
testing generics
func second[A, B](a: A, b: B) -> B {
    b
}
func main(x: Int, s: ByteArray) -> ByteArray {
    let n: Int = second(s, x);
    second[Int, ByteArray](n, s)
}
"#;
    assert_eq!(
        run(src, &[Data::int(3), Data::bytes(vec![0xaa])]),
        Outcome::Value(Const::Bytes(vec![0xaa]))
    );
}

#[test]
fn recursion_with_user_functions() {
    let src = r#"
testing fact
func fact(n: Int) -> Int {
    if (n <= 1) { 1 } else { n * fact(n - 1) }
}
func main(n: Int) -> Int {
    fact(n)
}
"#;
    assert_eq!(run(src, &[Data::int(6)]), Outcome::Value(Const::int(720)));
}

#[test]
fn structs_and_enums_roundtrip_through_switch() {
    let src = r#"
testing shapes

struct Point {
    x: Int,
    y: Int
}

enum Shape {
    Circle { center: Point, radius: Int },
    Dot { at: Point }
}

func main(r: Int) -> Int {
    let s: Shape = if (r > 0) {
        Shape::Circle{Point{1, 2}, r}
    } else {
        Shape::Dot{Point{3, 4}}
    };
    s.switch {
        c: Circle => c.center.x + c.radius,
        d: Dot => d.at.y
    }
}
"#;
    assert_eq!(run(src, &[Data::int(10)]), Outcome::Value(Const::int(11)));
    assert_eq!(run(src, &[Data::int(0)]), Outcome::Value(Const::int(4)));
}

#[test]
fn module_imports_are_included() {
    let module = r#"
module mathx
func double(x: Int) -> Int {
    x * 2
}
"#;
    let src = r#"
testing importer
import mathx
func main(a: Int) -> Int {
    double(a) + 1
}
"#;
    let script = helios::compile_with(src, &[module]).unwrap();
    let out = script
        .run(
            &[Data::int(20)],
            &CostModel::default(),
            ExBudget::DEFAULT_LIMIT,
        )
        .outcome;
    assert_eq!(out, Outcome::Value(Const::int(41)));
}

#[test]
fn out_of_budget_is_reported_with_consumption() {
    let src = r#"
testing spin
func spin(n: Int) -> Int {
    if (n == 0) { 0 } else { spin(n - 1) }
}
func main(n: Int) -> Int {
    spin(n)
}
"#;
    let script = compile(src).unwrap();
    let r = script.run(
        &[Data::int(1_000_000)],
        &CostModel::default(),
        ExBudget::new(100_000, 100_000_000),
    );
    assert!(matches!(r.outcome, Outcome::OutOfBudget { .. }));
    assert!(r.spent.cpu > 0 && r.spent.mem > 0);
}
