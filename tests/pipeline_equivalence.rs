use datacore::Data;
use helios::proptest::{gen_int, gen_option, CaseOutcome, Harness};
use helios::compile;
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::Outcome;
use uplc::term::Const;

const SOURCES: &[(&str, &[i64])] = &[
    (
        r#"
testing arith
func main(a: Int, b: Int) -> Int {
    let x = a * 1 + 0;
    let y = (b + 1) * 0 + x / 1;
    if (x == x) { y } else { 1 / 0 }
}
"#,
        &[13, -4],
    ),
    (
        r#"
testing shortcircuit
func main(a: Int, b: Int) -> Bool {
    a == 0 || b / a > 0
}
"#,
        &[0, 5],
    ),
    (
        r#"
testing folds
func main(a: Int, b: Int) -> Int {
    []Int{a, b, 3}.fold(fn(acc: Int, x: Int) -> Int { acc + x }, 0)
}
"#,
        &[100, 20],
    ),
    (
        r#"
testing failing
func main(a: Int, b: Int) -> Int {
    a / b
}
"#,
        &[1, 0],
    ),
];

#[test]
fn optimized_and_unoptimized_bytecode_agree() {
    for (src, args) in SOURCES {
        let script = compile(src).unwrap();
        let args: Vec<Data> = args.iter().map(|&n| Data::int(n)).collect();
        let plain = script.emit(false);
        let simplified = script.emit(true);
        let a = script.run_emitted(&plain, &args, &CostModel::default(), ExBudget::DEFAULT_LIMIT);
        let b = script.run_emitted(
            &simplified,
            &args,
            &CostModel::default(),
            ExBudget::DEFAULT_LIMIT,
        );
        match (&a.outcome, &b.outcome) {
            (Outcome::Value(x), Outcome::Value(y)) => assert_eq!(x, y, "{}", src),
            (Outcome::Failure { info: x, .. }, Outcome::Failure { info: y, .. }) => {
                assert_eq!(x, y, "{}", src)
            }
            (x, y) => panic!("outcomes diverge for {}: {:?} vs {:?}", src, x, y),
        }
    }
}

#[test]
fn optimization_never_costs_more_to_run() {
    for (src, args) in SOURCES {
        let script = compile(src).unwrap();
        let args: Vec<Data> = args.iter().map(|&n| Data::int(n)).collect();
        let plain = script.run_emitted(
            &script.emit(false),
            &args,
            &CostModel::default(),
            ExBudget::DEFAULT_LIMIT,
        );
        let simplified = script.run_emitted(
            &script.emit(true),
            &args,
            &CostModel::default(),
            ExBudget::DEFAULT_LIMIT,
        );
        assert!(simplified.spent.cpu <= plain.spent.cpu, "{}", src);
    }
}

#[test]
fn encoding_is_deterministic_across_compiles() {
    for (src, _) in SOURCES {
        let a = uplc::flat::encode(&compile(src).unwrap().emit(true));
        let b = uplc::flat::encode(&compile(src).unwrap().emit(true));
        assert_eq!(a, b);
    }
}

#[test]
fn emitted_programs_decode_back() {
    for (src, _) in SOURCES {
        let program = compile(src).unwrap().emit(true);
        let bytes = uplc::flat::encode(&program);
        let decoded = uplc::flat::decode(&bytes).unwrap();
        assert_eq!(uplc::flat::encode(&decoded), bytes);
    }
}

#[test]
fn ir_pretty_carries_source_sites() {
    let src = "testing p\nfunc main(a: Int) -> Int { a + 1 }";
    let script = compile(src).unwrap();
    let pretty = script.ir_pretty(true);
    assert!(pretty.contains("addInteger"));
    assert!(pretty.contains('@'), "sites are annotated: {}", pretty);
}

#[test]
fn profile_reports_budget_and_size() {
    let src = "testing p\nfunc main(a: Int) -> Int { a * a }";
    let script = compile(src).unwrap();
    let p = script.profile(&[Data::int(9)], &CostModel::default());
    assert!(p.cpu > 0);
    assert!(p.mem > 0);
    assert!(p.size > 0);
}

#[test]
fn property_addition_commutes() {
    let src = r#"
testing add_comm
func main(a: Int, b: Int) -> Bool {
    a + b == b + a
}
"#;
    let script = compile(src).unwrap();
    let harness = Harness::new(&script, vec![gen_int(-1_000, 1_000), gen_int(-1_000, 1_000)]);
    let report = harness.run(64, 7, |_, out| {
        matches!(out, CaseOutcome::Value(Const::Bool(true)))
    });
    assert!(report.all_ok());
}

#[test]
fn property_division_by_zero_is_the_only_failure() {
    let src = r#"
testing div_prop
func main(a: Int, b: Int) -> Bool {
    a / b * b + a % b == a
}
"#;
    let script = compile(src).unwrap();
    let harness = Harness::new(&script, vec![gen_int(-50, 50), gen_int(-3, 3)]);
    let report = harness.run(128, 99, |inputs, out| {
        let zero = inputs[1] == Data::int(0);
        match out {
            CaseOutcome::Value(Const::Bool(true)) => !zero,
            CaseOutcome::Failure(info) => zero && info == "division by zero",
            _ => false,
        }
    });
    assert!(report.all_ok());
    assert!(report.cases.iter().any(|c| matches!(&c.outcome, CaseOutcome::Failure(_))));
}

#[test]
fn property_unwrap_matches_generator_shape() {
    let src = r#"
testing unwrap_prop
func main(o: Option[Int]) -> Int {
    o.unwrap()
}
"#;
    let script = compile(src).unwrap();
    let harness = Harness::new(&script, vec![gen_option(gen_int(0, 9))]);
    let report = harness.run(64, 3, |inputs, out| match (&inputs[0], out) {
        (Data::Constr(0, fields), CaseOutcome::Value(Const::Int(n))) => {
            fields[0] == Data::Int(n.clone())
        }
        (Data::Constr(1, _), CaseOutcome::Failure(info)) => info == "empty list",
        _ => false,
    });
    assert!(report.all_ok());
}
