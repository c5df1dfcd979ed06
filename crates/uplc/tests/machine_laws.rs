use pretty_assertions::assert_eq;
use uplc::builtin::Builtin;
use uplc::cost::{CostModel, ExBudget};
use uplc::machine::{run, Outcome};
use uplc::term::{Const, Program, Term};

fn eval(t: Term) -> Outcome {
    run(&Program::new(t), &CostModel::default(), ExBudget::DEFAULT_LIMIT).outcome
}

fn binop(b: Builtin, x: i64, y: i64) -> Term {
    Term::apply(
        Term::apply(Term::builtin(b), Term::constant(Const::int(x))),
        Term::constant(Const::int(y)),
    )
}

#[test]
fn addition_commutes() {
    for (a, b) in [(0i64, 0i64), (1, 2), (-7, 9), (1 << 40, -(1 << 50))] {
        assert_eq!(
            eval(binop(Builtin::AddInteger, a, b)),
            eval(binop(Builtin::AddInteger, b, a)),
        );
    }
}

#[test]
fn multiply_by_zero_is_zero() {
    for a in [-5i64, 0, 123456] {
        assert_eq!(
            eval(binop(Builtin::MultiplyInteger, a, 0)),
            Outcome::Value(Const::int(0))
        );
    }
}

#[test]
fn self_quotient_is_one_unless_zero() {
    for a in [1i64, -3, 99999] {
        assert_eq!(
            eval(binop(Builtin::QuotientInteger, a, a)),
            Outcome::Value(Const::int(1))
        );
    }
    match eval(binop(Builtin::QuotientInteger, 0, 0)) {
        Outcome::Failure { info, .. } => assert_eq!(info, "division by zero"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn deferred_branch_never_runs() {
    // force(ifThenElse false (delay (1/0)) (delay 42))
    let poison = binop(Builtin::QuotientInteger, 1, 0);
    let t = Term::force(Term::apply(
        Term::apply(
            Term::apply(
                Term::force(Term::builtin(Builtin::IfThenElse)),
                Term::constant(Const::Bool(false)),
            ),
            Term::delay(poison),
        ),
        Term::delay(Term::constant(Const::int(42))),
    ));
    assert_eq!(eval(t), Outcome::Value(Const::int(42)));
}

#[test]
fn trace_logs_are_collected_in_order() {
    // force(trace "a" (delay (force (trace "b" (delay 1)))))
    let inner = Term::force(Term::apply(
        Term::apply(
            Term::force(Term::builtin(Builtin::Trace)),
            Term::constant(Const::Str("b".to_string())),
        ),
        Term::delay(Term::constant(Const::int(1))),
    ));
    let t = Term::force(Term::apply(
        Term::apply(
            Term::force(Term::builtin(Builtin::Trace)),
            Term::constant(Const::Str("a".to_string())),
        ),
        Term::delay(inner),
    ));
    let r = run(&Program::new(t), &CostModel::default(), ExBudget::DEFAULT_LIMIT);
    assert_eq!(r.outcome, Outcome::Value(Const::int(1)));
    assert_eq!(r.logs, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn spent_budget_is_monotone_in_work() {
    let small = run(
        &Program::new(binop(Builtin::AddInteger, 1, 2)),
        &CostModel::default(),
        ExBudget::DEFAULT_LIMIT,
    );
    let big = run(
        &Program::new(Term::apply(
            Term::apply(
                Term::builtin(Builtin::AddInteger),
                binop(Builtin::MultiplyInteger, 3, 4),
            ),
            binop(Builtin::MultiplyInteger, 5, 6),
        )),
        &CostModel::default(),
        ExBudget::DEFAULT_LIMIT,
    );
    assert!(big.spent.cpu > small.spent.cpu);
    assert!(big.spent.mem > small.spent.mem);
}

#[test]
fn custom_params_change_prices() {
    let mut json: serde_json::Value = serde_json::from_str(uplc::cost::DEFAULT_PARAMS).unwrap();
    json["builtins"]["addInteger"]["cpu"] =
        serde_json::json!({ "kind": "constant", "intercept": 1 });
    let cheap = CostModel::from_json(&json.to_string()).unwrap();
    let t = binop(Builtin::AddInteger, 1, 2);
    let a = run(&Program::new(t.clone()), &cheap, ExBudget::DEFAULT_LIMIT);
    let b = run(&Program::new(t), &CostModel::default(), ExBudget::DEFAULT_LIMIT);
    assert_eq!(a.outcome, b.outcome);
    assert!(a.spent.cpu < b.spent.cpu);
}
