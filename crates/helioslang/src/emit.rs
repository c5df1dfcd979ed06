use uplc::builtin::Builtin;
use uplc::term::{Const, Program, Term, TermKind};

use crate::ir::{Ir, IrKind, VarId};

/// Emit optimized IR as a bytecode program: multi-parameter lambdas curry,
/// multi-argument calls nest, builtins receive their type-level forces, and
/// error messages travel through `trace` so they survive serialization.
pub fn emit(ir: &Ir) -> Program {
    let mut env = Vec::new();
    Program::new(emit_term(ir, &mut env))
}

fn emit_term(ir: &Ir, env: &mut Vec<VarId>) -> Term {
    let mut term = match &ir.kind {
        IrKind::Var(v, name) => {
            let idx = env
                .iter()
                .rev()
                .position(|x| *x == *v)
                .unwrap_or_else(|| panic!("unbound IR variable '{}'", name));
            Term::var(idx as u32)
        }
        IrKind::Lam { params, body } => {
            for (v, _) in params {
                env.push(*v);
            }
            let mut t = emit_term(body, env);
            for _ in params {
                env.pop();
                t = Term::new(TermKind::Lambda(t.into()));
            }
            t
        }
        IrKind::Call { f, args } => {
            let mut t = emit_term(f, env);
            for a in args {
                t = Term::apply(t, emit_term(a, env));
            }
            t
        }
        IrKind::Builtin { b, args } => {
            let mut t = Term::builtin(*b);
            for _ in 0..b.forces() {
                t = Term::force(t);
            }
            for a in args {
                t = Term::apply(t, emit_term(a, env));
            }
            t
        }
        IrKind::Delay(x) => Term::delay(emit_term(x, env)),
        IrKind::Force(x) => Term::force(emit_term(x, env)),
        IrKind::Const(c) => Term::constant(c.clone()),
        IrKind::Error { msg } => {
            // force(trace msg (delay error)): the evaluator surfaces the
            // trace message as the failure info
            let traced = Term::apply(
                Term::apply(
                    Term::force(Term::builtin(Builtin::Trace)),
                    Term::constant(Const::Str(msg.clone())),
                ),
                Term::delay(Term::new(TermKind::Error)),
            );
            Term::force(traced)
        }
    };
    term.site = Some(ir.site);
    term
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Site;
    use uplc::cost::{CostModel, ExBudget};
    use uplc::machine::{run, Outcome};

    fn site() -> Site {
        Site::new(0, 0)
    }

    fn ir(kind: IrKind) -> Ir {
        Ir { kind, site: site() }
    }

    #[test]
    fn lambdas_curry_and_indices_resolve() {
        // (\a b. a) 1 2 -> 1
        let a = VarId(0);
        let b = VarId(1);
        let lam = ir(IrKind::Lam {
            params: vec![(a, "a".to_string()), (b, "b".to_string())],
            body: Box::new(ir(IrKind::Var(a, "a".to_string()))),
        });
        let call = ir(IrKind::Call {
            f: Box::new(lam),
            args: vec![
                ir(IrKind::Const(Const::int(1))),
                ir(IrKind::Const(Const::int(2))),
            ],
        });
        let p = emit(&call);
        let r = run(&p, &CostModel::default(), ExBudget::DEFAULT_LIMIT);
        assert_eq!(r.outcome, Outcome::Value(Const::int(1)));
    }

    #[test]
    fn builtin_forces_are_inserted() {
        // headList of [7] needs one force
        let xs = ir(IrKind::Const(Const::list_data(vec![datacore::Data::int(7)])));
        let h = ir(IrKind::Builtin {
            b: Builtin::HeadList,
            args: vec![xs],
        });
        let p = emit(&h);
        let r = run(&p, &CostModel::default(), ExBudget::DEFAULT_LIMIT);
        assert_eq!(
            r.outcome,
            Outcome::Value(Const::Data(datacore::Data::int(7)))
        );
    }

    #[test]
    fn error_messages_survive_emission() {
        let e = ir(IrKind::Error {
            msg: "assert failed".to_string(),
        });
        let p = emit(&e);
        let r = run(&p, &CostModel::default(), ExBudget::DEFAULT_LIMIT);
        match r.outcome {
            Outcome::Failure { info, .. } => assert_eq!(info, "assert failed"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn emission_is_deterministic() {
        let a = VarId(0);
        let lam = ir(IrKind::Lam {
            params: vec![(a, "a".to_string())],
            body: Box::new(ir(IrKind::Var(a, "a".to_string()))),
        });
        let p1 = uplc::flat::encode(&emit(&lam));
        let p2 = uplc::flat::encode(&emit(&lam));
        assert_eq!(p1, p2);
    }
}
