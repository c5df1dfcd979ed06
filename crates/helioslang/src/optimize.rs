//! A fixed point of local, semantics-preserving rewrites: binding inlining,
//! constant folding through the machine's own builtin evaluator, dead-branch
//! elimination, and algebraic identities. Every rewrite strictly reduces the
//! node count, so the loop terminates.

use num_traits::{One, Zero};

use uplc::builtin::{eval_pure, Builtin};
use uplc::term::Const;

use crate::ir::{Ir, IrKind, VarId};

pub fn optimize(ir: Ir) -> Ir {
    let mut cur = ir;
    loop {
        let next = pass(&cur);
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

fn pass(ir: &Ir) -> Ir {
    let node = map_children(ir, pass);
    rewrite(node)
}

fn map_children(ir: &Ir, f: impl Fn(&Ir) -> Ir + Copy) -> Ir {
    let kind = match &ir.kind {
        IrKind::Lam { params, body } => IrKind::Lam {
            params: params.clone(),
            body: Box::new(f(body)),
        },
        IrKind::Call { f: head, args } => IrKind::Call {
            f: Box::new(f(head)),
            args: args.iter().map(f).collect(),
        },
        IrKind::Builtin { b, args } => IrKind::Builtin {
            b: *b,
            args: args.iter().map(f).collect(),
        },
        IrKind::Delay(x) => IrKind::Delay(Box::new(f(x))),
        IrKind::Force(x) => IrKind::Force(Box::new(f(x))),
        k => k.clone(),
    };
    Ir {
        kind,
        site: ir.site,
    }
}

/// Side-effect-free and failure-free: safe to drop, duplicate, or move
/// across a `Delay` boundary.
fn is_pure(ir: &Ir) -> bool {
    match &ir.kind {
        IrKind::Const(_) | IrKind::Var(_, _) | IrKind::Lam { .. } | IrKind::Delay(_) => true,
        IrKind::Error { .. } | IrKind::Force(_) | IrKind::Call { .. } => false,
        IrKind::Builtin { b, args } => {
            b.is_pure() && !can_fail(*b) && args.iter().all(is_pure)
        }
    }
}

/// Builtins that can fail on well-typed arguments.
fn can_fail(b: Builtin) -> bool {
    matches!(
        b,
        Builtin::DivideInteger
            | Builtin::QuotientInteger
            | Builtin::RemainderInteger
            | Builtin::ModInteger
            | Builtin::ConsByteString
            | Builtin::IndexByteString
            | Builtin::DecodeUtf8
            | Builtin::HeadList
            | Builtin::TailList
            | Builtin::FstPair
            | Builtin::SndPair
            | Builtin::UnConstrData
            | Builtin::UnMapData
            | Builtin::UnListData
            | Builtin::UnIData
            | Builtin::UnBData
            | Builtin::ConstrData
    )
}

fn count_uses(ir: &Ir, v: VarId) -> usize {
    match &ir.kind {
        IrKind::Var(x, _) => usize::from(*x == v),
        IrKind::Lam { body, .. } => count_uses(body, v),
        IrKind::Call { f, args } => {
            count_uses(f, v) + args.iter().map(|a| count_uses(a, v)).sum::<usize>()
        }
        IrKind::Builtin { args, .. } => args.iter().map(|a| count_uses(a, v)).sum(),
        IrKind::Delay(x) | IrKind::Force(x) => count_uses(x, v),
        _ => 0,
    }
}

/// Substitute `v` by `def`. Variable indices are globally unique, so no
/// capture is possible.
fn subst(ir: &Ir, v: VarId, def: &Ir) -> Ir {
    match &ir.kind {
        IrKind::Var(x, _) if *x == v => def.clone(),
        _ => map_children(ir, |c| subst(c, v, def)),
    }
}

fn is_cheap(ir: &Ir) -> bool {
    matches!(ir.kind, IrKind::Const(_) | IrKind::Var(_, _))
}

fn rewrite(ir: Ir) -> Ir {
    let site = ir.site;
    match ir.kind {
        // binding inlining on `(\params. body) args`
        IrKind::Call { f, args } => {
            if let IrKind::Lam { params, body } = &f.kind {
                if params.len() == args.len() {
                    let mut body = (**body).clone();
                    let mut kept_params = Vec::new();
                    let mut kept_args = Vec::new();
                    for ((v, name), arg) in params.iter().zip(args.iter()) {
                        let uses = count_uses(&body, *v);
                        let inline = (uses == 0 && is_pure(arg))
                            || (is_cheap(arg) && is_pure(arg))
                            || (uses == 1 && is_pure(arg));
                        if inline {
                            if uses > 0 {
                                body = subst(&body, *v, arg);
                            }
                        } else {
                            kept_params.push((*v, name.clone()));
                            kept_args.push(arg.clone());
                        }
                    }
                    if kept_params.len() != params.len() {
                        if kept_params.is_empty() {
                            return body;
                        }
                        return Ir {
                            site,
                            kind: IrKind::Call {
                                f: Box::new(Ir {
                                    site: f.site,
                                    kind: IrKind::Lam {
                                        params: kept_params,
                                        body: Box::new(body),
                                    },
                                }),
                                args: kept_args,
                            },
                        };
                    }
                }
            }
            Ir {
                kind: IrKind::Call { f, args },
                site,
            }
        }

        IrKind::Force(x) => match x.kind {
            // force of an immediate thunk
            IrKind::Delay(inner) => *inner,
            kind => Ir {
                site,
                kind: IrKind::Force(Box::new(Ir { kind, site: x.site })),
            },
        },

        IrKind::Builtin { b, args } => rewrite_builtin(b, args, site),

        kind => Ir { kind, site },
    }
}

fn const_int(ir: &Ir) -> Option<&num_bigint::BigInt> {
    match &ir.kind {
        IrKind::Const(Const::Int(z)) => Some(z),
        _ => None,
    }
}

fn const_bool(ir: &Ir) -> Option<bool> {
    match &ir.kind {
        IrKind::Const(Const::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn rewrite_builtin(b: Builtin, mut args: Vec<Ir>, site: crate::source::Site) -> Ir {
    // constant folding, sharing the machine's builtin semantics
    if b.is_pure() && args.iter().all(|a| matches!(a.kind, IrKind::Const(_))) {
        let consts: Vec<Const> = args
            .iter()
            .map(|a| match &a.kind {
                IrKind::Const(c) => c.clone(),
                _ => unreachable!(),
            })
            .collect();
        return match eval_pure(b, &consts) {
            Ok(c) => Ir {
                kind: IrKind::Const(c),
                site,
            },
            Err(msg) => Ir {
                kind: IrKind::Error { msg },
                site,
            },
        };
    }

    // dead branches: a constant selector picks one argument; the loser must
    // be pure because strict arguments were already evaluated by the time
    // the selector runs
    if b == Builtin::IfThenElse {
        if let Some(c) = const_bool(&args[0]) {
            let (chosen, other) = if c { (1, 2) } else { (2, 1) };
            if is_pure(&args[other]) {
                return args.swap_remove(chosen);
            }
        }
    }
    if b == Builtin::ChooseList {
        if let IrKind::Const(Const::List(_, xs)) = &args[0].kind {
            let (chosen, other) = if xs.is_empty() { (1, 2) } else { (2, 1) };
            if is_pure(&args[other]) {
                return args.swap_remove(chosen);
            }
        }
    }

    // algebraic identities
    match b {
        Builtin::AddInteger => {
            if const_int(&args[0]).is_some_and(Zero::is_zero) {
                return args.swap_remove(1);
            }
            if const_int(&args[1]).is_some_and(Zero::is_zero) {
                return args.swap_remove(0);
            }
        }
        Builtin::SubtractInteger => {
            if const_int(&args[1]).is_some_and(Zero::is_zero) {
                return args.swap_remove(0);
            }
        }
        Builtin::MultiplyInteger => {
            if const_int(&args[0]).is_some_and(One::is_one) {
                return args.swap_remove(1);
            }
            if const_int(&args[1]).is_some_and(One::is_one) {
                return args.swap_remove(0);
            }
            let zero = |i: usize| const_int(&args[i]).is_some_and(Zero::is_zero);
            if (zero(0) && is_pure(&args[1])) || (zero(1) && is_pure(&args[0])) {
                return Ir {
                    kind: IrKind::Const(Const::int(0)),
                    site,
                };
            }
        }
        Builtin::DivideInteger | Builtin::QuotientInteger => {
            if const_int(&args[1]).is_some_and(One::is_one) {
                return args.swap_remove(0);
            }
        }
        Builtin::EqualsInteger
        | Builtin::EqualsByteString
        | Builtin::EqualsString
        | Builtin::EqualsData => {
            if args[0] == args[1] && is_pure(&args[0]) {
                return Ir {
                    kind: IrKind::Const(Const::Bool(true)),
                    site,
                };
            }
        }
        _ => {}
    }

    // double negation: not(not(a)) built from strict ifThenElse
    if b == Builtin::IfThenElse && is_not_shape(&args[1], &args[2]) {
        if let IrKind::Builtin {
            b: Builtin::IfThenElse,
            args: inner,
        } = &args[0].kind
        {
            if is_not_shape(&inner[1], &inner[2]) {
                return inner[0].clone();
            }
        }
    }

    // short-circuit idempotence: `a && a` and `a || a`
    if b == Builtin::IfThenElse {
        if let (IrKind::Delay(t), IrKind::Delay(f)) = (&args[1].kind, &args[2].kind) {
            if is_pure(&args[0]) {
                // a && a: ifThenElse a (delay a) (delay false)
                if t.as_ref() == &args[0] && const_bool(f).is_some_and(|x| !x) {
                    return Ir {
                        kind: IrKind::Delay(Box::new(args.swap_remove(0))),
                        site,
                    };
                }
                // a || a: ifThenElse a (delay true) (delay a)
                if f.as_ref() == &args[0] && const_bool(t).is_some_and(|x| x) {
                    return Ir {
                        kind: IrKind::Delay(Box::new(args.swap_remove(0))),
                        site,
                    };
                }
            }
        }
    }

    Ir {
        kind: IrKind::Builtin { b, args },
        site,
    }
}

fn is_not_shape(t: &Ir, f: &Ir) -> bool {
    const_bool(t).is_some_and(|x| !x) && const_bool(f).is_some_and(|x| x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Site;

    fn konst(c: Const) -> Ir {
        Ir {
            kind: IrKind::Const(c),
            site: Site::new(0, 0),
        }
    }

    fn builtin(b: Builtin, args: Vec<Ir>) -> Ir {
        Ir {
            kind: IrKind::Builtin { b, args },
            site: Site::new(0, 0),
        }
    }

    #[test]
    fn folds_pure_builtins() {
        let ir = builtin(
            Builtin::AddInteger,
            vec![konst(Const::int(2)), konst(Const::int(3))],
        );
        assert_eq!(optimize(ir).kind, IrKind::Const(Const::int(5)));
    }

    #[test]
    fn folding_a_failing_call_becomes_error() {
        let ir = builtin(
            Builtin::QuotientInteger,
            vec![konst(Const::int(1)), konst(Const::int(0))],
        );
        match optimize(ir).kind {
            IrKind::Error { msg } => assert_eq!(msg, "division by zero"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn add_zero_identity() {
        let x = Ir {
            kind: IrKind::Var(VarId(7), "x".to_string()),
            site: Site::new(0, 0),
        };
        let ir = builtin(Builtin::AddInteger, vec![x.clone(), konst(Const::int(0))]);
        assert_eq!(optimize(ir), x);
    }

    #[test]
    fn multiply_by_zero_requires_pure_operand() {
        let pure = Ir {
            kind: IrKind::Var(VarId(1), "x".to_string()),
            site: Site::new(0, 0),
        };
        let ir = builtin(Builtin::MultiplyInteger, vec![pure, konst(Const::int(0))]);
        assert_eq!(optimize(ir).kind, IrKind::Const(Const::int(0)));

        let failing = builtin(
            Builtin::QuotientInteger,
            vec![
                Ir {
                    kind: IrKind::Var(VarId(2), "a".to_string()),
                    site: Site::new(0, 0),
                },
                konst(Const::int(0)),
            ],
        );
        let ir = builtin(
            Builtin::MultiplyInteger,
            vec![failing.clone(), konst(Const::int(0))],
        );
        // the failing operand must survive
        match optimize(ir).kind {
            IrKind::Builtin { b, .. } => assert_eq!(b, Builtin::MultiplyInteger),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn dead_branch_keeps_deferred_failures_unevaluated() {
        // force(ifThenElse true (delay 1) (delay (1/0))) -> 1
        let poison = builtin(
            Builtin::QuotientInteger,
            vec![konst(Const::int(1)), konst(Const::int(0))],
        );
        let ite = builtin(
            Builtin::IfThenElse,
            vec![
                konst(Const::Bool(true)),
                Ir {
                    kind: IrKind::Delay(Box::new(konst(Const::int(1)))),
                    site: Site::new(0, 0),
                },
                Ir {
                    kind: IrKind::Delay(Box::new(poison)),
                    site: Site::new(0, 0),
                },
            ],
        );
        let ir = Ir {
            kind: IrKind::Force(Box::new(ite)),
            site: Site::new(0, 0),
        };
        assert_eq!(optimize(ir).kind, IrKind::Const(Const::int(1)));
    }

    #[test]
    fn single_use_pure_binding_is_inlined() {
        // (\x. x + 1) 5  ->  6
        let x = VarId(9);
        let body = builtin(
            Builtin::AddInteger,
            vec![
                Ir {
                    kind: IrKind::Var(x, "x".to_string()),
                    site: Site::new(0, 0),
                },
                konst(Const::int(1)),
            ],
        );
        let ir = Ir {
            kind: IrKind::Call {
                f: Box::new(Ir {
                    kind: IrKind::Lam {
                        params: vec![(x, "x".to_string())],
                        body: Box::new(body),
                    },
                    site: Site::new(0, 0),
                }),
                args: vec![konst(Const::int(5))],
            },
            site: Site::new(0, 0),
        };
        assert_eq!(optimize(ir).kind, IrKind::Const(Const::int(6)));
    }

    #[test]
    fn impure_bindings_survive() {
        // (\x. 1) (1/0) keeps the failing argument
        let x = VarId(3);
        let ir = Ir {
            kind: IrKind::Call {
                f: Box::new(Ir {
                    kind: IrKind::Lam {
                        params: vec![(x, "x".to_string())],
                        body: Box::new(konst(Const::int(1))),
                    },
                    site: Site::new(0, 0),
                }),
                args: vec![builtin(
                    Builtin::QuotientInteger,
                    vec![
                        Ir {
                            kind: IrKind::Var(VarId(4), "a".to_string()),
                            site: Site::new(0, 0),
                        },
                        konst(Const::int(0)),
                    ],
                )],
            },
            site: Site::new(0, 0),
        };
        assert!(matches!(optimize(ir).kind, IrKind::Call { .. }));
    }
}
