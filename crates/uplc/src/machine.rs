use std::rc::Rc;

use crate::builtin::{eval_pure, Builtin};
use crate::cost::{CostModel, ExBudget, Meter};
use crate::term::{Const, Program, Site, Term, TermKind};

/// A machine value. Thunks (`Delay`) and closures capture their environment;
/// builtins accumulate forces and arguments until saturated.
#[derive(Clone, Debug)]
enum Value {
    Con(Rc<Const>),
    Delay(Rc<Term>, Env),
    Lambda(Rc<Term>, Env),
    Builtin {
        b: Builtin,
        forces_left: u8,
        args: Vec<Value>,
    },
}

impl Value {
    fn size_words(&self) -> u64 {
        match self {
            Value::Con(c) => c.size_words(),
            _ => 1,
        }
    }
}

#[derive(Clone, Debug)]
struct Env(Option<Rc<EnvNode>>);

#[derive(Debug)]
struct EnvNode {
    value: Value,
    next: Env,
}

impl Env {
    fn empty() -> Self {
        Env(None)
    }

    fn push(&self, value: Value) -> Env {
        Env(Some(Rc::new(EnvNode {
            value,
            next: self.clone(),
        })))
    }

    fn lookup(&self, idx: u32) -> Option<&Value> {
        let mut node = self.0.as_deref()?;
        for _ in 0..idx {
            node = node.next.0.as_deref()?;
        }
        Some(&node.value)
    }
}

enum Frame {
    /// A `Force` whose body is being evaluated.
    Force,
    /// An `Apply` whose head is being evaluated; the argument term waits.
    AwaitFun { arg: Rc<Term>, env: Env },
    /// An `Apply` whose argument is being evaluated; the head is a value.
    AwaitArg { fun: Value },
}

/// What a run produced. Runtime failures are values here, never host errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Value(Const),
    /// The program reduced to a function or thunk rather than a constant.
    Opaque,
    Failure {
        info: String,
        site: Option<Site>,
    },
    OutOfBudget {
        site: Option<Site>,
    },
}

#[derive(Clone, Debug)]
pub struct RunResult {
    pub outcome: Outcome,
    pub spent: ExBudget,
    pub logs: Vec<String>,
}

struct Machine<'a> {
    model: &'a CostModel,
    meter: Meter,
    frames: Vec<Frame>,
    logs: Vec<String>,
    site: Option<Site>,
}

enum Step {
    Compute(Rc<Term>, Env),
    Return(Value),
}

/// Evaluate a program against a cost model and a budget. The meter is
/// acquired here and consumption is reported on every exit path.
pub fn run(program: &Program, model: &CostModel, limit: ExBudget) -> RunResult {
    let mut m = Machine {
        model,
        meter: Meter::new(limit),
        frames: Vec::new(),
        logs: Vec::new(),
        site: None,
    };
    let outcome = m.go(&program.term);
    RunResult {
        outcome,
        spent: m.meter.spent(),
        logs: m.logs,
    }
}

impl<'a> Machine<'a> {
    fn go(&mut self, root: &Term) -> Outcome {
        if self.meter.spend(self.model.machine.startup).is_err() {
            return self.out_of_budget();
        }

        let mut step = Step::Compute(Rc::new(root.clone()), Env::empty());
        loop {
            match step {
                Step::Compute(term, env) => {
                    if term.site.is_some() {
                        self.site = term.site;
                    }
                    let cost = self.step_cost(&term.kind);
                    if self.meter.spend(cost).is_err() {
                        return self.out_of_budget();
                    }
                    step = match &term.kind {
                        TermKind::Var(idx) => match env.lookup(*idx) {
                            Some(v) => Step::Return(v.clone()),
                            None => return self.fail("unbound variable"),
                        },
                        TermKind::Constant(c) => Step::Return(Value::Con(Rc::new(c.clone()))),
                        TermKind::Lambda(body) => {
                            Step::Return(Value::Lambda(body.clone(), env.clone()))
                        }
                        TermKind::Delay(body) => {
                            Step::Return(Value::Delay(body.clone(), env.clone()))
                        }
                        TermKind::Force(inner) => {
                            self.frames.push(Frame::Force);
                            Step::Compute(inner.clone(), env)
                        }
                        TermKind::Apply(fun, arg) => {
                            self.frames.push(Frame::AwaitFun {
                                arg: arg.clone(),
                                env: env.clone(),
                            });
                            Step::Compute(fun.clone(), env)
                        }
                        TermKind::Error => {
                            let info = self
                                .logs
                                .last()
                                .cloned()
                                .unwrap_or_else(|| "explicit error".to_string());
                            return self.fail(&info);
                        }
                        TermKind::Builtin(b) => Step::Return(Value::Builtin {
                            b: *b,
                            forces_left: b.forces(),
                            args: Vec::new(),
                        }),
                    };
                }
                Step::Return(value) => match self.frames.pop() {
                    None => {
                        return match value {
                            Value::Con(c) => Outcome::Value((*c).clone()),
                            _ => Outcome::Opaque,
                        }
                    }
                    Some(Frame::Force) => match value {
                        Value::Delay(body, env) => {
                            step = Step::Compute(body, env);
                        }
                        Value::Builtin {
                            b,
                            forces_left,
                            args,
                        } if forces_left > 0 => {
                            step = Step::Return(Value::Builtin {
                                b,
                                forces_left: forces_left - 1,
                                args,
                            });
                        }
                        _ => return self.fail("cannot force a non-thunk"),
                    },
                    Some(Frame::AwaitFun { arg, env }) => {
                        self.frames.push(Frame::AwaitArg { fun: value });
                        step = Step::Compute(arg, env);
                    }
                    Some(Frame::AwaitArg { fun }) => match fun {
                        Value::Lambda(body, env) => {
                            step = Step::Compute(body, env.push(value));
                        }
                        Value::Builtin {
                            b,
                            forces_left: 0,
                            mut args,
                        } => {
                            args.push(value);
                            if args.len() == b.arity() {
                                match self.run_builtin(b, args) {
                                    Ok(v) => step = Step::Return(v),
                                    Err(out) => return out,
                                }
                            } else {
                                step = Step::Return(Value::Builtin {
                                    b,
                                    forces_left: 0,
                                    args,
                                });
                            }
                        }
                        _ => return self.fail("cannot apply a non-function"),
                    },
                },
            }
        }
    }

    fn step_cost(&self, kind: &TermKind) -> ExBudget {
        let mc = &self.model.machine;
        match kind {
            TermKind::Var(_) => mc.var,
            TermKind::Constant(_) => mc.constant,
            TermKind::Lambda(_) => mc.lambda,
            TermKind::Apply(_, _) => mc.apply,
            TermKind::Delay(_) => mc.delay,
            TermKind::Force(_) => mc.force,
            TermKind::Error => mc.constant,
            TermKind::Builtin(_) => mc.builtin,
        }
    }

    fn run_builtin(&mut self, b: Builtin, args: Vec<Value>) -> Result<Value, Outcome> {
        let sizes: Vec<u64> = args.iter().map(Value::size_words).collect();
        let cost = self.model.cost_of(b, &sizes);
        if self.meter.spend(cost).is_err() {
            return Err(self.out_of_budget());
        }

        if b.is_const_builtin() {
            let mut consts = Vec::with_capacity(args.len());
            for a in &args {
                match a {
                    Value::Con(c) => consts.push((**c).clone()),
                    _ => return Err(self.fail(&format!("{} expects a constant", b.name()))),
                }
            }
            return match eval_pure(b, &consts) {
                Ok(c) => Ok(Value::Con(Rc::new(c))),
                Err(info) => Err(self.fail(&info)),
            };
        }

        let mut args = args;
        match b {
            Builtin::IfThenElse => {
                let f = args.pop().unwrap();
                let t = args.pop().unwrap();
                match args.pop().unwrap() {
                    Value::Con(c) => match &*c {
                        Const::Bool(cond) => Ok(if *cond { t } else { f }),
                        _ => Err(self.fail("ifThenElse expects a boolean")),
                    },
                    _ => Err(self.fail("ifThenElse expects a boolean")),
                }
            }
            Builtin::ChooseUnit => {
                let v = args.pop().unwrap();
                match args.pop().unwrap() {
                    Value::Con(c) if matches!(&*c, Const::Unit) => Ok(v),
                    _ => Err(self.fail("chooseUnit expects unit")),
                }
            }
            Builtin::ChooseList => {
                let nonempty = args.pop().unwrap();
                let empty = args.pop().unwrap();
                match args.pop().unwrap() {
                    Value::Con(c) => match &*c {
                        Const::List(_, xs) => Ok(if xs.is_empty() { empty } else { nonempty }),
                        _ => Err(self.fail("chooseList expects a list")),
                    },
                    _ => Err(self.fail("chooseList expects a list")),
                }
            }
            Builtin::Trace => {
                let v = args.pop().unwrap();
                match args.pop().unwrap() {
                    Value::Con(c) => match &*c {
                        Const::Str(msg) => {
                            self.logs.push(msg.clone());
                            Ok(v)
                        }
                        _ => Err(self.fail("trace expects a string")),
                    },
                    _ => Err(self.fail("trace expects a string")),
                }
            }
            _ => unreachable!("constant builtin handled above"),
        }
    }

    fn fail(&self, info: &str) -> Outcome {
        Outcome::Failure {
            info: info.to_string(),
            site: self.site,
        }
    }

    fn out_of_budget(&self) -> Outcome {
        Outcome::OutOfBudget { site: self.site }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(t: Term) -> Outcome {
        run(&Program::new(t), &CostModel::default(), ExBudget::DEFAULT_LIMIT).outcome
    }

    #[test]
    fn identity_applied_to_constant() {
        let t = Term::apply(Term::lam(Term::var(0)), Term::constant(Const::int(5)));
        assert_eq!(eval(t), Outcome::Value(Const::int(5)));
    }

    #[test]
    fn saturated_builtin_addition() {
        let t = Term::apply(
            Term::apply(Term::builtin(Builtin::AddInteger), Term::constant(Const::int(2))),
            Term::constant(Const::int(3)),
        );
        assert_eq!(eval(t), Outcome::Value(Const::int(5)));
    }

    #[test]
    fn if_then_else_defers_the_dead_branch() {
        // force(ifThenElse true (delay 1) (delay error))
        let t = Term::force(Term::apply(
            Term::apply(
                Term::apply(
                    Term::force(Term::builtin(Builtin::IfThenElse)),
                    Term::constant(Const::Bool(true)),
                ),
                Term::delay(Term::constant(Const::int(1))),
            ),
            Term::delay(Term::new(TermKind::Error)),
        ));
        assert_eq!(eval(t), Outcome::Value(Const::int(1)));
    }

    #[test]
    fn error_term_reports_last_trace() {
        // force(trace "boom" (delay error))
        let t = Term::force(Term::apply(
            Term::apply(
                Term::force(Term::builtin(Builtin::Trace)),
                Term::constant(Const::Str("boom".to_string())),
            ),
            Term::delay(Term::new(TermKind::Error)),
        ));
        match eval(t) {
            Outcome::Failure { info, .. } => assert_eq!(info, "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_surfaces_info_and_site() {
        let site = Site::new(7, 12);
        let mut div = Term::apply(
            Term::apply(
                Term::builtin(Builtin::QuotientInteger),
                Term::constant(Const::int(1)),
            ),
            Term::constant(Const::int(0)),
        );
        div.site = Some(site);
        match eval(div) {
            Outcome::Failure { info, site: s } => {
                assert_eq!(info, "division by zero");
                assert_eq!(s, Some(site));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unbounded_recursion_runs_out_of_budget() {
        // (\x -> x x) (\x -> x x)
        let dup = Term::lam(Term::apply(Term::var(0), Term::var(0)));
        let t = Term::apply(dup.clone(), dup);
        let r = run(
            &Program::new(t),
            &CostModel::default(),
            ExBudget::new(10_000, 10_000_000),
        );
        assert!(matches!(r.outcome, Outcome::OutOfBudget { .. }));
        assert!(r.spent.cpu > 0);
    }
}
