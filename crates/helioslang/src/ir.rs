use num_bigint::BigInt;

use datacore::Data;
use uplc::builtin::Builtin;
use uplc::term::{Const, ConstType};

use crate::source::Site;
use crate::texpr::*;
use crate::types::{Type, TypeDefKind};

/// A variable with a unique index; the name is carried for printing only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrKind {
    Var(VarId, String),
    Lam {
        params: Vec<(VarId, String)>,
        body: Box<Ir>,
    },
    Call {
        f: Box<Ir>,
        args: Vec<Ir>,
    },
    /// A saturated builtin call; the emitter supplies the type-level forces.
    Builtin {
        b: Builtin,
        args: Vec<Ir>,
    },
    Delay(Box<Ir>),
    Force(Box<Ir>),
    Const(Const),
    Error {
        msg: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ir {
    pub kind: IrKind,
    pub site: Site,
}

impl Ir {
    pub fn node_count(&self) -> usize {
        1 + match &self.kind {
            IrKind::Lam { body, .. } => body.node_count(),
            IrKind::Call { f, args } => {
                f.node_count() + args.iter().map(Ir::node_count).sum::<usize>()
            }
            IrKind::Builtin { args, .. } => args.iter().map(Ir::node_count).sum(),
            IrKind::Delay(x) | IrKind::Force(x) => x.node_count(),
            _ => 0,
        }
    }
}

impl std::fmt::Display for Ir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn go(ir: &Ir, f: &mut std::fmt::Formatter<'_>, indent: usize) -> std::fmt::Result {
            let pad = "  ".repeat(indent);
            match &ir.kind {
                IrKind::Var(_, n) => write!(f, "{}{} @{}", pad, n, ir.site),
                IrKind::Lam { params, body } => {
                    let names: Vec<&str> = params.iter().map(|(_, n)| n.as_str()).collect();
                    writeln!(f, "{}(fn ({}) @{}", pad, names.join(" "), ir.site)?;
                    go(body, f, indent + 1)?;
                    write!(f, ")")
                }
                IrKind::Call { f: head, args } => {
                    writeln!(f, "{}(call @{}", pad, ir.site)?;
                    go(head, f, indent + 1)?;
                    for a in args {
                        writeln!(f)?;
                        go(a, f, indent + 1)?;
                    }
                    write!(f, ")")
                }
                IrKind::Builtin { b, args } => {
                    writeln!(f, "{}({} @{}", pad, b.name(), ir.site)?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        go(a, f, indent + 1)?;
                    }
                    write!(f, ")")
                }
                IrKind::Delay(x) => {
                    writeln!(f, "{}(delay", pad)?;
                    go(x, f, indent + 1)?;
                    write!(f, ")")
                }
                IrKind::Force(x) => {
                    writeln!(f, "{}(force", pad)?;
                    go(x, f, indent + 1)?;
                    write!(f, ")")
                }
                IrKind::Const(c) => write!(f, "{}{:?} @{}", pad, c, ir.site),
                IrKind::Error { msg } => write!(f, "{}(error {:?}) @{}", pad, msg, ir.site),
            }
        }
        go(self, f, 0)
    }
}

pub(crate) struct Builder<'a> {
    pub prog: &'a TProgram,
    next: u32,
    pub scope: Vec<(String, VarId)>,
    func_vars: Vec<VarId>,
    const_vars: Vec<VarId>,
    /// While lowering a recursive definition, self-references resolve to the
    /// fixpoint binder instead of the outer binding.
    self_override: Option<(FuncId, VarId)>,
}

/// Lower a checked program to IR: nested bindings for every function and
/// constant (in declaration order), closed by the purpose wrapper over
/// `main`.
pub fn lower(prog: &TProgram) -> Ir {
    let main = prog.main.expect("modules have no entry point");
    let mut b = Builder {
        prog,
        next: 0,
        scope: Vec::new(),
        func_vars: Vec::new(),
        const_vars: Vec::new(),
        self_override: None,
    };
    for _ in &prog.funcs {
        let v = b.fresh_var();
        b.func_vars.push(v);
    }
    for _ in &prog.consts {
        let v = b.fresh_var();
        b.const_vars.push(v);
    }

    // binding order: source declaration rank; a body only references
    // bindings at or before its own rank, so this nesting is well-scoped
    enum Slot {
        F(FuncId),
        C(ConstId),
    }
    let mut slots: Vec<(usize, Slot)> = prog
        .consts
        .iter()
        .enumerate()
        .map(|(i, c)| (c.pos, Slot::C(i)))
        .chain(
            prog.funcs
                .iter()
                .enumerate()
                .map(|(i, f)| (f.pos, Slot::F(i))),
        )
        .collect();
    slots.sort_by_key(|(pos, _)| *pos);

    let mut body = b.entry_wrapper(main);
    for (_, slot) in slots.into_iter().rev() {
        let (var, name, def, site) = match slot {
            Slot::F(id) => {
                let def = b.lower_func(id);
                let f = &prog.funcs[id];
                (b.func_vars[id], f.name.clone(), def, f.site)
            }
            Slot::C(id) => {
                let c = &prog.consts[id];
                let def = b.lower_expr(&c.value);
                (b.const_vars[id], c.name.clone(), def, c.site)
            }
        };
        body = Ir {
            site,
            kind: IrKind::Call {
                f: Box::new(Ir {
                    site,
                    kind: IrKind::Lam {
                        params: vec![(var, name)],
                        body: Box::new(body),
                    },
                }),
                args: vec![def],
            },
        };
    }
    body
}

impl<'a> Builder<'a> {
    pub fn fresh_var(&mut self) -> VarId {
        let v = VarId(self.next);
        self.next += 1;
        v
    }

    pub fn var(&self, v: VarId, name: &str, site: Site) -> Ir {
        Ir {
            kind: IrKind::Var(v, name.to_string()),
            site,
        }
    }

    pub fn lam(&self, params: Vec<(VarId, String)>, body: Ir, site: Site) -> Ir {
        if params.is_empty() {
            // zero-parameter functions are thunks
            return Ir {
                kind: IrKind::Delay(Box::new(body)),
                site,
            };
        }
        Ir {
            kind: IrKind::Lam {
                params,
                body: Box::new(body),
            },
            site,
        }
    }

    pub fn call(&self, f: Ir, args: Vec<Ir>, site: Site) -> Ir {
        if args.is_empty() {
            return Ir {
                kind: IrKind::Force(Box::new(f)),
                site,
            };
        }
        Ir {
            kind: IrKind::Call {
                f: Box::new(f),
                args,
            },
            site,
        }
    }

    pub fn builtin(&self, b: Builtin, args: Vec<Ir>, site: Site) -> Ir {
        Ir {
            kind: IrKind::Builtin { b, args },
            site,
        }
    }

    pub fn delay(&self, x: Ir) -> Ir {
        let site = x.site;
        Ir {
            kind: IrKind::Delay(Box::new(x)),
            site,
        }
    }

    pub fn force(&self, x: Ir) -> Ir {
        let site = x.site;
        Ir {
            kind: IrKind::Force(Box::new(x)),
            site,
        }
    }

    pub fn konst(&self, c: Const, site: Site) -> Ir {
        Ir {
            kind: IrKind::Const(c),
            site,
        }
    }

    pub fn int(&self, i: i64, site: Site) -> Ir {
        self.konst(Const::Int(BigInt::from(i)), site)
    }

    pub fn error(&self, msg: &str, site: Site) -> Ir {
        Ir {
            kind: IrKind::Error {
                msg: msg.to_string(),
            },
            site,
        }
    }

    pub fn nil_data(&self, site: Site) -> Ir {
        self.konst(Const::List(ConstType::Data, Vec::new()), site)
    }

    pub fn nil_pair(&self, site: Site) -> Ir {
        self.konst(
            Const::List(
                ConstType::pair_of(ConstType::Data, ConstType::Data),
                Vec::new(),
            ),
            site,
        )
    }

    /// `if c then t else f` with both branches deferred.
    pub fn ite(&self, c: Ir, t: Ir, f: Ir, site: Site) -> Ir {
        let t = self.delay(t);
        let f = self.delay(f);
        self.force(self.builtin(Builtin::IfThenElse, vec![c, t, f], site))
    }

    /// `chooseList xs empty nonempty` with both branches deferred.
    pub fn choose_list(&self, xs: Ir, empty: Ir, nonempty: Ir, site: Site) -> Ir {
        let empty = self.delay(empty);
        let nonempty = self.delay(nonempty);
        self.force(self.builtin(Builtin::ChooseList, vec![xs, empty, nonempty], site))
    }

    /// Bind a value: `(\x. body(x)) value`.
    pub fn bind<F>(&mut self, name: &str, value: Ir, site: Site, body: F) -> Ir
    where
        F: FnOnce(&mut Self, Ir) -> Ir,
    {
        let v = self.fresh_var();
        let var = self.var(v, name, site);
        let inner = body(self, var);
        self.call(
            self.lam(vec![(v, name.to_string())], inner, site),
            vec![value],
            site,
        )
    }

    /// The strict fixpoint combinator applied to `f`:
    /// `(\s. f (\x. s s x)) (\s. f (\x. s s x))`.
    pub fn fix(&mut self, f: Ir, site: Site) -> Ir {
        let mut half = |b: &mut Self, fv: &Ir| {
            let s = b.fresh_var();
            let x = b.fresh_var();
            let eta = b.lam(
                vec![(x, "x".to_string())],
                b.call(
                    b.var(s, "s", site),
                    vec![b.var(s, "s", site), b.var(x, "x", site)],
                    site,
                ),
                site,
            );
            b.lam(
                vec![(s, "s".to_string())],
                b.call(fv.clone(), vec![eta], site),
                site,
            )
        };
        self.bind("f", f, site, |b, fv| {
            let l = half(b, &fv);
            let r = half(b, &fv);
            b.call(l, vec![r], site)
        })
    }

    fn lookup(&self, name: &str, site: Site) -> Ir {
        let (_, v) = self
            .scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .unwrap_or_else(|| panic!("unresolved local '{}' after checking", name));
        self.var(*v, name, site)
    }

    fn func_ref(&self, id: FuncId, site: Site) -> Ir {
        if let Some((fid, v)) = self.self_override {
            if fid == id {
                return self.var(v, &self.prog.funcs[id].name, site);
            }
        }
        self.var(self.func_vars[id], &self.prog.funcs[id].name, site)
    }

    fn lower_func(&mut self, id: FuncId) -> Ir {
        let f = &self.prog.funcs[id];
        let site = f.site;
        let depth = self.scope.len();
        let mut params = Vec::new();
        for (pn, _) in &f.params {
            let v = self.fresh_var();
            self.scope.push((pn.clone(), v));
            params.push((v, pn.clone()));
        }

        if f.recursive {
            let inner = self.fresh_var();
            let prev = self.self_override.replace((id, inner));
            let body = self.lower_expr(&f.body);
            self.self_override = prev;
            self.scope.truncate(depth);
            let raw = self.lam(params, body, site);
            let g = self.lam(vec![(inner, f.name.clone())], raw, site);
            return self.fix(g, site);
        }

        let body = self.lower_expr(&f.body);
        self.scope.truncate(depth);
        self.lam(params, body, site)
    }

    /// The purpose wrapper: convert `Data` arguments per declared parameter
    /// type, call `main`, and for validators turn `false` into a failure.
    fn entry_wrapper(&mut self, main: FuncId) -> Ir {
        let f = &self.prog.funcs[main];
        let site = f.site;
        let param_tys: Vec<Type> = f.params.iter().map(|(_, t)| t.clone()).collect();

        if param_tys.is_empty() {
            let call = self.call(self.func_ref(main, site), Vec::new(), site);
            return self.wrap_validator_result(call, site);
        }

        let mut params = Vec::new();
        let mut args = Vec::new();
        for (i, ty) in param_tys.iter().enumerate() {
            let v = self.fresh_var();
            let name = format!("arg{}", i);
            let d = self.var(v, &name, site);
            params.push((v, name));
            args.push(self.from_data(ty, d, site));
        }
        let call = self.call(self.func_ref(main, site), args, site);
        let body = self.wrap_validator_result(call, site);
        self.lam(params, body, site)
    }

    fn wrap_validator_result(&mut self, result: Ir, site: Site) -> Ir {
        use crate::ast::Purpose;
        match self.prog.purpose {
            Purpose::Testing | Purpose::Module => result,
            _ => self.ite(
                result,
                self.konst(Const::Unit, site),
                self.error("validation returned false", site),
                site,
            ),
        }
    }

    // ---- data conversions ----

    pub fn to_data(&mut self, ty: &Type, x: Ir, site: Site) -> Ir {
        match ty.widen() {
            Type::Int => self.builtin(Builtin::IData, vec![x], site),
            Type::Bool => self.ite(
                x,
                self.konst(Const::Data(Data::bool_(true)), site),
                self.konst(Const::Data(Data::bool_(false)), site),
                site,
            ),
            Type::Str => {
                let b = self.builtin(Builtin::EncodeUtf8, vec![x], site);
                self.builtin(Builtin::BData, vec![b], site)
            }
            Type::Bytes => self.builtin(Builtin::BData, vec![x], site),
            Type::AnyData | Type::Named { .. } => x,
            Type::List(_) => self.builtin(Builtin::ListData, vec![x], site),
            Type::Map(_, _) => self.builtin(Builtin::MapData, vec![x], site),
            t => unreachable!("{:?} has no data form after checking", t),
        }
    }

    pub fn from_data(&mut self, ty: &Type, d: Ir, site: Site) -> Ir {
        match ty.widen() {
            Type::Int => self.builtin(Builtin::UnIData, vec![d], site),
            Type::Bool => {
                let u = self.builtin(Builtin::UnConstrData, vec![d], site);
                let tag = self.builtin(Builtin::FstPair, vec![u], site);
                self.builtin(Builtin::EqualsInteger, vec![tag, self.int(1, site)], site)
            }
            Type::Str => {
                let b = self.builtin(Builtin::UnBData, vec![d], site);
                self.builtin(Builtin::DecodeUtf8, vec![b], site)
            }
            Type::Bytes => self.builtin(Builtin::UnBData, vec![d], site),
            Type::AnyData | Type::Named { .. } => d,
            Type::List(_) => self.builtin(Builtin::UnListData, vec![d], site),
            Type::Map(_, _) => self.builtin(Builtin::UnMapData, vec![d], site),
            t => unreachable!("{:?} has no data form after checking", t),
        }
    }

    fn data_list(&mut self, elem_ty: &Type, items: &[TExpr], site: Site) -> Ir {
        let mut out = self.nil_data(site);
        for item in items.iter().rev() {
            let x = self.lower_expr(item);
            let d = self.to_data(elem_ty, x, item.site);
            out = self.builtin(Builtin::MkCons, vec![d, out], site);
        }
        out
    }

    // ---- expressions ----

    pub fn lower_expr(&mut self, e: &TExpr) -> Ir {
        let site = e.site;
        match &e.kind {
            TExprKind::IntLit(z) => self.konst(Const::Int(z.clone()), site),
            TExprKind::BoolLit(b) => self.konst(Const::Bool(*b), site),
            TExprKind::StrLit(s) => self.konst(Const::Str(s.clone()), site),
            TExprKind::BytesLit(b) => self.konst(Const::Bytes(b.clone()), site),
            TExprKind::ListLit(items) => {
                let Type::List(elem) = e.ty.widen() else {
                    unreachable!("list literal without list type")
                };
                self.data_list(&elem, items, site)
            }
            TExprKind::MapLit(entries) => {
                let Type::Map(kt, vt) = e.ty.widen() else {
                    unreachable!("map literal without map type")
                };
                let mut out = self.nil_pair(site);
                for (k, v) in entries.iter().rev() {
                    let ki = self.lower_expr(k);
                    let vi = self.lower_expr(v);
                    let kd = self.to_data(&kt, ki, k.site);
                    let vd = self.to_data(&vt, vi, v.site);
                    let pair = self.builtin(Builtin::MkPairData, vec![kd, vd], site);
                    out = self.builtin(Builtin::MkCons, vec![pair, out], site);
                }
                out
            }
            TExprKind::Local(name) => self.lookup(name, site),
            TExprKind::FuncRef(id) => self.func_ref(*id, site),
            TExprKind::ConstRef(id) => {
                self.var(self.const_vars[*id], &self.prog.consts[*id].name, site)
            }
            TExprKind::Call { f, args } => {
                let fi = self.lower_expr(f);
                let ai: Vec<Ir> = args.iter().map(|a| self.lower_expr(a)).collect();
                self.call(fi, ai, site)
            }
            TExprKind::Member { m, recv, args } => self.lower_member(*m, recv, args, &e.ty, site),
            TExprKind::Global { g, args } => match g {
                GlobalFn::Error => {
                    let TExprKind::StrLit(msg) = &args[0].kind else {
                        unreachable!("error message is a literal after checking")
                    };
                    self.error(msg, site)
                }
                GlobalFn::Assert => {
                    let cond = self.lower_expr(&args[0]);
                    self.ite(
                        cond,
                        self.konst(Const::Bool(true), site),
                        self.error("assert failed", site),
                        site,
                    )
                }
                GlobalFn::Print => {
                    let msg = self.lower_expr(&args[0]);
                    self.builtin(
                        Builtin::Trace,
                        vec![msg, self.konst(Const::Bool(true), site)],
                        site,
                    )
                }
            },
            TExprKind::If { cond, then_, else_ } => {
                let c = self.lower_expr(cond);
                let t = self.lower_expr(then_);
                let f = self.lower_expr(else_);
                self.ite(c, t, f, site)
            }
            TExprKind::Switch {
                scrutinee,
                arms,
                default,
            } => self.lower_switch(scrutinee, arms, default.as_deref(), site),
            TExprKind::Let { name, value, body } => {
                let v = self.lower_expr(value);
                let var = self.fresh_var();
                let depth = self.scope.len();
                if name != "_" {
                    self.scope.push((name.clone(), var));
                }
                let b = self.lower_expr(body);
                self.scope.truncate(depth);
                self.call(
                    self.lam(vec![(var, name.clone())], b, site),
                    vec![v],
                    site,
                )
            }
            TExprKind::Lambda { params, body } => {
                let depth = self.scope.len();
                let mut ps = Vec::new();
                for (pn, _) in params {
                    let v = self.fresh_var();
                    self.scope.push((pn.clone(), v));
                    ps.push((v, pn.clone()));
                }
                let b = self.lower_expr(body);
                self.scope.truncate(depth);
                self.lam(ps, b, site)
            }
            TExprKind::Construct { decl, tag, args } => {
                let Type::Named { args: targs, .. } = e.ty.widen() else {
                    unreachable!("construct without a named type")
                };
                let def = self.prog.defs.get(*decl);
                let vix = match &def.kind {
                    TypeDefKind::Enum { .. } => Some(*tag as usize),
                    _ => None,
                };
                let fields = def.fields_of(vix, &targs);
                let mut list = self.nil_data(site);
                for (arg, (_, fty)) in args.iter().zip(&fields).rev() {
                    let x = self.lower_expr(arg);
                    let d = self.to_data(fty, x, arg.site);
                    list = self.builtin(Builtin::MkCons, vec![d, list], site);
                }
                let tag_ir = self.konst(Const::Int(BigInt::from(*tag)), site);
                self.builtin(Builtin::ConstrData, vec![tag_ir, list], site)
            }
            TExprKind::FieldGet { recv, index } => {
                let r = self.lower_expr(recv);
                let u = self.builtin(Builtin::UnConstrData, vec![r], site);
                let mut fields = self.builtin(Builtin::SndPair, vec![u], site);
                for _ in 0..*index {
                    fields = self.builtin(Builtin::TailList, vec![fields], site);
                }
                let d = self.builtin(Builtin::HeadList, vec![fields], site);
                self.from_data(&e.ty, d, site)
            }
        }
    }

    fn lower_switch(
        &mut self,
        scrutinee: &TExpr,
        arms: &[TArm],
        default: Option<&TExpr>,
        site: Site,
    ) -> Ir {
        let scrut = self.lower_expr(scrutinee);
        self.bind("subject", scrut, site, |b, subject| {
            let u = b.builtin(Builtin::UnConstrData, vec![subject.clone()], site);
            let tag_ir = b.builtin(Builtin::FstPair, vec![u], site);
            b.bind("tag", tag_ir, site, |b, tag| {
                // the last alternative needs no test of its own
                let mut chain = match default {
                    Some(d) => b.lower_expr(d),
                    None => {
                        let last = arms.last().expect("switch covers at least one variant");
                        b.lower_arm(last, &subject)
                    }
                };
                let tested: &[TArm] = if default.is_some() {
                    arms
                } else {
                    &arms[..arms.len() - 1]
                };
                for arm in tested.iter().rev() {
                    let body = b.lower_arm(arm, &subject);
                    let test = b.builtin(
                        Builtin::EqualsInteger,
                        vec![tag.clone(), b.int(arm.variant as i64, site)],
                        site,
                    );
                    chain = b.ite(test, body, chain, site);
                }
                chain
            })
        })
    }

    fn lower_arm(&mut self, arm: &TArm, subject: &Ir) -> Ir {
        match &arm.binder {
            None => self.lower_expr(&arm.body),
            Some(name) => {
                let v = self.fresh_var();
                let depth = self.scope.len();
                self.scope.push((name.clone(), v));
                let body = self.lower_expr(&arm.body);
                self.scope.truncate(depth);
                let site = arm.body.site;
                self.call(
                    self.lam(vec![(v, name.clone())], body, site),
                    vec![subject.clone()],
                    site,
                )
            }
        }
    }
}
