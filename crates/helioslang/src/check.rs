use std::collections::BTreeMap;

use crate::ast::{self, BinOp, Purpose, UnaryOp};
use crate::error::{CompileError, Result};
use crate::source::Site;
use crate::texpr::*;
use crate::types::*;

const MAX_MONO_DEPTH: usize = 64;

#[derive(Clone, Debug)]
struct Template {
    pos: usize,
    decl: ast::FuncDecl,
    /// Set for impl functions; the impl's type parameters alias the target
    /// declaration's parameters.
    self_decl: Option<DeclId>,
    impl_params: Vec<String>,
}

#[derive(Clone, Debug)]
struct ConstTemplate {
    pos: usize,
    key: String,
    decl: ast::ConstDecl,
    self_decl: Option<DeclId>,
}

struct Scope {
    locals: Vec<(String, Type)>,
}

impl Scope {
    fn new() -> Self {
        Scope { locals: Vec::new() }
    }

    fn push(&mut self, name: &str, ty: Type) {
        if name != "_" {
            self.locals.push((name.to_string(), ty));
        }
    }

    fn truncate(&mut self, n: usize) {
        self.locals.truncate(n);
    }

    fn len(&self) -> usize {
        self.locals.len()
    }

    fn lookup(&self, name: &str) -> Option<&Type> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}

pub struct Checker {
    defs: TypeDefs,
    templates: BTreeMap<String, Template>,
    const_templates: Vec<ConstTemplate>,
    const_ix: BTreeMap<String, ConstId>,
    consts: Vec<TConst>,
    funcs: Vec<TFunc>,
    mono: BTreeMap<(String, Vec<Type>), FuncId>,
    /// (template key, type args) currently being checked; used for recursion
    /// marking and monomorphisation cycle detection.
    in_progress: Vec<(String, Vec<Type>, FuncId)>,
    /// Declaration rank of the body currently being checked.
    pos_stack: Vec<usize>,
    option_decl: Option<DeclId>,
}

/// Type-check a program (with its resolved module set, prelude first) and
/// produce the monomorphised typed tree.
pub fn check(programs: &[&ast::Program]) -> Result<TProgram> {
    let main_prog = *programs.last().expect("at least the main program");

    let mut ck = Checker {
        defs: TypeDefs::default(),
        templates: BTreeMap::new(),
        const_templates: Vec::new(),
        const_ix: BTreeMap::new(),
        consts: Vec::new(),
        funcs: Vec::new(),
        mono: BTreeMap::new(),
        in_progress: Vec::new(),
        pos_stack: Vec::new(),
        option_decl: None,
    };

    ck.collect_types(programs)?;
    ck.option_decl = ck.defs.lookup("Option");
    ck.collect_templates(programs)?;
    ck.check_consts()?;

    let main = if main_prog.purpose == Purpose::Module {
        None
    } else {
        Some(ck.check_main(main_prog)?)
    };

    Ok(TProgram {
        purpose: main_prog.purpose,
        name: main_prog.name.name.clone(),
        defs: ck.defs,
        funcs: ck.funcs,
        consts: ck.consts,
        main,
    })
}

impl Checker {
    // ---- declaration collection ----

    fn collect_types(&mut self, programs: &[&ast::Program]) -> Result<()> {
        // first pass: register names and parameter lists
        for prog in programs {
            for decl in &prog.decls {
                let (name, params, site) = match decl {
                    ast::Decl::Struct(s) => (&s.name, &s.type_params, s.name.site),
                    ast::Decl::Enum(e) => (&e.name, &e.type_params, e.name.site),
                    _ => continue,
                };
                let def = TypeDef {
                    name: name.name.clone(),
                    params: params.iter().map(|p| p.name.clone()).collect(),
                    kind: TypeDefKind::Struct { fields: Vec::new() },
                    site,
                };
                if self.defs.insert(def).is_none() {
                    return Err(CompileError::type_(
                        name.site,
                        format!("duplicate type name '{}'", name.name),
                    ));
                }
            }
        }

        // second pass: resolve field types
        for prog in programs {
            for decl in &prog.decls {
                match decl {
                    ast::Decl::Struct(s) => {
                        let id = self.defs.lookup(&s.name.name).unwrap();
                        let tparams = self.param_scope(&s.type_params);
                        let mut fields = Vec::new();
                        for (fname, fty) in &s.fields {
                            let ty = self.resolve_type(fty, &tparams)?;
                            self.require_data(&ty, fty.site)?;
                            fields.push((fname.name.clone(), ty));
                        }
                        self.defs.defs[id].kind = TypeDefKind::Struct { fields };
                    }
                    ast::Decl::Enum(e) => {
                        let id = self.defs.lookup(&e.name.name).unwrap();
                        let tparams = self.param_scope(&e.type_params);
                        let mut variants = Vec::new();
                        for v in &e.variants {
                            if variants
                                .iter()
                                .any(|x: &VariantDef| x.name == v.name.name)
                            {
                                return Err(CompileError::type_(
                                    v.name.site,
                                    format!("duplicate variant '{}'", v.name.name),
                                ));
                            }
                            let mut fields = Vec::new();
                            for (fname, fty) in &v.fields {
                                let ty = self.resolve_type(fty, &tparams)?;
                                self.require_data(&ty, fty.site)?;
                                fields.push((fname.name.clone(), ty));
                            }
                            variants.push(VariantDef {
                                name: v.name.name.clone(),
                                fields,
                            });
                        }
                        self.defs.defs[id].kind = TypeDefKind::Enum { variants };
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    // Every function and constant gets a unique declaration rank; a body can
    // only reach items of lower rank (or itself, for recursion), which makes
    // the binding order in the lowered program a plain sort. Inside an impl,
    // constants rank before methods.
    fn collect_templates(&mut self, programs: &[&ast::Program]) -> Result<()> {
        let mut pos = 0usize;
        for prog in programs {
            for decl in &prog.decls {
                match decl {
                    ast::Decl::Func(f) => {
                        pos += 1;
                        self.add_template(
                            f.name.name.clone(),
                            Template {
                                pos,
                                decl: f.clone(),
                                self_decl: None,
                                impl_params: Vec::new(),
                            },
                            f.name.site,
                        )?;
                    }
                    ast::Decl::Const(c) => {
                        pos += 1;
                        self.const_templates.push(ConstTemplate {
                            pos,
                            key: c.name.name.clone(),
                            decl: c.clone(),
                            self_decl: None,
                        });
                    }
                    ast::Decl::Impl(imp) => {
                        let target = self.defs.lookup(&imp.target.name).ok_or_else(|| {
                            CompileError::reference(
                                imp.target.site,
                                format!("impl target '{}' is not a type", imp.target.name),
                            )
                        })?;
                        let want = self.defs.get(target).params.len();
                        if imp.type_params.len() != want {
                            return Err(CompileError::type_(
                                imp.target.site,
                                format!(
                                    "impl for '{}' takes {} type parameter(s)",
                                    imp.target.name, want
                                ),
                            ));
                        }
                        let impl_params: Vec<String> =
                            imp.type_params.iter().map(|p| p.name.clone()).collect();
                        for c in &imp.consts {
                            if want != 0 {
                                return Err(CompileError::type_(
                                    c.name.site,
                                    "associated constants on generic types are not supported",
                                ));
                            }
                            pos += 1;
                            self.const_templates.push(ConstTemplate {
                                pos,
                                key: format!("{}::{}", imp.target.name, c.name.name),
                                decl: c.clone(),
                                self_decl: Some(target),
                            });
                        }
                        for m in &imp.methods {
                            if !m.type_params.is_empty() {
                                return Err(CompileError::type_(
                                    m.name.site,
                                    "impl functions cannot take their own type parameters",
                                ));
                            }
                            pos += 1;
                            self.add_template(
                                format!("{}::{}", imp.target.name, m.name.name),
                                Template {
                                    pos,
                                    decl: m.clone(),
                                    self_decl: Some(target),
                                    impl_params: impl_params.clone(),
                                },
                                m.name.site,
                            )?;
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn add_template(&mut self, key: String, tpl: Template, site: Site) -> Result<()> {
        if self.templates.contains_key(&key) {
            return Err(CompileError::type_(
                site,
                format!("duplicate function '{}'", key),
            ));
        }
        self.templates.insert(key, tpl);
        Ok(())
    }

    fn check_consts(&mut self) -> Result<()> {
        for i in 0..self.const_templates.len() {
            let tpl = self.const_templates[i].clone();
            let empty = BTreeMap::new();
            let ty = self.resolve_type(&tpl.decl.ty, &empty)?;
            self.pos_stack.push(tpl.pos);
            let mut scope = Scope::new();
            let value = self.check_expr(&tpl.decl.value, &mut scope, &empty)?;
            self.pos_stack.pop();
            if !types_match(&ty, &value.ty) {
                return Err(CompileError::type_(
                    tpl.decl.value.site,
                    format!(
                        "constant '{}' is declared {} but its value is {}",
                        tpl.key,
                        ty.show(&self.defs),
                        value.ty.show(&self.defs)
                    ),
                ));
            }
            let id = self.consts.len();
            self.consts.push(TConst {
                name: tpl.key.clone(),
                pos: tpl.pos,
                ty,
                value,
                site: tpl.decl.name.site,
            });
            self.const_ix.insert(tpl.key, id);
        }
        Ok(())
    }

    fn check_main(&mut self, prog: &ast::Program) -> Result<FuncId> {
        let site = prog.name.site;
        let tpl = self.templates.get("main").cloned().ok_or_else(|| {
            CompileError::reference(site, "script has no 'main' function")
        })?;
        if !tpl.decl.type_params.is_empty() {
            return Err(CompileError::type_(
                tpl.decl.name.site,
                "'main' cannot be generic",
            ));
        }

        let id = self.instantiate("main", Vec::new(), site)?;
        let (params, ret): (Vec<Type>, Type) = {
            let f = &self.funcs[id];
            (f.params.iter().map(|(_, t)| t.clone()).collect(), f.ret.clone())
        };

        for (i, p) in params.iter().enumerate() {
            if !p.is_data() {
                return Err(CompileError::type_(
                    tpl.decl.params[i].1.site,
                    "'main' parameters must be serializable data types",
                ));
            }
        }

        let want_params = match prog.purpose {
            Purpose::Testing => params.len(),
            Purpose::Spending => 3,
            Purpose::Minting => 2,
            Purpose::Staking => 1,
            Purpose::Module => unreachable!("modules have no entry point"),
        };
        if params.len() != want_params {
            return Err(CompileError::type_(
                tpl.decl.name.site,
                format!(
                    "a {} script's 'main' takes {} parameter(s)",
                    match prog.purpose {
                        Purpose::Spending => "spending",
                        Purpose::Minting => "minting",
                        Purpose::Staking => "staking",
                        _ => "testing",
                    },
                    want_params
                ),
            ));
        }
        match prog.purpose {
            Purpose::Testing => {
                if !ret.is_data() {
                    return Err(CompileError::type_(
                        tpl.decl.ret.site,
                        "'main' must return a serializable data type",
                    ));
                }
            }
            _ => {
                if !types_match(&ret, &Type::Bool) {
                    return Err(CompileError::type_(
                        tpl.decl.ret.site,
                        "a validator's 'main' must return Bool",
                    ));
                }
            }
        }
        Ok(id)
    }

    // ---- type resolution ----

    fn param_scope(&self, params: &[ast::Ident]) -> BTreeMap<String, Type> {
        params
            .iter()
            .map(|p| (p.name.clone(), Type::Param(p.name.clone())))
            .collect()
    }

    fn require_data(&self, ty: &Type, site: Site) -> Result<()> {
        // parameters stand for data types; instantiation re-checks
        if ty.contains_params() || ty.is_data() {
            Ok(())
        } else {
            Err(CompileError::type_(
                site,
                format!("{} is not a serializable data type", ty.show(&self.defs)),
            ))
        }
    }

    fn resolve_type(
        &self,
        te: &ast::TypeExpr,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<Type> {
        match &te.kind {
            ast::TypeExprKind::List(e) => Ok(Type::list(self.resolve_type(e, tparams)?)),
            ast::TypeExprKind::Map(k, v) => Ok(Type::map(
                self.resolve_type(k, tparams)?,
                self.resolve_type(v, tparams)?,
            )),
            ast::TypeExprKind::Tuple(a, b) => Ok(Type::Tuple(
                self.resolve_type(a, tparams)?.into(),
                self.resolve_type(b, tparams)?.into(),
            )),
            ast::TypeExprKind::Func(params, ret) => Ok(Type::func(
                params
                    .iter()
                    .map(|p| self.resolve_type(p, tparams))
                    .collect::<Result<Vec<_>>>()?,
                self.resolve_type(ret, tparams)?,
            )),
            ast::TypeExprKind::Named { name, args } => {
                if let Some(t) = tparams.get(&name.name) {
                    if !args.is_empty() {
                        return Err(CompileError::type_(
                            te.site,
                            "type parameters take no arguments",
                        ));
                    }
                    return Ok(t.clone());
                }
                let prim = match name.name.as_str() {
                    "Int" => Some(Type::Int),
                    "Bool" => Some(Type::Bool),
                    "String" => Some(Type::Str),
                    "ByteArray" => Some(Type::Bytes),
                    "Data" => Some(Type::AnyData),
                    _ => None,
                };
                if let Some(p) = prim {
                    if !args.is_empty() {
                        return Err(CompileError::type_(
                            te.site,
                            format!("{} takes no type arguments", name.name),
                        ));
                    }
                    return Ok(p);
                }
                let decl = self.defs.lookup(&name.name).ok_or_else(|| {
                    CompileError::reference(
                        name.site,
                        format!("undefined type '{}'", name.name),
                    )
                })?;
                let want = self.defs.get(decl).params.len();
                if args.len() != want {
                    return Err(CompileError::type_(
                        te.site,
                        format!(
                            "'{}' takes {} type argument(s), got {}",
                            name.name,
                            want,
                            args.len()
                        ),
                    ));
                }
                let args = args
                    .iter()
                    .map(|a| self.resolve_type(a, tparams))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Type::named(decl, args))
            }
        }
    }

    // ---- monomorphisation ----

    fn instantiate(&mut self, key: &str, targs: Vec<Type>, call_site: Site) -> Result<FuncId> {
        let targs: Vec<Type> = targs.iter().map(Type::widen).collect();
        let tpl = self
            .templates
            .get(key)
            .cloned()
            .ok_or_else(|| {
                CompileError::reference(call_site, format!("undefined function '{}'", key))
            })?;

        if let Some(&cur) = self.pos_stack.last() {
            if tpl.pos > cur {
                return Err(CompileError::reference(
                    call_site,
                    format!("'{}' is used before its definition", key),
                ));
            }
        }

        let own_params: Vec<String> = tpl
            .decl
            .type_params
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let all_params: Vec<String> = tpl
            .impl_params
            .iter()
            .cloned()
            .chain(own_params.iter().cloned())
            .collect();
        if targs.len() != all_params.len() {
            return Err(CompileError::type_(
                call_site,
                format!(
                    "'{}' takes {} type argument(s), got {}",
                    key,
                    all_params.len(),
                    targs.len()
                ),
            ));
        }

        let mono_key = (key.to_string(), targs.clone());
        if let Some(&id) = self.mono.get(&mono_key) {
            // a hit on an instance still being checked is a recursive call
            if self
                .in_progress
                .iter()
                .any(|(k, a, _)| k == key && *a == targs)
            {
                self.funcs[id].recursive = true;
            }
            return Ok(id);
        }

        // same template in progress with different arguments: the chain of
        // instantiations would never close
        if self.in_progress.iter().any(|(k, a, _)| k == key && *a != targs) {
            return Err(CompileError::type_(
                call_site,
                format!("monomorphisation cycle while instantiating '{}'", key),
            ));
        }
        if self.in_progress.len() >= MAX_MONO_DEPTH {
            return Err(CompileError::type_(
                call_site,
                "monomorphisation recursion limit exceeded",
            ));
        }

        let tmap: BTreeMap<String, Type> = all_params
            .iter()
            .cloned()
            .zip(targs.iter().cloned())
            .collect();

        let mut params: Vec<(String, Type)> = Vec::new();
        if tpl.decl.takes_self {
            let decl = tpl.self_decl.expect("self implies an impl target");
            let self_args: Vec<Type> = tpl
                .impl_params
                .iter()
                .map(|p| tmap[p].clone())
                .collect();
            params.push(("self".to_string(), Type::named(decl, self_args)));
        }
        for (pn, pt) in &tpl.decl.params {
            params.push((pn.name.clone(), self.resolve_type(pt, &tmap)?));
        }
        let ret = self.resolve_type(&tpl.decl.ret, &tmap)?;

        let mut name = key.to_string();
        if !targs.is_empty() {
            name = format!(
                "{}[{}]",
                name,
                targs
                    .iter()
                    .map(|t| t.show(&self.defs))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let id = self.funcs.len();
        self.funcs.push(TFunc {
            name,
            pos: tpl.pos,
            params: params.clone(),
            ret: ret.clone(),
            // placeholder body, replaced below
            body: TExpr {
                kind: TExprKind::BoolLit(false),
                ty: Type::Bool,
                site: tpl.decl.site,
            },
            recursive: false,
            site: tpl.decl.site,
        });
        self.mono.insert(mono_key, id);
        self.in_progress.push((key.to_string(), targs, id));
        self.pos_stack.push(tpl.pos);

        let mut scope = Scope::new();
        for (pn, pt) in &params {
            scope.push(pn, pt.clone());
        }
        let body = self.check_expr(&tpl.decl.body, &mut scope, &tmap);
        self.pos_stack.pop();
        self.in_progress.pop();
        let body = body?;

        if !types_match(&ret, &body.ty) {
            return Err(CompileError::type_(
                tpl.decl.body.site,
                format!(
                    "'{}' declares return type {} but its body is {}",
                    key,
                    ret.show(&self.defs),
                    body.ty.show(&self.defs)
                ),
            ));
        }
        self.funcs[id].body = body;
        Ok(id)
    }

    fn func_value_ty(&self, id: FuncId) -> Type {
        let f = &self.funcs[id];
        Type::func(f.params.iter().map(|(_, t)| t.clone()).collect(), f.ret.clone())
    }

    // ---- type-argument inference ----

    fn unify(pat: &Type, actual: &Type, out: &mut BTreeMap<String, Type>) -> bool {
        match (pat, actual) {
            (Type::Param(p), a) => match out.get(p) {
                Some(bound) => types_match(bound, &a.widen()),
                None => {
                    out.insert(p.clone(), a.widen());
                    true
                }
            },
            (Type::List(a), Type::List(b)) => Self::unify(a, b, out),
            (Type::Map(k1, v1), Type::Map(k2, v2)) => {
                Self::unify(k1, k2, out) && Self::unify(v1, v2, out)
            }
            (Type::Tuple(a1, b1), Type::Tuple(a2, b2)) => {
                Self::unify(a1, a2, out) && Self::unify(b1, b2, out)
            }
            (Type::Func(s1), Type::Func(s2)) => {
                s1.params.len() == s2.params.len()
                    && s1
                        .params
                        .iter()
                        .zip(&s2.params)
                        .all(|(x, y)| Self::unify(x, y, out))
                    && Self::unify(&s1.ret, &s2.ret, out)
            }
            (
                Type::Named { decl: d1, args: a1, .. },
                Type::Named { decl: d2, args: a2, .. },
            ) => {
                d1 == d2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| Self::unify(x, y, out))
            }
            (_, Type::Bottom) => true,
            (a, b) => types_match(a, b),
        }
    }

    fn infer_targs(
        &mut self,
        key: &str,
        args: &[TExpr],
        call_site: Site,
    ) -> Result<Vec<Type>> {
        let tpl = self.templates.get(key).cloned().ok_or_else(|| {
            CompileError::reference(call_site, format!("undefined function '{}'", key))
        })?;
        let own: Vec<String> = tpl
            .decl
            .type_params
            .iter()
            .map(|p| p.name.clone())
            .collect();
        if own.is_empty() {
            return Ok(Vec::new());
        }
        let pscope: BTreeMap<String, Type> = own
            .iter()
            .map(|p| (p.clone(), Type::Param(p.clone())))
            .collect();
        let mut bound = BTreeMap::new();
        for (i, (_, pt)) in tpl.decl.params.iter().enumerate() {
            let Some(arg) = args.get(i) else { break };
            let pat = self.resolve_type(pt, &pscope)?;
            Self::unify(&pat, &arg.ty, &mut bound);
        }
        own.iter()
            .map(|p| {
                bound.get(p).cloned().ok_or_else(|| {
                    CompileError::type_(
                        call_site,
                        format!("cannot infer type argument '{}' of '{}'", p, key),
                    )
                })
            })
            .collect()
    }

    // ---- expressions ----

    fn expect_ty(&self, e: &TExpr, want: &Type) -> Result<()> {
        if types_match(want, &e.ty) {
            Ok(())
        } else {
            Err(CompileError::type_(
                e.site,
                format!(
                    "expected {}, got {}",
                    want.show(&self.defs),
                    e.ty.show(&self.defs)
                ),
            ))
        }
    }

    fn check_exprs(
        &mut self,
        es: &[ast::Expr],
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<Vec<TExpr>> {
        es.iter()
            .map(|e| self.check_expr(e, scope, tparams))
            .collect()
    }

    fn check_expr(
        &mut self,
        e: &ast::Expr,
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        let site = e.site;
        match &e.kind {
            ast::ExprKind::IntLit(z) => Ok(TExpr {
                kind: TExprKind::IntLit(z.clone()),
                ty: Type::Int,
                site,
            }),
            ast::ExprKind::BoolLit(b) => Ok(TExpr {
                kind: TExprKind::BoolLit(*b),
                ty: Type::Bool,
                site,
            }),
            ast::ExprKind::StrLit(s) => Ok(TExpr {
                kind: TExprKind::StrLit(s.clone()),
                ty: Type::Str,
                site,
            }),
            ast::ExprKind::BytesLit(b) => Ok(TExpr {
                kind: TExprKind::BytesLit(b.clone()),
                ty: Type::Bytes,
                site,
            }),
            ast::ExprKind::ListLit { elem_ty, items } => {
                let elem = self.resolve_type(elem_ty, tparams)?;
                self.require_data(&elem, elem_ty.site)?;
                let items = self.check_exprs(items, scope, tparams)?;
                for it in &items {
                    self.expect_ty(it, &elem)?;
                }
                Ok(TExpr {
                    kind: TExprKind::ListLit(items),
                    ty: Type::list(elem),
                    site,
                })
            }
            ast::ExprKind::MapLit {
                key_ty,
                val_ty,
                entries,
            } => {
                let k = self.resolve_type(key_ty, tparams)?;
                let v = self.resolve_type(val_ty, tparams)?;
                self.require_data(&k, key_ty.site)?;
                self.require_data(&v, val_ty.site)?;
                let mut out = Vec::new();
                for (ke, ve) in entries {
                    let tk = self.check_expr(ke, scope, tparams)?;
                    let tv = self.check_expr(ve, scope, tparams)?;
                    self.expect_ty(&tk, &k)?;
                    self.expect_ty(&tv, &v)?;
                    out.push((tk, tv));
                }
                Ok(TExpr {
                    kind: TExprKind::MapLit(out),
                    ty: Type::map(k, v),
                    site,
                })
            }
            ast::ExprKind::Name(id) => self.check_name(id, scope),
            ast::ExprKind::Unary { op, operand } => {
                let x = self.check_expr(operand, scope, tparams)?;
                let (m, ty) = match op {
                    UnaryOp::Neg => {
                        self.expect_ty(&x, &Type::Int)?;
                        (Member::IntNeg, Type::Int)
                    }
                    UnaryOp::Not => {
                        self.expect_ty(&x, &Type::Bool)?;
                        (Member::BoolNot, Type::Bool)
                    }
                };
                Ok(TExpr {
                    kind: TExprKind::Member {
                        m,
                        recv: Box::new(x),
                        args: Vec::new(),
                    },
                    ty,
                    site,
                })
            }
            ast::ExprKind::Binary { op, lhs, rhs } => {
                self.check_binary(*op, lhs, rhs, site, scope, tparams)
            }
            ast::ExprKind::Call { f, type_args, args } => {
                self.check_call(f, type_args, args, site, scope, tparams)
            }
            ast::ExprKind::Member { obj, name } => {
                let recv = self.check_expr(obj, scope, tparams)?;
                self.check_property(recv, name, site)
            }
            ast::ExprKind::Path {
                ty_name,
                ty_args,
                member,
            } => self.check_path(ty_name, ty_args, member, site, tparams),
            ast::ExprKind::Construct {
                ty_name,
                ty_args,
                variant,
                args,
            } => self.check_construct(ty_name, ty_args, variant.as_ref(), args, site, scope, tparams),
            ast::ExprKind::If { cond, then_, else_ } => {
                let c = self.check_expr(cond, scope, tparams)?;
                self.expect_ty(&c, &Type::Bool)?;
                let t = self.check_expr(then_, scope, tparams)?;
                let f = self.check_expr(else_, scope, tparams)?;
                if !types_match(&t.ty, &f.ty) {
                    return Err(CompileError::type_(
                        site,
                        format!(
                            "if branches disagree: {} vs {}",
                            t.ty.show(&self.defs),
                            f.ty.show(&self.defs)
                        ),
                    ));
                }
                let ty = join_types(&t.ty, &f.ty);
                Ok(TExpr {
                    kind: TExprKind::If {
                        cond: Box::new(c),
                        then_: Box::new(t),
                        else_: Box::new(f),
                    },
                    ty,
                    site,
                })
            }
            ast::ExprKind::Switch {
                scrutinee,
                arms,
                default,
            } => self.check_switch(scrutinee, arms, default.as_deref(), site, scope, tparams),
            ast::ExprKind::Let {
                name,
                ty,
                value,
                body,
            } => {
                let v = self.check_expr(value, scope, tparams)?;
                if let Some(ann) = ty {
                    let want = self.resolve_type(ann, tparams)?;
                    self.expect_ty(&v, &want)?;
                }
                let depth = scope.len();
                scope.push(&name.name, v.ty.clone());
                let b = self.check_expr(body, scope, tparams);
                scope.truncate(depth);
                let b = b?;
                let ty = b.ty.clone();
                Ok(TExpr {
                    kind: TExprKind::Let {
                        name: name.name.clone(),
                        value: Box::new(v),
                        body: Box::new(b),
                    },
                    ty,
                    site,
                })
            }
            ast::ExprKind::Lambda { params, ret, body } => {
                let mut tps = Vec::new();
                for (pn, pt) in params {
                    tps.push((pn.name.clone(), self.resolve_type(pt, tparams)?));
                }
                let want = self.resolve_type(ret, tparams)?;
                let depth = scope.len();
                for (pn, pt) in &tps {
                    scope.push(pn, pt.clone());
                }
                let b = self.check_expr(body, scope, tparams);
                scope.truncate(depth);
                let b = b?;
                self.expect_ty(&b, &want)?;
                let ty = Type::func(tps.iter().map(|(_, t)| t.clone()).collect(), want);
                Ok(TExpr {
                    kind: TExprKind::Lambda {
                        params: tps,
                        body: Box::new(b),
                    },
                    ty,
                    site,
                })
            }
        }
    }

    fn check_name(&mut self, id: &ast::Ident, scope: &mut Scope) -> Result<TExpr> {
        let site = id.site;
        if let Some(ty) = scope.lookup(&id.name) {
            return Ok(TExpr {
                kind: TExprKind::Local(id.name.clone()),
                ty: ty.clone(),
                site,
            });
        }
        if let Some(&cid) = self.const_ix.get(&id.name) {
            return Ok(TExpr {
                kind: TExprKind::ConstRef(cid),
                ty: self.consts[cid].ty.clone(),
                site,
            });
        }
        if self
            .const_templates
            .iter()
            .any(|c| c.key == id.name && !self.const_ix.contains_key(&id.name))
        {
            return Err(CompileError::reference(
                site,
                format!("'{}' is used before its definition", id.name),
            ));
        }
        if let Some(tpl) = self.templates.get(&id.name) {
            if !tpl.decl.type_params.is_empty() {
                return Err(CompileError::type_(
                    site,
                    format!("'{}' is generic; give its type arguments", id.name),
                ));
            }
            let fid = self.instantiate(&id.name, Vec::new(), site)?;
            return Ok(TExpr {
                kind: TExprKind::FuncRef(fid),
                ty: self.func_value_ty(fid),
                site,
            });
        }
        Err(CompileError::reference(
            site,
            format!("undefined name '{}'", id.name),
        ))
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        site: Site,
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        let l = self.check_expr(lhs, scope, tparams)?;
        let r = self.check_expr(rhs, scope, tparams)?;

        let member = |m: Member, recv: TExpr, arg: TExpr, ty: Type| TExpr {
            kind: TExprKind::Member {
                m,
                recv: Box::new(recv),
                args: vec![arg],
            },
            ty,
            site,
        };

        match op {
            BinOp::And | BinOp::Or => {
                self.expect_ty(&l, &Type::Bool)?;
                self.expect_ty(&r, &Type::Bool)?;
                let m = if op == BinOp::And {
                    Member::BoolAnd
                } else {
                    Member::BoolOr
                };
                Ok(member(m, l, r, Type::Bool))
            }
            BinOp::Eq | BinOp::Ne => {
                if !types_match(&l.ty, &r.ty) {
                    return Err(CompileError::type_(
                        site,
                        format!(
                            "cannot compare {} with {}",
                            l.ty.show(&self.defs),
                            r.ty.show(&self.defs)
                        ),
                    ));
                }
                let m = match l.ty.widen() {
                    Type::Int => Member::IntEq,
                    Type::Str => Member::StrEq,
                    Type::Bytes => Member::BytesEq,
                    Type::Bool => Member::BoolEq,
                    t if t.is_data() => Member::DataEq,
                    t => {
                        return Err(CompileError::type_(
                            site,
                            format!("{} has no equality", t.show(&self.defs)),
                        ))
                    }
                };
                let eq = member(m, l, r, Type::Bool);
                if op == BinOp::Eq {
                    Ok(eq)
                } else {
                    Ok(TExpr {
                        kind: TExprKind::Member {
                            m: Member::BoolNot,
                            recv: Box::new(eq),
                            args: Vec::new(),
                        },
                        ty: Type::Bool,
                        site,
                    })
                }
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if !types_match(&l.ty, &r.ty) {
                    return Err(CompileError::type_(
                        site,
                        "comparison operands must have the same type",
                    ));
                }
                let m = match (l.ty.widen(), op) {
                    (Type::Int, BinOp::Lt) => Member::IntLt,
                    (Type::Int, BinOp::Le) => Member::IntLe,
                    (Type::Int, BinOp::Gt) => Member::IntGt,
                    (Type::Int, BinOp::Ge) => Member::IntGe,
                    (Type::Bytes, BinOp::Lt) => Member::BytesLt,
                    (Type::Bytes, BinOp::Le) => Member::BytesLe,
                    (Type::Bytes, BinOp::Gt) => Member::BytesGt,
                    (Type::Bytes, BinOp::Ge) => Member::BytesGe,
                    (t, _) => {
                        return Err(CompileError::type_(
                            site,
                            format!("{} has no ordering", t.show(&self.defs)),
                        ))
                    }
                };
                Ok(member(m, l, r, Type::Bool))
            }
            BinOp::Add => match l.ty.widen() {
                Type::Int => {
                    self.expect_ty(&r, &Type::Int)?;
                    Ok(member(Member::IntAdd, l, r, Type::Int))
                }
                Type::Str => {
                    self.expect_ty(&r, &Type::Str)?;
                    Ok(member(Member::StrAdd, l, r, Type::Str))
                }
                Type::Bytes => {
                    self.expect_ty(&r, &Type::Bytes)?;
                    Ok(member(Member::BytesAdd, l, r, Type::Bytes))
                }
                Type::List(_) => {
                    self.expect_ty(&r, &l.ty)?;
                    let ty = l.ty.clone();
                    Ok(member(Member::ListConcat, l, r, ty))
                }
                Type::Named { decl, args, .. } => {
                    self.method_operator(decl, args, "add", l, r, site)
                }
                t => Err(CompileError::type_(
                    site,
                    format!("cannot add values of type {}", t.show(&self.defs)),
                )),
            },
            BinOp::Sub => match l.ty.widen() {
                Type::Int => {
                    self.expect_ty(&r, &Type::Int)?;
                    Ok(member(Member::IntSub, l, r, Type::Int))
                }
                Type::Named { decl, args, .. } => {
                    self.method_operator(decl, args, "sub", l, r, site)
                }
                t => Err(CompileError::type_(
                    site,
                    format!("cannot subtract values of type {}", t.show(&self.defs)),
                )),
            },
            BinOp::Mul | BinOp::Div | BinOp::Mod => {
                self.expect_ty(&l, &Type::Int)?;
                self.expect_ty(&r, &Type::Int)?;
                let m = match op {
                    BinOp::Mul => Member::IntMul,
                    BinOp::Div => Member::IntDiv,
                    _ => Member::IntMod,
                };
                Ok(member(m, l, r, Type::Int))
            }
        }
    }

    fn method_operator(
        &mut self,
        decl: DeclId,
        args: Vec<Type>,
        method: &str,
        l: TExpr,
        r: TExpr,
        site: Site,
    ) -> Result<TExpr> {
        let tyname = self.defs.get(decl).name.clone();
        let key = format!("{}::{}", tyname, method);
        if !self.templates.contains_key(&key) {
            return Err(CompileError::type_(
                site,
                format!("'{}' does not implement '{}'", tyname, method),
            ));
        }
        let fid = self.instantiate(&key, args, site)?;
        let f = &self.funcs[fid];
        if f.params.len() != 2 {
            return Err(CompileError::type_(
                site,
                format!("'{}' must take exactly one operand", key),
            ));
        }
        self.expect_ty(&r, &f.params[1].1.clone())?;
        let ty = f.ret.clone();
        Ok(TExpr {
            kind: TExprKind::Call {
                f: Box::new(TExpr {
                    kind: TExprKind::FuncRef(fid),
                    ty: self.func_value_ty(fid),
                    site,
                }),
                args: vec![l, r],
            },
            ty,
            site,
        })
    }

    fn check_property(&mut self, recv: TExpr, name: &ast::Ident, site: Site) -> Result<TExpr> {
        let member = |m: Member, recv: TExpr, ty: Type| TExpr {
            kind: TExprKind::Member {
                m,
                recv: Box::new(recv),
                args: Vec::new(),
            },
            ty,
            site,
        };

        match (recv.ty.clone(), name.name.as_str()) {
            (Type::Bytes, "length") => Ok(member(Member::BytesLength, recv, Type::Int)),
            (Type::List(e), "length") => {
                let _ = e;
                Ok(member(Member::ListLength, recv, Type::Int))
            }
            (Type::List(_), "is_empty") => Ok(member(Member::ListIsEmpty, recv, Type::Bool)),
            (Type::List(e), "head") => {
                let t = (*e).clone();
                Ok(member(Member::ListHead, recv, t))
            }
            (Type::List(_), "tail") => {
                let t = recv.ty.clone();
                Ok(member(Member::ListTail, recv, t))
            }
            (Type::Map(_, _), "length") => Ok(member(Member::MapLength, recv, Type::Int)),
            (Type::Map(_, _), "is_empty") => Ok(member(Member::MapIsEmpty, recv, Type::Bool)),
            (Type::Map(k, v), "head") => {
                let t = Type::Tuple(k, v);
                Ok(member(Member::MapHead, recv, t))
            }
            (Type::Tuple(a, _), "first") => {
                let t = (*a).clone();
                Ok(member(Member::TupleFirst, recv, t))
            }
            (Type::Tuple(_, b), "second") => {
                let t = (*b).clone();
                Ok(member(Member::TupleSecond, recv, t))
            }
            (Type::Named { decl, args, variant }, fname) => {
                let def = self.defs.get(decl).clone();
                let fields = match (&def.kind, variant) {
                    (TypeDefKind::Struct { .. }, _) => def.fields_of(None, &args),
                    (TypeDefKind::Enum { .. }, Some(v)) => def.fields_of(Some(v), &args),
                    (TypeDefKind::Enum { .. }, None) => {
                        return Err(CompileError::type_(
                            site,
                            format!(
                                "switch over '{}' before accessing its fields",
                                def.name
                            ),
                        ))
                    }
                };
                let Some(index) = fields.iter().position(|(n, _)| n == fname) else {
                    return Err(CompileError::reference(
                        name.site,
                        format!("'{}' has no field '{}'", def.name, fname),
                    ));
                };
                let ty = fields[index].1.clone();
                Ok(TExpr {
                    kind: TExprKind::FieldGet {
                        recv: Box::new(recv),
                        index,
                    },
                    ty,
                    site,
                })
            }
            (t, n) => Err(CompileError::reference(
                name.site,
                format!("{} has no member '{}'", t.show(&self.defs), n),
            )),
        }
    }

    fn check_path(
        &mut self,
        ty_name: &ast::Ident,
        ty_args: &[ast::TypeExpr],
        member: &ast::Ident,
        site: Site,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        let targs = ty_args
            .iter()
            .map(|a| self.resolve_type(a, tparams))
            .collect::<Result<Vec<_>>>()?;

        if let Some(decl) = self.defs.lookup(&ty_name.name) {
            // unit enum variant
            if let Some(v) = self.defs.variant_index(decl, &member.name) {
                let def = self.defs.get(decl);
                if def.params.len() != targs.len() {
                    return Err(CompileError::type_(
                        site,
                        format!(
                            "'{}' takes {} type argument(s)",
                            ty_name.name,
                            def.params.len()
                        ),
                    ));
                }
                let fields = def.fields_of(Some(v), &targs);
                if !fields.is_empty() {
                    return Err(CompileError::type_(
                        site,
                        format!(
                            "variant '{}::{}' has fields; construct it with braces",
                            ty_name.name, member.name
                        ),
                    ));
                }
                return Ok(TExpr {
                    kind: TExprKind::Construct {
                        decl,
                        tag: v as u64,
                        args: Vec::new(),
                    },
                    ty: Type::named(decl, targs),
                    site,
                });
            }

            // associated constant
            let key = format!("{}::{}", ty_name.name, member.name);
            if let Some(&cid) = self.const_ix.get(&key) {
                return Ok(TExpr {
                    kind: TExprKind::ConstRef(cid),
                    ty: self.consts[cid].ty.clone(),
                    site,
                });
            }

            // static function reference
            if let Some(tpl) = self.templates.get(&key) {
                if tpl.decl.takes_self {
                    return Err(CompileError::type_(
                        site,
                        format!("'{}' is a method; call it on a value", key),
                    ));
                }
                let fid = self.instantiate(&key, targs, site)?;
                return Ok(TExpr {
                    kind: TExprKind::FuncRef(fid),
                    ty: self.func_value_ty(fid),
                    site,
                });
            }

            return Err(CompileError::reference(
                member.site,
                format!("'{}' has no member '{}'", ty_name.name, member.name),
            ));
        }

        Err(CompileError::reference(
            ty_name.site,
            format!("undefined type '{}'", ty_name.name),
        ))
    }

    fn check_construct(
        &mut self,
        ty_name: &ast::Ident,
        ty_args: &[ast::TypeExpr],
        variant: Option<&ast::Ident>,
        args: &[ast::Expr],
        site: Site,
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        let decl = self.defs.lookup(&ty_name.name).ok_or_else(|| {
            CompileError::reference(
                ty_name.site,
                format!("undefined type '{}'", ty_name.name),
            )
        })?;
        let def = self.defs.get(decl).clone();

        let tag = match (&def.kind, variant) {
            (TypeDefKind::Struct { .. }, None) => 0u64,
            (TypeDefKind::Struct { .. }, Some(v)) => {
                return Err(CompileError::type_(
                    v.site,
                    format!("'{}' is a struct, not an enum", def.name),
                ))
            }
            (TypeDefKind::Enum { .. }, Some(v)) => {
                self.defs.variant_index(decl, &v.name).ok_or_else(|| {
                    CompileError::reference(
                        v.site,
                        format!("'{}' has no variant '{}'", def.name, v.name),
                    )
                })? as u64
            }
            (TypeDefKind::Enum { .. }, None) => {
                return Err(CompileError::type_(
                    site,
                    format!("construct '{}' through one of its variants", def.name),
                ))
            }
        };
        let vix = match &def.kind {
            TypeDefKind::Enum { .. } => Some(tag as usize),
            _ => None,
        };

        let targs = ty_args
            .iter()
            .map(|a| self.resolve_type(a, tparams))
            .collect::<Result<Vec<_>>>()?;
        let args = self.check_exprs(args, scope, tparams)?;

        let targs = if def.params.is_empty() {
            Vec::new()
        } else if !targs.is_empty() {
            if targs.len() != def.params.len() {
                return Err(CompileError::type_(
                    site,
                    format!("'{}' takes {} type argument(s)", def.name, def.params.len()),
                ));
            }
            targs
        } else {
            // infer from field values; declaration fields already carry
            // `Param` placeholders
            let pattern = match (&def.kind, vix) {
                (TypeDefKind::Struct { fields }, _) => fields.clone(),
                (TypeDefKind::Enum { variants }, Some(v)) => variants[v].fields.clone(),
                _ => unreachable!(),
            };
            let mut bound = BTreeMap::new();
            for (i, (_, ft)) in pattern.iter().enumerate() {
                if let Some(a) = args.get(i) {
                    Self::unify(ft, &a.ty, &mut bound);
                }
            }
            def.params
                .iter()
                .map(|p| {
                    bound.get(p).cloned().ok_or_else(|| {
                        CompileError::type_(
                            site,
                            format!("cannot infer type argument '{}' of '{}'", p, def.name),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        let fields = def.fields_of(vix, &targs);
        if args.len() != fields.len() {
            return Err(CompileError::type_(
                site,
                format!(
                    "'{}' takes {} field value(s), got {}",
                    def.name,
                    fields.len(),
                    args.len()
                ),
            ));
        }
        for (a, (_, ft)) in args.iter().zip(&fields) {
            self.expect_ty(a, ft)?;
        }

        Ok(TExpr {
            kind: TExprKind::Construct { decl, tag, args },
            ty: Type::named(decl, targs),
            site,
        })
    }

    fn check_switch(
        &mut self,
        scrutinee: &ast::Expr,
        arms: &[ast::SwitchArm],
        default: Option<&ast::Expr>,
        site: Site,
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        let scrut = self.check_expr(scrutinee, scope, tparams)?;
        let (decl, targs) = match scrut.ty.widen() {
            Type::Named { decl, args, .. } => match &self.defs.get(decl).kind {
                TypeDefKind::Enum { .. } => (decl, args),
                _ => {
                    return Err(CompileError::type_(
                        scrut.site,
                        "switch expects an enum value",
                    ))
                }
            },
            t => {
                return Err(CompileError::type_(
                    scrut.site,
                    format!("switch expects an enum value, got {}", t.show(&self.defs)),
                ))
            }
        };
        let variant_count = match &self.defs.get(decl).kind {
            TypeDefKind::Enum { variants } => variants.len(),
            _ => unreachable!(),
        };

        let mut tarms: Vec<TArm> = Vec::new();
        let mut result_ty: Option<Type> = None;
        for arm in arms {
            let v = self
                .defs
                .variant_index(decl, &arm.variant.name)
                .ok_or_else(|| {
                    CompileError::reference(
                        arm.variant.site,
                        format!(
                            "'{}' has no variant '{}'",
                            self.defs.get(decl).name,
                            arm.variant.name
                        ),
                    )
                })?;
            if tarms.iter().any(|a| a.variant == v) {
                return Err(CompileError::type_(
                    arm.variant.site,
                    format!("duplicate case '{}'", arm.variant.name),
                ));
            }
            let depth = scope.len();
            if let Some(b) = &arm.binder {
                scope.push(
                    &b.name,
                    Type::Named {
                        decl,
                        args: targs.clone(),
                        variant: Some(v),
                    },
                );
            }
            let body = self.check_expr(&arm.body, scope, tparams);
            scope.truncate(depth);
            let body = body?;
            result_ty = Some(match result_ty {
                None => body.ty.clone(),
                Some(prev) => {
                    if !types_match(&prev, &body.ty) {
                        return Err(CompileError::type_(
                            body.site,
                            format!(
                                "switch arms disagree: {} vs {}",
                                prev.show(&self.defs),
                                body.ty.show(&self.defs)
                            ),
                        ));
                    }
                    join_types(&prev, &body.ty)
                }
            });
            tarms.push(TArm {
                variant: v,
                binder: arm.binder.as_ref().map(|b| b.name.clone()),
                body,
            });
        }

        let tdefault = match default {
            Some(d) => {
                if tarms.len() == variant_count {
                    return Err(CompileError::type_(
                        d.site,
                        "else arm is unreachable: every variant is covered",
                    ));
                }
                let body = self.check_expr(d, scope, tparams)?;
                if let Some(prev) = &result_ty {
                    if !types_match(prev, &body.ty) {
                        return Err(CompileError::type_(
                            body.site,
                            format!(
                                "switch arms disagree: {} vs {}",
                                prev.show(&self.defs),
                                body.ty.show(&self.defs)
                            ),
                        ));
                    }
                    result_ty = Some(join_types(prev, &body.ty));
                } else {
                    result_ty = Some(body.ty.clone());
                }
                Some(Box::new(body))
            }
            None => {
                if tarms.len() != variant_count {
                    return Err(CompileError::type_(
                        site,
                        "switch must cover every variant or end in an else arm",
                    ));
                }
                None
            }
        };

        Ok(TExpr {
            kind: TExprKind::Switch {
                scrutinee: Box::new(scrut),
                arms: tarms,
                default: tdefault,
            },
            ty: result_ty.unwrap_or(Type::Bottom),
            site,
        })
    }

    fn check_call(
        &mut self,
        f: &ast::Expr,
        type_args: &[ast::TypeExpr],
        args: &[ast::Expr],
        site: Site,
        scope: &mut Scope,
        tparams: &BTreeMap<String, Type>,
    ) -> Result<TExpr> {
        // global builtin functions
        if let ast::ExprKind::Name(id) = &f.kind {
            if scope.lookup(&id.name).is_none() {
                match id.name.as_str() {
                    "error" => {
                        if args.len() != 1 {
                            return Err(CompileError::type_(site, "error takes one message"));
                        }
                        let msg = self.check_expr(&args[0], scope, tparams)?;
                        if !matches!(msg.kind, TExprKind::StrLit(_)) {
                            return Err(CompileError::type_(
                                msg.site,
                                "the error message must be a string literal",
                            ));
                        }
                        return Ok(TExpr {
                            kind: TExprKind::Global {
                                g: GlobalFn::Error,
                                args: vec![msg],
                            },
                            ty: Type::Bottom,
                            site,
                        });
                    }
                    "assert" => {
                        if args.len() != 1 {
                            return Err(CompileError::type_(site, "assert takes one condition"));
                        }
                        let cond = self.check_expr(&args[0], scope, tparams)?;
                        self.expect_ty(&cond, &Type::Bool)?;
                        return Ok(TExpr {
                            kind: TExprKind::Global {
                                g: GlobalFn::Assert,
                                args: vec![cond],
                            },
                            ty: Type::Bool,
                            site,
                        });
                    }
                    "print" => {
                        if args.len() != 1 {
                            return Err(CompileError::type_(site, "print takes one message"));
                        }
                        let msg = self.check_expr(&args[0], scope, tparams)?;
                        self.expect_ty(&msg, &Type::Str)?;
                        return Ok(TExpr {
                            kind: TExprKind::Global {
                                g: GlobalFn::Print,
                                args: vec![msg],
                            },
                            ty: Type::Bool,
                            site,
                        });
                    }
                    _ => {}
                }
            }
        }

        // `T::from_data(d)` and static calls through paths
        if let ast::ExprKind::Path {
            ty_name,
            ty_args: path_targs,
            member,
        } = &f.kind
        {
            if member.name == "from_data" {
                let mut ty = None;
                if let Some(t) = self.primitive_ty(&ty_name.name) {
                    ty = Some(t);
                } else if self.defs.lookup(&ty_name.name).is_some() {
                    let targs = path_targs
                        .iter()
                        .map(|a| self.resolve_type(a, tparams))
                        .collect::<Result<Vec<_>>>()?;
                    let decl = self.defs.lookup(&ty_name.name).unwrap();
                    if self.defs.get(decl).params.len() != targs.len() {
                        return Err(CompileError::type_(
                            site,
                            format!(
                                "'{}' takes {} type argument(s)",
                                ty_name.name,
                                self.defs.get(decl).params.len()
                            ),
                        ));
                    }
                    ty = Some(Type::named(decl, targs));
                }
                if let Some(ty) = ty {
                    if args.len() != 1 {
                        return Err(CompileError::type_(site, "from_data takes one argument"));
                    }
                    let d = self.check_expr(&args[0], scope, tparams)?;
                    self.expect_ty(&d, &Type::AnyData)?;
                    return Ok(TExpr {
                        kind: TExprKind::Member {
                            m: Member::FromData,
                            recv: Box::new(d),
                            args: Vec::new(),
                        },
                        ty,
                        site,
                    });
                }
            }
        }

        // method calls
        if let ast::ExprKind::Member { obj, name } = &f.kind {
            let recv = self.check_expr(obj, scope, tparams)?;
            let args = self.check_exprs(args, scope, tparams)?;
            return self.check_method(recv, name, args, site);
        }

        // named function calls, with inference
        if let ast::ExprKind::Name(id) = &f.kind {
            if scope.lookup(&id.name).is_none() && self.templates.contains_key(&id.name) {
                let args = self.check_exprs(args, scope, tparams)?;
                let targs = if !type_args.is_empty() {
                    type_args
                        .iter()
                        .map(|a| self.resolve_type(a, tparams))
                        .collect::<Result<Vec<_>>>()?
                } else {
                    self.infer_targs(&id.name, &args, site)?
                };
                let fid = self.instantiate(&id.name, targs, id.site)?;
                return self.apply_func(fid, args, site);
            }
        }

        // everything else is a call of a function value
        let fv = self.check_expr(f, scope, tparams)?;
        let args = self.check_exprs(args, scope, tparams)?;
        let Type::Func(sig) = fv.ty.clone() else {
            return Err(CompileError::type_(
                fv.site,
                format!("{} is not callable", fv.ty.show(&self.defs)),
            ));
        };
        if sig.params.len() != args.len() {
            return Err(CompileError::type_(
                site,
                format!("expected {} argument(s), got {}", sig.params.len(), args.len()),
            ));
        }
        for (a, p) in args.iter().zip(&sig.params) {
            self.expect_ty(a, p)?;
        }
        Ok(TExpr {
            kind: TExprKind::Call {
                f: Box::new(fv),
                args,
            },
            ty: sig.ret.clone(),
            site,
        })
    }

    fn primitive_ty(&self, name: &str) -> Option<Type> {
        match name {
            "Int" => Some(Type::Int),
            "Bool" => Some(Type::Bool),
            "String" => Some(Type::Str),
            "ByteArray" => Some(Type::Bytes),
            "Data" => Some(Type::AnyData),
            _ => None,
        }
    }

    fn apply_func(&mut self, fid: FuncId, args: Vec<TExpr>, site: Site) -> Result<TExpr> {
        let (params, ret) = {
            let f = &self.funcs[fid];
            (f.params.clone(), f.ret.clone())
        };
        if params.len() != args.len() {
            return Err(CompileError::type_(
                site,
                format!("expected {} argument(s), got {}", params.len(), args.len()),
            ));
        }
        for (a, (_, p)) in args.iter().zip(&params) {
            self.expect_ty(a, p)?;
        }
        Ok(TExpr {
            kind: TExprKind::Call {
                f: Box::new(TExpr {
                    kind: TExprKind::FuncRef(fid),
                    ty: self.func_value_ty(fid),
                    site,
                }),
                args,
            },
            ty: ret,
            site,
        })
    }

    fn check_method(
        &mut self,
        recv: TExpr,
        name: &ast::Ident,
        args: Vec<TExpr>,
        site: Site,
    ) -> Result<TExpr> {
        let member = |m: Member, recv: TExpr, args: Vec<TExpr>, ty: Type| TExpr {
            kind: TExprKind::Member {
                m,
                recv: Box::new(recv),
                args,
            },
            ty,
            site,
        };
        let func1 = |sig_params: Vec<Type>, ret: Type| Type::func(sig_params, ret);

        let arity = |want: usize| -> Result<()> {
            if args.len() == want {
                Ok(())
            } else {
                Err(CompileError::type_(
                    site,
                    format!("'{}' takes {} argument(s), got {}", name.name, want, args.len()),
                ))
            }
        };

        // serialize is available on every data type
        if name.name == "serialize" && recv.ty.is_data() {
            arity(0)?;
            return Ok(member(Member::Serialize, recv, args, Type::Bytes));
        }

        match recv.ty.widen() {
            Type::Int => match name.name.as_str() {
                "show" => {
                    arity(0)?;
                    Ok(member(Member::IntShow, recv, args, Type::Str))
                }
                _ => Err(CompileError::reference(
                    name.site,
                    format!("Int has no method '{}'", name.name),
                )),
            },
            Type::Str => match name.name.as_str() {
                "encode_utf8" => {
                    arity(0)?;
                    Ok(member(Member::StrEncodeUtf8, recv, args, Type::Bytes))
                }
                _ => Err(CompileError::reference(
                    name.site,
                    format!("String has no method '{}'", name.name),
                )),
            },
            Type::Bytes => match name.name.as_str() {
                "show" => {
                    arity(0)?;
                    Ok(member(Member::BytesShow, recv, args, Type::Str))
                }
                "decode_utf8" => {
                    arity(0)?;
                    Ok(member(Member::BytesDecodeUtf8, recv, args, Type::Str))
                }
                "sha2" => {
                    arity(0)?;
                    Ok(member(Member::BytesSha2, recv, args, Type::Bytes))
                }
                "slice" => {
                    arity(2)?;
                    self.expect_ty(&args[0], &Type::Int)?;
                    self.expect_ty(&args[1], &Type::Int)?;
                    Ok(member(Member::BytesSlice, recv, args, Type::Bytes))
                }
                _ => Err(CompileError::reference(
                    name.site,
                    format!("ByteArray has no method '{}'", name.name),
                )),
            },
            Type::List(elem) => {
                let elem = (*elem).clone();
                match name.name.as_str() {
                    "get" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &Type::Int)?;
                        Ok(member(Member::ListGet, recv, args, elem))
                    }
                    "prepend" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &elem)?;
                        let ty = recv.ty.clone();
                        Ok(member(Member::ListPrepend, recv, args, ty))
                    }
                    "any" | "all" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &func1(vec![elem], Type::Bool))?;
                        let m = if name.name == "any" {
                            Member::ListAny
                        } else {
                            Member::ListAll
                        };
                        Ok(member(m, recv, args, Type::Bool))
                    }
                    "filter" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &func1(vec![elem], Type::Bool))?;
                        let ty = recv.ty.clone();
                        Ok(member(Member::ListFilter, recv, args, ty))
                    }
                    "find" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &func1(vec![elem.clone()], Type::Bool))?;
                        Ok(member(Member::ListFind, recv, args, elem))
                    }
                    "fold" => {
                        arity(2)?;
                        let Type::Func(sig) = args[0].ty.clone() else {
                            return Err(CompileError::type_(
                                args[0].site,
                                "fold expects a function",
                            ));
                        };
                        if sig.params.len() != 2 {
                            return Err(CompileError::type_(
                                args[0].site,
                                "a list fold function takes (acc, item)",
                            ));
                        }
                        let z = sig.params[0].clone();
                        if !types_match(&sig.params[1], &elem)
                            || !types_match(&sig.ret, &z)
                        {
                            return Err(CompileError::type_(
                                args[0].site,
                                "fold function must be fn(Z, T) -> Z",
                            ));
                        }
                        self.expect_ty(&args[1], &z)?;
                        Ok(member(Member::ListFold, recv, args, z))
                    }
                    "map" => {
                        arity(1)?;
                        let Type::Func(sig) = args[0].ty.clone() else {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map expects a function",
                            ));
                        };
                        if sig.params.len() != 1 || !types_match(&sig.params[0], &elem) {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map function must be fn(T) -> U",
                            ));
                        }
                        if !sig.ret.is_data() {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map must produce a data type",
                            ));
                        }
                        let ty = Type::list(sig.ret.clone());
                        Ok(member(Member::ListMap, recv, args, ty))
                    }
                    _ => Err(CompileError::reference(
                        name.site,
                        format!("lists have no method '{}'", name.name),
                    )),
                }
            }
            Type::Map(k, v) => {
                let (k, v) = ((*k).clone(), (*v).clone());
                match name.name.as_str() {
                    "get" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &k)?;
                        Ok(member(Member::MapGet, recv, args, v))
                    }
                    "get_safe" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &k)?;
                        let opt = self.option_ty(v, site)?;
                        Ok(member(Member::MapGetSafe, recv, args, opt))
                    }
                    "set" => {
                        arity(2)?;
                        self.expect_ty(&args[0], &k)?;
                        self.expect_ty(&args[1], &v)?;
                        let ty = recv.ty.clone();
                        Ok(member(Member::MapSet, recv, args, ty))
                    }
                    "delete" => {
                        arity(1)?;
                        self.expect_ty(&args[0], &k)?;
                        let ty = recv.ty.clone();
                        Ok(member(Member::MapDelete, recv, args, ty))
                    }
                    "filter" => {
                        arity(1)?;
                        self.expect_ty(
                            &args[0],
                            &func1(vec![k, v], Type::Bool),
                        )?;
                        let ty = recv.ty.clone();
                        Ok(member(Member::MapFilter, recv, args, ty))
                    }
                    "fold" => {
                        arity(2)?;
                        let Type::Func(sig) = args[0].ty.clone() else {
                            return Err(CompileError::type_(
                                args[0].site,
                                "fold expects a function",
                            ));
                        };
                        if sig.params.len() != 3 {
                            return Err(CompileError::type_(
                                args[0].site,
                                "a map fold function takes (acc, key, value)",
                            ));
                        }
                        let z = sig.params[0].clone();
                        if !types_match(&sig.params[1], &k)
                            || !types_match(&sig.params[2], &v)
                            || !types_match(&sig.ret, &z)
                        {
                            return Err(CompileError::type_(
                                args[0].site,
                                "fold function must be fn(Z, K, V) -> Z",
                            ));
                        }
                        self.expect_ty(&args[1], &z)?;
                        Ok(member(Member::MapFold, recv, args, z))
                    }
                    "map" => {
                        arity(1)?;
                        let Type::Func(sig) = args[0].ty.clone() else {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map expects a function",
                            ));
                        };
                        if sig.params.len() != 2
                            || !types_match(&sig.params[0], &k)
                            || !types_match(&sig.params[1], &v)
                        {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map function must be fn(K, V) -> W",
                            ));
                        }
                        if !sig.ret.is_data() {
                            return Err(CompileError::type_(
                                args[0].site,
                                "map must produce a data type",
                            ));
                        }
                        let ty = Type::map(k, sig.ret.clone());
                        Ok(member(Member::MapMap, recv, args, ty))
                    }
                    _ => Err(CompileError::reference(
                        name.site,
                        format!("maps have no method '{}'", name.name),
                    )),
                }
            }
            Type::Named { decl, args: targs, .. } => {
                // Option gets synthesised members
                if Some(decl) == self.option_decl {
                    match name.name.as_str() {
                        "unwrap" => {
                            arity(0)?;
                            let inner = targs[0].clone();
                            return Ok(member(Member::OptionUnwrap, recv, args, inner));
                        }
                        "is_some" => {
                            arity(0)?;
                            return Ok(member(Member::OptionIsSome, recv, args, Type::Bool));
                        }
                        "is_none" => {
                            arity(0)?;
                            return Ok(member(Member::OptionIsNone, recv, args, Type::Bool));
                        }
                        _ => {}
                    }
                }
                let tyname = self.defs.get(decl).name.clone();
                let key = format!("{}::{}", tyname, name.name);
                let Some(tpl) = self.templates.get(&key) else {
                    return Err(CompileError::reference(
                        name.site,
                        format!("'{}' has no method '{}'", tyname, name.name),
                    ));
                };
                if !tpl.decl.takes_self {
                    return Err(CompileError::type_(
                        name.site,
                        format!("'{}' is a static function, call it as {}", name.name, key),
                    ));
                }
                let fid = self.instantiate(&key, targs, name.site)?;
                let mut all_args = vec![recv];
                all_args.extend(args);
                self.apply_func(fid, all_args, site)
            }
            t => Err(CompileError::reference(
                name.site,
                format!("{} has no method '{}'", t.show(&self.defs), name.name),
            )),
        }
    }

    fn option_ty(&self, inner: Type, site: Site) -> Result<Type> {
        let decl = self.option_decl.ok_or_else(|| {
            CompileError::reference(site, "the prelude Option type is not available")
        })?;
        Ok(Type::named(decl, vec![inner]))
    }
}
