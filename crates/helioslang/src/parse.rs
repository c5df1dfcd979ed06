use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::lex::{self, TokKind, Token};
use crate::source::Site;

/// A cursor over one grouped token stream. Group fields are parsed with
/// sub-cursors so "unexpected end" errors can point at the enclosing group.
struct Cursor<'a> {
    toks: &'a [Token],
    pos: usize,
    end: Site,
}

impl<'a> Cursor<'a> {
    fn new(toks: &'a [Token], end: Site) -> Self {
        Cursor { toks, pos: 0, end }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.toks.get(self.pos)
    }

    fn here(&self) -> Site {
        self.peek().map(|t| t.site).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Result<&'a Token> {
        let t = self
            .toks
            .get(self.pos)
            .ok_or_else(|| CompileError::syntax(self.end, "unexpected end of input"))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect_word(&mut self) -> Result<Ident> {
        let t = self.bump()?;
        match &t.kind {
            TokKind::Word(w) => Ok(Ident {
                name: w.clone(),
                site: t.site,
            }),
            _ => Err(CompileError::syntax(
                t.site,
                format!("expected a name, got {}", t.describe()),
            )),
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<Site> {
        let t = self.bump()?;
        if t.is_word(kw) {
            Ok(t.site)
        } else {
            Err(CompileError::syntax(
                t.site,
                format!("expected '{}', got {}", kw, t.describe()),
            ))
        }
    }

    fn expect_sym(&mut self, s: &str) -> Result<Site> {
        let t = self.bump()?;
        if t.is_sym(s) {
            Ok(t.site)
        } else {
            Err(CompileError::syntax(
                t.site,
                format!("expected '{}', got {}", s, t.describe()),
            ))
        }
    }

    fn eat_sym(&mut self, s: &str) -> bool {
        if matches!(self.peek(), Some(t) if t.is_sym(s)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> Option<Site> {
        match self.peek() {
            Some(t) if t.is_word(w) => {
                self.pos += 1;
                Some(t.site)
            }
            _ => None,
        }
    }

    fn peek_group(&self, open: char) -> bool {
        matches!(self.peek(), Some(Token { kind: TokKind::Group { open: o, .. }, .. }) if *o == open)
    }

    fn expect_group(&mut self, open: char) -> Result<(&'a [Vec<Token>], Site)> {
        let t = self.bump()?;
        match &t.kind {
            TokKind::Group { open: o, fields } if *o == open => Ok((fields.as_slice(), t.site)),
            _ => Err(CompileError::syntax(
                t.site,
                format!("expected '{}...' group, got {}", open, t.describe()),
            )),
        }
    }

    fn eat_group(&mut self, open: char) -> Option<(&'a [Vec<Token>], Site)> {
        if self.peek_group(open) {
            let t = self.bump().unwrap();
            match &t.kind {
                TokKind::Group { fields, .. } => Some((fields.as_slice(), t.site)),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(CompileError::syntax(
                t.site,
                format!("unexpected {}", t.describe()),
            )),
        }
    }
}

fn field_cursor<'a>(field: &'a [Token], group_site: Site) -> Cursor<'a> {
    Cursor::new(field, Site::new(group_site.end as usize, group_site.end as usize))
}

/// Parse a whole program from source text.
pub fn parse(text: &str) -> Result<Program> {
    let tokens = lex::lex(text)?;
    let end = tokens
        .last()
        .map(|t| t.site)
        .unwrap_or(Site::new(0, 0));
    let mut cur = Cursor::new(&tokens, end);

    let purpose_word = cur.expect_word()?;
    let purpose = Purpose::parse(&purpose_word.name).ok_or_else(|| {
        CompileError::syntax(
            purpose_word.site,
            format!(
                "expected a script purpose (testing, spending, minting, staking, module), got '{}'",
                purpose_word.name
            ),
        )
    })?;
    let name = cur.expect_word()?;

    let mut decls = Vec::new();
    while !cur.at_end() {
        decls.push(parse_decl(&mut cur)?);
    }

    Ok(Program {
        purpose,
        name,
        decls,
    })
}

fn parse_decl(cur: &mut Cursor<'_>) -> Result<Decl> {
    let t = cur.bump()?;
    match &t.kind {
        TokKind::Word(w) => match w.as_str() {
            "const" => Ok(Decl::Const(parse_const_decl(cur)?)),
            "func" => Ok(Decl::Func(parse_func_decl(cur, false)?)),
            "struct" => Ok(Decl::Struct(parse_struct_decl(cur)?)),
            "enum" => Ok(Decl::Enum(parse_enum_decl(cur)?)),
            "impl" => Ok(Decl::Impl(parse_impl_decl(cur)?)),
            "import" => Ok(Decl::Import(ImportDecl {
                module: cur.expect_word()?,
            })),
            _ => Err(CompileError::syntax(
                t.site,
                format!("expected a declaration, got '{}'", w),
            )),
        },
        _ => Err(CompileError::syntax(
            t.site,
            format!("expected a declaration, got {}", t.describe()),
        )),
    }
}

fn parse_const_decl(cur: &mut Cursor<'_>) -> Result<ConstDecl> {
    let name = cur.expect_word()?;
    cur.expect_sym(":")?;
    let ty = parse_type(cur)?;
    cur.expect_sym("=")?;
    let value = parse_expr(cur)?;
    Ok(ConstDecl { name, ty, value })
}

fn parse_type_params(cur: &mut Cursor<'_>) -> Result<Vec<Ident>> {
    let Some((fields, site)) = cur.eat_group('[') else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for field in fields {
        let mut fc = field_cursor(field, site);
        out.push(fc.expect_word()?);
        fc.expect_end()?;
    }
    Ok(out)
}

fn parse_func_decl(cur: &mut Cursor<'_>, in_impl: bool) -> Result<FuncDecl> {
    let name = cur.expect_word()?;
    let type_params = parse_type_params(cur)?;
    let (param_fields, params_site) = cur.expect_group('(')?;

    let mut takes_self = false;
    let mut params = Vec::new();
    for (i, field) in param_fields.iter().enumerate() {
        let mut fc = field_cursor(field, params_site);
        let pname = fc.expect_word()?;
        if pname.name == "self" {
            if !in_impl || i != 0 {
                return Err(CompileError::syntax(
                    pname.site,
                    "'self' is only allowed as the first parameter of an impl function",
                ));
            }
            takes_self = true;
            fc.expect_end()?;
            continue;
        }
        fc.expect_sym(":")?;
        let ty = parse_type(&mut fc)?;
        fc.expect_end()?;
        params.push((pname, ty));
    }

    cur.expect_sym("->")?;
    let ret = parse_type(cur)?;
    let body = parse_block_group(cur)?;
    let site = Site::covering(name.site, body.site);

    Ok(FuncDecl {
        name,
        type_params,
        takes_self,
        params,
        ret,
        body,
        site,
    })
}

fn parse_struct_decl(cur: &mut Cursor<'_>) -> Result<StructDecl> {
    let name = cur.expect_word()?;
    let type_params = parse_type_params(cur)?;
    let (fields, site) = cur.expect_group('{')?;
    let mut out = Vec::new();
    for field in fields {
        let mut fc = field_cursor(field, site);
        let fname = fc.expect_word()?;
        fc.expect_sym(":")?;
        let ty = parse_type(&mut fc)?;
        fc.expect_end()?;
        out.push((fname, ty));
    }
    Ok(StructDecl {
        name,
        type_params,
        fields: out,
    })
}

fn parse_enum_decl(cur: &mut Cursor<'_>) -> Result<EnumDecl> {
    let name = cur.expect_word()?;
    let type_params = parse_type_params(cur)?;
    let (fields, site) = cur.expect_group('{')?;
    let mut variants = Vec::new();
    for field in fields {
        let mut fc = field_cursor(field, site);
        let vname = fc.expect_word()?;
        let mut vfields = Vec::new();
        if let Some((ffs, fsite)) = fc.eat_group('{') {
            for ff in ffs {
                let mut ffc = field_cursor(ff, fsite);
                let fname = ffc.expect_word()?;
                ffc.expect_sym(":")?;
                let ty = parse_type(&mut ffc)?;
                ffc.expect_end()?;
                vfields.push((fname, ty));
            }
        }
        fc.expect_end()?;
        variants.push(VariantDecl {
            name: vname,
            fields: vfields,
        });
    }
    Ok(EnumDecl {
        name,
        type_params,
        variants,
    })
}

fn parse_impl_decl(cur: &mut Cursor<'_>) -> Result<ImplDecl> {
    let target = cur.expect_word()?;
    let type_params = parse_type_params(cur)?;
    let (fields, site) = cur.expect_group('{')?;
    if fields.len() > 1 {
        return Err(CompileError::syntax(
            site,
            "impl members are not separated by commas",
        ));
    }
    let mut consts = Vec::new();
    let mut methods = Vec::new();
    if let Some(body) = fields.first() {
        let mut fc = field_cursor(body, site);
        while !fc.at_end() {
            if fc.eat_word("const").is_some() {
                consts.push(parse_const_decl(&mut fc)?);
            } else if fc.eat_word("func").is_some() {
                methods.push(parse_func_decl(&mut fc, true)?);
            } else {
                let t = fc.bump()?;
                return Err(CompileError::syntax(
                    t.site,
                    format!("expected 'func' or 'const' in impl, got {}", t.describe()),
                ));
            }
        }
    }
    Ok(ImplDecl {
        target,
        type_params,
        consts,
        methods,
    })
}

fn parse_type(cur: &mut Cursor<'_>) -> Result<TypeExpr> {
    // `(A, B)` tuple
    if cur.peek_group('(') {
        let (fields, site) = cur.expect_group('(')?;
        if fields.len() != 2 {
            return Err(CompileError::syntax(
                site,
                "tuple types have exactly two components",
            ));
        }
        let mut a = field_cursor(&fields[0], site);
        let mut b = field_cursor(&fields[1], site);
        let ta = parse_type(&mut a)?;
        a.expect_end()?;
        let tb = parse_type(&mut b)?;
        b.expect_end()?;
        return Ok(TypeExpr {
            kind: TypeExprKind::Tuple(Box::new(ta), Box::new(tb)),
            site,
        });
    }

    // `[]T`
    if cur.peek_group('[') {
        let (fields, site) = cur.expect_group('[')?;
        if !fields.is_empty() {
            return Err(CompileError::syntax(
                site,
                "list types are written []T",
            ));
        }
        let elem = parse_type(cur)?;
        return Ok(TypeExpr {
            site: Site::covering(site, elem.site),
            kind: TypeExprKind::List(Box::new(elem)),
        });
    }

    let name = cur.expect_word()?;

    // `fn(A, B) -> C`
    if name.name == "fn" {
        let (fields, psite) = cur.expect_group('(')?;
        let mut params = Vec::new();
        for field in fields {
            let mut fc = field_cursor(field, psite);
            params.push(parse_type(&mut fc)?);
            fc.expect_end()?;
        }
        cur.expect_sym("->")?;
        let ret = parse_type(cur)?;
        return Ok(TypeExpr {
            site: Site::covering(name.site, ret.site),
            kind: TypeExprKind::Func(params, Box::new(ret)),
        });
    }

    // `Map[K]V`
    if name.name == "Map" {
        let (fields, ksite) = cur.expect_group('[')?;
        if fields.len() != 1 {
            return Err(CompileError::syntax(ksite, "Map takes one key type"));
        }
        let mut kc = field_cursor(&fields[0], ksite);
        let key = parse_type(&mut kc)?;
        kc.expect_end()?;
        let val = parse_type(cur)?;
        return Ok(TypeExpr {
            site: Site::covering(name.site, val.site),
            kind: TypeExprKind::Map(Box::new(key), Box::new(val)),
        });
    }

    let mut args = Vec::new();
    let mut site = name.site;
    if let Some((fields, gsite)) = cur.eat_group('[') {
        for field in fields {
            let mut fc = field_cursor(field, gsite);
            args.push(parse_type(&mut fc)?);
            fc.expect_end()?;
        }
        if args.is_empty() {
            return Err(CompileError::syntax(gsite, "empty type argument list"));
        }
        site = Site::covering(site, gsite);
    }
    Ok(TypeExpr {
        kind: TypeExprKind::Named { name, args },
        site,
    })
}

/// A `{ ... }` group holding one block: let-bindings and statements ended by
/// a tail expression.
fn parse_block_group(cur: &mut Cursor<'_>) -> Result<Expr> {
    let (fields, site) = cur.expect_group('{')?;
    parse_block_fields(fields, site)
}

fn parse_block_fields(fields: &[Vec<Token>], site: Site) -> Result<Expr> {
    if fields.len() != 1 {
        return Err(CompileError::syntax(
            site,
            "expected a block with a tail expression",
        ));
    }
    let mut fc = field_cursor(&fields[0], site);
    let e = parse_block_body(&mut fc)?;
    fc.expect_end()?;
    Ok(e)
}

fn parse_block_body(cur: &mut Cursor<'_>) -> Result<Expr> {
    if let Some(let_site) = cur.eat_word("let") {
        let name = cur.expect_word()?;
        let ty = if cur.eat_sym(":") {
            Some(parse_type(cur)?)
        } else {
            None
        };
        cur.expect_sym("=")?;
        let value = parse_expr(cur)?;
        cur.expect_sym(";")?;
        let body = parse_block_body(cur)?;
        let site = Site::covering(let_site, body.site);
        return Ok(Expr {
            kind: ExprKind::Let {
                name,
                ty,
                value: Box::new(value),
                body: Box::new(body),
            },
            site,
        });
    }

    let e = parse_expr(cur)?;
    if cur.eat_sym(";") {
        // statement expression: bind to `_`
        let body = parse_block_body(cur)?;
        let site = Site::covering(e.site, body.site);
        return Ok(Expr {
            kind: ExprKind::Let {
                name: Ident {
                    name: "_".to_string(),
                    site: e.site,
                },
                ty: None,
                value: Box::new(e),
                body: Box::new(body),
            },
            site,
        });
    }
    Ok(e)
}

fn parse_expr(cur: &mut Cursor<'_>) -> Result<Expr> {
    parse_or(cur)
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let site = Site::covering(lhs.site, rhs.site);
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        site,
    }
}

fn parse_or(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut lhs = parse_and(cur)?;
    while cur.eat_sym("||") {
        let rhs = parse_and(cur)?;
        lhs = binary(BinOp::Or, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_and(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut lhs = parse_cmp(cur)?;
    while cur.eat_sym("&&") {
        let rhs = parse_cmp(cur)?;
        lhs = binary(BinOp::And, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_cmp(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut lhs = parse_add(cur)?;
    loop {
        let op = if cur.eat_sym("==") {
            BinOp::Eq
        } else if cur.eat_sym("!=") {
            BinOp::Ne
        } else if cur.eat_sym("<=") {
            BinOp::Le
        } else if cur.eat_sym(">=") {
            BinOp::Ge
        } else if cur.eat_sym("<") {
            BinOp::Lt
        } else if cur.eat_sym(">") {
            BinOp::Gt
        } else {
            break;
        };
        let rhs = parse_add(cur)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_add(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut lhs = parse_mul(cur)?;
    loop {
        let op = if cur.eat_sym("+") {
            BinOp::Add
        } else if cur.eat_sym("-") {
            BinOp::Sub
        } else {
            break;
        };
        let rhs = parse_mul(cur)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_mul(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut lhs = parse_unary(cur)?;
    loop {
        let op = if cur.eat_sym("*") {
            BinOp::Mul
        } else if cur.eat_sym("/") {
            BinOp::Div
        } else if cur.eat_sym("%") {
            BinOp::Mod
        } else {
            break;
        };
        let rhs = parse_unary(cur)?;
        lhs = binary(op, lhs, rhs);
    }
    Ok(lhs)
}

fn parse_unary(cur: &mut Cursor<'_>) -> Result<Expr> {
    let op = if matches!(cur.peek(), Some(t) if t.is_sym("-")) {
        Some((UnaryOp::Neg, cur.bump()?.site))
    } else if matches!(cur.peek(), Some(t) if t.is_sym("!")) {
        Some((UnaryOp::Not, cur.bump()?.site))
    } else {
        None
    };
    if let Some((op, op_site)) = op {
        let operand = parse_unary(cur)?;
        let site = Site::covering(op_site, operand.site);
        return Ok(Expr {
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            site,
        });
    }
    parse_postfix(cur)
}

fn call_args(fields: &[Vec<Token>], site: Site) -> Result<Vec<Expr>> {
    let mut out = Vec::new();
    for field in fields {
        let mut fc = field_cursor(field, site);
        out.push(parse_expr(&mut fc)?);
        fc.expect_end()?;
    }
    Ok(out)
}

fn parse_postfix(cur: &mut Cursor<'_>) -> Result<Expr> {
    let mut e = parse_primary(cur)?;
    loop {
        if cur.eat_sym(".") {
            let name = cur.expect_word()?;
            if name.name == "switch" && cur.peek_group('{') {
                e = parse_switch(cur, e)?;
                continue;
            }
            if cur.peek_group('(') {
                let (fields, gsite) = cur.expect_group('(')?;
                let args = call_args(fields, gsite)?;
                let site = Site::covering(e.site, gsite);
                let member_site = Site::covering(e.site, name.site);
                e = Expr {
                    kind: ExprKind::Call {
                        f: Box::new(Expr {
                            kind: ExprKind::Member {
                                obj: Box::new(e),
                                name,
                            },
                            site: member_site,
                        }),
                        type_args: Vec::new(),
                        args,
                    },
                    site,
                };
                continue;
            }
            let site = Site::covering(e.site, name.site);
            e = Expr {
                kind: ExprKind::Member {
                    obj: Box::new(e),
                    name,
                },
                site,
            };
            continue;
        }
        if cur.peek_group('(') {
            let (fields, gsite) = cur.expect_group('(')?;
            let args = call_args(fields, gsite)?;
            let site = Site::covering(e.site, gsite);
            e = Expr {
                kind: ExprKind::Call {
                    f: Box::new(e),
                    type_args: Vec::new(),
                    args,
                },
                site,
            };
            continue;
        }
        break;
    }
    Ok(e)
}

fn parse_switch(cur: &mut Cursor<'_>, scrutinee: Expr) -> Result<Expr> {
    let (fields, gsite) = cur.expect_group('{')?;
    let mut arms = Vec::new();
    let mut default = None;
    for field in fields {
        let mut fc = field_cursor(field, gsite);
        if default.is_some() {
            return Err(CompileError::syntax(
                fc.here(),
                "the else arm must come last",
            ));
        }
        if fc.eat_word("else").is_some() {
            fc.expect_sym("=>")?;
            let body = parse_arm_body(&mut fc)?;
            fc.expect_end()?;
            default = Some(Box::new(body));
            continue;
        }
        let first = fc.expect_word()?;
        let (binder, variant) = if fc.eat_sym(":") {
            (Some(first), fc.expect_word()?)
        } else {
            (None, first)
        };
        fc.expect_sym("=>")?;
        let body = parse_arm_body(&mut fc)?;
        fc.expect_end()?;
        arms.push(SwitchArm {
            binder,
            variant,
            body,
        });
    }
    let site = Site::covering(scrutinee.site, gsite);
    Ok(Expr {
        kind: ExprKind::Switch {
            scrutinee: Box::new(scrutinee),
            arms,
            default,
        },
        site,
    })
}

fn parse_arm_body(cur: &mut Cursor<'_>) -> Result<Expr> {
    if cur.peek_group('{') {
        return parse_block_group(cur);
    }
    parse_expr(cur)
}

fn parse_type_args(cur: &mut Cursor<'_>) -> Result<Vec<TypeExpr>> {
    let Some((fields, site)) = cur.eat_group('[') else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for field in fields {
        let mut fc = field_cursor(field, site);
        out.push(parse_type(&mut fc)?);
        fc.expect_end()?;
    }
    if out.is_empty() {
        return Err(CompileError::syntax(site, "empty type argument list"));
    }
    Ok(out)
}

fn parse_primary(cur: &mut Cursor<'_>) -> Result<Expr> {
    let t = cur.bump()?;
    match &t.kind {
        TokKind::Int(z) => Ok(Expr {
            kind: ExprKind::IntLit(z.clone()),
            site: t.site,
        }),
        TokKind::Bool(b) => Ok(Expr {
            kind: ExprKind::BoolLit(*b),
            site: t.site,
        }),
        TokKind::Str(s) => Ok(Expr {
            kind: ExprKind::StrLit(s.clone()),
            site: t.site,
        }),
        TokKind::Bytes(b) => Ok(Expr {
            kind: ExprKind::BytesLit(b.clone()),
            site: t.site,
        }),
        TokKind::Group { open: '(', fields } => {
            if fields.len() != 1 {
                return Err(CompileError::syntax(
                    t.site,
                    "parenthesized expressions hold exactly one expression",
                ));
            }
            let mut fc = field_cursor(&fields[0], t.site);
            let e = parse_expr(&mut fc)?;
            fc.expect_end()?;
            Ok(e)
        }
        TokKind::Group { open: '[', fields } => {
            // `[]T{a, b}` list literal
            if !fields.is_empty() {
                return Err(CompileError::syntax(
                    t.site,
                    "list literals are written []T{...}",
                ));
            }
            let elem_ty = parse_type(cur)?;
            let (items, gsite) = cur.expect_group('{')?;
            let items = call_args(items, gsite)?;
            Ok(Expr {
                site: Site::covering(t.site, gsite),
                kind: ExprKind::ListLit { elem_ty, items },
            })
        }
        TokKind::Word(w) if w == "Map" => {
            // `Map[K]V{k: v, ...}` map literal
            let (kfields, ksite) = cur.expect_group('[')?;
            if kfields.len() != 1 {
                return Err(CompileError::syntax(ksite, "Map takes one key type"));
            }
            let mut kc = field_cursor(&kfields[0], ksite);
            let key_ty = parse_type(&mut kc)?;
            kc.expect_end()?;
            let val_ty = parse_type(cur)?;
            let (efields, gsite) = cur.expect_group('{')?;
            let mut entries = Vec::new();
            for field in efields {
                let mut fc = field_cursor(field, gsite);
                let k = parse_expr(&mut fc)?;
                fc.expect_sym(":")?;
                let v = parse_expr(&mut fc)?;
                fc.expect_end()?;
                entries.push((k, v));
            }
            Ok(Expr {
                site: Site::covering(t.site, gsite),
                kind: ExprKind::MapLit {
                    key_ty,
                    val_ty,
                    entries,
                },
            })
        }
        TokKind::Word(w) if w == "if" => {
            let (cfields, csite) = cur.expect_group('(')?;
            if cfields.len() != 1 {
                return Err(CompileError::syntax(csite, "if takes one condition"));
            }
            let mut cc = field_cursor(&cfields[0], csite);
            let cond = parse_expr(&mut cc)?;
            cc.expect_end()?;
            let then_ = parse_block_group(cur)?;
            cur.expect_kw("else")?;
            let else_ = if matches!(cur.peek(), Some(t) if t.is_word("if")) {
                parse_primary(cur)?
            } else {
                parse_block_group(cur)?
            };
            Ok(Expr {
                site: Site::covering(t.site, else_.site),
                kind: ExprKind::If {
                    cond: Box::new(cond),
                    then_: Box::new(then_),
                    else_: Box::new(else_),
                },
            })
        }
        TokKind::Word(w) if w == "fn" => {
            let (pfields, psite) = cur.expect_group('(')?;
            let mut params = Vec::new();
            for field in pfields {
                let mut fc = field_cursor(field, psite);
                let pname = fc.expect_word()?;
                fc.expect_sym(":")?;
                let ty = parse_type(&mut fc)?;
                fc.expect_end()?;
                params.push((pname, ty));
            }
            cur.expect_sym("->")?;
            let ret = parse_type(cur)?;
            let body = parse_block_group(cur)?;
            Ok(Expr {
                site: Site::covering(t.site, body.site),
                kind: ExprKind::Lambda {
                    params,
                    ret,
                    body: Box::new(body),
                },
            })
        }
        TokKind::Word(w) => {
            let name = Ident {
                name: w.clone(),
                site: t.site,
            };
            let ty_args = parse_type_args(cur)?;

            if cur.eat_sym("::") {
                let member = cur.expect_word()?;
                if let Some((fields, gsite)) = cur.eat_group('{') {
                    let args = call_args(fields, gsite)?;
                    return Ok(Expr {
                        site: Site::covering(t.site, gsite),
                        kind: ExprKind::Construct {
                            ty_name: name,
                            ty_args,
                            variant: Some(member),
                            args,
                        },
                    });
                }
                let site = Site::covering(t.site, member.site);
                return Ok(Expr {
                    kind: ExprKind::Path {
                        ty_name: name,
                        ty_args,
                        member,
                    },
                    site,
                });
            }

            if let Some((fields, gsite)) = cur.eat_group('{') {
                let args = call_args(fields, gsite)?;
                return Ok(Expr {
                    site: Site::covering(t.site, gsite),
                    kind: ExprKind::Construct {
                        ty_name: name,
                        ty_args,
                        variant: None,
                        args,
                    },
                });
            }

            if !ty_args.is_empty() || cur.peek_group('(') {
                let (fields, gsite) = cur.expect_group('(')?;
                let args = call_args(fields, gsite)?;
                let f_site = name.site;
                return Ok(Expr {
                    site: Site::covering(t.site, gsite),
                    kind: ExprKind::Call {
                        f: Box::new(Expr {
                            kind: ExprKind::Name(name),
                            site: f_site,
                        }),
                        type_args: ty_args,
                        args,
                    },
                });
            }

            Ok(Expr {
                kind: ExprKind::Name(name),
                site: t.site,
            })
        }
        _ => Err(CompileError::syntax(
            t.site,
            format!("expected an expression, got {}", t.describe()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap()
    }

    #[test]
    fn minimal_testing_program() {
        let p = parse_ok("testing t\nfunc main(a: Int) -> Int { a }");
        assert_eq!(p.purpose, Purpose::Testing);
        assert_eq!(p.name.name, "t");
        assert_eq!(p.decls.len(), 1);
        match &p.decls[0] {
            Decl::Func(f) => {
                assert_eq!(f.name.name, "main");
                assert_eq!(f.params.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn precedence_is_standard() {
        let p = parse_ok("testing t\nfunc main() -> Bool { 1 + 2 * 3 == 7 && true }");
        let Decl::Func(f) = &p.decls[0] else { panic!() };
        // top node is &&
        match &f.body.kind {
            ExprKind::Binary { op: BinOp::And, lhs, .. } => match &lhs.kind {
                ExprKind::Binary { op: BinOp::Eq, .. } => {}
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn let_and_statement_desugar_to_nested_lets() {
        let p = parse_ok("testing t\nfunc main() -> Int { let x = 1; print(\"hi\"); x }");
        let Decl::Func(f) = &p.decls[0] else { panic!() };
        match &f.body.kind {
            ExprKind::Let { name, body, .. } => {
                assert_eq!(name.name, "x");
                match &body.kind {
                    ExprKind::Let { name, .. } => assert_eq!(name.name, "_"),
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn switch_arms_and_else() {
        let src = r#"
testing t
func main(o: Option[Int]) -> Int {
    o.switch {
        s: Some => s.value,
        else => 0
    }
}
"#;
        let p = parse_ok(src);
        let Decl::Func(f) = &p.decls[0] else { panic!() };
        match &f.body.kind {
            ExprKind::Switch { arms, default, .. } => {
                assert_eq!(arms.len(), 1);
                assert_eq!(arms[0].binder.as_ref().unwrap().name, "s");
                assert_eq!(arms[0].variant.name, "Some");
                assert!(default.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn list_and_map_literals() {
        let p = parse_ok("testing t\nfunc main() -> Int { []Int{1, 2}.length + Map[Int]Int{1: 10}.length }");
        let Decl::Func(f) = &p.decls[0] else { panic!() };
        assert!(matches!(f.body.kind, ExprKind::Binary { op: BinOp::Add, .. }));
    }

    #[test]
    fn construct_and_path_forms() {
        let p = parse_ok(
            "testing t\nstruct P { a: Int }\nfunc main() -> Int { let p = P{1}; let o = Option[Int]::Some{p.a}; o.unwrap() }",
        );
        assert_eq!(p.decls.len(), 2);
    }

    #[test]
    fn enum_with_field_variants() {
        let p = parse_ok("module m\nenum E { A { x: Int }, B }");
        let Decl::Enum(e) = &p.decls[0] else { panic!() };
        assert_eq!(e.variants.len(), 2);
        assert_eq!(e.variants[0].fields.len(), 1);
        assert!(e.variants[1].fields.is_empty());
    }

    #[test]
    fn impl_block_with_const_and_methods() {
        let src = r#"
module m
struct V { n: Int }
impl V {
    const ZERO: V = V{0}
    func add(self, other: V) -> V { V{self.n + other.n} }
}
"#;
        let p = parse_ok(src);
        let Decl::Impl(i) = &p.decls[1] else { panic!() };
        assert_eq!(i.consts.len(), 1);
        assert_eq!(i.methods.len(), 1);
        assert!(i.methods[0].takes_self);
    }

    #[test]
    fn generic_func_and_explicit_type_args() {
        let p = parse_ok(
            "testing t\nfunc id[T](x: T) -> T { x }\nfunc main() -> Int { id[Int](7) }",
        );
        let Decl::Func(f) = &p.decls[1] else { panic!() };
        match &f.body.kind {
            ExprKind::Call { type_args, .. } => assert_eq!(type_args.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn first_error_is_fatal_with_site() {
        let err = parse("testing t\nfunc main( -> Int { 1 }").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { .. }));
    }
}
