use num_bigint::BigInt;

use crate::source::Site;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Testing,
    Spending,
    Minting,
    Staking,
    Module,
}

impl Purpose {
    pub fn parse(w: &str) -> Option<Purpose> {
        match w {
            "testing" => Some(Purpose::Testing),
            "spending" => Some(Purpose::Spending),
            "minting" => Some(Purpose::Minting),
            "staking" => Some(Purpose::Staking),
            "module" => Some(Purpose::Module),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub site: Site,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub purpose: Purpose,
    pub name: Ident,
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decl {
    Const(ConstDecl),
    Func(FuncDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Impl(ImplDecl),
    Import(ImportDecl),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstDecl {
    pub name: Ident,
    pub ty: TypeExpr,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub takes_self: bool,
    pub params: Vec<(Ident, TypeExpr)>,
    pub ret: TypeExpr,
    pub body: Expr,
    pub site: Site,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub fields: Vec<(Ident, TypeExpr)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDecl {
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub variants: Vec<VariantDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantDecl {
    pub name: Ident,
    pub fields: Vec<(Ident, TypeExpr)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplDecl {
    pub target: Ident,
    pub type_params: Vec<Ident>,
    pub consts: Vec<ConstDecl>,
    pub methods: Vec<FuncDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportDecl {
    pub module: Ident,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub site: Site,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExprKind {
    Named {
        name: Ident,
        args: Vec<TypeExpr>,
    },
    /// `[]T`
    List(Box<TypeExpr>),
    /// `Map[K]V`
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// `fn(A, B) -> C`
    Func(Vec<TypeExpr>, Box<TypeExpr>),
    /// `(A, B)`
    Tuple(Box<TypeExpr>, Box<TypeExpr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub site: Site,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    IntLit(BigInt),
    BoolLit(bool),
    StrLit(String),
    BytesLit(Vec<u8>),
    /// `[]T{a, b}`
    ListLit {
        elem_ty: TypeExpr,
        items: Vec<Expr>,
    },
    /// `Map[K]V{k: v}`
    MapLit {
        key_ty: TypeExpr,
        val_ty: TypeExpr,
        entries: Vec<(Expr, Expr)>,
    },
    Name(Ident),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `f(args)` or `f[T](args)` where `f` is a name, path or expression
    Call {
        f: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    /// `obj.name` (field, property, or a method head for `Call`)
    Member {
        obj: Box<Expr>,
        name: Ident,
    },
    /// `Type::member` or `Type[T]::member`
    Path {
        ty_name: Ident,
        ty_args: Vec<TypeExpr>,
        member: Ident,
    },
    /// `Name{args}`, `Name[T]{args}`, `Name::Variant{args}`
    Construct {
        ty_name: Ident,
        ty_args: Vec<TypeExpr>,
        variant: Option<Ident>,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_: Box<Expr>,
        else_: Box<Expr>,
    },
    Switch {
        scrutinee: Box<Expr>,
        arms: Vec<SwitchArm>,
        default: Option<Box<Expr>>,
    },
    /// `let x = e1; e2` (statement expressions bind `_`)
    Let {
        name: Ident,
        ty: Option<TypeExpr>,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    /// `fn(a: A) -> R { body }`
    Lambda {
        params: Vec<(Ident, TypeExpr)>,
        ret: TypeExpr,
        body: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchArm {
    pub binder: Option<Ident>,
    pub variant: Ident,
    pub body: Expr,
}
