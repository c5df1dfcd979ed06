use num_bigint::BigInt;

use crate::ast::Purpose;
use crate::source::Site;
use crate::types::{DeclId, Type, TypeDefs};

pub type FuncId = usize;
pub type ConstId = usize;

/// A fully type-checked program: every expression carries a resolved
/// concrete type, every generic reference has been monomorphised.
#[derive(Clone, Debug)]
pub struct TProgram {
    pub purpose: Purpose,
    pub name: String,
    pub defs: TypeDefs,
    pub funcs: Vec<TFunc>,
    pub consts: Vec<TConst>,
    pub main: Option<FuncId>,
}

#[derive(Clone, Debug)]
pub struct TFunc {
    pub name: String,
    /// Source declaration rank; bindings are emitted in this order, so a
    /// body only ever references functions declared at or before its rank.
    pub pos: usize,
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub body: TExpr,
    pub recursive: bool,
    pub site: Site,
}

#[derive(Clone, Debug)]
pub struct TConst {
    pub name: String,
    pub pos: usize,
    pub ty: Type,
    pub value: TExpr,
    pub site: Site,
}

#[derive(Clone, Debug)]
pub struct TExpr {
    pub kind: TExprKind,
    pub ty: Type,
    pub site: Site,
}

#[derive(Clone, Debug)]
pub enum TExprKind {
    IntLit(BigInt),
    BoolLit(bool),
    StrLit(String),
    BytesLit(Vec<u8>),
    ListLit(Vec<TExpr>),
    MapLit(Vec<(TExpr, TExpr)>),
    Local(String),
    FuncRef(FuncId),
    ConstRef(ConstId),
    Call {
        f: Box<TExpr>,
        args: Vec<TExpr>,
    },
    /// A compiler-synthesised member (operator or builtin container method).
    Member {
        m: Member,
        recv: Box<TExpr>,
        args: Vec<TExpr>,
    },
    Global {
        g: GlobalFn,
        args: Vec<TExpr>,
    },
    If {
        cond: Box<TExpr>,
        then_: Box<TExpr>,
        else_: Box<TExpr>,
    },
    Switch {
        scrutinee: Box<TExpr>,
        arms: Vec<TArm>,
        default: Option<Box<TExpr>>,
    },
    Let {
        name: String,
        value: Box<TExpr>,
        body: Box<TExpr>,
    },
    Lambda {
        params: Vec<(String, Type)>,
        body: Box<TExpr>,
    },
    Construct {
        decl: DeclId,
        tag: u64,
        args: Vec<TExpr>,
    },
    FieldGet {
        recv: Box<TExpr>,
        index: usize,
    },
}

#[derive(Clone, Debug)]
pub struct TArm {
    pub variant: usize,
    pub binder: Option<String>,
    pub body: TExpr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalFn {
    /// `error("...")`: unconditional failure, bottom-typed.
    Error,
    /// `assert(cond)`: `true`, or failure with "assert failed".
    Assert,
    /// `print("...")`: trace, evaluates to `true`.
    Print,
}

/// Compiler-synthesised members. The receiver (and argument) types on the
/// enclosing `TExpr` determine the data conversions the lowering inserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Member {
    IntAdd,
    IntSub,
    IntMul,
    IntDiv,
    IntMod,
    IntNeg,
    IntEq,
    IntLt,
    IntLe,
    IntGt,
    IntGe,
    IntShow,
    BoolAnd,
    BoolOr,
    BoolNot,
    BoolEq,
    StrAdd,
    StrEq,
    StrEncodeUtf8,
    BytesAdd,
    BytesEq,
    BytesLt,
    BytesLe,
    BytesGt,
    BytesGe,
    BytesLength,
    BytesShow,
    BytesDecodeUtf8,
    BytesSha2,
    BytesSlice,
    /// Structural equality through the Data representation.
    DataEq,
    Serialize,
    /// `T::from_data(d)`: the receiver is the data expression.
    FromData,
    ListLength,
    ListIsEmpty,
    ListHead,
    ListTail,
    ListGet,
    ListPrepend,
    ListConcat,
    ListAny,
    ListAll,
    ListFilter,
    ListFold,
    ListMap,
    ListFind,
    MapLength,
    MapIsEmpty,
    MapGet,
    MapGetSafe,
    MapSet,
    MapDelete,
    MapHead,
    MapFilter,
    MapFold,
    MapMap,
    TupleFirst,
    TupleSecond,
    OptionUnwrap,
    OptionIsSome,
    OptionIsNone,
}
