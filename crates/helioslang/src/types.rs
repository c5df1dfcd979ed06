use std::collections::BTreeMap;
use std::rc::Rc;

use crate::source::Site;

pub type DeclId = usize;

/// A fully resolved type. Named types are compared by declaration identity
/// plus pointwise equality of arguments; there is no subtyping. The `Ord`
/// instance exists so type-argument tuples can key the monomorphisation
/// registry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    Int,
    Bool,
    Str,
    Bytes,
    /// The untyped `Data` escape hatch.
    AnyData,
    List(Rc<Type>),
    Map(Rc<Type>, Rc<Type>),
    Tuple(Rc<Type>, Rc<Type>),
    Func(Rc<FuncSig>),
    Named {
        decl: DeclId,
        args: Vec<Type>,
        /// A scrutinee re-bound in a switch arm is narrowed to one variant.
        variant: Option<usize>,
    },
    /// A type parameter inside a generic declaration body.
    Param(String),
    /// The type of `error(...)`: unifies with everything.
    Bottom,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FuncSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Type {
    pub fn named(decl: DeclId, args: Vec<Type>) -> Self {
        Type::Named {
            decl,
            args,
            variant: None,
        }
    }

    pub fn list(elem: Type) -> Self {
        Type::List(Rc::new(elem))
    }

    pub fn map(k: Type, v: Type) -> Self {
        Type::Map(Rc::new(k), Rc::new(v))
    }

    pub fn func(params: Vec<Type>, ret: Type) -> Self {
        Type::Func(Rc::new(FuncSig { params, ret }))
    }

    /// Whether values of this type have a `Data` representation (and hence
    /// `serialize`, `==` and `from_data`).
    pub fn is_data(&self) -> bool {
        match self {
            Type::Int | Type::Bool | Type::Str | Type::Bytes | Type::AnyData => true,
            Type::List(e) => e.is_data(),
            Type::Map(k, v) => k.is_data() && v.is_data(),
            Type::Named { .. } => true,
            Type::Tuple(_, _) | Type::Func(_) | Type::Param(_) | Type::Bottom => false,
        }
    }

    /// Strip switch-arm narrowing.
    pub fn widen(&self) -> Type {
        match self {
            Type::Named { decl, args, .. } => Type::named(*decl, args.clone()),
            t => t.clone(),
        }
    }

    pub fn contains_params(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::List(e) => e.contains_params(),
            Type::Map(k, v) => k.contains_params() || v.contains_params(),
            Type::Tuple(a, b) => a.contains_params() || b.contains_params(),
            Type::Func(sig) => {
                sig.params.iter().any(Type::contains_params) || sig.ret.contains_params()
            }
            Type::Named { args, .. } => args.iter().any(Type::contains_params),
            _ => false,
        }
    }

    /// Substitute type parameters.
    pub fn subst(&self, map: &BTreeMap<String, Type>) -> Type {
        match self {
            Type::Param(p) => map.get(p).cloned().unwrap_or_else(|| self.clone()),
            Type::List(e) => Type::list(e.subst(map)),
            Type::Map(k, v) => Type::map(k.subst(map), v.subst(map)),
            Type::Tuple(a, b) => Type::Tuple(Rc::new(a.subst(map)), Rc::new(b.subst(map))),
            Type::Func(sig) => Type::func(
                sig.params.iter().map(|p| p.subst(map)).collect(),
                sig.ret.subst(map),
            ),
            Type::Named {
                decl,
                args,
                variant,
            } => Type::Named {
                decl: *decl,
                args: args.iter().map(|a| a.subst(map)).collect(),
                variant: *variant,
            },
            t => t.clone(),
        }
    }

    pub fn show(&self, defs: &TypeDefs) -> String {
        match self {
            Type::Int => "Int".to_string(),
            Type::Bool => "Bool".to_string(),
            Type::Str => "String".to_string(),
            Type::Bytes => "ByteArray".to_string(),
            Type::AnyData => "Data".to_string(),
            Type::List(e) => format!("[]{}", e.show(defs)),
            Type::Map(k, v) => format!("Map[{}]{}", k.show(defs), v.show(defs)),
            Type::Tuple(a, b) => format!("({}, {})", a.show(defs), b.show(defs)),
            Type::Func(sig) => format!(
                "fn({}) -> {}",
                sig.params
                    .iter()
                    .map(|p| p.show(defs))
                    .collect::<Vec<_>>()
                    .join(", "),
                sig.ret.show(defs)
            ),
            Type::Named {
                decl,
                args,
                variant,
            } => {
                let def = &defs.defs[*decl];
                let mut s = def.name.clone();
                if !args.is_empty() {
                    s.push('[');
                    s.push_str(
                        &args
                            .iter()
                            .map(|a| a.show(defs))
                            .collect::<Vec<_>>()
                            .join(", "),
                    );
                    s.push(']');
                }
                if let Some(v) = variant {
                    if let TypeDefKind::Enum { variants } = &def.kind {
                        s.push_str("::");
                        s.push_str(&variants[*v].name);
                    }
                }
                s
            }
            Type::Param(p) => p.clone(),
            Type::Bottom => "!".to_string(),
        }
    }
}

/// Acceptance check: exact equality, with `Bottom` matching anything and a
/// narrowed enum matching its base.
pub fn types_match(expected: &Type, actual: &Type) -> bool {
    match (expected, actual) {
        (Type::Bottom, _) | (_, Type::Bottom) => true,
        (
            Type::Named {
                decl: d1,
                args: a1,
                ..
            },
            Type::Named {
                decl: d2,
                args: a2,
                ..
            },
        ) => d1 == d2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| types_match(x, y)),
        (Type::List(a), Type::List(b)) => types_match(a, b),
        (Type::Map(k1, v1), Type::Map(k2, v2)) => types_match(k1, k2) && types_match(v1, v2),
        (Type::Tuple(a1, b1), Type::Tuple(a2, b2)) => types_match(a1, a2) && types_match(b1, b2),
        (Type::Func(s1), Type::Func(s2)) => {
            s1.params.len() == s2.params.len()
                && s1
                    .params
                    .iter()
                    .zip(&s2.params)
                    .all(|(x, y)| types_match(x, y))
                && types_match(&s1.ret, &s2.ret)
        }
        (a, b) => a == b,
    }
}

/// Merge two branch types: a non-`Bottom` side wins.
pub fn join_types(a: &Type, b: &Type) -> Type {
    if matches!(a, Type::Bottom) {
        b.widen()
    } else {
        a.widen()
    }
}

#[derive(Clone, Debug)]
pub struct VariantDef {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Clone, Debug)]
pub enum TypeDefKind {
    Struct { fields: Vec<(String, Type)> },
    Enum { variants: Vec<VariantDef> },
}

/// A user (or prelude) type declaration. Field types of generic declarations
/// contain `Type::Param` placeholders.
#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub params: Vec<String>,
    pub kind: TypeDefKind,
    pub site: Site,
}

impl TypeDef {
    /// Field list of a struct, or of one enum variant, instantiated with the
    /// given type arguments.
    pub fn fields_of(&self, variant: Option<usize>, args: &[Type]) -> Vec<(String, Type)> {
        let map: BTreeMap<String, Type> = self
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let raw = match (&self.kind, variant) {
            (TypeDefKind::Struct { fields }, None) => fields,
            (TypeDefKind::Enum { variants }, Some(v)) => &variants[v].fields,
            _ => return Vec::new(),
        };
        raw.iter()
            .map(|(n, t)| (n.clone(), t.subst(&map)))
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeDefs {
    pub defs: Vec<TypeDef>,
    by_name: BTreeMap<String, DeclId>,
}

impl TypeDefs {
    pub fn insert(&mut self, def: TypeDef) -> Option<DeclId> {
        if self.by_name.contains_key(&def.name) {
            return None;
        }
        let id = self.defs.len();
        self.by_name.insert(def.name.clone(), id);
        self.defs.push(def);
        Some(id)
    }

    pub fn lookup(&self, name: &str) -> Option<DeclId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: DeclId) -> &TypeDef {
        &self.defs[id]
    }

    pub fn variant_index(&self, id: DeclId, name: &str) -> Option<usize> {
        match &self.defs[id].kind {
            TypeDefKind::Enum { variants } => variants.iter().position(|v| v.name == name),
            _ => None,
        }
    }
}

