use std::rc::Rc;

use num_bigint::BigInt;

use datacore::Data;

use crate::builtin::Builtin;

/// A byte range in some compiled source. Sites never serialize; they exist
/// so diagnostics can point back at the text that produced a term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Site {
    pub start: u32,
    pub end: u32,
}

impl Site {
    pub fn new(start: usize, end: usize) -> Self {
        Site {
            start: start as u32,
            end: end as u32,
        }
    }

    pub fn covering(a: Site, b: Site) -> Self {
        Site {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// The type of a bytecode constant. Lists carry their element type so that
/// empty lists stay encodable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstType {
    Int,
    Bytes,
    Str,
    Unit,
    Bool,
    Data,
    List(Box<ConstType>),
    Pair(Box<ConstType>, Box<ConstType>),
}

impl ConstType {
    pub fn list_of(t: ConstType) -> Self {
        ConstType::List(Box::new(t))
    }

    pub fn pair_of(a: ConstType, b: ConstType) -> Self {
        ConstType::Pair(Box::new(a), Box::new(b))
    }
}

/// A typed bytecode constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Const {
    Int(BigInt),
    Bytes(Vec<u8>),
    Str(String),
    Unit,
    Bool(bool),
    Data(Data),
    List(ConstType, Vec<Const>),
    Pair(Box<Const>, Box<Const>),
}

impl Const {
    pub fn int<I: Into<BigInt>>(i: I) -> Self {
        Const::Int(i.into())
    }

    pub fn list_data(xs: Vec<Data>) -> Self {
        Const::List(ConstType::Data, xs.into_iter().map(Const::Data).collect())
    }

    pub fn pair(a: Const, b: Const) -> Self {
        Const::Pair(Box::new(a), Box::new(b))
    }

    pub fn ty(&self) -> ConstType {
        match self {
            Const::Int(_) => ConstType::Int,
            Const::Bytes(_) => ConstType::Bytes,
            Const::Str(_) => ConstType::Str,
            Const::Unit => ConstType::Unit,
            Const::Bool(_) => ConstType::Bool,
            Const::Data(_) => ConstType::Data,
            Const::List(t, _) => ConstType::list_of(t.clone()),
            Const::Pair(a, b) => ConstType::pair_of(a.ty(), b.ty()),
        }
    }

    /// Abstract size in 8-byte words, the unit all cost functions consume.
    pub fn size_words(&self) -> u64 {
        match self {
            Const::Int(z) => (z.bits() / 64) + 1,
            Const::Bytes(b) => (b.len() as u64 / 8) + 1,
            Const::Str(s) => (s.len() as u64 / 8) + 1,
            Const::Unit | Const::Bool(_) => 1,
            Const::Data(d) => data_size_words(d),
            Const::List(_, xs) => xs.iter().map(Const::size_words).sum::<u64>() + 1,
            Const::Pair(a, b) => a.size_words() + b.size_words() + 1,
        }
    }
}

fn data_size_words(d: &Data) -> u64 {
    4 + match d {
        Data::Int(z) => (z.bits() / 64) + 1,
        Data::Bytes(b) => (b.len() as u64 / 8) + 1,
        Data::List(xs) => xs.iter().map(data_size_words).sum(),
        Data::Map(kvs) => kvs
            .iter()
            .map(|(k, v)| data_size_words(k) + data_size_words(v))
            .sum(),
        Data::Constr(_, fs) => fs.iter().map(data_size_words).sum(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermKind {
    /// De Bruijn index; 0 is the innermost binder.
    Var(u32),
    Delay(Rc<Term>),
    Lambda(Rc<Term>),
    Apply(Rc<Term>, Rc<Term>),
    Constant(Const),
    Force(Rc<Term>),
    Error,
    Builtin(Builtin),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    pub kind: TermKind,
    pub site: Option<Site>,
}

impl Term {
    pub fn new(kind: TermKind) -> Self {
        Term { kind, site: None }
    }

    pub fn at(kind: TermKind, site: Site) -> Self {
        Term {
            kind,
            site: Some(site),
        }
    }

    pub fn var(idx: u32) -> Self {
        Term::new(TermKind::Var(idx))
    }

    pub fn lam(body: Term) -> Self {
        Term::new(TermKind::Lambda(Rc::new(body)))
    }

    pub fn apply(f: Term, x: Term) -> Self {
        Term::new(TermKind::Apply(Rc::new(f), Rc::new(x)))
    }

    pub fn delay(t: Term) -> Self {
        Term::new(TermKind::Delay(Rc::new(t)))
    }

    pub fn force(t: Term) -> Self {
        Term::new(TermKind::Force(Rc::new(t)))
    }

    pub fn constant(c: Const) -> Self {
        Term::new(TermKind::Constant(c))
    }

    pub fn builtin(b: Builtin) -> Self {
        Term::new(TermKind::Builtin(b))
    }

    pub fn node_count(&self) -> usize {
        1 + match &self.kind {
            TermKind::Delay(t) | TermKind::Lambda(t) | TermKind::Force(t) => t.node_count(),
            TermKind::Apply(f, x) => f.node_count() + x.node_count(),
            _ => 0,
        }
    }
}

/// A complete program: a language version header plus the root term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub version: (u32, u32, u32),
    pub term: Term,
}

impl Program {
    pub fn new(term: Term) -> Self {
        Program {
            version: (1, 0, 0),
            term,
        }
    }

    /// Wrap the root term in applications of the given constant arguments.
    pub fn apply_args(&self, args: &[Const]) -> Program {
        let mut t = self.term.clone();
        for a in args {
            t = Term::apply(t, Term::constant(a.clone()));
        }
        Program {
            version: self.version,
            term: t,
        }
    }

    /// The ordered (preorder offset, site) annotation list linking emitted
    /// terms back to original source positions.
    pub fn code_map(&self) -> Vec<(u32, Site)> {
        let mut out = Vec::new();
        let mut next = 0u32;
        collect_sites(&self.term, &mut next, &mut out);
        out
    }
}

fn collect_sites(t: &Term, next: &mut u32, out: &mut Vec<(u32, Site)>) {
    if let Some(site) = t.site {
        out.push((*next, site));
    }
    *next += 1;
    match &t.kind {
        TermKind::Delay(x) | TermKind::Lambda(x) | TermKind::Force(x) => {
            collect_sites(x, next, out)
        }
        TermKind::Apply(f, x) => {
            collect_sites(f, next, out);
            collect_sites(x, next, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_map_is_preorder_sorted() {
        let site = Site::new(3, 9);
        let t = Term::apply(Term::at(TermKind::Lambda(Rc::new(Term::var(0))), site), {
            let mut c = Term::constant(Const::int(1));
            c.site = Some(Site::new(11, 12));
            c
        });
        let p = Program::new(t);
        let map = p.code_map();
        assert_eq!(map.len(), 2);
        assert!(map[0].0 < map[1].0);
        assert_eq!(map[0].1, site);
    }
}
