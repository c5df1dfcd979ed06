use num_bigint::BigInt;

/// The universal runtime value of compiled scripts. Every serializable
/// source-language value has exactly one `Data` form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Data {
    Int(BigInt),
    Bytes(Vec<u8>),
    List(Vec<Data>),
    // Invariant for Data::Map:
    // - insertion order is significant and preserved
    // - duplicate keys are allowed; lookup is first-match
    Map(Vec<(Data, Data)>),
    Constr(u64, Vec<Data>),
}

impl Data {
    pub fn int<I: Into<BigInt>>(i: I) -> Self {
        Data::Int(i.into())
    }

    pub fn bytes<B: Into<Vec<u8>>>(b: B) -> Self {
        Data::Bytes(b.into())
    }

    pub fn list(xs: Vec<Data>) -> Self {
        Data::List(xs)
    }

    pub fn map(kvs: Vec<(Data, Data)>) -> Self {
        Data::Map(kvs)
    }

    pub fn constr(tag: u64, fields: Vec<Data>) -> Self {
        Data::Constr(tag, fields)
    }

    // false = Constr(0, []), true = Constr(1, [])
    pub fn bool_(b: bool) -> Self {
        Data::Constr(if b { 1 } else { 0 }, vec![])
    }

    // Some(x) = Constr(0, [x]), None = Constr(1, [])
    pub fn some(x: Data) -> Self {
        Data::Constr(0, vec![x])
    }

    pub fn none() -> Self {
        Data::Constr(1, vec![])
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Constr(0, fs) if fs.is_empty() => Some(false),
            Data::Constr(1, fs) if fs.is_empty() => Some(true),
            _ => None,
        }
    }

    /// First-match lookup for `Map` data.
    pub fn lookup(&self, key: &Data) -> Option<&Data> {
        match self {
            Data::Map(kvs) => kvs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_encoding_is_fixed() {
        assert_eq!(Data::bool_(false), Data::Constr(0, vec![]));
        assert_eq!(Data::bool_(true), Data::Constr(1, vec![]));
        assert_eq!(Data::bool_(true).as_bool(), Some(true));
        assert_eq!(Data::Constr(2, vec![]).as_bool(), None);
    }

    #[test]
    fn map_lookup_is_first_match() {
        let m = Data::map(vec![
            (Data::int(1), Data::int(10)),
            (Data::int(1), Data::int(20)),
        ]);
        assert_eq!(m.lookup(&Data::int(1)), Some(&Data::int(10)));
        assert_eq!(m.lookup(&Data::int(3)), None);
    }

    #[test]
    fn equality_is_structural() {
        let a = Data::constr(0, vec![Data::int(1), Data::bytes(vec![0xaa])]);
        let b = Data::constr(0, vec![Data::int(1), Data::bytes(vec![0xaa])]);
        let c = Data::constr(1, vec![Data::int(1), Data::bytes(vec![0xaa])]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
