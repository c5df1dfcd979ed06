use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use sha2::{Digest, Sha256};

use datacore::Data;

use crate::term::{Const, ConstType};

/// The builtin primitives the emitter targets. Discriminants are the 7-bit
/// wire ids; gaps are ids this pipeline never emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Builtin {
    AddInteger = 0,
    SubtractInteger = 1,
    MultiplyInteger = 2,
    DivideInteger = 3,
    QuotientInteger = 4,
    RemainderInteger = 5,
    ModInteger = 6,
    EqualsInteger = 7,
    LessThanInteger = 8,
    LessThanEqualsInteger = 9,
    AppendByteString = 10,
    ConsByteString = 11,
    SliceByteString = 12,
    LengthOfByteString = 13,
    IndexByteString = 14,
    EqualsByteString = 15,
    LessThanByteString = 16,
    LessThanEqualsByteString = 17,
    Sha2_256 = 18,
    AppendString = 22,
    EqualsString = 23,
    EncodeUtf8 = 24,
    DecodeUtf8 = 25,
    IfThenElse = 26,
    ChooseUnit = 27,
    Trace = 28,
    FstPair = 29,
    SndPair = 30,
    ChooseList = 31,
    MkCons = 32,
    HeadList = 33,
    TailList = 34,
    NullList = 35,
    ConstrData = 37,
    MapData = 38,
    ListData = 39,
    IData = 40,
    BData = 41,
    UnConstrData = 42,
    UnMapData = 43,
    UnListData = 44,
    UnIData = 45,
    UnBData = 46,
    EqualsData = 47,
    MkPairData = 48,
    MkNilData = 49,
    MkNilPairData = 50,
    SerialiseData = 51,
}

pub const ALL: &[Builtin] = &[
    Builtin::AddInteger,
    Builtin::SubtractInteger,
    Builtin::MultiplyInteger,
    Builtin::DivideInteger,
    Builtin::QuotientInteger,
    Builtin::RemainderInteger,
    Builtin::ModInteger,
    Builtin::EqualsInteger,
    Builtin::LessThanInteger,
    Builtin::LessThanEqualsInteger,
    Builtin::AppendByteString,
    Builtin::ConsByteString,
    Builtin::SliceByteString,
    Builtin::LengthOfByteString,
    Builtin::IndexByteString,
    Builtin::EqualsByteString,
    Builtin::LessThanByteString,
    Builtin::LessThanEqualsByteString,
    Builtin::Sha2_256,
    Builtin::AppendString,
    Builtin::EqualsString,
    Builtin::EncodeUtf8,
    Builtin::DecodeUtf8,
    Builtin::IfThenElse,
    Builtin::ChooseUnit,
    Builtin::Trace,
    Builtin::FstPair,
    Builtin::SndPair,
    Builtin::ChooseList,
    Builtin::MkCons,
    Builtin::HeadList,
    Builtin::TailList,
    Builtin::NullList,
    Builtin::ConstrData,
    Builtin::MapData,
    Builtin::ListData,
    Builtin::IData,
    Builtin::BData,
    Builtin::UnConstrData,
    Builtin::UnMapData,
    Builtin::UnListData,
    Builtin::UnIData,
    Builtin::UnBData,
    Builtin::EqualsData,
    Builtin::MkPairData,
    Builtin::MkNilData,
    Builtin::MkNilPairData,
    Builtin::SerialiseData,
];

impl Builtin {
    pub fn from_id(id: u8) -> Option<Builtin> {
        ALL.iter().copied().find(|b| *b as u8 == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::AddInteger => "addInteger",
            Builtin::SubtractInteger => "subtractInteger",
            Builtin::MultiplyInteger => "multiplyInteger",
            Builtin::DivideInteger => "divideInteger",
            Builtin::QuotientInteger => "quotientInteger",
            Builtin::RemainderInteger => "remainderInteger",
            Builtin::ModInteger => "modInteger",
            Builtin::EqualsInteger => "equalsInteger",
            Builtin::LessThanInteger => "lessThanInteger",
            Builtin::LessThanEqualsInteger => "lessThanEqualsInteger",
            Builtin::AppendByteString => "appendByteString",
            Builtin::ConsByteString => "consByteString",
            Builtin::SliceByteString => "sliceByteString",
            Builtin::LengthOfByteString => "lengthOfByteString",
            Builtin::IndexByteString => "indexByteString",
            Builtin::EqualsByteString => "equalsByteString",
            Builtin::LessThanByteString => "lessThanByteString",
            Builtin::LessThanEqualsByteString => "lessThanEqualsByteString",
            Builtin::Sha2_256 => "sha2_256",
            Builtin::AppendString => "appendString",
            Builtin::EqualsString => "equalsString",
            Builtin::EncodeUtf8 => "encodeUtf8",
            Builtin::DecodeUtf8 => "decodeUtf8",
            Builtin::IfThenElse => "ifThenElse",
            Builtin::ChooseUnit => "chooseUnit",
            Builtin::Trace => "trace",
            Builtin::FstPair => "fstPair",
            Builtin::SndPair => "sndPair",
            Builtin::ChooseList => "chooseList",
            Builtin::MkCons => "mkCons",
            Builtin::HeadList => "headList",
            Builtin::TailList => "tailList",
            Builtin::NullList => "nullList",
            Builtin::ConstrData => "constrData",
            Builtin::MapData => "mapData",
            Builtin::ListData => "listData",
            Builtin::IData => "iData",
            Builtin::BData => "bData",
            Builtin::UnConstrData => "unConstrData",
            Builtin::UnMapData => "unMapData",
            Builtin::UnListData => "unListData",
            Builtin::UnIData => "unIData",
            Builtin::UnBData => "unBData",
            Builtin::EqualsData => "equalsData",
            Builtin::MkPairData => "mkPairData",
            Builtin::MkNilData => "mkNilData",
            Builtin::MkNilPairData => "mkNilPairData",
            Builtin::SerialiseData => "serialiseData",
        }
    }

    pub fn by_name(name: &str) -> Option<Builtin> {
        ALL.iter().copied().find(|b| b.name() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Sha2_256
            | Builtin::LengthOfByteString
            | Builtin::EncodeUtf8
            | Builtin::DecodeUtf8
            | Builtin::FstPair
            | Builtin::SndPair
            | Builtin::HeadList
            | Builtin::TailList
            | Builtin::NullList
            | Builtin::MapData
            | Builtin::ListData
            | Builtin::IData
            | Builtin::BData
            | Builtin::UnConstrData
            | Builtin::UnMapData
            | Builtin::UnListData
            | Builtin::UnIData
            | Builtin::UnBData
            | Builtin::MkNilData
            | Builtin::MkNilPairData
            | Builtin::SerialiseData => 1,
            Builtin::SliceByteString | Builtin::IfThenElse | Builtin::ChooseList => 3,
            _ => 2,
        }
    }

    /// Number of type-level `force`s a use site must apply before arguments.
    pub fn forces(self) -> u8 {
        match self {
            Builtin::IfThenElse
            | Builtin::ChooseUnit
            | Builtin::Trace
            | Builtin::MkCons
            | Builtin::HeadList
            | Builtin::TailList
            | Builtin::NullList => 1,
            Builtin::FstPair | Builtin::SndPair | Builtin::ChooseList => 2,
            _ => 0,
        }
    }

    /// Builtins the machine resolves over constants only; the complement
    /// (`ifThenElse`, `chooseUnit`, `chooseList`, `trace`) passes through
    /// arbitrary machine values and is handled structurally.
    pub fn is_const_builtin(self) -> bool {
        !matches!(
            self,
            Builtin::IfThenElse | Builtin::ChooseUnit | Builtin::ChooseList | Builtin::Trace
        )
    }

    /// Safe to evaluate at compile time: constant in, constant out, no log.
    pub fn is_pure(self) -> bool {
        self.is_const_builtin()
    }
}

fn int(args: &[Const], i: usize) -> Result<&BigInt, String> {
    match &args[i] {
        Const::Int(z) => Ok(z),
        c => Err(format!("expected integer, got {:?}", c.ty())),
    }
}

fn bytes<'a>(args: &'a [Const], i: usize) -> Result<&'a [u8], String> {
    match &args[i] {
        Const::Bytes(b) => Ok(b),
        c => Err(format!("expected bytestring, got {:?}", c.ty())),
    }
}

fn string<'a>(args: &'a [Const], i: usize) -> Result<&'a str, String> {
    match &args[i] {
        Const::Str(s) => Ok(s),
        c => Err(format!("expected string, got {:?}", c.ty())),
    }
}

fn data<'a>(args: &'a [Const], i: usize) -> Result<&'a Data, String> {
    match &args[i] {
        Const::Data(d) => Ok(d),
        c => Err(format!("expected data, got {:?}", c.ty())),
    }
}

fn list<'a>(args: &'a [Const], i: usize) -> Result<(&'a ConstType, &'a [Const]), String> {
    match &args[i] {
        Const::List(t, xs) => Ok((t, xs)),
        c => Err(format!("expected list, got {:?}", c.ty())),
    }
}

fn data_of(c: &Const) -> Result<Data, String> {
    match c {
        Const::Data(d) => Ok(d.clone()),
        c => Err(format!("expected data, got {:?}", c.ty())),
    }
}

// Floor division; `/` in the source language maps to quotient semantics,
// but the full Plutus quartet is implemented.
fn div_floor(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    if (a % b).is_zero() || (a.is_negative() == b.is_negative()) {
        q
    } else {
        q - 1
    }
}

fn mod_floor(a: &BigInt, b: &BigInt) -> BigInt {
    a - b * div_floor(a, b)
}

/// Evaluate a constant builtin over constant arguments. Shared between the
/// machine and the compile-time constant folder so both agree exactly,
/// including on failure messages.
pub fn eval_pure(b: Builtin, args: &[Const]) -> Result<Const, String> {
    debug_assert_eq!(args.len(), b.arity());
    match b {
        Builtin::AddInteger => Ok(Const::Int(int(args, 0)? + int(args, 1)?)),
        Builtin::SubtractInteger => Ok(Const::Int(int(args, 0)? - int(args, 1)?)),
        Builtin::MultiplyInteger => Ok(Const::Int(int(args, 0)? * int(args, 1)?)),
        Builtin::DivideInteger => {
            let (a, d) = (int(args, 0)?, int(args, 1)?);
            if d.is_zero() {
                return Err("division by zero".to_string());
            }
            Ok(Const::Int(div_floor(a, d)))
        }
        Builtin::QuotientInteger => {
            let (a, d) = (int(args, 0)?, int(args, 1)?);
            if d.is_zero() {
                return Err("division by zero".to_string());
            }
            Ok(Const::Int(a / d))
        }
        Builtin::RemainderInteger => {
            let (a, d) = (int(args, 0)?, int(args, 1)?);
            if d.is_zero() {
                return Err("division by zero".to_string());
            }
            Ok(Const::Int(a % d))
        }
        Builtin::ModInteger => {
            let (a, d) = (int(args, 0)?, int(args, 1)?);
            if d.is_zero() {
                return Err("division by zero".to_string());
            }
            Ok(Const::Int(mod_floor(a, d)))
        }
        Builtin::EqualsInteger => Ok(Const::Bool(int(args, 0)? == int(args, 1)?)),
        Builtin::LessThanInteger => Ok(Const::Bool(int(args, 0)? < int(args, 1)?)),
        Builtin::LessThanEqualsInteger => Ok(Const::Bool(int(args, 0)? <= int(args, 1)?)),
        Builtin::AppendByteString => {
            let mut out = bytes(args, 0)?.to_vec();
            out.extend_from_slice(bytes(args, 1)?);
            Ok(Const::Bytes(out))
        }
        Builtin::ConsByteString => {
            let h = int(args, 0)?
                .to_u8()
                .ok_or_else(|| "byte out of range".to_string())?;
            let mut out = Vec::with_capacity(bytes(args, 1)?.len() + 1);
            out.push(h);
            out.extend_from_slice(bytes(args, 1)?);
            Ok(Const::Bytes(out))
        }
        Builtin::SliceByteString => {
            let start = int(args, 0)?.to_i128().unwrap_or(i128::MAX).max(0) as usize;
            let n = int(args, 1)?.to_i128().unwrap_or(i128::MAX).max(0) as usize;
            let b = bytes(args, 2)?;
            let from = start.min(b.len());
            let to = (start.saturating_add(n)).min(b.len());
            Ok(Const::Bytes(b[from..to].to_vec()))
        }
        Builtin::LengthOfByteString => Ok(Const::int(bytes(args, 0)?.len() as u64)),
        Builtin::IndexByteString => {
            let b = bytes(args, 0)?;
            let i = int(args, 1)?;
            match i.to_usize() {
                Some(i) if i < b.len() => Ok(Const::int(b[i])),
                _ => Err("index out of range".to_string()),
            }
        }
        Builtin::EqualsByteString => Ok(Const::Bool(bytes(args, 0)? == bytes(args, 1)?)),
        Builtin::LessThanByteString => Ok(Const::Bool(bytes(args, 0)? < bytes(args, 1)?)),
        Builtin::LessThanEqualsByteString => Ok(Const::Bool(bytes(args, 0)? <= bytes(args, 1)?)),
        Builtin::Sha2_256 => {
            let mut h = Sha256::new();
            h.update(bytes(args, 0)?);
            Ok(Const::Bytes(h.finalize().to_vec()))
        }
        Builtin::AppendString => {
            let mut out = String::with_capacity(string(args, 0)?.len() + string(args, 1)?.len());
            out.push_str(string(args, 0)?);
            out.push_str(string(args, 1)?);
            Ok(Const::Str(out))
        }
        Builtin::EqualsString => Ok(Const::Bool(string(args, 0)? == string(args, 1)?)),
        Builtin::EncodeUtf8 => Ok(Const::Bytes(string(args, 0)?.as_bytes().to_vec())),
        Builtin::DecodeUtf8 => match String::from_utf8(bytes(args, 0)?.to_vec()) {
            Ok(s) => Ok(Const::Str(s)),
            Err(_) => Err("invalid utf-8".to_string()),
        },
        Builtin::FstPair => match &args[0] {
            Const::Pair(a, _) => Ok((**a).clone()),
            c => Err(format!("expected pair, got {:?}", c.ty())),
        },
        Builtin::SndPair => match &args[0] {
            Const::Pair(_, b) => Ok((**b).clone()),
            c => Err(format!("expected pair, got {:?}", c.ty())),
        },
        Builtin::MkCons => {
            let (t, xs) = list(args, 1)?;
            if args[0].ty() != *t {
                return Err("list element type mismatch".to_string());
            }
            let mut out = Vec::with_capacity(xs.len() + 1);
            out.push(args[0].clone());
            out.extend_from_slice(xs);
            Ok(Const::List(t.clone(), out))
        }
        Builtin::HeadList => {
            let (_, xs) = list(args, 0)?;
            xs.first().cloned().ok_or_else(|| "empty list".to_string())
        }
        Builtin::TailList => {
            let (t, xs) = list(args, 0)?;
            if xs.is_empty() {
                return Err("empty list".to_string());
            }
            Ok(Const::List(t.clone(), xs[1..].to_vec()))
        }
        Builtin::NullList => {
            let (_, xs) = list(args, 0)?;
            Ok(Const::Bool(xs.is_empty()))
        }
        Builtin::ConstrData => {
            let tag = int(args, 0)?
                .to_u64()
                .ok_or_else(|| "constr tag out of range".to_string())?;
            let (t, xs) = list(args, 1)?;
            if *t != ConstType::Data {
                return Err("expected list of data".to_string());
            }
            let fields = xs.iter().map(data_of).collect::<Result<Vec<_>, _>>()?;
            Ok(Const::Data(Data::Constr(tag, fields)))
        }
        Builtin::MapData => {
            let (_, xs) = list(args, 0)?;
            let mut kvs = Vec::with_capacity(xs.len());
            for x in xs {
                match x {
                    Const::Pair(k, v) => kvs.push((data_of(k)?, data_of(v)?)),
                    c => return Err(format!("expected pair of data, got {:?}", c.ty())),
                }
            }
            Ok(Const::Data(Data::Map(kvs)))
        }
        Builtin::ListData => {
            let (t, xs) = list(args, 0)?;
            if *t != ConstType::Data {
                return Err("expected list of data".to_string());
            }
            let items = xs.iter().map(data_of).collect::<Result<Vec<_>, _>>()?;
            Ok(Const::Data(Data::List(items)))
        }
        Builtin::IData => Ok(Const::Data(Data::Int(int(args, 0)?.clone()))),
        Builtin::BData => Ok(Const::Data(Data::Bytes(bytes(args, 0)?.to_vec()))),
        Builtin::UnConstrData => match data(args, 0)? {
            Data::Constr(tag, fields) => Ok(Const::pair(
                Const::int(*tag),
                Const::list_data(fields.clone()),
            )),
            _ => Err("expected constr data".to_string()),
        },
        Builtin::UnMapData => match data(args, 0)? {
            Data::Map(kvs) => Ok(Const::List(
                ConstType::pair_of(ConstType::Data, ConstType::Data),
                kvs.iter()
                    .map(|(k, v)| Const::pair(Const::Data(k.clone()), Const::Data(v.clone())))
                    .collect(),
            )),
            _ => Err("expected map data".to_string()),
        },
        Builtin::UnListData => match data(args, 0)? {
            Data::List(xs) => Ok(Const::list_data(xs.clone())),
            _ => Err("expected list data".to_string()),
        },
        Builtin::UnIData => match data(args, 0)? {
            Data::Int(z) => Ok(Const::Int(z.clone())),
            _ => Err("expected integer data".to_string()),
        },
        Builtin::UnBData => match data(args, 0)? {
            Data::Bytes(b) => Ok(Const::Bytes(b.clone())),
            _ => Err("expected bytes data".to_string()),
        },
        Builtin::EqualsData => Ok(Const::Bool(data(args, 0)? == data(args, 1)?)),
        Builtin::MkPairData => Ok(Const::pair(
            Const::Data(data(args, 0)?.clone()),
            Const::Data(data(args, 1)?.clone()),
        )),
        Builtin::MkNilData => match &args[0] {
            Const::Unit => Ok(Const::List(ConstType::Data, vec![])),
            c => Err(format!("expected unit, got {:?}", c.ty())),
        },
        Builtin::MkNilPairData => match &args[0] {
            Const::Unit => Ok(Const::List(
                ConstType::pair_of(ConstType::Data, ConstType::Data),
                vec![],
            )),
            c => Err(format!("expected unit, got {:?}", c.ty())),
        },
        Builtin::SerialiseData => Ok(Const::Bytes(datacore::encode(data(args, 0)?))),
        Builtin::IfThenElse | Builtin::ChooseUnit | Builtin::ChooseList | Builtin::Trace => {
            unreachable!("structural builtin {:?} is handled by the machine", b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_roundtrip() {
        for &b in ALL {
            assert_eq!(Builtin::from_id(b as u8), Some(b));
            assert_eq!(Builtin::by_name(b.name()), Some(b));
        }
    }

    #[test]
    fn division_quartet_signs() {
        let run = |b, x: i64, y: i64| match eval_pure(b, &[Const::int(x), Const::int(y)]) {
            Ok(Const::Int(z)) => z.to_i64().unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(run(Builtin::QuotientInteger, -7, 2), -3);
        assert_eq!(run(Builtin::RemainderInteger, -7, 2), -1);
        assert_eq!(run(Builtin::DivideInteger, -7, 2), -4);
        assert_eq!(run(Builtin::ModInteger, -7, 2), 1);
    }

    #[test]
    fn division_by_zero_message() {
        for b in [
            Builtin::DivideInteger,
            Builtin::QuotientInteger,
            Builtin::RemainderInteger,
            Builtin::ModInteger,
        ] {
            let e = eval_pure(b, &[Const::int(1), Const::int(0)]).unwrap_err();
            assert_eq!(e, "division by zero");
        }
    }

    #[test]
    fn list_errors_use_canonical_messages() {
        let nil = Const::List(ConstType::Data, vec![]);
        assert_eq!(
            eval_pure(Builtin::HeadList, &[nil.clone()]).unwrap_err(),
            "empty list"
        );
        assert_eq!(
            eval_pure(Builtin::TailList, &[nil]).unwrap_err(),
            "empty list"
        );
        assert_eq!(
            eval_pure(Builtin::IndexByteString, &[Const::Bytes(vec![1]), Const::int(5)])
                .unwrap_err(),
            "index out of range"
        );
        assert_eq!(
            eval_pure(Builtin::DecodeUtf8, &[Const::Bytes(vec![0xff])]).unwrap_err(),
            "invalid utf-8"
        );
    }
}
