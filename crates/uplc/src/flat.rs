use anyhow::{anyhow, bail, Result};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};
use std::rc::Rc;

use crate::builtin::Builtin;
use crate::term::{Const, ConstType, Program, Term, TermKind};

// Wire format: a bit-packed stream. 4-bit term tags (0=var 1=delay 2=lambda
// 3=apply 4=constant 5=force 6=error 7=builtin), ULEB128-chunked naturals,
// zig-zag integers, byte-aligned length-chunked bytestrings, constant types
// as 1-bit-cons/4-bit-tag lists, 7-bit builtin ids, three-component version
// header, final padding byte.

const TAG_VAR: u64 = 0;
const TAG_DELAY: u64 = 1;
const TAG_LAMBDA: u64 = 2;
const TAG_APPLY: u64 = 3;
const TAG_CONSTANT: u64 = 4;
const TAG_FORCE: u64 = 5;
const TAG_ERROR: u64 = 6;
const TAG_BUILTIN: u64 = 7;

const TY_INT: u64 = 0;
const TY_BYTES: u64 = 1;
const TY_STR: u64 = 2;
const TY_UNIT: u64 = 3;
const TY_BOOL: u64 = 4;
const TY_PROTO_LIST: u64 = 5;
const TY_PROTO_PAIR: u64 = 6;
const TY_APPLY: u64 = 7;
const TY_DATA: u64 = 8;

struct BitWriter {
    buf: Vec<u8>,
    // bits already used in the trailing partial byte, 0..8
    used: u8,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter { buf: Vec::new(), used: 0 }
    }

    fn write_bit(&mut self, bit: bool) {
        if self.used == 0 {
            self.buf.push(0);
        }
        if bit {
            let last = self.buf.last_mut().unwrap();
            *last |= 0x80 >> self.used;
        }
        self.used = (self.used + 1) % 8;
    }

    fn write_bits(&mut self, n: u8, v: u64) {
        for i in (0..n).rev() {
            self.write_bit((v >> i) & 1 == 1);
        }
    }

    fn write_byte(&mut self, b: u8) {
        self.write_bits(8, b as u64);
    }

    /// Zero filler closed by a one bit, ending exactly on a byte boundary.
    fn pad(&mut self) {
        let fill = 8 - self.used;
        self.write_bits(fill, 1);
    }

    fn natural(&mut self, mut v: u64) {
        while v > 0x7f {
            self.write_byte(0x80 | (v & 0x7f) as u8);
            v >>= 7;
        }
        self.write_byte(v as u8);
    }

    fn big_natural(&mut self, v: &BigUint) {
        let mut v = v.clone();
        let mask = BigUint::from(0x7fu8);
        loop {
            let chunk = (&v & &mask).to_u8().unwrap();
            v >>= 7;
            if v.is_zero() {
                self.write_byte(chunk);
                break;
            }
            self.write_byte(0x80 | chunk);
        }
    }

    fn integer(&mut self, z: &BigInt) {
        // zig-zag: n >= 0 -> 2n, n < 0 -> -2n - 1
        let n: BigUint = if z.sign() == Sign::Minus {
            ((-z) * 2u8 - 1u8).magnitude().clone()
        } else {
            (z * 2u8).magnitude().clone()
        };
        self.big_natural(&n);
    }

    fn bytestring(&mut self, b: &[u8]) {
        self.pad();
        for chunk in b.chunks(255) {
            self.write_byte(chunk.len() as u8);
            for &byte in chunk {
                self.write_byte(byte);
            }
        }
        self.write_byte(0);
    }

    fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.buf
    }
}

fn type_tags(t: &ConstType, out: &mut Vec<u64>) {
    match t {
        ConstType::Int => out.push(TY_INT),
        ConstType::Bytes => out.push(TY_BYTES),
        ConstType::Str => out.push(TY_STR),
        ConstType::Unit => out.push(TY_UNIT),
        ConstType::Bool => out.push(TY_BOOL),
        ConstType::Data => out.push(TY_DATA),
        ConstType::List(e) => {
            out.push(TY_APPLY);
            out.push(TY_PROTO_LIST);
            type_tags(e, out);
        }
        ConstType::Pair(a, b) => {
            out.push(TY_APPLY);
            out.push(TY_APPLY);
            out.push(TY_PROTO_PAIR);
            type_tags(a, out);
            type_tags(b, out);
        }
    }
}

fn enc_const_payload(w: &mut BitWriter, c: &Const) {
    match c {
        Const::Int(z) => w.integer(z),
        Const::Bytes(b) => w.bytestring(b),
        Const::Str(s) => w.bytestring(s.as_bytes()),
        Const::Unit => {}
        Const::Bool(b) => w.write_bit(*b),
        Const::Data(d) => w.bytestring(&datacore::encode(d)),
        Const::List(_, xs) => {
            for x in xs {
                w.write_bit(true);
                enc_const_payload(w, x);
            }
            w.write_bit(false);
        }
        Const::Pair(a, b) => {
            enc_const_payload(w, a);
            enc_const_payload(w, b);
        }
    }
}

fn enc_term(w: &mut BitWriter, t: &Term) {
    match &t.kind {
        TermKind::Var(idx) => {
            w.write_bits(4, TAG_VAR);
            // wire indices are 1-based
            w.natural(*idx as u64 + 1);
        }
        TermKind::Delay(x) => {
            w.write_bits(4, TAG_DELAY);
            enc_term(w, x);
        }
        TermKind::Lambda(x) => {
            w.write_bits(4, TAG_LAMBDA);
            enc_term(w, x);
        }
        TermKind::Apply(f, x) => {
            w.write_bits(4, TAG_APPLY);
            enc_term(w, f);
            enc_term(w, x);
        }
        TermKind::Constant(c) => {
            w.write_bits(4, TAG_CONSTANT);
            let mut tags = Vec::new();
            type_tags(&c.ty(), &mut tags);
            for tag in tags {
                w.write_bit(true);
                w.write_bits(4, tag);
            }
            w.write_bit(false);
            enc_const_payload(w, c);
        }
        TermKind::Force(x) => {
            w.write_bits(4, TAG_FORCE);
            enc_term(w, x);
        }
        TermKind::Error => {
            w.write_bits(4, TAG_ERROR);
        }
        TermKind::Builtin(b) => {
            w.write_bits(4, TAG_BUILTIN);
            w.write_bits(7, *b as u64);
        }
    }
}

/// Deterministic binary encoding of a program.
pub fn encode(p: &Program) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.natural(p.version.0 as u64);
    w.natural(p.version.1 as u64);
    w.natural(p.version.2 as u64);
    enc_term(&mut w, &p.term);
    w.finish()
}

struct BitReader<'a> {
    s: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitReader<'a> {
    fn new(s: &'a [u8]) -> Self {
        BitReader { s, byte: 0, bit: 0 }
    }

    fn read_bit(&mut self) -> Result<bool> {
        let b = *self
            .s
            .get(self.byte)
            .ok_or_else(|| anyhow!("DECODE_EOF"))?;
        let bit = (b >> (7 - self.bit)) & 1 == 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
        Ok(bit)
    }

    fn read_bits(&mut self, n: u8) -> Result<u64> {
        let mut v = 0u64;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u64;
        }
        Ok(v)
    }

    fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    fn natural(&mut self) -> Result<u64> {
        let mut v = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.read_byte()?;
            if shift >= 63 {
                bail!("DECODE_NATURAL_OVERFLOW");
            }
            v |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }

    fn big_natural(&mut self) -> Result<BigUint> {
        let mut v = BigUint::zero();
        let mut shift = 0u64;
        loop {
            let b = self.read_byte()?;
            v |= BigUint::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }

    fn integer(&mut self) -> Result<BigInt> {
        let n = BigInt::from(self.big_natural()?);
        Ok(if (&n % 2u8).is_one() {
            -((n + 1i32) / 2i32)
        } else {
            n / 2i32
        })
    }

    fn bytestring(&mut self) -> Result<Vec<u8>> {
        self.align()?;
        let mut out = Vec::new();
        loop {
            let len = self.read_byte()? as usize;
            if len == 0 {
                return Ok(out);
            }
            for _ in 0..len {
                out.push(self.read_byte()?);
            }
        }
    }

    fn align(&mut self) -> Result<()> {
        let mut saw_one = false;
        while self.bit != 0 {
            if self.read_bit()? {
                saw_one = true;
            } else if saw_one {
                bail!("DECODE_BAD_PADDING");
            }
        }
        // an aligned filler is a whole 0x01 byte
        if !saw_one {
            if self.read_byte()? != 0x01 {
                bail!("DECODE_BAD_PADDING");
            }
        }
        Ok(())
    }
}

fn dec_type(tags: &[u64], pos: &mut usize) -> Result<ConstType> {
    let tag = *tags.get(*pos).ok_or_else(|| anyhow!("DECODE_BAD_TYPE"))?;
    *pos += 1;
    Ok(match tag {
        TY_INT => ConstType::Int,
        TY_BYTES => ConstType::Bytes,
        TY_STR => ConstType::Str,
        TY_UNIT => ConstType::Unit,
        TY_BOOL => ConstType::Bool,
        TY_DATA => ConstType::Data,
        TY_APPLY => {
            let next = *tags.get(*pos).ok_or_else(|| anyhow!("DECODE_BAD_TYPE"))?;
            if next == TY_PROTO_LIST {
                *pos += 1;
                ConstType::list_of(dec_type(tags, pos)?)
            } else if next == TY_APPLY {
                *pos += 1;
                let pair = *tags.get(*pos).ok_or_else(|| anyhow!("DECODE_BAD_TYPE"))?;
                if pair != TY_PROTO_PAIR {
                    bail!("DECODE_BAD_TYPE");
                }
                *pos += 1;
                let a = dec_type(tags, pos)?;
                let b = dec_type(tags, pos)?;
                ConstType::pair_of(a, b)
            } else {
                bail!("DECODE_BAD_TYPE");
            }
        }
        _ => bail!("DECODE_BAD_TYPE"),
    })
}

fn dec_const_payload(r: &mut BitReader<'_>, t: &ConstType) -> Result<Const> {
    Ok(match t {
        ConstType::Int => Const::Int(r.integer()?),
        ConstType::Bytes => Const::Bytes(r.bytestring()?),
        ConstType::Str => {
            Const::Str(String::from_utf8(r.bytestring()?).map_err(|_| anyhow!("DECODE_BAD_UTF8"))?)
        }
        ConstType::Unit => Const::Unit,
        ConstType::Bool => Const::Bool(r.read_bit()?),
        ConstType::Data => {
            let bytes = r.bytestring()?;
            Const::Data(datacore::decode(&bytes).map_err(|e| anyhow!("{}", e))?)
        }
        ConstType::List(e) => {
            let mut xs = Vec::new();
            while r.read_bit()? {
                xs.push(dec_const_payload(r, e)?);
            }
            Const::List((**e).clone(), xs)
        }
        ConstType::Pair(a, b) => {
            let x = dec_const_payload(r, a)?;
            let y = dec_const_payload(r, b)?;
            Const::pair(x, y)
        }
    })
}

fn dec_term(r: &mut BitReader<'_>, depth: u32) -> Result<Term> {
    if depth > 4096 {
        bail!("DECODE_TOO_DEEP");
    }
    let tag = r.read_bits(4)?;
    Ok(match tag {
        TAG_VAR => {
            let idx = r.natural()?;
            if idx == 0 {
                bail!("DECODE_BAD_INDEX");
            }
            Term::var((idx - 1) as u32)
        }
        TAG_DELAY => Term::new(TermKind::Delay(Rc::new(dec_term(r, depth + 1)?))),
        TAG_LAMBDA => Term::new(TermKind::Lambda(Rc::new(dec_term(r, depth + 1)?))),
        TAG_APPLY => {
            let f = dec_term(r, depth + 1)?;
            let x = dec_term(r, depth + 1)?;
            Term::apply(f, x)
        }
        TAG_CONSTANT => {
            let mut tags = Vec::new();
            while r.read_bit()? {
                tags.push(r.read_bits(4)?);
            }
            let mut pos = 0;
            let ty = dec_type(&tags, &mut pos)?;
            if pos != tags.len() {
                bail!("DECODE_BAD_TYPE");
            }
            Term::constant(dec_const_payload(r, &ty)?)
        }
        TAG_FORCE => Term::force(dec_term(r, depth + 1)?),
        TAG_ERROR => Term::new(TermKind::Error),
        TAG_BUILTIN => {
            let id = r.read_bits(7)? as u8;
            Term::builtin(Builtin::from_id(id).ok_or_else(|| anyhow!("DECODE_BAD_BUILTIN"))?)
        }
        _ => unreachable!("4-bit tag"),
    })
}

/// Decode a program. Decoded terms carry no sites.
pub fn decode(bytes: &[u8]) -> Result<Program> {
    let mut r = BitReader::new(bytes);
    let version = (
        r.natural()? as u32,
        r.natural()? as u32,
        r.natural()? as u32,
    );
    let term = dec_term(&mut r, 0)?;
    r.align()?;
    if r.byte != bytes.len() {
        bail!("DECODE_TRAILING_BYTES");
    }
    Ok(Program { version, term })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Site;

    fn roundtrip(t: Term) {
        let p = Program::new(t);
        let bytes = encode(&p);
        let q = decode(&bytes).unwrap();
        assert_eq!(q.version, p.version);
        assert_eq!(q.term, strip_sites(&p.term));
        // determinism
        assert_eq!(encode(&p), bytes);
    }

    fn strip_sites(t: &Term) -> Term {
        let kind = match &t.kind {
            TermKind::Delay(x) => TermKind::Delay(Rc::new(strip_sites(x))),
            TermKind::Lambda(x) => TermKind::Lambda(Rc::new(strip_sites(x))),
            TermKind::Force(x) => TermKind::Force(Rc::new(strip_sites(x))),
            TermKind::Apply(f, x) => {
                TermKind::Apply(Rc::new(strip_sites(f)), Rc::new(strip_sites(x)))
            }
            k => k.clone(),
        };
        Term::new(kind)
    }

    #[test]
    fn roundtrip_core_shapes() {
        roundtrip(Term::lam(Term::var(0)));
        roundtrip(Term::apply(
            Term::apply(Term::builtin(Builtin::AddInteger), Term::constant(Const::int(-5))),
            Term::constant(Const::int(1_000_000)),
        ));
        roundtrip(Term::force(Term::delay(Term::new(TermKind::Error))));
        roundtrip(Term::constant(Const::Bytes(vec![0xde, 0xad, 0xbe, 0xef])));
        roundtrip(Term::constant(Const::Str("déjà".to_string())));
        roundtrip(Term::constant(Const::Bool(true)));
        roundtrip(Term::constant(Const::Unit));
    }

    #[test]
    fn roundtrip_structured_constants() {
        use datacore::Data;
        roundtrip(Term::constant(Const::Data(Data::constr(
            1,
            vec![Data::int(7), Data::bytes(vec![1, 2, 3])],
        ))));
        roundtrip(Term::constant(Const::list_data(vec![])));
        roundtrip(Term::constant(Const::list_data(vec![Data::int(1), Data::int(2)])));
        roundtrip(Term::constant(Const::pair(
            Const::int(3),
            Const::list_data(vec![Data::int(9)]),
        )));
    }

    #[test]
    fn sites_do_not_change_the_encoding() {
        let plain = Term::lam(Term::var(0));
        let mut sited = Term::lam(Term::var(0));
        sited.site = Some(Site::new(0, 4));
        assert_eq!(
            encode(&Program::new(plain)),
            encode(&Program::new(sited))
        );
    }

    #[test]
    fn version_header_is_uleb() {
        let p = Program {
            version: (1, 200, 3),
            term: Term::new(TermKind::Error),
        };
        let bytes = encode(&p);
        // 1, then 200 as two chunks, then 3
        assert_eq!(&bytes[..4], &[0x01, 0xc8, 0x01, 0x03]);
        assert_eq!(decode(&bytes).unwrap().version, (1, 200, 3));
    }
}
