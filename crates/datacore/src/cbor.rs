use anyhow::{anyhow, bail, Result};
use num_bigint::{BigInt, Sign};
use num_traits::ToPrimitive;

use crate::data::Data;

// Canonical CBOR form:
// - integers: major 0/1 when the magnitude fits u64, bignum tags 2/3 otherwise
// - byte strings: definite up to 64 bytes, indefinite 64-byte chunks beyond
// - lists: 0x80 when empty, indefinite otherwise
// - maps: 0xa0 when empty, indefinite otherwise
// - constr: tag 121+t for t in 0..=6, tag 1280+(t-7) for 7..=127,
//   tag 102 with [t, fields] beyond

const CHUNK: usize = 64;

pub fn encode(d: &Data) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    enc_data(&mut out, d);
    out
}

fn head(out: &mut Vec<u8>, major: u8, n: u64) {
    let m = major << 5;
    if n < 24 {
        out.push(m | n as u8);
    } else if n <= 0xff {
        out.push(m | 24);
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(m | 25);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        out.push(m | 26);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(m | 27);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

fn enc_bytes(out: &mut Vec<u8>, b: &[u8]) {
    if b.len() <= CHUNK {
        head(out, 2, b.len() as u64);
        out.extend_from_slice(b);
    } else {
        out.push(0x5f);
        for chunk in b.chunks(CHUNK) {
            head(out, 2, chunk.len() as u64);
            out.extend_from_slice(chunk);
        }
        out.push(0xff);
    }
}

fn enc_int(out: &mut Vec<u8>, z: &BigInt) {
    if let Some(u) = z.to_u64() {
        head(out, 0, u);
    } else if z.sign() == Sign::Minus {
        // -1 - n form
        let m = -z - 1u8;
        if let Some(u) = m.to_u64() {
            head(out, 1, u);
        } else {
            head(out, 6, 3);
            enc_bytes(out, &m.magnitude().to_bytes_be());
        }
    } else {
        head(out, 6, 2);
        enc_bytes(out, &z.magnitude().to_bytes_be());
    }
}

fn enc_fields(out: &mut Vec<u8>, fields: &[Data]) {
    if fields.is_empty() {
        out.push(0x80);
    } else {
        out.push(0x9f);
        for f in fields {
            enc_data(out, f);
        }
        out.push(0xff);
    }
}

fn enc_data(out: &mut Vec<u8>, d: &Data) {
    match d {
        Data::Int(z) => enc_int(out, z),
        Data::Bytes(b) => enc_bytes(out, b),
        Data::List(xs) => enc_fields(out, xs),
        Data::Map(kvs) => {
            if kvs.is_empty() {
                out.push(0xa0);
            } else {
                out.push(0xbf);
                for (k, v) in kvs {
                    enc_data(out, k);
                    enc_data(out, v);
                }
                out.push(0xff);
            }
        }
        Data::Constr(tag, fields) => {
            if *tag <= 6 {
                head(out, 6, 121 + tag);
                enc_fields(out, fields);
            } else if *tag <= 127 {
                head(out, 6, 1280 + (tag - 7));
                enc_fields(out, fields);
            } else {
                head(out, 6, 102);
                head(out, 4, 2);
                head(out, 0, *tag);
                enc_fields(out, fields);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodeError {
    pub code: String,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}
impl std::error::Error for DecodeError {}

pub fn decode(bytes: &[u8]) -> std::result::Result<Data, DecodeError> {
    match dec_inner(bytes) {
        Ok(v) => Ok(v),
        Err(e) => Err(DecodeError {
            code: format!("{}", e),
        }),
    }
}

fn dec_inner(bytes: &[u8]) -> Result<Data> {
    let mut rd = Reader { s: bytes, i: 0 };
    let d = dec_data(&mut rd)?;
    if rd.i != rd.s.len() {
        bail!("DECODE_TRAILING_BYTES");
    }
    Ok(d)
}

struct Reader<'a> {
    s: &'a [u8],
    i: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Result<u8> {
        self.s
            .get(self.i)
            .copied()
            .ok_or_else(|| anyhow!("DECODE_EOF"))
    }

    fn bump(&mut self) -> Result<u8> {
        let b = self.peek()?;
        self.i += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.i + n > self.s.len() {
            bail!("DECODE_EOF");
        }
        let out = &self.s[self.i..self.i + n];
        self.i += n;
        Ok(out)
    }

    fn head(&mut self) -> Result<(u8, u64)> {
        let b = self.bump()?;
        let major = b >> 5;
        let ai = b & 0x1f;
        let n = match ai {
            0..=23 => ai as u64,
            24 => self.bump()? as u64,
            25 => u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as u64,
            26 => u32::from_be_bytes(self.take(4)?.try_into().unwrap()) as u64,
            27 => u64::from_be_bytes(self.take(8)?.try_into().unwrap()),
            _ => bail!("DECODE_BAD_HEAD"),
        };
        Ok((major, n))
    }
}

fn dec_bytes_after_head(rd: &mut Reader<'_>, first: u8) -> Result<Vec<u8>> {
    if first == 0x5f {
        rd.bump()?;
        let mut out = Vec::new();
        loop {
            if rd.peek()? == 0xff {
                rd.bump()?;
                break;
            }
            let (major, n) = rd.head()?;
            if major != 2 || n as usize > CHUNK {
                bail!("DECODE_BAD_CHUNK");
            }
            out.extend_from_slice(rd.take(n as usize)?);
        }
        if out.len() <= CHUNK {
            bail!("DECODE_NONCANONICAL_BYTES");
        }
        Ok(out)
    } else {
        let (major, n) = rd.head()?;
        if major != 2 {
            bail!("DECODE_EXPECTED_BYTES");
        }
        if n as usize > CHUNK {
            bail!("DECODE_NONCANONICAL_BYTES");
        }
        Ok(rd.take(n as usize)?.to_vec())
    }
}

fn dec_fields(rd: &mut Reader<'_>) -> Result<Vec<Data>> {
    let first = rd.peek()?;
    if first == 0x80 {
        rd.bump()?;
        return Ok(vec![]);
    }
    if first != 0x9f {
        bail!("DECODE_EXPECTED_LIST");
    }
    rd.bump()?;
    let mut out = Vec::new();
    while rd.peek()? != 0xff {
        out.push(dec_data(rd)?);
    }
    rd.bump()?;
    if out.is_empty() {
        bail!("DECODE_NONCANONICAL_LIST");
    }
    Ok(out)
}

fn dec_data(rd: &mut Reader<'_>) -> Result<Data> {
    let first = rd.peek()?;
    match first >> 5 {
        2 => Ok(Data::Bytes(dec_bytes_after_head(rd, first)?)),
        4 => Ok(Data::List(dec_fields(rd)?)),
        5 => {
            if first == 0xa0 {
                rd.bump()?;
                return Ok(Data::Map(vec![]));
            }
            if first != 0xbf {
                bail!("DECODE_EXPECTED_MAP");
            }
            rd.bump()?;
            let mut kvs = Vec::new();
            while rd.peek()? != 0xff {
                let k = dec_data(rd)?;
                let v = dec_data(rd)?;
                kvs.push((k, v));
            }
            rd.bump()?;
            if kvs.is_empty() {
                bail!("DECODE_NONCANONICAL_MAP");
            }
            Ok(Data::Map(kvs))
        }
        0 => {
            let (_, n) = rd.head()?;
            Ok(Data::Int(BigInt::from(n)))
        }
        1 => {
            let (_, n) = rd.head()?;
            Ok(Data::Int(-BigInt::from(n) - 1))
        }
        6 => {
            let (_, tag) = rd.head()?;
            match tag {
                2 | 3 => {
                    let first = rd.peek()?;
                    let mag = dec_bytes_after_head(rd, first)?;
                    if mag.first() == Some(&0) {
                        bail!("DECODE_NONCANONICAL_BIGNUM");
                    }
                    let m = BigInt::from_bytes_be(Sign::Plus, &mag);
                    if m.to_u64().is_some() {
                        bail!("DECODE_NONCANONICAL_BIGNUM");
                    }
                    Ok(Data::Int(if tag == 2 { m } else { -m - 1 }))
                }
                121..=127 => Ok(Data::Constr(tag - 121, dec_fields(rd)?)),
                1280..=1400 => Ok(Data::Constr(tag - 1280 + 7, dec_fields(rd)?)),
                102 => {
                    let (major, len) = rd.head()?;
                    if major != 4 || len != 2 {
                        bail!("DECODE_BAD_CONSTR");
                    }
                    let (major, t) = rd.head()?;
                    if major != 0 {
                        bail!("DECODE_BAD_CONSTR");
                    }
                    if t <= 127 {
                        bail!("DECODE_NONCANONICAL_CONSTR");
                    }
                    Ok(Data::Constr(t, dec_fields(rd)?))
                }
                _ => bail!("DECODE_UNKNOWN_TAG"),
            }
        }
        _ => bail!("DECODE_UNKNOWN_MAJOR"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_widths_are_minimal() {
        let mut out = Vec::new();
        head(&mut out, 0, 23);
        head(&mut out, 0, 24);
        head(&mut out, 0, 256);
        assert_eq!(out, vec![0x17, 0x18, 0x18, 0x19, 0x01, 0x00]);
    }
}
