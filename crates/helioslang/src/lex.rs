use num_bigint::BigInt;
use num_traits::Num;

use crate::error::{CompileError, Result};
use crate::source::Site;

/// Multi-character symbols, longest first so dispatch can be greedy.
const MULTI_SYMS: &[&str] = &["||", "&&", "==", "!=", "<=", ">=", "::", "->", "=>"];
const SINGLE_SYMS: &[u8] = b"+-*/%<>=!.,:;|(){}[]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokKind {
    Word(String),
    Bool(bool),
    Int(BigInt),
    Str(String),
    Bytes(Vec<u8>),
    Sym(&'static str),
    Group {
        open: char,
        fields: Vec<Vec<Token>>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokKind,
    pub site: Site,
}

impl Token {
    pub fn is_sym(&self, s: &str) -> bool {
        matches!(&self.kind, TokKind::Sym(x) if *x == s)
    }

    pub fn is_word(&self, w: &str) -> bool {
        matches!(&self.kind, TokKind::Word(x) if x == w)
    }

    pub fn describe(&self) -> String {
        match &self.kind {
            TokKind::Word(w) => format!("'{}'", w),
            TokKind::Bool(b) => format!("'{}'", b),
            TokKind::Int(_) => "integer literal".to_string(),
            TokKind::Str(_) => "string literal".to_string(),
            TokKind::Bytes(_) => "bytearray literal".to_string(),
            TokKind::Sym(s) => format!("'{}'", s),
            TokKind::Group { open, .. } => format!("'{}...' group", open),
        }
    }
}

pub struct Lexer<'a> {
    s: &'a [u8],
    i: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            s: text.as_bytes(),
            i: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.s.get(self.i).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.s.get(self.i + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.i += 1;
        Some(b)
    }

    fn site_from(&self, start: usize) -> Site {
        Site::new(start, self.i)
    }

    fn skip_ws_and_comments(&mut self) -> Result<()> {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\n' | b'\r' | b'\t')) {
                self.i += 1;
            }
            if self.peek() == Some(b'/') && self.peek2() == Some(b'/') {
                self.i += 2;
                while let Some(b) = self.peek() {
                    self.i += 1;
                    if b == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if self.peek() == Some(b'/') && self.peek2() == Some(b'*') {
                let start = self.i;
                self.i += 2;
                loop {
                    match self.peek() {
                        Some(b'*') if self.peek2() == Some(b'/') => {
                            self.i += 2;
                            break;
                        }
                        Some(_) => self.i += 1,
                        None => {
                            return Err(CompileError::syntax(
                                self.site_from(start),
                                "unterminated block comment",
                            ))
                        }
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    fn is_word_start(b: u8) -> bool {
        matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'_')
    }

    fn is_word_cont(b: u8) -> bool {
        Self::is_word_start(b) || b.is_ascii_digit()
    }

    fn lex_word(&mut self) -> String {
        let start = self.i;
        while let Some(b) = self.peek() {
            if Self::is_word_cont(b) {
                self.i += 1;
            } else {
                break;
            }
        }
        String::from_utf8(self.s[start..self.i].to_vec()).unwrap()
    }

    fn lex_int(&mut self) -> Result<BigInt> {
        let start = self.i;
        let (radix, valid): (u32, fn(u8) -> bool) = if self.peek() == Some(b'0') {
            match self.peek2() {
                Some(b'b') | Some(b'B') => (2, |b| matches!(b, b'0' | b'1')),
                Some(b'o') | Some(b'O') => (8, |b| matches!(b, b'0'..=b'7')),
                Some(b'x') | Some(b'X') => (16, |b: u8| b.is_ascii_hexdigit()),
                Some(b) if b.is_ascii_alphabetic() => {
                    self.i += 2;
                    return Err(CompileError::syntax(
                        self.site_from(start),
                        format!("unknown integer prefix '0{}'", b as char),
                    ));
                }
                _ => (10, |b: u8| b.is_ascii_digit()),
            }
        } else {
            (10, |b: u8| b.is_ascii_digit())
        };
        if radix != 10 {
            self.i += 2;
        }
        let digits_start = self.i;
        while let Some(b) = self.peek() {
            if valid(b) {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == digits_start {
            return Err(CompileError::syntax(
                self.site_from(start),
                "expected digits after integer prefix",
            ));
        }
        let digits = std::str::from_utf8(&self.s[digits_start..self.i]).unwrap();
        Ok(BigInt::from_str_radix(digits, radix).unwrap())
    }

    fn lex_str(&mut self) -> Result<String> {
        let start = self.i;
        self.bump(); // opening quote
        let mut out = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => {
                    return Ok(String::from_utf8(out).unwrap());
                }
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push(b'\n'),
                    Some(b't') => out.push(b'\t'),
                    Some(b'\\') => out.push(b'\\'),
                    Some(b'"') => out.push(b'"'),
                    _ => {
                        return Err(CompileError::syntax(
                            self.site_from(start),
                            "unsupported string escape",
                        ))
                    }
                },
                Some(b) => out.push(b),
                None => {
                    return Err(CompileError::syntax(
                        self.site_from(start),
                        "unterminated string literal",
                    ))
                }
            }
        }
    }

    fn lex_bytes(&mut self) -> Result<Vec<u8>> {
        let start = self.i;
        self.bump(); // '#'
        let hex_start = self.i;
        while matches!(self.peek(), Some(b) if b.is_ascii_hexdigit()) {
            self.i += 1;
        }
        let hex = &self.s[hex_start..self.i];
        if hex.len() % 2 != 0 {
            return Err(CompileError::syntax(
                self.site_from(start),
                "bytearray literal needs an even number of hex digits",
            ));
        }
        let nibble = |c: u8| match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            _ => c - b'A' + 10,
        };
        Ok(hex
            .chunks(2)
            .map(|p| (nibble(p[0]) << 4) | nibble(p[1]))
            .collect())
    }

    /// The streaming interface: one flat token, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<Token>> {
        self.skip_ws_and_comments()?;
        let start = self.i;
        let Some(b) = self.peek() else {
            return Ok(None);
        };

        if Self::is_word_start(b) {
            let w = self.lex_word();
            let kind = match w.as_str() {
                "true" => TokKind::Bool(true),
                "false" => TokKind::Bool(false),
                _ => TokKind::Word(w),
            };
            return Ok(Some(Token {
                kind,
                site: self.site_from(start),
            }));
        }

        if b.is_ascii_digit() {
            let z = self.lex_int()?;
            return Ok(Some(Token {
                kind: TokKind::Int(z),
                site: self.site_from(start),
            }));
        }

        if b == b'"' {
            let s = self.lex_str()?;
            return Ok(Some(Token {
                kind: TokKind::Str(s),
                site: self.site_from(start),
            }));
        }

        if b == b'#' {
            let bs = self.lex_bytes()?;
            return Ok(Some(Token {
                kind: TokKind::Bytes(bs),
                site: self.site_from(start),
            }));
        }

        for &sym in MULTI_SYMS {
            if self.s[self.i..].starts_with(sym.as_bytes()) {
                self.i += sym.len();
                return Ok(Some(Token {
                    kind: TokKind::Sym(sym),
                    site: self.site_from(start),
                }));
            }
        }

        if b == b'&' {
            self.i += 1;
            return Err(CompileError::syntax(self.site_from(start), "expected '&&'"));
        }

        if let Some(pos) = SINGLE_SYMS.iter().position(|&c| c == b) {
            self.i += 1;
            // index into a parallel table of static one-char strings
            const NAMES: &[&str] = &[
                "+", "-", "*", "/", "%", "<", ">", "=", "!", ".", ",", ":", ";", "|", "(", ")",
                "{", "}", "[", "]",
            ];
            return Ok(Some(Token {
                kind: TokKind::Sym(NAMES[pos]),
                site: self.site_from(start),
            }));
        }

        self.i += 1;
        Err(CompileError::syntax(
            self.site_from(start),
            format!("unexpected character '{}'", b as char),
        ))
    }
}

/// Flat tokenization of a whole buffer.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut lx = Lexer::new(text);
    let mut out = Vec::new();
    while let Some(t) = lx.next()? {
        out.push(t);
    }
    Ok(out)
}

fn close_of(open: &str) -> Option<(&'static str, char)> {
    match open {
        "(" => Some((")", '(')),
        "[" => Some(("]", '[')),
        "{" => Some(("}", '{')),
        _ => None,
    }
}

fn group_stream(
    toks: &[Token],
    pos: &mut usize,
    closer: Option<(&'static str, Site)>,
) -> Result<(Vec<Vec<Token>>, Site)> {
    let mut fields: Vec<Vec<Token>> = Vec::new();
    let mut cur: Vec<Token> = Vec::new();

    loop {
        let Some(tok) = toks.get(*pos) else {
            return match closer {
                Some((close, open_site)) => Err(CompileError::syntax(
                    open_site,
                    format!("unclosed group, expected '{}'", close),
                )),
                None => {
                    if !cur.is_empty() {
                        fields.push(cur);
                    }
                    let end = toks.last().map(|t| t.site).unwrap_or(Site::new(0, 0));
                    Ok((fields, end))
                }
            };
        };
        *pos += 1;

        match &tok.kind {
            TokKind::Sym(s) if close_of(s).is_some() => {
                let (close, open) = close_of(s).unwrap();
                let open_site = tok.site;
                let (inner, close_site) = group_stream(toks, pos, Some((close, open_site)))?;
                cur.push(Token {
                    kind: TokKind::Group {
                        open,
                        fields: inner,
                    },
                    site: Site::covering(open_site, close_site),
                });
            }
            TokKind::Sym(s) if matches!(*s, ")" | "]" | "}") => match closer {
                Some((close, _)) if *s == close => {
                    if cur.is_empty() && !fields.is_empty() {
                        return Err(CompileError::syntax(tok.site, "trailing comma in group"));
                    }
                    if !cur.is_empty() {
                        fields.push(cur);
                    }
                    return Ok((fields, tok.site));
                }
                Some((close, open_site)) => {
                    return Err(CompileError::syntax(
                        tok.site,
                        format!(
                            "mismatched group: expected '{}' for group at {}",
                            close, open_site
                        ),
                    ))
                }
                None => {
                    return Err(CompileError::syntax(tok.site, "stray closing bracket"));
                }
            },
            TokKind::Sym(",") => {
                if closer.is_none() {
                    return Err(CompileError::syntax(tok.site, "comma outside of a group"));
                }
                if cur.is_empty() {
                    return Err(CompileError::syntax(tok.site, "empty group field"));
                }
                fields.push(std::mem::take(&mut cur));
            }
            _ => cur.push(tok.clone()),
        }
    }
}

/// The grouping pass: brackets become nested `Group` tokens whose fields are
/// the comma-separated sub-streams. Returns the single top-level stream.
pub fn group(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut pos = 0;
    let (mut fields, _) = group_stream(&tokens, &mut pos, None)?;
    Ok(if fields.is_empty() {
        Vec::new()
    } else {
        fields.remove(0)
    })
}

/// Tokenize and group in one step.
pub fn lex(text: &str) -> Result<Vec<Token>> {
    group(tokenize(text)?)
}

/// Peek the purpose header without running the full pipeline: the first two
/// tokens of a well-formed program are the purpose word and the script name.
pub fn peek_purpose(text: &str) -> Option<(String, String)> {
    let mut lx = Lexer::new(text);
    let purpose = match lx.next() {
        Ok(Some(Token {
            kind: TokKind::Word(w),
            ..
        })) => w,
        _ => return None,
    };
    let name = match lx.next() {
        Ok(Some(Token {
            kind: TokKind::Word(w),
            ..
        })) => w,
        _ => return None,
    };
    matches!(
        purpose.as_str(),
        "testing" | "spending" | "minting" | "staking" | "module"
    )
    .then_some((purpose, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn words_bools_and_symbols() {
        assert_eq!(
            kinds("foo true -> =="),
            vec![
                TokKind::Word("foo".to_string()),
                TokKind::Bool(true),
                TokKind::Sym("->"),
                TokKind::Sym("==")
            ]
        );
    }

    #[test]
    fn integer_bases() {
        assert_eq!(
            kinds("10 0b101 0o17 0xFf 0"),
            vec![
                TokKind::Int(BigInt::from(10)),
                TokKind::Int(BigInt::from(5)),
                TokKind::Int(BigInt::from(15)),
                TokKind::Int(BigInt::from(255)),
                TokKind::Int(BigInt::from(0)),
            ]
        );
    }

    #[test]
    fn unknown_prefix_after_zero_is_rejected() {
        assert!(tokenize("0z12").is_err());
        assert!(tokenize("0b").is_err());
    }

    #[test]
    fn bytearray_literals() {
        assert_eq!(
            kinds("#deadbeef #"),
            vec![
                TokKind::Bytes(vec![0xde, 0xad, 0xbe, 0xef]),
                TokKind::Bytes(vec![])
            ]
        );
        assert!(tokenize("#abc").is_err());
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\nb\t\"\\""#),
            vec![TokKind::Str("a\nb\t\"\\".to_string())]
        );
        assert!(tokenize(r#""ab"#).is_err());
        assert!(tokenize(r#""\q""#).is_err());
    }

    #[test]
    fn comments_are_discarded() {
        assert_eq!(kinds("a // b\nc /* d */ e"), kinds("a c e"));
        assert!(tokenize("/* open").is_err());
    }

    #[test]
    fn lone_ampersand_is_rejected() {
        assert!(tokenize("a & b").is_err());
    }

    #[test]
    fn grouping_nests_and_splits_fields() {
        let toks = lex("f(a, g[b]{c})").unwrap();
        assert_eq!(toks.len(), 2);
        match &toks[1].kind {
            TokKind::Group { open: '(', fields } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].len(), 1);
                // second field: g, [b], {c}
                assert_eq!(fields[1].len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn group_error_cases() {
        assert!(lex("(a,)").is_err()); // trailing comma
        assert!(lex("(a,,b)").is_err()); // empty field
        assert!(lex("(a").is_err()); // unclosed
        assert!(lex("a)").is_err()); // stray close
        assert!(lex("(a]").is_err()); // mismatch
        assert!(lex("a, b").is_err()); // comma outside groups
    }

    #[test]
    fn purpose_peek_reads_only_the_header() {
        assert_eq!(
            peek_purpose("spending vault\nfunc main() -> Bool { true }"),
            Some(("spending".to_string(), "vault".to_string()))
        );
        assert_eq!(peek_purpose("fn x"), None);
        assert_eq!(peek_purpose(""), None);
    }
}
