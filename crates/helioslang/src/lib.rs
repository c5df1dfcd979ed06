// HeliosLang crate: the language pipeline from source text to bytecode.
pub mod ast;
pub mod check;
pub mod emit;
pub mod error;
pub mod ir;
pub mod lex;
pub mod optimize;
pub mod parse;
pub mod source;
pub mod stdfn;
pub mod texpr;
pub mod types;

pub use ast::Purpose;
pub use check::check;
pub use emit::emit;
pub use error::{CompileError, Result};
pub use ir::lower;
pub use lex::peek_purpose;
pub use optimize::optimize;
pub use parse::parse;
pub use source::{CodeMap, Site, Source};
