// DataCore crate
pub mod cbor;
pub mod data;

pub use cbor::{decode, encode, DecodeError};
pub use data::Data;
