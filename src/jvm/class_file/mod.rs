//! Binary building blocks of a class file
//!
//! Everything in here can report its serialized size ([`ByteSize`]) before being written
//! ([`Serialize`]), so that a whole class can be sized and then written in one pass.

mod attribute;
mod byte_vector;
mod constants;
mod field;
mod method;
mod serialize;
mod values;
mod version;

pub use attribute::*;
pub use byte_vector::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use serialize::*;
pub use values::*;
pub use version::*;
