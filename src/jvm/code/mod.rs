//! Method bodies: labels, the control flow graph between basic blocks, exception handlers,
//! debug tables, and the [`MethodWriter`] that assembles them into a `Code` attribute

mod debug_info;
mod exception_handling;
mod label;
mod method_writer;
pub mod opcodes;

pub use debug_info::*;
pub use exception_handling::*;
pub use label::*;
pub use method_writer::*;
