//! Stack map frame inference
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! Straight-line code is simulated one instruction at a time (see [`Frame::execute`]). Things get
//! more complicated when an instruction can be reached from multiple locations: the frames from
//! the different sources need to be unified with [`Frame::merge`], which ends up being a
//! [fix-point computation][0] over the basic blocks of the method. Object types meet at their common
//! superclass, which only a [`TypeHierarchy`] can answer.
//!
//! The simulation is not a verifier: it trusts that the bytecode it is given is valid and only
//! checks what it needs in order to track types (stack depth, value widths).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod hierarchy;
mod instruction;
mod types;

pub use frame::*;
pub use hierarchy::*;
pub use instruction::*;
pub use types::*;
