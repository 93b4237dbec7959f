//! Read, rewrite, and generate JVM class files
//!
//! The [`jvm`] module contains the codec: a visitor-driven [`jvm::ClassReader`], a
//! [`jvm::ClassWriter`] that re-assembles classes (computing `max_stack`, `max_locals` and stack
//! map frames when asked), and the constant pool and attribute machinery they share.

pub mod jvm;
pub mod util;
