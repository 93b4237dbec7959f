//! JVM class files
//!
//! [`ClassReader`] decodes a class and reports it as events to a [`visitor::ClassVisitor`];
//! [`ClassWriter`] is a visitor that encodes the events it receives. Chaining the two (possibly
//! with a filter in between) is how classes get transformed.

mod access_flags;
pub mod class_file;
mod class_reader;
mod class_writer;
pub mod code;
mod descriptors;
mod errors;
mod names;
mod settings;
pub mod verifier;
pub mod visitor;

pub use access_flags::*;
pub use class_file::{
    Annotation, ConstantDynamic, ConstantValue, ElementValue, Handle, HandleKind, Version,
};
pub use class_reader::{ClassReader, Cursor};
pub use class_writer::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use settings::*;
