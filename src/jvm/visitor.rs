//! Event interfaces between class producers and consumers
//!
//! A [`crate::jvm::ClassReader`] drives a [`ClassVisitor`] through the contents of a class file,
//! and a [`crate::jvm::ClassWriter`] is a `ClassVisitor` that encodes what it is told. Anything in
//! between (a filter, a printer, a generator) just needs to implement or call these traits.
//!
//! Events for a class always come in this order:
//!
//!   - `visit`
//!   - `visit_source`, `visit_nest_host`, `visit_outer_class`
//!   - `visit_annotation` and `visit_attribute` (any number)
//!   - `visit_nest_member` and `visit_inner_class` (any number)
//!   - `visit_field` and `visit_method` (any number)
//!   - `visit_end`
//!
//! Inside a method with code, `visit_code` comes first, then every `visit_try_catch_block`, then
//! labels, line numbers, frames, and instructions in bytecode order, then local variables and
//! code attributes, and finally `visit_maxs`. Every callback can fail, and failures stop the
//! traversal.

use super::class_file::{Annotation, ConstantValue, Handle, Version};
use super::code::Label;
use super::verifier::VerificationType;
use super::{ClassAccessFlags, Error, FieldAccessFlags, InnerClassAccessFlags, MethodAccessFlags};

/// Entry of a frame given to [`MethodVisitor::visit_frame`]
///
/// Classes are internal names (or array descriptors) and an uninitialized object is identified
/// by the label of its `new` instruction.
pub type FrameType = VerificationType<String, Label>;

/// Attribute that is passed along without being interpreted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,

    /// Body of the attribute (without the name and length header)
    pub data: Vec<u8>,
}

#[allow(unused_variables)]
pub trait ClassVisitor {
    /// Header of the class
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Class (and method, if any) enclosing a local or anonymous class
    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access_flags: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Start a field, returning a visitor for its contents if they are wanted
    fn visit_field<'a>(
        &'a mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + 'a>>, Error> {
        Ok(None)
    }

    /// Start a method, returning a visitor for its contents if they are wanted
    fn visit_method<'a>(
        &'a mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + 'a>>, Error> {
        Ok(None)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[allow(unused_variables)]
pub trait FieldVisitor {
    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Consumer of the contents of a method
///
/// Labels are created by the visitor itself, so that they are meaningful to whoever consumes
/// them. Instruction callbacks take opcodes from [`crate::jvm::code::opcodes`].
#[allow(unused_variables)]
pub trait MethodVisitor {
    fn new_label(&mut self) -> Label;

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    /// Start of the method body
    fn visit_code(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Instruction without operands
    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        Ok(())
    }

    /// `bipush`, `sipush`, or `newarray`
    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        Ok(())
    }

    /// Local variable load or store, or `ret`
    fn visit_var_insn(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        Ok(())
    }

    /// `new`, `anewarray`, `checkcast`, or `instanceof` with an internal name (or an array
    /// descriptor)
    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Label placed at the next instruction
    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Types of the locals and stack at the next instruction
    ///
    /// Locals are listed as in a `StackMapTable`: a `long` or `double` is a single entry.
    fn visit_frame(&mut self, locals: &[FrameType], stack: &[FrameType]) -> Result<(), Error> {
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        Ok(())
    }

    fn visit_iinc_insn(&mut self, index: u16, increment: i16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        Ok(())
    }

    /// Exception handler (`catch_type` of `None` catches everything)
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        Ok(())
    }

    /// Attribute of the `Code` attribute that is passed along without being interpreted
    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        Ok(())
    }

    /// End of the method body, with the declared maximums (which a writer may recompute)
    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
