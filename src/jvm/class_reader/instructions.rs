use super::{ClassReader, Cursor, RawAttribute};
use crate::jvm::class_file::Constant;
use crate::jvm::code::opcodes::*;
use crate::jvm::code::Label;
use crate::jvm::verifier::NamedType;
use crate::jvm::visitor::{Attribute, FrameType, MethodVisitor};
use crate::jvm::{Error, MethodAccessFlags, ReaderFlags};
use std::collections::BTreeMap;

/// Instruction decoded from the code array, with branch targets still given as offsets
#[derive(Debug, PartialEq)]
enum Instruction {
    Plain(u8),
    Int(u8, i32),

    /// Load, store, or `ret` (short forms are expanded)
    Var(u8, u16),
    Type(u8, u16),
    Field(u8, u16),
    Method(u8, u16),
    InvokeDynamic(u16),
    Jump(u8, u32),
    Ldc(u16),
    IInc(u16, i16),
    TableSwitch {
        min: i32,
        max: i32,
        default: u32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        keys: Vec<i32>,
        targets: Vec<u32>,
    },
    MultiANewArray(u16, u8),
}

struct ExceptionTableEntry {
    start: u32,
    end: u32,
    handler: u32,
    catch_type: u16,
}

struct LocalVariableEntry {
    start: u32,
    end: u32,
    name: u16,
    descriptor: u16,
    index: u16,
}

impl<'a> ClassReader<'a> {
    /// Report the body of a method
    ///
    /// The first pass decodes every instruction and collects every offset that something refers
    /// to, so that labels can be created up front. The second pass emits the events.
    pub(crate) fn read_code(
        &self,
        code_attribute: RawAttribute<'_>,
        method: (MethodAccessFlags, &str, &str),
        visitor: &mut dyn MethodVisitor,
        flags: ReaderFlags,
    ) -> Result<(), Error> {
        let skip_debug = flags.contains(ReaderFlags::SKIP_DEBUG);
        let (access_flags, name, descriptor) = method;
        let mut cursor = code_attribute.cursor(self.data);
        let max_stack = cursor.read_u16()?;
        let max_locals = cursor.read_u16()?;
        let code_length = cursor.read_u32()? as usize;
        let code = cursor.read_bytes(code_length)?;
        let instructions = decode_instructions(code)?;

        let exception_table_length = cursor.read_u16()?;
        let mut exception_table = Vec::with_capacity(exception_table_length as usize);
        for _ in 0..exception_table_length {
            exception_table.push(ExceptionTableEntry {
                start: cursor.read_u16()? as u32,
                end: cursor.read_u16()? as u32,
                handler: cursor.read_u16()? as u32,
                catch_type: cursor.read_u16()?,
            });
        }

        let mut line_numbers: Vec<(u32, u16)> = vec![];
        let mut local_variables: Vec<LocalVariableEntry> = vec![];
        let mut stack_map: Vec<(u32, Vec<NamedType>, Vec<NamedType>)> = vec![];
        let mut code_attributes: Vec<Attribute> = vec![];
        for attribute in self.read_attributes(&mut cursor)? {
            match attribute.name {
                "LineNumberTable" if !skip_debug => {
                    let mut cursor = attribute.cursor(self.data);
                    let count = cursor.read_u16()?;
                    for _ in 0..count {
                        let start_pc = cursor.read_u16()? as u32;
                        line_numbers.push((start_pc, cursor.read_u16()?));
                    }
                }
                "LocalVariableTable" if !skip_debug => {
                    let mut cursor = attribute.cursor(self.data);
                    let count = cursor.read_u16()?;
                    for _ in 0..count {
                        let start = cursor.read_u16()? as u32;
                        let length = cursor.read_u16()? as u32;
                        local_variables.push(LocalVariableEntry {
                            start,
                            end: start + length,
                            name: cursor.read_u16()?,
                            descriptor: cursor.read_u16()?,
                            index: cursor.read_u16()?,
                        });
                    }
                }
                "StackMapTable" if !flags.contains(ReaderFlags::SKIP_FRAMES) => {
                    let entry = self.entry_locals(access_flags, name, descriptor)?;
                    stack_map = self.read_stack_map_table(attribute, entry)?;
                }
                "StackMapTable" | "LineNumberTable" | "LocalVariableTable" => (),
                "LocalVariableTypeTable" if skip_debug => (),
                _ => code_attributes.push(attribute.to_owned_attribute()),
            }
        }

        // Labels for every offset referred to, in offset order
        let mut labels: BTreeMap<u32, Label> = BTreeMap::new();
        let mut label_at = |offset: u32| -> Result<Label, Error> {
            let starts_instruction = instructions
                .binary_search_by_key(&offset, |(start, _)| *start)
                .is_ok();
            if !starts_instruction && offset as usize != code_length {
                return Err(Error::MalformedAttribute {
                    name: String::from("Code"),
                    reason: format!("offset {} is not the start of an instruction", offset),
                });
            }
            Ok(*labels
                .entry(offset)
                .or_insert_with(|| visitor.new_label()))
        };
        for (_, instruction) in &instructions {
            match instruction {
                Instruction::Jump(_, target) => {
                    label_at(*target)?;
                }
                Instruction::TableSwitch {
                    default, targets, ..
                }
                | Instruction::LookupSwitch {
                    default, targets, ..
                } => {
                    label_at(*default)?;
                    for target in targets {
                        label_at(*target)?;
                    }
                }
                _ => (),
            }
        }
        let mut handlers = Vec::with_capacity(exception_table.len());
        for entry in &exception_table {
            handlers.push((
                label_at(entry.start)?,
                label_at(entry.end)?,
                label_at(entry.handler)?,
                self.optional_class(entry.catch_type)?,
            ));
        }
        let mut lines: BTreeMap<u32, Vec<(u16, Label)>> = BTreeMap::new();
        for (start_pc, line) in &line_numbers {
            let start = label_at(*start_pc)?;
            lines.entry(*start_pc).or_default().push((*line, start));
        }
        let mut locals = Vec::with_capacity(local_variables.len());
        for local in &local_variables {
            locals.push((
                self.utf8(local.name)?,
                self.utf8(local.descriptor)?,
                label_at(local.start)?,
                label_at(local.end)?,
                local.index,
            ));
        }
        let mut frames: BTreeMap<u32, (Vec<FrameType>, Vec<FrameType>)> = BTreeMap::new();
        for (offset, frame_locals, frame_stack) in &stack_map {
            if *offset as usize >= code_length {
                return Err(Error::MalformedAttribute {
                    name: String::from("StackMapTable"),
                    reason: format!("frame at offset {} is past the last instruction", offset),
                });
            }
            label_at(*offset)?;
            let mut resolve = |typ: &NamedType| typ.try_map(|name| Ok(name.clone()), |new| label_at(*new));
            let frame_locals = frame_locals.iter().map(&mut resolve).collect::<Result<_, _>>()?;
            let frame_stack = frame_stack.iter().map(&mut resolve).collect::<Result<_, _>>()?;
            frames.insert(*offset, (frame_locals, frame_stack));
        }

        visitor.visit_code()?;
        for (start, end, handler, catch_type) in handlers {
            visitor.visit_try_catch_block(start, end, handler, catch_type)?;
        }

        for (offset, instruction) in &instructions {
            if let Some(label) = labels.get(offset) {
                visitor.visit_label(*label)?;
            }
            for (line, start) in lines.remove(offset).unwrap_or_default() {
                visitor.visit_line_number(line, start)?;
            }
            if let Some((frame_locals, frame_stack)) = frames.get(offset) {
                visitor.visit_frame(frame_locals, frame_stack)?;
            }
            self.emit_instruction(instruction, &labels, visitor)?;
        }
        if let Some(label) = labels.get(&(code_length as u32)) {
            visitor.visit_label(*label)?;
        }

        for (name, descriptor, start, end, index) in locals {
            visitor.visit_local_variable(name, descriptor, start, end, index)?;
        }
        for attribute in &code_attributes {
            visitor.visit_code_attribute(attribute)?;
        }
        visitor.visit_maxs(max_stack, max_locals)
    }

    fn emit_instruction(
        &self,
        instruction: &Instruction,
        labels: &BTreeMap<u32, Label>,
        visitor: &mut dyn MethodVisitor,
    ) -> Result<(), Error> {
        let label = |offset: &u32| -> Result<Label, Error> {
            labels
                .get(offset)
                .copied()
                .ok_or_else(|| Error::MalformedAttribute {
                    name: String::from("Code"),
                    reason: format!("no label at offset {}", offset),
                })
        };
        match instruction {
            Instruction::Plain(opcode) => visitor.visit_insn(*opcode),
            Instruction::Int(opcode, operand) => visitor.visit_int_insn(*opcode, *operand),
            Instruction::Var(opcode, index) => visitor.visit_var_insn(*opcode, *index),
            Instruction::Type(opcode, index) => {
                visitor.visit_type_insn(*opcode, self.class(*index)?)
            }
            Instruction::Field(opcode, index) => {
                let (owner, name, descriptor, _) = self.member_ref(*index)?;
                visitor.visit_field_insn(*opcode, owner, name, descriptor)
            }
            Instruction::Method(opcode, index) => {
                let (owner, name, descriptor, is_interface) = self.member_ref(*index)?;
                visitor.visit_method_insn(*opcode, owner, name, descriptor, is_interface)
            }
            Instruction::InvokeDynamic(index) => match self.constant(*index)? {
                Constant::InvokeDynamic {
                    bootstrap_method,
                    name_and_type,
                } => {
                    let (name, descriptor) = self.name_and_type(name_and_type.0 .0)?;
                    let (handle, arguments) = self.bootstrap_method(*bootstrap_method)?;
                    visitor.visit_invoke_dynamic_insn(name, descriptor, &handle, &arguments)
                }
                _ => Err(Error::UnexpectedConstant {
                    index: *index,
                    expected: "InvokeDynamic",
                }),
            },
            Instruction::Jump(opcode, target) => visitor.visit_jump_insn(*opcode, label(target)?),
            Instruction::Ldc(index) => visitor.visit_ldc_insn(&self.constant_value(*index)?),
            Instruction::IInc(index, increment) => visitor.visit_iinc_insn(*index, *increment),
            Instruction::TableSwitch {
                min,
                max,
                default,
                targets,
            } => {
                let targets = targets.iter().map(label).collect::<Result<Vec<_>, _>>()?;
                visitor.visit_table_switch_insn(*min, *max, label(default)?, &targets)
            }
            Instruction::LookupSwitch {
                default,
                keys,
                targets,
            } => {
                let targets = targets.iter().map(label).collect::<Result<Vec<_>, _>>()?;
                visitor.visit_lookup_switch_insn(label(default)?, keys, &targets)
            }
            Instruction::MultiANewArray(index, dimensions) => {
                visitor.visit_multi_anewarray_insn(self.class(*index)?, *dimensions)
            }
        }
    }
}

/// Decode a code array into instructions keyed by their offset
fn decode_instructions(code: &[u8]) -> Result<Vec<(u32, Instruction)>, Error> {
    let mut cursor = Cursor::new(code);
    let mut instructions = vec![];
    while cursor.offset() < code.len() {
        let offset = cursor.offset();
        let instruction = decode_instruction(&mut cursor, offset)?;
        instructions.push((offset as u32, instruction));
    }
    Ok(instructions)
}

fn decode_instruction(cursor: &mut Cursor<'_>, offset: usize) -> Result<Instruction, Error> {
    let target = |delta: i64| -> Result<u32, Error> {
        u32::try_from(offset as i64 + delta).map_err(|_| Error::MalformedAttribute {
            name: String::from("Code"),
            reason: format!("branch at {} jumps before the start of the code", offset),
        })
    };

    let opcode = cursor.read_u8()?;
    Ok(match opcode {
        NOP..=DCONST_1
        | IALOAD..=SALOAD
        | IASTORE..=LXOR
        | I2L..=DCMPG
        | IRETURN..=RETURN
        | ARRAYLENGTH
        | ATHROW
        | MONITORENTER
        | MONITOREXIT => Instruction::Plain(opcode),
        BIPUSH => Instruction::Int(opcode, cursor.read_i8()? as i32),
        SIPUSH => Instruction::Int(opcode, cursor.read_i16()? as i32),
        NEWARRAY => Instruction::Int(opcode, cursor.read_u8()? as i32),
        LDC => Instruction::Ldc(cursor.read_u8()? as u16),
        LDC_W | LDC2_W => Instruction::Ldc(cursor.read_u16()?),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            Instruction::Var(opcode, cursor.read_u8()? as u16)
        }
        ILOAD_0..=ALOAD_3 => {
            let short = opcode - ILOAD_0;
            Instruction::Var(ILOAD + short / 4, (short % 4) as u16)
        }
        ISTORE_0..=ASTORE_3 => {
            let short = opcode - ISTORE_0;
            Instruction::Var(ISTORE + short / 4, (short % 4) as u16)
        }
        IINC => {
            let index = cursor.read_u8()? as u16;
            Instruction::IInc(index, cursor.read_i8()? as i16)
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            Instruction::Jump(opcode, target(cursor.read_i16()? as i64)?)
        }
        GOTO_W | JSR_W => Instruction::Jump(opcode, target(cursor.read_i32()? as i64)?),
        TABLESWITCH => {
            skip_padding(cursor)?;
            let default = target(cursor.read_i32()? as i64)?;
            let min = cursor.read_i32()?;
            let max = cursor.read_i32()?;
            let count = max as i64 - min as i64 + 1;
            if count < 0 {
                return Err(Error::MalformedAttribute {
                    name: String::from("Code"),
                    reason: format!("tableswitch at {} has low {} above high {}", offset, min, max),
                });
            }
            check_switch_length(cursor, offset, count as usize, 4)?;
            let targets = (0..count)
                .map(|_| target(cursor.read_i32()? as i64))
                .collect::<Result<Vec<_>, _>>()?;
            Instruction::TableSwitch {
                min,
                max,
                default,
                targets,
            }
        }
        LOOKUPSWITCH => {
            skip_padding(cursor)?;
            let default = target(cursor.read_i32()? as i64)?;
            let count = cursor.read_i32()?.max(0) as usize;
            check_switch_length(cursor, offset, count, 8)?;
            let mut keys = Vec::with_capacity(count);
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(cursor.read_i32()?);
                targets.push(target(cursor.read_i32()? as i64)?);
            }
            Instruction::LookupSwitch {
                default,
                keys,
                targets,
            }
        }
        GETSTATIC..=PUTFIELD => Instruction::Field(opcode, cursor.read_u16()?),
        INVOKEVIRTUAL..=INVOKESTATIC => Instruction::Method(opcode, cursor.read_u16()?),
        INVOKEINTERFACE => {
            let index = cursor.read_u16()?;
            cursor.skip(2)?;
            Instruction::Method(opcode, index)
        }
        INVOKEDYNAMIC => {
            let index = cursor.read_u16()?;
            cursor.skip(2)?;
            Instruction::InvokeDynamic(index)
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Instruction::Type(opcode, cursor.read_u16()?),
        WIDE => {
            let opcode = cursor.read_u8()?;
            match opcode {
                IINC => {
                    let index = cursor.read_u16()?;
                    Instruction::IInc(index, cursor.read_i16()?)
                }
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                    Instruction::Var(opcode, cursor.read_u16()?)
                }
                _ => return Err(Error::InvalidOpcode { opcode, offset }),
            }
        }
        MULTIANEWARRAY => {
            let index = cursor.read_u16()?;
            Instruction::MultiANewArray(index, cursor.read_u8()?)
        }
        _ => return Err(Error::InvalidOpcode { opcode, offset }),
    })
}

/// Make sure the jump table of a switch fits in the rest of the code before allocating for it
fn check_switch_length(
    cursor: &Cursor<'_>,
    offset: usize,
    count: usize,
    entry_size: usize,
) -> Result<(), Error> {
    match count.checked_mul(entry_size) {
        Some(needed) if needed <= cursor.remaining() => Ok(()),
        _ => Err(Error::MalformedAttribute {
            name: String::from("Code"),
            reason: format!("switch at {} has {} entries past the end of the code", offset, count),
        }),
    }
}

/// Switch operands start at the next multiple of 4 from the start of the code
fn skip_padding(cursor: &mut Cursor<'_>) -> Result<(), Error> {
    let padding = (4 - cursor.offset() % 4) % 4;
    cursor.skip(padding)
}
