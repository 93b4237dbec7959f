use super::opcodes::*;
use super::{
    EdgeKind, ExceptionHandling, Label, LabelFlags, LabelGraph, LineNumberTableWriter,
    LocalVariableTableWriter,
};
use crate::jvm::class_file::{
    AttributeBody, AttributeWriter, ByteVector, CodeAttribute, ConstantPool, ConstantValue,
    Handle, Method, StackMapFrame, Utf8ConstantIndex,
};
use crate::jvm::class_writer::check_raw_attribute;
use crate::jvm::verifier::{
    Frame, FrameInstruction, NamedType, SerializableFrame, TypeHierarchy, UninitializedType, VType,
};
use crate::jvm::visitor::{Attribute, FrameType, MethodVisitor};
use crate::jvm::{
    Annotation, BaseType, BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor,
    ParseDescriptor, RefType, WriterFlags,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// Writer for one method, handed out by [`crate::jvm::ClassWriter::add_method`]
///
/// Instructions are encoded as they are visited. Everything that depends on the final layout
/// (branch offsets, exception table, frames, maximums) is settled in `visit_maxs`, and the
/// finished method is handed back to the class writer in `visit_end`.
pub struct MethodWriter<'a> {
    pool: &'a mut ConstantPool,
    methods: &'a mut Vec<Method>,
    hierarchy: &'a dyn TypeHierarchy,
    flags: WriterFlags,
    copied_pool: bool,
    this_class: BinaryName,

    access_flags: MethodAccessFlags,
    name: String,
    descriptor: MethodDescriptor<BinaryName>,
    name_index: Utf8ConstantIndex,
    descriptor_index: Utf8ConstantIndex,
    signature: Option<String>,
    exceptions: Vec<String>,
    annotations: Vec<(Annotation, bool)>,
    attributes: Vec<Attribute>,

    /// Set once `visit_code` is called
    entry: Option<Label>,
    code: ByteVector,
    graph: LabelGraph,
    handling: ExceptionHandling,
    line_numbers: LineNumberTableWriter,
    local_variables: LocalVariableTableWriter,
    code_attributes: Vec<Attribute>,

    /// Frames given to `visit_frame` with their offset (dropped when frames are computed)
    given_frames: Vec<(u32, Vec<FrameType>, Vec<FrameType>)>,
    fixups: Vec<Fixup>,

    /// Instructions of each basic block (keyed by the label starting the block)
    blocks: HashMap<Label, BlockInstructions>,

    /// Block receiving instructions (`None` right after an unconditional jump)
    current_block: Option<Label>,
    max_locals: usize,
    code_attribute: Option<AttributeWriter>,
}

/// Branch offset to patch once labels are resolved
#[derive(Debug)]
struct Fixup {
    /// Offset of the branching instruction (offsets are relative to it)
    source: u32,

    /// Where the offset goes in the code
    at: usize,
    target: Label,
    wide: bool,
}

#[derive(Debug, Default)]
struct BlockInstructions {
    /// Instructions with their offset (only kept when frames are computed)
    instructions: Vec<(u32, FrameInstruction)>,

    /// Change in stack height over the whole block
    stack_delta: i32,

    /// Largest stack height reached, relative to the height on entry
    max_stack_delta: i32,
}

impl<'a> MethodWriter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        pool: &'a mut ConstantPool,
        methods: &'a mut Vec<Method>,
        hierarchy: &'a dyn TypeHierarchy,
        flags: WriterFlags,
        copied_pool: bool,
        this_class: BinaryName,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
        exceptions: &[String],
    ) -> Result<MethodWriter<'a>, Error> {
        let name_index = pool.new_utf8(name)?;
        let descriptor_index = pool.new_utf8(descriptor)?;
        let parsed_descriptor = MethodDescriptor::parse(descriptor)?;
        let max_locals =
            parsed_descriptor.parameter_length(access_flags.has_receiver());

        Ok(MethodWriter {
            pool,
            methods,
            hierarchy,
            flags,
            copied_pool,
            this_class,
            access_flags,
            name: name.to_owned(),
            descriptor: parsed_descriptor,
            name_index,
            descriptor_index,
            signature: signature.map(str::to_owned),
            exceptions: exceptions.to_vec(),
            annotations: vec![],
            attributes: vec![],
            entry: None,
            code: ByteVector::new(),
            graph: LabelGraph::new(),
            handling: ExceptionHandling::new(),
            line_numbers: LineNumberTableWriter::default(),
            local_variables: LocalVariableTableWriter::default(),
            code_attributes: vec![],
            given_frames: vec![],
            fixups: vec![],
            blocks: HashMap::new(),
            current_block: None,
            max_locals,
            code_attribute: None,
        })
    }

    /// Offset of the instruction about to be written, opening a block if there is none
    fn start_instruction(&mut self) -> Result<u32, Error> {
        if self.entry.is_none() {
            return Err(Error::CodeNotStarted);
        }
        if self.current_block.is_none() {
            let label = self.graph.new_label();
            self.visit_label(label)?;
        }
        Ok(self.code.len() as u32)
    }

    /// Note the effect of an instruction on the stack (and keep it for frame computation)
    fn record(
        &mut self,
        offset: u32,
        insn: impl FnOnce() -> Result<FrameInstruction, Error>,
    ) -> Result<(), Error> {
        if !self.flags.computes_maxs() {
            return Ok(());
        }
        let insn = insn()?;
        let keep = self.flags.computes_frames();
        let block = match self.current_block {
            Some(block) => block,
            None => return Ok(()),
        };
        let info = self.blocks.entry(block).or_default();
        info.stack_delta += insn.stack_size_delta();
        info.max_stack_delta = info.max_stack_delta.max(info.stack_delta);
        if keep {
            info.instructions.push((offset, insn));
        }
        Ok(())
    }

    /// End the current block with a fall through into a fresh one
    fn split_block(&mut self) -> Result<(), Error> {
        let label = self.graph.new_label();
        self.visit_label(label)
    }

    /// End the current block without a fall through
    fn end_block(&mut self) {
        self.current_block = None;
    }

    fn jump_to(&mut self, target: Label) -> Result<(), Error> {
        if let Some(block) = self.current_block {
            self.graph.add_edge(block, EdgeKind::Normal, target)?;
        }
        self.graph.set_flags(target, LabelFlags::TARGET);
        Ok(())
    }

    fn put_fixup(&mut self, source: u32, target: Label, wide: bool) {
        self.fixups.push(Fixup {
            source,
            at: self.code.len(),
            target,
            wide,
        });
        if wide {
            self.code.put_i32(0);
        } else {
            self.code.put_i16(0);
        }
    }

    fn touch_local(&mut self, index: u16, width: usize) {
        self.max_locals = self.max_locals.max(index as usize + width);
    }

    /// Stores change the locals seen by exception handlers, so they end a block
    fn split_after_store(&mut self) -> Result<(), Error> {
        if self.flags.computes_frames() && !self.handling.is_empty() {
            self.split_block()?;
        }
        Ok(())
    }

    fn patch_fixups(&mut self) -> Result<(), Error> {
        for fixup in &self.fixups {
            let target = self.graph.offset(fixup.target)?;
            let delta = target as i64 - fixup.source as i64;
            if fixup.wide {
                self.code.put_u32_at(fixup.at, delta as i32 as u32);
            } else {
                let delta = i16::try_from(delta).map_err(|_| Error::BranchOffsetOverflow {
                    from: fixup.source,
                    target,
                })?;
                self.code.put_u16_at(fixup.at, delta as u16);
            }
        }
        Ok(())
    }

    /// Stack heights by depth first propagation of per-block deltas
    fn compute_max_stack(&self, entry: Label) -> Result<u16, Error> {
        let mut heights: HashMap<Label, i32> = HashMap::new();
        heights.insert(entry, 0);
        let mut to_visit = vec![entry];
        let mut max_stack = 0;
        while let Some(block) = to_visit.pop() {
            let height = heights[&block];
            let (delta, peak) = self
                .blocks
                .get(&block)
                .map_or((0, 0), |info| (info.stack_delta, info.max_stack_delta));
            max_stack = max_stack.max(height + peak);

            for edge in self.graph.edges(block) {
                let successor = self.graph.block_of(edge.successor);
                let successor_height = match edge.kind {
                    EdgeKind::Normal => height + delta,
                    EdgeKind::Exception | EdgeKind::ExceptionFrame(_) => 1,
                };
                if !heights.contains_key(&successor) {
                    heights.insert(successor, successor_height);
                    to_visit.push(successor);
                }
            }
        }
        u16::try_from(max_stack).map_err(|_| Error::MethodCodeMaxStackOverflow(max_stack as usize))
    }

    /// Fixed point of the input frames of every reachable block
    fn compute_input_frames(
        &self,
        entry: Label,
        entry_frame: Frame,
    ) -> Result<(HashMap<Label, Frame>, usize), Error> {
        let mut inputs: HashMap<Label, Frame> = HashMap::new();
        let mut max_stack = 0;
        inputs.insert(entry, entry_frame);
        let mut worklist = VecDeque::from([entry]);
        let mut queued: HashSet<Label> = HashSet::from([entry]);

        while let Some(block) = worklist.pop_front() {
            queued.remove(&block);
            let input = inputs[&block].clone();
            log::trace!("Simulating block {:?} from {:?}", block, input);

            let mut frame = input.clone();
            max_stack = max_stack.max(frame.stack_size());
            if let Some(info) = self.blocks.get(&block) {
                for (offset, insn) in &info.instructions {
                    frame
                        .execute(insn, &self.this_class)
                        .map_err(|kind| Error::VerifierError {
                            offset: *offset,
                            kind,
                        })?;
                    max_stack = max_stack.max(frame.stack_size());
                }
            }

            for edge in self.graph.edges(block) {
                let successor = self.graph.block_of(edge.successor);
                let incoming = match &edge.kind {
                    EdgeKind::Normal => frame.clone(),
                    EdgeKind::ExceptionFrame(caught) => {
                        Frame::handler(input.locals.clone(), caught.clone())
                    }
                    EdgeKind::Exception => Frame::handler(
                        input.locals.clone(),
                        VType::object(BinaryName::THROWABLE),
                    ),
                };
                let changed = match inputs.get_mut(&successor) {
                    Some(existing) if edge.kind == EdgeKind::Normal => {
                        existing.merge(&incoming, self.hierarchy, successor)?
                    }
                    Some(existing) => existing.merge_caught(&incoming, self.hierarchy, successor)?,
                    None => {
                        inputs.insert(successor, incoming);
                        true
                    }
                };
                if changed && queued.insert(successor) {
                    worklist.push_back(successor);
                }
            }
        }
        Ok((inputs, max_stack))
    }

    fn entry_frame(&self) -> Frame {
        Frame::entry(
            &self.this_class,
            !self.access_flags.has_receiver(),
            self.name == "<init>",
            &self.descriptor,
        )
    }

    /// Compute frames and `max_stack`, replacing unreachable code along the way
    fn compute_frames(
        &mut self,
        entry: Label,
    ) -> Result<(u16, Option<AttributeWriter>), Error> {
        let (inputs, mut max_stack) = self.compute_input_frames(entry, self.entry_frame())?;
        for block in inputs.keys() {
            self.graph.set_flags(*block, LabelFlags::REACHABLE);
        }

        let code_len = self.code.len() as u32;
        let blocks: Vec<Label> = self.graph.blocks().to_vec();
        let mut frames: Vec<(u32, Frame)> = vec![];
        for (i, block) in blocks.iter().enumerate() {
            let start = self.graph.offset(*block)?;
            let end = match blocks.get(i + 1) {
                Some(next) => self.graph.offset(*next)?,
                None => code_len,
            };
            let flags = self.graph.flags(*block);
            match inputs.get(block) {
                Some(frame) => {
                    if flags.contains(LabelFlags::TARGET) {
                        frames.push((start, frame.clone()));
                    }
                }
                None if end > start && !flags.contains(LabelFlags::REACHABLE) => {
                    log::debug!(
                        "Replacing unreachable code at {}..{} in {}",
                        start,
                        end,
                        self.name
                    );
                    for position in start..end - 1 {
                        self.code.put_u8_at(position as usize, NOP);
                    }
                    self.code.put_u8_at(end as usize - 1, ATHROW);
                    frames.push((start, Frame::dead_code()));
                    max_stack = max_stack.max(1);

                    let end_label = match blocks.get(i + 1) {
                        Some(next) => *next,
                        None => {
                            let label = self.graph.new_label();
                            self.graph.place(label, code_len)?;
                            self.graph.resolve();
                            label
                        }
                    };
                    self.handling
                        .remove_range(&self.graph, *block, end_label)?;
                }
                None => (),
            }
        }

        let max_stack = u16::try_from(max_stack)
            .map_err(|_| Error::MethodCodeMaxStackOverflow(max_stack))?;
        if frames.is_empty() {
            return Ok((max_stack, None));
        }

        let frames = frames
            .into_iter()
            .map(|(offset, frame)| (offset, frame.into_named()))
            .collect();
        Ok((max_stack, Some(self.stack_map_table(frames)?)))
    }

    /// Frames given to `visit_frame`, with labels resolved to offsets
    fn given_stack_map_table(&mut self) -> Result<Option<AttributeWriter>, Error> {
        if self.given_frames.is_empty() {
            return Ok(None);
        }
        let graph = &self.graph;
        let named = |typ: &FrameType| -> Result<NamedType, Error> {
            typ.try_map(|name| Ok(name.clone()), |label| graph.offset(*label))
        };
        let mut frames = Vec::with_capacity(self.given_frames.len());
        for (offset, locals, stack) in &self.given_frames {
            let frame = SerializableFrame {
                locals: locals.iter().map(named).collect::<Result<_, _>>()?,
                stack: stack.iter().map(named).collect::<Result<_, _>>()?,
            };
            frames.push((*offset, frame));
        }
        self.stack_map_table(frames).map(Some)
    }

    /// Encode frames in offset order, each one relative to the one before it
    ///
    /// The first frame is relative to the frame implied by the method signature.
    fn stack_map_table(
        &mut self,
        frames: Vec<(u32, SerializableFrame<NamedType>)>,
    ) -> Result<AttributeWriter, Error> {
        let mut previous = self.entry_frame().into_named();
        let mut previous_offset: Option<u32> = None;
        let mut entries: Vec<StackMapFrame> = Vec::with_capacity(frames.len());
        for (offset, frame) in frames {
            let offset_delta = match previous_offset {
                None => offset,
                Some(previous_offset) => offset - previous_offset - 1,
            };
            let offset_delta = u16::try_from(offset_delta)
                .map_err(|_| Error::MethodCodeOverflow(offset as usize))?;
            let pool = &mut *self.pool;
            let entry = frame
                .stack_map_frame(offset_delta, &previous)
                .try_map(|typ| typ.resolve(pool))?;
            entries.push(entry);
            previous = frame;
            previous_offset = Some(offset);
        }
        checked_count(entries.len(), "stack map frames")?;
        AttributeWriter::new(self.pool, AttributeBody::StackMapTable(entries))
    }
}

fn is_conditional_jump(opcode: u8) -> bool {
    matches!(
        opcode,
        IFEQ | IFNE
            | IFLT
            | IFGE
            | IFGT
            | IFLE
            | IF_ICMPEQ
            | IF_ICMPNE
            | IF_ICMPLT
            | IF_ICMPGE
            | IF_ICMPGT
            | IF_ICMPLE
            | IF_ACMPEQ
            | IF_ACMPNE
            | IFNULL
            | IFNONNULL
    )
}

/// Verification type of a loaded constant
fn constant_type(value: &ConstantValue) -> Result<VType, Error> {
    Ok(match value {
        ConstantValue::Integer(_) => VType::Integer,
        ConstantValue::Float(_) => VType::Float,
        ConstantValue::Long(_) => VType::Long,
        ConstantValue::Double(_) => VType::Double,
        ConstantValue::String(_) => VType::object(BinaryName::STRING),
        ConstantValue::Class(_) => VType::object(BinaryName::CLASS),
        ConstantValue::MethodType(_) => VType::object(BinaryName::METHOD_TYPE),
        ConstantValue::MethodHandle(_) => VType::object(BinaryName::METHOD_HANDLE),
        ConstantValue::Dynamic(dynamic) => VType::from(FieldType::parse(&dynamic.descriptor)?),
    })
}

fn checked_count(len: usize, what: &'static str) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| Error::TooManyEntries { what, count: len })
}

impl<'a> MethodVisitor for MethodWriter<'a> {
    fn new_label(&mut self) -> Label {
        self.graph.new_label()
    }

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.annotations.push((annotation.clone(), visible));
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        check_raw_attribute(self.copied_pool, attribute)?;
        self.attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        let entry = self.graph.new_label();
        self.graph.place(entry, 0)?;
        self.entry = Some(entry);
        self.current_block = Some(entry);
        Ok(())
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        self.code.put_u8(opcode);
        self.record(offset, || Ok(FrameInstruction::Plain(opcode)))?;
        match opcode {
            IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | RETURN | ATHROW => self.end_block(),
            _ => (),
        }
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        self.code.put_u8(opcode);
        match opcode {
            BIPUSH => {
                let byte = i8::try_from(operand)
                    .map_err(|_| Error::UnsupportedInstruction("bipush operand out of range"))?;
                self.code.put_i8(byte);
            }
            SIPUSH => {
                let short = i16::try_from(operand)
                    .map_err(|_| Error::UnsupportedInstruction("sipush operand out of range"))?;
                self.code.put_i16(short);
            }
            NEWARRAY => {
                let element_type = u8::try_from(operand)
                    .ok()
                    .and_then(BaseType::from_array_code)
                    .ok_or(Error::UnsupportedInstruction(
                        "newarray with an unknown element type",
                    ))?;
                self.code.put_u8(element_type.array_code());
                return self.record(offset, || Ok(FrameInstruction::NewArray(element_type)));
            }
            _ => return Err(Error::InvalidOpcode { opcode, offset: offset as usize }),
        }
        self.record(offset, || Ok(FrameInstruction::Plain(opcode)))
    }

    fn visit_var_insn(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let (width, is_store) = match opcode {
            ILOAD | FLOAD | ALOAD => (1, false),
            LLOAD | DLOAD => (2, false),
            ISTORE | FSTORE | ASTORE => (1, true),
            LSTORE | DSTORE => (2, true),
            RET if self.flags.computes_frames() => {
                return Err(Error::UnsupportedInstruction("ret"))
            }
            RET => (1, false),
            _ => return Err(Error::InvalidOpcode { opcode, offset: offset as usize }),
        };

        if opcode != RET && index < 4 {
            let short_opcode = if is_store {
                ISTORE_0 + (opcode - ISTORE) * 4
            } else {
                ILOAD_0 + (opcode - ILOAD) * 4
            };
            self.code.put_u8(short_opcode + index as u8);
        } else if index < 256 {
            self.code.put_u8(opcode);
            self.code.put_u8(index as u8);
        } else {
            self.code.put_u8(WIDE);
            self.code.put_u8(opcode);
            self.code.put_u16(index);
        }
        self.touch_local(index, width);
        self.record(offset, || Ok(FrameInstruction::Var(opcode, index)))?;

        if opcode == RET {
            self.end_block();
        } else if is_store {
            self.split_after_store()?;
        }
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let class = self.pool.new_class(type_name)?;
        self.code.put_u8(opcode);
        self.code.put_u16(class.0 .0);
        self.record(offset, || {
            Ok(match opcode {
                NEW => FrameInstruction::New(UninitializedType {
                    offset,
                    class: BinaryName::parse(type_name)?,
                }),
                ANEWARRAY => FrameInstruction::ANewArray(FieldType::Ref(
                    RefType::from_internal_name(type_name)?,
                )),
                CHECKCAST => FrameInstruction::CheckCast(RefType::from_internal_name(type_name)?),
                INSTANCEOF => FrameInstruction::Plain(INSTANCEOF),
                _ => {
                    return Err(Error::InvalidOpcode {
                        opcode,
                        offset: offset as usize,
                    })
                }
            })
        })
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let field = self.pool.new_field_ref(owner, name, descriptor)?;
        self.code.put_u8(opcode);
        self.code.put_u16(field.0);
        self.record(offset, || {
            Ok(FrameInstruction::Field {
                opcode,
                field_type: FieldType::parse(descriptor)?,
            })
        })
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let method = self
            .pool
            .new_method_ref(owner, name, descriptor, is_interface)?;
        let parsed_descriptor: MethodDescriptor<BinaryName> = MethodDescriptor::parse(descriptor)?;
        self.code.put_u8(opcode);
        self.code.put_u16(method.0);
        if opcode == INVOKEINTERFACE {
            self.code
                .put_u8(parsed_descriptor.parameter_length(true) as u8);
            self.code.put_u8(0);
        }
        self.record(offset, || {
            Ok(FrameInstruction::Invoke {
                opcode,
                is_init: name == "<init>",
                descriptor: parsed_descriptor,
            })
        })
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let call_site =
            self.pool
                .new_invoke_dynamic(name, descriptor, bootstrap_method, bootstrap_arguments)?;
        self.code.put_u8(INVOKEDYNAMIC);
        self.code.put_u16(call_site.0);
        self.code.put_u16(0);
        self.record(offset, || {
            Ok(FrameInstruction::InvokeDynamic(MethodDescriptor::parse(
                descriptor,
            )?))
        })
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let is_subroutine = matches!(opcode, JSR | JSR_W);
        if is_subroutine && self.flags.computes_frames() {
            return Err(Error::UnsupportedInstruction("jsr"));
        }
        if !(is_subroutine || matches!(opcode, GOTO | GOTO_W) || is_conditional_jump(opcode)) {
            return Err(Error::InvalidOpcode {
                opcode,
                offset: offset as usize,
            });
        }

        // Backward jumps that are already known to be too far get the wide form
        let far_backward = self
            .graph
            .position(target)
            .map_or(false, |position| (offset as i64 - position as i64) > 0x8000);
        let encoded = match opcode {
            GOTO if far_backward => GOTO_W,
            JSR if far_backward => JSR_W,
            other => other,
        };
        self.code.put_u8(encoded);
        self.put_fixup(offset, target, matches!(encoded, GOTO_W | JSR_W));
        self.record(offset, || Ok(FrameInstruction::Plain(encoded)))?;

        self.jump_to(target)?;
        if matches!(encoded, GOTO | GOTO_W) {
            self.end_block();
            Ok(())
        } else {
            self.split_block()
        }
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        let position = self.code.len() as u32;
        let starts_block = self.graph.place(label, position)?;
        if starts_block {
            match self.current_block {
                Some(previous) => self.graph.add_edge(previous, EdgeKind::Normal, label)?,
                None => self.graph.set_flags(label, LabelFlags::TARGET),
            }
            self.blocks.entry(label).or_default();
        }
        self.current_block = Some(self.graph.block_of(label));
        Ok(())
    }

    fn visit_frame(&mut self, locals: &[FrameType], stack: &[FrameType]) -> Result<(), Error> {
        if self.entry.is_none() {
            return Err(Error::CodeNotStarted);
        }
        if self.flags.computes_frames() {
            return Ok(());
        }
        let offset = self.code.len() as u32;
        if matches!(self.given_frames.last(), Some((last, _, _)) if *last >= offset) {
            return Err(Error::MalformedAttribute {
                name: String::from("StackMapTable"),
                reason: format!("more than one frame at offset {}", offset),
            });
        }
        self.given_frames
            .push((offset, locals.to_vec(), stack.to_vec()));
        Ok(())
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let index = self.pool.new_constant(value)?.0;
        if value.is_wide() {
            self.code.put_u8(LDC2_W);
            self.code.put_u16(index);
        } else if index < 256 {
            self.code.put_u8(LDC);
            self.code.put_u8(index as u8);
        } else {
            self.code.put_u8(LDC_W);
            self.code.put_u16(index);
        }
        self.record(offset, || Ok(FrameInstruction::Ldc(constant_type(value)?)))
    }

    fn visit_iinc_insn(&mut self, index: u16, increment: i16) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        if index > 255 || increment < i8::MIN as i16 || increment > i8::MAX as i16 {
            self.code.put_u8(WIDE);
            self.code.put_u8(IINC);
            self.code.put_u16(index);
            self.code.put_i16(increment);
        } else {
            self.code.put_u8(IINC);
            self.code.put_u8(index as u8);
            self.code.put_i8(increment as i8);
        }
        self.touch_local(index, 1);
        self.record(offset, || Ok(FrameInstruction::IInc(index)))?;
        self.split_after_store()
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        if (max as i64 - min as i64 + 1) != targets.len() as i64 {
            return Err(Error::UnsupportedInstruction(
                "tableswitch whose targets do not match its range",
            ));
        }
        let offset = self.start_instruction()?;
        self.code.put_u8(TABLESWITCH);
        while self.code.len() % 4 != 0 {
            self.code.put_u8(0);
        }
        self.put_fixup(offset, default, true);
        self.code.put_i32(min);
        self.code.put_i32(max);
        for target in targets {
            self.put_fixup(offset, *target, true);
        }
        self.record(offset, || Ok(FrameInstruction::Plain(TABLESWITCH)))?;

        self.jump_to(default)?;
        for target in targets {
            self.jump_to(*target)?;
        }
        self.end_block();
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        if keys.len() != targets.len() {
            return Err(Error::UnsupportedInstruction(
                "lookupswitch with a different number of keys and targets",
            ));
        }
        let offset = self.start_instruction()?;
        self.code.put_u8(LOOKUPSWITCH);
        while self.code.len() % 4 != 0 {
            self.code.put_u8(0);
        }
        self.put_fixup(offset, default, true);
        self.code.put_i32(keys.len() as i32);
        for (key, target) in keys.iter().zip(targets) {
            self.code.put_i32(*key);
            self.put_fixup(offset, *target, true);
        }
        self.record(offset, || Ok(FrameInstruction::Plain(LOOKUPSWITCH)))?;

        self.jump_to(default)?;
        for target in targets {
            self.jump_to(*target)?;
        }
        self.end_block();
        Ok(())
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        let offset = self.start_instruction()?;
        let class = self.pool.new_class(descriptor)?;
        self.code.put_u8(MULTIANEWARRAY);
        self.code.put_u16(class.0 .0);
        self.code.put_u8(dimensions);
        self.record(offset, || {
            Ok(FrameInstruction::MultiANewArray {
                array_type: RefType::parse(descriptor)?,
                dimensions,
            })
        })
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        self.handling.add_handler(start, end, handler, catch_type);
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
        let width = if descriptor == "J" || descriptor == "D" {
            2
        } else {
            1
        };
        self.touch_local(index, width);
        self.local_variables
            .add_local_variable(name, descriptor, start, end, index);
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.line_numbers.add_line_number(line, start);
        Ok(())
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        check_raw_attribute(self.copied_pool, attribute)?;
        self.code_attributes.push(attribute.clone());
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        let entry = match self.entry {
            Some(entry) => entry,
            None => return Err(Error::CodeNotStarted),
        };
        if self.code.len() > u16::MAX as usize {
            return Err(Error::MethodCodeOverflow(self.code.len()));
        }

        self.graph.resolve();
        self.patch_fixups()?;

        let (max_stack, max_locals, stack_map_table) = if self.flags.computes_frames() {
            self.handling.complete_with_frames(&mut self.graph)?;
            let (max_stack, stack_map_table) = self.compute_frames(entry)?;
            (max_stack, self.max_locals, stack_map_table)
        } else if self.flags.computes_maxs() {
            self.handling.complete_simple(&mut self.graph)?;
            let max_stack = self.compute_max_stack(entry)?;
            (max_stack, self.max_locals, self.given_stack_map_table()?)
        } else {
            (max_stack, max_locals as usize, self.given_stack_map_table()?)
        };
        let max_locals = u16::try_from(max_locals)
            .map_err(|_| Error::MethodCodeMaxLocalsOverflow(max_locals))?;

        let mut exception_table = ByteVector::with_capacity(self.handling.byte_size(&self.graph)?);
        self.handling
            .put(&mut exception_table, &self.graph, self.pool)?;

        let mut attributes = vec![];
        let line_numbers = std::mem::take(&mut self.line_numbers);
        if let Some(attribute) = line_numbers.into_attribute(&self.graph, self.pool)? {
            attributes.push(attribute);
        }
        let local_variables = std::mem::take(&mut self.local_variables);
        if let Some(attribute) = local_variables.into_attribute(&self.graph, self.pool)? {
            attributes.push(attribute);
        }
        for attribute in self.code_attributes.drain(..) {
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Raw {
                    name: attribute.name,
                    data: attribute.data,
                },
            )?);
        }
        attributes.extend(stack_map_table);
        checked_count(attributes.len(), "code attributes")?;

        let code = CodeAttribute {
            max_stack,
            max_locals,
            code: std::mem::take(&mut self.code),
            exception_table,
            attributes,
        };
        self.code_attribute = Some(AttributeWriter::new(self.pool, AttributeBody::Code(code))?);
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        let mut attributes = vec![];
        attributes.extend(self.code_attribute.take());

        if !self.exceptions.is_empty() {
            let classes = self
                .exceptions
                .iter()
                .map(|exception| self.pool.new_class(exception))
                .collect::<Result<Vec<_>, _>>()?;
            checked_count(classes.len(), "exceptions")?;
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Exceptions(classes),
            )?);
        }
        if let Some(signature) = &self.signature {
            let signature = self.pool.new_utf8(signature)?;
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Signature(signature),
            )?);
        }
        for visible in [true, false] {
            if let Some(body) = AttributeBody::annotations(self.pool, &self.annotations, visible)? {
                attributes.push(AttributeWriter::new(self.pool, body)?);
            }
        }
        for attribute in self.attributes.drain(..) {
            attributes.push(AttributeWriter::new(
                self.pool,
                AttributeBody::Raw {
                    name: attribute.name,
                    data: attribute.data,
                },
            )?);
        }
        checked_count(attributes.len(), "method attributes")?;

        self.methods.push(Method {
            access_flags: self.access_flags,
            name_index: self.name_index,
            descriptor_index: self.descriptor_index,
            attributes,
        });
        Ok(())
    }
}
