use super::{CaughtHierarchy, FrameInstruction, NamedType, TypeHierarchy, VType, VerificationType};
use crate::jvm::class_file::{ClassConstantIndex, ConstantPool, StackMapFrame};
use crate::jvm::code::opcodes::*;
use crate::jvm::code::Label;
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, RefType, VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are indexed by slot: a `long` or `double` is followed by a `Top` for its upper half,
/// and slots that were never written hold `Top` (trailing ones may be missing entirely).
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables, indexed by slot
    pub locals: Vec<VType>,

    /// Types of values on the stack
    pub stack: OffsetVec<VType>,
}

/// Frame in the form stored in a `StackMapTable`
///
/// Here locals are a list of types, with `long` and `double` taking up a single entry.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SerializableFrame<T = VerificationType<ClassConstantIndex, u16>> {
    pub locals: Vec<T>,
    pub stack: Vec<T>,
}

impl Frame {
    /// Frame on entry to a method
    ///
    /// In a constructor `this` starts out uninitialized, except in `java/lang/Object` which has no
    /// superclass constructor to call.
    pub fn entry(
        this_class: &BinaryName,
        is_static: bool,
        is_init: bool,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Frame {
        let mut frame = Frame::default();
        let mut slot = 0;
        if !is_static {
            let this_type = if is_init && *this_class != BinaryName::OBJECT {
                VType::UninitializedThis
            } else {
                VType::object(this_class.clone())
            };
            frame.set_local(slot, this_type);
            slot += 1;
        }
        for parameter in &descriptor.parameters {
            let typ = VType::from(parameter.clone());
            slot += typ.width();
            frame.set_local(slot - typ.width(), typ);
        }
        frame
    }

    /// Frame at the start of an exception handler
    pub fn handler(locals: Vec<VType>, caught: VType) -> Frame {
        let mut stack = OffsetVec::new();
        stack.push(caught);
        Frame { locals, stack }
    }

    /// Frame used for unreachable code, which gets replaced by `nop`s and an `athrow`
    pub fn dead_code() -> Frame {
        Frame::handler(vec![], VType::object(BinaryName::THROWABLE))
    }

    /// Number of stack slots in use
    pub fn stack_size(&self) -> usize {
        self.stack.offset_len().0
    }

    pub fn get_local(&self, index: usize) -> &VType {
        self.locals.get(index).unwrap_or(&VType::Top)
    }

    /// Store a type in a local, invalidating any wide value it overlaps
    pub fn set_local(&mut self, index: usize, typ: VType) {
        let width = typ.width();
        if self.locals.len() < index + width {
            self.locals.resize(index + width, VType::Top);
        }
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = VType::Top;
        }
        if width == 2 {
            self.locals[index + 1] = VType::Top;
        }
        self.locals[index] = typ;
    }

    /// Update the frame to reflect the effects of the given instruction
    pub fn execute(
        &mut self,
        insn: &FrameInstruction,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        match insn {
            FrameInstruction::Plain(opcode) => self.execute_plain(*opcode)?,
            FrameInstruction::Ldc(typ) => {
                self.stack.push(typ.clone());
            }
            FrameInstruction::Var(opcode, index) => {
                let slot = *index as usize;
                match *opcode {
                    ILOAD => {
                        self.stack.push(VType::Integer);
                    }
                    LLOAD => {
                        self.stack.push(VType::Long);
                    }
                    FLOAD => {
                        self.stack.push(VType::Float);
                    }
                    DLOAD => {
                        self.stack.push(VType::Double);
                    }
                    ALOAD => {
                        let typ = self.get_local(slot).clone();
                        if !typ.is_reference() {
                            return Err(VerifierErrorKind::InvalidLocal(*index));
                        }
                        self.stack.push(typ);
                    }
                    ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                        let typ = pop_offset_vec(&mut self.stack)?;
                        self.set_local(slot, typ);
                    }
                    other => return Err(VerifierErrorKind::UnsupportedOpcode(other)),
                }
            }
            FrameInstruction::IInc(index) => self.set_local(*index as usize, VType::Integer),
            FrameInstruction::NewArray(element_type) => {
                pop_offset_vec(&mut self.stack)?;
                let array = RefType::array(FieldType::Base(*element_type));
                self.stack.push(VType::Object(array));
            }
            FrameInstruction::ANewArray(element_type) => {
                pop_offset_vec(&mut self.stack)?;
                let array = RefType::array(element_type.clone());
                self.stack.push(VType::Object(array));
            }
            FrameInstruction::New(uninitialized) => {
                self.stack.push(VType::Uninitialized(uninitialized.clone()));
            }
            FrameInstruction::CheckCast(ref_type) => {
                pop_offset_vec(&mut self.stack)?;
                self.stack.push(VType::Object(ref_type.clone()));
            }
            FrameInstruction::Field { opcode, field_type } => {
                let width = field_type.width();
                match *opcode {
                    GETSTATIC => {
                        self.stack.push(VType::from(field_type.clone()));
                    }
                    PUTSTATIC => {
                        pop_slots(&mut self.stack, width)?;
                    }
                    GETFIELD => {
                        pop_offset_vec(&mut self.stack)?;
                        self.stack.push(VType::from(field_type.clone()));
                    }
                    _ => {
                        pop_slots(&mut self.stack, width)?;
                        pop_offset_vec(&mut self.stack)?;
                    }
                }
            }
            FrameInstruction::Invoke {
                opcode,
                is_init,
                descriptor,
            } => {
                pop_slots(&mut self.stack, descriptor.parameter_length(false))?;
                if *opcode != INVOKESTATIC {
                    let receiver = pop_offset_vec(&mut self.stack)?;
                    if *is_init && *opcode == INVOKESPECIAL {
                        self.initialize(receiver, this_class);
                    }
                }
                if let Some(return_type) = &descriptor.return_type {
                    self.stack.push(VType::from(return_type.clone()));
                }
            }
            FrameInstruction::InvokeDynamic(descriptor) => {
                pop_slots(&mut self.stack, descriptor.parameter_length(false))?;
                if let Some(return_type) = &descriptor.return_type {
                    self.stack.push(VType::from(return_type.clone()));
                }
            }
            FrameInstruction::MultiANewArray {
                array_type,
                dimensions,
            } => {
                pop_slots(&mut self.stack, *dimensions as usize)?;
                self.stack.push(VType::Object(array_type.clone()));
            }
        }
        Ok(())
    }

    fn execute_plain(&mut self, opcode: u8) -> Result<(), VerifierErrorKind> {
        use VerificationType::*;

        let stack = &mut self.stack;
        match opcode {
            NOP | GOTO | GOTO_W | RETURN => (),
            ACONST_NULL => {
                stack.push(Null);
            }
            ICONST_M1 | ICONST_0 | ICONST_1 | ICONST_2 | ICONST_3 | ICONST_4 | ICONST_5
            | BIPUSH | SIPUSH => {
                stack.push(Integer);
            }
            LCONST_0 | LCONST_1 => {
                stack.push(Long);
            }
            FCONST_0 | FCONST_1 | FCONST_2 => {
                stack.push(Float);
            }
            DCONST_0 | DCONST_1 => {
                stack.push(Double);
            }

            IALOAD | BALOAD | CALOAD | SALOAD => replace(stack, 2, Integer)?,
            LALOAD => replace(stack, 2, Long)?,
            FALOAD => replace(stack, 2, Float)?,
            DALOAD => replace(stack, 2, Double)?,
            AALOAD => {
                pop_offset_vec(stack)?;
                let element = match pop_offset_vec(stack)? {
                    Null => Null,
                    Object(array_type) => match array_type.clone().element_type() {
                        Some(element_type) => VType::from(element_type),
                        None => {
                            return Err(VerifierErrorKind::NotArrayType(format!(
                                "{:?}",
                                array_type
                            )))
                        }
                    },
                    other => return Err(VerifierErrorKind::NotArrayType(format!("{:?}", other))),
                };
                stack.push(element);
            }
            IASTORE | LASTORE | FASTORE | DASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
                for _ in 0..3 {
                    pop_offset_vec(stack)?;
                }
            }

            POP => {
                pop_slots(stack, 1)?;
            }
            POP2 => {
                pop_slots(stack, 2)?;
            }
            DUP => {
                let value = pop_slots(stack, 1)?;
                stack.extend(value.iter().cloned());
                stack.extend(value);
            }
            DUP_X1 => {
                let value = pop_slots(stack, 1)?;
                let under = pop_slots(stack, 1)?;
                stack.extend(value.iter().cloned());
                stack.extend(under);
                stack.extend(value);
            }
            DUP_X2 => {
                let value = pop_slots(stack, 1)?;
                let under = pop_slots(stack, 2)?;
                stack.extend(value.iter().cloned());
                stack.extend(under);
                stack.extend(value);
            }
            DUP2 => {
                let value = pop_slots(stack, 2)?;
                stack.extend(value.iter().cloned());
                stack.extend(value);
            }
            DUP2_X1 => {
                let value = pop_slots(stack, 2)?;
                let under = pop_slots(stack, 1)?;
                stack.extend(value.iter().cloned());
                stack.extend(under);
                stack.extend(value);
            }
            DUP2_X2 => {
                let value = pop_slots(stack, 2)?;
                let under = pop_slots(stack, 2)?;
                stack.extend(value.iter().cloned());
                stack.extend(under);
                stack.extend(value);
            }
            SWAP => {
                let top = pop_slots(stack, 1)?;
                let under = pop_slots(stack, 1)?;
                stack.extend(top);
                stack.extend(under);
            }

            IADD | ISUB | IMUL | IDIV | IREM | ISHL | ISHR | IUSHR | IAND | IOR | IXOR => {
                replace(stack, 2, Integer)?
            }
            LADD | LSUB | LMUL | LDIV | LREM | LSHL | LSHR | LUSHR | LAND | LOR | LXOR => {
                replace(stack, 2, Long)?
            }
            FADD | FSUB | FMUL | FDIV | FREM => replace(stack, 2, Float)?,
            DADD | DSUB | DMUL | DDIV | DREM => replace(stack, 2, Double)?,
            INEG | L2I | F2I | D2I | I2B | I2C | I2S | ARRAYLENGTH | INSTANCEOF => {
                replace(stack, 1, Integer)?
            }
            LNEG | I2L | F2L | D2L => replace(stack, 1, Long)?,
            FNEG | I2F | L2F | D2F => replace(stack, 1, Float)?,
            DNEG | I2D | L2D | F2D => replace(stack, 1, Double)?,
            LCMP | FCMPL | FCMPG | DCMPL | DCMPG => replace(stack, 2, Integer)?,

            IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IFNULL | IFNONNULL | TABLESWITCH
            | LOOKUPSWITCH | IRETURN | LRETURN | FRETURN | DRETURN | ARETURN | ATHROW
            | MONITORENTER | MONITOREXIT => {
                pop_offset_vec(stack)?;
            }
            IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE | IF_ACMPEQ
            | IF_ACMPNE => {
                pop_offset_vec(stack)?;
                pop_offset_vec(stack)?;
            }

            other => return Err(VerifierErrorKind::UnsupportedOpcode(other)),
        }
        Ok(())
    }

    /// Replace every occurrence of a just-constructed type with its initialized form
    fn initialize(&mut self, receiver: VType, this_class: &BinaryName) {
        let initialized = match &receiver {
            VType::UninitializedThis => VType::object(this_class.clone()),
            VType::Uninitialized(uninitialized) => VType::object(uninitialized.class.clone()),
            _ => return,
        };
        for local in self.locals.iter_mut() {
            if *local == receiver {
                *local = initialized.clone();
            }
        }
        for entry in self.stack.values_mut() {
            if *entry == receiver {
                *entry = initialized.clone();
            }
        }
    }

    /// Merge an incoming frame into this one, returning whether this frame changed
    ///
    /// Stacks must agree in height and join entry by entry. Locals that do not join become `Top`.
    pub fn merge(
        &mut self,
        incoming: &Frame,
        hierarchy: &dyn TypeHierarchy,
        label: Label,
    ) -> Result<bool, Error> {
        self.merge_with(incoming, hierarchy, hierarchy, label)
    }

    /// Merge the frame of an exception edge into the input of its handler
    ///
    /// The only stack entry is the caught exception, and caught types join no higher than
    /// `java/lang/Throwable`.
    pub fn merge_caught(
        &mut self,
        incoming: &Frame,
        hierarchy: &dyn TypeHierarchy,
        label: Label,
    ) -> Result<bool, Error> {
        self.merge_with(incoming, &CaughtHierarchy(hierarchy), hierarchy, label)
    }

    fn merge_with(
        &mut self,
        incoming: &Frame,
        stack_hierarchy: &dyn TypeHierarchy,
        hierarchy: &dyn TypeHierarchy,
        label: Label,
    ) -> Result<bool, Error> {
        let incompatible = |left: &Frame| Error::IncompatibleFrames {
            label,
            left: format!("{:?}", left),
            right: format!("{:?}", incoming),
        };

        if self.stack.len() != incoming.stack.len() {
            return Err(incompatible(self));
        }
        let mut changed = false;
        let mut stack = OffsetVec::new();
        for ((_, _, mine), (_, _, theirs)) in self.stack.iter().zip(incoming.stack.iter()) {
            match mine.join(theirs, stack_hierarchy) {
                Some(joined) => {
                    changed |= joined != *mine;
                    stack.push(joined);
                }
                None => return Err(incompatible(self)),
            }
        }
        if stack.offset_len() != self.stack.offset_len() {
            return Err(incompatible(self));
        }

        let mut locals = Vec::with_capacity(self.locals.len());
        let mut slot = 0;
        while slot < self.locals.len() {
            let mine = &self.locals[slot];
            let joined = mine
                .join(incoming.get_local(slot), hierarchy)
                .unwrap_or(VType::Top);
            let width = joined.width();
            locals.push(joined);
            if width == 2 {
                locals.push(VType::Top);
            }
            slot += width;
        }
        trim_top(&mut locals);

        changed |= locals != self.locals;
        self.locals = locals;
        self.stack = stack;
        Ok(changed)
    }

    /// Resolve the frame into its serializable form
    pub fn into_serializable(&self, pool: &mut ConstantPool) -> Result<SerializableFrame, Error> {
        self.into_named().resolve(pool)
    }

    /// Serializable layout of the frame, without touching the constant pool
    pub fn into_named(&self) -> SerializableFrame<NamedType> {
        let mut locals = vec![];
        let mut slot = 0;
        while slot < self.locals.len() {
            let typ = &self.locals[slot];
            locals.push(typ.into_named());
            slot += typ.width();
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }
        SerializableFrame {
            locals,
            stack: self.stack.iter().map(|(_, _, typ)| typ.into_named()).collect(),
        }
    }
}

impl SerializableFrame<NamedType> {
    /// Intern the classes of every entry
    pub fn resolve(&self, pool: &mut ConstantPool) -> Result<SerializableFrame, Error> {
        Ok(SerializableFrame {
            locals: self
                .locals
                .iter()
                .map(|typ| typ.resolve(pool))
                .collect::<Result<_, _>>()?,
            stack: self
                .stack
                .iter()
                .map(|typ| typ.resolve(pool))
                .collect::<Result<_, _>>()?,
        })
    }
}

impl<T: Clone + PartialEq> SerializableFrame<T> {
    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame<T> {
        match self.stack.len() {
            0 => {
                let this_locals_len = self.locals.len();
                let prev_locals_len = previous_frame.locals.len();

                if this_locals_len <= prev_locals_len {
                    let len_difference = prev_locals_len - this_locals_len;
                    let this_is_prefix_of_prev =
                        previous_frame.locals.starts_with(&self.locals);
                    if len_difference < 4 && this_is_prefix_of_prev {
                        if len_difference == 0 {
                            return StackMapFrame::SameLocalsNoStack { offset_delta };
                        } else {
                            return StackMapFrame::ChopLocalsNoStack {
                                offset_delta,
                                chopped_k: len_difference as u8,
                            };
                        }
                    }
                } else if this_locals_len - prev_locals_len < 4
                    && self.locals.starts_with(&previous_frame.locals)
                {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: self.locals[prev_locals_len..].to_vec(),
                    };
                }
            }
            1 if self.locals == previous_frame.locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0].clone(),
                }
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame<T> {
        StackMapFrame::Full {
            offset_delta,
            stack: self.stack.clone(),
            locals: self.locals.clone(),
        }
    }
}

fn trim_top(locals: &mut Vec<VType>) {
    while let Some(last) = locals.last() {
        let upper_half = locals.len() >= 2 && locals[locals.len() - 2].width() == 2;
        if *last == VType::Top && !upper_half {
            locals.pop();
        } else {
            break;
        }
    }
}

fn pop_offset_vec(stack: &mut OffsetVec<VType>) -> Result<VType, VerifierErrorKind> {
    stack
        .pop()
        .map(|(_, _, typ)| typ)
        .ok_or(VerifierErrorKind::EmptyStack)
}

/// Pop entries covering exactly `slots` stack slots, returned bottom first
fn pop_slots(stack: &mut OffsetVec<VType>, slots: usize) -> Result<Vec<VType>, VerifierErrorKind> {
    let mut popped = vec![];
    let mut remaining = slots;
    while remaining > 0 {
        let typ = pop_offset_vec(stack)?;
        let width = typ.width();
        if width > remaining {
            return Err(VerifierErrorKind::InvalidWidth(width));
        }
        remaining -= width;
        popped.push(typ);
    }
    popped.reverse();
    Ok(popped)
}

/// Pop `count` entries and push a result
fn replace(
    stack: &mut OffsetVec<VType>,
    count: usize,
    result: VType,
) -> Result<(), VerifierErrorKind> {
    for _ in 0..count {
        pop_offset_vec(stack)?;
    }
    stack.push(result);
    Ok(())
}
