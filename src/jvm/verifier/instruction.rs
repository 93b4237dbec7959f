use super::{UninitializedType, VType};
use crate::jvm::code::opcodes::*;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType};
use crate::util::Width;

/// Instruction as seen by frame computation
///
/// Only what affects the types on the stack and in the locals is kept: branch targets live in
/// the control flow graph and constant pool indices are replaced by the types they denote.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameInstruction {
    /// Instruction whose effect is determined by its opcode alone
    Plain(u8),

    /// `ldc`, `ldc_w`, or `ldc2_w`, with the type of the loaded constant
    Ldc(VType),

    /// Local variable load or store (always the long form opcode), or `ret`
    Var(u8, u16),
    IInc(u16),
    NewArray(BaseType),

    /// `anewarray`, with the type of the array elements
    ANewArray(FieldType<BinaryName>),
    New(UninitializedType),
    CheckCast(RefType<BinaryName>),
    Field {
        opcode: u8,
        field_type: FieldType<BinaryName>,
    },
    Invoke {
        opcode: u8,

        /// Is this a call to an instance initialization method (`<init>`)?
        is_init: bool,
        descriptor: MethodDescriptor<BinaryName>,
    },
    InvokeDynamic(MethodDescriptor<BinaryName>),
    MultiANewArray {
        array_type: RefType<BinaryName>,
        dimensions: u8,
    },
}

impl FrameInstruction {
    /// Change in the number of stack slots after executing this instruction
    ///
    /// Used when only the maximum stack size is computed, so it is given in slots (`long` and
    /// `double` count twice) and does not look at types.
    pub fn stack_size_delta(&self) -> i32 {
        match self {
            FrameInstruction::Plain(opcode) => plain_stack_size_delta(*opcode),
            FrameInstruction::Ldc(loaded) => loaded.width() as i32,
            FrameInstruction::Var(opcode, _) => match *opcode {
                ILOAD | FLOAD | ALOAD => 1,
                LLOAD | DLOAD => 2,
                ISTORE | FSTORE | ASTORE => -1,
                LSTORE | DSTORE => -2,
                _ => 0,
            },
            FrameInstruction::IInc(_)
            | FrameInstruction::NewArray(_)
            | FrameInstruction::ANewArray(_)
            | FrameInstruction::CheckCast(_) => 0,
            FrameInstruction::New(_) => 1,
            FrameInstruction::Field { opcode, field_type } => {
                let width = field_type.width() as i32;
                match *opcode {
                    GETSTATIC => width,
                    PUTSTATIC => -width,
                    GETFIELD => width - 1,
                    _ => -width - 1,
                }
            }
            FrameInstruction::Invoke {
                opcode, descriptor, ..
            } => {
                let has_this = *opcode != INVOKESTATIC;
                descriptor.return_length() as i32 - descriptor.parameter_length(has_this) as i32
            }
            FrameInstruction::InvokeDynamic(descriptor) => {
                descriptor.return_length() as i32 - descriptor.parameter_length(false) as i32
            }
            FrameInstruction::MultiANewArray { dimensions, .. } => 1 - *dimensions as i32,
        }
    }
}

fn plain_stack_size_delta(opcode: u8) -> i32 {
    match opcode {
        NOP | INEG | LNEG | FNEG | DNEG | SWAP | I2F | L2D | F2I | D2L | I2B | I2C | I2S
        | LALOAD | DALOAD | GOTO | GOTO_W | RET | RETURN | ARRAYLENGTH | INSTANCEOF => 0,

        ACONST_NULL | ICONST_M1 | ICONST_0 | ICONST_1 | ICONST_2 | ICONST_3 | ICONST_4
        | ICONST_5 | FCONST_0 | FCONST_1 | FCONST_2 | BIPUSH | SIPUSH | DUP | DUP_X1
        | DUP_X2 | I2L | I2D | F2L | F2D | JSR | JSR_W => 1,

        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 | DUP2 | DUP2_X1 | DUP2_X2 => 2,

        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD | POP | IADD | FADD | ISUB
        | FSUB | IMUL | FMUL | IDIV | FDIV | IREM | FREM | ISHL | LSHL | ISHR | LSHR
        | IUSHR | LUSHR | IAND | IOR | IXOR | L2I | L2F | D2I | D2F | FCMPL | FCMPG | IFEQ
        | IFNE | IFLT | IFGE | IFGT | IFLE | TABLESWITCH | LOOKUPSWITCH | IRETURN
        | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT | IFNULL | IFNONNULL => -1,

        POP2 | LADD | DADD | LSUB | DSUB | LMUL | DMUL | LDIV | DDIV | LREM | DREM | LAND
        | LOR | LXOR | IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT | IF_ICMPGE | IF_ICMPGT
        | IF_ICMPLE | IF_ACMPEQ | IF_ACMPNE | LRETURN | DRETURN => -2,

        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE | LCMP | DCMPL | DCMPG => -3,

        LASTORE | DASTORE => -4,

        _ => 0,
    }
}
