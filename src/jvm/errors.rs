use super::code::Label;

/// Everything that can go wrong while reading or writing a class
///
/// All of these are fatal: neither the reader nor the writer attempts to recover, since encoding
/// is deterministic and retrying would hit the same condition.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input ended before a structure was fully decoded
    #[error("unexpected end of class file: needed {needed} byte(s) at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("invalid class file magic 0x{0:08X}")]
    InvalidMagic(u32),

    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("invalid constant pool tag {tag} at index {index}")]
    InvalidConstantTag { tag: u8, index: u16 },

    /// Pool index is zero, past the end, or points at the second half of a `long`/`double`
    #[error("constant pool index {0} does not refer to an entry")]
    InvalidConstantIndex(u16),

    #[error("invalid method handle kind {kind} at index {index}")]
    InvalidHandleKind { kind: u8, index: u16 },

    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },

    #[error("invalid opcode 0x{opcode:02X} at code offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("constant pool entry {0} is not valid modified UTF-8")]
    MalformedUtf8(u16),

    #[error("malformed {name} attribute: {reason}")]
    MalformedAttribute { name: String, reason: String },

    #[error("invalid descriptor `{descriptor}`: {reason}")]
    BadDescriptor { descriptor: String, reason: String },

    #[error("invalid name `{0}`")]
    BadName(String),

    /// Constant pool ran past the `u16` index space
    #[error("constant pool overflow at index {0}")]
    ConstantPoolOverflow(usize),

    #[error("string of {0} encoded bytes does not fit in a UTF8 constant")]
    StringTooLong(usize),

    #[error("too many entries ({count}) in {what}")]
    TooManyEntries { what: &'static str, count: usize },

    /// Label was referenced (by a branch, handler, or debug entry) but never placed
    #[error("label {0:?} was never placed")]
    UnresolvedLabel(Label),

    #[error("label {0:?} was placed more than once")]
    DuplicateLabel(Label),

    /// A structure wrote a different number of bytes than it declared
    #[error("{what} declared {declared} bytes but wrote {written}")]
    SizeMismatch {
        what: &'static str,
        declared: usize,
        written: usize,
    },

    /// Uninterpreted attribute given to a writer whose constant pool was not copied from the
    /// class the attribute came from
    #[error("attribute {0} can only be copied into a class that keeps the original constant pool")]
    RawAttributeNeedsCopiedPool(String),

    #[error("branch at offset {from} to offset {target} does not fit in 16 bits")]
    BranchOffsetOverflow { from: u32, target: u32 },

    #[error("method code is {0} bytes long (limit is 65535)")]
    MethodCodeOverflow(usize),

    #[error("method needs {0} stack slots (limit is 65535)")]
    MethodCodeMaxStackOverflow(usize),

    #[error("method needs {0} local slots (limit is 65535)")]
    MethodCodeMaxLocalsOverflow(usize),

    /// Instruction emitted outside of `visit_code` .. `visit_maxs`
    #[error("instruction emitted outside of a code section")]
    CodeNotStarted,

    /// Member or attribute visited before the class header
    #[error("class header has not been visited")]
    MissingClassHeader,

    #[error("{0} is not supported when computing frames")]
    UnsupportedInstruction(&'static str),

    /// Two control-flow paths reach the same block with frames that have no join
    #[error("incompatible frames at {label:?}: {left} vs {right}")]
    IncompatibleFrames {
        label: Label,
        left: String,
        right: String,
    },

    #[error("verifier error at code offset {offset}: {kind}")]
    VerifierError { offset: u32, kind: VerifierErrorKind },

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Failures while simulating the effect of an instruction on a frame
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifierErrorKind {
    #[error("pop from an empty stack")]
    EmptyStack,

    #[error("stack entry has width {0}, which does not match the instruction")]
    InvalidWidth(usize),

    #[error("expected an array type, found {0}")]
    NotArrayType(String),

    #[error("local {0} does not hold a reference")]
    InvalidLocal(u16),

    #[error("{0} is not a valid type here")]
    InvalidType(String),

    #[error("bad descriptor {0}")]
    BadDescriptor(String),

    #[error("opcode 0x{0:02X} cannot be simulated")]
    UnsupportedOpcode(u8),
}
