mod common;

use classcodec::jvm::code::opcodes::*;
use classcodec::jvm::code::MethodWriter;
use classcodec::jvm::verifier::ClassHierarchy;
use classcodec::jvm::visitor::{ClassVisitor, MethodVisitor};
use classcodec::jvm::*;
use common::*;
use pretty_assertions::assert_eq;

/// Class `me/Frames` with a single method whose body is written by `body`
fn class_with_method(
    mut writer: ClassWriter,
    version: Version,
    access_flags: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    body: impl FnOnce(&mut MethodWriter<'_>) -> Result<(), Error>,
) -> Vec<u8> {
    writer
        .visit(
            version,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "me/Frames",
            None,
            Some("java/lang/Object"),
            &[],
        )
        .unwrap();
    {
        let mut mw = writer
            .add_method(access_flags, name, descriptor, None, &[])
            .unwrap();
        mw.visit_code().unwrap();
        body(&mut mw).unwrap();
        mw.visit_maxs(0, 0).unwrap();
        mw.visit_end().unwrap();
    }
    writer.visit_end().unwrap();
    writer.to_bytes().unwrap()
}

fn class_name_at(class_bytes: &[u8], index_bytes: &[u8]) -> String {
    let reader = ClassReader::new(class_bytes).unwrap();
    let index = u16::from_be_bytes([index_bytes[0], index_bytes[1]]);
    reader.class(index).unwrap().to_owned()
}

/// `static int max(int a, int b) { return a > b ? a : b; }`
fn max_body(mw: &mut MethodWriter<'_>) -> Result<(), Error> {
    let second = mw.new_label();
    mw.visit_var_insn(ILOAD, 0)?;
    mw.visit_var_insn(ILOAD, 1)?;
    mw.visit_jump_insn(IF_ICMPLE, second)?;
    mw.visit_var_insn(ILOAD, 0)?;
    mw.visit_insn(IRETURN)?;
    mw.visit_label(second)?;
    mw.visit_var_insn(ILOAD, 1)?;
    mw.visit_insn(IRETURN)
}

#[test]
fn branch_target_gets_same_frame() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES),
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "max",
        "(II)I",
        max_body,
    );
    let code = method_code(&class_bytes, "max");
    assert_eq!(
        code.code,
        vec![0x1a, 0x1b, IF_ICMPLE, 0, 5, 0x1a, IRETURN, 0x1b, IRETURN]
    );
    assert_eq!((code.max_stack, code.max_locals), (2, 2));
    assert_eq!(code.stack_map_table, Some(vec![0, 1, 7]));
}

#[test]
fn maximums_without_frames() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_MAXS),
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "max",
        "(II)I",
        max_body,
    );
    let code = method_code(&class_bytes, "max");
    assert_eq!((code.max_stack, code.max_locals), (2, 2));
    assert_eq!(code.stack_map_table, None);
}

#[test]
fn old_versions_get_no_frames() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES),
        Version {
            major_version: 49,
            minor_version: 0,
        },
        MethodAccessFlags::STATIC,
        "max",
        "(II)I",
        max_body,
    );
    let code = method_code(&class_bytes, "max");
    assert_eq!((code.max_stack, code.max_locals), (2, 2));
    assert_eq!(code.stack_map_table, None);
}

#[test]
fn handler_frame_holds_caught_exception() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES),
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "guarded",
        "()V",
        |mw| {
            let start = mw.new_label();
            let end = mw.new_label();
            let handler = mw.new_label();
            mw.visit_try_catch_block(start, end, handler, Some("java/lang/RuntimeException"))?;
            mw.visit_label(start)?;
            mw.visit_method_insn(INVOKESTATIC, "java/lang/Thread", "yield", "()V", false)?;
            mw.visit_label(end)?;
            mw.visit_insn(RETURN)?;
            mw.visit_label(handler)?;
            mw.visit_var_insn(ASTORE, 0)?;
            mw.visit_insn(RETURN)
        },
    );
    let code = method_code(&class_bytes, "guarded");
    assert_eq!(&code.code[3..], &[RETURN, 0x4b, RETURN]);
    assert_eq!((code.max_stack, code.max_locals), (1, 1));

    let (start, end, handler, catch_type) = code.exception_table[0];
    assert_eq!((start, end, handler), (0, 3, 4));
    assert_eq!(
        class_name_at(&class_bytes, &catch_type.to_be_bytes()),
        "java/lang/RuntimeException"
    );

    // same_locals_1_stack_item_frame at offset 4
    let frames = code.stack_map_table.unwrap();
    assert_eq!(&frames[..4], &[0, 1, 64 + 4, 7]);
    assert_eq!(
        class_name_at(&class_bytes, &frames[4..6]),
        "java/lang/RuntimeException"
    );
}

#[test]
fn unreachable_code_is_replaced() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES),
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "skip",
        "()V",
        |mw| {
            let end = mw.new_label();
            mw.visit_jump_insn(GOTO, end)?;
            mw.visit_insn(ICONST_1)?;
            mw.visit_insn(POP)?;
            mw.visit_label(end)?;
            mw.visit_insn(RETURN)
        },
    );
    let code = method_code(&class_bytes, "skip");
    assert_eq!(code.code, vec![GOTO, 0, 5, NOP, ATHROW, RETURN]);
    assert_eq!(code.max_stack, 1);

    // Dead code starts with a Throwable on the stack, then the jump target gets a same_frame
    let frames = code.stack_map_table.unwrap();
    assert_eq!(&frames[..4], &[0, 2, 64 + 3, 7]);
    assert_eq!(
        class_name_at(&class_bytes, &frames[4..6]),
        "java/lang/Throwable"
    );
    assert_eq!(&frames[6..], &[1]);
}

#[test]
fn constructor_frames_track_uninitialized_this() {
    let class_bytes = class_with_method(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES),
        Version::JAVA8,
        MethodAccessFlags::PUBLIC,
        "<init>",
        "(Z)V",
        |mw| {
            let call = mw.new_label();
            mw.visit_var_insn(ALOAD, 0)?;
            mw.visit_var_insn(ILOAD, 1)?;
            mw.visit_jump_insn(IFEQ, call)?;
            mw.visit_label(call)?;
            mw.visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)?;
            mw.visit_insn(RETURN)
        },
    );
    let code = method_code(&class_bytes, "<init>");
    assert_eq!((code.max_stack, code.max_locals), (2, 2));

    // same_locals_1_stack_item_frame holding uninitializedThis
    assert_eq!(code.stack_map_table, Some(vec![0, 1, 64 + 5, 6]));
}

/// `static Number pick(boolean b) { return b ? INT : LONG; }`
fn pick_class(writer: ClassWriter) -> Vec<u8> {
    class_with_method(
        writer,
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "pick",
        "(Z)Ljava/lang/Number;",
        |mw| {
            let other = mw.new_label();
            let join = mw.new_label();
            mw.visit_var_insn(ILOAD, 0)?;
            mw.visit_jump_insn(IFEQ, other)?;
            mw.visit_field_insn(GETSTATIC, "me/Frames", "INT", "Ljava/lang/Integer;")?;
            mw.visit_jump_insn(GOTO, join)?;
            mw.visit_label(other)?;
            mw.visit_field_insn(GETSTATIC, "me/Frames", "LONG", "Ljava/lang/Long;")?;
            mw.visit_label(join)?;
            mw.visit_insn(ARETURN)
        },
    )
}

#[test]
fn merged_stack_uses_type_hierarchy() {
    let class_bytes = pick_class(ClassWriter::new(WriterFlags::COMPUTE_FRAMES));
    let frames = method_code(&class_bytes, "pick").stack_map_table.unwrap();
    assert_eq!(&frames[..5], &[0, 2, 10, 64 + 2, 7]);
    assert_eq!(class_name_at(&class_bytes, &frames[5..7]), "java/lang/Object");

    let mut hierarchy = ClassHierarchy::new();
    for boxed in ["java/lang/Integer", "java/lang/Long"] {
        hierarchy.add_class(
            BinaryName::parse(boxed).unwrap(),
            BinaryName::parse("java/lang/Number").unwrap(),
        );
    }
    let class_bytes =
        pick_class(ClassWriter::new(WriterFlags::COMPUTE_FRAMES).with_hierarchy(hierarchy));
    let frames = method_code(&class_bytes, "pick").stack_map_table.unwrap();
    assert_eq!(&frames[..5], &[0, 2, 10, 64 + 2, 7]);
    assert_eq!(class_name_at(&class_bytes, &frames[5..7]), "java/lang/Number");
}

#[test]
fn sample_methods_all_get_maximums() {
    let class_bytes = sample_class(WriterFlags::COMPUTE_FRAMES);
    for (name, max_stack, max_locals) in [
        ("<init>", 1, 1),
        ("run", 2, 2),
        ("describe", 1, 1),
        ("guarded", 1, 1),
        ("total", 2, 0),
        ("task", 1, 0),
    ] {
        let code = method_code(&class_bytes, name);
        assert_eq!(
            (code.max_stack, code.max_locals),
            (max_stack, max_locals),
            "maximums of {}",
            name
        );
    }
}

/// `try { Thread.yield(); } catch (FileNotFoundException | EOFException e) {}`
fn multi_catch_class(writer: ClassWriter) -> Vec<u8> {
    class_with_method(
        writer,
        Version::JAVA8,
        MethodAccessFlags::STATIC,
        "read",
        "()V",
        |mw| {
            let start = mw.new_label();
            let end = mw.new_label();
            let handler = mw.new_label();
            for caught in ["java/io/FileNotFoundException", "java/io/EOFException"] {
                mw.visit_try_catch_block(start, end, handler, Some(caught))?;
            }
            mw.visit_label(start)?;
            mw.visit_method_insn(INVOKESTATIC, "java/lang/Thread", "yield", "()V", false)?;
            mw.visit_label(end)?;
            mw.visit_insn(RETURN)?;
            mw.visit_label(handler)?;
            mw.visit_var_insn(ASTORE, 0)?;
            mw.visit_insn(RETURN)
        },
    )
}

#[test]
fn caught_types_join_below_throwable() {
    // Without a hierarchy the two exceptions only share `Object`, which a handler cannot catch
    let class_bytes = multi_catch_class(ClassWriter::new(WriterFlags::COMPUTE_FRAMES));
    let code = method_code(&class_bytes, "read");
    assert_eq!(code.exception_table.len(), 2);
    let frames = code.stack_map_table.unwrap();
    assert_eq!(&frames[..4], &[0, 1, 64 + 4, 7]);
    assert_eq!(
        class_name_at(&class_bytes, &frames[4..6]),
        "java/lang/Throwable"
    );

    let class_bytes = multi_catch_class(
        ClassWriter::new(WriterFlags::COMPUTE_FRAMES).with_hierarchy(javac::fixture_hierarchy()),
    );
    let frames = method_code(&class_bytes, "read").stack_map_table.unwrap();
    assert_eq!(&frames[..4], &[0, 1, 64 + 4, 7]);
    assert_eq!(
        class_name_at(&class_bytes, &frames[4..6]),
        "java/io/IOException"
    );
}
