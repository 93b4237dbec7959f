#![allow(dead_code)]

pub mod javac;

use classcodec::jvm::class_file::HandleKind;
use classcodec::jvm::code::opcodes::*;
use classcodec::jvm::code::{Label, LabelGraph};
use classcodec::jvm::visitor::{Attribute, ClassVisitor, FieldVisitor, FrameType, MethodVisitor};
use classcodec::jvm::*;

/// Visitor that writes down every event it receives
///
/// Opcodes are recorded as numbers and labels with their debug form (`l0`, `l1`, ...), numbered
/// in creation order within each method.
#[derive(Default)]
pub struct EventRecorder {
    pub events: Vec<String>,
}

pub struct MemberRecorder<'a> {
    events: &'a mut Vec<String>,
    labels: LabelGraph,
}

impl<'a> MemberRecorder<'a> {
    fn record(&mut self, event: String) -> Result<(), Error> {
        self.events.push(event);
        Ok(())
    }
}

impl ClassVisitor for EventRecorder {
    fn visit(
        &mut self,
        version: Version,
        access_flags: ClassAccessFlags,
        name: &str,
        signature: Option<&str>,
        super_name: Option<&str>,
        interfaces: &[String],
    ) -> Result<(), Error> {
        self.events.push(format!(
            "class {} {:#06x} extends {:?} implements {:?} signature {:?} version {}",
            name,
            access_flags.bits(),
            super_name,
            interfaces,
            signature,
            version.major_version
        ));
        Ok(())
    }

    fn visit_source(&mut self, source_file: &str) -> Result<(), Error> {
        self.events.push(format!("source {}", source_file));
        Ok(())
    }

    fn visit_nest_host(&mut self, nest_host: &str) -> Result<(), Error> {
        self.events.push(format!("nest host {}", nest_host));
        Ok(())
    }

    fn visit_outer_class(
        &mut self,
        owner: &str,
        name: Option<&str>,
        descriptor: Option<&str>,
    ) -> Result<(), Error> {
        self.events
            .push(format!("outer class {} {:?} {:?}", owner, name, descriptor));
        Ok(())
    }

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.events
            .push(format!("annotation {:?} visible {}", annotation, visible));
        Ok(())
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.events
            .push(format!("attribute {} {:?}", attribute.name, attribute.data));
        Ok(())
    }

    fn visit_nest_member(&mut self, nest_member: &str) -> Result<(), Error> {
        self.events.push(format!("nest member {}", nest_member));
        Ok(())
    }

    fn visit_inner_class(
        &mut self,
        name: &str,
        outer_name: Option<&str>,
        inner_name: Option<&str>,
        access_flags: InnerClassAccessFlags,
    ) -> Result<(), Error> {
        self.events.push(format!(
            "inner class {} outer {:?} name {:?} {:#06x}",
            name,
            outer_name,
            inner_name,
            access_flags.bits()
        ));
        Ok(())
    }

    fn visit_field<'a>(
        &'a mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        _signature: Option<&str>,
        value: Option<&ConstantValue>,
    ) -> Result<Option<Box<dyn FieldVisitor + 'a>>, Error> {
        self.events.push(format!(
            "field {:#06x} {} {} value {:?}",
            access_flags.bits(),
            name,
            descriptor,
            value
        ));
        Ok(Some(Box::new(MemberRecorder {
            events: &mut self.events,
            labels: LabelGraph::new(),
        })))
    }

    fn visit_method<'a>(
        &'a mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        _signature: Option<&str>,
        exceptions: &[String],
    ) -> Result<Option<Box<dyn MethodVisitor + 'a>>, Error> {
        self.events.push(format!(
            "method {:#06x} {}{} throws {:?}",
            access_flags.bits(),
            name,
            descriptor,
            exceptions
        ));
        Ok(Some(Box::new(MemberRecorder {
            events: &mut self.events,
            labels: LabelGraph::new(),
        })))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.events.push(String::from("end class"));
        Ok(())
    }
}

impl<'a> FieldVisitor for MemberRecorder<'a> {
    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.record(format!("annotation {:?} visible {}", annotation, visible))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.record(format!("attribute {} {:?}", attribute.name, attribute.data))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.record(String::from("end field"))
    }
}

impl<'a> MethodVisitor for MemberRecorder<'a> {
    fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    fn visit_annotation(&mut self, annotation: &Annotation, visible: bool) -> Result<(), Error> {
        self.record(format!("annotation {:?} visible {}", annotation, visible))
    }

    fn visit_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.record(format!("attribute {} {:?}", attribute.name, attribute.data))
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.record(String::from("code"))
    }

    fn visit_insn(&mut self, opcode: u8) -> Result<(), Error> {
        self.record(format!("insn {}", opcode))
    }

    fn visit_int_insn(&mut self, opcode: u8, operand: i32) -> Result<(), Error> {
        self.record(format!("int {} {}", opcode, operand))
    }

    fn visit_var_insn(&mut self, opcode: u8, index: u16) -> Result<(), Error> {
        self.record(format!("var {} {}", opcode, index))
    }

    fn visit_type_insn(&mut self, opcode: u8, type_name: &str) -> Result<(), Error> {
        self.record(format!("type {} {}", opcode, type_name))
    }

    fn visit_field_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        self.record(format!("field {} {}.{}:{}", opcode, owner, name, descriptor))
    }

    fn visit_method_insn(
        &mut self,
        opcode: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<(), Error> {
        self.record(format!(
            "method {} {}.{}{} interface {}",
            opcode, owner, name, descriptor, is_interface
        ))
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[ConstantValue],
    ) -> Result<(), Error> {
        self.record(format!(
            "indy {}{} {}.{} {:?}",
            name,
            descriptor,
            bootstrap_method.owner,
            bootstrap_method.name,
            bootstrap_arguments
        ))
    }

    fn visit_jump_insn(&mut self, opcode: u8, target: Label) -> Result<(), Error> {
        self.record(format!("jump {} {:?}", opcode, target))
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.record(format!("label {:?}", label))
    }

    fn visit_frame(&mut self, locals: &[FrameType], stack: &[FrameType]) -> Result<(), Error> {
        self.record(format!("frame {:?} {:?}", locals, stack))
    }

    fn visit_ldc_insn(&mut self, value: &ConstantValue) -> Result<(), Error> {
        self.record(format!("ldc {:?}", value))
    }

    fn visit_iinc_insn(&mut self, index: u16, increment: i16) -> Result<(), Error> {
        self.record(format!("iinc {} {}", index, increment))
    }

    fn visit_table_switch_insn(
        &mut self,
        min: i32,
        max: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.record(format!(
            "tableswitch {}..{} default {:?} {:?}",
            min, max, default, targets
        ))
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        self.record(format!(
            "lookupswitch default {:?} {:?} {:?}",
            default, keys, targets
        ))
    }

    fn visit_multi_anewarray_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<(), Error> {
        self.record(format!("multianewarray {} {}", descriptor, dimensions))
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> Result<(), Error> {
        self.record(format!(
            "try {:?} {:?} {:?} {:?}",
            start, end, handler, catch_type
        ))
    }

    fn visit_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        self.record(format!(
            "local {} {} {:?} {:?} {}",
            name, descriptor, start, end, index
        ))
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.record(format!("line {} {:?}", line, start))
    }

    fn visit_code_attribute(&mut self, attribute: &Attribute) -> Result<(), Error> {
        self.record(format!("code attribute {} {:?}", attribute.name, attribute.data))
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.record(format!("maxs {} {}", max_stack, max_locals))
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        self.record(String::from("end method"))
    }
}

/// Read a class, returning the events it produces
pub fn record(class_bytes: &[u8], flags: ReaderFlags) -> Vec<String> {
    let reader = ClassReader::new(class_bytes).unwrap();
    let mut recorder = EventRecorder::default();
    reader.accept(&mut recorder, flags).unwrap();
    recorder.events
}

pub fn marker() -> Annotation {
    Annotation {
        descriptor: String::from("Lme/Marker;"),
        values: vec![(String::from("value"), ElementValue::Int(1))],
    }
}

pub fn metafactory() -> Handle {
    Handle {
        kind: HandleKind::InvokeStatic,
        owner: String::from("java/lang/invoke/LambdaMetafactory"),
        name: String::from("metafactory"),
        descriptor: String::from(
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;\
             Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;\
             Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
        ),
        is_interface: false,
    }
}

/// Class `me/Sample` exercising most of what the writer can produce
///
/// ```text
/// public class Sample implements Runnable {
///     static final int LIMIT = 10;
///     private String name;
///
///     public Sample() { super(); }
///     public void run() { for (int i = 0; i < LIMIT; i++) {} }
///     static String describe(int n) { switch (n) { ... } }
///     static void guarded() { try { Thread.yield(); } catch (RuntimeException e) {} }
///     static long total() { return 1L << 40; }
///     static Runnable task() { return () -> {}; }
/// }
/// ```
pub fn sample_class(flags: WriterFlags) -> Vec<u8> {
    let mut writer = ClassWriter::new(flags);
    write_sample(&mut writer, false).unwrap();
    writer.to_bytes().unwrap()
}

/// [`sample_class`] with an extra `me.Custom` class attribute
///
/// Raw attributes need a writer that copied its pool, so this one is written over the pool of
/// a plain sample class.
pub fn sample_class_with_custom_attribute(flags: WriterFlags) -> Vec<u8> {
    let plain = sample_class(flags);
    let reader = ClassReader::new(&plain).unwrap();
    let mut writer = ClassWriter::from_reader(&reader, flags).unwrap();
    write_sample(&mut writer, true).unwrap();
    writer.to_bytes().unwrap()
}

fn write_sample(writer: &mut ClassWriter, custom: bool) -> Result<(), Error> {
    writer.visit(
        Version::JAVA8,
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        "me/Sample",
        None,
        Some("java/lang/Object"),
        &[String::from("java/lang/Runnable")],
    )?;
    writer.visit_source("Sample.java")?;
    writer.visit_annotation(&marker(), true)?;
    if custom {
        writer.visit_attribute(&Attribute {
            name: String::from("me.Custom"),
            data: vec![1, 2, 3],
        })?;
    }
    writer.visit_inner_class(
        "me/Sample$Inner",
        Some("me/Sample"),
        Some("Inner"),
        InnerClassAccessFlags::PUBLIC | InnerClassAccessFlags::STATIC,
    )?;

    let mut field = writer.add_field(
        FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "LIMIT",
        "I",
        None,
        Some(&ConstantValue::Integer(10)),
    )?;
    field.visit_end()?;
    let mut field = writer.add_field(
        FieldAccessFlags::PRIVATE,
        "name",
        "Ljava/lang/String;",
        None,
        None,
    )?;
    field.visit_end()?;

    let mut mw = writer.add_method(MethodAccessFlags::PUBLIC, "<init>", "()V", None, &[])?;
    mw.visit_code()?;
    mw.visit_var_insn(ALOAD, 0)?;
    mw.visit_method_insn(INVOKESPECIAL, "java/lang/Object", "<init>", "()V", false)?;
    mw.visit_insn(RETURN)?;
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    let mut mw = writer.add_method(MethodAccessFlags::PUBLIC, "run", "()V", None, &[])?;
    let start = mw.new_label();
    let condition = mw.new_label();
    let end = mw.new_label();
    mw.visit_code()?;
    mw.visit_label(start)?;
    mw.visit_line_number(10, start)?;
    mw.visit_insn(ICONST_0)?;
    mw.visit_var_insn(ISTORE, 1)?;
    mw.visit_label(condition)?;
    mw.visit_line_number(11, condition)?;
    mw.visit_var_insn(ILOAD, 1)?;
    mw.visit_field_insn(GETSTATIC, "me/Sample", "LIMIT", "I")?;
    mw.visit_jump_insn(IF_ICMPGE, end)?;
    mw.visit_iinc_insn(1, 1)?;
    mw.visit_jump_insn(GOTO, condition)?;
    mw.visit_label(end)?;
    mw.visit_insn(RETURN)?;
    mw.visit_local_variable("i", "I", condition, end, 1)?;
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    let mut mw = writer.add_method(
        MethodAccessFlags::STATIC,
        "describe",
        "(I)Ljava/lang/String;",
        None,
        &[],
    )?;
    let zero = mw.new_label();
    let one = mw.new_label();
    let many = mw.new_label();
    mw.visit_code()?;
    mw.visit_var_insn(ILOAD, 0)?;
    mw.visit_table_switch_insn(0, 1, many, &[zero, one])?;
    for (label, text) in [(zero, "zero"), (one, "one"), (many, "many")] {
        mw.visit_label(label)?;
        mw.visit_ldc_insn(&ConstantValue::String(String::from(text)))?;
        mw.visit_insn(ARETURN)?;
    }
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    let mut mw = writer.add_method(MethodAccessFlags::STATIC, "guarded", "()V", None, &[])?;
    let try_start = mw.new_label();
    let try_end = mw.new_label();
    let handler = mw.new_label();
    let done = mw.new_label();
    mw.visit_code()?;
    mw.visit_try_catch_block(try_start, try_end, handler, Some("java/lang/RuntimeException"))?;
    mw.visit_label(try_start)?;
    mw.visit_method_insn(INVOKESTATIC, "java/lang/Thread", "yield", "()V", false)?;
    mw.visit_label(try_end)?;
    mw.visit_jump_insn(GOTO, done)?;
    mw.visit_label(handler)?;
    mw.visit_var_insn(ASTORE, 0)?;
    mw.visit_label(done)?;
    mw.visit_insn(RETURN)?;
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    let mut mw = writer.add_method(MethodAccessFlags::STATIC, "total", "()J", None, &[])?;
    mw.visit_code()?;
    mw.visit_ldc_insn(&ConstantValue::Long(1 << 40))?;
    mw.visit_insn(LRETURN)?;
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    let mut mw = writer.add_method(
        MethodAccessFlags::STATIC,
        "task",
        "()Ljava/lang/Runnable;",
        None,
        &[],
    )?;
    mw.visit_code()?;
    mw.visit_invoke_dynamic_insn(
        "run",
        "()Ljava/lang/Runnable;",
        &metafactory(),
        &[
            ConstantValue::MethodType(String::from("()V")),
            ConstantValue::MethodHandle(Handle {
                kind: HandleKind::InvokeStatic,
                owner: String::from("me/Sample"),
                name: String::from("lambda$task$0"),
                descriptor: String::from("()V"),
                is_interface: false,
            }),
            ConstantValue::MethodType(String::from("()V")),
        ],
    )?;
    mw.visit_insn(ARETURN)?;
    mw.visit_maxs(0, 0)?;
    mw.visit_end()?;

    writer.visit_end()
}

/// Body of a method, pulled out of a class file
#[derive(Debug)]
pub struct MethodCode {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,

    /// Each entry is `(start_pc, end_pc, handler_pc, catch_type)`
    pub exception_table: Vec<(u16, u16, u16, u16)>,

    /// Body of the `StackMapTable` attribute, if there is one
    pub stack_map_table: Option<Vec<u8>>,
}

/// Find the `Code` attribute of the method called `name`
pub fn method_code(class_bytes: &[u8], name: &str) -> MethodCode {
    let reader = ClassReader::new(class_bytes).unwrap();
    let header_start = 10 + reader.raw_constant_pool().len();
    let mut cursor = Cursor::at(class_bytes, header_start);
    cursor.skip(6).unwrap();
    let interfaces = cursor.read_u16().unwrap() as usize;
    cursor.skip(2 * interfaces).unwrap();

    let fields = cursor.read_u16().unwrap();
    for _ in 0..fields {
        cursor.skip(6).unwrap();
        cursor.skip_attributes().unwrap();
    }

    let methods = cursor.read_u16().unwrap();
    for _ in 0..methods {
        cursor.skip(2).unwrap();
        let method_name = reader.utf8(cursor.read_u16().unwrap()).unwrap();
        cursor.skip(2).unwrap();
        let attributes = cursor.read_u16().unwrap();
        for _ in 0..attributes {
            let attribute_name = reader.utf8(cursor.read_u16().unwrap()).unwrap();
            let length = cursor.read_u32().unwrap() as usize;
            let body = cursor.read_bytes(length).unwrap();
            if method_name == name && attribute_name == "Code" {
                return parse_code(&reader, body);
            }
        }
    }
    panic!("no method {} with code", name)
}

fn parse_code(reader: &ClassReader<'_>, body: &[u8]) -> MethodCode {
    let mut cursor = Cursor::new(body);
    let max_stack = cursor.read_u16().unwrap();
    let max_locals = cursor.read_u16().unwrap();
    let code_length = cursor.read_u32().unwrap() as usize;
    let code = cursor.read_bytes(code_length).unwrap().to_vec();
    let handlers = cursor.read_u16().unwrap();
    let exception_table = (0..handlers)
        .map(|_| {
            (
                cursor.read_u16().unwrap(),
                cursor.read_u16().unwrap(),
                cursor.read_u16().unwrap(),
                cursor.read_u16().unwrap(),
            )
        })
        .collect();

    let mut stack_map_table = None;
    let attributes = cursor.read_u16().unwrap();
    for _ in 0..attributes {
        let name = reader.utf8(cursor.read_u16().unwrap()).unwrap();
        let length = cursor.read_u32().unwrap() as usize;
        let body = cursor.read_bytes(length).unwrap();
        if name == "StackMapTable" {
            stack_map_table = Some(body.to_vec());
        }
    }

    MethodCode {
        max_stack,
        max_locals,
        code,
        exception_table,
        stack_map_table,
    }
}
