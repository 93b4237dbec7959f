//! Class files assembled byte by byte, laid out the way `javac` lays them out
//!
//! Nothing here goes through the crate's writer. The constant pools, attribute orders, and
//! stack map tables below follow `javac -g:source,lines` output for the Java shown on each
//! fixture, written out by hand.

use classcodec::jvm::code::opcodes::*;
use classcodec::jvm::verifier::ClassHierarchy;
use classcodec::jvm::BinaryName;
use std::collections::HashMap;

/// Constant pool with entries numbered from 1 in the order they are first asked for
#[derive(Default)]
pub struct Pool {
    entries: Vec<Vec<u8>>,
    indices: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(index) = self.indices.get(&entry) {
            return *index;
        }
        self.entries.push(entry.clone());
        let index = self.entries.len() as u16;
        self.indices.insert(entry, index);
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend((value.len() as u16).to_be_bytes());
        entry.extend(value.as_bytes());
        self.add(entry)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.add(tagged(7, &[name]))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(tagged(12, &[name, descriptor]))
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let owner = self.class(owner);
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(tagged(9, &[owner, name_and_type]))
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let owner = self.class(owner);
        let name_and_type = self.name_and_type(name, descriptor);
        self.add(tagged(10, &[owner, name_and_type]))
    }
}

fn tagged(tag: u8, indices: &[u16]) -> Vec<u8> {
    let mut entry = vec![tag];
    entry.extend(u2s(indices));
    entry
}

fn u2s(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_be_bytes()).collect()
}

/// Count followed by the entries
fn table(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = u2s(&[entries.len() as u16]);
    for entry in entries {
        bytes.extend(entry);
    }
    bytes
}

fn attribute(pool: &mut Pool, name: &str, body: &[u8]) -> Vec<u8> {
    let mut bytes = u2s(&[pool.utf8(name)]);
    bytes.extend((body.len() as u32).to_be_bytes());
    bytes.extend(body);
    bytes
}

/// Body of a method, along with the debug and frame tables that go in its `Code` attribute
#[derive(Default)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,

    /// `(start_pc, end_pc, handler_pc, catch_type)`
    pub handlers: Vec<[u16; 4]>,

    /// `(start_pc, line_number)`
    pub lines: Vec<(u16, u16)>,

    /// `(start_pc, length, name, descriptor, index)`
    pub locals: Vec<(u16, u16, &'static str, &'static str, u16)>,

    /// `(start_pc, length, name, signature, index)`
    pub local_types: Vec<(u16, u16, &'static str, &'static str, u16)>,

    /// Frames as they appear after `number_of_entries`
    pub frames: Vec<Vec<u8>>,
}

fn local_table(pool: &mut Pool, entries: &[(u16, u16, &str, &str, u16)]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = entries
        .iter()
        .map(|(start, length, name, descriptor, index)| {
            u2s(&[*start, *length, pool.utf8(name), pool.utf8(descriptor), *index])
        })
        .collect();
    table(&entries)
}

impl Code {
    fn attribute(self, pool: &mut Pool) -> Vec<u8> {
        let mut body = u2s(&[self.max_stack, self.max_locals]);
        body.extend((self.code.len() as u32).to_be_bytes());
        body.extend(&self.code);
        let handlers: Vec<Vec<u8>> = self.handlers.iter().map(|handler| u2s(handler)).collect();
        body.extend(table(&handlers));

        let mut attributes = vec![];
        if !self.lines.is_empty() {
            let lines: Vec<Vec<u8>> = self
                .lines
                .iter()
                .map(|(start, line)| u2s(&[*start, *line]))
                .collect();
            attributes.push(attribute(pool, "LineNumberTable", &table(&lines)));
        }
        if !self.locals.is_empty() {
            let locals = local_table(pool, &self.locals);
            attributes.push(attribute(pool, "LocalVariableTable", &locals));
        }
        if !self.local_types.is_empty() {
            let local_types = local_table(pool, &self.local_types);
            attributes.push(attribute(pool, "LocalVariableTypeTable", &local_types));
        }
        if !self.frames.is_empty() {
            attributes.push(attribute(pool, "StackMapTable", &table(&self.frames)));
        }
        body.extend(table(&attributes));
        attribute(pool, "Code", &body)
    }
}

fn member(
    pool: &mut Pool,
    access_flags: u16,
    name: &str,
    descriptor: &str,
    attributes: Vec<Vec<u8>>,
) -> Vec<u8> {
    let mut bytes = u2s(&[access_flags, pool.utf8(name), pool.utf8(descriptor)]);
    bytes.extend(table(&attributes));
    bytes
}

/// Class header, members, and attributes, all already encoded against `pool`
pub struct ClassFile {
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Vec<u8>>,
    pub methods: Vec<Vec<u8>>,
    pub attributes: Vec<Vec<u8>>,
}

impl ClassFile {
    fn into_bytes(self, pool: Pool) -> Vec<u8> {
        let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        bytes.extend(self.major_version.to_be_bytes());
        bytes.extend((pool.entries.len() as u16 + 1).to_be_bytes());
        for entry in &pool.entries {
            bytes.extend(entry);
        }
        bytes.extend(u2s(&[self.access_flags, self.this_class, self.super_class]));
        bytes.extend(u2s(&[self.interfaces.len() as u16]));
        bytes.extend(u2s(&self.interfaces));
        bytes.extend(table(&self.fields));
        bytes.extend(table(&self.methods));
        bytes.extend(table(&self.attributes));
        bytes
    }
}

fn inner_classes(pool: &mut Pool) -> Vec<u8> {
    let anonymous = pool.class("Fixture$1");
    attribute(pool, "InnerClasses", &u2s(&[1, anonymous, 0, 0, 0]))
}

/// `Fixture.class`, as compiled by `javac` 17
///
/// ```text
/// public class Fixture {
///     static int sign(int n) { return n > 0 ? 1 : -1; }
///     static int sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i; return s; }
///     static void read(String path) throws IOException {
///         try { new FileInputStream(path).close(); }
///         catch (FileNotFoundException | EOFException e) { e.printStackTrace(); }
///     }
///     Runnable task() { return new Runnable() { public void run() {} }; }
/// }
/// ```
pub fn fixture() -> Vec<u8> {
    let mut pool = Pool::default();
    let object_init = pool.method_ref("java/lang/Object", "<init>", "()V");
    let this_class = pool.class("Fixture");
    let super_class = pool.class("java/lang/Object");

    let init = Code {
        max_stack: 1,
        max_locals: 1,
        code: [&[ALOAD_0, INVOKESPECIAL][..], &object_init.to_be_bytes(), &[RETURN]].concat(),
        lines: vec![(0, 5)],
        ..Code::default()
    }
    .attribute(&mut pool);
    let init = member(&mut pool, 0x0001, "<init>", "()V", vec![init]);

    let sign = Code {
        max_stack: 1,
        max_locals: 1,
        code: vec![ILOAD_0, IFLE, 0, 7, ICONST_1, GOTO, 0, 4, ICONST_M1, IRETURN],
        lines: vec![(0, 7)],
        frames: vec![vec![8], vec![64, 1]],
        ..Code::default()
    }
    .attribute(&mut pool);
    let sign = member(&mut pool, 0x0008, "sign", "(I)I", vec![sign]);

    let sum = Code {
        max_stack: 2,
        max_locals: 3,
        code: vec![
            ICONST_0, ISTORE_1, ICONST_0, ISTORE_2, //
            ILOAD_2, ILOAD_0, IF_ICMPGE, 0, 13, //
            ILOAD_1, ILOAD_2, IADD, ISTORE_1, //
            IINC, 2, 1, GOTO, 0xFF, 0xF4, //
            ILOAD_1, IRETURN,
        ],
        lines: vec![(0, 11), (2, 12), (9, 13), (13, 12), (19, 15)],
        locals: vec![
            (4, 15, "i", "I", 2),
            (0, 21, "n", "I", 0),
            (2, 19, "s", "I", 1),
        ],
        frames: vec![vec![253, 0, 4, 1, 1], vec![250, 0, 14]],
        ..Code::default()
    }
    .attribute(&mut pool);
    let sum = member(&mut pool, 0x0008, "sum", "(I)I", vec![sum]);

    let input_stream = pool.class("java/io/FileInputStream");
    let open = pool.method_ref("java/io/FileInputStream", "<init>", "(Ljava/lang/String;)V");
    let close = pool.method_ref("java/io/FileInputStream", "close", "()V");
    let not_found = pool.class("java/io/FileNotFoundException");
    let eof = pool.class("java/io/EOFException");
    let io_exception = pool.class("java/io/IOException");
    let print = pool.method_ref("java/io/IOException", "printStackTrace", "()V");
    let read = Code {
        max_stack: 3,
        max_locals: 2,
        code: [
            &[NEW][..],
            &input_stream.to_be_bytes(),
            &[DUP, ALOAD_0, INVOKESPECIAL],
            &open.to_be_bytes(),
            &[INVOKEVIRTUAL],
            &close.to_be_bytes(),
            &[GOTO, 0, 8, ASTORE_1, ALOAD_1, INVOKEVIRTUAL],
            &print.to_be_bytes(),
            &[RETURN],
        ]
        .concat(),
        handlers: vec![[0, 11, 14, not_found], [0, 11, 14, eof]],
        lines: vec![(0, 19), (11, 22), (14, 20), (15, 21), (19, 23)],
        frames: vec![
            [&[64 + 14, 7][..], &io_exception.to_be_bytes()].concat(),
            vec![4],
        ],
        ..Code::default()
    }
    .attribute(&mut pool);
    let exceptions = attribute(&mut pool, "Exceptions", &u2s(&[1, io_exception]));
    let read = member(
        &mut pool,
        0x0008,
        "read",
        "(Ljava/lang/String;)V",
        vec![read, exceptions],
    );

    let anonymous = pool.class("Fixture$1");
    let anonymous_init = pool.method_ref("Fixture$1", "<init>", "(LFixture;)V");
    let task = Code {
        max_stack: 3,
        max_locals: 1,
        code: [
            &[NEW][..],
            &anonymous.to_be_bytes(),
            &[DUP, ALOAD_0, INVOKESPECIAL],
            &anonymous_init.to_be_bytes(),
            &[ARETURN],
        ]
        .concat(),
        lines: vec![(0, 26)],
        ..Code::default()
    }
    .attribute(&mut pool);
    let task = member(&mut pool, 0x0000, "task", "()Ljava/lang/Runnable;", vec![task]);

    let source = pool.utf8("Fixture.java");
    let attributes = vec![
        attribute(&mut pool, "SourceFile", &u2s(&[source])),
        attribute(&mut pool, "NestMembers", &u2s(&[1, anonymous])),
        inner_classes(&mut pool),
    ];

    ClassFile {
        major_version: 61,
        access_flags: 0x0021,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![init, sign, sum, read, task],
        attributes,
    }
    .into_bytes(pool)
}

/// `Fixture$1.class`, the anonymous `Runnable` returned by `Fixture.task`
pub fn anonymous_fixture() -> Vec<u8> {
    let mut pool = Pool::default();
    let outer = pool.field_ref("Fixture$1", "this$0", "LFixture;");
    let object_init = pool.method_ref("java/lang/Object", "<init>", "()V");
    let this_class = pool.class("Fixture$1");
    let super_class = pool.class("java/lang/Object");
    let runnable = pool.class("java/lang/Runnable");

    let this_field = member(&mut pool, 0x1010, "this$0", "LFixture;", vec![]);

    let init = Code {
        max_stack: 2,
        max_locals: 2,
        code: [
            &[ALOAD_0, ALOAD_1, PUTFIELD][..],
            &outer.to_be_bytes(),
            &[ALOAD_0, INVOKESPECIAL],
            &object_init.to_be_bytes(),
            &[RETURN],
        ]
        .concat(),
        lines: vec![(0, 26)],
        ..Code::default()
    }
    .attribute(&mut pool);
    let init = member(&mut pool, 0x0000, "<init>", "(LFixture;)V", vec![init]);

    let run = Code {
        max_stack: 0,
        max_locals: 1,
        code: vec![RETURN],
        lines: vec![(0, 26)],
        ..Code::default()
    }
    .attribute(&mut pool);
    let run = member(&mut pool, 0x0001, "run", "()V", vec![run]);

    let source = pool.utf8("Fixture.java");
    let fixture = pool.class("Fixture");
    let enclosing = pool.name_and_type("task", "()Ljava/lang/Runnable;");
    let attributes = vec![
        attribute(&mut pool, "SourceFile", &u2s(&[source])),
        attribute(&mut pool, "EnclosingMethod", &u2s(&[fixture, enclosing])),
        attribute(&mut pool, "NestHost", &u2s(&[fixture])),
        inner_classes(&mut pool),
    ];

    ClassFile {
        major_version: 61,
        access_flags: 0x0020,
        this_class,
        super_class,
        interfaces: vec![runnable],
        fields: vec![this_field],
        methods: vec![init, run],
        attributes,
    }
    .into_bytes(pool)
}

/// Superclasses of the exceptions `Fixture.read` deals with
pub fn fixture_hierarchy() -> ClassHierarchy {
    let mut hierarchy = ClassHierarchy::new();
    for (class, superclass) in [
        ("java/io/FileNotFoundException", "java/io/IOException"),
        ("java/io/EOFException", "java/io/IOException"),
        ("java/io/IOException", "java/lang/Exception"),
        ("java/lang/Exception", "java/lang/Throwable"),
    ] {
        hierarchy.add_class(
            BinaryName::parse(class).unwrap(),
            BinaryName::parse(superclass).unwrap(),
        );
    }
    hierarchy
}

/// `Names.class`, compiled with `javac -g` so that it carries a `LocalVariableTypeTable`
///
/// ```text
/// class Names {
///     static List<String> same(List<String> names) { return names; }
/// }
/// ```
pub fn generic_fixture() -> Vec<u8> {
    let mut pool = Pool::default();
    let this_class = pool.class("Names");
    let super_class = pool.class("java/lang/Object");

    let same = Code {
        max_stack: 1,
        max_locals: 1,
        code: vec![ALOAD_0, ARETURN],
        lines: vec![(0, 5)],
        locals: vec![(0, 2, "names", "Ljava/util/List;", 0)],
        local_types: vec![(0, 2, "names", "Ljava/util/List<Ljava/lang/String;>;", 0)],
        ..Code::default()
    }
    .attribute(&mut pool);
    let signature = pool.utf8("(Ljava/util/List<Ljava/lang/String;>;)Ljava/util/List<Ljava/lang/String;>;");
    let signature = attribute(&mut pool, "Signature", &u2s(&[signature]));
    let same = member(
        &mut pool,
        0x0008,
        "same",
        "(Ljava/util/List;)Ljava/util/List;",
        vec![same, signature],
    );

    let source = pool.utf8("Names.java");
    let attributes = vec![attribute(&mut pool, "SourceFile", &u2s(&[source]))];
    ClassFile {
        major_version: 61,
        access_flags: 0x0020,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![same],
        attributes,
    }
    .into_bytes(pool)
}

/// Class `Broken` with a single static `()V` method whose body is `code`
pub fn class_with_code(code: Vec<u8>, frames: Vec<Vec<u8>>) -> Vec<u8> {
    let mut pool = Pool::default();
    let this_class = pool.class("Broken");
    let super_class = pool.class("java/lang/Object");
    let body = Code {
        max_stack: 2,
        max_locals: 0,
        code,
        frames,
        ..Code::default()
    }
    .attribute(&mut pool);
    let method = member(&mut pool, 0x0008, "broken", "()V", vec![body]);
    ClassFile {
        major_version: 61,
        access_flags: 0x0020,
        this_class,
        super_class,
        interfaces: vec![],
        fields: vec![],
        methods: vec![method],
        attributes: vec![],
    }
    .into_bytes(pool)
}
