use super::{Label, LabelGraph};
use crate::jvm::class_file::{
    AttributeBody, AttributeWriter, ConstantPool, LineNumber, LocalVariable,
};
use crate::jvm::Error;

/// `LineNumberTable` of a method under construction
///
/// The table only comes into existence with its first entry: a method without line numbers
/// gets no attribute at all rather than an empty one.
#[derive(Debug, Default)]
pub struct LineNumberTableWriter {
    entries: Option<Vec<(u16, Label)>>,
}

impl LineNumberTableWriter {
    pub fn add_line_number(&mut self, line: u16, start: Label) {
        self.entries.get_or_insert_with(Vec::new).push((line, start));
    }

    pub fn into_attribute(
        self,
        graph: &LabelGraph,
        pool: &mut ConstantPool,
    ) -> Result<Option<AttributeWriter>, Error> {
        let entries = match self.entries {
            None => return Ok(None),
            Some(entries) => entries,
        };
        let lines = entries
            .into_iter()
            .map(|(line_number, start)| {
                Ok(LineNumber {
                    start_pc: code_offset(graph, start)?,
                    line_number,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        AttributeWriter::new(pool, AttributeBody::LineNumberTable(lines)).map(Some)
    }
}

#[derive(Debug)]
struct LocalVariableEntry {
    name: String,
    descriptor: String,
    start: Label,
    end: Label,
    index: u16,
}

/// `LocalVariableTable` of a method under construction
#[derive(Debug, Default)]
pub struct LocalVariableTableWriter {
    entries: Option<Vec<LocalVariableEntry>>,
}

impl LocalVariableTableWriter {
    pub fn add_local_variable(
        &mut self,
        name: &str,
        descriptor: &str,
        start: Label,
        end: Label,
        index: u16,
    ) {
        self.entries
            .get_or_insert_with(Vec::new)
            .push(LocalVariableEntry {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                start,
                end,
                index,
            });
    }

    pub fn into_attribute(
        self,
        graph: &LabelGraph,
        pool: &mut ConstantPool,
    ) -> Result<Option<AttributeWriter>, Error> {
        let entries = match self.entries {
            None => return Ok(None),
            Some(entries) => entries,
        };
        let mut locals = Vec::with_capacity(entries.len());
        for entry in entries {
            let start_pc = code_offset(graph, entry.start)?;
            let end_pc = code_offset(graph, entry.end)?;
            let length = end_pc.checked_sub(start_pc).ok_or_else(|| Error::MalformedAttribute {
                name: String::from("LocalVariableTable"),
                reason: format!(
                    "{} ends at offset {} before it starts at {}",
                    entry.name, end_pc, start_pc
                ),
            })?;
            locals.push(LocalVariable {
                start_pc,
                length,
                name_index: pool.new_utf8(&entry.name)?,
                descriptor_index: pool.new_utf8(&entry.descriptor)?,
                index: entry.index,
            });
        }
        AttributeWriter::new(pool, AttributeBody::LocalVariableTable(locals)).map(Some)
    }
}

fn code_offset(graph: &LabelGraph, label: Label) -> Result<u16, Error> {
    let offset = graph.offset(label)?;
    u16::try_from(offset).map_err(|_| Error::MethodCodeOverflow(offset as usize))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ByteSize, ByteVector};

    #[test]
    fn line_numbers_are_lazy() {
        let graph = LabelGraph::new();
        let mut pool = ConstantPool::new();
        let table = LineNumberTableWriter::default();
        assert!(table.into_attribute(&graph, &mut pool).unwrap().is_none());
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn line_numbers() {
        let mut graph = LabelGraph::new();
        let start = graph.new_label();
        let later = graph.new_label();
        graph.place(start, 0).unwrap();
        graph.place(later, 7).unwrap();
        graph.resolve();

        let mut table = LineNumberTableWriter::default();
        table.add_line_number(3, start);
        table.add_line_number(4, later);

        let mut pool = ConstantPool::new();
        let attribute = table.into_attribute(&graph, &mut pool).unwrap().unwrap();
        assert_eq!(attribute.byte_size(), 16);
        let mut out = ByteVector::new();
        attribute.put(&mut out).unwrap();
        assert_eq!(
            out.as_slice(),
            &[0, 1, 0, 0, 0, 10, 0, 2, 0, 0, 0, 3, 0, 7, 0, 4]
        );
    }

    #[test]
    fn local_variables() {
        let mut graph = LabelGraph::new();
        let start = graph.new_label();
        let end = graph.new_label();
        graph.place(start, 2).unwrap();
        graph.place(end, 9).unwrap();
        graph.resolve();

        let mut table = LocalVariableTableWriter::default();
        table.add_local_variable("this", "LFoo;", start, end, 0);

        let mut pool = ConstantPool::new();
        let attribute = table.into_attribute(&graph, &mut pool).unwrap().unwrap();
        match &attribute.body {
            AttributeBody::LocalVariableTable(locals) => {
                assert_eq!(locals[0].start_pc, 2);
                assert_eq!(locals[0].length, 7);
            }
            other => panic!("unexpected attribute {:?}", other),
        }
        assert_eq!(attribute.byte_size(), 18);
        assert_eq!(attribute.byte_size(), table_size_of(&attribute));
    }

    #[test]
    fn inverted_local_range() {
        let mut graph = LabelGraph::new();
        let start = graph.new_label();
        let end = graph.new_label();
        graph.place(start, 9).unwrap();
        graph.place(end, 2).unwrap();
        graph.resolve();

        let mut table = LocalVariableTableWriter::default();
        table.add_local_variable("x", "I", start, end, 1);
        let mut pool = ConstantPool::new();
        assert!(matches!(
            table.into_attribute(&graph, &mut pool),
            Err(Error::MalformedAttribute { .. })
        ));
    }

    fn table_size_of(attribute: &AttributeWriter) -> usize {
        let mut out = ByteVector::new();
        attribute.put(&mut out).unwrap();
        out.len()
    }
}
