use super::{EdgeKind, Label, LabelFlags, LabelGraph};
use crate::jvm::class_file::{ByteVector, ConstantPool};
use crate::jvm::verifier::VType;
use crate::jvm::{BinaryName, Error, RefType};

/// Entry of the exception table, given in terms of labels
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive)
    pub start: Label,

    /// End of the protected range (exclusive)
    pub end: Label,
    pub handler: Label,

    /// Class of exceptions caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<String>,
}

/// Exception table of a method under construction
///
/// Handlers are kept in the order they were added, since that is the order in which the JVM
/// tries them.
#[derive(Clone, Debug, Default)]
pub struct ExceptionHandling {
    handlers: Vec<ExceptionHandler>,
}

impl ExceptionHandling {
    pub fn new() -> ExceptionHandling {
        ExceptionHandling::default()
    }

    pub fn add_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) {
        self.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        });
    }

    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Add an exception edge from every block in a protected range to its handler
    pub fn complete_simple(&self, graph: &mut LabelGraph) -> Result<(), Error> {
        for handler in &self.handlers {
            for block in covered_blocks(graph, handler.start, handler.end)? {
                graph.add_edge(block, EdgeKind::Exception, handler.handler)?;
            }
        }
        Ok(())
    }

    /// Add exception edges carrying the caught type, and mark handlers as needing a frame
    pub fn complete_with_frames(&self, graph: &mut LabelGraph) -> Result<(), Error> {
        for handler in &self.handlers {
            let caught = match &handler.catch_type {
                Some(catch_type) => VType::Object(RefType::from_internal_name(catch_type)?),
                None => VType::object(BinaryName::THROWABLE),
            };
            for block in covered_blocks(graph, handler.start, handler.end)? {
                graph.add_edge(
                    block,
                    EdgeKind::ExceptionFrame(caught.clone()),
                    handler.handler,
                )?;
            }
            graph.set_flags(handler.handler, LabelFlags::TARGET);
        }
        Ok(())
    }

    /// Remove the code between two labels from every protected range
    ///
    /// Ranges that straddle the removed code are split in two, with the second half inserted
    /// right after the first so that handler priority is preserved.
    pub fn remove_range(
        &mut self,
        graph: &LabelGraph,
        start: Label,
        end: Label,
    ) -> Result<(), Error> {
        let removed_start = graph.offset(start)?;
        let removed_end = graph.offset(end)?;

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers.drain(..) {
            let handler_start = graph.offset(handler.start)?;
            let handler_end = graph.offset(handler.end)?;

            if removed_end <= handler_start || removed_start >= handler_end {
                handlers.push(handler);
            } else if removed_start <= handler_start {
                if removed_end < handler_end {
                    handlers.push(ExceptionHandler { start: end, ..handler });
                }
            } else if removed_end >= handler_end {
                handlers.push(ExceptionHandler { end: start, ..handler });
            } else {
                handlers.push(ExceptionHandler {
                    end: start,
                    ..handler.clone()
                });
                handlers.push(ExceptionHandler { start: end, ..handler });
            }
        }
        self.handlers = handlers;
        Ok(())
    }

    /// Size of the serialized table, including its count
    pub fn byte_size(&self, graph: &LabelGraph) -> Result<usize, Error> {
        let mut entries = 0;
        for handler in &self.handlers {
            if !is_empty_range(graph, handler)? {
                entries += 1;
            }
        }
        Ok(2 + 8 * entries)
    }

    /// Write the exception table (count and entries), interning catch types as needed
    pub fn put(
        &self,
        out: &mut ByteVector,
        graph: &LabelGraph,
        pool: &mut ConstantPool,
    ) -> Result<(), Error> {
        let count_at = out.len();
        out.put_u16(0);
        let mut count: u16 = 0;
        for handler in &self.handlers {
            if is_empty_range(graph, handler)? {
                continue;
            }
            out.put_u16(code_offset(graph, handler.start)?);
            out.put_u16(code_offset(graph, handler.end)?);
            out.put_u16(code_offset(graph, handler.handler)?);
            let catch_type = match &handler.catch_type {
                Some(catch_type) => pool.new_class(catch_type)?.0 .0,
                None => 0,
            };
            out.put_u16(catch_type);
            count = count
                .checked_add(1)
                .ok_or(Error::TooManyEntries {
                    what: "exception handlers",
                    count: count as usize + 1,
                })?;
        }
        out.put_u16_at(count_at, count);
        Ok(())
    }
}

fn is_empty_range(graph: &LabelGraph, handler: &ExceptionHandler) -> Result<bool, Error> {
    Ok(graph.offset(handler.start)? >= graph.offset(handler.end)?)
}

fn code_offset(graph: &LabelGraph, label: Label) -> Result<u16, Error> {
    let offset = graph.offset(label)?;
    u16::try_from(offset).map_err(|_| Error::MethodCodeOverflow(offset as usize))
}

/// Blocks from the block of `start` up to (excluding) the block at `end`
fn covered_blocks(graph: &LabelGraph, start: Label, end: Label) -> Result<Vec<Label>, Error> {
    let end_offset = graph.offset(end)?;
    let mut blocks = vec![];
    let mut block = Some(graph.block_of(start));
    while let Some(current) = block {
        if graph.offset(current)? >= end_offset {
            break;
        }
        blocks.push(current);
        block = graph.next_block(current);
    }
    Ok(blocks)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::Edge;

    /// Graph with one block per position in `positions`
    fn graph_at(positions: &[u32]) -> (LabelGraph, Vec<Label>) {
        let mut graph = LabelGraph::new();
        let labels: Vec<Label> = positions
            .iter()
            .map(|position| {
                let label = graph.new_label();
                graph.place(label, *position).unwrap();
                label
            })
            .collect();
        graph.resolve();
        (graph, labels)
    }

    #[test]
    fn simple_completion_and_serialization() {
        let (mut graph, labels) = graph_at(&[10, 15, 20, 25]);
        let (l10, l15, l20, l25) = (labels[0], labels[1], labels[2], labels[3]);
        let mut handling = ExceptionHandling::new();
        handling.add_handler(l10, l20, l25, None);
        handling.complete_simple(&mut graph).unwrap();

        let exception_edge = [Edge {
            kind: EdgeKind::Exception,
            successor: l25,
        }];
        assert_eq!(graph.edges(l10), &exception_edge);
        assert_eq!(graph.edges(l15), &exception_edge);
        assert!(graph.edges(l20).is_empty());

        let mut pool = ConstantPool::new();
        let mut out = ByteVector::new();
        assert_eq!(handling.byte_size(&graph).unwrap(), 10);
        handling.put(&mut out, &graph, &mut pool).unwrap();
        assert_eq!(out.as_slice(), &[0, 1, 0, 10, 0, 20, 0, 25, 0, 0]);
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn frame_completion_carries_catch_type() {
        let (mut graph, labels) = graph_at(&[0, 4, 8]);
        let mut handling = ExceptionHandling::new();
        handling.add_handler(labels[0], labels[1], labels[2], Some("java/io/IOException"));
        handling.complete_with_frames(&mut graph).unwrap();

        let caught = VType::object(BinaryName::parse("java/io/IOException").unwrap());
        assert_eq!(
            graph.edges(labels[0]),
            &[Edge {
                kind: EdgeKind::ExceptionFrame(caught),
                successor: labels[2]
            }]
        );
        assert!(graph.flags(labels[2]).contains(LabelFlags::TARGET));
    }

    #[test]
    fn insertion_order_is_kept() {
        let (graph, labels) = graph_at(&[0, 5, 9, 13]);
        let mut handling = ExceptionHandling::new();
        handling.add_handler(labels[0], labels[1], labels[2], Some("java/lang/Error"));
        handling.add_handler(labels[0], labels[1], labels[3], Some("java/lang/Exception"));

        let mut pool = ConstantPool::new();
        let mut out = ByteVector::new();
        handling.put(&mut out, &graph, &mut pool).unwrap();
        let error = pool.new_class("java/lang/Error").unwrap().0 .0;
        let exception = pool.new_class("java/lang/Exception").unwrap().0 .0;
        assert!(error < exception);
        assert_eq!(
            out.as_slice(),
            &[
                0, 2, //
                0, 0, 0, 5, 0, 9, 0, error as u8, //
                0, 0, 0, 5, 0, 13, 0, exception as u8,
            ]
        );
    }

    #[test]
    fn removing_ranges() {
        let (graph, labels) = graph_at(&[0, 4, 8, 12, 16]);
        let mut handling = ExceptionHandling::new();
        handling.add_handler(labels[0], labels[3], labels[4], None);
        handling.add_handler(labels[1], labels[2], labels[4], Some("java/lang/Error"));
        handling.remove_range(&graph, labels[1], labels[2]).unwrap();

        assert_eq!(
            handling.handlers(),
            &[
                ExceptionHandler {
                    start: labels[0],
                    end: labels[1],
                    handler: labels[4],
                    catch_type: None,
                },
                ExceptionHandler {
                    start: labels[2],
                    end: labels[3],
                    handler: labels[4],
                    catch_type: None,
                },
            ]
        );
        assert_eq!(handling.byte_size(&graph).unwrap(), 2 + 8 * 2);
    }
}
