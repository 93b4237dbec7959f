use super::{ClassReader, Cursor, RawAttribute};
use crate::jvm::verifier::{Frame, NamedType, VerificationType};
use crate::jvm::{BinaryName, Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor};

/// Frame decoded from a `StackMapTable`: its offset, locals (`long` and `double` as one entry),
/// and stack
pub(crate) type DecodedFrame = (u32, Vec<NamedType>, Vec<NamedType>);

fn malformed(reason: String) -> Error {
    Error::MalformedAttribute {
        name: String::from("StackMapTable"),
        reason,
    }
}

impl<'a> ClassReader<'a> {
    /// Locals implied by the method signature, which the first stack map frame is relative to
    pub(crate) fn entry_locals(
        &self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<Vec<NamedType>, Error> {
        let this_class = BinaryName::parse(self.class_name()?)?;
        let descriptor: MethodDescriptor<BinaryName> = MethodDescriptor::parse(descriptor)?;
        let entry = Frame::entry(
            &this_class,
            !access_flags.has_receiver(),
            name == "<init>",
            &descriptor,
        );
        Ok(entry.into_named().locals)
    }

    /// Expand the compressed frames of a `StackMapTable` into full frames at absolute offsets
    pub(crate) fn read_stack_map_table(
        &self,
        attribute: RawAttribute<'_>,
        mut locals: Vec<NamedType>,
    ) -> Result<Vec<DecodedFrame>, Error> {
        let mut cursor = attribute.cursor(self.data);
        let count = cursor.read_u16()?;
        let mut frames = Vec::with_capacity(count as usize);
        let mut previous: Option<u32> = None;
        for _ in 0..count {
            let frame_type = cursor.read_u8()?;
            let (offset_delta, stack) = match frame_type {
                0..=63 => (frame_type as u16, vec![]),
                64..=127 => (
                    frame_type as u16 - 64,
                    vec![self.read_verification_type(&mut cursor)?],
                ),
                247 => {
                    let offset_delta = cursor.read_u16()?;
                    (offset_delta, vec![self.read_verification_type(&mut cursor)?])
                }
                248..=250 => {
                    let offset_delta = cursor.read_u16()?;
                    let chopped = (251 - frame_type) as usize;
                    if chopped > locals.len() {
                        return Err(malformed(format!(
                            "cannot chop {} locals from {}",
                            chopped,
                            locals.len()
                        )));
                    }
                    locals.truncate(locals.len() - chopped);
                    (offset_delta, vec![])
                }
                251 => (cursor.read_u16()?, vec![]),
                252..=254 => {
                    let offset_delta = cursor.read_u16()?;
                    for _ in 251..frame_type {
                        locals.push(self.read_verification_type(&mut cursor)?);
                    }
                    (offset_delta, vec![])
                }
                255 => {
                    let offset_delta = cursor.read_u16()?;
                    locals = self.read_verification_types(&mut cursor)?;
                    (offset_delta, self.read_verification_types(&mut cursor)?)
                }
                _ => return Err(malformed(format!("reserved frame type {}", frame_type))),
            };
            let offset = match previous {
                None => offset_delta as u32,
                Some(previous) => previous + offset_delta as u32 + 1,
            };
            previous = Some(offset);
            frames.push((offset, locals.clone(), stack));
        }
        Ok(frames)
    }

    fn read_verification_types(&self, cursor: &mut Cursor<'a>) -> Result<Vec<NamedType>, Error> {
        let count = cursor.read_u16()?;
        (0..count)
            .map(|_| self.read_verification_type(cursor))
            .collect()
    }

    fn read_verification_type(&self, cursor: &mut Cursor<'a>) -> Result<NamedType, Error> {
        let tag = cursor.read_u8()?;
        Ok(match tag {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(self.class(cursor.read_u16()?)?.to_owned()),
            8 => VerificationType::Uninitialized(cursor.read_u16()? as u32),
            _ => return Err(malformed(format!("unknown verification type {}", tag))),
        })
    }
}
