use super::{ClassReader, Cursor};
use crate::jvm::class_file::{Annotation, Constant, ElementValue};
use crate::jvm::Error;

impl<'a> ClassReader<'a> {
    /// Decode a `Runtime*Annotations` body (starting with its count)
    pub(crate) fn read_annotations(
        &self,
        cursor: &mut Cursor<'_>,
    ) -> Result<Vec<Annotation>, Error> {
        let count = cursor.read_u16()?;
        (0..count).map(|_| self.read_annotation(cursor)).collect()
    }

    fn read_annotation(&self, cursor: &mut Cursor<'_>) -> Result<Annotation, Error> {
        let descriptor = self.utf8(cursor.read_u16()?)?.to_owned();
        let count = cursor.read_u16()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.utf8(cursor.read_u16()?)?.to_owned();
            values.push((name, self.read_element_value(cursor)?));
        }
        Ok(Annotation { descriptor, values })
    }

    fn read_element_value(&self, cursor: &mut Cursor<'_>) -> Result<ElementValue, Error> {
        let tag = cursor.read_u8()?;
        Ok(match tag {
            b'B' => ElementValue::Byte(self.integer(cursor.read_u16()?)? as i8),
            b'C' => ElementValue::Char(self.integer(cursor.read_u16()?)? as u16),
            b'S' => ElementValue::Short(self.integer(cursor.read_u16()?)? as i16),
            b'Z' => ElementValue::Boolean(self.integer(cursor.read_u16()?)? != 0),
            b'I' => ElementValue::Int(self.integer(cursor.read_u16()?)?),
            b'J' => {
                let index = cursor.read_u16()?;
                match self.constant(index)? {
                    Constant::Long(value) => ElementValue::Long(*value),
                    _ => return Err(unexpected(index, "Long")),
                }
            }
            b'F' => {
                let index = cursor.read_u16()?;
                match self.constant(index)? {
                    Constant::Float(bits) => ElementValue::Float(f32::from_bits(*bits)),
                    _ => return Err(unexpected(index, "Float")),
                }
            }
            b'D' => {
                let index = cursor.read_u16()?;
                match self.constant(index)? {
                    Constant::Double(bits) => ElementValue::Double(f64::from_bits(*bits)),
                    _ => return Err(unexpected(index, "Double")),
                }
            }
            b's' => ElementValue::String(self.utf8(cursor.read_u16()?)?.to_owned()),
            b'e' => ElementValue::Enum {
                descriptor: self.utf8(cursor.read_u16()?)?.to_owned(),
                name: self.utf8(cursor.read_u16()?)?.to_owned(),
            },
            b'c' => ElementValue::Class(self.utf8(cursor.read_u16()?)?.to_owned()),
            b'@' => ElementValue::Annotation(self.read_annotation(cursor)?),
            b'[' => {
                let count = cursor.read_u16()?;
                let values = (0..count)
                    .map(|_| self.read_element_value(cursor))
                    .collect::<Result<Vec<_>, _>>()?;
                ElementValue::Array(values)
            }
            _ => {
                return Err(Error::MalformedAttribute {
                    name: String::from("RuntimeVisibleAnnotations"),
                    reason: format!("unknown element value tag {:?}", tag as char),
                })
            }
        })
    }

    fn integer(&self, index: u16) -> Result<i32, Error> {
        match self.constant(index)? {
            Constant::Integer(value) => Ok(*value),
            _ => Err(unexpected(index, "Integer")),
        }
    }
}

fn unexpected(index: u16, expected: &'static str) -> Error {
    Error::UnexpectedConstant { index, expected }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_file::{Annotation, ByteVector, ConstantPool, ElementValue};

    #[test]
    fn annotations_read_back() {
        let annotation = Annotation {
            descriptor: String::from("Lme/Marker;"),
            values: vec![
                (String::from("count"), ElementValue::Int(3)),
                (String::from("ratio"), ElementValue::Double(0.5)),
                (
                    String::from("kind"),
                    ElementValue::Enum {
                        descriptor: String::from("Lme/Kind;"),
                        name: String::from("FAST"),
                    },
                ),
                (
                    String::from("tags"),
                    ElementValue::Array(vec![
                        ElementValue::Char(u16::from(b'x')),
                        ElementValue::Boolean(false),
                    ]),
                ),
            ],
        };

        let mut pool = ConstantPool::new();
        let mut encoded = ByteVector::new();
        encoded.put_u16(1);
        annotation.put(&mut pool, &mut encoded).unwrap();

        let class_bytes = super::super::test_support::class_with_pool(&pool);
        let reader = super::ClassReader::new(&class_bytes).unwrap();
        let mut cursor = super::Cursor::new(encoded.as_slice());
        assert_eq!(reader.read_annotations(&mut cursor).unwrap(), vec![annotation]);
    }
}
