//! Streaming XML helpers for worksheet parts.
//! Wraps the quick-xml reader and adds attribute and text extraction shortcuts.

use crate::error::SheetMapperError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::io::BufRead;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML content handling
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Unknown entity '&{0};'")]
    UnknownEntity(String),

    #[error("Invalid value '{value}' for attribute '{name}'")]
    InvalidAttributeValue { name: String, value: String },
}

/// Event reader reusing one buffer for the whole part
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        // <row r="3"/> must still produce a start and an end event
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader { reader, buffer: Vec::with_capacity(1024) }
    }

    /// Next event, `None` at end of document.
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SheetMapperError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SheetMapperError::XmlError(error)),
        }
    }
}

/// Attribute value access on start tags
pub(crate) trait XmlNodeHelper<'a> {
    /// Unescaped value of attribute `name`, if present
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetMapperError>;

    /// Value of attribute `name` parsed as `T`, if present
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetMapperError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SheetMapperError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute_value(&attribute))
            .transpose()
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SheetMapperError> {
        let Some(attribute) = self.try_get_attribute(name)? else {
            return Ok(None);
        };
        let value = attribute.unescape_value()?;
        value.parse::<T>().map(Some).map_err(|_| {
            XmlError::InvalidAttributeValue {
                name: name.to_owned(),
                value: value.to_string(),
            }
            .into()
        })
    }
}

/// Unescaped attribute value as owned text
pub(crate) fn attribute_value<'a>(attribute: &Attribute<'a>) -> Result<Cow<'a, str>, SheetMapperError> {
    Ok(Cow::Owned(attribute.unescape_value()?.into_owned()))
}

/// Builds text content out of general entity references
pub(crate) trait XmlTextContextHelper {
    /// Appends the character behind `&amp;`, `&#65;` or `&#x41;`
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetMapperError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SheetMapperError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::UnknownEntity(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Loops over the events of an [`XmlReader`], ignoring unmatched ones.
#[macro_export]
#[doc(hidden)]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_xml_events;

    #[derive(Debug, Default)]
    struct CellNode {
        reference: Option<String>,
        style: Option<usize>,
        kind: Option<String>,
        text: String,
    }

    fn read_cell(xml: &str) -> Result<CellNode, SheetMapperError> {
        let mut reader = XmlReader::new(xml.as_bytes());
        let mut cell = CellNode::default();
        match_xml_events!(reader => {
            Event::Start(event) if event.name().as_ref() == b"c" => {
                cell.reference = event.get_attribute_value("r")?.map(|value| value.to_string());
                cell.style = event.parse_attribute_value::<usize>("s")?;
                cell.kind = event.get_attribute_value("t")?.map(|value| value.to_string());
            }
            Event::Text(event) => cell.text.push_str(&event.xml_content()?),
            Event::GeneralRef(event) => cell.text.push_bytes_ref(&event)?,
        });
        Ok(cell)
    }

    #[test]
    fn read_attributes_and_entities() {
        let cell = read_cell(r#"<c r="B2" s="3" t="x&amp;y"><v>A&#66;&#x43;&lt;</v></c>"#).unwrap();
        assert_eq!(cell.reference.as_deref(), Some("B2"));
        assert_eq!(cell.style, Some(3));
        assert_eq!(cell.kind.as_deref(), Some("x&y"));
        assert_eq!(cell.text, "ABC<");
    }

    #[test]
    fn reject_bad_attribute_value() {
        let result = read_cell(r#"<c s="abc"/>"#);
        assert!(matches!(
            result,
            Err(SheetMapperError::XmlHelperError(XmlError::InvalidAttributeValue { .. }))
        ));
    }

    #[test]
    fn reject_unknown_entity() {
        let result = read_cell("<c><v>&nbsp;</v></c>");
        assert!(matches!(result, Err(SheetMapperError::XmlHelperError(XmlError::UnknownEntity(_)))));
    }
}
