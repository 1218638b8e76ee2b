use crate::error::SheetMapperError;
use crate::error::ResultMessage;
use crate::event::SheetHandler;
use crate::helpers::reference::{reference_to_index, row_to_index};
use crate::helpers::xml::attribute_value;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::{display_text, CellType};
use crate::spreadsheet::excel::{load_relationships, resolve_number_formats};
use crate::spreadsheet::{FileReader, SheetSelector, SpreadsheetError};
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;
use zip::ZipArchive;

const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");
const TAG_FORMAT_INDEX: QName = QName(b"xf");
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");
const TAG_TEXT: QName = QName(b"t");
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr");
const TAG_SHEET: QName = QName(b"sheet");
const TAG_ROW: QName = QName(b"row");
const TAG_CELL: QName = QName(b"c");
const TAG_INLINE_STRING: QName = QName(b"is");
const TAG_VALUE: QName = QName(b"v");

/// Streams worksheets of an `.xlsx` workbook as sheet events.
///
/// Workbook metadata, styles and the shared string table are read when the
/// source is opened; worksheet parts are read lazily, one event at a time.
pub struct XlsxSheetSource<RS: Read + Seek> {
    zip: ZipArchive<RS>,
    /// Worksheets as (name, zip path) pairs, in workbook order
    sheets: Vec<(String, String)>,
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
}

impl XlsxSheetSource<FileReader> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SheetMapperError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(SheetMapperError::from).with_prefix(&name)?;
        Self::from_reader(BufReader::new(file)).with_prefix(&name)
    }
}

impl<RS: Read + Seek> XlsxSheetSource<RS> {
    pub fn from_reader(reader: RS) -> Result<Self, SheetMapperError> {
        let mut zip = ZipArchive::new(reader)?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyWorkbook)?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        tracing::debug!(
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            "Opened workbook"
        );
        Ok(XlsxSheetSource { zip, sheets, number_formats, shared_strings })
    }

    /// Worksheet names in workbook order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Streams the first worksheet accepted by `selector` into `handler`,
    /// returning the sheet's name.
    ///
    /// Every `<row>` element produces `start_row`/`end_row`, every non-empty
    /// cell a `cell` event carrying its display text, and the stream closes
    /// with `end_sheet`. The first handler error stops the stream.
    pub fn stream_sheet<H>(&mut self, selector: &SheetSelector, handler: &mut H) -> Result<String, SheetMapperError>
    where
        H: SheetHandler + ?Sized,
    {
        let (sheet_name, zip_path) = self
            .sheets
            .iter()
            .find(|(name, _)| selector.accept(name))
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFound {
                pattern: selector.pattern().to_owned(),
                available: self.sheets.iter().map(|(name, _)| name.to_owned()).collect(),
            })?;
        tracing::debug!(sheet = %sheet_name, path = %zip_path, "Streaming sheet");

        let number_formats = &self.number_formats;
        let shared_strings = &self.shared_strings;
        let mut reader = self.zip.xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPart(zip_path.to_owned()))?;

        let mut open_row = None::<usize>;
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                let index = event.get_attribute_value("r")?
                    .and_then(|r| row_to_index(&r))
                    .unwrap_or(next_row);
                handler.start_row(index)?;
                open_row = Some(index);
                next_row = index + 1;
                next_col = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => {
                if let Some(index) = open_row.take() {
                    handler.end_row(index)?;
                }
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((open_row.unwrap_or(next_row), next_col));
                next_col = col + 1;
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "d" => CellType::IsoDateTime,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if kind == CellType::Number {
                    if let Some(style) = event.parse_attribute_value::<usize>("s")? {
                        kind = number_formats.get(style).copied().unwrap_or(CellType::Number);
                    }
                }
                value.clear();
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if kind != CellType::Empty && !value.is_empty() {
                    let text = match kind {
                        CellType::SharedString => {
                            let index = value.trim().parse::<usize>()?;
                            let string = shared_strings.get(index)
                                .ok_or(SpreadsheetError::SharedStringIndex(index))?;
                            Cow::Borrowed(string.as_str())
                        }
                        _ => Cow::Owned(display_text(kind, &value)),
                    };
                    if !text.is_empty() {
                        handler.cell(row, col, &text)?;
                    }
                }
                kind = CellType::Empty;
                value.clear();
            }
        });
        if let Some(index) = open_row {
            handler.end_row(index)?;
        }
        handler.end_sheet()?;
        Ok(sheet_name)
    }
}

/// Worksheet (name, path) pairs and the date system of the workbook.
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), SheetMapperError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::MissingPart("xl/workbook.xml".to_owned()))?;
    let mut sheets = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute_value(&attribute)?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute_value(&attribute)?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&*id) {
                    sheets.push((name.into_owned(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Cell type per style index, read from `xl/styles.xml`.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, SheetMapperError> {
    let Some(mut reader) = zip.xml_reader("xl/styles.xml")? else {
        return Ok(Vec::new());
    };

    let mut in_custom_formats = false;
    let mut in_format_indexes = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes = Vec::<String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => in_custom_formats = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => in_custom_formats = false,
        Event::Start(event) if in_custom_formats && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.into_owned(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => in_format_indexes = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if in_format_indexes && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.into_owned());
        }
    });

    Ok(resolve_number_formats(&format_indexes, &custom_formats, is_1904))
}

/// Shared string table, empty when the workbook has none.
fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, SheetMapperError> {
    let mut shared_strings = Vec::new();
    let Some(mut reader) = zip.xml_reader("xl/sharedStrings.xml")? else {
        return Ok(shared_strings);
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Text of a string element up to `end_tag`, skipping phonetic runs.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SheetMapperError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::SheetEvent;
    use crate::mapper::MappingError;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#;

    const STYLES: &str = r#"<styleSheet>
        <numFmts count="1"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/></numFmts>
        <cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="164"/><xf numFmtId="22"/></cellXfs>
    </styleSheet>"#;

    /// In-memory workbook with the given (sheet name, sheetData body) pairs.
    pub(crate) fn workbook(sheets: &[(&str, &str)], shared_strings: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let mut add = |name: &str, content: &str| {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        };

        let mut entries = String::new();
        let mut relationships = String::new();
        for (index, (name, _)) in sheets.iter().enumerate() {
            let id = index + 1;
            entries.push_str(&format!(r#"<sheet name="{name}" sheetId="{id}" r:id="rId{id}"/>"#));
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#
            ));
        }
        add("[Content_Types].xml", CONTENT_TYPES);
        add(
            "xl/workbook.xml",
            &format!(r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><workbookPr/><sheets>{entries}</sheets></workbook>"#),
        );
        add("xl/_rels/workbook.xml.rels", &format!("<Relationships>{relationships}</Relationships>"));
        add("xl/styles.xml", STYLES);
        if !shared_strings.is_empty() {
            let items: String = shared_strings.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();
            add("xl/sharedStrings.xml", &format!("<sst>{items}</sst>"));
        }
        for (index, (_, data)) in sheets.iter().enumerate() {
            add(
                &format!("xl/worksheets/sheet{}.xml", index + 1),
                &format!("<worksheet><sheetData>{data}</sheetData></worksheet>"),
            );
        }
        writer.finish().unwrap().into_inner()
    }

    #[derive(Default)]
    struct Collector {
        events: Vec<SheetEvent>,
    }

    impl SheetHandler for Collector {
        fn start_row(&mut self, row: usize) -> Result<(), MappingError> {
            self.events.push(SheetEvent::RowStart(row));
            Ok(())
        }

        fn cell(&mut self, row: usize, column: usize, text: &str) -> Result<(), MappingError> {
            self.events.push(SheetEvent::Cell { row, column, text: text.to_owned() });
            Ok(())
        }

        fn end_row(&mut self, row: usize) -> Result<(), MappingError> {
            self.events.push(SheetEvent::RowEnd(row));
            Ok(())
        }

        fn end_sheet(&mut self) -> Result<(), MappingError> {
            self.events.push(SheetEvent::SheetEnd);
            Ok(())
        }
    }

    fn cell(row: usize, column: usize, text: &str) -> SheetEvent {
        SheetEvent::Cell { row, column, text: text.to_owned() }
    }

    #[test]
    fn stream_typed_cells() {
        let data = r#"
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>When</t></is></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" s="1"><v>45306</v></c><c r="C2" t="b"><v>1</v></c></row>
            <row r="4"><c r="B4" s="2"><v>45306.5</v></c><c r="D4"><v>12.5</v></c><c r="E4" t="str"><v>a &amp; b</v></c></row>
        "#;
        let bytes = workbook(&[("uploads", data)], &["Name", "Ann"]);
        let mut source = XlsxSheetSource::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(source.sheet_names(), vec!["uploads"]);

        let mut collector = Collector::default();
        let name = source.stream_sheet(&SheetSelector::default(), &mut collector).unwrap();
        assert_eq!(name, "uploads");
        assert_eq!(collector.events, vec![
            SheetEvent::RowStart(0),
            cell(0, 0, "Name"),
            cell(0, 1, "When"),
            SheetEvent::RowEnd(0),
            SheetEvent::RowStart(1),
            cell(1, 0, "Ann"),
            cell(1, 1, "2024-01-15"),
            cell(1, 2, "true"),
            SheetEvent::RowEnd(1),
            SheetEvent::RowStart(3),
            cell(3, 1, "2024-01-15 12:00:00"),
            cell(3, 3, "12.5"),
            cell(3, 4, "a & b"),
            SheetEvent::RowEnd(3),
            SheetEvent::SheetEnd,
        ]);
    }

    #[test]
    fn rows_and_cells_without_references() {
        let data = "<row><c><v>1</v></c><c/><c><v>3</v></c></row><row/><row><c><v>x</v></c></row>";
        let bytes = workbook(&[("Uploads", data)], &[]);
        let mut source = XlsxSheetSource::from_reader(Cursor::new(bytes)).unwrap();
        let mut collector = Collector::default();
        source.stream_sheet(&SheetSelector::default(), &mut collector).unwrap();
        assert_eq!(collector.events, vec![
            SheetEvent::RowStart(0),
            cell(0, 0, "1"),
            cell(0, 2, "3"),
            SheetEvent::RowEnd(0),
            SheetEvent::RowStart(1),
            SheetEvent::RowEnd(1),
            SheetEvent::RowStart(2),
            cell(2, 0, "x"),
            SheetEvent::RowEnd(2),
            SheetEvent::SheetEnd,
        ]);
    }

    #[test]
    fn select_sheet_by_pattern() {
        let bytes = workbook(
            &[("Summary", r#"<row r="1"><c r="A1"><v>1</v></c></row>"#), ("Data 2024", r#"<row r="1"><c r="A1"><v>2</v></c></row>"#)],
            &[],
        );
        let mut source = XlsxSheetSource::from_reader(Cursor::new(bytes)).unwrap();
        let mut collector = Collector::default();
        let name = source.stream_sheet(&SheetSelector::new("data*").unwrap(), &mut collector).unwrap();
        assert_eq!(name, "Data 2024");
        assert_eq!(collector.events[1], cell(0, 0, "2"));

        let result = source.stream_sheet(&SheetSelector::default(), &mut Collector::default());
        assert!(matches!(
            result,
            Err(SheetMapperError::SpreadsheetError(SpreadsheetError::SheetNotFound { .. }))
        ));
    }

    #[test]
    fn invalid_shared_string_index() {
        let data = r#"<row r="1"><c r="A1" t="s"><v>7</v></c></row>"#;
        let bytes = workbook(&[("uploads", data)], &["only"]);
        let mut source = XlsxSheetSource::from_reader(Cursor::new(bytes)).unwrap();
        let result = source.stream_sheet(&SheetSelector::default(), &mut Collector::default());
        assert!(matches!(
            result,
            Err(SheetMapperError::SpreadsheetError(SpreadsheetError::SharedStringIndex(7)))
        ));
    }

    #[test]
    fn reject_non_zip_input() {
        let result = XlsxSheetSource::from_reader(Cursor::new(b"not a workbook".to_vec()));
        assert!(matches!(result, Err(SheetMapperError::ZipError(_))));
    }
}
