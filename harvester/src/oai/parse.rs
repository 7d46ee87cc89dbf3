use crate::model::HarvestRecord;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::escape::{unescape, EscapeError};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Attribute(#[from] AttrError),

    #[error(transparent)]
    Escape(#[from] EscapeError),

    #[error("document has no root element")]
    NoRoot,
}

/// An OAI-PMH `<error code="...">` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: String,
    pub message: String,
}

impl ProtocolError {
    /// `noRecordsMatch` is how a source says the interval is empty.
    pub fn is_no_records_match(&self) -> bool {
        self.code == "noRecordsMatch"
    }
}

/// Contents of one `ListRecords` response page.
#[derive(Debug, Clone, Default)]
pub struct ListRecordsPage {
    pub records: Vec<HarvestRecord>,
    pub resumption_token: Option<String>,
    pub complete_list_size: Option<u64>,
    pub error: Option<ProtocolError>,
}

#[derive(Default)]
struct RecordBuilder {
    id: Option<String>,
    date_stamp: Option<String>,
    metadata: Option<String>,
    deleted: bool,
}

pub fn parse_list_records(xml: &str) -> Result<ListRecordsPage, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut page = ListRecordsPage::default();
    let mut current: Option<RecordBuilder> = None;
    let mut in_header = false;
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                saw_root = true;
                match e.local_name().as_ref() {
                    b"record" => current = Some(RecordBuilder::default()),
                    b"header" => {
                        in_header = true;
                        if let Some(record) = current.as_mut() {
                            record.deleted = is_deleted(&e)?;
                        }
                    }
                    b"identifier" if in_header => {
                        let text = element_text(&mut reader, &e)?;
                        if let Some(record) = current.as_mut() {
                            record.id = Some(text);
                        }
                    }
                    b"datestamp" if in_header => {
                        let text = element_text(&mut reader, &e)?;
                        if let Some(record) = current.as_mut() {
                            record.date_stamp = Some(text);
                        }
                    }
                    b"metadata" => {
                        let end = e.to_end().into_owned();
                        let inner = reader.read_text(end.name())?;
                        if let Some(record) = current.as_mut() {
                            record.metadata = Some(inner.trim().to_string());
                        }
                    }
                    b"resumptionToken" => {
                        page.complete_list_size = complete_list_size(&e)?;
                        let token = element_text(&mut reader, &e)?;
                        if !token.is_empty() {
                            page.resumption_token = Some(token);
                        }
                    }
                    b"error" => {
                        let code = attribute(&e, b"code")?.unwrap_or_default();
                        let message = element_text(&mut reader, &e)?;
                        page.error = Some(ProtocolError { code, message });
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                match e.local_name().as_ref() {
                    b"resumptionToken" => page.complete_list_size = complete_list_size(&e)?,
                    b"metadata" => {
                        if let Some(record) = current.as_mut() {
                            record.metadata = Some(String::new());
                        }
                    }
                    b"error" => {
                        let code = attribute(&e, b"code")?.unwrap_or_default();
                        page.error = Some(ProtocolError {
                            code,
                            message: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"header" => in_header = false,
                b"record" => {
                    if let Some(record) = current.take().and_then(RecordBuilder::build) {
                        page.records.push(record);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::NoRoot);
    }
    Ok(page)
}

impl RecordBuilder {
    fn build(self) -> Option<HarvestRecord> {
        let Some(id) = self.id.filter(|id| !id.is_empty()) else {
            tracing::warn!("Skipping OAI record without identifier");
            return None;
        };
        Some(HarvestRecord {
            id,
            metadata_xml: self.metadata.unwrap_or_default(),
            date_stamp: self.date_stamp.unwrap_or_default(),
            deleted: self.deleted,
        })
    }
}

fn element_text(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<String, ParseError> {
    let end = start.to_end().into_owned();
    let raw = reader.read_text(end.name())?;
    Ok(unescape(raw.trim())?.into_owned())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn is_deleted(header: &BytesStart<'_>) -> Result<bool, ParseError> {
    Ok(attribute(header, b"status")?.is_some_and(|s| s.eq_ignore_ascii_case("deleted")))
}

fn complete_list_size(token: &BytesStart<'_>) -> Result<Option<u64>, ParseError> {
    Ok(attribute(token, b"completeListSize")?.and_then(|s| s.trim().parse().ok()))
}
