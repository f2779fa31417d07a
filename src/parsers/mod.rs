pub mod clover;

use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

use crate::error::{CovwatchError, Result};
use crate::model::FileFragment;

/// Every report format reader implements this trait.
pub trait Parser {
    /// Split the report into one raw fragment per source file.
    fn parse(&self, input: &[u8]) -> Result<Vec<FileFragment>>;
}

fn xml_reader(input: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    reader
}

fn xml_err(source: quick_xml::Error, reader: &Reader<&[u8]>) -> CovwatchError {
    CovwatchError::Xml {
        source,
        position: reader.buffer_position(),
    }
}

/// Unescaped value of an attribute, if present and well-formed.
fn get_attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}
