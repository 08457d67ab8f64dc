//! Typed views over tagged listings. Each adapter maps the records of one
//! `p4 -ztag` command onto a plain struct; field names follow the tool's
//! tagged output.

pub mod changes;
pub mod counters;
pub mod review;
pub mod users;

use crate::error::P4Error;
use crate::parsers::ztag::Record;

/// Field value, or an empty string when the tool omitted it.
pub(crate) fn field(record: &Record, name: &str) -> String {
    record.get(name).cloned().unwrap_or_default()
}

pub(crate) fn required_field<'a>(record: &'a Record, name: &str) -> Result<&'a str, P4Error> {
    record
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| P4Error::MissingField {
            field: name.to_string(),
        })
}

pub(crate) fn number_field(record: &Record, name: &str) -> Result<u64, P4Error> {
    let value = required_field(record, name)?;
    value.trim().parse().map_err(|_| P4Error::InvalidField {
        field: name.to_string(),
        value: value.to_string(),
    })
}
