use std::collections::HashMap;

use crate::commands::{field, required_field};
use crate::connection::Connection;
use crate::error::P4Error;
use crate::parsers::ztag::Record;

/// Fold `counters` records (`counter`, `value`) into a name → value map.
///
/// A record without `counter` is an error; a missing `value` reads as "".
pub fn counters_from_records(records: &[Record]) -> Result<HashMap<String, String>, P4Error> {
    records
        .iter()
        .map(|r| Ok((required_field(r, "counter")?.to_string(), field(r, "value"))))
        .collect()
}

impl Connection {
    /// All server counters.
    pub async fn counters(&self) -> Result<HashMap<String, String>, P4Error> {
        let records = self.run_tagged(&["counters"]).await?;
        counters_from_records(&records)
    }
}
