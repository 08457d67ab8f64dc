use serde::Serialize;

use crate::commands::{field, number_field};
use crate::connection::Connection;
use crate::error::P4Error;
use crate::parsers::ztag::Record;

/// A change awaiting review notification, from `p4 review -t <counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub change: u64,
    pub user: String,
    pub email: String,
    pub name: String,
}

impl TryFrom<&Record> for Review {
    type Error = P4Error;

    fn try_from(record: &Record) -> Result<Self, P4Error> {
        Ok(Review {
            change: number_field(record, "change")?,
            user: field(record, "user"),
            email: field(record, "email"),
            name: field(record, "name"),
        })
    }
}

impl Connection {
    /// Changes submitted since `counter` was last advanced.
    pub async fn reviews_by_counter(&self, counter: &str) -> Result<Vec<Review>, P4Error> {
        let records = self.run_tagged(&["review", "-t", counter]).await?;
        records.iter().map(Review::try_from).collect()
    }
}
