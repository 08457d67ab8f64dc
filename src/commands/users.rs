use serde::Serialize;

use crate::commands::{field, required_field};
use crate::connection::Connection;
use crate::error::P4Error;
use crate::parsers::ztag::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub user: String,
    pub email: String,
    pub full_name: String,
    /// Last access, seconds since the epoch as printed by the tool.
    pub access: String,
    pub update: String,
}

impl TryFrom<&Record> for User {
    type Error = P4Error;

    fn try_from(record: &Record) -> Result<Self, P4Error> {
        Ok(User {
            user: required_field(record, "User")?.to_string(),
            email: field(record, "Email"),
            full_name: field(record, "FullName"),
            access: field(record, "Access"),
            update: field(record, "Update"),
        })
    }
}

impl Connection {
    pub async fn users(&self) -> Result<Vec<User>, P4Error> {
        let records = self.run_tagged(&["users"]).await?;
        records.iter().map(User::try_from).collect()
    }
}
