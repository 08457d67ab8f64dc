use serde::Serialize;

use crate::commands::{field, number_field};
use crate::connection::Connection;
use crate::error::P4Error;
use crate::parsers::OutputParser;
use crate::parsers::changes::{ChangeSummary, ChangesParser};
use crate::parsers::ztag::Record;

/// Filters for `p4 changes`.
#[derive(Debug, Clone, Default)]
pub struct ChangesQuery {
    /// `-m`: newest N changes only.
    pub max: Option<u32>,
    /// `-s`: `pending`, `shelved` or `submitted`.
    pub status: Option<String>,
    /// `-l`: full descriptions instead of the first 31 characters.
    pub long_description: bool,
    /// Depot or client path filter, e.g. `//depot/main/...`.
    pub path: Option<String>,
}

impl ChangesQuery {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["changes".to_string()];
        if self.long_description {
            args.push("-l".to_string());
        }
        if let Some(max) = self.max {
            args.push("-m".to_string());
            args.push(max.to_string());
        }
        if let Some(status) = &self.status {
            args.push("-s".to_string());
            args.push(status.clone());
        }
        if let Some(path) = &self.path {
            args.push(path.clone());
        }
        args
    }
}

/// One changelist from the tagged `changes` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Changelist {
    pub change: u64,
    /// Seconds since the epoch, as printed by the tool.
    pub time: String,
    pub user: String,
    pub client: String,
    pub status: String,
    /// May span several lines with `-l`.
    pub description: String,
}

impl TryFrom<&Record> for Changelist {
    type Error = P4Error;

    fn try_from(record: &Record) -> Result<Self, P4Error> {
        Ok(Changelist {
            change: number_field(record, "change")?,
            time: field(record, "time"),
            user: field(record, "user"),
            client: field(record, "client"),
            status: field(record, "status"),
            description: field(record, "desc"),
        })
    }
}

impl Connection {
    /// Changelists matching `query`, newest first (the tool's order).
    pub async fn changes(&self, query: &ChangesQuery) -> Result<Vec<Changelist>, P4Error> {
        let args = query.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let records = self.run_tagged(&args).await?;
        records.iter().map(Changelist::try_from).collect()
    }

    /// The plain-text `changes -m <max>` listing, scraped line by line.
    pub async fn change_summaries(&self, max: u32) -> Result<Vec<ChangeSummary>, P4Error> {
        let max = max.to_string();
        let stdout = self.run(&["changes", "-m", &max]).await?;
        ChangesParser.parse(&stdout)
    }
}
