//! Scraper for the human-readable `p4 changes` listing.
//!
//! This matches the plain-text layout printed without `-ztag`, which is not a
//! stable interface and has shifted between tool releases. Prefer the tagged
//! listing (`Connection::changes`) where possible.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::P4Error;
use crate::parsers::OutputParser;

static CHANGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Change (\d+) on (\S+)(?: (\d{2}:\d{2}:\d{2}))? by ([^@\s]+)@(\S+)(?: \*(\w+)\*)? '(.*)'$",
    )
    .expect("Invalid change line regex")
});

/// One line of `p4 changes` output. `description` is the truncated first line
/// the tool prints, not the full changelist description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub number: u64,
    pub date: String,
    pub time: Option<String>,
    pub user: String,
    pub client: String,
    /// `pending` or `shelved`; submitted changes carry no marker.
    pub status: Option<String>,
    pub description: String,
}

pub struct ChangesParser;

impl OutputParser for ChangesParser {
    type Output = Vec<ChangeSummary>;

    fn parse(&self, stdout: &[u8]) -> Result<Vec<ChangeSummary>, P4Error> {
        let text = String::from_utf8_lossy(stdout);
        let mut changes = Vec::new();

        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let Some(caps) = CHANGE_LINE.captures(line) else {
                return Err(P4Error::Unrecognized {
                    line: line.to_string(),
                });
            };

            let number = caps[1].parse().map_err(|_| P4Error::InvalidField {
                field: "change".to_string(),
                value: caps[1].to_string(),
            })?;

            changes.push(ChangeSummary {
                number,
                date: caps[2].to_string(),
                time: caps.get(3).map(|m| m.as_str().to_string()),
                user: caps[4].to_string(),
                client: caps[5].to_string(),
                status: caps.get(6).map(|m| m.as_str().to_string()),
                description: caps[7].to_string(),
            });
        }

        Ok(changes)
    }
}
