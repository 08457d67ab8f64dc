use std::sync::LazyLock;

use regex::Regex;
use secrecy::SecretString;

use crate::error::P4Error;
use crate::parsers::OutputParser;

static TICKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Z]{32}").expect("Invalid ticket regex"));

/// Extracts the ticket printed by `p4 login -p`.
///
/// The command prints a password prompt before the ticket, so the first
/// 32-character run of uppercase hex-like characters is taken. `None` means
/// the server issued no ticket (e.g. security level 0) and the session relies
/// on whatever state the tool already has.
pub struct TicketParser;

impl OutputParser for TicketParser {
    type Output = Option<SecretString>;

    fn parse(&self, stdout: &[u8]) -> Result<Option<SecretString>, P4Error> {
        let text = String::from_utf8_lossy(stdout);
        Ok(TICKET
            .find(&text)
            .map(|m| SecretString::from(m.as_str().to_owned())))
    }
}
