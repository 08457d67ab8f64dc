use thiserror::Error;

/// Failure while turning `-ztag` output into records.
#[derive(Debug, Error)]
pub enum ZtagError {
    /// A non-blank line that is neither a tagged line nor a continuation of
    /// an already-started field. `line` is 1-based.
    #[error("ztag: parse error at line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("ztag: read error: {0}")]
    Read(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum P4Error {
    #[error(transparent)]
    Tagged(#[from] ZtagError),

    /// The tool ran but exited unsuccessfully. `output` is the failing step's
    /// own output (login stderr, or the command's stdout followed by stderr).
    /// `command` is the executable and the call's own arguments; configured
    /// global options are left out.
    #[error("{}", describe_invocation(.command, .status, .output))]
    Invocation {
        command: Vec<String>,
        status: Option<i32>,
        output: String,
    },

    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("record is missing field {field}")]
    MissingField { field: String },

    #[error("field {field} has invalid value {value:?}")]
    InvalidField { field: String, value: String },

    #[error("unrecognized output line: {line:?}")]
    Unrecognized { line: String },

    #[error("config error: {0}")]
    Config(String),
}

fn describe_invocation(command: &[String], status: &Option<i32>, output: &str) -> String {
    let status = match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    format!("{status} ({}): {}", command.join(" "), output.trim_end())
}

impl P4Error {
    /// Returns true for transient errors that may succeed on retry.
    /// Malformed tagged output is never retryable: it signals a tool version
    /// mismatch or unexpected content, not a transient condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Produce a short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Tagged(ZtagError::Malformed { line, .. }) => {
                format!("unexpected p4 output at line {line}")
            }
            Self::Tagged(ZtagError::Read(e)) => format!("failed to read p4 output: {e}"),
            Self::Invocation {
                command, output, ..
            } => {
                let name = command.get(1..).unwrap_or_default().join(" ");
                let output = output.trim();
                if output.is_empty() {
                    format!("p4 {name} failed")
                } else {
                    // p4 prints the actual complaint last.
                    let preview: String = output
                        .chars()
                        .rev()
                        .take(200)
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev()
                        .collect();
                    let prefix = if preview.len() < output.len() {
                        "..."
                    } else {
                        ""
                    };
                    format!("p4 {name} failed: {prefix}{preview}")
                }
            }
            Self::Spawn { executable, .. } => format!("could not run {executable}"),
            Self::Timeout(ms) => format!("p4 timed out after {ms}ms"),
            Self::Cancelled(ms) => format!("cancelled after {ms}ms"),
            other => other.to_string(),
        }
    }
}
