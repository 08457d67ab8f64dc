pub mod cli;

use std::time::Instant;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// One subprocess to run.
pub struct Invocation {
    pub executable: String,
    /// Configured options placed before `args`. Left out of error reports.
    pub global_args: Vec<String>,
    pub args: Vec<String>,
    /// Complete child environment; nothing is inherited from the parent.
    pub env: Vec<(String, Zeroizing<String>)>,
    /// Written to the child's stdin, then the pipe is closed.
    pub stdin: Option<SecretString>,
    pub deadline: Instant,
    /// Cancelling kills the child's process group.
    pub cancellation_token: Option<CancellationToken>,
    /// Cap on bytes read from each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl Invocation {
    /// Executable followed by the call's own arguments, as reported in errors.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.executable.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| {
                if k == "P4PASSWD" {
                    format!("{k}=[REDACTED]")
                } else {
                    format!("{k}={}", v.as_str())
                }
            })
            .collect();
        f.debug_struct("Invocation")
            .field("executable", &self.executable)
            .field("global_args", &self.global_args)
            .field("args", &self.args)
            .field("env", &env)
            .field("stdin", &self.stdin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
