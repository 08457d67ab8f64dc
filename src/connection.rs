//! Two-step access to the `p4` tool: [`Connection::authenticate`] runs the
//! login handshake and yields a [`Session`]; [`Connection::invoke`] runs a
//! command within it. [`Connection::run`] does both for a single call under
//! one deadline and drops the session before returning.

use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::dispatch::Invocation;
use crate::dispatch::cli::CliDispatch;
use crate::error::P4Error;
use crate::parsers::OutputParser;
use crate::parsers::ticket::TicketParser;
use crate::parsers::ztag::{Record, ZtagParser};

/// Variables passed through from our own environment. Everything else the
/// child sees is built from [`Config`].
const PASSTHROUGH_ENV: &[&str] = &["HOME", "PATH"];

/// Short-lived login state. The ticket is zeroized on drop.
pub struct Session {
    ticket: Option<SecretString>,
}

impl Session {
    /// A session that relies on whatever login state `p4` already has
    /// (ticket file, security level 0 server).
    pub fn anonymous() -> Self {
        Self { ticket: None }
    }

    pub fn has_ticket(&self) -> bool {
        self.ticket.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ticket", &self.ticket.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

pub struct Connection {
    config: Config,
    dispatch: CliDispatch,
    cancellation_token: Option<CancellationToken>,
}

impl Connection {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            dispatch: CliDispatch::new(),
            cancellation_token: None,
        }
    }

    /// Kill any in-flight subprocess of this connection when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    fn base_env(&self) -> Vec<(String, Zeroizing<String>)> {
        let mut env: Vec<(String, Zeroizing<String>)> = PASSTHROUGH_ENV
            .iter()
            .filter_map(|key| {
                std::env::var(key)
                    .ok()
                    .map(|v| (key.to_string(), Zeroizing::new(v)))
            })
            .collect();

        let settings = [
            ("P4PORT", &self.config.port),
            ("P4USER", &self.config.user),
            ("P4CLIENT", &self.config.client),
            ("P4CHARSET", &self.config.charset),
        ];
        for (key, value) in settings {
            let Some(value) = value else { continue };
            env.push((key.to_string(), Zeroizing::new(value.clone())));
        }
        env
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.timeout
    }

    fn invocation(
        &self,
        args: &[&str],
        env: Vec<(String, Zeroizing<String>)>,
        deadline: Instant,
    ) -> Invocation {
        Invocation {
            executable: self.config.executable.clone(),
            global_args: self.config.global_args.clone(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env,
            stdin: None,
            deadline,
            cancellation_token: self.cancellation_token.clone(),
            max_output_bytes: self.config.max_output_bytes,
        }
    }

    /// Run `p4 login -p` with the configured password on stdin and capture
    /// the printed ticket. Without a password no login step runs.
    pub async fn authenticate(&self) -> Result<Session, P4Error> {
        self.login(self.deadline()).await
    }

    async fn login(&self, deadline: Instant) -> Result<Session, P4Error> {
        let Some(password) = &self.config.password else {
            tracing::debug!("no password configured, using existing login state");
            return Ok(Session::anonymous());
        };

        let mut req = self.invocation(&["login", "-p"], self.base_env(), deadline);
        req.stdin = Some(SecretString::from(password.expose_secret().to_owned()));

        let stdout = Zeroizing::new(self.dispatch.run(req).await?);
        let ticket = TicketParser.parse(&stdout)?;

        if ticket.is_none() {
            tracing::info!("login printed no ticket, continuing without P4PASSWD");
        }

        Ok(Session { ticket })
    }

    /// Run `args` within `session` and return stdout. Each call gets the
    /// full configured timeout.
    pub async fn invoke(&self, session: &Session, args: &[&str]) -> Result<Vec<u8>, P4Error> {
        self.invoke_until(session, args, self.deadline()).await
    }

    async fn invoke_until(
        &self,
        session: &Session,
        args: &[&str],
        deadline: Instant,
    ) -> Result<Vec<u8>, P4Error> {
        let mut env = self.base_env();
        if let Some(ticket) = &session.ticket {
            env.push((
                "P4PASSWD".to_string(),
                Zeroizing::new(ticket.expose_secret().to_owned()),
            ));
        }

        self.dispatch
            .run(self.invocation(args, env, deadline))
            .await
    }

    /// Log in, run `args`, and discard the session. The configured timeout
    /// bounds both steps together.
    pub async fn run(&self, args: &[&str]) -> Result<Vec<u8>, P4Error> {
        let deadline = self.deadline();
        let session = self.login(deadline).await?;
        self.invoke_until(&session, args, deadline).await
    }

    /// Run `args` in tagged mode (`p4 -ztag ...`) and parse the records.
    pub async fn run_tagged(&self, args: &[&str]) -> Result<Vec<Record>, P4Error> {
        let mut tagged = Vec::with_capacity(args.len() + 1);
        tagged.push("-ztag");
        tagged.extend_from_slice(args);

        let stdout = self.run(&tagged).await?;
        ZtagParser.parse(&stdout)
    }
}
