//! End-to-end tests against a fake `p4` implemented as a shell script:
//! login handshake, ticket propagation, failure output, timeouts and caps.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use p4tag::commands::changes::ChangesQuery;
use p4tag::config::Config;
use p4tag::connection::Connection;
use p4tag::error::{P4Error, ZtagError};

const TICKET: &str = "0123456789ABCDEF0123456789ABCDEF";

/// Stand-in for the real tool. Apart from `sleep`, found through the
/// passed-through `PATH`, it uses only shell builtins.
const FAKE_P4: &str = r#"
TICKET=0123456789ABCDEF0123456789ABCDEF

if [ "$1" = "login" ]; then
    IFS= read -r pw || true
    echo "Enter password:"
    if [ "$pw" = "slow" ]; then
        sleep 1
        echo "$TICKET"
        exit 0
    fi
    if [ "$pw" = "secret" ]; then
        echo "$TICKET"
        exit 0
    fi
    echo "Password invalid." >&2
    exit 1
fi

if [ -n "${P4PASSWD+x}" ] && [ "$P4PASSWD" != "$TICKET" ]; then
    echo "Perforce password (P4PASSWD) invalid or unset." >&2
    exit 1
fi

case "$*" in
    "-ztag counters")
        printf '... counter change\n... value 42\n\n... counter review\n... value 7\n\n'
        ;;
    "-ztag review -t review")
        printf '... change 40\n... user alice\n... email alice@example.com\n... name Alice Anders\n\n'
        printf '... change 41\n... user bob\n... email bob@example.com\n... name Bob Brown\n\n'
        ;;
    "-ztag changes -l -m 2")
        printf '... change 12\n... time 1700000000\n... user alice\n... client alice-ws\n'
        printf '... status submitted\n... changeType public\n... path //depot/main/...\n'
        printf '... desc Fix the build\nAlso bump the version.\n\n'
        printf '... change 11\n... time 1699990000\n... user bob\n... client build-01\n'
        printf '... status submitted\n... desc Initial import\n\n'
        ;;
    "changes -m 2")
        printf "Change 12 on 2023/11/14 by alice@alice-ws 'Fix the build '\n"
        printf "Change 11 on 2023/11/14 by bob@build-01 'Initial import '\n"
        ;;
    "-ztag users")
        printf '... User alice\n... Email alice@example.com\n... Update 1700000000\n'
        printf '... Access 1700000100\n... FullName Alice Anders\n... Type standard\n\n'
        ;;
    "-ztag info")
        printf '... userName %s\n... clientName %s\n... serverAddress %s\n... ticket %s\n' \
            "$P4USER" "$P4CLIENT" "$P4PORT" "${P4PASSWD:-none}"
        ;;
    "-ztag broken")
        printf 'garbage\n'
        ;;
    "-ztag fail")
        echo "partial output"
        echo "Path not in client view." >&2
        exit 1
        ;;
    "-ztag nap")
        sleep 1
        printf '... counter nap\n... value 1\n'
        ;;
    "-ztag spin")
        while :; do :; done
        ;;
    "-ztag flood")
        while :; do echo "... line xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"; done
        ;;
    *)
        echo "Unknown command.  Try 'p4 help' for info." >&2
        exit 1
        ;;
esac
"#;

fn fake_p4(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("p4.sh");
    std::fs::write(&path, FAKE_P4).unwrap();
    path
}

fn config(dir: &TempDir, password: Option<&str>) -> Config {
    Config {
        port: Some("ssl:p4.example.com:1666".to_string()),
        user: Some("alice".to_string()),
        client: Some("alice-ws".to_string()),
        password: password.map(|p| SecretString::from(p.to_string())),
        executable: "/bin/sh".to_string(),
        global_args: vec![fake_p4(dir).display().to_string()],
        timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

fn connect(password: Option<&str>) -> (TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::new(config(&dir, password));
    (dir, conn)
}

// ---------------------------------------------------------------------------
// Login handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_and_settings_reach_the_command() {
    let (_dir, conn) = connect(Some("secret"));
    let records = conn.run_tagged(&["info"]).await.unwrap();
    assert_eq!(records.len(), 1);
    let info = &records[0];
    assert_eq!(info["userName"], "alice");
    assert_eq!(info["clientName"], "alice-ws");
    assert_eq!(info["serverAddress"], "ssl:p4.example.com:1666");
    assert_eq!(info["ticket"], TICKET);
}

#[tokio::test]
async fn without_password_no_login_runs() {
    let (_dir, conn) = connect(None);
    let session = conn.authenticate().await.unwrap();
    assert!(!session.has_ticket());

    let records = conn.run_tagged(&["info"]).await.unwrap();
    assert_eq!(records[0]["ticket"], "none");
}

#[tokio::test]
async fn one_session_serves_several_commands() {
    let (_dir, conn) = connect(Some("secret"));
    let session = conn.authenticate().await.unwrap();
    assert!(session.has_ticket());
    assert!(!format!("{session:?}").contains(TICKET));

    let first = conn.invoke(&session, &["-ztag", "counters"]).await.unwrap();
    let second = conn.invoke(&session, &["-ztag", "users"]).await.unwrap();
    assert!(String::from_utf8_lossy(&first).contains("... counter change"));
    assert!(String::from_utf8_lossy(&second).contains("... User alice"));
}

#[tokio::test]
async fn login_failure_reports_login_output() {
    let (_dir, conn) = connect(Some("wrong"));
    let err = conn.counters().await.unwrap_err();
    match err {
        P4Error::Invocation {
            command,
            status,
            output,
        } => {
            assert_eq!(command, ["/bin/sh", "login", "-p"]);
            assert_eq!(status, Some(1));
            assert!(output.contains("Password invalid."), "got: {output}");
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn failure_message_names_the_call_not_global_args() {
    let (_dir, conn) = connect(Some("wrong"));
    let err = conn.run(&["info"]).await.unwrap_err();
    let message = err.user_message();
    assert!(message.starts_with("p4 login -p failed"), "got: {message}");
    assert!(message.ends_with("Password invalid."), "got: {message}");
    assert!(!message.contains("p4.sh"), "got: {message}");
}

// ---------------------------------------------------------------------------
// Domain adapters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counters_map() {
    let (_dir, conn) = connect(Some("secret"));
    let counters = conn.counters().await.unwrap();
    assert_eq!(counters.len(), 2);
    assert_eq!(counters["change"], "42");
    assert_eq!(counters["review"], "7");
}

#[tokio::test]
async fn reviews_by_counter() {
    let (_dir, conn) = connect(Some("secret"));
    let reviews = conn.reviews_by_counter("review").await.unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].change, 40);
    assert_eq!(reviews[0].user, "alice");
    assert_eq!(reviews[0].email, "alice@example.com");
    assert_eq!(reviews[0].name, "Alice Anders");
    assert_eq!(reviews[1].change, 41);
}

#[tokio::test]
async fn tagged_changes_keep_multiline_descriptions() {
    let (_dir, conn) = connect(Some("secret"));
    let query = ChangesQuery {
        max: Some(2),
        long_description: true,
        ..Default::default()
    };
    let changes = conn.changes(&query).await.unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change, 12);
    assert_eq!(changes[0].description, "Fix the build\nAlso bump the version.");
    assert_eq!(changes[1].client, "build-01");
}

#[tokio::test]
async fn plain_change_summaries() {
    let (_dir, conn) = connect(Some("secret"));
    let changes = conn.change_summaries(2).await.unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].number, 11);
    assert_eq!(changes[1].user, "bob");
}

#[tokio::test]
async fn users() {
    let (_dir, conn) = connect(Some("secret"));
    let users = conn.users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user, "alice");
    assert_eq!(users[0].full_name, "Alice Anders");
    assert_eq!(users[0].access, "1700000100");
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn command_failure_reports_its_own_output() {
    let (_dir, conn) = connect(Some("secret"));
    let err = conn.run_tagged(&["fail"]).await.unwrap_err();
    match err {
        P4Error::Invocation {
            command, output, ..
        } => {
            assert_eq!(command.last().map(String::as_str), Some("fail"));
            assert!(output.contains("partial output"));
            assert!(output.contains("Path not in client view."));
            assert!(!output.contains("Enter password"));
        }
        other => panic!("expected Invocation, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_output_is_a_parse_error() {
    let (_dir, conn) = connect(Some("secret"));
    let err = conn.run_tagged(&["broken"]).await.unwrap_err();
    assert!(matches!(
        err,
        P4Error::Tagged(ZtagError::Malformed { line: 1, .. })
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        executable: dir.path().join("no-such-p4").display().to_string(),
        ..Default::default()
    };
    let err = Connection::new(config).run(&["info"]).await.unwrap_err();
    assert!(matches!(err, P4Error::Spawn { .. }));
}

#[tokio::test]
async fn hung_command_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        timeout: Duration::from_secs(1),
        ..config(&dir, None)
    };
    let conn = Connection::new(config);

    let start = Instant::now();
    let err = conn.run_tagged(&["spin"]).await.unwrap_err();
    assert!(matches!(err, P4Error::Timeout(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn login_and_command_share_one_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        timeout: Duration::from_millis(1500),
        ..config(&dir, Some("slow"))
    };
    let conn = Connection::new(config);

    let start = Instant::now();
    let err = conn.run_tagged(&["nap"]).await.unwrap_err();
    assert!(matches!(err, P4Error::Timeout(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn separate_steps_each_get_the_full_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        timeout: Duration::from_millis(1500),
        ..config(&dir, Some("slow"))
    };
    let conn = Connection::new(config);

    let session = conn.authenticate().await.unwrap();
    let stdout = conn.invoke(&session, &["-ztag", "nap"]).await.unwrap();
    assert!(String::from_utf8_lossy(&stdout).contains("... counter nap"));
}

#[tokio::test]
async fn runaway_output_hits_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        max_output_bytes: 4096,
        ..config(&dir, None)
    };
    let conn = Connection::new(config);

    let start = Instant::now();
    let err = conn.run_tagged(&["flood"]).await.unwrap_err();
    assert!(
        matches!(err, P4Error::OutputTooLarge { limit: 4096 }),
        "got {err:?}"
    );
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_kills_the_command() {
    let (_dir, conn) = connect(None);
    let token = CancellationToken::new();
    let conn = conn.with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let start = Instant::now();
    let err = conn.run_tagged(&["spin"]).await.unwrap_err();
    canceller.await.unwrap();
    assert!(matches!(err, P4Error::Cancelled(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(5));
}
