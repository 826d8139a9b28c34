use std::cell::RefCell;
use std::rc::Rc;

use ploy::config::{Config, Pipeline, Server};
use ploy::error::{Error, Result};
use ploy::remote::RemoteExecutor;
use ploy::ssh::{PrivateKey, SshConnection, SshConnector, SshSession, SshTarget};
use ploy::utils::process::CommandOutput;

fn fixture(name: &str) -> String {
    format!("{}/tests/testdata/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[derive(Clone, Default)]
struct Events(Rc<RefCell<Vec<String>>>);

impl Events {
    fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    fn all(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// Echoes every command back as its output. Commands containing `exit 1`
/// fail with output `boom`, commands containing `drop-link` lose the
/// transport, and sessions that ran a `sticky` command fail to close.
#[derive(Default)]
struct FakeConnector {
    events: Events,
    refuse: Option<&'static str>,
    fail_close: bool,
}

struct FakeConnection {
    events: Events,
    target: SshTarget,
    fail_close: bool,
}

struct FakeSession {
    events: Events,
    target: SshTarget,
    sticky: bool,
}

impl SshConnector for FakeConnector {
    type Connection = FakeConnection;

    fn connect(&self, target: &SshTarget, key: &PrivateKey) -> Result<FakeConnection> {
        if self.refuse == Some(target.server_id.as_str()) {
            return Err(Error::ssh_connect_failed(target.details(), "connection refused"));
        }
        self.events.push(format!(
            "connect {} {}@{}:{} {}",
            target.server_id,
            target.user,
            target.host,
            target.port,
            key.algorithm
        ));
        Ok(FakeConnection {
            events: self.events.clone(),
            target: target.clone(),
            fail_close: self.fail_close,
        })
    }
}

impl SshConnection for FakeConnection {
    type Session = FakeSession;

    fn new_session(&mut self) -> Result<FakeSession> {
        self.events.push("session");
        Ok(FakeSession {
            events: self.events.clone(),
            target: self.target.clone(),
            sticky: false,
        })
    }

    fn close(self) -> Result<()> {
        self.events.push(format!("close {}", self.target.server_id));
        if self.fail_close {
            return Err(Error::ssh_close_failed(self.target.details(), "broken pipe"));
        }
        Ok(())
    }
}

impl SshSession for FakeSession {
    fn combined_output(&mut self, command: &str) -> Result<CommandOutput> {
        self.events
            .push(format!("run {}: {}", self.target.server_id, command));
        self.sticky = command.contains("sticky");
        if command.contains("drop-link") {
            return Err(Error::ssh_session_failed(
                self.target.details(),
                Some(command.to_string()),
                "connection reset by peer",
            ));
        }
        if command.contains("exit 1") {
            return Ok(CommandOutput::new("boom\n", 1));
        }
        Ok(CommandOutput::new(format!("{}\n", command), 0))
    }

    fn close(self) -> Result<()> {
        self.events.push("session closed");
        if self.sticky {
            return Err(Error::ssh_session_close_failed(
                self.target.details(),
                "channel already closed",
            ));
        }
        Ok(())
    }
}

fn server(host: &str, key: &str) -> Server {
    Server {
        host: host.to_string(),
        port: 22,
        user: "ploy".to_string(),
        private_key: key.to_string(),
    }
}

fn config(servers: &[&str], tasks: &[&str]) -> Config {
    let mut config = Config::default();
    config
        .params
        .insert("message".to_string(), "hello".to_string());
    config
        .servers
        .insert("s1".to_string(), server("10.0.0.1", &fixture("id_ed25519")));
    config
        .servers
        .insert("s2".to_string(), server("10.0.0.2", &fixture("id_rsa_pem")));
    config
        .tasks
        .insert("greet".to_string(), vec!["echo '{{message}}'".to_string()]);
    config.tasks.insert(
        "deploy".to_string(),
        vec!["git pull".to_string(), "make install".to_string()],
    );
    config
        .tasks
        .insert("broken".to_string(), vec!["false; exit 1".to_string()]);
    config
        .tasks
        .insert("flaky".to_string(), vec!["drop-link".to_string()]);
    config
        .tasks
        .insert("sticky".to_string(), vec!["echo sticky".to_string()]);
    config
        .tasks
        .insert("sticky-flaky".to_string(), vec!["drop-link sticky".to_string()]);
    config.pipelines.insert(
        "test".to_string(),
        Pipeline {
            servers: servers.iter().map(|s| s.to_string()).collect(),
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
        },
    );
    config
}

fn run(config: &Config, connector: FakeConnector) -> (Result<String>, Vec<String>) {
    let events = connector.events.clone();
    let result = RemoteExecutor::with_connector(config, connector).execute("test");
    (result, events.all())
}

#[test]
fn single_server_round_trip() {
    let config = config(&["s1"], &["greet"]);
    let (result, events) = run(&config, FakeConnector::default());

    assert_eq!(
        result.unwrap(),
        "Running pipeline test on server s1\necho 'hello'\n"
    );
    assert_eq!(
        events,
        vec![
            "connect s1 ploy@10.0.0.1:22 ssh-ed25519",
            "session",
            "run s1: echo 'hello'",
            "session closed",
            "close s1",
        ]
    );
}

#[test]
fn servers_run_in_order_with_one_connection_each() {
    let config = config(&["s1", "s2"], &["greet", "deploy"]);
    let (result, events) = run(&config, FakeConnector::default());

    let output = result.unwrap();
    let s1 = output.find("on server s1").unwrap();
    let s2 = output.find("on server s2").unwrap();
    assert!(s1 < s2);
    assert!(output.ends_with("echo 'hello'\ngit pull\nmake install\n"));

    let connects: Vec<&String> = events.iter().filter(|e| e.starts_with("connect")).collect();
    assert_eq!(connects.len(), 2);
    assert!(connects[1].ends_with("ssh-rsa"));
    assert_eq!(events.iter().filter(|e| *e == "session").count(), 6);

    let close_s1 = events.iter().position(|e| e == "close s1").unwrap();
    let connect_s2 = events.iter().position(|e| e.starts_with("connect s2")).unwrap();
    assert!(close_s1 < connect_s2);
}

#[test]
fn unreadable_key_fails_before_dialing() {
    let mut config = config(&["s1"], &["greet"]);
    config.servers.get_mut("s1").unwrap().private_key = fixture("does-not-exist");

    let (result, events) = run(&config, FakeConnector::default());
    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "ssh.key_unreadable");
    assert_eq!(err.details["serverId"], "s1");
    assert!(events.is_empty());
}

#[test]
fn garbage_key_is_invalid() {
    let mut config = config(&["s1"], &["greet"]);
    config.servers.get_mut("s1").unwrap().private_key = fixture("not_a_key");

    let (result, events) = run(&config, FakeConnector::default());
    assert_eq!(result.unwrap_err().code.as_str(), "ssh.key_invalid");
    assert!(events.is_empty());
}

#[test]
fn malformed_rsa_key_fails_before_dialing() {
    let mut config = config(&["s1"], &["greet"]);
    config.servers.get_mut("s1").unwrap().private_key = fixture("id_rsa_corrupt");

    let (result, events) = run(&config, FakeConnector::default());
    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "ssh.key_invalid");
    assert!(err.message.contains("id_rsa_corrupt"));
    assert!(events.is_empty());
}

#[test]
fn passphrase_protected_key_is_rejected() {
    let mut config = config(&["s1"], &["greet"]);
    config.servers.get_mut("s1").unwrap().private_key = fixture("id_ed25519_encrypted");

    let (result, _) = run(&config, FakeConnector::default());
    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "ssh.key_invalid");
    assert!(err.message.contains("passphrase"));
}

#[test]
fn unknown_pipeline() {
    let config = config(&["s1"], &["greet"]);
    let err = RemoteExecutor::with_connector(&config, FakeConnector::default())
        .execute("invalid")
        .unwrap_err();
    assert_eq!(err.message, "pipeline invalid is not defined");
}

#[test]
fn pipeline_without_servers() {
    let config = config(&[], &["greet"]);
    let (result, events) = run(&config, FakeConnector::default());
    assert_eq!(result.unwrap_err().code.as_str(), "pipeline.no_servers");
    assert!(events.is_empty());
}

#[test]
fn unknown_task_still_closes_the_connection() {
    let config = config(&["s1"], &["greet", "invalid"]);
    let (result, events) = run(&config, FakeConnector::default());

    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "task.not_found");
    assert_eq!(err.message, "task invalid is not defined");
    assert_eq!(events.last().map(String::as_str), Some("close s1"));
    assert!(events.contains(&"run s1: echo 'hello'".to_string()));
}

#[test]
fn missing_second_server_fails_after_first_server_ran() {
    let config = config(&["s1", "invalid"], &["greet"]);
    let (result, events) = run(&config, FakeConnector::default());

    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "server.not_found");
    assert_eq!(err.message, "server invalid does not exist");
    assert!(events.contains(&"run s1: echo 'hello'".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("close s1"));
}

#[test]
fn failing_command_stops_the_run() {
    let config = config(&["s1", "s2"], &["broken", "greet"]);
    let (result, events) = run(&config, FakeConnector::default());

    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "command.failed");
    assert_eq!(err.details["output"], "boom\n");
    assert_eq!(err.details["target"]["serverId"], "s1");
    assert!(!events.iter().any(|e| e.contains("echo 'hello'")));
    assert!(!events.iter().any(|e| e.starts_with("connect s2")));
    assert_eq!(
        &events[events.len() - 2..],
        &["session closed".to_string(), "close s1".to_string()]
    );
}

#[test]
fn session_transport_failure_closes_the_connection() {
    let config = config(&["s1"], &["flaky"]);
    let (result, events) = run(&config, FakeConnector::default());

    assert_eq!(result.unwrap_err().code.as_str(), "ssh.session_failed");
    assert_eq!(events.last().map(String::as_str), Some("close s1"));
}

#[test]
fn session_close_failure_is_reported() {
    let config = config(&["s1"], &["sticky", "greet"]);
    let (result, events) = run(&config, FakeConnector::default());

    assert_eq!(result.unwrap_err().code.as_str(), "ssh.session_close_failed");
    assert!(!events.iter().any(|e| e.contains("echo 'hello'")));
    assert_eq!(events.last().map(String::as_str), Some("close s1"));
}

#[test]
fn session_error_wins_over_session_close_error() {
    let config = config(&["s1"], &["sticky-flaky"]);
    let (result, _) = run(&config, FakeConnector::default());
    assert_eq!(result.unwrap_err().code.as_str(), "ssh.session_failed");
}

#[test]
fn connection_close_failure_is_reported_after_clean_run() {
    let config = config(&["s1", "s2"], &["greet"]);
    let connector = FakeConnector {
        fail_close: true,
        ..FakeConnector::default()
    };
    let (result, events) = run(&config, connector);

    assert_eq!(result.unwrap_err().code.as_str(), "ssh.close_failed");
    assert!(!events.iter().any(|e| e.starts_with("connect s2")));
}

#[test]
fn task_error_wins_over_connection_close_error() {
    let config = config(&["s1"], &["invalid"]);
    let connector = FakeConnector {
        fail_close: true,
        ..FakeConnector::default()
    };
    let (result, events) = run(&config, connector);

    assert_eq!(result.unwrap_err().code.as_str(), "task.not_found");
    assert_eq!(events.last().map(String::as_str), Some("close s1"));
}

#[test]
fn dial_failure_on_second_server() {
    let config = config(&["s1", "s2"], &["greet"]);
    let connector = FakeConnector {
        refuse: Some("s2"),
        ..FakeConnector::default()
    };
    let (result, events) = run(&config, connector);

    let err = result.unwrap_err();
    assert_eq!(err.code.as_str(), "ssh.connect_failed");
    assert_eq!(err.retryable, Some(true));
    assert!(events.contains(&"close s1".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("connect s2")));
}

/// Runs against a real server. Set `PLOY_TEST_SSH_HOST`, `PLOY_TEST_SSH_USER`
/// and `PLOY_TEST_SSH_KEY` (optionally `PLOY_TEST_SSH_PORT`), then run with
/// `--ignored`.
#[test]
#[ignore]
fn live_openssh_round_trip() {
    let var = |name: &str| std::env::var(name).unwrap_or_default();
    let mut config = config(&["s1"], &["greet"]);
    config.servers.insert(
        "s1".to_string(),
        Server {
            host: var("PLOY_TEST_SSH_HOST"),
            port: var("PLOY_TEST_SSH_PORT").parse().unwrap_or(22),
            user: var("PLOY_TEST_SSH_USER"),
            private_key: var("PLOY_TEST_SSH_KEY"),
        },
    );

    let output = RemoteExecutor::new(&config).execute("test").unwrap();
    assert_eq!(output, "Running pipeline test on server s1\nhello\n");
}
