//! Scripted in-memory sessions for driver and orchestrator tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use secrecy::SecretString;

use cfgsnap::channel::ShellIo;
use cfgsnap::config::Credentials;
use cfgsnap::error::{Result, TransportError};
use cfgsnap::transport::{Connector, ExecOutput, Session, SshConfig};

pub const PASSWORD: &str = "s3cret";

/// What one device answers.
///
/// Failure steps are named `connect`, `open_shell`, `shell:<line>` (the
/// channel closes after that line), `silent:<line>` (no reply ever comes),
/// `exec:<command>`, `copy_down:<remote>` and `list_dir:<remote>`.
#[derive(Debug, Clone, Default)]
pub struct DeviceScript {
    banner: String,
    shell: HashMap<String, VecDeque<String>>,
    exec: HashMap<String, ExecOutput>,
    files: HashMap<String, String>,
    dirs: HashMap<String, Vec<String>>,
    fail: HashSet<String>,
}

impl DeviceScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output waiting when the shell opens.
    pub fn banner(mut self, banner: &str) -> Self {
        self.banner = banner.to_string();
        self
    }

    /// Reply to an input line. Repeated lines get their replies in order.
    pub fn reply(mut self, line: &str, output: &str) -> Self {
        self.shell
            .entry(line.to_string())
            .or_default()
            .push_back(output.to_string());
        self
    }

    pub fn exec(mut self, command: &str, stdout: &str) -> Self {
        self.exec.insert(
            command.to_string(),
            ExecOutput {
                stdout: stdout.to_string(),
                exit_status: Some(0),
            },
        );
        self
    }

    pub fn file(mut self, remote: &str, content: &str) -> Self {
        self.files.insert(remote.to_string(), content.to_string());
        self
    }

    pub fn dir(mut self, remote: &str, names: &[&str]) -> Self {
        self.dirs.insert(
            remote.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
        self
    }

    /// Break the script at `step`; `panic` makes the connect itself panic.
    pub fn fail(mut self, step: &str) -> Self {
        self.fail.insert(step.to_string());
        self
    }

    /// Every failure step this script can be broken at, in script order.
    pub fn steps(&self) -> Vec<String> {
        let mut steps = vec!["connect".to_string()];
        if !self.banner.is_empty() || !self.shell.is_empty() {
            steps.push("open_shell".to_string());
        }
        let mut lines: Vec<_> = self.shell.keys().map(|l| format!("shell:{l}")).collect();
        lines.sort();
        steps.extend(lines);
        let mut execs: Vec<_> = self.exec.keys().map(|c| format!("exec:{c}")).collect();
        execs.sort();
        steps.extend(execs);
        let mut copies: Vec<_> = self.files.keys().map(|f| format!("copy_down:{f}")).collect();
        copies.sort();
        steps.extend(copies);
        let mut listings: Vec<_> = self.dirs.keys().map(|d| format!("list_dir:{d}")).collect();
        listings.sort();
        steps.extend(listings);
        steps
    }
}

/// What happened on one device.
#[derive(Debug, Clone, Default)]
pub struct Activity {
    pub connects: usize,
    pub closes: usize,
    pub aborts: usize,
    pub shell_lines: Vec<String>,
    pub execs: Vec<String>,
    pub downloads: Vec<String>,
    pub removed: Vec<String>,
}

type ActivityLog = Arc<Mutex<HashMap<String, Activity>>>;

fn record(log: &ActivityLog, host: &str, f: impl FnOnce(&mut Activity)) {
    let mut log = log.lock().unwrap();
    f(log.entry(host.to_string()).or_default());
}

/// Connector over [`DeviceScript`]s keyed by address.
#[derive(Clone, Default)]
pub struct FakeConnector {
    scripts: HashMap<String, DeviceScript>,
    activity: ActivityLog,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, address: &str, script: DeviceScript) -> Self {
        self.scripts.insert(address.to_string(), script);
        self
    }

    pub fn activity(&self, address: &str) -> Activity {
        self.activity
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default()
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, config: &SshConfig) -> Result<FakeSession> {
        let Some(script) = self.scripts.get(&config.host) else {
            return Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            }
            .into());
        };
        if script.fail.contains("panic") {
            panic!("{}: scripted panic", config.host);
        }
        if script.fail.contains("connect") {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }
        record(&self.activity, &config.host, |a| a.connects += 1);
        Ok(FakeSession {
            host: config.host.clone(),
            script: script.clone(),
            activity: Arc::clone(&self.activity),
        })
    }
}

pub struct FakeSession {
    host: String,
    script: DeviceScript,
    activity: ActivityLog,
}

impl FakeSession {
    fn fails(&self, step: &str) -> bool {
        self.script.fail.contains(step)
    }
}

impl Session for FakeSession {
    type Shell = FakeShell;

    async fn run(&mut self, command: &str) -> Result<ExecOutput> {
        record(&self.activity, &self.host, |a| a.execs.push(command.to_string()));
        if self.fails(&format!("exec:{command}")) {
            return Err(TransportError::Exec {
                command: command.to_string(),
                message: "channel failure".to_string(),
            }
            .into());
        }
        Ok(self
            .script
            .exec
            .get(command)
            .cloned()
            .unwrap_or(ExecOutput {
                stdout: format!("{command}: not found\n"),
                exit_status: Some(127),
            }))
    }

    async fn open_shell(&mut self) -> Result<FakeShell> {
        if self.fails("open_shell") {
            return Err(TransportError::Disconnected.into());
        }
        let mut pending = VecDeque::new();
        if !self.script.banner.is_empty() {
            pending.push_back(self.script.banner.as_bytes().to_vec());
        }
        Ok(FakeShell {
            host: self.host.clone(),
            pending,
            replies: self.script.shell.clone(),
            fail: self.script.fail.clone(),
            closed: false,
            activity: Arc::clone(&self.activity),
        })
    }

    async fn copy_down(&mut self, remote: &str, local: &Path) -> Result<u64> {
        if self.fails(&format!("copy_down:{remote}")) {
            return Err(transfer(remote, "permission denied"));
        }
        let content = self
            .script
            .files
            .get(remote)
            .ok_or_else(|| transfer(remote, "no such file"))?;
        fs::write(local, content).map_err(TransportError::Io)?;
        record(&self.activity, &self.host, |a| a.downloads.push(remote.to_string()));
        Ok(content.len() as u64)
    }

    async fn copy_up(&mut self, local: &Path, remote: &str) -> Result<u64> {
        let content = fs::read_to_string(local).map_err(TransportError::Io)?;
        let len = content.len() as u64;
        self.script.files.insert(remote.to_string(), content);
        Ok(len)
    }

    async fn remove(&mut self, remote: &str) -> Result<()> {
        record(&self.activity, &self.host, |a| a.removed.push(remote.to_string()));
        self.script.files.remove(remote);
        Ok(())
    }

    async fn list_dir(&mut self, remote: &str) -> Result<Vec<String>> {
        if self.fails(&format!("list_dir:{remote}")) {
            return Err(transfer(remote, "permission denied"));
        }
        self.script
            .dirs
            .get(remote)
            .cloned()
            .ok_or_else(|| transfer(remote, "no such directory"))
    }

    async fn close(&mut self) -> Result<()> {
        record(&self.activity, &self.host, |a| a.closes += 1);
        Ok(())
    }

    fn abort(&mut self) {
        record(&self.activity, &self.host, |a| a.aborts += 1);
    }
}

fn transfer(path: &str, message: &str) -> cfgsnap::Error {
    TransportError::Transfer {
        path: path.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Interactive shell answering input lines from the script.
pub struct FakeShell {
    host: String,
    pending: VecDeque<Vec<u8>>,
    replies: HashMap<String, VecDeque<String>>,
    fail: HashSet<String>,
    closed: bool,
    activity: ActivityLog,
}

impl ShellIo for FakeShell {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(data).trim_end_matches('\n').to_string();
        record(&self.activity, &self.host, |a| a.shell_lines.push(line.clone()));

        if self.fail.contains(&format!("shell:{line}")) {
            self.closed = true;
            return Ok(());
        }
        if self.fail.contains(&format!("silent:{line}")) {
            return Ok(());
        }
        if let Some(reply) = self.replies.get_mut(&line).and_then(VecDeque::pop_front) {
            self.pending.push_back(reply.into_bytes());
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        match self.pending.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.closed => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// One `default` credentials entry with [`PASSWORD`].
pub fn credentials() -> IndexMap<String, Credentials> {
    IndexMap::from([(
        "default".to_string(),
        Credentials {
            username: "kubebot".to_string(),
            password: Arc::new(SecretString::from(PASSWORD)),
        },
    )])
}

pub fn password() -> SecretString {
    SecretString::from(PASSWORD)
}

/// Switch `host` whose running config is `config`.
pub fn switch_script(host: &str, config: &str) -> DeviceScript {
    DeviceScript::new()
        .banner(&format!("\r\n{host}>"))
        .reply("enable", "enable\r\nPassword: ")
        .reply(PASSWORD, &format!("\r\n{host}#"))
        .reply("terminal length 0", &format!("terminal length 0\r\n{host}#"))
        .reply(
            "show running-config",
            &format!(
                "show running-config\r\n{}\r\n{host}#",
                config.replace('\n', "\r\n")
            ),
        )
}

/// vEPC `host` running `version` whose saved config is `config`.
pub fn vepc_script(host: &str, version: &str, config: &str) -> DeviceScript {
    let remote = format!("/sftp/{host}_{version}.cfg");
    DeviceScript::new()
        .exec(
            "show version",
            &format!("Active Software:\n  Image Version:     {version}\n  Image Build Number: 1\n"),
        )
        .exec(&format!("save configuration {remote}"), "")
        .exec(&format!("delete {remote}"), "")
        .file(&remote, config)
}
