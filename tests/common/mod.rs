//! In-memory stand-in for an SSH host.
//!
//! `MockConnector` dials `MockSession`s that share one `Host`: a flat map of
//! regular files plus counters for connects, closes and every command run.
//! Commands are interpreted by splitting on whitespace, so tests stick to
//! paths that need no quoting.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rfile::descriptor::{ConnectionDescriptor, Permissions};
use rfile::error::TransportError;
use rfile::session::{CommandOutput, Connector, FileStat, FileTransfer, RemoteSession};

const REGULAR_FILE: u32 = 0o100000;
const USERS: &[(u32, &str)] = &[(0, "root"), (1000, "deploy")];
const GROUPS: &[(u32, &str)] = &[(0, "root"), (10, "wheel"), (1000, "deploy")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl RemoteFile {
    fn new(content: Vec<u8>, mode: u32) -> Self {
        Self {
            content,
            mode,
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Default)]
pub struct Host {
    files: Mutex<HashMap<String, RemoteFile>>,
    commands: Mutex<Vec<String>>,
    failing: Mutex<Vec<(String, String)>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    copies: AtomicUsize,
    transfers_opened: AtomicUsize,
    transfers_closed: AtomicUsize,
    fail_connect: AtomicBool,
    fail_close: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
}

impl Host {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, path: &str, content: &str, mode: u32) {
        self.put_bytes(path, content.as_bytes(), mode);
    }

    pub fn put_bytes(&self, path: &str, content: &[u8], mode: u32) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), RemoteFile::new(content.to_vec(), mode));
    }

    pub fn file(&self, path: &str) -> Option<RemoteFile> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    /// Makes every command containing `pattern` exit 1 with `stderr`.
    pub fn fail_commands_containing(&self, pattern: &str, stderr: &str) {
        self.failing
            .lock()
            .unwrap()
            .push((pattern.to_string(), stderr.to_string()));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn transfers_opened(&self) -> usize {
        self.transfers_opened.load(Ordering::SeqCst)
    }

    pub fn transfers_closed(&self) -> usize {
        self.transfers_closed.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    fn run(&self, command: &str, stdin: Option<Vec<u8>>) -> CommandOutput {
        self.commands.lock().unwrap().push(command.to_string());

        if let Some((_, stderr)) = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
        {
            return exit(1, Vec::new(), stderr);
        }

        if let Some(rest) = command.strip_prefix("cat /dev/stdin | ") {
            let rest = rest.strip_prefix("sudo ").unwrap_or(rest);
            if let Some(path) = rest.strip_prefix("tee ") {
                let content = stdin.unwrap_or_default();
                let mut files = self.files.lock().unwrap();
                files
                    .entry(path.to_string())
                    .and_modify(|file| file.content = content.clone())
                    .or_insert_with(|| RemoteFile::new(content.clone(), 0o644));
                return exit(0, content, "");
            }
        }

        let command = command.strip_prefix("sudo ").unwrap_or(command);
        let words: Vec<&str> = command.split_whitespace().collect();
        let mut files = self.files.lock().unwrap();
        match words.as_slice() {
            ["test", "-f", path] => status(files.contains_key(*path)),
            ["test", "!", "-f", path] => status(!files.contains_key(*path)),
            ["cat", path] => match files.get(*path) {
                Some(file) => exit(0, file.content.clone(), ""),
                None => missing("cat", path),
            },
            ["rm", path] => match files.remove(*path) {
                Some(_) => exit(0, Vec::new(), ""),
                None => missing("rm", path),
            },
            ["chmod", mode, path] => match (u32::from_str_radix(mode, 8), files.get_mut(*path)) {
                (Ok(mode), Some(file)) => {
                    file.mode = mode;
                    exit(0, Vec::new(), "")
                }
                (Err(_), _) => exit(1, Vec::new(), &format!("chmod: invalid mode: '{mode}'\n")),
                (_, None) => missing("chmod", path),
            },
            ["chown", owner, path] => match (lookup(USERS, owner), files.get_mut(*path)) {
                (Some(uid), Some(file)) => {
                    file.uid = uid;
                    exit(0, Vec::new(), "")
                }
                (None, _) => exit(1, Vec::new(), &format!("chown: invalid user: '{owner}'\n")),
                (_, None) => missing("chown", path),
            },
            ["chgrp", group, path] => match (lookup(GROUPS, group), files.get_mut(*path)) {
                (Some(gid), Some(file)) => {
                    file.gid = gid;
                    exit(0, Vec::new(), "")
                }
                (None, _) => exit(1, Vec::new(), &format!("chgrp: invalid group: '{group}'\n")),
                (_, None) => missing("chgrp", path),
            },
            ["stat", "-c", format, path] => match files.get(*path) {
                Some(file) => {
                    let value = match *format {
                        "%a" => format!("{:o}", file.mode & 0o7777),
                        "%u" => file.uid.to_string(),
                        "%g" => file.gid.to_string(),
                        "%U" => name(USERS, file.uid),
                        "%G" => name(GROUPS, file.gid),
                        other => return exit(1, Vec::new(), &format!("stat: bad format {other}\n")),
                    };
                    exit(0, format!("{value}\n").into_bytes(), "")
                }
                None => missing("stat", path),
            },
            _ => exit(127, Vec::new(), &format!("sh: {command}: command not found\n")),
        }
    }
}

fn exit(status: u32, stdout: Vec<u8>, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout,
        stderr: stderr.as_bytes().to_vec(),
        exit_status: Some(status),
    }
}

fn status(ok: bool) -> CommandOutput {
    exit(if ok { 0 } else { 1 }, Vec::new(), "")
}

fn missing(tool: &str, path: &str) -> CommandOutput {
    exit(
        1,
        Vec::new(),
        &format!("{tool}: {path}: No such file or directory\n"),
    )
}

fn lookup(table: &[(u32, &str)], value: &str) -> Option<u32> {
    match value.parse::<u32>() {
        Ok(id) => Some(id),
        Err(_) => table
            .iter()
            .find(|(_, name)| *name == value)
            .map(|(id, _)| *id),
    }
}

fn name(table: &[(u32, &str)], id: u32) -> String {
    table
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| id.to_string())
}

#[derive(Clone)]
pub struct MockConnector {
    pub host: Arc<Host>,
}

impl MockConnector {
    pub fn new(host: Arc<Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(
        &self,
        _descriptor: &ConnectionDescriptor,
    ) -> Result<MockSession, TransportError> {
        let delay = *self.host.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.host.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol(
                "authentication failed".to_string(),
            ));
        }
        self.host.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession::new(self.host.clone()))
    }
}

pub struct MockSession {
    host: Arc<Host>,
    closed: AtomicBool,
}

impl MockSession {
    pub fn new(host: Arc<Host>) -> Self {
        Self {
            host,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn exec(
        &self,
        command: &str,
        stdin: Option<Vec<u8>>,
    ) -> Result<CommandOutput, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        Ok(self.host.run(command, stdin))
    }

    async fn copy(
        &self,
        content: &[u8],
        path: &str,
        permissions: &Permissions,
    ) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        let mode = u32::from_str_radix(permissions.as_str(), 8).map_err(|_| {
            TransportError::Protocol(format!("bad mode {}", permissions.as_str()))
        })?;
        self.host.copies.fetch_add(1, Ordering::SeqCst);
        self.host
            .files
            .lock()
            .unwrap()
            .entry(path.to_string())
            .and_modify(|file| file.content = content.to_vec())
            .or_insert_with(|| RemoteFile::new(content.to_vec(), mode));
        Ok(())
    }

    async fn open_transfer(&self) -> Result<Box<dyn FileTransfer>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed);
        }
        self.host.transfers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockTransfer {
            host: self.host.clone(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.host.closes.fetch_add(1, Ordering::SeqCst);
        if self.host.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("disconnect refused".to_string()));
        }
        Ok(())
    }
}

pub struct MockTransfer {
    host: Arc<Host>,
    closed: bool,
}

#[async_trait]
impl FileTransfer for MockTransfer {
    async fn stat(&mut self, path: &str) -> Result<FileStat, TransportError> {
        let file = self.host.file(path).ok_or(TransportError::NotFound)?;
        Ok(FileStat {
            mode: REGULAR_FILE | file.mode,
            size: file.content.len() as u64,
        })
    }

    async fn read(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let file = self.host.file(path).ok_or(TransportError::NotFound)?;
        Ok(file.content)
    }

    async fn remove(&mut self, path: &str) -> Result<(), TransportError> {
        self.host
            .files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or(TransportError::NotFound)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        self.closed = true;
        self.host.transfers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::new("h", "root").with_password("p")
}

pub fn mock(host: &Arc<Host>) -> MockConnector {
    MockConnector::new(host.clone())
}
