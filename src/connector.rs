// src/connector.rs
// Ways of opening a raw message channel to a device. Authentication belongs to
// whatever sits underneath (the ssh client, a port forward); the session layer
// only ever sees a `Transport`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::transport::{FramedTransport, Framing, Transport, TransportError};

/// Credential material handed to a connector. Opaque to the core.
#[derive(Clone, Default)]
pub enum Credential {
    #[default]
    None,
    Password(String),
    IdentityFile(PathBuf),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::None => f.write_str("None"),
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::IdentityFile(path) => write!(f, "IdentityFile({:?})", path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, credential: Credential, port: u16) -> Self {
        ConnectParams {
            host: host.into(),
            port,
            username: username.into(),
            credential,
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError>;
}

/// Plain TCP, for lab devices that expose NETCONF without SSH or for an
/// already-authenticated port forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError> {
        if !matches!(params.credential, Credential::None) {
            debug!("TCP transport ignores credentials for {}", params.username);
        }
        let stream = TcpStream::connect((params.host.as_str(), params.port))
            .await
            .map_err(|e| TransportError::Connect(format!("{}:{}: {}", params.host, params.port, e)))?;
        stream.set_nodelay(true)?;
        info!("TCP connection established to {}:{}", params.host, params.port);
        let (reader, writer) = stream.into_split();
        Ok(Box::new(FramedTransport::<OwnedReadHalf, OwnedWriteHalf>::new(reader, writer)))
    }
}

/// Runs the system `ssh` client with the `netconf` subsystem and speaks over
/// its stdin/stdout. Key and agent authentication are left to ssh.
#[derive(Debug, Clone)]
pub struct SshCommandConnector {
    pub program: PathBuf,
    pub host_key_check: bool,
    pub extra_args: Vec<String>,
}

impl Default for SshCommandConnector {
    fn default() -> Self {
        SshCommandConnector {
            program: PathBuf::from("ssh"),
            host_key_check: true,
            extra_args: Vec::new(),
        }
    }
}

impl SshCommandConnector {
    pub fn command_args(&self, params: &ConnectParams) -> Result<Vec<String>, TransportError> {
        if params.host.is_empty() || params.host.starts_with('-') {
            return Err(TransportError::Connect(format!("invalid ssh host '{}'", params.host)));
        }
        let mut args = vec![
            "-p".to_string(),
            params.port.to_string(),
            "-l".to_string(),
            params.username.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        match &params.credential {
            Credential::IdentityFile(path) => {
                args.push("-i".to_string());
                args.push(path.display().to_string());
            }
            Credential::Password(_) => {
                return Err(TransportError::Connect(
                    "password authentication is not supported by the ssh subprocess transport; use an identity file or agent".into(),
                ));
            }
            Credential::None => {}
        }
        if !self.host_key_check {
            args.extend(
                ["-o", "StrictHostKeyChecking=no", "-o", "UserKnownHostsFile=/dev/null"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        args.extend(self.extra_args.iter().cloned());
        // `--` ends option parsing; the word after the host names the subsystem.
        args.extend(["-s", "--"].iter().map(|s| s.to_string()));
        args.push(params.host.clone());
        args.push("netconf".to_string());
        Ok(args)
    }
}

#[async_trait]
impl Connector for SshCommandConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn Transport>, TransportError> {
        let args = self.command_args(params)?;
        debug!("Spawning {:?} {:?}", self.program, args);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Connect(format!("cannot spawn {:?}: {}", self.program, e)))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TransportError::Connect("ssh child has no stdio pipes".into()));
        };
        info!("ssh netconf subsystem started for {}@{}", params.username, params.host);
        Ok(Box::new(ProcessTransport {
            inner: FramedTransport::new(stdout, stdin),
            child,
        }))
    }
}

/// Framed channel over a child process; the child dies with the transport.
pub struct ProcessTransport {
    inner: FramedTransport<ChildStdout, ChildStdin>,
    child: Child,
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        self.inner.send(message).await
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        self.inner.recv().await
    }

    fn set_framing(&mut self, framing: Framing) {
        self.inner.set_framing(framing);
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let shutdown = self.inner.close().await;
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to stop ssh child process: {}", e);
        }
        let _ = self.child.wait().await;
        shutdown
    }
}
