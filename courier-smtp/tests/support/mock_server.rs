//! Mock SMTP relay for session tests
//!
//! The relay can:
#![allow(dead_code)] // Shared by several test binaries; not every helper is used by each
//! - Answer each command with a configured reply
//! - Reject individual recipients
//! - Advertise STARTTLS and AUTH, and either complete the TLS handshake with a
//!   self-signed certificate or record the first byte sent after an upgrade
//!   point
//! - Drop the connection, hang on a given command, or go silent after the
//!   DATA terminator
//! - Record every command and the unstuffed DATA payload
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_rejected_recipient("nobody@example.com", 550, "No such user")
//!     .build()
//!     .await?;
//!
//! // Point a session at server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

/// What the relay received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    /// The AUTH arguments, e.g. `PLAIN <base64>`.
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// The payload between DATA and the terminating dot, unstuffed.
    MessageContent(Vec<u8>),
    Rset,
    Quit,
    /// The first byte read where a TLS ClientHello is expected.
    TlsHandshake(u8),
    /// A TLS handshake completed; everything after it is encrypted.
    TlsEstablished,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i < cap_count - 1 { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.code);
        }

        response.into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    implicit_tls: bool,
    greeting: SmtpResponse,
    ehlo_response: Option<EhloResponse>,
    secure_ehlo_response: Option<EhloResponse>,
    helo_response: SmtpResponse,
    starttls_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rejected_recipients: HashMap<String, SmtpResponse>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    rset_response: SmtpResponse,
    quit_response: SmtpResponse,

    // Failure injection
    drop_after_commands: Option<usize>,
    timeout_on_command: Option<usize>,
    silent_after_data: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            implicit_tls: false,
            greeting: SmtpResponse::new(220, "mock.local ESMTP ready"),
            ehlo_response: Some(EhloResponse {
                code: 250,
                capabilities: vec![
                    "mock.local".to_string(),
                    "SIZE 10000000".to_string(),
                    "AUTH PLAIN LOGIN".to_string(),
                ],
            }),
            secure_ehlo_response: None,
            helo_response: SmtpResponse::new(250, "mock.local"),
            starttls_response: SmtpResponse::new(220, "Ready to start TLS"),
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rejected_recipients: HashMap::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            rset_response: SmtpResponse::new(250, "OK"),
            quit_response: SmtpResponse::new(221, "Bye"),
            drop_after_commands: None,
            timeout_on_command: None,
            silent_after_data: false,
        }
    }
}

/// Where a conversation stopped.
enum Conversation {
    Ended,
    /// STARTTLS was accepted; the handshake comes next.
    Upgrade,
}

/// A TLS acceptor with a fresh self-signed certificate for `localhost` and
/// `127.0.0.1`.
fn self_signed_acceptor() -> Result<TlsAcceptor, Box<dyn std::error::Error + Send + Sync>> {
    let cert = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    let chain = vec![CertificateDer::from(cert.serialize_der()?)];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Extracts the address from `FROM:<a@b>` / `TO:<a@b>`.
fn path_argument(argument: &str) -> String {
    argument
        .split_once(':')
        .map_or(argument, |(_, path)| path)
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command received, across all connections.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// The payloads of every accepted DATA, in order.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn record_tls_probe<R>(
        reader: &mut R,
        commands: &RwLock<Vec<SmtpCommand>>,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        R: AsyncRead + Unpin,
    {
        let mut first = [0u8; 1];
        if timeout(Duration::from_secs(10), reader.read_exact(&mut first))
            .await
            .is_ok_and(|read| read.is_ok())
        {
            commands
                .write()
                .await
                .push(SmtpCommand::TlsHandshake(first[0]));
        }
        Ok(())
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        acceptor: Option<TlsAcceptor>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut command_count = 0;

        if config.implicit_tls {
            let Some(acceptor) = acceptor else {
                // No TLS stack: capture the ClientHello's first byte and hang up.
                return Self::record_tls_probe(&mut BufReader::new(stream), &commands).await;
            };

            let stream = acceptor.accept(stream).await?;
            commands.write().await.push(SmtpCommand::TlsEstablished);
            let mut stream = BufReader::new(stream);
            Self::converse(&mut stream, &config, &commands, true, &mut command_count).await?;
            return Ok(());
        }

        let mut stream = BufReader::new(stream);
        let outcome =
            Self::converse(&mut stream, &config, &commands, false, &mut command_count).await?;

        if matches!(outcome, Conversation::Upgrade) {
            let Some(acceptor) = acceptor else {
                return Self::record_tls_probe(&mut stream, &commands).await;
            };

            let stream = acceptor.accept(stream.into_inner()).await?;
            commands.write().await.push(SmtpCommand::TlsEstablished);
            let mut stream = BufReader::new(stream);
            Self::converse(&mut stream, &config, &commands, true, &mut command_count).await?;
        }

        Ok(())
    }

    /// Runs the command loop until the client quits, the connection drops,
    /// or STARTTLS is accepted. The greeting is sent unless this continues
    /// a connection that was just upgraded.
    #[allow(clippy::too_many_lines)]
    async fn converse<S>(
        stream: &mut BufReader<S>,
        config: &MockServerConfig,
        commands: &RwLock<Vec<SmtpCommand>>,
        secure: bool,
        local_command_count: &mut usize,
    ) -> Result<Conversation, Box<dyn std::error::Error>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = String::new();
        let upgraded = secure && !config.implicit_tls;

        if !upgraded {
            stream.write_all(&config.greeting.to_bytes()).await?;
            stream.flush().await?;

            if config.greeting.code != 220 {
                return Ok(Conversation::Ended);
            }
        }

        let ehlo_response = if secure {
            config
                .secure_ehlo_response
                .as_ref()
                .or(config.ehlo_response.as_ref())
        } else {
            config.ehlo_response.as_ref()
        };

        loop {
            line.clear();

            if let Some(drop_after) = config.drop_after_commands
                && *local_command_count >= drop_after
            {
                return Ok(Conversation::Ended);
            }

            if let Some(timeout_on) = config.timeout_on_command
                && *local_command_count == timeout_on
            {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(Conversation::Ended);
            }

            let Ok(read_result) =
                timeout(Duration::from_secs(10), stream.read_line(&mut line)).await
            else {
                return Ok(Conversation::Ended);
            };

            if read_result? == 0 {
                return Ok(Conversation::Ended);
            }

            *local_command_count += 1;

            let cmd_line = line.trim();
            let (verb, argument) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            let (response, smtp_cmd) = match verb.to_uppercase().as_str() {
                "EHLO" => (
                    ehlo_response.map_or_else(
                        || SmtpResponse::new(502, "Command not recognized").to_bytes(),
                        EhloResponse::to_bytes,
                    ),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    stream.write_all(&config.starttls_response.to_bytes()).await?;
                    stream.flush().await?;

                    if config.starttls_response.code == 220 {
                        return Ok(Conversation::Upgrade);
                    }
                    continue;
                }
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(path_argument(argument)),
                ),
                "RCPT" => {
                    let to = path_argument(argument);
                    let response = config
                        .rejected_recipients
                        .get(&to)
                        .unwrap_or(&config.rcpt_to_response)
                        .to_bytes();
                    (response, SmtpCommand::RcptTo(to))
                }
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "RSET" => (config.rset_response.to_bytes(), SmtpCommand::Rset),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    stream.write_all(&config.quit_response.to_bytes()).await?;
                    stream.flush().await?;
                    return Ok(Conversation::Ended);
                }
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.to_string()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());

            stream.write_all(&response).await?;
            stream.flush().await?;

            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = Vec::new();
                let mut data_line = Vec::new();

                loop {
                    data_line.clear();
                    if stream.read_until(b'\n', &mut data_line).await? == 0 {
                        return Ok(Conversation::Ended);
                    }

                    if data_line == b".\r\n" {
                        commands
                            .write()
                            .await
                            .push(SmtpCommand::MessageContent(message_content));

                        if config.silent_after_data {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            return Ok(Conversation::Ended);
                        }

                        stream
                            .write_all(&config.data_end_response.to_bytes())
                            .await?;
                        stream.flush().await?;
                        break;
                    }

                    let unstuffed = data_line.strip_prefix(b".").unwrap_or(data_line.as_slice());
                    message_content.extend_from_slice(unstuffed);
                }
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
    tls: bool,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
            tls: false,
        }
    }

    /// Expect a TLS handshake instead of plaintext SMTP.
    #[must_use]
    pub const fn with_implicit_tls(mut self) -> Self {
        self.config.implicit_tls = true;
        self
    }

    /// Complete TLS handshakes with a self-signed certificate. Without this
    /// the relay only records the first handshake byte.
    #[must_use]
    pub const fn with_tls(mut self) -> Self {
        self.tls = true;
        self
    }

    /// Capability lines advertised by EHLO once the connection is encrypted.
    /// Defaults to the plaintext set.
    #[must_use]
    pub fn with_secure_ehlo_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.secure_ehlo_response = Some(EhloResponse {
            code: 250,
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        });
        self
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Replace the EHLO capability lines. The first entry is the greeting
    /// line.
    #[must_use]
    pub fn with_ehlo_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.ehlo_response = Some(EhloResponse {
            code: 250,
            capabilities: capabilities.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Answer EHLO with 502 so the client must fall back to HELO.
    #[must_use]
    pub fn without_ehlo(mut self) -> Self {
        self.config.ehlo_response = None;
        self
    }

    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Reject `address` at RCPT TO; other recipients are accepted.
    #[must_use]
    pub fn with_rejected_recipient(
        mut self,
        address: impl Into<String>,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.config
            .rejected_recipients
            .insert(address.into(), SmtpResponse::new(code, message));
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Drop the connection after N commands.
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Hang on the Nth command (0-indexed).
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Read the whole DATA payload, then never reply.
    #[must_use]
    pub const fn with_silence_after_data(mut self) -> Self {
        self.config.silent_after_data = true;
        self
    }

    /// Binds to a random local port and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or the certificate
    /// cannot be generated.
    pub async fn build(self) -> Result<MockSmtpServer, Box<dyn std::error::Error + Send + Sync>> {
        let acceptor = if self.tls {
            Some(self_signed_acceptor()?)
        } else {
            None
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let connections_clone = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    connections_clone.fetch_add(1, Ordering::Relaxed);
                    let config = Arc::clone(&config);
                    let acceptor = acceptor.clone();
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) =
                            MockSmtpServer::handle_client(stream, config, acceptor, commands).await
                        {
                            tracing::debug!("Mock server client error: {e}");
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            connections,
        })
    }
}
