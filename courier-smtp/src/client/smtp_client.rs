//! Command-level SMTP client with support for implicit TLS and STARTTLS.

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::net::{TcpStream, ToSocketAddrs};

use courier_common::{incoming, outgoing};

use super::{
    connection::ClientConnection,
    data::DotStuffer,
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client speaking to one relay.
///
/// Each method writes one command and reads one reply. Interpreting reply
/// codes is left to the caller.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    fn new(connection: ClientConnection, server_domain: String, accept_invalid_certs: bool) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain,
            accept_invalid_certs,
        }
    }

    /// Opens a plaintext connection to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection fails.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        server_domain: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self::new(
            ClientConnection::Plain(stream),
            server_domain.into(),
            accept_invalid_certs,
        ))
    }

    /// Opens a connection to `addr` and completes the TLS handshake before
    /// any SMTP traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the handshake fails.
    pub async fn connect_tls(
        addr: impl ToSocketAddrs,
        server_domain: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let server_domain = server_domain.into();
        let stream = TcpStream::connect(addr).await?;
        let connection =
            ClientConnection::handshake(stream, &server_domain, accept_invalid_certs).await?;

        Ok(Self::new(connection, server_domain, accept_invalid_certs))
    }

    /// Returns `true` once the connection runs over TLS.
    pub fn is_encrypted(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ClientConnection::is_encrypted)
    }

    /// Reads the relay's opening banner.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the banner is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    async fn send_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    /// Sends a command and reads its reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.send_line(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Sends STARTTLS and, if the relay agrees, upgrades the same TCP
    /// stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged or the handshake
    /// fails. A refusal is returned as a non-success [`Response`].
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;

            // Anything buffered before the handshake came over plaintext.
            self.buffer_pos = 0;
            self.connection = Some(
                connection
                    .upgrade(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
        }

        Ok(response)
    }

    /// Sends `AUTH PLAIN` with an initial response (RFC 4616).
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn auth_plain(&mut self, username: &str, secret: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{secret}"));

        outgoing!("AUTH PLAIN <redacted>");
        self.send_line(&format!("AUTH PLAIN {token}")).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Writes the payload chunks in order, dot-stuffed and with bare LFs
    /// turned into CRLF, then the terminating `.` line. The relay's verdict
    /// is read separately with [`SmtpClient::data_reply`].
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails. The terminator has not been sent
    /// in that case.
    pub async fn send_data(&mut self, chunks: &[&[u8]]) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;

        let mut stuffer = DotStuffer::default();
        let mut written = 0;
        for chunk in chunks {
            let stuffed = stuffer.stuff(chunk);
            written += stuffed.len();
            connection.send(&stuffed).await?;
        }
        let terminator = stuffer.finish();
        written += terminator.len();
        connection.send(&terminator).await?;

        outgoing!("<{written} bytes of message data>");
        Ok(())
    }

    /// Reads the relay's reply to a terminated payload.
    ///
    /// # Errors
    ///
    /// Returns an error if no complete reply arrives.
    pub async fn data_reply(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn rset(&mut self) -> Result<Response> {
        self.command("RSET").await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be exchanged.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
