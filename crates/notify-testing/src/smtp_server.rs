//! In-process fake SMTP server.
//!
//! Speaks enough of RFC 5321 to drive the client end to end: greeting,
//! EHLO/HELO, AUTH PLAIN and LOGIN, MAIL/RCPT/DATA, RSET, NOOP and QUIT.
//! STARTTLS can be advertised but is always refused with 454, which is
//! enough to exercise the client's TLS policies without certificates.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Behaviour switches for [`FakeSmtpServer`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Name used in the greeting and EHLO reply.
    pub hostname: String,
    /// Answer EHLO. When false EHLO gets 502 and clients must fall back to HELO.
    pub ehlo: bool,
    /// AUTH mechanisms to advertise. Empty means no AUTH extension.
    pub auth_mechanisms: Vec<String>,
    /// Accepted username and password. `None` accepts any credentials.
    pub credentials: Option<(String, String)>,
    /// Advertise STARTTLS.
    pub starttls: bool,
    /// SIZE limit to advertise and enforce.
    pub size_limit: Option<usize>,
    /// Recipients answered with 550.
    pub rejected_recipients: Vec<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            hostname: "fake.smtp.test".to_string(),
            ehlo: true,
            auth_mechanisms: Vec::new(),
            credentials: None,
            starttls: false,
            size_limit: None,
            rejected_recipients: Vec::new(),
        }
    }
}

impl ServerOptions {
    /// Default options: EHLO, no AUTH, no STARTTLS, no SIZE.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise AUTH with the given mechanisms and require these credentials.
    #[must_use]
    pub fn auth(mut self, mechanisms: &[&str], username: &str, password: &str) -> Self {
        self.auth_mechanisms = mechanisms.iter().map(|m| (*m).to_string()).collect();
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Advertise STARTTLS.
    #[must_use]
    pub fn starttls(mut self) -> Self {
        self.starttls = true;
        self
    }

    /// Reject EHLO so the client has to use HELO.
    #[must_use]
    pub fn helo_only(mut self) -> Self {
        self.ehlo = false;
        self
    }

    /// Advertise and enforce a SIZE limit.
    #[must_use]
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Answer RCPT for `address` with 550.
    #[must_use]
    pub fn reject_recipient(mut self, address: &str) -> Self {
        self.rejected_recipients.push(address.to_ascii_lowercase());
        self
    }
}

/// A message accepted by the server.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Envelope sender.
    pub from: String,
    /// Envelope recipients in RCPT order.
    pub recipients: Vec<String>,
    /// Message content with transparency dots removed and CRLF line endings.
    pub data: String,
}

impl ReceivedMessage {
    /// Value of the first header named `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.data
            .split("\r\n")
            .take_while(|line| !line.is_empty())
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.eq_ignore_ascii_case(name).then(|| value.trim())
            })
    }

    /// Everything after the blank line that ends the header block.
    #[must_use]
    pub fn body(&self) -> &str {
        self.data
            .split_once("\r\n\r\n")
            .map_or("", |(_, body)| body)
    }
}

#[derive(Default)]
struct Shared {
    messages: Mutex<Vec<ReceivedMessage>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    authentications: AtomicUsize,
    fail_noop: AtomicBool,
}

/// Fake SMTP server bound to an ephemeral port on 127.0.0.1.
///
/// Stops accepting when dropped. Sessions already open run until the client
/// disconnects.
///
/// # Example
///
/// ```rust,ignore
/// let server = FakeSmtpServer::start(ServerOptions::new()).await?;
/// let config = SmtpConfig::new()
///     .host("127.0.0.1")
///     .port(server.port())
///     .tls_mode(TlsMode::None);
/// ```
pub struct FakeSmtpServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl FakeSmtpServer {
    /// Bind and start accepting connections.
    pub async fn start(options: ServerOptions) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();

        tracing::debug!(%addr, "fake smtp server listening");

        let accept_shared = Arc::clone(&shared);
        let accept_shutdown = shutdown.clone();
        let options = Arc::new(options);
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };

                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "fake smtp accept failed");
                        continue;
                    }
                };

                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                let shared = Arc::clone(&accept_shared);
                let options = Arc::clone(&options);
                tokio::spawn(async move {
                    if let Err(e) = Session::new(stream, shared, options).run().await {
                        tracing::debug!(%peer, error = %e, "fake smtp session ended with error");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            shared,
            shutdown,
        })
    }

    /// Bound address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.shared.messages.lock().clone()
    }

    /// Every command line received, in order. AUTH payloads are recorded as `***`.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().clone()
    }

    /// How many times `verb` was received.
    #[must_use]
    pub fn command_count(&self, verb: &str) -> usize {
        self.shared
            .commands
            .lock()
            .iter()
            .filter(|line| {
                line.split_whitespace()
                    .next()
                    .is_some_and(|v| v.eq_ignore_ascii_case(verb))
            })
            .count()
    }

    /// TCP connections accepted so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Successful AUTH exchanges so far.
    #[must_use]
    pub fn authentications(&self) -> usize {
        self.shared.authentications.load(Ordering::SeqCst)
    }

    /// When set, NOOP is answered with 421 and the session is closed.
    pub fn set_fail_noop(&self, fail: bool) {
        self.shared.fail_noop.store(fail, Ordering::SeqCst);
    }

    /// Stop accepting new connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for FakeSmtpServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for FakeSmtpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeSmtpServer")
            .field("addr", &self.addr)
            .field("connections", &self.connections())
            .finish()
    }
}

/// Open mail transaction.
#[derive(Default)]
struct Transaction {
    from: Option<String>,
    recipients: Vec<String>,
}

enum Next {
    Continue,
    Close,
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    shared: Arc<Shared>,
    options: Arc<ServerOptions>,
    transaction: Transaction,
}

impl Session {
    fn new(stream: TcpStream, shared: Arc<Shared>, options: Arc<ServerOptions>) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
            shared,
            options,
            transaction: Transaction::default(),
        }
    }

    async fn run(mut self) -> io::Result<()> {
        let greeting = format!("220 {} ESMTP fake ready", self.options.hostname);
        self.reply(&greeting).await?;

        while let Some(line) = self.read_line().await? {
            let (verb, arg) = match line.split_once(' ') {
                Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim()),
                None => (line.to_ascii_uppercase(), ""),
            };

            let recorded = if verb == "AUTH" {
                let mechanism = arg.split_whitespace().next().unwrap_or_default();
                format!("AUTH {mechanism} ***")
            } else {
                line.clone()
            };
            self.shared.commands.lock().push(recorded);

            if let Next::Close = self.dispatch(&verb, arg).await? {
                break;
            }
        }

        let _ = self.writer.shutdown().await;
        Ok(())
    }

    async fn dispatch(&mut self, verb: &str, arg: &str) -> io::Result<Next> {
        match verb {
            "EHLO" if self.options.ehlo => self.ehlo().await?,
            "EHLO" => self.reply("502 5.5.1 EHLO not implemented").await?,
            "HELO" => {
                let reply = format!("250 {}", self.options.hostname);
                self.reply(&reply).await?;
            }
            "STARTTLS" => self.reply("454 4.7.0 TLS not available").await?,
            "AUTH" => self.auth(arg).await?,
            "MAIL" => self.mail(arg).await?,
            "RCPT" => self.rcpt(arg).await?,
            "DATA" => self.data().await?,
            "RSET" => {
                self.transaction = Transaction::default();
                self.reply("250 2.0.0 OK").await?;
            }
            "NOOP" if self.shared.fail_noop.load(Ordering::SeqCst) => {
                self.reply("421 4.3.0 service not available").await?;
                return Ok(Next::Close);
            }
            "NOOP" => self.reply("250 2.0.0 OK").await?,
            "QUIT" => {
                self.reply("221 2.0.0 bye").await?;
                return Ok(Next::Close);
            }
            _ => self.reply("502 5.5.2 command not recognized").await?,
        }
        Ok(Next::Continue)
    }

    async fn ehlo(&mut self) -> io::Result<()> {
        let mut lines = vec![self.options.hostname.clone(), "PIPELINING".to_string()];
        if !self.options.auth_mechanisms.is_empty() {
            lines.push(format!("AUTH {}", self.options.auth_mechanisms.join(" ")));
        }
        if self.options.starttls {
            lines.push("STARTTLS".to_string());
        }
        if let Some(limit) = self.options.size_limit {
            lines.push(format!("SIZE {limit}"));
        }
        lines.push("8BITMIME".to_string());

        let last = lines.len() - 1;
        let mut out = String::new();
        for (i, line) in lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            out.push_str(&format!("250{sep}{line}\r\n"));
        }
        self.writer.write_all(out.as_bytes()).await
    }

    async fn auth(&mut self, arg: &str) -> io::Result<()> {
        let mut parts = arg.split_whitespace();
        let mechanism = parts.next().unwrap_or_default().to_ascii_uppercase();
        let initial = parts.next().map(str::to_string);

        let offered = self
            .options
            .auth_mechanisms
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&mechanism));
        if !offered {
            return self.reply("504 5.5.4 mechanism not supported").await;
        }

        let credentials = match mechanism.as_str() {
            "PLAIN" => {
                let response = match initial {
                    Some(response) => response,
                    None => match self.challenge("").await? {
                        Some(response) => response,
                        None => return Ok(()),
                    },
                };
                decode(&response).and_then(|plain| {
                    let mut fields = plain.split('\0');
                    let _authzid = fields.next()?;
                    Some((fields.next()?.to_string(), fields.next()?.to_string()))
                })
            }
            "LOGIN" => {
                let username = match initial {
                    Some(username) => Some(username),
                    None => self.challenge("VXNlcm5hbWU6").await?,
                };
                let Some(username) = username else {
                    return Ok(());
                };
                let Some(password) = self.challenge("UGFzc3dvcmQ6").await? else {
                    return Ok(());
                };
                decode(&username).zip(decode(&password))
            }
            _ => None,
        };

        let accepted = match (&credentials, &self.options.credentials) {
            (Some(_), None) => true,
            (Some(given), Some(expected)) => given == expected,
            (None, _) => false,
        };

        if accepted {
            self.shared.authentications.fetch_add(1, Ordering::SeqCst);
            self.reply("235 2.7.0 authentication successful").await
        } else {
            self.reply("535 5.7.8 authentication credentials invalid").await
        }
    }

    /// Send a 334 challenge and read the response. `None` when the client
    /// cancelled with `*`, in which case 501 has already been sent.
    async fn challenge(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let line = if prompt.is_empty() {
            "334 ".to_string()
        } else {
            format!("334 {prompt}")
        };
        self.reply(&line).await?;

        let Some(response) = self.read_line().await? else {
            return Err(io::ErrorKind::UnexpectedEof.into());
        };
        if response == "*" {
            self.reply("501 5.7.0 authentication cancelled").await?;
            return Ok(None);
        }
        Ok(Some(response))
    }

    async fn mail(&mut self, arg: &str) -> io::Result<()> {
        let Some(rest) = strip_prefix_ignore_case(arg, "FROM:") else {
            return self.reply("501 5.5.4 syntax: MAIL FROM:<address>").await;
        };
        let Some((path, params)) = parse_path(rest) else {
            return self.reply("501 5.1.7 bad sender address syntax").await;
        };

        if let Some(limit) = self.options.size_limit {
            let declared = params
                .split_whitespace()
                .find_map(|p| strip_prefix_ignore_case(p, "SIZE="))
                .and_then(|v| v.parse::<usize>().ok());
            if declared.is_some_and(|size| size > limit) {
                return self.reply("552 5.3.4 message size exceeds fixed limit").await;
            }
        }

        self.transaction = Transaction {
            from: Some(path),
            recipients: Vec::new(),
        };
        self.reply("250 2.1.0 sender OK").await
    }

    async fn rcpt(&mut self, arg: &str) -> io::Result<()> {
        if self.transaction.from.is_none() {
            return self.reply("503 5.5.1 need MAIL before RCPT").await;
        }
        let Some((path, _)) = strip_prefix_ignore_case(arg, "TO:").and_then(parse_path) else {
            return self.reply("501 5.1.3 bad recipient address syntax").await;
        };

        if self
            .options
            .rejected_recipients
            .contains(&path.to_ascii_lowercase())
        {
            return self.reply("550 5.1.1 mailbox unavailable").await;
        }

        self.transaction.recipients.push(path);
        self.reply("250 2.1.5 recipient OK").await
    }

    async fn data(&mut self) -> io::Result<()> {
        if self.transaction.recipients.is_empty() {
            return self.reply("503 5.5.1 need RCPT before DATA").await;
        }
        self.reply("354 end data with <CR><LF>.<CR><LF>").await?;

        let mut data = String::new();
        loop {
            let Some(line) = self.read_line().await? else {
                return Err(io::ErrorKind::UnexpectedEof.into());
            };
            if line == "." {
                break;
            }
            let line = line.strip_prefix('.').unwrap_or(&line);
            data.push_str(line);
            data.push_str("\r\n");
        }

        let transaction = std::mem::take(&mut self.transaction);
        let queue_id = {
            let mut messages = self.shared.messages.lock();
            messages.push(ReceivedMessage {
                from: transaction.from.unwrap_or_default(),
                recipients: transaction.recipients,
                data,
            });
            messages.len()
        };

        self.reply(&format!("250 2.0.0 OK queued as {queue_id:08X}"))
            .await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        if self.reader.read_line(&mut buf).await? == 0 {
            return Ok(None);
        }
        let trimmed = buf.trim_end_matches(['\r', '\n']);
        Ok(Some(trimmed.to_string()))
    }

    async fn reply(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await
    }
}

fn decode(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Split `<path> params` into the address and the remaining parameters.
fn parse_path(value: &str) -> Option<(String, &str)> {
    let value = value.trim_start();
    let rest = value.strip_prefix('<')?;
    let (path, params) = rest.split_once('>')?;
    Some((path.to_string(), params.trim()))
}
