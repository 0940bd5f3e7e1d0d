//! Minimal relay for mailer tests: a fixed greeting and AUTH reply, every
//! other command accepted. The relay can also swallow a message without
//! ever answering it.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

#[derive(Clone)]
struct Replies {
    greeting: u16,
    auth: u16,
    answer_data: bool,
}

pub struct MockRelay {
    addr: SocketAddr,
    lines: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockRelay {
    /// A relay that accepts everything.
    pub async fn accepting() -> std::io::Result<Self> {
        Self::start(Replies {
            greeting: 220,
            auth: 235,
            answer_data: true,
        })
        .await
    }

    /// A relay that reads each message and then never replies.
    pub async fn silent_after_data() -> std::io::Result<Self> {
        Self::start(Replies {
            greeting: 220,
            auth: 235,
            answer_data: false,
        })
        .await
    }

    /// A relay that answers every connection with `code` instead of 220.
    pub async fn with_greeting(code: u16) -> std::io::Result<Self> {
        Self::start(Replies {
            greeting: code,
            auth: 235,
            answer_data: true,
        })
        .await
    }

    /// A relay that answers AUTH with `code`.
    pub async fn with_auth(code: u16) -> std::io::Result<Self> {
        Self::start(Replies {
            greeting: 220,
            auth: code,
            answer_data: true,
        })
        .await
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Every command line received, across all connections.
    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    async fn start(replies: Replies) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let lines = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let lines_clone = Arc::clone(&lines);
        let connections_clone = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                connections_clone.fetch_add(1, Ordering::Relaxed);
                let lines = Arc::clone(&lines_clone);
                let replies = replies.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, replies, lines).await;
                });
            }
        });

        Ok(Self {
            addr,
            lines,
            connections,
        })
    }
}

async fn handle(
    mut stream: TcpStream,
    replies: Replies,
    lines: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    writer
        .write_all(format!("{} mock.local\r\n", replies.greeting).as_bytes())
        .await?;
    if replies.greeting != 220 {
        return Ok(());
    }

    let mut in_data = false;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        if in_data {
            if line == ".\r\n" {
                in_data = false;
                if !replies.answer_data {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    return Ok(());
                }
                writer.write_all(b"250 Queued\r\n").await?;
            }
            continue;
        }

        let command = line.trim_end().to_string();
        lines.lock().await.push(command.clone());
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();

        let reply = match verb.as_str() {
            "EHLO" => "250-mock.local\r\n250 AUTH PLAIN\r\n".to_string(),
            "AUTH" => format!("{} Auth\r\n", replies.auth),
            "DATA" => {
                in_data = true;
                "354 Go ahead\r\n".to_string()
            }
            "QUIT" => {
                writer.write_all(b"221 Bye\r\n").await?;
                return Ok(());
            }
            _ => "250 OK\r\n".to_string(),
        };
        writer.write_all(reply.as_bytes()).await?;
    }
}
