//! IRC listener for the recent-change broadcast channels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::ChangeListener;
use crate::constants::DEFAULT_IRC_ADDR;
use crate::error::{MonitorError, Result};
use crate::metrics::IngestMetrics;
use crate::recentchanges::irc::{parse_line, strip_control_codes};
use crate::recentchanges::{ListenOptions, Source, SourceEvent};

/// Connection and registration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcOptions {
    pub addr: String,
    pub nick: String,
    pub pass: String,
    pub user: String,
    pub name: String,
}

impl Default for IrcOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_IRC_ADDR.to_string(),
            nick: "just_here_for_fun".to_string(),
            pass: String::new(),
            user: "wikiedit".to_string(),
            name: "Wikiedit Monitor".to_string(),
        }
    }
}

/// A single IRC protocol message: `[:prefix] COMMAND params... [:trailing]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, tail) = stripped.split_once(' ')?;
                rest = tail;
                Some(prefix.to_string())
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split(' ').filter(|w| !w.is_empty());
        let command = words.next()?.to_string();
        let mut params: Vec<String> = words.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// True for messages addressed to a channel rather than to us
    pub fn is_channel_message(&self) -> bool {
        self.command == "PRIVMSG"
            && self
                .params
                .first()
                .map(|target| target.starts_with('#'))
                .unwrap_or(false)
    }
}

pub struct IrcListener {
    options: IrcOptions,
}

impl IrcListener {
    pub fn new(options: IrcOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ChangeListener for IrcListener {
    fn source(&self) -> Source {
        Source::Irc
    }

    async fn listen(
        &self,
        options: &ListenOptions,
        events: mpsc::Sender<SourceEvent>,
    ) -> Result<()> {
        info!(addr = %self.options.addr, "Listening");
        let stream = TcpStream::connect(&self.options.addr)
            .await
            .map_err(|e| MonitorError::Connect {
                message: format!("irc connect to {} failed: {}", self.options.addr, e),
            })?;
        let (reader, writer) = stream.into_split();
        run_session(BufReader::new(reader), writer, &self.options, options, &events).await
    }
}

async fn send_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Register, join the wiki channels on welcome, and forward recent changes.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    irc: &IrcOptions,
    options: &ListenOptions,
    events: &mpsc::Sender<SourceEvent>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !irc.pass.is_empty() {
        send_line(&mut writer, &format!("PASS {}", irc.pass)).await?;
    }
    send_line(&mut writer, &format!("NICK {}", irc.nick)).await?;
    send_line(&mut writer, &format!("USER {} 0 * :{}", irc.user, irc.name)).await?;

    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            return Err(MonitorError::Connection {
                message: "irc connection closed by server".to_string(),
            });
        }

        let line = String::from_utf8_lossy(&raw);
        let message = strip_control_codes(line.trim_end_matches(['\r', '\n'])).into_owned();
        let Some(parsed) = IrcMessage::parse(&message) else {
            continue;
        };

        match parsed.command.as_str() {
            // 001 is the welcome reply; channels can be joined from here on
            "001" => {
                let channels = options.irc_channels();
                info!(channels = ?channels, "Joining channels");
                for channel in channels {
                    send_line(&mut writer, &format!("JOIN {}", channel)).await?;
                }
            }
            "PING" => {
                let token = parsed.params.last().cloned().unwrap_or_default();
                send_line(&mut writer, &format!("PONG :{}", token)).await?;
            }
            _ if parsed.is_channel_message() => {
                debug!(data = %message, "Received data");
                let Some(rc) = parse_line(&message) else {
                    continue;
                };
                IngestMetrics::record_received(Source::Irc);
                if !options.admits_irc(&rc) {
                    continue;
                }
                if events.send(SourceEvent::Irc(rc)).await.is_err() {
                    return Ok(());
                }
            }
            _ => {
                debug!(command = %parsed.command, "Ignoring message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_parse_message_with_prefix_and_trailing() {
        let msg = IrcMessage::parse(":rc!~rc@host PRIVMSG #en.wikipedia :[[A]] hello\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("rc!~rc@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#en.wikipedia", "[[A]] hello"]);
        assert!(msg.is_channel_message());
    }

    #[test]
    fn test_parse_numeric_and_ping() {
        let welcome = IrcMessage::parse(":server 001 nick :Welcome").unwrap();
        assert_eq!(welcome.command, "001");
        assert!(!welcome.is_channel_message());

        let ping = IrcMessage::parse("PING :abc123").unwrap();
        assert_eq!(ping.prefix, None);
        assert_eq!(ping.params, vec!["abc123"]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connect_error() {
        // grab a free port, then close it so the connect is refused
        let addr = {
            let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            socket.local_addr().unwrap()
        };
        let listener = IrcListener::new(IrcOptions {
            addr: addr.to_string(),
            ..IrcOptions::default()
        });
        let (tx, _rx) = mpsc::channel(1);

        let result = listener.listen(&ListenOptions::default(), tx).await;
        assert!(matches!(result, Err(MonitorError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_session_joins_and_forwards() {
        let feed = concat!(
            ":server 001 nick :Welcome\r\n",
            "PING :tok\r\n",
            ":rc!~rc@host PRIVMSG #en.wikipedia :\x0314[[\x0307Example\x0314]]\x034 N\x0310 \x0302https://en.wikipedia.org/w/index.php?diff=111&oldid=100&rcid=5\x03 \x035*\x03 \x0303Alice\x03 \x035*\x03 (+20) \x0310fixed typo\x03\r\n",
            ":rc!~rc@host PRIVMSG #en.wikipedia :[[Botty]] B https://en.wikipedia.org/w/index.php?diff=3&oldid=2 * Bot * (+1) auto\r\n",
            ":rc!~rc@host NOTICE nick :not a change\r\n",
        );
        let (out_writer, mut out_reader) = tokio::io::duplex(4096);
        let (tx, mut rx) = mpsc::channel(8);
        let irc = IrcOptions {
            pass: "secret".to_string(),
            ..IrcOptions::default()
        };

        let result = run_session(
            BufReader::new(feed.as_bytes()),
            out_writer,
            &irc,
            &ListenOptions::default(),
            &tx,
        )
        .await;
        assert!(matches!(result, Err(MonitorError::Connection { .. })));

        let mut written = String::new();
        out_reader.read_to_string(&mut written).await.unwrap();
        assert!(written.starts_with("PASS secret\r\nNICK just_here_for_fun\r\nUSER wikiedit 0 * :Wikiedit Monitor\r\n"));
        assert!(written.contains("JOIN #en.wikipedia\r\n"));
        assert!(written.contains("PONG :tok\r\n"));

        match rx.recv().await {
            Some(SourceEvent::Irc(rc)) => {
                assert_eq!(rc.page, "Example");
                assert_eq!(rc.user, "Alice");
                assert_eq!(rc.flags, "N");
            }
            other => panic!("unexpected event {:?}", other),
        }
        // the bot edit is hidden by default
        assert!(rx.try_recv().is_err());
    }
}
