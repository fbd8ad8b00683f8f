//! Server-sent events listener for the recent-change stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::ChangeListener;
use crate::error::{MonitorError, Result};
use crate::metrics::IngestMetrics;
use crate::recentchanges::{ListenOptions, Source, SourceEvent, SseChangeEvent};

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: String,
}

/// Incremental decoder for the `text/event-stream` framing.
///
/// Chunks may split lines anywhere; complete lines are processed as they
/// arrive and a blank line dispatches the accumulated frame.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            id: self.id.clone(),
            data,
        })
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An open event stream yielding decoded frames.
pub struct SseConnection {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
}

impl SseConnection {
    pub fn from_stream<S>(body: S) -> Self
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next frame, or `None` once the server closes the stream.
    pub async fn next_frame(&mut self) -> Result<Option<SseFrame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.pending.extend(self.decoder.push(&chunk));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Listener for the JSON recent-change stream
pub struct SseListener {
    client: reqwest::Client,
    stream_url: String,
}

impl SseListener {
    pub fn new(stream_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            stream_url: stream_url.into(),
        })
    }

    /// Stream URL with `hidebots=1` applied when bots are hidden.
    pub fn subscription_url(&self, hidebots: bool) -> Result<Url> {
        let mut url = Url::parse(&self.stream_url).map_err(|e| {
            MonitorError::Config(format!("invalid stream url '{}': {}", self.stream_url, e))
        })?;
        if hidebots {
            url.query_pairs_mut().append_pair("hidebots", "1");
        }
        Ok(url)
    }

    pub async fn connect(&self, hidebots: bool) -> Result<SseConnection> {
        let url = self.subscription_url(hidebots)?;
        info!(url = %url, "Subscribing to stream");
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| MonitorError::Connect {
                message: format!("stream connect failed: {}", e),
            })?;
        Ok(SseConnection::from_stream(resp.bytes_stream()))
    }
}

#[async_trait]
impl ChangeListener for SseListener {
    fn source(&self) -> Source {
        Source::Sse
    }

    async fn listen(
        &self,
        options: &ListenOptions,
        events: mpsc::Sender<SourceEvent>,
    ) -> Result<()> {
        let mut conn = self.connect(options.hidebots).await?;
        forward_frames(&mut conn, options, &events).await
    }
}

/// Decode frames into stream events and push the admitted ones.
pub async fn forward_frames(
    conn: &mut SseConnection,
    options: &ListenOptions,
    events: &mpsc::Sender<SourceEvent>,
) -> Result<()> {
    while let Some(frame) = conn.next_frame().await? {
        if frame.data.trim().is_empty() {
            continue;
        }
        IngestMetrics::record_received(Source::Sse);

        let rc = match SseChangeEvent::from_json(frame.data.as_bytes()) {
            Ok(rc) => rc,
            Err(e) => {
                IngestMetrics::record_decode_error(Source::Sse);
                warn!(error = %e, data = %frame.data, "There was an error decoding");
                continue;
            }
        };

        if !options.admits_sse(&rc) {
            debug!(wiki = %rc.wiki, bot = rc.bot, "Skipping change outside listen options");
            continue;
        }

        if events.send(SourceEvent::Sse(rc)).await.is_err() {
            return Ok(());
        }
    }

    Err(MonitorError::Connection {
        message: "event stream closed by server".to_string(),
    })
}
