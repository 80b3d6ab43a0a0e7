// crates/command-gate-gateway/src/stdio.rs
// ============================================================================
// Module: Stdio Message Channel
// Description: JSON-lines message channel over process stdin/stdout.
// Purpose: Host the gateway behind a pipe for local integrations and tests.
// Dependencies: tokio, serde_json
// ============================================================================

//! ## Overview
//! Each stdin line is a JSON object `{"origin", "source", "data"}`. Replies
//! are written to stdout as one JSON document per line. Lines that fail to
//! parse are reported on stderr and skipped. The event stream ends when
//! stdin reaches end of file.
//!
//! The line handling is generic over any async reader and writer so it can
//! be driven from in-memory buffers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::ChannelError;
use crate::channel::ChannelEvent;
use crate::channel::MessageChannel;
use crate::channel::Responder;
use crate::channel::SourceId;
use crate::channel::Subscription;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted line length in bytes.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Line Codec
// ============================================================================

/// Parses one input line into `(origin, source, data)`.
///
/// # Errors
///
/// Returns [`ChannelError::Io`] when the line is not a valid frame.
pub fn parse_line(line: &str) -> Result<(String, SourceId, Value), ChannelError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ChannelError::Io("line exceeds size limit".to_string()));
    }
    let frame: Value =
        serde_json::from_str(line).map_err(|err| ChannelError::Io(format!("invalid json: {err}")))?;
    let Some(object) = frame.as_object() else {
        return Err(ChannelError::Io("frame must be an object".to_string()));
    };
    let origin = object
        .get("origin")
        .and_then(Value::as_str)
        .ok_or_else(|| ChannelError::Io("frame origin must be a string".to_string()))?;
    let source = match object.get("source") {
        Some(Value::String(source)) => source.clone(),
        Some(Value::Number(source)) => source.to_string(),
        None | Some(Value::Null) => "stdio".to_string(),
        Some(_) => return Err(ChannelError::Io("frame source must be a string".to_string())),
    };
    let data = object.get("data").cloned().unwrap_or(Value::Null);
    Ok((origin.to_string(), SourceId::new(source), data))
}

/// Responder that forwards replies to the writer task.
struct LineResponder {
    /// Outbound line queue.
    lines: mpsc::UnboundedSender<String>,
}

impl Responder for LineResponder {
    fn respond(&self, message: Value) {
        if let Ok(line) = serde_json::to_string(&message) {
            let _ = self.lines.send(line);
        }
    }
}

/// Reads frames from `reader` and forwards them as channel events.
async fn pump_lines<R>(reader: R, events: mpsc::UnboundedSender<ChannelEvent>, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let responder: Arc<dyn Responder> = Arc::new(LineResponder {
        lines,
    });
    let mut input = BufReader::new(reader).lines();
    while let Ok(Some(line)) = input.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok((origin, source, data)) => {
                let event = ChannelEvent {
                    data,
                    origin,
                    source,
                    responder: Arc::clone(&responder),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = writeln!(std::io::stderr(), "command-gate: skipped input line: {err}");
            }
        }
    }
}

/// Writes queued reply lines to `writer`.
async fn drain_lines<W>(mut writer: W, mut lines: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err()
            || writer.write_all(b"\n").await.is_err()
            || writer.flush().await.is_err()
        {
            break;
        }
    }
}

// ============================================================================
// SECTION: Channel
// ============================================================================

/// Reader and writer pair consumed on subscription.
type Streams<R, W> = Mutex<Option<(R, W)>>;

/// JSON-lines channel over an async reader/writer pair.
pub struct LinesChannel<R, W> {
    /// Streams, taken by the first subscription.
    streams: Streams<R, W>,
    /// Writer task, present once subscribed.
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

/// Channel over process stdin/stdout.
pub type StdioChannel = LinesChannel<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioChannel {
    /// Creates a channel over the process streams.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> LinesChannel<R, W> {
    /// Creates a channel over the given streams.
    #[must_use]
    pub const fn new(reader: R, writer: W) -> Self {
        Self {
            streams: Mutex::new(Some((reader, writer))),
            writer_task: Mutex::new(None),
        }
    }

    /// Waits until every queued reply has been written.
    ///
    /// Resolves once the input has ended and every event's responder has
    /// been dropped.
    pub async fn flushed(&self) {
        let task = self.writer_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl<R, W> MessageChannel for LinesChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn subscribe(
        &self,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<Box<dyn Subscription>, ChannelError> {
        let Some((reader, writer)) = self.streams.lock().unwrap_or_else(PoisonError::into_inner).take()
        else {
            return Err(ChannelError::Subscribe("lines channel supports one subscriber".to_string()));
        };
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(pump_lines(reader, events, line_tx));
        let writer_task = tokio::spawn(drain_lines(writer, line_rx));
        *self.writer_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer_task);
        Ok(Box::new(LinesSubscription {
            reader_task,
        }))
    }
}

/// Subscription handle for [`LinesChannel`].
struct LinesSubscription {
    /// Input pump.
    reader_task: JoinHandle<()>,
}

impl Subscription for LinesSubscription {
    fn unsubscribe(self: Box<Self>) {
        self.reader_task.abort();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
