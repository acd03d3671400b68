//! Server-Sent Events stream handling for A2A streaming responses.
//!
//! Parses SSE `data:` lines from an HTTP response into typed
//! [`StreamEvent`]s. Handles both wire shapes the protocol produces:
//! raw events (the task-subscribe route) and JSON-RPC-wrapped events
//! (the streaming RPC route, where every response reuses the original
//! request id). Malformed `data:` lines are skipped silently.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{SwarmlinkError, SwarmlinkResult};
use crate::types::StreamEvent;

/// A stream of A2A server-sent events.
///
/// Supports both pull-based (`next()`) and `futures::Stream` consumption.
/// The stream terminates when the server closes the connection or the
/// final event has been delivered; dropping it cancels the read loop.
pub struct SseStream {
    receiver: mpsc::Receiver<SwarmlinkResult<StreamEvent>>,
    /// Background parser task — aborted when the stream is dropped.
    task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for SseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream").finish_non_exhaustive()
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl SseStream {
    /// Create an `SseStream` from a raw `reqwest::Response`.
    ///
    /// Spawns a background task that reads the body as SSE lines and
    /// sends parsed events through a channel.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            if let Err(e) = parse_sse_stream(response, &tx).await {
                // Transport failures end the stream with a final error.
                let _ = tx.send(Err(e)).await;
            }
        });

        Self { receiver: rx, task }
    }

    /// Get the next event from the stream.
    ///
    /// Returns `None` when the stream is exhausted. `Some(Err(...))`
    /// carries transport errors or JSON-RPC error payloads sent by the
    /// server.
    pub async fn next(&mut self) -> Option<SwarmlinkResult<StreamEvent>> {
        self.receiver.recv().await
    }
}

impl Stream for SseStream {
    type Item = SwarmlinkResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Read the response body line by line, forwarding parsed events to `tx`.
async fn parse_sse_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<SwarmlinkResult<StreamEvent>>,
) -> SwarmlinkResult<()> {
    use futures::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result
            .map_err(|e| SwarmlinkError::Transport(format!("error reading SSE stream: {e}")))?;

        let text = std::str::from_utf8(&chunk)
            .map_err(|e| SwarmlinkError::Transport(format!("invalid UTF-8 in SSE stream: {e}")))?;

        buffer.push_str(text);

        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer = buffer[newline_pos + 1..].to_string();

            match parse_sse_line(&line) {
                Ok(Some(event)) => {
                    if tx.send(Ok(event)).await.is_err() {
                        // Receiver dropped — stop parsing.
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(err @ SwarmlinkError::RpcError { .. }) => {
                    // A JSON-RPC error payload ends the stream.
                    let _ = tx.send(Err(err)).await;
                    return Ok(());
                }
                Err(_) => {
                    // Malformed data line — skip silently.
                    debug!(line = %line, "skipping malformed SSE line");
                }
            }
        }
    }

    if !buffer.trim().is_empty() {
        if let Ok(Some(event)) = parse_sse_line(buffer.trim()) {
            let _ = tx.send(Ok(event)).await;
        }
    }

    Ok(())
}

/// Parse a single SSE line.
///
/// Returns `Some(event)` for well-formed `data:` lines, `None` for
/// comments, empty lines, and non-data fields. A JSON-RPC error payload
/// surfaces as `Err(RpcError)`; anything else unparseable is an error the
/// caller downgrades to a skip.
fn parse_sse_line(line: &str) -> SwarmlinkResult<Option<StreamEvent>> {
    if line.is_empty() {
        return Ok(None);
    }

    // Comments (":") are keep-alive signals.
    if line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        // Other SSE fields (event:, id:, retry:) — ignore.
        return Ok(None);
    };

    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| SwarmlinkError::parse_error(format!("bad SSE data line: {e}")))?;

    // JSON-RPC wrapper: extract `result`, surface `error`.
    let event_value = if value.get("jsonrpc").is_some() {
        if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string();
            warn!(code, "JSON-RPC error on SSE stream");
            return Err(SwarmlinkError::RpcError { code, message });
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| SwarmlinkError::parse_error("JSON-RPC SSE frame has no result"))?
    } else {
        value
    };

    let event: StreamEvent = serde_json::from_value(event_value)
        .map_err(|e| SwarmlinkError::parse_error(format!("bad stream event: {e}")))?;

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_comment_lines_are_skipped() {
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(": keepalive").unwrap().is_none());
        assert!(parse_sse_line("data:").unwrap().is_none());
        assert!(parse_sse_line("retry: 5000").unwrap().is_none());
    }

    #[test]
    fn raw_event_parses() {
        let line = r#"data: {"type":"status-update","taskId":"t1","status":{"state":"working"},"final":false}"#;
        let event = parse_sse_line(line).unwrap().unwrap();
        assert_eq!(event.task_id(), "t1");
        assert!(!event.is_final());
    }

    #[test]
    fn json_rpc_wrapped_event_parses() {
        let line = r#"data: {"jsonrpc":"2.0","id":1,"result":{"type":"status-update","taskId":"t1","status":{"state":"completed"},"final":true}}"#;
        let event = parse_sse_line(line).unwrap().unwrap();
        assert!(event.is_final());
    }

    #[test]
    fn json_rpc_error_surfaces() {
        let line = r#"data: {"jsonrpc":"2.0","id":1,"error":{"code":-32001,"message":"Task not found"}}"#;
        let err = parse_sse_line(line).unwrap_err();
        assert!(matches!(err, SwarmlinkError::RpcError { code: -32001, .. }));
    }

    #[test]
    fn malformed_data_is_an_error_for_the_caller_to_skip() {
        assert!(parse_sse_line("data: {not json}").is_err());
        assert!(parse_sse_line(r#"data: {"type":"mystery"}"#).is_err());
    }
}
