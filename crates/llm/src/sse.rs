//! SSE Text Pump
//!
//! Reads a streaming HTTP response line by line, runs each line through a
//! provider's `StreamAdapter`, and forwards text deltas to a channel.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use taskforge_core::streaming::{StreamAdapter, StreamEvent};

use crate::http_client::network_error;
use crate::provider::stream_error;
use crate::types::{LlmError, LlmResult};

/// What to do after one adapted line.
enum Flow {
    Continue,
    Stop,
}

/// Forward text deltas from `response` to `tx` until the stream ends, the
/// backend signals completion, the receiver goes away, or `cancel` fires.
pub(crate) async fn forward_text(
    cancel: &CancellationToken,
    response: reqwest::Response,
    adapter: &mut dyn StreamAdapter,
    tx: &mpsc::Sender<String>,
    provider: &'static str,
) -> LlmResult<()> {
    let mut stream = response.bytes_stream();
    // Bytes, not String: a chunk boundary may split a UTF-8 sequence.
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        buffer.extend_from_slice(&chunk.map_err(network_error)?);

        while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Flow::Stop = handle_line(cancel, &line, adapter, tx, provider).await? {
                return Ok(());
            }
        }
    }

    if !buffer.is_empty() {
        let line = String::from_utf8_lossy(&buffer).into_owned();
        handle_line(cancel, &line, adapter, tx, provider).await?;
    }
    debug!(provider, "Stream ended without completion signal");
    Ok(())
}

async fn handle_line(
    cancel: &CancellationToken,
    line: &str,
    adapter: &mut dyn StreamAdapter,
    tx: &mpsc::Sender<String>,
    provider: &'static str,
) -> LlmResult<Flow> {
    let events = adapter
        .adapt(line)
        .map_err(|e| LlmError::MalformedResponse {
            message: format!("{}: {}", provider, e),
        })?;

    for event in events {
        match event {
            StreamEvent::TextDelta { content } => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    sent = tx.send(content) => sent,
                };
                if sent.is_err() {
                    debug!(provider, "Stream receiver dropped");
                    return Ok(Flow::Stop);
                }
            }
            StreamEvent::Error { message, code } => {
                return Err(stream_error(code.as_deref(), &message, provider));
            }
            StreamEvent::Complete { .. } => return Ok(Flow::Stop),
            _ => {}
        }
    }
    Ok(Flow::Continue)
}
