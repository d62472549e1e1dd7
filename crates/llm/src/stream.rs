//! Streaming Text Generation
//!
//! `generate_code_stream` runs a provider's `stream_text` on its own task
//! and hands back the receiving ends of a text channel and an error
//! channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::provider::LlmProvider;
use crate::types::{LlmError, PromptData};

/// Capacity of the text channel
pub const TEXT_CHANNEL_CAPACITY: usize = 100;

/// Receiving side of a streamed generation.
///
/// `text` yields chunks in order and closes when the producer finishes.
/// `error` yields at most one failure; it closes without a value on
/// success or cancellation.
#[derive(Debug)]
pub struct TextStream {
    pub text: mpsc::Receiver<String>,
    pub error: mpsc::Receiver<LlmError>,
}

impl TextStream {
    /// Drain the stream into one string, or return the first error.
    pub async fn collect(mut self) -> Result<String, LlmError> {
        let mut out = String::new();
        while let Some(chunk) = self.text.recv().await {
            out.push_str(&chunk);
        }
        match self.error.recv().await {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

/// Start a streamed generation on a background task.
pub fn generate_code_stream(
    provider: Arc<dyn LlmProvider>,
    cancel: CancellationToken,
    prompt: PromptData,
) -> TextStream {
    let (text_tx, text_rx) = mpsc::channel(TEXT_CHANNEL_CAPACITY);
    let (error_tx, error_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let result = provider.stream_text(&cancel, &prompt, &text_tx).await;
        drop(text_tx);

        match result {
            Ok(()) => debug!(provider = provider.name(), "Stream finished"),
            Err(LlmError::Cancelled) => debug!(provider = provider.name(), "Stream cancelled"),
            Err(_) if cancel.is_cancelled() => {
                debug!(provider = provider.name(), "Stream error after cancellation dropped")
            }
            Err(err) => {
                let _ = error_tx.send(err).await;
            }
        }
    });

    TextStream {
        text: text_rx,
        error: error_rx,
    }
}
