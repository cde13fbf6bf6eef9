//! Status channel: the transport behind the watcher.
//!
//! `SseChannel` reads a server-sent-event stream at
//! `{stream_url}/{topic}`. Each event is an optional `event:` line plus one
//! or more `data:` lines terminated by a blank line. Lines starting with `:`
//! are keep-alives.

use std::sync::RwLock;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;

use super::events::{ChannelSignal, StreamEvent, Topic};
use crate::api::ApiError;

#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Streams events for `topic` into `sender` until the stream ends.
    ///
    /// Sends `ChannelSignal::Open` once the stream is established. Returns
    /// `Ok(())` when the server closes the stream or the receiver is dropped.
    async fn subscribe(&self, topic: &Topic, sender: Sender<ChannelSignal>) -> Result<(), ApiError>;
}

/// One dispatched SSE message.
#[derive(Debug, Clone, PartialEq)]
pub struct SseMessage {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE line decoder. Feed it raw chunks in arrival order.
///
/// Bytes are buffered until a full line arrives, so multi-byte characters
/// split across chunks decode intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    messages.push(SseMessage {
                        event: self.event.take(),
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                self.event = None;
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => debug!("Ignoring SSE field '{}'", field),
            }
        }
        messages
    }
}

pub struct SseChannel {
    stream_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl SseChannel {
    /// No request timeout: the stream is expected to stay open.
    pub fn new(stream_url: &str) -> Self {
        Self {
            stream_url: stream_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(_) => warn!("Token lock poisoned; token not updated"),
        }
    }
}

#[async_trait]
impl StatusChannel for SseChannel {
    async fn subscribe(&self, topic: &Topic, sender: Sender<ChannelSignal>) -> Result<(), ApiError> {
        let url = format!("{}/{}", self.stream_url, topic.path());
        info!("Subscribing to {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(token) = self.token.read().ok().and_then(|t| t.clone()) {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Stream error: {} - {}", status, body);
            return Err(ApiError::Api {
                status,
                message: body,
            });
        }

        if sender.send(ChannelSignal::Open).await.is_err() {
            return Ok(());
        }

        let mut decoder = SseDecoder::default();
        let mut event_count = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for message in decoder.push(&chunk) {
                match StreamEvent::decode(message.event.as_deref(), &message.data) {
                    Ok(event) => {
                        event_count += 1;
                        if sender.send(ChannelSignal::Event(event)).await.is_err() {
                            debug!("Subscriber for {} went away", topic);
                            return Ok(());
                        }
                    }
                    Err(e) => debug!("Skipping undecodable event {:?}: {}", message.event, e),
                }
            }
        }

        info!("Stream {} closed after {} events", topic, event_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: ride.status\nda").is_empty());
        let messages = decoder.push(b"ta: {\"a\":1}\n\n");
        assert_eq!(
            messages,
            vec![SseMessage { event: Some("ride.status".into()), data: "{\"a\":1}".into() }]
        );
    }

    #[test]
    fn test_decoder_keeps_characters_split_across_chunks() {
        let payload = "data: {\"riderName\":\"José\"}\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&payload[..split]).is_empty());
        let messages = decoder.push(&payload[split..]);
        assert_eq!(
            messages,
            vec![SseMessage { event: None, data: "{\"riderName\":\"José\"}".into() }]
        );
    }

    #[test]
    fn test_decoder_joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let messages = decoder.push(b": keep-alive\r\ndata: one\r\ndata:two\r\n\r\n");
        assert_eq!(messages, vec![SseMessage { event: None, data: "one\ntwo".into() }]);
    }

    #[test]
    fn test_decoder_resets_event_name_between_messages() {
        let mut decoder = SseDecoder::default();
        let messages = decoder.push(b"event: a\ndata: 1\n\ndata: 2\n\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].event, None);
    }
}
