//! Turns a vendor byte stream into a `ChatStream`
//!
//! Vendors only differ in framing and event shape; accounting, chunk
//! numbering and termination live here.

use std::collections::VecDeque;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;

use super::error_mapping::{CallKind, VendorErrors};
use super::framing::{JsonObjectScanner, LineDecoder, sse_data};
use super::http_client::ByteStream;
use crate::domain::usage::estimate_usage;
use crate::domain::{ChatStream, CostTable, LlmError, StreamChunk, Usage};

/// Token counts reported by the vendor, possibly split across events
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ReportedUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl ReportedUsage {
    fn merge(&mut self, other: ReportedUsage) {
        self.input_tokens = other.input_tokens.or(self.input_tokens);
        self.output_tokens = other.output_tokens.or(self.output_tokens);
        self.total_tokens = other.total_tokens.or(self.total_tokens);
    }

    fn is_reported(&self) -> bool {
        self.input_tokens.is_some() || self.output_tokens.is_some() || self.total_tokens.is_some()
    }

    fn to_usage(self) -> Usage {
        let input = self.input_tokens.unwrap_or(0);
        let output = self.output_tokens.unwrap_or(0);
        match self.total_tokens {
            Some(total) => Usage::with_total(input, output, total),
            None => Usage::new(input, output),
        }
    }
}

/// What one decoded vendor event contributes to the stream
#[derive(Debug, Clone, Default)]
pub(crate) struct StreamEvent {
    pub delta: Option<String>,
    pub usage: Option<ReportedUsage>,
    pub model: Option<String>,
    pub done: bool,
    /// Vendor-reported failure; ends the stream without a final chunk
    pub error: Option<LlmError>,
}

impl StreamEvent {
    pub(crate) fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: Some(text.into()),
            ..Self::default()
        }
    }

    pub(crate) fn done() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    pub(crate) fn error(error: LlmError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Framing plus event decoding for one vendor's streaming body
pub(crate) trait StreamDecoder: Send + 'static {
    /// Feed raw bytes, returning the events they complete in order
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent>;

    /// Flush buffered input once the body has ended
    fn finish(&mut self) -> Vec<StreamEvent>;
}

/// SSE body where every `data:` line is one event
pub(crate) struct SseDecoder<F> {
    lines: LineDecoder,
    parse: F,
}

impl<F> SseDecoder<F>
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    pub(crate) fn new(parse: F) -> Self {
        Self {
            lines: LineDecoder::new(),
            parse,
        }
    }

    fn handle(&mut self, line: &str) -> Vec<StreamEvent> {
        match sse_data(line) {
            Some(data) => (self.parse)(data),
            None => Vec::new(),
        }
    }
}

impl<F> StreamDecoder for SseDecoder<F>
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.lines
            .feed(bytes)
            .iter()
            .flat_map(|line| self.handle(line))
            .collect()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        match self.lines.finish() {
            Some(line) => self.handle(&line),
            None => Vec::new(),
        }
    }
}

/// Body made of top-level JSON objects (JSONL or one JSON array)
pub(crate) struct JsonObjectDecoder<F> {
    scanner: JsonObjectScanner,
    parse: F,
}

impl<F> JsonObjectDecoder<F>
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    pub(crate) fn new(parse: F) -> Self {
        Self {
            scanner: JsonObjectScanner::new(),
            parse,
        }
    }
}

impl<F> StreamDecoder for JsonObjectDecoder<F>
where
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let objects = self.scanner.feed(bytes);
        objects.iter().flat_map(|o| (self.parse)(o)).collect()
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.scanner.has_partial() {
            tracing::warn!("Stream body ended inside a JSON object, discarding it");
        }
        if self.scanner.discarded() > 0 {
            tracing::warn!(
                discarded = self.scanner.discarded(),
                "Broken JSON objects were skipped in stream"
            );
        }
        Vec::new()
    }
}

/// Decode one framed payload, logging and skipping it when malformed
pub(crate) fn decode_event<T: DeserializeOwned>(provider: &str, data: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                provider = provider,
                error = %e,
                "Skipping malformed stream event"
            );
            None
        }
    }
}

/// Per-call facts the stream needs to finish its accounting
#[derive(Debug, Clone)]
pub(crate) struct StreamContext {
    pub errors: VendorErrors,
    pub model: String,
    pub input_chars: usize,
    pub cost: CostTable,
    pub started: Instant,
}

struct DriverState<D> {
    body: Option<ByteStream>,
    decoder: D,
    ctx: StreamContext,
    pending: VecDeque<Result<StreamChunk, LlmError>>,
    reported: ReportedUsage,
    output_chars: usize,
    next_index: u32,
    finished: bool,
}

impl<D: StreamDecoder> DriverState<D> {
    fn absorb(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            if self.finished {
                return;
            }

            if let Some(model) = event.model {
                if !model.is_empty() {
                    self.ctx.model = model;
                }
            }

            if let Some(usage) = event.usage {
                self.reported.merge(usage);
            }

            if let Some(delta) = event.delta.filter(|d| !d.is_empty()) {
                self.output_chars += delta.chars().count();
                self.pending.push_back(Ok(StreamChunk::delta(
                    delta,
                    self.ctx.model.clone(),
                    self.ctx.errors.provider,
                    self.next_index,
                )));
                self.next_index += 1;
            }

            if let Some(error) = event.error {
                tracing::error!(
                    provider = self.ctx.errors.provider,
                    error = %error,
                    "Vendor reported an error mid-stream"
                );
                self.fail(error);
            } else if event.done {
                self.finish();
            }
        }
    }

    fn finish(&mut self) {
        let usage = if self.reported.is_reported() {
            self.reported.to_usage()
        } else {
            estimate_usage(self.ctx.input_chars, self.output_chars)
        };
        let cost = self.ctx.cost.cost_for(&usage);
        let elapsed = self.ctx.started.elapsed().as_millis() as u64;

        tracing::info!(
            provider = self.ctx.errors.provider,
            model = %self.ctx.model,
            chunks = self.next_index,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            estimated = !self.reported.is_reported(),
            response_time_ms = elapsed,
            "Stream completed"
        );

        self.pending.push_back(Ok(StreamChunk::terminal(
            self.ctx.model.clone(),
            self.ctx.errors.provider,
            self.next_index,
            usage,
            cost,
            elapsed,
        )));
        self.finished = true;
        self.body = None;
    }

    fn fail(&mut self, error: LlmError) {
        self.pending.push_back(Err(error));
        self.finished = true;
        self.body = None;
    }
}

/// Drive `body` through `decoder`, ending with exactly one final chunk
///
/// A transport failure mid-stream is yielded as an error and ends the
/// stream without a final chunk. Dropping the returned stream drops the
/// body and with it the connection.
pub(crate) fn drive<D: StreamDecoder>(
    body: ByteStream,
    decoder: D,
    ctx: StreamContext,
) -> ChatStream {
    let state = DriverState {
        body: Some(body),
        decoder,
        ctx,
        pending: VecDeque::new(),
        reported: ReportedUsage::default(),
        output_chars: 0,
        next_index: 0,
        finished: false,
    };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }

            if state.finished {
                return None;
            }

            let next = match state.body.as_mut() {
                Some(body) => body.next().await,
                None => None,
            };

            match next {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(&bytes);
                    state.absorb(events);
                }
                Some(Err(e)) => {
                    let error = state.ctx.errors.from_transport(CallKind::Streaming, e);
                    state.fail(error);
                }
                None => {
                    let events = state.decoder.finish();
                    state.absorb(events);
                    if !state.finished {
                        tracing::debug!(
                            provider = state.ctx.errors.provider,
                            "Stream body ended without a terminal marker"
                        );
                        state.finish();
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
