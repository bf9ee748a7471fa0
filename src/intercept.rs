//! Response interceptor: classifies completed responses and notifies
//! subscribers, then hands the response downstream unchanged.

use crate::envelope::ResponseEnvelope;
use crate::transport::RawResponse;
use std::sync::Mutex;

/// Marker text the reference server embeds in write-conflict errors.
pub const CONFLICT_MARKER: &str = "VoyagerConflict";

/// Transient classification of a completed response. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The server rejected a write because of a conflicting concurrent change.
    Conflict,
    MutationSuccess,
    QuerySuccess,
    /// Nothing recognizable; also the result for malformed bodies.
    Neutral,
}

/// How responses are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Parse the typed status envelope. Default.
    #[default]
    Structured,

    /// Substring tests against the raw body, matching the original client's
    /// behavior. Fragile by construction: conflict text appearing inside
    /// unrelated response data produces a false positive. Kept as a fallback
    /// for servers that emit no structured status.
    LegacySubstring,
}

/// Handler invoked with the signal of every completed response.
pub type SignalHandler = Box<dyn Fn(Signal) + Send + Sync>;

/// Inspects every response produced by the transport.
///
/// The full body is already buffered by the time classification runs; that
/// buffering is required because legacy detection is a substring search over
/// the complete body, not a structured parse. Classification never fails the
/// request pipeline: anything unrecognizable degrades to `Neutral`.
pub struct ResponseInterceptor {
    mode: DetectionMode,
    handlers: Mutex<Vec<SignalHandler>>,
}

impl ResponseInterceptor {
    pub fn new(mode: DetectionMode) -> Self {
        Self {
            mode,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for subsequent signals.
    pub fn subscribe(&self, handler: SignalHandler) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(handler);
        }
    }

    /// Classify a response and notify every subscriber.
    /// The response itself is not consumed or altered.
    pub fn inspect(&self, response: &RawResponse) -> Signal {
        let signal = self.classify(&response.body);
        if signal != Signal::Neutral {
            log::debug!("response classified as {:?}", signal);
        }
        if let Ok(handlers) = self.handlers.lock() {
            for handler in handlers.iter() {
                handler(signal);
            }
        }
        signal
    }

    /// Classify a raw body without side effects.
    pub fn classify(&self, body: &[u8]) -> Signal {
        match self.mode {
            DetectionMode::Structured => classify_structured(body),
            DetectionMode::LegacySubstring => classify_substring(body),
        }
    }
}

fn classify_structured(body: &[u8]) -> Signal {
    let envelope = match ResponseEnvelope::parse(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::debug!("unparseable response body, classifying neutral: {}", e);
            return Signal::Neutral;
        }
    };

    if envelope.has_conflict(CONFLICT_MARKER) {
        return Signal::Conflict;
    }

    if envelope.reports_success() {
        return match envelope.operation_type.as_deref() {
            Some("mutation") => Signal::MutationSuccess,
            Some("query") => Signal::QuerySuccess,
            _ => Signal::Neutral,
        };
    }

    Signal::Neutral
}

/// The original client's detection rules, applied in order.
fn classify_substring(body: &[u8]) -> Signal {
    let text = String::from_utf8_lossy(body);

    if text.contains(CONFLICT_MARKER) {
        return Signal::Conflict;
    }

    if text.contains(r#""msg":"""#)
        && text.contains(r#""operationType":"mutation""#)
        && text.contains(r#""success":true"#)
    {
        return Signal::MutationSuccess;
    }

    if text.contains(r#""msg":"","operationType":"query""#) && text.contains(r#""success":true"#) {
        return Signal::QuerySuccess;
    }

    Signal::Neutral
}
