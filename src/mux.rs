//! Handler multiplexer keyed by `(message identifier, protocol version)`.
//!
//! Registration happens once at startup; lookup is reentrant and runs on
//! every request. Handlers registered under `ProtocolVersion::Invalid` only
//! match before negotiation has selected a version, because requests are
//! tagged with the currently selected version at ingress.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::bridge::{Request, ResponseWriter};
use crate::hresult::{BridgeError, ErrorKind};
use crate::protocol::{MessageIdentifier, ProtocolVersion};

/// The future a handler invocation returns.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A registered handler. Each invocation owns its response writer and
/// request; writing exactly one response is the handler's contract.
pub type Handler = Arc<dyn Fn(ResponseWriter, Request) -> HandlerFuture + Send + Sync>;

/// Fallback handler for any `(type, version)` pair without a registration.
/// Replies with `VMCOMPUTE_UNKNOWN_MESSAGE` and leaves bridge state alone.
pub fn unknown_message_handler() -> Handler {
    Arc::new(|w: ResponseWriter, r: Request| -> HandlerFuture {
        Box::pin(async move {
            w.error(
                "",
                BridgeError::new(ErrorKind::UnknownMessage {
                    message_type: r.header.message_type,
                }),
            )
            .await;
        })
    })
}

/// Protocol multiplexer for request/response pairs on the bridge.
pub struct Mux {
    m: Mutex<HashMap<MessageIdentifier, HashMap<ProtocolVersion, Handler>>>,
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

impl Mux {
    pub fn new() -> Self {
        Self {
            m: Mutex::new(HashMap::new()),
        }
    }

    /// Register `handler` for the given message id and protocol version.
    /// Re-registering overwrites the previous entry.
    pub fn handle(&self, id: MessageIdentifier, ver: ProtocolVersion, handler: Handler) {
        let mut m = self.m.lock().unwrap();
        let by_version = m.entry(id).or_default();
        if by_version.contains_key(&ver) {
            info!(?id, ?ver, "bridge: overwriting bridge handler");
        }
        by_version.insert(ver, handler);
    }

    /// Register a handler function for the given message id and version.
    pub fn handle_fn<F, Fut>(&self, id: MessageIdentifier, ver: ProtocolVersion, f: F)
    where
        F: Fn(ResponseWriter, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle(
            id,
            ver,
            Arc::new(move |w, r| -> HandlerFuture { Box::pin(f(w, r)) }),
        );
    }

    /// Return the handler for `r`, falling back to the unknown-message
    /// handler when the type or version has no registration.
    pub fn handler(&self, r: &Request) -> Handler {
        let id = match MessageIdentifier::from_u32(r.header.message_type) {
            Some(id) => id,
            None => return unknown_message_handler(),
        };
        let m = self.m.lock().unwrap();
        m.get(&id)
            .and_then(|by_version| by_version.get(&r.version))
            .cloned()
            .unwrap_or_else(unknown_message_handler)
    }

    /// Dispatch `r` to the handler whose key matches its type and version.
    pub async fn serve(&self, w: ResponseWriter, r: Request) {
        let handler = self.handler(&r);
        handler(w, r).await;
    }
}
