//! Guest compute service bridge: the control loop between the HCS host and
//! the container runtime inside a Linux utility VM.
//!
//! This library provides:
//!
//! - **Protocol model** (`protocol`): message identifiers, protocol and
//!   schema versions, payload shapes, capabilities, notifications
//! - **Framing** (`framing`): length-prefixed typed frames on a byte stream
//! - **Mux** (`mux`): handler table keyed by `(message id, protocol version)`
//! - **Bridge** (`bridge`): dispatch engine, response writer, notification
//!   publisher and the handler set
//! - **Collaborator contracts** (`runtime`): the runtime adapter, host
//!   state, container and process seams
//! - **Error taxonomy** (`hresult`): HRESULT codes and error records
//!
//! ## Protocol overview
//!
//! The host drives the bridge over a single full-duplex byte stream
//! (a hypervisor socket in production, stdio or an in-process duplex for
//! tests):
//!
//! 1. Host sends `NegotiateProtocolV1`; the bridge selects a version and
//!    advertises its capabilities (a legacy v3 host skips this and the
//!    first create selects v3 implicitly)
//! 2. Host sends container requests (create, start, exec, signal, wait,
//!    resize, modify, getProperties); each gets exactly one response frame
//!    correlated by header `ID`
//! 3. The bridge pushes unsolicited `NotificationV1` frames (e.g. container
//!    exit) at any time, with header `ID` 0
//!
//! Frames are a 16-byte little-endian header (`Type | Size | ID`) followed
//! by a UTF-8 JSON payload. Error responses carry an HRESULT and at least
//! one `ErrorRecord`, byte-for-byte in the shape the host expects.

pub mod bridge;
pub mod framing;
pub mod hresult;
pub mod mux;
pub mod protocol;
pub mod runtime;

pub use bridge::{Bridge, NotificationPublisher, Request, ResponseWriter};
pub use framing::{decode_header, encode_header, read_frame, write_frame, MAX_FRAME_HARD_LIMIT};
pub use hresult::{set_error_for_response_base, BridgeError, ErrorKind, Hresult};
pub use mux::{unknown_message_handler, Handler, HandlerFuture, Mux};
pub use protocol::{
    capabilities, response_identifier, ContainerNotification, ErrorRecord,
    GcsCapabilities, MessageBase, MessageHeader, MessageIdentifier,
    MessageResponseBase, ProtocolVersion, SchemaVersion, MESSAGE_HEADER_SIZE, NIL_GUID,
    PV_MAX, SCHEMA_V2, UVM_CONTAINER_ID,
};
pub use runtime::{
    ConnectionSettings, Container, ExitWait, Host, Process, ProcessWaitChannels,
    Runtime, SIGKILL, SIGTERM,
};
