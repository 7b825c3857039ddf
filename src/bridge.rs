//! The bridge control loop: request/response dispatch between the HCS host
//! and the in-UVM container runtime.
//!
//! The bridge has two fundamentally different dispatch options:
//!
//! 1. Request/response, where a request of a given type is dispatched
//!    through the [`Mux`](crate::mux::Mux) to the matching handler and a
//!    [`ResponseWriter`] answers exactly that request.
//! 2. [`Bridge::publish_notification`], where a payload that was not
//!    initiated by any request is written to the bridge at any time.
//!
//! ## Dispatch pipelines
//!
//! [`Bridge::listen_and_serve`] runs three tasks over one full-duplex
//! stream: ingress reads frames and tags them with the selected protocol
//! version, fan-out spawns one handler task per request, and egress
//! serializes `{header, payload}` pairs back onto the stream. The egress
//! channel is the only synchronization point between handlers, notification
//! publishers and the stream; handlers never touch the output directly.
//!
//! Responses are correlated by header `ID`, not by order: two requests may
//! complete in either order because every handler runs concurrently.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::framing;
use crate::hresult::{set_error_for_response_base, BridgeError, ErrorKind};
use crate::mux::Mux;
use crate::protocol::{
    capabilities, response_identifier, ActiveOperation, ContainerCreate,
    ContainerCreateResponse, ContainerExecuteProcess, ContainerExecuteProcessResponse,
    ContainerGetProperties, ContainerGetPropertiesResponse, ContainerModifySettings,
    ContainerNotification, ContainerResizeConsole, ContainerSettingsV1,
    ContainerSettingsV2, ContainerSignalProcess, ContainerWaitForProcess,
    ContainerWaitForProcessResponse, MessageBase, MessageHeader, MessageIdentifier,
    MessageResponseBase, NegotiateProtocol, NegotiateProtocolResponse, NotificationType,
    ProcessDetails, ProcessParameters, Properties, ProtocolVersion, NIL_GUID, PV_MAX,
    SCHEMA_V2, UVM_CONTAINER_ID,
};
use crate::runtime::{
    ConnectionSettings, ExitWait, Host, Runtime, SIGKILL, SIGTERM,
};

/// A request read off the bridge stream, tagged with the protocol version
/// that was selected at the moment it arrived.
#[derive(Debug)]
pub struct Request {
    pub header: MessageHeader,
    pub message: Vec<u8>,
    pub version: ProtocolVersion,
}

/// Payloads are serialized on the egress task, not where they are written,
/// so marshal failures surface as session-terminating events.
pub(crate) trait ResponsePayload: Send + Sync {
    fn marshal(&self) -> Result<Vec<u8>, serde_json::Error>;
}

impl<T: Serialize + Send + Sync> ResponsePayload for T {
    fn marshal(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// One entry on the egress channel: a precomputed header plus the payload
/// to serialize behind it.
pub(crate) struct BridgeResponse {
    pub(crate) header: MessageHeader,
    payload: Box<dyn ResponsePayload>,
}

impl BridgeResponse {
    pub(crate) fn marshal(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.payload.marshal()
    }
}

/// Per-request writer holding the precomputed response header. A handler
/// must write exactly once; a second write is a programming error and
/// aborts the process.
pub struct ResponseWriter {
    header: MessageHeader,
    response_tx: mpsc::Sender<BridgeResponse>,
    written: Arc<AtomicBool>,
}

impl ResponseWriter {
    pub(crate) fn new(
        header: MessageHeader,
        response_tx: mpsc::Sender<BridgeResponse>,
        written: Arc<AtomicBool>,
    ) -> Self {
        Self {
            header,
            response_tx,
            written,
        }
    }

    /// The response header this writer will emit.
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// Enqueue the successful response payload.
    pub async fn write<T>(&self, response: T)
    where
        T: Serialize + Send + Sync + 'static,
    {
        if self.written.swap(true, Ordering::SeqCst) {
            panic!(
                "bridge: response already written for message id {:#x}",
                self.header.id
            );
        }
        let resp = BridgeResponse {
            header: self.header,
            payload: Box::new(response),
        };
        if self.response_tx.send(resp).await.is_err() {
            // The session is shutting down; late handlers must not bring the
            // process down with them.
            warn!(
                id = self.header.id,
                "bridge: session closed before response could be sent"
            );
        }
    }

    /// Write `err` as the response correlated with `activity_id`. An empty
    /// activity ID is normalized to the nil GUID.
    pub async fn error(&self, activity_id: &str, err: BridgeError) {
        let activity_id = if activity_id.is_empty() {
            NIL_GUID.to_string()
        } else {
            activity_id.to_string()
        };
        let mut response = MessageResponseBase {
            activity_id,
            ..Default::default()
        };
        set_error_for_response_base(&mut response, &err);
        self.write(response).await;
    }
}

/// Clonable handle for pushing unsolicited notifications onto the egress
/// channel, shared with tasks that outlive their originating request.
#[derive(Clone)]
pub struct NotificationPublisher {
    response_tx: mpsc::Sender<BridgeResponse>,
}

impl NotificationPublisher {
    /// Enqueue `n` as a notification frame (`ID` 0). Ordering relative to
    /// responses from other tasks is not preserved.
    pub async fn publish(&self, n: ContainerNotification) {
        let resp = BridgeResponse {
            header: MessageHeader {
                message_type: MessageIdentifier::NotificationV1 as u32,
                size: 0,
                id: 0,
            },
            payload: Box::new(n),
        };
        if self.response_tx.send(resp).await.is_err() {
            warn!("bridge: session closed before notification could be sent");
        }
    }
}

/// The bridge client in the GCS.
pub struct Bridge {
    core: Arc<dyn Runtime>,
    host: Arc<dyn Host>,
    response_tx: mpsc::Sender<BridgeResponse>,
    response_rx: Mutex<Option<mpsc::Receiver<BridgeResponse>>>,
    quit_tx: mpsc::Sender<bool>,
    quit_rx: Mutex<Option<mpsc::Receiver<bool>>>,
    prot_ver: Arc<AtomicU32>,
}

impl Bridge {
    pub fn new(core: Arc<dyn Runtime>, host: Arc<dyn Host>) -> Self {
        let (response_tx, response_rx) = mpsc::channel(1);
        // Capacity 1 so the UVM-shutdown path can raise the signal without
        // blocking behind the terminal-event select.
        let (quit_tx, quit_rx) = mpsc::channel(1);
        Self {
            core,
            host,
            response_tx,
            response_rx: Mutex::new(Some(response_rx)),
            quit_tx,
            quit_rx: Mutex::new(Some(quit_rx)),
            prot_ver: Arc::new(AtomicU32::new(ProtocolVersion::Invalid as u32)),
        }
    }

    /// The protocol version selected for this session, `Invalid` before
    /// negotiation.
    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::from_u32(self.prot_ver.load(Ordering::Acquire))
            .unwrap_or(ProtocolVersion::Invalid)
    }

    fn set_protocol_version(&self, version: u32) {
        self.prot_ver.store(version, Ordering::Release);
    }

    /// A handle for publishing notifications from detached tasks.
    pub fn notifier(&self) -> NotificationPublisher {
        NotificationPublisher {
            response_tx: self.response_tx.clone(),
        }
    }

    /// Write an unsolicited notification to the bridge.
    pub async fn publish_notification(&self, n: ContainerNotification) {
        self.notifier().publish(n).await;
    }

    fn register<F, Fut>(
        self: &Arc<Self>,
        mux: &Mux,
        id: MessageIdentifier,
        ver: ProtocolVersion,
        f: F,
    ) where
        F: Fn(Arc<Bridge>, ResponseWriter, Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let b = Arc::clone(self);
        mux.handle_fn(id, ver, move |w, r| f(Arc::clone(&b), w, r));
    }

    /// Register every bridge handler on `mux`.
    pub fn assign_handlers(self: &Arc<Self>, mux: &Mux) {
        use MessageIdentifier as Mi;
        use ProtocolVersion as Pv;

        // Registered under Invalid because they are called previous to any
        // protocol negotiation, so they respond only when no version is
        // known yet.
        self.register(mux, Mi::NegotiateProtocolV1, Pv::Invalid, |b, w, r| async move {
            b.negotiate_protocol(w, r).await
        });
        self.register(mux, Mi::CreateV1, Pv::Invalid, |b, w, r| async move {
            b.create_container(w, r).await
        });

        for ver in [Pv::V3, Pv::V4] {
            self.register(mux, Mi::ExecuteProcessV1, ver, |b, w, r| async move {
                b.exec_process(w, r).await
            });
            self.register(mux, Mi::ShutdownForcedV1, ver, |b, w, r| async move {
                b.kill_container(w, r).await
            });
            self.register(mux, Mi::ShutdownGracefulV1, ver, |b, w, r| async move {
                b.shutdown_container(w, r).await
            });
            self.register(mux, Mi::SignalProcessV1, ver, |b, w, r| async move {
                b.signal_process(w, r).await
            });
            self.register(mux, Mi::GetPropertiesV1, ver, |b, w, r| async move {
                b.get_properties(w, r).await
            });
            self.register(mux, Mi::WaitForProcessV1, ver, |b, w, r| async move {
                b.wait_on_process(w, r).await
            });
            self.register(mux, Mi::ResizeConsoleV1, ver, |b, w, r| async move {
                b.resize_console(w, r).await
            });
            self.register(mux, Mi::ModifySettingsV1, ver, |b, w, r| async move {
                b.modify_settings(w, r).await
            });
        }

        // v4 specific handlers.
        self.register(mux, Mi::StartV1, Pv::V4, |b, w, r| async move {
            b.start_container(w, r).await
        });
        self.register(mux, Mi::CreateV1, Pv::V4, |b, w, r| async move {
            b.create_container(w, r).await
        });
    }

    /// Listen for messages on the stream and dispatch each to its handler
    /// asynchronously, until a terminal event: a framing error on read, a
    /// serialization or framing error on write, or a UVM shutdown request.
    ///
    /// Returns `Ok(())` on clean EOF or UVM shutdown. Handlers in flight are
    /// not cancelled; their late responses are dropped.
    pub async fn listen_and_serve<R, W>(
        &self,
        bridge_in: R,
        bridge_out: W,
        handler: Arc<Mux>,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut response_rx = self
            .response_rx
            .lock()
            .unwrap()
            .take()
            .expect("bridge: listen_and_serve called twice");
        let mut quit_rx = self
            .quit_rx
            .lock()
            .unwrap()
            .take()
            .expect("bridge: listen_and_serve called twice");
        let (request_tx, mut request_rx) = mpsc::channel::<Request>(1);
        let (err_tx, mut err_rx) = mpsc::channel::<BridgeError>(2);

        // Ingress: read frames, tag them with the selected version, forward.
        let ingress = {
            let err_tx = err_tx.clone();
            let prot_ver = Arc::clone(&self.prot_ver);
            let mut bridge_in = bridge_in;
            tokio::spawn(async move {
                loop {
                    match framing::read_frame(&mut bridge_in).await {
                        Ok(Some((header, message))) => {
                            debug!(
                                "bridge: read message type={:#010x} id={:#x}",
                                header.message_type, header.id
                            );
                            trace!(
                                payload = %String::from_utf8_lossy(&message),
                                "bridge: message payload"
                            );
                            let version = ProtocolVersion::from_u32(
                                prot_ver.load(Ordering::Acquire),
                            )
                            .unwrap_or(ProtocolVersion::Invalid);
                            let request = Request {
                                header,
                                message,
                                version,
                            };
                            if request_tx.send(request).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            let _ = err_tx.send(BridgeError::new(ErrorKind::Shutdown)).await;
                            break;
                        }
                        Err(e) => {
                            let _ = err_tx.send(e).await;
                            break;
                        }
                    }
                }
            })
        };

        // Fan-out: one handler task per request, each owning a writer whose
        // response identity was fixed before the handler ran.
        let fan_out = {
            let response_tx = self.response_tx.clone();
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                while let Some(r) = request_rx.recv().await {
                    let response_tx = response_tx.clone();
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        let written = Arc::new(AtomicBool::new(false));
                        let w = ResponseWriter::new(
                            MessageHeader {
                                message_type: response_identifier(r.header.message_type),
                                size: 0,
                                id: r.header.id,
                            },
                            response_tx,
                            Arc::clone(&written),
                        );
                        let (id, message_type) = (r.header.id, r.header.message_type);
                        handler.serve(w, r).await;
                        if !written.load(Ordering::SeqCst) {
                            error!(
                                "bridge: request id={id:#x} type={message_type:#010x} failed to write a response"
                            );
                        }
                    });
                }
            })
        };

        // Egress: single writer serializing every response and notification.
        let egress = {
            let err_tx = err_tx.clone();
            let mut bridge_out = bridge_out;
            tokio::spawn(async move {
                while let Some(resp) = response_rx.recv().await {
                    let payload = match resp.marshal() {
                        Ok(p) => p,
                        Err(source) => {
                            let _ = err_tx
                                .send(BridgeError::new(ErrorKind::JsonEncode { source }))
                                .await;
                            break;
                        }
                    };
                    let mut header = resp.header;
                    if let Err(e) =
                        framing::write_frame(&mut bridge_out, &mut header, &payload).await
                    {
                        let _ = err_tx.send(e).await;
                        break;
                    }
                    debug!(
                        response = %String::from_utf8_lossy(&payload),
                        "bridge: response sent"
                    );
                }
            })
        };

        let result = tokio::select! {
            Some(err) = err_rx.recv() => {
                if matches!(err.kind(), ErrorKind::Shutdown) {
                    Ok(())
                } else {
                    Err(err)
                }
            }
            _ = quit_rx.recv() => Ok(()),
        };

        ingress.abort();
        fan_out.abort();
        egress.abort();
        result
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// negotiateProtocol was introduced in v4 so is never called with a
    /// minimum lower than that.
    async fn negotiate_protocol(&self, w: ResponseWriter, r: Request) {
        let request: NegotiateProtocol = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        if request.maximum_version < ProtocolVersion::V4 as u32
            || (PV_MAX as u32) < request.minimum_version
        {
            w.error(
                &request.base.activity_id,
                BridgeError::new(ErrorKind::UnsupportedProtocolVersion),
            )
            .await;
            return;
        }

        let selected = (PV_MAX as u32).min(request.maximum_version);
        self.set_protocol_version(selected);
        w.write(NegotiateProtocolResponse {
            base: MessageResponseBase {
                activity_id: request.base.activity_id,
                ..Default::default()
            },
            version: selected,
            capabilities: capabilities(),
        })
        .await;
    }

    async fn create_container(&self, w: ResponseWriter, r: Request) {
        let request: ContainerCreate = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };
        let id = request.base.container_id.clone();
        let activity_id = request.base.activity_id.clone();
        let prot_ver = self.protocol_version();

        // The HCS does not honor the capability to skip the first create
        // message; detect that create and acknowledge it without acting.
        if prot_ver == ProtocolVersion::V4 && id == NIL_GUID {
            debug!("bridge: received first create message when capabilities requested no send");
            w.write(ContainerCreateResponse {
                base: MessageResponseBase {
                    activity_id,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await;
            return;
        }

        let mut exit_wait: Option<ExitWait> = None;
        let mut was_v2_config = false;
        if prot_ver >= ProtocolVersion::V4 {
            // First determine whether this is actually a v2 schema config.
            let settings_v2: ContainerSettingsV2 =
                match decode(request.container_config.as_bytes()) {
                    Ok(s) => s,
                    Err(e) => {
                        w.error(&activity_id, e).await;
                        return;
                    }
                };
            if settings_v2.schema_version >= SCHEMA_V2 {
                was_v2_config = true;
                let container = match self.host.create_container(&id, settings_v2).await {
                    Ok(c) => c,
                    Err(e) => {
                        w.error(&activity_id, e).await;
                        return;
                    }
                };
                exit_wait = Some(Box::pin(async move { container.wait().await }));
            }
        }

        // Not a v2 config: fall back to v1 settings and the runtime adapter.
        if !was_v2_config {
            let settings: ContainerSettingsV1 =
                match decode(request.container_config.as_bytes()) {
                    Ok(s) => s,
                    Err(e) => {
                        w.error(&activity_id, e).await;
                        return;
                    }
                };
            if let Err(e) = self.core.create_container(&id, settings).await {
                w.error(&activity_id, e).await;
                return;
            }
            match self.core.wait_container(&id).await {
                Ok(wait) => exit_wait = Some(wait),
                Err(e) => {
                    error!(error = %e, container = %id, "bridge: failed to register container exit wait");
                }
            }
        }

        let mut response = ContainerCreateResponse {
            base: MessageResponseBase {
                activity_id: activity_id.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        // For v4+ the selected version was set by negotiateProtocol; for v3
        // the create doubles as an implicit negotiation and carries the
        // version in the response.
        if prot_ver == ProtocolVersion::Invalid {
            response.selected_protocol_version = ProtocolVersion::V3 as u32;
            self.set_protocol_version(ProtocolVersion::V3 as u32);
        }

        // The response must be enqueued before the exit notification can be,
        // so write first and only then start the wait.
        w.write(response).await;

        if let Some(wait) = exit_wait {
            let notifier = self.notifier();
            tokio::spawn(async move {
                let exit_code = wait.await;
                notifier
                    .publish(ContainerNotification {
                        base: MessageBase {
                            container_id: id,
                            activity_id,
                        },
                        notification_type: NotificationType::UnexpectedExit,
                        operation: ActiveOperation::None,
                        result: exit_code,
                        result_info: String::new(),
                    })
                    .await;
            });
        }
    }

    /// A noop, but needs handling so that an error is not returned to the
    /// HCS for the start leg of its sequence.
    async fn start_container(&self, w: ResponseWriter, r: Request) {
        let request: MessageBase = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };
        w.write(MessageResponseBase {
            activity_id: request.activity_id,
            ..Default::default()
        })
        .await;
    }

    async fn exec_process(&self, w: ResponseWriter, r: Request) {
        let request: ContainerExecuteProcess = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };
        let activity_id = request.base.activity_id.clone();
        let params: ProcessParameters =
            match decode(request.settings.process_parameters.as_bytes()) {
                Ok(p) => p,
                Err(e) => {
                    w.error(&activity_id, e).await;
                    return;
                }
            };

        let relay = request.settings.vsock_stdio_relay_settings;
        let mut conn = ConnectionSettings::default();
        if params.create_std_in_pipe {
            conn.std_in = Some(relay.std_in);
        }
        if params.create_std_out_pipe {
            conn.std_out = Some(relay.std_out);
        }
        if params.create_std_err_pipe {
            conn.std_err = Some(relay.std_err);
        }

        let result = if params.is_external {
            self.core.run_external_process(params, conn).await
        } else if params.schema_version >= SCHEMA_V2 {
            match self.host.get_container(&request.base.container_id).await {
                Ok(container) => match params.oci_process {
                    None => container.start(conn).await,
                    Some(process) => container.exec_process(process, conn).await,
                },
                Err(e) => Err(e),
            }
        } else {
            self.core
                .exec_process(&request.base.container_id, params, conn)
                .await
        };

        match result {
            Ok(pid) => {
                w.write(ContainerExecuteProcessResponse {
                    base: MessageResponseBase {
                        activity_id,
                        ..Default::default()
                    },
                    process_id: pid as u32,
                })
                .await;
            }
            Err(e) => w.error(&activity_id, e).await,
        }
    }

    async fn kill_container(&self, w: ResponseWriter, r: Request) {
        self.signal_container(w, r, SIGKILL).await;
    }

    async fn shutdown_container(&self, w: ResponseWriter, r: Request) {
        self.signal_container(w, r, SIGTERM).await;
    }

    /// Not a handler itself: the signal is implied by the message type that
    /// dispatched here.
    async fn signal_container(&self, w: ResponseWriter, r: Request, signal: i32) {
        let request: MessageBase = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        if request.container_id == UVM_CONTAINER_ID {
            // Shutting down the UVM itself. This is destructive: no response
            // goes back to the HCS.
            if signal != SIGTERM {
                error!(signal, "bridge: invalid signal sent to UVM, will shut down anyway");
            }
            if self.quit_tx.try_send(true).is_err() {
                warn!("bridge: quit signal already raised");
            }
            self.host.shutdown().await;
            return;
        }

        if let Ok(container) = self.host.get_container(&request.container_id).await {
            if let Err(e) = container.kill(signal).await {
                w.error(&request.activity_id, e).await;
                return;
            }
        } else if let Err(e) = self
            .core
            .signal_container(&request.container_id, signal)
            .await
        {
            w.error(&request.activity_id, e).await;
            return;
        }

        w.write(MessageResponseBase {
            activity_id: request.activity_id,
            ..Default::default()
        })
        .await;
    }

    async fn signal_process(&self, w: ResponseWriter, r: Request) {
        let request: ContainerSignalProcess = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        if let Ok(container) = self.host.get_container(&request.base.container_id).await {
            let process = match container.get_process(request.process_id).await {
                Ok(p) => p,
                Err(e) => {
                    w.error(&request.base.activity_id, e).await;
                    return;
                }
            };
            let signal = if request.options.signal == 0 {
                SIGKILL
            } else {
                request.options.signal
            };
            if let Err(e) = process.kill(signal).await {
                w.error(&request.base.activity_id, e).await;
                return;
            }
        } else if let Err(e) = self
            .core
            .signal_process(request.process_id as i32, request.options)
            .await
        {
            w.error(&request.base.activity_id, e).await;
            return;
        }

        w.write(MessageResponseBase {
            activity_id: request.base.activity_id,
            ..Default::default()
        })
        .await;
    }

    async fn get_properties(&self, w: ResponseWriter, r: Request) {
        let request: ContainerGetProperties = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        let properties = if request.base.container_id == UVM_CONTAINER_ID {
            // Only pid queries were ever supported against the UVM; report
            // the same set for v2 until more is needed.
            let process_list = self
                .host
                .get_all_process_pids()
                .into_iter()
                .map(|pid| ProcessDetails { process_id: pid })
                .collect();
            Some(Properties { process_list })
        } else {
            match self
                .core
                .get_properties(&request.base.container_id, &request.query)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    w.error(&request.base.activity_id, e).await;
                    return;
                }
            }
        };

        let property_json = match &properties {
            Some(p) => match serde_json::to_string(p) {
                Ok(s) => s,
                Err(source) => {
                    w.error(
                        &request.base.activity_id,
                        BridgeError::new(ErrorKind::JsonEncode { source }),
                    )
                    .await;
                    return;
                }
            },
            None => "{}".to_string(),
        };

        w.write(ContainerGetPropertiesResponse {
            base: MessageResponseBase {
                activity_id: request.base.activity_id,
                ..Default::default()
            },
            properties: property_json,
        })
        .await;
    }

    async fn wait_on_process(&self, w: ResponseWriter, r: Request) {
        let request: ContainerWaitForProcess = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        let (mut exit_rx, done_tx) = if let Ok(container) =
            self.host.get_container(&request.base.container_id).await
        {
            match container.get_process(request.process_id).await {
                Ok(p) => p.wait().await,
                Err(e) => {
                    w.error(&request.base.activity_id, e).await;
                    return;
                }
            }
        } else {
            match self.core.wait_process(request.process_id as i32).await {
                Ok(channels) => channels,
                Err(e) => {
                    w.error(&request.base.activity_id, e).await;
                    return;
                }
            }
        };

        tokio::select! {
            biased;
            exit = exit_rx.recv() => match exit {
                Some(exit_code) => {
                    w.write(ContainerWaitForProcessResponse {
                        base: MessageResponseBase {
                            activity_id: request.base.activity_id.clone(),
                            ..Default::default()
                        },
                        exit_code: exit_code as u32,
                    })
                    .await;
                }
                None => {
                    w.error(
                        &request.base.activity_id,
                        BridgeError::runtime("process exit channel closed"),
                    )
                    .await;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(u64::from(request.timeout_in_ms))) => {
                w.error(
                    &request.base.activity_id,
                    BridgeError::new(ErrorKind::Timeout),
                )
                .await;
            }
        }

        // Timed out or got the exit code; either way relinquish the wait.
        let _ = done_tx.send(true).await;
    }

    async fn resize_console(&self, w: ResponseWriter, r: Request) {
        let request: ContainerResizeConsole = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        if let Err(e) = self
            .core
            .resize_console(request.process_id as i32, request.height, request.width)
            .await
        {
            w.error(&request.base.activity_id, e).await;
            return;
        }

        w.write(MessageResponseBase {
            activity_id: request.base.activity_id,
            ..Default::default()
        })
        .await;
    }

    async fn modify_settings(&self, w: ResponseWriter, r: Request) {
        let request: ContainerModifySettings = match decode(&r.message) {
            Ok(m) => m,
            Err(e) => {
                w.error("", e).await;
                return;
            }
        };

        if let Some(v1) = request.request {
            if let Err(e) = self
                .core
                .modify_settings(&request.base.container_id, v1)
                .await
            {
                w.error(&request.base.activity_id, e).await;
                return;
            }
        } else if let Some(v2) = request.v2_request {
            if request.base.container_id != UVM_CONTAINER_ID {
                w.error(
                    &request.base.activity_id,
                    BridgeError::new(ErrorKind::InvalidRequest(
                        "V2 Modify request not supported on anything but UVM".to_string(),
                    )),
                )
                .await;
                return;
            }
            if let Err(e) = self.host.modify_host_settings(v2).await {
                w.error(&request.base.activity_id, e).await;
                return;
            }
        } else {
            w.error(
                &request.base.activity_id,
                BridgeError::new(ErrorKind::InvalidRequest(
                    "neither Request nor v2Request was specified".to_string(),
                )),
            )
            .await;
            return;
        }

        w.write(MessageResponseBase {
            activity_id: request.base.activity_id,
            ..Default::default()
        })
        .await;
    }
}

fn decode<T: DeserializeOwned>(message: &[u8]) -> Result<T, BridgeError> {
    serde_json::from_slice(message).map_err(|source| {
        BridgeError::new(ErrorKind::JsonDecode {
            payload: String::from_utf8_lossy(message).into_owned(),
            source,
        })
    })
}
