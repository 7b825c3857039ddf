//! Contracts the bridge drives: the container runtime adapter, the v2 host
//! state, and the containers and processes they manage.
//!
//! The bridge never talks to runc, the storage layer or the OS directly; it
//! only calls through these traits. Production wires in the real adapters,
//! tests wire in call-recording mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::hresult::BridgeError;
use crate::protocol::{
    ContainerSettingsV1, ContainerSettingsV2, ModifySettingRequest, OciProcess,
    ProcessParameters, Properties, ResourceModificationRequestResponse,
    SignalProcessOptions,
};

pub const SIGKILL: i32 = 9;
pub const SIGTERM: i32 = 15;

/// A pending container exit: resolves to the exit code once the container's
/// init process has terminated.
pub type ExitWait = Pin<Box<dyn Future<Output = i32> + Send>>;

/// Channels handed out for one wait on one process. The receiver yields the
/// exit code; the sender tells the provider the waiter has lost interest
/// (after delivery or timeout). Providers must support any number of
/// simultaneous waits on the same process by handing out fresh pairs.
pub type ProcessWaitChannels = (mpsc::Receiver<i32>, mpsc::Sender<bool>);

/// Vsock connections to establish for a process's stdio. `None` means the
/// host did not ask for that pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub std_in: Option<u32>,
    pub std_out: Option<u32>,
    pub std_err: Option<u32>,
}

/// The v1 container runtime adapter.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn create_container(
        &self,
        id: &str,
        settings: ContainerSettingsV1,
    ) -> Result<(), BridgeError>;

    /// Obtain a waiter for the container's exit. The returned future is
    /// consumed by the exit-notification task.
    async fn wait_container(&self, id: &str) -> Result<ExitWait, BridgeError>;

    async fn exec_process(
        &self,
        id: &str,
        params: ProcessParameters,
        conn: ConnectionSettings,
    ) -> Result<i32, BridgeError>;

    /// Run a process in the UVM itself rather than in a container.
    async fn run_external_process(
        &self,
        params: ProcessParameters,
        conn: ConnectionSettings,
    ) -> Result<i32, BridgeError>;

    async fn signal_container(&self, id: &str, signal: i32) -> Result<(), BridgeError>;

    async fn signal_process(
        &self,
        pid: i32,
        options: SignalProcessOptions,
    ) -> Result<(), BridgeError>;

    async fn get_properties(
        &self,
        id: &str,
        query: &str,
    ) -> Result<Option<Properties>, BridgeError>;

    async fn wait_process(&self, pid: i32) -> Result<ProcessWaitChannels, BridgeError>;

    async fn resize_console(
        &self,
        pid: i32,
        height: u16,
        width: u16,
    ) -> Result<(), BridgeError>;

    async fn modify_settings(
        &self,
        id: &str,
        request: ResourceModificationRequestResponse,
    ) -> Result<(), BridgeError>;
}

/// The v2 host state: containers created from v2 configs and UVM-level
/// operations.
#[async_trait]
pub trait Host: Send + Sync {
    async fn create_container(
        &self,
        id: &str,
        settings: ContainerSettingsV2,
    ) -> Result<Arc<dyn Container>, BridgeError>;

    /// Look up a container by id; a not-found error means the request falls
    /// back to the v1 runtime path.
    async fn get_container(&self, id: &str) -> Result<Arc<dyn Container>, BridgeError>;

    /// Pids of every process the host state tracks, for UVM getProperties.
    fn get_all_process_pids(&self) -> Vec<u32>;

    async fn modify_host_settings(
        &self,
        request: ModifySettingRequest,
    ) -> Result<(), BridgeError>;

    /// Tear the UVM down. Called after the quit signal has been raised; the
    /// bridge does not respond to the host afterwards.
    async fn shutdown(&self);
}

/// A v2 container held by the host state.
#[async_trait]
pub trait Container: Send + Sync {
    /// Block until the container's init process exits, returning its code.
    async fn wait(&self) -> i32;

    /// Start the init process described by the container's config.
    async fn start(&self, conn: ConnectionSettings) -> Result<i32, BridgeError>;

    /// Exec an additional process into the running container.
    async fn exec_process(
        &self,
        process: OciProcess,
        conn: ConnectionSettings,
    ) -> Result<i32, BridgeError>;

    async fn kill(&self, signal: i32) -> Result<(), BridgeError>;

    async fn get_process(&self, pid: u32) -> Result<Arc<dyn Process>, BridgeError>;
}

/// A process tracked by a v2 container.
#[async_trait]
pub trait Process: Send + Sync {
    /// Hand out a fresh wait-channel pair for this process.
    async fn wait(&self) -> ProcessWaitChannels;

    async fn kill(&self, signal: i32) -> Result<(), BridgeError>;
}
