//! Wire protocol model for the HCS <-> GCS bridge.
//!
//! Every message on the bridge stream is a fixed 16-byte header followed by a
//! UTF-8 JSON payload. The header identifies the operation (`Type`), the total
//! frame length (`Size`) and a 64-bit correlation cookie (`ID`) that binds a
//! response to its request. Payload field names are the host's PascalCase
//! names; they are part of the protocol and must not drift.
//!
//! ## Message identifiers
//!
//! A message identifier packs a category into its high bits:
//!
//! ```text
//! 0x1000_0000  request
//! 0x2000_0000  response
//! 0x3000_0000  notification
//! 0x0010_0000  compute-system class
//! ```
//!
//! [`response_identifier`] flips a request identifier into the matching
//! response identifier. The mapping is one-way: responses are never turned
//! back into requests.

use serde::{Deserialize, Serialize};

/// Size in bytes of the fixed message header.
pub const MESSAGE_HEADER_SIZE: usize = 16;

/// Category bit for request messages.
pub const MT_REQUEST: u32 = 0x1000_0000;
/// Category bit for response messages.
pub const MT_RESPONSE: u32 = 0x2000_0000;
/// Category bit for notification messages.
pub const MT_NOTIFICATION: u32 = 0x3000_0000;
/// Class bits for compute-system messages.
pub const MC_COMPUTE_SYSTEM: u32 = 0x0010_0000;

/// The GUID the host uses to mean "no activity".
pub const NIL_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// The distinguished container ID addressing the utility VM itself.
pub const UVM_CONTAINER_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Fixed on-wire message header. All fields are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Message identifier, see [`MessageIdentifier`]. Kept raw so unknown
    /// types can still be echoed back in an error response.
    pub message_type: u32,
    /// Total frame length including the header.
    pub size: u32,
    /// Correlation cookie copied verbatim into the response header.
    pub id: u64,
}

/// Identifiers of every message the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageIdentifier {
    CreateV1 = 0x1010_0101,
    StartV1 = 0x1010_0201,
    ShutdownGracefulV1 = 0x1010_0301,
    ShutdownForcedV1 = 0x1010_0401,
    ExecuteProcessV1 = 0x1010_0501,
    WaitForProcessV1 = 0x1010_0601,
    SignalProcessV1 = 0x1010_0701,
    ResizeConsoleV1 = 0x1010_0801,
    GetPropertiesV1 = 0x1010_0901,
    ModifySettingsV1 = 0x1010_0a01,
    NegotiateProtocolV1 = 0x1010_0b01,
    NotificationV1 = 0x3010_0101,
}

impl MessageIdentifier {
    /// Decode a raw header type. Returns `None` for anything the bridge does
    /// not understand; the caller falls back to the unknown-message handler.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x1010_0101 => Some(MessageIdentifier::CreateV1),
            0x1010_0201 => Some(MessageIdentifier::StartV1),
            0x1010_0301 => Some(MessageIdentifier::ShutdownGracefulV1),
            0x1010_0401 => Some(MessageIdentifier::ShutdownForcedV1),
            0x1010_0501 => Some(MessageIdentifier::ExecuteProcessV1),
            0x1010_0601 => Some(MessageIdentifier::WaitForProcessV1),
            0x1010_0701 => Some(MessageIdentifier::SignalProcessV1),
            0x1010_0801 => Some(MessageIdentifier::ResizeConsoleV1),
            0x1010_0901 => Some(MessageIdentifier::GetPropertiesV1),
            0x1010_0a01 => Some(MessageIdentifier::ModifySettingsV1),
            0x1010_0b01 => Some(MessageIdentifier::NegotiateProtocolV1),
            0x3010_0101 => Some(MessageIdentifier::NotificationV1),
            _ => None,
        }
    }
}

/// Map a request identifier to its response identifier by flipping the
/// category bits. Works on raw values so unknown request types still get a
/// correctly-shaped response header.
pub fn response_identifier(message_type: u32) -> u32 {
    MT_RESPONSE | (message_type & !MT_REQUEST)
}

/// Bridge protocol versions, ordered. The selected version starts at
/// `Invalid` and is set exactly once by negotiation (or implicitly to `V3`
/// by a legacy create).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum ProtocolVersion {
    Invalid = 0,
    V3 = 3,
    V4 = 4,
}

/// Highest protocol version this bridge speaks.
pub const PV_MAX: ProtocolVersion = ProtocolVersion::V4;

impl ProtocolVersion {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(ProtocolVersion::Invalid),
            3 => Some(ProtocolVersion::V3),
            4 => Some(ProtocolVersion::V4),
            _ => None,
        }
    }
}

/// Payload schema version. Ordered lexicographically, so a plain derive
/// gives the comparison the v2-config detection needs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaVersion {
    #[serde(default)]
    pub major: u32,
    #[serde(default)]
    pub minor: u32,
}

/// Schema version at which a container config is treated as v2.
pub const SCHEMA_V2: SchemaVersion = SchemaVersion { major: 2, minor: 0 };

/// Fields common to every request payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageBase {
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub activity_id: String,
}

/// Fields common to every response payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageResponseBase {
    /// HRESULT of the operation; zero on success.
    #[serde(default)]
    pub result: i32,
    #[serde(default)]
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_records: Vec<ErrorRecord>,
}

/// One entry of the error detail the host renders for a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorRecord {
    pub result: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,
    pub module_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    #[serde(default)]
    pub line: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_name: String,
}

/// Static advertisement of what this GCS supports, returned from protocol
/// negotiation. Immutable for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GcsCapabilities {
    pub send_host_create_message: bool,
    pub send_host_start_message: bool,
    #[serde(rename = "HVSocketConfigOnStartup")]
    pub hv_socket_config_on_startup: bool,
    pub supported_schema_versions: Vec<SchemaVersion>,
    pub runtime_os_type: String,
}

/// Capabilities this bridge advertises to the host.
pub fn capabilities() -> GcsCapabilities {
    GcsCapabilities {
        send_host_create_message: false,
        send_host_start_message: false,
        hv_socket_config_on_startup: false,
        supported_schema_versions: vec![
            SchemaVersion { major: 1, minor: 0 },
            SchemaVersion { major: 2, minor: 1 },
        ],
        runtime_os_type: "Linux".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NegotiateProtocol {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub minimum_version: u32,
    #[serde(default)]
    pub maximum_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreate {
    #[serde(flatten)]
    pub base: MessageBase,
    /// JSON document holding either v1 [`ContainerSettingsV1`] or v2
    /// [`ContainerSettingsV2`]; which one is decided by its embedded
    /// `SchemaVersion`.
    #[serde(default)]
    pub container_config: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerExecuteProcess {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub settings: ExecuteProcessSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecuteProcessSettings {
    /// JSON document holding [`ProcessParameters`].
    #[serde(default)]
    pub process_parameters: String,
    #[serde(default)]
    pub vsock_stdio_relay_settings: VsockStdioRelaySettings,
}

/// Vsock port numbers the host listens on for process stdio relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VsockStdioRelaySettings {
    #[serde(default)]
    pub std_in: u32,
    #[serde(default)]
    pub std_out: u32,
    #[serde(default)]
    pub std_err: u32,
}

/// Parameters of a process to launch, embedded as a JSON string inside
/// [`ExecuteProcessSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessParameters {
    #[serde(default)]
    pub schema_version: SchemaVersion,
    #[serde(default)]
    pub command_line: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub environment: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub emulate_console: bool,
    #[serde(default)]
    pub create_std_in_pipe: bool,
    #[serde(default)]
    pub create_std_out_pipe: bool,
    #[serde(default)]
    pub create_std_err_pipe: bool,
    /// External processes run in the UVM itself rather than in a container.
    #[serde(default)]
    pub is_external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_process: Option<OciProcess>,
}

/// The OCI runtime-spec process document embedded in v2 exec requests.
/// Field names follow the OCI wire format (lowercase).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciProcess {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSignalProcess {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub process_id: u32,
    #[serde(default)]
    pub options: SignalProcessOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignalProcessOptions {
    /// Zero means "use the default", which the bridge maps to SIGKILL.
    #[serde(default)]
    pub signal: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerGetProperties {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitForProcess {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub process_id: u32,
    #[serde(default)]
    pub timeout_in_ms: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerResizeConsole {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(default)]
    pub process_id: u32,
    #[serde(default)]
    pub height: u16,
    #[serde(default)]
    pub width: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerModifySettings {
    #[serde(flatten)]
    pub base: MessageBase,
    /// v1 modification, handled by the container runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ResourceModificationRequestResponse>,
    /// v2 modification, only valid against the UVM itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v2_request: Option<ModifySettingRequest>,
}

/// A v1 resource modification. `Settings` stays opaque JSON; the runtime
/// adapter interprets it against `ResourceType`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceModificationRequestResponse {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

/// A v2 host setting modification, interpreted by the host state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifySettingRequest {
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub request_type: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Container settings
// ---------------------------------------------------------------------------

/// v1 (legacy) container settings carried in `ContainerConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSettingsV1 {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub sandbox_data_path: String,
    #[serde(default)]
    pub mapped_virtual_disks: Vec<MappedVirtualDisk>,
    #[serde(default)]
    pub network_adapters: Vec<NetworkAdapter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Layer {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MappedVirtualDisk {
    #[serde(default)]
    pub container_path: String,
    #[serde(default)]
    pub lun: u8,
    #[serde(rename = "CreateInUtilityVM", default)]
    pub create_in_utility_vm: bool,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAdapter {
    #[serde(default)]
    pub adapter_instance_id: String,
    #[serde(default)]
    pub firewall_enabled: bool,
    #[serde(default)]
    pub nat_enabled: bool,
    #[serde(default)]
    pub allocated_ip_address: String,
    #[serde(default)]
    pub host_ip_address: String,
    #[serde(default)]
    pub host_ip_prefix_length: u8,
    #[serde(default)]
    pub host_dns_server_list: String,
    #[serde(default)]
    pub host_dns_suffix: String,
    #[serde(default)]
    pub enable_low_metric: bool,
}

/// v2 container settings carried in `ContainerConfig`. The OCI document
/// stays opaque; the host state hands it to the runtime untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSettingsV2 {
    #[serde(default)]
    pub schema_version: SchemaVersion,
    #[serde(default)]
    pub oci_bundle_path: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub oci_specification: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NegotiateProtocolResponse {
    #[serde(flatten)]
    pub base: MessageResponseBase,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub capabilities: GcsCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    #[serde(flatten)]
    pub base: MessageResponseBase,
    /// Only set on the legacy path where the create doubles as negotiation.
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub selected_protocol_version: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerExecuteProcessResponse {
    #[serde(flatten)]
    pub base: MessageResponseBase,
    #[serde(default)]
    pub process_id: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerGetPropertiesResponse {
    #[serde(flatten)]
    pub base: MessageResponseBase,
    /// Re-serialized [`Properties`] JSON; the host stores it opaquely.
    #[serde(default)]
    pub properties: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerWaitForProcessResponse {
    #[serde(flatten)]
    pub base: MessageResponseBase,
    #[serde(default)]
    pub exit_code: u32,
}

/// Properties reported for a container (or the UVM) by getProperties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_list: Vec<ProcessDetails>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessDetails {
    #[serde(default)]
    pub process_id: u32,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Why a container notification fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    None,
    GracefulExit,
    ForcedExit,
    UnexpectedExit,
    Reboot,
    Constructed,
    Started,
    Paused,
    Unknown,
}

impl Default for NotificationType {
    fn default() -> Self {
        NotificationType::None
    }
}

/// The operation a notification relates to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveOperation {
    None,
    Construct,
    Start,
    Pause,
    Resume,
    Shutdown,
    Terminate,
}

impl Default for ActiveOperation {
    fn default() -> Self {
        ActiveOperation::None
    }
}

/// An unsolicited message pushed to the host, e.g. on container exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerNotification {
    #[serde(flatten)]
    pub base: MessageBase,
    #[serde(rename = "Type")]
    pub notification_type: NotificationType,
    pub operation: ActiveOperation,
    #[serde(default)]
    pub result: i32,
    #[serde(default)]
    pub result_info: String,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_identifier_one_way() {
        // The mapping flips the request category to response and is not
        // intended to be reversible.
        assert_eq!(
            response_identifier(MessageIdentifier::CreateV1 as u32),
            0x2010_0101
        );
        assert_eq!(
            response_identifier(MessageIdentifier::NegotiateProtocolV1 as u32),
            0x2010_0b01
        );
        let resp = response_identifier(MessageIdentifier::CreateV1 as u32);
        assert_ne!(response_identifier(resp), MessageIdentifier::CreateV1 as u32);
    }

    #[test]
    fn test_response_identifier_unknown_type() {
        assert_eq!(response_identifier(0xDEAD_BEEF), 0xEEAD_BEEF);
    }

    #[test]
    fn test_identifier_round_trip() {
        for id in [
            MessageIdentifier::CreateV1,
            MessageIdentifier::StartV1,
            MessageIdentifier::ShutdownGracefulV1,
            MessageIdentifier::ShutdownForcedV1,
            MessageIdentifier::ExecuteProcessV1,
            MessageIdentifier::WaitForProcessV1,
            MessageIdentifier::SignalProcessV1,
            MessageIdentifier::ResizeConsoleV1,
            MessageIdentifier::GetPropertiesV1,
            MessageIdentifier::ModifySettingsV1,
            MessageIdentifier::NegotiateProtocolV1,
            MessageIdentifier::NotificationV1,
        ] {
            assert_eq!(MessageIdentifier::from_u32(id as u32), Some(id));
        }
        assert_eq!(MessageIdentifier::from_u32(0xDEAD_BEEF), None);
    }

    #[test]
    fn test_protocol_version_ordering() {
        assert!(ProtocolVersion::Invalid < ProtocolVersion::V3);
        assert!(ProtocolVersion::V3 < ProtocolVersion::V4);
        assert!(ProtocolVersion::V4 <= PV_MAX);
    }

    #[test]
    fn test_schema_version_ordering() {
        let v2 = SchemaVersion { major: 2, minor: 0 };
        let v21 = SchemaVersion { major: 2, minor: 1 };
        let v1 = SchemaVersion { major: 1, minor: 9 };
        assert!(v21 >= SCHEMA_V2);
        assert!(v2 >= SCHEMA_V2);
        assert!(v1 < SCHEMA_V2);
    }

    #[test]
    fn test_message_base_wire_names() {
        let base = MessageBase {
            container_id: "c1".to_string(),
            activity_id: "a1".to_string(),
        };
        let json = serde_json::to_string(&base).expect("serialize should succeed");
        assert!(json.contains("\"ContainerId\":\"c1\""));
        assert!(json.contains("\"ActivityId\":\"a1\""));
    }

    #[test]
    fn test_response_base_omits_empty_error_records() {
        let base = MessageResponseBase {
            result: 0,
            activity_id: NIL_GUID.to_string(),
            error_records: Vec::new(),
        };
        let json = serde_json::to_string(&base).expect("serialize should succeed");
        assert!(!json.contains("ErrorRecords"));
    }

    #[test]
    fn test_create_response_omits_zero_selected_version() {
        let resp = ContainerCreateResponse::default();
        let json = serde_json::to_string(&resp).expect("serialize should succeed");
        assert!(!json.contains("SelectedProtocolVersion"));

        let resp = ContainerCreateResponse {
            selected_protocol_version: ProtocolVersion::V3 as u32,
            ..Default::default()
        };
        let json = serde_json::to_string(&resp).expect("serialize should succeed");
        assert!(json.contains("\"SelectedProtocolVersion\":3"));
    }

    #[test]
    fn test_notification_wire_shape() {
        let n = ContainerNotification {
            base: MessageBase {
                container_id: "c2".to_string(),
                activity_id: NIL_GUID.to_string(),
            },
            notification_type: NotificationType::UnexpectedExit,
            operation: ActiveOperation::None,
            result: 37,
            result_info: String::new(),
        };
        let json = serde_json::to_string(&n).expect("serialize should succeed");
        assert!(json.contains("\"Type\":\"UnexpectedExit\""));
        assert!(json.contains("\"Operation\":\"None\""));
        assert!(json.contains("\"Result\":37"));
    }

    #[test]
    fn test_capabilities_advertisement() {
        let caps = capabilities();
        assert!(!caps.send_host_create_message);
        assert!(!caps.send_host_start_message);
        assert_eq!(caps.runtime_os_type, "Linux");
        assert_eq!(
            caps.supported_schema_versions,
            vec![
                SchemaVersion { major: 1, minor: 0 },
                SchemaVersion { major: 2, minor: 1 },
            ]
        );
        let json = serde_json::to_string(&caps).expect("serialize should succeed");
        assert!(json.contains("\"HVSocketConfigOnStartup\":false"));
    }

    #[test]
    fn test_process_parameters_decode() {
        let doc = r#"{
            "CommandLine": "sh -c testexe",
            "WorkingDirectory": "/bin",
            "Environment": {"TERM": "xterm"},
            "CreateStdInPipe": true,
            "CreateStdOutPipe": true,
            "CreateStdErrPipe": false,
            "IsExternal": false,
            "SchemaVersion": {"Major": 2, "Minor": 1},
            "OciProcess": {"args": ["sh", "-c", "testexe"], "cwd": "/bin", "terminal": true}
        }"#;
        let params: ProcessParameters =
            serde_json::from_str(doc).expect("decode should succeed");
        assert_eq!(params.command_line, "sh -c testexe");
        assert!(params.schema_version >= SCHEMA_V2);
        let oci = params.oci_process.expect("should carry an OCI process");
        assert_eq!(oci.args, vec!["sh", "-c", "testexe"]);
        assert!(oci.terminal);
    }

    #[test]
    fn test_modify_settings_variants_decode() {
        let v1 = r#"{
            "ContainerId": "c1",
            "ActivityId": "a1",
            "Request": {"ResourceType": "MappedVirtualDisk", "RequestType": "Add"}
        }"#;
        let req: ContainerModifySettings =
            serde_json::from_str(v1).expect("decode should succeed");
        assert!(req.request.is_some());
        assert!(req.v2_request.is_none());

        let v2 = r#"{
            "ContainerId": "00000000-0000-0000-0000-000000000000",
            "V2Request": {"ResourceType": "Memory", "RequestType": "Update"}
        }"#;
        let req: ContainerModifySettings =
            serde_json::from_str(v2).expect("decode should succeed");
        assert!(req.request.is_none());
        assert!(req.v2_request.is_some());
    }
}
