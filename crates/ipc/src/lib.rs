//! Tessera IPC Protocol
//!
//! Shared types for the two sockets the daemon listens on:
//! - The control socket, where the CLI sends one [`IpcCommand`] and gets
//!   one [`IpcResponse`] back
//! - The host socket, where the compositor plugin streams [`HostEvent`]s
//!   in and receives [`BackendRequest`]s
//!
//! Every message is a single line of JSON.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_core_layout::{Placement, Rect, TilePlacement, WindowId, WindowInfo, WorkspaceIndex};
use tessera_platform::{
    ActorId, ActorProps, Completion, Container, EaseSpec, GroupId, Target, TransitionSeq,
};
use tessera_wm::MotionDirection;
use thiserror::Error;

/// File name of the control socket.
pub const SOCKET_NAME: &str = "tessera.sock";

/// File name of the compositor host socket.
pub const HOST_SOCKET_NAME: &str = "tessera-host.sock";

/// Upper bound for a single message line, newline included.
pub const MAX_IPC_MESSAGE_SIZE: usize = 1024 * 1024;

/// Directory the sockets live in: `$XDG_RUNTIME_DIR`, or the temp dir.
pub fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Path of the control socket.
pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_NAME)
}

/// Path of the compositor host socket.
pub fn host_socket_path() -> PathBuf {
    runtime_dir().join(HOST_SOCKET_NAME)
}

/// Errors when framing or parsing a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Message of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge {
            size: line.len(),
            max: MAX_IPC_MESSAGE_SIZE,
        });
    }
    Ok(line)
}

/// Parse one JSON line. Surrounding whitespace is ignored.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge {
            size: line.len(),
            max: MAX_IPC_MESSAGE_SIZE,
        });
    }
    Ok(serde_json::from_str(line.trim())?)
}

/// Commands that can be sent from the CLI (or a keybinding) to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Focus the next tiled window.
    FocusNext,
    /// Focus the previous tiled window.
    FocusPrev,

    /// Swap the focused window with the next one.
    SwapNext,
    /// Swap the focused window with the previous one.
    SwapPrev,
    /// Make the focused window the master.
    Promote,

    /// Grow the master column by one step.
    IncreaseMasterFactor,
    /// Shrink the master column by one step.
    DecreaseMasterFactor,
    /// Set the master factor of the active workspace.
    SetMasterFactor {
        /// Fraction of the width, clamped to [0.1, 0.9].
        value: f64,
    },

    /// Re-apply the layout of every workspace.
    Retile,

    /// Query a workspace (the active one when `index` is omitted).
    QueryWorkspace {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<WorkspaceIndex>,
    },
    /// Query the focused window.
    QueryFocused,

    /// Reload configuration from file.
    Reload,
    /// Stop the daemon.
    Stop,
}

/// Responses from the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully.
    Ok,
    /// Command failed with an error.
    Error {
        /// Error message describing what went wrong.
        message: String,
    },
    /// Workspace state query response.
    WorkspaceState {
        workspace: WorkspaceIndex,
        /// Whether this is the workspace on screen.
        active: bool,
        master_factor: f64,
        /// Tiled windows, master first.
        tiles: Vec<TilePlacement>,
        /// Floating and minimized windows of the workspace.
        untiled: Vec<WindowId>,
    },
    /// Focused window query response.
    FocusedWindow {
        /// Window ID of the focused window, if any.
        window_id: Option<WindowId>,
        workspace: Option<WorkspaceIndex>,
        placement: Option<Placement>,
    },
}

impl IpcResponse {
    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// A window as announced by the host, with the container its actor sits in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostWindow {
    #[serde(flatten)]
    pub info: WindowInfo,
    pub parent: Container,
}

/// Events the compositor host sends to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// First message on a connection: the full picture.
    Hello {
        width: i32,
        height: i32,
        work_area: Rect,
        active_workspace: WorkspaceIndex,
        windows: Vec<HostWindow>,
    },
    /// A window is being mapped; the host waits for a map completion.
    Map { window: HostWindow },
    /// A window is being destroyed; the host waits for a destroy completion.
    Destroy { window: WindowInfo },
    /// Workspace, floating or minimized state of a window changed.
    WindowChanged { window: WindowInfo },
    /// The user switched workspace; the host waits for a switch completion.
    SwitchWorkspace {
        from: WorkspaceIndex,
        to: WorkspaceIndex,
        direction: MotionDirection,
    },
    /// Every transition of a target finished. `seq` is the tag of the
    /// latest `animate_*` request the host received for that target.
    TransitionsCompleted { target: Target, seq: TransitionSeq },
    /// Finish the effects of a window right now.
    KillWindowEffects { window_id: ActorId },
    /// Finish the workspace switch right now.
    KillSwitchWorkspace,
    /// Keyboard focus moved.
    FocusChanged { window_id: Option<WindowId> },
    /// Screen size or panels changed.
    ScreenChanged {
        width: i32,
        height: i32,
        work_area: Rect,
    },
    /// A grabbed accelerator was pressed.
    KeyPressed { accelerator: String },
}

/// Requests the daemon sends to the compositor host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum BackendRequest {
    MoveResize { window_id: WindowId, rect: Rect },
    Unmaximize { window_id: WindowId },
    Activate { window_id: WindowId },
    Show { actor: ActorId },
    SetActorProps { actor: ActorId, props: ActorProps },
    /// `seq` must be echoed in the matching `transitions_completed`.
    AnimateActor {
        actor: ActorId,
        props: ActorProps,
        ease: EaseSpec,
        seq: TransitionSeq,
    },
    RemoveAllTransitions { target: Target },
    /// Create a group with an id chosen by the daemon.
    CreateGroup { group: GroupId },
    DestroyGroup { group: GroupId },
    SetGroupPosition { group: GroupId, x: i32, y: i32 },
    AnimateGroupPosition {
        group: GroupId,
        x: i32,
        y: i32,
        ease: EaseSpec,
        seq: TransitionSeq,
    },
    Reparent { actor: ActorId, parent: Container },
    Complete { completion: Completion },
    /// Replace the set of accelerators reported through `key_pressed`.
    GrabKeys { accelerators: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core_layout::WindowKind;
    use tessera_platform::Easing;

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::FocusNext;
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"focus_next"}"#);

        let cmd2: IpcCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, cmd2);
    }

    #[test]
    fn test_query_workspace_index_is_optional() {
        let cmd: IpcCommand = serde_json::from_str(r#"{"type":"query_workspace"}"#).unwrap();
        assert_eq!(cmd, IpcCommand::QueryWorkspace { index: None });

        let json = serde_json::to_string(&IpcCommand::QueryWorkspace { index: Some(2) }).unwrap();
        assert_eq!(json, r#"{"type":"query_workspace","index":2}"#);
    }

    #[test]
    fn test_set_master_factor_serialization() {
        let cmd = IpcCommand::SetMasterFactor { value: 0.6 };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("set_master_factor"));
        assert!(json.contains("0.6"));
    }

    #[test]
    fn test_error_response() {
        let resp = IpcResponse::error("Something went wrong");
        if let IpcResponse::Error { message } = resp {
            assert_eq!(message, "Something went wrong");
        } else {
            panic!("Expected Error response");
        }
    }

    #[test]
    fn test_host_window_is_flat() {
        let window = HostWindow {
            info: WindowInfo::new(5, WindowKind::Normal, 1),
            parent: Container::Host(0),
        };
        let value = serde_json::to_value(&window).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["kind"], "normal");
        assert_eq!(value["parent"]["type"], "host");

        let parsed: HostWindow = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, window);
    }

    #[test]
    fn test_minimal_map_event() {
        let line = r#"{"event":"map","window":{"id":9,"kind":"dialog","workspace":0,"parent":{"type":"host","id":0}}}"#;
        let event: HostEvent = decode_line(line).unwrap();
        let HostEvent::Map { window } = event else {
            panic!("Expected Map event");
        };
        assert_eq!(window.info.id, 9);
        assert_eq!(window.info.kind, WindowKind::Dialog);
        assert!(window.info.showing);
        assert!(!window.info.floating);
    }

    #[test]
    fn test_encode_line_is_newline_terminated() {
        let request = BackendRequest::AnimateGroupPosition {
            group: 3,
            x: -1920,
            y: 0,
            ease: EaseSpec::new(Easing::EaseOutQuad, 250),
            seq: 12,
        };
        let line = encode_line(&request).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let parsed: BackendRequest = decode_line(&line).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_transitions_completed_requires_seq() {
        let line = r#"{"event":"transitions_completed","target":{"type":"actor","id":4}}"#;
        assert!(decode_line::<HostEvent>(line).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_line::<IpcCommand>("not valid json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(decode_line::<IpcCommand>(r#"{"type":"unknown_command"}"#).is_err());
        assert!(decode_line::<HostEvent>(r#"{"event":"map"}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_line() {
        let line = " ".repeat(MAX_IPC_MESSAGE_SIZE + 1);
        assert!(matches!(
            decode_line::<IpcCommand>(&line),
            Err(ProtocolError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_socket_paths() {
        assert!(socket_path().ends_with(SOCKET_NAME));
        assert!(host_socket_path().ends_with(HOST_SOCKET_NAME));
        assert_ne!(socket_path(), host_socket_path());
    }
}
