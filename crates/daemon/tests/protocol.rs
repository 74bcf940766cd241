//! Wire format tests for the daemon's two sockets.
//!
//! These pin the exact JSON a CLI or compositor host plugin has to speak,
//! without starting the daemon.

use tessera_core_layout::{Placement, Rect, Slot, TilePlacement, WindowKind};
use tessera_ipc::{
    decode_line, encode_line, BackendRequest, HostEvent, IpcCommand, IpcResponse, ProtocolError,
    MAX_IPC_MESSAGE_SIZE,
};
use tessera_platform::{ActorProps, Completion, Container, EaseSpec, Easing, Pivot, Target};
use tessera_wm::MotionDirection;

// ============================================================================
// Control Socket
// ============================================================================

/// Every command the CLI can send, with its exact encoding.
#[test]
fn test_command_wire_format() {
    let cases = vec![
        (IpcCommand::FocusNext, r#"{"type":"focus_next"}"#),
        (IpcCommand::FocusPrev, r#"{"type":"focus_prev"}"#),
        (IpcCommand::SwapNext, r#"{"type":"swap_next"}"#),
        (IpcCommand::SwapPrev, r#"{"type":"swap_prev"}"#),
        (IpcCommand::Promote, r#"{"type":"promote"}"#),
        (
            IpcCommand::IncreaseMasterFactor,
            r#"{"type":"increase_master_factor"}"#,
        ),
        (
            IpcCommand::DecreaseMasterFactor,
            r#"{"type":"decrease_master_factor"}"#,
        ),
        (
            IpcCommand::SetMasterFactor { value: 0.5 },
            r#"{"type":"set_master_factor","value":0.5}"#,
        ),
        (IpcCommand::Retile, r#"{"type":"retile"}"#),
        (
            IpcCommand::QueryWorkspace { index: None },
            r#"{"type":"query_workspace"}"#,
        ),
        (IpcCommand::QueryFocused, r#"{"type":"query_focused"}"#),
        (IpcCommand::Reload, r#"{"type":"reload"}"#),
        (IpcCommand::Stop, r#"{"type":"stop"}"#),
    ];

    for (cmd, expected) in cases {
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert_eq!(json, expected, "Unexpected encoding for {:?}", cmd);

        let parsed: IpcCommand = decode_line(&format!("{}\n", expected)).expect("decode");
        assert_eq!(parsed, cmd);
    }
}

#[test]
fn test_workspace_state_response_format() {
    let resp = IpcResponse::WorkspaceState {
        workspace: 1,
        active: true,
        master_factor: 0.55,
        tiles: vec![TilePlacement {
            window_id: 7,
            rect: Rect::new(0, 0, 1920, 1080),
            slot: Slot::Master,
        }],
        untiled: vec![9],
    };

    let value = serde_json::to_value(&resp).expect("serialize");
    assert_eq!(value["status"], "workspace_state");
    assert_eq!(value["workspace"], 1);
    assert_eq!(value["tiles"][0]["window_id"], 7);
    assert_eq!(value["tiles"][0]["rect"]["width"], 1920);
    assert_eq!(value["tiles"][0]["slot"], "master");
    assert_eq!(value["untiled"][0], 9);
}

#[test]
fn test_focused_window_response_format() {
    let resp = IpcResponse::FocusedWindow {
        window_id: Some(3),
        workspace: Some(0),
        placement: Some(Placement::Floating),
    };
    let json = serde_json::to_string(&resp).expect("serialize");
    assert_eq!(
        json,
        r#"{"status":"focused_window","window_id":3,"workspace":0,"placement":"floating"}"#
    );

    let none: IpcResponse = serde_json::from_str(
        r#"{"status":"focused_window","window_id":null,"workspace":null,"placement":null}"#,
    )
    .expect("deserialize");
    assert_eq!(
        none,
        IpcResponse::FocusedWindow {
            window_id: None,
            workspace: None,
            placement: None,
        }
    );
}

/// Test error response with special characters.
#[test]
fn test_error_response_special_chars() {
    let error_msg = "Failed to process: \"window\" with <special> & chars\nsecond line";
    let line = encode_line(&IpcResponse::error(error_msg)).expect("encode");

    // Embedded newlines must be escaped so the message stays one line
    assert_eq!(line.matches('\n').count(), 1);

    match decode_line::<IpcResponse>(&line).expect("decode") {
        IpcResponse::Error { message } => assert_eq!(message, error_msg),
        other => panic!("Expected Error response, got {:?}", other),
    }
}

#[test]
fn test_unknown_command_is_rejected() {
    let result = decode_line::<IpcCommand>(r#"{"type":"focus_left"}"#);
    assert!(matches!(result, Err(ProtocolError::Json(_))));

    let result = decode_line::<IpcCommand>(r#"{"type":"set_master_factor"}"#);
    assert!(result.is_err(), "Missing value should be rejected");
}

#[test]
fn test_oversized_message_is_rejected() {
    let title = "x".repeat(MAX_IPC_MESSAGE_SIZE);
    let event = HostEvent::KeyPressed { accelerator: title };
    assert!(matches!(
        encode_line(&event),
        Err(ProtocolError::TooLarge { .. })
    ));
}

// ============================================================================
// Host Socket: Events
// ============================================================================

#[test]
fn test_hello_event_from_host() {
    let line = r#"{"event":"hello","width":1920,"height":1080,
        "work_area":{"x":0,"y":32,"width":1920,"height":1048},
        "active_workspace":0,
        "windows":[
            {"id":1,"kind":"normal","workspace":0,"class_name":"Alacritty","parent":{"type":"host","id":0}},
            {"id":2,"kind":"dialog","workspace":1,"showing":false,"parent":{"type":"host","id":0}}
        ]}"#;

    let event: HostEvent = decode_line(line).expect("decode hello");
    let HostEvent::Hello {
        width,
        height,
        work_area,
        active_workspace,
        windows,
    } = event
    else {
        panic!("Expected Hello");
    };

    assert_eq!((width, height), (1920, 1080));
    assert_eq!(work_area, Rect::new(0, 32, 1920, 1048));
    assert_eq!(active_workspace, 0);
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].info.class_name, "Alacritty");
    assert_eq!(windows[1].info.kind, WindowKind::Dialog);
    assert!(!windows[1].info.showing);
    assert_eq!(windows[1].parent, Container::Host(0));
}

#[test]
fn test_lifecycle_events_from_host() {
    let cases = vec![
        (
            r#"{"event":"switch_workspace","from":0,"to":1,"direction":"down_right"}"#,
            HostEvent::SwitchWorkspace {
                from: 0,
                to: 1,
                direction: MotionDirection::DownRight,
            },
        ),
        (
            r#"{"event":"transitions_completed","target":{"type":"actor","id":4},"seq":17}"#,
            HostEvent::TransitionsCompleted {
                target: Target::Actor(4),
                seq: 17,
            },
        ),
        (
            r#"{"event":"transitions_completed","target":{"type":"group","id":2},"seq":3}"#,
            HostEvent::TransitionsCompleted {
                target: Target::Group(2),
                seq: 3,
            },
        ),
        (
            r#"{"event":"kill_window_effects","window_id":4}"#,
            HostEvent::KillWindowEffects { window_id: 4 },
        ),
        (
            r#"{"event":"kill_switch_workspace"}"#,
            HostEvent::KillSwitchWorkspace,
        ),
        (
            r#"{"event":"focus_changed","window_id":null}"#,
            HostEvent::FocusChanged { window_id: None },
        ),
        (
            r#"{"event":"key_pressed","accelerator":"<Super>j"}"#,
            HostEvent::KeyPressed {
                accelerator: "<Super>j".to_string(),
            },
        ),
    ];

    for (line, expected) in cases {
        let event: HostEvent = decode_line(line).expect("decode");
        assert_eq!(event, expected, "Unexpected parse of {}", line);
    }
}

#[test]
fn test_destroy_event_carries_window_info() {
    let line = r#"{"event":"destroy","window":{"id":8,"kind":"notification","workspace":0}}"#;
    let HostEvent::Destroy { window } = decode_line(line).expect("decode") else {
        panic!("Expected Destroy");
    };
    assert_eq!(window.id, 8);
    assert_eq!(window.kind, WindowKind::Notification);
}

// ============================================================================
// Host Socket: Requests
// ============================================================================

#[test]
fn test_geometry_requests_to_host() {
    let request = BackendRequest::MoveResize {
        window_id: 5,
        rect: Rect::new(0, 0, 960, 1080),
    };
    assert_eq!(
        serde_json::to_string(&request).expect("serialize"),
        r#"{"request":"move_resize","window_id":5,"rect":{"x":0,"y":0,"width":960,"height":1080}}"#
    );

    let request = BackendRequest::Reparent {
        actor: 5,
        parent: Container::Group(3),
    };
    assert_eq!(
        serde_json::to_string(&request).expect("serialize"),
        r#"{"request":"reparent","actor":5,"parent":{"type":"group","id":3}}"#
    );
}

#[test]
fn test_effect_requests_to_host() {
    let request = BackendRequest::AnimateActor {
        actor: 5,
        props: ActorProps::new().opacity(255).scale(1.0).pivot(Pivot::CENTER),
        ease: EaseSpec::new(Easing::EaseIn, 150),
        seq: 9,
    };
    let value = serde_json::to_value(&request).expect("serialize");
    assert_eq!(value["request"], "animate_actor");
    assert_eq!(value["props"]["opacity"], 255);
    assert_eq!(value["props"]["scale"], 1.0);
    assert_eq!(value["ease"]["duration_ms"], 150);
    assert_eq!(value["seq"], 9);

    let parsed: BackendRequest = serde_json::from_value(value).expect("deserialize");
    assert_eq!(parsed, request);
}

#[test]
fn test_completion_requests_to_host() {
    let cases = vec![
        (
            Completion::Map(1),
            r#"{"request":"complete","completion":{"type":"map","window_id":1}}"#,
        ),
        (
            Completion::Destroy(2),
            r#"{"request":"complete","completion":{"type":"destroy","window_id":2}}"#,
        ),
        (
            Completion::SwitchWorkspace,
            r#"{"request":"complete","completion":{"type":"switch_workspace"}}"#,
        ),
    ];

    for (completion, expected) in cases {
        let json =
            serde_json::to_string(&BackendRequest::Complete { completion }).expect("serialize");
        assert_eq!(json, expected);
    }
}
