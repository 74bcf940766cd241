//! Tessera Daemon
//!
//! Main daemon process for the Tessera window manager.
//!
//! Responsibilities:
//! - Accept the compositor host connection and mirror its windows
//! - Route host lifecycle events through the window manager
//! - Handle IPC commands from the CLI and keybindings
//! - Send geometry, effect and completion requests back to the host

mod config;
mod remote;

use anyhow::{Context, Result};
use config::Config;
use remote::RemoteCompositor;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tessera_core_layout::{Placement, WindowInfo};
use tessera_ipc::{
    decode_line, encode_line, host_socket_path, socket_path, BackendRequest, HostEvent,
    IpcCommand, IpcResponse, MAX_IPC_MESSAGE_SIZE,
};
use tessera_wm::WindowManager;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// An IPC command from a CLI client.
    IpcCommand {
        cmd: IpcCommand,
        responder: oneshot::Sender<IpcResponse>,
    },
    /// A compositor host connected; requests go out through `outbound`.
    HostConnected {
        outbound: mpsc::Sender<BackendRequest>,
    },
    /// An event from the compositor host.
    Host(HostEvent),
    /// The compositor host went away.
    HostDisconnected,
    /// Shutdown signal.
    Shutdown,
}

/// IPC read timeout - clients must send within this period.
const IPC_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the queue of requests waiting to be written to the host.
const HOST_QUEUE_CAPACITY: usize = 1024;

/// Everything the event loop owns.
struct AppState {
    config: Config,
    manager: WindowManager,
    compositor: RemoteCompositor,
    key_bindings: HashMap<String, IpcCommand>,
    host: Option<mpsc::Sender<BackendRequest>>,
}

impl AppState {
    fn new(config: Config) -> Self {
        Self {
            manager: WindowManager::new(config.manager_settings()),
            compositor: RemoteCompositor::new(),
            key_bindings: config.key_bindings(),
            host: None,
            config,
        }
    }

    /// Host description of a window with the window rules applied.
    fn ruled(&self, window: &WindowInfo) -> WindowInfo {
        let mut window = window.clone();
        self.config.apply_window_rules(&mut window);
        window
    }

    fn grab_keys(&mut self) {
        let mut accelerators: Vec<String> = self.key_bindings.keys().cloned().collect();
        accelerators.sort();
        self.compositor.push(BackendRequest::GrabKeys { accelerators });
    }

    /// Send queued backend requests to the host.
    async fn flush(&mut self) {
        let requests = self.compositor.take_requests();
        let Some(host) = self.host.clone() else {
            return;
        };
        for request in requests {
            if host.send(request).await.is_err() {
                warn!("Host writer is gone, dropping requests");
                self.host = None;
                self.compositor.disconnect();
                return;
            }
        }
    }

    fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Hello {
                width,
                height,
                work_area,
                active_workspace,
                windows,
            } => {
                info!(
                    "Host says hello: {}x{}, {} windows, workspace {}",
                    width,
                    height,
                    windows.len(),
                    active_workspace
                );
                let infos: Vec<WindowInfo> =
                    windows.iter().map(|w| self.ruled(&w.info)).collect();

                // Requests of the previous session still get their completions.
                self.manager.shutdown(&mut self.compositor);
                self.compositor.connect(width, height, work_area, windows);
                self.manager = WindowManager::new(self.config.manager_settings());
                self.manager.set_active_workspace(active_workspace);
                self.grab_keys();

                if self.config.behavior.manage_existing {
                    self.manager.adopt_existing(&mut self.compositor, &infos);
                } else {
                    self.manager.fade_in(&mut self.compositor, &infos);
                }
            }
            HostEvent::Map { window } => {
                let info = self.ruled(&window.info);
                self.compositor.insert_window(window);
                self.manager.map(&mut self.compositor, &info);
            }
            HostEvent::Destroy { window } => {
                if self.compositor.window(window.id).is_none() {
                    debug!("Destroy for window {} the host never announced", window.id);
                }
                self.manager.destroy(&mut self.compositor, &window);
            }
            HostEvent::WindowChanged { window } => {
                let info = self.ruled(&window);
                self.compositor.update_window(window);
                self.manager.window_changed(&mut self.compositor, &info);
            }
            HostEvent::SwitchWorkspace {
                from,
                to,
                direction,
            } => {
                self.manager
                    .switch_workspace(&mut self.compositor, from, to, direction);
            }
            HostEvent::TransitionsCompleted { target, seq } => {
                self.manager
                    .on_transitions_completed(&mut self.compositor, target, seq);
            }
            HostEvent::KillWindowEffects { window_id } => {
                self.manager
                    .kill_window_effects(&mut self.compositor, window_id);
            }
            HostEvent::KillSwitchWorkspace => {
                self.manager.kill_switch_workspace(&mut self.compositor);
            }
            HostEvent::FocusChanged { window_id } => {
                self.manager.focus_changed(window_id);
            }
            HostEvent::ScreenChanged {
                width,
                height,
                work_area,
            } => {
                info!("Screen changed: {}x{}, work area {:?}", width, height, work_area);
                self.compositor.set_screen(width, height, work_area);
                self.manager.retile_all(&mut self.compositor);
            }
            HostEvent::KeyPressed { accelerator } => {
                let Some(cmd) = self.key_bindings.get(&accelerator).cloned() else {
                    debug!("No binding for key {}", accelerator);
                    return;
                };
                debug!("Key {} -> {:?}", accelerator, cmd);
                if let IpcResponse::Error { message } = self.handle_command(cmd) {
                    warn!("Key binding {} failed: {}", accelerator, message);
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: IpcCommand) -> IpcResponse {
        let needs_host = !matches!(
            cmd,
            IpcCommand::QueryWorkspace { .. }
                | IpcCommand::QueryFocused
                | IpcCommand::Reload
                | IpcCommand::Stop
        );
        if needs_host && !self.compositor.is_connected() {
            return IpcResponse::error("No compositor host connected");
        }

        match &cmd {
            IpcCommand::QueryWorkspace { index } => return self.query_workspace(*index),
            IpcCommand::QueryFocused => return self.query_focused(),
            IpcCommand::Reload => return self.reload(),
            _ => {}
        }

        let compositor = &mut self.compositor;
        match cmd {
            IpcCommand::FocusNext => self.manager.focus_next(compositor),
            IpcCommand::FocusPrev => self.manager.focus_prev(compositor),
            IpcCommand::SwapNext => self.manager.swap_next(compositor),
            IpcCommand::SwapPrev => self.manager.swap_prev(compositor),
            IpcCommand::Promote => self.manager.promote(compositor),
            IpcCommand::IncreaseMasterFactor => self.manager.increase_master_factor(compositor),
            IpcCommand::DecreaseMasterFactor => self.manager.decrease_master_factor(compositor),
            IpcCommand::SetMasterFactor { value } => {
                if !value.is_finite() {
                    return IpcResponse::error(format!("Invalid master factor: {}", value));
                }
                self.manager.set_master_factor(compositor, value);
            }
            IpcCommand::Retile => self.manager.retile_all(compositor),
            IpcCommand::QueryWorkspace { .. }
            | IpcCommand::QueryFocused
            | IpcCommand::Reload
            | IpcCommand::Stop => {}
        }
        IpcResponse::Ok
    }

    fn query_workspace(&self, index: Option<u32>) -> IpcResponse {
        let registry = self.manager.registry();
        let workspace = index.unwrap_or_else(|| self.manager.active_workspace());

        let mut untiled: Vec<u64> = registry
            .windows()
            .filter(|w| w.workspace == workspace && w.placement != Placement::Tiled)
            .map(|w| w.id)
            .collect();
        untiled.sort_unstable();

        IpcResponse::WorkspaceState {
            workspace,
            active: workspace == self.manager.active_workspace(),
            master_factor: registry.master_factor(workspace),
            tiles: self.manager.layout_for(&self.compositor, workspace),
            untiled,
        }
    }

    fn query_focused(&self) -> IpcResponse {
        let registry = self.manager.registry();
        let window = registry.focused().and_then(|id| registry.get(id));
        IpcResponse::FocusedWindow {
            window_id: window.map(|w| w.id),
            workspace: window.map(|w| w.workspace),
            placement: window.map(|w| w.placement),
        }
    }

    fn reload(&mut self) -> IpcResponse {
        let mut config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to reload config: {:#}", e);
                return IpcResponse::error(format!("Failed to reload config: {:#}", e));
            }
        };
        for w in config.validate() {
            warn!("Config: {} - {}", w.field, w.message);
        }

        self.manager
            .apply_settings(&mut self.compositor, config.manager_settings());
        self.key_bindings = config.key_bindings();
        self.config = config;
        self.grab_keys();

        info!("Configuration reloaded");
        IpcResponse::Ok
    }

    fn shutdown(&mut self) {
        self.manager.shutdown(&mut self.compositor);
    }
}

/// Run the IPC server, accepting connections and dispatching commands.
async fn run_ipc_server(listener: UnixListener, event_tx: mpsc::Sender<DaemonEvent>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Failed to accept client connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        debug!("Client connected");

        // Handle this client
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, event_tx).await {
                warn!("Client handler error: {}", e);
            }
        });
    }
}

/// Serialize a response, falling back to a fixed error line.
fn response_line(response: &IpcResponse) -> String {
    encode_line(response).unwrap_or_else(|e| {
        warn!("Failed to serialize IPC response: {}", e);
        "{\"status\":\"error\",\"message\":\"Internal serialization error\"}\n".to_string()
    })
}

/// Handle a single client connection.
async fn handle_client(stream: UnixStream, event_tx: mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let limited_reader = reader.take(MAX_IPC_MESSAGE_SIZE as u64);
    let mut reader = BufReader::new(limited_reader);
    let mut line = String::new();

    // Read command (single line of JSON) with timeout and size bound
    let read_result = tokio::time::timeout(IPC_READ_TIMEOUT, reader.read_line(&mut line)).await;
    let bytes_read = match read_result {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            // Timeout: client did not send in time, silently close
            return Ok(());
        }
    };
    if bytes_read == 0 {
        return Ok(()); // Client disconnected
    }

    debug!("Received command: {}", line.trim());

    let cmd: IpcCommand = match decode_line(&line) {
        Ok(cmd) => cmd,
        Err(e) => {
            let response = IpcResponse::error(format!("Invalid command: {}", e));
            writer.write_all(response_line(&response).as_bytes()).await?;
            return Ok(());
        }
    };

    let is_stop = matches!(cmd, IpcCommand::Stop);
    let (resp_tx, resp_rx) = oneshot::channel();

    if event_tx
        .send(DaemonEvent::IpcCommand {
            cmd,
            responder: resp_tx,
        })
        .await
        .is_err()
    {
        let response = IpcResponse::error("Daemon is shutting down");
        writer.write_all(response_line(&response).as_bytes()).await?;
        return Ok(());
    }

    let response = match resp_rx.await {
        Ok(resp) => resp,
        Err(_) => IpcResponse::error("Failed to get response from daemon"),
    };
    writer.write_all(response_line(&response).as_bytes()).await?;

    if is_stop {
        let _ = event_tx.send(DaemonEvent::Shutdown).await;
    }

    Ok(())
}

/// Accept compositor host connections, one at a time.
async fn run_host_server(listener: UnixListener, event_tx: mpsc::Sender<DaemonEvent>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Failed to accept host connection: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        info!("Compositor host connected");
        if let Err(e) = serve_host(stream, &event_tx).await {
            warn!("Host connection error: {:#}", e);
        }
        info!("Compositor host disconnected");

        if event_tx.send(DaemonEvent::HostDisconnected).await.is_err() {
            return;
        }
    }
}

/// Pump one host connection until it closes.
async fn serve_host(stream: UnixStream, event_tx: &mpsc::Sender<DaemonEvent>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<BackendRequest>(HOST_QUEUE_CAPACITY);

    event_tx
        .send(DaemonEvent::HostConnected {
            outbound: outbound_tx,
        })
        .await
        .context("Event loop is gone")?;

    let writer_task = tokio::spawn(async move {
        while let Some(request) = outbound_rx.recv().await {
            let line = match encode_line(&request) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to encode {:?}: {}", request, e);
                    continue;
                }
            };
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Failed to write to host: {}", e);
                break;
            }
        }
    });

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let result = loop {
        line.clear();
        // Bound each line so a broken host cannot grow the buffer forever.
        let read = (&mut reader)
            .take(MAX_IPC_MESSAGE_SIZE as u64)
            .read_line(&mut line)
            .await;
        match read {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e.into()),
        }
        if !line.ends_with('\n') {
            break Err(anyhow::anyhow!(
                "Host message exceeds {} bytes",
                MAX_IPC_MESSAGE_SIZE
            ));
        }

        match decode_line::<HostEvent>(&line) {
            Ok(event) => {
                if event_tx.send(DaemonEvent::Host(event)).await.is_err() {
                    break Ok(());
                }
            }
            Err(e) => warn!("Ignoring host message: {}", e),
        }
    };

    writer_task.abort();
    result
}

/// Bind a socket, refusing to steal one that another daemon is serving.
async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            anyhow::bail!(
                "Another tessera daemon is already listening on {}",
                path.display()
            );
        }
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("Failed to bind {}", path.display()))
}

fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // default fallback for invalid values
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (needed for log level)
    let mut config = Config::load().unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {:#}. Using defaults.", e);
        Config::default()
    });

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_log_level(&config.behavior.log_level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Validate and clamp config values
    for w in config.validate() {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("Tessera daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: master_factor={}, master_factor_step={}, log_level={}",
        config.layout.master_factor, config.layout.master_factor_step, config.behavior.log_level
    );

    let control_path = socket_path();
    let host_path = host_socket_path();
    let control_listener = bind_socket(&control_path).await?;
    let host_listener = bind_socket(&host_path).await?;
    info!("Listening on {} and {}", control_path.display(), host_path.display());

    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    let ipc_task = tokio::spawn(run_ipc_server(control_listener, event_tx.clone()));
    let host_task = tokio::spawn(run_host_server(host_listener, event_tx.clone()));

    {
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                let _ = event_tx.send(DaemonEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    let mut state = AppState::new(config);

    while let Some(event) = event_rx.recv().await {
        match event {
            DaemonEvent::IpcCommand { cmd, responder } => {
                debug!("IPC command: {:?}", cmd);
                let response = state.handle_command(cmd);
                let _ = responder.send(response);
            }
            DaemonEvent::HostConnected { outbound } => {
                if state.host.is_some() {
                    warn!("Replacing previous host connection");
                }
                state.host = Some(outbound);
            }
            DaemonEvent::Host(event) => {
                state.handle_host_event(event);
            }
            DaemonEvent::HostDisconnected => {
                state.host = None;
                state.compositor.disconnect();
                state.shutdown();
            }
            DaemonEvent::Shutdown => {
                info!("Shutdown signal received");
                state.shutdown();
                state.flush().await;
                break;
            }
        }
        state.flush().await;
    }

    ipc_task.abort();
    host_task.abort();
    for path in [&control_path, &host_path] {
        if let Err(e) = std::fs::remove_file(path) {
            debug!("Failed to remove {}: {}", path.display(), e);
        }
    }

    info!("Tessera daemon shutting down.");
    Ok(())
}
