//! Tessera CLI
//!
//! Command-line interface for controlling the Tessera window manager.
//!
//! Each invocation sends one command to the daemon over its Unix socket
//! and prints the response.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tessera_ipc::{decode_line, encode_line, socket_path, IpcCommand, IpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// How long to wait for the daemon to answer.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tessera-cli")]
#[command(author, version, about = "Control the Tessera window manager")]
struct Cli {
    /// Path of the daemon's control socket
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Print responses as raw JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move focus through the tiled windows
    Focus {
        #[command(subcommand)]
        direction: CycleDirection,
    },
    /// Swap the focused window with a neighbour
    Swap {
        #[command(subcommand)]
        direction: CycleDirection,
    },
    /// Make the focused window the master
    Promote,
    /// Change the width of the master column
    MasterFactor {
        #[command(subcommand)]
        action: MasterFactorAction,
    },
    /// Re-apply the layout of every workspace
    Retile,
    /// Query window manager state
    Query {
        #[command(subcommand)]
        what: QueryType,
    },
    /// Reload configuration
    Reload,
    /// Stop the daemon
    Stop,
}

#[derive(Subcommand)]
enum CycleDirection {
    /// The next window in layout order
    Next,
    /// The previous window in layout order
    Prev,
}

#[derive(Subcommand)]
enum MasterFactorAction {
    /// Grow the master column by one step
    Increase,
    /// Shrink the master column by one step
    Decrease,
    /// Set the master factor of the active workspace
    Set {
        /// Fraction of the screen width, between 0.1 and 0.9
        value: f64,
    },
}

#[derive(Subcommand)]
enum QueryType {
    /// Get workspace state
    Workspace {
        /// Workspace index (default: the active workspace)
        index: Option<u32>,
    },
    /// Get focused window info
    Focused,
}

impl Commands {
    fn into_ipc(self) -> IpcCommand {
        match self {
            Commands::Focus { direction } => match direction {
                CycleDirection::Next => IpcCommand::FocusNext,
                CycleDirection::Prev => IpcCommand::FocusPrev,
            },
            Commands::Swap { direction } => match direction {
                CycleDirection::Next => IpcCommand::SwapNext,
                CycleDirection::Prev => IpcCommand::SwapPrev,
            },
            Commands::Promote => IpcCommand::Promote,
            Commands::MasterFactor { action } => match action {
                MasterFactorAction::Increase => IpcCommand::IncreaseMasterFactor,
                MasterFactorAction::Decrease => IpcCommand::DecreaseMasterFactor,
                MasterFactorAction::Set { value } => IpcCommand::SetMasterFactor { value },
            },
            Commands::Retile => IpcCommand::Retile,
            Commands::Query { what } => match what {
                QueryType::Workspace { index } => IpcCommand::QueryWorkspace { index },
                QueryType::Focused => IpcCommand::QueryFocused,
            },
            Commands::Reload => IpcCommand::Reload,
            Commands::Stop => IpcCommand::Stop,
        }
    }
}

/// Send one command and wait for the daemon's answer.
async fn send_command(path: &Path, cmd: &IpcCommand) -> Result<IpcResponse> {
    let stream = UnixStream::connect(path).await.with_context(|| {
        format!(
            "Failed to connect to {} (is tesserad running?)",
            path.display()
        )
    })?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(encode_line(cmd)?.as_bytes()).await?;
    writer.flush().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let bytes_read = tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("Timed out waiting for the daemon")??;
    if bytes_read == 0 {
        bail!("Daemon closed the connection without answering");
    }

    Ok(decode_line(&line)?)
}

fn print_response(response: &IpcResponse) -> Result<()> {
    match response {
        IpcResponse::Ok => {}
        IpcResponse::Error { message } => bail!("{}", message),
        IpcResponse::WorkspaceState {
            workspace,
            active,
            master_factor,
            tiles,
            untiled,
        } => {
            println!(
                "Workspace {}{}: master factor {:.2}",
                workspace,
                if *active { " (active)" } else { "" },
                master_factor
            );
            for tile in tiles {
                println!(
                    "  {:>10}  {:?}  {}x{}+{}+{}",
                    tile.window_id,
                    tile.slot,
                    tile.rect.width,
                    tile.rect.height,
                    tile.rect.x,
                    tile.rect.y
                );
            }
            if !untiled.is_empty() {
                println!("  untiled: {:?}", untiled);
            }
        }
        IpcResponse::FocusedWindow {
            window_id,
            workspace,
            placement,
        } => match (window_id, workspace, placement) {
            (Some(id), Some(workspace), Some(placement)) => {
                println!("{} on workspace {} ({:?})", id, workspace, placement);
            }
            _ => println!("No managed window is focused"),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.socket.unwrap_or_else(socket_path);

    let response = send_command(&path, &cli.command.into_ipc()).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        if let IpcResponse::Error { message } = response {
            bail!("{}", message);
        }
        return Ok(());
    }
    print_response(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> IpcCommand {
        let mut argv = vec!["tessera-cli"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command.into_ipc()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_map_to_ipc() {
        assert_eq!(parse(&["focus", "next"]), IpcCommand::FocusNext);
        assert_eq!(parse(&["swap", "prev"]), IpcCommand::SwapPrev);
        assert_eq!(parse(&["promote"]), IpcCommand::Promote);
        assert_eq!(
            parse(&["master-factor", "increase"]),
            IpcCommand::IncreaseMasterFactor
        );
        assert_eq!(
            parse(&["master-factor", "set", "0.6"]),
            IpcCommand::SetMasterFactor { value: 0.6 }
        );
        assert_eq!(
            parse(&["query", "workspace"]),
            IpcCommand::QueryWorkspace { index: None }
        );
        assert_eq!(
            parse(&["query", "workspace", "2"]),
            IpcCommand::QueryWorkspace { index: Some(2) }
        );
        assert_eq!(parse(&["stop"]), IpcCommand::Stop);
    }

    #[test]
    fn test_global_flags() {
        let argv = ["tessera-cli", "retile", "--json", "--socket", "/tmp/t.sock"];
        let cli = Cli::try_parse_from(argv).unwrap();
        assert!(cli.json);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/t.sock")));
    }

    #[test]
    fn test_error_response_fails() {
        assert!(print_response(&IpcResponse::error("boom")).is_err());
        assert!(print_response(&IpcResponse::Ok).is_ok());
    }

    #[tokio::test]
    async fn test_missing_daemon_is_reported() {
        let path = std::env::temp_dir().join("tessera-cli-test-no-daemon.sock");
        let err = send_command(&path, &IpcCommand::Retile).await.unwrap_err();
        assert!(err.to_string().contains("is tesserad running"));
    }
}
