//! Tessera Core Layout
//!
//! Platform-agnostic window registry and master-stack tiling engine.
//!
//! This crate implements the classic master-stack paradigm where:
//! - The most recently mapped tiled window becomes the master
//! - The master occupies a left column sized by the master factor
//! - Every other tiled window shares the right column in equal rows

mod registry;
mod tiling;

use serde::{Deserialize, Serialize};

pub use registry::{ManagedWindow, Registry, WorkspaceState};
pub use tiling::{
    can_tile, clamp_master_factor, layout, next_tiled, prev_tiled, Slot, TilePlacement,
    DEFAULT_MASTER_FACTOR, MAX_MASTER_FACTOR, MIN_MASTER_FACTOR,
};

/// Unique identifier for a window.
/// This is the host's stable handle for the window and its actor.
pub type WindowId = u64;

/// Index of a workspace, as numbered by the host.
pub type WorkspaceIndex = u32;

/// A rectangle in screen coordinates (pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Check if this rectangle intersects with another.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Get the right edge x-coordinate.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Get the bottom edge y-coordinate.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Area in square pixels.
    pub fn area(&self) -> i64 {
        i64::from(self.width) * i64::from(self.height)
    }
}

/// The host's classification of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Normal,
    Dialog,
    ModalDialog,
    Notification,
    PopupMenu,
    DropdownMenu,
    Other,
}

impl WindowKind {
    /// Whether windows of this kind may take part in tiling at all.
    pub fn is_tileable(self) -> bool {
        match self {
            WindowKind::Normal
            | WindowKind::Dialog
            | WindowKind::ModalDialog
            | WindowKind::Notification => true,
            WindowKind::PopupMenu | WindowKind::DropdownMenu | WindowKind::Other => false,
        }
    }
}

/// How a managed window is positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Geometry is fully determined by the tiling layout.
    Tiled,
    /// Positioned and sized independently of the layout.
    Floating,
    /// Minimized; kept in the registry but out of the layout.
    Minimized,
}

/// The host's read-only description of a window.
///
/// Delivered by window enumeration and by lifecycle events. The core never
/// mutates it; it only decides from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    /// The window handle.
    pub id: WindowId,
    /// Window type as reported by the host.
    pub kind: WindowKind,
    /// Workspace the window lives on.
    pub workspace: WorkspaceIndex,
    /// Current rectangle on screen.
    #[serde(default)]
    pub rect: Rect,
    /// The host (or a rule) wants this window floating.
    #[serde(default)]
    pub floating: bool,
    /// The window is minimized.
    #[serde(default)]
    pub minimized: bool,
    /// The window is shown on every workspace.
    #[serde(default)]
    pub on_all_workspaces: bool,
    /// The window is currently showing on its own workspace.
    #[serde(default = "default_showing")]
    pub showing: bool,
    /// The window declares a fixed (non-resizable) size.
    #[serde(default)]
    pub fixed_size: bool,
    /// The window this one is transient for, if any.
    #[serde(default)]
    pub transient_for: Option<WindowId>,
    /// Window class, used by window rules.
    #[serde(default)]
    pub class_name: String,
    /// Window title, used by window rules.
    #[serde(default)]
    pub title: String,
}

fn default_showing() -> bool {
    true
}

impl WindowInfo {
    /// Create a plain, showing window of the given kind with no hints.
    pub fn new(id: WindowId, kind: WindowKind, workspace: WorkspaceIndex) -> Self {
        Self {
            id,
            kind,
            workspace,
            rect: Rect::default(),
            floating: false,
            minimized: false,
            on_all_workspaces: false,
            showing: true,
            fixed_size: false,
            transient_for: None,
            class_name: String::new(),
            title: String::new(),
        }
    }
}
