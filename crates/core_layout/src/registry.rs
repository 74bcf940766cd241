//! The window registry.
//!
//! Tracks every managed window, the per-workspace tiling order and the
//! focused window. All operations are total: an unknown id degrades to a
//! no-op, because the host may report events for windows whose lifecycle
//! already raced ahead of the registry.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::tiling::{self, clamp_master_factor, TilePlacement, DEFAULT_MASTER_FACTOR};
use crate::{Placement, Rect, WindowId, WindowInfo, WindowKind, WorkspaceIndex};

/// One window under the manager's control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedWindow {
    /// The window identifier.
    pub id: WindowId,
    /// Window type.
    pub kind: WindowKind,
    /// How the window is positioned.
    pub placement: Placement,
    /// Workspace the window lives on.
    pub workspace: WorkspaceIndex,
    /// Last rectangle assigned by the layout, if the window was ever tiled.
    pub geometry: Option<Rect>,
}

/// Per-workspace tiling context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceState {
    index: WorkspaceIndex,
    /// Tiled windows; the head is the master.
    order: Vec<WindowId>,
    master_factor: f64,
}

impl WorkspaceState {
    /// Create an empty workspace state.
    pub fn new(index: WorkspaceIndex, master_factor: f64) -> Self {
        Self {
            index,
            order: Vec::new(),
            master_factor: clamp_master_factor(master_factor),
        }
    }

    /// The workspace index.
    pub fn index(&self) -> WorkspaceIndex {
        self.index
    }

    /// Tiled windows in layout order, master first.
    pub fn order(&self) -> &[WindowId] {
        &self.order
    }

    /// The master window, if any.
    pub fn master(&self) -> Option<WindowId> {
        self.order.first().copied()
    }

    /// The (already clamped) master factor.
    pub fn master_factor(&self) -> f64 {
        self.master_factor
    }

    /// Check if the workspace has no tiled windows.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of tiled windows.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if a window is tiled on this workspace.
    pub fn contains(&self, window_id: WindowId) -> bool {
        self.order.contains(&window_id)
    }

    /// Make `window_id` the master.
    ///
    /// The displaced master moves to the bottom of the stack, so stack
    /// windows stay in the order they were mapped.
    fn insert_master(&mut self, window_id: WindowId) -> bool {
        if self.contains(window_id) {
            return false;
        }
        if self.order.is_empty() {
            self.order.push(window_id);
        } else {
            let previous = self.order.remove(0);
            self.order.insert(0, window_id);
            self.order.push(previous);
        }
        true
    }

    fn remove(&mut self, window_id: WindowId) -> bool {
        if let Some(pos) = self.order.iter().position(|&w| w == window_id) {
            self.order.remove(pos);
            true
        } else {
            false
        }
    }

    fn swap(&mut self, a: WindowId, b: WindowId) -> bool {
        let pa = self.order.iter().position(|&w| w == a);
        let pb = self.order.iter().position(|&w| w == b);
        match (pa, pb) {
            (Some(pa), Some(pb)) if pa != pb => {
                self.order.swap(pa, pb);
                true
            }
            _ => false,
        }
    }

    fn set_master_factor(&mut self, factor: f64) {
        self.master_factor = clamp_master_factor(factor);
    }
}

/// Process-wide registry of managed windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    windows: HashMap<WindowId, ManagedWindow>,
    workspaces: BTreeMap<WorkspaceIndex, WorkspaceState>,
    focused: Option<WindowId>,
    default_master_factor: f64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MASTER_FACTOR)
    }
}

impl Registry {
    /// Create an empty registry; new workspaces start with `master_factor`.
    pub fn new(master_factor: f64) -> Self {
        Self {
            windows: HashMap::new(),
            workspaces: BTreeMap::new(),
            focused: None,
            default_master_factor: clamp_master_factor(master_factor),
        }
    }

    /// Number of managed windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Check if no window is managed.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Look up a managed window.
    pub fn get(&self, window_id: WindowId) -> Option<&ManagedWindow> {
        self.windows.get(&window_id)
    }

    /// Check if a window is managed.
    pub fn contains(&self, window_id: WindowId) -> bool {
        self.windows.contains_key(&window_id)
    }

    /// All managed windows, in no particular order.
    pub fn windows(&self) -> impl Iterator<Item = &ManagedWindow> {
        self.windows.values()
    }

    /// The tiling state for a workspace, if it was ever used.
    pub fn workspace(&self, index: WorkspaceIndex) -> Option<&WorkspaceState> {
        self.workspaces.get(&index)
    }

    /// All workspaces that ever held a tiled window.
    pub fn workspaces(&self) -> impl Iterator<Item = &WorkspaceState> {
        self.workspaces.values()
    }

    /// The tiled order of a workspace; empty for unknown workspaces.
    pub fn order(&self, index: WorkspaceIndex) -> &[WindowId] {
        match self.workspaces.get(&index) {
            Some(ws) => ws.order(),
            None => &[],
        }
    }

    /// Master factor applied to a workspace (the default if it was never used).
    pub fn master_factor(&self, index: WorkspaceIndex) -> f64 {
        self.workspaces
            .get(&index)
            .map_or(self.default_master_factor, |ws| ws.master_factor())
    }

    /// Master factor given to workspaces created from now on.
    pub fn default_master_factor(&self) -> f64 {
        self.default_master_factor
    }

    fn workspace_entry(&mut self, index: WorkspaceIndex) -> &mut WorkspaceState {
        let factor = self.default_master_factor;
        self.workspaces
            .entry(index)
            .or_insert_with(|| WorkspaceState::new(index, factor))
    }

    /// Register a window as tiled; it becomes the master of its workspace.
    ///
    /// Returns `false` when nothing changed (already tiled, or a kind that
    /// never tiles). A window known with another placement is converted.
    pub fn add_tiled(&mut self, window: &WindowInfo) -> bool {
        if !window.kind.is_tileable() {
            debug!("Refusing to tile window {} of kind {:?}", window.id, window.kind);
            return false;
        }

        if let Some(existing) = self.windows.get(&window.id) {
            if existing.placement == Placement::Tiled {
                return false;
            }
        }

        self.record(window, Placement::Tiled);
        let inserted = self.workspace_entry(window.workspace).insert_master(window.id);
        trace!(
            "Tiled window {} on workspace {} -> {:?}",
            window.id,
            window.workspace,
            self.order(window.workspace)
        );
        inserted
    }

    /// Register a window as floating.
    pub fn add_floating(&mut self, window: &WindowInfo) {
        self.record(window, Placement::Floating);
    }

    /// Register a window as minimized.
    pub fn add_minimized(&mut self, window: &WindowInfo) {
        self.record(window, Placement::Minimized);
    }

    /// Insert or update the window record, dropping it from any tiling order
    /// it no longer belongs to.
    fn record(&mut self, window: &WindowInfo, placement: Placement) {
        if let Some(previous) = self.windows.get(&window.id) {
            let (old_ws, old_placement) = (previous.workspace, previous.placement);
            if old_placement == Placement::Tiled
                && (placement != Placement::Tiled || old_ws != window.workspace)
            {
                if let Some(ws) = self.workspaces.get_mut(&old_ws) {
                    ws.remove(window.id);
                }
            }
        }

        let geometry = self.windows.get(&window.id).and_then(|w| w.geometry);
        self.windows.insert(
            window.id,
            ManagedWindow {
                id: window.id,
                kind: window.kind,
                placement,
                workspace: window.workspace,
                geometry,
            },
        );
    }

    /// Forget a window. Idempotent.
    ///
    /// Returns the removed record so the caller knows whether a workspace
    /// needs retiling.
    pub fn remove(&mut self, window_id: WindowId) -> Option<ManagedWindow> {
        let removed = self.windows.remove(&window_id)?;
        if removed.placement == Placement::Tiled {
            if let Some(ws) = self.workspaces.get_mut(&removed.workspace) {
                ws.remove(window_id);
            }
        }
        if self.focused == Some(window_id) {
            self.focused = None;
        }
        Some(removed)
    }

    /// Move a window to another workspace.
    ///
    /// A tiled window becomes master of the destination. Returns the
    /// previous workspace when the window actually moved.
    pub fn move_to_workspace(
        &mut self,
        window_id: WindowId,
        index: WorkspaceIndex,
    ) -> Option<WorkspaceIndex> {
        let window = self.windows.get_mut(&window_id)?;
        let previous = window.workspace;
        if previous == index {
            return None;
        }
        window.workspace = index;
        let tiled = window.placement == Placement::Tiled;

        if tiled {
            if let Some(ws) = self.workspaces.get_mut(&previous) {
                ws.remove(window_id);
            }
            self.workspace_entry(index).insert_master(window_id);
        }
        Some(previous)
    }

    /// Swap two tiled windows of the same workspace.
    pub fn swap(&mut self, a: WindowId, b: WindowId) -> bool {
        let (Some(wa), Some(wb)) = (self.windows.get(&a), self.windows.get(&b)) else {
            return false;
        };
        if wa.workspace != wb.workspace {
            return false;
        }
        let index = wa.workspace;
        self.workspaces
            .get_mut(&index)
            .is_some_and(|ws| ws.swap(a, b))
    }

    /// Swap a tiled window with its workspace's master.
    pub fn promote(&mut self, window_id: WindowId) -> bool {
        let Some(window) = self.windows.get(&window_id) else {
            return false;
        };
        let master = self
            .workspaces
            .get(&window.workspace)
            .and_then(|ws| ws.master());
        match master {
            Some(master) if master != window_id => self.swap(window_id, master),
            _ => false,
        }
    }

    /// Set the focused window. Ids outside the managed set clear focus.
    pub fn set_focus(&mut self, window_id: Option<WindowId>) {
        self.focused = window_id.filter(|id| self.windows.contains_key(id));
    }

    /// The focused window, if it is managed.
    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    /// Tiled windows of a workspace in layout order.
    pub fn windows_for_workspace(&self, index: WorkspaceIndex) -> Vec<&ManagedWindow> {
        self.order(index)
            .iter()
            .filter_map(|id| self.windows.get(id))
            .collect()
    }

    /// Set the master factor of one workspace (clamped).
    pub fn set_master_factor(&mut self, index: WorkspaceIndex, factor: f64) {
        self.workspace_entry(index).set_master_factor(factor);
    }

    /// Set the default master factor and apply it to every known workspace.
    pub fn set_default_master_factor(&mut self, factor: f64) {
        self.default_master_factor = clamp_master_factor(factor);
        let factor = self.default_master_factor;
        for ws in self.workspaces.values_mut() {
            ws.set_master_factor(factor);
        }
    }

    /// Compute the layout for a workspace without touching any state.
    pub fn compute_layout(&self, index: WorkspaceIndex, area: Rect) -> Vec<TilePlacement> {
        tiling::layout(self.order(index), self.master_factor(index), area)
    }

    /// Compute the layout for a workspace and record each window's geometry.
    pub fn apply_layout(&mut self, index: WorkspaceIndex, area: Rect) -> Vec<TilePlacement> {
        let placements = self.compute_layout(index, area);
        for placement in &placements {
            if let Some(window) = self.windows.get_mut(&placement.window_id) {
                window.geometry = Some(placement.rect);
            }
        }
        placements
    }
}
