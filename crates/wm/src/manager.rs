//! The window manager context.
//!
//! Every host lifecycle event and every user command goes through
//! [`WindowManager`]. It keeps the registry, the animation machine and the
//! switch coordinator consistent with each other: registry changes and
//! retiling are committed before any effect starts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tessera_core_layout::{
    can_tile, clamp_master_factor, next_tiled, prev_tiled, Placement, Registry, TilePlacement,
    WindowId, WindowInfo, WorkspaceIndex, DEFAULT_MASTER_FACTOR,
};
use tessera_platform::{ActorId, Compositor, Target, TransitionSeq};
use tracing::{debug, info, trace, warn};

use crate::animation::{AnimationParams, AnimationStateMachine, DestroyEffect, MapEffect};
use crate::switch::{MotionDirection, WorkspaceSwitchCoordinator};

/// Tunables read from the settings source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    pub master_factor: f64,
    /// Increment used by the master factor keybindings.
    pub master_factor_step: f64,
    pub animation: AnimationParams,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            master_factor: DEFAULT_MASTER_FACTOR,
            master_factor_step: 0.05,
            animation: AnimationParams::default(),
        }
    }
}

/// Where a window should live, judged from the host's description.
pub fn desired_placement(window: &WindowInfo) -> Placement {
    if window.minimized {
        Placement::Minimized
    } else if window.floating || !can_tile(window) {
        Placement::Floating
    } else {
        Placement::Tiled
    }
}

/// Registry, effects and workspace switch of one compositor session.
pub struct WindowManager {
    registry: Registry,
    animations: AnimationStateMachine,
    switcher: WorkspaceSwitchCoordinator,
    settings: ManagerSettings,
    active_workspace: WorkspaceIndex,
}

impl WindowManager {
    /// Create a manager with an empty registry on workspace 0.
    pub fn new(settings: ManagerSettings) -> Self {
        Self {
            registry: Registry::new(settings.master_factor),
            animations: AnimationStateMachine::new(settings.animation),
            switcher: WorkspaceSwitchCoordinator::new(settings.animation.switch),
            settings,
            active_workspace: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn animations(&self) -> &AnimationStateMachine {
        &self.animations
    }

    pub fn switcher(&self) -> &WorkspaceSwitchCoordinator {
        &self.switcher
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn active_workspace(&self) -> WorkspaceIndex {
        self.active_workspace
    }

    /// Tell the manager which workspace is showing, without any effect.
    pub fn set_active_workspace(&mut self, workspace: WorkspaceIndex) {
        self.active_workspace = workspace;
    }

    /// Take over windows that existed before the manager started.
    ///
    /// Windows are registered and tiled without a map effect, then every
    /// window in `windows` fades in together. The fade reports nothing to
    /// the host.
    pub fn adopt_existing(&mut self, compositor: &mut dyn Compositor, windows: &[WindowInfo]) {
        let mut dirty = BTreeSet::new();
        for window in windows {
            if MapEffect::for_kind(window.kind) != MapEffect::ScaleIn {
                continue;
            }
            if self.admit(window) == Placement::Tiled {
                dirty.insert(window.workspace);
            }
        }
        info!("Adopted {} existing windows", self.registry.len());

        for workspace in dirty {
            self.retile(compositor, workspace);
        }

        self.fade_in(compositor, windows);
    }

    /// Fade in windows that were on screen before the manager started.
    pub fn fade_in(&mut self, compositor: &mut dyn Compositor, windows: &[WindowInfo]) {
        for window in windows {
            self.animations.start_fade_in(compositor, window.id);
        }
    }

    /// Register `window` according to its desired placement.
    fn admit(&mut self, window: &WindowInfo) -> Placement {
        let placement = desired_placement(window);
        match placement {
            Placement::Tiled => {
                self.registry.add_tiled(window);
            }
            Placement::Floating => self.registry.add_floating(window),
            Placement::Minimized => self.registry.add_minimized(window),
        }
        placement
    }

    /// A window is being mapped.
    pub fn map(&mut self, compositor: &mut dyn Compositor, window: &WindowInfo) {
        let effect = MapEffect::for_kind(window.kind);
        debug!("Mapping window {} ({:?}, {:?})", window.id, window.kind, effect);

        if effect == MapEffect::ScaleIn {
            // Clients may restore a maximized state; it has no place in a tiling layout.
            if let Err(e) = compositor.unmaximize(window.id) {
                warn!("Failed to unmaximize window {}: {}", window.id, e);
            }
            if self.admit(window) == Placement::Tiled {
                self.retile(compositor, window.workspace);
            }
        }

        self.animations.start_map(compositor, window.id, effect);
    }

    /// A window is being destroyed.
    pub fn destroy(&mut self, compositor: &mut dyn Compositor, window: &WindowInfo) {
        debug!("Destroying window {} ({:?})", window.id, window.kind);

        if let Some(removed) = self.registry.remove(window.id) {
            if removed.placement == Placement::Tiled {
                self.retile(compositor, removed.workspace);
            }
        }

        self.animations
            .start_destroy(compositor, window.id, DestroyEffect::for_kind(window.kind));
    }

    /// The user switched workspace.
    pub fn switch_workspace(
        &mut self,
        compositor: &mut dyn Compositor,
        from: WorkspaceIndex,
        to: WorkspaceIndex,
        direction: MotionDirection,
    ) {
        self.active_workspace = to;
        self.switcher.start(compositor, from, to, direction);
    }

    /// The host finished every transition of `target` up to the call tagged `seq`.
    ///
    /// Stale notifications, tagged for transitions a newer effect replaced,
    /// change nothing and return `false`.
    pub fn on_transitions_completed(
        &mut self,
        compositor: &mut dyn Compositor,
        target: Target,
        seq: TransitionSeq,
    ) -> bool {
        let handled = match target {
            Target::Group(group) => {
                self.switcher.on_transitions_completed(compositor, group, seq)
            }
            Target::Actor(actor) => {
                self.animations.on_transitions_completed(compositor, actor, seq)
            }
        };
        if !handled {
            trace!("Ignoring transitions completed for {:?} (seq {})", target, seq);
        }
        handled
    }

    /// Finish the effects of a window now.
    pub fn kill_window_effects(&mut self, compositor: &mut dyn Compositor, actor: ActorId) {
        self.animations.kill(compositor, actor);
    }

    /// Finish a running workspace switch now.
    pub fn kill_switch_workspace(&mut self, compositor: &mut dyn Compositor) {
        self.switcher.kill(compositor);
    }

    /// The host's focus moved. Unmanaged windows clear the focus.
    pub fn focus_changed(&mut self, window: Option<WindowId>) {
        self.registry.set_focus(window);
    }

    /// The host changed a window's workspace, floating or minimized state.
    ///
    /// Windows the manager never admitted are ignored.
    pub fn window_changed(&mut self, compositor: &mut dyn Compositor, window: &WindowInfo) {
        let Some(before) = self.registry.get(window.id).cloned() else {
            return;
        };

        match desired_placement(window) {
            Placement::Tiled if before.placement == Placement::Tiled => {
                self.registry.move_to_workspace(window.id, window.workspace);
            }
            Placement::Tiled => {
                self.registry.add_tiled(window);
            }
            Placement::Floating => self.registry.add_floating(window),
            Placement::Minimized => self.registry.add_minimized(window),
        }

        let Some(after) = self.registry.get(window.id) else {
            return;
        };
        if after.placement == before.placement && after.workspace == before.workspace {
            return;
        }
        debug!(
            "Window {} changed: {:?}@{} -> {:?}@{}",
            window.id, before.placement, before.workspace, after.placement, after.workspace
        );

        let dirty = BTreeSet::from([before.workspace, after.workspace]);
        for workspace in dirty {
            self.retile(compositor, workspace);
        }
    }

    /// Recompute and publish the layout of a workspace. Idempotent.
    pub fn retile(&mut self, compositor: &mut dyn Compositor, workspace: WorkspaceIndex) {
        let placements = self.registry.apply_layout(workspace, compositor.work_area());
        trace!("Retiling workspace {}: {} windows", workspace, placements.len());

        for placement in placements {
            if let Err(e) = compositor.move_resize(placement.window_id, placement.rect) {
                warn!("Failed to place window {}: {}", placement.window_id, e);
            }
        }
    }

    /// Retile every workspace that ever held a tiled window.
    pub fn retile_all(&mut self, compositor: &mut dyn Compositor) {
        let workspaces: Vec<WorkspaceIndex> =
            self.registry.workspaces().map(|ws| ws.index()).collect();
        for workspace in workspaces {
            self.retile(compositor, workspace);
        }
    }

    /// The layout a workspace would get in `compositor`'s work area.
    pub fn layout_for(
        &self,
        compositor: &dyn Compositor,
        workspace: WorkspaceIndex,
    ) -> Vec<TilePlacement> {
        self.registry.compute_layout(workspace, compositor.work_area())
    }

    fn focus(&mut self, compositor: &mut dyn Compositor, window: Option<WindowId>) {
        let Some(window) = window else {
            return;
        };
        self.registry.set_focus(Some(window));
        if let Err(e) = compositor.activate(window) {
            warn!("Failed to activate window {}: {}", window, e);
        }
    }

    /// Focus the next tiled window of the active workspace.
    pub fn focus_next(&mut self, compositor: &mut dyn Compositor) {
        let order = self.registry.order(self.active_workspace);
        let target = next_tiled(order, self.registry.focused());
        self.focus(compositor, target);
    }

    /// Focus the previous tiled window of the active workspace.
    pub fn focus_prev(&mut self, compositor: &mut dyn Compositor) {
        let order = self.registry.order(self.active_workspace);
        let target = prev_tiled(order, self.registry.focused());
        self.focus(compositor, target);
    }

    fn focused_tiled(&self) -> Option<WindowId> {
        let focused = self.registry.focused()?;
        self.registry
            .order(self.active_workspace)
            .contains(&focused)
            .then_some(focused)
    }

    fn swap_focused(&mut self, compositor: &mut dyn Compositor, forward: bool) {
        let Some(focused) = self.focused_tiled() else {
            return;
        };
        let order = self.registry.order(self.active_workspace);
        let other = if forward {
            next_tiled(order, Some(focused))
        } else {
            prev_tiled(order, Some(focused))
        };
        if let Some(other) = other {
            if self.registry.swap(focused, other) {
                self.retile(compositor, self.active_workspace);
            }
        }
    }

    /// Swap the focused window with the next one in the layout.
    pub fn swap_next(&mut self, compositor: &mut dyn Compositor) {
        self.swap_focused(compositor, true);
    }

    /// Swap the focused window with the previous one in the layout.
    pub fn swap_prev(&mut self, compositor: &mut dyn Compositor) {
        self.swap_focused(compositor, false);
    }

    /// Make the focused window the master.
    pub fn promote(&mut self, compositor: &mut dyn Compositor) {
        let Some(focused) = self.focused_tiled() else {
            return;
        };
        if self.registry.promote(focused) {
            self.retile(compositor, self.active_workspace);
        }
    }

    /// Set the master factor of the active workspace (clamped).
    pub fn set_master_factor(&mut self, compositor: &mut dyn Compositor, factor: f64) {
        let workspace = self.active_workspace;
        self.registry.set_master_factor(workspace, factor);
        debug!(
            "Master factor of workspace {} is now {}",
            workspace,
            self.registry.master_factor(workspace)
        );
        self.retile(compositor, workspace);
    }

    /// Grow the master column by one step.
    pub fn increase_master_factor(&mut self, compositor: &mut dyn Compositor) {
        let factor = self.registry.master_factor(self.active_workspace);
        self.set_master_factor(compositor, factor + self.settings.master_factor_step);
    }

    /// Shrink the master column by one step.
    pub fn decrease_master_factor(&mut self, compositor: &mut dyn Compositor) {
        let factor = self.registry.master_factor(self.active_workspace);
        self.set_master_factor(compositor, factor - self.settings.master_factor_step);
    }

    /// Apply new settings. A changed master factor resets every workspace.
    pub fn apply_settings(&mut self, compositor: &mut dyn Compositor, settings: ManagerSettings) {
        let factor_changed = clamp_master_factor(settings.master_factor)
            != clamp_master_factor(self.settings.master_factor);

        self.animations.set_params(settings.animation);
        self.switcher.set_ease(settings.animation.switch);
        self.settings = settings;

        if factor_changed {
            info!("Master factor changed to {}", settings.master_factor);
            self.registry.set_default_master_factor(settings.master_factor);
            self.retile_all(compositor);
        }
    }

    /// Finish everything in flight. Every pending request gets its completion.
    pub fn shutdown(&mut self, compositor: &mut dyn Compositor) {
        info!(
            "Shutting down: {} effects, switching: {}",
            self.animations.running_count(),
            self.switcher.is_switching()
        );
        self.switcher.kill(compositor);
        self.animations.kill_all(compositor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core_layout::{Rect, WindowKind};
    use tessera_platform::{EaseSpec, Easing, HeadlessCompositor};

    fn normal(id: WindowId, workspace: WorkspaceIndex) -> WindowInfo {
        WindowInfo::new(id, WindowKind::Normal, workspace)
    }

    #[test]
    fn test_desired_placement() {
        assert_eq!(desired_placement(&normal(1, 0)), Placement::Tiled);

        let mut floating = normal(2, 0);
        floating.floating = true;
        assert_eq!(desired_placement(&floating), Placement::Floating);

        let mut minimized = normal(3, 0);
        minimized.minimized = true;
        minimized.floating = true;
        assert_eq!(desired_placement(&minimized), Placement::Minimized);

        let mut fixed = WindowInfo::new(4, WindowKind::Dialog, 0);
        fixed.fixed_size = true;
        assert_eq!(desired_placement(&fixed), Placement::Floating);
    }

    #[test]
    fn test_map_unmaximizes() {
        let mut compositor = HeadlessCompositor::new(1000, 800);
        compositor.add_window(normal(1, 0));
        compositor.set_maximized(1, true);
        let mut wm = WindowManager::new(ManagerSettings::default());

        wm.map(&mut compositor, &normal(1, 0));

        assert!(!compositor.actor(1).unwrap().maximized);
        assert_eq!(compositor.actor(1).unwrap().rect, Rect::new(0, 0, 1000, 800));
    }

    #[test]
    fn test_menus_are_not_admitted() {
        let mut compositor = HeadlessCompositor::new(1000, 800);
        let menu = WindowInfo::new(5, WindowKind::PopupMenu, 0);
        compositor.add_window(menu.clone());
        let mut wm = WindowManager::new(ManagerSettings::default());

        wm.map(&mut compositor, &menu);

        assert!(!wm.registry().contains(5));
        assert!(wm.animations().is_running(5));
    }

    #[test]
    fn test_master_factor_keybindings() {
        let mut compositor = HeadlessCompositor::new(1000, 800);
        compositor.add_window(normal(1, 0));
        compositor.add_window(normal(2, 0));
        let mut wm = WindowManager::new(ManagerSettings {
            master_factor: 0.5,
            ..ManagerSettings::default()
        });
        wm.adopt_existing(&mut compositor, &[normal(1, 0), normal(2, 0)]);

        wm.increase_master_factor(&mut compositor);
        assert!((wm.registry().master_factor(0) - 0.55).abs() < 1e-9);
        assert_eq!(compositor.actor(2).unwrap().rect.width, 550);

        for _ in 0..20 {
            wm.decrease_master_factor(&mut compositor);
        }
        assert_eq!(wm.registry().master_factor(0), 0.1);
    }

    #[test]
    fn test_apply_settings_resets_factor() {
        let mut compositor = HeadlessCompositor::new(1000, 800);
        compositor.add_window(normal(1, 0));
        compositor.add_window(normal(2, 0));
        let mut wm = WindowManager::new(ManagerSettings::default());
        wm.adopt_existing(&mut compositor, &[normal(1, 0), normal(2, 0)]);

        wm.apply_settings(
            &mut compositor,
            ManagerSettings {
                master_factor: 0.7,
                ..ManagerSettings::default()
            },
        );

        assert_eq!(wm.registry().master_factor(0), 0.7);
        assert_eq!(compositor.actor(2).unwrap().rect.width, 700);
    }

    #[test]
    fn test_apply_settings_updates_timings() {
        let mut compositor = HeadlessCompositor::new(1000, 800);
        let mut wm = WindowManager::new(ManagerSettings::default());
        let animation = AnimationParams {
            startup: EaseSpec::new(Easing::Linear, 300),
            ..AnimationParams::default()
        };

        wm.apply_settings(
            &mut compositor,
            ManagerSettings {
                animation,
                ..ManagerSettings::default()
            },
        );

        assert_eq!(wm.animations().params().startup.duration_ms, 300);
        assert_eq!(wm.settings().animation, animation);
    }
}
