//! Workspace switch slide.
//!
//! Windows of the outgoing and incoming workspaces are moved into two
//! transient groups that slide across the screen together. When the
//! outgoing group stops, every window goes back to the parent it came from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tessera_core_layout::{WindowInfo, WorkspaceIndex};
use tessera_platform::{
    ActorId, Completion, Compositor, Container, EaseSpec, GroupId, PlatformError, Target,
    TransitionSeq,
};
use tracing::{debug, info, warn};

use crate::animation::AnimationKind;

/// Direction the user moves in when switching workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionDirection {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl MotionDirection {
    /// Where the outgoing workspace ends up, for a screen of the given size.
    pub fn displacement(self, width: i32, height: i32) -> (i32, i32) {
        match self {
            Self::Up => (0, height),
            Self::Down => (0, -height),
            Self::Left => (width, 0),
            Self::Right => (-width, 0),
            Self::UpLeft => (width, height),
            Self::UpRight => (-width, height),
            Self::DownLeft => (width, -height),
            Self::DownRight => (-width, -height),
        }
    }
}

/// Start and end points of the two sliding groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOffsets {
    /// Position the incoming group starts from; it slides to (0, 0).
    pub incoming_start: (i32, i32),
    /// Position the outgoing group slides to from (0, 0).
    pub outgoing_end: (i32, i32),
}

impl SwitchOffsets {
    pub fn new(direction: MotionDirection, width: i32, height: i32) -> Self {
        let (dx, dy) = direction.displacement(width, height);
        Self {
            incoming_start: (-dx, -dy),
            outgoing_end: (dx, dy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Idle,
    Switching,
}

#[derive(Debug)]
struct ActiveSwitch {
    from: WorkspaceIndex,
    to: WorkspaceIndex,
    incoming: GroupId,
    outgoing: GroupId,
    incoming_seq: TransitionSeq,
    outgoing_seq: TransitionSeq,
    original_parents: HashMap<ActorId, Container>,
}

/// Runs at most one workspace slide at a time.
#[derive(Debug)]
pub struct WorkspaceSwitchCoordinator {
    active: Option<ActiveSwitch>,
    ease: EaseSpec,
}

impl WorkspaceSwitchCoordinator {
    pub fn new(ease: EaseSpec) -> Self {
        Self { active: None, ease }
    }

    pub fn set_ease(&mut self, ease: EaseSpec) {
        self.ease = ease;
    }

    pub fn state(&self) -> SwitchState {
        if self.active.is_some() {
            SwitchState::Switching
        } else {
            SwitchState::Idle
        }
    }

    pub fn is_switching(&self) -> bool {
        self.active.is_some()
    }

    /// The (incoming, outgoing) groups of the running switch.
    pub fn groups(&self) -> Option<(GroupId, GroupId)> {
        self.active.as_ref().map(|s| (s.incoming, s.outgoing))
    }

    /// The slide a group of the running switch performs.
    pub fn kind_of(&self, group: GroupId) -> Option<AnimationKind> {
        let active = self.active.as_ref()?;
        if group == active.incoming {
            Some(AnimationKind::WorkspaceSlideIn)
        } else if group == active.outgoing {
            Some(AnimationKind::WorkspaceSlideOut)
        } else {
            None
        }
    }

    /// Workspaces of the running switch, as (from, to).
    pub fn workspaces(&self) -> Option<(WorkspaceIndex, WorkspaceIndex)> {
        self.active.as_ref().map(|s| (s.from, s.to))
    }

    /// Start sliding from workspace `from` to `to`.
    ///
    /// A switch that is still running is finished first. Switching to the
    /// same workspace completes immediately without creating any group.
    pub fn start(
        &mut self,
        compositor: &mut dyn Compositor,
        from: WorkspaceIndex,
        to: WorkspaceIndex,
        direction: MotionDirection,
    ) {
        if self.active.is_some() {
            debug!("Switch requested while switching, finishing the previous one");
            self.finish(compositor);
        }

        if from == to {
            compositor.complete(Completion::SwitchWorkspace);
            return;
        }

        info!("Switching workspace {} -> {} ({:?})", from, to, direction);

        let (width, height) = compositor.screen_size();
        let offsets = SwitchOffsets::new(direction, width, height);

        let incoming = compositor.create_group();
        let outgoing = compositor.create_group();
        let mut original_parents = HashMap::new();

        for window in compositor.windows() {
            let group = match slide_group(&window, from, to) {
                Some(Side::Incoming) => incoming,
                Some(Side::Outgoing) => outgoing,
                None => continue,
            };
            let Some(parent) = compositor.parent_of(window.id) else {
                continue;
            };
            match compositor.reparent(window.id, Container::Group(group)) {
                Ok(()) => {
                    original_parents.insert(window.id, parent);
                }
                Err(e) => warn!("Failed to move window {} into group: {}", window.id, e),
            }
        }

        let mut active = ActiveSwitch {
            from,
            to,
            incoming,
            outgoing,
            incoming_seq: 0,
            outgoing_seq: 0,
            original_parents,
        };
        let slid = self.slide(compositor, &mut active, offsets);
        self.active = Some(active);

        if let Err(e) = slid {
            warn!("Failed to animate workspace switch: {}", e);
            self.finish(compositor);
        }
    }

    fn slide(
        &self,
        compositor: &mut dyn Compositor,
        active: &mut ActiveSwitch,
        offsets: SwitchOffsets,
    ) -> Result<(), PlatformError> {
        let (x, y) = offsets.incoming_start;
        compositor.set_group_position(active.incoming, x, y)?;
        active.incoming_seq =
            compositor.animate_group_position(active.incoming, 0, 0, self.ease)?;

        let (x, y) = offsets.outgoing_end;
        active.outgoing_seq =
            compositor.animate_group_position(active.outgoing, x, y, self.ease)?;
        Ok(())
    }

    /// The host finished the transitions of a group up to the call tagged `seq`.
    ///
    /// Returns `false` when the group does not belong to the running switch
    /// or the tag is not the one its slide was started with.
    pub fn on_transitions_completed(
        &mut self,
        compositor: &mut dyn Compositor,
        group: GroupId,
        seq: TransitionSeq,
    ) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        if group == active.outgoing && seq == active.outgoing_seq {
            self.finish(compositor);
            true
        } else if group == active.incoming && seq == active.incoming_seq {
            true
        } else {
            debug!("Ignoring completion of group {} (seq {})", group, seq);
            false
        }
    }

    /// Finish a running switch now. No-op when idle.
    pub fn kill(&mut self, compositor: &mut dyn Compositor) {
        if self.active.is_some() {
            self.finish(compositor);
        }
    }

    fn finish(&mut self, compositor: &mut dyn Compositor) {
        let Some(active) = self.active.take() else {
            return;
        };

        for (actor, parent) in active.original_parents {
            if let Err(e) = compositor.reparent(actor, parent) {
                warn!("Failed to restore parent of window {}: {}", actor, e);
            }
        }

        for group in [active.incoming, active.outgoing] {
            compositor.remove_all_transitions(Target::Group(group));
            compositor.destroy_group(group);
        }

        debug!("Workspace switch {} -> {} done", active.from, active.to);
        compositor.complete(Completion::SwitchWorkspace);
    }
}

enum Side {
    Incoming,
    Outgoing,
}

fn slide_group(window: &WindowInfo, from: WorkspaceIndex, to: WorkspaceIndex) -> Option<Side> {
    if !window.showing || window.on_all_workspaces {
        return None;
    }
    if window.workspace == to {
        Some(Side::Incoming)
    } else if window.workspace == from {
        Some(Side::Outgoing)
    } else {
        None
    }
}
