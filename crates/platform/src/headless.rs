//! Headless compositor.
//!
//! An in-memory [`Compositor`] that keeps actor and group state, runs
//! implicit transitions when [`HeadlessCompositor::tick`] is called and
//! reports which targets finished all their transitions, tagged with the
//! sequence number of the last `animate_*` call on each. It is what the
//! test suites drive the window manager against.

use std::collections::BTreeMap;
use std::time::Duration;

use tessera_core_layout::{Rect, WindowId, WindowInfo};
use tracing::{debug, trace, warn};

use crate::{
    ActorId, ActorProps, Completion, Compositor, Container, ContainerId, EaseSpec, GroupId,
    Pivot, PlatformError, Target, TransitionEnd, TransitionSeq,
};

/// The host container every window actor starts in.
pub const WINDOW_GROUP: ContainerId = 0;

/// Simulated state of a window actor.
#[derive(Debug, Clone, PartialEq)]
pub struct SimActor {
    pub info: WindowInfo,
    pub rect: Rect,
    pub opacity: f64,
    pub scale: f64,
    pub pivot: Pivot,
    pub parent: Container,
    pub visible: bool,
    pub maximized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimGroup {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    Opacity,
    Scale,
    X,
    Y,
}

#[derive(Debug, Clone, Copy)]
struct SimTransition {
    target: Target,
    property: Property,
    from: f64,
    to: f64,
    ease: EaseSpec,
    elapsed: Duration,
}

impl SimTransition {
    fn progress(&self) -> f64 {
        let total = self.ease.duration();
        if total.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn value(&self) -> f64 {
        if self.is_finished() {
            return self.to;
        }
        self.from + (self.to - self.from) * self.ease.easing.y(self.progress())
    }

    fn is_finished(&self) -> bool {
        self.elapsed >= self.ease.duration()
    }
}

/// In-memory compositor.
#[derive(Debug)]
pub struct HeadlessCompositor {
    screen: (i32, i32),
    work_area: Rect,
    actors: BTreeMap<ActorId, SimActor>,
    groups: BTreeMap<GroupId, SimGroup>,
    next_group: GroupId,
    next_seq: TransitionSeq,
    latest_seq: BTreeMap<Target, TransitionSeq>,
    transitions: Vec<SimTransition>,
    completions: Vec<Completion>,
    activated: Option<WindowId>,
}

impl HeadlessCompositor {
    /// Create a compositor with a single screen whose work area is the full screen.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            screen: (width, height),
            work_area: Rect::new(0, 0, width, height),
            actors: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_group: 1,
            next_seq: 1,
            latest_seq: BTreeMap::new(),
            transitions: Vec::new(),
            completions: Vec::new(),
            activated: None,
        }
    }

    /// Use a work area smaller than the screen (panels, docks).
    pub fn with_work_area(mut self, work_area: Rect) -> Self {
        self.work_area = work_area;
        self
    }

    /// Add a window actor in the window group, fully opaque and hidden.
    pub fn add_window(&mut self, info: WindowInfo) {
        let rect = info.rect;
        self.actors.insert(
            info.id,
            SimActor {
                info,
                rect,
                opacity: 255.0,
                scale: 1.0,
                pivot: Pivot::ORIGIN,
                parent: Container::Host(WINDOW_GROUP),
                visible: false,
                maximized: false,
            },
        );
    }

    /// Replace the host attributes of a window.
    pub fn update_window(&mut self, info: WindowInfo) {
        if let Some(actor) = self.actors.get_mut(&info.id) {
            actor.info = info;
        }
    }

    /// Mark a window maximized, as a client restoring its state would.
    pub fn set_maximized(&mut self, window: WindowId, maximized: bool) {
        if let Some(actor) = self.actors.get_mut(&window) {
            actor.maximized = maximized;
        }
    }

    /// Look up an actor.
    pub fn actor(&self, actor: ActorId) -> Option<&SimActor> {
        self.actors.get(&actor)
    }

    /// Current position of a group.
    pub fn group_position(&self, group: GroupId) -> Option<(f64, f64)> {
        self.groups.get(&group).map(|g| (g.x, g.y))
    }

    /// Number of live transient groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// The window last activated through [`Compositor::activate`].
    pub fn activated(&self) -> Option<WindowId> {
        self.activated
    }

    /// Every completion reported so far, in order.
    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    /// Drain the completion log.
    pub fn take_completions(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.completions)
    }

    /// Whether any transition is running.
    pub fn is_animating(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// Whether a target has running transitions.
    pub fn is_target_animating(&self, target: Target) -> bool {
        self.transitions.iter().any(|t| t.target == target)
    }

    /// Advance every transition by `delta`.
    ///
    /// Returns the targets whose last transition finished during this tick,
    /// i.e. the "transitions completed" notifications the host would emit.
    pub fn tick(&mut self, delta: Duration) -> Vec<TransitionEnd> {
        let mut finished = Vec::new();

        for transition in &mut self.transitions {
            transition.elapsed += delta;
        }

        let snapshot: Vec<SimTransition> = self.transitions.clone();
        for transition in &snapshot {
            self.write_property(transition.target, transition.property, transition.value());
        }

        self.transitions.retain(|t| {
            if t.is_finished() {
                if !finished.contains(&t.target) {
                    finished.push(t.target);
                }
                false
            } else {
                true
            }
        });

        finished.retain(|target| !self.is_target_animating(*target));
        if !finished.is_empty() {
            trace!("Transitions completed for {:?}", finished);
        }
        finished
            .into_iter()
            .map(|target| TransitionEnd {
                target,
                seq: self.latest_seq.get(&target).copied().unwrap_or_default(),
            })
            .collect()
    }

    /// The tag of the latest `animate_*` call on a target.
    pub fn latest_seq(&self, target: Target) -> Option<TransitionSeq> {
        self.latest_seq.get(&target).copied()
    }

    fn tag(&mut self, target: Target) -> TransitionSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest_seq.insert(target, seq);
        seq
    }

    fn read_property(&self, target: Target, property: Property) -> Option<f64> {
        match (target, property) {
            (Target::Actor(id), Property::Opacity) => self.actors.get(&id).map(|a| a.opacity),
            (Target::Actor(id), Property::Scale) => self.actors.get(&id).map(|a| a.scale),
            (Target::Group(id), Property::X) => self.groups.get(&id).map(|g| g.x),
            (Target::Group(id), Property::Y) => self.groups.get(&id).map(|g| g.y),
            _ => None,
        }
    }

    fn write_property(&mut self, target: Target, property: Property, value: f64) {
        match (target, property) {
            (Target::Actor(id), Property::Opacity) => {
                if let Some(actor) = self.actors.get_mut(&id) {
                    actor.opacity = value;
                }
            }
            (Target::Actor(id), Property::Scale) => {
                if let Some(actor) = self.actors.get_mut(&id) {
                    actor.scale = value;
                }
            }
            (Target::Group(id), Property::X) => {
                if let Some(group) = self.groups.get_mut(&id) {
                    group.x = value;
                }
            }
            (Target::Group(id), Property::Y) => {
                if let Some(group) = self.groups.get_mut(&id) {
                    group.y = value;
                }
            }
            _ => {}
        }
    }

    /// Start (or retarget) the transition of one property.
    fn start_transition(&mut self, target: Target, property: Property, to: f64, ease: EaseSpec) {
        let Some(from) = self.read_property(target, property) else {
            return;
        };
        self.transitions
            .retain(|t| !(t.target == target && t.property == property));
        self.transitions.push(SimTransition {
            target,
            property,
            from,
            to,
            ease,
            elapsed: Duration::ZERO,
        });
    }

    fn drop_property_transitions(&mut self, target: Target, property: Property) {
        self.transitions
            .retain(|t| !(t.target == target && t.property == property));
    }

    fn actor_mut(&mut self, actor: ActorId) -> Result<&mut SimActor, PlatformError> {
        self.actors
            .get_mut(&actor)
            .ok_or(PlatformError::ActorNotFound(actor))
    }
}

impl Compositor for HeadlessCompositor {
    fn windows(&self) -> Vec<WindowInfo> {
        self.actors.values().map(|a| a.info.clone()).collect()
    }

    fn screen_size(&self) -> (i32, i32) {
        self.screen
    }

    fn work_area(&self) -> Rect {
        self.work_area
    }

    fn move_resize(&mut self, window: WindowId, rect: Rect) -> Result<(), PlatformError> {
        let actor = self.actor_mut(window)?;
        actor.rect = rect;
        actor.info.rect = rect;
        Ok(())
    }

    fn unmaximize(&mut self, window: WindowId) -> Result<(), PlatformError> {
        self.actor_mut(window)?.maximized = false;
        Ok(())
    }

    fn activate(&mut self, window: WindowId) -> Result<(), PlatformError> {
        self.actor_mut(window)?;
        self.activated = Some(window);
        Ok(())
    }

    fn show(&mut self, actor: ActorId) -> Result<(), PlatformError> {
        self.actor_mut(actor)?.visible = true;
        Ok(())
    }

    fn set_actor_props(&mut self, actor: ActorId, props: ActorProps) -> Result<(), PlatformError> {
        let sim = self.actor_mut(actor)?;
        if let Some(opacity) = props.opacity {
            sim.opacity = f64::from(opacity);
        }
        if let Some(scale) = props.scale {
            sim.scale = scale;
        }
        if let Some(pivot) = props.pivot {
            sim.pivot = pivot;
        }

        let target = Target::Actor(actor);
        if props.opacity.is_some() {
            self.drop_property_transitions(target, Property::Opacity);
        }
        if props.scale.is_some() {
            self.drop_property_transitions(target, Property::Scale);
        }
        Ok(())
    }

    fn animate_actor(
        &mut self,
        actor: ActorId,
        props: ActorProps,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError> {
        let sim = self.actor_mut(actor)?;
        if let Some(pivot) = props.pivot {
            sim.pivot = pivot;
        }

        let target = Target::Actor(actor);
        if let Some(opacity) = props.opacity {
            self.start_transition(target, Property::Opacity, f64::from(opacity), ease);
        }
        if let Some(scale) = props.scale {
            self.start_transition(target, Property::Scale, scale, ease);
        }
        Ok(self.tag(target))
    }

    fn remove_all_transitions(&mut self, target: Target) {
        self.transitions.retain(|t| t.target != target);
    }

    fn create_group(&mut self) -> GroupId {
        let id = self.next_group;
        self.next_group += 1;
        self.groups.insert(id, SimGroup { x: 0.0, y: 0.0 });
        debug!("Created group {}", id);
        id
    }

    fn destroy_group(&mut self, group: GroupId) {
        if self.groups.remove(&group).is_none() {
            return;
        }
        self.remove_all_transitions(Target::Group(group));
        self.latest_seq.remove(&Target::Group(group));

        for actor in self.actors.values_mut() {
            if actor.parent == Container::Group(group) {
                warn!("Group {} destroyed with actor {} still inside", group, actor.info.id);
                actor.parent = Container::Host(WINDOW_GROUP);
            }
        }
    }

    fn set_group_position(&mut self, group: GroupId, x: i32, y: i32) -> Result<(), PlatformError> {
        let sim = self
            .groups
            .get_mut(&group)
            .ok_or(PlatformError::GroupNotFound(group))?;
        sim.x = f64::from(x);
        sim.y = f64::from(y);
        let target = Target::Group(group);
        self.drop_property_transitions(target, Property::X);
        self.drop_property_transitions(target, Property::Y);
        Ok(())
    }

    fn animate_group_position(
        &mut self,
        group: GroupId,
        x: i32,
        y: i32,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError> {
        if !self.groups.contains_key(&group) {
            return Err(PlatformError::GroupNotFound(group));
        }
        let target = Target::Group(group);
        self.start_transition(target, Property::X, f64::from(x), ease);
        self.start_transition(target, Property::Y, f64::from(y), ease);
        Ok(self.tag(target))
    }

    fn parent_of(&self, actor: ActorId) -> Option<Container> {
        self.actors.get(&actor).map(|a| a.parent)
    }

    fn reparent(&mut self, actor: ActorId, parent: Container) -> Result<(), PlatformError> {
        if let Container::Group(group) = parent {
            if !self.groups.contains_key(&group) {
                return Err(PlatformError::GroupNotFound(group));
            }
        }
        self.actor_mut(actor)?.parent = parent;
        Ok(())
    }

    fn complete(&mut self, completion: Completion) {
        debug!("Completion reported: {:?}", completion);
        if let Completion::Destroy(actor) = completion {
            self.actors.remove(&actor);
            self.remove_all_transitions(Target::Actor(actor));
            self.latest_seq.remove(&Target::Actor(actor));
        }
        self.completions.push(completion);
    }
}
