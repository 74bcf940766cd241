//! Tessera Platform
//!
//! The contract between the decision core and the compositing host.
//!
//! This crate handles:
//! - The [`Compositor`] trait: window enumeration, geometry application,
//!   opacity/scale/position transitions and transient groups
//! - Easing curves shared by every backend
//! - Completion reporting back to the host
//! - A headless, in-memory compositor for tests and experiments

mod headless;

use std::time::Duration;

use keyframe::EasingFunction;
use serde::{Deserialize, Serialize};
use tessera_core_layout::{Rect, WindowId, WindowInfo};
use thiserror::Error;

pub use headless::{HeadlessCompositor, SimActor, WINDOW_GROUP};

/// Identifier of a window's visual actor. The host uses the window handle.
pub type ActorId = WindowId;

/// Identifier of a transient group created by the core.
pub type GroupId = u64;

/// Identifier of a host-owned container (window group, top window group...).
pub type ContainerId = u64;

/// Tag the compositor gives every `animate_*` call.
///
/// The host echoes the tag of the most recent call on a target when it
/// reports that the target's transitions completed.
pub type TransitionSeq = u64;

/// Errors that can occur when talking to the compositor.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Actor {0} not found")]
    ActorNotFound(ActorId),

    #[error("Group {0} not found")]
    GroupNotFound(GroupId),

    #[error("Compositor host is not connected")]
    Disconnected,
}

/// Something that runs transitions and reports "transitions completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// A window actor.
    Actor(ActorId),
    /// A transient group.
    Group(GroupId),
}

/// A "transitions completed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionEnd {
    pub target: Target,
    pub seq: TransitionSeq,
}

/// A parent an actor can be placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Container {
    /// A container owned by the host.
    Host(ContainerId),
    /// A transient group owned by the core.
    Group(GroupId),
}

/// A lifecycle request the host is waiting to see finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "window_id", rename_all = "snake_case")]
pub enum Completion {
    /// The map effect of a window is over.
    Map(ActorId),
    /// The destroy effect of a window is over.
    Destroy(ActorId),
    /// The workspace switch effect is over.
    SwitchWorkspace,
}

/// Point around which an actor scales, relative to its size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub x: f32,
    pub y: f32,
}

impl Pivot {
    /// The actor's center.
    pub const CENTER: Pivot = Pivot { x: 0.5, y: 0.5 };
    /// The actor's top-left corner (the host default).
    pub const ORIGIN: Pivot = Pivot { x: 0.0, y: 0.0 };
}

impl Default for Pivot {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// Visual properties of an actor. `None` leaves a property untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActorProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<Pivot>,
}

impl ActorProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opacity(mut self, opacity: u8) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn pivot(mut self, pivot: Pivot) -> Self {
        self.pivot = Some(pivot);
        self
    }
}

/// Easing curves understood by every backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutCubic,
    EaseOutCubic,
}

impl Easing {
    /// Get the Y value at a given X coordinate, assuming that x is included in [0.0, 1.0]
    pub fn y(&self, x: f64) -> f64 {
        match self {
            Self::Linear => keyframe::functions::Linear.y(x),
            Self::EaseIn => keyframe::functions::EaseIn.y(x),
            Self::EaseOut => keyframe::functions::EaseOut.y(x),
            Self::EaseInOut => keyframe::functions::EaseInOut.y(x),
            Self::EaseInQuad => keyframe::functions::EaseInQuad.y(x),
            Self::EaseOutQuad => keyframe::functions::EaseOutQuad.y(x),
            Self::EaseInOutCubic => keyframe::functions::EaseInOutCubic.y(x),
            Self::EaseOutCubic => keyframe::functions::EaseOutCubic.y(x),
        }
    }
}

/// Easing mode and duration of an implicit transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EaseSpec {
    pub easing: Easing,
    pub duration_ms: u32,
}

impl EaseSpec {
    pub fn new(easing: Easing, duration_ms: u32) -> Self {
        Self {
            easing,
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.duration_ms))
    }
}

/// The rendering/compositing backend as seen by the decision core.
///
/// The core never draws. It only reads window state, issues geometry and
/// opacity/scale/position targets, and reports completions. Every animation
/// started through this trait must eventually be answered by the host with a
/// "transitions completed" notification for its [`Target`], unless the core
/// removes the transitions itself first. The notification carries the
/// [`TransitionSeq`] of the latest `animate_*` call on that target, so the
/// core can drop reports that belong to transitions it already replaced.
pub trait Compositor {
    /// Enumerate every window the host knows about.
    fn windows(&self) -> Vec<WindowInfo>;

    /// Screen size in pixels.
    fn screen_size(&self) -> (i32, i32);

    /// Area available to tiled windows (screen minus panels).
    fn work_area(&self) -> Rect;

    /// Move and resize a window.
    fn move_resize(&mut self, window: WindowId, rect: Rect) -> Result<(), PlatformError>;

    /// Unmaximize a window along both axes.
    fn unmaximize(&mut self, window: WindowId) -> Result<(), PlatformError>;

    /// Give a window keyboard focus and raise it.
    fn activate(&mut self, window: WindowId) -> Result<(), PlatformError>;

    /// Make an actor visible.
    fn show(&mut self, actor: ActorId) -> Result<(), PlatformError>;

    /// Set actor properties immediately.
    fn set_actor_props(&mut self, actor: ActorId, props: ActorProps) -> Result<(), PlatformError>;

    /// Start implicit transitions of an actor towards `props`.
    ///
    /// A pivot in `props` is applied immediately; it is never animated.
    /// Returns the tag the matching notification will carry.
    fn animate_actor(
        &mut self,
        actor: ActorId,
        props: ActorProps,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError>;

    /// Drop every running transition of a target without notifying.
    fn remove_all_transitions(&mut self, target: Target);

    /// Create an empty transient group on the stage, at (0, 0).
    fn create_group(&mut self) -> GroupId;

    /// Destroy a transient group.
    fn destroy_group(&mut self, group: GroupId);

    /// Position a group immediately.
    fn set_group_position(&mut self, group: GroupId, x: i32, y: i32) -> Result<(), PlatformError>;

    /// Start a transition of a group's position.
    /// Returns the tag the matching notification will carry.
    fn animate_group_position(
        &mut self,
        group: GroupId,
        x: i32,
        y: i32,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError>;

    /// The current parent of an actor.
    fn parent_of(&self, actor: ActorId) -> Option<Container>;

    /// Move an actor into another parent.
    fn reparent(&mut self, actor: ActorId, parent: Container) -> Result<(), PlatformError>;

    /// Tell the host that a map, destroy or switch effect is over.
    fn complete(&mut self, completion: Completion);
}
