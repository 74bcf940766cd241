//! Tessera Window Manager
//!
//! Decides what happens to windows over time.
//!
//! This crate handles:
//! - Map and destroy effects, with cancellation when effects overlap
//! - Sliding workspace switches through transient groups
//! - Routing host lifecycle events and user commands through one context
//!
//! Exactly one completion is reported to the host for every map, destroy
//! and workspace switch request, however the requests interleave.

pub mod animation;
pub mod manager;
pub mod switch;

pub use animation::{
    AnimationKind, AnimationParams, AnimationStateMachine, CompletionHandler, CompletionStatus,
    DestroyEffect, MapEffect,
};
pub use manager::{desired_placement, ManagerSettings, WindowManager};
pub use switch::{MotionDirection, SwitchOffsets, SwitchState, WorkspaceSwitchCoordinator};
