//! Per-window map and destroy effects.
//!
//! Each actor has at most one running effect. Starting another effect on
//! the same actor collapses the running one first, so every map and destroy
//! request is reported to the host exactly once.
//!
//! A "transitions completed" notification only ends an effect when it carries
//! the tag the compositor returned when that effect was launched. Reports for
//! transitions an effect replaced arrive late and are dropped.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core_layout::WindowKind;
use tessera_platform::{
    ActorId, ActorProps, Completion, Compositor, EaseSpec, Easing, Pivot, Target, TransitionSeq,
};
use tracing::{debug, trace, warn};

/// What a window does when it appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEffect {
    /// Fade in while growing from the center.
    ScaleIn,
    /// Opacity only.
    FadeIn,
    /// Reported as done right away.
    None,
}

impl MapEffect {
    /// The map effect a window of `kind` gets.
    pub fn for_kind(kind: WindowKind) -> Self {
        match kind {
            WindowKind::Normal | WindowKind::Dialog | WindowKind::ModalDialog => Self::ScaleIn,
            WindowKind::PopupMenu | WindowKind::DropdownMenu | WindowKind::Notification => {
                Self::FadeIn
            }
            WindowKind::Other => Self::None,
        }
    }
}

/// What a window does when it goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyEffect {
    /// Fade out while shrinking towards the center.
    Shrink,
    /// Reported as done right away.
    None,
}

impl DestroyEffect {
    /// The destroy effect a window of `kind` gets.
    pub fn for_kind(kind: WindowKind) -> Self {
        match kind {
            WindowKind::Normal
            | WindowKind::Dialog
            | WindowKind::ModalDialog
            | WindowKind::Notification => Self::Shrink,
            WindowKind::PopupMenu | WindowKind::DropdownMenu | WindowKind::Other => Self::None,
        }
    }
}

/// The kind of effect running on an actor or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    MapNormal,
    MapMenuFade,
    DestroyShrink,
    /// Fade-in of a window adopted at startup.
    StartupFade,
    /// Group holding the windows of the workspace being left.
    WorkspaceSlideOut,
    /// Group holding the windows of the workspace being entered.
    WorkspaceSlideIn,
}

impl AnimationKind {
    /// Whether the actor is made visible before the effect starts.
    fn reveals(self) -> bool {
        matches!(self, Self::MapNormal | Self::MapMenuFade)
    }
}

/// How an effect ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The host reported the transitions as finished, or they were killed.
    Completed,
    /// Another effect on the same actor replaced this one.
    Cancelled,
}

/// Runs once when an effect ends.
pub type CompletionHandler = Box<dyn FnOnce(&mut dyn Compositor, CompletionStatus) + Send>;

struct AnimationHandle {
    kind: AnimationKind,
    seq: TransitionSeq,
    on_complete: CompletionHandler,
}

impl fmt::Debug for AnimationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationHandle")
            .field("kind", &self.kind)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Timing of every effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationParams {
    pub map: EaseSpec,
    /// Scale a mapped window starts from.
    pub map_scale: f64,
    pub fade: EaseSpec,
    pub destroy: EaseSpec,
    /// Scale a destroyed window shrinks to.
    pub destroy_scale: f64,
    pub switch: EaseSpec,
    /// Fade-in of the windows present when the manager starts.
    pub startup: EaseSpec,
}

impl Default for AnimationParams {
    fn default() -> Self {
        Self {
            map: EaseSpec::new(Easing::EaseIn, 150),
            map_scale: 0.8,
            fade: EaseSpec::new(Easing::EaseIn, 115),
            destroy: EaseSpec::new(Easing::EaseOutQuad, 130),
            destroy_scale: 0.6,
            switch: EaseSpec::new(Easing::EaseOutQuad, 250),
            startup: EaseSpec::new(Easing::EaseOutQuad, 1000),
        }
    }
}

/// Map and destroy effects, keyed by actor.
#[derive(Debug, Default)]
pub struct AnimationStateMachine {
    running: HashMap<ActorId, AnimationHandle>,
    params: AnimationParams,
}

impl AnimationStateMachine {
    /// Create a state machine with no running effect.
    pub fn new(params: AnimationParams) -> Self {
        Self {
            running: HashMap::new(),
            params,
        }
    }

    pub fn params(&self) -> &AnimationParams {
        &self.params
    }

    /// Change timings. Running effects keep the timing they started with.
    pub fn set_params(&mut self, params: AnimationParams) {
        self.params = params;
    }

    /// Whether an effect is running on `actor`.
    pub fn is_running(&self, actor: ActorId) -> bool {
        self.running.contains_key(&actor)
    }

    /// The kind of the effect running on `actor`.
    pub fn kind_of(&self, actor: ActorId) -> Option<AnimationKind> {
        self.running.get(&actor).map(|h| h.kind)
    }

    /// Number of actors with a running effect.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Start the map effect of an actor.
    pub fn start_map(
        &mut self,
        compositor: &mut dyn Compositor,
        actor: ActorId,
        effect: MapEffect,
    ) {
        self.collapse(compositor, actor);

        let (kind, from, to, ease) = match effect {
            MapEffect::ScaleIn => (
                AnimationKind::MapNormal,
                ActorProps::new()
                    .opacity(0)
                    .scale(self.params.map_scale)
                    .pivot(Pivot::CENTER),
                ActorProps::new().opacity(255).scale(1.0),
                self.params.map,
            ),
            MapEffect::FadeIn => (
                AnimationKind::MapMenuFade,
                ActorProps::new().opacity(0),
                ActorProps::new().opacity(255),
                self.params.fade,
            ),
            MapEffect::None => {
                compositor.complete(Completion::Map(actor));
                return;
            }
        };

        let on_complete: CompletionHandler = Box::new(
            move |compositor: &mut dyn Compositor, status: CompletionStatus| {
                trace!("Map effect of {} ended: {:?}", actor, status);
                if kind == AnimationKind::MapNormal {
                    let reset = ActorProps::new().pivot(Pivot::ORIGIN);
                    if let Err(e) = compositor.set_actor_props(actor, reset) {
                        warn!("Failed to reset pivot of {}: {}", actor, e);
                    }
                }
                compositor.remove_all_transitions(Target::Actor(actor));
                compositor.complete(Completion::Map(actor));
            },
        );

        self.launch(compositor, actor, kind, from, to, ease, on_complete);
    }

    /// Fade in a window that was already on screen when the manager started.
    ///
    /// Nothing is reported to the host when the fade ends.
    pub fn start_fade_in(&mut self, compositor: &mut dyn Compositor, actor: ActorId) {
        self.collapse(compositor, actor);

        let on_complete: CompletionHandler = Box::new(
            move |compositor: &mut dyn Compositor, status: CompletionStatus| {
                trace!("Startup fade of {} ended: {:?}", actor, status);
                compositor.remove_all_transitions(Target::Actor(actor));
                if status == CompletionStatus::Completed {
                    let opaque = ActorProps::new().opacity(255);
                    if let Err(e) = compositor.set_actor_props(actor, opaque) {
                        warn!("Failed to restore opacity of {}: {}", actor, e);
                    }
                }
            },
        );

        self.launch(
            compositor,
            actor,
            AnimationKind::StartupFade,
            ActorProps::new().opacity(0),
            ActorProps::new().opacity(255),
            self.params.startup,
            on_complete,
        );
    }

    /// Start the destroy effect of an actor.
    pub fn start_destroy(
        &mut self,
        compositor: &mut dyn Compositor,
        actor: ActorId,
        effect: DestroyEffect,
    ) {
        self.collapse(compositor, actor);

        if effect == DestroyEffect::None {
            compositor.complete(Completion::Destroy(actor));
            return;
        }

        let on_complete: CompletionHandler = Box::new(
            move |compositor: &mut dyn Compositor, status: CompletionStatus| {
                trace!("Destroy effect of {} ended: {:?}", actor, status);
                compositor.remove_all_transitions(Target::Actor(actor));
                compositor.complete(Completion::Destroy(actor));
            },
        );

        self.launch(
            compositor,
            actor,
            AnimationKind::DestroyShrink,
            ActorProps::new().pivot(Pivot::CENTER),
            ActorProps::new().opacity(0).scale(self.params.destroy_scale),
            self.params.destroy,
            on_complete,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn launch(
        &mut self,
        compositor: &mut dyn Compositor,
        actor: ActorId,
        kind: AnimationKind,
        from: ActorProps,
        to: ActorProps,
        ease: EaseSpec,
        on_complete: CompletionHandler,
    ) {
        let started = compositor
            .set_actor_props(actor, from)
            .and_then(|()| {
                if kind.reveals() {
                    compositor.show(actor)
                } else {
                    Ok(())
                }
            })
            .and_then(|()| compositor.animate_actor(actor, to, ease));

        match started {
            Ok(seq) => {
                debug!(
                    "Started {:?} on {} ({} ms, seq {})",
                    kind, actor, ease.duration_ms, seq
                );
                self.running.insert(
                    actor,
                    AnimationHandle {
                        kind,
                        seq,
                        on_complete,
                    },
                );
            }
            Err(e) => {
                warn!("Failed to start {:?} on {}: {}", kind, actor, e);
                on_complete(compositor, CompletionStatus::Completed);
            }
        }
    }

    /// End the running effect of `actor` with `Cancelled`, dropping its transitions.
    fn collapse(&mut self, compositor: &mut dyn Compositor, actor: ActorId) {
        if let Some(handle) = self.running.remove(&actor) {
            debug!("Cancelling {:?} on {}", handle.kind, actor);
            compositor.remove_all_transitions(Target::Actor(actor));
            (handle.on_complete)(compositor, CompletionStatus::Cancelled);
        }
    }

    /// The host finished every transition of `actor` up to the call tagged `seq`.
    ///
    /// Returns `false` when no effect was running on it, or when the running
    /// effect was launched with another tag.
    pub fn on_transitions_completed(
        &mut self,
        compositor: &mut dyn Compositor,
        actor: ActorId,
        seq: TransitionSeq,
    ) -> bool {
        match self.running.get(&actor) {
            Some(handle) if handle.seq == seq => self.finish(compositor, actor),
            Some(handle) => {
                debug!(
                    "Ignoring stale completion of {} (seq {}, running {:?} seq {})",
                    actor, seq, handle.kind, handle.seq
                );
                false
            }
            None => false,
        }
    }

    /// Finish the effect of `actor` now, as if its transitions had ended.
    pub fn kill(&mut self, compositor: &mut dyn Compositor, actor: ActorId) -> bool {
        self.finish(compositor, actor)
    }

    fn finish(&mut self, compositor: &mut dyn Compositor, actor: ActorId) -> bool {
        match self.running.remove(&actor) {
            Some(handle) => {
                (handle.on_complete)(compositor, CompletionStatus::Completed);
                true
            }
            None => false,
        }
    }

    /// Finish every running effect.
    pub fn kill_all(&mut self, compositor: &mut dyn Compositor) {
        let actors: Vec<ActorId> = self.running.keys().copied().collect();
        for actor in actors {
            self.kill(compositor, actor);
        }
    }
}
