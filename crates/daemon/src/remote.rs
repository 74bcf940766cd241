//! Compositor proxy for the connected host.
//!
//! The manager runs synchronously inside the event loop, so every backend
//! call is answered from a local mirror of the host's windows and queued as
//! a [`BackendRequest`]. The event loop flushes the queue to the host
//! socket after each event.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core_layout::{Rect, WindowId, WindowInfo};
use tessera_ipc::{BackendRequest, HostWindow};
use tessera_platform::{
    ActorId, ActorProps, Completion, Compositor, Container, EaseSpec, GroupId, PlatformError,
    Target, TransitionSeq,
};
use tracing::{debug, warn};

/// Screen size assumed until the host says hello.
const FALLBACK_SCREEN_WIDTH: i32 = 1920;
const FALLBACK_SCREEN_HEIGHT: i32 = 1080;

pub struct RemoteCompositor {
    connected: bool,
    screen: (i32, i32),
    work_area: Rect,
    windows: BTreeMap<WindowId, HostWindow>,
    groups: BTreeSet<GroupId>,
    next_group: GroupId,
    next_seq: TransitionSeq,
    outbox: Vec<BackendRequest>,
}

impl Default for RemoteCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteCompositor {
    /// A proxy with no host behind it.
    pub fn new() -> Self {
        Self {
            connected: false,
            screen: (FALLBACK_SCREEN_WIDTH, FALLBACK_SCREEN_HEIGHT),
            work_area: Rect::new(0, 0, FALLBACK_SCREEN_WIDTH, FALLBACK_SCREEN_HEIGHT),
            windows: BTreeMap::new(),
            groups: BTreeSet::new(),
            next_group: 1,
            next_seq: 1,
            outbox: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Reset the mirror from a host hello.
    ///
    /// Requests already queued for this host, such as completions of the
    /// previous session, are kept.
    pub fn connect(&mut self, width: i32, height: i32, work_area: Rect, windows: Vec<HostWindow>) {
        self.connected = true;
        self.set_screen(width, height, work_area);
        self.windows = windows.into_iter().map(|w| (w.info.id, w)).collect();
        self.groups.clear();
    }

    /// Forget the host. Queued requests are dropped.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.windows.clear();
        self.groups.clear();
        self.outbox.clear();
    }

    pub fn set_screen(&mut self, width: i32, height: i32, work_area: Rect) {
        self.screen = (width, height);
        self.work_area = work_area;
    }

    /// Record a newly mapped window.
    pub fn insert_window(&mut self, window: HostWindow) {
        self.windows.insert(window.info.id, window);
    }

    /// Refresh the host attributes of a known window.
    pub fn update_window(&mut self, info: WindowInfo) {
        match self.windows.get_mut(&info.id) {
            Some(window) => window.info = info,
            None => debug!("Update for unknown window {}", info.id),
        }
    }

    pub fn window(&self, window: WindowId) -> Option<&WindowInfo> {
        self.windows.get(&window).map(|w| &w.info)
    }

    /// Queue a request that has no [`Compositor`] counterpart.
    pub fn push(&mut self, request: BackendRequest) {
        if self.connected {
            self.outbox.push(request);
        }
    }

    /// Drain every queued request, oldest first.
    pub fn take_requests(&mut self) -> Vec<BackendRequest> {
        std::mem::take(&mut self.outbox)
    }

    fn allocate_seq(&mut self) -> TransitionSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn check_actor(&self, actor: ActorId) -> Result<(), PlatformError> {
        if !self.connected {
            return Err(PlatformError::Disconnected);
        }
        if self.windows.contains_key(&actor) {
            Ok(())
        } else {
            Err(PlatformError::ActorNotFound(actor))
        }
    }

    fn check_group(&self, group: GroupId) -> Result<(), PlatformError> {
        if !self.connected {
            return Err(PlatformError::Disconnected);
        }
        if self.groups.contains(&group) {
            Ok(())
        } else {
            Err(PlatformError::GroupNotFound(group))
        }
    }
}

impl Compositor for RemoteCompositor {
    fn windows(&self) -> Vec<WindowInfo> {
        self.windows.values().map(|w| w.info.clone()).collect()
    }

    fn screen_size(&self) -> (i32, i32) {
        self.screen
    }

    fn work_area(&self) -> Rect {
        self.work_area
    }

    fn move_resize(&mut self, window_id: WindowId, rect: Rect) -> Result<(), PlatformError> {
        self.check_actor(window_id)?;
        if let Some(window) = self.windows.get_mut(&window_id) {
            window.info.rect = rect;
        }
        self.outbox.push(BackendRequest::MoveResize { window_id, rect });
        Ok(())
    }

    fn unmaximize(&mut self, window_id: WindowId) -> Result<(), PlatformError> {
        self.check_actor(window_id)?;
        self.outbox.push(BackendRequest::Unmaximize { window_id });
        Ok(())
    }

    fn activate(&mut self, window_id: WindowId) -> Result<(), PlatformError> {
        self.check_actor(window_id)?;
        self.outbox.push(BackendRequest::Activate { window_id });
        Ok(())
    }

    fn show(&mut self, actor: ActorId) -> Result<(), PlatformError> {
        self.check_actor(actor)?;
        self.outbox.push(BackendRequest::Show { actor });
        Ok(())
    }

    fn set_actor_props(&mut self, actor: ActorId, props: ActorProps) -> Result<(), PlatformError> {
        self.check_actor(actor)?;
        self.outbox.push(BackendRequest::SetActorProps { actor, props });
        Ok(())
    }

    fn animate_actor(
        &mut self,
        actor: ActorId,
        props: ActorProps,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError> {
        self.check_actor(actor)?;
        let seq = self.allocate_seq();
        self.outbox.push(BackendRequest::AnimateActor {
            actor,
            props,
            ease,
            seq,
        });
        Ok(seq)
    }

    fn remove_all_transitions(&mut self, target: Target) {
        self.push(BackendRequest::RemoveAllTransitions { target });
    }

    fn create_group(&mut self) -> GroupId {
        let group = self.next_group;
        self.next_group += 1;
        if self.connected {
            self.groups.insert(group);
        }
        self.push(BackendRequest::CreateGroup { group });
        group
    }

    fn destroy_group(&mut self, group: GroupId) {
        if self.groups.remove(&group) {
            self.push(BackendRequest::DestroyGroup { group });
        }
    }

    fn set_group_position(&mut self, group: GroupId, x: i32, y: i32) -> Result<(), PlatformError> {
        self.check_group(group)?;
        self.outbox
            .push(BackendRequest::SetGroupPosition { group, x, y });
        Ok(())
    }

    fn animate_group_position(
        &mut self,
        group: GroupId,
        x: i32,
        y: i32,
        ease: EaseSpec,
    ) -> Result<TransitionSeq, PlatformError> {
        self.check_group(group)?;
        let seq = self.allocate_seq();
        self.outbox.push(BackendRequest::AnimateGroupPosition {
            group,
            x,
            y,
            ease,
            seq,
        });
        Ok(seq)
    }

    fn parent_of(&self, actor: ActorId) -> Option<Container> {
        self.windows.get(&actor).map(|w| w.parent)
    }

    fn reparent(&mut self, actor: ActorId, parent: Container) -> Result<(), PlatformError> {
        self.check_actor(actor)?;
        if let Container::Group(group) = parent {
            self.check_group(group)?;
        }
        if let Some(window) = self.windows.get_mut(&actor) {
            window.parent = parent;
        }
        self.outbox.push(BackendRequest::Reparent { actor, parent });
        Ok(())
    }

    fn complete(&mut self, completion: Completion) {
        if !self.connected {
            warn!("Dropping {:?}: host is gone", completion);
            return;
        }
        if let Completion::Destroy(actor) = completion {
            self.windows.remove(&actor);
        }
        self.outbox.push(BackendRequest::Complete { completion });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core_layout::WindowKind;
    use tessera_platform::WINDOW_GROUP;

    fn host_window(id: WindowId) -> HostWindow {
        HostWindow {
            info: WindowInfo::new(id, WindowKind::Normal, 0),
            parent: Container::Host(WINDOW_GROUP),
        }
    }

    fn connected() -> RemoteCompositor {
        let mut remote = RemoteCompositor::new();
        remote.connect(1280, 720, Rect::new(0, 0, 1280, 700), vec![host_window(1)]);
        remote
    }

    #[test]
    fn test_disconnected_calls_fail() {
        let mut remote = RemoteCompositor::new();
        assert!(matches!(
            remote.move_resize(1, Rect::new(0, 0, 10, 10)),
            Err(PlatformError::Disconnected)
        ));
        remote.complete(Completion::SwitchWorkspace);
        assert!(remote.take_requests().is_empty());
        assert_eq!(remote.screen_size(), (1920, 1080));
    }

    #[test]
    fn test_calls_are_queued_in_order() {
        let mut remote = connected();
        remote.move_resize(1, Rect::new(0, 0, 1280, 700)).unwrap();
        remote.activate(1).unwrap();

        assert_eq!(
            remote.take_requests(),
            vec![
                BackendRequest::MoveResize {
                    window_id: 1,
                    rect: Rect::new(0, 0, 1280, 700)
                },
                BackendRequest::Activate { window_id: 1 },
            ]
        );
        assert!(remote.take_requests().is_empty());
        assert_eq!(remote.window(1).unwrap().rect, Rect::new(0, 0, 1280, 700));
    }

    #[test]
    fn test_unknown_window() {
        let mut remote = connected();
        assert!(matches!(remote.show(42), Err(PlatformError::ActorNotFound(42))));
        assert!(remote.take_requests().is_empty());
    }

    #[test]
    fn test_groups_and_parents_are_mirrored() {
        let mut remote = connected();
        let group = remote.create_group();
        remote.reparent(1, Container::Group(group)).unwrap();
        assert_eq!(remote.parent_of(1), Some(Container::Group(group)));

        remote.destroy_group(group);
        remote.destroy_group(group);
        assert!(matches!(
            remote.set_group_position(group, 0, 0),
            Err(PlatformError::GroupNotFound(_))
        ));

        let requests = remote.take_requests();
        assert_eq!(requests.first(), Some(&BackendRequest::CreateGroup { group }));
        assert_eq!(requests.last(), Some(&BackendRequest::DestroyGroup { group }));
        assert_eq!(requests.len(), 3);
    }

    #[test]
    fn test_destroy_completion_forgets_window() {
        let mut remote = connected();
        remote.complete(Completion::Destroy(1));
        assert!(remote.window(1).is_none());
        assert_eq!(
            remote.take_requests(),
            vec![BackendRequest::Complete {
                completion: Completion::Destroy(1)
            }]
        );
    }

    #[test]
    fn test_animations_get_fresh_tags() {
        let mut remote = connected();
        let ease = EaseSpec::new(tessera_platform::Easing::Linear, 100);
        let first = remote
            .animate_actor(1, ActorProps::new().opacity(0), ease)
            .unwrap();

        remote.disconnect();
        remote.connect(1280, 720, Rect::new(0, 0, 1280, 700), vec![host_window(1)]);
        let second = remote
            .animate_actor(1, ActorProps::new().opacity(255), ease)
            .unwrap();

        assert!(second > first);
        assert_eq!(
            remote.take_requests(),
            vec![BackendRequest::AnimateActor {
                actor: 1,
                props: ActorProps::new().opacity(255),
                ease,
                seq: second,
            }]
        );
    }

    #[test]
    fn test_hello_keeps_queued_completions() {
        let mut remote = connected();
        remote.complete(Completion::Map(1));
        remote.connect(1280, 720, Rect::new(0, 0, 1280, 700), vec![host_window(1)]);
        assert_eq!(
            remote.take_requests(),
            vec![BackendRequest::Complete {
                completion: Completion::Map(1)
            }]
        );
    }

    #[test]
    fn test_disconnect_clears_mirror() {
        let mut remote = connected();
        remote.activate(1).unwrap();
        remote.disconnect();
        assert!(!remote.is_connected());
        assert!(remote.windows().is_empty());
        assert!(remote.take_requests().is_empty());
    }
}
