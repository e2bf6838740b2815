pub mod registry;
pub mod timeout;
pub mod token;

pub use registry::{BoundaryRegistry, RegistryStats};
pub use timeout::TimeoutSignal;
pub use token::{AsyncToken, SettleHandle};

use futures::future::{self, Either};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::RenderError;
use crate::host::{HostNodeId, HostTree};
use crate::reconcile::{MountRecord, Reconciler, RenderContext, RenderHalt};
use crate::schedule::RenderScheduler;
use crate::tree::{ComponentInstance, VNode};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryId(String);

impl BoundaryId {
    fn new() -> Self {
        Self(format!("boundary-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SuspenseProps {
    pub children: VNode,
    pub fallback: VNode,
    pub max_duration: Option<Duration>,
}

#[derive(Debug, Clone)]
struct RenderedContent {
    description: VNode,
    /// Absent when the initial render attempt suspended before
    /// producing output.
    host: Option<HostNodeId>,
}

#[derive(Debug)]
struct ParkedContent {
    content: RenderedContent,
    /// Child index the content occupied in the parent host node, so
    /// restoration reattaches at the prior position.
    slot: usize,
}

/// Episode lifecycle. Fallback bookkeeping lives only in the state that
/// mounted it, so "showing fallback without parked content" cannot be
/// represented.
#[derive(Debug)]
enum EpisodeState {
    Idle,
    Collecting {
        timeout: TimeoutSignal,
    },
    ShowingFallback {
        timeout: TimeoutSignal,
        parked: ParkedContent,
        fallback_node: HostNodeId,
    },
}

struct BoundaryCore {
    outstanding: SmallVec<[AsyncToken; 4]>,
    state: EpisodeState,
    content: Option<RenderedContent>,
    parent_host: Option<HostNodeId>,
    /// Liveness guard: set on unmount, checked by every mutation path
    /// so settlement callbacks against a torn-down boundary are no-ops.
    detached: bool,
}

struct BoundaryShared {
    id: BoundaryId,
    props: SuspenseProps,
    core: Mutex<BoundaryCore>,
    host: Arc<Mutex<HostTree>>,
    reconciler: Arc<dyn Reconciler>,
    scheduler: Arc<dyn RenderScheduler>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundaryStats {
    pub outstanding: usize,
    pub timeout_armed: bool,
    pub timeout_completed: bool,
    pub showing_fallback: bool,
    pub mounted: bool,
    pub detached: bool,
}

/// A boundary that collects suspensions from its descendants for the
/// current episode, races them against the episode timeout, and swaps
/// its rendered content for fallback content while the episode is
/// unresolved. Cloning shares the boundary.
#[derive(Clone)]
pub struct SuspenseBoundary {
    shared: Arc<BoundaryShared>,
}

impl SuspenseBoundary {
    pub fn new(
        props: SuspenseProps,
        host: Arc<Mutex<HostTree>>,
        reconciler: Arc<dyn Reconciler>,
        scheduler: Arc<dyn RenderScheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(BoundaryShared {
                id: BoundaryId::new(),
                props,
                core: Mutex::new(BoundaryCore {
                    outstanding: SmallVec::new(),
                    state: EpisodeState::Idle,
                    content: None,
                    parent_host: None,
                    detached: false,
                }),
                host,
                reconciler,
                scheduler,
            }),
        }
    }

    pub fn id(&self) -> &BoundaryId {
        &self.shared.id
    }

    pub fn props(&self) -> &SuspenseProps {
        &self.shared.props
    }

    pub fn is_showing_fallback(&self) -> bool {
        matches!(self.shared.core.lock().state, EpisodeState::ShowingFallback { .. })
    }

    pub fn stats(&self) -> BoundaryStats {
        let core = self.shared.core.lock();
        let (timeout_armed, timeout_completed) = match &core.state {
            EpisodeState::Idle => (false, false),
            EpisodeState::Collecting { timeout }
            | EpisodeState::ShowingFallback { timeout, .. } => (true, timeout.is_completed()),
        };
        BoundaryStats {
            outstanding: core.outstanding.len(),
            timeout_armed,
            timeout_completed,
            showing_fallback: matches!(core.state, EpisodeState::ShowingFallback { .. }),
            mounted: core.parent_host.is_some(),
            detached: core.detached,
        }
    }

    /// Pure view of the boundary: the fallback description while the
    /// fallback is mounted, the children description otherwise. No
    /// side effects; all mutation happens in the episode machinery.
    pub fn render(&self) -> VNode {
        let core = self.shared.core.lock();
        match core.state {
            EpisodeState::ShowingFallback { .. } => self.shared.props.fallback.clone(),
            _ => self.shared.props.children.clone(),
        }
    }

    /// Description of the currently retained real content, parked or
    /// live. Absent until the first render attempt records one.
    pub fn content_description(&self) -> Option<VNode> {
        let core = self.shared.core.lock();
        match &core.state {
            EpisodeState::ShowingFallback { parked, .. } => {
                Some(parked.content.description.clone())
            }
            _ => core.content.as_ref().map(|c| c.description.clone()),
        }
    }

    /// Initial render attempt of the children into `parent`. A
    /// suspension is intercepted and registered; a failure propagates.
    pub fn mount(&self, parent: HostNodeId) -> Result<(), RenderError> {
        {
            let mut core = self.shared.core.lock();
            if core.detached {
                return Err(RenderError::not_mounted(self.shared.id.to_string()));
            }
            if core.parent_host.is_some() {
                return Err(RenderError::internal(format!(
                    "{} is already mounted",
                    self.shared.id
                )));
            }
            core.parent_host = Some(parent);
        }
        self.render_children_into(parent, None)
    }

    /// Scheduled re-render of the children, replacing the current
    /// content subtree. While the fallback is showing this is a no-op;
    /// restoration re-renders content through the scheduler.
    pub fn rerender(&self) -> Result<(), RenderError> {
        let (parent, replacing) = {
            let core = self.shared.core.lock();
            if core.detached {
                return Err(RenderError::not_mounted(self.shared.id.to_string()));
            }
            if matches!(core.state, EpisodeState::ShowingFallback { .. }) {
                debug!(boundary = %self.shared.id, "re-render skipped while fallback is shown");
                return Ok(());
            }
            let parent = core
                .parent_host
                .ok_or_else(|| RenderError::not_mounted(self.shared.id.to_string()))?;
            (parent, core.content.as_ref().and_then(|c| c.host))
        };
        self.render_children_into(parent, replacing)
    }

    /// Tears the boundary down. Outstanding tokens keep settling, but
    /// their callbacks observe the liveness guard and leave the host
    /// tree alone.
    pub fn unmount(&self) {
        let mut core = self.shared.core.lock();
        if core.detached {
            return;
        }
        core.detached = true;
        core.outstanding.clear();
        let state = std::mem::replace(&mut core.state, EpisodeState::Idle);
        let mut host = self.shared.host.lock();
        if let EpisodeState::ShowingFallback { parked, fallback_node, .. } = state {
            let _ = host.remove(fallback_node);
            if let Some(node) = parked.content.host {
                let _ = host.remove(node);
            }
        }
        if let Some(content) = core.content.take()
            && let Some(node) = content.host
        {
            let _ = host.remove(node);
        }
        core.parent_host = None;
        debug!(boundary = %self.shared.id, "boundary unmounted");
    }

    /// Registration entry point invoked by a descendant render attempt
    /// that cannot produce content yet. Arms the episode timeout on
    /// first registration, tracks the token, and races its settlement
    /// against the timeout. Token failure is indistinguishable from
    /// success here; descendants surface their own errors.
    pub fn on_descendant_suspended(&self, token: AsyncToken, component: ComponentInstance) {
        let (timeout, epoch_len) = {
            let mut core = self.shared.core.lock();
            if core.detached {
                debug!(boundary = %self.shared.id, "suspension after unmount ignored");
                return;
            }
            let timeout = match &core.state {
                EpisodeState::Idle => {
                    let timeout = TimeoutSignal::arm(self.shared.props.max_duration);
                    debug!(boundary = %self.shared.id, "episode started");
                    core.state = EpisodeState::Collecting { timeout: timeout.clone() };
                    timeout
                }
                EpisodeState::Collecting { timeout }
                | EpisodeState::ShowingFallback { timeout, .. } => timeout.clone(),
            };
            core.outstanding.push(token.clone());
            (timeout, core.outstanding.len())
        };

        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            match future::select(token.settled(), timeout.settled()).await {
                Either::Left(_) => {
                    // The token settled before the episode timeout. The
                    // settlement must be observed before the fallback
                    // decision so a completed episode never flickers.
                    if let Some(shared) = weak.upgrade() {
                        shared.settlement_check(epoch_len, &component);
                        shared.evaluate_episode();
                    }
                }
                Either::Right((_, token_settled)) => {
                    if let Some(shared) = weak.upgrade() {
                        shared.evaluate_episode();
                    }
                    token_settled.await;
                    if let Some(shared) = weak.upgrade() {
                        shared.settlement_check(epoch_len, &component);
                    }
                }
            }
        });
    }

    fn render_children_into(
        &self,
        parent: HostNodeId,
        replacing: Option<HostNodeId>,
    ) -> Result<(), RenderError> {
        let context = RenderContext::default();
        match self.shared.reconciler.render(None, &self.shared.props.children, &context) {
            Ok(node) => {
                {
                    let mut host = self.shared.host.lock();
                    let slot = match replacing {
                        Some(old) => {
                            let index = host
                                .child_index(old)
                                .unwrap_or_else(|| host.node(parent).map_or(0, |p| p.children.len()));
                            host.remove(old)?;
                            index
                        }
                        None => host.node(parent).map_or(0, |p| p.children.len()),
                    };
                    host.attach_at(parent, node, slot)?;
                }
                self.shared
                    .reconciler
                    .commit(vec![MountRecord { node }], &self.shared.props.children);
                let mut core = self.shared.core.lock();
                core.content = Some(RenderedContent {
                    description: self.shared.props.children.clone(),
                    host: Some(node),
                });
                Ok(())
            }
            Err(RenderHalt::Suspended { token, component }) => {
                {
                    let mut core = self.shared.core.lock();
                    if core.content.is_none() {
                        core.content = Some(RenderedContent {
                            description: self.shared.props.children.clone(),
                            host: None,
                        });
                    }
                }
                self.on_descendant_suspended(token, component);
                Ok(())
            }
            Err(RenderHalt::Failed(error)) => Err(error),
        }
    }
}

impl fmt::Debug for SuspenseBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspenseBoundary").field("id", &self.shared.id).finish()
    }
}

impl BoundaryShared {
    /// Runs when one token settles. A settlement is stale when newer
    /// suspensions arrived after it was registered; a stale settlement
    /// must not restore content while work is still outstanding.
    fn settlement_check(&self, epoch_len: usize, component: &ComponentInstance) {
        let mut core = self.core.lock();
        if core.detached {
            return;
        }
        if core.outstanding.len() != epoch_len {
            debug!(
                boundary = %self.id,
                registered = epoch_len,
                outstanding = core.outstanding.len(),
                "stale settlement ignored"
            );
            return;
        }
        core.outstanding.clear();
        match std::mem::replace(&mut core.state, EpisodeState::Idle) {
            EpisodeState::ShowingFallback { parked, fallback_node, .. } => {
                {
                    let mut host = self.host.lock();
                    if let Err(e) = host.remove(fallback_node) {
                        error!(boundary = %self.id, "failed to unmount fallback: {e}");
                    }
                    if let Some(node) = parked.content.host
                        && let Some(parent) = core.parent_host
                        && let Err(e) = host.attach_at(parent, node, parked.slot)
                    {
                        error!(boundary = %self.id, "failed to reattach parked content: {e}");
                    }
                }
                core.content = Some(parked.content);
                debug!(boundary = %self.id, component = %component.id, "fallback retired");
                drop(core);
                self.scheduler.enqueue_rerender(component.clone());
            }
            EpisodeState::Collecting { .. } => {
                debug!(boundary = %self.id, "episode settled before timeout");
            }
            EpisodeState::Idle => {}
        }
    }

    /// Runs after the registration-level race settles. Mounts the
    /// fallback when the timeout has expired with work still
    /// outstanding; every other state is a no-op, which keeps the
    /// fallback mounted at most once per episode.
    fn evaluate_episode(&self) {
        let mut core = self.core.lock();
        if core.detached || core.outstanding.is_empty() {
            return;
        }
        let state = std::mem::replace(&mut core.state, EpisodeState::Idle);
        let timeout = match state {
            EpisodeState::Collecting { timeout } if timeout.is_completed() => timeout,
            other => {
                core.state = other;
                return;
            }
        };

        let Some(parent) = core.parent_host else {
            // suspensions can be registered before mount; keep the
            // episode armed until there is a tree to swap content in
            core.state = EpisodeState::Collecting { timeout };
            return;
        };

        let content = core.content.take().unwrap_or_else(|| RenderedContent {
            description: self.props.children.clone(),
            host: None,
        });
        let slot = {
            let mut host = self.host.lock();
            match content.host {
                Some(node) => host.detach(node).unwrap_or_else(|e| {
                    error!(boundary = %self.id, "failed to park content: {e}");
                    host.node(parent).map_or(0, |p| p.children.len())
                }),
                None => host.node(parent).map_or(0, |p| p.children.len()),
            }
        };

        let context = RenderContext::default();
        match self.reconciler.render(None, &self.props.fallback, &context) {
            Ok(fallback_node) => {
                {
                    let mut host = self.host.lock();
                    if let Err(e) = host.attach_at(parent, fallback_node, slot) {
                        error!(boundary = %self.id, "failed to attach fallback: {e}");
                    }
                }
                self.reconciler.commit(vec![MountRecord { node: fallback_node }], &self.props.fallback);
                debug!(
                    boundary = %self.id,
                    outstanding = core.outstanding.len(),
                    "fallback mounted"
                );
                core.state = EpisodeState::ShowingFallback {
                    timeout,
                    parked: ParkedContent { content, slot },
                    fallback_node,
                };
            }
            Err(halt) => {
                let message = match halt {
                    RenderHalt::Failed(e) => e.to_string(),
                    RenderHalt::Suspended { .. } => "fallback content suspended".to_string(),
                };
                error!(boundary = %self.id, "fallback render failed: {message}");
                if let Some(node) = content.host {
                    let mut host = self.host.lock();
                    if let Err(e) = host.attach_at(parent, node, slot) {
                        error!(boundary = %self.id, "failed to restore parked content: {e}");
                    }
                }
                core.content = Some(content);
                core.state = EpisodeState::Collecting { timeout };
            }
        }
    }
}
