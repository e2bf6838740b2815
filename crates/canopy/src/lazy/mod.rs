use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::RenderError;
use crate::suspense::{AsyncToken, SettleHandle};
use crate::tree::{ComponentDef, Props, RenderOutcome, VNode};

/// What a loader resolves to: a module object exposing the component
/// implementation to instantiate.
pub struct ComponentModule {
    pub default_export: Arc<dyn ComponentDef>,
}

impl ComponentModule {
    pub fn new(default_export: Arc<dyn ComponentDef>) -> Self {
        Self { default_export }
    }
}

impl fmt::Debug for ComponentModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentModule")
            .field("default_export", &self.default_export.name())
            .finish()
    }
}

pub type LoaderFuture = BoxFuture<'static, Result<ComponentModule, RenderError>>;

/// Observable phase of the memoized load, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    NotStarted,
    Loading,
    Ready,
    Failed,
}

enum LoadState {
    Idle,
    Loading { token: AsyncToken },
    Ready(Arc<dyn ComponentDef>),
    Failed(RenderError),
}

struct LazyShared {
    loader: Box<dyn Fn() -> LoaderFuture + Send + Sync>,
    state: Mutex<LoadState>,
}

/// Memoizing proxy that turns a one-time asynchronous load into
/// repeatable synchronous render attempts. The loader runs at most
/// once across the proxy's lifetime; every component instance built
/// from the proxy shares the single load. A failed load stays failed —
/// there is no retry.
#[derive(Clone)]
pub struct LazyComponent {
    shared: Arc<LazyShared>,
}

pub fn make_lazy<L>(loader: L) -> LazyComponent
where
    L: Fn() -> LoaderFuture + Send + Sync + 'static,
{
    LazyComponent {
        shared: Arc::new(LazyShared { loader: Box::new(loader), state: Mutex::new(LoadState::Idle) }),
    }
}

impl LazyComponent {
    pub fn load_phase(&self) -> LoadPhase {
        match &*self.shared.state.lock() {
            LoadState::Idle => LoadPhase::NotStarted,
            LoadState::Loading { .. } => LoadPhase::Loading,
            LoadState::Ready(_) => LoadPhase::Ready,
            LoadState::Failed(_) => LoadPhase::Failed,
        }
    }

    fn begin_load(shared: &Arc<LazyShared>) -> AsyncToken {
        let (token, settle) = AsyncToken::pending();
        let operation = (shared.loader)();
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            let result = operation.await;
            let Some(shared) = weak.upgrade() else {
                // proxy dropped while loading; the handle drop settles
                // the token for any remaining observer
                return;
            };
            finish_load(&shared, result, settle);
        });
        token
    }
}

fn finish_load(shared: &LazyShared, result: Result<ComponentModule, RenderError>, settle: SettleHandle) {
    let mut state = shared.state.lock();
    match result {
        Ok(module) => {
            debug!(component = module.default_export.name(), "lazy load resolved");
            *state = LoadState::Ready(module.default_export);
            drop(state);
            settle.fulfill();
        }
        Err(error) => {
            debug!("lazy load failed: {error}");
            *state = LoadState::Failed(error);
            drop(state);
            settle.fail();
        }
    }
}

impl ComponentDef for LazyComponent {
    fn name(&self) -> &str {
        "Lazy"
    }

    fn render(&self, props: &Props) -> RenderOutcome {
        let mut state = self.shared.state.lock();
        match &*state {
            LoadState::Failed(error) => RenderOutcome::Failed(error.clone()),
            LoadState::Ready(def) => {
                RenderOutcome::Ready(VNode::component(Arc::clone(def), props.clone()))
            }
            LoadState::Loading { token } => RenderOutcome::Suspended(token.clone()),
            LoadState::Idle => {
                let token = Self::begin_load(&self.shared);
                *state = LoadState::Loading { token: token.clone() };
                RenderOutcome::Suspended(token)
            }
        }
    }
}

impl fmt::Debug for LazyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyComponent").field("phase", &self.load_phase()).finish()
    }
}
