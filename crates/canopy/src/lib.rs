//! Asynchronous boundaries for a virtual-tree rendering engine: a
//! suspension boundary that shows fallback content while descendant
//! work is outstanding, and a lazy factory that defers loading a
//! component implementation until first render.

pub mod error;
pub mod host;
pub mod lazy;
pub mod reconcile;
pub mod schedule;
pub mod suspense;
pub mod tree;

pub use error::RenderError;
pub use host::{HostNode, HostNodeId, HostNodeKind, HostTree};
pub use lazy::{ComponentModule, LazyComponent, LoadPhase, LoaderFuture, make_lazy};
pub use reconcile::{BasicReconciler, MountRecord, Reconciler, RenderContext, RenderHalt};
pub use schedule::{RenderScheduler, WorkQueue};
pub use suspense::{
    AsyncToken, BoundaryId, BoundaryRegistry, BoundaryStats, RegistryStats, SettleHandle,
    SuspenseBoundary, SuspenseProps, TimeoutSignal,
};
pub use tree::{ComponentDef, ComponentId, ComponentInstance, Props, RenderOutcome, VNode};
