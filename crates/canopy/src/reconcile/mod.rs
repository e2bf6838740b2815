use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::RenderError;
use crate::host::{HostNodeId, HostTree};
use crate::suspense::AsyncToken;
use crate::tree::{ComponentInstance, Props, RenderOutcome, VNode};

/// Why a render attempt stopped short of producing a host node. This is
/// the explicit form of the suspend-or-fail signal: suspension carries
/// the token and the component that signaled it, failure carries the
/// error and keeps propagating.
#[derive(Debug)]
pub enum RenderHalt {
    Suspended {
        token: AsyncToken,
        component: ComponentInstance,
    },
    Failed(RenderError),
}

impl From<RenderError> for RenderHalt {
    fn from(error: RenderError) -> Self {
        RenderHalt::Failed(error)
    }
}

/// Context inherited by a subtree render, cloned per render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub values: FxHashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct MountRecord {
    pub node: HostNodeId,
}

/// Narrow rendering contract consumed by the boundary machinery. The
/// produced host node is returned detached; callers decide where it is
/// attached and finalize the batch with `commit`.
pub trait Reconciler: Send + Sync {
    fn render(
        &self,
        anchor: Option<HostNodeId>,
        content: &VNode,
        context: &RenderContext,
    ) -> Result<HostNodeId, RenderHalt>;

    fn commit(&self, mounts: Vec<MountRecord>, root: &VNode);
}

/// Fresh (non-diffing) renderer of content descriptions into the host
/// arena. Patching an existing subtree in place is the diffing engine's
/// concern, so the anchor is accepted for contract parity and ignored.
pub struct BasicReconciler {
    host: Arc<Mutex<HostTree>>,
}

impl BasicReconciler {
    pub fn new(host: Arc<Mutex<HostTree>>) -> Self {
        Self { host }
    }

    fn render_node(
        &self,
        content: &VNode,
        context: &RenderContext,
    ) -> Result<HostNodeId, RenderHalt> {
        match content {
            VNode::Element { tag, props, children } => {
                let attrs = attrs_from_props(props);
                let id = self.host.lock().create_element(tag, attrs);
                self.render_children(id, children, context)?;
                Ok(id)
            }
            VNode::Text(text) => Ok(self.host.lock().create_text(text)),
            VNode::Fragment(children) => {
                let id = self.host.lock().create_container();
                self.render_children(id, children, context)?;
                Ok(id)
            }
            VNode::Null => Ok(self.host.lock().create_placeholder()),
            VNode::Component { def, props } => {
                let instance = ComponentInstance::new(Arc::clone(def), props.clone());
                match instance.render_attempt() {
                    RenderOutcome::Ready(description) => self.render_node(&description, context),
                    RenderOutcome::Suspended(token) => {
                        debug!(component = instance.name(), "render attempt suspended");
                        Err(RenderHalt::Suspended { token, component: instance })
                    }
                    RenderOutcome::Failed(error) => Err(RenderHalt::Failed(error)),
                }
            }
        }
    }

    fn render_children(
        &self,
        parent: HostNodeId,
        children: &[VNode],
        context: &RenderContext,
    ) -> Result<(), RenderHalt> {
        for child in children {
            match self.render_node(child, context) {
                Ok(child_id) => {
                    if let Err(error) = self.host.lock().attach(parent, child_id) {
                        let _ = self.host.lock().remove(parent);
                        return Err(RenderHalt::Failed(error));
                    }
                }
                Err(halt) => {
                    // drop the partially built subtree before propagating
                    let _ = self.host.lock().remove(parent);
                    return Err(halt);
                }
            }
        }
        Ok(())
    }
}

impl Reconciler for BasicReconciler {
    fn render(
        &self,
        _anchor: Option<HostNodeId>,
        content: &VNode,
        context: &RenderContext,
    ) -> Result<HostNodeId, RenderHalt> {
        self.render_node(content, context)
    }

    fn commit(&self, mounts: Vec<MountRecord>, _root: &VNode) {
        let mut host = self.host.lock();
        for mount in mounts {
            host.mark_committed(mount.node);
        }
    }
}

fn attrs_from_props(props: &Props) -> FxHashMap<String, String> {
    props
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
