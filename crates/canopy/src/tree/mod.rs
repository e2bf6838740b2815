use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RenderError;
use crate::suspense::AsyncToken;

pub type Props = FxHashMap<String, Value>;

/// Contract every renderable component implements. A render attempt is
/// synchronous and must not block; components that are not ready yet
/// return `RenderOutcome::Suspended` instead.
pub trait ComponentDef: Send + Sync {
    fn name(&self) -> &str;

    fn render(&self, props: &Props) -> RenderOutcome;
}

/// One of three outcomes per render attempt. Suspension is a signal,
/// not an error: it carries the token for the outstanding operation and
/// is intercepted by the nearest boundary above the signaling point.
#[derive(Debug)]
pub enum RenderOutcome {
    Ready(VNode),
    Suspended(AsyncToken),
    Failed(RenderError),
}

#[derive(Clone)]
pub enum VNode {
    Element {
        tag: String,
        props: Props,
        children: Vec<VNode>,
    },
    Text(String),
    Component {
        def: Arc<dyn ComponentDef>,
        props: Props,
    },
    Fragment(Vec<VNode>),
    Null,
}

impl VNode {
    pub fn element(tag: &str, props: Props, children: Vec<VNode>) -> Self {
        VNode::Element { tag: tag.to_string(), props, children }
    }

    pub fn text(content: &str) -> Self {
        VNode::Text(content.to_string())
    }

    pub fn component(def: Arc<dyn ComponentDef>, props: Props) -> Self {
        VNode::Component { def, props }
    }

    pub fn fragment(children: Vec<VNode>) -> Self {
        VNode::Fragment(children)
    }

    pub fn null() -> Self {
        VNode::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, VNode::Null)
    }

    pub fn component_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_component_names(&mut names);
        names
    }

    fn collect_component_names(&self, names: &mut Vec<String>) {
        match self {
            VNode::Component { def, .. } => {
                names.push(def.name().to_string());
            }
            VNode::Element { children, .. } | VNode::Fragment(children) => {
                for child in children {
                    child.collect_component_names(names);
                }
            }
            _ => {}
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            VNode::Element { tag, props, children } => {
                let props_json: serde_json::Map<String, Value> =
                    props.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut element = serde_json::json!({
                    "type": tag,
                    "props": props_json,
                });
                if !children.is_empty() {
                    let children_json: Vec<Value> =
                        children.iter().map(|c| c.to_json()).collect();
                    if let Some(obj) = element.as_object_mut() {
                        obj.insert("children".to_string(), Value::Array(children_json));
                    }
                }
                element
            }
            VNode::Text(content) => Value::String(content.clone()),
            VNode::Component { def, props } => {
                let props_json: serde_json::Map<String, Value> =
                    props.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                serde_json::json!({
                    "$$component": def.name(),
                    "props": props_json,
                })
            }
            VNode::Fragment(children) => {
                Value::Array(children.iter().map(|c| c.to_json()).collect())
            }
            VNode::Null => Value::Null,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNode::Element { tag, props, children } => f
                .debug_struct("Element")
                .field("tag", tag)
                .field("props", &props.len())
                .field("children", &children.len())
                .finish(),
            VNode::Text(content) => write!(f, "Text({content:?})"),
            VNode::Component { def, .. } => write!(f, "Component({})", def.name()),
            VNode::Fragment(children) => write!(f, "Fragment({})", children.len()),
            VNode::Null => write!(f, "Null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(name: &str) -> Self {
        Self(format!("{name}-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component definition bound to concrete props, addressable by the
/// scheduler for re-renders.
#[derive(Clone)]
pub struct ComponentInstance {
    pub id: ComponentId,
    pub def: Arc<dyn ComponentDef>,
    pub props: Props,
}

impl ComponentInstance {
    pub fn new(def: Arc<dyn ComponentDef>, props: Props) -> Self {
        let id = ComponentId::new(def.name());
        Self { id, def, props }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn render_attempt(&self) -> RenderOutcome {
        self.def.render(&self.props)
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("name", &self.def.name())
            .finish()
    }
}
