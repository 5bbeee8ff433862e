//! Element tree of a SAP GUI session.
//!
//! SAP GUI's `GuiSession.GetObjectTree` returns the whole element hierarchy as
//! a JSON document of the form
//! `{"properties": {"Id": "...", "Type": "..."}, "children": [...]}`. The
//! bridge flattens that into [`GuiNode`]s before sending it to the client.

use serde::{Deserialize, Serialize};

/// One element of a session's object tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiNode {
    /// Scripting id, e.g. `/app/con[0]/ses[0]/wnd[0]/usr/txtRSYST-BNAME`.
    /// Empty for container nodes that carry no id.
    pub id: String,
    /// Scripting type name (`GuiTextField`, `GuiTableControl`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GuiNode>,
}

impl GuiNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<GuiNode>) -> Self {
        self.children = children;
        self
    }

    /// Depth-first, pre-order walk over this node and all descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Ids of every node that has one, in walk order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.walk()
            .filter(|node| !node.id.is_empty())
            .map(|node| node.id.as_str())
    }

    /// Find the node with exactly this id.
    pub fn find(&self, id: &str) -> Option<&GuiNode> {
        self.walk().find(|node| node.id == id)
    }
}

/// Iterator returned by [`GuiNode::walk`].
pub struct Walk<'a> {
    stack: Vec<&'a GuiNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a GuiNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    properties: RawProperties,
    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Default, Deserialize)]
struct RawProperties {
    #[serde(rename = "Id", default)]
    id: String,
    #[serde(rename = "Type", default)]
    kind: String,
}

impl From<RawNode> for GuiNode {
    fn from(raw: RawNode) -> Self {
        GuiNode {
            id: raw.properties.id,
            kind: raw.properties.kind,
            children: raw.children.into_iter().map(GuiNode::from).collect(),
        }
    }
}

/// Parse the JSON returned by `GuiSession.GetObjectTree`.
pub fn parse_object_tree(json: &str) -> Result<GuiNode, serde_json::Error> {
    let raw: RawNode = serde_json::from_str(json)?;
    Ok(raw.into())
}
