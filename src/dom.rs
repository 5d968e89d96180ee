//! Arena-backed document tree.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`] handles, so
//! several sanitizer passes can mutate the same tree without holding
//! references into it. A detached node stays in the arena with no parent and
//! is no longer reachable from the document node.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::ConfigValue;
use crate::error::{SanitizerError, SanitizerResult};

/// Handle of a node inside a [`Document`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered attribute bag. Setting an existing key updates it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// True when the key is absent or holds an empty string.
    pub fn is_blank(&self, key: &str) -> bool {
        self.get(key).map_or(true, |v| v.trim().is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

impl Serialize for Attributes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributesVisitor;

        impl<'de> Visitor<'de> for AttributesVisitor {
            type Value = Attributes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attribute names to scalar values")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Attributes, M::Error> {
                let mut attrs = Attributes::new();
                while let Some((key, value)) = access.next_entry::<String, ConfigValue>()? {
                    attrs.set(key, value.to_attribute_string());
                }
                Ok(attrs)
            }
        }

        deserializer.deserialize_map(AttributesVisitor)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Element { name: String, attributes: Attributes },
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Serializable description of a subtree, used to build and dump documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element {
        tag: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attrs: Attributes,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<NodeSpec>,
    },
}

impl NodeSpec {
    pub fn element(tag: &str) -> Self {
        NodeSpec::Element {
            tag: tag.to_string(),
            attrs: Attributes::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub const DOCUMENT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Build a document whose document element is described by `spec`.
    pub fn from_spec(spec: &NodeSpec) -> SanitizerResult<Self> {
        if !matches!(spec, NodeSpec::Element { .. }) {
            return Err(SanitizerError::InvalidTree(
                "the document element must be an element, not text".to_string(),
            ));
        }
        let mut doc = Document::new();
        let root = doc.build_spec(spec);
        doc.append_child(Self::DOCUMENT, root)?;
        Ok(doc)
    }

    pub fn from_yaml(yaml: &str) -> SanitizerResult<Self> {
        let spec: NodeSpec = serde_yaml::from_str(yaml)?;
        Self::from_spec(&spec)
    }

    fn build_spec(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Text(text) => self.create_text(text.clone()),
            NodeSpec::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.create_element_with_attributes(tag, attrs.clone());
                for child in children {
                    let child_id = self.build_spec(child);
                    self.nodes[id.index()].children.push(child_id);
                    self.nodes[child_id.index()].parent = Some(id);
                }
                id
            }
        }
    }

    /// Describe the document element (and everything under it).
    pub fn to_spec(&self) -> Option<NodeSpec> {
        self.document_element().map(|id| self.spec_of(id))
    }

    pub fn spec_of(&self, id: NodeId) -> NodeSpec {
        match &self.node(id).kind {
            NodeKind::Text(text) => NodeSpec::Text(text.clone()),
            NodeKind::Element { name, attributes } => NodeSpec::Element {
                tag: name.clone(),
                attrs: attributes.clone(),
                children: self
                    .children(id)
                    .iter()
                    .map(|&c| self.spec_of(c))
                    .collect(),
            },
            NodeKind::Document => NodeSpec::Element {
                tag: "#document".to_string(),
                attrs: Attributes::new(),
                children: self
                    .children(id)
                    .iter()
                    .map(|&c| self.spec_of(c))
                    .collect(),
            },
        }
    }

    fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    // ─── Construction ────────────────────────────────────────────────────

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.create_element_with_attributes(name, Attributes::new())
    }

    pub fn create_element_with_attributes(&mut self, name: &str, attributes: Attributes) -> NodeId {
        self.push(NodeKind::Element {
            name: name.to_ascii_lowercase(),
            attributes,
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(text.into()))
    }

    // ─── Structure ───────────────────────────────────────────────────────

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// True if `ancestor` is `id` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// True if the node is reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(Self::DOCUMENT, id)
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> SanitizerResult<()> {
        if matches!(self.kind(parent), NodeKind::Text(_)) {
            return Err(SanitizerError::InvalidTree(format!(
                "text node {} cannot have children",
                parent
            )));
        }
        if child == Self::DOCUMENT || self.is_inclusive_ancestor(child, parent) {
            return Err(SanitizerError::InvalidTree(format!(
                "inserting {} under {} would create a cycle",
                child, parent
            )));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> SanitizerResult<()> {
        self.check_insert(parent, child)?;
        self.detach(child);
        self.node_mut(parent).children.push(child);
        self.node_mut(child).parent = Some(parent);
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> SanitizerResult<()> {
        self.check_insert(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(SanitizerError::InvalidTree(format!(
                "{} is not a child of {}",
                reference, parent
            )));
        }
        self.detach(child);
        let pos = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .unwrap_or(self.children(parent).len());
        self.node_mut(parent).children.insert(pos, child);
        self.node_mut(child).parent = Some(parent);
        Ok(())
    }

    /// Remove a node from its parent. Returns false if it had no parent.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.node(id).parent else {
            return false;
        };
        self.node_mut(parent).children.retain(|&c| c != id);
        self.node_mut(id).parent = None;
        true
    }

    /// Move a node's children into its place and detach the node.
    pub fn replace_with_children(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let children = std::mem::take(&mut self.node_mut(id).children);
        for &child in &children {
            self.node_mut(child).parent = Some(parent);
        }
        let siblings = &mut self.node_mut(parent).children;
        if let Some(pos) = siblings.iter().position(|&c| c == id) {
            siblings.splice(pos..=pos, children);
        }
        self.node_mut(id).parent = None;
        true
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn document_element(&self) -> Option<NodeId> {
        self.children(Self::DOCUMENT)
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    /// Snapshot of `root` and its descendants in document order.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn find_first_element(&self, root: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|&id| self.element_name(id) == Some(name))
    }

    pub fn elements_by_name(&self, root: NodeId, name: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.element_name(id) == Some(name))
            .collect()
    }

    // ─── Elements & attributes ───────────────────────────────────────────

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn rename_element(&mut self, id: NodeId, new_name: &str) {
        if let NodeKind::Element { name, .. } = &mut self.node_mut(id).kind {
            *name = new_name.to_ascii_lowercase();
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> Option<&Attributes> {
        match self.kind(id) {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn attributes_mut(&mut self, id: NodeId) -> Option<&mut Attributes> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id).and_then(|a| a.get(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attributes(id).is_some_and(|a| a.contains(name))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(attrs) = self.attributes_mut(id) {
            attrs.set(name, value);
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.attributes_mut(id).and_then(|a| a.remove(name))
    }

    /// Replace an element's attributes with `updated`, keeping the position
    /// of keys that already existed and appending new ones.
    pub fn write_attributes(&mut self, id: NodeId, updated: &Attributes) {
        let Some(attrs) = self.attributes_mut(id) else {
            return;
        };
        for name in attrs.names() {
            if !updated.contains(&name) {
                attrs.remove(&name);
            }
        }
        for (k, v) in updated.iter() {
            attrs.set(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Document {
        Document::from_yaml(
            r#"
tag: html
children:
  - tag: body
    children:
      - tag: p
        attrs: { class: intro }
        children: ["Hello"]
      - tag: noscript
        children:
          - tag: img
            attrs: { src: "a.png", width: 10 }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_from_yaml_builds_tree() {
        let doc = sample();
        let html = doc.document_element().unwrap();
        assert_eq!(doc.element_name(html), Some("html"));
        let body = doc.find_first_element(html, "body").unwrap();
        assert_eq!(doc.children(body).len(), 2);
        let img = doc.find_first_element(html, "img").unwrap();
        assert_eq!(doc.get_attribute(img, "width"), Some("10"));
    }

    #[test]
    fn test_text_root_rejected() {
        let result = Document::from_spec(&NodeSpec::Text("hi".to_string()));
        assert!(matches!(result, Err(SanitizerError::InvalidTree(_))));
    }

    #[test]
    fn test_descendants_are_document_order() {
        let doc = sample();
        let names: Vec<_> = doc
            .descendants(Document::DOCUMENT)
            .into_iter()
            .filter_map(|id| doc.element_name(id).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["html", "body", "p", "noscript", "img"]);
    }

    #[test]
    fn test_detach_leaves_tree_consistent() {
        let mut doc = sample();
        let p = doc.find_first_element(Document::DOCUMENT, "p").unwrap();
        let body = doc.parent(p).unwrap();
        assert!(doc.detach(p));
        assert!(!doc.detach(p));
        assert_eq!(doc.parent(p), None);
        assert!(!doc.children(body).contains(&p));
        assert!(!doc.is_attached(p));
    }

    #[test]
    fn test_replace_with_children_keeps_position() {
        let mut doc = sample();
        let noscript = doc.find_first_element(Document::DOCUMENT, "noscript").unwrap();
        let body = doc.parent(noscript).unwrap();
        assert!(doc.replace_with_children(noscript));
        let names: Vec<_> = doc
            .children(body)
            .iter()
            .map(|&c| doc.element_name(c).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["p", "img"]);
        let img = doc.find_first_element(body, "img").unwrap();
        assert_eq!(doc.parent(img), Some(body));
    }

    #[test]
    fn test_append_rejects_cycles_and_text_parents() {
        let mut doc = sample();
        let html = doc.document_element().unwrap();
        let body = doc.find_first_element(html, "body").unwrap();
        assert!(doc.append_child(body, html).is_err());
        let text = doc.create_text("x");
        let span = doc.create_element("span");
        assert!(doc.append_child(text, span).is_err());
    }

    #[test]
    fn test_insert_before() {
        let mut doc = sample();
        let p = doc.find_first_element(Document::DOCUMENT, "p").unwrap();
        let body = doc.parent(p).unwrap();
        let hr = doc.create_element("HR");
        doc.insert_before(body, hr, p).unwrap();
        assert_eq!(doc.children(body)[0], hr);
        assert_eq!(doc.element_name(hr), Some("hr"));
    }

    #[test]
    fn test_write_attributes_preserves_order() {
        let mut doc = Document::new();
        let el = doc.create_element_with_attributes(
            "amp-img",
            [("src", "a.png"), ("width", "10"), ("height", "20")]
                .into_iter()
                .collect(),
        );
        let mut updated = doc.attributes(el).unwrap().clone();
        updated.remove("width");
        updated.set("layout", "fixed-height");
        updated.set("width", "auto");
        doc.write_attributes(el, &updated);
        let names = doc.attributes(el).unwrap().names();
        assert_eq!(names, vec!["src", "width", "height", "layout"]);
        assert_eq!(doc.get_attribute(el, "width"), Some("auto"));
    }

    #[test]
    fn test_spec_round_trip() {
        let doc = sample();
        let spec = doc.to_spec().unwrap();
        let rebuilt = Document::from_spec(&spec).unwrap();
        assert_eq!(rebuilt.to_spec(), Some(spec));
    }
}
