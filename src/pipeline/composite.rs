//! Hierarchical grouping of documents for reporting.
//!
//! A [`DocumentNode`] is either a leaf (one document) or a composite (an
//! ordered collection). Aggregates on a composite are recomputed from its
//! children on every call. Nothing here participates in pipeline routing.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::categorize::Category;
use super::message::DocumentMessage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("Leaf nodes cannot have children")]
    LeafCannotHaveChildren,
}

/// A single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLeaf {
    pub name: String,
    pub size: u64,
    pub doc_type: String,
    pub content: String,
}

impl DocumentLeaf {
    pub fn new(name: impl Into<String>, size: u64, doc_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            doc_type: doc_type.into(),
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

/// A named, ordered collection of nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentComposite {
    pub name: String,
    children: Vec<DocumentNode>,
}

impl DocumentComposite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentNode {
    Leaf(DocumentLeaf),
    Composite(DocumentComposite),
}

impl From<DocumentLeaf> for DocumentNode {
    fn from(leaf: DocumentLeaf) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<DocumentComposite> for DocumentNode {
    fn from(composite: DocumentComposite) -> Self {
        Self::Composite(composite)
    }
}

impl DocumentNode {
    pub fn leaf(name: impl Into<String>, size: u64, doc_type: impl Into<String>) -> Self {
        Self::Leaf(DocumentLeaf::new(name, size, doc_type))
    }

    pub fn composite(name: impl Into<String>) -> Self {
        Self::Composite(DocumentComposite::new(name))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(l) => &l.name,
            Self::Composite(c) => &c.name,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Byte size; for a composite, the recursive sum over its children.
    pub fn size(&self) -> u64 {
        match self {
            Self::Leaf(l) => l.size,
            Self::Composite(c) => c
                .children
                .iter()
                .map(DocumentNode::size)
                .fold(0, u64::saturating_add),
        }
    }

    /// Text content; for a composite, children's content joined by newlines
    /// in child order.
    pub fn content(&self) -> String {
        match self {
            Self::Leaf(l) => l.content.clone(),
            Self::Composite(c) => c
                .children
                .iter()
                .map(DocumentNode::content)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Append a child. Fails on a leaf.
    pub fn add(&mut self, child: impl Into<DocumentNode>) -> Result<(), CompositeError> {
        match self {
            Self::Leaf(_) => Err(CompositeError::LeafCannotHaveChildren),
            Self::Composite(c) => {
                c.children.push(child.into());
                Ok(())
            }
        }
    }

    /// Remove the first child equal to `child`. Returns whether one was removed.
    /// Fails on a leaf.
    pub fn remove(&mut self, child: &DocumentNode) -> Result<bool, CompositeError> {
        match self {
            Self::Leaf(_) => Err(CompositeError::LeafCannotHaveChildren),
            Self::Composite(c) => match c.children.iter().position(|n| n == child) {
                Some(idx) => {
                    c.children.remove(idx);
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Children in insertion order; always empty for a leaf.
    pub fn children(&self) -> &[DocumentNode] {
        match self {
            Self::Leaf(_) => &[],
            Self::Composite(c) => &c.children,
        }
    }

    pub fn child(&self, index: usize) -> Option<&DocumentNode> {
        self.children().get(index)
    }

    /// Render the tree, one node per line, children indented two spaces
    /// deeper than their parent.
    pub fn display(&self, indent: &str) -> String {
        let mut out = String::new();
        self.render(indent, &mut out);
        out
    }

    fn render(&self, indent: &str, out: &mut String) {
        match self {
            Self::Leaf(l) => {
                out.push_str(&format!(
                    "{indent}Document: {} ({}, {} bytes)\n",
                    l.name, l.doc_type, l.size
                ));
            }
            Self::Composite(c) => {
                out.push_str(&format!("{indent}Composite: {}\n", c.name));
                let nested = format!("{indent}  ");
                for child in &c.children {
                    child.render(&nested, out);
                }
            }
        }
    }
}

impl fmt::Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display(""))
    }
}

// ═══════════════════════════════════════════════════════════
// Reporting
// ═══════════════════════════════════════════════════════════

/// Build a leaf from a processed message. Size is read from disk when the
/// file is still there, otherwise 0.
pub fn leaf_for_message(message: &DocumentMessage) -> DocumentLeaf {
    let size = std::fs::metadata(message.file_path())
        .map(|m| m.len())
        .unwrap_or(0);
    let name = std::path::Path::new(message.file_path())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(message.document_id())
        .to_string();
    DocumentLeaf::new(name, size, message.document_type())
        .with_content(message.content().unwrap_or_default())
}

/// Group completed messages under one composite per category.
///
/// Category composites follow `Category` declaration order; documents keep their input
/// order within a category. Messages without a category are skipped.
pub fn group_by_category<'a>(
    root_name: &str,
    messages: impl IntoIterator<Item = &'a DocumentMessage>,
) -> DocumentNode {
    let mut groups: BTreeMap<Category, DocumentComposite> = BTreeMap::new();
    for message in messages {
        let Some(category) = message.category() else {
            continue;
        };
        groups
            .entry(category)
            .or_insert_with(|| DocumentComposite::new(category.as_str()))
            .children
            .push(leaf_for_message(message).into());
    }

    let mut root = DocumentComposite::new(root_name);
    root.children
        .extend(groups.into_values().map(DocumentNode::Composite));
    DocumentNode::Composite(root)
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
