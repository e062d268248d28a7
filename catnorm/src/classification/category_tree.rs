//! Read-only category tree
//!
//! Nodes live in an arena keyed by id. A tree is built once (usually from an
//! imported taxonomy, see [`crate::classification::kpved_tree`]) and then
//! shared behind an `Arc` with the classifier.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

/// One category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Classifier-specific code
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    /// Child ids in insertion order
    pub children: Vec<String>,
    /// Names from the root to this node, joined with "/"
    pub path: String,
    /// Depth (top-level nodes are level 1)
    pub level: usize,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Rooted category tree (a forest of top-level nodes)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    index: HashMap<String, usize>,
    roots: Vec<String>,
}

impl CategoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent_id` (or as a top-level node)
    ///
    /// The parent must already exist and ids must be unique.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: Option<&str>,
    ) -> Result<&CategoryNode> {
        let id = id.into();
        let name = name.into();

        if id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("category id is empty".to_string()));
        }
        if self.index.contains_key(&id) {
            return Err(PipelineError::InvalidInput(format!(
                "duplicate category id '{}'",
                id
            )));
        }

        let (path, level) = match parent_id {
            Some(parent) => {
                let parent_node = self.get(parent).ok_or_else(|| {
                    PipelineError::InvalidInput(format!("parent category '{}' not found", parent))
                })?;
                (format!("{}/{}", parent_node.path, name), parent_node.level + 1)
            }
            None => (name.clone(), 1),
        };

        let position = self.nodes.len();
        self.nodes.push(CategoryNode {
            id: id.clone(),
            name,
            parent_id: parent_id.map(str::to_string),
            children: Vec::new(),
            path,
            level,
            metadata: HashMap::new(),
        });
        self.index.insert(id.clone(), position);

        match parent_id {
            Some(parent) => {
                if let Some(&parent_pos) = self.index.get(parent) {
                    self.nodes[parent_pos].children.push(id);
                }
            }
            None => self.roots.push(id),
        }

        Ok(&self.nodes[position])
    }

    /// Attach a metadata entry to an existing node
    pub fn set_metadata(&mut self, id: &str, key: impl Into<String>, value: impl Into<String>) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                self.nodes[pos].metadata.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&CategoryNode> {
        self.index.get(id).map(|&pos| &self.nodes[pos])
    }

    pub fn code_exists(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryNode> {
        self.roots.iter().filter_map(|id| self.get(id))
    }

    pub fn children(&self, id: &str) -> impl Iterator<Item = &CategoryNode> {
        self.get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.get(child))
    }

    /// Child of `parent_id` with the given display name
    pub fn find_child(&self, parent_id: &str, name: &str) -> Option<&CategoryNode> {
        self.children(parent_id).find(|child| child.name == name)
    }

    /// Node reached by following display names from the top level
    pub fn find_by_path(&self, labels: &[String]) -> Option<&CategoryNode> {
        let (first, rest) = labels.split_first()?;
        let mut node = self.roots().find(|root| &root.name == first)?;
        for label in rest {
            node = self.find_child(&node.id, label)?;
        }
        Some(node)
    }

    /// Display names from the top level down to `id`
    pub fn path_labels(&self, id: &str) -> Option<Vec<String>> {
        let mut labels = Vec::new();
        let mut current = self.get(id)?;
        loop {
            labels.push(current.name.clone());
            match current.parent_id.as_deref().and_then(|parent| self.get(parent)) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        labels.reverse();
        Some(labels)
    }

    /// Indented outline used in classifier prompts
    ///
    /// One line per node, `- name (ID: id)`, two spaces of indent per level,
    /// down to `max_levels`.
    pub fn summary(&self, max_levels: usize) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.write_summary(&mut out, root, max_levels);
        }
        out
    }

    fn write_summary(&self, out: &mut String, node: &CategoryNode, max_levels: usize) {
        if node.level > max_levels {
            return;
        }
        let indent = "  ".repeat(node.level - 1);
        let _ = writeln!(out, "{}- {} (ID: {})", indent, node.name, node.id);
        for child in self.children(&node.id) {
            self.write_summary(out, child, max_levels);
        }
    }
}
