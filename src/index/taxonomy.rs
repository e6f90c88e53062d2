//! Ordinal dictionary of facet labels.
//!
//! Every facet label path (`dim`, `dim/a`, `dim/a/b`, ...) gets a dense
//! ordinal. Ordinal 0 is the root; dimensions are its children. Ordinals are
//! never reused or removed, so a snapshot holding an older copy stays valid.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{Storage, read_blob, write_blob};

pub type Ordinal = u32;

pub const ROOT_ORDINAL: Ordinal = 0;

/// File holding the taxonomy inside the facet area.
pub const TAXONOMY_FILE: &str = "taxonomy.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    parent: Ordinal,
    label: String,
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: Vec<Node>,
    lookup: AHashMap<(Ordinal, String), Ordinal>,
    children: Vec<Vec<Ordinal>>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new()
    }
}

impl Taxonomy {
    pub fn new() -> Self {
        Self::from_nodes(vec![Node {
            parent: ROOT_ORDINAL,
            label: String::new(),
        }])
    }

    fn from_nodes(nodes: Vec<Node>) -> Self {
        let mut lookup = AHashMap::with_capacity(nodes.len());
        let mut children = vec![Vec::new(); nodes.len()];
        for (ord, node) in nodes.iter().enumerate().skip(1) {
            lookup.insert((node.parent, node.label.clone()), ord as Ordinal);
            children[node.parent as usize].push(ord as Ordinal);
        }
        Taxonomy {
            nodes,
            lookup,
            children,
        }
    }

    /// Number of ordinals, the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    fn child(&self, parent: Ordinal, label: &str) -> Option<Ordinal> {
        self.lookup.get(&(parent, label.to_string())).copied()
    }

    fn add_child(&mut self, parent: Ordinal, label: &str) -> Ordinal {
        if let Some(ord) = self.child(parent, label) {
            return ord;
        }
        let ord = self.nodes.len() as Ordinal;
        self.nodes.push(Node {
            parent,
            label: label.to_string(),
        });
        self.children.push(Vec::new());
        self.children[parent as usize].push(ord);
        self.lookup.insert((parent, label.to_string()), ord);
        ord
    }

    /// Add `dim/path...`, returning the ordinals of the dimension and of
    /// every prefix of the path, leaf last.
    pub fn add_path(&mut self, dim: &str, path: &[String]) -> Vec<Ordinal> {
        let mut ords = Vec::with_capacity(path.len() + 1);
        let mut parent = self.add_child(ROOT_ORDINAL, dim);
        ords.push(parent);
        for label in path {
            parent = self.add_child(parent, label);
            ords.push(parent);
        }
        ords
    }

    /// Ordinal of `dim/path...`, if it was ever added.
    pub fn ordinal(&self, dim: &str, path: &[&str]) -> Option<Ordinal> {
        let mut ord = self.child(ROOT_ORDINAL, dim)?;
        for label in path {
            ord = self.child(ord, label)?;
        }
        Some(ord)
    }

    pub fn label(&self, ord: Ordinal) -> Option<&str> {
        self.nodes.get(ord as usize).map(|n| n.label.as_str())
    }

    pub fn parent(&self, ord: Ordinal) -> Option<Ordinal> {
        match ord {
            ROOT_ORDINAL => None,
            _ => self.nodes.get(ord as usize).map(|n| n.parent),
        }
    }

    pub fn children(&self, ord: Ordinal) -> &[Ordinal] {
        self.children
            .get(ord as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Labels from the dimension down to `ord`.
    pub fn path(&self, ord: Ordinal) -> Vec<String> {
        let mut labels = Vec::new();
        let mut current = ord;
        while current != ROOT_ORDINAL {
            let Some(node) = self.nodes.get(current as usize) else {
                break;
            };
            labels.push(node.label.clone());
            current = node.parent;
        }
        labels.reverse();
        labels
    }

    /// Names of every dimension.
    pub fn dims(&self) -> Vec<&str> {
        self.children(ROOT_ORDINAL)
            .iter()
            .filter_map(|&o| self.label(o))
            .collect()
    }

    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        write_blob(storage, TAXONOMY_FILE, &self.nodes)
    }

    /// Load the taxonomy, or start an empty one if the file does not exist.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        if !storage.file_exists(TAXONOMY_FILE) {
            return Ok(Taxonomy::new());
        }
        let nodes: Vec<Node> = read_blob(storage, TAXONOMY_FILE)?;
        if nodes.is_empty() {
            return Ok(Taxonomy::new());
        }
        Ok(Self::from_nodes(nodes))
    }
}
