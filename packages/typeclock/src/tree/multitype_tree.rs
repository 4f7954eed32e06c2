use crate::{make_error, make_report};
use eyre::Report;
use serde::{Deserialize, Serialize};

/// A recorded migration event along a branch: at height `time` the lineage
/// enters type `new_type` (walking from the node towards its parent).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeChange {
  pub time: f64,
  pub new_type: usize,
}

impl TypeChange {
  pub const fn new(time: f64, new_type: usize) -> Self {
    Self { time, new_type }
  }
}

/// Node of a multi-type tree. Owns the branch leading to its parent,
/// together with the ordered type changes recorded along that branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiTypeNode {
  index: usize,
  parent: Option<usize>,
  children: Vec<usize>,
  height: f64,
  length: f64,
  node_type: usize,
  changes: Vec<TypeChange>,
}

impl MultiTypeNode {
  #[inline]
  pub const fn index(&self) -> usize {
    self.index
  }

  #[inline]
  pub const fn parent(&self) -> Option<usize> {
    self.parent
  }

  #[inline]
  pub fn children(&self) -> &[usize] {
    &self.children
  }

  /// Age of the node (distance from present).
  #[inline]
  pub const fn height(&self) -> f64 {
    self.height
  }

  /// Duration of the branch leading to the parent (0 for the root).
  #[inline]
  pub const fn length(&self) -> f64 {
    self.length
  }

  /// The type active at the node's own height, i.e. at the start of the walk
  /// along the branch towards the parent.
  #[inline]
  pub const fn node_type(&self) -> usize {
    self.node_type
  }

  /// The type active after the last recorded change, i.e. at the parent end
  /// of the branch. Equals `node_type` if there are no changes.
  #[inline]
  pub fn final_type(&self) -> usize {
    self.changes.last().map_or(self.node_type, |change| change.new_type)
  }

  #[inline]
  pub fn change_count(&self) -> usize {
    self.changes.len()
  }

  #[inline]
  pub fn changes(&self) -> &[TypeChange] {
    &self.changes
  }

  #[inline]
  pub const fn is_root(&self) -> bool {
    self.parent.is_none()
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  /// Node detached from any tree, bypassing tree-level validation. Only for
  /// exercising accumulator failure paths that valid trees cannot reach.
  #[cfg(test)]
  pub(crate) fn detached(
    index: usize,
    height: f64,
    length: f64,
    node_type: usize,
    changes: Vec<TypeChange>,
  ) -> Self {
    Self {
      index,
      parent: Some(usize::MAX),
      children: vec![],
      height,
      length,
      node_type,
      changes,
    }
  }
}

/// Caller-facing description of one node, used to assemble a tree. Nodes
/// refer to each other by their position in the list passed to
/// [`MultiTypeTree::new`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
  pub parent: Option<usize>,
  pub height: f64,
  pub node_type: usize,
  pub changes: Vec<TypeChange>,
}

/// Phylogenetic tree in which every branch carries a piecewise-constant type
/// trajectory. Read-only after construction; all type-history invariants are
/// checked here once, so downstream consumers can trust the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiTypeTree {
  nodes: Vec<MultiTypeNode>,
  root: usize,
  type_count: usize,
}

impl MultiTypeTree {
  pub fn new(type_count: usize, specs: Vec<NodeSpec>) -> Result<Self, Report> {
    if specs.is_empty() {
      return make_error!("Multi-type tree must contain at least one node");
    }

    let n_nodes = specs.len();
    let mut nodes = Vec::with_capacity(n_nodes);
    let mut root: Option<usize> = None;

    for (index, spec) in specs.iter().enumerate() {
      let (parent_height, length) = match spec.parent {
        None => {
          if let Some(prev) = root {
            return make_error!("Tree has more than one root: nodes {prev} and {index}");
          }
          root = Some(index);
          if !spec.changes.is_empty() {
            return make_error!("Root node {index} cannot carry type changes");
          }
          (spec.height, 0.0)
        }
        Some(parent) => {
          let parent_spec = specs
            .get(parent)
            .ok_or_else(|| make_report!("Node {index}: parent index {parent} is out of bounds (0..{n_nodes})"))?;
          if parent_spec.height < spec.height {
            return make_error!(
              "Node {index}: height {} exceeds parent height {}",
              spec.height,
              parent_spec.height
            );
          }
          (parent_spec.height, parent_spec.height - spec.height)
        }
      };

      validate_changes(index, spec, parent_height)?;

      if spec.node_type >= type_count {
        return make_error!("Node {index}: type {} is outside the type set (0..{type_count})", spec.node_type);
      }
      for change in &spec.changes {
        if change.new_type >= type_count {
          return make_error!(
            "Node {index}: change into type {} is outside the type set (0..{type_count})",
            change.new_type
          );
        }
      }

      nodes.push(MultiTypeNode {
        index,
        parent: spec.parent,
        children: vec![],
        height: spec.height,
        length,
        node_type: spec.node_type,
        changes: spec.changes.clone(),
      });
    }

    let root = root.ok_or_else(|| make_report!("Tree has no root (every node declares a parent)"))?;

    for index in 0..n_nodes {
      if let Some(parent) = nodes[index].parent {
        nodes[parent].children.push(index);
      }
    }

    Ok(Self { nodes, root, type_count })
  }

  #[inline]
  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  /// Cardinality of the tree's type set.
  #[inline]
  pub const fn type_count(&self) -> usize {
    self.type_count
  }

  #[inline]
  pub fn node(&self, index: usize) -> &MultiTypeNode {
    &self.nodes[index]
  }

  #[inline]
  pub fn root(&self) -> &MultiTypeNode {
    &self.nodes[self.root]
  }

  pub fn nodes(&self) -> impl Iterator<Item = &MultiTypeNode> {
    self.nodes.iter()
  }
}

fn validate_changes(index: usize, spec: &NodeSpec, parent_height: f64) -> Result<(), Report> {
  let mut prev_time = spec.height;
  for (i, change) in spec.changes.iter().enumerate() {
    if change.time < prev_time || (i > 0 && change.time == prev_time) {
      return make_error!(
        "Node {index}: change times must increase strictly along the branch, but change {i} at height {} follows height {prev_time}",
        change.time
      );
    }
    if change.time > parent_height {
      return make_error!(
        "Node {index}: change {i} at height {} lies beyond the parent at height {parent_height}",
        change.time
      );
    }
    prev_time = change.time;
  }
  Ok(())
}
