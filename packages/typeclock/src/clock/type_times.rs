use crate::make_error;
use crate::tree::multitype_tree::MultiTypeNode;
use eyre::Report;

/// Fill `type_times` with the amount of time the branch leading from `node`
/// to its parent spends in each type. If `normalize` is set, the buffer is
/// filled with the proportion of branch time spent in each type instead.
///
/// The buffer must have one slot per type in the tree's type set; this is a
/// caller contract and is deliberately not checked here, so an undersized
/// buffer panics on an out-of-bounds index. The buffer is caller-owned so it
/// can be reused across calls instead of being allocated per node.
pub fn calculate_type_times(node: &MultiTypeNode, type_times: &mut [f64], normalize: bool) -> Result<(), Report> {
  type_times.fill(0.0);

  let mut prev_height = node.height();
  let mut curr_type = node.node_type();
  let mut total = 0.0;

  for change in node.changes() {
    let increment = change.time - prev_height;
    total += increment;
    type_times[curr_type] += increment;
    curr_type = change.new_type;
    prev_height = change.time;
  }
  type_times[node.final_type()] += node.length() - total;

  if normalize {
    let length = node.length();
    if length == 0.0 {
      // No branch duration to divide by. A valid zero-length branch cannot
      // have accumulated any time, so all of the unit weight goes to the
      // node's own type.
      if type_times.iter().any(|&time| time > 0.0) {
        return make_error!(
          "Zero-length branch at node {} has accumulated time in its type history (times: {:?})",
          node.index(),
          type_times
        );
      }
      type_times[node.node_type()] = 1.0;
    } else {
      for time in type_times.iter_mut() {
        *time /= length;
      }
    }
  }

  Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::tree::multitype_tree::{MultiTypeTree, NodeSpec, TypeChange};
  use crate::utils::error::report_to_string;
  use approx::assert_abs_diff_eq;
  use eyre::Report;

  fn spec(parent: Option<usize>, height: f64, node_type: usize, changes: Vec<TypeChange>) -> NodeSpec {
    NodeSpec {
      parent,
      height,
      node_type,
      changes,
    }
  }

  /// Two-type tree with six leaves. Node layout:
  /// 0..=5 are the leaves, 6..=9 the internal nodes, 10 the root.
  pub(crate) fn two_type_tree() -> Result<MultiTypeTree, Report> {
    MultiTypeTree::new(
      2,
      vec![
        spec(Some(7), 0.55, 1, vec![]),
        spec(Some(7), 0.55, 1, vec![]),
        spec(Some(10), 0.0, 1, vec![TypeChange::new(0.5, 0), TypeChange::new(2.5, 1)]),
        spec(Some(6), 0.6, 0, vec![]),
        spec(Some(8), 0.75, 0, vec![]),
        spec(Some(6), 0.55, 0, vec![]),
        spec(Some(9), 0.8, 0, vec![]),
        spec(Some(8), 0.6, 1, vec![TypeChange::new(0.85, 0)]),
        spec(Some(9), 0.95, 0, vec![]),
        spec(
          Some(10),
          1.05,
          0,
          vec![
            TypeChange::new(1.15, 1),
            TypeChange::new(1.65, 0),
            TypeChange::new(1.8, 1),
          ],
        ),
        spec(None, 3.3, 1, vec![]),
      ],
    )
  }

  /// Three-type tree with three leaves (0..=2), one internal node (3) and
  /// the root (4).
  pub(crate) fn three_type_tree() -> Result<MultiTypeTree, Report> {
    MultiTypeTree::new(
      3,
      vec![
        spec(
          Some(3),
          0.25,
          1,
          vec![
            TypeChange::new(0.29, 0),
            TypeChange::new(0.34, 1),
            TypeChange::new(0.4, 2),
            TypeChange::new(0.7, 1),
          ],
        ),
        spec(
          Some(4),
          0.0,
          1,
          vec![
            TypeChange::new(0.6, 2),
            TypeChange::new(0.725, 0),
            TypeChange::new(1.125, 1),
          ],
        ),
        spec(
          Some(3),
          0.15,
          0,
          vec![
            TypeChange::new(0.45, 1),
            TypeChange::new(0.5, 0),
            TypeChange::new(0.75, 1),
          ],
        ),
        spec(Some(4), 0.85, 1, vec![]),
        spec(None, 1.375, 1, vec![]),
      ],
    )
  }

  #[test]
  fn times_in_types_on_two_type_tree() -> Result<(), Report> {
    let tree = two_type_tree()?;

    #[rustfmt::skip]
    let expected_times = [
      [0.0,  0.05],
      [0.0,  0.05],
      [2.0,  1.3],
      [0.2,  0.0],
      [0.2,  0.0],
      [0.25, 0.0],
      [0.25, 0.0],
      [0.1,  0.25],
      [0.1,  0.0],
      [0.25, 2.0],
      [0.0,  0.0],
    ];

    let mut type_times = vec![0.0; tree.type_count()];
    for node in tree.nodes() {
      calculate_type_times(node, &mut type_times, false)?;
      for (j, &time) in type_times.iter().enumerate() {
        assert_abs_diff_eq!(time, expected_times[node.index()][j], epsilon = 1e-12);
      }
    }

    Ok(())
  }

  #[test]
  fn times_in_types_on_three_type_tree() -> Result<(), Report> {
    let tree = three_type_tree()?;

    #[rustfmt::skip]
    let expected_times = [
      [0.05, 0.25,  0.3],
      [0.4,  0.85,  0.125],
      [0.55, 0.15,  0.0],
      [0.0,  0.525, 0.0],
      [0.0,  0.0,   0.0],
    ];

    let mut type_times = vec![0.0; tree.type_count()];
    for node in tree.nodes() {
      calculate_type_times(node, &mut type_times, false)?;
      for (j, &time) in type_times.iter().enumerate() {
        assert_abs_diff_eq!(time, expected_times[node.index()][j], epsilon = 1e-12);
      }
    }

    Ok(())
  }

  #[test]
  fn type_times_partition_the_branch() -> Result<(), Report> {
    for tree in [two_type_tree()?, three_type_tree()?] {
      let mut type_times = vec![0.0; tree.type_count()];
      for node in tree.nodes() {
        calculate_type_times(node, &mut type_times, false)?;
        let sum: f64 = type_times.iter().sum();
        assert_abs_diff_eq!(sum, node.length(), epsilon = 1e-12);
      }
    }

    Ok(())
  }

  #[test]
  fn normalized_times_sum_to_one() -> Result<(), Report> {
    for tree in [two_type_tree()?, three_type_tree()?] {
      let mut type_times = vec![0.0; tree.type_count()];
      for node in tree.nodes().filter(|node| node.length() > 0.0) {
        calculate_type_times(node, &mut type_times, true)?;
        let sum: f64 = type_times.iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
      }
    }

    Ok(())
  }

  #[test]
  fn normalized_zero_length_branch_weights_node_type() -> Result<(), Report> {
    let tree = MultiTypeTree::new(2, vec![spec(Some(1), 1.0, 1, vec![]), spec(None, 1.0, 0, vec![])])?;

    let mut type_times = vec![0.0; 2];
    calculate_type_times(tree.node(0), &mut type_times, true)?;
    assert_eq!(type_times, vec![0.0, 1.0]);

    Ok(())
  }

  #[test]
  fn normalized_zero_length_branch_with_accumulated_time_is_fatal() {
    // Cannot be produced by a validated tree; forge a detached node.
    let node = MultiTypeNode::detached(7, 1.0, 0.0, 0, vec![TypeChange::new(1.5, 1)]);

    let mut type_times = vec![0.0; 2];
    let result = calculate_type_times(&node, &mut type_times, true);
    assert_eq!(
      report_to_string(&result.unwrap_err()),
      "Zero-length branch at node 7 has accumulated time in its type history (times: [0.5, -0.5])"
    );
  }
}
