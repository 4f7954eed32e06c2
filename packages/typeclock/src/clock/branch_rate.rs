use crate::clock::rate_vector::RateVector;
use crate::clock::type_times::calculate_type_times;
use crate::make_error;
use crate::tree::multitype_tree::{MultiTypeNode, MultiTypeTree};
use eyre::Report;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Traversal strategy for the full-tree recompute. Both strategies visit
/// every node exactly once and produce bit-identical results; flat iteration
/// is the reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Traversal {
  #[default]
  Flat,
  Recursive,
}

pub struct ClockParams {
  pub tree: Arc<MultiTypeTree>,
  pub rates: Arc<RwLock<RateVector>>,

  /// Explicit mean clock rate. Not supported together with per-type rates;
  /// setting it is a fatal configuration error.
  pub mean_rate: Option<f64>,

  /// Uniform multiplier applied to every non-root branch rate after the
  /// per-type weighted average. Defaults to 1.0 (per-type-only mode).
  pub global_scale: Option<f64>,

  pub traversal: Traversal,
}

impl ClockParams {
  pub fn new(tree: Arc<MultiTypeTree>, rates: Arc<RwLock<RateVector>>) -> Self {
    Self {
      tree,
      rates,
      mean_rate: None,
      global_scale: None,
      traversal: Traversal::default(),
    }
  }
}

/// Cache payload guarded by a single mutex: the dirty flag, the per-branch
/// rates and the recompute counter change together as one unit.
#[derive(Debug)]
struct CacheState {
  dirty: bool,
  mean_branch_rates: Vec<f64>,
  recompute_count: u64,
}

/// Local clock in which the rate of a branch is the time-weighted average of
/// the per-type rates along that branch's type history.
///
/// Rates for all branches are recomputed lazily in a single pass the first
/// time any branch is queried after a dirty notification, and served from the
/// cache until the next notification.
pub struct TypeLinkedClock {
  tree: Arc<MultiTypeTree>,
  rates: Arc<RwLock<RateVector>>,
  global_scale: f64,
  traversal: Traversal,
  state: Mutex<CacheState>,
}

impl TypeLinkedClock {
  /// Bind the clock to a tree and a per-type rate vector (per-type-only
  /// mode, flat traversal).
  pub fn new(tree: Arc<MultiTypeTree>, rates: Arc<RwLock<RateVector>>) -> Result<Self, Report> {
    Self::with_params(ClockParams::new(tree, rates))
  }

  pub fn with_params(params: ClockParams) -> Result<Self, Report> {
    let ClockParams {
      tree,
      rates,
      mean_rate,
      global_scale,
      traversal,
    } = params;

    if mean_rate.is_some() {
      return make_error!("Only per-type rates and not a mean rate (clock.rate) should be specified");
    }

    rates.write().bind_to_type_count(tree.type_count());

    let state = Mutex::new(CacheState {
      dirty: true,
      mean_branch_rates: vec![0.0; tree.node_count()],
      recompute_count: 0,
    });

    Ok(Self {
      tree,
      rates,
      global_scale: global_scale.unwrap_or(1.0),
      traversal,
      state,
    })
  }

  /// Mean substitution rate of the branch leading from `node` to its parent.
  ///
  /// The dirty check and the recompute form one critical section, so that
  /// concurrent evaluator threads never observe a partially-written cache:
  /// one thread recomputes, the others block and then read the clean cache.
  pub fn rate_for_branch(&self, node: &MultiTypeNode) -> Result<f64, Report> {
    if node.is_root() {
      // The root has no incoming branch, hence no rate to average
      return Ok(1.0);
    }

    let mut state = self.state.lock();
    if state.dirty {
      let rates = self.rates.read();
      match self.traversal {
        Traversal::Flat => recalc_mean_branch_rates(&self.tree, &rates, &mut state.mean_branch_rates)?,
        Traversal::Recursive => recalc_mean_branch_rates_recursive(&self.tree, &rates, &mut state.mean_branch_rates)?,
      }
      state.dirty = false;
      state.recompute_count += 1;
    }

    Ok(state.mean_branch_rates[node.index()] * self.global_scale)
  }

  /// Framework notification that an upstream input (tree, type history or
  /// rate vector) changed. The cache defers its own recompute, but the
  /// recalculation signal is always propagated to the caller.
  pub fn on_inputs_changed(&self) -> bool {
    self.state.lock().dirty = true;
    true
  }

  /// Checkpoint commit (accept-state). Conservatively invalidates the cache.
  pub fn on_checkpoint_commit(&self) {
    self.state.lock().dirty = true;
  }

  /// Checkpoint rollback (restore-state). Conservatively invalidates the cache.
  pub fn on_checkpoint_rollback(&self) {
    self.state.lock().dirty = true;
  }

  /// Number of full recomputes performed so far.
  pub fn recompute_count(&self) -> u64 {
    self.state.lock().recompute_count
  }
}

/// Weighted average of the per-type rates over the branch leading from
/// `node`, given the absolute time spent in each type.
fn mean_rate_for_node(node: &MultiTypeNode, type_times: &[f64], rates: &RateVector) -> f64 {
  let branch_length = node.length();
  if branch_length == 0.0 {
    // No duration to weight by; the rate of the node's own type applies
    rates.value(node.node_type())
  } else {
    let weighted: f64 = type_times.iter().enumerate().map(|(j, &time)| time * rates.value(j)).sum();
    weighted / branch_length
  }
}

/// Recompute the mean rate of every branch in one flat pass over the nodes.
/// The root's slot is written too, but readers never consult it.
fn recalc_mean_branch_rates(tree: &MultiTypeTree, rates: &RateVector, mean_branch_rates: &mut [f64]) -> Result<(), Report> {
  let mut type_times = vec![0.0; rates.dimension()];
  for node in tree.nodes() {
    calculate_type_times(node, &mut type_times, false)?;
    mean_branch_rates[node.index()] = mean_rate_for_node(node, &type_times, rates);
  }
  Ok(())
}

/// Pre-order recursive equivalent of `recalc_mean_branch_rates`.
fn recalc_mean_branch_rates_recursive(
  tree: &MultiTypeTree,
  rates: &RateVector,
  mean_branch_rates: &mut [f64],
) -> Result<(), Report> {
  let mut type_times = vec![0.0; rates.dimension()];
  recalc_subtree(tree, tree.root(), rates, &mut type_times, mean_branch_rates)
}

fn recalc_subtree(
  tree: &MultiTypeTree,
  node: &MultiTypeNode,
  rates: &RateVector,
  type_times: &mut [f64],
  mean_branch_rates: &mut [f64],
) -> Result<(), Report> {
  calculate_type_times(node, type_times, false)?;
  mean_branch_rates[node.index()] = mean_rate_for_node(node, type_times, rates);

  for &child in node.children() {
    recalc_subtree(tree, tree.node(child), rates, type_times, mean_branch_rates)?;
  }
  Ok(())
}
