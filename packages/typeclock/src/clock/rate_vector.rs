use getset::CopyGetters;
use log::warn;
use ndarray::Array1;

/// Per-type substitution rates, one entry per type in the tree's type set,
/// together with the declared lower/upper bounds of the parameter.
///
/// The host framework owns and mutates this between dirty notifications; the
/// clock only reads it during recompute.
#[derive(Clone, Debug, PartialEq, CopyGetters)]
pub struct RateVector {
  values: Array1<f64>,
  #[getset(get_copy = "pub")]
  lower: Option<f64>,
  #[getset(get_copy = "pub")]
  upper: Option<f64>,
}

impl RateVector {
  pub fn new(values: impl Into<Array1<f64>>) -> Self {
    Self {
      values: values.into(),
      lower: None,
      upper: None,
    }
  }

  pub fn with_bounds(values: impl Into<Array1<f64>>, lower: Option<f64>, upper: Option<f64>) -> Self {
    Self {
      values: values.into(),
      lower,
      upper,
    }
  }

  #[inline]
  pub fn dimension(&self) -> usize {
    self.values.len()
  }

  #[inline]
  pub fn value(&self, index: usize) -> f64 {
    self.values[index]
  }

  #[inline]
  pub fn set_value(&mut self, index: usize, value: f64) {
    self.values[index] = value;
  }

  #[inline]
  pub fn values(&self) -> &Array1<f64> {
    &self.values
  }

  /// One-time repair applied when the vector is bound to a tree: clamp the
  /// declared bounds to [0, +inf) and match the dimension to the type-set
  /// cardinality. Dimension mismatch is tolerated and auto-corrected by
  /// truncation or zero-extension, with a warning.
  pub fn bind_to_type_count(&mut self, type_count: usize) {
    if self.lower.map_or(true, |lower| lower < 0.0) {
      self.lower = Some(0.0);
    }
    if self.upper.map_or(true, |upper| upper < 0.0) {
      self.upper = Some(f64::MAX);
    }
    if self.dimension() != type_count {
      warn!(
        "RateVector: dimension {} does not match the number of types in the tree, resizing to {type_count}",
        self.dimension()
      );
      self.resize(type_count);
    }
  }

  fn resize(&mut self, dimension: usize) {
    let values = self
      .values
      .iter()
      .copied()
      .chain(std::iter::repeat(0.0))
      .take(dimension)
      .collect();
    self.values = values;
  }
}
