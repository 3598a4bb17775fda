//! Benchmark input data.
//!
//! [`ParameterSet`] is the immutable array of distribution parameters shared by every trial of a
//! benchmark run. [`OptionData`] is the raw record accepted by the named entry points; it is
//! validated into a `ParameterSet` before anything touches the device.

use crate::{
    error::{BenchError, Result},
    utils::rand_rates,
};

/// Raw input of the named entry points: `n` primary parameters, a secondary count `n1`, and the
/// rate array itself.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionData {
    pub n: i32,
    pub n1: i32,
    pub lambda_arr: Vec<f64>,
}

/// Immutable set of per-work-item distribution parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSet {
    values: Box<[f64]>,
    secondary_count: usize,
}

impl ParameterSet {
    /// Creates a `ParameterSet` from its rates and secondary count.
    ///
    /// Fails if `values` is empty, or if the work-items of a launch could not be indexed with
    /// 32-bit integers.
    pub fn new(values: Vec<f64>, secondary_count: usize) -> Result<Self> {
        check_shape(values.len(), secondary_count)?;
        Ok(Self {
            values: values.into_boxed_slice(),
            secondary_count,
        })
    }

    /// Creates a `ParameterSet` of `count` random rates (see [`crate::utils::rand_rates`]).
    pub fn random(count: usize, secondary_count: usize, seed: Option<u64>) -> Result<Self> {
        check_shape(count, secondary_count)?;
        Self::new(rand_rates(count, seed), secondary_count)
    }

    /// Number of primary parameters (`n`).
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Number of secondary parameters (`n1`).
    pub fn secondary_count(&self) -> usize {
        self.secondary_count
    }

    /// Secondary count as consumed by the kernels: a zero `n1` still yields one draw per
    /// work-item.
    pub fn effective_secondary_count(&self) -> usize {
        self.secondary_count.max(1)
    }

    /// Parameter values, in order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Largest number of samples a launch may produce, `n * max(n1, 1)`.
pub const MAX_SAMPLES: usize = u32::MAX as usize;

fn check_shape(count: usize, secondary_count: usize) -> Result<()> {
    if count == 0 {
        return Err(BenchError::InvalidParameters(
            "at least one parameter is required".to_string(),
        ));
    }
    match count.checked_mul(secondary_count.max(1)) {
        Some(samples) if samples <= MAX_SAMPLES => Ok(()),
        _ => Err(BenchError::InvalidParameters(format!(
            "n = {count} and n1 = {secondary_count} exceed {MAX_SAMPLES} samples"
        ))),
    }
}

impl TryFrom<&OptionData> for ParameterSet {
    type Error = BenchError;

    fn try_from(data: &OptionData) -> Result<Self> {
        let invalid = |reason: String| BenchError::InvalidParameters(reason);
        let n = usize::try_from(data.n)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or_else(|| invalid(format!("n must be >= 1, got {}", data.n)))?;
        let n1 = usize::try_from(data.n1)
            .map_err(|_| invalid(format!("n1 must be >= 0, got {}", data.n1)))?;
        if data.lambda_arr.len() != n {
            return Err(BenchError::InvalidParameters(format!(
                "lambda array holds {} values, expected n = {n}",
                data.lambda_arr.len()
            )));
        }
        Self::new(data.lambda_arr.clone(), n1)
    }
}
