//! Posterior output schema returned by model backends.
//!
//! Backends report each quantity as a dense tensor whose **last axis is the
//! channel axis**. Leading axes, when present, are sampling axes:
//!
//! ```text
//! rank 0: ()                      one value shared by every channel
//! rank 1: (channel)               point estimates
//! rank 2: (draw, channel)         draws from a single chain
//! rank 3: (chain, draw, channel)  draws from several chains
//! ```
//!
//! On the wire a tensor is a nested JSON array (what `ndarray.tolist()`
//! produces on the Python side); in memory it is a shape plus row-major data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dense row-major tensor of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Tensor {
    /// Builds a tensor from a shape and row-major data.
    ///
    /// Returns `None` if the data length does not match the shape.
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        let expected: usize = shape.iter().product();
        (expected == data.len()).then_some(Self { shape, data })
    }

    /// A rank-0 tensor holding one value.
    #[must_use]
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    /// A rank-1 tensor, one value per channel.
    #[must_use]
    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: values,
        }
    }

    /// Axis lengths, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major values.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Returns the same values with a new shape of equal size.
    #[must_use]
    pub fn reshape(&self, shape: Vec<usize>) -> Option<Self> {
        Self::new(shape, self.data.clone())
    }

    fn to_value(&self) -> Value {
        fn nest(shape: &[usize], data: &[f64]) -> Value {
            match shape.split_first() {
                None => data.first().copied().map_or(Value::Null, Value::from),
                Some((&len, rest)) => {
                    let stride: usize = rest.iter().product();
                    Value::Array(
                        (0..len)
                            .map(|i| {
                                nest(rest, &data[i * stride..(i + 1) * stride])
                            })
                            .collect(),
                    )
                }
            }
        }
        nest(&self.shape, &self.data)
    }
}

impl TryFrom<Value> for Tensor {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        /// Walks the nested arrays, recording the shape on the first path
        /// and checking every sibling against it.
        fn walk(
            value: &Value,
            depth: usize,
            shape: &mut Vec<usize>,
            data: &mut Vec<f64>,
        ) -> Result<(), String> {
            match value {
                Value::Number(n) => {
                    if depth != shape.len() && !data.is_empty() {
                        return Err(format!(
                            "ragged tensor: scalar at depth {depth}, expected depth {}",
                            shape.len()
                        ));
                    }
                    let v = n
                        .as_f64()
                        .ok_or_else(|| format!("number {n} is not representable as f64"))?;
                    data.push(v);
                    Ok(())
                }
                Value::Array(items) => {
                    if depth == shape.len() {
                        if !data.is_empty() {
                            return Err(format!(
                                "ragged tensor: unexpected array at depth {depth}"
                            ));
                        }
                        shape.push(items.len());
                    } else if shape[depth] != items.len() {
                        return Err(format!(
                            "ragged tensor: axis {depth} has length {} and {}",
                            shape[depth],
                            items.len()
                        ));
                    }
                    for item in items {
                        walk(item, depth + 1, shape, data)?;
                    }
                    Ok(())
                }
                other => Err(format!("tensor elements must be numbers, got {other}")),
            }
        }

        let mut shape = Vec::new();
        let mut data = Vec::new();
        walk(&value, 0, &mut shape, &mut data)?;

        Self::new(shape, data).ok_or_else(|| {
            "ragged tensor: element count does not match shape".to_string()
        })
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        tensor.to_value()
    }
}

/// Everything a backend may report about a fitted model.
///
/// Every field is optional: different backends (and different versions of
/// the external library) expose different subsets. The normalizer documents a
/// fixed precedence for deriving each reported quantity from whichever
/// fields are present, and records a fallback when none are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOutput {
    /// Return on investment per channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<Tensor>,
    /// Lower credible bound of ROI, when the backend computes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi_lower: Option<Tensor>,
    /// Upper credible bound of ROI, when the backend computes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi_upper: Option<Tensor>,
    /// Incremental KPI attributed to each channel over the whole window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental_outcome: Option<Tensor>,
    /// Channel contribution magnitude, when reported separately from
    /// incremental outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution: Option<Tensor>,
    /// Geometric adstock decay rate per channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adstock_decay: Option<Tensor>,
    /// Lag (in time steps) of peak media effect per channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adstock_peak: Option<Tensor>,
    /// Hill half-saturation point per channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation_ec: Option<Tensor>,
    /// Hill slope per channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation_slope: Option<Tensor>,
    /// In-sample coefficient of determination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
    /// In-sample mean absolute percentage error, as a fraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mape: Option<f64>,
}
