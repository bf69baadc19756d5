//! Posterior trace storage.
//!
//! A trace is an ordered mapping from variable name to its draws, stored as an
//! `Array3` of shape `(chains, draws, dim)`. Scalar parameters have `dim == 1`;
//! vector-valued variables such as the latent censored responses keep one
//! component per element. Looking up a name that was never recorded is an error,
//! never a silent default.

use ndarray::{Array2, Array3, ArrayView1, ArrayView3, Axis, s};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TraceError {
    #[error("Parameter '{0}' was not found in the posterior trace.")]
    ParameterNotFound(String),
    #[error(
        "Variable '{name}' has shape ({chains}, {draws}, _), but the trace holds {expected_chains} chains of {expected_draws} draws."
    )]
    ShapeMismatch {
        name: String,
        chains: usize,
        draws: usize,
        expected_chains: usize,
        expected_draws: usize,
    },
    #[error("Variable '{0}' is already present in the trace.")]
    DuplicateVariable(String),
    #[error("Component {index} is out of range for variable '{name}' with {dim} components.")]
    ComponentOutOfRange {
        name: String,
        index: usize,
        dim: usize,
    },
}

/// A named, scalar component of a trace variable, e.g. `x1` or `right_censored[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentName {
    pub variable: String,
    pub index: Option<usize>,
}

impl std::fmt::Display for ComponentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.variable, i),
            None => write!(f, "{}", self.variable),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PosteriorTrace {
    variables: BTreeMap<String, Array3<f64>>,
    order: Vec<String>,
    shape: Option<(usize, usize)>,
}

impl PosteriorTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable with draws shaped `(chains, draws, dim)`.
    ///
    /// Every variable in a trace must share the same number of chains and draws.
    pub fn insert(&mut self, name: &str, draws: Array3<f64>) -> Result<(), TraceError> {
        if self.variables.contains_key(name) {
            return Err(TraceError::DuplicateVariable(name.to_string()));
        }
        let (chains, n_draws, dim) = draws.dim();
        if let Some((expected_chains, expected_draws)) = self.shape {
            if chains != expected_chains || n_draws != expected_draws {
                return Err(TraceError::ShapeMismatch {
                    name: name.to_string(),
                    chains,
                    draws: n_draws,
                    expected_chains,
                    expected_draws,
                });
            }
        } else {
            self.shape = Some((chains, n_draws));
        }
        log::debug!("Trace variable '{name}' recorded with shape ({chains}, {n_draws}, {dim})");
        self.order.push(name.to_string());
        self.variables.insert(name.to_string(), draws);
        Ok(())
    }

    /// Convenience constructor for scalar variables given as `(chains, draws)`.
    pub fn insert_scalar(&mut self, name: &str, draws: Array2<f64>) -> Result<(), TraceError> {
        let (chains, n_draws) = draws.dim();
        let reshaped = draws
            .into_shape_with_order((chains, n_draws, 1))
            .map_err(|_| TraceError::ShapeMismatch {
                name: name.to_string(),
                chains,
                draws: n_draws,
                expected_chains: chains,
                expected_draws: n_draws,
            })?;
        self.insert(name, reshaped)
    }

    pub fn n_chains(&self) -> usize {
        self.shape.map_or(0, |(c, _)| c)
    }

    pub fn n_draws(&self) -> usize {
        self.shape.map_or(0, |(_, d)| d)
    }

    /// Variable names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Raw `(chains, draws, dim)` view of a variable.
    pub fn get(&self, name: &str) -> Result<ArrayView3<'_, f64>, TraceError> {
        self.variables
            .get(name)
            .map(|a| a.view())
            .ok_or_else(|| TraceError::ParameterNotFound(name.to_string()))
    }

    pub fn dim(&self, name: &str) -> Result<usize, TraceError> {
        Ok(self.get(name)?.dim().2)
    }

    /// All draws of a variable with chains stacked: shape `(chains * draws, dim)`.
    pub fn samples(&self, name: &str) -> Result<Array2<f64>, TraceError> {
        let view = self.get(name)?;
        let (chains, draws, dim) = view.dim();
        let mut out = Array2::<f64>::zeros((chains * draws, dim));
        for c in 0..chains {
            out.slice_mut(s![c * draws..(c + 1) * draws, ..])
                .assign(&view.index_axis(Axis(0), c));
        }
        Ok(out)
    }

    /// Stacked draws of one scalar component.
    pub fn component_samples(&self, name: &str, index: usize) -> Result<Vec<f64>, TraceError> {
        let view = self.get(name)?;
        let dim = view.dim().2;
        if index >= dim {
            return Err(TraceError::ComponentOutOfRange {
                name: name.to_string(),
                index,
                dim,
            });
        }
        Ok(view.index_axis(Axis(2), index).iter().copied().collect())
    }

    /// Per-chain draws of one scalar component, one `Vec` per chain.
    pub fn component_chains(&self, name: &str, index: usize) -> Result<Vec<Vec<f64>>, TraceError> {
        let view = self.get(name)?;
        let dim = view.dim().2;
        if index >= dim {
            return Err(TraceError::ComponentOutOfRange {
                name: name.to_string(),
                index,
                dim,
            });
        }
        let component = view.index_axis(Axis(2), index);
        Ok(component
            .axis_iter(Axis(0))
            .map(|chain: ArrayView1<f64>| chain.to_vec())
            .collect())
    }

    /// Expands a variable into its scalar component names.
    pub fn component_names(&self, name: &str) -> Result<Vec<ComponentName>, TraceError> {
        let dim = self.dim(name)?;
        if dim == 1 {
            Ok(vec![ComponentName {
                variable: name.to_string(),
                index: None,
            }])
        } else {
            Ok((0..dim)
                .map(|i| ComponentName {
                    variable: name.to_string(),
                    index: Some(i),
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, array};

    #[test]
    fn missing_name_is_not_found() {
        let trace = PosteriorTrace::new();
        assert_eq!(
            trace.get("right_censored").unwrap_err(),
            TraceError::ParameterNotFound("right_censored".to_string())
        );
    }

    #[test]
    fn samples_stack_chains_in_order() {
        let mut trace = PosteriorTrace::new();
        trace
            .insert_scalar("a", array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
            .unwrap();
        let stacked = trace.samples("a").unwrap();
        assert_eq!(stacked.dim(), (6, 1));
        assert_eq!(stacked.column(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(trace.n_chains(), 2);
        assert_eq!(trace.n_draws(), 3);
    }

    #[test]
    fn shapes_must_agree_across_variables() {
        let mut trace = PosteriorTrace::new();
        trace.insert("a", Array3::zeros((2, 10, 1))).unwrap();
        let err = trace.insert("b", Array3::zeros((2, 9, 1))).unwrap_err();
        assert!(matches!(err, TraceError::ShapeMismatch { .. }));
        let dup = trace.insert("a", Array3::zeros((2, 10, 1))).unwrap_err();
        assert_eq!(dup, TraceError::DuplicateVariable("a".to_string()));
    }

    #[test]
    fn vector_variables_expand_to_indexed_components() {
        let mut trace = PosteriorTrace::new();
        let mut draws = Array3::<f64>::zeros((1, 2, 3));
        draws[[0, 1, 2]] = 7.0;
        trace.insert("z", draws).unwrap();
        let names: Vec<String> = trace
            .component_names("z")
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(names, vec!["z[0]", "z[1]", "z[2]"]);
        assert_eq!(trace.component_samples("z", 2).unwrap(), vec![0.0, 7.0]);
        assert!(matches!(
            trace.component_samples("z", 3),
            Err(TraceError::ComponentOutOfRange { .. })
        ));
    }
}
