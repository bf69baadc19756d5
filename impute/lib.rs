#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Bayesian imputation of right-censored regression data.
//!
//! The crate simulates a linear-regression dataset, censors responses at or
//! above a cutoff, fits a naive model on the observed rows and an imputed model
//! that treats every censored response as a latent variable bounded below by the
//! cutoff, and compares the two posteriors.

pub mod censor;
pub mod compare;
pub mod config;
pub mod convergence;
pub mod density;
pub mod diagnostics;
pub mod forest;
pub mod gibbs;
pub mod linalg;
pub mod model;
pub mod pipeline;
pub mod qq;
pub mod report;
pub mod simulate;
pub mod trace;
