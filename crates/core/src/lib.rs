//! Band disentanglement and derived views for tight-binding results.

pub mod array;
pub mod assignment;
pub mod bands;
pub mod disentangle;
pub mod error;
pub mod io;
pub mod metrics;
pub mod overlap;
pub mod path;
pub mod series;
pub mod structure;
pub mod wavefunction;

pub use error::{Result, ResultsError};

#[cfg(test)]
mod _tests_disentangle;
#[cfg(test)]
mod _tests_wavefunction;
