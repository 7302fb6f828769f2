//! Python bindings for the Weft participant driver.
//!
//! The native extension is named `_weft`. It exposes a single
//! `SolverInterface` class backed by [`weft_driver::Participant`] over the
//! reference [`weft_engine::LocalEngine`], so every protocol check of the
//! Rust driver applies to Python solvers too.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use pyo3::prelude::*;

mod action;
mod error;
mod interface;

/// The native `_weft` extension module.
#[pymodule]
fn _weft(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<action::ActionKind>()?;
    m.add_class::<interface::SolverInterface>()?;
    Ok(())
}
