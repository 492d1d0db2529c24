//! Pointer offset tagging for LLVM-style SSA IR
//!
//! This crate rewrites the address computations (GEPs) of opted-in functions
//! so that, for pointers carrying a flag in bit 48, the byte offset of each
//! derived pointer is embedded above the flag bit. Pointers without the flag
//! come out bit for bit unchanged.
//!
//! ```no_run
//! use canonptr::ir::Module;
//!
//! let mut module = Module::new("example");
//! // ... build functions carrying `Attribute::CanonPtr` ...
//! let stats = canonptr::instrument_module(&mut module)?;
//! println!("{}", stats);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod ir;
pub mod pass;
pub mod stats;

pub use config::CanonPtrConfig;
pub use error::{CanonPtrError, CanonPtrResult};
pub use pass::{CanonPtrPass, ModulePass, PreservedAnalyses};
pub use stats::CanonPtrStats;

use anyhow::Result;

/// Run the pass with the default configuration over every function of
/// `module`.
pub fn instrument_module(module: &mut ir::Module) -> Result<CanonPtrStats> {
    let mut pass = CanonPtrPass::default();
    pass.run(module)?;
    Ok(pass.stats().clone())
}
