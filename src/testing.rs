//! Test support for reconciliation jobs.
//!
//! - **Fixtures**: a people dataset and deterministic snapshot generators
//! - **Mock I/O**: temporary directories holding snapshot files
//! - **Assertions**: compare delta streams and check stats invariants
//!
//! # Quick Start
//!
//! ```
//! use ironrecon::reconcile::{ReconcileOptions, Reconciler};
//! use ironrecon::record::Transaction;
//! use ironrecon::testing::*;
//!
//! # fn main() -> ironrecon::Result<()> {
//! let d = people_descriptor();
//! let old = SnapshotBuilder::new(&d).row(["1", "Ann", "ann@x", ""]).build();
//! let new = SnapshotBuilder::new(&d).row(["2", "Bob", "bob@x", ""]).build();
//!
//! let (deltas, stats) = Reconciler::new(d, ReconcileOptions::default())?
//!     .reconcile(as_source(old), as_source(new))?;
//! assert_transactions(&deltas, &[(Transaction::Delete, "1"), (Transaction::Create, "2")]);
//! assert_stats_consistent(&stats);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;
