//! Functional core of the Kerjoo assignment workflow: domain types, the
//! assignment/item state machine, geodesy, the presence gate rule, timer
//! reconciliation and the location retry policy. No I/O and no clock reads.

pub mod backoff;
pub mod commands;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod geo;
pub mod ids;
pub mod model;
pub mod outcomes;
pub mod snapshot;
pub mod timer;
pub mod types;

pub use backoff::*;
pub use commands::*;
pub use error::*;
pub use evidence::*;
pub use gate::*;
pub use ids::*;
pub use model::*;
pub use outcomes::*;
pub use snapshot::*;
pub use timer::*;
pub use types::*;
