//! Position acquisition for the worker client: a bounded, retrying one-shot
//! request with a low-accuracy fallback, a continuous watch mode, and the
//! client half of the presence gate.

pub mod gate;
pub mod locator;
pub mod settings;
pub mod source;

pub use gate::*;
pub use locator::*;
pub use settings::*;
pub use source::*;
