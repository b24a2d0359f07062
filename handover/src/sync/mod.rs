//! Single-slot exchange structures and their lending variants.

pub mod awaitable;
pub mod relaxed;
pub mod strict;

pub use awaitable::DefaultAwaitableReference;
pub use relaxed::RelaxedLendableReference;
pub use strict::StrictLendableReference;
