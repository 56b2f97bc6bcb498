#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// image filtering module.
pub mod filter;

/// image gradient estimation module.
pub mod gradient;

/// module containing parallization utilities.
pub mod parallel;

/// operations to threshold images.
pub mod threshold;
