//! Shared value types for the alert event lifecycle.
//!
//! Everything here is plain data plus the pure codecs that sit at the
//! storage boundary: the [`labels::LabelSet`] codec, space separated field
//! lists, tag filters and the event fingerprint. Nothing in this crate
//! performs I/O.

pub mod aggr;
pub mod codec;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod labels;
pub mod time;
pub mod types;
