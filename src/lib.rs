//! Subscription feed deduplication: decode a feed, parse each proxy link,
//! canonicalize it, fingerprint its identity fields and keep the first raw
//! line per fingerprint.

pub mod decode;
pub mod dedup;
pub mod fingerprint;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod source;
