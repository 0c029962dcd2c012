//! Progressive matching: direct pattern hits, a fuzzy TLSH layer, and a
//! merger that produces the final ranked list.

pub mod direct;
pub mod fuzzy;
pub mod merge;

pub use direct::{match_direct, DirectHit};
pub use fuzzy::{match_fuzzy, FuzzyHit};
pub use merge::merge_matches;
