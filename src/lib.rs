//! Four concurrent hash-set implementations sharing one separate-chaining
//! data model, differing only in lock granularity:
//!
//! - [`SequentialSet`]: no synchronization, the semantic oracle.
//! - [`CoarseSet`]: one mutex for the whole table.
//! - [`StripedSet`]: a fixed-size array of stripe locks, independent of
//!   bucket count.
//! - [`RefinableSet`]: one lock per bucket, growing with the table.

#![deny(missing_docs)]

mod hash_set;

pub use hash_set::coarse::CoarseSet;
pub use hash_set::refinable::RefinableSet;
pub use hash_set::sequential::SequentialSet;
pub use hash_set::striped::StripedSet;
pub use hash_set::Set;
