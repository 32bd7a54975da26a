//! Transactional collections (C5-C7) built on top of `stm-engine`: a
//! fixed-length array, a coalesced-hashing dictionary, and a left-leaning
//! red-black sorted map. Every operation here runs as one or more STM
//! transactions via `stm_engine::retry`, so callers never see a partial
//! mutation and a conflicting concurrent writer simply causes a retry.

mod array;
mod dict;
mod sorted_map;

pub use array::TransactionalArray;
pub use dict::TransactionalDictionary;
pub use sorted_map::TransactionalSortedMap;
