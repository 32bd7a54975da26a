//! Property-based checks over the transactional collections, plus a
//! sequential-history check of the engine itself against a plain oracle.

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::collections::HashMap;

use stm::{Engine, TransactionalArray, TransactionalDictionary, TransactionalSortedMap};

const ORACLE_VARS: usize = 4;

proptest! {
    /// A single thread running arbitrary read/write transactions, some
    /// committed and some aborted, must always agree with a `HashMap`
    /// oracle that's only ever updated on a simulated commit.
    #[test]
    fn sequential_history_matches_a_hashmap_oracle(
        txns in prop::collection::vec(
            (
                prop::collection::vec((0usize..ORACLE_VARS, any::<i64>()), 0..6),
                any::<bool>(),
            ),
            1..64,
        ),
    ) {
        let engine = Engine::new();
        let vars: Vec<_> = (0..ORACLE_VARS).map(|_| engine.allocate(0i64).unwrap()).collect();
        let mut oracle: HashMap<usize, i64> = (0..ORACLE_VARS).map(|i| (i, 0)).collect();

        for (writes, should_commit) in txns {
            let txn = engine.create();
            let mut shadow = oracle.clone();
            for (idx, value) in &writes {
                vars[*idx].open_for_write().unwrap();
                vars[*idx].set(*value).unwrap();
                shadow.insert(*idx, *value);
            }
            if should_commit {
                txn.commit().unwrap();
                oracle = shadow;
            } else {
                drop(txn);
            }
        }

        for i in 0..ORACLE_VARS {
            prop_assert_eq!(vars[i].read_without_opening().0, oracle[&i]);
        }
    }
}

proptest! {
    #[test]
    fn array_set_then_get_always_round_trips(
        values in prop::collection::vec(any::<i64>(), 1..32),
        index in 0usize..31,
    ) {
        let index = index % values.len();
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, values.clone()).unwrap();
        let new_value = values[index].wrapping_add(1);
        array.set(index, new_value).unwrap();
        prop_assert_eq!(array.get(index).unwrap(), new_value);
    }

    #[test]
    fn sorted_map_matches_a_plain_btreemap_after_random_inserts_and_removes(
        ops in prop::collection::vec((any::<i16>(), any::<bool>()), 1..200),
    ) {
        let engine = Engine::new();
        let map = TransactionalSortedMap::<i16, i16>::new(engine).unwrap();
        let mut oracle: BTreeMap<i16, i16> = BTreeMap::new();

        for (key, should_insert) in ops {
            if should_insert {
                map.insert(key, key).unwrap();
                oracle.insert(key, key);
            } else {
                map.remove(&key).unwrap();
                oracle.remove(&key);
            }
        }

        let expected: Vec<(i16, i16)> = oracle.into_iter().collect();
        prop_assert_eq!(map.iter().unwrap(), expected);
    }

    #[test]
    fn dictionary_insert_then_get_always_finds_the_value(
        key in any::<i32>(),
        value in any::<i64>(),
    ) {
        let engine = Engine::new();
        let dict = TransactionalDictionary::<i32, i64>::new(engine).unwrap();
        dict.insert(key, value).unwrap();
        prop_assert_eq!(dict.get(&key).unwrap(), Some(value));
    }
}
