//! Contended array increments across many threads (§5, §8).
//!
//! Every thread's every iteration increments the same two slots and reads
//! the rest, so each of those two slots ends at exactly
//! `THREADS * ITERATIONS`, regardless of how the commits interleave.

use std::sync::Arc;
use std::thread;

use stm::{retry, Engine, TransactionalArray};

#[test]
fn sixteen_threads_five_hundred_iterations_each_leaves_the_shared_slots_exact() {
    const THREADS: usize = 16;
    const ITERATIONS: usize = 500;
    const SLOTS: usize = 10;
    const INCREMENTED: [usize; 2] = [0, 1];

    let engine = Engine::new();
    let array = Arc::new(TransactionalArray::<i64>::new(engine, SLOTS).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let array = Arc::clone(&array);
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    retry(|| {
                        for &slot in &INCREMENTED {
                            let v = array.get(slot)?;
                            array.set(slot, v + 1)?;
                        }
                        for slot in 0..SLOTS {
                            if !INCREMENTED.contains(&slot) {
                                array.get(slot)?;
                            }
                        }
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for &slot in &INCREMENTED {
        assert_eq!(array.get(slot).unwrap(), (THREADS * ITERATIONS) as i64);
    }
    for slot in 0..SLOTS {
        if !INCREMENTED.contains(&slot) {
            assert_eq!(array.get(slot).unwrap(), 0);
        }
    }
}
