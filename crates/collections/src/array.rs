//! Fixed-length transactional array (C5).
//!
//! The array itself is not a single transactional variable: its *slots* are,
//! each one a `Variable<T>` allocated once and never replaced. The length is
//! carried by a `Variable<Vec<Variable<T>>>` so `enlarge` can grow it
//! transactionally (appending freshly allocated variables) without taking
//! any lock the rest of the array's readers/writers don't already respect.

use stm_core::{Duplicate, Error, Result};
use stm_engine::{retry, Engine, Variable};

/// A fixed-length (but growable via [`TransactionalArray::enlarge`]) vector
/// of transactional variables.
///
/// `T` must be [`Duplicate`] (automatic for any `Clone + Send + Sync +
/// 'static` type, or use [`stm_engine::Immutable`]/[`stm_engine::Cloneable`]
/// for types that need a different duplication policy) and `Default`, since
/// `enlarge` must be able to conjure freshly allocated elements.
pub struct TransactionalArray<T: Duplicate + Default> {
    engine: Engine,
    slots: Variable<Vec<Variable<T>>>,
}

impl<T: Duplicate + Default> TransactionalArray<T> {
    /// Allocates a new array of `length` elements, each initialized to
    /// `T::default()`.
    pub fn new(engine: Engine, length: usize) -> Result<Self> {
        Self::from_iter_with(engine, std::iter::repeat_with(T::default).take(length))
    }

    /// Allocates a new array whose elements are taken from `items`, in
    /// order. The array's length is fixed at `items`'s length.
    pub fn from_iter_with(engine: Engine, items: impl IntoIterator<Item = T>) -> Result<Self> {
        let mut slots = Vec::new();
        for item in items {
            slots.push(engine.allocate(item)?);
        }
        let slots = engine.allocate(slots)?;
        Ok(TransactionalArray { engine, slots })
    }

    /// Current length. A point-in-time snapshot taken in its own
    /// transaction, consistent with any single commit.
    pub fn len(&self) -> Result<usize> {
        retry(|| Ok(self.slots.read()?.len()))
    }

    /// True iff the array currently has zero elements (only possible for an
    /// array constructed with `length == 0`, since `enlarge` never shrinks).
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the element at `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        retry(|| {
            let slots = self.slots.read()?;
            let cell = slot_at(&slots, index)?;
            cell.read()
        })
    }

    /// Writes `value` into the element at `index`.
    pub fn set(&self, index: usize, value: T) -> Result<()>
    where
        T: Clone,
    {
        retry(|| {
            let slots = self.slots.read()?;
            let cell = slot_at(&slots, index)?;
            cell.set(value.clone())
        })
    }

    /// The first index at which `value` is found, or `None`.
    pub fn index_of(&self, value: &T) -> Result<Option<usize>>
    where
        T: PartialEq,
    {
        retry(|| {
            let slots = self.slots.read()?;
            for (i, cell) in slots.iter().enumerate() {
                if &cell.read()? == value {
                    return Ok(Some(i));
                }
            }
            Ok(None)
        })
    }

    /// True iff `value` appears anywhere in the array.
    pub fn contains(&self, value: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        Ok(self.index_of(value)?.is_some())
    }

    /// Copies every element out into a plain `Vec`, all read within a
    /// single transaction so the snapshot is internally consistent.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        retry(|| {
            let slots = self.slots.read()?;
            slots.iter().map(Variable::read).collect()
        })
    }

    /// A consistent, point-in-time enumeration of the array's elements.
    pub fn iter(&self) -> Result<std::vec::IntoIter<T>> {
        Ok(self.to_vec()?.into_iter())
    }

    /// Grows the array to `new_length` elements by appending freshly
    /// allocated, default-valued variables. A no-op if `new_length` is not
    /// greater than the current length. Remove/Insert/Add are intentionally
    /// not exposed: this array's length only ever grows.
    pub fn enlarge(&self, new_length: usize) -> Result<()> {
        retry(|| {
            let mut slots = self.slots.open_for_write()?;
            if new_length > slots.len() {
                for _ in slots.len()..new_length {
                    slots.push(self.engine.allocate(T::default())?);
                }
                self.slots.set(slots)?;
            }
            Ok(())
        })
    }
}

fn slot_at<T: Duplicate>(slots: &[Variable<T>], index: usize) -> Result<&Variable<T>> {
    slots.get(index).ok_or(Error::IndexOutOfRange {
        index,
        length: slots.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_iter_preserves_order_and_length() {
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, [0, 1, 2, 3, 4]).unwrap();
        assert_eq!(array.len().unwrap(), 5);
        assert_eq!(array.to_vec().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn set_then_get_round_trips() {
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, [0, 1, 2, 3, 4]).unwrap();
        array.set(2, 42).unwrap();
        assert_eq!(array.get(2).unwrap(), 42);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let engine = Engine::new();
        let array: TransactionalArray<i64> = TransactionalArray::new(engine, 3).unwrap();
        assert!(matches!(
            array.get(5),
            Err(Error::IndexOutOfRange { index: 5, length: 3 })
        ));
    }

    #[test]
    fn index_of_and_contains() {
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, [10, 20, 30]).unwrap();
        assert_eq!(array.index_of(&20).unwrap(), Some(1));
        assert!(array.contains(&30).unwrap());
        assert!(!array.contains(&99).unwrap());
    }

    #[test]
    fn enlarge_appends_default_valued_slots() {
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, [1, 2]).unwrap();
        array.enlarge(4).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![1, 2, 0, 0]);
    }

    #[test]
    fn enlarge_to_a_smaller_length_is_a_no_op() {
        let engine = Engine::new();
        let array = TransactionalArray::from_iter_with(engine, [1, 2, 3]).unwrap();
        array.enlarge(1).unwrap();
        assert_eq!(array.to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn writes_inside_an_uncommitted_transaction_are_invisible_to_other_threads() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Arc, Barrier};

        let engine = Engine::new();
        let array = Arc::new(
            TransactionalArray::from_iter_with(engine, [0, 1, 2, 3, 4]).unwrap(),
        );
        let observed_stale = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(Barrier::new(2));

        let writer = {
            let array = Arc::clone(&array);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let txn = engine.create();
                let slots = array.slots.read().unwrap();
                slots[2].set(42).unwrap();
                barrier.wait();
                barrier.wait();
                txn.commit().unwrap();
            })
        };
        let reader = {
            let array = Arc::clone(&array);
            let barrier = Arc::clone(&barrier);
            let observed_stale = Arc::clone(&observed_stale);
            std::thread::spawn(move || {
                barrier.wait();
                if array.get(2).unwrap() == 2 {
                    observed_stale.store(true, Ordering::SeqCst);
                }
                barrier.wait();
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();

        assert!(observed_stale.load(Ordering::SeqCst));
        assert_eq!(array.get(2).unwrap(), 42);
    }
}
