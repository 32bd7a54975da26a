//! Value classification for transactional variables.
//!
//! Every `Variable<T>` needs a way to hand a transaction its own private copy
//! of `T` on read, and to accept a private copy back on write, without the
//! transaction and the committed state ever sharing mutable data. The
//! original runtime this module descends from decided that policy at
//! runtime, by reflecting over the type and caching the verdict. Rust's
//! trait system lets us make almost all of that decision at compile time
//! instead, which is the direction taken here.
//!
//! Three policies exist:
//!
//! - [`Policy::Copyable`] — `T: Clone`. The overwhelmingly common case;
//!   every plain `Clone` type gets this for free via the blanket impl below.
//! - [`Policy::Immutable`] — the value is never duplicated at all, because
//!   it can't change out from under anyone once wrapped in [`Immutable<T>`].
//! - [`Policy::Cloneable`] — the value is duplicated by a user-supplied
//!   closure rather than `Clone`, via [`Cloneable<T>`], for types that need
//!   a custom deep copy (or that can't implement `Clone` at all). This is
//!   the one path where a runtime [`Error::CloneContract`] violation is
//!   reachable, because the closure's return type is only checked against
//!   the wrapped type via a runtime `Any` downcast.
//!
//! [`Error::CloneContract`]: crate::error::Error::CloneContract

use std::any::Any;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Which duplication strategy a value's type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Duplicated via `Clone::clone`.
    Copyable,
    /// Never duplicated; shared by reference and protected by never
    /// permitting mutation of the wrapped value.
    Immutable,
    /// Duplicated via a user-supplied closure captured at construction.
    Cloneable,
}

/// Produces an independent copy of `Self` suitable for handing to a
/// transaction on read, or for a transaction to hand back on write.
///
/// Implemented for every `T: Clone + Send + Sync + 'static` via the blanket
/// impl below, and manually for [`Immutable<T>`] and [`Cloneable<T>`], which
/// deliberately do not implement `Clone` so the two impls don't collide.
pub trait Duplicate: Send + Sync + 'static {
    /// Which strategy this type uses. Used only for diagnostics; the actual
    /// duplication always goes through [`Duplicate::duplicate`].
    fn policy() -> Policy
    where
        Self: Sized;

    /// Produces an independent copy of `self`.
    fn duplicate(&self) -> Self
    where
        Self: Sized;
}

impl<T: Clone + Send + Sync + 'static> Duplicate for T {
    fn policy() -> Policy {
        Policy::Copyable
    }

    fn duplicate(&self) -> Self {
        self.clone()
    }
}

/// Wraps a value that is never duplicated, only shared by reference.
///
/// Use this when `T` is expensive or impossible to clone but is logically
/// read-only once placed in the variable — for example a parsed
/// configuration document. Because `Immutable<T>` does not implement
/// `Clone`, it cannot collide with the blanket [`Duplicate`] impl above.
#[derive(Debug)]
pub struct Immutable<T: Send + Sync + 'static>(Arc<T>);

impl<T: Send + Sync + 'static> Immutable<T> {
    /// Wraps `value` for immutable, non-duplicating sharing.
    pub fn new(value: T) -> Self {
        Immutable(Arc::new(value))
    }

    /// Borrows the wrapped value.
    pub fn get(&self) -> &T {
        &self.0
    }
}

impl<T: Send + Sync + 'static> Duplicate for Immutable<T> {
    fn policy() -> Policy {
        Policy::Immutable
    }

    fn duplicate(&self) -> Self {
        Immutable(Arc::clone(&self.0))
    }
}

/// Wraps a value that is duplicated via a user-supplied closure rather than
/// `Clone`.
///
/// This is the escape hatch for types that need a custom deep copy, or that
/// genuinely cannot implement `Clone` (e.g. they wrap a non-`Clone` external
/// resource handle but still want value semantics inside a transaction). The
/// closure's output is checked against `T` via a runtime downcast; a
/// mismatch surfaces as [`Error::CloneContract`], which is the one place in
/// this module where a "wrong type returned" failure mode is still reachable
/// at runtime instead of being ruled out at compile time.
pub struct Cloneable<T: Send + Sync + 'static> {
    value: T,
    duplicator: Arc<dyn Fn(&T) -> Box<dyn Any + Send + Sync> + Send + Sync>,
}

impl<T: Send + Sync + 'static> Cloneable<T> {
    /// Wraps `value`, duplicating future copies via `duplicator`.
    ///
    /// `duplicator` must always return a `Box<dyn Any>` that downcasts to
    /// `T`; a violation is only caught the next time the value is
    /// duplicated, and surfaces as [`Error::CloneContract`].
    pub fn new<F>(value: T, duplicator: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        let boxed: Arc<dyn Fn(&T) -> Box<dyn Any + Send + Sync> + Send + Sync> =
            Arc::new(move |v: &T| Box::new(duplicator(v)) as Box<dyn Any + Send + Sync>);
        Cloneable {
            value,
            duplicator: boxed,
        }
    }

    /// Borrows the wrapped value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Duplicates the wrapped value via the closure, returning
    /// [`Error::CloneContract`] if the closure's result does not downcast
    /// back to `T`.
    pub fn try_duplicate(&self) -> Result<T> {
        let erased = (self.duplicator)(&self.value);
        erased.downcast::<T>().map(|b| *b).map_err(|_| {
            Error::CloneContract(
                "duplicator closure returned a value of the wrong type".to_string(),
            )
        })
    }
}

impl<T: Send + Sync + 'static> Duplicate for Cloneable<T> {
    fn policy() -> Policy {
        Policy::Cloneable
    }

    fn duplicate(&self) -> Self {
        // `Duplicate::duplicate` is infallible by contract. Callers who need
        // to handle a broken duplicator closure gracefully should call
        // `try_duplicate` directly instead of going through this trait impl.
        let value = self.try_duplicate().expect(
            "Cloneable duplicator returned a value that does not downcast to its own type",
        );
        Cloneable {
            value,
            duplicator: Arc::clone(&self.duplicator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn plain_clone_type_is_copyable() {
        assert_eq!(Point::policy(), Policy::Copyable);
        let p = Point { x: 1, y: 2 };
        assert_eq!(p.duplicate(), p);
    }

    #[test]
    fn immutable_wrapper_shares_the_same_allocation() {
        assert_eq!(Immutable::<Point>::policy(), Policy::Immutable);
        let imm = Immutable::new(Point { x: 3, y: 4 });
        let dup = imm.duplicate();
        assert!(std::ptr::eq(imm.get(), dup.get()));
    }

    #[test]
    fn cloneable_wrapper_uses_closure() {
        assert_eq!(Cloneable::<Point>::policy(), Policy::Cloneable);
        let c = Cloneable::new(Point { x: 5, y: 6 }, |p| Point { x: p.x, y: p.y });
        let dup = c.try_duplicate().unwrap();
        assert_eq!(dup, Point { x: 5, y: 6 });
    }

    #[test]
    fn cloneable_wrapper_detects_contract_violation() {
        // The closure claims to duplicate a `Point` but actually returns an
        // `i64`; downcasting at `try_duplicate` must fail cleanly rather
        // than panic.
        let broken = Cloneable::<Point> {
            value: Point { x: 0, y: 0 },
            duplicator: Arc::new(|_: &Point| Box::new(42i64) as Box<dyn Any + Send + Sync>),
        };
        let err = broken.try_duplicate().unwrap_err();
        assert!(matches!(err, Error::CloneContract(_)));
    }
}
