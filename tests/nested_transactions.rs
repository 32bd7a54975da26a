//! Nested transaction merge and abort semantics (§4.4).

use stm::Engine;

#[test]
fn inner_commit_merges_into_outer_but_outer_abort_still_reverts_everything() {
    let engine = Engine::new();
    let a = engine.allocate(1i64).unwrap();
    let b = engine.allocate(2i64).unwrap();
    let c = engine.allocate(3i64).unwrap();

    {
        let outer = engine.create();
        a.set(-1).unwrap();

        {
            let inner = engine.create();
            a.set(1).unwrap();
            b.set(2).unwrap();
            c.set(3).unwrap();
            inner.commit().unwrap();
        }

        // outer is dropped here without commit: the whole chain, including
        // the merged-in inner writes, reverts.
        drop(outer);
    }

    assert_eq!(a.read_without_opening().0, 1);
    assert_eq!(b.read_without_opening().0, 2);
    assert_eq!(c.read_without_opening().0, 3);
}

#[test]
fn outer_commit_with_inner_dropped_uncommitted_keeps_only_outers_writes() {
    let engine = Engine::new();
    let a = engine.allocate(1i64).unwrap();
    let b = engine.allocate(2i64).unwrap();

    let outer = engine.create();
    a.set(10).unwrap();
    {
        let _inner = engine.create();
        b.set(999).unwrap();
        // inner dropped without commit: its write to b never merges in.
    }
    outer.commit().unwrap();

    assert_eq!(a.read_without_opening().0, 10);
    assert_eq!(b.read_without_opening().0, 2);
}

#[test]
fn committing_while_a_nested_transaction_is_still_open_fails() {
    use stm::Error;

    let engine = Engine::new();
    let outer = engine.create();
    let inner = engine.create();
    assert!(matches!(outer.commit(), Err(Error::NestedPending)));
    drop(inner);
}
