//! Transactional sorted map: a left-leaning red-black tree whose node
//! pointers are themselves transactional variables (C7).
//!
//! Per the design note this crate descends from: node fields are
//! transactional variables precisely so a rotation only invalidates the
//! pointers it actually rewrites. An implementation that instead put an
//! entire subtree behind one variable would make every rotation anywhere
//! in the tree conflict with every other transaction touching any node in
//! that subtree — exactly the spurious-conflict failure mode STM is
//! supposed to avoid.
//!
//! A node's `key` is a plain field, set once at construction and never
//! mutated — only `value`, `color`, `left`, and `right` are transactional.
//! When deletion needs to replace a node's key (the classic "splice out
//! the in-order successor" step), this builds a fresh node carrying the
//! successor's key/value rather than mutating the old one in place.
//!
//! All three operation families below — search, insertion, deletion — walk
//! the tree by calling `Variable::read`/`open_for_write` on `left`/`right`,
//! so every traversal they do is itself part of the ambient STM
//! transaction and participates in conflict detection exactly like any
//! other variable access.

use std::cmp::Ordering;
use std::sync::Arc;

use stm_core::Duplicate;
use stm_engine::{retry, Engine, Result, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

impl Color {
    fn flipped(self) -> Color {
        match self {
            Color::Red => Color::Black,
            Color::Black => Color::Red,
        }
    }
}

type Link<K, V> = Option<Arc<Node<K, V>>>;

struct Node<K: Clone + Send + Sync + 'static, V: Duplicate> {
    key: K,
    value: Variable<V>,
    color: Variable<Color>,
    left: Variable<Link<K, V>>,
    right: Variable<Link<K, V>>,
}

impl<K: Clone + Send + Sync + 'static, V: Duplicate> Node<K, V> {
    fn new_leaf(engine: Engine, key: K, value: V) -> Result<Arc<Node<K, V>>> {
        Ok(Arc::new(Node {
            key,
            value: engine.allocate(value)?,
            color: engine.allocate(Color::Red)?,
            left: engine.allocate(None)?,
            right: engine.allocate(None)?,
        }))
    }
}

fn is_red<K: Clone + Send + Sync + 'static, V: Duplicate>(link: &Link<K, V>) -> Result<bool> {
    match link {
        None => Ok(false),
        Some(n) => Ok(n.color.read()? == Color::Red),
    }
}

fn rotate_left<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    let x = h.right.read()?.expect("rotate_left requires a red right child");
    h.right.set(x.left.read()?)?;
    let h_color = h.color.read()?;
    x.left.set(Some(h.clone()))?;
    x.color.set(h_color)?;
    h.color.set(Color::Red)?;
    Ok(x)
}

fn rotate_right<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    let x = h.left.read()?.expect("rotate_right requires a red left child");
    h.left.set(x.right.read()?)?;
    let h_color = h.color.read()?;
    x.right.set(Some(h.clone()))?;
    x.color.set(h_color)?;
    h.color.set(Color::Red)?;
    Ok(x)
}

fn flip_colors<K: Clone + Send + Sync + 'static, V: Duplicate>(h: &Arc<Node<K, V>>) -> Result<()> {
    let c = h.color.read()?;
    h.color.set(c.flipped())?;
    if let Some(l) = h.left.read()? {
        let c = l.color.read()?;
        l.color.set(c.flipped())?;
    }
    if let Some(r) = h.right.read()? {
        let c = r.color.read()?;
        r.color.set(c.flipped())?;
    }
    Ok(())
}

/// Post-insert rebalance: fixes a right-leaning red link or a red-red
/// pair on the left before it can propagate further up.
fn balance_insert<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    let mut h = h;
    if is_red(&h.right.read()?)? && !is_red(&h.left.read()?)? {
        h = rotate_left(h)?;
    }
    if is_red(&h.left.read()?)? {
        let left = h.left.read()?.unwrap();
        if is_red(&left.left.read()?)? {
            h = rotate_right(h)?;
        }
    }
    if is_red(&h.left.read()?)? && is_red(&h.right.read()?)? {
        flip_colors(&h)?;
    }
    Ok(h)
}

/// Post-delete rebalance, used after every step of the deletion recursion.
fn balance<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    let mut h = h;
    if is_red(&h.right.read()?)? {
        h = rotate_left(h)?;
    }
    if is_red(&h.left.read()?)? {
        let left = h.left.read()?.unwrap();
        if is_red(&left.left.read()?)? {
            h = rotate_right(h)?;
        }
    }
    if is_red(&h.left.read()?)? && is_red(&h.right.read()?)? {
        flip_colors(&h)?;
    }
    Ok(h)
}

fn move_red_left<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    flip_colors(&h)?;
    let right = h.right.read()?.expect("move_red_left requires a right child");
    if is_red(&right.left.read()?)? {
        let new_right = rotate_right(right)?;
        h.right.set(Some(new_right))?;
        let h = rotate_left(h)?;
        flip_colors(&h)?;
        Ok(h)
    } else {
        Ok(h)
    }
}

fn move_red_right<K: Clone + Send + Sync + 'static, V: Duplicate>(h: Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    flip_colors(&h)?;
    let left = h.left.read()?.expect("move_red_right requires a left child");
    if is_red(&left.left.read()?)? {
        let h = rotate_right(h)?;
        flip_colors(&h)?;
        Ok(h)
    } else {
        Ok(h)
    }
}

/// Recursive insert. Returns the new subtree root and whether `key` was
/// previously absent (for the map's element count).
fn insert_node<K: Ord + Clone + Send + Sync + 'static, V: Duplicate>(
    engine: Engine,
    link: Link<K, V>,
    key: K,
    value: V,
) -> Result<(Arc<Node<K, V>>, bool)> {
    let node = match link {
        None => return Ok((Node::new_leaf(engine, key, value)?, true)),
        Some(n) => n,
    };
    let is_new = match key.cmp(&node.key) {
        Ordering::Less => {
            let (new_left, is_new) = insert_node(engine, node.left.read()?, key, value)?;
            node.left.set(Some(new_left))?;
            is_new
        }
        Ordering::Greater => {
            let (new_right, is_new) = insert_node(engine, node.right.read()?, key, value)?;
            node.right.set(Some(new_right))?;
            is_new
        }
        Ordering::Equal => {
            node.value.set(value)?;
            false
        }
    };
    Ok((balance_insert(node)?, is_new))
}

fn min_node<K: Clone + Send + Sync + 'static, V: Duplicate>(node: &Arc<Node<K, V>>) -> Result<Arc<Node<K, V>>> {
    let mut cur = node.clone();
    loop {
        match cur.left.read()? {
            Some(l) => cur = l,
            None => return Ok(cur),
        }
    }
}

fn delete_min<K: Clone + Send + Sync + 'static, V: Duplicate>(engine: Engine, h: Arc<Node<K, V>>) -> Result<Link<K, V>> {
    let left = h.left.read()?;
    let left = match left {
        None => return Ok(None),
        Some(l) => l,
    };
    let h = if !is_red(&Some(left.clone()))? && !is_red(&left.left.read()?)? {
        move_red_left(h)?
    } else {
        h
    };
    let left = h.left.read()?.expect("delete_min: left child must still exist");
    let new_left = delete_min(engine, left)?;
    h.left.set(new_left)?;
    Ok(Some(balance(h)?))
}

fn delete_node<K: Ord + Clone + Send + Sync + 'static, V: Duplicate>(
    engine: Engine,
    h: Arc<Node<K, V>>,
    key: &K,
) -> Result<Link<K, V>> {
    let h = if key < &h.key {
        let left = h.left.read()?.expect("delete: key must be present on the left");
        let h = if !is_red(&Some(left.clone()))? && !is_red(&left.left.read()?)? {
            move_red_left(h)?
        } else {
            h
        };
        let left = h.left.read()?.expect("delete: left child must still exist");
        let new_left = delete_node(engine, left, key)?;
        h.left.set(new_left)?;
        h
    } else {
        let mut h = h;
        if is_red(&h.left.read()?)? {
            h = rotate_right(h)?;
        }
        if key == &h.key && h.right.read()?.is_none() {
            return Ok(None);
        }
        let right = h.right.read()?.expect("delete: key must be present on the right");
        h = if !is_red(&Some(right.clone()))? && !is_red(&right.left.read()?)? {
            move_red_right(h)?
        } else {
            h
        };
        if key == &h.key {
            let right = h.right.read()?.expect("delete: right child must still exist");
            let successor = min_node(&right)?;
            let new_right = delete_min(engine, right)?;
            let replacement = Arc::new(Node {
                key: successor.key.clone(),
                value: engine.allocate(successor.value.read()?)?,
                color: engine.allocate(h.color.read()?)?,
                left: engine.allocate(h.left.read()?)?,
                right: engine.allocate(new_right)?,
            });
            replacement
        } else {
            let right = h.right.read()?.expect("delete: right child must still exist");
            let new_right = delete_node(engine, right, key)?;
            h.right.set(new_right)?;
            h
        }
    };
    Ok(Some(balance(h)?))
}

fn search<K: Ord + Clone + Send + Sync + 'static, V: Duplicate>(link: &Link<K, V>, key: &K) -> Result<Option<V>> {
    let mut cur = link.clone();
    while let Some(node) = cur {
        match key.cmp(&node.key) {
            Ordering::Less => cur = node.left.read()?,
            Ordering::Greater => cur = node.right.read()?,
            Ordering::Equal => return Ok(Some(node.value.read()?)),
        }
    }
    Ok(None)
}

fn collect_in_order<K: Clone + Send + Sync + 'static, V: Duplicate>(
    link: &Link<K, V>,
    out: &mut Vec<(K, V)>,
) -> Result<()> {
    if let Some(node) = link {
        collect_in_order(&node.left.read()?, out)?;
        out.push((node.key.clone(), node.value.read()?));
        collect_in_order(&node.right.read()?, out)?;
    }
    Ok(())
}

/// A sorted key-value map backed by a left-leaning red-black tree whose
/// rotations and recolorings run as STM programs.
///
/// `K` must be `Ord + Clone` (keys are compared on every traversal and
/// cloned out on enumeration/`min`/`max`); `V` must be [`Duplicate`].
pub struct TransactionalSortedMap<K: Ord + Clone + Send + Sync + 'static, V: Duplicate> {
    engine: Engine,
    root: Variable<Link<K, V>>,
    len: Variable<usize>,
}

impl<K: Ord + Clone + Send + Sync + 'static, V: Duplicate> TransactionalSortedMap<K, V> {
    /// A new, empty sorted map.
    pub fn new(engine: Engine) -> Result<Self> {
        Ok(TransactionalSortedMap {
            engine,
            root: engine.allocate(None)?,
            len: engine.allocate(0usize)?,
        })
    }

    /// Inserts `key`/`value`, returning any previous value for `key`.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>> {
        retry(|| {
            let root = self.root.read()?;
            let old_value = search(&root, &key)?;
            let (new_root, is_new) = insert_node(self.engine, root, key.clone(), value.duplicate())?;
            new_root.color.set(Color::Black)?;
            self.root.set(Some(new_root))?;
            if is_new {
                let len = self.len.read()?;
                self.len.set(len + 1)?;
            }
            Ok(old_value)
        })
    }

    /// Looks up `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        retry(|| {
            let root = self.root.read()?;
            search(&root, key)
        })
    }

    /// True iff `key` is present.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        retry(|| {
            let root = self.root.read()?;
            let old_value = search(&root, key)?;
            if old_value.is_none() {
                return Ok(None);
            }
            let mut root_node = root.unwrap();
            let left_red = is_red(&root_node.left.read()?)?;
            let right_red = is_red(&root_node.right.read()?)?;
            if !left_red && !right_red {
                root_node.color.set(Color::Red)?;
            }
            let new_root = delete_node(self.engine, root_node, key)?;
            if let Some(ref n) = new_root {
                n.color.set(Color::Black)?;
            }
            self.root.set(new_root)?;
            let len = self.len.read()?;
            self.len.set(len - 1)?;
            Ok(old_value)
        })
    }

    /// Current number of entries.
    pub fn len(&self) -> Result<usize> {
        retry(|| self.len.read())
    }

    /// True iff the map has no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The smallest key and its value, if the map is non-empty.
    pub fn min(&self) -> Result<Option<(K, V)>> {
        retry(|| {
            let root = self.root.read()?;
            match root {
                None => Ok(None),
                Some(n) => {
                    let min = min_node(&n)?;
                    Ok(Some((min.key.clone(), min.value.read()?)))
                }
            }
        })
    }

    /// The largest key and its value, if the map is non-empty.
    pub fn max(&self) -> Result<Option<(K, V)>> {
        retry(|| {
            let root = self.root.read()?;
            let mut cur = match root {
                None => return Ok(None),
                Some(n) => n,
            };
            loop {
                match cur.right.read()? {
                    Some(r) => cur = r,
                    None => return Ok(Some((cur.key.clone(), cur.value.read()?))),
                }
            }
        })
    }

    /// A consistent, point-in-time in-order enumeration of every key/value
    /// pair.
    pub fn iter(&self) -> Result<Vec<(K, V)>> {
        retry(|| {
            let root = self.root.read()?;
            let mut out = Vec::new();
            collect_in_order(&root, &mut out)?;
            Ok(out)
        })
    }

    /// In-order keys.
    pub fn keys(&self) -> Result<Vec<K>> {
        Ok(self.iter()?.into_iter().map(|(k, _)| k).collect())
    }

    /// In-order values.
    pub fn values(&self) -> Result<Vec<V>> {
        Ok(self.iter()?.into_iter().map(|(_, v)| v).collect())
    }
}
