/*!
 * Tree Queries
 * Minimum, in-order successor and ordered search
 */

use super::{child_of, parent_of, Link, NodeId, NodeStore, RbTree, Side};

impl RbTree {
    /// Leftmost node of the subtree at `subtree`, or `None` for an empty subtree
    pub fn minimum<S: NodeStore + ?Sized>(&self, store: &S, subtree: Link) -> Link {
        subtree.map(|id| self.minimum_of(store, id))
    }

    /// Leftmost node of a non-empty subtree
    pub(super) fn minimum_of<S: NodeStore + ?Sized>(&self, store: &S, mut id: NodeId) -> NodeId {
        while let Some(left) = child_of(store, id, Side::Left) {
            id = left;
        }
        id
    }

    /// Member with the smallest key (first inserted among equal keys)
    #[inline]
    pub fn first<S: NodeStore + ?Sized>(&self, store: &S) -> Link {
        self.minimum(store, self.root)
    }

    /// Next member in key order
    pub fn successor<S: NodeStore + ?Sized>(&self, store: &S, id: NodeId) -> Link {
        if let Some(right) = child_of(store, id, Side::Right) {
            return Some(self.minimum_of(store, right));
        }

        let mut child = id;
        let mut parent = parent_of(store, id);
        while let Some(p) = parent {
            if child_of(store, p, Side::Left) == Some(child) {
                return Some(p);
            }
            child = p;
            parent = parent_of(store, p);
        }
        None
    }

    /// Walk members in key order
    pub fn iter<'a, S: NodeStore + ?Sized>(&'a self, store: &'a S) -> InOrder<'a, S> {
        InOrder {
            tree: self,
            store,
            next: self.first(store),
        }
    }

    /// First member in key order matching `pred`.
    ///
    /// Iterative so it never recurses on the kernel stack. Stops as soon as a
    /// match is found, which is the minimum itself when every member matches.
    pub fn find_first<S, P>(&self, store: &S, mut pred: P) -> Option<NodeId>
    where
        S: NodeStore + ?Sized,
        P: FnMut(NodeId) -> bool,
    {
        self.iter(store).find(|&id| pred(id))
    }
}

/// In-order iterator over member handles
pub struct InOrder<'a, S: NodeStore + ?Sized> {
    tree: &'a RbTree,
    store: &'a S,
    next: Link,
}

impl<'a, S: NodeStore + ?Sized> Iterator for InOrder<'a, S> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.successor(self.store, current);
        Some(current)
    }
}
