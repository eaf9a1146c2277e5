/*!
 * Invariant Verification
 * Full structural check used by tests and the scheduler's self-check
 */

use super::{child_of, parent_of, Color, NodeId, NodeStore, RbTree, Side};
use crate::core::types::VRuntime;
use thiserror::Error;

/// A broken red-black or bookkeeping invariant
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    #[error("root {0} is red")]
    RedRoot(NodeId),

    #[error("root {0} has a parent")]
    RootHasParent(NodeId),

    #[error("red node {parent} has red child {child}")]
    RedRed { parent: NodeId, child: NodeId },

    #[error("black height differs under {node}: left {left}, right {right}")]
    BlackHeight {
        node: NodeId,
        left: usize,
        right: usize,
    },

    #[error("key of {node} is outside its subtree bounds")]
    Order { node: NodeId },

    #[error("{node} does not point back at its parent")]
    ParentLink { node: NodeId },

    #[error("{0} is reachable but not marked linked")]
    Unlinked(NodeId),

    #[error("tree records {recorded} members but {reachable} are reachable")]
    Count { recorded: usize, reachable: usize },
}

impl RbTree {
    /// Check every invariant; returns the black height of the tree.
    ///
    /// Black height here counts the black nodes on any root-to-leaf path,
    /// root included and sentinel excluded, so an empty tree has height 0.
    pub fn verify<S: NodeStore + ?Sized>(&self, store: &S) -> Result<usize, Violation> {
        let Some(root) = self.root else {
            return match self.len {
                0 => Ok(0),
                recorded => Err(Violation::Count {
                    recorded,
                    reachable: 0,
                }),
            };
        };

        if parent_of(store, root).is_some() {
            return Err(Violation::RootHasParent(root));
        }
        if store.links(root).color == Color::Red {
            return Err(Violation::RedRoot(root));
        }

        let mut reachable = 0;
        let height = self.verify_subtree(store, root, None, None, &mut reachable)?;
        if reachable != self.len {
            return Err(Violation::Count {
                recorded: self.len,
                reachable,
            });
        }
        Ok(height)
    }

    fn verify_subtree<S: NodeStore + ?Sized>(
        &self,
        store: &S,
        id: NodeId,
        low: Option<VRuntime>,
        high: Option<VRuntime>,
        reachable: &mut usize,
    ) -> Result<usize, Violation> {
        *reachable += 1;
        // Guards against cycles in a corrupted tree
        if *reachable > self.len {
            return Err(Violation::Count {
                recorded: self.len,
                reachable: *reachable,
            });
        }

        let links = store.links(id);
        if !links.linked {
            return Err(Violation::Unlinked(id));
        }

        let key = store.key(id);
        if low.is_some_and(|l| key < l) || high.is_some_and(|h| key > h) {
            return Err(Violation::Order { node: id });
        }

        let mut heights = [0usize; 2];
        for (slot, side) in [Side::Left, Side::Right].into_iter().enumerate() {
            let Some(child) = child_of(store, id, side) else {
                continue;
            };
            if parent_of(store, child) != Some(id) {
                return Err(Violation::ParentLink { node: child });
            }
            if links.color == Color::Red && store.links(child).color == Color::Red {
                return Err(Violation::RedRed { parent: id, child });
            }
            let (lo, hi) = match side {
                Side::Left => (low, Some(key)),
                Side::Right => (Some(key), high),
            };
            heights[slot] = self.verify_subtree(store, child, lo, hi, reachable)?;
        }

        if heights[0] != heights[1] {
            return Err(Violation::BlackHeight {
                node: id,
                left: heights[0],
                right: heights[1],
            });
        }
        Ok(heights[0] + usize::from(links.color == Color::Black))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{build, nid};
    use super::*;

    #[test]
    fn test_verify_accepts_valid_tree() {
        let (tree, store) = build(&[10, 5, 20, 1, 7]);
        // 10(B) -> 5(B) -> 1(R) / 7(R), 20(B)
        assert_eq!(tree.verify(&store), Ok(2));
    }

    #[test]
    fn test_verify_detects_red_red() {
        let (tree, mut store) = build(&[10, 5, 20, 1]);
        // 5 is black with red child 1 after the recolor; paint 5 red
        let five = nid(1);
        store.links_mut(five).color = Color::Red;
        assert!(matches!(
            tree.verify(&store),
            Err(Violation::RedRed { .. }) | Err(Violation::BlackHeight { .. })
        ));
    }

    #[test]
    fn test_verify_detects_order() {
        let (tree, mut store) = build(&[10, 5, 20]);
        store.nodes[1].0 = 15;
        assert_eq!(tree.verify(&store), Err(Violation::Order { node: nid(1) }));
    }

    #[test]
    fn test_verify_detects_red_root() {
        let (tree, mut store) = build(&[1, 2]);
        let root = tree.root().unwrap();
        store.links_mut(root).color = Color::Red;
        assert_eq!(tree.verify(&store), Err(Violation::RedRoot(root)));
    }
}
