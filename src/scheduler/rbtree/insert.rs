/*!
 * Insertion
 * BST descent (ties go right) followed by red-black fixup
 */

use super::{
    child_of, is_red, parent_of, set_color, side_of, Color, NodeId, NodeStore, RbLinks, RbTree,
    TreeError, TreeResult,
};
use tracing::trace;

impl RbTree {
    /// Link `node` into the tree by its current key.
    ///
    /// Equal keys descend right, so a later insert sorts after every earlier
    /// member with the same key.
    ///
    /// # Errors
    /// `AlreadyLinked` if `node` is a member. Other errors mean the tree was
    /// already corrupt.
    pub fn insert<S: NodeStore + ?Sized>(&mut self, store: &mut S, node: NodeId) -> TreeResult<()> {
        if store.links(node).linked {
            return Err(TreeError::AlreadyLinked(node));
        }

        let key = store.key(node);
        let mut parent = None;
        let mut cursor = self.root;
        let mut go_left = false;
        while let Some(x) = cursor {
            parent = Some(x);
            go_left = key < store.key(x);
            cursor = if go_left {
                store.links(x).left
            } else {
                store.links(x).right
            };
        }

        *store.links_mut(node) = RbLinks {
            parent,
            left: None,
            right: None,
            color: Color::Red,
            linked: true,
        };
        match parent {
            None => self.root = Some(node),
            Some(p) if go_left => store.links_mut(p).left = Some(node),
            Some(p) => store.links_mut(p).right = Some(node),
        }
        self.len += 1;

        trace!(node = %node, key, "rbtree insert");
        self.insert_fixup(store, node)
    }

    fn insert_fixup<S: NodeStore + ?Sized>(&mut self, store: &mut S, node: NodeId) -> TreeResult<()> {
        let mut z = node;

        loop {
            let Some(p) = parent_of(store, z) else { break };
            if !is_red(store, Some(p)) {
                break;
            }

            // A red parent is never the root
            let g = parent_of(store, p).ok_or(TreeError::Detached(p))?;
            let side = side_of(store, g, Some(p));
            let uncle = child_of(store, g, side.flip());

            if is_red(store, uncle) {
                set_color(store, p, Color::Black);
                if let Some(u) = uncle {
                    set_color(store, u, Color::Black);
                }
                set_color(store, g, Color::Red);
                z = g;
                continue;
            }

            // Triangle: turn it into a line first
            if child_of(store, p, side.flip()) == Some(z) {
                z = p;
                self.rotate(store, z, side)?;
            }

            let p = parent_of(store, z).ok_or(TreeError::Detached(z))?;
            set_color(store, p, Color::Black);
            set_color(store, g, Color::Red);
            self.rotate(store, g, side.flip())?;
        }

        if let Some(root) = self.root {
            set_color(store, root, Color::Black);
        }
        Ok(())
    }
}
