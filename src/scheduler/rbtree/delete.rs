/*!
 * Deletion
 * Transplant-based unlink followed by red-black fixup
 */

use super::{
    child_of, color_of, is_red, parent_of, set_color, side_of, Color, Link, NodeId, NodeStore,
    RbTree, Side, TreeError, TreeResult,
};
use tracing::trace;

impl RbTree {
    /// Unlink `node` from the tree.
    ///
    /// The node's links are reset afterwards so it can be inserted again.
    ///
    /// # Errors
    /// `NotLinked` if `node` is not a member. Other errors mean the tree was
    /// already corrupt.
    pub fn delete<S: NodeStore + ?Sized>(&mut self, store: &mut S, node: NodeId) -> TreeResult<()> {
        if !store.links(node).linked {
            return Err(TreeError::NotLinked(node));
        }

        let z = *store.links(node);
        let mut removed_color = z.color;
        let x: Link;
        let x_parent: Link;

        match (z.left, z.right) {
            (None, child) | (child, None) => {
                x = child;
                x_parent = z.parent;
                self.transplant(store, node, child);
            }
            (Some(zl), Some(zr)) => {
                // Two children: the in-order successor takes node's place
                let y = self.minimum_of(store, zr);
                removed_color = color_of(store, Some(y));
                x = child_of(store, y, Side::Right);

                if y == zr {
                    x_parent = Some(y);
                } else {
                    x_parent = parent_of(store, y);
                    self.transplant(store, y, x);
                    store.links_mut(y).right = Some(zr);
                    store.links_mut(zr).parent = Some(y);
                }

                self.transplant(store, node, Some(y));
                store.links_mut(y).left = Some(zl);
                store.links_mut(zl).parent = Some(y);
                set_color(store, y, z.color);
            }
        }

        store.links_mut(node).reset();
        self.len -= 1;
        trace!(node = %node, removed = ?removed_color, "rbtree delete");

        if removed_color == Color::Black {
            self.delete_fixup(store, x, x_parent)?;
        }
        Ok(())
    }

    /// Replace the subtree rooted at `u` with the one rooted at `v`
    fn transplant<S: NodeStore + ?Sized>(&mut self, store: &mut S, u: NodeId, v: Link) {
        let up = parent_of(store, u);
        self.replace_child(store, up, u, v);
        if let Some(v) = v {
            store.links_mut(v).parent = up;
        }
    }

    /// Restore black height after a BLACK node was spliced out above `x`.
    ///
    /// `x` may be the sentinel, so its parent is carried separately.
    fn delete_fixup<S: NodeStore + ?Sized>(
        &mut self,
        store: &mut S,
        mut x: Link,
        mut x_parent: Link,
    ) -> TreeResult<()> {
        while x != self.root && !is_red(store, x) {
            let Some(p) = x_parent else { break };
            let side = side_of(store, p, x);
            let far = side.flip();

            // x carries an extra black, so its sibling subtree cannot be empty
            let mut w = child_of(store, p, far).ok_or(TreeError::MissingChild { node: p, side: far })?;

            // Case 1: red sibling
            if is_red(store, Some(w)) {
                set_color(store, w, Color::Black);
                set_color(store, p, Color::Red);
                self.rotate(store, p, side)?;
                w = child_of(store, p, far).ok_or(TreeError::MissingChild { node: p, side: far })?;
            }

            let near_child = child_of(store, w, side);
            let far_child = child_of(store, w, far);

            if !is_red(store, near_child) && !is_red(store, far_child) {
                // Case 2: push the extra black up
                set_color(store, w, Color::Red);
                x = Some(p);
                x_parent = parent_of(store, p);
                continue;
            }

            // Case 3: far child black, rotate the red near child into place
            if !is_red(store, far_child) {
                if let Some(n) = near_child {
                    set_color(store, n, Color::Black);
                }
                set_color(store, w, Color::Red);
                self.rotate(store, w, far)?;
                w = child_of(store, p, far).ok_or(TreeError::MissingChild { node: p, side: far })?;
            }

            // Case 4: terminal
            set_color(store, w, color_of(store, Some(p)));
            set_color(store, p, Color::Black);
            if let Some(f) = child_of(store, w, far) {
                set_color(store, f, Color::Black);
            }
            self.rotate(store, p, side)?;
            x = self.root;
            x_parent = None;
        }

        if let Some(x) = x {
            set_color(store, x, Color::Black);
        }
        Ok(())
    }
}
