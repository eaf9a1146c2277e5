/*!
 * Rotation Primitives
 * Promote a child over its parent while keeping in-order sequence
 */

use super::{child_of, parent_of, NodeId, NodeStore, RbTree, Side, TreeError, TreeResult};

impl RbTree {
    /// Rotate the subtree at `x` towards `side`.
    ///
    /// `Side::Left` is a left rotation: `x`'s right child takes its place and
    /// `x` becomes that child's left child. Colors and member count are
    /// untouched; callers recolor.
    ///
    /// # Errors
    /// `MissingChild` if `x` has no child on the promoted side. Nothing is
    /// modified in that case.
    pub fn rotate<S: NodeStore + ?Sized>(
        &mut self,
        store: &mut S,
        x: NodeId,
        side: Side,
    ) -> TreeResult<()> {
        let up = side.flip();
        let y = child_of(store, x, up).ok_or(TreeError::MissingChild { node: x, side: up })?;

        // y's inner subtree moves across to x
        let inner = child_of(store, y, side);
        *store.links_mut(x).child_mut(up) = inner;
        if let Some(b) = inner {
            store.links_mut(b).parent = Some(x);
        }

        let xp = parent_of(store, x);
        store.links_mut(y).parent = xp;
        self.replace_child(store, xp, x, Some(y));

        *store.links_mut(y).child_mut(side) = Some(x);
        store.links_mut(x).parent = Some(y);
        Ok(())
    }

    #[inline]
    pub fn rotate_left<S: NodeStore + ?Sized>(&mut self, store: &mut S, x: NodeId) -> TreeResult<()> {
        self.rotate(store, x, Side::Left)
    }

    #[inline]
    pub fn rotate_right<S: NodeStore + ?Sized>(
        &mut self,
        store: &mut S,
        x: NodeId,
    ) -> TreeResult<()> {
        self.rotate(store, x, Side::Right)
    }
}
