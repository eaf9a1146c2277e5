/*!
 * Intrusive Red-Black Tree
 *
 * Ordered index over nodes whose link fields are embedded in records owned
 * by someone else (the process table). The tree never allocates or frees:
 * it only rewires `RbLinks` reached through a `NodeStore`.
 *
 * Nodes are addressed by `NodeId` handles. The sentinel is the `None` link:
 * it is always BLACK and nothing is ever written through it.
 */

mod delete;
mod insert;
mod query;
mod rotate;
mod verify;

use crate::core::types::VRuntime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use query::InOrder;
pub use verify::Violation;

/// Node color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Black,
}

/// Child direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    #[inline(always)]
    pub const fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Stable handle to a node slot
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    #[inline(always)]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A child or parent reference; `None` is the sentinel
pub type Link = Option<NodeId>;

/// Link fields embedded in every record that can join a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbLinks {
    parent: Link,
    left: Link,
    right: Link,
    color: Color,
    linked: bool,
}

impl Default for RbLinks {
    fn default() -> Self {
        Self {
            parent: None,
            left: None,
            right: None,
            color: Color::Black,
            linked: false,
        }
    }
}

impl RbLinks {
    /// Whether the owning record is currently a tree member
    #[inline(always)]
    pub const fn is_linked(&self) -> bool {
        self.linked
    }

    #[inline(always)]
    pub const fn color(&self) -> Color {
        self.color
    }

    #[inline(always)]
    pub const fn parent(&self) -> Link {
        self.parent
    }

    /// Forget all structure; used when a slot is recycled
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline(always)]
    fn child(&self, side: Side) -> Link {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    #[inline(always)]
    fn child_mut(&mut self, side: Side) -> &mut Link {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Storage that owns the records the tree threads through
///
/// Implementors hand out the embedded `RbLinks` of a record and its key.
/// A record's key must not change while it is linked.
pub trait NodeStore {
    fn links(&self, id: NodeId) -> &RbLinks;
    fn links_mut(&mut self, id: NodeId) -> &mut RbLinks;
    fn key(&self, id: NodeId) -> VRuntime;
}

/// Structural contract violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} is already linked")]
    AlreadyLinked(NodeId),

    #[error("node {0} is not linked")]
    NotLinked(NodeId),

    #[error("node {node} has no {side:?} child to rotate")]
    MissingChild { node: NodeId, side: Side },

    #[error("node {0} lost its parent link")]
    Detached(NodeId),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Tree root object: one per scheduling domain
#[derive(Debug, Default, Clone)]
pub struct RbTree {
    root: Link,
    len: usize,
}

impl RbTree {
    /// Empty tree
    pub const fn new() -> Self {
        Self { root: None, len: 0 }
    }

    #[inline(always)]
    pub const fn root(&self) -> Link {
        self.root
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Point `parent`'s reference to `old` at `new`, or the root if `parent` is the sentinel
    fn replace_child<S: NodeStore + ?Sized>(
        &mut self,
        store: &mut S,
        parent: Link,
        old: NodeId,
        new: Link,
    ) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let links = store.links_mut(p);
                if links.left == Some(old) {
                    links.left = new;
                } else {
                    links.right = new;
                }
            }
        }
    }
}

// Field access shared by the algorithm files

#[inline(always)]
fn parent_of<S: NodeStore + ?Sized>(store: &S, id: NodeId) -> Link {
    store.links(id).parent
}

#[inline(always)]
fn child_of<S: NodeStore + ?Sized>(store: &S, id: NodeId, side: Side) -> Link {
    store.links(id).child(side)
}

#[inline(always)]
fn color_of<S: NodeStore + ?Sized>(store: &S, link: Link) -> Color {
    link.map_or(Color::Black, |id| store.links(id).color)
}

#[inline(always)]
fn is_red<S: NodeStore + ?Sized>(store: &S, link: Link) -> bool {
    color_of(store, link) == Color::Red
}

#[inline(always)]
fn set_color<S: NodeStore + ?Sized>(store: &mut S, id: NodeId, color: Color) {
    store.links_mut(id).color = color;
}

/// Which side of its parent `id` hangs on
#[inline(always)]
fn side_of<S: NodeStore + ?Sized>(store: &S, parent: NodeId, id: Link) -> Side {
    if store.links(parent).left == id {
        Side::Left
    } else {
        Side::Right
    }
}
