//! Shape maps: memoized attribute-name -> storage-slot tries.
//!
//! Objects that gain the same attributes in the same order end up on the
//! same node, so a shape is compared by id and its slot layout is shared.
//! Each family keeps its nodes in an arena table; a node id is only
//! meaningful for the table that issued it. Extending an id a table never
//! issued fails with [`ShapeError::UnknownShape`] and queries on it find
//! nothing; an id that happens to be in range names an unrelated shape.
//!
//! ```text
//!        EMPTY
//!        /   \
//!      "a"   "b"
//!      /       \
//!   {a:0}     {b:0}
//!     |         |
//!    "b"       "a"
//!     |         |
//! {a:0,b:1} {b:0,a:1}
//! ```

mod caching;
mod composite;
mod map;

use std::fmt;

pub use caching::{CachingMapId, CachingMapTable};
pub use composite::{CompositeId, CompositeMapTable};
pub use map::{MapId, MapTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// value stored on the node, shared by every object using it
    Static,
    /// value stored per object at the node's index
    Dynamic,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeKind::Static => f.write_str("static"),
            AttributeKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// A name can be static or dynamic on a shape, not both.
    KindConflict { name: String, existing: AttributeKind },
    /// The id was not issued by this table.
    UnknownShape(u32),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindConflict { name, existing } => {
                write!(f, "attribute {name} is already attached as {existing}")
            }
            Self::UnknownShape(id) => write!(f, "shape {id} does not belong to this table"),
        }
    }
}

impl std::error::Error for ShapeError {}
