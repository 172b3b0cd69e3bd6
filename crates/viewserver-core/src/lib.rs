//! View hierarchy model for viewserver.
//!
//! This crate turns the view server's indentation-encoded `DUMP` output into an
//! arena-backed [`ViewTree`], decodes the length-prefixed property encoding, and
//! runs the derived passes (view counts, profiling ratings, filtering) over a
//! built tree. It performs no I/O.

#![deny(clippy::all)]

mod error;
mod node;
mod profile;
mod property;
mod tree;

pub use error::ParseError;
pub use node::MISCELLANEOUS_CATEGORY;
pub use node::NO_ID;
pub use node::NOT_MEASURED;
pub use node::NodeId;
pub use node::ProfileRating;
pub use node::UNSET_MARGIN;
pub use node::ViewNode;
pub use profile::RED_THRESHOLD;
pub use profile::YELLOW_THRESHOLD;
pub use profile::parse_profile_line;
pub use property::Property;
pub use property::decode_properties;
pub use tree::TreeBuilder;
pub use tree::ViewTree;
