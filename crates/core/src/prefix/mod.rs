//! Prefix lists: their text format, where they live, how they are matched
//! and how they are edited in place.

pub mod marshal;
pub mod matcher;
pub mod modifier;
pub mod source;

pub use marshal::TextMarshaller;
pub use matcher::{ParentTree, PathMatcher};
pub use modifier::ListModifier;
pub use source::{ArrayListPrefixSource, FilePrefixSource, PrefixSource};
