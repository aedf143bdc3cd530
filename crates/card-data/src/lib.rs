mod catalog;
mod index;
pub mod names;

pub use catalog::{Catalog, CatalogEntry, Supertype};
pub use index::{build_indexes, is_secret_rare, KeywordIndex, NameIndex};
pub use names::{matching_form, parse_leading_int};
