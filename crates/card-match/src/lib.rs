mod resolver;
mod rules;

pub use resolver::{Lookup, MatchResolver, Resolution};
pub use rules::{EdgeRule, MatchConfig, SuppressedName};
