pub mod fields;
pub mod posting;
pub mod searcher;
pub mod native;
pub mod case_insensitive;
pub mod matcher;
pub mod builder;
