pub mod layout;
pub mod segment;
pub mod manifest;
pub mod marker;
pub mod file_lock;
pub mod merge_policy;
