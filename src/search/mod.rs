pub mod structural;
pub mod join;
pub mod results;
pub mod executor;
