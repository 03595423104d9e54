pub mod ast;
pub mod fulltext;
pub mod context;
pub mod types;
pub mod validator;
pub mod planner;
pub mod optimizer;
