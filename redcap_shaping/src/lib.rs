mod config;
mod table;

pub mod builder;
pub mod expand;
pub mod manual;
pub mod mapping;
pub mod merge;
pub mod pipeline;
pub mod repeat;
pub mod temporal;

pub use crate::config::*;
pub use crate::pipeline::run_plan;
pub use crate::table::{Row, Table};
