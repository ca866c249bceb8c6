//! CLI command implementations.

mod ask;
mod config;
mod courses;
mod ingest;
mod list;
mod search;
mod serve;
mod status;

pub use ask::run_ask;
pub use config::run_config;
pub use courses::run_courses;
pub use ingest::run_ingest;
pub use list::run_list;
pub use search::run_search;
pub use serve::{router, run_serve};
pub use status::run_status;
