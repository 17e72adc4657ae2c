#![forbid(unsafe_code)]

pub mod assemble;
pub mod cli;
pub mod download;
pub mod fetch;
pub mod formats;
pub mod http_source;
pub mod logging;
pub mod orchestrate;
pub mod queue;
pub mod resume;
pub mod store;
pub mod toc;
pub mod waiter;
