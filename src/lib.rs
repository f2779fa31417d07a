pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod locate;
pub mod logging;
pub mod matcher;
pub mod mediator;
pub mod model;
pub mod parsers;
pub mod paths;
pub mod report;
pub mod view;
pub mod watch;
