pub mod check_config;
pub mod commit_context;
pub mod report;
