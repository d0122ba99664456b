pub mod app_context;
pub mod cli;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod retry;
pub mod task_manager;
