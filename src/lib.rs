pub mod config;
pub mod error;
pub mod features;
pub mod graph;
pub mod localization;
pub mod loop_closing;
pub mod maintenance;
pub mod system;
pub mod vocabulary;
