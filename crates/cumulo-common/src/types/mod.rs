//! Core data model: machines, projects, usage records

pub mod machine;
pub mod project;
pub mod usage;
