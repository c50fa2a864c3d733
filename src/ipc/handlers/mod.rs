pub mod calc;
pub mod config;
pub mod core;
pub mod grades;
pub mod records;
pub mod students;
