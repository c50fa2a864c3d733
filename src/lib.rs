pub mod calc;
pub mod capture;
pub mod category_model;
pub mod config;
pub mod db;
pub mod identity;
pub mod ipc;
pub mod records;
pub mod units;
