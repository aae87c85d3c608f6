pub mod builder;
pub mod chain;
pub mod error;
pub mod models;
pub mod mount;
pub mod operation;
pub mod ports;
pub mod service;
