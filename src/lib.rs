pub mod config;
pub mod db;
pub mod i18n;
pub mod mail;
pub mod model;
pub mod parser;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod translation;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
