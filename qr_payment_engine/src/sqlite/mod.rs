mod sqlite_impl;

pub mod db;

pub use sqlite_impl::SqliteLedger;
