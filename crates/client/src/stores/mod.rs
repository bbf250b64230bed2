//! Shared stores for list-level application state.

pub mod scans;

pub use scans::{DashboardStats, ScanDirectory};
