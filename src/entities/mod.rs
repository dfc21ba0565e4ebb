pub mod prelude;

pub mod audit_logs;
pub mod file_entries;
pub mod file_entry_models;
pub mod notifications;
pub mod share_jobs;
pub mod shareable_links;
pub mod transactions;
pub mod users;
