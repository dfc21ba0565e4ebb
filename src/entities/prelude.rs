pub use super::audit_logs::Entity as AuditLogs;
pub use super::file_entries::Entity as FileEntries;
pub use super::file_entry_models::Entity as FileEntryModels;
pub use super::notifications::Entity as Notifications;
pub use super::share_jobs::Entity as ShareJobs;
pub use super::shareable_links::Entity as ShareableLinks;
pub use super::transactions::Entity as Transactions;
pub use super::users::Entity as Users;
