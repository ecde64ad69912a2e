pub mod auth;
pub mod categories;
pub mod identity;
pub mod ingest;
pub mod init;
pub mod mailer;
pub mod normalizer;
pub mod query;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod source;
