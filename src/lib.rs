pub mod alerts;
pub mod api_router;
pub mod auth;
pub mod comments;
pub mod config;
pub mod directory;
pub mod insights;
pub mod leads;
pub mod notifications;
pub mod orders;
pub mod scope;
pub mod shared;
