//! API endpoint handlers, one module per feature.

pub mod calls;
pub mod health;
pub mod medicines;
pub mod reminders;
pub mod settings;
