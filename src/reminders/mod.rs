//! Reminder scheduling: when a dose is due, what happens while a reminder
//! is out, and how the answer lands back on the medicine list.

pub mod engine;
pub mod evaluator;
pub mod ledger;
pub mod response;

pub use engine::{contact_for, DeliveryStatus, EngineHandle, MedicineStatus, ReminderEngine, SkipReason, TickReport};
pub use evaluator::Trigger;
pub use ledger::{DeliveryFailure, DispatchLedger, LedgerBook, SharedLedger};
pub use response::ResponseHandler;
