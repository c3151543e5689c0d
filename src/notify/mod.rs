// src/notify/mod.rs

//! Notifications on run completion.
//!
//! - [`recipient`] describes who wants to hear about what.
//! - [`event`] is the payload handed to deliveries.
//! - [`delivery`] is the transport seam (`NotificationDelivery`).
//! - [`trigger`] listens for terminal runs and fans out deliveries.

pub mod delivery;
pub mod event;
pub mod recipient;
pub mod trigger;

pub use delivery::{HttpDelivery, LogDelivery, NotificationDelivery};
pub use event::{EventKind, NotificationEvent};
pub use recipient::{Recipient, RecipientKind};
pub use trigger::NotificationTrigger;
