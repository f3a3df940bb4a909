//! Notification intent emitter.
//!
//! Events that should be notified are expanded into one
//! [`NotificationIntent`] per (channel, recipient), buffered in bounded
//! per-channel queues and handed to a [`NotificationTransport`]. Every
//! attempt, including intents dropped on queue overflow, ends up as a
//! `NotificationRecord` written through a [`RecordSink`].

pub mod contacts;
pub mod emitter;
pub mod error;
pub mod transport;
pub mod utils;


pub use contacts::{ContactResolver, StaticContacts};
pub use emitter::{
    DispatchStats, Emitter, NotificationIntent, RecordSink, CALLBACK_CHANNEL,
    DEFAULT_QUEUE_CAPACITY, OVERFLOW_DETAILS,
};
pub use error::{NotifyError, Result};
pub use transport::{LogTransport, NotificationTransport};
