//! SNMP applications (RFC 3413): command responder, command generator
//! and notification originator/receiver

pub mod generator;
pub mod notification;
pub mod responder;

pub use generator::{CommandGenerator, CommandOutcome, WalkOptions};
pub use notification::{NotificationOriginator, NotificationReceiver, ReceivedNotification};
pub use responder::CommandResponder;
