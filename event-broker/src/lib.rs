//! # event-broker
//!
//! Topic-keyed publish/subscribe used to fan device state changes out to
//! interested consumers. Topics are plain strings (a device id, an entity
//! UUID); each subscriber gets its own bounded queue and receives messages
//! for its topic in publish order.
//!
//! The broker is generic over the message type so that each protocol client
//! can publish its own typed events without the broker knowing about either
//! protocol.

mod broker;

pub use broker::{Broker, Subscription, DEFAULT_QUEUE_CAPACITY};
