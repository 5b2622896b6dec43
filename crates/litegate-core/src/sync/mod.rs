//! Chain head tracking and live distribution.
//!
//! [`BlockSync`] is the process-wide tracker: it polls the engine pool for the
//! latest masterchain head, keeps the newest snapshot readable at all times, and
//! broadcasts each advance through the [`SubscriptionRegistry`] to every live
//! subscriber. Subscribers are per-connection and strictly shorter-lived than
//! the tracker; a dropped [`Subscription`] detaches itself.

pub mod registry;
pub mod tracker;

pub use registry::{Subscription, SubscriptionRegistry};
pub use tracker::{BlockSync, HeadSource};
