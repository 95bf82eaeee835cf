//! Scheduling core: due-time storage, delivery-window gating, reminder
//! grouping, delivery tracking with cool-down suppression, missed-reminder
//! recovery, and subscriber status management.

pub mod grouper;
pub mod processor;
pub mod recovery;
pub mod resolver;
pub mod status;
pub mod store;
pub mod tracker;
