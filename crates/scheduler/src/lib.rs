//! Process hosting for the reminder core: one cancellable periodic ticker
//! per active subscriber, a slower independent recovery loop, and the
//! activation/deactivation flow the (external) conversational frontend
//! drives through `registry::TickerRegistry`.

pub mod registry;
pub mod ticker;
