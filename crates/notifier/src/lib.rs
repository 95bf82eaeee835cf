//! Outbound delivery: the Telegram notification channel, reminder message
//! formatting, and the spreadsheet status ledger.

pub mod ledger;
pub mod message;
pub mod telegram;
