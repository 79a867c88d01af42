pub mod filter;
pub mod git;
pub mod ledger;
pub mod observer;
pub mod oracle;
pub mod orchestrator;
pub mod registry;
pub mod sink;
pub mod stability;
pub mod tracker;
