// Signal ingestion: file store, line parser, dedup ledger
pub mod dedup;
pub mod parser;
pub mod store;

pub use dedup::DedupLedger;
pub use parser::{parse, ParseError};
pub use store::SignalStore;
