mod detection;
mod ledger;

pub use detection::{DetectionState, Phase, Transition};
pub use ledger::{LedgerEntry, ScanLedger};
