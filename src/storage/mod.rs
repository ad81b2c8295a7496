pub mod ledger;
pub mod ledger_store;

pub use ledger::{
    Candidate, CandidateResult, LedgerSnapshot, LedgerStats, RemovedCandidate, Vote, Voter,
    VotingLedger,
};
pub use ledger_store::{LedgerStore, SnapshotFormat};
