// Core modules
pub mod core;
pub mod storage;
pub mod service;
pub mod common;

// Re-export commonly used types
pub use crate::common::{Config, DevMode, VoteError, Result};
pub use crate::core::{
    AuthOutcome, Embedding, EmbeddingExtractor, Match, SimilarityMatcher, VoterSession,
    VotingBooth, cosine_similarity,
};
pub use crate::storage::{
    Candidate, CandidateResult, LedgerStats, LedgerStore, Vote, Voter, VotingLedger,
};
pub use crate::service::{
    AdminAuthenticator, EmbeddingSource, Frame, HmacAdminAuthenticator, ReceiptService,
    SourceOutcome,
};

pub mod config {
    pub use crate::common::config::*;
}
pub mod error {
    pub use crate::common::error::*;
}
