pub mod booth;
pub mod embedding;
pub mod matcher;

pub use booth::{AuthOutcome, VoterSession, VotingBooth};
pub use embedding::{Embedding, EmbeddingExtractor, l2_normalize};
pub use matcher::{Match, SimilarityMatcher, cosine_similarity};
