use crate::{
    common::{Config, VoteError, Result},
    common::config::MatcherConfig,
    core::{
        embedding::EmbeddingExtractor,
        matcher::{Match, SimilarityMatcher},
    },
    service::{EmbeddingSource, Frame, LocalEmbeddingSource, NoReceipts, ReceiptService, SourceOutcome},
    storage::{Vote, Voter, VotingLedger},
};
use std::sync::Arc;

/// Identity bound to a face that passed the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct VoterSession {
    pub voter_id: String,
    pub name: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated(VoterSession),
    NoMatch,
    /// The embedding source could not process the frame
    Unavailable(String),
}

/// Registration, face authentication and vote casting over one shared ledger.
pub struct VotingBooth {
    ledger: Arc<VotingLedger>,
    source: Box<dyn EmbeddingSource>,
    receipts: Box<dyn ReceiptService>,
    matcher: SimilarityMatcher,
    reject_duplicate_faces: bool,
}

impl VotingBooth {
    pub fn new(ledger: Arc<VotingLedger>, source: Box<dyn EmbeddingSource>, matcher: &MatcherConfig) -> Self {
        Self {
            ledger,
            source,
            receipts: Box::new(NoReceipts),
            matcher: SimilarityMatcher::new(matcher.similarity_threshold),
            reject_duplicate_faces: matcher.reject_duplicate_faces,
        }
    }

    /// Booth using the local pixel-statistics extractor.
    pub fn from_config(config: &Config, ledger: Arc<VotingLedger>) -> Self {
        let source = LocalEmbeddingSource::new(EmbeddingExtractor::new(&config.embedding));
        Self::new(ledger, Box::new(source), &config.matcher)
    }

    pub fn with_receipts(mut self, receipts: Box<dyn ReceiptService>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn ledger(&self) -> &Arc<VotingLedger> {
        &self.ledger
    }

    pub fn enroll(&self, name: &str, email: &str, frame: &Frame) -> Result<Voter> {
        let embedding = match self.source.embed(frame) {
            SourceOutcome::Ready(embedding) => embedding,
            SourceOutcome::Unavailable(reason) => {
                return Err(VoteError::Validation(format!("could not capture face: {}", reason)));
            }
        };

        if self.reject_duplicate_faces {
            let gallery = self.ledger.gallery()?;
            let entries = gallery.iter().map(|(id, e)| (id.as_str(), e.as_slice()));
            if let Some(existing) = self.matcher.find_duplicate(&embedding, entries) {
                tracing::warn!("Enrollment of {} rejected: face matches voter {} ({:.3})",
                               name, existing.identity, existing.similarity);
                return Err(VoteError::Validation(format!(
                    "face is already registered to voter {}", existing.identity
                )));
            }
        }

        self.ledger.register_voter(name, email, embedding)
    }

    /// Match a frame against every registered voter.
    pub fn authenticate(&self, frame: &Frame) -> Result<AuthOutcome> {
        let embedding = match self.source.embed(frame) {
            SourceOutcome::Ready(embedding) => embedding,
            SourceOutcome::Unavailable(reason) => {
                tracing::warn!("Embedding source unavailable: {}", reason);
                return Ok(AuthOutcome::Unavailable(reason));
            }
        };

        let gallery = self.ledger.gallery()?;
        let entries = gallery.iter().map(|(id, e)| (id.as_str(), e.as_slice()));

        let Some(found) = self.matcher.best_match(&embedding, entries) else {
            tracing::info!("Authentication failed: no voter above threshold {:.2}", self.matcher.threshold());
            return Ok(AuthOutcome::NoMatch);
        };

        let voter = self.ledger.voter(&found.identity)?;
        tracing::info!("Authenticated voter {} (similarity {:.3})", voter.id, found.similarity);

        Ok(AuthOutcome::Authenticated(VoterSession {
            voter_id: voter.id,
            name: voter.name,
            similarity: found.similarity,
        }))
    }

    /// Similarity of a frame to every registered voter, best first.
    pub fn scores(&self, frame: &Frame) -> Result<Vec<Match>> {
        let SourceOutcome::Ready(embedding) = self.source.embed(frame) else {
            return Ok(Vec::new());
        };

        let gallery = self.ledger.gallery()?;
        Ok(self.matcher.rank(&embedding, gallery.iter().map(|(id, e)| (id.as_str(), e.as_slice()))))
    }

    /// Cast the session's vote, then ask the receipt service for a confirmation token.
    ///
    /// The vote stands whether or not a receipt can be obtained.
    pub fn cast(&self, session: &VoterSession, candidate_id: &str) -> Result<Vote> {
        let vote = self.ledger.cast_vote(&session.voter_id, candidate_id)?;

        match self.receipts.record(&vote) {
            SourceOutcome::Ready(token) => self.ledger.attach_receipt(&vote.id, &token),
            SourceOutcome::Unavailable(reason) => {
                tracing::debug!("No receipt for vote {}: {}", vote.id, reason);
                Ok(vote)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Maps the first pixel byte to a one-hot embedding; empty frames are unavailable.
    struct OneHotSource;

    impl EmbeddingSource for OneHotSource {
        fn embed(&self, frame: &Frame) -> SourceOutcome<Vec<f32>> {
            match frame.pixels.first() {
                Some(b) => {
                    let mut e = vec![0.0; 4];
                    e[*b as usize % 4] = 1.0;
                    SourceOutcome::Ready(e)
                }
                None => SourceOutcome::Unavailable("camera unavailable".into()),
            }
        }

        fn dimensions(&self) -> usize {
            4
        }
    }

    struct CountingReceipts;

    impl ReceiptService for CountingReceipts {
        fn record(&self, vote: &Vote) -> SourceOutcome<String> {
            SourceOutcome::Ready(format!("receipt-{}", vote.id))
        }
    }

    fn frame(first: u8) -> Frame {
        Frame { width: 1, height: 1, pixels: vec![first, 0, 0, 255] }
    }

    fn booth(reject_duplicates: bool) -> VotingBooth {
        let ledger = Arc::new(VotingLedger::new());
        ledger.add_candidate("A", "Party A").unwrap();
        ledger.add_candidate("B", "Party B").unwrap();
        let matcher = MatcherConfig { similarity_threshold: 0.7, reject_duplicate_faces: reject_duplicates };
        VotingBooth::new(ledger, Box::new(OneHotSource), &matcher)
    }

    #[test]
    fn test_enroll_authenticate_cast() {
        let booth = booth(false);
        booth.enroll("alice", "alice@example.org", &frame(0)).unwrap();
        booth.enroll("bob", "bob@example.org", &frame(1)).unwrap();

        let AuthOutcome::Authenticated(session) = booth.authenticate(&frame(1)).unwrap() else {
            panic!("bob should authenticate");
        };
        assert_eq!(session.voter_id, "v2");
        assert_eq!(session.name, "bob");

        let vote = booth.cast(&session, "2").unwrap();
        assert_eq!(vote.receipt, None);
        assert!(matches!(booth.cast(&session, "1"), Err(VoteError::AlreadyVoted(_))));
        assert_eq!(booth.ledger().get_total_votes().unwrap(), 1);
    }

    #[test]
    fn test_unknown_face_no_match() {
        let booth = booth(false);
        booth.enroll("alice", "alice@example.org", &frame(0)).unwrap();
        assert_eq!(booth.authenticate(&frame(3)).unwrap(), AuthOutcome::NoMatch);

        let scores = booth.scores(&frame(3)).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].similarity, 0.0);
    }

    #[test]
    fn test_unavailable_source() {
        let booth = booth(false);
        let empty = Frame { width: 0, height: 0, pixels: vec![] };

        assert!(matches!(booth.authenticate(&empty).unwrap(), AuthOutcome::Unavailable(_)));
        assert!(matches!(booth.enroll("alice", "a@x.org", &empty), Err(VoteError::Validation(_))));
    }

    #[test]
    fn test_duplicate_face_rejected_when_enabled() {
        let strict = booth(true);
        strict.enroll("alice", "alice@example.org", &frame(0)).unwrap();
        assert!(matches!(
            strict.enroll("mallory", "mallory@example.org", &frame(4)),
            Err(VoteError::Validation(_))
        ));

        let lenient = booth(false);
        lenient.enroll("alice", "alice@example.org", &frame(0)).unwrap();
        assert!(lenient.enroll("twin", "twin@example.org", &frame(4)).is_ok());
    }

    #[test]
    fn test_receipt_attached() {
        let booth = booth(false).with_receipts(Box::new(CountingReceipts));
        booth.enroll("alice", "alice@example.org", &frame(2)).unwrap();

        let AuthOutcome::Authenticated(session) = booth.authenticate(&frame(2)).unwrap() else {
            panic!("alice should authenticate");
        };
        let vote = booth.cast(&session, "1").unwrap();
        assert_eq!(vote.receipt.as_deref(), Some("receipt-b1"));
        assert_eq!(booth.ledger().votes().unwrap()[0].receipt.as_deref(), Some("receipt-b1"));
    }
}
