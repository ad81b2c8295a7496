use crate::common::{VoteError, Result};
use crate::common::config::default_election_name;
use crate::core::embedding::Embedding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub party: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    pub id: String,
    pub name: String,
    pub email: String,
    pub embedding: Embedding,
    pub has_voted: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub voter_id: String,
    pub candidate_id: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque confirmation token from an external recorder, never validated here
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub id: String,
    pub name: String,
    pub party: String,
    pub vote_count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub registered: usize,
    pub voted: usize,
    pub remaining: usize,
}

/// What a candidate removal took with it.
#[derive(Debug, Clone)]
pub struct RemovedCandidate {
    pub candidate: Candidate,
    pub removed_votes: Vec<Vote>,
    /// Voters whose only vote went to the removed candidate and who may vote again
    pub reverted_voters: Vec<String>,
}

/// Serializable state of a ledger. Everything a store needs to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub election_name: String,
    pub candidates: Vec<Candidate>,
    pub voters: Vec<Voter>,
    pub votes: Vec<Vote>,
    pub next_candidate: u64,
    pub next_voter: u64,
    pub next_vote: u64,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            election_name: default_election_name(),
            candidates: Vec::new(),
            voters: Vec::new(),
            votes: Vec::new(),
            next_candidate: 1,
            next_voter: 1,
            next_vote: 1,
        }
    }
}

/// Authoritative record of candidates, voters and votes.
///
/// All operations take `&self`; mutations hold the write lock for their whole
/// check-then-act region, so a shared `Arc<VotingLedger>` never records two
/// votes for one voter.
#[derive(Debug, Default)]
pub struct VotingLedger {
    state: RwLock<LedgerSnapshot>,
}

impl VotingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted state, refusing snapshots that break an invariant.
    pub fn from_snapshot(mut snapshot: LedgerSnapshot) -> Result<Self> {
        if snapshot.version > LEDGER_VERSION {
            return Err(VoteError::Storage(format!(
                "Ledger version {} is newer than supported version {}",
                snapshot.version, LEDGER_VERSION
            )));
        }
        // Older layouts are field-compatible
        snapshot.version = LEDGER_VERSION;

        check_invariants(&snapshot).map_err(VoteError::Storage)?;

        // Never hand out an id that is already taken
        snapshot.next_candidate = snapshot.next_candidate
            .max(following(max_sequence(snapshot.candidates.iter().map(|c| c.id.as_str()), ""), "candidate")?);
        snapshot.next_voter = snapshot.next_voter
            .max(following(max_sequence(snapshot.voters.iter().map(|v| v.id.as_str()), "v"), "voter")?);
        snapshot.next_vote = snapshot.next_vote
            .max(following(max_sequence(snapshot.votes.iter().map(|v| v.id.as_str()), "b"), "vote")?);

        Ok(Self { state: RwLock::new(snapshot) })
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerSnapshot>> {
        self.state
            .read()
            .map_err(|e| VoteError::Storage(format!("Ledger lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerSnapshot>> {
        self.state
            .write()
            .map_err(|e| VoteError::Storage(format!("Ledger lock poisoned: {}", e)))
    }

    pub fn election_name(&self) -> Result<String> {
        Ok(self.read()?.election_name.clone())
    }

    pub fn set_election_name(&self, name: &str) -> Result<()> {
        let name = require("election name", name)?;
        self.write()?.election_name = name;
        Ok(())
    }

    pub fn add_candidate(&self, name: &str, party: &str) -> Result<Candidate> {
        let name = require("candidate name", name)?;
        let party = require("party", party)?;

        let mut state = self.write()?;
        let candidate = Candidate {
            id: take_id(&mut state.next_candidate, "candidate")?.to_string(),
            name,
            party,
            vote_count: 0,
        };
        state.candidates.push(candidate.clone());

        tracing::info!("Added candidate {} ({}, {})", candidate.id, candidate.name, candidate.party);
        Ok(candidate)
    }

    /// Remove a candidate together with every vote cast for them.
    ///
    /// Voters who had voted for the candidate go back to not having voted.
    /// This is the only way a voter can vote a second time.
    pub fn remove_candidate(&self, id: &str) -> Result<RemovedCandidate> {
        let mut state = self.write()?;

        let position = state.candidates
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| VoteError::NotFound(format!("candidate {}", id)))?;
        let candidate = state.candidates.remove(position);

        let (removed_votes, kept): (Vec<Vote>, Vec<Vote>) = std::mem::take(&mut state.votes)
            .into_iter()
            .partition(|vote| vote.candidate_id == id);
        state.votes = kept;

        let reverted: HashSet<&str> = removed_votes.iter().map(|v| v.voter_id.as_str()).collect();
        let mut reverted_voters = Vec::new();
        for voter in state.voters.iter_mut() {
            if reverted.contains(voter.id.as_str()) {
                voter.has_voted = false;
                reverted_voters.push(voter.id.clone());
            }
        }

        tracing::info!("Removed candidate {} with {} vote(s); {} voter(s) may vote again",
                       candidate.id, removed_votes.len(), reverted_voters.len());

        Ok(RemovedCandidate { candidate, removed_votes, reverted_voters })
    }

    pub fn register_voter(&self, name: &str, email: &str, embedding: Embedding) -> Result<Voter> {
        let name = require("voter name", name)?;
        let email = require("email", email)?;

        if embedding.is_empty() {
            return Err(VoteError::Validation("embedding must not be empty".into()));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(VoteError::Validation("embedding contains non-finite values".into()));
        }

        let mut state = self.write()?;

        if let Some(existing) = state.voters.first() {
            if existing.embedding.len() != embedding.len() {
                return Err(VoteError::Validation(format!(
                    "embedding length {} does not match registered length {}",
                    embedding.len(), existing.embedding.len()
                )));
            }
        }
        if state.voters.iter().any(|v| v.email.eq_ignore_ascii_case(&email)) {
            return Err(VoteError::Validation(format!("email {} is already registered", email)));
        }

        let voter = Voter {
            id: format!("v{}", take_id(&mut state.next_voter, "voter")?),
            name,
            email,
            embedding,
            has_voted: false,
            registered_at: Utc::now(),
        };
        state.voters.push(voter.clone());

        tracing::info!("Registered voter {} ({})", voter.id, voter.name);
        Ok(voter)
    }

    /// Remove a voter and any vote they cast.
    pub fn remove_voter(&self, id: &str) -> Result<Voter> {
        let mut state = self.write()?;

        let position = state.voters
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| VoteError::NotFound(format!("voter {}", id)))?;
        let voter = state.voters.remove(position);

        if let Some(vote_position) = state.votes.iter().position(|v| v.voter_id == id) {
            let vote = state.votes.remove(vote_position);
            if let Some(candidate) = state.candidates.iter_mut().find(|c| c.id == vote.candidate_id) {
                candidate.vote_count -= 1;
            }
        }

        tracing::info!("Removed voter {}", voter.id);
        Ok(voter)
    }

    /// Record a vote. Fails with `AlreadyVoted` if the voter already has one.
    pub fn cast_vote(&self, voter_id: &str, candidate_id: &str) -> Result<Vote> {
        let mut state = self.write()?;
        let state = &mut *state;

        let voter = state.voters
            .iter_mut()
            .find(|v| v.id == voter_id)
            .ok_or_else(|| VoteError::NotFound(format!("voter {}", voter_id)))?;
        let candidate = state.candidates
            .iter_mut()
            .find(|c| c.id == candidate_id)
            .ok_or_else(|| VoteError::NotFound(format!("candidate {}", candidate_id)))?;

        if voter.has_voted {
            tracing::warn!("Rejected second vote from voter {}", voter_id);
            return Err(VoteError::AlreadyVoted(voter_id.to_string()));
        }

        let vote = Vote {
            id: format!("b{}", take_id(&mut state.next_vote, "vote")?),
            voter_id: voter.id.clone(),
            candidate_id: candidate.id.clone(),
            timestamp: Utc::now(),
            receipt: None,
        };

        voter.has_voted = true;
        candidate.vote_count += 1;
        state.votes.push(vote.clone());

        tracing::info!("Voter {} cast vote {} for candidate {}", vote.voter_id, vote.id, vote.candidate_id);
        Ok(vote)
    }

    /// Store an external confirmation token on a vote. A vote takes at most one receipt.
    pub fn attach_receipt(&self, vote_id: &str, token: &str) -> Result<Vote> {
        let token = require("receipt token", token)?;
        let mut state = self.write()?;

        let vote = state.votes
            .iter_mut()
            .find(|v| v.id == vote_id)
            .ok_or_else(|| VoteError::NotFound(format!("vote {}", vote_id)))?;

        if vote.receipt.is_some() {
            return Err(VoteError::Validation(format!("vote {} already has a receipt", vote_id)));
        }
        vote.receipt = Some(token);

        Ok(vote.clone())
    }

    pub fn get_results(&self) -> Result<Vec<CandidateResult>> {
        let state = self.read()?;
        let total: u64 = state.candidates.iter().map(|c| c.vote_count).sum();

        Ok(state.candidates
            .iter()
            .map(|c| CandidateResult {
                id: c.id.clone(),
                name: c.name.clone(),
                party: c.party.clone(),
                vote_count: c.vote_count,
                percentage: if total == 0 {
                    0.0
                } else {
                    c.vote_count as f64 / total as f64 * 100.0
                },
            })
            .collect())
    }

    pub fn get_total_votes(&self) -> Result<u64> {
        Ok(self.read()?.candidates.iter().map(|c| c.vote_count).sum())
    }

    /// Candidate with the most votes; the earliest added wins a tie.
    pub fn leader(&self) -> Result<Option<CandidateResult>> {
        let mut leader: Option<CandidateResult> = None;
        for result in self.get_results()? {
            if result.vote_count == 0 {
                continue;
            }
            if leader.as_ref().map_or(true, |best| result.vote_count > best.vote_count) {
                leader = Some(result);
            }
        }
        Ok(leader)
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let state = self.read()?;
        let registered = state.voters.len();
        let voted = state.voters.iter().filter(|v| v.has_voted).count();

        Ok(LedgerStats { registered, voted, remaining: registered - voted })
    }

    /// `(voter id, embedding)` pairs in registration order.
    pub fn gallery(&self) -> Result<Vec<(String, Embedding)>> {
        Ok(self.read()?
            .voters
            .iter()
            .map(|v| (v.id.clone(), v.embedding.clone()))
            .collect())
    }

    pub fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.read()?.candidates.clone())
    }

    pub fn candidate(&self, id: &str) -> Result<Candidate> {
        self.read()?
            .candidates
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| VoteError::NotFound(format!("candidate {}", id)))
    }

    pub fn voters(&self) -> Result<Vec<Voter>> {
        Ok(self.read()?.voters.clone())
    }

    pub fn voter(&self, id: &str) -> Result<Voter> {
        self.read()?
            .voters
            .iter()
            .find(|v| v.id == id)
            .cloned()
            .ok_or_else(|| VoteError::NotFound(format!("voter {}", id)))
    }

    pub fn has_voted(&self, voter_id: &str) -> Result<bool> {
        Ok(self.voter(voter_id)?.has_voted)
    }

    pub fn votes(&self) -> Result<Vec<Vote>> {
        Ok(self.read()?.votes.clone())
    }

    /// Drop all candidates, voters and votes. Id counters keep running.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.candidates.clear();
        state.voters.clear();
        state.votes.clear();

        tracing::info!("Cleared ledger for {}", state.election_name);
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(VoteError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

fn max_sequence<'a>(ids: impl Iterator<Item = &'a str>, prefix: &str) -> u64 {
    ids.filter_map(|id| id.strip_prefix(prefix)?.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn following(sequence: u64, kind: &str) -> Result<u64> {
    sequence.checked_add(1)
        .ok_or_else(|| VoteError::Storage(format!("{} id counter exhausted", kind)))
}

/// Hand out the counter's current value and advance it.
fn take_id(counter: &mut u64, kind: &str) -> Result<u64> {
    let id = *counter;
    *counter = following(id, kind)?;
    Ok(id)
}

fn check_invariants(snapshot: &LedgerSnapshot) -> std::result::Result<(), String> {
    let mut candidate_votes: HashMap<&str, u64> = HashMap::new();
    for candidate in &snapshot.candidates {
        if candidate_votes.insert(candidate.id.as_str(), 0).is_some() {
            return Err(format!("duplicate candidate id {}", candidate.id));
        }
    }

    let mut voters = HashSet::new();
    for voter in &snapshot.voters {
        if !voters.insert(voter.id.as_str()) {
            return Err(format!("duplicate voter id {}", voter.id));
        }
    }

    if let Some(first) = snapshot.voters.first() {
        if snapshot.voters.iter().any(|v| v.embedding.len() != first.embedding.len()) {
            return Err("voters have embeddings of different lengths".into());
        }
    }

    let mut vote_ids = HashSet::new();
    let mut voted = HashSet::new();
    for vote in &snapshot.votes {
        if !vote_ids.insert(vote.id.as_str()) {
            return Err(format!("duplicate vote id {}", vote.id));
        }
        if !voters.contains(vote.voter_id.as_str()) {
            return Err(format!("vote {} references unknown voter {}", vote.id, vote.voter_id));
        }
        if !voted.insert(vote.voter_id.as_str()) {
            return Err(format!("voter {} has more than one vote", vote.voter_id));
        }
        match candidate_votes.get_mut(vote.candidate_id.as_str()) {
            Some(count) => *count += 1,
            None => return Err(format!(
                "vote {} references unknown candidate {}", vote.id, vote.candidate_id
            )),
        }
    }

    for candidate in &snapshot.candidates {
        let counted = candidate_votes[candidate.id.as_str()];
        if candidate.vote_count != counted {
            return Err(format!(
                "candidate {} tally {} does not match {} recorded vote(s)",
                candidate.id, candidate.vote_count, counted
            ));
        }
    }

    for voter in &snapshot.voters {
        if voter.has_voted != voted.contains(voter.id.as_str()) {
            return Err(format!("voter {} voting flag disagrees with recorded votes", voter.id));
        }
    }

    Ok(())
}
