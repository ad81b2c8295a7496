use serde::{Deserialize, Serialize};

/// Result of a successful gallery search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub identity: String,
    pub similarity: f32,
}

/// Nearest-neighbour search over registered embeddings with a fixed acceptance threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f32,
}

impl SimilarityMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best gallery entry scoring at or above the threshold.
    ///
    /// Entries whose length differs from the query are skipped, and a zero
    /// vector on either side never matches. On equal scores the entry seen
    /// first wins, so gallery order decides ties.
    pub fn best_match<'a, I>(&self, query: &[f32], gallery: I) -> Option<Match>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        if is_zero(query) {
            return None;
        }

        let mut best: Option<(&str, f32)> = None;

        for (identity, stored) in gallery {
            if stored.len() != query.len() {
                tracing::debug!("Skipping {}: embedding length {} != {}",
                                identity, stored.len(), query.len());
                continue;
            }
            if is_zero(stored) {
                continue;
            }

            let similarity = cosine_similarity(query, stored);
            if best.map_or(true, |(_, score)| similarity > score) {
                best = Some((identity, similarity));
            }
        }

        let (identity, similarity) = best?;
        tracing::debug!("Best match {} with similarity {:.3} (threshold {:.3})",
                        identity, similarity, self.threshold);

        if similarity >= self.threshold {
            Some(Match { identity: identity.to_string(), similarity })
        } else {
            None
        }
    }

    /// Whether the query already belongs to someone in the gallery.
    ///
    /// Same threshold and tie-break as [`best_match`](Self::best_match); there is
    /// no separate duplicate threshold.
    pub fn find_duplicate<'a, I>(&self, query: &[f32], gallery: I) -> Option<Match>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        self.best_match(query, gallery)
    }

    /// Every comparable entry with its score, best first. Equal scores keep gallery order.
    pub fn rank<'a, I>(&self, query: &[f32], gallery: I) -> Vec<Match>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let mut scores: Vec<Match> = gallery
            .into_iter()
            .filter(|(_, stored)| stored.len() == query.len())
            .map(|(identity, stored)| Match {
                identity: identity.to_string(),
                similarity: cosine_similarity(query, stored),
            })
            .collect();

        scores.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scores
    }
}

fn is_zero(values: &[f32]) -> bool {
    values.iter().all(|v| *v == 0.0)
}

/// Cosine of the angle between two vectors; 0.0 for mismatched lengths or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
