use std::collections::HashMap;
use uuid::Uuid;

const K1: f32 = 1.2;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.len() > 1)
        .collect()
}

/// BM25-scored inverted index over one tenant's semantic facts.
///
/// The semantic layer is searched by relevance, not exact key match: a
/// worker asking "does this counterparty prefer mornings?" should surface
/// the fact written weeks earlier as "prefers morning slots". One index
/// exists per `org_id`, so a query can never cross tenants.
#[derive(Debug, Clone, Default)]
pub struct FactIndex {
    /// term -> (record id -> term frequency)
    postings: HashMap<String, HashMap<Uuid, f32>>,
    /// record id -> token count
    lengths: HashMap<Uuid, f32>,
    avg_length: f32,
}

impl FactIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of facts currently indexed.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Whether the index holds no facts.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Indexes a fact's text under the given record id.
    ///
    /// Re-adding an existing id replaces its previous postings.
    pub fn add(&mut self, id: Uuid, text: &str) {
        if self.lengths.contains_key(&id) {
            self.remove(id);
        }

        let tokens = tokenize(text);
        let mut freqs: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *freqs.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for (term, tf) in freqs {
            self.postings.entry(term).or_default().insert(id, tf);
        }
        self.lengths.insert(id, tokens.len() as f32);
        self.recompute_avg();
    }

    /// Drops a fact from the index (expiry, deletion).
    pub fn remove(&mut self, id: Uuid) {
        if self.lengths.remove(&id).is_none() {
            return;
        }
        self.postings.retain(|_, docs| {
            docs.remove(&id);
            !docs.is_empty()
        });
        self.recompute_avg();
    }

    /// Scores all indexed facts against the query and returns up to `top_k`
    /// `(record id, score)` pairs, best first.
    ///
    /// Standard BM25 with Robertson's non-negative IDF.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(Uuid, f32)> {
        if self.lengths.is_empty() {
            return Vec::new();
        }
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let n = self.lengths.len() as f32;
        let avgdl = if self.avg_length > 0.0 { self.avg_length } else { 1.0 };
        let mut scores: HashMap<Uuid, f32> = HashMap::new();

        for term in &terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (&id, &tf) in docs {
                let dl = self.lengths.get(&id).copied().unwrap_or(0.0);
                let score = idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                *scores.entry(id).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(Uuid, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
    }

    fn recompute_avg(&mut self) {
        if self.lengths.is_empty() {
            self.avg_length = 0.0;
        } else {
            self.avg_length = self.lengths.values().sum::<f32>() / self.lengths.len() as f32;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_by_relevance() {
        let mut index = FactIndex::new();
        let morning = Uuid::new_v4();
        let budget = Uuid::new_v4();
        index.add(morning, "counterparty prefers morning slots before 10am");
        index.add(budget, "budget capped at 500 for repair work");

        let results = index.search("morning availability", 5);
        assert!(!results.is_empty());
        assert_eq!(results[0].0, morning);
    }

    #[test]
    fn test_repeated_terms_rank_higher() {
        let mut index = FactIndex::new();
        let hvac = Uuid::new_v4();
        let misc = Uuid::new_v4();
        index.add(hvac, "hvac repair hvac maintenance hvac unit replaced");
        index.add(misc, "one hvac visit plus unrelated plumbing notes here");

        let results = index.search("hvac", 5);
        assert_eq!(results[0].0, hvac);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let mut index = FactIndex::new();
        index.add(Uuid::new_v4(), "invoice paid in full on first notice");
        assert!(index.search("garden landscaping", 5).is_empty());
    }

    #[test]
    fn test_remove_drops_fact() {
        let mut index = FactIndex::new();
        let id = Uuid::new_v4();
        index.add(id, "prefers text message over email");
        assert_eq!(index.len(), 1);

        index.remove(id);
        assert!(index.is_empty());
        assert!(index.search("text message", 5).is_empty());
    }

    #[test]
    fn test_re_add_replaces_postings() {
        let mut index = FactIndex::new();
        let id = Uuid::new_v4();
        index.add(id, "prefers morning slots");
        index.add(id, "now prefers evening slots only");

        assert_eq!(index.len(), 1);
        let results = index.search("morning", 5);
        assert!(results.is_empty(), "stale tokens should be gone");
        assert!(!index.search("evening", 5).is_empty());
    }

    #[test]
    fn test_empty_query_and_empty_index() {
        let index = FactIndex::new();
        assert!(index.search("anything", 5).is_empty());

        let mut index = FactIndex::new();
        index.add(Uuid::new_v4(), "some fact");
        assert!(index.search("", 5).is_empty());
    }
}
