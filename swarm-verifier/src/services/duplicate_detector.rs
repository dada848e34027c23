//! Duplicate Detector
//!
//! Several extractions from the same thread can describe the same forecast;
//! only one of them should be judged. Two predictions are duplicates when both
//! their target slices and their timeframe slices cover (nearly) the same
//! characters of the same tweets.
//!
//! **Algorithm:**
//! 1. Group each prediction's slices by tweet id
//! 2. Per tweet, sort ranges by start and merge overlapping or adjacent ones
//!    (gap of at most one character)
//! 3. `coverage(A→B)` = characters of A's merged ranges that intersect B's
//!    merged ranges on the same tweet, divided by A's total merged length
//! 4. Score = `min(coverage(A→B), coverage(B→A))`
//! 5. Duplicate iff target score and timeframe score both reach their thresholds
//! 6. Union every duplicate pair among the thread's predictions; the smallest
//!    id in a cluster is its canonical member
//!
//! Taking the minimum rather than the average means a padded extraction that
//! strictly contains a precise one is not a duplicate of it in either
//! direction. Choosing the smallest id makes the canonical choice independent
//! of comparison order, so concurrent workers agree without coordinating.

use std::collections::{BTreeMap, HashMap};

use swarm_common::models::{ParsedPrediction, PostSlice};

use crate::store::DuplicateRelation;

/// Default minimum bidirectional score for target and timeframe slices
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.96;

/// Half-open character range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intersection_len(&self, other: &Range) -> i64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0)
    }
}

/// Sort ranges by start and merge those that overlap or sit at most one
/// character apart
///
/// Empty and inverted ranges carry no characters and are dropped.
pub fn merge_ranges(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for current in ranges {
        match merged.last_mut() {
            Some(last) if current.start <= last.end + 1 => {
                last.end = last.end.max(current.end);
            }
            _ => merged.push(current),
        }
    }
    merged
}

fn merged_by_tweet(slices: &[PostSlice]) -> BTreeMap<&str, Vec<Range>> {
    let mut grouped: BTreeMap<&str, Vec<Range>> = BTreeMap::new();
    for slice in slices {
        grouped
            .entry(slice.tweet_id())
            .or_default()
            .push(Range::new(slice.start, slice.end));
    }
    grouped
        .into_iter()
        .map(|(tweet_id, ranges)| (tweet_id, merge_ranges(ranges)))
        .collect()
}

/// Fraction of `a`'s characters that `b` also covers, per tweet
///
/// Returns 0.0 when either side has no slices or `a` covers no characters.
pub fn coverage(a: &[PostSlice], b: &[PostSlice]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_ranges = merged_by_tweet(a);
    let b_ranges = merged_by_tweet(b);

    let mut covered = 0i64;
    let mut total = 0i64;

    for (tweet_id, a_merged) in &a_ranges {
        let b_merged = b_ranges.get(tweet_id).map(Vec::as_slice).unwrap_or(&[]);
        for ra in a_merged {
            total += ra.len();
            covered += b_merged.iter().map(|rb| ra.intersection_len(rb)).sum::<i64>();
        }
    }

    if total == 0 {
        return 0.0;
    }
    covered as f64 / total as f64
}

/// Minimum of the two directional coverages
pub fn bidirectional_overlap(a: &[PostSlice], b: &[PostSlice]) -> f64 {
    coverage(a, b).min(coverage(b, a))
}

/// Prediction fields the detector compares
#[derive(Debug, Clone, PartialEq)]
pub struct DedupCandidate {
    pub id: String,
    pub prediction_id: String,
    pub target: Vec<PostSlice>,
    pub timeframe: Vec<PostSlice>,
}

impl From<&ParsedPrediction> for DedupCandidate {
    fn from(prediction: &ParsedPrediction) -> Self {
        Self {
            id: prediction.id.clone(),
            prediction_id: prediction.prediction_id.clone(),
            target: prediction.target.clone(),
            timeframe: prediction.timeframe.clone(),
        }
    }
}

/// Score pair for one comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub target_score: f64,
    pub timeframe_score: f64,
    pub is_duplicate: bool,
}

impl Comparison {
    /// Mean of the target and timeframe scores, recorded as the similarity score
    pub fn similarity(&self) -> f64 {
        (self.target_score + self.timeframe_score) / 2.0
    }
}

/// Disjoint-set over prediction ids
///
/// Union always attaches the larger root under the smaller one, so every
/// cluster's root is its lexicographically smallest member. `find` compresses
/// paths iteratively.
#[derive(Debug, Default, Clone)]
pub struct DisjointSet {
    parent: HashMap<String, String>,
}

impl DisjointSet {
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            parent: ids
                .into_iter()
                .map(|id| (id.to_string(), id.to_string()))
                .collect(),
        }
    }

    /// Root of `id`'s cluster; unknown ids are their own root
    pub fn find(&mut self, id: &str) -> String {
        let mut root = id.to_string();
        while let Some(parent) = self.parent.get(&root) {
            if *parent == root {
                break;
            }
            root = parent.clone();
        }

        // Point every node on the walked path straight at the root
        let mut node = id.to_string();
        while node != root {
            match self.parent.insert(node.clone(), root.clone()) {
                Some(next) => node = next,
                None => break,
            }
        }

        root
    }

    pub fn union(&mut self, a: &str, b: &str) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if root_a < root_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_a, root_b);
        }
    }
}

/// Thresholds for the duplicate decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupThresholds {
    pub target: f64,
    pub timeframe: f64,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self {
            target: DEFAULT_DUPLICATE_THRESHOLD,
            timeframe: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

/// Duplicate Detector
#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    thresholds: DedupThresholds,
}

impl DuplicateDetector {
    pub fn new(thresholds: DedupThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> DedupThresholds {
        self.thresholds
    }

    /// Compare two predictions' target and timeframe slices
    pub fn compare(&self, a: &DedupCandidate, b: &DedupCandidate) -> Comparison {
        let target_score = bidirectional_overlap(&a.target, &b.target);
        let timeframe_score = bidirectional_overlap(&a.timeframe, &b.timeframe);
        Comparison {
            target_score,
            timeframe_score,
            is_duplicate: target_score >= self.thresholds.target
                && timeframe_score >= self.thresholds.timeframe,
        }
    }

    /// Union every duplicate pair among `candidates` (pairwise; threads are small)
    pub fn cluster(&self, candidates: &[DedupCandidate]) -> DisjointSet {
        let mut set = DisjointSet::new(candidates.iter().map(|c| c.id.as_str()));
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                if self.compare(a, b).is_duplicate {
                    set.union(&a.id, &b.id);
                }
            }
        }
        set
    }

    /// Canonical relation for `prediction_id`, or `None` if it is its own
    /// cluster root (unique, or the chosen representative)
    pub fn find_canonical(
        &self,
        prediction_id: &str,
        candidates: &[DedupCandidate],
    ) -> Option<DuplicateRelation> {
        if candidates.len() < 2 {
            return None;
        }

        let mut set = self.cluster(candidates);
        let root = set.find(prediction_id);
        if root == prediction_id {
            return None;
        }

        let current = candidates.iter().find(|c| c.id == prediction_id)?;
        let canonical = candidates.iter().find(|c| c.id == root)?;
        let comparison = self.compare(current, canonical);

        Some(DuplicateRelation {
            prediction_id: prediction_id.to_string(),
            canonical_id: root,
            similarity_score: comparison.similarity(),
        })
    }

    /// Relations for every non-canonical member of every cluster in `candidates`
    pub fn duplicate_relations(&self, candidates: &[DedupCandidate]) -> Vec<DuplicateRelation> {
        if candidates.len() < 2 {
            return Vec::new();
        }

        let by_id: HashMap<&str, &DedupCandidate> =
            candidates.iter().map(|c| (c.id.as_str(), c)).collect();
        let mut set = self.cluster(candidates);

        candidates
            .iter()
            .filter_map(|candidate| {
                let root = set.find(&candidate.id);
                if root == candidate.id {
                    return None;
                }
                let canonical = by_id.get(root.as_str())?;
                Some(DuplicateRelation {
                    prediction_id: candidate.id.clone(),
                    canonical_id: root,
                    similarity_score: self.compare(candidate, canonical).similarity(),
                })
            })
            .collect()
    }
}
