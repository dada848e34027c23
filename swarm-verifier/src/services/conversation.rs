//! Conversation-tree reconstruction
//!
//! Every judgment about a prediction is made against the reply chain that led
//! to its source tweet: the source tweet, its parent, the parent's parent, and
//! so on up to the conversation root, presented oldest first.

use std::collections::{HashMap, HashSet};

use swarm_common::models::{PostSlice, Tweet};
use swarm_common::text::utf16_slice;

/// Rebuild the reply chain ending at `source_tweet_id`
///
/// Walks parent pointers from the source tweet toward the root and reverses
/// the walk, so the result runs root → source. The walk stops at the first
/// parent that was not fetched (deleted or never scraped) and at any pointer
/// cycle. Returns an empty chain when the source tweet itself is absent.
pub fn build_reply_chain(source_tweet_id: i64, tweets: Vec<Tweet>) -> Vec<Tweet> {
    let mut by_id: HashMap<i64, Tweet> = tweets.into_iter().map(|t| (t.id, t)).collect();

    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(source_tweet_id);

    while let Some(id) = current {
        if !visited.insert(id) {
            tracing::warn!(tweet_id = id, "Reply chain cycle detected, truncating");
            break;
        }
        let Some(tweet) = by_id.remove(&id) else {
            break;
        };
        current = tweet.parent_tweet_id;
        chain.push(tweet);
    }

    chain.reverse();
    chain
}

/// Chronological thread a prediction is judged against, indexed by tweet id
#[derive(Debug, Clone)]
pub struct ThreadContext {
    tweets: Vec<Tweet>,
    index: HashMap<String, usize>,
}

impl ThreadContext {
    pub fn new(tweets: Vec<Tweet>) -> Self {
        let index = tweets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.to_string(), i))
            .collect();
        Self { tweets, index }
    }

    pub fn tweets(&self) -> &[Tweet] {
        &self.tweets
    }

    pub fn is_empty(&self) -> bool {
        self.tweets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tweets.len()
    }

    /// Look up a tweet by the string id a slice carries
    pub fn get(&self, tweet_id: &str) -> Option<&Tweet> {
        self.index.get(tweet_id).map(|&i| &self.tweets[i])
    }

    pub fn get_by_id(&self, tweet_id: i64) -> Option<&Tweet> {
        self.get(&tweet_id.to_string())
    }

    pub fn tweet_ids(&self) -> Vec<i64> {
        self.tweets.iter().map(|t| t.id).collect()
    }

    /// Text covered by `slices`, one fragment per slice joined by a space
    ///
    /// A slice citing a tweet outside the thread contributes an empty fragment.
    pub fn slice_text(&self, slices: &[PostSlice]) -> String {
        slices
            .iter()
            .map(|slice| match self.get(slice.tweet_id()) {
                Some(tweet) => utf16_slice(&tweet.text, slice.start, slice.end),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tweet(id: i64, parent: Option<i64>, text: &str) -> Tweet {
        Tweet {
            id,
            text: text.to_string(),
            author_id: 100 + id,
            author_username: None,
            date: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
            conversation_id: Some(1),
            parent_tweet_id: parent,
            quoted_id: None,
            prediction_id: None,
        }
    }

    #[test]
    fn test_chain_runs_root_to_source() {
        let tweets = vec![
            tweet(3, Some(2), "c"),
            tweet(1, None, "a"),
            tweet(2, Some(1), "b"),
        ];
        let chain = build_reply_chain(3, tweets);
        let ids: Vec<i64> = chain.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_chain_excludes_sibling_branches() {
        let tweets = vec![
            tweet(1, None, "root"),
            tweet(2, Some(1), "branch a"),
            tweet(3, Some(1), "branch b"),
            tweet(4, Some(3), "source"),
        ];
        let chain = build_reply_chain(4, tweets);
        let ids: Vec<i64> = chain.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn test_chain_stops_at_missing_parent() {
        let tweets = vec![tweet(5, Some(4), "orphan reply"), tweet(9, None, "other")];
        let chain = build_reply_chain(5, tweets);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].id, 5);
    }

    #[test]
    fn test_chain_empty_when_source_missing() {
        let chain = build_reply_chain(42, vec![tweet(1, None, "root")]);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_chain_survives_cycle() {
        let tweets = vec![tweet(1, Some(2), "a"), tweet(2, Some(1), "b")];
        let chain = build_reply_chain(1, tweets);
        let ids: Vec<i64> = chain.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn test_slice_text_joins_fragments() {
        let ctx = ThreadContext::new(vec![
            tweet(1, None, "BTC is going to the moon"),
            tweet(2, Some(1), "I mean it will hit $100k"),
        ]);
        let slices = vec![PostSlice::new("1", 0, 3), PostSlice::new("2", 7, 24)];
        assert_eq!(ctx.slice_text(&slices), "BTC it will hit $100k");
    }

    #[test]
    fn test_slice_text_missing_tweet_is_empty_fragment() {
        let ctx = ThreadContext::new(vec![tweet(1, None, "hello world")]);
        let slices = vec![PostSlice::new("404", 0, 5), PostSlice::new("1", 0, 5)];
        assert_eq!(ctx.slice_text(&slices), " hello");
    }
}
