//! Reciprocal Rank Fusion (RRF) for combining ranked result lists
//!
//! RRF is a simple but effective fusion method that:
//! - Doesn't require score normalization
//! - Works well with different scoring distributions
//! - Is robust to outliers

use rag_common::models::{ResultItem, SourceTag};
use std::collections::HashMap;

/// Default RRF constant
pub const DEFAULT_K: f64 = 60.0;

/// RRF fusion parameters
#[derive(Debug, Clone)]
pub struct FusionEngine {
    /// Constant k (typically 60)
    pub k: f64,
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}

/// One entry of a fused ranking
#[derive(Debug, Clone)]
pub struct FusedItem {
    pub item: ResultItem,
    /// Summed `1 / (k + rank + 1)` over every list the item appeared in
    pub score: f64,
    /// Number of source lists that contributed
    pub sources: usize,
}

impl FusionEngine {
    /// Fuse best-first lists into one ranking with scores.
    ///
    /// Items are grouped by url; items without one never merge. Ties keep
    /// first-encounter order across lists.
    pub fn fuse_scored(&self, lists: Vec<Vec<ResultItem>>) -> Vec<FusedItem> {
        let mut fused: Vec<FusedItem> = Vec::new();
        let mut by_url: HashMap<String, usize> = HashMap::new();
        // Index of the list each entry last gained a contribution from
        let mut last_list: Vec<usize> = Vec::new();

        for (list_idx, list) in lists.into_iter().enumerate() {
            for (rank, item) in list.into_iter().enumerate() {
                let contribution = 1.0 / (self.k + rank as f64 + 1.0);

                let existing = item.identity().and_then(|url| by_url.get(url).copied());
                match existing {
                    Some(idx) => {
                        let entry = &mut fused[idx];
                        entry.score += contribution;
                        if last_list[idx] != list_idx {
                            last_list[idx] = list_idx;
                            entry.sources += 1;
                        }
                    }
                    None => {
                        if let Some(url) = item.identity() {
                            by_url.insert(url.to_string(), fused.len());
                        }
                        last_list.push(list_idx);
                        fused.push(FusedItem {
                            item,
                            score: contribution,
                            sources: 1,
                        });
                    }
                }
            }
        }

        // Stable sort: equal scores stay in encounter order
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused
    }

    /// Fuse into plain items. The fused score replaces `relevance_score`;
    /// items merged from several lists are tagged [`SourceTag::Fused`].
    pub fn fuse(&self, lists: Vec<Vec<ResultItem>>) -> Vec<ResultItem> {
        self.fuse_scored(lists)
            .into_iter()
            .map(|fused| {
                let mut item = fused.item;
                item.relevance_score = fused.score as f32;
                if fused.sources > 1 {
                    item.source_tag = SourceTag::Fused;
                }
                item
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: Option<&str>, tag: SourceTag) -> ResultItem {
        ResultItem::new(title, url.map(str::to_string), "content", 0.5, tag)
    }

    #[test]
    fn test_rrf_scores_follow_rank_formula() {
        let fusion = FusionEngine::default();

        // Source 1: [A, B]; source 2: [X, Y, A]
        let web = vec![
            item("A", Some("https://a"), SourceTag::Web),
            item("B", Some("https://b"), SourceTag::Web),
        ];
        let notes = vec![
            item("X", Some("https://x"), SourceTag::Notes),
            item("Y", Some("https://y"), SourceTag::Notes),
            item("A", Some("https://a"), SourceTag::Notes),
        ];

        let results = fusion.fuse_scored(vec![web, notes]);
        let a = results.iter().find(|r| r.item.title == "A").unwrap();
        let b = results.iter().find(|r| r.item.title == "B").unwrap();

        assert!((a.score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        assert!((b.score - 1.0 / 62.0).abs() < 1e-12);
        assert_eq!(results[0].item.title, "A");
        assert_eq!(a.sources, 2);
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_shared_url_merges_and_is_tagged_fused() {
        let fusion = FusionEngine::default();
        let results = fusion.fuse(vec![
            vec![item("web copy", Some("https://same"), SourceTag::Web)],
            vec![item("notes copy", Some(" https://same "), SourceTag::Notes)],
        ]);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "web copy");
        assert_eq!(results[0].source_tag, SourceTag::Fused);
        assert!((results[0].relevance_score - (2.0 / 61.0) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_within_one_list_is_not_fused() {
        let fusion = FusionEngine::default();
        let web = vec![
            item("dup", Some("https://dup"), SourceTag::Web),
            item("dup again", Some("https://dup"), SourceTag::Web),
        ];
        let notes = vec![item("n", Some("https://n"), SourceTag::Notes)];

        let scored = fusion.fuse_scored(vec![web.clone(), notes.clone()]);
        let dup = scored.iter().find(|r| r.item.title == "dup").unwrap();
        assert_eq!(dup.sources, 1);
        assert!((dup.score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);

        let results = fusion.fuse(vec![web, notes]);
        let dup = results.iter().find(|r| r.title == "dup").unwrap();
        assert_eq!(dup.source_tag, SourceTag::Web);
    }

    #[test]
    fn test_items_without_url_never_merge() {
        let fusion = FusionEngine::default();
        let results = fusion.fuse(vec![
            vec![item("same title", None, SourceTag::Web)],
            vec![item("same title", None, SourceTag::Notes), item("blank", Some(""), SourceTag::Notes)],
        ]);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.source_tag != SourceTag::Fused));
    }

    #[test]
    fn test_ties_keep_encounter_order_and_are_deterministic() {
        let fusion = FusionEngine::default();
        let lists = || {
            vec![
                vec![item("w0", Some("https://w0"), SourceTag::Web), item("w1", Some("https://w1"), SourceTag::Web)],
                vec![item("n0", Some("https://n0"), SourceTag::Notes), item("n1", Some("https://n1"), SourceTag::Notes)],
            ]
        };

        let first: Vec<String> = fusion.fuse(lists()).into_iter().map(|r| r.title).collect();
        let second: Vec<String> = fusion.fuse(lists()).into_iter().map(|r| r.title).collect();

        assert_eq!(first, vec!["w0", "n0", "w1", "n1"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input() {
        assert!(FusionEngine::default().fuse(Vec::new()).is_empty());
        assert!(FusionEngine::default().fuse(vec![Vec::new(), Vec::new()]).is_empty());
    }
}
