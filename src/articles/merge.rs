use std::collections::HashMap;

use crate::feed::Article;

/// Combines the cached articles with a freshly fetched batch.
///
/// Fetched content replaces cached content for the same id, but the cached
/// saved flag is carried forward. New ids are appended unsaved. The result
/// has no duplicate ids and is sorted by `published_at`, newest first; the
/// sort is stable, so ties keep first-seen order.
///
/// Deterministic and idempotent: merging the same batch twice yields the
/// same list as merging it once.
pub fn merge(existing: &[Article], incoming: &[Article]) -> Vec<Article> {
    let mut merged: Vec<Article> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(merged.capacity());

    for article in existing {
        match positions.get(article.id.as_str()) {
            Some(&pos) => merged[pos] = article.clone(),
            None => {
                positions.insert(&article.id, merged.len());
                merged.push(article.clone());
            }
        }
    }

    for article in incoming {
        match positions.get(article.id.as_str()) {
            Some(&pos) => {
                let saved = merged[pos].saved;
                merged[pos] = Article {
                    saved,
                    ..article.clone()
                };
            }
            None => {
                positions.insert(&article.id, merged.len());
                merged.push(Article {
                    saved: false,
                    ..article.clone()
                });
            }
        }
    }

    merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::article_id;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 21, 0, 0, 0).unwrap()
    }

    fn article(slug: &str, minutes: i64, saved: bool) -> Article {
        let url = format!("https://example.com/{slug}");
        Article {
            id: article_id(&url),
            title: slug.to_string(),
            summary: String::new(),
            url,
            source: "bensbites".into(),
            source_label: "Ben's Bites".into(),
            published_at: base() + chrono::Duration::minutes(minutes),
            fetched_at: base(),
            image_url: None,
            tags: vec![],
            saved,
        }
    }

    fn titles(articles: &[Article]) -> Vec<&str> {
        articles.iter().map(|a| a.title.as_str()).collect()
    }

    #[test]
    fn test_union_sorted_newest_first() {
        let existing = vec![article("a", 10, false), article("b", 30, false)];
        let incoming = vec![article("c", 20, false), article("d", 40, false)];
        let merged = merge(&existing, &incoming);
        assert_eq!(titles(&merged), vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn test_incoming_content_wins_saved_flag_kept() {
        let existing = vec![article("a", 10, true)];
        let mut updated = article("a", 15, false);
        updated.summary = "edited upstream".into();

        let merged = merge(&existing, &[updated]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].saved);
        assert_eq!(merged[0].summary, "edited upstream");
        assert_eq!(merged[0].published_at, base() + chrono::Duration::minutes(15));
    }

    #[test]
    fn test_new_ids_arrive_unsaved() {
        let existing = vec![article("kept", 10, true)];
        let incoming = vec![article("fresh", 20, true), article("kept", 10, false)];
        let merged = merge(&existing, &incoming);
        assert_eq!(titles(&merged), vec!["fresh", "kept"]);
        assert!(!merged[0].saved);
        assert!(merged[1].saved);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let existing = vec![article("first", 5, false), article("second", 5, false)];
        let incoming = vec![article("third", 5, false)];
        let merged = merge(&existing, &incoming);
        assert_eq!(titles(&merged), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge(&[], &[]).is_empty());
        let only = vec![article("a", 1, false)];
        assert_eq!(merge(&only, &[]), only);
        assert_eq!(merge(&[], &only), only);
    }

    fn arb_articles() -> impl Strategy<Value = Vec<Article>> {
        prop::collection::vec((0u8..8, 0i64..6, any::<bool>()), 0..16).prop_map(|specs| {
            specs
                .into_iter()
                .map(|(slug, minutes, saved)| article(&format!("post-{slug}"), minutes, saved))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(a in arb_articles()) {
            prop_assert_eq!(merge(&a, &a), merge(&merge(&a, &[]), &a));
        }

        #[test]
        fn prop_repeating_a_batch_changes_nothing(existing in arb_articles(), incoming in arb_articles()) {
            let once = merge(&existing, &incoming);
            let twice = merge(&once, &incoming);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sorted_and_unique(existing in arb_articles(), incoming in arb_articles()) {
            let merged = merge(&existing, &incoming);
            prop_assert!(merged
                .windows(2)
                .all(|pair| pair[0].published_at >= pair[1].published_at));

            let ids: HashSet<&str> = merged.iter().map(|a| a.id.as_str()).collect();
            prop_assert_eq!(ids.len(), merged.len());

            let expected: HashSet<&str> = existing
                .iter()
                .chain(incoming.iter())
                .map(|a| a.id.as_str())
                .collect();
            prop_assert_eq!(ids, expected);
        }

        #[test]
        fn prop_saved_flag_survives_refetch(existing in arb_articles(), incoming in arb_articles()) {
            let merged = merge(&existing, &incoming);
            // Final saved state of each id among the cached articles (last one wins).
            let mut cached_saved = HashMap::new();
            for a in &existing {
                cached_saved.insert(a.id.as_str(), a.saved);
            }
            for a in &merged {
                if let Some(&saved) = cached_saved.get(a.id.as_str()) {
                    prop_assert_eq!(a.saved, saved);
                }
            }
        }
    }
}
