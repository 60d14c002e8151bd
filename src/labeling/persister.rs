//! Write-back of validated results onto their items.

use chrono::{DateTime, Utc};

use super::error::LabelingError;
use super::parser::{clamp_confidence, match_results};
use super::review::route;
use super::traits::LabelStore;
use super::types::{LabelResult, LabelUpdate};
use crate::models::Item;

/// Build one update per matched `(item, result)` pair.
pub fn build_updates(pairs: &[(&Item, &LabelResult)], now: DateTime<Utc>) -> Vec<LabelUpdate> {
    pairs
        .iter()
        .map(|(item, result)| {
            let confidence = clamp_confidence(result.confidence);
            LabelUpdate {
                item_id: item.id.clone(),
                label: result.label.clone(),
                confidence,
                reasoning: result.reasoning.clone(),
                review_status: route(confidence),
                labeled_at: now,
            }
        })
        .collect()
}

/// Persist one batch's results in a single transaction.
///
/// Items with no matching result are left untouched. Returns rows written.
pub fn persist_batch(
    store: &dyn LabelStore,
    items: &[Item],
    results: &[LabelResult],
    now: DateTime<Utc>,
) -> Result<usize, LabelingError> {
    let pairs = match_results(items, results);
    let updates = build_updates(&pairs, now);
    let written = store.apply_labels(&updates)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::store::SqliteLabelStore;
    use crate::labeling::traits::LabelStore;
    use crate::models::ReviewStatus;
    use serde_json::json;

    fn result(ordinal: usize, label: &str, confidence: f64) -> LabelResult {
        LabelResult {
            ordinal,
            label: label.into(),
            confidence,
            reasoning: None,
        }
    }

    fn seeded(n: usize) -> (SqliteLabelStore, String, Vec<Item>) {
        let store = SqliteLabelStore::open_in_memory().unwrap();
        let dataset = store.create_dataset("ds", Some("labels")).unwrap();
        let payloads: Vec<_> = (0..n).map(|i| json!({"text": format!("item {i}")})).collect();
        store.insert_items(&dataset.id, &payloads).unwrap();
        let items = store.load_unlabeled(&dataset.id).unwrap();
        (store, dataset.id, items)
    }

    #[test]
    fn updates_route_clamped_confidence() {
        let (_, _, items) = seeded(3);
        let results = vec![
            result(1, "a", 1.4),
            result(2, "b", 0.7),
            result(3, "c", -0.2),
        ];
        let pairs = match_results(&items, &results);
        let updates = build_updates(&pairs, Utc::now());
        assert_eq!(updates[0].confidence, 1.0);
        assert_eq!(updates[0].review_status, ReviewStatus::AutoAccepted);
        assert_eq!(updates[1].review_status, ReviewStatus::NeedsReview);
        assert_eq!(updates[2].confidence, 0.0);
        assert_eq!(updates[2].review_status, ReviewStatus::LowConfidence);
    }

    #[test]
    fn persist_leaves_unmatched_items_pending() {
        let (store, dataset_id, items) = seeded(3);
        let written = persist_batch(&store, &items, &[result(2, "b", 0.95)], Utc::now()).unwrap();
        assert_eq!(written, 1);

        let all = store.list_items(&dataset_id).unwrap();
        assert!(all[0].label.is_none());
        assert_eq!(all[0].review_status, ReviewStatus::Pending);
        assert_eq!(all[1].label.as_deref(), Some("b"));
        assert!(all[2].label.is_none());
    }

    #[test]
    fn persisting_twice_does_not_duplicate() {
        let (store, dataset_id, items) = seeded(2);
        let results = vec![result(1, "a", 0.9), result(2, "b", 0.5)];
        persist_batch(&store, &items, &results, Utc::now()).unwrap();
        persist_batch(&store, &items, &results, Utc::now()).unwrap();

        let counts = store.label_counts(&dataset_id).unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.labeled, 2);
        assert_eq!(counts.auto_accepted, 1);
        assert_eq!(counts.low_confidence, 1);
    }

    #[test]
    fn empty_results_write_nothing() {
        let (store, _, items) = seeded(2);
        assert_eq!(persist_batch(&store, &items, &[], Utc::now()).unwrap(), 0);
    }
}
