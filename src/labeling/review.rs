//! Confidence-based triage and the review queue read contract.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Item, ReviewStatus};

/// At or above: accepted without human review.
pub const AUTO_ACCEPT_THRESHOLD: f64 = 0.90;
/// At or above (and below auto-accept): queued for review.
pub const NEEDS_REVIEW_THRESHOLD: f64 = 0.70;

pub const DEFAULT_QUEUE_LIMIT: u32 = 20;
pub const MAX_QUEUE_LIMIT: u32 = 100;

/// Triage state for a freshly assigned (already clamped) confidence.
pub fn route(confidence: f64) -> ReviewStatus {
    if confidence >= AUTO_ACCEPT_THRESHOLD {
        ReviewStatus::AutoAccepted
    } else if confidence >= NEEDS_REVIEW_THRESHOLD {
        ReviewStatus::NeedsReview
    } else {
        ReviewStatus::LowConfidence
    }
}

/// Ordering of the review queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    /// Least confident first.
    #[default]
    Confidence,
    /// Most recently labeled first.
    Recent,
    /// Random sample of `limit` items.
    Random,
}

impl ReviewSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confidence => "confidence",
            Self::Recent => "recent",
            Self::Random => "random",
        }
    }
}

impl FromStr for ReviewSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confidence" => Ok(Self::Confidence),
            "recent" => Ok(Self::Recent),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown sort '{other}'")),
        }
    }
}

/// Page request against the review queue. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: ReviewSort,
}

impl Default for ReviewQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_QUEUE_LIMIT,
            sort: ReviewSort::Confidence,
        }
    }
}

impl ReviewQuery {
    pub fn new(page: Option<u32>, limit: Option<u32>, sort: ReviewSort) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, MAX_QUEUE_LIMIT),
            sort,
        }
    }

    /// Row offset of the first item on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(query: &ReviewQuery, total_items: u64) -> Self {
        let limit = u64::from(query.limit.max(1));
        Self {
            current_page: query.page,
            total_pages: total_items.div_ceil(limit),
            total_items,
            items_per_page: query.limit,
            has_more: u64::from(query.page) * limit < total_items,
        }
    }
}

/// One page of the review queue.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueuePage {
    pub items: Vec<Item>,
    pub pagination: Pagination,
    pub sorting: ReviewSort,
}
