use bson::datetime::DateTime;
use bson::Uuid;
use serde::{Deserialize, Serialize};

use crate::review::{Rating, Review};

/// Length of the short trend window in milliseconds (7 days).
const SEVEN_DAYS_MILLIS: i64 = 7 * 24 * 60 * 60 * 1000;
/// Length of the long trend window in milliseconds (30 days).
const THIRTY_DAYS_MILLIS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Histogram of the five rating buckets, index 0 holding the one-star count.
///
/// The fixed ordered representation is the only one used anywhere: BSON, cache
/// entries, and outbound events all carry a 5-element array.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct RatingDistribution(pub [u32; 5]);

impl RatingDistribution {
    /// Increments the bucket of a rating.
    pub fn record(&mut self, rating: Rating) {
        self.0[rating.stars() as usize - 1] += 1;
    }

    /// Count of reviews in the bucket for `stars` (1-5).
    pub fn bucket(&self, stars: u32) -> u32 {
        self.0[stars as usize - 1]
    }
}

/// Review count and mean rating over a creation-timestamp window.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Default)]
pub struct RatingTrend {
    /// Approved reviews created inside the window.
    pub count: u32,
    /// Mean rating of those reviews, rounded to one decimal.
    pub average_rating: f64,
}

/// Denormalized rating rollup of a product, one document per product.
///
/// Every field is a pure function of the product's approved reviews at the
/// moment of recomputation. The document is overwritten wholesale on every
/// recompute and never patched incrementally.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RatingAggregate {
    /// Product UUID.
    pub _id: Uuid,
    /// Total count of approved reviews.
    pub review_count: u32,
    /// Mean rating of approved reviews, rounded to one decimal.
    pub average_rating: f64,
    /// Fixed 5-bucket rating histogram.
    pub distribution: RatingDistribution,
    /// Count of approved reviews with a verified purchase.
    pub verified_count: u32,
    /// Mean rating of the verified subset, rounded to one decimal.
    pub verified_average_rating: f64,
    /// 7-day trend window.
    pub seven_day_trend: RatingTrend,
    /// 30-day trend window.
    pub thirty_day_trend: RatingTrend,
    /// Timestamp of the recomputation that produced this document.
    pub computed_at: DateTime,
}

impl RatingAggregate {
    /// The well-defined aggregate of a product without approved reviews.
    ///
    /// A product can legitimately have had reviews and lost them all, so the
    /// empty rollup is a zeroed document rather than a missing one.
    pub fn empty(product_id: Uuid, computed_at: DateTime) -> Self {
        Self {
            _id: product_id,
            review_count: 0,
            average_rating: 0.0,
            distribution: RatingDistribution::default(),
            verified_count: 0,
            verified_average_rating: 0.0,
            seven_day_trend: RatingTrend::default(),
            thirty_day_trend: RatingTrend::default(),
            computed_at,
        }
    }

    /// Computes the rollup of a product from its approved review set.
    ///
    /// Deterministic for a fixed review set and clock; callers pass the reviews
    /// already filtered to the approved status.
    pub fn from_reviews(product_id: Uuid, reviews: &[Review], now: DateTime) -> Self {
        if reviews.is_empty() {
            return Self::empty(product_id, now);
        }
        let mut distribution = RatingDistribution::default();
        for review in reviews {
            distribution.record(review.rating);
        }
        let verified: Vec<&Review> = reviews.iter().filter(|r| r.verified_purchase).collect();
        Self {
            _id: product_id,
            review_count: reviews.len() as u32,
            average_rating: mean_rating(reviews.iter()),
            distribution,
            verified_count: verified.len() as u32,
            verified_average_rating: mean_rating(verified.iter().copied()),
            seven_day_trend: trend_window(reviews, now, SEVEN_DAYS_MILLIS),
            thirty_day_trend: trend_window(reviews, now, THIRTY_DAYS_MILLIS),
            computed_at: now,
        }
    }
}

/// Mean star rating rounded to one decimal, `0.0` for an empty set.
fn mean_rating<'a>(reviews: impl Iterator<Item = &'a Review>) -> f64 {
    let (sum, count) = reviews.fold((0u32, 0u32), |(sum, count), review| {
        (sum + review.rating.stars(), count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    round_to_tenth(f64::from(sum) / f64::from(count))
}

/// Sub-scan of the reviews created within the trailing window.
fn trend_window(reviews: &[Review], now: DateTime, window_millis: i64) -> RatingTrend {
    let cutoff = now.timestamp_millis() - window_millis;
    let recent: Vec<&Review> = reviews
        .iter()
        .filter(|r| r.created_at.timestamp_millis() >= cutoff)
        .collect();
    RatingTrend {
        count: recent.len() as u32,
        average_rating: mean_rating(recent.into_iter()),
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::tests::test_review;
    use crate::review::Rating;

    fn review_with_rating(product_id: Uuid, rating: Rating) -> Review {
        let mut review = test_review();
        review.product_id = product_id;
        review.rating = rating;
        review
    }

    #[test]
    fn aggregates_count_mean_and_histogram() {
        let product_id = Uuid::new();
        let reviews = vec![
            review_with_rating(product_id, Rating::FiveStars),
            review_with_rating(product_id, Rating::FourStars),
            review_with_rating(product_id, Rating::ThreeStars),
        ];
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, DateTime::now());
        assert_eq!(aggregate.review_count, 3);
        assert_eq!(aggregate.average_rating, 4.0);
        assert_eq!(aggregate.distribution, RatingDistribution([0, 0, 1, 1, 1]));
        assert_eq!(aggregate.distribution.bucket(3), 1);
        assert_eq!(aggregate.distribution.bucket(1), 0);
    }

    #[test]
    fn mean_rounds_to_one_decimal() {
        let product_id = Uuid::new();
        let reviews = vec![
            review_with_rating(product_id, Rating::FiveStars),
            review_with_rating(product_id, Rating::FourStars),
            review_with_rating(product_id, Rating::FourStars),
        ];
        // 13 / 3 = 4.333... -> 4.3
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, DateTime::now());
        assert_eq!(aggregate.average_rating, 4.3);
    }

    #[test]
    fn empty_review_set_yields_zeroed_aggregate() {
        let product_id = Uuid::new();
        let aggregate = RatingAggregate::from_reviews(product_id, &[], DateTime::now());
        assert_eq!(aggregate._id, product_id);
        assert_eq!(aggregate.review_count, 0);
        assert_eq!(aggregate.average_rating, 0.0);
        assert_eq!(aggregate.distribution, RatingDistribution::default());
        assert_eq!(aggregate.verified_count, 0);
        assert_eq!(aggregate.seven_day_trend.count, 0);
        assert_eq!(aggregate.thirty_day_trend.count, 0);
    }

    #[test]
    fn verified_subset_is_aggregated_separately() {
        let product_id = Uuid::new();
        let mut verified = review_with_rating(product_id, Rating::FiveStars);
        verified.verified_purchase = true;
        let reviews = vec![
            verified,
            review_with_rating(product_id, Rating::OneStars),
            review_with_rating(product_id, Rating::TwoStars),
        ];
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, DateTime::now());
        assert_eq!(aggregate.verified_count, 1);
        assert_eq!(aggregate.verified_average_rating, 5.0);
        assert_eq!(aggregate.average_rating, 2.7);
    }

    #[test]
    fn trend_windows_filter_by_creation_timestamp() {
        let product_id = Uuid::new();
        let now = DateTime::now();
        let mut recent = review_with_rating(product_id, Rating::FiveStars);
        recent.created_at = DateTime::from_millis(now.timestamp_millis() - 24 * 60 * 60 * 1000);
        let mut older = review_with_rating(product_id, Rating::ThreeStars);
        older.created_at =
            DateTime::from_millis(now.timestamp_millis() - 14 * 24 * 60 * 60 * 1000);
        let mut ancient = review_with_rating(product_id, Rating::OneStars);
        ancient.created_at =
            DateTime::from_millis(now.timestamp_millis() - 60 * 24 * 60 * 60 * 1000);
        let reviews = vec![recent, older, ancient];
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!(aggregate.seven_day_trend.count, 1);
        assert_eq!(aggregate.seven_day_trend.average_rating, 5.0);
        assert_eq!(aggregate.thirty_day_trend.count, 2);
        assert_eq!(aggregate.thirty_day_trend.average_rating, 4.0);
        assert_eq!(aggregate.review_count, 3);
    }

    #[test]
    fn recompute_is_deterministic() {
        let product_id = Uuid::new();
        let now = DateTime::now();
        let reviews = vec![
            review_with_rating(product_id, Rating::FourStars),
            review_with_rating(product_id, Rating::TwoStars),
        ];
        let first = RatingAggregate::from_reviews(product_id, &reviews, now);
        let second = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn distribution_serializes_as_fixed_array() {
        let mut distribution = RatingDistribution::default();
        distribution.record(Rating::FiveStars);
        distribution.record(Rating::FiveStars);
        distribution.record(Rating::OneStars);
        let json = serde_json::to_string(&distribution).unwrap();
        assert_eq!(json, "[1,0,0,0,2]");
    }

    #[test]
    fn end_to_end_rating_scenario() {
        let product_id = Uuid::new();
        let now = DateTime::now();
        let mut reviews = vec![review_with_rating(product_id, Rating::FiveStars)];
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!((aggregate.average_rating, aggregate.review_count), (5.0, 1));

        reviews.push(review_with_rating(product_id, Rating::FourStars));
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!((aggregate.average_rating, aggregate.review_count), (4.5, 2));

        reviews[0].rating = Rating::ThreeStars;
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!((aggregate.average_rating, aggregate.review_count), (3.5, 2));

        reviews.remove(1);
        let aggregate = RatingAggregate::from_reviews(product_id, &reviews, now);
        assert_eq!((aggregate.average_rating, aggregate.review_count), (3.0, 1));
    }
}
