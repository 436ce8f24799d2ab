use std::time::Duration;

use bson::{datetime::DateTime, Uuid};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::Error;
use crate::rating::{RatingAggregate, RatingDistribution};
use crate::review::{Rating, Review};

/// Timeout of a single publish call. A hung sidecar must not block the
/// operation awaiting the publication.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared HTTP client for all outbound event publications.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(PUBLISH_TIMEOUT)
        .build()
        .unwrap_or_default()
});

/// Envelope wrapping every outbound event with a correlation id and timestamp.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T: Serialize> {
    /// Correlation UUID of the event.
    pub event_id: Uuid,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Minimal payload a downstream consumer needs.
    pub data: T,
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            event_id: Uuid::new(),
            timestamp: DateTime::now().timestamp_millis(),
            data,
        }
    }
}

/// Payload of review lifecycle notifications.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEventData {
    pub review_id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: u32,
    pub verified_purchase: bool,
    /// Rating before the change, present on update notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_rating: Option<u32>,
}

impl ReviewEventData {
    fn from_review(review: &Review, previous_rating: Option<Rating>) -> Self {
        Self {
            review_id: review._id,
            product_id: review.product_id,
            user_id: review.user_id,
            rating: review.rating.stars(),
            verified_purchase: review.verified_purchase,
            previous_rating: previous_rating.map(|rating| rating.stars()),
        }
    }
}

/// Payload of rating updated notifications.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RatingEventData {
    pub product_id: Uuid,
    pub average_rating: f64,
    pub review_count: u32,
    pub distribution: RatingDistribution,
}

/// Publishes review events to other services via the Dapr pub/sub HTTP API.
#[derive(Clone)]
pub struct EventPublisher {
    publish_base_url: String,
}

impl EventPublisher {
    /// Builds a publisher against the Dapr sidecar on `dapr_http_port`.
    pub fn new(dapr_http_port: u16) -> Self {
        Self {
            publish_base_url: format!("http://127.0.0.1:{}/v1.0/publish/pubsub", dapr_http_port),
        }
    }

    /// Posts an event envelope to a topic.
    async fn publish<T: Serialize>(&self, topic: &str, data: T) -> Result<(), Error> {
        let envelope = EventEnvelope::new(data);
        let url = format!("{}/{}", self.publish_base_url, topic);
        let response = HTTP_CLIENT
            .post(&url)
            .json(&envelope)
            .send()
            .await
            .map_err(|err| {
                Error::UpstreamUnavailable(format!("Publishing to `{}` failed: {}", topic, err))
            })?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "Publishing to `{}` failed with status: {}.",
                topic,
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn publish_review_created(&self, review: &Review) -> Result<(), Error> {
        self.publish(
            "review/review/created",
            ReviewEventData::from_review(review, None),
        )
        .await
    }

    pub async fn publish_review_updated(
        &self,
        review: &Review,
        previous_rating: Rating,
    ) -> Result<(), Error> {
        self.publish(
            "review/review/updated",
            ReviewEventData::from_review(review, Some(previous_rating)),
        )
        .await
    }

    pub async fn publish_review_deleted(&self, review: &Review) -> Result<(), Error> {
        self.publish(
            "review/review/deleted",
            ReviewEventData::from_review(review, None),
        )
        .await
    }

    /// Notifies downstream consumers of a freshly recomputed rating aggregate.
    pub async fn publish_rating_updated(&self, aggregate: &RatingAggregate) -> Result<(), Error> {
        self.publish(
            "review/rating/updated",
            RatingEventData {
                product_id: aggregate._id,
                average_rating: aggregate.average_rating,
                review_count: aggregate.review_count,
                distribution: aggregate.distribution,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::tests::test_review;

    #[test]
    fn review_event_payload_is_minimal_and_camel_case() {
        let mut review = test_review();
        review.verified_purchase = true;
        let data = ReviewEventData::from_review(&review, Some(Rating::FourStars));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["reviewId"], serde_json::json!(review._id.to_string()));
        assert_eq!(json["rating"], serde_json::json!(5));
        assert_eq!(json["previousRating"], serde_json::json!(4));
        assert_eq!(json["verifiedPurchase"], serde_json::json!(true));
    }

    #[test]
    fn previous_rating_is_omitted_when_absent() {
        let review = test_review();
        let data = ReviewEventData::from_review(&review, None);
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("previousRating").is_none());
    }

    #[test]
    fn envelope_carries_correlation_id_and_timestamp() {
        let envelope = EventEnvelope::new(serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("eventId").is_some());
        assert!(json["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(json["data"]["ok"], serde_json::json!(true));
    }
}
