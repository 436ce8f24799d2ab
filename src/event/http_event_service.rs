use axum::{debug_handler, extract::State, http::StatusCode, Json};
use bson::{doc, Bson, DateTime, Uuid};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregation::recompute_ratings_for;
use crate::cache::CacheScope;
use crate::error::Error;
use crate::review::ReviewStatus;
use crate::state::ServiceState;

/// Name used on anonymized reviews.
const ANONYMIZED_AUTHOR_NAME: &str = "Anonymous";

/// Data to send to Dapr in order to describe a subscription.
#[derive(Serialize)]
pub struct Pubsub {
    #[serde(rename(serialize = "pubsubName"))]
    pub pubsubname: String,
    pub topic: String,
    pub route: String,
}

/// Reponse data to send to Dapr when receiving an event.
#[derive(Serialize)]
pub struct TopicEventResponse {
    pub status: u8,
}

/// Default status is `0` -> Ok, according to Dapr specs.
impl Default for TopicEventResponse {
    fn default() -> Self {
        Self { status: 0 }
    }
}

/// Relevant part of Dapr event wrapped in a cloud envelope.
#[derive(Deserialize, Debug)]
pub struct Event {
    pub topic: String,
    pub data: Value,
}

/// Relevant part of order completion event data.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompletedEventData {
    /// Order UUID.
    pub order_id: Uuid,
    /// Buying user UUID.
    pub user_id: Uuid,
    /// Products contained in the order.
    pub product_ids: Vec<Uuid>,
}

/// Relevant part of user deletion event data.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserDeletedEventData {
    /// User UUID.
    pub user_id: Uuid,
    /// Flag if the user is removed permanently instead of anonymized.
    #[serde(default)]
    pub hard_delete: bool,
}

/// Relevant part of product deletion event data.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProductDeletedEventData {
    /// Product UUID.
    pub product_id: Uuid,
    /// Flag if the product is removed permanently instead of hidden.
    #[serde(default)]
    pub hard_delete: bool,
}

/// Lifecycle events the service consumes, dispatched by topic.
#[derive(Debug)]
pub enum LifecycleEvent {
    OrderCompleted(OrderCompletedEventData),
    UserDeleted(UserDeletedEventData),
    ProductDeleted(ProductDeletedEventData),
}

impl LifecycleEvent {
    /// Parses an event envelope into the tagged variant for its topic.
    pub fn parse(event: Event) -> Result<Self, Error> {
        match event.topic.as_str() {
            "order/order/completed" => Ok(LifecycleEvent::OrderCompleted(serde_json::from_value(
                event.data,
            )?)),
            "user/user/deleted" => Ok(LifecycleEvent::UserDeleted(serde_json::from_value(
                event.data,
            )?)),
            "catalog/product/deleted" => Ok(LifecycleEvent::ProductDeleted(
                serde_json::from_value(event.data)?,
            )),
            other => Err(Error::Validation(format!(
                "Topic `{}` is not subscribed to by the review service.",
                other
            ))),
        }
    }
}

/// HTTP endpoint to list topic subsciptions.
pub async fn list_topic_subscriptions() -> Result<Json<Vec<Pubsub>>, StatusCode> {
    let pubsub_order = Pubsub {
        pubsubname: "pubsub".to_string(),
        topic: "order/order/completed".to_string(),
        route: "/on-topic-event".to_string(),
    };
    let pubsub_user = Pubsub {
        pubsubname: "pubsub".to_string(),
        topic: "user/user/deleted".to_string(),
        route: "/on-topic-event".to_string(),
    };
    let pubsub_product = Pubsub {
        pubsubname: "pubsub".to_string(),
        topic: "catalog/product/deleted".to_string(),
        route: "/on-topic-event".to_string(),
    };
    Ok(Json(vec![pubsub_order, pubsub_user, pubsub_product]))
}

/// HTTP endpoint to receive lifecycle events.
///
/// Handlers are idempotent under redelivery; database errors map to a non-2xx
/// status so the broker redelivers the event (at-least-once semantics).
///
/// * `state` - Service state containing database connections.
/// * `event` - Event handled by endpoint.
#[debug_handler(state = ServiceState)]
pub async fn on_topic_event(
    State(state): State<ServiceState>,
    Json(event): Json<Event>,
) -> Result<Json<TopicEventResponse>, StatusCode> {
    info!("Received event on topic `{}`.", event.topic);

    let lifecycle_event = LifecycleEvent::parse(event).map_err(|err| {
        error!("Rejecting event: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let result = match lifecycle_event {
        LifecycleEvent::OrderCompleted(data) => on_order_completed(&state, data).await,
        LifecycleEvent::UserDeleted(data) => on_user_deleted(&state, data).await,
        LifecycleEvent::ProductDeleted(data) => on_product_deleted(&state, data).await,
    };
    match result {
        Ok(()) => Ok(Json(TopicEventResponse::default())),
        Err(err) => {
            error!("Handling event failed, requesting redelivery: {}", err);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Marks the buyer's reviews of the ordered products as verified purchases.
///
/// Filtering on `verified_purchase: false` makes a redelivered event a no-op.
/// Re-aggregation runs once per distinct product; a failing product is logged
/// and does not block the rest of the batch.
pub async fn on_order_completed(
    state: &ServiceState,
    data: OrderCompletedEventData,
) -> Result<(), Error> {
    let ordered_products: Vec<Bson> = data.product_ids.iter().map(|id| Bson::from(*id)).collect();
    let filter = doc! {
        "user_id": data.user_id,
        "product_id": { "$in": ordered_products },
        "verified_purchase": false,
    };
    let update = doc! {
        "$set": {
            "verified_purchase": true,
            "order_id": data.order_id,
            "last_updated_at": DateTime::now(),
        }
    };
    let result = state
        .review_collection
        .update_many(filter, update, None)
        .await?;
    info!(
        "Verified {} reviews of user UUID: `{}` for order UUID: `{}`.",
        result.modified_count, data.user_id, data.order_id
    );
    state
        .cache
        .invalidate(CacheScope::UserReviews, data.user_id)
        .await;
    let mut product_ids = data.product_ids;
    product_ids.sort_unstable();
    product_ids.dedup();
    recompute_ratings_for(state, &product_ids).await;
    Ok(())
}

/// Removes or anonymizes a deleted user's reviews and flags.
///
/// The hard path deletes the documents and recomputes every touched product.
/// The soft path only rewrites the author identity: aggregate membership does
/// not change, so no recompute is needed. Both paths are no-ops on redelivery.
pub async fn on_user_deleted(
    state: &ServiceState,
    data: UserDeletedEventData,
) -> Result<(), Error> {
    if data.hard_delete {
        let product_ids = touched_product_ids(state, doc! {"user_id": data.user_id}).await?;
        let reviews = state
            .review_collection
            .delete_many(doc! {"user_id": data.user_id}, None)
            .await?;
        state
            .flag_collection
            .delete_many(doc! {"user_id": data.user_id}, None)
            .await?;
        info!(
            "Deleted {} reviews of user UUID: `{}` across {} products.",
            reviews.deleted_count,
            data.user_id,
            product_ids.len()
        );
        state
            .cache
            .invalidate(CacheScope::UserReviews, data.user_id)
            .await;
        recompute_ratings_for(state, &product_ids).await;
    } else {
        state
            .review_collection
            .update_many(
                doc! {"user_id": data.user_id, "anonymized": false},
                doc! {"$set": {"author_name": ANONYMIZED_AUTHOR_NAME, "anonymized": true}},
                None,
            )
            .await?;
        state
            .flag_collection
            .update_many(
                doc! {"user_id": data.user_id},
                doc! {"$set": {"user_id": Uuid::from_bytes([0; 16])}},
                None,
            )
            .await?;
        info!("Anonymized reviews of user UUID: `{}`.", data.user_id);
        state
            .cache
            .invalidate(CacheScope::UserReviews, data.user_id)
            .await;
    }
    Ok(())
}

/// Removes or hides the reviews of a deleted product.
///
/// The hard path also removes the rating aggregate, so no recompute is needed.
/// The soft path hides the reviews; hidden reviews are already excluded by the
/// approved filter, but previously cached reads must still be invalidated.
pub async fn on_product_deleted(
    state: &ServiceState,
    data: ProductDeletedEventData,
) -> Result<(), Error> {
    if data.hard_delete {
        let reviews = state
            .review_collection
            .delete_many(doc! {"product_id": data.product_id}, None)
            .await?;
        state
            .flag_collection
            .delete_many(doc! {"product_id": data.product_id}, None)
            .await?;
        state
            .rating_collection
            .delete_one(doc! {"_id": data.product_id}, None)
            .await?;
        info!(
            "Deleted {} reviews and the rating aggregate of product UUID: `{}`.",
            reviews.deleted_count, data.product_id
        );
    } else {
        let result = state
            .review_collection
            .update_many(
                doc! {"product_id": data.product_id, "status": {"$ne": ReviewStatus::Hidden}},
                doc! {"$set": {"status": ReviewStatus::Hidden, "last_updated_at": DateTime::now()}},
                None,
            )
            .await?;
        info!(
            "Hid {} reviews of product UUID: `{}`.",
            result.modified_count, data.product_id
        );
    }
    state
        .cache
        .invalidate(CacheScope::ProductReviews, data.product_id)
        .await;
    state
        .cache
        .invalidate(CacheScope::Rating, data.product_id)
        .await;
    Ok(())
}

/// Collects the distinct product ids of the reviews matching a filter.
async fn touched_product_ids(
    state: &ServiceState,
    filter: bson::Document,
) -> Result<Vec<Uuid>, Error> {
    let values = state
        .review_collection
        .distinct("product_id", filter, None)
        .await?;
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Bson::Binary(binary) => binary.to_uuid().ok(),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_completed_event_dispatches_to_tagged_variant() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "topic": "order/order/completed",
            "data": {
                "orderId": "8b5c7a6e-3d1f-4f2a-9c0b-1a2b3c4d5e6f",
                "userId": "00000000-0000-4000-8000-000000000001",
                "productIds": ["00000000-0000-4000-8000-000000000002"],
            }
        }))
        .unwrap();
        match LifecycleEvent::parse(event).unwrap() {
            LifecycleEvent::OrderCompleted(data) => {
                assert_eq!(data.product_ids.len(), 1);
            }
            other => panic!("expected order completion, got {:?}", other),
        }
    }

    #[test]
    fn deletion_events_default_to_soft() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "topic": "user/user/deleted",
            "data": {"userId": "00000000-0000-4000-8000-000000000001"}
        }))
        .unwrap();
        match LifecycleEvent::parse(event).unwrap() {
            LifecycleEvent::UserDeleted(data) => assert!(!data.hard_delete),
            other => panic!("expected user deletion, got {:?}", other),
        }

        let event: Event = serde_json::from_value(serde_json::json!({
            "topic": "catalog/product/deleted",
            "data": {"productId": "00000000-0000-4000-8000-000000000002", "hardDelete": true}
        }))
        .unwrap();
        match LifecycleEvent::parse(event).unwrap() {
            LifecycleEvent::ProductDeleted(data) => assert!(data.hard_delete),
            other => panic!("expected product deletion, got {:?}", other),
        }
    }

    #[test]
    fn unknown_topics_are_rejected() {
        let event = Event {
            topic: "catalog/product/created".to_string(),
            data: Value::Null,
        };
        assert!(matches!(
            LifecycleEvent::parse(event),
            Err(Error::Validation(_))
        ));
    }
}
