use bson::{doc, DateTime, Uuid};
use futures::stream::TryStreamExt;
use log::{info, warn};
use mongodb::options::ReplaceOptions;

use crate::cache::CacheScope;
use crate::error::Error;
use crate::rating::RatingAggregate;
use crate::review::{Review, ReviewStatus};
use crate::state::ServiceState;

/// Recomputes the rating aggregate of a product from its approved review set.
///
/// The rollup is always derived from a full scan and written wholesale via an
/// upsert keyed by the product UUID, never patched incrementally. Any update
/// lost to a concurrent writer is healed by the next recompute, since the
/// aggregate is a pure function of the source reviews.
///
/// After a successful write the cached reads of the product are invalidated and
/// a rating updated event is emitted; emission failure is logged, not raised.
pub async fn recompute_rating(
    state: &ServiceState,
    product_id: Uuid,
) -> Result<RatingAggregate, Error> {
    let filter = doc! {"product_id": product_id, "status": ReviewStatus::Approved};
    let cursor = state.review_collection.find(filter, None).await?;
    let reviews: Vec<Review> = cursor.try_collect().await?;
    let aggregate = RatingAggregate::from_reviews(product_id, &reviews, DateTime::now());

    let options = ReplaceOptions::builder().upsert(true).build();
    state
        .rating_collection
        .replace_one(doc! {"_id": product_id}, aggregate.clone(), options)
        .await?;
    info!(
        "Recomputed rating of product UUID: `{}`: {} approved reviews, mean {}.",
        product_id, aggregate.review_count, aggregate.average_rating
    );

    state.cache.invalidate(CacheScope::Rating, product_id).await;
    state
        .cache
        .invalidate(CacheScope::ProductReviews, product_id)
        .await;
    if let Err(err) = state.publisher.publish_rating_updated(&aggregate).await {
        warn!(
            "Emitting rating updated event for product UUID: `{}` failed: {}",
            product_id, err
        );
    }
    Ok(aggregate)
}

/// Fires a recompute without failing the triggering operation.
///
/// Aggregation after a review mutation is best-effort-eventual: a failed
/// recompute is logged and corrected by the next one.
pub fn recompute_rating_detached(state: ServiceState, product_id: Uuid) {
    tokio::spawn(async move {
        if let Err(err) = recompute_rating(&state, product_id).await {
            warn!(
                "Detached rating recompute for product UUID: `{}` failed: {}",
                product_id, err
            );
        }
    });
}

/// Recomputes the ratings of several products, isolating failures per product.
///
/// Used by the lifecycle event handlers: one bad product must not block the
/// rest of a batch, so each failure is logged and the loop continues.
pub async fn recompute_ratings_for(state: &ServiceState, product_ids: &[Uuid]) {
    for product_id in product_ids {
        if let Err(err) = recompute_rating(state, *product_id).await {
            warn!(
                "Rating recompute for product UUID: `{}` failed within batch: {}",
                product_id, err
            );
        }
    }
}
