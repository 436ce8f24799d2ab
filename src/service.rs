use bson::{doc, DateTime, Uuid};
use futures::stream::TryStreamExt;
use log::warn;
use mongodb::options::FindOptions;
use mongodb::Collection;
use serde::de::DeserializeOwned;
use std::any::type_name;

use crate::aggregation::{recompute_rating, recompute_rating_detached};
use crate::cache::CacheScope;
use crate::error::Error;
use crate::external::CheckOutcome;
use crate::mutation_input_structs::{CreateReviewInput, UpdateReviewInput};
use crate::order_datatypes::ReviewOrderInput;
use crate::rating::RatingAggregate;
use crate::review::{
    Rating, Review, ReviewFlag, ReviewStatus, VoteCounts, VoteKind, MAX_BODY_LENGTH,
    MAX_MEDIA_REFERENCES, MAX_TITLE_LENGTH,
};
use crate::state::ServiceState;
use crate::vote::apply_vote;

/// Adds a review for a user and a product with content, rating and an optional order reference.
///
/// Product existence and purchase verification are best-effort checks: an
/// explicitly missing product rejects the review, an unreachable collaborator
/// does not. Reviews are created approved; moderation reacts via flags.
pub async fn create_review(state: &ServiceState, input: CreateReviewInput) -> Result<Review, Error> {
    validate_create_input(&input)?;
    let rating = Rating::try_from(input.rating)?;

    match state.product_catalog.product_exists(input.product_id).await {
        CheckOutcome::Invalid => {
            return Err(Error::NotFound(format!(
                "Product with the UUID: `{}` is not present in the system.",
                input.product_id
            )));
        }
        CheckOutcome::Unknown => {
            warn!(
                "Product existence of UUID: `{}` could not be confirmed, accepting review anyway.",
                input.product_id
            );
        }
        CheckOutcome::Valid => {}
    }
    review_is_already_written_by_user(&state.review_collection, &input).await?;

    let (verified_purchase, order_id) = match input.order_id {
        Some(order_id) => {
            match state
                .purchase_verifier
                .verify_purchase(input.user_id, input.product_id, order_id)
                .await
            {
                CheckOutcome::Valid => (true, Some(order_id)),
                CheckOutcome::Invalid => (false, None),
                CheckOutcome::Unknown => {
                    warn!(
                        "Purchase verification for order UUID: `{}` was unavailable, creating unverified review.",
                        order_id
                    );
                    (false, None)
                }
            }
        }
        None => (false, None),
    };

    let current_timestamp = DateTime::now();
    let review = Review {
        _id: Uuid::new(),
        product_id: input.product_id,
        user_id: input.user_id,
        author_name: input.author_name.clone(),
        title: input.title.clone(),
        body: input.body.clone(),
        rating,
        media_urls: input.media_urls.clone().unwrap_or_default(),
        status: ReviewStatus::Approved,
        verified_purchase,
        order_id,
        votes: Vec::new(),
        vote_counts: VoteCounts::default(),
        spam_count: 0,
        anonymized: false,
        created_at: current_timestamp,
        last_updated_at: current_timestamp,
    };
    state.review_collection.insert_one(&review, None).await?;

    if let Err(err) = state.publisher.publish_review_created(&review).await {
        warn!("Emitting review created event failed: {}", err);
    }
    invalidate_review_caches(state, &review).await;
    recompute_rating_detached(state.clone(), review.product_id);
    Ok(review)
}

/// Updates a specific review referenced with an UUID. Owner only.
///
/// Editing the free text resets the status to pending for re-moderation; a
/// rating-only change keeps the current status.
pub async fn update_review(state: &ServiceState, input: UpdateReviewInput) -> Result<Review, Error> {
    validate_update_input(&input)?;
    let review = query_object(&state.review_collection, input.id).await?;
    if review.user_id != input.user_id {
        return Err(Error::Forbidden(format!(
            "User of UUID: `{}` does not own review of UUID: `{}`.",
            input.user_id, input.id
        )));
    }
    let previous_rating = review.rating;
    let previous_status = review.status;
    let current_timestamp = DateTime::now();
    let needs_remoderation = content_changed(&review, &input);
    update_title(&state.review_collection, &input, &current_timestamp).await?;
    update_body(&state.review_collection, &input, &current_timestamp).await?;
    update_rating(&state.review_collection, &input, &current_timestamp).await?;
    if needs_remoderation {
        state
            .review_collection
            .update_one(
                doc! {"_id": input.id},
                doc! {"$set": {"status": ReviewStatus::Pending, "last_updated_at": current_timestamp}},
                None,
            )
            .await?;
    }
    let review = query_object(&state.review_collection, input.id).await?;

    if let Err(err) = state
        .publisher
        .publish_review_updated(&review, previous_rating)
        .await
    {
        warn!("Emitting review updated event failed: {}", err);
    }
    invalidate_review_caches(state, &review).await;
    if review.rating != previous_rating || review.status != previous_status {
        recompute_rating_detached(state.clone(), review.product_id);
    }
    Ok(review)
}

/// Deletes review of UUID together with its flags. Owner or admin only.
pub async fn delete_review(
    state: &ServiceState,
    id: Uuid,
    requester_id: Uuid,
    admin: bool,
) -> Result<(), Error> {
    let review = query_object(&state.review_collection, id).await?;
    if !admin && review.user_id != requester_id {
        return Err(Error::Forbidden(format!(
            "User of UUID: `{}` does not own review of UUID: `{}`.",
            requester_id, id
        )));
    }
    state
        .review_collection
        .delete_one(doc! {"_id": id}, None)
        .await?;
    state
        .flag_collection
        .delete_many(doc! {"review_id": id}, None)
        .await?;

    if let Err(err) = state.publisher.publish_review_deleted(&review).await {
        warn!("Emitting review deleted event failed: {}", err);
    }
    invalidate_review_caches(state, &review).await;
    recompute_rating_detached(state.clone(), review.product_id);
    Ok(())
}

/// Applies a user's helpfulness vote to a review and persists the result.
///
/// The document is written back wholesale (last-writer-wins). Votes are not
/// aggregate-visible, so no rating recompute is triggered.
pub async fn vote_review(
    state: &ServiceState,
    review_id: Uuid,
    voter_id: Uuid,
    kind: VoteKind,
) -> Result<Review, Error> {
    let mut review = query_object(&state.review_collection, review_id).await?;
    apply_vote(&mut review, voter_id, kind)?;
    review.last_updated_at = DateTime::now();
    state
        .review_collection
        .replace_one(doc! {"_id": review_id}, &review, None)
        .await?;
    invalidate_review_caches(state, &review).await;
    Ok(review)
}

/// Raises a spam/abuse flag on a review. One flag per user per review.
pub async fn flag_review(
    state: &ServiceState,
    review_id: Uuid,
    user_id: Uuid,
    reason: String,
) -> Result<ReviewFlag, Error> {
    let review = query_object(&state.review_collection, review_id).await?;
    let existing = state
        .flag_collection
        .find_one(doc! {"review_id": review_id, "user_id": user_id}, None)
        .await?;
    if existing.is_some() {
        return Err(Error::Conflict(format!(
            "User of UUID: `{}` has already flagged review of UUID: `{}`.",
            user_id, review_id
        )));
    }
    let flag = ReviewFlag {
        _id: Uuid::new(),
        review_id,
        product_id: review.product_id,
        user_id,
        reason,
        created_at: DateTime::now(),
    };
    state.flag_collection.insert_one(&flag, None).await?;
    state
        .review_collection
        .update_one(
            doc! {"_id": review_id},
            doc! {"$inc": {"spam_count": 1}},
            None,
        )
        .await?;
    state
        .cache
        .invalidate(CacheScope::ProductReviews, review.product_id)
        .await;
    Ok(flag)
}

/// Sets the moderation status of a review and re-aggregates its product.
pub async fn moderate_review(
    state: &ServiceState,
    review_id: Uuid,
    status: ReviewStatus,
) -> Result<Review, Error> {
    let review = query_object(&state.review_collection, review_id).await?;
    let previous_status = review.status;
    state
        .review_collection
        .update_one(
            doc! {"_id": review_id},
            doc! {"$set": {"status": status, "last_updated_at": DateTime::now()}},
            None,
        )
        .await?;
    let review = query_object(&state.review_collection, review_id).await?;
    invalidate_review_caches(state, &review).await;
    if review.status != previous_status {
        recompute_rating_detached(state.clone(), review.product_id);
    }
    Ok(review)
}

/// Retrieves the rating aggregate of a product through the cache.
///
/// The aggregate is created lazily: a product that was never aggregated gets
/// its first recompute here instead of a missing-record error.
pub async fn product_rating(
    state: &ServiceState,
    product_id: Uuid,
) -> Result<RatingAggregate, Error> {
    if let Some(cached) = state
        .cache
        .get(CacheScope::Rating, product_id, "current")
        .await
    {
        match serde_json::from_str(&cached) {
            Ok(aggregate) => return Ok(aggregate),
            Err(err) => warn!(
                "Discarding undecodable cached rating of product UUID: `{}`: {}",
                product_id, err
            ),
        }
    }
    let aggregate = match state
        .rating_collection
        .find_one(doc! {"_id": product_id}, None)
        .await?
    {
        Some(aggregate) => aggregate,
        None => recompute_rating(state, product_id).await?,
    };
    state
        .cache
        .put(
            CacheScope::Rating,
            product_id,
            "current",
            &serde_json::to_string(&aggregate)?,
        )
        .await;
    Ok(aggregate)
}

/// Retrieves the approved reviews of a product through the cache.
pub async fn list_product_reviews(
    state: &ServiceState,
    product_id: Uuid,
    first: Option<u32>,
    skip: Option<u64>,
    order_by: Option<ReviewOrderInput>,
) -> Result<Vec<Review>, Error> {
    let filter = doc! {"product_id": product_id, "status": ReviewStatus::Approved};
    cached_review_list(
        state,
        CacheScope::ProductReviews,
        product_id,
        filter,
        first,
        skip,
        order_by,
    )
    .await
}

/// Retrieves all reviews of a user through the cache, regardless of status.
pub async fn list_user_reviews(
    state: &ServiceState,
    user_id: Uuid,
    first: Option<u32>,
    skip: Option<u64>,
    order_by: Option<ReviewOrderInput>,
) -> Result<Vec<Review>, Error> {
    let filter = doc! {"user_id": user_id};
    cached_review_list(
        state,
        CacheScope::UserReviews,
        user_id,
        filter,
        first,
        skip,
        order_by,
    )
    .await
}

/// Shared read-through list query for review list views.
///
/// The cache key carries the serialized filter/sort parameters so differently
/// parameterized views are cached and invalidated independently of each other.
async fn cached_review_list(
    state: &ServiceState,
    scope: CacheScope,
    entity_id: Uuid,
    filter: bson::Document,
    first: Option<u32>,
    skip: Option<u64>,
    order_by: Option<ReviewOrderInput>,
) -> Result<Vec<Review>, Error> {
    let review_order = order_by.unwrap_or_default();
    let params = list_cache_params(first, skip, &review_order);
    if let Some(cached) = state.cache.get(scope, entity_id, &params).await {
        match serde_json::from_str(&cached) {
            Ok(reviews) => return Ok(reviews),
            Err(err) => warn!(
                "Discarding undecodable cached review list `{}`: {}",
                params, err
            ),
        }
    }
    let sorting_doc = doc! {review_order.field.unwrap_or_default().as_str(): i32::from(review_order.direction.unwrap_or_default())};
    let find_options = FindOptions::builder()
        .skip(skip)
        .limit(first.map(|definitely_first| i64::from(definitely_first)))
        .sort(sorting_doc)
        .build();
    let cursor = state.review_collection.find(filter, find_options).await?;
    let reviews: Vec<Review> = cursor.try_collect().await?;
    state
        .cache
        .put(scope, entity_id, &params, &serde_json::to_string(&reviews)?)
        .await;
    Ok(reviews)
}

/// Serializes list view parameters into the cache key suffix.
fn list_cache_params(first: Option<u32>, skip: Option<u64>, order: &ReviewOrderInput) -> String {
    format!(
        "first={}:skip={}:field={}:direction={}",
        first.map_or("all".to_string(), |value| value.to_string()),
        skip.unwrap_or(0),
        order.field.unwrap_or_default().as_str(),
        i32::from(order.direction.unwrap_or_default()),
    )
}

/// Evicts the list caches a review mutation can have changed.
async fn invalidate_review_caches(state: &ServiceState, review: &Review) {
    state
        .cache
        .invalidate(CacheScope::ProductReviews, review.product_id)
        .await;
    state
        .cache
        .invalidate(CacheScope::UserReviews, review.user_id)
        .await;
}

/// Checks the length bounds of review content at creation.
fn validate_create_input(input: &CreateReviewInput) -> Result<(), Error> {
    validate_content_bounds(Some(&input.title), Some(&input.body))?;
    if input
        .media_urls
        .as_ref()
        .is_some_and(|urls| urls.len() > MAX_MEDIA_REFERENCES)
    {
        return Err(Error::Validation(format!(
            "A review can reference at most {} media items.",
            MAX_MEDIA_REFERENCES
        )));
    }
    Ok(())
}

/// Checks the length bounds and rating range at update.
///
/// Runs before any store write so an invalid field cannot leave a partially
/// updated document behind.
fn validate_update_input(input: &UpdateReviewInput) -> Result<(), Error> {
    validate_content_bounds(input.title.as_deref(), input.body.as_deref())?;
    if let Some(rating) = input.rating {
        Rating::try_from(rating)?;
    }
    Ok(())
}

/// Checks whether an update actually changes the free-text content.
///
/// Only a changed title or body sends the review back to moderation;
/// re-submitting the current text is not an edit.
fn content_changed(review: &Review, input: &UpdateReviewInput) -> bool {
    input.title.as_ref().is_some_and(|title| *title != review.title)
        || input.body.as_ref().is_some_and(|body| *body != review.body)
}

fn validate_content_bounds(title: Option<&str>, body: Option<&str>) -> Result<(), Error> {
    if let Some(title) = title {
        if title.is_empty() || title.len() > MAX_TITLE_LENGTH {
            return Err(Error::Validation(format!(
                "Review title must be between 1 and {} characters.",
                MAX_TITLE_LENGTH
            )));
        }
    }
    if let Some(body) = body {
        if body.is_empty() || body.len() > MAX_BODY_LENGTH {
            return Err(Error::Validation(format!(
                "Review body must be between 1 and {} characters.",
                MAX_BODY_LENGTH
            )));
        }
    }
    Ok(())
}

/// Updates title of a review.
///
/// * `collection` - MongoDB collection to update.
/// * `input` - Update review input containing modified title.
/// * `current_timestamp` - Timestamp of review title update.
async fn update_title(
    collection: &Collection<Review>,
    input: &UpdateReviewInput,
    current_timestamp: &DateTime,
) -> Result<(), Error> {
    if let Some(definitely_title) = &input.title {
        collection
            .update_one(
                doc! {"_id": input.id},
                doc! {"$set": {"title": definitely_title, "last_updated_at": current_timestamp}},
                None,
            )
            .await?;
    }
    Ok(())
}

/// Updates body of a review.
///
/// * `collection` - MongoDB collection to update.
/// * `input` - Update review input containing modified body.
/// * `current_timestamp` - Timestamp of review body update.
async fn update_body(
    collection: &Collection<Review>,
    input: &UpdateReviewInput,
    current_timestamp: &DateTime,
) -> Result<(), Error> {
    if let Some(definitely_body) = &input.body {
        collection
            .update_one(
                doc! {"_id": input.id},
                doc! {"$set": {"body": definitely_body, "last_updated_at": current_timestamp}},
                None,
            )
            .await?;
    }
    Ok(())
}

/// Updates rating of a review.
///
/// * `collection` - MongoDB collection to update.
/// * `input` - Update review input containing new rating.
/// * `current_timestamp` - Timestamp of review rating update.
async fn update_rating(
    collection: &Collection<Review>,
    input: &UpdateReviewInput,
    current_timestamp: &DateTime,
) -> Result<(), Error> {
    if let Some(definitely_rating) = input.rating {
        let rating = Rating::try_from(definitely_rating)?;
        collection
            .update_one(
                doc! {"_id": input.id},
                doc! {"$set": {"rating": rating, "last_updated_at": current_timestamp}},
                None,
            )
            .await?;
    }
    Ok(())
}

/// Throws an error if user has already written a review for the product.
///
/// * `collection` - MongoDB collection to check against.
/// * `input` - Create review input containing user UUID and product UUID to check.
async fn review_is_already_written_by_user(
    collection: &Collection<Review>,
    input: &CreateReviewInput,
) -> Result<(), Error> {
    let existing = collection
        .find_one(
            doc! {"product_id": input.product_id, "user_id": input.user_id},
            None,
        )
        .await?;
    match existing {
        Some(_) => Err(Error::Conflict(format!(
            "User of UUID: `{}` has already written a review for product of UUID: `{}`.",
            input.user_id, input.product_id
        ))),
        None => Ok(()),
    }
}

/// Shared function to query an object: `T` from a MongoDB collection of object: `T`.
///
/// * `collection` - MongoDB collection to query.
/// * `id` - UUID of object.
pub async fn query_object<T: DeserializeOwned + Unpin + Send + Sync>(
    collection: &Collection<T>,
    id: Uuid,
) -> Result<T, Error> {
    collection
        .find_one(doc! {"_id": id}, None)
        .await?
        .ok_or_else(|| {
            Error::NotFound(format!(
                "{} with UUID: `{}` not found.",
                type_name::<T>(),
                id
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_input() -> CreateReviewInput {
        CreateReviewInput {
            user_id: Uuid::new(),
            product_id: Uuid::new(),
            author_name: "Test User".to_string(),
            title: "Great".to_string(),
            body: "Does what it says.".to_string(),
            rating: 5,
            media_urls: None,
            order_id: None,
        }
    }

    #[test]
    fn create_input_bounds_are_enforced() {
        let mut input = create_input();
        input.title = "a".repeat(MAX_TITLE_LENGTH + 1);
        assert!(matches!(
            validate_create_input(&input),
            Err(Error::Validation(_))
        ));

        let mut input = create_input();
        input.body = String::new();
        assert!(matches!(
            validate_create_input(&input),
            Err(Error::Validation(_))
        ));

        let mut input = create_input();
        input.media_urls = Some(vec!["x".to_string(); MAX_MEDIA_REFERENCES + 1]);
        assert!(matches!(
            validate_create_input(&input),
            Err(Error::Validation(_))
        ));

        assert!(validate_create_input(&create_input()).is_ok());
    }

    #[test]
    fn update_input_allows_absent_fields() {
        let input = UpdateReviewInput {
            id: Uuid::new(),
            user_id: Uuid::new(),
            title: None,
            body: None,
            rating: None,
        };
        assert!(validate_update_input(&input).is_ok());
    }

    #[test]
    fn update_input_rejects_out_of_range_rating_before_any_write() {
        // An invalid rating must fail up front, not after sibling fields
        // have already been persisted.
        for rating in [0, 6, 9] {
            let input = UpdateReviewInput {
                id: Uuid::new(),
                user_id: Uuid::new(),
                title: Some("New title".to_string()),
                body: None,
                rating: Some(rating),
            };
            assert!(matches!(
                validate_update_input(&input),
                Err(Error::Validation(_))
            ));
        }

        let input = UpdateReviewInput {
            id: Uuid::new(),
            user_id: Uuid::new(),
            title: None,
            body: None,
            rating: Some(5),
        };
        assert!(validate_update_input(&input).is_ok());
    }

    #[test]
    fn resubmitting_unchanged_content_is_not_an_edit() {
        let review = crate::review::tests::test_review();
        let mut input = UpdateReviewInput {
            id: review._id,
            user_id: review.user_id,
            title: Some(review.title.clone()),
            body: Some(review.body.clone()),
            rating: None,
        };
        assert!(!content_changed(&review, &input));

        input.body = Some("Actually it broke after a week.".to_string());
        assert!(content_changed(&review, &input));

        input.body = None;
        input.title = Some("Different title".to_string());
        assert!(content_changed(&review, &input));

        input.title = None;
        assert!(!content_changed(&review, &input));
    }

    #[test]
    fn list_cache_params_are_deterministic() {
        let order = ReviewOrderInput::default();
        assert_eq!(
            list_cache_params(Some(10), Some(20), &order),
            "first=10:skip=20:field=_id:direction=1"
        );
        assert_eq!(
            list_cache_params(None, None, &order),
            "first=all:skip=0:field=_id:direction=1"
        );
    }
}
