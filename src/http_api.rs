use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use bson::Uuid;
use serde::Deserialize;

use crate::error::Error;
use crate::mutation_input_structs::{
    CreateReviewInput, FlagReviewInput, ModerateReviewInput, UpdateReviewInput, VoteReviewInput,
};
use crate::order_datatypes::{OrderDirection, ReviewOrderField, ReviewOrderInput};
use crate::rating::RatingAggregate;
use crate::review::{Review, ReviewFlag, ReviewStatus, VoteKind};
use crate::service;
use crate::state::ServiceState;

/// Query parameters of review list views.
#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    /// Describes that the `first` N reviews should be retrieved.
    pub first: Option<u32>,
    /// Describes how many reviews should be skipped at the beginning.
    pub skip: Option<u64>,
    /// Field that reviews should be ordered by.
    pub field: Option<ReviewOrderField>,
    /// Order direction of reviews.
    pub direction: Option<OrderDirection>,
}

impl From<ListQuery> for ReviewOrderInput {
    fn from(value: ListQuery) -> Self {
        Self {
            direction: value.direction,
            field: value.field,
        }
    }
}

/// Query parameters of review deletion.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    /// UUID of the user requesting the deletion.
    pub user_id: Uuid,
    /// Flag if the requester acts as an administrator.
    #[serde(default)]
    pub admin: bool,
}

/// Returns Router with the JSON endpoints of the review service.
pub fn build_api_router(state: ServiceState) -> Router {
    Router::new()
        .route("/reviews", post(create_review))
        .route(
            "/reviews/{id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
        .route("/reviews/{id}/vote", post(vote_review))
        .route("/reviews/{id}/flag", post(flag_review))
        .route("/reviews/{id}/status", post(moderate_review))
        .route("/products/{id}/rating", get(get_product_rating))
        .route("/products/{id}/reviews", get(list_product_reviews))
        .route("/users/{id}/reviews", get(list_user_reviews))
        .with_state(state)
}

async fn create_review(
    State(state): State<ServiceState>,
    Json(input): Json<CreateReviewInput>,
) -> Result<Json<Review>, Error> {
    service::create_review(&state, input).await.map(Json)
}

async fn get_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Review>, Error> {
    service::query_object(&state.review_collection, id)
        .await
        .map(Json)
}

async fn update_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Json(mut input): Json<UpdateReviewInput>,
) -> Result<Json<Review>, Error> {
    input.id = id;
    service::update_review(&state, input).await.map(Json)
}

async fn delete_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<bool>, Error> {
    service::delete_review(&state, id, query.user_id, query.admin).await?;
    Ok(Json(true))
}

async fn vote_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Json(input): Json<VoteReviewInput>,
) -> Result<Json<Review>, Error> {
    let kind = VoteKind::try_from(input.kind.as_str())?;
    service::vote_review(&state, id, input.user_id, kind)
        .await
        .map(Json)
}

async fn flag_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Json(input): Json<FlagReviewInput>,
) -> Result<Json<ReviewFlag>, Error> {
    service::flag_review(&state, id, input.user_id, input.reason)
        .await
        .map(Json)
}

async fn moderate_review(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ModerateReviewInput>,
) -> Result<Json<Review>, Error> {
    let status = ReviewStatus::try_from(input.status.as_str())?;
    service::moderate_review(&state, id, status).await.map(Json)
}

async fn get_product_rating(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RatingAggregate>, Error> {
    service::product_rating(&state, id).await.map(Json)
}

async fn list_product_reviews(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Review>>, Error> {
    let (first, skip) = (query.first, query.skip);
    service::list_product_reviews(&state, id, first, skip, Some(query.into()))
        .await
        .map(Json)
}

async fn list_user_reviews(
    State(state): State<ServiceState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Review>>, Error> {
    let (first, skip) = (query.first, query.skip);
    service::list_user_reviews(&state, id, first, skip, Some(query.into()))
        .await
        .map(Json)
}
