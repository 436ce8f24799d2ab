use bson::Uuid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewInput {
    /// UUID of user owning the review.
    pub user_id: Uuid,
    /// UUID of product in review.
    pub product_id: Uuid,
    /// Display name of the author.
    pub author_name: String,
    /// Title of review.
    pub title: String,
    /// Body of review.
    pub body: String,
    /// Rating of review in 1-5 stars.
    pub rating: u32,
    /// Optional media references.
    pub media_urls: Option<Vec<String>>,
    /// Order reference used to verify the purchase, if supplied.
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewInput {
    /// UUID of review to update.
    pub id: Uuid,
    /// UUID of the user requesting the update, must own the review.
    pub user_id: Uuid,
    /// Title of review to update.
    pub title: Option<String>,
    /// Body of review to update.
    pub body: Option<String>,
    /// Rating of review in 1-5 stars to update.
    pub rating: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReviewInput {
    /// UUID of the voting user.
    pub user_id: Uuid,
    /// Kind of the vote, `helpful` or `notHelpful`.
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagReviewInput {
    /// UUID of the flagging user.
    pub user_id: Uuid,
    /// Reason for the flag.
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerateReviewInput {
    /// New moderation status of the review.
    pub status: String,
}
