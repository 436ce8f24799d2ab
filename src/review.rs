use bson::{datetime::DateTime, Bson};
use bson::Uuid;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Maximum length of a review title.
pub const MAX_TITLE_LENGTH: usize = 120;
/// Maximum length of a review body.
pub const MAX_BODY_LENGTH: usize = 5000;
/// Maximum number of media references attached to a review.
pub const MAX_MEDIA_REFERENCES: usize = 8;

/// The review of a user for a product.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Review {
    /// Review UUID.
    pub _id: Uuid,
    /// Product the review is about.
    pub product_id: Uuid,
    /// User owning the review. Together with `product_id` an immutable identity pair.
    pub user_id: Uuid,
    /// Display name of the author, replaced on anonymization.
    pub author_name: String,
    /// Title of review.
    pub title: String,
    /// Body of review.
    pub body: String,
    /// Rating of review in 1-5 stars.
    pub rating: Rating,
    /// Optional media references attached to the review.
    pub media_urls: Vec<String>,
    /// Moderation status. Only approved reviews count toward the rating aggregate.
    pub status: ReviewStatus,
    /// Flag if the reviewer verifiably purchased the product.
    pub verified_purchase: bool,
    /// Order that verified the purchase, if any.
    pub order_id: Option<Uuid>,
    /// One vote per distinct voter. Sole source of truth for `vote_counts`.
    pub votes: Vec<Vote>,
    /// Helpfulness tallies derived from `votes`.
    pub vote_counts: VoteCounts,
    /// Spam flag tally, tracked separately from helpfulness.
    pub spam_count: u32,
    /// Flag if the author identity has been anonymized.
    pub anonymized: bool,
    /// Timestamp when review was created.
    pub created_at: DateTime,
    /// Timestamp when review was last updated.
    pub last_updated_at: DateTime,
}

impl Review {
    /// Percentage of voters that found the review helpful, rounded to a whole number.
    ///
    /// Defined as `0` when no helpfulness votes exist.
    pub fn helpful_score(&self) -> u32 {
        let total = self.vote_counts.helpful + self.vote_counts.not_helpful;
        if total == 0 {
            return 0;
        }
        (f64::from(self.vote_counts.helpful) / f64::from(total) * 100.0).round() as u32
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Rating {
    OneStars = 1,
    TwoStars = 2,
    ThreeStars = 3,
    FourStars = 4,
    FiveStars = 5,
}

impl Rating {
    /// Converts enum value to string.
    pub fn to_string(&self) -> String {
        match self {
            Rating::OneStars => "OneStars".to_string(),
            Rating::TwoStars => "TwoStars".to_string(),
            Rating::ThreeStars => "ThreeStars".to_string(),
            Rating::FourStars => "FourStars".to_string(),
            Rating::FiveStars => "FiveStars".to_string(),
        }
    }

    /// Star count of the rating.
    pub fn stars(&self) -> u32 {
        *self as u32
    }
}

impl From<Rating> for Bson {
    fn from(value: Rating) -> Self {
        Bson::String(value.to_string())
    }
}

impl TryFrom<u32> for Rating {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::OneStars),
            2 => Ok(Rating::TwoStars),
            3 => Ok(Rating::ThreeStars),
            4 => Ok(Rating::FourStars),
            5 => Ok(Rating::FiveStars),
            other => Err(Error::Validation(format!(
                "Rating must be between 1 and 5 stars, got `{}`.",
                other
            ))),
        }
    }
}

/// Moderation status of a review.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
    Hidden,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Flagged => "flagged",
            ReviewStatus::Hidden => "hidden",
        }
    }
}

impl From<ReviewStatus> for Bson {
    fn from(value: ReviewStatus) -> Self {
        Bson::String(value.as_str().to_string())
    }
}

impl TryFrom<&str> for ReviewStatus {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            "flagged" => Ok(ReviewStatus::Flagged),
            "hidden" => Ok(ReviewStatus::Hidden),
            other => Err(Error::Validation(format!(
                "`{}` is not a valid review status.",
                other
            ))),
        }
    }
}

/// Kind of a helpfulness vote.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteKind {
    Helpful,
    NotHelpful,
}

impl TryFrom<&str> for VoteKind {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "helpful" => Ok(VoteKind::Helpful),
            "notHelpful" => Ok(VoteKind::NotHelpful),
            other => Err(Error::Validation(format!(
                "`{}` is not a valid vote kind, expected `helpful` or `notHelpful`.",
                other
            ))),
        }
    }
}

/// A single voter's helpfulness vote on a review.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Vote {
    /// User that cast the vote.
    pub user_id: Uuid,
    /// Kind of the vote.
    pub kind: VoteKind,
}

/// Helpfulness tallies of a review, derived from its vote list.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct VoteCounts {
    pub helpful: u32,
    pub not_helpful: u32,
}

impl VoteCounts {
    /// Derives the tallies from a vote list.
    pub fn tally(votes: &[Vote]) -> Self {
        let helpful = votes.iter().filter(|v| v.kind == VoteKind::Helpful).count() as u32;
        let not_helpful = votes
            .iter()
            .filter(|v| v.kind == VoteKind::NotHelpful)
            .count() as u32;
        Self {
            helpful,
            not_helpful,
        }
    }
}

/// A user's spam/abuse flag on a review.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ReviewFlag {
    /// Flag UUID.
    pub _id: Uuid,
    /// Flagged review.
    pub review_id: Uuid,
    /// Product of the flagged review, kept for cascading product deletions.
    pub product_id: Uuid,
    /// User that raised the flag. Nilled on anonymization.
    pub user_id: Uuid,
    /// Reason given by the flagging user.
    pub reason: String,
    /// Timestamp when flag was raised.
    pub created_at: DateTime,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&ReviewStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
        assert_eq!(
            Bson::from(ReviewStatus::Hidden),
            Bson::String("hidden".to_string())
        );
    }

    #[test]
    fn vote_kind_parses_wire_names() {
        assert_eq!(VoteKind::try_from("helpful").unwrap(), VoteKind::Helpful);
        assert_eq!(
            VoteKind::try_from("notHelpful").unwrap(),
            VoteKind::NotHelpful
        );
        assert!(VoteKind::try_from("spam").is_err());
    }

    #[test]
    fn rating_from_stars() {
        assert_eq!(Rating::try_from(5).unwrap(), Rating::FiveStars);
        assert_eq!(Rating::try_from(5).unwrap().stars(), 5);
        assert!(Rating::try_from(0).is_err());
        assert!(Rating::try_from(6).is_err());
    }

    #[test]
    fn helpful_score_rounds_and_defaults_to_zero() {
        let mut review = test_review();
        assert_eq!(review.helpful_score(), 0);
        review.vote_counts = VoteCounts {
            helpful: 2,
            not_helpful: 1,
        };
        assert_eq!(review.helpful_score(), 67);
    }

    /// Builds an approved five-star review for tests.
    pub(crate) fn test_review() -> Review {
        let now = DateTime::now();
        Review {
            _id: Uuid::new(),
            product_id: Uuid::new(),
            user_id: Uuid::new(),
            author_name: "Test User".to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            rating: Rating::FiveStars,
            media_urls: Vec::new(),
            status: ReviewStatus::Approved,
            verified_purchase: false,
            order_id: None,
            votes: Vec::new(),
            vote_counts: VoteCounts::default(),
            spam_count: 0,
            anonymized: false,
            created_at: now,
            last_updated_at: now,
        }
    }
}
