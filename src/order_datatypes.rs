use serde::{Deserialize, Serialize};

/// Sort direction of review list views.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order direction.
    Asc,
    /// Descending order direction.
    Desc,
}

impl Default for OrderDirection {
    fn default() -> Self {
        Self::Asc
    }
}

/// Implements conversion to `i32` for MongoDB document sorting.
impl From<OrderDirection> for i32 {
    fn from(value: OrderDirection) -> Self {
        match value {
            OrderDirection::Asc => 1,
            OrderDirection::Desc => -1,
        }
    }
}

/// Describes the fields that a review can be ordered by.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ReviewOrderField {
    /// Orders by "id".
    Id,
    /// Orders by "rating".
    Rating,
    /// Orders by "created_at".
    CreatedAt,
    /// Orders by "last_updated_at".
    LastUpdatedAt,
}

impl ReviewOrderField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOrderField::Id => "_id",
            ReviewOrderField::Rating => "rating",
            ReviewOrderField::CreatedAt => "created_at",
            ReviewOrderField::LastUpdatedAt => "last_updated_at",
        }
    }
}

impl Default for ReviewOrderField {
    fn default() -> Self {
        Self::Id
    }
}

/// Specifies the order of reviews.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub struct ReviewOrderInput {
    /// Order direction of reviews.
    pub direction: Option<OrderDirection>,
    /// Field that reviews should be ordered by.
    pub field: Option<ReviewOrderField>,
}

impl Default for ReviewOrderInput {
    fn default() -> Self {
        Self {
            direction: Some(Default::default()),
            field: Some(Default::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_converts_to_mongodb_sort_value() {
        assert_eq!(i32::from(OrderDirection::Asc), 1);
        assert_eq!(i32::from(OrderDirection::Desc), -1);
    }

    #[test]
    fn order_fields_map_to_document_keys() {
        assert_eq!(ReviewOrderField::Id.as_str(), "_id");
        assert_eq!(ReviewOrderField::LastUpdatedAt.as_str(), "last_updated_at");
    }
}
