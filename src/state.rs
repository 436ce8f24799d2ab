use mongodb::{Collection, Database};

use crate::cache::CacheCoordinator;
use crate::event::publisher::EventPublisher;
use crate::external::{ProductCatalogClient, PurchaseVerifier};
use crate::rating::RatingAggregate;
use crate::review::{Review, ReviewFlag};

/// Shared service state containing database collections and collaborators.
#[derive(Clone)]
pub struct ServiceState {
    pub review_collection: Collection<Review>,
    pub flag_collection: Collection<ReviewFlag>,
    pub rating_collection: Collection<RatingAggregate>,
    pub cache: CacheCoordinator,
    pub publisher: EventPublisher,
    pub product_catalog: ProductCatalogClient,
    pub purchase_verifier: PurchaseVerifier,
}

impl ServiceState {
    /// Builds the state from a database handle and the configured collaborators.
    pub fn new(
        db_client: &Database,
        cache: CacheCoordinator,
        publisher: EventPublisher,
        product_catalog: ProductCatalogClient,
        purchase_verifier: PurchaseVerifier,
    ) -> Self {
        Self {
            review_collection: db_client.collection::<Review>("reviews"),
            flag_collection: db_client.collection::<ReviewFlag>("review_flags"),
            rating_collection: db_client.collection::<RatingAggregate>("ratings"),
            cache,
            publisher,
            product_catalog,
            purchase_verifier,
        }
    }
}
