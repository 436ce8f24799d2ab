use std::time::Duration;

use bson::Uuid;
use log::warn;
use reqwest::StatusCode;

/// Timeout of a single collaborator call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a best-effort external check.
///
/// `Unknown` is explicitly distinct from `Invalid`: an unreachable collaborator
/// must not be collapsed to a negative answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The collaborator confirmed the check.
    Valid,
    /// The collaborator explicitly denied the check.
    Invalid,
    /// The collaborator was unreachable or answered unexpectedly.
    Unknown,
}

/// Maps a collaborator response status onto a check outcome.
fn outcome_from_status(status: StatusCode) -> CheckOutcome {
    if status.is_success() {
        CheckOutcome::Valid
    } else if status == StatusCode::NOT_FOUND {
        CheckOutcome::Invalid
    } else {
        CheckOutcome::Unknown
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Client of the catalog service confirming product existence before accepting reviews.
#[derive(Clone)]
pub struct ProductCatalogClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProductCatalogClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: http_client(),
        }
    }

    /// Checks whether a product id is valid.
    ///
    /// `Invalid` means the catalog explicitly answered that the product does not
    /// exist; transport failures degrade to `Unknown`.
    pub async fn product_exists(&self, product_id: Uuid) -> CheckOutcome {
        let url = format!("{}/products/{}", self.base_url, product_id);
        match self.client.get(&url).send().await {
            Ok(response) => outcome_from_status(response.status()),
            Err(err) => {
                warn!(
                    "Product existence check for UUID: `{}` failed: {}",
                    product_id, err
                );
                CheckOutcome::Unknown
            }
        }
    }
}

/// Client of the order service verifying purchases at review creation.
#[derive(Clone)]
pub struct PurchaseVerifier {
    base_url: String,
    client: reqwest::Client,
}

impl PurchaseVerifier {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: http_client(),
        }
    }

    /// Checks whether an order reference proves the user bought the product.
    pub async fn verify_purchase(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        order_id: Uuid,
    ) -> CheckOutcome {
        let url = format!(
            "{}/orders/{}/items?userId={}&productId={}",
            self.base_url, order_id, user_id, product_id
        );
        match self.client.get(&url).send().await {
            Ok(response) => outcome_from_status(response.status()),
            Err(err) => {
                warn!(
                    "Purchase verification for order UUID: `{}` failed: {}",
                    order_id, err
                );
                CheckOutcome::Unknown
            }
        }
    }
}
