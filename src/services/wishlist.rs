use crate::{
    errors::ServiceError,
    models::User,
    store::{Collection, Store},
};
use serde::{Deserialize, Serialize};
use strum::EnumString;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WishlistAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WishlistUpdateRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub product_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WishlistResponse {
    pub success: bool,
    pub items: Vec<String>,
}

#[derive(Clone)]
pub struct WishlistService {
    store: Store,
}

impl WishlistService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    async fn load_user(&self, user_id: &str) -> Result<User, ServiceError> {
        self.store
            .get::<User>(Collection::Users, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
    }

    pub async fn items(&self, user_id: &str) -> Result<WishlistResponse, ServiceError> {
        let user = self.load_user(user_id).await?;
        Ok(WishlistResponse {
            success: true,
            items: user.wishlist,
        })
    }

    /// Adds (idempotently) or removes a product.
    #[instrument(skip(self, request), fields(action = %request.action, product_id = %request.product_id))]
    pub async fn update(
        &self,
        user_id: &str,
        request: WishlistUpdateRequest,
    ) -> Result<WishlistResponse, ServiceError> {
        let action = request
            .action
            .trim()
            .parse::<WishlistAction>()
            .map_err(|_| ServiceError::BadRequest(format!("Unknown action: {}", request.action)))?;
        let product_id = request.product_id.trim();
        if product_id.is_empty() {
            return Err(ServiceError::ValidationError("productId is required".into()));
        }

        let mut user = self.load_user(user_id).await?;
        let changed = match action {
            WishlistAction::Add if !user.wishlist.iter().any(|p| p == product_id) => {
                user.wishlist.push(product_id.to_string());
                true
            }
            WishlistAction::Add => false,
            WishlistAction::Remove => {
                let before = user.wishlist.len();
                user.wishlist.retain(|p| p != product_id);
                user.wishlist.len() != before
            }
        };

        if changed {
            self.store.put(Collection::Users, &user.id, &user).await?;
            info!(user_id = %user.id, items = user.wishlist.len(), "Wishlist updated");
        }

        Ok(WishlistResponse {
            success: true,
            items: user.wishlist,
        })
    }
}
