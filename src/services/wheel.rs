use crate::{
    errors::ServiceError,
    models::{normalize_code, DiscountType, PromoCode, User, WheelPrize},
    store::{Collection, Store},
};
use chrono::{Duration, Utc};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Days a won promo code stays redeemable.
pub const PRIZE_VALIDITY_DAYS: i64 = 30;
pub const PRIZE_CODE_PREFIX: &str = "WHEEL-";

/// One sector of the wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSector {
    pub name: &'static str,
    pub discount_type: DiscountType,
    /// Percent or whole currency units
    pub value: i64,
    pub weight: u32,
}

pub const DEFAULT_SECTORS: [WheelSector; 6] = [
    WheelSector { name: "5% off", discount_type: DiscountType::Percentage, value: 5, weight: 35 },
    WheelSector { name: "10% off", discount_type: DiscountType::Percentage, value: 10, weight: 25 },
    WheelSector { name: "200 ₽ off", discount_type: DiscountType::Fixed, value: 200, weight: 20 },
    WheelSector { name: "15% off", discount_type: DiscountType::Percentage, value: 15, weight: 10 },
    WheelSector { name: "500 ₽ off", discount_type: DiscountType::Fixed, value: 500, weight: 8 },
    WheelSector { name: "20% off", discount_type: DiscountType::Percentage, value: 20, weight: 2 },
];

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpinResponse {
    pub success: bool,
    pub prize: String,
    pub promo_code: String,
    #[schema(value_type = String)]
    pub discount_type: DiscountType,
    #[schema(value_type = f64)]
    pub discount_value: Decimal,
    pub spins_left: u32,
}

/// Loyalty wheel: spends spins, issues single-use promo codes.
#[derive(Clone)]
pub struct WheelService {
    store: Store,
    sectors: Vec<WheelSector>,
}

impl WheelService {
    pub fn new(store: Store) -> Self {
        Self::with_sectors(store, DEFAULT_SECTORS.to_vec())
    }

    pub fn with_sectors(store: Store, sectors: Vec<WheelSector>) -> Self {
        Self { store, sectors }
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<WheelSector, ServiceError> {
        let index = WeightedIndex::new(self.sectors.iter().map(|s| s.weight))
            .map_err(|e| ServiceError::InternalError(format!("invalid wheel weights: {e}")))?;
        Ok(self.sectors[index.sample(rng)])
    }

    async fn unused_code(&self) -> Result<String, ServiceError> {
        loop {
            let code = normalize_code(&format!("{PRIZE_CODE_PREFIX}{}", super::random_code(6)));
            if self
                .store
                .get::<PromoCode>(Collection::PromoCodes, &code)
                .await?
                .is_none()
            {
                return Ok(code);
            }
        }
    }

    /// Spends one spin and records the prize with its promo code.
    #[instrument(skip(self))]
    pub async fn spin(&self, user_id: &str) -> Result<SpinResponse, ServiceError> {
        let mut user = self
            .store
            .get::<User>(Collection::Users, user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))?;
        if user.spins == 0 {
            return Err(ServiceError::BadRequest("No spins available".into()));
        }

        let sector = self.draw(&mut rand::thread_rng())?;
        let code = self.unused_code().await?;
        let now = Utc::now();

        user.spins -= 1;
        self.store.put(Collection::Users, &user.id, &user).await?;

        let promo = PromoCode {
            code: code.clone(),
            discount_type: sector.discount_type,
            discount_value: Decimal::from(sector.value),
            start_date: Some(now),
            end_date: Some(now + Duration::days(PRIZE_VALIDITY_DAYS)),
            max_uses: Some(1),
            min_order_amount: None,
            is_active: true,
            description: Some(format!("Wheel prize: {}", sector.name)),
        };
        self.store.put(Collection::PromoCodes, &promo.code, &promo).await?;

        let prize = WheelPrize {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            prize_name: sector.name.to_string(),
            promo_code: code.clone(),
            used: false,
            used_at: None,
            order_id: None,
            created_at: now,
        };
        self.store.put(Collection::WheelPrizes, &prize.id, &prize).await?;

        info!(user_id = %user.id, prize = sector.name, promo_code = %code, spins_left = user.spins, "Wheel spun");
        Ok(SpinResponse {
            success: true,
            prize: prize.prize_name,
            promo_code: code,
            discount_type: promo.discount_type,
            discount_value: promo.discount_value,
            spins_left: user.spins,
        })
    }

    /// Prizes won by `user_id`, newest first.
    pub async fn prizes(&self, user_id: &str) -> Result<Vec<WheelPrize>, ServiceError> {
        let mut prizes: Vec<WheelPrize> = self
            .store
            .scan::<WheelPrize>(Collection::WheelPrizes)
            .await?
            .into_iter()
            .filter(|prize| prize.user_id == user_id)
            .collect();
        prizes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(prizes)
    }
}
