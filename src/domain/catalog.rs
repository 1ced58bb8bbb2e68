use super::money::Amount;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

pub type ShopId = u64;
pub type ProfessionalId = u64;
pub type ServiceId = u64;
pub type UserId = u64;

/// A tenant. Owns professionals, services and appointments, and holds the
/// credentials used to open checkouts on its behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    #[serde(default)]
    pub payments_enabled: bool,
    #[serde(default)]
    pub gateway_access_token: Option<String>,
}

impl Shop {
    /// Online payments need both the switch and a usable token.
    pub fn accepts_payments(&self) -> bool {
        self.payments_enabled
            && self
                .gateway_access_token
                .as_deref()
                .is_some_and(|token| !token.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Professional {
    pub id: ProfessionalId,
    pub shop_id: ShopId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub shop_id: ShopId,
    pub name: String,
    pub price: Amount,
    pub duration_minutes: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Only meaningful for admins.
    #[serde(default)]
    pub managed_shop: Option<ShopId>,
}
