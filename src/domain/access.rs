use super::appointment::Appointment;
use super::catalog::{Role, ShopId, User, UserId};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub managed_shop: Option<ShopId>,
}

/// What an actor may do with one appointment, evaluated once per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub view: bool,
    pub modify: bool,
    pub admin: bool,
}

impl Actor {
    pub fn client(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Client,
            managed_shop: None,
        }
    }

    pub fn admin(user_id: UserId, shop_id: ShopId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            managed_shop: Some(shop_id),
        }
    }

    pub fn can_admin_shop(&self, shop_id: ShopId) -> bool {
        self.role == Role::Admin && self.managed_shop == Some(shop_id)
    }

    pub fn capabilities_for(&self, appointment: &Appointment) -> Capabilities {
        let admin = self.can_admin_shop(appointment.shop_id);
        let owner = self.user_id == appointment.client_id;
        Capabilities {
            view: owner || admin,
            modify: owner || admin,
            admin,
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            managed_shop: match user.role {
                Role::Admin => user.managed_shop,
                Role::Client => None,
            },
        }
    }
}
