use crate::domain::ports::{Confirmation, DispatchError, NotificationDispatcher};
use async_trait::async_trait;
use tracing::info;

/// Dispatcher that records confirmations as log events instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn appointment_confirmed(
        &self,
        confirmation: &Confirmation,
    ) -> Result<(), DispatchError> {
        info!(
            to = %confirmation.email,
            client = %confirmation.client_name,
            shop = %confirmation.shop_name,
            date = %confirmation.date,
            time = %confirmation.time,
            "appointment confirmation sent"
        );
        Ok(())
    }
}
