//! Overlap detection between a candidate slot and a professional's existing bookings.
//!
//! Stores call [`find_conflict`] while holding whatever lock makes their
//! check-and-insert atomic; it is never enough to call it on a snapshot and
//! insert afterwards.

use super::appointment::Appointment;
use super::catalog::{ProfessionalId, ShopId};
use super::schedule::Slot;

/// Returns the first active appointment of `professional_id` in `shop_id` whose
/// interval overlaps `slot`.
pub fn find_conflict<'a, I>(
    existing: I,
    shop_id: ShopId,
    professional_id: ProfessionalId,
    slot: &Slot,
) -> Option<&'a Appointment>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    existing.into_iter().find(|appointment| {
        appointment.shop_id == shop_id
            && appointment.professional_id == professional_id
            && appointment.is_active()
            && appointment.slot().overlaps(slot)
    })
}
