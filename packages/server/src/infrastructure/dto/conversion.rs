//! Domain Model から DTO への変換

use notificator_shared::time::timestamp_to_rfc3339;

use crate::domain::{ConnectionSlot, SlotState};

use super::http::{SlotDto, SlotStateDto};

impl From<&ConnectionSlot> for SlotDto {
    fn from(slot: &ConnectionSlot) -> Self {
        let (state, socket_id, saved_date) = match &slot.state {
            SlotState::Pending => (SlotStateDto::Pending, None, None),
            SlotState::Bound {
                connection_id,
                bound_at,
            } => (
                SlotStateDto::Bound,
                Some(connection_id.to_string()),
                timestamp_to_rfc3339(bound_at.value()),
            ),
        };

        SlotDto {
            id: slot.slot_id.to_string(),
            state,
            socket_id,
            registered_date: timestamp_to_rfc3339(slot.created_at.value()),
            saved_date,
        }
    }
}
