use anyhow::Context;

use crate::contract::model::{
    Appointment, AppointmentId, AppointmentStatus, Party, PartyId, PartyKind, PartyRole,
};
use crate::infra::storage::entity::{AppointmentRow, PartyRow};

/// Convert a database row to a contract model
pub fn appointment_from_row(row: AppointmentRow) -> anyhow::Result<Appointment> {
    let status: AppointmentStatus = row
        .status
        .parse()
        .with_context(|| format!("appointment {} has a corrupt status", row.id))?;
    Ok(Appointment {
        id: AppointmentId(row.id),
        requester_id: PartyId(row.requester_id),
        provider_id: PartyId(row.provider_id),
        scheduled_at: row.scheduled_at,
        status,
        notes: row.notes,
    })
}

pub fn party_from_row(row: PartyRow) -> anyhow::Result<Party> {
    let role: PartyRole = row
        .role
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .with_context(|| format!("party {} has a corrupt role", row.id))?;
    let kind = match role {
        PartyRole::Requester => PartyKind::Requester {
            contact: row.contact,
        },
        PartyRole::Provider => PartyKind::Provider {
            specialization: row.specialization,
        },
    };
    Ok(Party {
        id: PartyId(row.id),
        username: row.username,
        display_name: row.display_name,
        kind,
    })
}

/// `(contact, specialization)` columns of `party_profiles`.
pub fn profile_columns(kind: &PartyKind) -> (Option<&str>, Option<&str>) {
    match kind {
        PartyKind::Requester { contact } => (contact.as_deref(), None),
        PartyKind::Provider { specialization } => (None, specialization.as_deref()),
    }
}
