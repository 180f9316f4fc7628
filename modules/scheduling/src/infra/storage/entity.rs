use chrono::NaiveDateTime;

/// Row of `appointments`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub requester_id: i64,
    pub provider_id: i64,
    pub scheduled_at: NaiveDateTime,
    pub status: String,
    pub notes: Option<String>,
}

/// `parties` joined with `party_profiles`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PartyRow {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub contact: Option<String>,
    pub specialization: Option<String>,
}
