use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One bookable consultation window. The (date, time) pair is unique and a
/// slot transitions unbooked -> booked exactly once.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub date: String,
    /// Time of day in the service timezone, `HH:MM`.
    pub time: String,
    pub is_booked: bool,
    pub booked_name: Option<String>,
    pub booked_email: Option<String>,
    pub booked_user_id: Option<String>,
    pub time_zone: Option<String>,
    pub booked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Who reserved a slot: either a provider-side account or a guest who only
/// left contact details on the booking form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingIdentity {
    ProviderUser { user_id: String },
    GuestContact { name: String, email: String },
}

impl BookingIdentity {
    /// Column triple (booked_name, booked_email, booked_user_id).
    pub fn columns(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        match self {
            BookingIdentity::ProviderUser { user_id } => (None, None, Some(user_id.as_str())),
            BookingIdentity::GuestContact { name, email } => {
                (Some(name.as_str()), Some(email.as_str()), None)
            }
        }
    }
}
