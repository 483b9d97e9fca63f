use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::db::models::{BookingIdentity, Slot};
use crate::db::{SlotRepository, UserRepository};
use crate::error::{AppError, AppResult};
use crate::services::gcal::{EventAttendee, EventDateTime, GcalEvent};
use crate::AppState;

/// Booking request as the form submits it: either a combined `dateTime` or the
/// `date` + `time` pair, plus contact info and the slot being claimed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleRequest {
    #[serde(alias = "nome")]
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "timeZone")]
    pub time_zone: Option<String>,
    #[serde(rename = "slotId")]
    pub slot_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub message: String,
    pub event_id: Option<String>,
    pub event_link: Option<String>,
    pub slot_booked: Slot,
}

#[derive(Debug, Clone)]
struct BookingInput {
    name: String,
    email: String,
    date: String,
    time: String,
    time_zone: String,
    slot_id: String,
}

/// The whole booking saga: validate, reserve the slot (the store is the
/// availability gate), create the remote event, and roll the reservation back
/// if the remote side refuses.
pub async fn book_slot(
    state: &AppState,
    request: ScheduleRequest,
) -> AppResult<BookingConfirmation> {
    let input = validate(request)?;

    let slot = SlotRepository::find_by_id(&state.db, &input.slot_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Slot não encontrado.".to_string()))?;

    if slot.is_booked {
        return Err(AppError::Conflict(
            "Este horário já foi agendado.".to_string(),
        ));
    }

    if slot.date != input.date || slot.time != input.time {
        return Err(AppError::BadRequest(
            "Inconsistência de dados: data ou hora do slot não corresponde.".to_string(),
        ));
    }

    // The event lands on the most recently authenticated owner's calendar.
    let owner = UserRepository::find_calendar_owner(&state.db)
        .await?
        .ok_or(AppError::AuthExpired)?;

    let start = start_rfc3339(&slot.date, &slot.time, &input.time_zone)?;

    let identity = BookingIdentity::GuestContact {
        name: input.name.clone(),
        email: input.email.clone(),
    };
    let reserved = SlotRepository::reserve(&state.db, &slot.id, &identity, &input.time_zone).await?;

    let draft = consultation_event(&input.name, &input.email, &start, &input.time_zone);

    let created = match state
        .calendar
        .create_event(&owner.id, &state.config.google.calendar_id, draft)
        .await
    {
        Ok(event) => event,
        Err(err) => {
            // Compensation: the slot must not stay reserved without an event.
            if let Err(release_err) = SlotRepository::release(&state.db, &slot.id).await {
                tracing::error!(
                    "Falha ao liberar slot {} após erro remoto: {:?}",
                    slot.id,
                    release_err
                );
            }
            return Err(err);
        }
    };

    notify_booking(state, &input);

    Ok(BookingConfirmation {
        message: "Agendamento realizado com sucesso!".to_string(),
        event_id: created.id.clone(),
        event_link: created.html_link.clone(),
        slot_booked: reserved,
    })
}

fn validate(request: ScheduleRequest) -> AppResult<BookingInput> {
    let missing = || {
        AppError::BadRequest(
            "Nome, e-mail, data/hora, fuso horário e ID do slot são obrigatórios.".to_string(),
        )
    };

    let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let name = present(request.name).ok_or_else(missing)?;
    let email = present(request.email).ok_or_else(missing)?;
    let time_zone = present(request.time_zone).ok_or_else(missing)?;
    let slot_id = present(request.slot_id).ok_or_else(missing)?;

    let (date, time) = match (present(request.date), present(request.time)) {
        (Some(date), Some(time)) => (date, time),
        _ => {
            let combined = present(request.date_time).ok_or_else(missing)?;
            split_date_time(&combined).ok_or_else(|| {
                AppError::BadRequest("Data/hora em formato inválido.".to_string())
            })?
        }
    };

    Ok(BookingInput {
        name,
        email,
        date,
        time,
        time_zone,
        slot_id,
    })
}

/// Split a combined timestamp ("2025-07-21T14:00", with or without seconds or
/// an offset) into the (date, time) pair slots are keyed by.
fn split_date_time(value: &str) -> Option<(String, String)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some((
            dt.format("%Y-%m-%d").to_string(),
            dt.format("%H:%M").to_string(),
        ));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .ok()?;

    Some((
        naive.format("%Y-%m-%d").to_string(),
        naive.format("%H:%M").to_string(),
    ))
}

/// Slot wall-clock time anchored to the requested timezone, as RFC3339.
fn start_rfc3339(date: &str, time: &str, time_zone: &str) -> AppResult<String> {
    let tz: Tz = time_zone
        .parse()
        .map_err(|_| AppError::BadRequest("Fuso horário inválido.".to_string()))?;

    let naive = NaiveDateTime::parse_from_str(&format!("{}T{}", date, time), "%Y-%m-%dT%H:%M")
        .map_err(|_| AppError::BadRequest("Data ou hora inválida.".to_string()))?;

    let local = tz.from_local_datetime(&naive).single().ok_or_else(|| {
        AppError::BadRequest("Data/hora inválida no fuso horário informado.".to_string())
    })?;

    Ok(local.to_rfc3339())
}

fn consultation_event(name: &str, email: &str, start: &str, time_zone: &str) -> GcalEvent {
    GcalEvent {
        summary: Some(format!("Consulta com {}", name)),
        description: Some(format!(
            "Consulta espiritual agendada por {} ({})",
            name, email
        )),
        start: Some(EventDateTime {
            date_time: Some(start.to_string()),
            time_zone: Some(time_zone.to_string()),
            date: None,
        }),
        attendees: Some(vec![EventAttendee {
            email: email.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Confirmation emails are best-effort: a booked consultation never fails
/// because the mail provider hiccuped.
fn notify_booking(state: &AppState, input: &BookingInput) {
    let Some(mailer) = state.mailer.clone() else {
        tracing::debug!("Mailer não configurado; pulando e-mails de confirmação");
        return;
    };

    let input = input.clone();
    tokio::spawn(async move {
        let when = format!("{} {} ({})", input.date, input.time, input.time_zone);

        let provider_body = format!(
            "Cliente: {}\nEmail: {}\nData: {}",
            input.name, input.email, when
        );
        if let Err(e) = mailer
            .send(
                mailer.notification_email(),
                "Nova consulta agendada",
                &provider_body,
            )
            .await
        {
            tracing::warn!("Falha ao notificar o consultor: {:?}", e);
        }

        let client_body = format!("Sua consulta espiritual foi confirmada para {}.", when);
        if let Err(e) = mailer
            .send(&input.email, "Consulta agendada com sucesso!", &client_body)
            .await
        {
            tracing::warn!("Falha ao enviar confirmação para {}: {:?}", input.email, e);
        }
    });
}
