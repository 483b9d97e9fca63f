//! Offline slot seeding: enumerate working-day consultation windows over a
//! fixed horizon and upsert them, ignoring duplicates. Run out-of-band via
//! the `seed-slots` subcommand, never during request serving.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::America::Sao_Paulo;
use sqlx::SqlitePool;

use crate::db::SlotRepository;
use crate::error::AppResult;
use crate::services::gcal::CONSULTATION_DURATION_MINUTES;

/// How far ahead slots are generated.
pub const SEED_DAYS_AHEAD: i64 = 90;

const WORK_START: (u32, u32) = (13, 0);
const WORK_END: (u32, u32) = (20, 0);

/// All (date, time) pairs for the horizon starting at `start`: Monday through
/// Saturday, 13:00 to 20:00, stepped by the consultation duration. A slot is
/// only emitted when it ends within working hours.
pub fn enumerate_slots(start: NaiveDate, days_ahead: i64) -> Vec<(String, String)> {
    let work_start = NaiveTime::from_hms_opt(WORK_START.0, WORK_START.1, 0).unwrap();
    let work_end = NaiveTime::from_hms_opt(WORK_END.0, WORK_END.1, 0).unwrap();
    let step = Duration::minutes(CONSULTATION_DURATION_MINUTES);

    let mut slots = Vec::new();

    for offset in 0..days_ahead {
        let date = start + Duration::days(offset);
        if date.weekday() == Weekday::Sun {
            continue;
        }

        let mut time = work_start;
        while time + step <= work_end {
            slots.push((
                date.format("%Y-%m-%d").to_string(),
                time.format("%H:%M").to_string(),
            ));
            time = time + step;
        }
    }

    slots
}

/// Insert the generated slots; re-runs only add what is missing.
pub async fn seed_slots(pool: &SqlitePool) -> AppResult<u64> {
    let today = Utc::now().with_timezone(&Sao_Paulo).date_naive();
    seed_slots_from(pool, today, SEED_DAYS_AHEAD).await
}

pub async fn seed_slots_from(
    pool: &SqlitePool,
    start: NaiveDate,
    days_ahead: i64,
) -> AppResult<u64> {
    tracing::info!(
        "Iniciando adição de slots de {} minutos ({} dias a partir de {})",
        CONSULTATION_DURATION_MINUTES,
        days_ahead,
        start
    );

    let mut added = 0u64;
    for (date, time) in enumerate_slots(start, days_ahead) {
        if SlotRepository::upsert_ignore(pool, &date, &time).await? {
            added += 1;
        }
    }

    tracing::info!(
        "Finalizado! Total de {} novos slots adicionados (duplicatas ignoradas).",
        added
    );

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::test_pool;

    #[test]
    fn sundays_are_skipped() {
        // 2025-07-20 is a Sunday.
        let start = NaiveDate::from_ymd_opt(2025, 7, 20).unwrap();
        let slots = enumerate_slots(start, 2);

        assert!(slots.iter().all(|(date, _)| date == "2025-07-21"));
    }

    #[test]
    fn working_day_has_four_consultation_windows() {
        // 2025-07-21 is a Monday.
        let start = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let slots = enumerate_slots(start, 1);

        let times: Vec<&str> = slots.iter().map(|(_, t)| t.as_str()).collect();
        // 17:30 + 90min = 19:00 fits; the next step would end past 20:00.
        assert_eq!(times, vec!["13:00", "14:30", "16:00", "17:30"]);
    }

    #[test]
    fn horizon_is_respected() {
        let start = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let slots = enumerate_slots(start, 7);

        assert!(slots.iter().all(|(date, _)| date.as_str() < "2025-07-28"));
        // Six working days in a Monday-started week.
        assert_eq!(slots.len(), 6 * 4);
    }

    #[tokio::test]
    async fn reseeding_is_idempotent() {
        let pool = test_pool().await;
        let start = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();

        let first = seed_slots_from(&pool, start, 3).await.unwrap();
        assert_eq!(first, 3 * 4);

        let second = seed_slots_from(&pool, start, 3).await.unwrap();
        assert_eq!(second, 0);

        let all = SlotRepository::list_available(&pool, None).await.unwrap();
        assert_eq!(all.len() as u64, first);
    }
}
