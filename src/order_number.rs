//! Date-scoped, human readable order numbers: `<PREFIX>-<YYYYMMDD>-<seq>`.
//!
//! The sequence lives in `order_sequences`, one row per prefix and business day. It is
//! bumped inside the checkout transaction, so the row lock serializes concurrent
//! checkouts and a rolled back checkout gives its number back.

use chrono::{DateTime, Days, FixedOffset, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};

/// Upsert that returns the next sequence for a day. The persisted orders of that day
/// act as a floor, which seeds a fresh counter and repairs a stale one.
const NEXT_SEQUENCE_SQL: &str = r#"
    WITH persisted AS (
        SELECT COALESCE(MAX(CAST(SUBSTRING(order_number FROM $4) AS INTEGER)), 0) AS max_seq
        FROM orders
        WHERE order_number LIKE $3
          AND SUBSTRING(order_number FROM $4) ~ '^[0-9]+$'
    )
    INSERT INTO order_sequences (prefix, business_day, last_seq)
    SELECT $1, $2, persisted.max_seq + 1 FROM persisted
    ON CONFLICT (prefix, business_day) DO UPDATE
        SET last_seq = GREATEST(
            order_sequences.last_seq,
            (SELECT max_seq FROM persisted)
        ) + 1
    RETURNING last_seq
"#;

/// `TMA-20250614-007`. Sequences past 999 keep all their digits.
pub fn format_order_number(prefix: &str, day: NaiveDate, seq: i32) -> String {
    format!("{}-{}-{:03}", prefix, day.format("%Y%m%d"), seq)
}

/// Everything before the sequence digits, e.g. `TMA-20250614-`.
pub fn day_stem(prefix: &str, day: NaiveDate) -> String {
    format!("{}-{}-", prefix, day.format("%Y%m%d"))
}

/// The local calendar day an instant belongs to.
pub fn business_day<Tz: TimeZone>(at: &DateTime<Tz>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Local midnight of `day` up to (excluding) the following midnight.
pub fn day_bounds(day: NaiveDate) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
    (local_midnight(day), local_midnight(next))
}

/// Start of the local day. On DST gaps the earliest valid instant is used.
pub fn local_midnight(day: NaiveDate) -> DateTime<FixedOffset> {
    let naive = day.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.fixed_offset(),
        LocalResult::None => Local.from_utc_datetime(&naive).fixed_offset(),
    }
}

/// Reserve the next sequence for `prefix` on `day` within the caller's transaction.
pub async fn next_sequence<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    day: NaiveDate,
) -> Result<i32, DbErr> {
    let stem = day_stem(prefix, day);
    // SUBSTRING is 1-based
    let digits_from = stem.chars().count() as i32 + 1;
    let pattern = format!("{stem}%");

    let row = conn
        .query_one(Statement::from_sql_and_values(
            DbBackend::Postgres,
            NEXT_SEQUENCE_SQL,
            [
                prefix.into(),
                day.into(),
                pattern.into(),
                digits_from.into(),
            ],
        ))
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("order_sequences row was not returned".into()))?;

    row.try_get::<i32>("", "last_seq")
}

/// Reserve and format the next order number for `day`.
pub async fn next_order_number<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
    day: NaiveDate,
) -> Result<String, DbErr> {
    let seq = next_sequence(conn, prefix, day).await?;
    Ok(format_order_number(prefix, day, seq))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_14() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()
    }

    #[test]
    fn pads_sequence_to_three_digits() {
        assert_eq!(format_order_number("TMA", june_14(), 7), "TMA-20250614-007");
        assert_eq!(format_order_number("TMA", june_14(), 42), "TMA-20250614-042");
        assert_eq!(format_order_number("TMA", june_14(), 1234), "TMA-20250614-1234");
    }

    #[test]
    fn stem_is_a_prefix_of_every_number_that_day() {
        let stem = day_stem("TMA", june_14());
        assert_eq!(stem, "TMA-20250614-");
        assert!(format_order_number("TMA", june_14(), 1).starts_with(&stem));
    }

    #[test]
    fn day_bounds_cover_one_local_day() {
        let (start, end) = day_bounds(june_14());
        assert_eq!(business_day(&start), june_14());
        assert!(end > start);
        assert_eq!(
            business_day(&end),
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
        );
    }
}
