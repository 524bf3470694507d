use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::model::SlotKey;
use crate::error::GridError;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Floor a timestamp to a multiple of `minutes` counted from midnight.
pub fn floor_to_interval(ts: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    let minute_of_day = ts.hour() * 60 + ts.minute();
    let floored = minute_of_day - minute_of_day % minutes.max(1);
    ts.date().and_time(NaiveTime::MIN) + Duration::minutes(i64::from(floored))
}

/// Encode a timestamp as `YYYYMMDD` followed by its 1-based slot number.
///
/// The slot is `floor(minute_of_day / (1440 / slots_per_day)) + 1`, so with
/// 24 slots a day `2018-11-01 00:59` maps to `2018110101`.
pub fn encode_slot(ts: NaiveDateTime, slots_per_day: u32) -> Result<SlotKey, GridError> {
    let interval = MINUTES_PER_DAY / slots_per_day.max(1);
    let slot = (ts.hour() * 60 + ts.minute()) / interval.max(1) + 1;
    if !(0..=9999).contains(&ts.year()) || slot > 99 {
        return Err(GridError::UnencodableTimestamp(ts));
    }
    let text = format!(
        "{:04}{:02}{:02}{:02}",
        ts.year(),
        ts.month(),
        ts.day(),
        slot
    );
    SlotKey::from_bytes(text.as_bytes())
}

/// Start of the slot a key refers to.
pub fn decode_slot(key: &SlotKey, slots_per_day: u32) -> Result<NaiveDateTime, GridError> {
    let invalid = |reason| GridError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    let date = NaiveDate::from_ymd_opt(key.year(), key.month(), key.day_of_month())
        .ok_or_else(|| invalid("not a calendar date"))?;
    let slot = key.slot();
    if slot == 0 || slot > slots_per_day {
        return Err(invalid("slot out of range"));
    }
    let interval = MINUTES_PER_DAY / slots_per_day;
    Ok(date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from((slot - 1) * interval)))
}

/// Encode a slice of floored timestamps.
pub fn encode_all(
    timestamps: &[NaiveDateTime],
    slots_per_day: u32,
) -> Result<Vec<SlotKey>, GridError> {
    timestamps
        .iter()
        .map(|&ts| encode_slot(ts, slots_per_day))
        .collect()
}
