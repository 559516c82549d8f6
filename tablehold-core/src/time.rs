//! Canonical slot time.
//!
//! Every time of day is stored and compared as minutes since midnight. Strings
//! are only parsed at the edge (24h `HH:MM` or 12h `h:mm AM/PM`) and always
//! rendered back as `HH:MM`.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ReservationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn from_minutes(minutes: u16) -> Result<Self, ReservationError> {
        if minutes >= Self::MINUTES_PER_DAY {
            return Err(ReservationError::validation(format!(
                "minute of day out of range: {}",
                minutes
            )));
        }
        Ok(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, ReservationError> {
        if hour >= 24 || minute >= 60 {
            return Err(ReservationError::validation(format!(
                "invalid time {}:{:02}",
                hour, minute
            )));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = ReservationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ReservationError::validation(format!("invalid time of day: {:?}", raw));

        let upper = raw.trim().to_ascii_uppercase();
        let (clock, pm) = if let Some(rest) = upper.strip_suffix("AM") {
            (rest.trim_end(), Some(false))
        } else if let Some(rest) = upper.strip_suffix("PM") {
            (rest.trim_end(), Some(true))
        } else {
            (upper.as_str(), None)
        };

        let (h, m) = clock.split_once(':').ok_or_else(invalid)?;
        if m.len() != 2 || h.is_empty() || h.len() > 2 {
            return Err(invalid());
        }
        let hour: u16 = h.parse().map_err(|_| invalid())?;
        let minute: u16 = m.parse().map_err(|_| invalid())?;

        let hour = match pm {
            None => hour,
            Some(_) if hour == 0 || hour > 12 => return Err(invalid()),
            Some(false) => hour % 12,
            Some(true) => hour % 12 + 12,
        };

        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WindowFields")]
pub struct TimeWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

#[derive(Deserialize)]
struct WindowFields {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl TryFrom<WindowFields> for TimeWindow {
    type Error = ReservationError;

    fn try_from(raw: WindowFields) -> Result<Self, Self::Error> {
        TimeWindow::new(raw.start, raw.end)
    }
}

impl TimeWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, ReservationError> {
        if start >= end {
            return Err(ReservationError::validation(format!(
                "start time {} must be before end time {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The one overlap rule. Windows that only share an endpoint do not overlap.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn same_as(&self, other: &TimeWindow) -> bool {
        self.start == other.start && self.end == other.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The unit of exclusivity: one table, one date, one time window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SlotFields")]
pub struct Slot {
    pub restaurant_id: String,
    pub table_id: String,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

#[derive(Deserialize)]
struct SlotFields {
    restaurant_id: String,
    table_id: String,
    date: NaiveDate,
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl TryFrom<SlotFields> for Slot {
    type Error = ReservationError;

    fn try_from(raw: SlotFields) -> Result<Self, Self::Error> {
        Slot::new(raw.restaurant_id, raw.table_id, raw.date, raw.start_time, raw.end_time)
    }
}

impl Slot {
    pub fn new(
        restaurant_id: impl Into<String>,
        table_id: impl Into<String>,
        date: NaiveDate,
        start_time: TimeOfDay,
        end_time: TimeOfDay,
    ) -> Result<Self, ReservationError> {
        let restaurant_id = restaurant_id.into();
        let table_id = table_id.into();
        if restaurant_id.trim().is_empty() {
            return Err(ReservationError::validation("restaurant_id is required"));
        }
        if table_id.trim().is_empty() {
            return Err(ReservationError::validation("table_id is required"));
        }
        TimeWindow::new(start_time, end_time)?;
        Ok(Self {
            restaurant_id,
            table_id,
            date,
            start_time,
            end_time,
        })
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Same restaurant, table and date; the only slots whose windows are worth comparing.
    pub fn shares_table_day(&self, other: &Slot) -> bool {
        self.restaurant_id == other.restaurant_id
            && self.table_id == other.table_id
            && self.date == other.date
    }

    pub fn with_time(&self, date: NaiveDate, start_time: TimeOfDay, end_time: TimeOfDay) -> Result<Self, ReservationError> {
        Slot::new(self.restaurant_id.clone(), self.table_id.clone(), date, start_time, end_time)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {}",
            self.restaurant_id,
            self.table_id,
            self.date,
            self.window()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> TimeOfDay {
        raw.parse().unwrap()
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(t(start), t(end)).unwrap()
    }

    #[test]
    fn test_12h_and_24h_normalise_to_same_minute() {
        assert_eq!(t("19:00"), t("7:00 PM"));
        assert_eq!(t("7:00pm").minutes(), 19 * 60);
        assert_eq!(t("12:00 AM").minutes(), 0);
        assert_eq!(t("12:30 PM").minutes(), 12 * 60 + 30);
        assert_eq!(t("00:15").to_string(), "00:15");
        assert_eq!(t("9:05 am").to_string(), "09:05");
    }

    #[test]
    fn test_rejects_malformed_times() {
        for raw in ["24:00", "19:60", "7pm", "13:00 PM", "0:30 AM", "19:0", "", "ab:cd"] {
            assert!(raw.parse::<TimeOfDay>().is_err(), "{} should not parse", raw);
        }
    }

    #[test]
    fn test_partial_overlap_is_flagged() {
        let booked = window("18:00", "20:00");
        assert!(booked.overlaps(&window("19:00", "19:30")));
        assert!(booked.overlaps(&window("17:00", "18:30")));
        assert!(booked.overlaps(&window("17:00", "21:00")));
    }

    #[test]
    fn test_back_to_back_windows_do_not_overlap() {
        let booked = window("18:00", "20:00");
        assert!(!booked.overlaps(&window("20:00", "21:00")));
        assert!(!booked.overlaps(&window("16:00", "18:00")));
    }

    #[test]
    fn test_slot_requires_start_before_end() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert!(Slot::new("r1", "t4", date, t("20:30"), t("19:00")).is_err());
        assert!(Slot::new("r1", "t4", date, t("19:00"), t("19:00")).is_err());
        assert!(Slot::new("", "t4", date, t("19:00"), t("20:00")).is_err());

        let slot = Slot::new("r1", "t4", date, t("19:00"), t("20:30")).unwrap();
        assert_eq!(slot.window().duration_minutes(), 90);
        assert_eq!(slot.to_string(), "r1/t4 2025-03-01 19:00-20:30");
    }

    #[test]
    fn test_serde_uses_canonical_format() {
        let json = serde_json::to_string(&t("7:30 PM")).unwrap();
        assert_eq!(json, "\"19:30\"");
        let back: TimeOfDay = serde_json::from_str("\"7:30 PM\"").unwrap();
        assert_eq!(back.minutes(), 19 * 60 + 30);
    }

    #[test]
    fn test_deserialize_rejects_reversed_window() {
        let err = serde_json::from_value::<TimeWindow>(serde_json::json!({ "start": "20:30", "end": "19:00" }));
        assert!(err.is_err());
        let ok: TimeWindow = serde_json::from_value(serde_json::json!({ "start": "19:00", "end": "20:30" })).unwrap();
        assert_eq!(ok.duration_minutes(), 90);
    }

    #[test]
    fn test_deserialize_slot_runs_constructor_checks() {
        let reversed = serde_json::json!({
            "restaurant_id": "r1",
            "table_id": "t4",
            "date": "2025-03-01",
            "start_time": "20:30",
            "end_time": "19:00"
        });
        assert!(serde_json::from_value::<Slot>(reversed).is_err());

        let blank_table = serde_json::json!({
            "restaurant_id": "r1",
            "table_id": " ",
            "date": "2025-03-01",
            "start_time": "19:00",
            "end_time": "20:30"
        });
        assert!(serde_json::from_value::<Slot>(blank_table).is_err());
    }

    #[test]
    fn test_duration_never_underflows() {
        let inverted = TimeWindow { start: t("20:00"), end: t("19:00") };
        assert_eq!(inverted.duration_minutes(), 0);
    }
}
