use chrono::NaiveDate;
use serde::Deserialize;
use tablehold_core::{ReservationResult, Slot, TimeOfDay};

/// Slot fields as clients send them. Times may be `19:00` or `7:00 PM`; both
/// are normalised here and nowhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct SlotInput {
    pub restaurant_id: String,
    pub table_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

impl SlotInput {
    pub fn into_slot(self) -> ReservationResult<Slot> {
        let start: TimeOfDay = self.start_time.parse()?;
        let end: TimeOfDay = self.end_time.parse()?;
        Slot::new(self.restaurant_id, self.table_id, self.date, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(start: &str, end: &str) -> SlotInput {
        SlotInput {
            restaurant_id: "r1".into(),
            table_id: "t4".into(),
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    #[test]
    fn test_both_clock_formats_normalise() {
        assert_eq!(input("7:00 PM", "8:30 PM").into_slot().unwrap(), input("19:00", "20:30").into_slot().unwrap());
    }

    #[test]
    fn test_bad_times_are_validation_errors() {
        assert!(input("25:00", "26:00").into_slot().is_err());
        assert!(input("20:00", "19:00").into_slot().is_err());
    }
}
