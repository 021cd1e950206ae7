//! crates/tutoring_portal_core/src/schedule.rs
//!
//! Days, periods and individual-tutoring slots.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Teaching days in display order.
pub const DAYS_OF_WEEK: [&str; 6] = ["月", "火", "水", "木", "金", "土"];

/// Days that use the weekday period table.
pub const WEEKDAYS: [&str; 5] = ["月", "火", "水", "木", "金"];

pub const SATURDAY: &str = "土";

/// One row of a period table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub number: u8,
    pub label: &'static str,
    pub time: &'static str,
}

pub const WEEKDAY_PERIODS: [Period; 3] = [
    Period { number: 1, label: "1限", time: "15:30〜16:50" },
    Period { number: 2, label: "2限", time: "17:00〜18:20" },
    Period { number: 3, label: "3限", time: "18:30〜19:50" },
];

pub const SATURDAY_PERIODS: [Period; 4] = [
    Period { number: 1, label: "1限", time: "13:10〜14:30" },
    Period { number: 2, label: "2限", time: "14:40〜16:00" },
    Period { number: 3, label: "3限", time: "16:10〜17:30" },
    Period { number: 4, label: "4限", time: "17:40〜19:00" },
];

pub fn periods_for_day(day: &str) -> &'static [Period] {
    if day == SATURDAY {
        &SATURDAY_PERIODS
    } else {
        &WEEKDAY_PERIODS
    }
}

pub fn day_index(day: &str) -> Option<usize> {
    DAYS_OF_WEEK.iter().position(|d| *d == day)
}

/// Maps both kanji days and the legacy `mon`..`sat` codes to the kanji form.
pub fn day_label(day: &str) -> Option<&'static str> {
    let label = match day {
        "mon" => "月",
        "tue" => "火",
        "wed" => "水",
        "thu" => "木",
        "fri" => "金",
        "sat" => "土",
        other => return DAYS_OF_WEEK.iter().find(|d| **d == other).copied(),
    };
    Some(label)
}

/// `"HH:MM:SS"` becomes `"HH:MM"`; anything without a colon is returned as is.
pub fn format_time(t: &str) -> String {
    let mut parts = t.split(':');
    match (parts.next(), parts.next()) {
        (Some(h), Some(m)) => format!("{h}:{m}"),
        _ => t.to_string(),
    }
}

/// Renders a course's schedule, e.g. `"月曜 16:40〜18:00"`.
pub fn format_schedule(day: Option<&str>, start: Option<&str>, end: Option<&str>) -> String {
    let day = day
        .filter(|d| !d.is_empty())
        .map(|d| day_label(d).unwrap_or(d).to_string());
    let start = start.map(format_time).unwrap_or_default();
    let end = end.map(format_time).unwrap_or_default();

    let time = match (start.is_empty(), end.is_empty()) {
        (false, false) => format!("{start}〜{end}"),
        (false, true) => start,
        (true, false) => end,
        (true, true) => String::new(),
    };

    match day {
        Some(day) if !time.is_empty() => format!("{day}曜 {time}"),
        Some(day) => format!("{day}曜"),
        None => time,
    }
}

//=========================================================================================
// Individual Tutoring Slots
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("malformed slot '{0}', expected '<day>-<period>'")]
    Malformed(String),
    #[error("unknown day '{0}'")]
    UnknownDay(String),
    #[error("period '{period}' does not exist on {day}")]
    UnknownPeriod { day: String, period: String },
}

/// A requested individual-tutoring placement, e.g. `{day: "月", period: "1限"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndividualSlot {
    pub day: String,
    pub period: String,
}

impl IndividualSlot {
    pub fn new(day: impl Into<String>, period: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            period: period.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.day, self.period)
    }

    pub fn validate(&self) -> Result<&'static Period, SlotError> {
        if day_index(&self.day).is_none() {
            return Err(SlotError::UnknownDay(self.day.clone()));
        }
        periods_for_day(&self.day)
            .iter()
            .find(|p| p.label == self.period)
            .ok_or_else(|| SlotError::UnknownPeriod {
                day: self.day.clone(),
                period: self.period.clone(),
            })
    }

    /// Human label such as `"土曜 4限 (17:40〜19:00)"`.
    pub fn label(&self) -> String {
        match self.validate() {
            Ok(p) => format!("{}曜 {} ({})", self.day, p.label, p.time),
            Err(_) => format!("{}曜 {}", self.day, self.period),
        }
    }

    /// Orders by day of week, then by period label.
    pub fn display_order(&self, other: &Self) -> Ordering {
        let a = day_index(&self.day).unwrap_or(usize::MAX);
        let b = day_index(&other.day).unwrap_or(usize::MAX);
        a.cmp(&b).then_with(|| self.period.cmp(&other.period))
    }
}

impl fmt::Display for IndividualSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.day, self.period)
    }
}

impl FromStr for IndividualSlot {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, period) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| SlotError::Malformed(s.to_string()))?;
        let slot = IndividualSlot::new(day, period);
        slot.validate()?;
        Ok(slot)
    }
}

/// Parses the comma separated `slots` query parameter. Empty entries are skipped.
pub fn parse_slot_list(raw: &str) -> Result<Vec<IndividualSlot>, SlotError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<IndividualSlot>())
        .collect()
}

pub fn encode_slot_list(slots: &[IndividualSlot]) -> String {
    slots.iter().map(IndividualSlot::key).collect::<Vec<_>>().join(",")
}

pub fn sort_slots(slots: &mut [IndividualSlot]) {
    slots.sort_by(|a, b| a.display_order(b));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturday_has_a_fourth_period() {
        assert!(IndividualSlot::new("土", "4限").validate().is_ok());
        assert_eq!(
            IndividualSlot::new("金", "4限").validate(),
            Err(SlotError::UnknownPeriod {
                day: "金".to_string(),
                period: "4限".to_string()
            })
        );
    }

    #[test]
    fn unknown_day_is_rejected() {
        assert_eq!(
            IndividualSlot::new("日", "1限").validate(),
            Err(SlotError::UnknownDay("日".to_string()))
        );
    }

    #[test]
    fn parses_query_parameter_and_skips_empty_entries() {
        let slots = parse_slot_list("月-1限,,土-4限").unwrap();
        assert_eq!(
            slots,
            vec![IndividualSlot::new("月", "1限"), IndividualSlot::new("土", "4限")]
        );
        assert_eq!(encode_slot_list(&slots), "月-1限,土-4限");
        assert!(matches!(
            parse_slot_list("月1限"),
            Err(SlotError::Malformed(_))
        ));
    }

    #[test]
    fn sorts_by_day_then_period() {
        let mut slots = vec![
            IndividualSlot::new("土", "1限"),
            IndividualSlot::new("月", "3限"),
            IndividualSlot::new("月", "1限"),
        ];
        sort_slots(&mut slots);
        let keys: Vec<_> = slots.iter().map(IndividualSlot::key).collect();
        assert_eq!(keys, vec!["月-1限", "月-3限", "土-1限"]);
    }

    #[test]
    fn slot_label_includes_time() {
        assert_eq!(
            IndividualSlot::new("土", "4限").label(),
            "土曜 4限 (17:40〜19:00)"
        );
    }

    #[test]
    fn formats_times_and_schedules() {
        assert_eq!(format_time("16:40:00"), "16:40");
        assert_eq!(format_time("16:40"), "16:40");
        assert_eq!(format_time("1640"), "1640");
        assert_eq!(
            format_schedule(Some("mon"), Some("16:40:00"), Some("18:00:00")),
            "月曜 16:40〜18:00"
        );
        assert_eq!(format_schedule(Some("火"), None, None), "火曜");
        assert_eq!(format_schedule(None, Some("16:40"), None), "16:40");
        assert_eq!(format_schedule(None, None, None), "");
    }
}
