use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, TimeZone, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Wall-clock time of day an alarm fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlarmTime {
    pub hour: u8,
    pub minute: u8,
}

impl AlarmTime {
    /// Build a validated time of day.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        let time = Self { hour, minute };
        time.validate()?;
        Ok(time)
    }

    /// Records can arrive through deserialization, so the invariant is
    /// re-checked on every store write.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hour > 23 || self.minute > 59 {
            return Err(ValidationError::InvalidTime {
                hour: self.hour,
                minute: self.minute,
            });
        }
        Ok(())
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for AlarmTime {
    type Err = ValidationError;

    /// Parses `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidValue {
            field: "time".into(),
            message: format!("expected HH:MM, got '{s}'"),
        };
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        AlarmTime::new(hour, minute)
    }
}

/// Set of weekdays an alarm repeats on. Empty means one-shot.
///
/// Stored as a bit mask (bit 0 = Monday), serialized as a list of
/// weekday names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Weekday>", from = "Vec<Weekday>")]
pub struct RepeatDays(u8);

impl RepeatDays {
    pub const NONE: RepeatDays = RepeatDays(0);
    pub const EVERY_DAY: RepeatDays = RepeatDays(0b111_1111);
    pub const WEEKDAYS: RepeatDays = RepeatDays(0b001_1111);
    pub const WEEKENDS: RepeatDays = RepeatDays(0b110_0000);

    pub fn is_one_shot(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    /// Days in Monday-first order.
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_DAYS.iter().copied().filter(move |d| self.contains(*d))
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }
}

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl FromIterator<Weekday> for RepeatDays {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut days = RepeatDays::NONE;
        for day in iter {
            days.insert(day);
        }
        days
    }
}

impl From<Vec<Weekday>> for RepeatDays {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<RepeatDays> for Vec<Weekday> {
    fn from(days: RepeatDays) -> Self {
        days.iter().collect()
    }
}

impl FromStr for RepeatDays {
    type Err = ValidationError;

    /// Accepts `daily`, `weekdays`, `weekends`, `none`, or a comma list
    /// such as `mon,wed,fri`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "once" => return Ok(RepeatDays::NONE),
            "daily" | "everyday" => return Ok(RepeatDays::EVERY_DAY),
            "weekdays" => return Ok(RepeatDays::WEEKDAYS),
            "weekends" => return Ok(RepeatDays::WEEKENDS),
            _ => {}
        }
        s.split(',')
            .map(|part| {
                part.trim()
                    .parse::<Weekday>()
                    .map_err(|_| ValidationError::InvalidValue {
                        field: "repeat_days".into(),
                        message: format!("unknown weekday '{}'", part.trim()),
                    })
            })
            .collect()
    }
}

/// Next instant strictly after `after` at which an alarm set for `time`
/// and repeating on `repeat` fires, in the time zone of `after`.
///
/// One-shot alarms fire at the next occurrence of `time`. Local times that
/// fall into a DST gap are skipped to the following eligible day.
pub fn next_occurrence<Tz: TimeZone>(
    time: AlarmTime,
    repeat: RepeatDays,
    after: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let start = after.date_naive();
    for offset in 0..=7u64 {
        let date = start.checked_add_days(Days::new(offset))?;
        if !repeat.is_one_shot() && !repeat.contains(date.weekday()) {
            continue;
        }
        let naive = date.and_hms_opt(time.hour.into(), time.minute.into(), 0)?;
        let Some(candidate) = tz.from_local_datetime(&naive).earliest() else {
            continue;
        };
        if candidate > *after {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn time_validation() {
        assert!(AlarmTime::new(23, 59).is_ok());
        assert!(AlarmTime::new(0, 0).is_ok());
        assert_eq!(
            AlarmTime::new(24, 0),
            Err(ValidationError::InvalidTime { hour: 24, minute: 0 })
        );
        assert!(AlarmTime::new(7, 60).is_err());
    }

    #[test]
    fn time_parses_hh_mm() {
        let t: AlarmTime = "07:30".parse().unwrap();
        assert_eq!(t, AlarmTime { hour: 7, minute: 30 });
        assert_eq!(t.to_string(), "07:30");
        assert!("7h30".parse::<AlarmTime>().is_err());
        assert!("25:00".parse::<AlarmTime>().is_err());
    }

    #[test]
    fn repeat_days_parse_and_serialize() {
        let days: RepeatDays = "mon,wed,fri".parse().unwrap();
        assert!(days.contains(Weekday::Mon));
        assert!(!days.contains(Weekday::Tue));
        assert_eq!(days.iter().count(), 3);

        let json = serde_json::to_string(&days).unwrap();
        let back: RepeatDays = serde_json::from_str(&json).unwrap();
        assert_eq!(back, days);

        assert_eq!("weekdays".parse::<RepeatDays>().unwrap(), RepeatDays::WEEKDAYS);
        assert!("funday".parse::<RepeatDays>().is_err());
    }

    #[test]
    fn one_shot_fires_later_today_or_tomorrow() {
        let time = AlarmTime::new(7, 0).unwrap();
        // 2026-10-16 is a Friday.
        let early = at(2026, 10, 16, 6, 0);
        assert_eq!(
            next_occurrence(time, RepeatDays::NONE, &early),
            Some(at(2026, 10, 16, 7, 0))
        );

        let late = at(2026, 10, 16, 7, 0);
        assert_eq!(
            next_occurrence(time, RepeatDays::NONE, &late),
            Some(at(2026, 10, 17, 7, 0))
        );
    }

    #[test]
    fn repeating_skips_unselected_days() {
        let time = AlarmTime::new(7, 0).unwrap();
        let friday_noon = at(2026, 10, 16, 12, 0);
        assert_eq!(
            next_occurrence(time, RepeatDays::WEEKDAYS, &friday_noon),
            Some(at(2026, 10, 19, 7, 0))
        );

        let only_friday: RepeatDays = [Weekday::Fri].into_iter().collect();
        assert_eq!(
            next_occurrence(time, only_friday, &friday_noon),
            Some(at(2026, 10, 23, 7, 0))
        );
    }
}
