use chrono::NaiveTime;
use validator::ValidationError;

const MINUTES_PER_DAY: i32 = 24 * 60;

/// Parse a strict "HH:MM" time of day.
pub fn parse_hour(value: &str) -> Option<NaiveTime> {
    if value.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

/// Integer hour in front of the first ':' ("07:45" -> 7).
pub fn hour_component(value: &str) -> Option<u32> {
    let (hour, _) = value.split_once(':')?;
    hour.trim().parse().ok()
}

/// Minutes from departure to arrival, wrapping past midnight.
pub fn ride_duration(departure: &str, arrival: &str) -> Option<i32> {
    let departure = parse_hour(departure)?;
    let arrival = parse_hour(arrival)?;

    let minutes = (arrival - departure).num_minutes() as i32;
    Some(if minutes < 0 {
        minutes + MINUTES_PER_DAY
    } else {
        minutes
    })
}

pub fn validate_hour(value: &str) -> Result<(), ValidationError> {
    if parse_hour(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("time_format").with_message("expected HH:MM".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_day_duration() {
        assert_eq!(ride_duration("08:15", "10:45"), Some(150));
        assert_eq!(ride_duration("10:00", "10:00"), Some(0));
    }

    #[test]
    fn test_duration_wraps_past_midnight() {
        assert_eq!(ride_duration("22:30", "01:15"), Some(165));
        assert_eq!(ride_duration("23:59", "00:00"), Some(1));
    }

    #[test]
    fn test_duration_rejects_bad_input() {
        assert_eq!(ride_duration("8:15", "10:45"), None);
        assert_eq!(ride_duration("08:15", "25:00"), None);
        assert_eq!(ride_duration("", "10:45"), None);
    }

    #[test]
    fn test_hour_component() {
        assert_eq!(hour_component("07:00"), Some(7));
        assert_eq!(hour_component("7:30"), Some(7));
        assert_eq!(hour_component("23:59"), Some(23));
        assert_eq!(hour_component("noon"), None);
        assert_eq!(hour_component("ab:00"), None);
    }

    #[test]
    fn test_validate_hour() {
        assert!(validate_hour("00:00").is_ok());
        assert!(validate_hour("24:00").is_err());
        assert!(validate_hour("12h30").is_err());
    }
}
