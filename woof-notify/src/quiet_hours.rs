//! Quiet hours: a time-of-day window in which the detection threshold is
//! raised. Grounded on `QuietHoursConfig.is_active`/`get_threshold` in the
//! original Python `config.py`. Fails safe: any lookup error (bad timezone,
//! malformed time string — both already rejected by `Config::validate`, but
//! defended here too) is treated as "not in quiet hours", never the reverse.

use chrono::{DateTime, Timelike, Utc};

use woof_protocol::config::{parse_hhmm, QuietHoursConfig};

pub fn is_active(config: &QuietHoursConfig, now: DateTime<Utc>) -> bool {
    if !config.enabled {
        return false;
    }

    match try_is_active(config, now) {
        Ok(active) => active,
        Err(reason) => {
            log::warn!("quiet_hours_check_failed reason={reason}");
            false
        }
    }
}

fn try_is_active(config: &QuietHoursConfig, now: DateTime<Utc>) -> Result<bool, String> {
    let tz: chrono_tz::Tz = config
        .timezone
        .parse()
        .map_err(|_| format!("invalid timezone {:?}", config.timezone))?;
    let local = now.with_timezone(&tz);

    let (start_h, start_m) = parse_hhmm(&config.start_hhmm).map_err(|e| e.to_string())?;
    let (end_h, end_m) = parse_hhmm(&config.end_hhmm).map_err(|e| e.to_string())?;

    let current_minutes = local.hour() * 60 + local.minute();
    let start_minutes = start_h * 60 + start_m;
    let end_minutes = end_h * 60 + end_m;

    Ok(if start_minutes <= end_minutes {
        current_minutes >= start_minutes && current_minutes < end_minutes
    } else {
        current_minutes >= start_minutes || current_minutes < end_minutes
    })
}

/// Returns the quiet-hours threshold if currently active, else `default`.
pub fn get_threshold(config: &QuietHoursConfig, default: f32) -> f32 {
    if is_active(config, Utc::now()) {
        config.threshold
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn midnight_crossing() -> QuietHoursConfig {
        QuietHoursConfig {
            enabled: true,
            start_hhmm: "22:00".to_string(),
            end_hhmm: "06:00".to_string(),
            threshold: 0.9,
            notifications: false,
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn disabled_is_never_active() {
        let mut config = midnight_crossing();
        config.enabled = false;
        assert!(!is_active(&config, utc(2026, 1, 11, 23, 0, 0)));
    }

    #[test]
    fn exact_start_is_active_exact_end_is_not() {
        let config = midnight_crossing();
        assert!(is_active(&config, utc(2026, 1, 11, 22, 0, 0)));
        assert!(!is_active(&config, utc(2026, 1, 11, 21, 59, 59)));
        assert!(!is_active(&config, utc(2026, 1, 12, 6, 0, 0)));
        assert!(is_active(&config, utc(2026, 1, 12, 5, 59, 59)));
        assert!(is_active(&config, utc(2026, 1, 12, 0, 0, 0)));
    }

    #[test]
    fn same_day_range_does_not_cross_midnight() {
        let config = QuietHoursConfig {
            enabled: true,
            start_hhmm: "09:00".to_string(),
            end_hhmm: "17:00".to_string(),
            threshold: 0.9,
            notifications: false,
            timezone: "UTC".to_string(),
        };
        assert!(is_active(&config, utc(2026, 1, 11, 12, 0, 0)));
        assert!(!is_active(&config, utc(2026, 1, 11, 8, 59, 59)));
        assert!(!is_active(&config, utc(2026, 1, 11, 17, 0, 0)));
    }

    #[test]
    fn get_threshold_falls_back_outside_window() {
        let config = midnight_crossing();
        assert_eq!(get_threshold(&config, 0.5), 0.5);
    }

    #[test]
    fn invalid_timezone_fails_safe_to_inactive() {
        let mut config = midnight_crossing();
        config.timezone = "Not/A/Timezone".to_string();
        assert!(!is_active(&config, utc(2026, 1, 11, 23, 0, 0)));
    }
}
