//! Sleep-command policy and wire encoding.
//!
//! After an EOF, the remote node opens a brief reception window for a
//! sleep-duration command before powering down. [`sleep_duration_for`] picks
//! the duration; [`encode_sleep_command`] renders the literal wire text.

use chrono::Timelike;
use sensorlink_core::constants::{
    AFTERNOON_HOUR_BOUNDARY, DEFAULT_SLEEP_SECS, LONG_SLEEP_SECS, LOW_VOLTAGE_THRESHOLD_PERCENT,
    MEDIUM_SLEEP_SECS, NORMAL_SLEEP_SECS,
};
use sensorlink_core::Sid;

/// Choose a sleep duration, in seconds, given the source's cached voltage and
/// the local wall-clock hour (0-23).
///
/// | Condition | Duration |
/// |---|---|
/// | voltage unknown | `DEFAULT_SLEEP` |
/// | voltage < threshold, hour >= 12 | `LONG_SLEEP` |
/// | voltage < threshold, hour < 12 | `MEDIUM_SLEEP` |
/// | otherwise | `NORMAL_SLEEP` |
#[must_use]
pub fn sleep_duration_for(voltage_percent: Option<f64>, local_hour: u32) -> u64 {
    let Some(voltage) = voltage_percent else {
        return DEFAULT_SLEEP_SECS;
    };

    if voltage < LOW_VOLTAGE_THRESHOLD_PERCENT {
        if local_hour >= AFTERNOON_HOUR_BOUNDARY { LONG_SLEEP_SECS } else { MEDIUM_SLEEP_SECS }
    } else {
        NORMAL_SLEEP_SECS
    }
}

/// Convenience wrapper using the current local wall-clock hour.
#[must_use]
pub fn sleep_duration_now(voltage_percent: Option<f64>) -> u64 {
    let hour = chrono::Local::now().hour();
    sleep_duration_for(voltage_percent, hour)
}

/// Render the literal wire text for a sleep command: `CMD_SEND_ESP_NOW:<sid>:<seconds>\n`.
#[must_use]
pub fn encode_sleep_command(sid: Sid, duration_secs: u64) -> String {
    format!("CMD_SEND_ESP_NOW:{}:{}\n", sid.to_hex_colon(), duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_voltage_uses_default() {
        assert_eq!(sleep_duration_for(None, 14), DEFAULT_SLEEP_SECS);
    }

    #[test]
    fn low_voltage_afternoon_uses_long_sleep() {
        assert_eq!(sleep_duration_for(Some(5.0), 14), LONG_SLEEP_SECS);
    }

    #[test]
    fn low_voltage_morning_uses_medium_sleep() {
        assert_eq!(sleep_duration_for(Some(5.0), 10), MEDIUM_SLEEP_SECS);
    }

    #[test]
    fn normal_voltage_uses_normal_sleep() {
        assert_eq!(sleep_duration_for(Some(85.0), 14), NORMAL_SLEEP_SECS);
    }

    #[test]
    fn boundary_hour_counts_as_afternoon() {
        assert_eq!(sleep_duration_for(Some(5.0), 12), LONG_SLEEP_SECS);
    }

    #[test]
    fn command_wire_form_matches_scenarios() {
        let sid = Sid::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(
            encode_sleep_command(sid, 600),
            "CMD_SEND_ESP_NOW:01:02:03:04:05:06:600\n"
        );
    }
}
