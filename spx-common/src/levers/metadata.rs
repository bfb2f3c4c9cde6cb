//! Numeric lever metadata
//!
//! Single source of truth for numeric lever names, defaults and validation.

use super::{LeverMetadata, Levers, SHOW_ALL};

/// Longest ramp either fade lever accepts (ms)
const MAX_FADE_MS: f64 = 60_000.0;

fn non_negative(key: &'static str, v: f64) -> Result<(), String> {
    if !v.is_finite() {
        return Err(format!("{}: value {} is not a finite number", key, v));
    }
    if v < 0.0 {
        return Err(format!("{}: value {} must be non-negative", key, v));
    }
    Ok(())
}

fn in_range(key: &'static str, v: f64, min: f64, max: f64) -> Result<(), String> {
    if !v.is_finite() || v < min || v > max {
        return Err(format!("{}: value {} out of range [{}, {}]", key, v, min, max));
    }
    Ok(())
}

impl Levers {
    /// Metadata for every numeric lever
    ///
    /// Boolean, name and name-set levers are validated structurally in
    /// [`Levers::validate`].
    pub fn metadata() -> &'static [LeverMetadata] {
        &[
            LeverMetadata {
                key: "max_plays",
                data_type: "u32",
                default_value: "1",
                description: "Main-trial plays per stimulus per session",
                validation_range: "1-",
                validator: |v| {
                    if v < 1.0 {
                        return Err(format!("max_plays: value {} must be at least 1", v));
                    }
                    Ok(())
                },
            },
            LeverMetadata {
                key: "familiarization_plays",
                data_type: "u32",
                default_value: "1",
                description: "Plays per reference stimulus per familiarization checkpoint",
                validation_range: "0-",
                validator: |v| non_negative("familiarization_plays", v),
            },
            LeverMetadata {
                key: "reminder_plays",
                data_type: "u32",
                default_value: "1",
                description: "Plays per reference stimulus per reminder checkpoint",
                validation_range: "0-",
                validator: |v| non_negative("reminder_plays", v),
            },
            LeverMetadata {
                key: "reminder_interval",
                data_type: "i64",
                default_value: "1",
                description: "Reminder every N main trials (<= 0 disables reminders)",
                validation_range: "any",
                // Non-positive is meaningful (disabled), so only finiteness is checked
                validator: |v| {
                    if !v.is_finite() {
                        return Err("reminder_interval: not a finite number".to_string());
                    }
                    Ok(())
                },
            },
            LeverMetadata {
                key: "show_n",
                data_type: "i64",
                default_value: "-1",
                description: "Stimuli presented per block (-1 = all)",
                validation_range: "-1 or 0-",
                validator: |v| {
                    if v == SHOW_ALL as f64 {
                        return Ok(());
                    }
                    non_negative("show_n", v)
                },
            },
            LeverMetadata {
                key: "inter_trial_pause_ms",
                data_type: "u64",
                default_value: "2000",
                description: "Blank pause between trials (ms)",
                validation_range: "0-600000",
                validator: |v| in_range("inter_trial_pause_ms", v, 0.0, 600_000.0),
            },
            LeverMetadata {
                key: "min_db",
                data_type: "f64",
                default_value: "68",
                description: "Lower edge of the presentation band (dB SPL)",
                validation_range: "0-140",
                validator: |v| in_range("min_db", v, 0.0, 140.0),
            },
            LeverMetadata {
                key: "max_db",
                data_type: "f64",
                default_value: "70",
                description: "Upper edge of the presentation band (dB SPL)",
                validation_range: "0-140",
                validator: |v| in_range("max_db", v, 0.0, 140.0),
            },
            LeverMetadata {
                key: "target_db",
                data_type: "f64",
                default_value: "69",
                description: "Requested presentation level (dB SPL)",
                validation_range: "0-140",
                validator: |v| in_range("target_db", v, 0.0, 140.0),
            },
            LeverMetadata {
                key: "default_calibration_spl_db",
                data_type: "f64",
                default_value: "94",
                description: "SPL of a 0 dBFS RMS signal when no level test ran",
                validation_range: "0-160",
                validator: |v| in_range("default_calibration_spl_db", v, 0.0, 160.0),
            },
            LeverMetadata {
                key: "sample_rate",
                data_type: "u32",
                default_value: "44100",
                description: "Session sample rate (Hz)",
                validation_range: "8000-192000",
                validator: |v| in_range("sample_rate", v, 8000.0, 192_000.0),
            },
            LeverMetadata {
                key: "playback_watchdog_ms",
                data_type: "u64",
                default_value: "2000",
                description: "Slack beyond stimulus duration before a play is declared stalled (ms)",
                validation_range: "100-60000",
                validator: |v| in_range("playback_watchdog_ms", v, 100.0, 60_000.0),
            },
            LeverMetadata {
                key: "fade_in.duration_ms",
                data_type: "f64",
                default_value: "10",
                description: "Fade-in ramp duration (ms)",
                validation_range: "0-60000",
                validator: |v| in_range("fade_in.duration_ms", v, 0.0, MAX_FADE_MS),
            },
            LeverMetadata {
                key: "fade_in.max_stimulus_ms",
                data_type: "f64",
                default_value: "5000",
                description: "Longest stimulus that gets a fade-in (ms)",
                validation_range: "0-",
                validator: |v| non_negative("fade_in.max_stimulus_ms", v),
            },
            LeverMetadata {
                key: "fade_out.duration_ms",
                data_type: "f64",
                default_value: "10",
                description: "Fade-out ramp duration (ms)",
                validation_range: "0-60000",
                validator: |v| in_range("fade_out.duration_ms", v, 0.0, MAX_FADE_MS),
            },
            LeverMetadata {
                key: "fade_out.max_stimulus_ms",
                data_type: "f64",
                default_value: "5000",
                description: "Longest stimulus that gets a fade-out (ms)",
                validation_range: "0-",
                validator: |v| non_negative("fade_out.max_stimulus_ms", v),
            },
        ]
    }
}
