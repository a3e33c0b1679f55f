/// Converts decibels to a linear gain factor. Anything at or below -100 dB
/// is treated as silence.
pub fn decibels_to_gain(decibels: f32) -> f32 {
    if decibels > -100.0 {
        10.0_f32.powf(decibels * 0.05)
    } else {
        0.0
    }
}

/// Converts a linear gain factor to decibels, with a -100 dB silence floor.
pub fn gain_to_decibels(gain: f32) -> f32 {
    if gain <= 0.00001 {
        -100.0
    } else {
        20.0 * gain.log10()
    }
}

/// Converts timecents to seconds: `2^(t/1200)`. Also doubles as the
/// cents-to-frequency-ratio curve used by the pitch path, since both are the
/// same exponential.
pub fn timecents_to_seconds(timecents: f32) -> f32 {
    2.0_f32.powf(timecents / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decibel_round_trip() {
        for gain in [0.001_f32, 0.5, 1.0, 2.5, 10.0] {
            let back = decibels_to_gain(gain_to_decibels(gain));
            assert!((back - gain).abs() < gain * 1e-4, "{} -> {}", gain, back);
        }
    }

    #[test]
    fn silence_floors() {
        assert_eq!(decibels_to_gain(-100.0), 0.0);
        assert_eq!(gain_to_decibels(0.0), -100.0);
    }

    #[test]
    fn timecents() {
        assert!((timecents_to_seconds(0.0) - 1.0).abs() < 1e-6);
        assert!((timecents_to_seconds(1200.0) - 2.0).abs() < 1e-6);
        assert!((timecents_to_seconds(-1200.0) - 0.5).abs() < 1e-6);
    }
}
