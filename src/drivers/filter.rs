use core::f32::consts::PI;

use crate::error::ConfigError;

/// Fixed-point scaling of the IIR accumulator (Q8)
pub const IIR_SHIFT: u32 = 8;

/// IIR attenuation factor in [1, 2^IIR_SHIFT].
///
/// 1 is the heaviest smoothing, 256 passes the input straight through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attenuation(i32);

impl Attenuation {
    pub const MIN: i32 = 1;
    pub const MAX: i32 = 1 << IIR_SHIFT;

    pub fn new(factor: i32) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&factor) {
            Ok(Self(factor))
        } else {
            Err(ConfigError::FilterAttenuation(factor))
        }
    }

    /// Factor for a wanted cutoff: `round(2^shift / (fs / (2π·fc)))`
    pub fn from_cutoff(sample_rate_hz: f32, cutoff_hz: f32) -> Result<Self, ConfigError> {
        let valid = |f: f32| f.is_finite() && f > 0.0;
        if !valid(sample_rate_hz) || !valid(cutoff_hz) {
            return Err(ConfigError::NonPositiveFrequency);
        }

        let attenuation = sample_rate_hz / (2.0 * PI * cutoff_hz);
        let factor = (Self::MAX as f32) / attenuation + 0.5;
        // clamp before the cast so a silly cutoff still reports a readable factor
        let factor = factor.min(i32::MAX as f32) as i32;
        Self::new(factor)
    }

    pub fn factor(self) -> i32 {
        self.0
    }
}

/// One step of the single-pole low-pass.
///
/// `acc` holds the filtered value in Q8. Its magnitude stays within
/// `2^23 + 2^8` for any i16 input, far inside i32.
pub fn iir_lpf_single(input: i16, att: Attenuation, acc: i32) -> (i16, i32) {
    let input_scaled = (input as i32) << IIR_SHIFT;
    let acc = acc + ((input_scaled - acc) >> IIR_SHIFT) * att.0;

    // round half up on the dropped fraction bits
    let rounding = (acc & (1 << (IIR_SHIFT - 1))) >> (IIR_SHIFT - 1);
    let out = (acc >> IIR_SHIFT) + rounding;
    let out = out.clamp(i16::MIN as i32, i16::MAX as i32) as i16;

    (out, acc)
}

/// Per-axis IIR low-pass for a 3-axis raw stream.
pub struct IirLpf {
    attenuation: Attenuation,
    acc: [i32; 3],
}

impl IirLpf {
    pub fn new(attenuation: Attenuation) -> Self {
        Self { attenuation, acc: [0; 3] }
    }

    pub fn filter(&mut self, input: [i16; 3]) -> [i16; 3] {
        let mut out = [0i16; 3];
        for axis in 0..3 {
            let (filtered, acc) = iir_lpf_single(input[axis], self.attenuation, self.acc[axis]);
            self.acc[axis] = acc;
            out[axis] = filtered;
        }
        out
    }

    pub fn accumulators(&self) -> [i32; 3] {
        self.acc
    }

    pub fn attenuation(&self) -> Attenuation {
        self.attenuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_for_default_tuning() {
        // 500 Hz sample rate, 4 Hz cutoff
        let att = Attenuation::from_cutoff(500.0, 4.0).unwrap();
        assert_eq!(att.factor(), 13);
    }

    #[test]
    fn out_of_range_cutoff_is_config_error() {
        // cutoff far above the sample rate → factor > 256
        assert!(matches!(
            Attenuation::from_cutoff(500.0, 1000.0),
            Err(ConfigError::FilterAttenuation(f)) if f > 256
        ));
        // cutoff so low the factor rounds to zero
        assert_eq!(
            Attenuation::from_cutoff(500.0, 0.01),
            Err(ConfigError::FilterAttenuation(0))
        );
        assert_eq!(Attenuation::from_cutoff(500.0, 0.0), Err(ConfigError::NonPositiveFrequency));
        assert_eq!(
            Attenuation::from_cutoff(f32::NAN, 4.0),
            Err(ConfigError::NonPositiveFrequency)
        );
    }

    #[test]
    fn step_response_settles_on_input() {
        let mut lpf = IirLpf::new(Attenuation::new(13).unwrap());
        let mut out = [0i16; 3];
        for _ in 0..500 {
            out = lpf.filter([2048, -2048, 0]);
        }
        assert!((out[0] - 2048).abs() <= 1);
        assert!((out[1] + 2048).abs() <= 1);
        assert_eq!(out[2], 0);
    }

    #[test]
    fn full_attenuation_passes_input_through() {
        let att = Attenuation::new(Attenuation::MAX).unwrap();
        let (out, _) = iir_lpf_single(1234, att, 0);
        assert_eq!(out, 1234);
    }

    #[test]
    fn accumulator_stays_bounded_over_10k_ticks() {
        // xorshift over the full i16 range, which covers ±16 g at 2048 LSB/g
        let mut seed = 0x9E37_79B9u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u16 as i16
        };

        for factor in [1, 13, 128, 256] {
            let att = Attenuation::new(factor).unwrap();
            let mut acc = 0i32;
            for tick in 0..10_000 {
                // alternate random and rail-to-rail inputs
                let input = match tick % 3 {
                    0 => i16::MAX,
                    1 => i16::MIN,
                    _ => next(),
                };
                let (_, next_acc) = iir_lpf_single(input, att, acc);
                acc = next_acc;
                assert!((acc as i64).abs() <= (1i64 << 23) + (1 << IIR_SHIFT));
                assert!((acc as i64).abs() < 1i64 << 31);
            }
        }
    }
}
