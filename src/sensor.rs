//! Sensor readings.
//!
//! The RPC handler reads samples through [`SensorSource`]. The device ships
//! [`SyntheticSensors`], a smooth per-device waveform with a little jitter
//! that stands in for real aquarium probes.

use rand_core::{OsRng, RngCore};
use std::f32::consts::PI;

/// One reading of every channel at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Water temperature in °C.
    pub temperature: f32,
    pub ph: f32,
    /// Salinity in ppt.
    pub salinity: f32,
}

impl SensorSample {
    /// Channel names and values in reporting order.
    pub fn channels(&self) -> [(&'static str, f32); 3] {
        [
            ("temperature", self.temperature),
            ("ph", self.ph),
            ("salinity", self.salinity),
        ]
    }
}

/// Source of sensor samples for a given uptime.
pub trait SensorSource {
    fn sample_at(&mut self, ts_ms: u64) -> SensorSample;
}

/// One sine component of a channel waveform.
struct Wave {
    period_s: f32,
    amplitude: f32,
    phase_salt: u32,
}

/// Waveform and limits of one channel.
struct Channel {
    base: f32,
    waves: [Wave; 2],
    jitter: f32,
    min: f32,
    max: f32,
}

const TEMPERATURE: Channel = Channel {
    base: 26.0,
    waves: [
        Wave { period_s: 120.0, amplitude: 1.2, phase_salt: 0 },
        Wave { period_s: 10.0, amplitude: 0.15, phase_salt: 0x1111 },
    ],
    jitter: 0.05,
    min: 20.0,
    max: 32.0,
};

const PH: Channel = Channel {
    base: 7.40,
    waves: [
        Wave { period_s: 180.0, amplitude: 0.15, phase_salt: 0x2222 },
        Wave { period_s: 12.0, amplitude: 0.03, phase_salt: 0x3333 },
    ],
    jitter: 0.01,
    min: 6.8,
    max: 8.2,
};

const SALINITY: Channel = Channel {
    base: 33.0,
    waves: [
        Wave { period_s: 240.0, amplitude: 0.8, phase_salt: 0x4444 },
        Wave { period_s: 15.0, amplitude: 0.10, phase_salt: 0x5555 },
    ],
    jitter: 0.05,
    min: 28.0,
    max: 36.0,
};

/// Fold a MAC string into a 32-bit seed.
pub fn mac_seed(mac: &str) -> u32 {
    mac.bytes()
        .fold(0u32, |seed, b| seed.wrapping_mul(131).wrapping_add(u32::from(b)))
}

fn wave_at(ts_ms: u64, phase: u32, wave: &Wave) -> f32 {
    let period_ms = (wave.period_s * 1000.0) as u64;
    let shifted = ts_ms.wrapping_add(u64::from(phase ^ wave.phase_salt));
    let frac = (shifted % period_ms) as f32 / period_ms as f32;
    wave.amplitude * (2.0 * PI * frac).sin()
}

/// Deterministic per-device waveform plus random jitter.
pub struct SyntheticSensors<R: RngCore = OsRng> {
    phase: u32,
    /// Offsets added to each channel base (temperature, pH, salinity).
    offsets: [f32; 3],
    rng: R,
}

impl SyntheticSensors<OsRng> {
    /// Sensors for the device with the given MAC, jittered by the OS RNG.
    pub fn from_mac(mac: &str) -> Self {
        Self::with_rng(mac, OsRng)
    }
}

impl<R: RngCore> SyntheticSensors<R> {
    pub fn with_rng(mac: &str, rng: R) -> Self {
        let seed = mac_seed(mac);
        // temperature ±0.5, pH ±0.05, salinity ±0.2
        let offsets = [
            ((seed % 21) as f32 - 10.0) / 20.0,
            ((seed / 21 % 11) as f32 - 5.0) / 100.0,
            ((seed / 231 % 41) as f32 - 20.0) / 100.0,
        ];
        Self {
            phase: seed,
            offsets,
            rng,
        }
    }

    /// Uniform value in `[-magnitude, magnitude]` with 1/1000 resolution.
    fn jitter(&mut self, magnitude: f32) -> f32 {
        let step = (self.rng.next_u32() % 2001) as f32 - 1000.0;
        magnitude * step / 1000.0
    }

    fn channel_at(&mut self, ts_ms: u64, channel: &Channel, offset: f32) -> f32 {
        let smooth: f32 = channel
            .waves
            .iter()
            .map(|w| wave_at(ts_ms, self.phase, w))
            .sum();
        let value = channel.base + offset + smooth + self.jitter(channel.jitter);
        value.clamp(channel.min, channel.max)
    }
}

impl<R: RngCore> SensorSource for SyntheticSensors<R> {
    fn sample_at(&mut self, ts_ms: u64) -> SensorSample {
        let [t_off, p_off, s_off] = self.offsets;
        SensorSample {
            temperature: self.channel_at(ts_ms, &TEMPERATURE, t_off),
            ph: self.channel_at(ts_ms, &PH, p_off),
            salinity: self.channel_at(ts_ms, &SALINITY, s_off),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RNG that always lands in the middle of the jitter range.
    struct NoJitter;

    impl RngCore for NoJitter {
        fn next_u32(&mut self) -> u32 {
            1000
        }
        fn next_u64(&mut self) -> u64 {
            1000
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    const MAC: &str = "02:00:00:AA:4E:01";

    #[test]
    fn test_mac_seed() {
        assert_eq!(mac_seed(""), 0);
        assert_eq!(mac_seed("A"), 65);
        assert_eq!(mac_seed("AB"), 65 * 131 + 66);
    }

    #[test]
    fn test_same_mac_same_waveform() {
        let mut a = SyntheticSensors::with_rng(MAC, NoJitter);
        let mut b = SyntheticSensors::with_rng(MAC, NoJitter);
        for ts in [0, 500, 61_000, 3_600_000] {
            assert_eq!(a.sample_at(ts), b.sample_at(ts));
        }
    }

    #[test]
    fn test_values_stay_in_range() {
        let mut sensors = SyntheticSensors::from_mac(MAC);
        for i in 0..2_000u64 {
            let s = sensors.sample_at(i * 997);
            assert!((20.0..=32.0).contains(&s.temperature));
            assert!((6.8..=8.2).contains(&s.ph));
            assert!((28.0..=36.0).contains(&s.salinity));
        }
    }

    #[test]
    fn test_values_near_base() {
        let mut sensors = SyntheticSensors::with_rng("AA:BB:CC:DD:EE:FF", NoJitter);
        let s = sensors.sample_at(12_345);
        // base ± offset ± both wave amplitudes
        assert!((s.temperature - 26.0).abs() <= 0.5 + 1.35 + 1e-3);
        assert!((s.ph - 7.40).abs() <= 0.05 + 0.18 + 1e-3);
        assert!((s.salinity - 33.0).abs() <= 0.2 + 0.9 + 1e-3);
    }

    #[test]
    fn test_channel_order() {
        let sample = SensorSample {
            temperature: 1.0,
            ph: 2.0,
            salinity: 3.0,
        };
        let names: Vec<_> = sample.channels().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, ["temperature", "ph", "salinity"]);
    }
}
