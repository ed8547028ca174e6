//! Pluggable noise-canceling transform, upstream of the transcriber and off
//! the interruption path (spec §4.6). The DSP internals of a real denoiser
//! are out of scope (spec §1) — this crate specifies only the interface and
//! a trivial selectable pair of implementations.

/// Synchronous transform over LINEAR16 little-endian PCM bytes.
pub trait NoiseCanceler: Send + Sync {
    fn cancel_noise(&self, audio: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCanceler;

impl NoiseCanceler for PassthroughCanceler {
    fn cancel_noise(&self, audio: &[u8]) -> Vec<u8> {
        audio.to_vec()
    }
}

/// Zeroes out samples below `threshold` magnitude. Not a real denoiser — a
/// stand-in selectable implementation per the interface contract.
#[derive(Debug, Clone, Copy)]
pub struct EnergyGateCanceler {
    pub threshold: i16,
}

impl NoiseCanceler for EnergyGateCanceler {
    fn cancel_noise(&self, audio: &[u8]) -> Vec<u8> {
        audio
            .chunks(2)
            .flat_map(|pair| {
                if pair.len() < 2 {
                    return pair.to_vec();
                }
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                if sample.abs() < self.threshold {
                    vec![0u8, 0u8]
                } else {
                    pair.to_vec()
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NoiseCancelerConfig {
    Passthrough,
    EnergyGate { threshold: i16 },
}

impl NoiseCancelerConfig {
    pub fn build(self) -> Box<dyn NoiseCanceler> {
        match self {
            NoiseCancelerConfig::Passthrough => Box::new(PassthroughCanceler),
            NoiseCancelerConfig::EnergyGate { threshold } => {
                Box::new(EnergyGateCanceler { threshold })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_returns_input_unchanged() {
        let canceler = PassthroughCanceler;
        let audio = vec![1, 2, 3, 4];
        assert_eq!(canceler.cancel_noise(&audio), audio);
    }

    #[test]
    fn energy_gate_zeroes_quiet_samples() {
        let canceler = EnergyGateCanceler { threshold: 100 };
        let quiet = 10i16.to_le_bytes();
        let loud = 1000i16.to_le_bytes();
        let audio = [quiet, loud].concat();
        let gated = canceler.cancel_noise(&audio);
        assert_eq!(&gated[0..2], &[0, 0]);
        assert_eq!(&gated[2..4], &loud);
    }

    #[test]
    fn config_builds_matching_implementation() {
        let audio = vec![5, 6, 7, 8];
        let passthrough = NoiseCancelerConfig::Passthrough.build();
        assert_eq!(passthrough.cancel_noise(&audio), audio);
    }
}
