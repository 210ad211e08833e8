use async_trait::async_trait;

use super::{Scan, SignalSource, SourceError};

pub const SIMULATOR_ADDRESS: &str = "SIM:00:00:00:00:00";

const START: i32 = -60;
const STEP: i32 = 5;
const STRONGEST: i32 = -55;
const WEAKEST: i32 = -85;

// Reported once at the bottom of every sweep, steep enough to look like a fall
const FALL_SPIKE: i32 = -95;

/// Bracelet stand-in for running without radio hardware.
///
/// Sweeps the signal between -50 and -80 dBm in 5 dB steps, turning back once
/// it passes -55. Each time the sweep reaches -85 it reports a single -95 dBm
/// reading instead, which trips fall detection and, through the average, the
/// out of range zone.
pub struct Simulator {
    level: i32,
    direction: i32,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Simulator {
            level: START,
            direction: -1,
        }
    }

    fn next_signal(&mut self) -> i32 {
        self.level += self.direction * STEP;
        if self.level > STRONGEST {
            self.direction = -1;
        } else if self.level <= WEAKEST {
            self.direction = 1;
            return FALL_SPIKE;
        }
        self.level
    }
}

#[async_trait]
impl SignalSource for Simulator {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn poll(&mut self) -> Result<Scan, SourceError> {
        let signal = self.next_signal();
        log::trace!("Simulator: signal {} dBm", signal);
        Ok(Scan::Found {
            signal,
            address: SIMULATOR_ADDRESS.to_string(),
        })
    }
}
