//! Plausibility checks on finished measurements

use crate::{
    defaults,
    models::{Config, Server, ValidationWarning},
    types::Direction,
};

/// Flags suspicious results without ever rejecting them
#[derive(Debug, Clone)]
pub struct ResultValidator {
    max_plausible_mbps: f64,
    max_asymmetry_ratio: f64,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self {
            max_plausible_mbps: defaults::DEFAULT_MAX_PLAUSIBLE_MBPS,
            max_asymmetry_ratio: defaults::DEFAULT_MAX_ASYMMETRY_RATIO,
        }
    }
}

impl From<&Config> for ResultValidator {
    fn from(config: &Config) -> Self {
        Self::new(config.max_plausible_mbps, config.max_asymmetry_ratio)
    }
}

impl ResultValidator {
    pub fn new(max_plausible_mbps: f64, max_asymmetry_ratio: f64) -> Self {
        Self {
            max_plausible_mbps,
            max_asymmetry_ratio,
        }
    }

    pub fn validate(&self, server: &Server) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let latency_seen = server.latency.is_some_and(|l| !l.is_zero());

        for (direction, value) in [
            (Direction::Download, server.download_mbps),
            (Direction::Upload, server.upload_mbps),
        ] {
            let label = direction.label().to_lowercase();
            match value {
                None => warnings.push(ValidationWarning::Missing { field: label }),
                Some(mbps) if !mbps.is_finite() || mbps < 0.0 || mbps > self.max_plausible_mbps => {
                    warnings.push(ValidationWarning::OutOfBounds { direction: label, mbps });
                }
                Some(mbps) if mbps == 0.0 && latency_seen => {
                    warnings.push(ValidationWarning::ZeroThroughput { direction: label });
                }
                Some(_) => {}
            }
        }

        if let (Some(down), Some(up)) = (server.download_mbps, server.upload_mbps) {
            if down.is_finite() && up.is_finite() && down > 0.0 && up > 0.0 {
                let ratio = down.max(up) / down.min(up);
                if ratio > self.max_asymmetry_ratio {
                    warnings.push(ValidationWarning::Asymmetric { ratio });
                }
            }
        }

        warnings
    }

    pub fn is_valid(&self, server: &Server) -> bool {
        self.validate(server).is_empty()
    }
}
