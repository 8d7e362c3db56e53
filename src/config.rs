use clap::Parser;

use crate::engine::line_movement::MonitorSettings;
use crate::engine::normalize::NormalizeOptions;
use crate::engine::EngineSettings;

/// Sportsbook market-vs-model disagreement engine
#[derive(Parser, Debug, Clone)]
#[command(name = "oddsedge", version, about)]
pub struct Config {
    /// API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "oddsedge.db")]
    pub database_path: String,

    /// Minimum model-minus-market edge for any candidate bet (e.g. 0.02 = 2 pts)
    #[arg(long, env = "MIN_EDGE", default_value = "0.02")]
    pub min_edge: f64,

    /// Minimum final confidence for spread and total bets (0–100)
    #[arg(long, env = "MIN_CONFIDENCE", default_value = "45")]
    pub min_confidence: u32,

    /// Drop markets whose outcome labels matched only with low confidence
    #[arg(long, env = "SUPPRESS_LOW_CONFIDENCE_MATCHES", default_value = "false")]
    pub suppress_low_confidence_matches: bool,

    /// Keep markets flagged as a potential home/away reversal
    #[arg(long, env = "KEEP_POTENTIAL_REVERSALS", default_value = "false")]
    pub keep_potential_reversals: bool,

    /// Validated outcomes required before a recalibration fit is attempted
    #[arg(long, env = "CALIBRATION_MIN_SAMPLES", default_value = "20")]
    pub calibration_min_samples: usize,

    /// Maximum re-predictions per event
    #[arg(long, env = "MAX_REPREDICTIONS", default_value = "3")]
    pub max_repredictions: u32,

    /// Minimum minutes between re-predictions of one event
    #[arg(long, env = "REPREDICTION_COOLDOWN_MINS", default_value = "60")]
    pub reprediction_cooldown_mins: i64,

    /// No re-prediction within this many minutes of the start
    #[arg(long, env = "REPREDICTION_CUTOFF_MINS", default_value = "30")]
    pub reprediction_cutoff_mins: i64,

    /// Snapshots captured this many minutes or less before the start are closing lines
    #[arg(long, env = "CLOSING_WINDOW_MINS", default_value = "30")]
    pub closing_window_mins: i64,

    /// Fraction of full Kelly used for the suggested stake (0.0–1.0)
    #[arg(long, env = "KELLY_FRACTION", default_value = "0.25")]
    pub kelly_fraction: f64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.min_edge) {
            anyhow::bail!("min_edge must be in [0.0, 1.0)");
        }
        if self.min_confidence > 100 {
            anyhow::bail!("min_confidence must be between 0 and 100");
        }
        if !(0.0..=1.0).contains(&self.kelly_fraction) {
            anyhow::bail!("kelly_fraction must be between 0.0 and 1.0");
        }
        if self.calibration_min_samples == 0 {
            anyhow::bail!("calibration_min_samples must be positive");
        }
        if self.reprediction_cooldown_mins < 0
            || self.reprediction_cutoff_mins < 0
            || self.closing_window_mins < 0
        {
            anyhow::bail!("reprediction and closing windows must not be negative");
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            min_edge: self.min_edge,
            min_confidence: self.min_confidence,
            kelly_fraction: self.kelly_fraction,
            normalize: NormalizeOptions {
                suppress_low_confidence: self.suppress_low_confidence_matches,
                skip_potential_reversals: !self.keep_potential_reversals,
            },
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            max_repredictions: self.max_repredictions,
            cooldown: chrono::Duration::minutes(self.reprediction_cooldown_mins),
            start_cutoff: chrono::Duration::minutes(self.reprediction_cutoff_mins),
            closing_window: chrono::Duration::minutes(self.closing_window_mins),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        let config = Config::parse_from(["oddsedge"]);
        config.validate().unwrap();
        assert_eq!(config.engine_settings(), EngineSettings::default());
        assert_eq!(config.monitor_settings(), MonitorSettings::default());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = Config::parse_from(["oddsedge", "--kelly-fraction", "1.5"]);
        assert!(config.validate().is_err());
        let config = Config::parse_from(["oddsedge", "--min-confidence", "120"]);
        assert!(config.validate().is_err());
    }
}
