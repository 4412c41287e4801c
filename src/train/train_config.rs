use serde::{Serialize, Deserialize};

use crate::loss::cost::CostFunction;
use crate::train::trainer::DEFAULT_LEARNING_RATE;

/// Hyperparameters for one `Trainer::train` run.
///
/// # Fields
/// - `learning_rate`:  SGD step size
/// - `dropout_period`: datapoints between dropout mask draws; `0` disables dropout
/// - `dropout_ratio`:  share of each hidden layer dropped, in `(0, 0.9]`
/// - `cost`:           cost applied to `expected - predicted`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub learning_rate: f64,
    pub dropout_period: usize,
    pub dropout_ratio: f64,
    pub cost: CostFunction,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learning_rate: DEFAULT_LEARNING_RATE,
            dropout_period: 0,
            dropout_ratio: 0.5,
            cost: CostFunction::Squared,
        }
    }
}

impl TrainConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<TrainConfig> {
        serde_json::from_str(json)
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a config from a JSON file; missing fields take their defaults.
    pub fn load_json(path: &str) -> std::io::Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = TrainConfig::from_json_str(r#"{"learning_rate": 0.05, "cost": "absolute"}"#).unwrap();
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.cost, CostFunction::Absolute);
        assert_eq!(config.dropout_period, 0);
        assert_eq!(config.dropout_ratio, 0.5);
    }

    #[test]
    fn default_learning_rate_matches_trainer() {
        assert_eq!(TrainConfig::default().learning_rate, DEFAULT_LEARNING_RATE);
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("ffnet-config-{}.json", std::process::id()));
        let path = path.to_str().unwrap();
        let config = TrainConfig { dropout_period: 4, ..TrainConfig::default() };

        config.save_json(path).unwrap();
        let loaded = TrainConfig::load_json(path).unwrap();
        std::fs::remove_file(path).unwrap();

        assert_eq!(loaded, config);
    }
}
