use std::path::PathBuf;
use std::str::FromStr;

use crate::constants::{DEFAULT_FDR_THRESHOLD, MAX_MISSED_CLEAVAGES};
use crate::engine::SearchEngine;
use crate::errors::ConfigurationError;

/// Unit of a mass tolerance
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToleranceUnit {
    Da,
    Ppm,
}

/// Mass tolerance with unit, parsed from strings like `10ppm` or `0.5da`
///
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tolerance {
    pub value: f64,
    pub unit: ToleranceUnit,
}

impl Tolerance {
    pub fn new(value: f64, unit: ToleranceUnit) -> Self {
        Self { value, unit }
    }
}

impl FromStr for Tolerance {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let (value_str, unit) = if let Some(prefix) = normalized.strip_suffix("ppm") {
            (prefix, ToleranceUnit::Ppm)
        } else if let Some(prefix) = normalized.strip_suffix("da") {
            (prefix, ToleranceUnit::Da)
        } else {
            return Err(ConfigurationError::MalformedTolerance(s.to_string()));
        };
        let value: f64 = value_str
            .trim()
            .parse()
            .map_err(|_| ConfigurationError::MalformedTolerance(s.to_string()))?;
        if value <= 0.0 {
            return Err(ConfigurationError::MalformedTolerance(s.to_string()));
        }
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for Tolerance {
    type Error = ConfigurationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Tolerance> for String {
    fn from(tolerance: Tolerance) -> Self {
        match tolerance.unit {
            ToleranceUnit::Da => format!("{}da", tolerance.value),
            ToleranceUnit::Ppm => format!("{}ppm", tolerance.value),
        }
    }
}

/// Policy for engines which were run without a decoy database.
/// Explicit configuration choice instead of engine-specific guessing:
/// either FDR gating is skipped entirely or a q-value is derived
/// from the target-only score rank.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoyFreePolicy {
    AcceptAll,
    RankFraction,
}

/// Per-engine settings
///
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfiguration {
    /// Whether the engine takes part in the search
    pub enabled: bool,

    /// Optional path override for the engine executable
    pub executable: Option<PathBuf>,
}

impl EngineConfiguration {
    fn disabled() -> Self {
        Self {
            enabled: false,
            executable: None,
        }
    }
}

/// Configuration contract for one search session. Owned by the caller
/// (CLI or GUI), consumed by the pipeline.
///
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchConfiguration {
    /// X!Tandem settings, enabled by default
    pub xtandem: EngineConfiguration,

    /// Comet settings
    pub comet: EngineConfiguration,

    /// MS-GF+ settings
    pub msgf: EngineConfiguration,

    /// Crux settings
    pub crux: EngineConfiguration,

    /// Optional path override for the spectrum format converter
    pub converter_executable: Option<PathBuf>,

    /// Number of workers, defaults to the available processor count
    pub num_workers: usize,

    /// Whether a second search pass over unmatched spectra is requested.
    /// Pass-through contract field for downstream consumers, not
    /// interpreted by the pipeline itself.
    pub iterative_search: bool,

    /// Whether meta-protein generation is requested downstream.
    /// Pass-through contract field, like `iterative_search`.
    pub generate_meta_proteins: bool,

    /// FDR threshold applied at the session level
    pub fdr_threshold: f64,

    /// Maximum number of allowed missed cleavages (0-5)
    pub max_missed_cleavages: u8,

    /// Precursor mass tolerance, `da` or `ppm`
    pub precursor_tolerance: Tolerance,

    /// Fragment ion mass tolerance, `da` only
    pub fragment_tolerance: Tolerance,

    /// How hits from decoy-free engine runs are gated
    pub decoy_free_policy: DecoyFreePolicy,
}

impl SearchConfiguration {
    /// Create a new default configuration
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails fast on contradictory settings, before any process is spawned
    ///
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.enabled_engines().is_empty() {
            return Err(ConfigurationError::NoEngineEnabled);
        }
        if self.max_missed_cleavages > MAX_MISSED_CLEAVAGES {
            return Err(ConfigurationError::InvalidMissedCleavages(
                self.max_missed_cleavages,
            ));
        }
        if !(self.fdr_threshold > 0.0 && self.fdr_threshold <= 1.0) {
            return Err(ConfigurationError::InvalidFdrThreshold(self.fdr_threshold));
        }
        if self.fragment_tolerance.unit != ToleranceUnit::Da {
            return Err(ConfigurationError::FragmentToleranceUnit(String::from(
                self.fragment_tolerance,
            )));
        }
        for engine in self.enabled_engines() {
            if let Some(executable) = &self.engine_configuration(engine).executable {
                if !executable.exists() {
                    return Err(ConfigurationError::ExecutableNotFound(executable.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn engine_configuration(&self, engine: SearchEngine) -> &EngineConfiguration {
        match engine {
            SearchEngine::XTandem => &self.xtandem,
            SearchEngine::Comet => &self.comet,
            SearchEngine::MsGf => &self.msgf,
            SearchEngine::Crux => &self.crux,
        }
    }

    /// Engines taking part in the search, in stable order
    ///
    pub fn enabled_engines(&self) -> Vec<SearchEngine> {
        SearchEngine::ALL
            .iter()
            .copied()
            .filter(|engine| self.engine_configuration(*engine).enabled)
            .collect()
    }

    /// Resolved executable path for the engine, override or default name
    ///
    pub fn executable_for(&self, engine: SearchEngine) -> PathBuf {
        match &self.engine_configuration(engine).executable {
            Some(path) => path.clone(),
            None => PathBuf::from(engine.default_executable()),
        }
    }
}

impl Default for SearchConfiguration {
    fn default() -> Self {
        Self {
            xtandem: EngineConfiguration {
                enabled: true,
                executable: None,
            },
            comet: EngineConfiguration::disabled(),
            msgf: EngineConfiguration::disabled(),
            crux: EngineConfiguration::disabled(),
            converter_executable: None,
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            iterative_search: false,
            generate_meta_proteins: true,
            fdr_threshold: DEFAULT_FDR_THRESHOLD,
            max_missed_cleavages: 2,
            precursor_tolerance: Tolerance::new(10.0, ToleranceUnit::Ppm),
            fragment_tolerance: Tolerance::new(0.5, ToleranceUnit::Da),
            decoy_free_policy: DecoyFreePolicy::AcceptAll,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tolerance_parsing() {
        let tolerance: Tolerance = "10ppm".parse().unwrap();
        assert_eq!(tolerance.value, 10.0);
        assert_eq!(tolerance.unit, ToleranceUnit::Ppm);

        let tolerance: Tolerance = "0.5Da".parse().unwrap();
        assert_eq!(tolerance.value, 0.5);
        assert_eq!(tolerance.unit, ToleranceUnit::Da);

        assert!("10".parse::<Tolerance>().is_err());
        assert!("ppm".parse::<Tolerance>().is_err());
        assert!("-3da".parse::<Tolerance>().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SearchConfiguration::new();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: SearchConfiguration = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.precursor_tolerance,
            config.precursor_tolerance
        );
        assert_eq!(deserialized.fdr_threshold, config.fdr_threshold);
        assert!(deserialized.xtandem.enabled);
        assert!(!deserialized.comet.enabled);
        // pass-through fields for downstream consumers survive the trip
        assert_eq!(deserialized.iterative_search, config.iterative_search);
        assert_eq!(
            deserialized.generate_meta_proteins,
            config.generate_meta_proteins
        );
    }

    #[test]
    fn test_validation() {
        let mut config = SearchConfiguration::new();
        assert!(config.validate().is_ok());

        config.max_missed_cleavages = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidMissedCleavages(6))
        ));
        config.max_missed_cleavages = 2;

        config.fragment_tolerance = Tolerance::new(10.0, ToleranceUnit::Ppm);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::FragmentToleranceUnit(_))
        ));
        config.fragment_tolerance = Tolerance::new(0.5, ToleranceUnit::Da);

        config.xtandem.enabled = false;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::NoEngineEnabled)
        ));
    }
}
