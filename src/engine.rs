use std::fmt::{Display, Formatter};

/// Closed set of supported search engines
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    XTandem,
    Comet,
    MsGf,
    Crux,
}

impl SearchEngine {
    /// All known engines in a stable order
    ///
    pub const ALL: [SearchEngine; 4] = [
        SearchEngine::XTandem,
        SearchEngine::Comet,
        SearchEngine::MsGf,
        SearchEngine::Crux,
    ];

    /// Short lowercase tag, used in file names and log messages
    ///
    pub fn tag(&self) -> &'static str {
        match self {
            SearchEngine::XTandem => "xtandem",
            SearchEngine::Comet => "comet",
            SearchEngine::MsGf => "msgf",
            SearchEngine::Crux => "crux",
        }
    }

    /// Executable name used when no override is configured.
    /// For MS-GF+ this is the JAR which is passed to `java -jar`.
    ///
    pub fn default_executable(&self) -> &'static str {
        match self {
            SearchEngine::XTandem => "tandem",
            SearchEngine::Comet => "comet",
            SearchEngine::MsGf => "MSGFPlus.jar",
            SearchEngine::Crux => "crux",
        }
    }

    /// Whether the engine's re-ranked output already carries q-values,
    /// making the target-decoy analysis redundant for it
    ///
    pub fn has_native_q_values(&self) -> bool {
        matches!(self, SearchEngine::Crux)
    }
}

impl Display for SearchEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchEngine::XTandem => write!(f, "X!Tandem"),
            SearchEngine::Comet => write!(f, "Comet"),
            SearchEngine::MsGf => write!(f, "MS-GF+"),
            SearchEngine::Crux => write!(f, "Crux"),
        }
    }
}
