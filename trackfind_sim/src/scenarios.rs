//! Track finding scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// TF-001: One stiff particle per event
    SingleTrack,

    /// TF-002: Five particles per event
    MultiTrack,

    /// TF-003: Three particles in heavy background
    HighBackground,

    /// TF-004: One particle leaving the origin in both directions
    BackToBack,

    /// TF-005: Soft particles that curl inside the chamber
    LowMomentum,

    /// TF-006: Events without hits
    Empty,

    // ═══════════════════════════════════════════════════
    // STRESS SCENARIOS
    // ═══════════════════════════════════════════════════
    /// TF-007: Twenty particles and background in every event
    Dense,
}

/// Event content and pass thresholds of a scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioParams {
    pub particles: usize,
    pub background_hits: usize,
    /// Range of |curvature| (1/cm) of the generated particles
    pub curvature_range: (f64, f64),
    /// Generate both legs of a particle crossing the origin
    pub back_to_back: bool,
    pub min_efficiency: f64,
    pub max_fake_rate: f64,
    /// Largest share of matched tracks that duplicate a found particle
    pub max_clone_rate: f64,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SingleTrack,
            ScenarioId::MultiTrack,
            ScenarioId::HighBackground,
            ScenarioId::BackToBack,
            ScenarioId::LowMomentum,
            ScenarioId::Empty,
            ScenarioId::Dense,
        ]
    }

    /// Returns the scenarios run in CI.
    pub fn standard() -> Vec<ScenarioId> {
        Self::all().into_iter().filter(|s| !s.is_stress()).collect()
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SingleTrack => "single_track",
            ScenarioId::MultiTrack => "multi_track",
            ScenarioId::HighBackground => "high_background",
            ScenarioId::BackToBack => "back_to_back",
            ScenarioId::LowMomentum => "low_momentum",
            ScenarioId::Empty => "empty",
            ScenarioId::Dense => "dense",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SingleTrack => "1 stiff particle, no background",
            ScenarioId::MultiTrack => "5 particles, light background",
            ScenarioId::HighBackground => "3 particles among 400 noise hits",
            ScenarioId::BackToBack => "1 particle crossing the chamber, split into two legs",
            ScenarioId::LowMomentum => "2 curlers with radii of 35-60 cm",
            ScenarioId::Empty => "No hits at all, no tracks expected",
            ScenarioId::Dense => "🔥 20 particles and 200 noise hits per event",
        }
    }

    /// Returns true for scenarios that push the finder beyond typical occupancy.
    pub fn is_stress(&self) -> bool {
        matches!(self, ScenarioId::Dense)
    }

    pub fn params(&self) -> ScenarioParams {
        let stiff = (0.002, 0.012);
        match self {
            ScenarioId::SingleTrack => ScenarioParams {
                particles: 1,
                background_hits: 0,
                curvature_range: (0.002, 0.008),
                back_to_back: false,
                min_efficiency: 0.8,
                max_fake_rate: 0.3,
                max_clone_rate: 0.1,
            },
            ScenarioId::MultiTrack => ScenarioParams {
                particles: 5,
                background_hits: 20,
                curvature_range: stiff,
                back_to_back: false,
                min_efficiency: 0.6,
                max_fake_rate: 0.4,
                max_clone_rate: 0.2,
            },
            ScenarioId::HighBackground => ScenarioParams {
                particles: 3,
                background_hits: 400,
                curvature_range: stiff,
                back_to_back: false,
                min_efficiency: 0.5,
                max_fake_rate: 0.5,
                max_clone_rate: 0.25,
            },
            ScenarioId::BackToBack => ScenarioParams {
                particles: 1,
                background_hits: 10,
                curvature_range: (0.002, 0.008),
                back_to_back: true,
                min_efficiency: 0.5,
                max_fake_rate: 0.4,
                max_clone_rate: 0.2,
            },
            ScenarioId::LowMomentum => ScenarioParams {
                particles: 2,
                background_hits: 10,
                curvature_range: (0.017, 0.028),
                back_to_back: false,
                min_efficiency: 0.4,
                max_fake_rate: 0.5,
                max_clone_rate: 0.3,
            },
            ScenarioId::Empty => ScenarioParams {
                particles: 0,
                background_hits: 0,
                curvature_range: stiff,
                back_to_back: false,
                min_efficiency: 0.0,
                max_fake_rate: 0.0,
                max_clone_rate: 0.0,
            },
            ScenarioId::Dense => ScenarioParams {
                particles: 20,
                background_hits: 200,
                curvature_range: stiff,
                back_to_back: false,
                min_efficiency: 0.4,
                max_fake_rate: 0.6,
                max_clone_rate: 0.3,
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_track" | "singletrack" | "tf-001" => Ok(ScenarioId::SingleTrack),
            "multi_track" | "multitrack" | "tf-002" => Ok(ScenarioId::MultiTrack),
            "high_background" | "highbackground" | "tf-003" => Ok(ScenarioId::HighBackground),
            "back_to_back" | "backtoback" | "tf-004" => Ok(ScenarioId::BackToBack),
            "low_momentum" | "lowmomentum" | "tf-005" => Ok(ScenarioId::LowMomentum),
            "empty" | "tf-006" => Ok(ScenarioId::Empty),
            "dense" | "tf-007" => Ok(ScenarioId::Dense),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
        assert_eq!("TF-004".parse::<ScenarioId>(), Ok(ScenarioId::BackToBack));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_standard_excludes_stress() {
        let standard = ScenarioId::standard();
        assert!(!standard.contains(&ScenarioId::Dense));
        assert_eq!(standard.len(), ScenarioId::all().len() - 1);
    }

    #[test]
    fn test_params_sane() {
        for scenario in ScenarioId::all() {
            let p = scenario.params();
            assert!(p.curvature_range.0 < p.curvature_range.1);
            assert!((0.0..=1.0).contains(&p.min_efficiency));
            assert!((0.0..=1.0).contains(&p.max_fake_rate));
            assert!((0.0..=1.0).contains(&p.max_clone_rate));
        }
        assert_eq!(ScenarioId::Empty.params().particles, 0);
        assert!(ScenarioId::SingleTrack.params().max_clone_rate <= 0.1);
    }
}
