//! Scenario runner - generates events, finds tracks and judges them against truth.

use tracing::{debug, info, warn};

use trackfind_core::{FilterRegistry, PipelineMetrics, TrackFinder, TrackFinderConfig};
use trackfind_env::CylindricalGeometry;

use crate::exporter::EventExport;
use crate::generator::{EventGenerator, GeneratedEvent, GeneratorConfig};
use crate::matching::{match_event, MatchSummary};
use crate::scenarios::ScenarioId;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Events generated
    pub events: usize,

    /// Whether scenario passed all assertions
    pub passed: bool,

    pub efficiency: f64,
    pub purity: f64,
    pub fake_rate: f64,
    pub clone_rate: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Truth matching counters over all events
    pub matching: MatchSummary,

    /// Pipeline counters over all events
    pub metrics: PipelineMetrics,
}

impl ScenarioResult {
    fn failed(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            events: 0,
            passed: false,
            efficiency: 0.0,
            purity: 0.0,
            fake_rate: 0.0,
            clone_rate: 0.0,
            failure_reason: Some(reason),
            matching: MatchSummary::default(),
            metrics: PipelineMetrics::default(),
        }
    }
}

/// Runs track finding scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Events per scenario
    events: usize,

    config: TrackFinderConfig,
    generator: GeneratorConfig,
    geometry: CylindricalGeometry,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            events: 10,
            config: TrackFinderConfig::default(),
            generator: GeneratorConfig::default(),
            geometry: CylindricalGeometry::default(),
        }
    }

    /// Sets the number of events per scenario.
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = events;
        self
    }

    /// Sets the track finder configuration.
    pub fn with_config(mut self, config: TrackFinderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the generator defaults; scenarios override the curvature range.
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    pub fn geometry(&self) -> &CylindricalGeometry {
        &self.geometry
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        if scenario.is_stress() {
            warn!("🔥 STRESS SCENARIO - occupancy far above nominal");
        }

        let mut finder = match self.finder() {
            Ok(finder) => finder,
            Err(reason) => return ScenarioResult::failed(scenario, self.seed, reason),
        };
        let mut generator = self.generator_for(scenario);
        let mut matching = MatchSummary::default();
        let mut failures = Vec::new();

        for index in 0..self.events {
            let event = self.generate(&mut generator, scenario);
            match finder.process_event(&event.hits, &self.geometry, Some(&event.truth)) {
                Ok(output) => {
                    let (summary, _) = match_event(&output, &event.truth);
                    debug!(
                        "  event {} | hits={} | tracks={} | found {}/{}",
                        index,
                        output.stats.hits,
                        output.tracks.len(),
                        summary.found_particles,
                        summary.findable_particles
                    );
                    matching.accumulate(&summary);
                }
                Err(e) => failures.push(format!("event {}: {}", index, e)),
            }
        }

        self.judge(scenario, matching, finder.metrics().clone(), failures)
    }

    /// Generates and processes the first event of a scenario for export.
    pub fn export_first_event(&self, scenario: ScenarioId) -> Result<EventExport, String> {
        let mut finder = self.finder()?;
        let mut generator = self.generator_for(scenario);
        let event = self.generate(&mut generator, scenario);
        let output = finder
            .process_event(&event.hits, &self.geometry, Some(&event.truth))
            .map_err(|e| e.to_string())?;
        Ok(EventExport::new(scenario.name(), self.seed, &event, &output, &self.geometry))
    }

    fn finder(&self) -> Result<TrackFinder, String> {
        TrackFinder::new(self.config.clone(), &FilterRegistry::standard(), &self.geometry, true)
            .map_err(|e| format!("Invalid track finder configuration: {}", e))
    }

    fn generator_for(&self, scenario: ScenarioId) -> EventGenerator {
        let config = GeneratorConfig {
            curvature_range: scenario.params().curvature_range,
            ..self.generator.clone()
        };
        EventGenerator::new(self.seed, config)
    }

    fn generate(&self, generator: &mut EventGenerator, scenario: ScenarioId) -> GeneratedEvent {
        let params = scenario.params();
        if params.back_to_back {
            generator.back_to_back(&self.geometry, params.background_hits)
        } else {
            generator.generate(&self.geometry, params.particles, params.background_hits)
        }
    }

    fn judge(
        &self,
        scenario: ScenarioId,
        matching: MatchSummary,
        metrics: PipelineMetrics,
        failures: Vec<String>,
    ) -> ScenarioResult {
        let params = scenario.params();
        let efficiency = matching.efficiency();
        let fake_rate = matching.fake_rate();
        let clone_rate = matching.clone_rate();

        let failure_reason = if let Some(first) = failures.first() {
            Some(format!("{} events failed, first: {}", failures.len(), first))
        } else if scenario == ScenarioId::Empty && matching.tracks > 0 {
            Some(format!("{} tracks found in empty events", matching.tracks))
        } else if efficiency < params.min_efficiency {
            Some(format!(
                "Efficiency {:.2} below threshold {:.2}",
                efficiency, params.min_efficiency
            ))
        } else if fake_rate > params.max_fake_rate {
            Some(format!(
                "Fake rate {:.2} exceeds threshold {:.2}",
                fake_rate, params.max_fake_rate
            ))
        } else if clone_rate > params.max_clone_rate {
            Some(format!(
                "Clone rate {:.2} exceeds threshold {:.2}",
                clone_rate, params.max_clone_rate
            ))
        } else {
            None
        };
        let passed = failure_reason.is_none();

        info!(
            "{} {} complete: {} events, efficiency {:.2}, purity {:.2}, fake rate {:.2}, clone rate {:.2}",
            if passed { "✓" } else { "✗" },
            scenario.name(),
            self.events,
            efficiency,
            matching.purity(),
            fake_rate,
            clone_rate
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            events: self.events,
            passed,
            efficiency,
            purity: matching.purity(),
            fake_rate,
            clone_rate,
            failure_reason,
            matching,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scenario() {
        let result = ScenarioRunner::new(42).with_events(3).run(ScenarioId::Empty);

        assert!(result.passed);
        assert_eq!(result.metrics.events, 3);
        assert_eq!(result.metrics.empty_events, 3);
        assert_eq!(result.matching.tracks, 0);
    }

    #[test]
    fn test_single_track_scenario() {
        let result = ScenarioRunner::new(42).with_events(3).run(ScenarioId::SingleTrack);

        assert_eq!(result.metrics.failed_events, 0);
        assert_eq!(result.matching.findable_particles, 3);
        assert!(result.efficiency >= 0.5, "efficiency {}", result.efficiency);
    }

    #[test]
    fn test_same_seed_same_result() {
        let first = ScenarioRunner::new(7).with_events(2).run(ScenarioId::MultiTrack);
        let second = ScenarioRunner::new(7).with_events(2).run(ScenarioId::MultiTrack);

        assert_eq!(first.matching, second.matching);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.passed, second.passed);
    }

    #[test]
    fn test_invalid_config_fails_scenario() {
        let mut config = TrackFinderConfig::default();
        config.hough.z0_range = (5.0, -5.0);
        let result = ScenarioRunner::new(1).with_config(config).run(ScenarioId::SingleTrack);

        assert!(!result.passed);
        assert!(result.failure_reason.is_some());
        assert_eq!(result.events, 0);
    }

    #[test]
    fn test_clones_fail_single_track() {
        // Every particle found, but each one twice
        let mut matching = MatchSummary::default();
        matching.findable_particles = 4;
        matching.found_particles = 4;
        matching.tracks = 8;
        matching.matched_tracks = 8;
        matching.clone_tracks = 4;

        let runner = ScenarioRunner::new(3).with_events(4);
        let result = runner.judge(ScenarioId::SingleTrack, matching.clone(), PipelineMetrics::default(), Vec::new());
        assert!(!result.passed);
        assert_eq!(result.clone_rate, 0.5);
        assert!(result.failure_reason.unwrap().starts_with("Clone rate"));

        let mut clean = matching;
        clean.tracks = 4;
        clean.matched_tracks = 4;
        clean.clone_tracks = 0;
        let result = runner.judge(ScenarioId::SingleTrack, clean, PipelineMetrics::default(), Vec::new());
        assert!(result.passed);
    }

    #[test]
    fn test_export_first_event() {
        let export = ScenarioRunner::new(5)
            .export_first_event(ScenarioId::MultiTrack)
            .unwrap();

        assert_eq!(export.scenario, "multi_track");
        assert_eq!(export.particles.len(), 5);
        assert!(!export.hits.is_empty());
        for track in &export.tracks {
            assert!(track.hits.iter().all(|&i| i < export.hits.len()));
        }
    }
}
