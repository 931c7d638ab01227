//! End-to-end planning
//!
//! [`DeployPlanner`] runs one request through seed selection, the cached
//! graph, matching, resolution, fast-track pruning and variable validation.

use crate::cache::{GraphCache, GraphCacheConfig};
use crate::collaborators::{ChangeSource, VariableSource};
use crate::fast_track::{FastTrackClassifier, FastTrackDecision};
use crate::matcher::FileMatcher;
use crate::resolver::{ExecutionPlan, Resolver};
use crate::validator::{validate, ValidationReport};
use deltaplan_config::{EngineSettings, MapFingerprint, OperationMap};
use deltaplan_core::{RepoPath, Result};
use deltaplan_utils::ConfigFileClassifier;
use serde::Serialize;
use std::collections::BTreeSet;

/// What selects the initial operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Operations watching any of these changed files
    Changes(Vec<RepoPath>),
    /// Explicitly named operations
    Operations(Vec<String>),
    /// Every known operation
    Full,
}

/// How a failed variable check is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Missing variables fail the request
    #[default]
    Enforce,
    /// Missing variables are reported alongside the plan
    Analyze,
}

/// A single planning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub seed: Seed,
    pub mode: PlanMode,
}

impl PlanRequest {
    /// Plan for a set of changed files; paths are normalized first
    pub fn changes<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(RepoPath::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(Seed::Changes(paths)))
    }

    /// Plan for explicitly named operations
    pub fn operations<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Seed::Operations(names.into_iter().map(Into::into).collect()))
    }

    /// Plan a full deploy
    pub fn full() -> Self {
        Self::new(Seed::Full)
    }

    pub fn new(seed: Seed) -> Self {
        Self {
            seed,
            mode: PlanMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: PlanMode) -> Self {
        self.mode = mode;
        self
    }

    fn seed_count(&self) -> usize {
        match &self.seed {
            Seed::Changes(paths) => paths.len(),
            Seed::Operations(names) => names.len(),
            Seed::Full => 0,
        }
    }
}

/// Why a change-driven request became a full deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Escalation {
    /// The changed file that caused it
    pub path: RepoPath,
    /// The sentinel path it fell under
    pub sentinel: String,
}

/// Everything a planning request produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanOutcome {
    pub fingerprint: MapFingerprint,
    /// Operations selected before expansion
    pub impacted: BTreeSet<String>,
    /// Changed files no operation watches
    pub unmatched: BTreeSet<RepoPath>,
    pub plan: ExecutionPlan,
    pub validation: ValidationReport,
    pub fast_track: Vec<FastTrackDecision>,
    pub escalation: Option<Escalation>,
}

/// Plans deployments against operation maps, reusing built graphs
#[derive(Debug)]
pub struct DeployPlanner {
    settings: EngineSettings,
    cache: GraphCache,
    fast_track: FastTrackClassifier,
}

impl DeployPlanner {
    pub fn new(settings: EngineSettings) -> Self {
        let cache = GraphCache::with_config(GraphCacheConfig {
            max_entries: settings.graph_cache_entries,
        });
        let fast_track =
            FastTrackClassifier::new(ConfigFileClassifier::new(&settings.config_extensions));
        Self {
            settings,
            cache,
            fast_track,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    /// Run one request against `map`
    pub fn plan(
        &self,
        map: &OperationMap,
        request: &PlanRequest,
        variables: &dyn VariableSource,
    ) -> Result<PlanOutcome> {
        let _span = deltaplan_utils::tracing::plan_span(request.seed_count()).entered();

        let graph = self.cache.get_or_build(map)?;

        let mut escalation = None;
        let mut matches = None;
        let impacted: BTreeSet<String> = match &request.seed {
            Seed::Changes(paths) => {
                escalation = self.find_escalation(paths);
                if let Some(reason) = &escalation {
                    tracing::info!(
                        path = %reason.path,
                        sentinel = %reason.sentinel,
                        "sentinel path changed; planning a full deploy"
                    );
                    map.names().map(str::to_string).collect()
                } else {
                    let result = FileMatcher::new(map)?.match_paths(paths);
                    let impacted = result.impacted();
                    matches = Some(result);
                    impacted
                }
            }
            Seed::Operations(names) => {
                for name in names {
                    map.require(name)?;
                }
                names.iter().cloned().collect()
            }
            Seed::Full => map.names().map(str::to_string).collect(),
        };

        let resolved = Resolver::new(map, &graph).resolve(&impacted)?;

        // Checked before fast-track so a pruned operation still needs its variables.
        let validation = validate(&resolved, &variables.variables()?);
        if request.mode == PlanMode::Enforce {
            validation.clone().into_result()?;
        } else if !validation.is_ok() {
            tracing::warn!(
                failing = validation.unmet().len(),
                "plan has unmet variable requirements"
            );
        }

        let (plan, fast_track) = match &matches {
            Some(result) if self.settings.fast_track => {
                let outcome = self.fast_track.classify(&resolved, result);
                (outcome.plan, outcome.decisions)
            }
            _ => (resolved, Vec::new()),
        };

        tracing::info!(
            impacted = impacted.len(),
            planned = plan.len(),
            pruned = fast_track.iter().filter(|d| d.pruned).count(),
            "plan ready"
        );

        Ok(PlanOutcome {
            fingerprint: map.fingerprint().clone(),
            impacted,
            unmatched: matches.map(|m| m.unmatched().clone()).unwrap_or_default(),
            plan,
            validation,
            fast_track,
            escalation,
        })
    }

    /// Fetch the change set between `from` and `to`, then plan it
    #[tracing::instrument(skip(self, map, changes, variables))]
    pub fn plan_from_source(
        &self,
        map: &OperationMap,
        changes: &dyn ChangeSource,
        from: &str,
        to: &str,
        mode: PlanMode,
        variables: &dyn VariableSource,
    ) -> Result<PlanOutcome> {
        let files = changes.changed_files(from, to)?;
        tracing::debug!(count = files.len(), "change set received");
        let request = PlanRequest::changes(files)?.with_mode(mode);
        self.plan(map, &request, variables)
    }

    fn find_escalation(&self, paths: &[RepoPath]) -> Option<Escalation> {
        paths.iter().find_map(|path| {
            self.settings
                .sentinel_paths
                .iter()
                .find(|sentinel| path.is_within(sentinel))
                .map(|sentinel| Escalation {
                    path: path.clone(),
                    sentinel: sentinel.clone(),
                })
        })
    }
}

impl Default for DeployPlanner {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}
