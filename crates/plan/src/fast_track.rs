//! Fast-track pruning of conditionally needed operations
//!
//! An operation marked `mutation: conditional` whose matched changes are all
//! inert configuration files can be dropped from the plan, provided no
//! operation still in the plan depends on a label it provides. Anything
//! ambiguous stays in.

use crate::matcher::MatchResult;
use crate::resolver::ExecutionPlan;
use deltaplan_config::{Mutation, Operation};
use deltaplan_utils::ConfigFileClassifier;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Why a fast-track candidate was pruned or kept
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FastTrackReason {
    /// Only inert configuration changed under its watch patterns
    ConfigOnly,
    /// Pulled in by expansion; none of its own watch patterns matched
    NoMatchedChanges,
    /// At least one matched change is not a configuration file
    NonConfigChange { files: Vec<String> },
    /// Surviving operations depend on labels it provides
    RequiredByDependents { dependents: Vec<String> },
}

impl fmt::Display for FastTrackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigOnly => write!(f, "only configuration files changed"),
            Self::NoMatchedChanges => write!(f, "no watched file changed"),
            Self::NonConfigChange { files } => {
                write!(f, "non-configuration changes: {}", files.join(", "))
            }
            Self::RequiredByDependents { dependents } => {
                write!(f, "required by {}", dependents.join(", "))
            }
        }
    }
}

/// One candidate's outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FastTrackDecision {
    pub operation: String,
    pub pruned: bool,
    pub reason: FastTrackReason,
}

/// The possibly pruned plan and the decision for every candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FastTrackOutcome {
    pub plan: ExecutionPlan,
    /// Decisions in original plan order
    pub decisions: Vec<FastTrackDecision>,
}

impl FastTrackOutcome {
    /// Names of the pruned operations
    pub fn pruned(&self) -> BTreeSet<&str> {
        self.decisions
            .iter()
            .filter(|d| d.pruned)
            .map(|d| d.operation.as_str())
            .collect()
    }
}

/// Classifies conditional operations against the changed files that matched them
#[derive(Debug, Clone, Default)]
pub struct FastTrackClassifier {
    files: ConfigFileClassifier,
}

impl FastTrackClassifier {
    pub fn new(files: ConfigFileClassifier) -> Self {
        Self { files }
    }

    /// Prune `plan` where it is safe to do so.
    ///
    /// Candidates are visited from the end of the plan backwards, so a
    /// dependent is settled before the operations it depends on.
    pub fn classify(&self, plan: &ExecutionPlan, matches: &MatchResult) -> FastTrackOutcome {
        let mut surviving: BTreeSet<String> = plan.names().map(str::to_string).collect();
        let mut decisions = Vec::new();

        for op in plan.operations().rev() {
            if op.mutation != Mutation::Conditional {
                continue;
            }

            let _span = deltaplan_utils::tracing::operation_span(&op.name).entered();
            let reason = self.reason_for(op, plan, matches, &surviving);
            let pruned = reason == FastTrackReason::ConfigOnly;

            if let FastTrackReason::RequiredByDependents { dependents } = &reason {
                tracing::warn!(
                    operation = %op.name,
                    dependents = %dependents.join(", "),
                    "fast-track would break a dependency; keeping operation"
                );
            }
            deltaplan_utils::tracing::fast_track_event(&op.name, pruned, &reason.to_string());

            if pruned {
                surviving.remove(&op.name);
            }
            decisions.push(FastTrackDecision {
                operation: op.name.clone(),
                pruned,
                reason,
            });
        }

        decisions.reverse();
        let removed: BTreeSet<String> = decisions
            .iter()
            .filter(|d| d.pruned)
            .map(|d| d.operation.clone())
            .collect();

        FastTrackOutcome {
            plan: plan.without(&removed),
            decisions,
        }
    }

    fn reason_for(
        &self,
        op: &Operation,
        plan: &ExecutionPlan,
        matches: &MatchResult,
        surviving: &BTreeSet<String>,
    ) -> FastTrackReason {
        let Some(files) = matches.files_for(&op.name).filter(|files| !files.is_empty()) else {
            return FastTrackReason::NoMatchedChanges;
        };

        let non_config: Vec<String> = files
            .iter()
            .filter(|path| !self.files.is_config(path))
            .map(|path| path.to_string())
            .collect();
        if !non_config.is_empty() {
            return FastTrackReason::NonConfigChange { files: non_config };
        }

        let dependents: Vec<String> = plan
            .operations()
            .filter(|other| other.name != op.name && surviving.contains(&other.name))
            .filter(|other| !other.depends_on.is_disjoint(&op.provides))
            .map(|other| other.name.clone())
            .collect();
        if !dependents.is_empty() {
            return FastTrackReason::RequiredByDependents { dependents };
        }

        FastTrackReason::ConfigOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OperationGraph;
    use crate::matcher::FileMatcher;
    use crate::resolver::Resolver;
    use deltaplan_config::{MapBuilder, OperationMap};
    use deltaplan_core::RepoPath;

    fn map_of(ops: Vec<Operation>) -> OperationMap {
        let mut builder = MapBuilder::new();
        builder.add_source("test", ops).unwrap();
        builder.build()
    }

    fn run(map: &OperationMap, changed: &[&str]) -> FastTrackOutcome {
        let changed: Vec<RepoPath> = changed.iter().map(|p| RepoPath::new(p).unwrap()).collect();
        let graph = OperationGraph::build(map).unwrap();
        let matches = FileMatcher::new(map).unwrap().match_paths(&changed);
        let plan = Resolver::new(map, &graph).resolve(matches.impacted()).unwrap();
        FastTrackClassifier::default().classify(&plan, &matches)
    }

    #[test]
    fn test_config_only_change_prunes_conditional_operation() {
        let map = map_of(vec![
            Operation::new("reload_app")
                .with_watch_files(["config/**"])
                .with_mutation(Mutation::Conditional),
            Operation::new("render_config").with_watch_files(["config/**"]),
        ]);
        let outcome = run(&map, &["config/app.yml"]);

        assert_eq!(outcome.plan.selectors(), vec!["render_config"]);
        assert_eq!(
            outcome.decisions,
            vec![FastTrackDecision {
                operation: "reload_app".into(),
                pruned: true,
                reason: FastTrackReason::ConfigOnly,
            }]
        );
    }

    #[test]
    fn test_mixed_changes_keep_operation() {
        let map = map_of(vec![Operation::new("rebuild")
            .with_watch_files(["app/**"])
            .with_mutation(Mutation::Conditional)]);
        let outcome = run(&map, &["app/settings.toml", "app/server.py"]);

        assert_eq!(outcome.plan.selectors(), vec!["rebuild"]);
        assert_eq!(
            outcome.decisions[0].reason,
            FastTrackReason::NonConfigChange {
                files: vec!["app/server.py".into()]
            }
        );
    }

    #[test]
    fn test_operations_without_conditional_metadata_are_never_pruned() {
        let map = map_of(vec![
            Operation::new("always").with_watch_files(["a.yml"]).with_mutation(Mutation::Always),
            Operation::new("plain").with_watch_files(["a.yml"]),
        ]);
        let outcome = run(&map, &["a.yml"]);
        assert_eq!(outcome.plan.len(), 2);
        assert!(outcome.decisions.is_empty());
    }

    #[test]
    fn test_expanded_operation_without_matches_is_kept() {
        let map = map_of(vec![
            Operation::new("render").with_watch_files(["t.j2"]).with_triggers(["restart"]),
            Operation::new("restart").with_mutation(Mutation::Conditional),
        ]);
        let outcome = run(&map, &["t.j2"]);
        assert_eq!(outcome.plan.selectors(), vec!["render", "restart"]);
        assert_eq!(outcome.decisions[0].reason, FastTrackReason::NoMatchedChanges);
    }

    #[test]
    fn test_provider_of_surviving_dependent_is_kept() {
        let map = map_of(vec![
            Operation::new("gen_certs")
                .with_provides(["tls"])
                .with_watch_files(["certs/*.cnf"])
                .with_mutation(Mutation::Conditional),
            Operation::new("deploy_proxy")
                .with_depends_on(["tls"])
                .with_watch_files(["proxy/**"]),
        ]);
        let outcome = run(&map, &["certs/openssl.cnf", "proxy/main.go"]);

        assert_eq!(outcome.plan.selectors(), vec!["gen_certs", "deploy_proxy"]);
        assert_eq!(
            outcome.decisions[0].reason,
            FastTrackReason::RequiredByDependents {
                dependents: vec!["deploy_proxy".into()]
            }
        );
        assert!(outcome.pruned().is_empty());
    }

    #[test]
    fn test_pruned_dependent_frees_its_provider() {
        let map = map_of(vec![
            Operation::new("gen_config")
                .with_provides(["conf"])
                .with_watch_files(["conf/*.ini"])
                .with_mutation(Mutation::Conditional),
            Operation::new("reload")
                .with_depends_on(["conf"])
                .with_watch_files(["conf/*.ini"])
                .with_mutation(Mutation::Conditional),
        ]);
        let outcome = run(&map, &["conf/app.ini"]);

        assert!(outcome.plan.is_empty());
        assert_eq!(outcome.pruned(), BTreeSet::from(["gen_config", "reload"]));
        assert_eq!(outcome.decisions[0].operation, "gen_config");
    }
}
