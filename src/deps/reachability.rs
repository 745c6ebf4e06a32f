// src/deps/reachability.rs

//! Up-front rejection of packages that can never become buildable.
//!
//! A queue only dispatches a package once all of its dependencies have
//! finished, so a package inside a dependency cycle, or one waiting on a
//! package that is not part of the same queue, would wait forever. These
//! are found here, before scheduling, and reported as never attempted.

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::deps::DependencyTracker;
use crate::types::PackageName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnschedulableReason {
    /// Member of a dependency cycle (members listed).
    Cycle(Vec<PackageName>),
    /// Depends on a valid package that is not part of this phase.
    MissingDependency(PackageName),
    /// Depends on another unschedulable package.
    BlockedBy(PackageName),
}

impl fmt::Display for UnschedulableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnschedulableReason::Cycle(members) => {
                write!(f, "dependency cycle through {}", members.join(" -> "))
            }
            UnschedulableReason::MissingDependency(dep) => {
                write!(f, "dependency '{dep}' is not part of this run")
            }
            UnschedulableReason::BlockedBy(dep) => {
                write!(f, "depends on unschedulable package '{dep}'")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unschedulable {
    pub package: PackageName,
    pub reason: UnschedulableReason,
}

/// Partition of a phase's package list.
#[derive(Debug, Clone, Default)]
pub struct SchedulePlan {
    /// Packages safe to enqueue, in input order.
    pub schedulable: Vec<PackageName>,
    pub unschedulable: Vec<Unschedulable>,
}

impl SchedulePlan {
    pub fn is_fully_schedulable(&self) -> bool {
        self.unschedulable.is_empty()
    }
}

/// Split `packages` into schedulable and unschedulable sets.
pub fn precheck(packages: &[PackageName], tracker: &DependencyTracker) -> SchedulePlan {
    let in_set: HashSet<&str> = packages.iter().map(String::as_str).collect();

    // Edge direction: dep -> pkg.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    let direct: HashMap<&str, Vec<PackageName>> = packages
        .iter()
        .map(|p| (p.as_str(), tracker.direct_deps(p)))
        .collect();

    for pkg in packages {
        graph.add_node(pkg.as_str());
    }
    // The queue waits on every in-set ancestor, so a path that leaves the
    // set and comes back is still an edge here. Transitive deps never
    // contain the package itself; a self-loop comes from the direct list.
    for pkg in packages {
        let waits_on = direct[pkg.as_str()]
            .iter()
            .cloned()
            .chain(tracker.transitive_deps(pkg));
        for dep in waits_on {
            if let Some(&dep) = in_set.get(dep.as_str()) {
                graph.add_edge(dep, pkg.as_str(), ());
            }
        }
    }

    let mut cycles: HashMap<&str, Vec<PackageName>> = HashMap::new();
    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|n| graph.contains_edge(*n, *n));
        if !is_cycle {
            continue;
        }
        let mut members: Vec<PackageName> = component.iter().map(|s| s.to_string()).collect();
        members.sort();
        for node in component {
            cycles.insert(node, members.clone());
        }
    }

    let mut first_pass: HashMap<&str, UnschedulableReason> = HashMap::new();
    for pkg in packages {
        if let Some(members) = cycles.get(pkg.as_str()) {
            first_pass.insert(pkg.as_str(), UnschedulableReason::Cycle(members.clone()));
            continue;
        }
        if let Some(missing) = direct[pkg.as_str()]
            .iter()
            .find(|d| !in_set.contains(d.as_str()))
        {
            first_pass.insert(pkg.as_str(), UnschedulableReason::MissingDependency(missing.clone()));
        }
    }

    // Transitive deps cover every ancestor, so one pass settles blocking.
    let mut plan = SchedulePlan::default();
    for pkg in packages {
        let reason = first_pass.get(pkg.as_str()).cloned().or_else(|| {
            tracker
                .transitive_deps(pkg)
                .into_iter()
                .find(|d| first_pass.contains_key(d.as_str()))
                .map(UnschedulableReason::BlockedBy)
        });

        match reason {
            Some(reason) => {
                warn!(package = %pkg, %reason, "package can never become buildable; not enqueued");
                plan.unschedulable.push(Unschedulable {
                    package: pkg.clone(),
                    reason,
                });
            }
            None => plan.schedulable.push(pkg.clone()),
        }
    }

    plan
}
