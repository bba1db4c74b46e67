//! Metrics definitions for the coordinator.

use shared::metrics_defs::{MetricDef, MetricType};

pub const RELAY_ASSIGNMENTS: MetricDef = MetricDef {
    name: "coordinator.assignments",
    metric_type: MetricType::Counter,
    description: "Number of projects bound to a relay",
};

pub const ASSIGNMENT_FAILURES: MetricDef = MetricDef {
    name: "coordinator.assignment_failures",
    metric_type: MetricType::Counter,
    description: "Number of assignment attempts that found no live relay",
};

pub const RELAYS_EVICTED: MetricDef = MetricDef {
    name: "coordinator.sweep.relays_evicted",
    metric_type: MetricType::Counter,
    description: "Number of stale or malformed relay records removed from the registry",
};

pub const PROJECTS_REASSIGNED: MetricDef = MetricDef {
    name: "coordinator.sweep.projects_reassigned",
    metric_type: MetricType::Counter,
    description: "Number of projects moved off a dead relay",
};

pub const PROJECTS_UNASSIGNED: MetricDef = MetricDef {
    name: "coordinator.sweep.projects_unassigned",
    metric_type: MetricType::Counter,
    description: "Number of projects left without a relay after a sweep",
};

pub const SWEEP_DURATION: MetricDef = MetricDef {
    name: "coordinator.sweep.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a cleanup sweep in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    RELAY_ASSIGNMENTS,
    ASSIGNMENT_FAILURES,
    RELAYS_EVICTED,
    PROJECTS_REASSIGNED,
    PROJECTS_UNASSIGNED,
    SWEEP_DURATION,
];
