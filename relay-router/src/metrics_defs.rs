use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status, kind.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const FORWARD_FAILURES: MetricDef = MetricDef {
    name: "forward.failures",
    metric_type: MetricType::Counter,
    description: "Requests that could not be forwarded to a relay. Tagged with reason.",
};

pub const ARCHIVE_FAILURES: MetricDef = MetricDef {
    name: "archive.failures",
    metric_type: MetricType::Counter,
    description: "Inbound requests that could not be archived",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    FORWARD_FAILURES,
    ARCHIVE_FAILURES,
];
