//! Metrics definitions for ingestion monitoring.

/// Label for the search scope in metrics.
pub const SCOPE_LABEL: &str = "scope";

/// Label for the pipeline ID in metrics.
pub const PIPELINE_ID_LABEL: &str = "pipeline_id";

/// Label for the mutation action in metrics.
pub const ACTION_LABEL: &str = "action";

// Fetcher metrics

/// Counter for probe pages issued.
pub const INGEST_WINDOWS_PROBED_TOTAL: &str = "ingest_windows_probed_total";

/// Counter for cap-driven window splits.
pub const INGEST_WINDOW_SPLITS_TOTAL: &str = "ingest_window_splits_total";

/// Counter for records delivered by fetchers.
pub const INGEST_RECORDS_FETCHED_TOTAL: &str = "ingest_records_fetched_total";

/// Counter for scopes that ended in a terminal error.
pub const INGEST_SCOPE_FAILURES_TOTAL: &str = "ingest_scope_failures_total";

// Mutation metrics

/// Counter for retried write actions.
pub const INGEST_MUTATION_RETRIES_TOTAL: &str = "ingest_mutation_retries_total";

/// Counter for write actions that exhausted retries or failed terminally.
pub const INGEST_MUTATION_FAILURES_TOTAL: &str = "ingest_mutation_failures_total";
