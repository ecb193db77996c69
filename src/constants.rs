/// Default FDR threshold applied at the session level
///
pub const DEFAULT_FDR_THRESHOLD: f64 = 0.05;

/// Provisional q-value bound applied during extraction of engine outputs
/// which carry engine-native q-values
///
pub const PROVISIONAL_Q_VALUE_BOUND: f64 = 0.1;

/// Upper bound for the configurable number of allowed missed cleavages
///
pub const MAX_MISSED_CLEAVAGES: u8 = 5;

/// Default executable used for spectrum format conversion
///
pub const DEFAULT_CONVERTER_EXECUTABLE: &str = "msconvert";

/// Number of leading non-data rows in a Comet result file (revision line)
///
pub const COMET_HEADER_ROWS: usize = 1;

/// Capacity of the scheduler's task queue
///
pub const TASK_QUEUE_CAPACITY: usize = 100;

/// Capacity of the status event channel
///
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Interval in milliseconds for workers to check the task queue again
///
pub const WORKER_POLL_INTERVAL_MS: u64 = 100;
