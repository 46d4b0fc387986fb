//! Collector configuration.

use std::time::Duration;

use crate::env::{read_bool_from_env, read_float_from_env, read_uint_from_env};
use crate::error::{GcError, GcResult};
use crate::object::{HEADER_SIZE, MIN_BLOCK_SIZE};

/// Smallest accepted semi-space size.
pub const MIN_YOUNG_SPACE_SIZE: usize = 1024;

/// Smallest accepted old-generation region size.
pub const MIN_REGION_SIZE: usize = 4096;

/// Tuning knobs of a [`crate::Heap`].
///
/// # Examples
///
/// ```
/// use gengc::GcConfig;
///
/// let config = GcConfig::with_young_space_size(64 * 1024);
/// assert_eq!(config.large_object_threshold, 16 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GcConfig {
    /// Size of each young-generation semi-space in bytes
    pub young_space_size: usize,
    /// Old-generation occupancy (fraction of `old_gen_max_size`) that starts a cycle
    pub old_gen_trigger_occupancy: f64,
    /// Time budget of one incremental step
    pub incremental_step_budget: Duration,
    /// Run old-generation marking on a background thread
    pub concurrent_marking_enabled: bool,
    /// Scavenges an object must survive before it is promoted
    pub promotion_age_threshold: u8,
    /// Size of one old-generation region in bytes
    pub old_region_size: usize,
    /// Upper bound of the old generation in bytes
    pub old_gen_max_size: usize,
    /// Objects larger than this (header included) are allocated old
    pub large_object_threshold: usize,
    /// Objects processed per step before the time budget is consulted
    pub min_objects_per_step: usize,
    /// Failed completion pauses tolerated before falling back to stop-the-world
    pub max_completion_retries: usize,
    /// Objects drained per concurrent completion pause
    pub completion_work_limit: usize,
    /// Use a dedicated marker thread in concurrent mode
    pub use_marker_thread: bool,
    /// Check the tri-color invariant after every marking step
    pub verify_heap: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            young_space_size: 1024 * 1024,
            old_gen_trigger_occupancy: 0.75,
            incremental_step_budget: Duration::from_millis(1),
            concurrent_marking_enabled: false,
            promotion_age_threshold: 1,
            old_region_size: 256 * 1024,
            old_gen_max_size: 64 * 1024 * 1024,
            large_object_threshold: 256 * 1024,
            min_objects_per_step: 100,
            max_completion_retries: 3,
            completion_work_limit: 100_000,
            use_marker_thread: true,
            verify_heap: false,
        }
    }
}

impl GcConfig {
    /// Default configuration with the given semi-space size.
    ///
    /// The large-object threshold follows the semi-space size.
    pub fn with_young_space_size(young_space_size: usize) -> Self {
        GcConfig {
            young_space_size,
            large_object_threshold: young_space_size / 4,
            ..GcConfig::default()
        }
    }

    /// Builds a configuration from `GENGC_*` environment variables layered
    /// over the defaults, then validates it.
    ///
    /// Recognized variables: `GENGC_YOUNG_SIZE`, `GENGC_TRIGGER`,
    /// `GENGC_STEP_US`, `GENGC_CONCURRENT`, `GENGC_PROMOTION_AGE`,
    /// `GENGC_REGION_SIZE`, `GENGC_OLD_MAX`, `GENGC_LARGE_OBJECT`,
    /// `GENGC_MARKER_THREAD` and `GENGC_VERIFY`.
    pub fn from_env() -> GcResult<Self> {
        let mut config = match read_uint_from_env("GENGC_YOUNG_SIZE") {
            Some(size) => GcConfig::with_young_space_size(size),
            None => GcConfig::default(),
        };

        if let Some(trigger) = read_float_from_env("GENGC_TRIGGER") {
            config.old_gen_trigger_occupancy = trigger;
        }
        if let Some(us) = read_uint_from_env("GENGC_STEP_US") {
            config.incremental_step_budget = Duration::from_micros(us as u64);
        }
        if let Some(enabled) = read_bool_from_env("GENGC_CONCURRENT") {
            config.concurrent_marking_enabled = enabled;
        }
        if let Some(age) = read_uint_from_env("GENGC_PROMOTION_AGE") {
            config.promotion_age_threshold = age.min(u8::MAX as usize) as u8;
        }
        if let Some(size) = read_uint_from_env("GENGC_REGION_SIZE") {
            config.old_region_size = size;
        }
        if let Some(size) = read_uint_from_env("GENGC_OLD_MAX") {
            config.old_gen_max_size = size;
        }
        if let Some(size) = read_uint_from_env("GENGC_LARGE_OBJECT") {
            config.large_object_threshold = size;
        }
        if let Some(enabled) = read_bool_from_env("GENGC_MARKER_THREAD") {
            config.use_marker_thread = enabled;
        }
        if let Some(enabled) = read_bool_from_env("GENGC_VERIFY") {
            config.verify_heap = enabled;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration describes a usable heap.
    pub fn validate(&self) -> GcResult<()> {
        fn invalid(message: String) -> GcResult<()> {
            Err(GcError::InvalidConfig(message))
        }

        if self.young_space_size < MIN_YOUNG_SPACE_SIZE || self.young_space_size % 8 != 0 {
            return invalid(format!(
                "young_space_size must be a multiple of 8 and at least {} bytes, got {}",
                MIN_YOUNG_SPACE_SIZE, self.young_space_size
            ));
        }
        let trigger = self.old_gen_trigger_occupancy;
        if !(trigger > 0.0 && trigger <= 1.0) {
            return invalid(format!(
                "old_gen_trigger_occupancy must be in (0, 1], got {}",
                trigger
            ));
        }
        if self.promotion_age_threshold == 0 {
            return invalid("promotion_age_threshold must be at least 1".into());
        }
        if self.old_region_size < MIN_REGION_SIZE.max(MIN_BLOCK_SIZE)
            || self.old_region_size % 8 != 0
        {
            return invalid(format!(
                "old_region_size must be a multiple of 8 and at least {} bytes, got {}",
                MIN_REGION_SIZE, self.old_region_size
            ));
        }
        if self.old_gen_max_size < self.old_region_size {
            return invalid(format!(
                "old_gen_max_size ({}) is smaller than one region ({})",
                self.old_gen_max_size, self.old_region_size
            ));
        }
        if self.large_object_threshold < HEADER_SIZE
            || self.large_object_threshold > self.young_space_size
        {
            return invalid(format!(
                "large_object_threshold must be between {} and young_space_size ({}), got {}",
                HEADER_SIZE, self.young_space_size, self.large_object_threshold
            ));
        }
        if self.completion_work_limit == 0 {
            return invalid("completion_work_limit must be at least 1".into());
        }
        Ok(())
    }

    /// Old-generation occupancy in bytes at which a cycle starts.
    pub fn trigger_bytes(&self) -> usize {
        (self.old_gen_max_size as f64 * self.old_gen_trigger_occupancy) as usize
    }
}
