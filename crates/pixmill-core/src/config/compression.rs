//! Compression service configuration.

/// The WebP format cannot encode either dimension above this.
pub const WEBP_MAX_DIMENSION: u32 = 16_383;

/// Configuration for the compression service and its pipeline.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Concurrent pipeline vs sequential processing.
    pub concurrent: bool,
    /// Dry-run: exercise decode/encode but persist nothing and mutate no rows.
    pub test_mode: bool,
    /// Maximum rows claimed per run.
    pub batch_size: i64,
    /// Base worker count; the pipeline derives its I/O and CPU fan-out
    /// from this.
    pub num_workers: usize,
    /// WebP quality, 1–100.
    pub webp_quality: u8,
    /// Maximum derivative width in pixels.
    pub max_width: u32,
    /// Maximum derivative height in pixels.
    pub max_height: u32,
    /// Failure ceiling before a task moves to the dead-letter queue.
    pub max_retries: i32,
}

impl CompressionConfig {
    /// Parallelism of the reader and writer stages. I/O workers outnumber
    /// CPU workers because they spend most of their time blocked.
    pub fn io_workers(&self) -> usize {
        self.num_workers.max(1) * 2
    }

    /// Parallelism of the encoding stage.
    pub fn cpu_workers(&self) -> usize {
        self.num_workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_split() {
        let cfg = CompressionConfig {
            concurrent: true,
            test_mode: false,
            batch_size: 50,
            num_workers: 4,
            webp_quality: 75,
            max_width: 1980,
            max_height: 1980,
            max_retries: 3,
        };
        assert_eq!(cfg.io_workers(), 8);
        assert_eq!(cfg.cpu_workers(), 4);
    }

    #[test]
    fn test_worker_split_never_zero() {
        let cfg = CompressionConfig {
            concurrent: true,
            test_mode: false,
            batch_size: 1,
            num_workers: 0,
            webp_quality: 75,
            max_width: 100,
            max_height: 100,
            max_retries: 3,
        };
        assert_eq!(cfg.io_workers(), 2);
        assert_eq!(cfg.cpu_workers(), 1);
    }
}
