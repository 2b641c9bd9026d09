//! Core type definitions for compression operations.

/// Compression level presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// No effort spent on matching beyond the minimum (fastest).
    None,

    /// Optimized for speed over ratio.
    Fast,

    /// Balanced speed and ratio (default).
    #[default]
    Default,

    /// Optimized for ratio over speed.
    Best,

    /// Maximum compression, slowest.
    Ultra,

    /// Custom level (algorithm-specific range).
    Custom(i32),
}

impl CompressionLevel {
    /// Convert to numeric level for algorithms.
    pub fn to_level(self) -> i32 {
        match self {
            CompressionLevel::None => 0,
            CompressionLevel::Fast => 1,
            CompressionLevel::Default => 6,
            CompressionLevel::Best => 9,
            CompressionLevel::Ultra => 12,
            CompressionLevel::Custom(level) => level,
        }
    }

    /// Create from numeric level.
    pub fn from_level(level: i32) -> Self {
        match level {
            0 => CompressionLevel::None,
            1..=3 => CompressionLevel::Fast,
            4..=6 => CompressionLevel::Default,
            7..=9 => CompressionLevel::Best,
            10.. => CompressionLevel::Ultra,
            _ => CompressionLevel::Custom(level),
        }
    }
}

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Brotli - high compression ratio, context modeling.
    Brotli,
}

impl Algorithm {
    /// Get algorithm name as string.
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Brotli => "brotli",
        }
    }
}

/// Compression ratio metrics.
#[derive(Debug, Clone, Copy)]
pub struct CompressionRatio {
    /// Original uncompressed size in bytes.
    pub original_size: usize,
    /// Compressed size in bytes.
    pub compressed_size: usize,
}

impl CompressionRatio {
    /// Create new ratio from sizes.
    pub fn new(original: usize, compressed: usize) -> Self {
        CompressionRatio {
            original_size: original,
            compressed_size: compressed,
        }
    }

    /// Calculate ratio (original / compressed).
    /// Higher is better (more compression).
    pub fn ratio(&self) -> f64 {
        if self.compressed_size == 0 {
            return 0.0;
        }
        self.original_size as f64 / self.compressed_size as f64
    }

    /// Calculate space savings as percentage (0-100).
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - (self.compressed_size as f64 / self.original_size as f64)) * 100.0
    }

    /// Check if compression was effective (saved space).
    pub fn is_effective(&self) -> bool {
        self.compressed_size < self.original_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_roundtrip() {
        assert_eq!(CompressionLevel::from_level(6), CompressionLevel::Default);
        assert_eq!(CompressionLevel::Best.to_level(), 9);
    }

    #[test]
    fn test_ratio() {
        let r = CompressionRatio::new(1000, 250);
        assert_eq!(r.ratio(), 4.0);
        assert!(r.is_effective());
        assert_eq!(r.savings_percent(), 75.0);
    }

    #[test]
    fn test_ratio_degenerate() {
        assert_eq!(CompressionRatio::new(0, 0).savings_percent(), 0.0);
        assert_eq!(CompressionRatio::new(100, 0).ratio(), 0.0);
    }
}
