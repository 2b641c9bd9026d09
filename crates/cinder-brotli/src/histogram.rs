//! Symbol histograms and bit-cost estimation.

/// Symbol counts over an alphabet of at most `N` symbols.
#[derive(Debug, Clone)]
pub struct Histogram<const N: usize> {
    /// Per-symbol counts.
    pub counts: [u32; N],
    /// Sum of all counts.
    pub total: u32,
}

impl<const N: usize> Histogram<N> {
    /// Create an empty histogram.
    pub fn new() -> Self {
        Self {
            counts: [0; N],
            total: 0,
        }
    }

    /// Count one occurrence of `symbol`.
    #[inline]
    pub fn add(&mut self, symbol: usize) {
        self.counts[symbol] += 1;
        self.total += 1;
    }

    /// Remove one occurrence of `symbol`.
    #[inline]
    pub fn remove(&mut self, symbol: usize) {
        debug_assert!(self.counts[symbol] > 0);
        self.counts[symbol] -= 1;
        self.total -= 1;
    }

    /// Merge another histogram into this one.
    pub fn add_histogram(&mut self, other: &Self) {
        for (dst, src) in self.counts.iter_mut().zip(other.counts.iter()) {
            *dst += src;
        }
        self.total += other.total;
    }

    /// Number of symbols with a non-zero count.
    pub fn num_symbols(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

impl<const N: usize> Default for Histogram<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Literal histogram (byte alphabet).
pub type LiteralHistogram = Histogram<256>;

/// Command histogram (704 command prefix codes).
pub type CommandHistogram = Histogram<{ crate::prefix::NUM_COMMAND_PREFIXES }>;

/// Distance histogram, sized for the largest distance alphabet.
pub type DistanceHistogram = Histogram<640>;

/// Block-length histogram (26 length prefix codes).
pub type BlockLenHistogram = Histogram<{ crate::prefix::NUM_BLOCK_LEN_PREFIXES }>;

/// Shannon entropy of the histogram in bits.
pub fn entropy_bit_cost<const N: usize>(histogram: &Histogram<N>) -> f64 {
    if histogram.total == 0 {
        return 0.0;
    }
    let total = histogram.total as f64;
    let log2_total = total.log2();
    let mut bits = 0.0;
    for &count in histogram.counts.iter() {
        if count > 0 {
            bits += count as f64 * (log2_total - (count as f64).log2());
        }
    }
    bits
}

/// Estimated cost in bits of entropy-coding the histogram's population
/// plus transmitting its prefix code.
///
/// The estimate tracks the serialized forms: empty and single-symbol
/// codes cost a small fixed header, up-to-4-symbol codes pay per listed
/// symbol, larger codes pay the entropy plus an approximation of the
/// code-length sequence.
pub fn population_cost<const N: usize>(histogram: &Histogram<N>) -> f64 {
    const EMPTY_COST: f64 = 12.0;
    let count = histogram.num_symbols();
    match count {
        0 | 1 => EMPTY_COST,
        2..=4 => {
            let header = 3.0 + count as f64 * (N as f64).log2().ceil();
            header + entropy_bit_cost(histogram)
        }
        _ => {
            // Code-length sequence: roughly one token per populated symbol
            // plus run tokens for the gaps between them.
            let mut gaps = 0usize;
            let mut in_gap = false;
            for &c in histogram.counts.iter() {
                if c == 0 {
                    if !in_gap {
                        gaps += 1;
                        in_gap = true;
                    }
                } else {
                    in_gap = false;
                }
            }
            let code_cost = 40.0 + 4.0 * count as f64 + 6.0 * gaps as f64;
            code_cost + entropy_bit_cost(histogram)
        }
    }
}
