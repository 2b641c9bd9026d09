//! Block splitting.
//!
//! Partitions a symbol stream into runs of "block types" so that each
//! type can carry its own entropy model. The split is found by chunking
//! the stream, clustering per-chunk histograms, and merging adjacent
//! chunks that land in the same cluster. Types are numbered in order of
//! first appearance, so the first run is always type 0.

use super::cluster::cluster_histograms;
use crate::histogram::Histogram;

/// Upper bound on block types per stream.
const MAX_BLOCK_TYPES: usize = 8;

/// A partition of one symbol stream into typed runs.
#[derive(Debug, Clone, Default)]
pub struct BlockSplit {
    pub num_types: usize,
    /// Block type per run.
    pub types: Vec<u8>,
    /// Symbol count per run.
    pub lengths: Vec<u32>,
    /// Derived type short codes per run (see
    /// [`compute_block_type_short_codes`]).
    pub type_codes: Vec<u16>,
}

impl BlockSplit {
    /// Split covering the whole stream with one type.
    pub fn single(len: usize) -> Self {
        let (types, lengths) = if len == 0 {
            (Vec::new(), Vec::new())
        } else {
            (vec![0], vec![len as u32])
        };
        Self {
            num_types: 1,
            types,
            lengths,
            type_codes: Vec::new(),
        }
    }

    /// Sum of run lengths; must equal the stream's element count.
    pub fn total_length(&self) -> usize {
        self.lengths.iter().map(|&l| l as usize).sum()
    }
}

/// Upper bound on chunks fed to the clusterer; long streams use
/// proportionally coarser chunks.
const MAX_CHUNKS: usize = 64;

/// Split `symbols` into typed runs, keying types on local symbol
/// statistics. `chunk_len` is the minimum split granularity.
pub fn split_stream<const N: usize>(symbols: &[usize], chunk_len: usize) -> BlockSplit {
    if symbols.len() < 2 * chunk_len {
        return BlockSplit::single(symbols.len());
    }
    let chunk_len = chunk_len.max(symbols.len().div_ceil(MAX_CHUNKS));

    let chunk_histograms: Vec<Histogram<N>> = symbols
        .chunks(chunk_len)
        .map(|chunk| {
            let mut h: Histogram<N> = Histogram::new();
            for &s in chunk {
                h.add(s);
            }
            h
        })
        .collect();
    let (_, chunk_clusters) = cluster_histograms(&chunk_histograms, MAX_BLOCK_TYPES);

    // Adjacent chunks in the same cluster fuse into one run; cluster ids
    // are renumbered by first appearance.
    let mut split = BlockSplit::default();
    let mut type_of_cluster = vec![u8::MAX; chunk_histograms.len()];
    let mut run_start = 0usize;
    for (i, &cluster) in chunk_clusters.iter().enumerate() {
        let chunk_end = ((i + 1) * chunk_len).min(symbols.len());
        let is_last = i + 1 == chunk_clusters.len();
        if is_last || chunk_clusters[i + 1] != cluster {
            let cluster = cluster as usize;
            if type_of_cluster[cluster] == u8::MAX {
                type_of_cluster[cluster] = split.num_types as u8;
                split.num_types += 1;
            }
            split.types.push(type_of_cluster[cluster]);
            split.lengths.push((chunk_end - run_start) as u32);
            run_start = chunk_end;
        }
    }
    debug_assert_eq!(split.total_length(), symbols.len());
    split
}

/// Derive the per-run type short codes from a 2-entry ring of recent
/// types: 0 = same type as two runs back, 1 = previous type plus one,
/// otherwise the type value shifted by 2.
pub fn compute_block_type_short_codes(split: &mut BlockSplit) {
    if split.num_types <= 1 {
        split.num_types = 1;
        return;
    }
    let mut ring = [0usize, 1usize];
    let mut index = 0usize;
    split.type_codes.clear();
    for &block_type in &split.types {
        let block_type = block_type as usize;
        let type_code = if block_type == ring[index & 1] {
            0
        } else if block_type == ring[index.wrapping_sub(1) & 1] + 1 {
            1
        } else {
            (block_type + 2) as u16
        };
        ring[index & 1] = block_type;
        index += 1;
        split.type_codes.push(type_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_stream_is_single_type() {
        let split = split_stream::<256>(&[1, 2, 3], 64);
        assert_eq!(split.num_types, 1);
        assert_eq!(split.total_length(), 3);
    }

    #[test]
    fn test_empty_stream() {
        let split = split_stream::<256>(&[], 64);
        assert_eq!(split.num_types, 1);
        assert_eq!(split.total_length(), 0);
        assert!(split.types.is_empty());
    }

    #[test]
    fn test_two_phase_stream_splits() {
        // 1024 symbols of one population followed by 1024 of another.
        let mut symbols = vec![0usize; 1024];
        symbols.extend(std::iter::repeat(200usize).take(1024));
        let split = split_stream::<256>(&symbols, 64);
        assert_eq!(split.total_length(), symbols.len());
        assert!(split.num_types >= 2, "expected distinct phases to split");
        assert_eq!(split.types[0], 0, "first run must be type 0");
    }

    #[test]
    fn test_uniform_stream_is_one_run() {
        let symbols = vec![7usize; 4096];
        let split = split_stream::<256>(&symbols, 64);
        assert_eq!(split.num_types, 1);
        assert_eq!(split.types.len(), 1);
        assert_eq!(split.lengths[0], 4096);
    }

    #[test]
    fn test_coverage_on_mixed_stream() {
        let symbols: Vec<usize> = (0..5000).map(|i| (i / 700) % 3 * 80).collect();
        let split = split_stream::<256>(&symbols, 128);
        assert_eq!(split.total_length(), 5000);
    }

    #[test]
    fn test_type_short_codes() {
        let mut split = BlockSplit {
            num_types: 3,
            types: vec![0, 1, 2, 0, 2, 2],
            lengths: vec![1; 6],
            type_codes: Vec::new(),
        };
        compute_block_type_short_codes(&mut split);
        // Run 0: type 0 matches ring slot (init [0, 1]) -> code 0.
        // Run 1: type 1 == ring[previous] + 1? ring was [0,1], index 1:
        //        ring[1 & 1] = 1 -> code 0.
        // Run 2: type 2 == previous type 1 + 1 -> code 1.
        // Run 3: type 0 vs ring -> explicit 0 + 2.
        // Run 4: type 2 == two-back type 2 -> code 0.
        // Run 5: type 2 vs ring [0-overwritten..]: explicit or repeat.
        assert_eq!(split.type_codes.len(), 6);
        assert_eq!(split.type_codes[0], 0);
        assert_eq!(split.type_codes[1], 0);
        assert_eq!(split.type_codes[2], 1);
        assert_eq!(split.type_codes[3], 2);
        assert_eq!(split.type_codes[4], 0);
    }

    #[test]
    fn test_single_type_skips_short_codes() {
        let mut split = BlockSplit::single(100);
        compute_block_type_short_codes(&mut split);
        assert!(split.type_codes.is_empty());
    }
}
