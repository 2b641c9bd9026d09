//! Meta-block assembly and serialization.
//!
//! A meta-block is the unit of framed output: it carries its own block
//! splits, context maps and prefix codes, followed by the entropy-coded
//! command/literal/distance body. This module turns a command list into
//! that self-describing form and packs it into the bit sink, in the
//! exact order the format prescribes.

use cinder_core::{Error, Result};

use super::backward_references::{Command, DISTANCE_PREFIX_NONE};
use super::block_splitter::{compute_block_type_short_codes, split_stream, BlockSplit};
use super::cluster::cluster_histograms;
use super::ring_buffer::RingBuffer;
use crate::bits::BitSink;
use crate::context::{
    distance_context, literal_context, LiteralContextMode, DISTANCE_CONTEXT_BITS,
    LITERAL_CONTEXT_BITS,
};
use crate::histogram::{
    population_cost, BlockLenHistogram, CommandHistogram, DistanceHistogram, Histogram,
    LiteralHistogram,
};
use crate::huffman::{build_entropy_code, entropy_encode, store_huffman_code, EntropyCode};
use crate::prefix::{
    block_length_prefix, command_prefix, copy_length_extra_bits, copy_length_offset,
    insert_length_extra_bits, insert_length_offset, num_distance_prefixes,
    prefix_encode_copy_distance, BLOCK_LEN_BASE, BLOCK_LEN_EXTRA, NUM_BLOCK_LEN_PREFIXES,
    NUM_COMMAND_PREFIXES,
};

/// Ring slot looked at by each distance short-code candidate.
pub const SHORT_CODE_INDEX_OFFSET: [usize; 16] = [3, 2, 1, 0, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2];

/// Delta applied by each distance short-code candidate.
pub const SHORT_CODE_VALUE_OFFSET: [i32; 16] =
    [0, 0, 0, 0, -1, 1, -2, 2, -3, 3, -1, 1, -2, 2, -3, 3];

/// Histogram ids must fit a byte with 16 values reserved for run-length
/// codes, capping clustered histograms per stream.
const MAX_HISTOGRAMS: usize = 240;

/// Split granularity for the literal stream.
const LITERAL_CHUNK: usize = 512;

/// Split granularity for the command and distance streams.
const COMMAND_CHUNK: usize = 128;

/// Per-meta-block encoding parameters.
#[derive(Debug, Clone, Copy)]
pub struct EncodingParams {
    pub num_direct_distance_codes: usize,
    pub distance_postfix_bits: u32,
    pub literal_context_mode: LiteralContextMode,
}

impl EncodingParams {
    /// Check the distance-parameter constraints.
    pub fn validate(&self) -> Result<()> {
        if self.distance_postfix_bits > 3 {
            return Err(Error::invalid_parameter(
                "distance_postfix_bits",
                self.distance_postfix_bits as i64,
                "0..=3",
            ));
        }
        if self.num_direct_distance_codes > 240
            || self.num_direct_distance_codes % (1 << self.distance_postfix_bits) != 0
        {
            return Err(Error::invalid_parameter(
                "num_direct_distance_codes",
                self.num_direct_distance_codes as i64,
                "multiple of 1 << distance_postfix_bits, at most 240",
            ));
        }
        Ok(())
    }
}

/// A fully assembled meta-block, ready for serialization.
#[derive(Debug)]
pub struct MetaBlock {
    pub cmds: Vec<Command>,
    pub params: EncodingParams,
    pub literal_split: BlockSplit,
    pub command_split: BlockSplit,
    pub distance_split: BlockSplit,
    pub literal_context_modes: Vec<LiteralContextMode>,
    pub literal_context_map: Vec<u32>,
    pub distance_context_map: Vec<u32>,
    pub literal_histograms: Vec<LiteralHistogram>,
    pub command_histograms: Vec<CommandHistogram>,
    pub distance_histograms: Vec<DistanceHistogram>,
}

/// Total bytes covered by a command list.
pub fn meta_block_length(cmds: &[Command]) -> usize {
    cmds.iter().map(|c| c.insert_length + c.copy_length).sum()
}

/// Resolve each command's distance against the 4-entry distance ring.
///
/// Candidate `k` proposes `ring[(idx + index_offset[k]) & 3] +
/// value_offset[k]`; the first equal candidate wins and the command's
/// distance code becomes `k + 1`, otherwise `distance + 16`. Candidates
/// beyond the first few are skipped for short distances, which keeps
/// popular short codes available for the matches that profit from them.
/// The ring absorbs the distance whenever the code is not "same as last".
pub fn compute_distance_short_codes(
    cmds: &mut [Command],
    dist_ring: &mut [usize; 4],
    ring_idx: &mut usize,
) {
    for cmd in cmds.iter_mut() {
        let dist = cmd.copy_distance;
        if dist == 0 {
            break;
        }
        let mut dist_code = dist + 16;
        for k in 0..16 {
            if dist < 11 && ((2..4).contains(&k) || k >= 6) {
                continue;
            }
            let candidate = dist_ring[(*ring_idx + SHORT_CODE_INDEX_OFFSET[k]) & 3] as i64
                + SHORT_CODE_VALUE_OFFSET[k] as i64;
            if dist as i64 == candidate {
                dist_code = k + 1;
                break;
            }
        }
        if dist_code > 1 {
            dist_ring[*ring_idx & 3] = dist;
            *ring_idx += 1;
        }
        cmd.distance_code = dist_code;
    }
}

/// Fill in each command's prefix symbols.
///
/// Commands whose combined code lands below 128 while re-using the last
/// distance suppress their distance symbol entirely; all other commands
/// shift into the upper half of the command alphabet and emit one.
pub fn compute_command_prefixes(cmds: &mut [Command], params: &EncodingParams) {
    for cmd in cmds.iter_mut() {
        cmd.command_prefix = command_prefix(cmd.insert_length, cmd.copy_length_code);
        if cmd.copy_length_code > 0 {
            let (prefix, extra_bits, extra_value) = prefix_encode_copy_distance(
                cmd.distance_code,
                params.num_direct_distance_codes,
                params.distance_postfix_bits,
            );
            cmd.distance_prefix = prefix;
            cmd.distance_extra_bits = extra_bits;
            cmd.distance_extra_bits_value = extra_value;
        }
        if cmd.command_prefix < 128 && cmd.distance_prefix == 0 {
            cmd.distance_prefix = DISTANCE_PREFIX_NONE;
        } else {
            cmd.command_prefix += 128;
        }
    }
}

// =============================================================================
// Block-split serialization
// =============================================================================

/// Prefix codes for one stream's block split.
pub struct BlockSplitCode {
    type_code: EntropyCode<256>,
    length_code: EntropyCode<{ NUM_BLOCK_LEN_PREFIXES }>,
}

/// Entropy-code a run length: length prefix symbol plus raw extra bits.
fn encode_block_length(
    sink: &mut BitSink,
    code: &EntropyCode<{ NUM_BLOCK_LEN_PREFIXES }>,
    length: u32,
) {
    let len_code = block_length_prefix(length as usize);
    entropy_encode(sink, len_code, code);
    let extra_bits = BLOCK_LEN_EXTRA[len_code];
    if extra_bits > 0 {
        sink.write_bits(extra_bits, (length - BLOCK_LEN_BASE[len_code]) as u64);
    }
}

/// Emit a stream's block-split header: a presence bit, and for split
/// streams the type count, both prefix codes and the first run's length.
fn build_and_encode_block_split_code(sink: &mut BitSink, split: &BlockSplit) -> BlockSplitCode {
    if split.num_types <= 1 {
        sink.write_bits(1, 0);
        return BlockSplitCode {
            type_code: build_entropy_code(&Histogram::new(), 15, 2),
            length_code: build_entropy_code(&Histogram::new(), 15, NUM_BLOCK_LEN_PREFIXES),
        };
    }
    sink.write_bits(1, 1);

    let mut type_histogram: Histogram<256> = Histogram::new();
    for &code in &split.type_codes {
        type_histogram.add(code as usize);
    }
    let mut length_histogram = BlockLenHistogram::new();
    for &len in &split.lengths {
        length_histogram.add(block_length_prefix(len as usize));
    }
    let code = BlockSplitCode {
        type_code: build_entropy_code(&type_histogram, 15, split.num_types + 2),
        length_code: build_entropy_code(&length_histogram, 15, NUM_BLOCK_LEN_PREFIXES),
    };
    sink.write_bits(8, (split.num_types - 1) as u64);
    store_huffman_code(sink, &code.type_code, split.num_types + 2);
    store_huffman_code(sink, &code.length_code, NUM_BLOCK_LEN_PREFIXES);
    encode_block_length(sink, &code.length_code, split.lengths[0]);
    code
}

/// Cursor over a block split, consumed once per stream symbol.
pub struct BlockSplitIterator<'a> {
    split: &'a BlockSplit,
    idx: usize,
    pub block_type: usize,
    remaining: u32,
}

impl<'a> BlockSplitIterator<'a> {
    pub fn new(split: &'a BlockSplit) -> Self {
        Self {
            split,
            idx: 0,
            block_type: split.types.first().copied().unwrap_or(0) as usize,
            remaining: split.lengths.first().copied().unwrap_or(0),
        }
    }

    /// Step to the symbol's block, without emitting anything.
    pub fn advance(&mut self) {
        if self.remaining == 0 {
            self.idx += 1;
            self.block_type = self.split.types[self.idx] as usize;
            self.remaining = self.split.lengths[self.idx];
        }
        self.remaining -= 1;
    }

    /// Step to the symbol's block, emitting the type code and length when
    /// a new run starts. The first run's length was already emitted with
    /// the split header.
    pub fn move_and_encode(&mut self, sink: &mut BitSink, code: &BlockSplitCode) {
        if self.remaining == 0 {
            self.idx += 1;
            self.block_type = self.split.types[self.idx] as usize;
            self.remaining = self.split.lengths[self.idx];
            entropy_encode(sink, self.split.type_codes[self.idx] as usize, &code.type_code);
            encode_block_length(sink, &code.length_code, self.remaining);
        }
        self.remaining -= 1;
    }
}

// =============================================================================
// Context-map serialization
// =============================================================================

/// Move-to-front transform over cluster ids.
fn move_to_front_transform(values: &[u32]) -> Vec<u32> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = *values.iter().max().unwrap();
    let mut mtf: Vec<u32> = (0..=max).collect();
    values
        .iter()
        .map(|&value| {
            let index = mtf.iter().position(|&m| m == value).unwrap();
            mtf.remove(index);
            mtf.insert(0, value);
            index as u32
        })
        .collect()
}

/// Replace zero runs with run-length tokens.
///
/// Token `p` in `[0, max_run_length_prefix]` stands for a run of
/// `2^p + extra` zeros with `p` extra bits; longer runs are chunked.
/// Non-zero values shift up by the prefix count. The prefix bound is
/// lowered to the largest run actually present.
fn run_length_code_zeros(
    values: &[u32],
    max_run_length_prefix: &mut u32,
) -> (Vec<u32>, Vec<u32>) {
    let mut max_reps = 0u32;
    let mut i = 0;
    while i < values.len() {
        while i < values.len() && values[i] != 0 {
            i += 1;
        }
        let mut reps = 0;
        while i < values.len() && values[i] == 0 {
            reps += 1;
            i += 1;
        }
        max_reps = max_reps.max(reps);
    }
    let max_prefix = if max_reps > 0 {
        31 - max_reps.leading_zeros()
    } else {
        0
    };
    *max_run_length_prefix = (*max_run_length_prefix).min(max_prefix);

    let mut symbols = Vec::new();
    let mut extra_bits = Vec::new();
    let mut i = 0;
    while i < values.len() {
        if values[i] != 0 {
            symbols.push(values[i] + *max_run_length_prefix);
            extra_bits.push(0);
            i += 1;
        } else {
            let mut reps = 1u32;
            while i + (reps as usize) < values.len() && values[i + reps as usize] == 0 {
                reps += 1;
            }
            i += reps as usize;
            loop {
                if reps < (2 << *max_run_length_prefix) {
                    let run_length_prefix = 31 - reps.leading_zeros();
                    symbols.push(run_length_prefix);
                    extra_bits.push(reps - (1 << run_length_prefix));
                    break;
                } else {
                    symbols.push(*max_run_length_prefix);
                    extra_bits.push((1 << *max_run_length_prefix) - 1);
                    reps -= (2 << *max_run_length_prefix) - 1;
                }
            }
        }
    }
    (symbols, extra_bits)
}

/// Pick the zero-run prefix bound in `[0, 16]` that minimizes the
/// estimated cost of the run-length-coded map.
fn best_max_zero_run_length_prefix(values: &[u32]) -> u32 {
    let mut min_cost = f64::INFINITY;
    let mut best_prefix = 0;
    for candidate in 0..=16u32 {
        let mut max_prefix = candidate;
        let (symbols, _) = run_length_code_zeros(values, &mut max_prefix);
        if max_prefix < candidate {
            break;
        }
        let mut histogram: Histogram<256> = Histogram::new();
        for &s in &symbols {
            histogram.add(s as usize);
        }
        let mut cost = population_cost(&histogram);
        if candidate > 0 {
            cost += 4.0;
        }
        for bits in 1..=candidate as usize {
            cost += histogram.counts[bits] as f64 * bits as f64;
        }
        if cost < min_cost {
            min_cost = cost;
            best_prefix = candidate;
        }
    }
    best_prefix
}

/// Serialize a context map: cluster count, move-to-front transform,
/// zero-run-length coding, one prefix code, then the coded symbols.
pub fn encode_context_map(sink: &mut BitSink, context_map: &[u32], num_clusters: usize) {
    sink.write_bits(8, (num_clusters - 1) as u64);
    if num_clusters == 1 {
        return;
    }

    let transformed = move_to_front_transform(context_map);
    let mut max_run_length_prefix = best_max_zero_run_length_prefix(&transformed);
    let (rle_symbols, extra_bits) =
        run_length_code_zeros(&transformed, &mut max_run_length_prefix);

    let mut symbol_histogram: Histogram<256> = Histogram::new();
    for &s in &rle_symbols {
        symbol_histogram.add(s as usize);
    }
    let alphabet_size = num_clusters + max_run_length_prefix as usize;
    let symbol_code = build_entropy_code(&symbol_histogram, 15, alphabet_size);

    let use_rle = max_run_length_prefix > 0;
    sink.write_bits(1, use_rle as u64);
    if use_rle {
        sink.write_bits(4, (max_run_length_prefix - 1) as u64);
    }
    store_huffman_code(sink, &symbol_code, alphabet_size);
    for (&symbol, &extra) in rle_symbols.iter().zip(extra_bits.iter()) {
        entropy_encode(sink, symbol as usize, &symbol_code);
        if symbol > 0 && symbol <= max_run_length_prefix {
            sink.write_bits(symbol, extra as u64);
        }
    }
    // The decoder applies the inverse move-to-front.
    sink.write_bits(1, 1);
}

// =============================================================================
// Meta-block assembly
// =============================================================================

/// Assemble a meta-block from prepared commands: prefix assignment,
/// block splitting, context-conditioned histograms and clustering.
/// `pos` is the absolute position of the block's first byte; the bytes
/// must already be in the ring buffer.
pub fn build_meta_block(
    params: EncodingParams,
    mut cmds: Vec<Command>,
    ring: &RingBuffer,
    pos: usize,
) -> MetaBlock {
    compute_command_prefixes(&mut cmds, &params);
    let end_pos = pos + meta_block_length(&cmds);

    // Stream extraction mirrors the emission walk, including the rule
    // that a copy ending the meta-block emits no distance symbol.
    let mut literal_symbols = Vec::new();
    let mut distance_symbols = Vec::new();
    let command_symbols: Vec<usize> = cmds.iter().map(|c| c.command_prefix as usize).collect();
    let mut p = pos;
    for cmd in &cmds {
        for _ in 0..cmd.insert_length {
            literal_symbols.push(ring.get(p) as usize);
            p += 1;
        }
        if p < end_pos && cmd.distance_prefix != DISTANCE_PREFIX_NONE {
            distance_symbols.push(cmd.distance_prefix as usize);
        }
        p += cmd.copy_length;
    }

    let mut literal_split = split_stream::<256>(&literal_symbols, LITERAL_CHUNK);
    let mut command_split =
        split_stream::<{ NUM_COMMAND_PREFIXES }>(&command_symbols, COMMAND_CHUNK);
    let mut distance_split = split_stream::<640>(&distance_symbols, COMMAND_CHUNK);
    compute_block_type_short_codes(&mut literal_split);
    compute_block_type_short_codes(&mut command_split);
    compute_block_type_short_codes(&mut distance_split);

    let literal_context_modes = vec![params.literal_context_mode; literal_split.num_types];

    let (literal_histograms, command_histograms, distance_histograms) = build_histograms(
        &cmds,
        &literal_split,
        &command_split,
        &distance_split,
        &literal_context_modes,
        ring,
        pos,
    );

    let (literal_histograms, literal_context_map) =
        cluster_histograms(&literal_histograms, MAX_HISTOGRAMS);
    let (distance_histograms, distance_context_map) =
        cluster_histograms(&distance_histograms, MAX_HISTOGRAMS);

    MetaBlock {
        cmds,
        params,
        literal_split,
        command_split,
        distance_split,
        literal_context_modes,
        literal_context_map,
        distance_context_map,
        literal_histograms,
        command_histograms,
        distance_histograms,
    }
}

/// Context-conditioned histograms for all three streams, walking the
/// commands exactly as the body emission will.
fn build_histograms(
    cmds: &[Command],
    literal_split: &BlockSplit,
    command_split: &BlockSplit,
    distance_split: &BlockSplit,
    literal_context_modes: &[LiteralContextMode],
    ring: &RingBuffer,
    pos: usize,
) -> (
    Vec<LiteralHistogram>,
    Vec<CommandHistogram>,
    Vec<DistanceHistogram>,
) {
    let mut literal_histograms =
        vec![LiteralHistogram::new(); literal_split.num_types << LITERAL_CONTEXT_BITS];
    let mut command_histograms = vec![CommandHistogram::new(); command_split.num_types];
    let mut distance_histograms =
        vec![DistanceHistogram::new(); distance_split.num_types << DISTANCE_CONTEXT_BITS];

    let mut literal_it = BlockSplitIterator::new(literal_split);
    let mut command_it = BlockSplitIterator::new(command_split);
    let mut distance_it = BlockSplitIterator::new(distance_split);

    let end_pos = pos + meta_block_length(cmds);
    let mut p = pos;
    for cmd in cmds {
        command_it.advance();
        command_histograms[command_it.block_type].add(cmd.command_prefix as usize);
        for _ in 0..cmd.insert_length {
            literal_it.advance();
            let prev1 = if p > 0 { ring.get(p - 1) } else { 0 };
            let prev2 = if p > 1 { ring.get(p - 2) } else { 0 };
            let context = (literal_it.block_type << LITERAL_CONTEXT_BITS)
                + literal_context(prev1, prev2, literal_context_modes[literal_it.block_type]);
            literal_histograms[context].add(ring.get(p) as usize);
            p += 1;
        }
        if p < end_pos && cmd.distance_prefix != DISTANCE_PREFIX_NONE {
            distance_it.advance();
            let context = (distance_it.block_type << DISTANCE_CONTEXT_BITS)
                + distance_context(cmd.copy_length_code);
            distance_histograms[context].add(cmd.distance_prefix as usize);
        }
        p += cmd.copy_length;
    }
    (literal_histograms, command_histograms, distance_histograms)
}

// =============================================================================
// Meta-block serialization
// =============================================================================

/// Frame a meta-block's byte length: a not-last bit, a nibble count, and
/// the nibbles of `length - 1` LSB-first.
fn encode_meta_block_length(sink: &mut BitSink, length_minus_one: usize) {
    sink.write_bits(1, 0);
    let num_bits = if length_minus_one == 0 {
        0
    } else {
        usize::BITS - length_minus_one.leading_zeros()
    };
    let nibbles = (num_bits + 3) >> 2;
    sink.write_bits(3, nibbles as u64);
    let mut value = length_minus_one;
    for _ in 0..nibbles {
        sink.write_bits(4, (value & 0xf) as u64);
        value >>= 4;
    }
}

/// Emit one command's prefix symbol and length extra bits.
fn encode_command(
    sink: &mut BitSink,
    cmd: &Command,
    code: &EntropyCode<{ NUM_COMMAND_PREFIXES }>,
) {
    entropy_encode(sink, cmd.command_prefix as usize, code);
    let mut base_code = cmd.command_prefix;
    if base_code >= 128 {
        base_code -= 128;
    }
    let insert_extra = insert_length_extra_bits(base_code);
    if insert_extra > 0 {
        sink.write_bits(
            insert_extra,
            (cmd.insert_length as u64) - insert_length_offset(base_code) as u64,
        );
    }
    let copy_extra = copy_length_extra_bits(base_code);
    if copy_extra > 0 {
        sink.write_bits(
            copy_extra,
            (cmd.copy_length_code as u64) - copy_length_offset(base_code) as u64,
        );
    }
}

/// Emit one command's distance symbol and extra bits.
fn encode_copy_distance(sink: &mut BitSink, cmd: &Command, code: &EntropyCode<640>) {
    entropy_encode(sink, cmd.distance_prefix as usize, code);
    if cmd.distance_extra_bits > 0 {
        sink.write_bits(cmd.distance_extra_bits, cmd.distance_extra_bits_value);
    }
}

/// Serialize a meta-block: length framing, block-split codes, distance
/// parameters, context modes and maps, prefix codes, then the
/// interleaved body. Advances `pos` past every emitted literal and copy;
/// on return `pos` sits exactly at the block's end.
pub fn store_meta_block(mb: &MetaBlock, ring: &RingBuffer, pos: &mut usize, sink: &mut BitSink) {
    let length = meta_block_length(&mb.cmds);
    let end_pos = *pos + length;
    encode_meta_block_length(sink, length - 1);

    let literal_split_code = build_and_encode_block_split_code(sink, &mb.literal_split);
    let command_split_code = build_and_encode_block_split_code(sink, &mb.command_split);
    let distance_split_code = build_and_encode_block_split_code(sink, &mb.distance_split);

    sink.write_bits(2, mb.params.distance_postfix_bits as u64);
    sink.write_bits(
        4,
        (mb.params.num_direct_distance_codes >> mb.params.distance_postfix_bits) as u64,
    );
    let num_distance_codes = num_distance_prefixes(
        mb.params.num_direct_distance_codes,
        mb.params.distance_postfix_bits,
    );
    for mode in &mb.literal_context_modes {
        sink.write_bits(2, mode.to_bits());
    }

    encode_context_map(sink, &mb.literal_context_map, mb.literal_histograms.len());
    encode_context_map(sink, &mb.distance_context_map, mb.distance_histograms.len());

    let literal_codes: Vec<EntropyCode<256>> = mb
        .literal_histograms
        .iter()
        .map(|h| build_entropy_code(h, 15, 256))
        .collect();
    let command_codes: Vec<EntropyCode<{ NUM_COMMAND_PREFIXES }>> = mb
        .command_histograms
        .iter()
        .map(|h| build_entropy_code(h, 15, NUM_COMMAND_PREFIXES))
        .collect();
    let distance_codes: Vec<EntropyCode<640>> = mb
        .distance_histograms
        .iter()
        .map(|h| build_entropy_code(h, 15, num_distance_codes))
        .collect();
    for code in &literal_codes {
        store_huffman_code(sink, code, 256);
    }
    for code in &command_codes {
        store_huffman_code(sink, code, NUM_COMMAND_PREFIXES);
    }
    for code in &distance_codes {
        store_huffman_code(sink, code, num_distance_codes);
    }

    let mut literal_it = BlockSplitIterator::new(&mb.literal_split);
    let mut command_it = BlockSplitIterator::new(&mb.command_split);
    let mut distance_it = BlockSplitIterator::new(&mb.distance_split);

    for cmd in &mb.cmds {
        command_it.move_and_encode(sink, &command_split_code);
        encode_command(sink, cmd, &command_codes[command_it.block_type]);
        for _ in 0..cmd.insert_length {
            literal_it.move_and_encode(sink, &literal_split_code);
            let prev1 = if *pos > 0 { ring.get(*pos - 1) } else { 0 };
            let prev2 = if *pos > 1 { ring.get(*pos - 2) } else { 0 };
            let context = (literal_it.block_type << LITERAL_CONTEXT_BITS)
                + literal_context(
                    prev1,
                    prev2,
                    mb.literal_context_modes[literal_it.block_type],
                );
            let histogram_idx = mb.literal_context_map[context] as usize;
            entropy_encode(sink, ring.get(*pos) as usize, &literal_codes[histogram_idx]);
            *pos += 1;
        }
        if *pos < end_pos && cmd.distance_prefix != DISTANCE_PREFIX_NONE {
            distance_it.move_and_encode(sink, &distance_split_code);
            let context = (distance_it.block_type << DISTANCE_CONTEXT_BITS)
                + distance_context(cmd.copy_length_code);
            let histogram_idx = mb.distance_context_map[context] as usize;
            encode_copy_distance(sink, cmd, &distance_codes[histogram_idx]);
        }
        *pos += cmd.copy_length;
    }
    debug_assert_eq!(*pos, end_pos);
}
