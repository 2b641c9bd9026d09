//! Backward-reference search.
//!
//! Produces the command list for one meta-block: alternating literal
//! inserts and copies from the history window. Match candidates come from
//! a hash chain over 4-byte prefixes; acceptance weighs the copy against
//! the estimated entropy cost of emitting the covered bytes as literals.

use super::ring_buffer::RingBuffer;

/// Sentinel distance prefix for commands that emit no distance symbol.
pub const DISTANCE_PREFIX_NONE: u16 = 0xffff;

/// Minimum accepted copy length.
const MIN_MATCH: usize = 3;

/// Hash bucket count exponent.
const HASH_BITS: u32 = 17;

/// Chain table size exponent; bounds how much history the chain spans.
const CHAIN_BITS: u32 = 22;

/// Sliding-window size for the literal cost model.
const COST_WINDOW: usize = 2048;

/// One unit of output: `insert_length` literals followed by a copy of
/// `copy_length` bytes from `copy_distance` back. The trailing command of
/// a meta-block may carry no copy (`copy_distance == 0`).
#[derive(Debug, Clone)]
pub struct Command {
    pub insert_length: usize,
    pub copy_length: usize,
    /// Copy length as used for code selection and the distance-context
    /// rule; zero for the trailing no-copy command.
    pub copy_length_code: usize,
    pub copy_distance: usize,
    /// Resolved by the distance short-code pass: 1..=16 select a ring
    /// expression, larger values are `distance + 16`.
    pub distance_code: usize,
    /// Command prefix symbol, shifted by 128 when a distance follows.
    pub command_prefix: u16,
    /// Distance prefix symbol, or [`DISTANCE_PREFIX_NONE`].
    pub distance_prefix: u16,
    pub distance_extra_bits: u32,
    pub distance_extra_bits_value: u64,
}

impl Command {
    /// Command covering `insert_length` literals and a copy.
    pub fn new_copy(insert_length: usize, copy_length: usize, copy_distance: usize) -> Self {
        Self {
            insert_length,
            copy_length,
            copy_length_code: copy_length,
            copy_distance,
            distance_code: 0,
            command_prefix: 0,
            distance_prefix: 0,
            distance_extra_bits: 0,
            distance_extra_bits_value: 0,
        }
    }

    /// Trailing literal-only command.
    pub fn new_insert(insert_length: usize) -> Self {
        Self::new_copy(insert_length, 0, 0).with_no_copy()
    }

    fn with_no_copy(mut self) -> Self {
        self.copy_length = 0;
        self.copy_length_code = 0;
        self.copy_distance = 0;
        self
    }
}

/// Hash-chain index over the history window.
///
/// Buckets key on 4-byte prefixes; entries store absolute positions
/// (plus one, zero meaning empty). State persists across meta-blocks so
/// copies can reach back into earlier input.
#[derive(Debug)]
pub struct Hasher {
    head: Vec<u32>,
    chain: Vec<u32>,
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            head: vec![0; 1 << HASH_BITS],
            chain: vec![0; 1 << CHAIN_BITS],
        }
    }

    #[inline]
    fn hash(ring: &RingBuffer, pos: usize) -> usize {
        let word = u32::from_le_bytes([
            ring.get(pos),
            ring.get(pos + 1),
            ring.get(pos + 2),
            ring.get(pos + 3),
        ]);
        (word.wrapping_mul(0x9e37_79b1) >> (32 - HASH_BITS)) as usize
    }

    /// Record `pos` as a future match candidate.
    #[inline]
    pub fn insert(&mut self, ring: &RingBuffer, pos: usize) {
        let bucket = Self::hash(ring, pos);
        self.chain[pos & ((1 << CHAIN_BITS) - 1)] = self.head[bucket];
        self.head[bucket] = pos as u32 + 1;
    }

    /// Longest match at `pos`, bounded by `max_length` bytes and
    /// `max_backward` distance. Returns `(length, distance)`.
    pub fn find_longest_match(
        &self,
        ring: &RingBuffer,
        pos: usize,
        max_length: usize,
        max_backward: usize,
        search_depth: usize,
    ) -> Option<(usize, usize)> {
        if max_length < MIN_MATCH {
            return None;
        }
        let min_pos = pos.saturating_sub(max_backward);
        let mut candidate = self.head[Self::hash(ring, pos)] as usize;
        let mut best_len = MIN_MATCH - 1;
        let mut best_dist = 0;

        for _ in 0..search_depth {
            if candidate == 0 {
                break;
            }
            let cand_pos = candidate - 1;
            if cand_pos >= pos || cand_pos < min_pos {
                break;
            }
            let len = Self::match_length(ring, cand_pos, pos, max_length);
            if len > best_len {
                best_len = len;
                best_dist = pos - cand_pos;
                if len == max_length {
                    break;
                }
            }
            let next = self.chain[cand_pos & ((1 << CHAIN_BITS) - 1)] as usize;
            // Stale chain entries can point forward; stop rather than cycle.
            if next == 0 || next - 1 >= cand_pos {
                break;
            }
            candidate = next;
        }

        if best_dist > 0 {
            Some((best_len, best_dist))
        } else {
            None
        }
    }

    #[inline]
    fn match_length(ring: &RingBuffer, a: usize, b: usize, max_length: usize) -> usize {
        let mut len = 0;
        while len < max_length && ring.get(a + len) == ring.get(b + len) {
            len += 1;
        }
        len
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill `cost[p & mask]` with an estimated bit cost of coding the literal
/// at each position in `[pos, pos + len)`, from a sliding byte-frequency
/// window over the preceding input.
pub fn estimate_bit_costs_for_literals(
    ring: &RingBuffer,
    pos: usize,
    len: usize,
    cost: &mut [f32],
) {
    let mask = cost.len() - 1;
    let mut counts = [0u32; 256];
    let mut window_start = pos.saturating_sub(COST_WINDOW);
    let mut total: u32 = (pos - window_start) as u32;
    for q in window_start..pos {
        counts[ring.get(q) as usize] += 1;
    }
    for p in pos..pos + len {
        let byte = ring.get(p) as usize;
        cost[p & mask] = (((total + 256) as f32) / ((counts[byte] + 1) as f32)).log2();
        counts[byte] += 1;
        total += 1;
        if total as usize > COST_WINDOW {
            counts[ring.get(window_start) as usize] -= 1;
            window_start += 1;
            total -= 1;
        }
    }
}

/// Estimated bits for a copy command reaching `distance` back.
#[inline]
fn backward_match_cost(distance: usize) -> f32 {
    11.0 + ((distance + 16) as f32).log2()
}

/// Sum of literal cost estimates over `[pos, pos + len)`.
#[inline]
fn literal_span_cost(cost: &[f32], mask: usize, pos: usize, len: usize) -> f32 {
    (pos..pos + len).map(|p| cost[p & mask]).sum()
}

/// Produce the command list for `input_size` bytes starting at absolute
/// position `pos`. The bytes must already be in the ring buffer.
pub fn create_backward_references(
    ring: &RingBuffer,
    literal_cost: &[f32],
    pos: usize,
    input_size: usize,
    max_backward: usize,
    hasher: &mut Hasher,
    search_depth: usize,
) -> Vec<Command> {
    let cost_mask = literal_cost.len() - 1;
    let block_end = pos + input_size;
    let mut commands = Vec::new();
    let mut insert_start = pos;
    let mut i = pos;

    while i + MIN_MATCH < block_end {
        let max_length = block_end - i;
        let found = hasher.find_longest_match(ring, i, max_length, max_backward, search_depth);
        hasher.insert(ring, i);

        let (len, dist) = match found {
            Some(m) => m,
            None => {
                i += 1;
                continue;
            }
        };
        if backward_match_cost(dist) >= literal_span_cost(literal_cost, cost_mask, i, len) {
            i += 1;
            continue;
        }

        // One-step lazy evaluation: a clearly better match at the next
        // position wins over committing here.
        if len < max_length - 1 {
            if let Some((next_len, next_dist)) =
                hasher.find_longest_match(ring, i + 1, block_end - i - 1, max_backward, search_depth)
            {
                let next_ok = backward_match_cost(next_dist)
                    < literal_span_cost(literal_cost, cost_mask, i + 1, next_len);
                if next_ok && next_len > len + 1 {
                    i += 1;
                    continue;
                }
            }
        }

        commands.push(Command::new_copy(i - insert_start, len, dist));
        for j in 1..len {
            if i + j + MIN_MATCH < block_end {
                hasher.insert(ring, i + j);
            }
        }
        i += len;
        insert_start = i;
    }

    if insert_start < block_end {
        commands.push(Command::new_insert(block_end - insert_start));
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(bytes: &[u8]) -> RingBuffer {
        let mut ring = RingBuffer::new(16);
        ring.write(0, bytes);
        ring
    }

    fn flat_costs() -> Vec<f32> {
        vec![8.0; 1 << 16]
    }

    fn commands_for(bytes: &[u8]) -> Vec<Command> {
        let ring = ring_with(bytes);
        let mut hasher = Hasher::new();
        create_backward_references(&ring, &flat_costs(), 0, bytes.len(), 1 << 16, &mut hasher, 64)
    }

    fn total_coverage(cmds: &[Command]) -> usize {
        cmds.iter().map(|c| c.insert_length + c.copy_length).sum()
    }

    #[test]
    fn test_commands_cover_input_exactly() {
        for input in [
            b"abcabcabcabcabcabcabcabc".to_vec(),
            b"no repeats here!".to_vec(),
            vec![0u8; 500],
            b"x".to_vec(),
        ] {
            let cmds = commands_for(&input);
            assert_eq!(total_coverage(&cmds), input.len());
        }
    }

    #[test]
    fn test_repetitive_input_uses_copies() {
        let input: Vec<u8> = b"abcdefgh".iter().cycle().take(400).copied().collect();
        let cmds = commands_for(&input);
        let copied: usize = cmds.iter().map(|c| c.copy_length).sum();
        assert!(copied > 300, "expected copies to dominate, got {copied}");
        for cmd in &cmds {
            if cmd.copy_distance > 0 {
                assert!(cmd.copy_length >= MIN_MATCH);
                assert!(cmd.copy_distance <= 400);
            }
        }
    }

    #[test]
    fn test_copies_reconstruct_input() {
        let input: Vec<u8> = b"the quick brown fox jumps over the quick brown dog "
            .iter()
            .cycle()
            .take(600)
            .copied()
            .collect();
        let cmds = commands_for(&input);

        let mut out = Vec::new();
        for cmd in &cmds {
            let start = out.len();
            out.extend_from_slice(&input[start..start + cmd.insert_length]);
            for _ in 0..cmd.copy_length {
                let b = out[out.len() - cmd.copy_distance];
                out.push(b);
            }
        }
        assert_eq!(out, input);
    }

    #[test]
    fn test_trailing_command_has_no_copy() {
        let cmds = commands_for(b"abcabcabcabcabcXYZ!");
        let last = cmds.last().unwrap();
        assert_eq!(last.copy_distance, 0);
        assert_eq!(last.copy_length_code, 0);
    }

    #[test]
    fn test_incompressible_input_is_one_insert() {
        let input: Vec<u8> = (0..=255u8).collect();
        let cmds = commands_for(&input);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].insert_length, 256);
    }

    #[test]
    fn test_match_respects_block_boundary() {
        // Second call continues from the first; matches may reach back
        // into the previous block but never past the current end.
        let mut ring = RingBuffer::new(16);
        let a = b"hello world hello world ";
        let b = b"hello world again";
        ring.write(0, a);
        ring.write(a.len(), b);
        let mut hasher = Hasher::new();
        let costs = flat_costs();
        let first =
            create_backward_references(&ring, &costs, 0, a.len(), 1 << 16, &mut hasher, 64);
        assert_eq!(total_coverage(&first), a.len());
        let second =
            create_backward_references(&ring, &costs, a.len(), b.len(), 1 << 16, &mut hasher, 64);
        assert_eq!(total_coverage(&second), b.len());
        // "hello world " in the second block matches across the boundary.
        assert!(second.iter().any(|c| c.copy_distance > 0));
    }

    #[test]
    fn test_literal_cost_window() {
        let mut ring = RingBuffer::new(12);
        let input: Vec<u8> = std::iter::repeat(b'a').take(100).chain(b"z".iter().copied()).collect();
        ring.write(0, &input);
        let mut cost = vec![0.0f32; 1 << 12];
        estimate_bit_costs_for_literals(&ring, 0, input.len(), &mut cost);
        // A byte seen 99 times before is far cheaper than a novel one.
        assert!(cost[99] < cost[100]);
        assert!(cost[100] > 6.0);
    }
}
