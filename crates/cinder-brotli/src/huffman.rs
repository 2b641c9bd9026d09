//! Prefix-code construction and serialization.
//!
//! Codes are canonical and length-limited: 15 bits for symbol alphabets,
//! 5 bits for the 19-symbol code-length alphabet used to transmit other
//! codes. Codewords are stored bit-reversed so that LSB-first emission
//! matches a decoder walking the canonical tree from the first bit.

use crate::bits::BitSink;
use crate::histogram::Histogram;

/// Size of the code-length alphabet (depths 0-15 plus three run symbols).
pub const CODE_LENGTH_CODES: usize = 19;

/// Repeat-previous-depth token (2 extra bits, runs of 3-6).
pub const REPEAT_PREVIOUS: u8 = 16;

/// Short zero-run token (3 extra bits, runs of 3-10).
pub const REPEAT_ZERO_SHORT: u8 = 17;

/// Long zero-run token (7 extra bits, runs of 11-138).
pub const REPEAT_ZERO_LONG: u8 = 18;

/// Transmission order of the code-length code's own depths.
pub const CODE_LENGTH_STORAGE_ORDER: [usize; CODE_LENGTH_CODES] = [
    1, 2, 3, 4, 0, 17, 18, 5, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Fixed code lengths for transmitting a code-length-code depth (0-5).
const DEPTH_CODE_LEN: [u32; 6] = [2, 4, 3, 2, 2, 4];

/// Fixed codewords for transmitting a code-length-code depth (0-5).
const DEPTH_CODE_BITS: [u64; 6] = [0, 7, 3, 1, 2, 15];

/// A canonical, length-limited prefix code over an alphabet of size `N`.
#[derive(Debug, Clone)]
pub struct EntropyCode<const N: usize> {
    /// Number of distinct symbols with non-zero count.
    pub count: usize,
    /// The distinct symbols, when there are at most four.
    pub symbols: [usize; 4],
    /// Code length per symbol (0 = absent).
    pub depth: [u8; N],
    /// Bit-reversed canonical codeword per symbol.
    pub bits: [u16; N],
}

impl<const N: usize> EntropyCode<N> {
    fn empty() -> Self {
        Self {
            count: 0,
            symbols: [0; 4],
            depth: [0; N],
            bits: [0; N],
        }
    }
}

/// Entropy-encode one symbol. Codes with fewer than two symbols carry no
/// information and emit nothing.
#[inline]
pub fn entropy_encode<const N: usize>(sink: &mut BitSink, symbol: usize, code: &EntropyCode<N>) {
    if code.count <= 1 {
        return;
    }
    debug_assert!(code.depth[symbol] > 0);
    sink.write_bits(code.depth[symbol] as u32, code.bits[symbol] as u64);
}

/// Build a depth-limited canonical prefix code from a histogram.
///
/// `max_depth` is 15 for symbol alphabets and 5 for the code-length
/// alphabet. When the optimal tree is too deep, small counts are clamped
/// upward and the tree rebuilt until it fits.
pub fn build_entropy_code<const N: usize>(
    histogram: &Histogram<N>,
    max_depth: u8,
    alphabet_size: usize,
) -> EntropyCode<N> {
    debug_assert!(alphabet_size <= N);
    let mut code = EntropyCode::empty();

    let present: Vec<(usize, u32)> = histogram.counts[..alphabet_size]
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(s, &c)| (s, c))
        .collect();
    code.count = present.len();
    for (slot, &(sym, _)) in present.iter().take(4).enumerate() {
        code.symbols[slot] = sym;
    }
    if code.count <= 1 {
        return code;
    }

    build_depths_limited(&present, max_depth, &mut code.depth);
    convert_depths_to_codewords(&code.depth, alphabet_size, &mut code.bits);
    code
}

/// Assign Huffman depths, clamping small counts until the tree fits the
/// depth limit.
fn build_depths_limited(present: &[(usize, u32)], max_depth: u8, depth: &mut [u8]) {
    let mut count_limit = 1u32;
    loop {
        let mut leaves: Vec<(u64, usize)> = present
            .iter()
            .map(|&(sym, c)| (c.max(count_limit) as u64, sym))
            .collect();
        leaves.sort_unstable();

        if let Some(depths) = try_build_depths(&leaves, max_depth) {
            for (slot, &(_, sym)) in leaves.iter().enumerate() {
                depth[sym] = depths[slot];
            }
            return;
        }
        count_limit <<= 1;
    }
}

/// One Huffman construction attempt via the two-queue merge. Returns the
/// per-leaf depths (indexed like `leaves`) or None if the tree exceeds
/// `max_depth`.
fn try_build_depths(leaves: &[(u64, usize)], max_depth: u8) -> Option<Vec<u8>> {
    struct Node {
        weight: u64,
        // Leaf index, or child node ids for internal nodes.
        kind: NodeKind,
    }
    enum NodeKind {
        Leaf(usize),
        Internal(usize, usize),
    }

    let n = leaves.len();
    debug_assert!(n >= 2);
    let mut nodes: Vec<Node> = leaves
        .iter()
        .enumerate()
        .map(|(i, &(w, _))| Node {
            weight: w,
            kind: NodeKind::Leaf(i),
        })
        .collect();

    let mut leaf_queue: std::collections::VecDeque<usize> = (0..n).collect();
    let mut merge_queue: std::collections::VecDeque<usize> = std::collections::VecDeque::new();

    // Leaves are pre-sorted, merged nodes appear in non-decreasing weight
    // order, so the two fronts always hold the global minima.
    let pop_min = |lq: &mut std::collections::VecDeque<usize>,
                   mq: &mut std::collections::VecDeque<usize>,
                   nodes: &[Node]| {
        match (lq.front(), mq.front()) {
            (Some(&l), Some(&m)) => {
                if nodes[l].weight <= nodes[m].weight {
                    lq.pop_front().unwrap()
                } else {
                    mq.pop_front().unwrap()
                }
            }
            (Some(_), None) => lq.pop_front().unwrap(),
            (None, Some(_)) => mq.pop_front().unwrap(),
            (None, None) => unreachable!(),
        }
    };

    for _ in 0..n - 1 {
        let a = pop_min(&mut leaf_queue, &mut merge_queue, &nodes);
        let b = pop_min(&mut leaf_queue, &mut merge_queue, &nodes);
        let merged = Node {
            weight: nodes[a].weight + nodes[b].weight,
            kind: NodeKind::Internal(a, b),
        };
        nodes.push(merged);
        merge_queue.push_back(nodes.len() - 1);
    }

    let root = nodes.len() - 1;
    let mut depths = vec![0u8; n];
    let mut stack = vec![(root, 0u8)];
    let mut deepest = 0u8;
    while let Some((id, d)) = stack.pop() {
        match nodes[id].kind {
            NodeKind::Leaf(slot) => {
                depths[slot] = d;
                deepest = deepest.max(d);
            }
            NodeKind::Internal(a, b) => {
                stack.push((a, d + 1));
                stack.push((b, d + 1));
            }
        }
    }
    if deepest > max_depth {
        None
    } else {
        Some(depths)
    }
}

/// Assign canonical codewords from depths, stored bit-reversed for
/// LSB-first emission.
fn convert_depths_to_codewords(depth: &[u8], alphabet_size: usize, bits: &mut [u16]) {
    const MAX_DEPTH: usize = 15;
    let mut count = [0u32; MAX_DEPTH + 1];
    for &d in &depth[..alphabet_size] {
        if d > 0 {
            count[d as usize] += 1;
        }
    }
    let mut next_code = [0u32; MAX_DEPTH + 1];
    let mut code = 0u32;
    for len in 1..=MAX_DEPTH {
        code = (code + count[len - 1]) << 1;
        next_code[len] = code;
    }
    for (sym, &d) in depth[..alphabet_size].iter().enumerate() {
        if d > 0 {
            bits[sym] = reverse_bits(next_code[d as usize], d) as u16;
            next_code[d as usize] += 1;
        }
    }
}

/// Reverse the low `len` bits of `code`.
pub fn reverse_bits(code: u32, len: u8) -> u32 {
    let mut result = 0;
    let mut code = code;
    for _ in 0..len {
        result = (result << 1) | (code & 1);
        code >>= 1;
    }
    result
}

/// Tokenize a depth array into code-length symbols plus extra-bit values.
///
/// Runs of a non-zero depth repeat via token 16 (3-6 copies, 2 extra
/// bits); zero runs use token 17 (3-10 zeros, 3 extra bits) or token 18
/// (11-138 zeros, 7 extra bits). Shorter runs are emitted literally.
pub fn write_huffman_tree(depth: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tokens = Vec::new();
    let mut extra = Vec::new();
    let mut i = 0;
    while i < depth.len() {
        let value = depth[i];
        let mut run = 1;
        while i + run < depth.len() && depth[i + run] == value {
            run += 1;
        }
        i += run;

        if value == 0 {
            let mut reps = run;
            while reps >= 11 {
                let chunk = reps.min(138);
                tokens.push(REPEAT_ZERO_LONG);
                extra.push((chunk - 11) as u8);
                reps -= chunk;
            }
            if reps >= 3 {
                tokens.push(REPEAT_ZERO_SHORT);
                extra.push((reps - 3) as u8);
            } else {
                for _ in 0..reps {
                    tokens.push(0);
                    extra.push(0);
                }
            }
        } else {
            tokens.push(value);
            extra.push(0);
            let mut reps = run - 1;
            while reps >= 3 {
                let chunk = reps.min(6);
                tokens.push(REPEAT_PREVIOUS);
                extra.push((chunk - 3) as u8);
                reps -= chunk;
            }
            for _ in 0..reps {
                tokens.push(value);
                extra.push(0);
            }
        }
    }
    (tokens, extra)
}

/// Bits needed by a code-length token's extra field.
#[inline]
pub fn token_extra_bits(token: u8) -> u32 {
    match token {
        REPEAT_PREVIOUS => 2,
        REPEAT_ZERO_SHORT => 3,
        REPEAT_ZERO_LONG => 7,
        _ => 0,
    }
}

/// Cost in bits of emitting a token population under `code`, including
/// the run tokens' extra bits.
fn huffman_tree_bit_cost(
    histogram: &Histogram<CODE_LENGTH_CODES>,
    code: &EntropyCode<CODE_LENGTH_CODES>,
) -> f64 {
    let mut cost = 0.0;
    for sym in 0..CODE_LENGTH_CODES {
        let n = histogram.counts[sym] as f64;
        cost += n * code.depth[sym] as f64;
        cost += n * token_extra_bits(sym as u8) as f64;
    }
    cost
}

/// Serialize the code-length code's own depths in the fixed storage
/// order, trimming trailing zeros down to a minimum of four entries.
fn store_code_length_code_depths(sink: &mut BitSink, depth: &[u8; CODE_LENGTH_CODES]) {
    let mut codes_to_store = CODE_LENGTH_CODES;
    while codes_to_store > 4 && depth[CODE_LENGTH_STORAGE_ORDER[codes_to_store - 1]] == 0 {
        codes_to_store -= 1;
    }
    sink.write_bits(4, (codes_to_store - 4) as u64);
    let skip_two_first =
        depth[CODE_LENGTH_STORAGE_ORDER[0]] == 0 && depth[CODE_LENGTH_STORAGE_ORDER[1]] == 0;
    sink.write_bits(1, skip_two_first as u64);
    for &sym in CODE_LENGTH_STORAGE_ORDER[(skip_two_first as usize * 2)..codes_to_store].iter() {
        let d = depth[sym] as usize;
        sink.write_bits(DEPTH_CODE_LEN[d], DEPTH_CODE_BITS[d]);
    }
}

fn log2_ceiling(value: usize) -> u32 {
    match value {
        0 | 1 => 0,
        _ => usize::BITS - (value - 1).leading_zeros(),
    }
}

/// Serialize a prefix code.
///
/// Empty and up-to-4-symbol codes use a compact listing; larger codes
/// emit the depth array as an entropy-coded code-length token sequence,
/// optionally with an explicit trimmed length when dropping trailing
/// zero-run tokens pays for the length field.
pub fn store_huffman_code<const N: usize>(
    sink: &mut BitSink,
    code: &EntropyCode<N>,
    alphabet_size: usize,
) {
    let mut max_bits = 0;
    let mut counter = alphabet_size - 1;
    while counter > 0 {
        counter >>= 1;
        max_bits += 1;
    }

    if code.count == 0 {
        // Small-tree marker, count-1 = 0, symbol 0 in max_bits bits.
        sink.write_bits(3 + max_bits, 0x01);
        return;
    }

    if code.count <= 4 {
        let mut symbols = code.symbols;
        // Quadratic stable sort by depth.
        for k in 0..code.count {
            for j in k + 1..code.count {
                if code.depth[symbols[j]] < code.depth[symbols[k]] {
                    symbols.swap(k, j);
                }
            }
        }
        sink.write_bits(1, 1);
        sink.write_bits(2, (code.count - 1) as u64);
        for &sym in symbols.iter().take(code.count) {
            sink.write_bits(max_bits, sym as u64);
        }
        if code.count == 4 {
            let balanced = symbols.iter().all(|&s| code.depth[s] == 2);
            sink.write_bits(1, (!balanced) as u64);
        }
        return;
    }

    sink.write_bits(1, 0);

    let (tokens, extra) = write_huffman_tree(&code.depth[..alphabet_size]);
    let mut token_histogram: Histogram<CODE_LENGTH_CODES> = Histogram::new();
    for &t in &tokens {
        token_histogram.add(t as usize);
    }
    let mut token_code = build_entropy_code(&token_histogram, 5, CODE_LENGTH_CODES);

    // Trailing zero-run tokens can be dropped if an explicit length field
    // costs less than emitting them.
    let mut trimmed_histogram = token_histogram.clone();
    let mut trimmed_size = tokens.len();
    while trimmed_size > 0 {
        let t = tokens[trimmed_size - 1];
        if t != 0 && t < REPEAT_ZERO_SHORT {
            break;
        }
        trimmed_histogram.remove(t as usize);
        trimmed_size -= 1;
    }

    let mut emit_count = tokens.len();
    let mut write_length = false;
    if trimmed_size > 1 && trimmed_size < tokens.len() {
        let trimmed_code = build_entropy_code(&trimmed_histogram, 5, CODE_LENGTH_CODES);
        let full_cost = huffman_tree_bit_cost(&token_histogram, &token_code);
        let trimmed_cost = huffman_tree_bit_cost(&trimmed_histogram, &trimmed_code);
        let nbits = log2_ceiling(trimmed_size - 1);
        let nbitpairs = if nbits == 0 { 1 } else { (nbits + 1) / 2 };
        if trimmed_cost + ((3 + 2 * nbitpairs) as f64) < full_cost {
            write_length = true;
            emit_count = trimmed_size;
            token_code = trimmed_code;
        }
    }

    store_code_length_code_depths(sink, &token_code.depth);
    sink.write_bits(1, write_length as u64);
    if write_length {
        let nbits = log2_ceiling(emit_count - 1);
        let nbitpairs = if nbits == 0 { 1 } else { (nbits + 1) / 2 };
        sink.write_bits(3, (nbitpairs - 1) as u64);
        sink.write_bits(2 * nbitpairs, (emit_count - 2) as u64);
    }
    for (&token, &extra_val) in tokens.iter().zip(extra.iter()).take(emit_count) {
        entropy_encode(sink, token as usize, &token_code);
        let nbits = token_extra_bits(token);
        if nbits > 0 {
            sink.write_bits(nbits, extra_val as u64);
        }
    }
}
