//! Decoder for the compressed bit stream.
//!
//! Each meta-block is fully self-describing, so decoding is a single
//! forward pass: parse the framing and prefix codes, then execute
//! commands against the output produced so far. The 4-entry distance
//! ring persists across meta-blocks, exactly as on the encoder side.

use cinder_core::{Error, Result};

use crate::bits::BitReader;
use crate::compress::{INITIAL_DISTANCE_RING, SHORT_CODE_INDEX_OFFSET, SHORT_CODE_VALUE_OFFSET};
use crate::context::{distance_context, literal_context, LiteralContextMode};
use crate::huffman::{reverse_bits, CODE_LENGTH_STORAGE_ORDER};
use crate::prefix::{
    copy_length_extra_bits, copy_length_offset, distance_prefix_extra_bits,
    insert_length_extra_bits, insert_length_offset, num_distance_prefixes,
    prefix_decode_copy_distance, BLOCK_LEN_BASE, BLOCK_LEN_EXTRA, NUM_BLOCK_LEN_PREFIXES,
    NUM_COMMAND_PREFIXES, NUM_DISTANCE_SHORT_CODES,
};

/// Decompress a complete stream.
pub fn decompress_stream(input: &[u8]) -> Result<Vec<u8>> {
    // Fixed two-byte encoding of the empty stream.
    if input == [0x01, 0x00] {
        return Ok(Vec::new());
    }
    if input.is_empty() {
        return Err(Error::unexpected_eof(0));
    }

    let mut reader = BitReader::new(input);
    if reader.read_bits(3)? != 0 {
        return Err(Error::corrupted("embedded input size is not supported"));
    }
    let window_bits = if reader.read_bit()? == 0 {
        16
    } else {
        17 + reader.read_bits(3)?
    };
    debug_assert!((16..=24).contains(&window_bits));

    let mut out = Vec::new();
    let mut dist_ring = INITIAL_DISTANCE_RING;
    let mut dist_ring_idx = 0usize;
    loop {
        if reader.read_bit()? == 1 {
            break;
        }
        let nibbles = reader.read_bits(3)?;
        let mut length_minus_one = 0u64;
        for i in 0..nibbles {
            length_minus_one |= reader.read_bits(4)? << (4 * i);
        }
        let length = length_minus_one as usize + 1;
        decode_meta_block(&mut reader, length, &mut out, &mut dist_ring, &mut dist_ring_idx)?;
    }
    Ok(out)
}

// =============================================================================
// Prefix-code deserialization
// =============================================================================

/// Table-driven canonical prefix decoder.
///
/// The table is indexed by the next `table_bits` stream bits; entries
/// pack `(symbol << 5) | code_length`. A single-symbol code consumes no
/// bits at all.
struct PrefixDecoder {
    table: Vec<u32>,
    table_bits: u32,
    single: Option<usize>,
}

impl PrefixDecoder {
    fn from_depths(depths: &[u8]) -> Result<Self> {
        const MAX_DEPTH: usize = 15;
        let mut counts = [0u32; MAX_DEPTH + 1];
        let mut max_bits = 0u8;
        let mut last_symbol = 0usize;
        let mut num_symbols = 0usize;
        for (sym, &len) in depths.iter().enumerate() {
            if len > 0 {
                counts[len as usize] += 1;
                max_bits = max_bits.max(len);
                last_symbol = sym;
                num_symbols += 1;
            }
        }
        if num_symbols == 0 {
            return Err(Error::corrupted("prefix code with no symbols"));
        }
        if num_symbols == 1 {
            return Ok(Self {
                table: Vec::new(),
                table_bits: 0,
                single: Some(last_symbol),
            });
        }

        let mut next_code = [0u32; MAX_DEPTH + 1];
        let mut code = 0u32;
        for bits in 1..=max_bits as usize {
            code = (code + counts[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let table_bits = max_bits as u32;
        let table_size = 1usize << table_bits;
        let mut table = vec![0u32; table_size];
        for (sym, &len) in depths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            let reversed = reverse_bits(code, len);
            let entry = ((sym as u32) << 5) | len as u32;
            let fill_count = 1usize << (table_bits - len as u32);
            for i in 0..fill_count {
                table[(reversed as usize) | (i << len)] = entry;
            }
        }
        Ok(Self {
            table,
            table_bits,
            single: None,
        })
    }

    #[inline]
    fn decode(&self, reader: &mut BitReader) -> Result<usize> {
        if let Some(symbol) = self.single {
            return Ok(symbol);
        }
        let peek = reader.peek_bits(self.table_bits);
        let entry = self.table[peek as usize];
        let len = entry & 0x1f;
        if len == 0 {
            return Err(Error::corrupted("invalid prefix code"));
        }
        reader.consume(len);
        Ok((entry >> 5) as usize)
    }
}

/// Read one depth of the code-length code, transmitted with a fixed
/// prefix code over depths 0-5.
fn read_code_length_depth(reader: &mut BitReader) -> Result<u8> {
    Ok(if reader.read_bit()? == 0 {
        if reader.read_bit()? == 0 {
            0
        } else {
            4
        }
    } else if reader.read_bit()? == 0 {
        3
    } else if reader.read_bit()? == 0 {
        2
    } else if reader.read_bit()? == 0 {
        1
    } else {
        5
    })
}

/// Parse a serialized prefix code over `alphabet_size` symbols.
fn read_prefix_code(reader: &mut BitReader, alphabet_size: usize) -> Result<PrefixDecoder> {
    let mut max_bits = 0u32;
    let mut counter = alphabet_size - 1;
    while counter > 0 {
        counter >>= 1;
        max_bits += 1;
    }

    if reader.read_bit()? == 1 {
        // Simple form: 1-4 symbols listed in ascending depth order.
        let count = reader.read_bits(2)? as usize + 1;
        let mut symbols = [0usize; 4];
        for slot in symbols.iter_mut().take(count) {
            let sym = reader.read_bits(max_bits)? as usize;
            if sym >= alphabet_size {
                return Err(Error::corrupted("prefix code symbol out of range"));
            }
            *slot = sym;
        }
        let mut depths = vec![0u8; alphabet_size];
        match count {
            1 => {
                return Ok(PrefixDecoder {
                    table: Vec::new(),
                    table_bits: 0,
                    single: Some(symbols[0]),
                })
            }
            2 => {
                depths[symbols[0]] = 1;
                depths[symbols[1]] = 1;
            }
            3 => {
                depths[symbols[0]] = 1;
                depths[symbols[1]] = 2;
                depths[symbols[2]] = 2;
            }
            _ => {
                if reader.read_bit()? == 0 {
                    for &sym in &symbols {
                        depths[sym] = 2;
                    }
                } else {
                    depths[symbols[0]] = 1;
                    depths[symbols[1]] = 2;
                    depths[symbols[2]] = 3;
                    depths[symbols[3]] = 3;
                }
            }
        }
        return PrefixDecoder::from_depths(&depths);
    }

    // Complex form: the depth array arrives as code-length tokens under
    // a secondary code, optionally with an explicit token count.
    let codes_to_store = reader.read_bits(4)? as usize + 4;
    let skip_two_first = reader.read_bit()? == 1;
    let mut code_length_depths = [0u8; 19];
    for &sym in CODE_LENGTH_STORAGE_ORDER[(skip_two_first as usize * 2)..codes_to_store].iter() {
        code_length_depths[sym] = read_code_length_depth(reader)?;
    }
    let token_decoder = PrefixDecoder::from_depths(&code_length_depths)?;

    let write_length = reader.read_bit()? == 1;
    let token_limit = if write_length {
        let nbitpairs = reader.read_bits(3)? as u32 + 1;
        reader.read_bits(2 * nbitpairs)? as usize + 2
    } else {
        usize::MAX
    };

    let mut depths = vec![0u8; alphabet_size];
    let mut covered = 0usize;
    let mut previous = 8u8;
    let mut tokens_read = 0usize;
    while covered < alphabet_size && tokens_read < token_limit {
        let token = token_decoder.decode(reader)? as u8;
        tokens_read += 1;
        let (value, reps) = match token {
            0..=15 => (token, 1),
            16 => (previous, 3 + reader.read_bits(2)? as usize),
            17 => (0, 3 + reader.read_bits(3)? as usize),
            _ => (0, 11 + reader.read_bits(7)? as usize),
        };
        if covered + reps > alphabet_size {
            return Err(Error::corrupted("code length sequence overflows alphabet"));
        }
        for _ in 0..reps {
            depths[covered] = value;
            covered += 1;
        }
        if value != 0 {
            previous = value;
        }
    }
    PrefixDecoder::from_depths(&depths)
}

// =============================================================================
// Context maps and block splits
// =============================================================================

/// Parse a context map: cluster count, run-length-coded symbols, then an
/// optional inverse move-to-front pass.
fn read_context_map(reader: &mut BitReader, map_len: usize) -> Result<(Vec<u8>, usize)> {
    let num_clusters = reader.read_bits(8)? as usize + 1;
    if num_clusters == 1 {
        return Ok((vec![0; map_len], 1));
    }

    let use_rle = reader.read_bit()? == 1;
    let max_run_length_prefix = if use_rle {
        reader.read_bits(4)? as u32 + 1
    } else {
        0
    };
    let decoder = read_prefix_code(reader, num_clusters + max_run_length_prefix as usize)?;

    let mut map = Vec::with_capacity(map_len);
    while map.len() < map_len {
        let symbol = decoder.decode(reader)? as u32;
        if symbol == 0 {
            map.push(0u8);
        } else if symbol <= max_run_length_prefix {
            let reps = (1u64 << symbol) + reader.read_bits(symbol)?;
            if map.len() + reps as usize > map_len {
                return Err(Error::corrupted("context map zero run overflows map"));
            }
            for _ in 0..reps {
                map.push(0u8);
            }
        } else {
            map.push((symbol - max_run_length_prefix) as u8);
        }
    }

    if reader.read_bit()? == 1 {
        inverse_move_to_front(&mut map);
    }
    for &id in &map {
        if id as usize >= num_clusters {
            return Err(Error::corrupted("context map entry out of range"));
        }
    }
    Ok((map, num_clusters))
}

fn inverse_move_to_front(values: &mut [u8]) {
    let mut mtf: Vec<u8> = (0..=255).collect();
    for v in values.iter_mut() {
        let index = *v as usize;
        let value = mtf[index];
        mtf.remove(index);
        mtf.insert(0, value);
        *v = value;
    }
}

/// Decoder-side block-split cursor: tracks the current run's type and
/// remaining length, decoding the next run's type code and length on
/// demand with the same 2-entry type ring the encoder used.
struct BlockSplitState {
    num_types: usize,
    type_decoder: Option<PrefixDecoder>,
    length_decoder: Option<PrefixDecoder>,
    block_type: usize,
    remaining: u64,
    ring: [usize; 2],
    index: usize,
}

fn read_block_length(reader: &mut BitReader, decoder: &PrefixDecoder) -> Result<u64> {
    let code = decoder.decode(reader)?;
    if code >= NUM_BLOCK_LEN_PREFIXES {
        return Err(Error::corrupted("block length code out of range"));
    }
    Ok(BLOCK_LEN_BASE[code] as u64 + reader.read_bits(BLOCK_LEN_EXTRA[code])?)
}

fn read_block_split(reader: &mut BitReader) -> Result<BlockSplitState> {
    if reader.read_bit()? == 0 {
        return Ok(BlockSplitState {
            num_types: 1,
            type_decoder: None,
            length_decoder: None,
            block_type: 0,
            remaining: u64::MAX,
            ring: [0, 1],
            index: 0,
        });
    }
    let num_types = reader.read_bits(8)? as usize + 1;
    let type_decoder = read_prefix_code(reader, num_types + 2)?;
    let length_decoder = read_prefix_code(reader, NUM_BLOCK_LEN_PREFIXES)?;
    let remaining = read_block_length(reader, &length_decoder)?;
    // The first run is always type 0; fold it into the type ring just as
    // the encoder's short-code pass did.
    Ok(BlockSplitState {
        num_types,
        type_decoder: Some(type_decoder),
        length_decoder: Some(length_decoder),
        block_type: 0,
        remaining,
        ring: [0, 1],
        index: 1,
    })
}

impl BlockSplitState {
    /// Consume one stream symbol's worth of the split, decoding a new run
    /// header when the current run is exhausted. Returns the block type.
    fn advance(&mut self, reader: &mut BitReader) -> Result<usize> {
        if self.remaining == 0 {
            let code = self
                .type_decoder
                .as_ref()
                .expect("multi-type split has a type decoder")
                .decode(reader)?;
            let block_type = match code {
                0 => self.ring[self.index & 1],
                1 => self.ring[self.index.wrapping_sub(1) & 1] + 1,
                c => c - 2,
            };
            if block_type >= self.num_types {
                return Err(Error::corrupted("block type out of range"));
            }
            self.ring[self.index & 1] = block_type;
            self.index += 1;
            self.block_type = block_type;
            self.remaining =
                read_block_length(reader, self.length_decoder.as_ref().unwrap())?;
        }
        self.remaining -= 1;
        Ok(self.block_type)
    }
}

// =============================================================================
// Meta-block body
// =============================================================================

fn decode_meta_block(
    reader: &mut BitReader,
    length: usize,
    out: &mut Vec<u8>,
    dist_ring: &mut [usize; 4],
    dist_ring_idx: &mut usize,
) -> Result<()> {
    let mut literal_split = read_block_split(reader)?;
    let mut command_split = read_block_split(reader)?;
    let mut distance_split = read_block_split(reader)?;

    let postfix_bits = reader.read_bits(2)? as u32;
    let num_direct = (reader.read_bits(4)? as usize) << postfix_bits;
    let mut context_modes = Vec::with_capacity(literal_split.num_types);
    for _ in 0..literal_split.num_types {
        context_modes.push(LiteralContextMode::from_bits(reader.read_bits(2)?));
    }

    let (literal_map, num_literal_clusters) =
        read_context_map(reader, literal_split.num_types << 6)?;
    let (distance_map, num_distance_clusters) =
        read_context_map(reader, distance_split.num_types << 2)?;

    let num_distance_codes = num_distance_prefixes(num_direct, postfix_bits);
    let mut literal_decoders = Vec::with_capacity(num_literal_clusters);
    for _ in 0..num_literal_clusters {
        literal_decoders.push(read_prefix_code(reader, 256)?);
    }
    let mut command_decoders = Vec::with_capacity(command_split.num_types);
    for _ in 0..command_split.num_types {
        command_decoders.push(read_prefix_code(reader, NUM_COMMAND_PREFIXES)?);
    }
    let mut distance_decoders = Vec::with_capacity(num_distance_clusters);
    for _ in 0..num_distance_clusters {
        distance_decoders.push(read_prefix_code(reader, num_distance_codes)?);
    }

    let end = out.len() + length;
    while out.len() < end {
        let command_type = command_split.advance(reader)?;
        let command_code = command_decoders[command_type].decode(reader)?;
        let implicit_distance = command_code < 128;
        let base_code = if implicit_distance {
            command_code as u16
        } else {
            (command_code - 128) as u16
        };

        let insert_length = insert_length_offset(base_code) as u64
            + reader.read_bits(insert_length_extra_bits(base_code))?;
        let copy_length = copy_length_offset(base_code) as u64
            + reader.read_bits(copy_length_extra_bits(base_code))?;

        if out.len() + insert_length as usize > end {
            return Err(Error::corrupted("insert run overflows meta-block"));
        }
        for _ in 0..insert_length {
            let literal_type = literal_split.advance(reader)?;
            let prev1 = if out.is_empty() { 0 } else { out[out.len() - 1] };
            let prev2 = if out.len() < 2 { 0 } else { out[out.len() - 2] };
            let context = (literal_type << 6)
                + literal_context(prev1, prev2, context_modes[literal_type]);
            let cluster = literal_map[context] as usize;
            let byte = literal_decoders[cluster].decode(reader)? as u8;
            out.push(byte);
        }
        if out.len() >= end {
            break;
        }

        let distance = if implicit_distance {
            dist_ring[(*dist_ring_idx + 3) & 3]
        } else {
            let distance_type = distance_split.advance(reader)?;
            let context = (distance_type << 2) + distance_context(copy_length as usize);
            let cluster = distance_map[context] as usize;
            let prefix = distance_decoders[cluster].decode(reader)?;
            if prefix < NUM_DISTANCE_SHORT_CODES {
                let resolved = dist_ring[(*dist_ring_idx + SHORT_CODE_INDEX_OFFSET[prefix]) & 3]
                    as i64
                    + SHORT_CODE_VALUE_OFFSET[prefix] as i64;
                if resolved <= 0 {
                    return Err(Error::corrupted("short distance code resolves to zero"));
                }
                let resolved = resolved as usize;
                if prefix != 0 {
                    dist_ring[*dist_ring_idx & 3] = resolved;
                    *dist_ring_idx += 1;
                }
                resolved
            } else {
                let extra_bits = distance_prefix_extra_bits(prefix, num_direct, postfix_bits);
                let extra = reader.read_bits(extra_bits)?;
                let resolved =
                    prefix_decode_copy_distance(prefix, extra, num_direct, postfix_bits);
                dist_ring[*dist_ring_idx & 3] = resolved;
                *dist_ring_idx += 1;
                resolved
            }
        };

        if distance == 0 || distance > out.len() {
            return Err(Error::corrupted_at("distance reaches before stream start", out.len()));
        }
        if out.len() + copy_length as usize > end {
            return Err(Error::corrupted("copy overflows meta-block"));
        }
        for _ in 0..copy_length {
            let byte = out[out.len() - distance];
            out.push(byte);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitSink;
    use crate::histogram::Histogram;
    use crate::huffman::{build_entropy_code, entropy_encode, store_huffman_code};

    #[test]
    fn test_inverse_mtf() {
        // Forward MTF of [1, 1, 0, 2, 2, 1] is [1, 0, 1, 2, 0, 2].
        let mut values = vec![1u8, 0, 1, 2, 0, 2];
        inverse_move_to_front(&mut values);
        assert_eq!(values, vec![1, 1, 0, 2, 2, 1]);
    }

    #[test]
    fn test_prefix_code_roundtrip_simple() {
        for num_symbols in 1..=4usize {
            let mut histogram: Histogram<64> = Histogram::new();
            for s in 0..num_symbols {
                for _ in 0..(s + 1) * 7 {
                    histogram.add(s * 5 + 1);
                }
            }
            let code = build_entropy_code(&histogram, 15, 64);
            let mut sink = BitSink::new();
            store_huffman_code(&mut sink, &code, 64);
            // Encode each present symbol once after the table.
            for s in 0..num_symbols {
                entropy_encode(&mut sink, s * 5 + 1, &code);
            }
            let bytes = sink.into_bytes();
            let mut reader = BitReader::new(&bytes);
            let decoder = read_prefix_code(&mut reader, 64).unwrap();
            for s in 0..num_symbols {
                assert_eq!(decoder.decode(&mut reader).unwrap(), s * 5 + 1);
            }
        }
    }

    #[test]
    fn test_prefix_code_roundtrip_complex() {
        let mut histogram: Histogram<256> = Histogram::new();
        let symbols: Vec<usize> = (0..200).map(|i| (i * i) % 97 + 10).collect();
        for &s in &symbols {
            histogram.add(s);
        }
        let code = build_entropy_code(&histogram, 15, 256);
        assert!(code.count > 4, "test needs the complex path");

        let mut sink = BitSink::new();
        store_huffman_code(&mut sink, &code, 256);
        for &s in &symbols {
            entropy_encode(&mut sink, s, &code);
        }
        let bytes = sink.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let decoder = read_prefix_code(&mut reader, 256).unwrap();
        for &s in &symbols {
            assert_eq!(decoder.decode(&mut reader).unwrap(), s);
        }
    }

    #[test]
    fn test_prefix_code_roundtrip_empty() {
        let code = build_entropy_code(&Histogram::<64>::new(), 15, 64);
        let mut sink = BitSink::new();
        store_huffman_code(&mut sink, &code, 64);
        let bytes = sink.into_bytes();
        let mut reader = BitReader::new(&bytes);
        let decoder = read_prefix_code(&mut reader, 64).unwrap();
        // The empty code parses as a single-symbol code for symbol 0.
        assert_eq!(decoder.decode(&mut reader).unwrap(), 0);
    }

    #[test]
    fn test_context_map_roundtrip() {
        for map in [
            vec![0u32; 64],
            (0..64).map(|i| (i / 9) as u32).collect::<Vec<_>>(),
            {
                let mut m = vec![0u32; 256];
                m[100] = 1;
                m[101] = 2;
                m[200] = 1;
                m
            },
        ] {
            let num_clusters = (*map.iter().max().unwrap() + 1) as usize;
            let mut sink = BitSink::new();
            crate::compress::encode_context_map(&mut sink, &map, num_clusters);
            let bytes = sink.into_bytes();
            let mut reader = BitReader::new(&bytes);
            let (decoded, clusters) = read_context_map(&mut reader, map.len()).unwrap();
            assert_eq!(clusters, num_clusters);
            let decoded: Vec<u32> = decoded.iter().map(|&v| v as u32).collect();
            assert_eq!(decoded, map);
        }
    }

    #[test]
    fn test_rejects_embedded_size() {
        // Stream claiming embedded size bytes in the header.
        let mut sink = BitSink::new();
        sink.write_bits(3, 1);
        sink.write_bits(8, 42);
        let bytes = sink.into_bytes();
        assert!(decompress_stream(&bytes).is_err());
    }

    #[test]
    fn test_empty_stream_special_case() {
        assert_eq!(decompress_stream(&[0x01, 0x00]).unwrap(), Vec::<u8>::new());
        assert!(decompress_stream(&[]).is_err());
    }
}
