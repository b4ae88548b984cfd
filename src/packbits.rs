//! The run-length scheme used by ICNS for 24-bit RGB and ARGB payloads.
//!
//! A compressed stream is a sequence of tokens, each starting with a flag
//! byte `f`.  If `f < 0x80`, the next `f + 1` bytes are copied verbatim.
//! Otherwise, the single byte that follows is repeated `f - 125` times (so
//! one token encodes between 3 and 130 copies).

use crate::error::{IcnsError, Result};

/// Longest literal run a single token can carry.
const MAX_LITERAL_RUN: usize = 128;

/// Fewest copies a repeat token may encode.
const MIN_REPEAT_RUN: usize = 3;

/// Most copies a repeat token may encode.
const MAX_REPEAT_RUN: usize = 130;

/// Offset between a repeat count and its flag byte.
const REPEAT_FLAG_OFFSET: usize = 125;

/// Compresses `data`.
///
/// # Examples
/// ```
/// let packed = icnsutil::packbits::pack(&[0x13; 131]);
/// assert_eq!(packed, vec![0xFF, 0x13, 0x00, 0x13]);
/// ```
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / MAX_LITERAL_RUN + 1);
    let mut literal: Vec<u8> = Vec::with_capacity(MAX_LITERAL_RUN);
    let mut position = 0;
    while position < data.len() {
        let value = data[position];
        let starts_run = position + 2 < data.len()
            && data[position + 1] == value
            && data[position + 2] == value;
        if !starts_run {
            push_literal(&mut output, &mut literal, value);
            position += 1;
            continue;
        }
        let mut count = MIN_REPEAT_RUN;
        while position + count < data.len() && data[position + count] == value {
            count += 1;
        }
        position += count;
        flush_literal(&mut output, &mut literal);
        while count > MAX_REPEAT_RUN {
            output.push((MAX_REPEAT_RUN + REPEAT_FLAG_OFFSET) as u8);
            output.push(value);
            count -= MAX_REPEAT_RUN;
        }
        if count >= MIN_REPEAT_RUN {
            output.push((count + REPEAT_FLAG_OFFSET) as u8);
            output.push(value);
        } else {
            // A repeat token costs two bytes; one or two leftovers go literal.
            for _ in 0..count {
                push_literal(&mut output, &mut literal, value);
            }
        }
    }
    flush_literal(&mut output, &mut literal);
    output
}

fn push_literal(output: &mut Vec<u8>, literal: &mut Vec<u8>, value: u8) {
    literal.push(value);
    if literal.len() == MAX_LITERAL_RUN {
        flush_literal(output, literal);
    }
}

fn flush_literal(output: &mut Vec<u8>, literal: &mut Vec<u8>) {
    if !literal.is_empty() {
        output.push((literal.len() - 1) as u8);
        output.extend_from_slice(literal);
        literal.clear();
    }
}

/// Decompresses `data`.  Returns an error if the stream ends in the middle of
/// a token.
pub fn unpack(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(get_size(data));
    let mut iter = data.iter();
    while let Some(&flag) = iter.next() {
        if flag < 0x80 {
            let length = flag as usize + 1;
            let literal = iter.as_slice();
            if literal.len() < length {
                return Err(rle_error(length, literal.len()));
            }
            output.extend_from_slice(&literal[..length]);
            iter = literal[length..].iter();
        } else {
            let value = *iter.next().ok_or_else(|| rle_error(1, 0))?;
            let count = flag as usize - REPEAT_FLAG_OFFSET;
            output.resize(output.len() + count, value);
        }
    }
    Ok(output)
}

fn rle_error(needed: usize, available: usize) -> IcnsError {
    IcnsError::Corrupt(format!(
        "truncated RLE stream (token needs {} more byte(s), {} left)",
        needed, available
    ))
}

/// Returns the decompressed length of `data` by walking its tokens, without
/// materializing the output.  A truncated final token still counts in full.
pub fn get_size(data: &[u8]) -> usize {
    let mut count = 0;
    let mut position = 0;
    while position < data.len() {
        let flag = data[position] as usize;
        if flag < 0x80 {
            count += flag + 1;
            position += flag + 2;
        } else {
            count += flag - REPEAT_FLAG_OFFSET;
            position += 2;
        }
    }
    count
}

/// Packs 8-bit samples into a most-significant-bit-first stream, keeping
/// only the top `bits` of every sample.  A trailing partial byte is padded
/// with zero bits.
pub fn msb_stream(data: &[u8], bits: u32) -> Result<Vec<u8>> {
    if !matches!(bits, 1 | 2 | 4) {
        return Err(IcnsError::InvalidArgument(format!(
            "unsupported bit size: {}",
            bits
        )));
    }
    let mut output = Vec::with_capacity((data.len() * bits as usize + 7) / 8);
    let mut filled = 0;
    let mut byte: u8 = 0;
    for &sample in data {
        byte = (byte << bits) | (sample >> (8 - bits));
        filled += bits;
        if filled == 8 {
            output.push(byte);
            filled = 0;
            byte = 0;
        }
    }
    if filled > 0 {
        output.push(byte << (8 - filled));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_long_zero_run() {
        assert_eq!(
            pack(&[0u8; 514]),
            vec![0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xF9, 0x00]
        );
    }

    #[test]
    fn pack_short_remainder_stays_literal() {
        assert_eq!(pack(&[0x13; 131]), vec![0xFF, 0x13, 0x00, 0x13]);
        assert_eq!(pack(&[0x13; 132]), vec![0xFF, 0x13, 0x01, 0x13, 0x13]);
    }

    #[test]
    fn pack_literals_around_run() {
        let mut data = vec![1, 2];
        data.extend_from_slice(&[3; 134]);
        data.extend_from_slice(&[4, 5]);
        assert_eq!(
            pack(&data),
            vec![0x01, 1, 2, 0xFF, 3, 0x81, 3, 0x01, 4, 5]
        );
    }

    #[test]
    fn pack_alternating_bytes() {
        let data = [1u8, 2, 1, 2, 1, 2, 1, 2, 1, 2];
        let mut expected = vec![9u8];
        expected.extend_from_slice(&data);
        assert_eq!(pack(&data), expected);
    }

    #[test]
    fn pack_two_runs() {
        let mut data = vec![0u8; 223];
        data.extend_from_slice(&[1; 153]);
        assert_eq!(
            pack(&data),
            vec![0xFF, 0x00, 0xDA, 0x00, 0xFF, 0x01, 0x94, 0x01]
        );
    }

    #[test]
    fn pack_splits_long_literals() {
        let data: Vec<u8> = (0..200u32).map(|x| x as u8).collect();
        let packed = pack(&data);
        assert_eq!(packed[0], 127);
        assert_eq!(packed[129], 71);
        assert_eq!(packed.len(), 202);
    }

    #[test]
    fn pack_empty() {
        assert!(pack(&[]).is_empty());
        assert!(unpack(&[]).unwrap().is_empty());
        assert_eq!(get_size(&[]), 0);
    }

    #[test]
    fn unpack_tokens() {
        assert_eq!(
            unpack(&[0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xF9, 0x00]).unwrap(),
            vec![0u8; 514]
        );
        assert_eq!(unpack(&[0xFF, 0x13, 0x00, 0x13]).unwrap(), vec![0x13; 131]);
        assert_eq!(
            unpack(&[0x01, 0x01, 0x02, 0x80, 0x07]).unwrap(),
            vec![1, 2, 7, 7, 7]
        );
    }

    #[test]
    fn unpack_truncated_stream() {
        assert!(matches!(unpack(&[0x03, 1, 2]), Err(IcnsError::Corrupt(_))));
        assert!(matches!(unpack(&[0x85]), Err(IcnsError::Corrupt(_))));
    }

    #[test]
    fn get_size_matches_unpack() {
        let streams: [&[u8]; 3] = [
            &[0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xF9, 0x00],
            &[0x01, 0x01, 0x02, 0xFF, 0x03, 0x81, 0x03, 0x01, 0x04, 0x05],
            &[0xFF, 0x00, 0xDA, 0x00, 0xFF, 0x01, 0x94, 0x01],
        ];
        for stream in &streams {
            assert_eq!(get_size(stream), unpack(stream).unwrap().len());
        }
    }

    #[test]
    fn msb_stream_one_bit() {
        let samples = [255u8, 0, 255, 0, 0, 0, 0, 255, 128, 127];
        assert_eq!(msb_stream(&samples, 1).unwrap(), vec![0b1010_0001, 0b1000_0000]);
    }

    #[test]
    fn msb_stream_four_bits() {
        assert_eq!(msb_stream(&[0xAB, 0xCD, 0xEF], 4).unwrap(), vec![0xAC, 0xE0]);
    }

    #[test]
    fn msb_stream_rejects_eight_bits() {
        assert!(matches!(
            msb_stream(&[1, 2, 3], 8),
            Err(IcnsError::InvalidArgument(_))
        ));
    }
}
