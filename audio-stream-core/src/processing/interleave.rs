//! Conversion between interleaved and per-channel byte layouts.
//!
//! A "sample" here is `sample_size` opaque bytes; no decoding happens.

/// Interleave `frames` samples from each channel region into `out`.
pub fn interleave(channels: &[&[u8]], sample_size: usize, frames: usize, out: &mut [u8]) {
    let count = channels.len();
    for (c, channel) in channels.iter().enumerate() {
        for f in 0..frames {
            let src = f * sample_size;
            let dst = (f * count + c) * sample_size;
            out[dst..dst + sample_size].copy_from_slice(&channel[src..src + sample_size]);
        }
    }
}

/// Split `frames` interleaved frames of `input` into per-channel regions.
pub fn deinterleave(input: &[u8], sample_size: usize, frames: usize, channels: &mut [&mut [u8]]) {
    let count = channels.len();
    for (c, channel) in channels.iter_mut().enumerate() {
        for f in 0..frames {
            let src = (f * count + c) * sample_size;
            let dst = f * sample_size;
            channel[dst..dst + sample_size].copy_from_slice(&input[src..src + sample_size]);
        }
    }
}

/// Copy interleaved frames of `src` (`src_channels` wide) into channels
/// `offset..offset + src_channels` of the interleaved region `dst`.
pub fn weave_into(
    src: &[u8],
    src_channels: usize,
    dst: &mut [u8],
    dst_channels: usize,
    offset: usize,
    sample_size: usize,
    frames: usize,
) {
    let width = src_channels * sample_size;
    for f in 0..frames {
        let from = f * width;
        let to = interleaved_offset(f, offset, dst_channels, sample_size);
        dst[to..to + width].copy_from_slice(&src[from..from + width]);
    }
}

/// Inverse of [`weave_into`]: copy channels `offset..offset + dst_channels`
/// of the interleaved region `src` into `dst`.
pub fn unweave_from(
    src: &[u8],
    src_channels: usize,
    offset: usize,
    dst: &mut [u8],
    dst_channels: usize,
    sample_size: usize,
    frames: usize,
) {
    let width = dst_channels * sample_size;
    for f in 0..frames {
        let from = interleaved_offset(f, offset, src_channels, sample_size);
        let to = f * width;
        dst[to..to + width].copy_from_slice(&src[from..from + width]);
    }
}

/// Byte offset of (`frame`, `channel`) inside an interleaved region.
pub const fn interleaved_offset(frame: usize, channel: usize, channels: usize, sample_size: usize) -> usize {
    (frame * channels + channel) * sample_size
}
