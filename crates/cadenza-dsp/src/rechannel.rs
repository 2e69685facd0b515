use crate::layout::ChannelLayout;

/// 0.7071 in Q15, used to fold centre and rear channels into the fronts.
pub const MIX_COEFF_Q15: i32 = 23_170;

#[inline]
pub fn clip16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[inline]
fn scaled(sample: i16) -> i32 {
    (sample as i32 * MIX_COEFF_Q15) >> 15
}

/// Convert interleaved frames from one layout to another.
///
/// Converts as many whole frames as both buffers can hold and returns that
/// frame count. Callers compare it with the frames they expected.
pub fn rechannel(
    from: ChannelLayout,
    to: ChannelLayout,
    input: &[i16],
    output: &mut [i16],
) -> usize {
    let frames = (input.len() / from.channels()).min(output.len() / to.channels());
    if from == to {
        let samples = frames * from.channels();
        output[..samples].copy_from_slice(&input[..samples]);
        return frames;
    }

    let src = input.chunks_exact(from.channels());
    let dst = output.chunks_exact_mut(to.channels());
    for (frame_in, frame_out) in src.zip(dst).take(frames) {
        let (left, right) = fold_to_stereo(from, frame_in);
        expand_from_stereo(to, left, right, frame_out);
    }
    frames
}

fn fold_to_stereo(layout: ChannelLayout, frame: &[i16]) -> (i16, i16) {
    match layout {
        ChannelLayout::Mono => (frame[0], frame[0]),
        // LFE is dropped, the fronts are taken as-is.
        ChannelLayout::Stereo | ChannelLayout::TwoPointOne => (frame[0], frame[1]),
        ChannelLayout::Quad => {
            let left = (frame[0] as i32 + frame[2] as i32) >> 1;
            let right = (frame[1] as i32 + frame[3] as i32) >> 1;
            (left as i16, right as i16)
        }
        ChannelLayout::Surround | ChannelLayout::FivePointZero | ChannelLayout::FivePointOne => {
            let center = layout.center().map_or(0, |idx| scaled(frame[idx]));
            let (rear_left, rear_right) = layout
                .rears()
                .map_or((0, 0), |(l, r)| (scaled(frame[l]), scaled(frame[r])));
            (
                clip16(frame[0] as i32 + center + rear_left),
                clip16(frame[1] as i32 + center + rear_right),
            )
        }
    }
}

fn expand_from_stereo(layout: ChannelLayout, left: i16, right: i16, frame: &mut [i16]) {
    match layout {
        ChannelLayout::Mono => frame[0] = ((left as i32 + right as i32) >> 1) as i16,
        ChannelLayout::Stereo => {
            frame[0] = left;
            frame[1] = right;
        }
        _ => {
            frame.fill(0);
            frame[0] = left;
            frame[1] = right;
            if let Some(center) = layout.center() {
                frame[center] = ((left as i32 + right as i32) >> 1) as i16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_layout_is_identity() {
        for layout in ChannelLayout::ALL {
            let input: Vec<i16> = (0..layout.channels() * 16)
                .map(|i| (i as i16).wrapping_mul(977))
                .collect();
            let mut output = vec![0i16; input.len()];
            let frames = rechannel(layout, layout, &input, &mut output);
            assert_eq!(frames, 16);
            assert_eq!(input, output, "{layout:?}");
        }
    }

    #[test]
    fn mono_stereo_mono_is_lossless_for_constant_signal() {
        for value in [i16::MIN, -12_345, -1, 0, 1, 4_096, i16::MAX] {
            let mono = vec![value; 32];
            let mut stereo = vec![0i16; 64];
            let mut back = vec![0i16; 32];
            assert_eq!(
                rechannel(ChannelLayout::Mono, ChannelLayout::Stereo, &mono, &mut stereo),
                32
            );
            assert_eq!(
                rechannel(ChannelLayout::Stereo, ChannelLayout::Mono, &stereo, &mut back),
                32
            );
            assert_eq!(mono, back);
        }
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut out = [0i16; 2];
        rechannel(
            ChannelLayout::Stereo,
            ChannelLayout::Mono,
            &[100, 300, -100, -300],
            &mut out,
        );
        assert_eq!(out, [200, -200]);
    }

    #[test]
    fn two_point_one_drops_lfe() {
        let mut out = [0i16; 2];
        rechannel(
            ChannelLayout::TwoPointOne,
            ChannelLayout::Stereo,
            &[10, 20, 30_000],
            &mut out,
        );
        assert_eq!(out, [10, 20]);
    }

    #[test]
    fn quad_averages_front_and_rear() {
        let mut out = [0i16; 2];
        rechannel(
            ChannelLayout::Quad,
            ChannelLayout::Stereo,
            &[1000, 2000, 3000, 4000],
            &mut out,
        );
        assert_eq!(out, [2000, 3000]);
    }

    #[test]
    fn five_one_blend_saturates() {
        let frame = [i16::MAX, i16::MIN, i16::MAX, 0, i16::MAX, i16::MIN];
        let mut out = [0i16; 2];
        rechannel(
            ChannelLayout::FivePointOne,
            ChannelLayout::Stereo,
            &frame,
            &mut out,
        );
        assert_eq!(out, [i16::MAX, i16::MIN]);
    }

    #[test]
    fn five_zero_to_mono_goes_through_stereo() {
        let frame = [1000, 1000, 0, 0, 0];
        let mut out = [0i16; 1];
        rechannel(
            ChannelLayout::FivePointZero,
            ChannelLayout::Mono,
            &frame,
            &mut out,
        );
        assert_eq!(out, [1000]);
    }

    #[test]
    fn stereo_upmix_fills_center_and_silences_rears() {
        let mut out = [7i16; 6];
        rechannel(
            ChannelLayout::Stereo,
            ChannelLayout::FivePointOne,
            &[400, 200],
            &mut out,
        );
        assert_eq!(out, [400, 200, 300, 0, 0, 0]);
    }

    #[test]
    fn converts_only_whole_frames_that_fit() {
        let input = [1i16; 10];
        let mut output = [0i16; 3];
        assert_eq!(
            rechannel(ChannelLayout::Mono, ChannelLayout::Stereo, &input, &mut output),
            1
        );
    }
}
