// Frame assembly - re-chunk arbitrary capture blocks into analysis frames
//
// Capture devices deliver whatever block size they like; the detector works on
// fixed-length frames. FrameChunker accumulates incoming samples and hands out
// complete frames in arrival order, keeping any remainder for the next call.

/// Scale factor for Int16 → f32 conversion
const I16_SCALE: f32 = 1.0 / 32_768.0;

/// Convert one signed 16-bit sample to f32 in [-1, 1)
#[inline]
pub fn i16_sample_to_f32(sample: i16) -> f32 {
    sample as f32 * I16_SCALE
}

/// Convert signed 16-bit PCM to f32 in [-1, 1)
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().copied().map(i16_sample_to_f32).collect()
}

/// Convert in place into an existing buffer (no allocation when capacity suffices)
pub fn i16_into_f32(samples: &[i16], out: &mut Vec<f32>) {
    out.clear();
    out.extend(samples.iter().copied().map(i16_sample_to_f32));
}

/// Root mean square of a block (0.0 when empty)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

/// Accumulates samples and yields fixed-length frames
#[derive(Debug, Clone)]
pub struct FrameChunker {
    frame_length: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_length: usize) -> Self {
        let frame_length = frame_length.max(1);
        Self {
            frame_length,
            pending: Vec::with_capacity(frame_length * 2),
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Samples waiting for a complete frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed samples; `on_frame` is called once per complete frame, in order.
    pub fn push<F: FnMut(&[f32])>(&mut self, samples: &[f32], mut on_frame: F) {
        let mut input = samples;

        // Top up a partial frame first.
        if !self.pending.is_empty() {
            let needed = self.frame_length - self.pending.len();
            let take = needed.min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.pending.len() < self.frame_length {
                return;
            }
            on_frame(&self.pending);
            self.pending.clear();
        }

        let mut chunks = input.chunks_exact(self.frame_length);
        for frame in &mut chunks {
            on_frame(frame);
        }
        self.pending.extend_from_slice(chunks.remainder());
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for FrameChunker {
    fn default() -> Self {
        Self {
            frame_length: 1,
            pending: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_conversion_range() {
        let converted = i16_to_f32(&[i16::MIN, 0, i16::MAX]);
        assert_eq!(converted[0], -1.0);
        assert_eq!(converted[1], 0.0);
        assert!(converted[2] < 1.0 && converted[2] > 0.999);

        let mut out = Vec::new();
        i16_into_f32(&[16_384], &mut out);
        assert_eq!(out, vec![0.5]);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_chunker_rechunks_uneven_blocks() {
        let mut chunker = FrameChunker::new(4);
        let mut frames: Vec<Vec<f32>> = Vec::new();

        chunker.push(&[1.0, 2.0, 3.0], |f| frames.push(f.to_vec()));
        assert!(frames.is_empty());
        assert_eq!(chunker.pending(), 3);

        chunker.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0], |f| frames.push(f.to_vec()));
        assert_eq!(
            frames,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(chunker.pending(), 2);
    }

    #[test]
    fn test_chunker_small_pushes_complete_one_frame() {
        let mut chunker = FrameChunker::new(3);
        let mut count = 0;
        for s in [1.0, 2.0, 3.0] {
            chunker.push(&[s], |_| count += 1);
        }
        assert_eq!(count, 1);
        assert_eq!(chunker.pending(), 0);
    }

    #[test]
    fn test_chunker_clear() {
        let mut chunker = FrameChunker::new(8);
        chunker.push(&[0.0; 5], |_| {});
        chunker.clear();
        assert_eq!(chunker.pending(), 0);
    }
}
