//! Sample pool.
//!
//! WAV files are decoded with `hound` on the control side, converted to
//! stereo `f32` frames and shared with voices through `Arc`. Loading the
//! same file and range twice returns the same id.

use crate::constants::MAX_SAMPLE_SECONDS;
use crate::frame::Frame;
use crate::types::{EngineError, SampleId};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct Sample {
    pub frames: Vec<Frame>,
    /// Rate the file was recorded at; voices resample on playback.
    pub sample_rate: f32,
    pub path: PathBuf,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Linear interpolation between neighbouring frames; silent past the end.
    #[inline]
    pub fn frame_at(&self, position: f64) -> Frame {
        let index = position as usize;
        let Some(a) = self.frames.get(index) else {
            return Frame::ZERO;
        };
        let b = self.frames.get(index + 1).copied().unwrap_or(Frame::ZERO);
        let frac = (position - index as f64) as f32;
        Frame::new(
            a.left + (b.left - a.left) * frac,
            a.right + (b.right - a.right) * frac,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SampleKey {
    path: PathBuf,
    start: usize,
    stop: usize,
}

#[derive(Default)]
pub struct SamplePool {
    samples: DashMap<SampleId, Arc<Sample>>,
    index: DashMap<SampleKey, SampleId>,
    next_id: AtomicU32,
}

impl SamplePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<SampleId, EngineError> {
        self.load_range(path, 0, 0)
    }

    /// Loads frames `[start, stop)`. A `stop` of 0 or past the end of the
    /// file means "until the end".
    pub fn load_range(&self, path: &Path, start: usize, stop: usize) -> Result<SampleId, EngineError> {
        let key = SampleKey {
            path: path.to_path_buf(),
            start,
            stop,
        };
        if let Some(id) = self.index.get(&key) {
            return Ok(*id);
        }

        let (mut frames, sample_rate) = read_wav(path)?;
        let end = if stop == 0 { frames.len() } else { stop.min(frames.len()) };
        if start >= end {
            return Err(EngineError::SampleLoadFailed {
                path: path.display().to_string(),
                reason: format!("empty range {}..{} ({} frames)", start, stop, frames.len()),
            });
        }
        frames.truncate(end);
        frames.drain(..start);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.samples.insert(
            id,
            Arc::new(Sample {
                frames,
                sample_rate,
                path: path.to_path_buf(),
            }),
        );
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: SampleId) -> Option<Arc<Sample>> {
        self.samples.get(&id).map(|s| Arc::clone(&s))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn read_wav(path: &Path) -> Result<(Vec<Frame>, f32), EngineError> {
    let fail = |reason: String| EngineError::SampleLoadFailed {
        path: path.display().to_string(),
        reason,
    };
    let mut reader = hound::WavReader::open(path).map_err(|e| fail(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(fail("no channels".to_string()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| fail(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                8 => 128.0,
                16 => 32768.0,
                24 => 8388608.0,
                32 => 2147483648.0,
                bits => return Err(fail(format!("unsupported bit depth {}", bits))),
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| fail(e.to_string()))?
        }
    };

    let max_frames = (MAX_SAMPLE_SECONDS * spec.sample_rate as f32) as usize;
    let frames = samples
        .chunks_exact(channels)
        .take(max_frames)
        .map(|chunk| match chunk {
            [mono] => Frame::mono(*mono),
            [left, right, ..] => Frame::new(*left, *right),
            [] => Frame::ZERO,
        })
        .collect();
    Ok((frames, spec.sample_rate as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn loads_mono_as_stereo_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kick.wav");
        write_wav(&path, 1, &[16384, -16384, 0, 8192]);

        let pool = SamplePool::new();
        let id = pool.load(&path).unwrap();
        assert_eq!(pool.load(&path).unwrap(), id);
        assert_eq!(pool.len(), 1);

        let sample = pool.get(id).unwrap();
        assert_eq!(sample.len(), 4);
        assert_eq!(sample.sample_rate, 22050.0);
        assert_eq!(sample.frames[0], Frame::mono(0.5));
        assert_eq!(sample.frames[1], Frame::mono(-0.5));
    }

    #[test]
    fn range_selects_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pad.wav");
        write_wav(&path, 2, &[0, 0, 16384, -16384, 8192, 8192, 0, 0]);

        let pool = SamplePool::new();
        let full = pool.load(&path).unwrap();
        let part = pool.load_range(&path, 1, 3).unwrap();
        assert_ne!(full, part);

        let sample = pool.get(part).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.frames[0], Frame::new(0.5, -0.5));
        assert!(pool.load_range(&path, 3, 2).is_err());
    }

    #[test]
    fn interpolates_between_frames() {
        let sample = Sample {
            frames: vec![Frame::mono(0.0), Frame::mono(1.0)],
            sample_rate: 44100.0,
            path: PathBuf::new(),
        };
        assert_eq!(sample.frame_at(0.25), Frame::mono(0.25));
        assert_eq!(sample.frame_at(1.5), Frame::mono(0.5));
        assert_eq!(sample.frame_at(2.0), Frame::ZERO);
    }

    #[test]
    fn missing_file_is_an_error() {
        let pool = SamplePool::new();
        let err = pool.load(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, EngineError::SampleLoadFailed { .. }));
    }
}
