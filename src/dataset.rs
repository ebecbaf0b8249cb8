//! Training data: single-source tracks grouped into padded batches.

use crate::config::HParams;
use crate::files::{TRACK_EXTENSIONS, find_files};
use crate::{io, spectrum};
use ndarray::{Array2, Array3, Array4, Axis, Slice};
use num_complex::Complex32;
use rand::seq::SliceRandom;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = crate::Error;

    fn from_str(name: &str) -> crate::Result<Self> {
        match name {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            _ => Err(crate::Error::UnknownVariant {
                kind: "dataset split",
                name: name.to_string(),
                expected: "train, valid, test",
            }),
        }
    }
}

/// Complex source spectrograms `[B, N, T, F]`, zero-padded in time to the
/// longest track of the batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub sources: Array4<Complex32>,
}

impl Batch {
    /// Group `tracks` into `tracks.len() / n_signal` examples of `n_signal`
    /// sources each.
    pub fn from_tracks(tracks: &[&Array2<Complex32>], n_signal: usize) -> crate::Result<Self> {
        if n_signal == 0 || tracks.is_empty() || tracks.len() % n_signal != 0 {
            return Err(crate::Error::InvalidSize {
                name: "tracks",
                value: tracks.len(),
                reason: "must be a non-zero multiple of the source count",
            });
        }
        let n_freq = tracks[0].ncols();
        if let Some(bad) = tracks.iter().find(|t| t.ncols() != n_freq) {
            return Err(crate::Error::shape(format!("{n_freq} frequency bins"), bad.dim()));
        }
        let n_frames = tracks.iter().map(|t| t.nrows()).max().unwrap_or(0);
        let batch = tracks.len() / n_signal;

        let mut sources = Array4::<Complex32>::zeros((batch, n_signal, n_frames, n_freq));
        for (k, track) in tracks.iter().enumerate() {
            let mut slot = sources
                .index_axis_mut(Axis(0), k / n_signal)
                .index_axis_move(Axis(0), k % n_signal);
            slot.slice_axis_mut(Axis(0), Slice::from(0..track.nrows()))
                .assign(*track);
        }
        Ok(Self { sources })
    }

    pub fn batch_size(&self) -> usize {
        self.sources.len_of(Axis(0))
    }

    pub fn n_signal(&self) -> usize {
        self.sources.len_of(Axis(1))
    }

    /// Sum of the sources of every example, `[B, T, F]`.
    pub fn mixture(&self) -> Array3<Complex32> {
        self.sources.sum_axis(Axis(1))
    }
}

/// Source of per-split single-source tracks.
pub trait Dataset {
    fn tracks(&self, split: Split) -> &[Array2<Complex32>];

    /// Iterate over one pass of `split` in batches of `batch_size` examples.
    ///
    /// A trailing group too small for a full batch is dropped.
    fn epoch(&self, split: Split, batch_size: usize, n_signal: usize, shuffle: bool) -> Epoch<'_> {
        let tracks = self.tracks(split);
        let mut order: Vec<usize> = (0..tracks.len()).collect();
        if shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        Epoch {
            tracks,
            order,
            per_batch: batch_size * n_signal,
            n_signal,
            next: 0,
        }
    }
}

pub struct Epoch<'a> {
    tracks: &'a [Array2<Complex32>],
    order: Vec<usize>,
    per_batch: usize,
    n_signal: usize,
    next: usize,
}

impl Epoch<'_> {
    /// Number of full batches in this pass.
    pub fn n_batches(&self) -> usize {
        if self.per_batch == 0 {
            0
        } else {
            self.order.len() / self.per_batch
        }
    }
}

impl Iterator for Epoch<'_> {
    type Item = crate::Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.next + self.per_batch;
        if self.per_batch == 0 || end > self.order.len() {
            return None;
        }
        let picked: Vec<&Array2<Complex32>> = self.order[self.next..end]
            .iter()
            .map(|&i| &self.tracks[i])
            .collect();
        self.next = end;
        Some(Batch::from_tracks(&picked, self.n_signal))
    }
}

/// Tracks held in memory, one list per split.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    splits: [Vec<Array2<Complex32>>; 3],
}

impl InMemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split(mut self, split: Split, tracks: Vec<Array2<Complex32>>) -> Self {
        self.splits[split.index()] = tracks;
        self
    }

    pub fn push(&mut self, split: Split, track: Array2<Complex32>) {
        self.splits[split.index()].push(track);
    }
}

impl Dataset for InMemoryDataset {
    fn tracks(&self, split: Split) -> &[Array2<Complex32>] {
        &self.splits[split.index()]
    }
}

/// `<root>/<split>/*.wav`, every file one single-source track, analysed
/// once at load time. Missing split directories are empty.
#[derive(Debug, Clone)]
pub struct WavDirDataset {
    inner: InMemoryDataset,
}

impl WavDirDataset {
    pub fn open<P: AsRef<Path>>(root: P, hparams: &HParams) -> crate::Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(crate::Error::Dataset(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let stft = hparams.stft_config();
        let mut inner = InMemoryDataset::new();
        for split in Split::ALL {
            let files = find_files(&root.join(split.as_str()), TRACK_EXTENSIONS, true)?;
            for path in &files {
                let (data, sr) = io::load_wav(path)?;
                let data = io::resample(&data, sr, hparams.sample_rate)?;
                inner.push(split, spectrum::analyze(&data, &stft)?);
            }
            log::info!("{split}: {} tracks from {}", files.len(), root.display());
        }
        Ok(Self { inner })
    }
}

impl Dataset for WavDirDataset {
    fn tracks(&self, split: Split) -> &[Array2<Complex32>] {
        self.inner.tracks(split)
    }
}
