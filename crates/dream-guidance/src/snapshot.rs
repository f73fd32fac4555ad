//! Throttled per-direction diagnostic dumps.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use burn::prelude::*;

use crate::latent::to_rgb8;

/// Viewpoint label attached to each rendered frame.
///
/// Routing only: the label picks the dump folder and throttling bucket and
/// has no bearing on the numerical guidance computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Front,
    LeftSide,
    Back,
    RightSide,
    Overhead,
    Bottom,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Front,
        Direction::LeftSide,
        Direction::Back,
        Direction::RightSide,
        Direction::Overhead,
        Direction::Bottom,
    ];

    /// Dump folder name.
    pub fn folder(&self) -> &'static str {
        match self {
            Direction::Front => "front",
            Direction::LeftSide => "left_side",
            Direction::Back => "back",
            Direction::RightSide => "right_side",
            Direction::Overhead => "overhead",
            Direction::Bottom => "bottom",
        }
    }
}

/// One kind of dumped frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// The (resized) render coming out of the NeRF.
    Nerf,
    /// Latent with forward noise applied at the sampled timestep.
    Noisy,
    /// Latent noised with the guided prediction instead of the true noise.
    NoisyPred,
    /// Full multi-step denoise from the current latent.
    FinalDenoised,
    /// Single reverse step from the sampled timestep.
    Denoised,
    /// Latent noised with the prediction residual.
    Residual,
    /// The drawn noise tensor, decoded.
    Noise,
    /// The guided prediction, decoded.
    PredNoise,
    /// The prediction residual, decoded.
    ResidualNoise,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 9] = [
        SnapshotKind::Nerf,
        SnapshotKind::Noisy,
        SnapshotKind::NoisyPred,
        SnapshotKind::FinalDenoised,
        SnapshotKind::Denoised,
        SnapshotKind::Residual,
        SnapshotKind::Noise,
        SnapshotKind::PredNoise,
        SnapshotKind::ResidualNoise,
    ];

    /// Dump folder name.
    pub fn folder(&self) -> &'static str {
        match self {
            SnapshotKind::Nerf => "nerf",
            SnapshotKind::Noisy => "noisy",
            SnapshotKind::NoisyPred => "noisy_pred",
            SnapshotKind::FinalDenoised => "final_denoised",
            SnapshotKind::Denoised => "denoised",
            SnapshotKind::Residual => "residual",
            SnapshotKind::Noise => "noise",
            SnapshotKind::PredNoise => "pred_noise",
            SnapshotKind::ResidualNoise => "residual_noise",
        }
    }
}

/// Per-direction capture throttle.
///
/// The training iteration counter doubles as the clock, which keeps the
/// throttle deterministic and directly drivable from tests.
#[derive(Debug)]
pub struct DumpThrottle {
    window: i64,
    last_update: HashMap<Direction, i64>,
}

impl DumpThrottle {
    pub fn new(window: usize) -> Self {
        let last_update = Direction::ALL.iter().map(|d| (*d, -1000i64)).collect();
        Self {
            window: window as i64,
            last_update,
        }
    }

    /// Admit at most one capture per window per direction.
    pub fn admit(&mut self, direction: Direction, iteration: usize) -> bool {
        let now = iteration as i64;
        let last = self.last_update[&direction];
        if (now - last).abs() >= self.window {
            self.last_update.insert(direction, now);
            true
        } else {
            false
        }
    }
}

/// Writes decoded diagnostic frames under `<root>/<direction>/<kind>/`.
pub struct SnapshotWriter {
    root: PathBuf,
    throttle: DumpThrottle,
}

impl SnapshotWriter {
    /// Default capture window, in training iterations.
    pub const DEFAULT_WINDOW: usize = 10;

    /// Create the full folder tree up front.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        for direction in Direction::ALL {
            for kind in SnapshotKind::ALL {
                fs::create_dir_all(root.join(direction.folder()).join(kind.folder()))?;
            }
        }

        Ok(Self {
            root,
            throttle: DumpThrottle::new(Self::DEFAULT_WINDOW),
        })
    }

    /// Whether this iteration should dump frames for `direction`.
    pub fn admit(&mut self, direction: Direction, iteration: usize) -> bool {
        self.throttle.admit(direction, iteration)
    }

    /// Best-effort PNG dump; failures are logged, never fatal.
    pub fn save<B: Backend>(
        &self,
        direction: Direction,
        kind: SnapshotKind,
        iteration: usize,
        image: Tensor<B, 4>,
    ) {
        let folder = self.root.join(direction.folder()).join(kind.folder());
        for (index, frame) in to_rgb8(image).into_iter().enumerate() {
            let path = if index == 0 {
                folder.join(format!("{iteration}.png"))
            } else {
                folder.join(format!("{iteration}_{index}.png"))
            };
            if let Err(err) = frame.save(&path) {
                log::warn!("failed to write snapshot {}: {}", path.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_admits_once_per_window() {
        let mut throttle = DumpThrottle::new(10);

        assert!(throttle.admit(Direction::Front, 0));
        assert!(!throttle.admit(Direction::Front, 5));
        assert!(!throttle.admit(Direction::Front, 9));
        assert!(throttle.admit(Direction::Front, 10));
    }

    #[test]
    fn throttle_tracks_directions_independently() {
        let mut throttle = DumpThrottle::new(10);

        assert!(throttle.admit(Direction::Front, 0));
        assert!(throttle.admit(Direction::Back, 5));
        assert!(!throttle.admit(Direction::Back, 9));
    }

    #[test]
    fn first_iteration_is_always_admitted() {
        // last_update starts far in the past, so iteration 0 captures.
        let mut throttle = DumpThrottle::new(10);
        for direction in Direction::ALL {
            assert!(throttle.admit(direction, 0));
        }
    }

    #[test]
    fn writer_creates_folder_tree() {
        let root = std::env::temp_dir().join(format!(
            "dream-guidance-snapshots-{}",
            std::process::id()
        ));
        let _writer = SnapshotWriter::create(&root).unwrap();

        assert!(root.join("front/nerf").is_dir());
        assert!(root.join("left_side/final_denoised").is_dir());
        assert!(root.join("bottom/residual_noise").is_dir());

        fs::remove_dir_all(&root).unwrap();
    }
}
