use crate::types::{is_defined, QaBand};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Flags of the Landsat Collection 2 `QA_PIXEL` band, by bit position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QaFlag {
    Fill,
    DilatedCloud,
    Cirrus,
    Cloud,
    Snow,
    CloudShadow,
    Clear,
    Water,
}

impl QaFlag {
    pub fn bit(&self) -> u8 {
        match self {
            QaFlag::Fill => 0,
            QaFlag::DilatedCloud => 1,
            QaFlag::Cirrus => 2,
            QaFlag::Cloud => 3,
            QaFlag::Snow => 4,
            QaFlag::CloudShadow => 5,
            QaFlag::Clear => 6,
            QaFlag::Water => 7,
        }
    }
}

/// How decoded flags are combined into a keep/drop decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combination {
    /// Keep a pixel when each flag is individually clear:
    /// `!f1 && !f2 && ...`
    AllClear,
    /// Keep a pixel unless any flag is raised:
    /// `!(f1 || f2 || ...)`
    NoneFlagged,
}

/// Test one bit of a QA code
#[inline]
pub fn decode_bit(qa: u16, bit: u8) -> bool {
    (qa >> bit) & 1 != 0
}

/// Decodes per-pixel QA codes into boolean flag fields
pub struct QaDecoder;

impl QaDecoder {
    /// Decode one flag. No-value QA pixels decode to `None`.
    pub fn decode(qa: &QaBand, flag: QaFlag) -> Array2<Option<bool>> {
        let bit = flag.bit();
        qa.mapv(|code| {
            if is_defined(code) && code >= 0.0 {
                Some(decode_bit(code as u16, bit))
            } else {
                None
            }
        })
    }
}

/// Cloud-masking policy: which flags disqualify a pixel and how they combine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskPolicy {
    pub flags: Vec<QaFlag>,
    pub combination: Combination,
}

impl MaskPolicy {
    pub fn new(flags: Vec<QaFlag>, combination: Combination) -> Self {
        Self { flags, combination }
    }

    /// Cloud, cloud shadow and snow, each tested clear (thermal workflow)
    pub fn thermal() -> Self {
        Self::new(
            vec![QaFlag::Cloud, QaFlag::CloudShadow, QaFlag::Snow],
            Combination::AllClear,
        )
    }

    /// Cloud or snow raised disqualifies (spectral workflow)
    pub fn spectral() -> Self {
        Self::new(vec![QaFlag::Cloud, QaFlag::Snow], Combination::NoneFlagged)
    }

    /// Keep decision for one QA code
    pub fn keeps(&self, qa: u16) -> bool {
        match self.combination {
            Combination::AllClear => self
                .flags
                .iter()
                .fold(true, |keep, flag| keep && !decode_bit(qa, flag.bit())),
            Combination::NoneFlagged => !self
                .flags
                .iter()
                .fold(false, |raised, flag| raised || decode_bit(qa, flag.bit())),
        }
    }

    /// Exclusion mask for a QA band: `true` = drop the pixel.
    /// Pixels whose QA code is no-value are dropped.
    pub fn exclusion_mask(&self, qa: &QaBand) -> Array2<bool> {
        let mask = qa.mapv(|code| !(is_defined(code) && code >= 0.0) || !self.keeps(code as u16));

        log::debug!(
            "{:?} mask over {} flags excludes {} of {} pixels",
            self.combination,
            self.flags.len(),
            mask.iter().filter(|m| **m).count(),
            mask.len()
        );
        mask
    }
}
