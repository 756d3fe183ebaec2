// src/engine/optimizer.rs
//
// Target-size search: find the highest quality whose encode fits a byte
// budget. Missing the budget is a soft outcome, not an error.

use crate::error::PixelPressError;
use tracing::debug;

type OptimizerResult<T> = std::result::Result<T, PixelPressError>;

pub const MIN_QUALITY: f32 = 0.01;
pub const MAX_QUALITY: f32 = 1.0;
pub const SEARCH_ITERATIONS: u32 = 8;

/// Quality handed to the palette quantizer on the PNG path.
pub const PNG_QUANTIZED_QUALITY: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizeStatus {
    TargetReached,
    /// Nothing fit; the returned data is the smallest attempt.
    TargetNotReached { best_size: usize },
}

#[derive(Clone, Debug)]
pub struct OptimizeOutcome {
    pub data: Vec<u8>,
    pub quality: f32,
    pub status: OptimizeStatus,
    pub attempts: u32,
}

impl OptimizeOutcome {
    pub fn reached(&self) -> bool {
        self.status == OptimizeStatus::TargetReached
    }
}

fn check_target(target_bytes: usize) -> OptimizerResult<()> {
    if target_bytes == 0 {
        return Err(PixelPressError::invalid_argument(
            "target_bytes",
            "0",
            "target size must be positive",
        ));
    }
    Ok(())
}

/// Binary search over quality in [MIN_QUALITY, MAX_QUALITY].
///
/// Each step encodes at the midpoint. A fit raises the lower bound and is
/// remembered; a miss lowers the upper bound. When no step fits, the
/// lowest-quality attempt comes back with `TargetNotReached`.
pub fn optimize_to_size<F>(mut encode_fn: F, target_bytes: usize) -> OptimizerResult<OptimizeOutcome>
where
    F: FnMut(f32) -> OptimizerResult<Vec<u8>>,
{
    check_target(target_bytes)?;

    let mut lo = MIN_QUALITY;
    let mut hi = MAX_QUALITY;
    let mut best: Option<(Vec<u8>, f32)> = None;
    let mut lowest: Option<(Vec<u8>, f32)> = None;

    for step in 0..SEARCH_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let data = encode_fn(mid)?;
        let fits = data.len() <= target_bytes;
        debug!(
            target: "pixel_press::optimize",
            step,
            quality = mid,
            size = data.len(),
            target_bytes,
            fits,
            "search step"
        );
        if fits {
            lo = mid;
            best = Some((data, mid));
        } else {
            hi = mid;
            lowest = Some((data, mid));
        }
    }

    match (best, lowest) {
        (Some((data, quality)), _) => Ok(OptimizeOutcome {
            data,
            quality,
            status: OptimizeStatus::TargetReached,
            attempts: SEARCH_ITERATIONS,
        }),
        (None, Some((data, quality))) => Ok(OptimizeOutcome {
            status: OptimizeStatus::TargetNotReached {
                best_size: data.len(),
            },
            data,
            quality,
            attempts: SEARCH_ITERATIONS,
        }),
        (None, None) => Err(PixelPressError::internal_panic(
            "size search finished without any attempt",
        )),
    }
}

/// PNG has no continuous quality knob: try the lossless encode, then the
/// palette-quantized one.
pub fn optimize_png_to_size<L, Q>(
    lossless: L,
    quantized: Q,
    target_bytes: usize,
) -> OptimizerResult<OptimizeOutcome>
where
    L: FnOnce() -> OptimizerResult<Vec<u8>>,
    Q: FnOnce(f32) -> OptimizerResult<Vec<u8>>,
{
    check_target(target_bytes)?;

    let full = lossless()?;
    debug!(target: "pixel_press::optimize", size = full.len(), target_bytes, "png lossless attempt");
    if full.len() <= target_bytes {
        return Ok(OptimizeOutcome {
            data: full,
            quality: MAX_QUALITY,
            status: OptimizeStatus::TargetReached,
            attempts: 1,
        });
    }

    let reduced = quantized(PNG_QUANTIZED_QUALITY)?;
    debug!(target: "pixel_press::optimize", size = reduced.len(), target_bytes, "png quantized attempt");
    let (data, quality) = if reduced.len() <= full.len() {
        (reduced, PNG_QUANTIZED_QUALITY)
    } else {
        (full, MAX_QUALITY)
    };
    let status = if data.len() <= target_bytes {
        OptimizeStatus::TargetReached
    } else {
        OptimizeStatus::TargetNotReached {
            best_size: data.len(),
        }
    };
    Ok(OptimizeOutcome {
        data,
        quality,
        status,
        attempts: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Size grows linearly with quality: 100 + 1000*q bytes.
    fn linear(q: f32) -> OptimizerResult<Vec<u8>> {
        Ok(vec![0u8; 100 + (1000.0 * q) as usize])
    }

    #[test]
    fn test_converges_below_target() {
        let mut calls = 0;
        let outcome = optimize_to_size(
            |q| {
                calls += 1;
                linear(q)
            },
            600,
        )
        .unwrap();
        assert_eq!(calls, SEARCH_ITERATIONS);
        assert!(outcome.reached());
        assert!(outcome.data.len() <= 600);
        // Optimum is q = 0.5; 8 halvings of [0.01, 1] land within 0.004.
        assert!(outcome.quality > 0.49 && outcome.quality <= 0.5, "{}", outcome.quality);
    }

    #[test]
    fn test_soft_failure_returns_lowest_attempt() {
        let outcome = optimize_to_size(linear, 50).unwrap();
        assert!(!outcome.reached());
        match outcome.status {
            OptimizeStatus::TargetNotReached { best_size } => {
                assert_eq!(best_size, outcome.data.len())
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(outcome.quality < 0.02);
    }

    #[test]
    fn test_generous_target_keeps_high_quality() {
        let outcome = optimize_to_size(linear, 10_000).unwrap();
        assert!(outcome.reached());
        assert!(outcome.quality > 0.99);
    }

    #[test]
    fn test_encode_error_propagates() {
        let err = optimize_to_size(|_| Err(PixelPressError::encode_failed("jpeg", "boom")), 10)
            .unwrap_err();
        assert!(matches!(err, PixelPressError::EncodeFailed { .. }));
    }

    #[test]
    fn test_zero_target_rejected() {
        assert!(optimize_to_size(linear, 0).is_err());
    }

    mod png_tests {
        use super::*;

        #[test]
        fn test_lossless_fits() {
            let out = optimize_png_to_size(|| Ok(vec![0; 10]), |_| Ok(vec![0; 5]), 20).unwrap();
            assert!(out.reached());
            assert_eq!(out.quality, MAX_QUALITY);
            assert_eq!(out.attempts, 1);
        }

        #[test]
        fn test_quantized_fits() {
            let out = optimize_png_to_size(|| Ok(vec![0; 30]), |_| Ok(vec![0; 15]), 20).unwrap();
            assert!(out.reached());
            assert_eq!(out.quality, PNG_QUANTIZED_QUALITY);
        }

        #[test]
        fn test_neither_fits() {
            let out = optimize_png_to_size(|| Ok(vec![0; 30]), |_| Ok(vec![0; 25]), 20).unwrap();
            assert_eq!(out.status, OptimizeStatus::TargetNotReached { best_size: 25 });
        }
    }
}
