use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A named slice of the bucket space, described either by a `size` fraction or an explicit
/// `[range_start, range_end)` fraction pair. Immutable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    /// Fraction of the bucket space, in `[0, 1]`.
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub range_start: f64,
    #[serde(default)]
    pub range_end: f64,
}

/// Strategy that maps a bucket index to a variant name.
///
/// The bucket space is `[0, num_buckets)`. `None` means "no variant assigned": the user falls
/// through.
#[derive(Debug, Clone)]
pub enum VariantSet {
    /// Exactly two variants: treatment and control.
    Single {
        variants: Vec<Variant>,
        num_buckets: u64,
    },
    /// Three or more treatments allocated by cumulative offset.
    Multi {
        variants: Vec<Variant>,
        num_buckets: u64,
    },
    /// A single partial treatment.
    Rollout {
        variants: Vec<Variant>,
        num_buckets: u64,
    },
    /// Explicit `[start, end)` ranges, not necessarily contiguous or covering the full space.
    Range {
        variants: Vec<Variant>,
        num_buckets: u64,
    },
}

const SINGLE_VARIANT: &str = "single_variant";
const MULTI_VARIANT: &str = "multi_variant";
const FEATURE_ROLLOUT: &str = "feature_rollout";
const RANGE_VARIANT: &str = "range_variant";

impl VariantSet {
    /// Dispatch on the experiment's lifecycle type string. Unrecognized types fail closed.
    pub fn from_experiment_type(
        experiment_type: &str,
        variants: Vec<Variant>,
        num_buckets: u64,
    ) -> Result<VariantSet> {
        match experiment_type {
            SINGLE_VARIANT => VariantSet::new_single(variants, num_buckets),
            MULTI_VARIANT => VariantSet::new_multi(variants, num_buckets),
            FEATURE_ROLLOUT => VariantSet::new_rollout(variants, num_buckets),
            RANGE_VARIANT => VariantSet::new_range(variants, num_buckets),
            other => Err(Error::UnknownExperimentType(other.to_owned())),
        }
    }

    pub fn new_single(variants: Vec<Variant>, num_buckets: u64) -> Result<VariantSet> {
        if variants.len() != 2 {
            return Err(Error::InvalidVariantConfiguration(format!(
                "single variant experiments expect exactly 2 variants, got {}",
                variants.len()
            )));
        }
        let total_size = variants[0].size + variants[1].size;
        if !(0.0..=1.0).contains(&total_size) {
            return Err(Error::InvalidVariantConfiguration(format!(
                "sum of variant sizes must be in [0, 1], got {total_size}"
            )));
        }
        Ok(VariantSet::Single {
            variants,
            num_buckets,
        })
    }

    pub fn new_multi(variants: Vec<Variant>, num_buckets: u64) -> Result<VariantSet> {
        if variants.len() < 3 {
            return Err(Error::InvalidVariantConfiguration(format!(
                "multi variant experiments expect at least 3 variants, got {}",
                variants.len()
            )));
        }
        let allocated: u64 = variants
            .iter()
            .map(|variant| scale(variant.size, num_buckets))
            .sum();
        if allocated > num_buckets {
            return Err(Error::InvalidVariantConfiguration(format!(
                "variants allocate {allocated} buckets, only {num_buckets} available"
            )));
        }
        Ok(VariantSet::Multi {
            variants,
            num_buckets,
        })
    }

    pub fn new_rollout(variants: Vec<Variant>, num_buckets: u64) -> Result<VariantSet> {
        if variants.len() != 1 {
            return Err(Error::InvalidVariantConfiguration(format!(
                "feature rollouts expect exactly 1 variant, got {}",
                variants.len()
            )));
        }
        if !(0.0..=1.0).contains(&variants[0].size) {
            return Err(Error::InvalidVariantConfiguration(format!(
                "rollout size must be in [0, 1], got {}",
                variants[0].size
            )));
        }
        Ok(VariantSet::Rollout {
            variants,
            num_buckets,
        })
    }

    pub fn new_range(variants: Vec<Variant>, num_buckets: u64) -> Result<VariantSet> {
        if variants.is_empty() {
            return Err(Error::InvalidVariantConfiguration(
                "range variant experiments expect at least 1 variant".to_owned(),
            ));
        }
        let allocated: u64 = variants
            .iter()
            .map(|variant| {
                scale(variant.range_end, num_buckets)
                    .saturating_sub(scale(variant.range_start, num_buckets))
            })
            .sum();
        if allocated > num_buckets {
            return Err(Error::InvalidVariantConfiguration(format!(
                "variant ranges cover {allocated} buckets, only {num_buckets} available"
            )));
        }
        Ok(VariantSet::Range {
            variants,
            num_buckets,
        })
    }

    /// Map a bucket index to a variant name. A pure function of `bucket`: repeated calls with
    /// the same bucket yield identical results.
    pub fn choose_variant(&self, bucket: u64) -> Option<&str> {
        match self {
            VariantSet::Single {
                variants,
                num_buckets,
            } => {
                if bucket < scale(variants[0].size, *num_buckets) {
                    return Some(&variants[0].name);
                }
                if bucket >= num_buckets - scale(variants[1].size, *num_buckets) {
                    return Some(&variants[1].name);
                }
                None
            }

            VariantSet::Multi {
                variants,
                num_buckets,
            } => {
                let mut offset = 0;
                for variant in variants {
                    offset += scale(variant.size, *num_buckets);
                    if bucket < offset {
                        return Some(&variant.name);
                    }
                }
                None
            }

            VariantSet::Rollout {
                variants,
                num_buckets,
            } => {
                if bucket < scale(variants[0].size, *num_buckets) {
                    return Some(&variants[0].name);
                }
                None
            }

            // Overlapping ranges resolve to first-match-in-declaration-order.
            VariantSet::Range {
                variants,
                num_buckets,
            } => variants
                .iter()
                .find(|variant| {
                    bucket >= scale(variant.range_start, *num_buckets)
                        && bucket < scale(variant.range_end, *num_buckets)
                })
                .map(|variant| variant.name.as_str()),
        }
    }
}

/// Scale a fraction of the bucket space to a bucket count, truncating.
fn scale(fraction: f64, num_buckets: u64) -> u64 {
    (fraction * num_buckets as f64) as u64
}
