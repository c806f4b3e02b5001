use chrono::Utc;

use crate::sharder::{Sha1Sharder, Sharder};
use crate::{AttributeValue, Attributes, Error, ExperimentConfig, Result, Timestamp};

use super::{Targeting, Variant, VariantSet};

/// Number of buckets the space is divided into, giving 0.1% resolution for size-based variant
/// allocation.
pub const NUM_BUCKETS: u64 = 1000;

/// Name of the bucketing argument when the experiment doesn't configure one.
const DEFAULT_BUCKET_VAL: &str = "user_id";

/// A compiled experiment: resolved defaults, a constructed [`VariantSet`], a compiled
/// [`Targeting`] tree, and compiled override predicates. Immutable after construction, so safe
/// for unlimited concurrent readers; a document reload produces entirely new instances.
#[derive(Debug, Clone)]
pub struct SimpleExperiment {
    name: String,
    bucket_seed: String,
    bucket_val: String,
    num_buckets: u64,
    enabled: bool,
    start_time: Timestamp,
    end_time: Timestamp,
    variant_set: VariantSet,
    targeting: Targeting,
    /// Override predicates in document order; the first match forces its variant.
    overrides: Vec<(String, Targeting)>,
}

impl SimpleExperiment {
    /// Compile an experiment configuration.
    ///
    /// Validates the variant shape, parses the targeting predicate (defaulting to always-true
    /// when absent), and parses every override predicate. Any failure aborts construction of
    /// this one experiment only.
    pub fn new(config: &ExperimentConfig) -> Result<SimpleExperiment> {
        let definition = &config.experiment;

        let bucket_val = if definition.bucket_val.is_empty() {
            DEFAULT_BUCKET_VAL.to_owned()
        } else {
            definition.bucket_val.to_lowercase()
        };
        // Absent an explicit seed, the shuffle version is part of the derived seed; bumping it
        // rebuckets all users.
        let bucket_seed = if definition.bucket_seed.is_empty() {
            format!(
                "{}.{}.{}",
                config.id, config.name, definition.shuffle_version
            )
        } else {
            definition.bucket_seed.clone()
        };

        let variant_set = VariantSet::from_experiment_type(
            &config.experiment_type,
            definition.variants.clone(),
            NUM_BUCKETS,
        )?;

        let targeting = match &definition.targeting {
            Some(document) if !is_empty_document(document) => Targeting::new(document)?,
            _ => Targeting::always_true(),
        };

        let mut overrides = Vec::with_capacity(definition.overrides.len());
        for entry in &definition.overrides {
            let mut pairs = entry.iter();
            match (pairs.next(), pairs.next()) {
                (Some((variant_name, predicate)), None) => {
                    overrides.push((variant_name.clone(), Targeting::new(predicate)?));
                }
                // A multi-key entry would make the matching order unspecified, so it is
                // rejected outright; one variant per override-list entry.
                _ => {
                    return Err(Error::InvalidVariantConfiguration(format!(
                        "override entries must name exactly one variant, got {}",
                        entry.len()
                    )));
                }
            }
        }

        Ok(SimpleExperiment {
            name: config.name.clone(),
            bucket_seed,
            bucket_val,
            num_buckets: NUM_BUCKETS,
            enabled: config.enabled.unwrap_or(true),
            start_time: timestamp_from_epoch(config.start_ts),
            end_time: timestamp_from_epoch(config.stop_ts),
            variant_set,
            targeting,
            overrides,
        })
    }

    /// Name of the experiment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variants configured for this experiment.
    pub fn variants(&self) -> &[Variant] {
        match &self.variant_set {
            VariantSet::Single { variants, .. }
            | VariantSet::Multi { variants, .. }
            | VariantSet::Rollout { variants, .. }
            | VariantSet::Range { variants, .. } => variants,
        }
    }

    /// Decide the variant for the given arguments, using the current time for the live-window
    /// check.
    pub fn variant(&self, args: &Attributes) -> Result<Option<String>> {
        self.variant_at(args, Utc::now())
    }

    /// Decide the variant for the given arguments as of `now`.
    ///
    /// Returns `Ok(None)` when the experiment is disabled, outside its live window, fails
    /// targeting, or the bucket falls outside every variant. That is a normal, frequent,
    /// silent outcome. Errors represent configuration or usage problems; of these,
    /// [`Error::MissingBucketKey`] is expected for traffic without an identifier and is
    /// usually handled silently by callers.
    pub fn variant_at(&self, args: &Attributes, now: Timestamp) -> Result<Option<String>> {
        if !self.enabled || now < self.start_time || now >= self.end_time {
            return Ok(None);
        }

        // Keys are lower-cased once up front to match the case-insensitive targeting and
        // bucketing key convention.
        let args: Attributes = args
            .iter()
            .map(|(key, value)| (key.to_lowercase(), value.clone()))
            .collect();

        let bucketing_value = match args.get(&self.bucket_val) {
            None | Some(AttributeValue::Null) => None,
            Some(AttributeValue::String(s)) if s.is_empty() => None,
            Some(value) => Some(value),
        };
        let Some(bucketing_value) = bucketing_value else {
            return Err(Error::MissingBucketKey {
                experiment_name: self.name.clone(),
                bucket_val: self.bucket_val.clone(),
            });
        };

        // The first matching override forces its variant; no targeting, no bucketing.
        for (variant_name, predicate) in &self.overrides {
            if predicate.evaluate(&args) {
                return Ok(Some(variant_name.clone()));
            }
        }

        if !self.targeting.evaluate(&args) {
            return Ok(None);
        }

        let AttributeValue::String(bucketing_value) = bucketing_value else {
            return Err(Error::BucketValueType {
                bucket_val: self.bucket_val.clone(),
                found: bucketing_value.type_name(),
            });
        };

        let bucket = self.calculate_bucket(bucketing_value);
        Ok(self.variant_set.choose_variant(bucket).map(str::to_owned))
    }

    /// Deterministically derive the bucket for a bucketing value. A pure function of the seed
    /// and the value, stable across calls and process restarts.
    fn calculate_bucket(&self, bucketing_value: &str) -> u64 {
        Sha1Sharder.get_bucket(
            format!("{}{}", self.bucket_seed, bucketing_value),
            self.num_buckets,
        )
    }
}

/// An absent, null, or `{}` targeting document means "target everyone".
fn is_empty_document(document: &serde_json::Value) -> bool {
    document.is_null()
        || document
            .as_object()
            .is_some_and(|object| object.is_empty())
}

/// Convert fractional seconds since epoch to a timestamp.
fn timestamp_from_epoch(seconds: f64) -> Timestamp {
    chrono::DateTime::from_timestamp(seconds.trunc() as i64, (seconds.fract() * 1e9) as u32)
        .unwrap_or_default()
}
