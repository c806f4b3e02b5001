use std::sync::Arc;

use chrono::Utc;

use crate::document_store::DocumentStore;
use crate::events::{EventLogger, ExposureEvent, NoopEventLogger, DEFAULT_EVENT_TYPE};
use crate::experiments::SimpleExperiment;
use crate::{Attributes, Document, Error, ExperimentConfig, Result, Timestamp, TryParse};

/// The experiment registry: resolves experiment names against the current document snapshot
/// and dispatches `variant` and `expose` calls.
///
/// Experiments are compiled lazily per call from a snapshot read, so one malformed experiment
/// in a multi-experiment document cannot break lookups for the others.
pub struct Experiments {
    document_store: Arc<DocumentStore>,
    event_logger: Arc<dyn EventLogger>,
}

impl Experiments {
    /// Create a registry that reads documents from `document_store` and drops exposure events.
    pub fn new(document_store: Arc<DocumentStore>) -> Experiments {
        Experiments {
            document_store,
            event_logger: Arc::new(NoopEventLogger),
        }
    }

    /// Create a registry that forwards exposure events to `event_logger`.
    pub fn with_event_logger(
        document_store: Arc<DocumentStore>,
        event_logger: Arc<dyn EventLogger>,
    ) -> Experiments {
        Experiments {
            document_store,
            event_logger,
        }
    }

    /// Decide the variant of `experiment_name` for the given arguments.
    ///
    /// Returns `Ok(None)` when the experiment is not live for these arguments (disabled,
    /// outside its time window, failing targeting, or bucketed outside every variant).
    pub fn variant(&self, experiment_name: &str, args: &Attributes) -> Result<Option<String>> {
        self.variant_at(experiment_name, args, Utc::now())
    }

    /// Decide the variant of `experiment_name` for the given arguments as of `now`.
    pub fn variant_at(
        &self,
        experiment_name: &str,
        args: &Attributes,
        now: Timestamp,
    ) -> Result<Option<String>> {
        let result = self.variant_inner(experiment_name, args, now);

        match &result {
            Ok(variant) => {
                log::trace!(target: "decider",
                    experiment_name,
                    variant:serde = variant;
                    "evaluated an experiment");
            }
            Err(err) if err.is_normal() => {
                log::trace!(target: "decider",
                    experiment_name;
                    "no variant assigned: {err}");
            }
            Err(err) => {
                log::warn!(target: "decider",
                    experiment_name;
                    "error evaluating an experiment: {err}");
            }
        }

        result
    }

    fn variant_inner(
        &self,
        experiment_name: &str,
        args: &Attributes,
        now: Timestamp,
    ) -> Result<Option<String>> {
        let document = self.snapshot(experiment_name)?;
        let config = lookup(&document, experiment_name)?;
        // Compiled per call from the snapshot; instances are immutable, so the call completes
        // against this document version even if a reload lands mid-call.
        let experiment = SimpleExperiment::new(config)?;
        experiment.variant_at(args, now)
    }

    /// Record an exposure: attach the experiment's current configuration to `event`, default
    /// its event type, and forward it to the event logger.
    pub fn expose(&self, experiment_name: &str, mut event: ExposureEvent) -> Result<()> {
        let document = self.snapshot(experiment_name)?;
        let config = lookup(&document, experiment_name)?;

        event.experiment = Some(config.clone());
        if event.event_type.is_empty() {
            event.event_type = DEFAULT_EVENT_TYPE.to_owned();
        }

        self.event_logger.log_event(&event)
    }

    /// Names of all experiments in the current document, including disabled experiments and
    /// experiments with bad configuration. Empty if no manifest has been loaded yet.
    pub fn experiment_names(&self) -> Vec<String> {
        match self.document_store.get_document() {
            Some(document) => document
                .experiment_names()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            None => Vec::new(),
        }
    }

    fn snapshot(&self, experiment_name: &str) -> Result<Arc<Document>> {
        self.document_store.get_document().ok_or_else(|| {
            log::warn!(target: "decider", "evaluating before a manifest has been loaded");
            Error::UnknownExperiment(experiment_name.to_owned())
        })
    }
}

fn lookup<'a>(document: &'a Document, experiment_name: &str) -> Result<&'a ExperimentConfig> {
    let entry = document
        .experiments
        .get(experiment_name)
        .ok_or_else(|| Error::UnknownExperiment(experiment_name.to_owned()))?;
    match entry {
        TryParse::Parsed(config) => Ok(config),
        TryParse::ParseFailed(_) => Err(Error::ExperimentParse(experiment_name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};

    use super::Experiments;
    use crate::document_store::DocumentStore;
    use crate::{
        Attributes, Document, Error, EventLogger, ExposureEvent, Result, Timestamp, TryParse,
    };

    const MANIFEST: &str = r#"
      {
        "test_experiment": {
          "id": 1,
          "name": "test_experiment",
          "owner": "test",
          "enabled": true,
          "version": "1",
          "type": "single_variant",
          "start_ts": 0,
          "stop_ts": 4102444800,
          "experiment": {
            "experiment_version": 1,
            "shuffle_version": 1,
            "variants": [
              {"name": "variant_1", "size": 0.5},
              {"name": "variant_2", "size": 0.5}
            ]
          }
        },
        "holdout": {
          "id": 2,
          "name": "holdout",
          "type": "dynamic_config",
          "experiment": {}
        },
        "broken": {
          "id": "not-an-int",
          "name": 42
        }
      }
    "#;

    fn store() -> Arc<DocumentStore> {
        let manifest: HashMap<String, TryParse<crate::ExperimentConfig>> =
            serde_json::from_str(MANIFEST).unwrap();
        let store = Arc::new(DocumentStore::new());
        store.set_document(Arc::new(Document::from_manifest(manifest)));
        store
    }

    fn user(id: &str) -> Attributes {
        [("user_id".to_owned(), id.into())].into_iter().collect()
    }

    fn live_now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn dispatches_to_the_right_experiment() {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = Experiments::new(store());
        assert_eq!(
            registry
                .variant_at("test_experiment", &user("user_1"), live_now())
                .unwrap(),
            Some("variant_1".to_owned())
        );
    }

    #[test]
    fn unknown_experiment() {
        let registry = Experiments::new(store());
        assert!(matches!(
            registry.variant_at("nope", &user("user_1"), live_now()),
            Err(Error::UnknownExperiment(ref name)) if name == "nope"
        ));
    }

    #[test]
    fn no_document_loaded() {
        let registry = Experiments::new(Arc::new(DocumentStore::new()));
        assert!(matches!(
            registry.variant_at("test_experiment", &user("user_1"), live_now()),
            Err(Error::UnknownExperiment(_))
        ));
        assert!(registry.experiment_names().is_empty());
    }

    #[test]
    fn unknown_experiment_type_fails_closed() {
        let registry = Experiments::new(store());
        assert!(matches!(
            registry.variant_at("holdout", &user("user_1"), live_now()),
            Err(Error::UnknownExperimentType(ref t)) if t == "dynamic_config"
        ));
    }

    #[test]
    fn malformed_experiment_does_not_break_others() {
        let registry = Experiments::new(store());
        assert!(matches!(
            registry.variant_at("broken", &user("user_1"), live_now()),
            Err(Error::ExperimentParse(_))
        ));
        // The rest of the document stays usable.
        assert!(registry
            .variant_at("test_experiment", &user("user_1"), live_now())
            .unwrap()
            .is_some());
    }

    #[test]
    fn experiment_names_lists_all_entries() {
        let registry = Experiments::new(store());
        let mut names = registry.experiment_names();
        names.sort();
        assert_eq!(names, vec!["broken", "holdout", "test_experiment"]);
    }

    struct RecordingLogger(Mutex<Vec<ExposureEvent>>);
    impl EventLogger for RecordingLogger {
        fn log_event(&self, event: &ExposureEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn exposure(experiment_name: &str) -> ExposureEvent {
        ExposureEvent {
            event_type: String::new(),
            experiment_name: experiment_name.to_owned(),
            variant_name: "variant_1".to_owned(),
            bucketing_value: "user_1".to_owned(),
            inputs: user("user_1"),
            timestamp: live_now(),
            experiment: None,
        }
    }

    #[test]
    fn expose_attaches_config_and_defaults_event_type() {
        let logger = Arc::new(RecordingLogger(Mutex::new(Vec::new())));
        let registry = Experiments::with_event_logger(store(), logger.clone());

        registry
            .expose("test_experiment", exposure("test_experiment"))
            .unwrap();

        let events = logger.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "EXPOSE");
        assert_eq!(
            events[0].experiment.as_ref().map(|c| c.name.as_str()),
            Some("test_experiment")
        );
    }

    #[test]
    fn expose_keeps_explicit_event_type() {
        let logger = Arc::new(RecordingLogger(Mutex::new(Vec::new())));
        let registry = Experiments::with_event_logger(store(), logger.clone());

        let mut event = exposure("test_experiment");
        event.event_type = "VIEW".to_owned();
        registry.expose("test_experiment", event).unwrap();

        assert_eq!(logger.0.lock().unwrap()[0].event_type, "VIEW");
    }

    #[test]
    fn expose_unknown_experiment() {
        let registry = Experiments::new(store());
        assert!(matches!(
            registry.expose("nope", exposure("nope")),
            Err(Error::UnknownExperiment(_))
        ));
    }
}
