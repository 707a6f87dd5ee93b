// Model Registry Module
// Immutable, versioned snapshots of the model table and global settings.
// Readers grab the current snapshot with one atomic load; writers build a
// new snapshot and publish it with one atomic store.

use crate::errors::{ConfigError, PlanError};
use crate::scheduler::{TimeBudget, DEFAULT_TRUNCATION_MESSAGE};
use crate::selector::{AutoBands, CannedResponses, LengthPolicy};
use crate::speed::rate_from_parameters;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TOKENS_PER_SECOND: f64 = 10.0;
pub const DEFAULT_MAX_STREAM_TIME_SECONDS: f64 = 60.0;
pub const DEFAULT_MODEL_DESCRIPTION: &str = "Default configuration";

/// Longest accepted time limit, roughly 31 years
pub const MAX_TIME_LIMIT_SECONDS: f64 = 1e9;

/// Slowest accepted emission rate
pub const MIN_TOKENS_PER_SECOND: f64 = 1e-3;

/// Per-model pacing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub id: String,
    /// Explicit rate; takes precedence over `parameters`
    pub tokens_per_second: Option<f64>,
    /// Parameter count in billions
    pub parameters: Option<f64>,
    /// Per-model time budget, used when time limits are enforced
    pub max_stream_time_seconds: Option<f64>,
    pub description: String,
}

impl ModelProfile {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tokens_per_second: None,
            parameters: None,
            max_stream_time_seconds: None,
            description: description.into(),
        }
    }

    pub fn with_rate(mut self, tokens_per_second: f64) -> Self {
        self.tokens_per_second = Some(tokens_per_second);
        self
    }

    pub fn with_parameters(mut self, billions: f64) -> Self {
        self.parameters = Some(billions);
        self
    }

    pub fn with_max_stream_time(mut self, seconds: f64) -> Self {
        self.max_stream_time_seconds = Some(seconds);
        self
    }

    /// Explicit rate, else the parameter formula
    pub fn rate(&self) -> Option<f64> {
        self.tokens_per_second
            .or_else(|| self.parameters.and_then(rate_from_parameters))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::validation("model id must not be empty"));
        }
        if let Some(rate) = self.tokens_per_second {
            check_rate(&format!("models.{}.tokens_per_second", self.id), rate)?;
        }
        if let Some(parameters) = self.parameters {
            check_positive(&format!("models.{}.parameters", self.id), parameters)?;
        }
        if let Some(seconds) = self.max_stream_time_seconds {
            check_time_limit(&format!("models.{}.max_stream_time_seconds", self.id), seconds)?;
        }
        Ok(())
    }
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::validation(format!(
            "{} must be a positive number, got {}",
            field, value
        )))
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), ConfigError> {
    check_positive(field, value)?;
    if value < MIN_TOKENS_PER_SECOND {
        return Err(ConfigError::validation(format!(
            "{} must be at least {}, got {}",
            field, MIN_TOKENS_PER_SECOND, value
        )));
    }
    Ok(())
}

fn check_time_limit(field: &str, value: f64) -> Result<(), ConfigError> {
    check_positive(field, value)?;
    if value > MAX_TIME_LIMIT_SECONDS {
        return Err(ConfigError::validation(format!(
            "{} must be at most {}, got {}",
            field, MAX_TIME_LIMIT_SECONDS, value
        )));
    }
    Ok(())
}

/// `seconds` as a time limit, if it lies in `(0, MAX_TIME_LIMIT_SECONDS]`
fn time_limit(seconds: f64) -> Option<Duration> {
    if seconds > 0.0 && seconds <= MAX_TIME_LIMIT_SECONDS {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}

/// Global time budget settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeLimits {
    pub max_stream_time_seconds: f64,
    pub enforce: bool,
    pub truncation_message: String,
}

impl Default for TimeLimits {
    fn default() -> Self {
        Self {
            max_stream_time_seconds: DEFAULT_MAX_STREAM_TIME_SECONDS,
            enforce: false,
            truncation_message: DEFAULT_TRUNCATION_MESSAGE.to_string(),
        }
    }
}

/// One published version of the registry
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySnapshot {
    version: u64,
    models: BTreeMap<String, ModelProfile>,
    default_rate: f64,
    default_description: String,
    time_limits: TimeLimits,
    responses: CannedResponses,
    auto_bands: AutoBands,
    default_length: LengthPolicy,
}

impl RegistrySnapshot {
    /// Empty model table with built-in bodies, bands and time limits
    pub fn new(default_rate: f64) -> Result<Self, ConfigError> {
        check_rate("general.default_tokens_per_second", default_rate)?;
        Ok(Self {
            version: 0,
            models: BTreeMap::new(),
            default_rate,
            default_description: DEFAULT_MODEL_DESCRIPTION.to_string(),
            time_limits: TimeLimits::default(),
            responses: CannedResponses::builtin(),
            auto_bands: AutoBands::default(),
            default_length: LengthPolicy::Auto,
        })
    }

    /// Registry used when no configuration file names any models
    pub fn builtin() -> Self {
        let models = [
            ModelProfile::new("gpt-4", "Slow, thorough model").with_rate(5.0),
            ModelProfile::new("gpt-4o", "Fast flagship model").with_rate(40.0),
            ModelProfile::new("gpt-3.5-turbo", "Fast, efficient model").with_rate(15.0),
            ModelProfile::new("llama-2-7b", "Llama 2 7B").with_parameters(7.0),
            ModelProfile::new("llama-2-13b", "Llama 2 13B").with_parameters(13.0),
            ModelProfile::new("llama-2-70b", "Llama 2 70B").with_parameters(70.0),
            ModelProfile::new("mixtral-8x7b", "Mixtral 8x7B").with_parameters(46.7),
        ];
        Self {
            version: 0,
            models: models
                .into_iter()
                .map(|profile| (profile.id.clone(), profile))
                .collect(),
            default_rate: DEFAULT_TOKENS_PER_SECOND,
            default_description: DEFAULT_MODEL_DESCRIPTION.to_string(),
            time_limits: TimeLimits::default(),
            responses: CannedResponses::builtin(),
            auto_bands: AutoBands::default(),
            default_length: LengthPolicy::Auto,
        }
    }

    pub fn with_model(mut self, profile: ModelProfile) -> Result<Self, ConfigError> {
        self.insert_model(profile)?;
        Ok(self)
    }

    pub fn with_default_rate(mut self, rate: f64) -> Result<Self, ConfigError> {
        self.set_default_rate(rate)?;
        Ok(self)
    }

    pub fn with_default_description(mut self, description: impl Into<String>) -> Self {
        self.default_description = description.into();
        self
    }

    pub fn with_time_limits(mut self, limits: TimeLimits) -> Result<Self, ConfigError> {
        check_time_limit("general.max_stream_time_seconds", limits.max_stream_time_seconds)?;
        self.time_limits = limits;
        Ok(self)
    }

    pub fn with_responses(mut self, responses: CannedResponses) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_auto_bands(mut self, bands: AutoBands) -> Self {
        self.auto_bands = bands;
        self
    }

    /// Policy used when a request names no `response_length`
    pub fn with_default_length(mut self, policy: LengthPolicy) -> Self {
        self.default_length = policy;
        self
    }

    fn insert_model(&mut self, profile: ModelProfile) -> Result<(), ConfigError> {
        profile.validate()?;
        self.models.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn set_default_rate(&mut self, rate: f64) -> Result<(), ConfigError> {
        check_rate("default tokens_per_second", rate)?;
        self.default_rate = rate;
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelProfile> {
        self.models.values()
    }

    pub fn model(&self, id: &str) -> Option<&ModelProfile> {
        self.models.get(id)
    }

    pub fn default_rate(&self) -> f64 {
        self.default_rate
    }

    pub fn default_description(&self) -> &str {
        &self.default_description
    }

    pub fn time_limits(&self) -> &TimeLimits {
        &self.time_limits
    }

    pub fn responses(&self) -> &CannedResponses {
        &self.responses
    }

    pub fn auto_bands(&self) -> &AutoBands {
        &self.auto_bands
    }

    pub fn default_length(&self) -> LengthPolicy {
        self.default_length
    }

    /// Emission rate for `model_id`: explicit rate, then the parameter
    /// formula, then the default rate.
    pub fn resolve_rate(&self, model_id: &str) -> f64 {
        self.models
            .get(model_id)
            .and_then(ModelProfile::rate)
            .unwrap_or(self.default_rate)
    }

    /// Registered models and tagged local-model names (`llama3:8b`)
    pub fn accepts(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id) || model_id.contains(':')
    }

    pub fn ensure_accepted(&self, model_id: &str) -> Result<(), PlanError> {
        if self.accepts(model_id) {
            Ok(())
        } else {
            Err(PlanError::ModelNotFound(model_id.to_string()))
        }
    }

    /// Effective budget for one request.
    ///
    /// A request override always applies. Otherwise the model override or the
    /// global limit applies, and only while time limits are enforced.
    pub fn time_budget(
        &self,
        model_id: &str,
        request_override: Option<f64>,
    ) -> Result<TimeBudget, PlanError> {
        let message = self.time_limits.truncation_message.clone();
        if let Some(seconds) = request_override {
            let limit = time_limit(seconds).ok_or_else(|| {
                PlanError::invalid_param(
                    "max_stream_time_seconds",
                    format!(
                        "max_stream_time_seconds must be a positive number of at most {}, got {}",
                        MAX_TIME_LIMIT_SECONDS, seconds
                    ),
                )
            })?;
            return Ok(TimeBudget::limited(limit, message));
        }
        if !self.time_limits.enforce {
            return Ok(TimeBudget::unlimited());
        }
        let seconds = self
            .models
            .get(model_id)
            .and_then(|profile| profile.max_stream_time_seconds)
            .unwrap_or(self.time_limits.max_stream_time_seconds);
        // Stored limits are validated on insert
        let limit = time_limit(seconds).unwrap_or(Duration::MAX);
        Ok(TimeBudget::limited(limit, message))
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Runtime registration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub model: Option<String>,
    pub tokens_per_second: Option<f64>,
    pub parameters: Option<f64>,
    pub description: Option<String>,
    pub max_stream_time_seconds: Option<f64>,
}

impl Registration {
    /// Apply to `snapshot`. On error the snapshot may be partially
    /// modified; callers work on a copy.
    fn apply(&self, snapshot: &mut RegistrySnapshot) -> Result<Option<String>, ConfigError> {
        match (&self.model, self.tokens_per_second, self.parameters) {
            (Some(id), Some(rate), _) => {
                let existed = snapshot.models.contains_key(id);
                let mut profile = snapshot
                    .models
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| ModelProfile::new(id, format!("Custom model {}", id)));
                profile.tokens_per_second = Some(rate);
                self.apply_optional(&mut profile);
                snapshot.insert_model(profile)?;
                Ok(Some(if existed {
                    format!("Tokens per second for model {} updated to {}", id, rate)
                } else {
                    format!("Added new model {} with {} tokens per second", id, rate)
                }))
            }
            (Some(id), None, Some(parameters)) => {
                let existed = snapshot.models.contains_key(id);
                let mut profile = snapshot.models.get(id).cloned().unwrap_or_else(|| {
                    ModelProfile::new(id, format!("Model with {}B parameters", parameters))
                });
                profile.tokens_per_second = None;
                self.apply_optional(&mut profile);
                snapshot.insert_model(profile)?;
                let rate = snapshot.resolve_rate(id);
                Ok(Some(if existed {
                    format!(
                        "Updated {} with {}B parameters, estimated speed: {:.2} tokens/sec",
                        id, parameters, rate
                    )
                } else {
                    format!(
                        "Added model {} with {}B parameters, estimated speed: {:.2} tokens/sec",
                        id, parameters, rate
                    )
                }))
            }
            (Some(id), None, None) if self.max_stream_time_seconds.is_some() || self.description.is_some() => {
                let mut profile = snapshot.models.get(id).cloned().ok_or_else(|| {
                    ConfigError::validation(format!("Model {} is not registered", id))
                })?;
                self.apply_optional(&mut profile);
                snapshot.insert_model(profile)?;
                Ok(Some(format!("Updated settings for model {}", id)))
            }
            (None, Some(rate), _) => {
                snapshot.set_default_rate(rate)?;
                Ok(Some(format!("Default tokens per second updated to {}", rate)))
            }
            _ => Ok(None),
        }
    }

    fn apply_optional(&self, profile: &mut ModelProfile) {
        if let Some(parameters) = self.parameters {
            profile.parameters = Some(parameters);
        }
        if let Some(seconds) = self.max_stream_time_seconds {
            profile.max_stream_time_seconds = Some(seconds);
        }
        if let Some(description) = &self.description {
            profile.description = description.clone();
        }
    }
}

/// Shared, atomically swappable registry
#[derive(Debug)]
pub struct Registry {
    current: ArcSwap<RegistrySnapshot>,
    writer: Mutex<()>,
}

impl Registry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: ArcSwap::from(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    /// The snapshot in effect right now. Holding it pins that version.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Publish a whole new snapshot (reload). Returns the new version.
    pub fn replace(&self, mut snapshot: RegistrySnapshot) -> u64 {
        let _guard = self.lock_writer();
        snapshot.version = self.current.load().version + 1;
        let version = snapshot.version;
        self.current.store(Arc::new(snapshot));
        tracing::info!(version, "Registry replaced");
        version
    }

    /// Apply a registration all-or-nothing.
    pub fn register(&self, registration: &Registration) -> Result<String, ConfigError> {
        let _guard = self.lock_writer();
        let current = self.current.load_full();
        let mut next = RegistrySnapshot::clone(&current);

        match registration.apply(&mut next)? {
            Some(message) => {
                next.version = current.version + 1;
                let version = next.version;
                self.current.store(Arc::new(next));
                tracing::info!(
                    version,
                    model = registration.model.as_deref().unwrap_or("default"),
                    "{}",
                    message
                );
                Ok(message)
            }
            None => Ok("No changes made".to_string()),
        }
    }

    fn lock_writer(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistrySnapshot::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(model: Option<&str>) -> Registration {
        Registration {
            model: model.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_builtin_rates() {
        let snapshot = RegistrySnapshot::builtin();
        assert_eq!(snapshot.resolve_rate("gpt-4"), 5.0);
        assert_eq!(snapshot.resolve_rate("unknown-model"), DEFAULT_TOKENS_PER_SECOND);
        let llama = snapshot.resolve_rate("llama-2-7b");
        assert!(llama > 8.0 && llama < 9.0, "{llama}");
        assert!(snapshot.resolve_rate("llama-2-70b") < llama);
    }

    #[test]
    fn test_explicit_rate_beats_parameters() {
        let snapshot = RegistrySnapshot::new(10.0)
            .unwrap()
            .with_model(
                ModelProfile::new("big", "")
                    .with_parameters(70.0)
                    .with_rate(18.0),
            )
            .unwrap();
        assert_eq!(snapshot.resolve_rate("big"), 18.0);
    }

    #[test]
    fn test_tagged_models_are_accepted() {
        let snapshot = RegistrySnapshot::builtin();
        assert!(snapshot.accepts("gpt-4"));
        assert!(snapshot.accepts("llama3:8b"));
        assert!(!snapshot.accepts("gpt-9"));
        assert_eq!(snapshot.resolve_rate("llama3:8b"), DEFAULT_TOKENS_PER_SECOND);
        assert!(matches!(
            snapshot.ensure_accepted("gpt-9"),
            Err(PlanError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_profiles_rejected() {
        let base = RegistrySnapshot::builtin;
        assert!(base().with_model(ModelProfile::new("m", "").with_rate(-1.0)).is_err());
        assert!(base().with_model(ModelProfile::new("m", "").with_rate(0.0)).is_err());
        assert!(base().with_model(ModelProfile::new("m", "").with_parameters(0.0)).is_err());
        assert!(base()
            .with_model(ModelProfile::new("m", "").with_max_stream_time(-5.0))
            .is_err());
        assert!(RegistrySnapshot::new(f64::NAN).is_err());
    }

    #[test]
    fn test_time_budget_disabled_by_default() {
        let snapshot = RegistrySnapshot::builtin();
        assert_eq!(snapshot.time_budget("gpt-4", None).unwrap(), TimeBudget::unlimited());
    }

    #[test]
    fn test_time_budget_resolution_order() {
        let snapshot = RegistrySnapshot::builtin()
            .with_time_limits(TimeLimits {
                max_stream_time_seconds: 5.0,
                enforce: true,
                truncation_message: "[cut]".to_string(),
            })
            .unwrap()
            .with_model(ModelProfile::new("quick", "").with_rate(50.0).with_max_stream_time(2.0))
            .unwrap();

        let global = snapshot.time_budget("gpt-4", None).unwrap();
        assert_eq!(global.limit(), Some(Duration::from_secs(5)));
        assert_eq!(global.truncation_message(), "[cut]");

        let model = snapshot.time_budget("quick", None).unwrap();
        assert_eq!(model.limit(), Some(Duration::from_secs(2)));

        let request = snapshot.time_budget("quick", Some(1.5)).unwrap();
        assert_eq!(request.limit(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_request_override_enables_budget() {
        let snapshot = RegistrySnapshot::builtin();
        let budget = snapshot.time_budget("gpt-4", Some(3.0)).unwrap();
        assert_eq!(budget.limit(), Some(Duration::from_secs(3)));
        assert!(snapshot.time_budget("gpt-4", Some(0.0)).is_err());
        assert!(snapshot.time_budget("gpt-4", Some(-2.0)).is_err());
    }

    #[test]
    fn test_register_updates_existing_rate() {
        let registry = Registry::default();
        let message = registry
            .register(&Registration {
                tokens_per_second: Some(12.0),
                ..registration(Some("gpt-4"))
            })
            .unwrap();
        assert!(message.contains("updated to 12"));
        assert_eq!(registry.snapshot().resolve_rate("gpt-4"), 12.0);
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_register_adds_new_model() {
        let registry = Registry::default();
        registry
            .register(&Registration {
                tokens_per_second: Some(30.0),
                description: Some("My model".to_string()),
                ..registration(Some("custom"))
            })
            .unwrap();
        let snapshot = registry.snapshot();
        let profile = snapshot.model("custom").unwrap();
        assert_eq!(profile.description, "My model");
        assert_eq!(snapshot.resolve_rate("custom"), 30.0);
    }

    #[test]
    fn test_register_parameters_clears_explicit_rate() {
        let registry = Registry::default();
        registry
            .register(&Registration {
                parameters: Some(7.0),
                ..registration(Some("gpt-4"))
            })
            .unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.model("gpt-4").unwrap().tokens_per_second, None);
        assert_eq!(
            snapshot.resolve_rate("gpt-4"),
            rate_from_parameters(7.0).unwrap()
        );
    }

    #[test]
    fn test_register_default_rate() {
        let registry = Registry::default();
        registry
            .register(&Registration {
                tokens_per_second: Some(42.0),
                ..registration(None)
            })
            .unwrap();
        assert_eq!(registry.snapshot().default_rate(), 42.0);
    }

    #[test]
    fn test_invalid_registration_leaves_registry_untouched() {
        let registry = Registry::default();
        let before = registry.snapshot();

        let err = registry
            .register(&Registration {
                tokens_per_second: Some(-3.0),
                ..registration(Some("gpt-4"))
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        assert!(registry
            .register(&Registration {
                parameters: Some(0.0),
                ..registration(Some("new-model"))
            })
            .is_err());
        assert!(registry
            .register(&Registration {
                max_stream_time_seconds: Some(5.0),
                ..registration(Some("missing"))
            })
            .is_err());

        let after = registry.snapshot();
        assert_eq!(after.version(), before.version());
        assert_eq!(*after, *before);
        assert!(after.model("new-model").is_none());
    }

    #[test]
    fn test_empty_registration_is_a_no_op() {
        let registry = Registry::default();
        let message = registry.register(&Registration::default()).unwrap();
        assert_eq!(message, "No changes made");
        assert_eq!(registry.version(), 0);
    }

    #[test]
    fn test_held_snapshot_survives_replace() {
        let registry = Registry::default();
        let pinned = registry.snapshot();

        let replacement = RegistrySnapshot::new(99.0).unwrap();
        let version = registry.replace(replacement);

        assert_eq!(version, 1);
        assert_eq!(pinned.resolve_rate("gpt-4"), 5.0);
        assert_eq!(registry.snapshot().resolve_rate("gpt-4"), 99.0);
        assert!(!registry.snapshot().accepts("gpt-4"));
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let registry = Arc::new(Registry::default());
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 1..=50 {
                    let rate = i as f64;
                    let snapshot = RegistrySnapshot::new(rate)
                        .unwrap()
                        .with_model(ModelProfile::new("m", "").with_rate(rate))
                        .unwrap();
                    registry.replace(snapshot);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = registry.snapshot();
            if snapshot.version() > 0 {
                assert_eq!(snapshot.resolve_rate("m"), snapshot.default_rate());
            }
        }
        writer.join().unwrap();
        assert_eq!(registry.version(), 50);
    }

    #[test]
    fn test_oversized_request_budget_is_invalid() {
        let snapshot = RegistrySnapshot::builtin();
        for seconds in [1e30, f64::INFINITY, MAX_TIME_LIMIT_SECONDS * 2.0] {
            let err = snapshot.time_budget("gpt-4", Some(seconds)).unwrap_err();
            assert!(matches!(err, PlanError::InvalidRequest { .. }), "{seconds}");
        }
        let budget = snapshot
            .time_budget("gpt-4", Some(MAX_TIME_LIMIT_SECONDS))
            .unwrap();
        assert_eq!(
            budget.limit(),
            Some(Duration::from_secs(MAX_TIME_LIMIT_SECONDS as u64))
        );
    }

    #[test]
    fn test_oversized_time_limits_are_rejected() {
        let registry = Registry::default();
        let registration = Registration {
            max_stream_time_seconds: Some(1e30),
            ..registration(Some("gpt-4"))
        };
        assert!(registry.register(&registration).is_err());
        assert_eq!(registry.version(), 0);
        assert_eq!(
            registry.snapshot().model("gpt-4").unwrap().max_stream_time_seconds,
            None
        );

        let global = RegistrySnapshot::builtin().with_time_limits(TimeLimits {
            max_stream_time_seconds: 1e30,
            enforce: true,
            truncation_message: String::new(),
        });
        assert!(matches!(global, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_vanishing_rates_are_rejected() {
        let registry = Registry::default();
        let model = Registration {
            tokens_per_second: Some(1e-20),
            ..registration(Some("glacial"))
        };
        assert!(registry.register(&model).is_err());
        assert!(!registry.snapshot().accepts("glacial"));

        let default = Registration {
            tokens_per_second: Some(1e-20),
            ..registration(None)
        };
        assert!(registry.register(&default).is_err());
        assert_eq!(registry.snapshot().default_rate(), DEFAULT_TOKENS_PER_SECOND);
        assert!(RegistrySnapshot::new(1e-20).is_err());
        assert!(RegistrySnapshot::new(MIN_TOKENS_PER_SECOND).is_ok());
    }
}
