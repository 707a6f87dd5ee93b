// Response Selector Module
// Resolves a length policy and an emission rate into the exact token sequence
// to emit. Pure planning: no clocks, no I/O.

use crate::errors::{ConfigError, PlanError};
use crate::scheduler::FinishReason;
use crate::tokens::split_tokens;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Upper bound on a duration-derived plan; longer requests are clamped
pub const MAX_PLAN_TOKENS: usize = 1_000_000;

/// Size tag of a canned response body
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LengthTag {
    Short,
    Medium,
    Long,
    VeryLong,
}

impl LengthTag {
    pub const ALL: [LengthTag; 4] = [
        LengthTag::Short,
        LengthTag::Medium,
        LengthTag::Long,
        LengthTag::VeryLong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthTag::Short => "short",
            LengthTag::Medium => "medium",
            LengthTag::Long => "long",
            LengthTag::VeryLong => "very_long",
        }
    }
}

impl fmt::Display for LengthTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LengthTag {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LengthTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| {
                PlanError::invalid_param(
                    "response_length",
                    format!(
                        "Unknown response length '{}'; expected one of short, medium, long, very_long, random, auto",
                        s
                    ),
                )
            })
    }
}

/// How long the response should be
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LengthPolicy {
    /// A specific canned body
    Fixed(LengthTag),
    /// Pick a body from the rate bands
    Auto,
    /// Pick any canned body uniformly
    Random,
    /// Emit enough tokens to stream for this many seconds
    Duration(f64),
}

impl LengthPolicy {
    /// Duration policy; the duration must be positive and finite.
    pub fn duration(seconds: f64) -> Result<Self, PlanError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(PlanError::invalid_param(
                "duration_seconds",
                format!("duration_seconds must be a positive number, got {}", seconds),
            ));
        }
        Ok(LengthPolicy::Duration(seconds))
    }
}

impl FromStr for LengthPolicy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(LengthPolicy::Auto),
            "random" => Ok(LengthPolicy::Random),
            tag => tag.parse().map(LengthPolicy::Fixed),
        }
    }
}

impl fmt::Display for LengthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthPolicy::Fixed(tag) => write!(f, "{}", tag),
            LengthPolicy::Auto => f.write_str("auto"),
            LengthPolicy::Random => f.write_str("random"),
            LengthPolicy::Duration(seconds) => write!(f, "{}s", seconds),
        }
    }
}

/// One rate band of the `auto` policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBand {
    pub name: String,
    /// Inclusive upper bound of the band, tokens per second
    pub max_tokens_per_second: f64,
    pub response_length: LengthTag,
}

impl AutoBand {
    pub fn new(name: impl Into<String>, max_tokens_per_second: f64, length: LengthTag) -> Self {
        Self {
            name: name.into(),
            max_tokens_per_second,
            response_length: length,
        }
    }
}

/// Rate bands of the `auto` policy, ascending by threshold
#[derive(Debug, Clone, PartialEq)]
pub struct AutoBands {
    bands: Vec<AutoBand>,
}

impl AutoBands {
    pub fn new(mut bands: Vec<AutoBand>) -> Result<Self, ConfigError> {
        if bands.is_empty() {
            return Err(ConfigError::validation(
                "auto_response_length needs at least one band",
            ));
        }
        if let Some(band) = bands
            .iter()
            .find(|band| band.max_tokens_per_second.is_nan() || band.max_tokens_per_second <= 0.0)
        {
            return Err(ConfigError::validation(format!(
                "auto band '{}' must have a positive max_tokens_per_second",
                band.name
            )));
        }
        bands.sort_by(|a, b| a.max_tokens_per_second.total_cmp(&b.max_tokens_per_second));
        Ok(Self { bands })
    }

    /// First band whose threshold is at or above `rate`; the last band
    /// catches rates above every threshold.
    pub fn select(&self, rate: f64) -> LengthTag {
        self.bands
            .iter()
            .find(|band| rate <= band.max_tokens_per_second)
            .or_else(|| self.bands.last())
            .map(|band| band.response_length)
            .unwrap_or(LengthTag::Medium)
    }

    pub fn bands(&self) -> &[AutoBand] {
        &self.bands
    }
}

impl Default for AutoBands {
    fn default() -> Self {
        Self {
            bands: vec![
                AutoBand::new("slow", 3.0, LengthTag::Short),
                AutoBand::new("medium", 37.0, LengthTag::Medium),
                AutoBand::new("long", 77.0, LengthTag::Long),
                AutoBand::new("fast", f64::INFINITY, LengthTag::VeryLong),
            ],
        }
    }
}

/// A canned response body and its token pieces
#[derive(Debug, Clone, PartialEq)]
pub struct CannedBody {
    text: String,
    tokens: Vec<String>,
}

impl CannedBody {
    pub fn new(text: impl Into<String>) -> Result<Self, ConfigError> {
        let text = text.into().trim().to_string();
        let tokens = split_tokens(&text);
        if tokens.is_empty() {
            return Err(ConfigError::validation("canned response body is empty"));
        }
        Ok(Self { text, tokens })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

/// Canned bodies keyed by length tag
#[derive(Debug, Clone, PartialEq)]
pub struct CannedResponses {
    bodies: BTreeMap<LengthTag, CannedBody>,
}

impl CannedResponses {
    /// Bodies shipped with the crate
    pub fn builtin() -> Self {
        let sources = [
            (LengthTag::Short, include_str!("../assets/responses/short.txt")),
            (LengthTag::Medium, include_str!("../assets/responses/medium.txt")),
            (LengthTag::Long, include_str!("../assets/responses/long.txt")),
            (LengthTag::VeryLong, include_str!("../assets/responses/very_long.txt")),
        ];
        let bodies = sources
            .into_iter()
            .map(|(tag, text)| {
                let text = text.trim();
                let body = CannedBody {
                    text: text.to_string(),
                    tokens: split_tokens(text),
                };
                (tag, body)
            })
            .collect();
        Self { bodies }
    }

    /// Build a table from explicit bodies
    pub fn from_bodies<I, S>(bodies: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (LengthTag, S)>,
        S: Into<String>,
    {
        let mut table = BTreeMap::new();
        for (tag, text) in bodies {
            let body = CannedBody::new(text).map_err(|_| {
                ConfigError::validation(format!("canned response '{}' is empty", tag))
            })?;
            table.insert(tag, body);
        }
        if table.is_empty() {
            return Err(ConfigError::validation("at least one canned response is required"));
        }
        Ok(Self { bodies: table })
    }

    /// Replace one body, keeping the others
    pub fn with_body(mut self, tag: LengthTag, text: impl Into<String>) -> Result<Self, ConfigError> {
        let body = CannedBody::new(text)
            .map_err(|_| ConfigError::validation(format!("canned response '{}' is empty", tag)))?;
        self.bodies.insert(tag, body);
        Ok(self)
    }

    pub fn get(&self, tag: LengthTag) -> Option<&CannedBody> {
        self.bodies.get(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LengthTag, &CannedBody)> {
        self.bodies.iter().map(|(tag, body)| (*tag, body))
    }

    /// Body with the most tokens; ties go to the larger tag
    pub fn longest(&self) -> Option<(LengthTag, &CannedBody)> {
        self.iter().max_by_key(|(_, body)| body.token_count())
    }
}

impl Default for CannedResponses {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The ordered token sequence selected for one request, before truncation
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPlan {
    tokens: Vec<String>,
    source: LengthTag,
}

impl TokenPlan {
    /// Build a plan from explicit tokens. Returns `None` for an empty sequence.
    pub fn new(tokens: Vec<String>, source: LengthTag) -> Option<Self> {
        (!tokens.is_empty()).then_some(Self { tokens, source })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Canned body the tokens came from
    pub fn source(&self) -> LengthTag {
        self.source
    }

    /// Finish reason when every token is emitted
    pub fn natural_finish(&self) -> FinishReason {
        FinishReason::Stop
    }

    /// The full planned text
    pub fn content(&self) -> String {
        self.tokens.concat()
    }
}

/// Picks and slices canned bodies
#[derive(Debug, Clone, Copy)]
pub struct ResponseSelector<'a> {
    bodies: &'a CannedResponses,
    bands: &'a AutoBands,
}

impl<'a> ResponseSelector<'a> {
    pub fn new(bodies: &'a CannedResponses, bands: &'a AutoBands) -> Self {
        Self { bodies, bands }
    }

    pub fn select<R: Rng + ?Sized>(
        &self,
        policy: LengthPolicy,
        rate: f64,
        rng: &mut R,
    ) -> Result<TokenPlan, PlanError> {
        match policy {
            LengthPolicy::Fixed(tag) => self.fixed(tag),
            LengthPolicy::Random => {
                let tags: Vec<LengthTag> = self.bodies.iter().map(|(tag, _)| tag).collect();
                let tag = tags[rng.random_range(0..tags.len())];
                self.fixed(tag)
            }
            LengthPolicy::Auto => self.fixed(self.bands.select(rate)),
            LengthPolicy::Duration(seconds) => self.for_duration(seconds, rate),
        }
    }

    fn fixed(&self, tag: LengthTag) -> Result<TokenPlan, PlanError> {
        let body = self.bodies.get(tag).ok_or_else(|| {
            PlanError::invalid_param(
                "response_length",
                format!("No canned response is configured for '{}'", tag),
            )
        })?;
        Ok(TokenPlan {
            tokens: body.tokens().to_vec(),
            source: tag,
        })
    }

    fn for_duration(&self, seconds: f64, rate: f64) -> Result<TokenPlan, PlanError> {
        let policy = LengthPolicy::duration(seconds)?;
        let desired = (seconds * rate).round();
        let mut count = if desired.is_finite() && desired >= 1.0 {
            desired as usize
        } else {
            1
        };
        if count > MAX_PLAN_TOKENS {
            tracing::warn!(
                %policy,
                rate,
                requested = count,
                limit = MAX_PLAN_TOKENS,
                "Duration plan clamped"
            );
            count = MAX_PLAN_TOKENS;
        }

        let (tag, body) = self
            .bodies
            .longest()
            .ok_or_else(|| PlanError::invalid("No canned responses are configured"))?;
        Ok(TokenPlan {
            tokens: cycle_tokens(body.tokens(), count),
            source: tag,
        })
    }
}

/// Take `count` pieces from `tokens`, repeating the body as needed.
/// A repetition that would glue onto the previous word gets a space.
fn cycle_tokens(tokens: &[String], count: usize) -> Vec<String> {
    let len = tokens.len();
    (0..count)
        .map(|i| {
            let piece = &tokens[i % len];
            let wraps = i >= len && i % len == 0;
            if wraps && !piece.starts_with(char::is_whitespace) {
                format!(" {}", piece)
            } else {
                piece.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::estimate_tokens;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_bodies() -> CannedResponses {
        CannedResponses::from_bodies([
            (LengthTag::Short, "one two three"),
            (LengthTag::Medium, "alpha beta gamma delta epsilon"),
        ])
        .unwrap()
    }

    #[test]
    fn test_builtin_body_sizes() {
        let bodies = CannedResponses::builtin();
        assert_eq!(bodies.get(LengthTag::Short).unwrap().token_count(), 25);
        assert_eq!(bodies.get(LengthTag::VeryLong).unwrap().token_count(), 1500);
        let medium = bodies.get(LengthTag::Medium).unwrap().token_count();
        let long = bodies.get(LengthTag::Long).unwrap().token_count();
        assert!(25 < medium && medium < long && long < 1500);
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!("auto".parse::<LengthPolicy>().unwrap(), LengthPolicy::Auto);
        assert_eq!("random".parse::<LengthPolicy>().unwrap(), LengthPolicy::Random);
        assert_eq!(
            "very_long".parse::<LengthPolicy>().unwrap(),
            LengthPolicy::Fixed(LengthTag::VeryLong)
        );
    }

    #[test]
    fn test_unknown_tag_is_invalid_request() {
        let err = "enormous".parse::<LengthPolicy>().unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("enormous"));
    }

    #[test]
    fn test_non_positive_duration_is_invalid_request() {
        assert!(LengthPolicy::duration(0.0).is_err());
        assert!(LengthPolicy::duration(-1.0).is_err());
        assert!(LengthPolicy::duration(f64::NAN).is_err());
        assert_eq!(LengthPolicy::duration(2.5).unwrap(), LengthPolicy::Duration(2.5));
    }

    #[test]
    fn test_fixed_selection_tokenizes_whole_body() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let mut rng = StdRng::seed_from_u64(7);
        let plan = ResponseSelector::new(&bodies, &bands)
            .select(LengthPolicy::Fixed(LengthTag::Medium), 10.0, &mut rng)
            .unwrap();
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.content(), "alpha beta gamma delta epsilon");
        assert_eq!(plan.len(), estimate_tokens(&plan.content()));
        assert_eq!(plan.natural_finish(), FinishReason::Stop);
    }

    #[test]
    fn test_missing_body_is_invalid_request() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let mut rng = StdRng::seed_from_u64(7);
        let err = ResponseSelector::new(&bodies, &bands)
            .select(LengthPolicy::Fixed(LengthTag::Long), 10.0, &mut rng)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidRequest { .. }));
    }

    #[test]
    fn test_random_selects_configured_bodies() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let selector = ResponseSelector::new(&bodies, &bands);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..64 {
            let plan = selector.select(LengthPolicy::Random, 10.0, &mut rng).unwrap();
            seen.insert(plan.source());
        }
        let expected: std::collections::BTreeSet<_> =
            [LengthTag::Short, LengthTag::Medium].into_iter().collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_auto_band_boundary_takes_lower_band() {
        let bands = AutoBands::new(vec![
            AutoBand::new("medium", 7.0, LengthTag::Medium),
            AutoBand::new("slow", 3.0, LengthTag::Short),
        ])
        .unwrap();
        assert_eq!(bands.select(3.0), LengthTag::Short);
        assert_eq!(bands.select(2.9), LengthTag::Short);
        assert_eq!(bands.select(3.01), LengthTag::Medium);
        assert_eq!(bands.select(7.0), LengthTag::Medium);
    }

    #[test]
    fn test_auto_rate_above_all_bands_takes_last() {
        let bands = AutoBands::new(vec![
            AutoBand::new("slow", 3.0, LengthTag::Short),
            AutoBand::new("medium", 7.0, LengthTag::Medium),
        ])
        .unwrap();
        assert_eq!(bands.select(500.0), LengthTag::Medium);
    }

    #[test]
    fn test_default_bands() {
        let bands = AutoBands::default();
        assert_eq!(bands.select(1.0), LengthTag::Short);
        assert_eq!(bands.select(5.0), LengthTag::Medium);
        assert_eq!(bands.select(50.0), LengthTag::Long);
        assert_eq!(bands.select(100.0), LengthTag::VeryLong);
    }

    #[test]
    fn test_invalid_bands() {
        assert!(AutoBands::new(vec![]).is_err());
        assert!(AutoBands::new(vec![AutoBand::new("bad", f64::NAN, LengthTag::Short)]).is_err());
        assert!(AutoBands::new(vec![AutoBand::new("bad", 0.0, LengthTag::Short)]).is_err());
    }

    #[test]
    fn test_duration_takes_prefix_of_longest_body() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let mut rng = StdRng::seed_from_u64(1);
        // round(0.6 * 5) = 3
        let plan = ResponseSelector::new(&bodies, &bands)
            .select(LengthPolicy::Duration(0.6), 5.0, &mut rng)
            .unwrap();
        assert_eq!(plan.source(), LengthTag::Medium);
        assert_eq!(plan.content(), "alpha beta gamma");
    }

    #[test]
    fn test_duration_cycles_short_bodies() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let mut rng = StdRng::seed_from_u64(1);
        let plan = ResponseSelector::new(&bodies, &bands)
            .select(LengthPolicy::Duration(10.0), 7.0, &mut rng)
            .unwrap();
        assert_eq!(plan.len(), 70);
        assert_eq!(estimate_tokens(&plan.content()), 70);
        assert!(plan
            .content()
            .starts_with("alpha beta gamma delta epsilon alpha beta"));
    }

    #[test]
    fn test_tiny_duration_still_emits_one_token() {
        let bodies = small_bodies();
        let bands = AutoBands::default();
        let mut rng = StdRng::seed_from_u64(1);
        let plan = ResponseSelector::new(&bodies, &bands)
            .select(LengthPolicy::Duration(0.01), 1.0, &mut rng)
            .unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_empty_body_rejected() {
        assert!(CannedResponses::from_bodies([(LengthTag::Short, "   ")]).is_err());
        assert!(CannedResponses::builtin()
            .with_body(LengthTag::Long, "")
            .is_err());
    }

    #[test]
    fn test_token_plan_rejects_empty() {
        assert!(TokenPlan::new(vec![], LengthTag::Short).is_none());
        assert_eq!(
            TokenPlan::new(vec!["a".to_string()], LengthTag::Short)
                .unwrap()
                .len(),
            1
        );
    }
}
