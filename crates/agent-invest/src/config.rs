//! Configuration for the analysis pipeline

use agent_utils::{env_duration_secs, env_parse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::AnalysisKind;
use crate::error::{PipelineError, Result};

/// Time added on top of the critical path when the deadline is derived
pub const ORCHESTRATION_OVERHEAD: Duration = Duration::from_secs(40);

/// Hard ceiling for the confidence of a data-only recommendation
pub const MINIMAL_CONFIDENCE_CEILING: f64 = 20.0;

/// Configuration for analysis runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub data_collection_timeout: Duration,
    pub fundamental_timeout: Duration,
    pub technical_timeout: Duration,
    pub sentiment_timeout: Duration,
    pub risk_assessment_timeout: Duration,
    pub strategy_generation_timeout: Duration,

    /// Overall budget for one run
    pub run_deadline: Duration,

    /// How long an interrupted analyzer may keep running after cancellation
    pub grace_period: Duration,

    /// Multiplier applied to strategy confidence per failed sub-analysis
    pub confidence_penalty: f64,

    /// Upper bound for confidence of a majority-vote recommendation
    pub fallback_confidence_cap: f64,

    /// Confidence of a recommendation built from base data alone
    pub minimal_confidence: f64,

    /// Scores at or above this lean buy
    pub buy_threshold: f64,

    /// Scores at or below this lean sell
    pub sell_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_collection_timeout: Duration::from_secs(30),
            fundamental_timeout: Duration::from_secs(45),
            technical_timeout: Duration::from_secs(45),
            sentiment_timeout: Duration::from_secs(45),
            risk_assessment_timeout: Duration::from_secs(20),
            strategy_generation_timeout: Duration::from_secs(15),
            run_deadline: Duration::from_secs(150),
            grace_period: Duration::from_secs(2),
            confidence_penalty: 0.8,
            fallback_confidence_cap: 60.0,
            minimal_confidence: 10.0,
            buy_threshold: 60.0,
            sell_threshold: 40.0,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Defaults overlaid with `INVEST_*` environment variables
    ///
    /// `INVEST_ANALYSIS_TIMEOUT_SECS` applies to all three sub-analyses.
    /// When stage timeouts are overridden but the deadline is not, the
    /// deadline is derived from the new critical path.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(timeout) = env_duration_secs("INVEST_DATA_COLLECTION_TIMEOUT_SECS")? {
            builder = builder.data_collection_timeout(timeout);
        }
        if let Some(timeout) = env_duration_secs("INVEST_ANALYSIS_TIMEOUT_SECS")? {
            builder = builder.analysis_timeout(timeout);
        }
        if let Some(timeout) = env_duration_secs("INVEST_RISK_TIMEOUT_SECS")? {
            builder = builder.risk_assessment_timeout(timeout);
        }
        if let Some(timeout) = env_duration_secs("INVEST_STRATEGY_TIMEOUT_SECS")? {
            builder = builder.strategy_generation_timeout(timeout);
        }
        if let Some(deadline) = env_duration_secs("INVEST_RUN_DEADLINE_SECS")? {
            builder = builder.run_deadline(deadline);
        }
        if let Some(penalty) = env_parse::<f64>("INVEST_CONFIDENCE_PENALTY")? {
            builder = builder.confidence_penalty(penalty);
        }

        builder.build()
    }

    /// Time budget for one task of the given kind
    pub fn timeout_for(&self, kind: AnalysisKind) -> Duration {
        match kind {
            AnalysisKind::DataCollection => self.data_collection_timeout,
            AnalysisKind::Fundamental => self.fundamental_timeout,
            AnalysisKind::Technical => self.technical_timeout,
            AnalysisKind::Sentiment => self.sentiment_timeout,
            AnalysisKind::RiskAssessment => self.risk_assessment_timeout,
            AnalysisKind::StrategyGeneration => self.strategy_generation_timeout,
        }
    }

    /// Longest chain of stage timeouts through the pipeline
    pub fn critical_path(&self) -> Duration {
        let parallel_stage = self
            .fundamental_timeout
            .max(self.technical_timeout)
            .max(self.sentiment_timeout);
        self.data_collection_timeout
            + parallel_stage
            + self.risk_assessment_timeout
            + self.strategy_generation_timeout
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for kind in AnalysisKind::ALL {
            if self.timeout_for(kind).is_zero() {
                return Err(PipelineError::Config(format!(
                    "timeout for {kind} must be positive"
                )));
            }
        }

        if self.run_deadline < self.critical_path() {
            return Err(PipelineError::Config(format!(
                "run deadline {:?} is shorter than the critical path {:?}",
                self.run_deadline,
                self.critical_path()
            )));
        }

        if !(self.confidence_penalty > 0.0 && self.confidence_penalty <= 1.0) {
            return Err(PipelineError::Config(format!(
                "confidence penalty must be in (0, 1], got {}",
                self.confidence_penalty
            )));
        }

        for (name, value) in [
            ("fallback confidence cap", self.fallback_confidence_cap),
            ("minimal confidence", self.minimal_confidence),
            ("buy threshold", self.buy_threshold),
            ("sell threshold", self.sell_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }

        if self.minimal_confidence > MINIMAL_CONFIDENCE_CEILING {
            return Err(PipelineError::Config(format!(
                "minimal confidence must not exceed {MINIMAL_CONFIDENCE_CEILING}"
            )));
        }

        if self.sell_threshold >= self.buy_threshold {
            return Err(PipelineError::Config(
                "sell threshold must be below buy threshold".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    data_collection_timeout: Option<Duration>,
    fundamental_timeout: Option<Duration>,
    technical_timeout: Option<Duration>,
    sentiment_timeout: Option<Duration>,
    risk_assessment_timeout: Option<Duration>,
    strategy_generation_timeout: Option<Duration>,
    run_deadline: Option<Duration>,
    grace_period: Option<Duration>,
    confidence_penalty: Option<f64>,
    fallback_confidence_cap: Option<f64>,
    minimal_confidence: Option<f64>,
    buy_threshold: Option<f64>,
    sell_threshold: Option<f64>,
}

impl PipelineConfigBuilder {
    pub fn data_collection_timeout(mut self, timeout: Duration) -> Self {
        self.data_collection_timeout = Some(timeout);
        self
    }

    pub fn fundamental_timeout(mut self, timeout: Duration) -> Self {
        self.fundamental_timeout = Some(timeout);
        self
    }

    pub fn technical_timeout(mut self, timeout: Duration) -> Self {
        self.technical_timeout = Some(timeout);
        self
    }

    pub fn sentiment_timeout(mut self, timeout: Duration) -> Self {
        self.sentiment_timeout = Some(timeout);
        self
    }

    /// Set the same timeout for fundamental, technical and sentiment
    pub fn analysis_timeout(self, timeout: Duration) -> Self {
        self.fundamental_timeout(timeout)
            .technical_timeout(timeout)
            .sentiment_timeout(timeout)
    }

    pub fn risk_assessment_timeout(mut self, timeout: Duration) -> Self {
        self.risk_assessment_timeout = Some(timeout);
        self
    }

    pub fn strategy_generation_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_generation_timeout = Some(timeout);
        self
    }

    /// Set the overall run deadline
    pub fn run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = Some(deadline);
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = Some(grace);
        self
    }

    pub fn confidence_penalty(mut self, factor: f64) -> Self {
        self.confidence_penalty = Some(factor);
        self
    }

    pub fn fallback_confidence_cap(mut self, cap: f64) -> Self {
        self.fallback_confidence_cap = Some(cap);
        self
    }

    pub fn minimal_confidence(mut self, confidence: f64) -> Self {
        self.minimal_confidence = Some(confidence);
        self
    }

    /// Set the buy and sell score thresholds
    pub fn signal_thresholds(mut self, buy: f64, sell: f64) -> Self {
        self.buy_threshold = Some(buy);
        self.sell_threshold = Some(sell);
        self
    }

    /// Build the configuration
    ///
    /// Without an explicit deadline, any stage timeout override moves the
    /// deadline to the new critical path plus [`ORCHESTRATION_OVERHEAD`].
    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        let stages_overridden = self.data_collection_timeout.is_some()
            || self.fundamental_timeout.is_some()
            || self.technical_timeout.is_some()
            || self.sentiment_timeout.is_some()
            || self.risk_assessment_timeout.is_some()
            || self.strategy_generation_timeout.is_some();

        let mut config = PipelineConfig {
            data_collection_timeout: self
                .data_collection_timeout
                .unwrap_or(defaults.data_collection_timeout),
            fundamental_timeout: self.fundamental_timeout.unwrap_or(defaults.fundamental_timeout),
            technical_timeout: self.technical_timeout.unwrap_or(defaults.technical_timeout),
            sentiment_timeout: self.sentiment_timeout.unwrap_or(defaults.sentiment_timeout),
            risk_assessment_timeout: self
                .risk_assessment_timeout
                .unwrap_or(defaults.risk_assessment_timeout),
            strategy_generation_timeout: self
                .strategy_generation_timeout
                .unwrap_or(defaults.strategy_generation_timeout),
            run_deadline: defaults.run_deadline,
            grace_period: self.grace_period.unwrap_or(defaults.grace_period),
            confidence_penalty: self.confidence_penalty.unwrap_or(defaults.confidence_penalty),
            fallback_confidence_cap: self
                .fallback_confidence_cap
                .unwrap_or(defaults.fallback_confidence_cap),
            minimal_confidence: self.minimal_confidence.unwrap_or(defaults.minimal_confidence),
            buy_threshold: self.buy_threshold.unwrap_or(defaults.buy_threshold),
            sell_threshold: self.sell_threshold.unwrap_or(defaults.sell_threshold),
        };

        config.run_deadline = match self.run_deadline {
            Some(deadline) => deadline,
            None if stages_overridden => config.critical_path() + ORCHESTRATION_OVERHEAD,
            None => defaults.run_deadline,
        };

        config.validate()?;
        Ok(config)
    }
}
