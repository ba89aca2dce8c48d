//! Analysis requests and the vocabulary they are written in

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// The six analyzer kinds a run is made of
///
/// Declaration order follows the pipeline stages, which also makes the
/// derived `Ord` a stable iteration order for sets and maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    DataCollection,
    Fundamental,
    Technical,
    Sentiment,
    RiskAssessment,
    StrategyGeneration,
}

impl AnalysisKind {
    /// Every kind, in stage order
    pub const ALL: [AnalysisKind; 6] = [
        AnalysisKind::DataCollection,
        AnalysisKind::Fundamental,
        AnalysisKind::Technical,
        AnalysisKind::Sentiment,
        AnalysisKind::RiskAssessment,
        AnalysisKind::StrategyGeneration,
    ];

    /// The kinds a caller may request
    pub const SUB_ANALYSES: [AnalysisKind; 3] = [
        AnalysisKind::Fundamental,
        AnalysisKind::Technical,
        AnalysisKind::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataCollection => "data_collection",
            Self::Fundamental => "fundamental",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
            Self::RiskAssessment => "risk_assessment",
            Self::StrategyGeneration => "strategy_generation",
        }
    }

    /// Whether this is one of the independently requestable analyses
    pub fn is_sub_analysis(&self) -> bool {
        matches!(self, Self::Fundamental | Self::Technical | Self::Sentiment)
    }

    /// Dispatch priority; earlier stages rank higher
    pub fn priority(&self) -> u8 {
        match self {
            Self::DataCollection => 3,
            Self::Fundamental | Self::Technical | Self::Sentiment => 2,
            Self::RiskAssessment => 1,
            Self::StrategyGeneration => 0,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        AnalysisKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| PipelineError::InvalidRequest(format!("unknown analysis kind '{s}'")))
    }
}

/// How much risk the requester is willing to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

impl FromStr for RiskTolerance {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown risk tolerance '{other}'"
            ))),
        }
    }
}

/// Intended holding period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingHorizon {
    Short,
    #[default]
    Medium,
    Long,
}

impl HoldingHorizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl FromStr for HoldingHorizon {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown holding horizon '{other}'"
            ))),
        }
    }
}

/// Requester's investing experience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner,
    #[default]
    Intermediate,
    Expert,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }
}

/// The requester's risk profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RiskProfile {
    pub risk_tolerance: RiskTolerance,
    pub holding_horizon: HoldingHorizon,
    pub experience: ExperienceLevel,
}

impl RiskProfile {
    pub fn new(
        risk_tolerance: RiskTolerance,
        holding_horizon: HoldingHorizon,
        experience: ExperienceLevel,
    ) -> Self {
        Self {
            risk_tolerance,
            holding_horizon,
            experience,
        }
    }

    /// Profile with the given tolerance and default horizon and experience
    pub fn with_tolerance(risk_tolerance: RiskTolerance) -> Self {
        Self {
            risk_tolerance,
            ..Self::default()
        }
    }

    /// JSON form handed to analyzers
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "risk_tolerance": self.risk_tolerance.as_str(),
            "holding_horizon": self.holding_horizon.as_str(),
            "experience": self.experience.as_str(),
        })
    }
}

/// What a caller asks the pipeline to analyze
///
/// Fields are private so a validated request cannot be altered once a run
/// holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    symbol: String,
    kinds: BTreeSet<AnalysisKind>,
    risk_profile: RiskProfile,
}

impl AnalysisRequest {
    /// Validate and build a request
    ///
    /// The symbol must be non-blank and `kinds` must be a non-empty subset of
    /// {fundamental, technical, sentiment}. Duplicates collapse.
    pub fn new(
        symbol: impl Into<String>,
        kinds: impl IntoIterator<Item = AnalysisKind>,
        risk_profile: RiskProfile,
    ) -> Result<Self> {
        let symbol = symbol.into().trim().to_uppercase();
        if symbol.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "symbol must not be empty".to_string(),
            ));
        }

        let kinds: BTreeSet<AnalysisKind> = kinds.into_iter().collect();
        if kinds.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "at least one of fundamental, technical or sentiment must be requested".to_string(),
            ));
        }
        if let Some(kind) = kinds.iter().find(|k| !k.is_sub_analysis()) {
            return Err(PipelineError::InvalidRequest(format!(
                "'{kind}' cannot be requested directly"
            )));
        }

        Ok(Self {
            symbol,
            kinds,
            risk_profile,
        })
    }

    /// Request every sub-analysis
    pub fn full(symbol: impl Into<String>, risk_profile: RiskProfile) -> Result<Self> {
        Self::new(symbol, AnalysisKind::SUB_ANALYSES, risk_profile)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Requested sub-analyses
    pub fn kinds(&self) -> &BTreeSet<AnalysisKind> {
        &self.kinds
    }

    pub fn risk_profile(&self) -> &RiskProfile {
        &self.risk_profile
    }

    pub fn is_requested(&self, kind: AnalysisKind) -> bool {
        self.kinds.contains(&kind)
    }
}
