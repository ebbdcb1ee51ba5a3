use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Configuration for a complete pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: String,
    pub steps: Vec<PipelineStepConfig>,
    pub error_handling: ErrorHandlingStrategy,
}

/// Configuration for individual pipeline steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStepConfig {
    Enhance,
    Shifts,
    Segment,
    Resolve,
    Stats,
    Validate { ground_truth: bool },
}

/// Strategy for handling step failures during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ErrorHandlingStrategy {
    /// Stop processing a game on the first failed step.
    StopOnFirstError,
    /// Continue through remaining steps, collecting errors.
    ContinueOnError,
}

impl PipelineConfig {
    /// The default full pipeline: every phase in dependency order, ending in
    /// validation.
    pub fn full_pipeline() -> Self {
        Self {
            name: "full_warehouse".to_string(),
            description: "Complete transformation from raw tracked rows to validated warehouse tables"
                .to_string(),
            steps: vec![
                PipelineStepConfig::Enhance,
                PipelineStepConfig::Shifts,
                PipelineStepConfig::Segment,
                PipelineStepConfig::Resolve,
                PipelineStepConfig::Stats,
                PipelineStepConfig::Validate { ground_truth: false },
            ],
            error_handling: ErrorHandlingStrategy::StopOnFirstError,
        }
    }

    /// The full pipeline with ground-truth comparison enabled.
    pub fn ground_truth_pipeline() -> Self {
        let mut config = Self::full_pipeline();
        config.name = "ground_truth".to_string();
        config.description =
            "Full pipeline plus comparison against the curated reference dataset".to_string();
        if let Some(last) = config.steps.last_mut() {
            *last = PipelineStepConfig::Validate { ground_truth: true };
        }
        config
    }

    /// Validate step ordering against declared dependencies.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(anyhow::anyhow!("pipeline must have at least one step"));
        }

        let mut seen_steps = std::collections::HashSet::new();
        for step in &self.steps {
            let step_name = step.step_name();
            for dep in step.dependencies() {
                if !seen_steps.contains(dep) {
                    return Err(anyhow::anyhow!(
                        "step '{}' depends on '{}' which does not appear earlier in the pipeline",
                        step_name,
                        dep
                    ));
                }
            }
            seen_steps.insert(step_name);
        }

        Ok(())
    }
}

impl PipelineStepConfig {
    /// Get the step name for dependency checking.
    pub fn step_name(&self) -> &'static str {
        match self {
            PipelineStepConfig::Enhance => "enhance",
            PipelineStepConfig::Shifts => "shifts",
            PipelineStepConfig::Segment => "segment",
            PipelineStepConfig::Resolve => "resolve",
            PipelineStepConfig::Stats => "stats",
            PipelineStepConfig::Validate { .. } => "validate",
        }
    }

    /// Get the dependencies for this step.
    pub fn dependencies(&self) -> Vec<&'static str> {
        match self {
            PipelineStepConfig::Enhance => vec![],
            PipelineStepConfig::Shifts => vec![],
            PipelineStepConfig::Segment => vec!["enhance"],
            PipelineStepConfig::Resolve => vec!["segment", "shifts"],
            PipelineStepConfig::Stats => vec!["resolve"],
            PipelineStepConfig::Validate { .. } => vec!["stats"],
        }
    }
}
