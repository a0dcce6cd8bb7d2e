//! TOML test plans
//!
//! A plan is a list of `[[entity]]` tables (cases, groups, configurations)
//! plus an optional `[hooks]` table mapping hook stage names to shell
//! commands. Loading a plan turns it into an engine entity tree whose
//! bodies are [`ShellCase`] / [`ShellConfiguration`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rigcheck_core::error::ValidationError;
use rigcheck_core::hooks::HookStage;
use rigcheck_core::types::EntityKindTag;
use rigcheck_engine::{ConfigMode, Engine, TestEntity};

use crate::shell::{ShellCase, ShellCommand, ShellConfiguration, ShellHooks};

/// Every hook stage a plan may name.
const HOOK_STAGES: [HookStage; 10] = [
    HookStage::BeforeRun,
    HookStage::AfterRun,
    HookStage::BeforePreTest,
    HookStage::AfterPreTest,
    HookStage::BeforeProcedure,
    HookStage::AfterProcedure,
    HookStage::BeforePostTest,
    HookStage::AfterPostTest,
    HookStage::BeforeConfiguration,
    HookStage::AfterConfiguration,
];

/// Errors raised while loading or checking a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("cannot read plan '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Parse(String),

    #[error("entity '{entity}': missing required field '{field}'")]
    MissingField { entity: String, field: &'static str },

    #[error("unknown hook stage '{0}'")]
    UnknownHookStage(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A parsed plan.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunPlan {
    /// Hook stage name -> shell command.
    #[serde(default)]
    pub hooks: BTreeMap<String, String>,
    /// Top-level entities, in execution order.
    #[serde(default, rename = "entity")]
    pub entities: Vec<PlanEntity>,
}

/// One `[[entity]]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanEntity {
    Case {
        name: String,
        #[serde(default)]
        parallel: bool,
        #[serde(default)]
        pre: Option<String>,
        #[serde(default)]
        procedure: Option<String>,
        #[serde(default)]
        post: Option<String>,
    },
    Group {
        name: String,
        #[serde(default)]
        parallel: bool,
        #[serde(default)]
        children: Vec<PlanEntity>,
    },
    Configuration {
        name: String,
        #[serde(default)]
        parallel: bool,
        mode: ConfigMode,
        #[serde(default)]
        apply: Option<String>,
        #[serde(default)]
        remove: Option<String>,
    },
}

impl PlanEntity {
    pub fn name(&self) -> &str {
        match self {
            Self::Case { name, .. } | Self::Group { name, .. } | Self::Configuration { name, .. } => {
                name
            }
        }
    }

    pub fn kind(&self) -> EntityKindTag {
        match self {
            Self::Case { .. } => EntityKindTag::Case,
            Self::Group { .. } => EntityKindTag::Group,
            Self::Configuration { .. } => EntityKindTag::Configuration,
        }
    }

    pub fn is_parallel(&self) -> bool {
        match self {
            Self::Case { parallel, .. }
            | Self::Group { parallel, .. }
            | Self::Configuration { parallel, .. } => *parallel,
        }
    }

    pub fn children(&self) -> &[PlanEntity] {
        match self {
            Self::Group { children, .. } => children,
            _ => &[],
        }
    }

    fn build(&self) -> Result<TestEntity, PlanError> {
        let entity = match self {
            Self::Case {
                name,
                pre,
                procedure,
                post,
                ..
            } => {
                let procedure = procedure.as_deref().ok_or_else(|| PlanError::MissingField {
                    entity: name.clone(),
                    field: "procedure",
                })?;
                TestEntity::case(
                    name.clone(),
                    ShellCase {
                        name: name.clone(),
                        pre: pre.as_deref().map(ShellCommand::new),
                        procedure: ShellCommand::new(procedure),
                        post: post.as_deref().map(ShellCommand::new),
                    },
                )
            }
            Self::Group { name, children, .. } => {
                let children = children
                    .iter()
                    .map(PlanEntity::build)
                    .collect::<Result<Vec<_>, _>>()?;
                TestEntity::group(name.clone(), children)
            }
            Self::Configuration {
                name,
                mode,
                apply,
                remove,
                ..
            } => {
                let (required, field) = match mode {
                    ConfigMode::Config => (apply, "apply"),
                    ConfigMode::DeConfig => (remove, "remove"),
                };
                if required.is_none() {
                    return Err(PlanError::MissingField {
                        entity: name.clone(),
                        field,
                    });
                }
                TestEntity::configuration(
                    name.clone(),
                    ShellConfiguration {
                        name: name.clone(),
                        apply: apply.as_deref().map(ShellCommand::new),
                        remove: remove.as_deref().map(ShellCommand::new),
                    },
                    *mode,
                )
            }
        };
        Ok(entity.parallel(self.is_parallel()))
    }
}

impl RunPlan {
    /// Parse a plan from TOML text.
    pub fn parse(content: &str) -> Result<Self, PlanError> {
        toml::from_str(content).map_err(|e| PlanError::Parse(e.to_string()))
    }

    /// Read and parse a plan file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PlanError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&content)
    }

    /// Build the entity tree, checking required fields and name uniqueness.
    pub fn build(&self) -> Result<Vec<TestEntity>, PlanError> {
        let entities = self
            .entities
            .iter()
            .map(PlanEntity::build)
            .collect::<Result<Vec<_>, _>>()?;
        Engine::validate(&entities)?;
        Ok(entities)
    }

    /// Build the hook runner from the `[hooks]` table.
    pub fn hooks(&self) -> Result<ShellHooks, PlanError> {
        let mut hooks = ShellHooks::new();
        for (stage, command) in &self.hooks {
            let stage = HOOK_STAGES
                .iter()
                .copied()
                .find(|s| s.as_str() == stage)
                .ok_or_else(|| PlanError::UnknownHookStage(stage.clone()))?;
            hooks = hooks.with_hook(stage, ShellCommand::new(command.as_str()));
        }
        Ok(hooks)
    }

    /// Total number of entities, nested ones included.
    pub fn entity_count(&self) -> usize {
        fn count(entities: &[PlanEntity]) -> usize {
            entities.iter().map(|e| 1 + count(e.children())).sum()
        }
        count(&self.entities)
    }
}
