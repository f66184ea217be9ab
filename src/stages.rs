use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::AssetCatalog, config::Settings, llm::LanguageModel, memory::SimilarityMemory,
    record::{SceneRecord, StageUpdate},
};

pub mod asset_resolver;
pub mod decomposer;
pub mod illuminator;
pub mod placer;
pub mod texturer;
pub mod validator;

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decomposer,
    AssetResolver,
    Placer,
    Texturer,
    Illuminator,
    Validator,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Decomposer,
        Stage::AssetResolver,
        Stage::Placer,
        Stage::Texturer,
        Stage::Illuminator,
        Stage::Validator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Decomposer => "decomposer",
            Stage::AssetResolver => "asset_resolver",
            Stage::Placer => "placer",
            Stage::Texturer => "texturer",
            Stage::Illuminator => "illuminator",
            Stage::Validator => "validator",
        }
    }

    pub fn run(self, ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
        match self {
            Stage::Decomposer => decomposer::decompose(ctx, record),
            Stage::AssetResolver => asset_resolver::resolve_assets(ctx, record),
            Stage::Placer => placer::place(ctx, record),
            Stage::Texturer => texturer::texture(ctx, record),
            Stage::Illuminator => illuminator::illuminate(ctx, record),
            Stage::Validator => validator::validate(ctx, record),
        }
    }
}

/// Collaborators and settings a stage may consult. Borrowed for the duration
/// of one run; the record itself is passed separately and never mutated.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub settings: &'a Settings,
    pub model: &'a dyn LanguageModel,
    pub catalog: &'a dyn AssetCatalog,
    pub memory: &'a dyn SimilarityMemory,
}
