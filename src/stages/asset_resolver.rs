use std::collections::HashMap;

use anyhow::{Result, anyhow};
use log::{info, warn};

use crate::{
    catalog::{AssetCatalog, AssetInfo},
    model::{EntityStatus, Issue, IssueCategory, SceneEntity, SceneStatus, Severity},
    record::{SceneRecord, StageUpdate},
    stages::StageContext,
};

/// How one requested name was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(AssetInfo),
    /// `from` is the rejected catalog key, or the requested name when the
    /// catalog had no direct match.
    Substituted { asset: AssetInfo, from: String },
    Missing { reason: String },
}

/// Resolve every planned entity against the catalog. Entities are rebuilt from
/// the plan on every entry, so ids stay `<slug>-<ordinal>` in plan order.
///
/// On a revision, an entity that resolves to the same asset as before keeps
/// its placement, and the previous validation's non-asset issues stay open so
/// the downstream stages can act on them.
pub fn resolve_assets(ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    let plan = record
        .plan
        .as_ref()
        .ok_or_else(|| anyhow!("asset resolution needs a plan"))?;
    info!(
        "[assets] resolving {} requested entities",
        plan.required_entities.len()
    );

    let ceiling = ctx.settings.assets.polygon_ceiling;
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    let mut entities = Vec::with_capacity(plan.required_entities.len());
    let mut issues = Vec::new();
    let (mut found, mut substituted, mut missing) = (0usize, 0usize, 0usize);
    let mut kept = 0usize;

    for name in &plan.required_entities {
        let slug = slugify(name);
        let ordinal = ordinals.entry(slug.clone()).or_insert(0);
        *ordinal += 1;
        let mut entity = SceneEntity::requested(format!("{slug}-{ordinal}"), name.clone());

        match resolve_one(ctx.catalog, name, ceiling) {
            Resolution::Found(asset) => {
                found += 1;
                apply_asset(&mut entity, &asset);
            }
            Resolution::Substituted { asset, from } => {
                substituted += 1;
                info!("[assets] '{name}' substituted by {} (from {from})", asset.key);
                apply_asset(&mut entity, &asset);
                entity.substituted_from = Some(from);
            }
            Resolution::Missing { reason } => {
                missing += 1;
                warn!("[assets] '{name}' unresolved, using placeholder: {reason}");
                entity.extents = Some(ctx.settings.assets.placeholder());
                entity.placeholder = true;
                entity.status = EntityStatus::Resolved;
                issues.push(
                    Issue::new(
                        Severity::Warning,
                        IssueCategory::MissingAsset,
                        format!("no usable asset for '{name}': {reason}"),
                    )
                    .with_entity(entity.id.clone())
                    .with_fix("add a catalog entry or accept the placeholder geometry"),
                );
            }
        }
        if let Some(previous) = record.entity(&entity.id).filter(|p| same_resolution(p, &entity)) {
            entity.position = previous.position;
            entity.rotation = previous.rotation;
            entity.parent_id = previous.parent_id.clone();
            kept += usize::from(previous.position.is_some());
        }
        entities.push(entity);
    }

    let carried: Vec<Issue> = record
        .issues
        .iter()
        .filter(|i| !is_asset_issue(i.category))
        .cloned()
        .collect();
    let mut summary = format!(
        "resolved {} entities: {found} matched, {substituted} substituted, {missing} placeholders",
        entities.len()
    );
    if kept > 0 || !carried.is_empty() {
        summary.push_str(&format!(
            " (kept {kept} placements, {} open issues carried)",
            carried.len()
        ));
    }
    info!("[assets] {summary}");
    issues.extend(carried);

    Ok(StageUpdate {
        entities: Some(entities),
        issues: Some(issues),
        status: Some(SceneStatus::InProgress),
        summary,
        ..StageUpdate::default()
    })
}

/// Catalog match within the polygon ceiling. Over-budget matches are flagged
/// and replaced by a substitute of the same category; no match at all falls
/// back to any same-category substitute.
pub fn resolve_one(catalog: &dyn AssetCatalog, name: &str, ceiling: u32) -> Resolution {
    let rejected = match catalog.lookup(name) {
        Some(asset) if asset.polygon_count <= ceiling => return Resolution::Found(asset),
        Some(asset) => {
            warn!(
                "[assets] '{}' exceeds polygon ceiling ({} > {ceiling}), requesting substitute",
                asset.key, asset.polygon_count
            );
            Some(asset)
        }
        None => None,
    };

    let words = words_of(name);
    let category_hint = rejected.as_ref().map(|a| a.category.as_str());
    let substitute = catalog.substitutes(name).into_iter().find(|candidate| {
        candidate.polygon_count <= ceiling
            && rejected.as_ref().is_none_or(|r| r.key != candidate.key)
            && match category_hint {
                Some(category) => candidate.category == category,
                None => words.iter().any(|w| w == &candidate.category),
            }
    });

    match (substitute, rejected) {
        (Some(asset), Some(rejected)) => Resolution::Substituted {
            asset,
            from: rejected.key,
        },
        (Some(asset), None) => Resolution::Substituted {
            asset,
            from: name.to_string(),
        },
        (None, Some(rejected)) => Resolution::Missing {
            reason: format!(
                "{} has {} polygons (ceiling {ceiling}) and no substitute fits",
                rejected.key, rejected.polygon_count
            ),
        },
        (None, None) => Resolution::Missing {
            reason: "not in catalog".to_string(),
        },
    }
}

fn is_asset_issue(category: IssueCategory) -> bool {
    matches!(category, IssueCategory::MissingAsset | IssueCategory::PromptAlignment)
}

fn same_resolution(previous: &SceneEntity, current: &SceneEntity) -> bool {
    previous.name == current.name
        && previous.asset_ref == current.asset_ref
        && previous.extents == current.extents
        && previous.placeholder == current.placeholder
        && previous.substituted_from == current.substituted_from
}

fn apply_asset(entity: &mut SceneEntity, asset: &AssetInfo) {
    entity.asset_ref = Some(asset.asset_ref.clone());
    entity.extents = Some(asset.extents);
    entity.polygon_count = asset.polygon_count;
    entity.status = EntityStatus::Resolved;
}

fn words_of(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn slugify(name: &str) -> String {
    let words = words_of(name);
    if words.is_empty() {
        "entity".to_string()
    } else {
        words.join("_")
    }
}
