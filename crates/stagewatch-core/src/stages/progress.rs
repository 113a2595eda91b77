//! Progress cursor
//!
//! Derives per-stage progress marks from the catalog order and the most
//! recently observed stage. Nothing here is stored; callers recompute it on
//! every render.

use serde::Serialize;

use super::catalog::{StageCatalog, StageName};

/// Display state of one catalog stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMark {
    /// At or before the current stage
    Completed,
    /// Immediately after the current stage
    Upcoming,
    Idle,
}

/// Progress mark for a single catalog stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProgress {
    pub stage: StageName,
    pub mark: ProgressMark,
}

/// Compute progress marks for every catalog stage.
///
/// Progress follows the catalog position of `current`, not which stages
/// actually fired. No current stage and an unrecognized current stage both
/// count as "before the first stage", which makes the first stage upcoming.
pub fn progress(catalog: &StageCatalog, current: Option<&StageName>) -> Vec<StageProgress> {
    let cursor = current.and_then(|stage| catalog.index_of(stage.as_str()));

    catalog
        .stages()
        .iter()
        .enumerate()
        .map(|(i, stage)| StageProgress {
            stage: stage.clone(),
            mark: mark_at(i, cursor),
        })
        .collect()
}

fn mark_at(index: usize, cursor: Option<usize>) -> ProgressMark {
    // `None` behaves as position -1
    let next = cursor.map_or(0, |c| c + 1);
    match cursor {
        Some(c) if index <= c => ProgressMark::Completed,
        _ if index == next => ProgressMark::Upcoming,
        _ => ProgressMark::Idle,
    }
}
