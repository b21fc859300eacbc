use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::enrollment::EnrollmentLine;
use crate::domain::grade::{Grade, GradeId};

/// Outcome of pricing a student's selection against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedSelection {
    pub lines: Vec<EnrollmentLine>,
    pub total: Decimal,
    /// Selected ids the catalog did not return (unknown or inactive).
    pub dropped: Vec<GradeId>,
}

impl PricedSelection {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub fn total_of(lines: &[EnrollmentLine]) -> Decimal {
    lines.iter().map(|line| line.grade_price).sum()
}

/// Removes repeated ids while keeping the first occurrence's position.
pub fn dedup_selection(selected: &[GradeId]) -> Vec<GradeId> {
    let mut seen = HashSet::new();
    selected.iter().filter(|id| seen.insert((*id).clone())).cloned().collect()
}

/// Snapshots catalog prices onto lines in selection order.
///
/// Ids missing from `catalog` contribute no line and no price; they are reported
/// in `dropped` so callers can log them.
pub fn price_selection(selected: &[GradeId], catalog: &[Grade]) -> PricedSelection {
    let by_id: HashMap<&GradeId, &Grade> =
        catalog.iter().filter(|grade| grade.active).map(|grade| (&grade.id, grade)).collect();

    let mut lines = Vec::new();
    let mut dropped = Vec::new();
    for grade_id in dedup_selection(selected) {
        match by_id.get(&grade_id) {
            Some(grade) => lines.push(EnrollmentLine {
                grade_id: grade.id.clone(),
                grade_name: grade.name.clone(),
                grade_price: grade.price,
            }),
            None => dropped.push(grade_id),
        }
    }

    let total = total_of(&lines);
    PricedSelection { lines, total, dropped }
}
