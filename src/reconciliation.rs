// ⚖️ Reconciliation Engine - external card reports vs. origin index
//
// Every external row is looked up in the origin index:
//
//   active              known live card           → nothing to do
//   deleted, same name  retired card, same owner  → nothing to do
//   deleted, new name   card handed to someone    → new phone
//   deactivated         retired, owner still live → owner's phone, card marked
//   unknown             never issued by us        → new phone
//
// Afterwards, every active origin card nobody reported is listed separately.

use crate::error::{ReconcileError, Result};
use crate::external::{same_person, ExternalFile, ExternalRow, SkippedRow};
use crate::index::{CardState, OriginIndex};
use crate::output::{OutputRecord, ReportGroups};
use crate::phones::PhoneAllocator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Live card already on file
    Active,

    /// Retired card whose owner still has a live one; reuse the owner's phone
    Deactivated { owner_phone: String },

    /// Retired card, reported under the name it was retired with
    DeletedSameOwner,

    /// Retired card now reported under a different name
    DeletedReassigned { previous_owner: String },

    /// Card the origin data has never seen
    Unknown,
}

impl Classification {
    /// Whether this outcome produces an output row
    pub fn emits(&self) -> bool {
        !matches!(self, Classification::Active | Classification::DeletedSameOwner)
    }

    /// Whether the output row needs a freshly minted phone
    pub fn needs_new_phone(&self) -> bool {
        matches!(
            self,
            Classification::DeletedReassigned { .. } | Classification::Unknown
        )
    }
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationStats {
    pub files: usize,
    pub rows: usize,
    pub active: usize,
    pub deactivated: usize,
    pub deleted_same_owner: usize,
    pub deleted_reassigned: usize,
    pub unknown: usize,
    pub phones_issued: usize,
    pub skipped_rows: usize,
}

impl ReconciliationStats {
    fn record(&mut self, classification: &Classification) {
        self.rows += 1;
        match classification {
            Classification::Active => self.active += 1,
            Classification::Deactivated { .. } => self.deactivated += 1,
            Classification::DeletedSameOwner => self.deleted_same_owner += 1,
            Classification::DeletedReassigned { .. } => self.deleted_reassigned += 1,
            Classification::Unknown => self.unknown += 1,
        }
        if classification.needs_new_phone() {
            self.phones_issued += 1;
        }
    }

    pub fn emitted(&self) -> usize {
        self.deactivated + self.deleted_reassigned + self.unknown
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    /// Source file name → rows to import
    pub outputs: ReportGroups,

    /// Active origin cards never reported by any organization
    pub unmatched: Vec<OutputRecord>,

    pub stats: ReconciliationStats,
    pub skipped: Vec<SkippedRow>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} files, {} rows ({} emitted): {} active, {} deactivated, {} deleted (same owner), {} reassigned, {} unknown; {} phones issued, {} rows skipped, {} origin cards unmatched",
            self.stats.files,
            self.stats.rows,
            self.stats.emitted(),
            self.stats.active,
            self.stats.deactivated,
            self.stats.deleted_same_owner,
            self.stats.deleted_reassigned,
            self.stats.unknown,
            self.stats.phones_issued,
            self.stats.skipped_rows,
            self.unmatched.len()
        )
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine<'a> {
    index: &'a OriginIndex,
    phones: PhoneAllocator<'a>,

    /// Every card number reported by any file so far
    seen: HashSet<String>,

    outputs: ReportGroups,
    stats: ReconciliationStats,
    skipped: Vec<SkippedRow>,

    /// Collect malformed rows instead of failing the run
    pub skip_malformed: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(index: &'a OriginIndex, phones: PhoneAllocator<'a>) -> Self {
        ReconciliationEngine {
            index,
            phones,
            seen: HashSet::new(),
            outputs: ReportGroups::new(),
            stats: ReconciliationStats::default(),
            skipped: Vec::new(),
            skip_malformed: false,
        }
    }

    pub fn with_skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    /// Decide what a reported card means; precedence is active, deleted,
    /// deactivated, unknown
    pub fn classify(&self, row: &ExternalRow) -> Classification {
        match self.index.lookup(&row.card_number) {
            Some((CardState::Active, _)) => Classification::Active,
            Some((CardState::Deleted, owner)) => {
                if same_person(&row.full_name, &owner.full_name) {
                    Classification::DeletedSameOwner
                } else {
                    Classification::DeletedReassigned {
                        previous_owner: owner.full_name.clone(),
                    }
                }
            }
            Some((CardState::Deactivated, owner)) => Classification::Deactivated {
                owner_phone: owner.phone.clone(),
            },
            None => Classification::Unknown,
        }
    }

    /// Reconcile one row of `file_name`; `org` is the organization key used
    /// for new phones
    pub fn process_row(
        &mut self,
        file_name: &str,
        org: &str,
        row: &ExternalRow,
    ) -> Result<Option<OutputRecord>> {
        self.seen.insert(row.card_number.clone());

        let classification = self.classify(row);
        if !classification.emits() {
            self.stats.record(&classification);
            return Ok(None);
        }

        let name = row.name(file_name)?;
        let output = match &classification {
            Classification::Deactivated { owner_phone } => {
                OutputRecord::from_external(owner_phone.clone(), row, &name, true)
            }
            _ => {
                let phone = self.phones.next(org)?;
                OutputRecord::from_external(phone, row, &name, false)
            }
        };

        tracing::debug!(
            file = file_name,
            line = row.line,
            card = %row.card_number,
            phone = %output.phone,
            ?classification,
            "row emitted"
        );

        self.stats.record(&classification);
        self.outputs
            .entry(file_name.to_string())
            .or_default()
            .push(output.clone());
        Ok(Some(output))
    }

    /// Reconcile every row of one external file
    pub fn process_file(&mut self, file: &ExternalFile) -> Result<usize> {
        let org = file.org_key().to_string();
        let (rows, skipped) = file.rows(self.skip_malformed)?;
        self.stats.skipped_rows += skipped.len();
        self.skipped.extend(skipped);

        let mut emitted = 0;
        for row in &rows {
            match self.process_row(&file.name, &org, row) {
                Ok(Some(_)) => emitted += 1,
                Ok(None) => {}
                Err(ReconcileError::Structural { line, reason, .. }) if self.skip_malformed => {
                    // the card was still reported, only its output row is lost
                    tracing::warn!(file = %file.name, line, %reason, "external row skipped");
                    self.stats.skipped_rows += 1;
                    self.skipped.push(SkippedRow {
                        file: file.name.clone(),
                        line,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.files += 1;
        tracing::info!(file = %file.name, org = %org, rows = rows.len(), emitted, "file reconciled");
        Ok(emitted)
    }

    pub fn seen(&self, card: &str) -> bool {
        self.seen.contains(card)
    }

    /// Active origin cards that no external file mentioned, in card order
    pub fn unmatched_origin(&self) -> Vec<OutputRecord> {
        self.index
            .active()
            .iter()
            .filter(|(card, _)| !self.seen.contains(card.as_str()))
            .map(|(card, record)| OutputRecord::from_origin(card, record))
            .collect()
    }

    pub fn stats(&self) -> &ReconciliationStats {
        &self.stats
    }

    pub fn finish(self) -> ReconciliationReport {
        let unmatched = self.unmatched_origin();
        ReconciliationReport {
            outputs: self.outputs,
            unmatched,
            stats: self.stats,
            skipped: self.skipped,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
