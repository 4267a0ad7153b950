// 🗃️ Origin Index - card number → owner, split by card state
//
//   active       live card of a record
//   deactivated  retired card of a record that still has a live one
//   deleted      retired card of a record with no live card at all
//
// Built once per run, read-only afterwards.

use crate::origin::OriginRecord;
use std::collections::BTreeMap;

/// Which index a card number was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Active,
    Deactivated,
    Deleted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records: usize,

    /// Same card number inserted twice into one index; the later record won
    pub collisions: usize,

    /// Retired entries dropped because the same number is someone's live card
    pub shadowed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginIndex {
    active: BTreeMap<String, OriginRecord>,
    deactivated: BTreeMap<String, OriginRecord>,
    deleted: BTreeMap<String, OriginRecord>,
    stats: IndexStats,
}

fn insert_last_wins(
    map: &mut BTreeMap<String, OriginRecord>,
    card: &str,
    record: &OriginRecord,
    stats: &mut IndexStats,
    index: &'static str,
) {
    if let Some(previous) = map.insert(card.to_string(), record.clone()) {
        stats.collisions += 1;
        tracing::debug!(
            card,
            index,
            previous_line = previous.line,
            line = record.line,
            "card number listed twice, later record wins"
        );
    }
}

impl OriginIndex {
    /// Pure function of the records: same input, same index
    pub fn build(records: &[OriginRecord]) -> Self {
        let mut index = OriginIndex::default();
        index.stats.records = records.len();

        for record in records {
            let cards = &record.card_identity;
            match &cards.active {
                Some(active) => {
                    insert_last_wins(&mut index.active, active, record, &mut index.stats, "active");
                    for card in &cards.superseded {
                        insert_last_wins(&mut index.deactivated, card, record, &mut index.stats, "deactivated");
                    }
                }
                None => {
                    for card in &cards.superseded {
                        insert_last_wins(&mut index.deleted, card, record, &mut index.stats, "deleted");
                    }
                }
            }
        }

        index.enforce_precedence();

        tracing::info!(
            active = index.active.len(),
            deactivated = index.deactivated.len(),
            deleted = index.deleted.len(),
            collisions = index.stats.collisions,
            shadowed = index.stats.shadowed,
            "origin index built"
        );
        index
    }

    /// A live card is never also retired; retired-card overlaps between
    /// deactivated and deleted stay and are resolved by `lookup`
    fn enforce_precedence(&mut self) {
        let active = &self.active;
        let before = self.deactivated.len() + self.deleted.len();

        self.deactivated.retain(|card, _| !active.contains_key(card));
        self.deleted.retain(|card, _| !active.contains_key(card));

        let shadowed = before - (self.deactivated.len() + self.deleted.len());
        if shadowed > 0 {
            tracing::warn!(shadowed, "live card numbers also listed as retired, live state kept");
        }
        self.stats.shadowed = shadowed;
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        active: BTreeMap<String, OriginRecord>,
        deactivated: BTreeMap<String, OriginRecord>,
        deleted: BTreeMap<String, OriginRecord>,
    ) -> Self {
        OriginIndex {
            active,
            deactivated,
            deleted,
            stats: IndexStats::default(),
        }
    }

    pub fn active(&self) -> &BTreeMap<String, OriginRecord> {
        &self.active
    }

    pub fn deactivated(&self) -> &BTreeMap<String, OriginRecord> {
        &self.deactivated
    }

    pub fn deleted(&self) -> &BTreeMap<String, OriginRecord> {
        &self.deleted
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Lookup in precedence order
    pub fn lookup(&self, card: &str) -> Option<(CardState, &OriginRecord)> {
        if let Some(record) = self.active.get(card) {
            return Some((CardState::Active, record));
        }
        if let Some(record) = self.deleted.get(card) {
            return Some((CardState::Deleted, record));
        }
        self.deactivated
            .get(card)
            .map(|record| (CardState::Deactivated, record))
    }
}

// ============================================================================
// TESTS
// ============================================================================
