// 📞 Phone Sequence Allocator - synthetic phones for newly seen cards
//
// Every organization owns a phone range: its numeric prefix followed by a
// zero-padded counter, 11 digits in total. The counter starts right after the
// highest suffix already present in the origin data for that organization.

use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, Result};
use crate::origin::OriginRecord;
use std::collections::BTreeMap;

/// Digits in a full phone number, without the leading '+'
pub const PHONE_DIGITS: usize = 11;

/// Leading digits ignored when reading an origin phone's counter
pub const PHONE_HEAD_DIGITS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneCounter {
    pub prefix: String,
    pub next_suffix: u64,
    pub width: usize,
}

impl PhoneCounter {
    fn format(&self, suffix: u64) -> String {
        format!("+{}{:0width$}", self.prefix, suffix, width = self.width)
    }

    fn capacity(&self) -> u64 {
        10u64.pow(self.width as u32)
    }
}

/// Counter part of an origin phone ("+79230000041" → 41)
pub fn phone_suffix(phone: &str) -> Option<u64> {
    let digits = phone.trim().trim_start_matches('+');
    if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.len() <= PHONE_HEAD_DIGITS {
        return None;
    }
    digits[PHONE_HEAD_DIGITS..].parse().ok()
}

/// Owns the per-organization counters for one run
pub struct PhoneAllocator<'a> {
    config: &'a ReconcilerConfig,
    records: &'a [OriginRecord],
    counters: BTreeMap<String, PhoneCounter>,
}

impl<'a> PhoneAllocator<'a> {
    pub fn new(config: &'a ReconcilerConfig, records: &'a [OriginRecord]) -> Self {
        PhoneAllocator {
            config,
            records,
            counters: BTreeMap::new(),
        }
    }

    /// Start `org`'s counter after the highest suffix seen in the origin data;
    /// an already seeded counter is returned as is
    pub fn seed(&mut self, org: &str) -> Result<&PhoneCounter> {
        if self.counters.contains_key(org) {
            return Ok(&self.counters[org]);
        }

        let config = self.config;
        let names = config.org_names(org).ok_or_else(|| {
            ReconcileError::configuration(format!("unknown organization '{}'", org))
        })?;
        let prefix = config.phone_prefix(org).ok_or_else(|| {
            ReconcileError::configuration(format!("organization '{}' has no phone prefix", org))
        })?;

        let mut max_suffix: Option<u64> = None;
        for record in self.records.iter().filter(|r| r.belongs_to(&names.origin)) {
            let suffix = phone_suffix(&record.phone).ok_or_else(|| ReconcileError::Parse {
                field: "PhoneNumber",
                line: record.line,
                reason: format!("'{}' is not a phone number", record.phone),
                raw_row: format!("{};{};{}", record.phone, record.full_name, record.magnet_cards),
            })?;
            max_suffix = Some(max_suffix.map_or(suffix, |m| m.max(suffix)));
        }

        let max_suffix = max_suffix.ok_or_else(|| {
            ReconcileError::configuration(format!(
                "no origin phones for organization '{}' ({}), cannot seed its counter",
                org, names.origin
            ))
        })?;

        let width = PHONE_DIGITS.checked_sub(prefix.len()).ok_or_else(|| {
            ReconcileError::configuration(format!("phone prefix '{}' is too long", prefix))
        })?;
        let counter = PhoneCounter {
            prefix: prefix.to_string(),
            next_suffix: max_suffix + 1,
            width,
        };
        if counter.next_suffix >= counter.capacity() {
            return Err(ReconcileError::configuration(format!(
                "phone range of organization '{}' is exhausted",
                org
            )));
        }

        tracing::info!(org, first = %counter.format(counter.next_suffix), "phone counter seeded");
        self.counters.insert(org.to_string(), counter);
        Ok(&self.counters[org])
    }

    /// Hand out the next phone of `org`, seeding on first use
    pub fn next(&mut self, org: &str) -> Result<String> {
        if !self.counters.contains_key(org) {
            self.seed(org)?;
        }

        let counter = self
            .counters
            .get_mut(org)
            .ok_or_else(|| ReconcileError::configuration(format!("no counter for '{}'", org)))?;

        if counter.next_suffix >= counter.capacity() {
            return Err(ReconcileError::configuration(format!(
                "phone range of organization '{}' is exhausted",
                org
            )));
        }

        let phone = counter.format(counter.next_suffix);
        counter.next_suffix += 1;
        Ok(phone)
    }

    pub fn counter(&self, org: &str) -> Option<&PhoneCounter> {
        self.counters.get(org)
    }
}

// ============================================================================
// TESTS
// ============================================================================
