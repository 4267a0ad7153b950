// 🗂️ Origin dataset - card issuance records exported from the loyalty system
//
// `;`-delimited UTF-8 with a header row. Only five columns matter; the rest of
// the export is ignored.

use crate::card::{parse_card_identity, CardIdentity};
use crate::error::{ReconcileError, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

pub const COL_PHONE: &str = "PhoneNumber";
pub const COL_NAME: &str = "Name";
pub const COL_CARDS: &str = "MagnetCards";
pub const COL_CREATED: &str = "WhenCreated";
pub const COL_CATEGORIES: &str = "GuestCategories";

pub const CREATED_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

// ============================================================================
// ORIGIN RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub phone: String,
    pub full_name: String,
    pub card_identity: CardIdentity,

    /// Origin label of the owner's organization, if any category matched
    pub organization: Option<String>,

    /// Spending category ("... рублей"), if present
    pub category: Option<String>,

    pub created_at: NaiveDateTime,

    // Raw values kept for diagnostics
    pub magnet_cards: String,
    pub guest_categories: String,
    pub line: usize,
}

/// Raw column values of one origin row
#[derive(Debug, Clone, Default)]
pub struct OriginFields<'a> {
    pub phone: &'a str,
    pub name: &'a str,
    pub magnet_cards: &'a str,
    pub when_created: &'a str,
    pub guest_categories: &'a str,
}

/// What the categories field is matched against
#[derive(Debug, Clone, Copy)]
pub struct CategoryRules<'a> {
    pub organizations: &'a [&'a str],
    pub category_marker: &'a str,
}

impl OriginRecord {
    pub fn from_fields(
        fields: &OriginFields<'_>,
        rules: &CategoryRules<'_>,
        source: &str,
        line: usize,
        raw_row: &str,
    ) -> Result<Self> {
        let card_identity =
            parse_card_identity(fields.magnet_cards).map_err(|e| ReconcileError::Parse {
                field: COL_CARDS,
                line,
                reason: e.to_string(),
                raw_row: raw_row.to_string(),
            })?;

        let created_at = NaiveDateTime::parse_from_str(fields.when_created.trim(), CREATED_FORMAT)
            .map_err(|e| {
                ReconcileError::structural(
                    source,
                    line,
                    format!("{} '{}' is not {}: {}", COL_CREATED, fields.when_created, CREATED_FORMAT, e),
                )
            })?;

        Ok(OriginRecord {
            phone: fields.phone.trim().to_string(),
            full_name: fields.name.trim().to_string(),
            card_identity,
            organization: extract_organization(fields.guest_categories, rules.organizations),
            category: extract_category(fields.guest_categories, rules.category_marker),
            created_at,
            magnet_cards: fields.magnet_cards.to_string(),
            guest_categories: fields.guest_categories.to_string(),
            line,
        })
    }

    pub fn belongs_to(&self, origin_label: &str) -> bool {
        self.organization.as_deref() == Some(origin_label)
    }
}

// ============================================================================
// CATEGORY FIELD
// ============================================================================

/// First comma-separated category that is a known organization
pub fn extract_organization(categories: &str, allowlist: &[&str]) -> Option<String> {
    categories
        .split(',')
        .map(str::trim)
        .find(|cat| allowlist.contains(cat))
        .map(str::to_string)
}

/// First comma-separated category mentioning the currency marker
pub fn extract_category(categories: &str, marker: &str) -> Option<String> {
    categories
        .split(',')
        .find(|cat| cat.contains(marker))
        .map(|cat| cat.trim().to_string())
}

// ============================================================================
// LOADING
// ============================================================================

struct Columns {
    phone: usize,
    name: usize,
    cards: usize,
    created: usize,
    categories: usize,
}

impl Columns {
    fn locate(headers: &StringRecord, source: &str) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
                .ok_or_else(|| {
                    ReconcileError::structural(source, 1, format!("missing column '{}'", name))
                })
        };

        Ok(Columns {
            phone: find(COL_PHONE)?,
            name: find(COL_NAME)?,
            cards: find(COL_CARDS)?,
            created: find(COL_CREATED)?,
            categories: find(COL_CATEGORIES)?,
        })
    }
}

pub fn load_origin<P: AsRef<Path>>(path: P, rules: &CategoryRules<'_>) -> Result<Vec<OriginRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    read_origin(file, &path.display().to_string(), rules)
}

/// Parse the whole origin export; the first bad row aborts the load
pub fn read_origin<R: Read>(
    reader: R,
    source: &str,
    rules: &CategoryRules<'_>,
) -> Result<Vec<OriginRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::locate(reader.headers()?, source)?;
    let mut records = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let raw_row = record.iter().collect::<Vec<_>>().join(";");

        let get = |idx: usize, name: &str| {
            record.get(idx).ok_or_else(|| {
                ReconcileError::structural(source, line, format!("row has no '{}' value", name))
            })
        };

        let fields = OriginFields {
            phone: get(columns.phone, COL_PHONE)?,
            name: get(columns.name, COL_NAME)?,
            magnet_cards: get(columns.cards, COL_CARDS)?,
            when_created: get(columns.created, COL_CREATED)?,
            guest_categories: get(columns.categories, COL_CATEGORIES)?,
        };

        records.push(OriginRecord::from_fields(&fields, rules, source, line, &raw_row)?);
    }

    tracing::info!(source, records = records.len(), "origin dataset loaded");
    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ORGS: &[&str] = &["Фармасинтез ООО", "Профарм ООО"];

    fn rules() -> CategoryRules<'static> {
        CategoryRules {
            organizations: ORGS,
            category_marker: "рублей",
        }
    }

    #[test]
    fn test_extract_organization() {
        assert_eq!(
            extract_organization("Сотрудники, Фармасинтез ООО, 3000 рублей", ORGS),
            Some("Фармасинтез ООО".to_string())
        );
        assert_eq!(extract_organization("Сотрудники", ORGS), None);
        assert_eq!(extract_organization("", ORGS), None);
    }

    #[test]
    fn test_extract_category() {
        assert_eq!(
            extract_category("Фармасинтез ООО, 3000 рублей ", "рублей"),
            Some("3000 рублей".to_string())
        );
        assert_eq!(extract_category("Фармасинтез ООО", "рублей"), None);
    }

    #[test]
    fn test_read_origin() {
        let data = "\
PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories;Extra
+79230000001;Ivanov Ivan;123;01.02.2024 10:00:00;Фармасинтез ООО, 3000 рублей;x
+79230000002;Petrov Petr;123x,456;02.02.2024 11:30:00;Профарм ООО;y
";
        let records = read_origin(data.as_bytes(), "origin.csv", &rules()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].phone, "+79230000001");
        assert_eq!(records[0].card_identity.active.as_deref(), Some("123"));
        assert_eq!(records[0].organization.as_deref(), Some("Фармасинтез ООО"));
        assert_eq!(records[0].category.as_deref(), Some("3000 рублей"));
        assert_eq!(records[0].line, 2);

        assert_eq!(records[1].card_identity.active.as_deref(), Some("456"));
        assert_eq!(records[1].card_identity.superseded, vec!["123".to_string()]);
        assert!(records[1].belongs_to("Профарм ООО"));
        assert_eq!(records[1].category, None);
    }

    #[test]
    fn test_header_with_bom() {
        let data = "\u{feff}PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories\n\
+79230000001;Ivanov Ivan;1;01.02.2024 10:00:00;\n";
        let records = read_origin(data.as_bytes(), "origin.csv", &rules()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].organization, None);
    }

    #[test]
    fn test_missing_column_is_structural() {
        let data = "PhoneNumber;Name;WhenCreated;GuestCategories\n+7;A B;01.01.2024 00:00:00;\n";
        let err = read_origin(data.as_bytes(), "origin.csv", &rules()).unwrap_err();

        assert!(matches!(err, ReconcileError::Structural { .. }));
        assert!(err.to_string().contains("MagnetCards"));
    }

    #[test]
    fn test_bad_date_is_structural() {
        let data = "PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories\n+7;A B;1;2024-01-01;\n";
        let err = read_origin(data.as_bytes(), "origin.csv", &rules()).unwrap_err();

        assert!(matches!(err, ReconcileError::Structural { line: 2, .. }));
    }

    #[test]
    fn test_bad_card_is_parse_error_with_row() {
        let data = "PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories\n\
+79230000001;Ivanov Ivan;lost;01.02.2024 10:00:00;Фармасинтез ООО\n";
        let err = read_origin(data.as_bytes(), "origin.csv", &rules()).unwrap_err();

        assert!(err.is_parse());
        assert_eq!(
            err.raw_row(),
            Some("+79230000001;Ivanov Ivan;lost;01.02.2024 10:00:00;Фармасинтез ООО")
        );
    }
}
