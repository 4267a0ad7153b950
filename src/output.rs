// 📤 Output reports - rows ready for import into the loyalty system
//
// One `;`-delimited UTF-8 file per group. The header is always written, so an
// empty report still tells the operator the run reached it.

use crate::card::SUPERSEDED_MARK;
use crate::error::Result;
use crate::external::{split_name, ExternalRow, PersonName};
use crate::origin::OriginRecord;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Report file name → rows, in file-name order
pub type ReportGroups = BTreeMap<String, Vec<OutputRecord>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub phone: String,

    #[serde(rename = "track_1")]
    pub track_number: String,

    pub name: String,
    pub last_name: String,
    pub amount: String,

    #[serde(rename = "org")]
    pub organization: String,
}

impl OutputRecord {
    pub const HEADERS: [&'static str; 6] = ["phone", "track_1", "name", "last_name", "amount", "org"];

    /// Row for a card reported by an organization
    pub fn from_external(phone: String, row: &ExternalRow, name: &PersonName, superseded: bool) -> Self {
        let track_number = if superseded {
            format!("{}{}", row.card_number, SUPERSEDED_MARK)
        } else {
            row.card_number.clone()
        };

        OutputRecord {
            phone,
            track_number,
            name: name.first_middle(),
            last_name: name.last.clone(),
            amount: row.amount.clone(),
            organization: row.organization_label.clone(),
        }
    }

    /// Row for an origin card nobody reported; `amount` carries the category
    pub fn from_origin(card: &str, record: &OriginRecord) -> Self {
        let (name, last_name) = match split_name(&record.full_name) {
            Some(parts) => (parts.first_middle(), parts.last),
            None => (String::new(), record.full_name.clone()),
        };

        OutputRecord {
            phone: record.phone.clone(),
            track_number: card.to_string(),
            name,
            last_name,
            amount: record.category.clone().unwrap_or_default(),
            organization: record.organization.clone().unwrap_or_default(),
        }
    }
}

pub fn write_report<W: Write>(writer: W, rows: &[OutputRecord]) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(OutputRecord::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every group into `dir`, one file per group; returns the paths
pub fn save_reports(dir: &Path, groups: &ReportGroups) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(groups.len());

    for (file_name, rows) in groups {
        let path = dir.join(file_name);
        let file = std::fs::File::create(&path)?;
        write_report(file, rows)?;

        tracing::info!(report = %path.display(), rows = rows.len(), "report written");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;

    fn external(card: &str, name: &str) -> ExternalRow {
        ExternalRow {
            card_number: card.to_string(),
            date: "01.03.2024".to_string(),
            type_: "Продажа".to_string(),
            code: "001".to_string(),
            full_name: name.to_string(),
            amount: "150.00".to_string(),
            organization_label: "Фармасинтез".to_string(),
            line: 1,
        }
    }

    #[test]
    fn test_from_external() {
        let row = external("456", "Петров Петр Петрович");
        let name = row.name("x.csv").unwrap();

        let out = OutputRecord::from_external("+79230000001".to_string(), &row, &name, false);
        assert_eq!(out.track_number, "456");
        assert_eq!(out.name, "Петр Петрович");
        assert_eq!(out.last_name, "Петров");
        assert_eq!(out.amount, "150.00");
        assert_eq!(out.organization, "Фармасинтез");

        let out = OutputRecord::from_external("+79230000001".to_string(), &row, &name, true);
        assert_eq!(out.track_number, "456(удалена)");
    }

    #[test]
    fn test_from_origin_uses_category_as_amount() {
        let origin = record("+79230000001", "Ivanov Ivan", "123", Some("Фармасинтез ООО"));
        let out = OutputRecord::from_origin("123", &origin);

        assert_eq!(out.phone, "+79230000001");
        assert_eq!(out.track_number, "123");
        assert_eq!(out.name, "Ivan");
        assert_eq!(out.last_name, "Ivanov");
        assert_eq!(out.amount, "3000 рублей");
        assert_eq!(out.organization, "Фармасинтез ООО");
    }

    #[test]
    fn test_write_report_layout() {
        let rows = vec![OutputRecord {
            phone: "+79230000042".to_string(),
            track_number: "456(удалена)".to_string(),
            name: "Петр".to_string(),
            last_name: "Петров".to_string(),
            amount: "150.00".to_string(),
            organization: "Фармасинтез".to_string(),
        }];

        let mut buf = Vec::new();
        write_report(&mut buf, &rows).unwrap();

        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "phone;track_1;name;last_name;amount;org\n+79230000042;456(удалена);Петр;Петров;150.00;Фармасинтез\n"
        );
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let mut buf = Vec::new();
        write_report(&mut buf, &[]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "phone;track_1;name;last_name;amount;org\n");
    }

    #[test]
    fn test_save_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut groups = ReportGroups::new();
        groups.insert("a_FS.csv".to_string(), vec![]);
        groups.insert("b_FS.csv".to_string(), vec![]);

        let written = save_reports(dir.path(), &groups).unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("a_FS.csv").exists());
        assert!(dir.path().join("b_FS.csv").exists());
    }
}
