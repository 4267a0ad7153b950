// 🔁 Pipeline - one complete reconciliation run
//
//   origin.csv → index + phone allocator → external files → reports
//
// Reports are only written once every file has been reconciled, but a failed
// write can still leave the reports written before it on disk.

use crate::config::ReconcilerConfig;
use crate::external::ExternalSource;
use crate::index::{IndexStats, OriginIndex};
use crate::origin::{load_origin, CategoryRules};
use crate::output::{save_reports, ReportGroups};
use crate::phones::PhoneAllocator;
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::storage::reset_dir;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub origin_records: usize,
    pub index: IndexStats,
    pub report: ReconciliationReport,
    pub written: Vec<PathBuf>,
}

pub fn run(config: &ReconcilerConfig, source: &dyn ExternalSource) -> Result<RunSummary> {
    config.validate()?;

    reset_dir(&config.output_dir)
        .with_context(|| format!("Failed to prepare output dir {:?}", config.output_dir))?;

    let labels = config.origin_labels();
    let rules = CategoryRules {
        organizations: &labels,
        category_marker: &config.category_marker,
    };
    let records = load_origin(&config.origin_path, &rules)
        .with_context(|| format!("Failed to load origin dataset {:?}", config.origin_path))?;

    let index = OriginIndex::build(&records);
    let phones = PhoneAllocator::new(config, &records);
    let mut engine =
        ReconciliationEngine::new(&index, phones).with_skip_malformed(config.skip_malformed_rows);

    let files = source.files().context("Failed to list external files")?;
    for file in &files {
        engine
            .process_file(file)
            .with_context(|| format!("Failed to reconcile {}", file.name))?;
    }

    let report = engine.finish();
    tracing::info!(summary = %report.summary(), "reconciliation finished");

    let mut written = save_reports(&config.output_dir, &report.outputs)
        .context("Failed to write reports")?;

    let mut unmatched = ReportGroups::new();
    unmatched.insert(config.unmatched_report.clone(), report.unmatched.clone());
    written.extend(
        save_reports(&config.output_dir, &unmatched).context("Failed to write unmatched report")?,
    );

    Ok(RunSummary {
        origin_records: records.len(),
        index: index.stats().clone(),
        report,
        written,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::external::tests::{cp1251, external_line};
    use crate::external::LocalDirSource;
    use std::fs;
    use std::path::Path;

    const ORIGIN: &str = "\
PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories
+79210000001;Ivanov Ivan;123;01.02.2024 10:00:00;ДЖИНАТЭК ООО, 3000 рублей
+79210000002;Petrov Petr;124,456a;02.02.2024 10:00:00;ДЖИНАТЭК ООО
+79210000003;Sidorov Sidr;789a;03.02.2024 10:00:00;ДЖИНАТЭК ООО
+79210000004;Orlov Oleg;555;04.02.2024 10:00:00;ДЖИНАТЭК ООО, 5000 рублей
";

    fn setup(root: &Path, external: &[(&str, String)]) -> ReconcilerConfig {
        fs::write(root.join("origin.csv"), ORIGIN).unwrap();
        let external_dir = root.join("external");
        fs::create_dir_all(&external_dir).unwrap();
        for (name, text) in external {
            fs::write(external_dir.join(name), cp1251(text)).unwrap();
        }

        ReconcilerConfig {
            origin_path: root.join("origin.csv"),
            external_dir,
            output_dir: root.join("output"),
            ..ReconcilerConfig::default()
        }
    }

    fn read(path: PathBuf) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_full_run() {
        let root = tempfile::tempdir().unwrap();
        let text = [
            external_line("123", "Ivanov Ivan", "10.00", "ДЖИНАТЭК ООО"),
            external_line("456", "Petrov Petr", "20.00", "ДЖИНАТЭК ООО"),
            external_line("789", "Кузнецов Кузьма Петрович", "30.00", "ДЖИНАТЭК ООО"),
            external_line("789", "Sidorov Sidr", "40.00", "ДЖИНАТЭК ООО"),
            external_line("900", "Новиков Николай", "50.00", "ДЖИНАТЭК ООО"),
        ]
        .join("\r\n");
        let config = setup(root.path(), &[("march_Djinatec.csv", text)]);

        let summary = run(&config, &LocalDirSource::new(&config.external_dir)).unwrap();

        assert_eq!(summary.origin_records, 4);
        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.report.stats.rows, 5);
        assert_eq!(summary.report.stats.phones_issued, 2);

        let lines = read(config.output_dir.join("march_Djinatec.csv"));
        assert_eq!(
            lines,
            vec![
                "phone;track_1;name;last_name;amount;org",
                "+79210000002;456(удалена);Petr;Petrov;20.00;ДЖИНАТЭК ООО",
                "+79210000005;789;Кузьма Петрович;Кузнецов;30.00;ДЖИНАТЭК ООО",
                "+79210000006;900;Николай;Новиков;50.00;ДЖИНАТЭК ООО",
            ]
        );

        let lines = read(config.output_dir.join(&config.unmatched_report));
        assert_eq!(
            lines,
            vec![
                "phone;track_1;name;last_name;amount;org",
                "+79210000002;124;Petr;Petrov;;ДЖИНАТЭК ООО",
                "+79210000004;555;Oleg;Orlov;5000 рублей;ДЖИНАТЭК ООО",
            ]
        );
    }

    #[test]
    fn test_run_without_external_files() {
        let root = tempfile::tempdir().unwrap();
        let config = setup(root.path(), &[]);
        fs::create_dir_all(&config.output_dir).unwrap();
        fs::write(config.output_dir.join("stale.csv"), "old").unwrap();

        let summary = run(&config, &LocalDirSource::new(&config.external_dir)).unwrap();

        assert_eq!(summary.written.len(), 1);
        assert!(!config.output_dir.join("stale.csv").exists());
        assert_eq!(summary.report.unmatched.len(), 3);
    }

    #[test]
    fn test_parse_error_aborts_run() {
        let root = tempfile::tempdir().unwrap();
        let config = setup(root.path(), &[]);
        fs::write(
            &config.origin_path,
            "PhoneNumber;Name;MagnetCards;WhenCreated;GuestCategories\n+79210000001;Ivanov Ivan;lost;01.02.2024 10:00:00;\n",
        )
        .unwrap();

        let err = run(&config, &LocalDirSource::new(&config.external_dir)).unwrap_err();
        let cause = err.downcast_ref::<ReconcileError>().unwrap();

        assert!(cause.is_parse());
        assert!(cause.raw_row().unwrap().contains("lost"));
    }

    #[test]
    fn test_malformed_external_row() {
        let root = tempfile::tempdir().unwrap();
        let text = format!("1,2,3\n{}", external_line("900", "Новиков Николай", "5", "X"));
        let mut config = setup(root.path(), &[("a_Djinatec.csv", text)]);

        assert!(run(&config, &LocalDirSource::new(&config.external_dir)).is_err());

        config.skip_malformed_rows = true;
        let summary = run(&config, &LocalDirSource::new(&config.external_dir)).unwrap();
        assert_eq!(summary.report.stats.skipped_rows, 1);
        assert_eq!(summary.report.outputs["a_Djinatec.csv"].len(), 1);
    }
}
