// ==========================================
// SQLite 端到端导入测试
// ==========================================
// 测试目标: CSV 夹具 → SheetParser → ImportQueue → SqliteRecordStore
//           配置来自 config_kv（ConfigManager）
// ==========================================


use chrono::NaiveDate;
use hatchery_import::config::{config_keys, ConfigManager, ImportConfig, ImportConfigReader};
use hatchery_import::domain::{
    CellValue, Classification, EntityKind, NaturalKey, RecordPayload, RecordType, SheetData,
    SheetState,
};
use hatchery_import::importer::{BulkImporter, ImportQueue, RowValidator, SheetParser};
use hatchery_import::logging;
use hatchery_import::repository::SqliteRecordStore;
use std::sync::Arc;
use test_helpers::{create_test_db, fixture_path, insert_test_config};

fn parse_fixture(name: &str) -> SheetData {
    let mut sheets = SheetParser::new()
        .parse_file(fixture_path(name))
        .expect("Failed to parse fixture");
    assert_eq!(sheets.len(), 1);
    sheets.remove(0)
}

async fn load_config(db_path: &str) -> ImportConfig {
    let manager = ConfigManager::new(db_path).expect("Failed to create ConfigManager");
    ImportConfig::load(&manager)
        .await
        .expect("Failed to load config")
        .reference_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
}

#[tokio::test]
async fn test_roster_then_fertility_end_to_end() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    insert_test_config(&db_path, config_keys::CREATE_MISSING_ENTITIES, "true").unwrap();
    insert_test_config(&db_path, config_keys::DEFAULT_SAMPLE_SIZE, "250").unwrap();

    let roster = parse_fixture("flock_roster.csv");
    assert_eq!(roster.record_type, Some(RecordType::Flock));
    let fertility = parse_fixture("fertility_week10.csv");
    assert_eq!(fertility.record_type, Some(RecordType::FertilityAnalysis));
    assert_eq!(
        fertility.rows.iter().map(|r| r.row_number).collect::<Vec<_>>(),
        vec![1, 2, 4]
    );

    let store = Arc::new(SqliteRecordStore::new(&db_path).unwrap());
    let config = load_config(&db_path).await;
    assert!(config.create_missing_entities);

    let mut queue = ImportQueue::new(RowValidator::new(), BulkImporter::new(store.clone()));
    queue.enqueue(roster, config.clone());
    queue.enqueue(fertility, config);
    let summary = queue.run().await;

    for report in &summary.reports {
        assert_eq!(report.state, SheetState::Completed, "{}", report.sheet_name);
        assert!(report.result.as_ref().unwrap().errors.is_empty());
    }
    assert_eq!(summary.total_success(), 6);

    assert_eq!(store.count_entities(EntityKind::Flock).unwrap(), 3);
    assert_eq!(store.count_entities(EntityKind::House).unwrap(), 2);
    assert_eq!(store.count_records(RecordType::FertilityAnalysis).unwrap(), 3);

    // 第 4 行缺样本数与入孵日期: 分别来自配置默认值与表头日期
    let key = NaturalKey::new(RecordType::FertilityAnalysis, &["F103", "2024-03-08"]);
    match store.find_record(&key).unwrap() {
        Some(RecordPayload::FertilityAnalysis(rec)) => {
            assert_eq!(rec.sample_size, 250);
            assert_eq!(rec.fertile, 240);
            assert_eq!(rec.house_number.as_deref(), Some("H1"));
        }
        other => panic!("unexpected record {:?}", other),
    }

    assert_eq!(store.list_batches().unwrap().len(), 2);
}

#[tokio::test]
async fn test_rerun_is_idempotent_against_sqlite() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = Arc::new(SqliteRecordStore::new(&db_path).unwrap());
    let importer = BulkImporter::new(store.clone());
    let config = load_config(&db_path).await;

    let ready = RowValidator::new()
        .ready(parse_fixture("flock_roster.csv"))
        .unwrap();
    let first = importer.import(&ready, &config).await.unwrap();
    assert_eq!(first.success, 3);

    let second = importer.import(&ready, &config).await.unwrap();
    assert_eq!(second.success, 0);
    assert_eq!(second.skipped, 3);
    assert_eq!(store.count_records(RecordType::Flock).unwrap(), 3);
}

#[tokio::test]
async fn test_missing_flocks_fail_rows_without_creation() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let manager = ConfigManager::new(&db_path).unwrap();
    assert!(!manager.get_create_missing_entities().await.unwrap());

    let store = Arc::new(SqliteRecordStore::new(&db_path).unwrap());
    let mut queue = ImportQueue::new(RowValidator::new(), BulkImporter::new(store.clone()));
    queue.enqueue(parse_fixture("fertility_week10.csv"), load_config(&db_path).await);
    let summary = queue.run().await;

    let report = &summary.reports[0];
    assert_eq!(report.state, SheetState::Completed);
    let result = report.result.as_ref().unwrap();
    assert_eq!(result.failure, 3);
    assert_eq!(result.success, 0);
    assert!(result.is_balanced());
    assert_eq!(
        result.errors.iter().map(|e| e.row).collect::<Vec<_>>(),
        vec![1, 2, 4]
    );
    assert_eq!(store.count_records(RecordType::FertilityAnalysis).unwrap(), 0);
}

#[tokio::test]
async fn test_known_flock_catalogue_only_warns() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    insert_test_config(&db_path, config_keys::KNOWN_FLOCKS, "F101,F102").unwrap();
    let manager = ConfigManager::new(&db_path).unwrap();
    let flocks = manager.get_known_flocks().await.unwrap().unwrap();

    let sheet = parse_fixture("fertility_week10.csv");
    let validator = RowValidator::new().with_known_flocks(flocks);
    let issues = validator.validate_sheet(&sheet).unwrap();

    assert!(issues.iter().all(|i| !i.is_error()));
    assert!(issues
        .iter()
        .any(|i| i.row == 4 && i.column == "flock_number"));
}

#[tokio::test]
async fn test_multi_sheet_workbook_keeps_order_and_cell_types() {
    let sheets = SheetParser::new()
        .parse_file(fixture_path("hatchery_week10.xlsx"))
        .expect("Failed to parse workbook");

    // 源顺序: Notes 在前
    let names: Vec<&str> = sheets.iter().map(|s| s.sheet_name.as_str()).collect();
    assert_eq!(names, vec!["Notes", "Fertility"]);

    let notes = &sheets[0];
    assert_eq!(notes.record_type, None);
    assert_eq!(notes.classification, Classification::Unrecognized);

    let fertility = &sheets[1];
    assert_eq!(fertility.record_type, Some(RecordType::FertilityAnalysis));
    // 第 6 行为空行, 仍占行号
    assert_eq!(
        fertility.rows.iter().map(|r| r.row_number).collect::<Vec<_>>(),
        vec![1, 2, 4]
    );

    let set_date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
    assert_eq!(fertility.rows[0].get("set_date"), &CellValue::Date(set_date));
    assert_eq!(fertility.rows[0].get("fertile").as_i64(), Some(270));
    assert_eq!(
        fertility.date_context.as_ref().and_then(|c| c.date_for("set_date")),
        Some(set_date)
    );

    // 鸡舍列 C4:C5 合并, 第 2 行取合并区域的值
    assert_eq!(
        fertility.rows[1].get("house_number").as_text().as_deref(),
        Some("H1")
    );

    let (_temp_file, db_path) = create_test_db().unwrap();
    insert_test_config(&db_path, config_keys::CREATE_MISSING_ENTITIES, "true").unwrap();
    let store = Arc::new(SqliteRecordStore::new(&db_path).unwrap());
    let mut queue = ImportQueue::new(RowValidator::new(), BulkImporter::new(store.clone()));
    let config = load_config(&db_path).await;
    for sheet in sheets {
        queue.enqueue(sheet, config.clone());
    }
    let summary = queue.run().await;

    assert_eq!(summary.report("Notes").unwrap().state, SheetState::Parsed);
    assert_eq!(summary.report("Fertility").unwrap().state, SheetState::Completed);
    assert_eq!(summary.total_success(), 3);
    assert_eq!(store.count_entities(EntityKind::House).unwrap(), 2);
}
