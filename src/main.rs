// ==========================================
// 孵化场批量导入 - 命令行入口
// ==========================================
// 用法:
//   hatchery-import <workbook> [db_path] [--skip-duplicates | --overwrite]
//                   [--create-missing] [--timeout-ms N] [--json]
// 环境变量:
//   HATCHERY_IMPORT_DB_PATH  默认数据库路径
//   RUST_LOG                 日志级别（日志写 stderr）
// ==========================================

use anyhow::{bail, Context, Result};
use hatchery_import::config::{ConfigManager, ImportConfig, ImportConfigReader};
use hatchery_import::db::{init_schema, open_sqlite_connection};
use hatchery_import::importer::{
    progress_channel, BulkImporter, ImportQueue, RowValidator, RunSummary, SheetParser,
};
use hatchery_import::{logging, ProgressEvent, SqliteRecordStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USAGE: &str = "用法: hatchery-import <workbook> [db_path] [--skip-duplicates | --overwrite] \
[--create-missing] [--timeout-ms N] [--json]";

#[derive(Debug, Default)]
struct CliArgs {
    workbook: String,
    db_path: Option<String>,
    skip_duplicates: Option<bool>,
    create_missing: bool,
    timeout_ms: Option<u64>,
    json: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<CliArgs> {
    let mut cli = CliArgs::default();
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--skip-duplicates" => cli.skip_duplicates = Some(true),
            "--overwrite" => cli.skip_duplicates = Some(false),
            "--create-missing" => cli.create_missing = true,
            "--json" => cli.json = true,
            "--timeout-ms" => {
                let raw = args.next().context("--timeout-ms 需要参数")?;
                cli.timeout_ms = Some(raw.parse().with_context(|| format!("无效超时: {}", raw))?);
            }
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("未知参数 {}\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    cli.workbook = positional.next().context(USAGE)?;
    cli.db_path = positional.next();
    Ok(cli)
}

/// 默认数据库路径（环境变量 > 用户数据目录 > 当前目录）
fn default_db_path() -> String {
    if let Ok(path) = std::env::var("HATCHERY_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./hatchery_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("hatchery-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("hatchery_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = parse_args(std::env::args().skip(1))?;
    let db_path = cli.db_path.clone().unwrap_or_else(default_db_path);
    tracing::info!(version = hatchery_import::VERSION, db_path = %db_path, "启动导入");

    let conn = open_sqlite_connection(&db_path).context("打开数据库失败")?;
    init_schema(&conn).context("初始化数据库结构失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let config_manager = ConfigManager::from_connection(conn.clone())?;
    let mut base = ImportConfig::load(&config_manager).await?;
    if let Some(skip) = cli.skip_duplicates {
        base = base.skip_duplicates(skip);
    }
    if cli.create_missing {
        base = base.create_missing_entities(true);
    }
    if let Some(ms) = cli.timeout_ms {
        base = base.timeout(Duration::from_millis(ms));
    }

    // 配置的已知鸡群目录为附加来源, 存储中已有的鸡群由队列逐表并入
    let mut validator = RowValidator::new();
    if let Some(flocks) = config_manager.get_known_flocks().await? {
        validator = validator.with_known_flocks(flocks);
    }

    // 解析失败终止整次运行
    let sheets = SheetParser::new().parse_file(&cli.workbook)?;

    let (tx, mut progress) = progress_channel();
    let base = base.with_progress(tx);

    let store = Arc::new(SqliteRecordStore::from_connection(conn));
    let mut queue = ImportQueue::new(validator, BulkImporter::new(store));
    for sheet in sheets {
        queue.enqueue(sheet, base.clone());
    }
    drop(base);

    let reporter = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            match event {
                ProgressEvent::SheetStarted { sheet_name, total } => {
                    eprintln!("[{}] 开始导入 {} 行", sheet_name, total);
                }
                ProgressEvent::RowProcessed {
                    sheet_name,
                    current,
                    total,
                } if current == total || current % 100 == 0 => {
                    eprintln!("[{}] {}/{}", sheet_name, current, total);
                }
                ProgressEvent::SheetFinished { sheet_name, outcome } => {
                    eprintln!("[{}] {}", sheet_name, outcome);
                }
                _ => {}
            }
        }
    });

    let summary = queue.run().await;
    // 队列已清空, 发送端随配置释放, 进度流随之结束
    drop(queue);
    reporter.await.context("进度输出任务异常")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("run_id={}", summary.run_id);
    for report in &summary.reports {
        let record_type = report
            .record_type
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        print!(
            "{} [{}] {} 错误={} 警告={}",
            report.sheet_name,
            record_type,
            report.state,
            report.summary.errors,
            report.summary.warnings
        );
        if let Some(result) = &report.result {
            print!(
                " 成功={} 失败={} 跳过={} 未处理={}",
                result.success, result.failure, result.skipped, result.unprocessed
            );
        }
        println!();
        if let Some(error) = &report.error {
            println!("  {}", error);
        }
        for issue in report.issues.iter().filter(|i| i.is_error()).take(20) {
            println!("  第 {} 行 {}: {}", issue.row, issue.column, issue.message);
        }
    }
}
