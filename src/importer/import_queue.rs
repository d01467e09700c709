// ==========================================
// 孵化场批量导入 - 多表导入队列
// ==========================================
// 职责: 按入队顺序逐表 校验 → 门禁 → 导入, 汇总为 RunSummary
// 红线: 严格串行; 单表的任何结局都不影响后续工作表
//       状态迁移经 SheetState::can_transition_to 检查
// 参照: 每张表校验前读取存储中已有的鸡群, 并入配置的已知鸡群目录
// ==========================================

use crate::config::ImportConfig;
use crate::domain::import::{ImportResult, ValidationIssue, ValidationSummary};
use crate::domain::sheet::SheetData;
use crate::domain::types::{EntityKind, RecordType, SheetState};
use crate::importer::bulk_importer::BulkImporter;
use crate::importer::error::{ImportError, PipelineResult};
use crate::importer::row_validator::RowValidator;
use crate::repository::RecordStore;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

// ==========================================
// SheetReport - 单表报告
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct SheetReport {
    pub sheet_name: String,
    pub record_type: Option<RecordType>,
    pub state: SheetState,
    pub summary: ValidationSummary,
    pub issues: Vec<ValidationIssue>,
    pub result: Option<ImportResult>,
    /// 未进入导入或导入前被拒绝的原因
    pub error: Option<String>,
}

impl SheetReport {
    fn new(sheet: &SheetData) -> Self {
        Self {
            sheet_name: sheet.sheet_name.clone(),
            record_type: sheet.record_type,
            state: SheetState::Pending,
            summary: ValidationSummary {
                total_rows: sheet.row_count(),
                ..ValidationSummary::default()
            },
            issues: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// 状态迁移（非法迁移返回 InvalidStateTransition）
    fn transition(&mut self, to: SheetState) -> PipelineResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(ImportError::InvalidStateTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// 是否已导入（含部分导入）
    pub fn was_imported(&self) -> bool {
        self.result.is_some()
    }
}

// ==========================================
// RunSummary - 单次运行汇总
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub reports: Vec<SheetReport>,
}

impl RunSummary {
    pub fn report(&self, sheet_name: &str) -> Option<&SheetReport> {
        self.reports.iter().find(|r| r.sheet_name == sheet_name)
    }

    pub fn total_success(&self) -> usize {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref())
            .map(|r| r.success)
            .sum()
    }
}

// ==========================================
// ImportQueue
// ==========================================
pub struct ImportQueue<S: RecordStore> {
    validator: RowValidator,
    importer: BulkImporter<S>,
    pending: Vec<(SheetData, ImportConfig)>,
}

impl<S: RecordStore> ImportQueue<S> {
    pub fn new(validator: RowValidator, importer: BulkImporter<S>) -> Self {
        Self {
            validator,
            importer,
            pending: Vec::new(),
        }
    }

    /// 选中一张工作表加入队列
    pub fn enqueue(&mut self, sheet: SheetData, config: ImportConfig) {
        self.pending.push((sheet, config));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 按入队顺序逐表执行, 清空队列
    #[instrument(skip(self), fields(run_id, sheets = self.pending.len()))]
    pub async fn run(&mut self) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let mut reports = Vec::with_capacity(self.pending.len());
        for (sheet, config) in std::mem::take(&mut self.pending) {
            let mut report = SheetReport::new(&sheet);
            if let Err(e) = self.process(sheet, &config, &mut report).await {
                warn!(sheet = %report.sheet_name, error = %e, "工作表处理中断");
                report.error = Some(e.to_string());
            }
            reports.push(report);
        }

        info!(
            run_id = %run_id,
            imported = reports.iter().filter(|r| r.was_imported()).count(),
            "导入运行结束"
        );
        RunSummary { run_id, reports }
    }

    /// 本表使用的校验器（已知鸡群 = 配置目录 + 存储中已有鸡群）
    async fn sheet_validator(&self) -> RowValidator {
        match self.importer.store().list_entity_keys(EntityKind::Flock).await {
            Ok(flocks) => self.validator.clone().extend_known_flocks(flocks),
            Err(e) => {
                warn!(error = %e, "读取已有鸡群失败, 仅使用配置的鸡群目录");
                self.validator.clone()
            }
        }
    }

    async fn process(
        &self,
        sheet: SheetData,
        config: &ImportConfig,
        report: &mut SheetReport,
    ) -> PipelineResult<()> {
        report.transition(SheetState::Parsed)?;

        // 无法分类的工作表不参与校验与导入
        if sheet.record_type.is_none() {
            return Err(ImportError::SheetUnclassified {
                sheet: sheet.sheet_name.clone(),
            });
        }

        report.transition(SheetState::Validating)?;
        let checked = self.sheet_validator().await.check_sheet(sheet)?;
        report.summary = checked.summary();
        report.issues = checked.issues().to_vec();

        if checked.is_blocking() {
            report.transition(SheetState::Blocked)?;
        }
        let ready = checked.into_ready()?;
        report.transition(SheetState::Ready)?;
        report.transition(SheetState::Importing)?;

        let result = self.importer.import(&ready, config).await?;
        report.transition(result.outcome.as_state())?;
        report.result = Some(result);
        Ok(())
    }
}
