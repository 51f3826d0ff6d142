//! Harvest loop
//!
//! One run walks the keyword plan of a target area with a single browser
//! session: search, scroll the result list, then visit each candidate's
//! detail page and persist what the extractor finds. The loop is an explicit
//! state machine driven by `HarvestService::step`.
//!
//! Failure handling:
//! - a failed candidate is logged and skipped
//! - a failed keyword is logged and skipped without advancing the checkpoint
//! - the block marker ends the run immediately

#![allow(clippy::uninlined_format_args)]

use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::keyword_plan::{KeywordPlan, RegionTable};
use crate::application::list_collector::{CandidateSet, ListCollector, ScrollDecision, ScrollTracker};
use crate::domain::checkpoint::Checkpoint;
use crate::domain::record::PartialRecord;
use crate::domain::repositories::{CheckpointStore, RecordRepository};
use crate::infrastructure::browser::{BrowserEngine, BrowserError, BrowserLauncher, WaitPolicy};
use crate::infrastructure::config::{HarvestConfig, naver_place};
use crate::infrastructure::pacing::Pacer;
use crate::infrastructure::parsing::{FieldExtractor, PageSnapshot};

/// Fatal harvest failures
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Blocked by the site while processing '{keyword}'")]
    Blocked { keyword: String },

    #[error("Browser failed to start: {0}")]
    BrowserLaunch(#[source] BrowserError),

    #[error("Checkpoint unavailable: {0:#}")]
    Checkpoint(anyhow::Error),

    #[error("Invalid harvest configuration: {0}")]
    Config(String),
}

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    pub target_area: String,
    pub quota: usize,
    pub resume: bool,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// Every planned keyword was processed
    Done,
    QuotaMet,
    Blocked { keyword: String },
}

/// Run summary
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub run_id: Uuid,
    pub target_area: String,
    pub quota: usize,
    pub keywords_planned: usize,
    /// Index the run started at after resume
    pub start_index: usize,
    pub keywords_completed: usize,
    pub saved: usize,
    pub skipped_incomplete: usize,
    pub failed_candidates: usize,
    pub failed_persists: usize,
    pub failed_keywords: usize,
    pub outcome: HarvestOutcome,
}

impl HarvestReport {
    fn new(request: &HarvestRequest, plan: &KeywordPlan, start_index: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_area: plan.target_area.clone(),
            quota: request.quota,
            keywords_planned: plan.len(),
            start_index,
            keywords_completed: 0,
            saved: 0,
            skipped_incomplete: 0,
            failed_candidates: 0,
            failed_persists: 0,
            failed_keywords: 0,
            outcome: HarvestOutcome::Done,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.outcome, HarvestOutcome::Blocked { .. })
    }

    /// Surface a blocked run as an error
    pub fn into_result(self) -> Result<Self, HarvestError> {
        match &self.outcome {
            HarvestOutcome::Blocked { keyword } => Err(HarvestError::Blocked {
                keyword: keyword.clone(),
            }),
            _ => Ok(self),
        }
    }
}

/// States of the harvest loop. Each keyword runs
/// `Searching -> Scrolling -> CollectingCandidates -> VisitingDetail`.
#[derive(Debug)]
pub enum HarvestState {
    Searching { index: usize },
    Scrolling {
        index: usize,
        tracker: ScrollTracker,
        candidates: CandidateSet,
    },
    CollectingCandidates { index: usize, candidates: CandidateSet },
    VisitingDetail { index: usize, queue: VecDeque<String> },
    Blocked { keyword: String },
    Finished(HarvestOutcome),
}

impl HarvestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Transition guards
pub mod guards {
    use crate::infrastructure::config::naver_place;

    pub fn quota_met(saved: usize, quota: usize) -> bool {
        saved >= quota
    }

    pub fn block_detected(content: &str) -> bool {
        content.contains(naver_place::BLOCK_MARKER)
    }
}

struct RunContext<'a> {
    page: &'a dyn BrowserEngine,
    plan: KeywordPlan,
    quota: usize,
    report: HarvestReport,
}

impl RunContext<'_> {
    fn keyword(&self, index: usize) -> &str {
        &self.plan.keywords[index]
    }

    fn quota_met(&self) -> bool {
        guards::quota_met(self.report.saved, self.quota)
    }
}

pub struct HarvestService {
    launcher: Arc<dyn BrowserLauncher>,
    repository: Arc<dyn RecordRepository>,
    checkpoints: Arc<dyn CheckpointStore>,
    pacer: Arc<dyn Pacer>,
    extractor: FieldExtractor,
    collector: ListCollector,
    regions: RegionTable,
    keyword_suffix: String,
    settle: Duration,
    screenshot_dir: Option<PathBuf>,
}

impl HarvestService {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        repository: Arc<dyn RecordRepository>,
        checkpoints: Arc<dyn CheckpointStore>,
        pacer: Arc<dyn Pacer>,
        config: &HarvestConfig,
        regions: RegionTable,
    ) -> Result<Self, HarvestError> {
        let extractor = FieldExtractor::new().map_err(|e| HarvestError::Config(e.to_string()))?;

        Ok(Self {
            launcher,
            repository,
            checkpoints,
            pacer,
            extractor,
            collector: ListCollector::from_config(config),
            regions,
            keyword_suffix: config.keyword_suffix.clone(),
            settle: config.scroll_settle(),
            screenshot_dir: None,
        })
    }

    /// Save a screenshot into `dir` when a run gets blocked
    pub fn with_screenshot_dir(mut self, dir: PathBuf) -> Self {
        self.screenshot_dir = Some(dir);
        self
    }

    pub fn plan(&self, target_area: &str) -> KeywordPlan {
        KeywordPlan::new(target_area, &self.regions, &self.keyword_suffix)
    }

    pub async fn run(&self, request: HarvestRequest) -> Result<HarvestReport, HarvestError> {
        let plan = self.plan(&request.target_area);

        let checkpoint = if request.resume {
            self.checkpoints
                .read(&plan.target_area)
                .await
                .map_err(HarvestError::Checkpoint)?
        } else {
            None
        };
        let start_index = plan.start_index(checkpoint.as_ref());

        if let Some(cp) = &checkpoint {
            if start_index == 0 {
                warn!(
                    "⚠️ Checkpoint unit '{}' is not in the current keyword plan, starting over",
                    cp.last_completed_unit
                );
            } else {
                info!("🔄 Resuming after '{}' ({}/{})", cp.last_completed_unit, start_index, plan.len());
            }
        }

        let mut report = HarvestReport::new(&request, &plan, start_index);
        info!(
            "🚀 Harvest {} started: area '{}', quota {}, {} keywords",
            report.run_id,
            plan.target_area,
            request.quota,
            plan.len()
        );

        if start_index >= plan.len() {
            info!("✅ All keywords of '{}' already completed", plan.target_area);
            return Ok(report);
        }
        if guards::quota_met(0, request.quota) {
            report.outcome = HarvestOutcome::QuotaMet;
            return Ok(report);
        }

        let page = self
            .launcher
            .launch()
            .await
            .map_err(HarvestError::BrowserLaunch)?;

        let mut ctx = RunContext {
            page: page.as_ref(),
            plan,
            quota: request.quota,
            report,
        };

        let mut state = HarvestState::Searching { index: start_index };
        while !state.is_terminal() {
            state = self.step(&mut ctx, state).await;
        }

        if let Err(e) = page.close().await {
            warn!("⚠️ Browser close failed: {}", e);
        }

        let mut report = ctx.report;
        if let HarvestState::Finished(outcome) = state {
            report.outcome = outcome;
        }

        info!(
            "🏁 Harvest {} finished ({:?}): saved {}, skipped {}, failed candidates {}, failed keywords {}",
            report.run_id,
            report.outcome,
            report.saved,
            report.skipped_incomplete,
            report.failed_candidates,
            report.failed_keywords
        );
        Ok(report)
    }

    async fn step(&self, ctx: &mut RunContext<'_>, state: HarvestState) -> HarvestState {
        match state {
            HarvestState::Searching { index } => self.search(ctx, index).await,
            HarvestState::Scrolling {
                index,
                mut tracker,
                mut candidates,
            } => match self.scroll(ctx.page, &mut tracker, &mut candidates).await {
                Ok(ScrollDecision::Continue) => HarvestState::Scrolling {
                    index,
                    tracker,
                    candidates,
                },
                Ok(decision) => {
                    debug!("Scrolling '{}' ended after {} attempts: {:?}", ctx.keyword(index), tracker.attempts(), decision);
                    HarvestState::CollectingCandidates { index, candidates }
                }
                Err(e) => self.keyword_failed(ctx, index, &e),
            },
            HarvestState::CollectingCandidates { index, candidates } => {
                let queue: VecDeque<String> = candidates.into_vec().into();
                info!("📋 '{}': {} unique candidates", ctx.keyword(index), queue.len());
                HarvestState::VisitingDetail { index, queue }
            }
            HarvestState::VisitingDetail { index, mut queue } => {
                if queue.is_empty() {
                    self.complete_keyword(ctx, index).await;
                    return HarvestState::Searching { index: index + 1 };
                }
                if ctx.quota_met() {
                    return HarvestState::Finished(HarvestOutcome::QuotaMet);
                }
                let Some(place_id) = queue.pop_front() else {
                    return HarvestState::Searching { index: index + 1 };
                };
                match self.visit(ctx, index, &place_id).await {
                    Visit::Blocked => HarvestState::Blocked {
                        keyword: ctx.keyword(index).to_string(),
                    },
                    Visit::Processed => HarvestState::VisitingDetail { index, queue },
                }
            }
            HarvestState::Blocked { keyword } => {
                error!(
                    "🚫 Block marker detected while processing '{}', aborting run",
                    keyword
                );
                self.capture_block(ctx.page).await;
                HarvestState::Finished(HarvestOutcome::Blocked { keyword })
            }
            finished @ HarvestState::Finished(_) => finished,
        }
    }

    async fn search(&self, ctx: &mut RunContext<'_>, index: usize) -> HarvestState {
        if index >= ctx.plan.len() {
            return HarvestState::Finished(HarvestOutcome::Done);
        }
        if ctx.quota_met() {
            return HarvestState::Finished(HarvestOutcome::QuotaMet);
        }

        let keyword = ctx.keyword(index).to_string();
        info!("🔍 [{}/{}] Searching '{}'", index + 1, ctx.plan.len(), keyword);

        let page = ctx.page;
        self.pacer.before_navigation().await;
        let result: Result<Option<(ScrollTracker, CandidateSet)>, BrowserError> = async {
            page.navigate(&naver_place::list_url(&keyword), WaitPolicy::LoadThenSettle(self.settle))
                .await?;
            let content = page.content().await?;
            if guards::block_detected(&content) {
                return Ok(None);
            }

            self.collector.ensure_list_view(page).await?;
            let mut candidates = CandidateSet::new();
            self.collector.harvest(page, &mut candidates).await?;
            let tracker = self.collector.start_scrolling(page).await?;
            Ok(Some((tracker, candidates)))
        }
        .await;

        match result {
            Ok(Some((tracker, candidates))) => HarvestState::Scrolling {
                index,
                tracker,
                candidates,
            },
            Ok(None) => HarvestState::Blocked { keyword },
            Err(e) => self.keyword_failed(ctx, index, &e),
        }
    }

    async fn scroll(
        &self,
        page: &dyn BrowserEngine,
        tracker: &mut ScrollTracker,
        candidates: &mut CandidateSet,
    ) -> Result<ScrollDecision, BrowserError> {
        let height = self.collector.scroll_step(page).await?;
        self.collector.harvest(page, candidates).await?;
        Ok(tracker.observe(height))
    }

    async fn visit(&self, ctx: &mut RunContext<'_>, index: usize, place_id: &str) -> Visit {
        let keyword = ctx.keyword(index).to_string();
        let url = naver_place::detail_url(place_id);

        self.pacer.before_navigation().await;
        if let Err(e) = ctx
            .page
            .navigate(&url, WaitPolicy::LoadThenSettle(self.settle))
            .await
        {
            warn!("⚠️ Skipping {}: {}", place_id, e);
            ctx.report.failed_candidates += 1;
            return Visit::Processed;
        }

        let snapshot = PageSnapshot::capture(ctx.page).await;
        if guards::block_detected(&snapshot.html) || guards::block_detected(&snapshot.body_text) {
            return Visit::Blocked;
        }

        let partial = self
            .extractor
            .extract_from_snapshot(&snapshot, PartialRecord::seed(place_id, &keyword));
        if !partial.is_persistable() {
            debug!("Skipping {}: name or address missing", place_id);
            ctx.report.skipped_incomplete += 1;
            return Visit::Processed;
        }

        let record = match partial.into_record(Utc::now()) {
            Ok(record) => record,
            Err(e) => {
                warn!("⚠️ Skipping {}: {}", place_id, e);
                ctx.report.failed_candidates += 1;
                return Visit::Processed;
            }
        };

        match self.repository.upsert(&record).await {
            Ok(_) => {
                ctx.report.saved += 1;
                println!("Progress: {}/{}", ctx.report.saved, ctx.quota);
                info!("💾 Saved '{}' ({}/{})", record.name, ctx.report.saved, ctx.quota);
            }
            Err(e) => {
                warn!("⚠️ Failed to persist {}: {:#}", record.identity_key, e);
                ctx.report.failed_persists += 1;
            }
        }
        Visit::Processed
    }

    async fn complete_keyword(&self, ctx: &mut RunContext<'_>, index: usize) {
        let keyword = ctx.keyword(index).to_string();
        ctx.report.keywords_completed += 1;

        let checkpoint = Checkpoint::new(ctx.plan.target_area.clone(), keyword.clone());
        match self.checkpoints.write(&checkpoint).await {
            Ok(()) => debug!("Checkpoint advanced to '{}'", keyword),
            Err(e) => warn!("⚠️ Failed to write checkpoint for '{}': {:#}", keyword, e),
        }
        info!("✅ Keyword '{}' completed", keyword);
    }

    fn keyword_failed(&self, ctx: &mut RunContext<'_>, index: usize, e: &BrowserError) -> HarvestState {
        if e.is_timeout() {
            warn!("⚠️ Search for '{}' timed out, skipping keyword", ctx.keyword(index));
        } else {
            warn!("⚠️ Keyword '{}' failed: {}", ctx.keyword(index), e);
        }
        ctx.report.failed_keywords += 1;
        HarvestState::Searching { index: index + 1 }
    }

    async fn capture_block(&self, page: &dyn BrowserEngine) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(format!("blocked_{}.png", Utc::now().format("%Y%m%d_%H%M%S")));
        if let Err(e) = page.screenshot(&path).await {
            warn!("⚠️ Block screenshot failed: {}", e);
        }
    }
}

enum Visit {
    Processed,
    Blocked,
}
