mod charset;
mod codec;
mod error;
mod font;
mod glyph_report;
mod perf;
mod plan;
mod pool;
mod report;

pub use charset::{
    CATEGORY_ORDER, Category, CharacterDatabase, CharsetPartition, CharsetSelection,
    CodepointSet, JsonCharsetDatabase, StaticCharsetDatabase, partition,
};
pub use codec::{ConversionError, FontCodec};
pub use error::{FontSplitError, Stage};
pub use font::{FontBuffer, FontType};
pub use glyph_report::{CoverageReport, MissingGlyph};
pub use plan::{ChunkBudget, Subset, plan_subsets, split_balanced};
pub use pool::{
    FailureKind, PoolConfig, PoolState, ResultDescriptor, SubsetTask, TaskFailure, TaskOutcome,
    WorkerPool, WorkerStrategy,
};
pub use report::{PoolStats, RunSummary, StageOutcome, StageRecord};

use perf::PerfLogger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_POOL_SIZE: usize = 8;

/// Naming metadata for the stylesheet collaborator. It is returned on the
/// `RunSummary`, with `font_family` filled from the source font when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssOptions {
    pub font_family: Option<String>,
    pub font_weight: Option<String>,
    pub font_style: Option<String>,
    pub font_display: Option<String>,
    pub file_name: String,
}

impl Default for CssOptions {
    fn default() -> Self {
        Self {
            font_family: None,
            font_weight: None,
            font_style: None,
            font_display: None,
            file_name: "result".to_string(),
        }
    }
}

impl CssOptions {
    fn resolve(&self, font: &FontBuffer) -> CssOptions {
        let mut css = self.clone();
        if css.font_family.is_none() {
            css.font_family = font.family_name();
        }
        css
    }
}

#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub font_path: PathBuf,
    pub destination: PathBuf,
    pub font_type: FontType,
    pub charset: CharsetSelection,
    pub budget: ChunkBudget,
    pub css: CssOptions,
}

impl SplitRequest {
    pub fn new(font_path: impl Into<PathBuf>) -> Self {
        Self {
            font_path: font_path.into(),
            destination: PathBuf::from("./build"),
            font_type: FontType::Ttf,
            charset: CharsetSelection::default(),
            budget: ChunkBudget::default(),
            css: CssOptions::default(),
        }
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = path.into();
        self
    }

    pub fn font_type(mut self, font_type: FontType) -> Self {
        self.font_type = font_type;
        self
    }

    pub fn charset(mut self, charset: CharsetSelection) -> Self {
        self.charset = charset;
        self
    }

    pub fn budget(mut self, budget: ChunkBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn css(mut self, css: CssOptions) -> Self {
        self.css = css;
        self
    }
}

pub struct FontSplitter {
    database: Arc<dyn CharacterDatabase>,
    codec: Arc<dyn FontCodec>,
    pool_size: usize,
    worker_strategy: WorkerStrategy,
    coverage_filter: bool,
    perf: Option<PerfLogger>,
}

#[derive(Clone)]
pub struct FontSplitterBuilder {
    database: Arc<dyn CharacterDatabase>,
    codec: Arc<dyn FontCodec>,
    pool_size: usize,
    worker_strategy: WorkerStrategy,
    coverage_filter: bool,
    perf_path: Option<PathBuf>,
    env_errors: Vec<String>,
}

impl FontSplitterBuilder {
    pub fn new(database: Arc<dyn CharacterDatabase>, codec: Arc<dyn FontCodec>) -> Self {
        Self {
            database,
            codec,
            pool_size: DEFAULT_POOL_SIZE,
            worker_strategy: WorkerStrategy::default(),
            coverage_filter: false,
            perf_path: None,
            env_errors: Vec::new(),
        }
    }

    /// Maximum number of subsets converted at the same time.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn worker_strategy(mut self, strategy: WorkerStrategy) -> Self {
        self.worker_strategy = strategy;
        self
    }

    // Drop codepoints the source font has no glyph for before planning.
    // Only sfnt (ttf/otf) sources can be checked.
    pub fn coverage_filter(mut self, enabled: bool) -> Self {
        self.coverage_filter = enabled;
        self
    }

    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    /// Reads `FONTSPLIT_POOL_SIZE`, `FONTSPLIT_WORKER`, `FONTSPLIT_COVERAGE`
    /// and `FONTSPLIT_PERF_LOG`. Bad values surface from `build()`.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("FONTSPLIT_POOL_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(size) => self.pool_size = size,
                Err(_) => self
                    .env_errors
                    .push(format!("FONTSPLIT_POOL_SIZE={raw:?} is not a number")),
            }
        }
        if let Some(raw) = lookup("FONTSPLIT_WORKER") {
            match raw.parse::<WorkerStrategy>() {
                Ok(strategy) => self.worker_strategy = strategy,
                Err(err) => self.env_errors.push(format!("FONTSPLIT_WORKER: {err}")),
            }
        }
        if let Some(raw) = lookup("FONTSPLIT_COVERAGE") {
            self.coverage_filter = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        if let Some(raw) = lookup("FONTSPLIT_PERF_LOG") {
            if !raw.trim().is_empty() {
                self.perf_path = Some(PathBuf::from(raw));
            }
        }
        self
    }

    pub fn build(self) -> Result<FontSplitter, FontSplitError> {
        if !self.env_errors.is_empty() {
            return Err(FontSplitError::InvalidConfiguration(
                self.env_errors.join("; "),
            ));
        }
        if self.pool_size == 0 {
            return Err(FontSplitError::InvalidConfiguration(
                "pool_size must be at least 1".to_string(),
            ));
        }
        let perf = match self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };
        Ok(FontSplitter {
            database: self.database,
            codec: self.codec,
            pool_size: self.pool_size,
            worker_strategy: self.worker_strategy,
            coverage_filter: self.coverage_filter,
            perf,
        })
    }
}

/// Records one `StageRecord` per stage and mirrors it to the perf log.
struct Timeline {
    started: Instant,
    records: Vec<StageRecord>,
    perf: Option<PerfLogger>,
}

impl Timeline {
    fn new(perf: Option<PerfLogger>) -> Self {
        Self {
            started: Instant::now(),
            records: Vec::new(),
            perf,
        }
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<T, FontSplitError>,
    ) -> Result<T, FontSplitError> {
        self.stage_with_outcome(stage, || f().map(|value| (value, StageOutcome::Completed)))
    }

    fn stage_with_outcome<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce() -> Result<(T, StageOutcome), FontSplitError>,
    ) -> Result<T, FontSplitError> {
        let start = Instant::now();
        let result = f();
        let end = Instant::now();
        let (result, outcome) = match result {
            Ok((value, outcome)) => (Ok(value), outcome),
            Err(err) => {
                let message = err.to_string();
                (Err(err.in_stage(stage)), StageOutcome::Failed(message))
            }
        };
        let record = StageRecord {
            stage,
            start,
            end,
            outcome,
        };
        match &record.outcome {
            StageOutcome::Failed(message) => log::error!("stage {stage} failed: {message}"),
            outcome => log::info!("stage {stage} {outcome} in {:.2?}", record.elapsed()),
        }
        if let Some(perf) = self.perf.as_ref() {
            let offset = start.saturating_duration_since(self.started);
            perf.log_stage(&record, offset.as_secs_f64() * 1000.0);
            if result.is_err() {
                perf.flush();
            }
        }
        self.records.push(record);
        result
    }

    fn finish(self) -> Vec<StageRecord> {
        self.records
    }
}

impl FontSplitter {
    pub fn builder(
        database: Arc<dyn CharacterDatabase>,
        codec: Arc<dyn FontCodec>,
    ) -> FontSplitterBuilder {
        FontSplitterBuilder::new(database, codec)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn worker_strategy(&self) -> WorkerStrategy {
        self.worker_strategy
    }

    /// Runs partition, font loading, planning and dispatch in order. The first
    /// fatal error stops the run and comes back wrapped with its stage.
    pub fn run(&self, request: &SplitRequest) -> Result<RunSummary, FontSplitError> {
        let mut timeline = Timeline::new(self.perf.clone());

        let selected = timeline.stage(Stage::Partition, || {
            charset::partition(&request.charset, self.database.as_ref())
        })?;

        let (font, selected, coverage) = timeline.stage(Stage::LoadFont, || {
            let font = FontBuffer::load(&request.font_path)?;
            log::info!(
                "loaded {} ({}, {} bytes)",
                request.font_path.display(),
                font.format(),
                font.len()
            );
            if !self.coverage_filter {
                return Ok((font, selected, CoverageReport::default()));
            }
            let (filtered, report) = font.filter_coverage(&selected)?;
            if !report.is_empty() {
                log::warn!(
                    "{} selected codepoints have no glyph in the source font",
                    report.total_missing()
                );
            }
            Ok((font, filtered, report))
        })?;

        let subsets = timeline.stage(Stage::Plan, || {
            let subsets = plan::plan_subsets(&selected, &request.budget)?;
            log::info!("planned {} subsets", subsets.len());
            Ok(subsets)
        })?;
        drop(selected);
        let css = request.css.resolve(&font);

        let (outcomes, pool) = timeline.stage_with_outcome(Stage::Dispatch, || {
            self.dispatch(font, subsets, request)
        })?;

        let summary = RunSummary::reduce(outcomes, timeline.finish(), coverage, pool, css);
        if let Some(perf) = self.perf.as_ref() {
            perf.log_counts(
                "run",
                &[
                    ("subsets", summary.total_tasks() as u64),
                    ("succeeded", summary.succeeded as u64),
                    ("failed", summary.failed as u64),
                    ("bytes", summary.total_bytes),
                    ("peak_active", summary.pool.peak_active as u64),
                ],
            );
            perf.flush();
        }
        log::info!(
            "{} of {} subsets written, {} bytes total in {:.2?}",
            summary.succeeded,
            summary.total_tasks(),
            summary.total_bytes,
            summary.total_elapsed()
        );
        Ok(summary)
    }

    fn dispatch(
        &self,
        font: FontBuffer,
        subsets: Vec<Subset>,
        request: &SplitRequest,
    ) -> Result<((Vec<TaskOutcome>, PoolStats), StageOutcome), FontSplitError> {
        let idle = PoolStats {
            capacity: self.pool_size,
            ..PoolStats::default()
        };
        if subsets.is_empty() {
            log::warn!("selection resolved to no codepoints; nothing to dispatch");
            return Ok(((Vec::new(), idle), StageOutcome::Completed));
        }
        std::fs::create_dir_all(&request.destination)?;

        let total = subsets.len();
        let mut pool = WorkerPool::initialize_with_perf(
            PoolConfig {
                pool_size: self.pool_size,
                strategy: self.worker_strategy,
                task_capacity: total,
            },
            font,
            Arc::clone(&self.codec),
            self.perf.clone(),
        )?;
        log::info!(
            "dispatching {} subsets across {} workers ({:?})",
            total,
            self.pool_size,
            self.worker_strategy
        );
        for subset in subsets {
            pool.submit(SubsetTask {
                subset,
                destination: request.destination.clone(),
                font_type: request.font_type,
            })?;
        }
        let outcomes = pool.await_all();
        pool.shutdown();
        let outcomes = outcomes?;
        let stats = PoolStats {
            capacity: pool.capacity(),
            peak_active: pool.peak_active(),
            final_state: Some(pool.state()),
        };

        let failed = outcomes.iter().filter(|o| o.failure().is_some()).count();
        if failed == outcomes.len() {
            let failures = outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    TaskOutcome::Failed(failure) => Some(failure),
                    TaskOutcome::Succeeded(_) => None,
                })
                .collect();
            return Err(FontSplitError::AllTasksFailed { failures });
        }
        let outcome = if failed == 0 {
            StageOutcome::Completed
        } else {
            StageOutcome::Partial { failed }
        };
        Ok(((outcomes, stats), outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::FakeCodec;
    use crate::font::test_font;
    use std::path::Path;
    use std::time::Duration;

    const OTHER: [u32; 3] = [0x41, 0x42, 0x43];

    fn sc_codepoints() -> Vec<u32> {
        (0x4E00..0x4E0A).collect()
    }

    fn database() -> Arc<StaticCharsetDatabase> {
        Arc::new(
            StaticCharsetDatabase::new()
                .with(Category::Sc, sc_codepoints())
                .with(Category::Other, OTHER),
        )
    }

    fn write_font(dir: &Path, name: &str, mapped: &[u32]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, test_font::build(mapped)).expect("write font");
        path
    }

    fn request(dir: &Path) -> SplitRequest {
        SplitRequest::new(write_font(dir, "source.ttf", &OTHER))
            .destination(dir.join("build"))
            .font_type(FontType::Woff2)
            .budget(
                ChunkBudget::default()
                    .with(Category::Sc, 2)
                    .with(Category::Other, 1),
            )
    }

    #[test]
    fn end_to_end_split_writes_one_artifact_per_subset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec::default());
        let splitter = FontSplitter::builder(database(), codec.clone())
            .pool_size(2)
            .build()
            .expect("splitter");

        let summary = splitter.run(&request(dir.path())).expect("run");

        assert_eq!(summary.total_tasks(), 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(codec.calls(), 3);
        let layout: Vec<(Category, usize)> = summary
            .successes()
            .map(|d| (d.category, d.codepoint_count))
            .collect();
        assert_eq!(
            layout,
            vec![(Category::Other, 3), (Category::Sc, 5), (Category::Sc, 5)]
        );
        for descriptor in summary.successes() {
            assert!(descriptor.path.starts_with(dir.path().join("build")));
            assert!(descriptor.path.exists());
        }
        assert_eq!(
            summary.total_bytes,
            summary.successes().map(|d| d.byte_size).sum::<u64>()
        );
        assert_eq!(summary.pool.final_state, Some(PoolState::Terminated));
        assert!(summary.pool.peak_active <= 2);

        let stages: Vec<Stage> = summary.stages.iter().map(|r| r.stage).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
        assert!(summary
            .stages
            .windows(2)
            .all(|pair| pair[0].end <= pair[1].start));
        assert!(summary
            .stages
            .iter()
            .all(|r| r.outcome == StageOutcome::Completed));
    }

    #[test]
    fn zero_budget_stops_before_dispatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec::default());
        let splitter = FontSplitter::builder(database(), codec.clone())
            .build()
            .expect("splitter");
        let request = request(dir.path()).budget(ChunkBudget::default().with(Category::Sc, 0));

        let err = splitter.run(&request).expect_err("zero budget");
        assert!(err.is_configuration());
        assert_eq!(err.stage(), Some(Stage::Plan));
        assert_eq!(codec.calls(), 0);
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn disabled_selection_never_creates_a_pool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec::default());
        let splitter = FontSplitter::builder(database(), codec.clone())
            .build()
            .expect("splitter");
        let request = request(dir.path()).charset(CharsetSelection::none());

        let err = splitter.run(&request).expect_err("nothing selected");
        assert!(err.is_configuration());
        assert_eq!(err.stage(), Some(Stage::Partition));
        assert_eq!(codec.calls(), 0);
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn missing_character_data_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let splitter = FontSplitter::builder(database(), Arc::new(FakeCodec::default()))
            .build()
            .expect("splitter");
        let request = request(dir.path()).charset(CharsetSelection::default().with(Category::Tc, true));

        let err = splitter.run(&request).expect_err("no TC data");
        assert_eq!(err.stage(), Some(Stage::Partition));
        assert!(matches!(err.cause(), FontSplitError::DataUnavailable(_)));
    }

    #[test]
    fn unreadable_font_fails_the_load_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let splitter = FontSplitter::builder(database(), Arc::new(FakeCodec::default()))
            .build()
            .expect("splitter");
        let request = SplitRequest::new(dir.path().join("missing.ttf"));

        let err = splitter.run(&request).expect_err("missing font");
        assert_eq!(err.stage(), Some(Stage::LoadFont));
        assert!(matches!(err.cause(), FontSplitError::Io(_)));
    }

    #[test]
    fn partial_failure_is_reported_in_the_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec {
            fail_when_contains: Some(0x4E04),
            ..FakeCodec::default()
        });
        let splitter = FontSplitter::builder(database(), codec)
            .pool_size(3)
            .build()
            .expect("splitter");
        // SC split into four subsets plus one "other" subset: five tasks.
        let request = request(dir.path()).budget(
            ChunkBudget::default()
                .with(Category::Sc, 4)
                .with(Category::Other, 1),
        );

        let summary = splitter.run(&request).expect("partial run");
        assert_eq!(summary.total_tasks(), 5);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        let failure = summary.failures().next().expect("one failure");
        assert_eq!(failure.kind, FailureKind::ConversionFailed);
        assert_eq!(failure.category, Category::Sc);
        assert_eq!(
            summary.stage(Stage::Dispatch).map(|r| r.outcome.clone()),
            Some(StageOutcome::Partial { failed: 1 })
        );
    }

    #[test]
    fn every_task_failing_fails_the_dispatch_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let splitter = FontSplitter::builder(
            Arc::new(StaticCharsetDatabase::new().with(Category::Other, [0x41, 0x42])),
            Arc::new(FakeCodec {
                fail_when_contains: Some(0x41),
                ..FakeCodec::default()
            }),
        )
        .build()
        .expect("splitter");
        let request = request(dir.path()).charset(CharsetSelection::none().with(Category::Other, true));

        let err = splitter.run(&request).expect_err("all failed");
        assert_eq!(err.stage(), Some(Stage::Dispatch));
        match err.cause() {
            FontSplitError::AllTasksFailed { failures } => assert_eq!(failures.len(), 1),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn empty_resolution_skips_the_pool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec::default());
        let splitter = FontSplitter::builder(
            Arc::new(StaticCharsetDatabase::new().with(Category::Other, Vec::new())),
            codec.clone(),
        )
        .build()
        .expect("splitter");
        let request = request(dir.path()).charset(CharsetSelection::none().with(Category::Other, true));

        let summary = splitter.run(&request).expect("empty run");
        assert_eq!(summary.total_tasks(), 0);
        assert_eq!(summary.pool.final_state, None);
        assert_eq!(codec.calls(), 0);
    }

    #[test]
    fn coverage_filter_plans_only_glyphs_the_font_has() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut mapped = OTHER.to_vec();
        mapped.extend(0x4E00..0x4E04);
        let font_path = write_font(dir.path(), "covered.ttf", &mapped);
        let splitter = FontSplitter::builder(database(), Arc::new(FakeCodec::default()))
            .coverage_filter(true)
            .build()
            .expect("splitter");
        let request = request(dir.path()).font_type(FontType::Ttf);
        let request = SplitRequest {
            font_path,
            ..request
        };

        let summary = splitter.run(&request).expect("filtered run");
        let sc_sizes: Vec<usize> = summary
            .successes()
            .filter(|d| d.category == Category::Sc)
            .map(|d| d.codepoint_count)
            .collect();
        assert_eq!(sc_sizes, vec![2, 2]);
        assert_eq!(summary.coverage.missing_count(Category::Sc), 6);
        assert_eq!(summary.coverage.missing_count(Category::Other), 0);
    }

    #[test]
    fn css_options_come_back_with_the_source_family() {
        let dir = tempfile::tempdir().expect("tempdir");
        let named = dir.path().join("named.ttf");
        std::fs::write(
            &named,
            test_font::build_named(&OTHER, &[(1, "LXGW WenKai")]),
        )
        .expect("write font");
        let splitter = FontSplitter::builder(database(), Arc::new(FakeCodec::default()))
            .build()
            .expect("splitter");
        let css = CssOptions {
            font_weight: Some("700".to_string()),
            file_name: "wenkai".to_string(),
            ..CssOptions::default()
        };
        let request = SplitRequest {
            font_path: named,
            ..request(dir.path()).css(css)
        };

        let summary = splitter.run(&request).expect("run");
        assert_eq!(summary.css.font_family.as_deref(), Some("LXGW WenKai"));
        assert_eq!(summary.css.font_weight.as_deref(), Some("700"));
        assert_eq!(summary.css.file_name, "wenkai");

        let explicit = CssOptions {
            font_family: Some("Body".to_string()),
            ..CssOptions::default()
        };
        let summary = splitter
            .run(&request.clone().css(explicit))
            .expect("run");
        assert_eq!(summary.css.font_family.as_deref(), Some("Body"));
        assert_eq!(summary.css.file_name, "result");
    }

    #[test]
    fn perf_log_records_each_stage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let perf_path = dir.path().join("perf.log");
        let splitter = FontSplitter::builder(database(), Arc::new(FakeCodec::default()))
            .worker_strategy(WorkerStrategy::Persistent)
            .perf_log(&perf_path)
            .build()
            .expect("splitter");
        splitter.run(&request(dir.path())).expect("run");

        let log = std::fs::read_to_string(&perf_path).expect("perf log");
        let records: Vec<serde_json::Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        let stages: Vec<&str> = records
            .iter()
            .filter(|r| r["type"] == "perf.stage")
            .filter_map(|r| r["name"].as_str())
            .collect();
        assert_eq!(stages, vec!["partition", "load_font", "plan", "dispatch"]);
        assert_eq!(
            records.iter().filter(|r| r["name"] == "task.convert").count(),
            3
        );
        let counts = records
            .iter()
            .find(|r| r["type"] == "perf.counts")
            .expect("run counts");
        assert_eq!(counts["counts"]["succeeded"], 3);
    }

    #[test]
    fn env_overrides_are_validated_at_build() {
        fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
            move |key| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
            }
        }
        let builder = FontSplitter::builder(database(), Arc::new(FakeCodec::default()));

        let splitter = builder
            .clone()
            .apply_env_from(env(&[
                ("FONTSPLIT_POOL_SIZE", "3"),
                ("FONTSPLIT_WORKER", "persistent"),
            ]))
            .build()
            .expect("valid env");
        assert_eq!(splitter.pool_size(), 3);
        assert_eq!(splitter.worker_strategy(), WorkerStrategy::Persistent);

        let err = builder
            .clone()
            .apply_env_from(env(&[("FONTSPLIT_POOL_SIZE", "many")]))
            .build()
            .err()
            .expect("bad pool size");
        assert!(err.is_configuration());

        let err = builder
            .apply_env_from(env(&[("FONTSPLIT_POOL_SIZE", "0")]))
            .build()
            .err()
            .expect("zero pool size");
        assert!(err.is_configuration());
    }

    #[test]
    fn slow_tasks_still_respect_the_pool_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let codec = Arc::new(FakeCodec {
            delay: Duration::from_millis(10),
            ..FakeCodec::default()
        });
        let splitter = FontSplitter::builder(database(), codec.clone())
            .pool_size(2)
            .build()
            .expect("splitter");
        let request = request(dir.path()).budget(
            ChunkBudget::default()
                .with(Category::Sc, 10)
                .with(Category::Other, 3),
        );

        let summary = splitter.run(&request).expect("run");
        assert_eq!(summary.total_tasks(), 13);
        assert!(codec.peak() <= 2);
        assert_eq!(summary.pool.capacity, 2);
    }
}
