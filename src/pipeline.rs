//! Fan-out of the four dataset jobs.
//!
//! Each dataset is fetched, normalized, serialized and published on its own scoped
//! thread. All four are joined before anything is reported, so one dataset failing (or
//! panicking) never cancels or hides the others.

use std::fs::File;
use std::io::BufReader;
use std::thread;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::TabIds;
use crate::domain::{DatasetKind, Envelope};
use crate::error::JobError;
use crate::fs_util::{create_work_dir, open_file, write_bytes_atomic};
use crate::geocode::{GeocodeClient, GeocodeResolver, GeocodeStats};
use crate::normalize::{InfoNormalizer, normalize_road, normalize_store, normalize_support};
use crate::schema::{ColumnSchema, SchemaVersion};
use crate::sheet::SheetClient;
use crate::storage::{ObjectStore, Publisher, PutReceipt};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tabs: TabIds,
    pub info_schema: SchemaVersion,
    pub prefecture: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub records: usize,
    pub receipt: PutReceipt,
}

#[derive(Debug)]
pub struct DatasetOutcome {
    pub dataset: DatasetKind,
    pub result: Result<DatasetReport, JobError>,
}

#[derive(Debug)]
pub struct JobSummary {
    pub outcomes: Vec<DatasetOutcome>,
    pub geocode: GeocodeStats,
}

impl JobSummary {
    pub fn outcome(&self, dataset: DatasetKind) -> Option<&DatasetOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.dataset == dataset)
    }

    pub fn succeeded(&self) -> Vec<DatasetKind> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_ok())
            .map(|outcome| outcome.dataset)
            .collect()
    }

    pub fn failed(&self) -> Vec<DatasetKind> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.dataset)
            .collect()
    }
}

pub struct Pipeline<S: SheetClient, G: GeocodeClient, O: ObjectStore> {
    sheets: S,
    resolver: GeocodeResolver<G>,
    publisher: Publisher<O>,
    settings: PipelineSettings,
}

impl<S: SheetClient, G: GeocodeClient, O: ObjectStore> Pipeline<S, G, O> {
    pub fn new(
        sheets: S,
        resolver: GeocodeResolver<G>,
        publisher: Publisher<O>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sheets,
            resolver,
            publisher,
            settings,
        }
    }

    pub fn sheets(&self) -> &S {
        &self.sheets
    }

    pub fn resolver(&self) -> &GeocodeResolver<G> {
        &self.resolver
    }

    /// Runs every dataset to completion. Only a failure to set up the shared working
    /// directory is returned as an error; dataset failures live in the summary.
    pub fn run(&mut self) -> Result<JobSummary, JobError> {
        let (work_dir, work_path) = create_work_dir()?;
        let context = DatasetContext {
            sheets: &self.sheets,
            publisher: &self.publisher,
            tabs: &self.settings.tabs,
            work_dir: &work_path,
        };
        let info_schema = ColumnSchema::info(self.settings.info_schema);
        let prefecture = self.settings.prefecture.as_str();
        let resolver = &mut self.resolver;

        let outcomes = thread::scope(|scope| {
            let ctx = &context;
            let info = scope.spawn(move || ctx.run_info(info_schema, prefecture, resolver));
            let road = scope.spawn(move || ctx.run_plain(DatasetKind::Road, normalize_road));
            let support =
                scope.spawn(move || ctx.run_plain(DatasetKind::Support, normalize_support));
            let store = scope.spawn(move || ctx.run_plain(DatasetKind::Store, normalize_store));

            vec![
                settle(DatasetKind::Info, info.join()),
                settle(DatasetKind::Road, road.join()),
                settle(DatasetKind::Support, support.join()),
                settle(DatasetKind::Store, store.join()),
            ]
        });

        let summary = JobSummary {
            outcomes,
            geocode: self.resolver.stats(),
        };
        log_summary(&summary);

        if let Err(err) = work_dir.close() {
            warn!(path = %work_path, error = %err, "failed to remove working directory");
        }
        Ok(summary)
    }
}

struct DatasetContext<'a, S: SheetClient, O: ObjectStore> {
    sheets: &'a S,
    publisher: &'a Publisher<O>,
    tabs: &'a TabIds,
    work_dir: &'a Utf8Path,
}

impl<S: SheetClient, O: ObjectStore> DatasetContext<'_, S, O> {
    fn download(&self, dataset: DatasetKind) -> Result<BufReader<File>, JobError> {
        let tab_id = self
            .tabs
            .get(dataset)
            .ok_or_else(|| JobError::MissingConfig(TabIds::env_name(dataset).to_string()))?;
        let path = self.work_dir.join(dataset.source_file_name());
        self.sheets.download_tab(tab_id, path.as_std_path())?;
        info!(dataset = %dataset, tab = tab_id, "downloaded sheet tab");
        Ok(BufReader::new(open_file(&path)?))
    }

    fn publish<T: Serialize>(
        &self,
        dataset: DatasetKind,
        records: &[T],
    ) -> Result<DatasetReport, JobError> {
        let key = dataset.object_key();
        let body = Envelope::new(records).to_json()?;
        write_bytes_atomic(&self.work_dir.join(&key), &body)?;
        let receipt = self.publisher.publish(&key, body)?;
        Ok(DatasetReport {
            records: records.len(),
            receipt,
        })
    }

    fn run_info<G: GeocodeClient>(
        &self,
        schema: ColumnSchema,
        prefecture: &str,
        resolver: &mut GeocodeResolver<G>,
    ) -> Result<DatasetReport, JobError> {
        let input = self.download(DatasetKind::Info)?;
        let mut normalizer = InfoNormalizer::new(schema).with_prefecture(prefecture);
        if schema.geocode {
            normalizer = normalizer.with_locator(resolver);
        }
        let records = normalizer.normalize(input)?;
        info!(
            dataset = %DatasetKind::Info,
            version = %schema.version,
            rows = records.len(),
            "normalized"
        );
        self.publish(DatasetKind::Info, &records)
    }

    fn run_plain<T, F>(&self, dataset: DatasetKind, normalize: F) -> Result<DatasetReport, JobError>
    where
        T: Serialize,
        F: FnOnce(BufReader<File>) -> Result<Vec<T>, JobError>,
    {
        let input = self.download(dataset)?;
        let records = normalize(input)?;
        info!(dataset = %dataset, rows = records.len(), "normalized");
        self.publish(dataset, &records)
    }
}

fn settle(
    dataset: DatasetKind,
    joined: thread::Result<Result<DatasetReport, JobError>>,
) -> DatasetOutcome {
    DatasetOutcome {
        dataset,
        result: joined.unwrap_or_else(|_| Err(JobError::TaskPanicked(dataset))),
    }
}

fn log_summary(summary: &JobSummary) {
    for outcome in &summary.outcomes {
        match &outcome.result {
            Ok(report) => info!(
                dataset = %outcome.dataset,
                records = report.records,
                key = %report.receipt.key,
                "dataset published"
            ),
            Err(err) => error!(dataset = %outcome.dataset, error = %err, "dataset failed"),
        }
    }
    info!(
        succeeded = summary.succeeded().len(),
        failed = summary.failed().len(),
        override_hits = summary.geocode.override_hits,
        cache_hits = summary.geocode.cache_hits,
        live_calls = summary.geocode.live_calls,
        unresolved = summary.geocode.unresolved,
        "job finished"
    );
}
