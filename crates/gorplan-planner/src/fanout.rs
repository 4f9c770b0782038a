//! Fan-out resolution: one resolved task in, one or more command entries out.

use gorplan_core::query::{
    first_verb, is_gord, is_write_stage, quote_safe_split, stages, write_target, WriteTarget,
};
use gorplan_core::{CommandEntry, Error, FanOutResult, Result, TERMINAL_MARKER};

use crate::session::PlanContext;

/// What the planner knows about a task when it asks for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutRequest {
    pub task_name: String,
    /// Placeholder the task writes to, when it names one.
    pub output: Option<String>,
    /// Placeholder-substituted query.
    pub query: String,
    pub cache_path: Option<String>,
    pub has_fork_write: bool,
    /// The task holds the user's answer; its single entry is terminal.
    pub is_final: bool,
}

impl FanOutRequest {
    /// `create_name` of an entry standing for the whole task.
    pub fn create_name(&self) -> &str {
        if self.is_final {
            TERMINAL_MARKER
        } else {
            self.output.as_deref().unwrap_or(&self.task_name)
        }
    }

    /// The one entry produced when there is nothing to split.
    pub fn single_entry(&self) -> FanOutResult {
        FanOutResult {
            entries: vec![CommandEntry::new(
                self.query.clone(),
                self.create_name(),
                self.cache_path.clone(),
                self.task_name.clone(),
            )],
            remove_from_create: true,
        }
    }
}

/// Decides whether a task runs as-is or as partitions plus a gather step.
pub trait FanOutResolver: Send + Sync {
    fn expand(&self, request: &FanOutRequest, ctx: &PlanContext) -> Result<FanOutResult>;
}

/// Reference resolver for `-split N` on parallel verbs.
///
/// Regions from `config.split_regions` are cut into `min(N, regions)`
/// contiguous buckets. Each bucket runs the query with `gor -p <regions>`;
/// the gather entry lists the partitions in a dictionary command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitResolver;

fn split_count(first_stage_words: &[String]) -> Result<Option<(usize, usize)>> {
    let Some(i) = first_stage_words
        .iter()
        .position(|w| w.eq_ignore_ascii_case("-split"))
    else {
        return Ok(None);
    };
    let value = first_stage_words
        .get(i + 1)
        .ok_or_else(|| Error::parsing("-split", "missing partition count"))?;
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some((i, n))),
        _ => Err(Error::parsing(value.as_str(), "invalid -split partition count")),
    }
}

/// Contiguous, near-equal buckets.
fn buckets(regions: &[String], n: usize) -> Vec<&[String]> {
    let n = n.min(regions.len()).max(1);
    let base = regions.len() / n;
    let extra = regions.len() % n;
    let mut out = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let len = base + usize::from(i < extra);
        out.push(&regions[start..start + len]);
        start += len;
    }
    out
}

fn placeholder_base(task_name: &str) -> &str {
    let inner = task_name.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        "query"
    } else {
        inner
    }
}

impl FanOutResolver for SplitResolver {
    fn expand(&self, request: &FanOutRequest, ctx: &PlanContext) -> Result<FanOutResult> {
        let all_stages = stages(&request.query);
        let Some(first) = all_stages.first() else {
            return Ok(request.single_entry());
        };
        if !ctx.config.is_parallel_verb(&first_verb(&request.query)) {
            return Ok(request.single_entry());
        }
        let first_words = quote_safe_split(first, ' ');
        let Some((split_at, n)) = split_count(&first_words)? else {
            return Ok(request.single_entry());
        };
        if ctx.config.split_regions.is_empty() {
            return Err(Error::Config("split_regions must not be empty".into()));
        }

        let folder = request
            .cache_path
            .as_deref()
            .filter(|p| is_gord(p))
            .map(String::from);
        // A literal, non-dictionary write target belongs to the gather step.
        let drop_write = matches!(
            write_target(&request.query),
            Some(WriteTarget::Path(ref p)) if !is_gord(p)
        );
        let mut tail: Vec<&str> = all_stages[1..].iter().map(String::as_str).collect();
        if drop_write && tail.last().map(|s| is_write_stage(s)).unwrap_or(false) {
            tail.pop();
        }

        let base = placeholder_base(request.output.as_deref().unwrap_or(&request.task_name));
        let mut entries = Vec::new();
        let mut gather = Vec::new();
        for (i, bucket) in buckets(&ctx.config.split_regions, n).into_iter().enumerate() {
            let regions = bucket.join(",");
            let mut w: Vec<String> = Vec::with_capacity(first_words.len());
            w.push("gor".to_string());
            w.extend(
                first_words
                    .iter()
                    .enumerate()
                    .skip(1)
                    .filter(|(k, _)| *k != split_at && *k != split_at + 1)
                    .map(|(_, s)| s.clone()),
            );
            w.push("-p".to_string());
            w.push(regions.clone());
            let mut query = w.join(" ");
            for stage in &tail {
                query.push_str(" | ");
                query.push_str(stage);
            }

            let name = format!("[{base}__part{}]", i + 1);
            gather.push(format!("{name} {regions}"));
            entries.push(CommandEntry::new(
                query,
                name,
                folder.clone(),
                request.task_name.clone(),
            ));
        }

        let gather_query = match &folder {
            Some(f) => format!("gordictfolder {f} {}", gather.join(" ")),
            None => format!("gordictpart {}", gather.join(" ")),
        };
        tracing::debug!(
            task = %request.task_name,
            partitions = entries.len(),
            "split into partitions"
        );
        entries.push(CommandEntry::new(
            gather_query,
            request.create_name(),
            request.cache_path.clone(),
            request.task_name.clone(),
        ));
        Ok(FanOutResult {
            entries,
            remove_from_create: true,
        })
    }
}
