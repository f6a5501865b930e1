//! Randomized analytical query workload.
//!
//! A [`QueryProfile`] is derived once from a sample of the data; templates
//! turn it into concrete SQL. Each round issues five distinct normal
//! templates followed by one heavy (window / quantile / wide aggregation)
//! template. Templates the profile cannot satisfy are skipped.

use super::{stop_requested, StopFlag, UnitSource};
use crate::schema::{parse_timestamp, quote_ident, ColumnType, TableSchema};
use crate::{BackendKind, BenchResult, Row, WorkUnit};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;
use tracing::debug;

/// Rows of the sample file used to build a profile.
pub const PROFILE_SAMPLE_ROWS: usize = 10_000;
/// Columns with at most this many distinct values are used for grouping.
pub const MAX_GROUP_CARDINALITY: usize = 32;
pub const NORMAL_PER_ROUND: usize = 5;
pub const DEFAULT_QUERY_SEED: u64 = 22;

// ────────────────────────────────────────────────────────────────────────────────
// Profile
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub q30: f64,
    pub q90: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingColumn {
    pub name: String,
    pub numeric: bool,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampColumn {
    pub name: String,
    pub values: Vec<NaiveDateTime>,
}

/// What the query templates may reference.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryProfile {
    pub numeric: Vec<NumericColumn>,
    pub grouping: Vec<GroupingColumn>,
    pub timestamp: Option<TimestampColumn>,
}

impl QueryProfile {
    pub fn build(schema: &TableSchema, rows: &[Row]) -> Self {
        let mut numeric = Vec::new();
        let mut grouping = Vec::new();
        let mut timestamp = None;

        for (i, col) in schema.columns.iter().enumerate() {
            let cells: Vec<&str> = rows
                .iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect();
            if cells.is_empty() {
                continue;
            }

            match col.ty {
                ColumnType::Timestamp => {
                    if timestamp.is_none() {
                        let values: Vec<NaiveDateTime> =
                            cells.iter().filter_map(|c| parse_timestamp(c)).collect();
                        if !values.is_empty() {
                            timestamp = Some(TimestampColumn {
                                name: col.name.clone(),
                                values,
                            });
                        }
                    }
                    continue;
                }
                ColumnType::Integer | ColumnType::Real => {
                    let mut values: Vec<f64> = cells
                        .iter()
                        .filter_map(|c| c.parse::<f64>().ok())
                        .filter(|v| v.is_finite())
                        .collect();
                    if !values.is_empty() {
                        values.sort_by(|a, b| a.total_cmp(b));
                        numeric.push(NumericColumn {
                            name: col.name.clone(),
                            q30: quantile(&values, 0.3),
                            q90: quantile(&values, 0.9),
                        });
                    }
                }
                ColumnType::Text => {}
            }

            let distinct: BTreeSet<&str> = cells.iter().copied().collect();
            if distinct.len() <= MAX_GROUP_CARDINALITY {
                grouping.push(GroupingColumn {
                    name: col.name.clone(),
                    numeric: col.ty.is_numeric(),
                    values: distinct.into_iter().map(str::to_string).collect(),
                });
            }
        }

        Self {
            numeric,
            grouping,
            timestamp,
        }
    }

    /// Columns worth indexing for this workload.
    pub fn index_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.grouping.iter().map(|g| g.name.clone()).collect();
        for n in self.numeric.iter().take(2) {
            if !cols.contains(&n.name) {
                cols.push(n.name.clone());
            }
        }
        if let Some(ts) = &self.timestamp {
            cols.push(ts.name.clone());
        }
        cols
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ────────────────────────────────────────────────────────────────────────────────
// Templates
// ────────────────────────────────────────────────────────────────────────────────

struct Ctx<'a> {
    profile: &'a QueryProfile,
    table: String,
    dialect: BackendKind,
}

impl Ctx<'_> {
    fn num(&self, col: &str) -> String {
        format!("CAST({} AS DOUBLE)", quote_ident(col))
    }

    fn literal(&self, g: &GroupingColumn, value: &str) -> String {
        if g.numeric && value.parse::<f64>().is_ok() {
            value.to_string()
        } else {
            format!("'{}'", value.replace('\'', "''"))
        }
    }

    fn ts_expr(&self, col: &str) -> String {
        match self.dialect {
            BackendKind::DuckDb => format!("CAST({} AS TIMESTAMP)", quote_ident(col)),
            // Stored as ISO-8601 text with a `T` separator.
            BackendKind::Sqlite => format!("datetime({})", quote_ident(col)),
        }
    }

    fn year_month(&self, col: &str) -> (String, String) {
        let c = quote_ident(col);
        match self.dialect {
            BackendKind::DuckDb => (
                format!("EXTRACT(year FROM {})", c),
                format!("EXTRACT(month FROM {})", c),
            ),
            BackendKind::Sqlite => (
                format!("strftime('%Y', {})", c),
                format!("strftime('%m', {})", c),
            ),
        }
    }

    fn quantile_expr(&self, col: &str, q: f64) -> String {
        match self.dialect {
            BackendKind::DuckDb => format!("quantile_cont({}, {})", self.num(col), q),
            // No ordered-set aggregates in SQLite.
            BackendKind::Sqlite => format!("AVG({})", self.num(col)),
        }
    }
}

type Builder = fn(&Ctx, &mut ChaCha8Rng) -> Option<String>;

struct Template {
    name: &'static str,
    build: Builder,
}

const NORMAL_TEMPLATES: &[Template] = &[
    Template { name: "single_column_groupby", build: single_column_groupby },
    Template { name: "multi_column_groupby", build: multi_column_groupby },
    Template { name: "aggregation_topk", build: aggregation_topk },
    Template { name: "filter_range", build: filter_range },
    Template { name: "point_lookup", build: point_lookup },
    Template { name: "multi_column_filter", build: multi_column_filter },
    Template { name: "nonzero_groupby", build: nonzero_groupby },
    Template { name: "datetime_range", build: datetime_range },
];

const HEAVY_TEMPLATES: &[Template] = &[
    Template { name: "basic_window", build: basic_window },
    Template { name: "sorted_window", build: sorted_window },
    Template { name: "partition_by_window", build: partition_by_window },
    Template { name: "lead_and_lag", build: lead_and_lag },
    Template { name: "moving_averages", build: moving_averages },
    Template { name: "rolling_sum", build: rolling_sum },
    Template { name: "range_between", build: range_between },
    Template { name: "quantiles_entire_dataset", build: quantiles_entire_dataset },
    Template { name: "quantiles_partition_by", build: quantiles_partition_by },
    Template { name: "multi_column_complex_aggregation", build: multi_column_complex_aggregation },
];

pub fn normal_template_names() -> Vec<&'static str> {
    NORMAL_TEMPLATES.iter().map(|t| t.name).collect()
}

pub fn heavy_template_names() -> Vec<&'static str> {
    HEAVY_TEMPLATES.iter().map(|t| t.name).collect()
}

fn single_column_groupby(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let g = ctx.profile.grouping.choose(rng)?;
    let c = quote_ident(&g.name);
    Some(format!("SELECT {c}, COUNT(*) FROM {} GROUP BY {c}", ctx.table))
}

fn multi_column_groupby(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    if ctx.profile.grouping.len() < 2 {
        return None;
    }
    let picked: Vec<String> = ctx
        .profile
        .grouping
        .choose_multiple(rng, 2)
        .map(|g| quote_ident(&g.name))
        .collect();
    let cols = picked.join(", ");
    Some(format!("SELECT {cols}, COUNT(*) FROM {} GROUP BY {cols}", ctx.table))
}

fn aggregation_topk(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let col = match ctx.profile.grouping.choose(rng) {
        Some(g) => g.name.clone(),
        None => ctx.profile.numeric.first()?.name.clone(),
    };
    let c = quote_ident(&col);
    Some(format!(
        "SELECT {c}, COUNT(*) FROM {} GROUP BY {c} ORDER BY COUNT(*) DESC LIMIT 10",
        ctx.table
    ))
}

fn filter_range(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    if ctx.profile.numeric.is_empty() {
        return None;
    }
    let conds: Vec<String> = ctx
        .profile
        .numeric
        .choose_multiple(rng, 2)
        .map(|n| {
            let t = if n.q90 > n.q30 { rng.gen_range(n.q30..n.q90) } else { n.q30 };
            format!("{} > {}", ctx.num(&n.name), (t * 100.0).round() / 100.0)
        })
        .collect::<Vec<_>>();
    Some(format!("SELECT * FROM {} WHERE {}", ctx.table, conds.join(" AND ")))
}

fn point_lookup(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let g = ctx.profile.grouping.choose(rng)?;
    let v = g.values.choose(rng)?;
    Some(format!(
        "SELECT * FROM {} WHERE {} = {} LIMIT 5",
        ctx.table,
        quote_ident(&g.name),
        ctx.literal(g, v)
    ))
}

fn multi_column_filter(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    if ctx.profile.grouping.len() < 2 {
        return None;
    }
    let n = ctx.profile.grouping.len().min(3);
    let picked: Vec<&GroupingColumn> = ctx.profile.grouping.choose_multiple(rng, n).collect();
    let mut conds = Vec::with_capacity(n);
    for g in picked {
        let v = g.values.choose(rng)?;
        conds.push(format!("{} = {}", quote_ident(&g.name), ctx.literal(g, v)));
    }
    Some(format!(
        "SELECT * FROM {} WHERE {} LIMIT 10",
        ctx.table,
        conds.join(" AND ")
    ))
}

fn nonzero_groupby(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let g = ctx.profile.grouping.choose(rng)?;
    let n = ctx.profile.numeric.iter().filter(|n| n.name != g.name).choose(rng)?;
    let gc = quote_ident(&g.name);
    let v = ctx.num(&n.name);
    Some(format!(
        "SELECT {gc}, AVG({v}) FROM {} WHERE {v} > 0 GROUP BY {gc}",
        ctx.table
    ))
}

fn datetime_range(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let ts = ctx.profile.timestamp.as_ref()?;
    let start = *ts.values.choose(rng)?;
    let end = start + ChronoDuration::hours(1);
    let fmt = "%Y-%m-%d %H:%M:%S";
    let order = match ctx.profile.numeric.first() {
        Some(n) => format!(" ORDER BY {} DESC", ctx.num(&n.name)),
        None => String::new(),
    };
    Some(format!(
        "SELECT * FROM {} WHERE {} BETWEEN '{}' AND '{}'{} LIMIT 10",
        ctx.table,
        ctx.ts_expr(&ts.name),
        start.format(fmt),
        end.format(fmt),
        order
    ))
}

fn basic_window(ctx: &Ctx, _rng: &mut ChaCha8Rng) -> Option<String> {
    Some(format!("SELECT *, ROW_NUMBER() OVER () AS row_num FROM {}", ctx.table))
}

fn sorted_window(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let n = ctx.profile.numeric.choose(rng)?;
    Some(format!(
        "SELECT *, ROW_NUMBER() OVER (ORDER BY {} DESC) AS value_rank FROM {}",
        ctx.num(&n.name),
        ctx.table
    ))
}

fn partition_by_window(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let g = ctx.profile.grouping.choose(rng)?;
    let n = ctx.profile.numeric.iter().filter(|n| n.name != g.name).choose(rng)?;
    Some(format!(
        "SELECT *, ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {} DESC) AS rank_within_group FROM {}",
        quote_ident(&g.name),
        ctx.num(&n.name),
        ctx.table
    ))
}

fn lead_and_lag(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let ts = ctx.profile.timestamp.as_ref()?;
    let n = ctx.profile.numeric.choose(rng)?;
    let c = quote_ident(&n.name);
    let t = quote_ident(&ts.name);
    Some(format!(
        "SELECT {c}, LEAD({c}) OVER (ORDER BY {t}) AS next_value, \
         LAG({c}) OVER (ORDER BY {t}) AS prev_value FROM {}",
        ctx.table
    ))
}

fn framed_window(ctx: &Ctx, rng: &mut ChaCha8Rng, agg: &str, frame: &str, alias: &str) -> Option<String> {
    let ts = ctx.profile.timestamp.as_ref()?;
    let n = ctx.profile.numeric.choose(rng)?;
    let t = quote_ident(&ts.name);
    Some(format!(
        "SELECT {t}, {agg}({}) OVER (ORDER BY {t} {frame}) AS {alias} FROM {}",
        ctx.num(&n.name),
        ctx.table
    ))
}

fn moving_averages(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    framed_window(ctx, rng, "AVG", "ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING", "moving_avg")
}

fn rolling_sum(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    framed_window(ctx, rng, "SUM", "ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING", "rolling_sum")
}

fn range_between(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    framed_window(
        ctx,
        rng,
        "SUM",
        "RANGE BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW",
        "cumulative_sum",
    )
}

fn quantiles_entire_dataset(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let n = ctx.profile.numeric.choose(rng)?;
    Some(format!(
        "SELECT {} OVER () AS median_value, {} OVER () AS p90_value FROM {}",
        ctx.quantile_expr(&n.name, 0.5),
        ctx.quantile_expr(&n.name, 0.9),
        ctx.table
    ))
}

fn quantiles_partition_by(ctx: &Ctx, rng: &mut ChaCha8Rng) -> Option<String> {
    let g = ctx.profile.grouping.choose(rng)?;
    let n = ctx.profile.numeric.iter().filter(|n| n.name != g.name).choose(rng)?;
    let gc = quote_ident(&g.name);
    Some(format!(
        "SELECT {gc}, {} OVER (PARTITION BY {gc}) AS median_within_group FROM {}",
        ctx.quantile_expr(&n.name, 0.5),
        ctx.table
    ))
}

fn multi_column_complex_aggregation(ctx: &Ctx, _rng: &mut ChaCha8Rng) -> Option<String> {
    if ctx.profile.grouping.is_empty() || ctx.profile.numeric.is_empty() {
        return None;
    }
    let mut select: Vec<String> = Vec::new();
    let mut group_by: Vec<String> = Vec::new();
    for g in ctx.profile.grouping.iter().take(4) {
        select.push(quote_ident(&g.name));
        group_by.push(quote_ident(&g.name));
    }
    if let Some(ts) = &ctx.profile.timestamp {
        let (year, month) = ctx.year_month(&ts.name);
        select.push(format!("{} AS period_year", year));
        select.push(format!("{} AS period_month", month));
        group_by.push("period_year".to_string());
        group_by.push("period_month".to_string());
    }
    select.push("COUNT(*) AS row_count".to_string());
    let aggs = ["SUM", "AVG", "MAX", "MIN"];
    for (agg, n) in aggs.iter().zip(ctx.profile.numeric.iter().cycle()) {
        select.push(format!(
            "{agg}({}) AS {}_{}",
            ctx.num(&n.name),
            agg.to_lowercase(),
            n.name.replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        ));
    }
    Some(format!(
        "SELECT {} FROM {} GROUP BY {}",
        select.join(", "),
        ctx.table,
        group_by.join(", ")
    ))
}

// ────────────────────────────────────────────────────────────────────────────────
// Source
// ────────────────────────────────────────────────────────────────────────────────

pub struct QuerySource {
    profile: QueryProfile,
    table: String,
    dialect: BackendKind,
    rounds: Option<u64>,
    max_seconds: Option<f64>,
    stop: Option<StopFlag>,
    rng: ChaCha8Rng,
    pending: VecDeque<(&'static str, String)>,
    rounds_started: u64,
    started: Instant,
    next_index: u64,
}

impl QuerySource {
    pub fn new(
        profile: QueryProfile,
        table: &str,
        dialect: BackendKind,
        rounds: Option<u64>,
        max_seconds: Option<f64>,
        seed: u64,
        stop: Option<StopFlag>,
    ) -> Self {
        Self {
            profile,
            table: quote_ident(table),
            dialect,
            rounds,
            max_seconds,
            stop,
            rng: ChaCha8Rng::seed_from_u64(seed),
            pending: VecDeque::new(),
            rounds_started: 0,
            started: Instant::now(),
            next_index: 1,
        }
    }

    pub fn profile(&self) -> &QueryProfile {
        &self.profile
    }

    fn round_allowed(&self) -> bool {
        if stop_requested(&self.stop) {
            return false;
        }
        if let Some(max) = self.rounds {
            if self.rounds_started >= max {
                return false;
            }
        }
        if let Some(max) = self.max_seconds {
            if self.started.elapsed().as_secs_f64() >= max {
                return false;
            }
        }
        true
    }

    /// Queue one round: up to five distinct normal templates, then one heavy.
    fn generate_round(&mut self) {
        let ctx = Ctx {
            profile: &self.profile,
            table: self.table.clone(),
            dialect: self.dialect,
        };

        let mut normal: Vec<&Template> = NORMAL_TEMPLATES.iter().collect();
        normal.shuffle(&mut self.rng);
        let mut produced = 0;
        for t in normal {
            if produced == NORMAL_PER_ROUND {
                break;
            }
            match (t.build)(&ctx, &mut self.rng) {
                Some(sql) => {
                    self.pending.push_back((t.name, sql));
                    produced += 1;
                }
                None => debug!(template = t.name, "template not applicable, skipped"),
            }
        }

        let mut heavy: Vec<&Template> = HEAVY_TEMPLATES.iter().collect();
        heavy.shuffle(&mut self.rng);
        for t in heavy {
            if let Some(sql) = (t.build)(&ctx, &mut self.rng) {
                self.pending.push_back((t.name, sql));
                break;
            }
            debug!(template = t.name, "template not applicable, skipped");
        }

        self.rounds_started += 1;
    }
}

impl UnitSource for QuerySource {
    fn next_unit(&mut self) -> BenchResult<Option<WorkUnit>> {
        if self.pending.is_empty() {
            if !self.round_allowed() {
                return Ok(None);
            }
            self.generate_round();
            debug!(round = self.rounds_started, queries = self.pending.len(), "query round generated");
        }
        match self.pending.pop_front() {
            Some((tag, sql)) => {
                let unit = WorkUnit::query(self.next_index, tag, sql);
                self.next_index += 1;
                Ok(Some(unit))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (TableSchema, Vec<Row>) {
        let header: Vec<String> = [
            "VendorID",
            "tpep_pickup_datetime",
            "passenger_count",
            "trip_distance",
            "payment_type",
            "total_amount",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let rows: Vec<Row> = (0..200)
            .map(|i| {
                vec![
                    (1 + i % 2).to_string(),
                    format!("2023-01-{:02} {:02}:15:00", 1 + i % 28, i % 24),
                    (1 + i % 4).to_string(),
                    format!("{}.{}", i % 17, i % 10),
                    (1 + i % 3).to_string(),
                    format!("{}.25", 5 + i),
                ]
            })
            .collect();
        let schema = TableSchema::infer("trips", &header, &rows).unwrap();
        (schema, rows)
    }

    fn drain(source: &mut QuerySource) -> Vec<WorkUnit> {
        let mut out = Vec::new();
        while let Some(u) = source.next_unit().unwrap() {
            out.push(u);
        }
        out
    }

    #[test]
    fn test_profile() {
        let (schema, rows) = sample();
        let p = QueryProfile::build(&schema, &rows);
        assert_eq!(p.timestamp.as_ref().unwrap().name, "tpep_pickup_datetime");
        let grouping: Vec<&str> = p.grouping.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(grouping, vec!["vendorid", "passenger_count", "payment_type"]);
        let amount = p.numeric.iter().find(|n| n.name == "total_amount").unwrap();
        assert!(amount.q30 < amount.q90);
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.5), 3.0);
        assert!((quantile(&v, 0.3) - 2.2).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.9), 7.0);
    }

    #[test]
    fn test_rounds_of_six_tagged_units() {
        let (schema, rows) = sample();
        let profile = QueryProfile::build(&schema, &rows);
        let mut source = QuerySource::new(profile, "trips", BackendKind::DuckDb, Some(3), None, 22, None);
        let units = drain(&mut source);
        assert_eq!(units.len(), 18);

        let normal = normal_template_names();
        let heavy = heavy_template_names();
        for round in units.chunks(6) {
            let tags: BTreeSet<&str> = round[..5].iter().map(|u| u.tag.as_str()).collect();
            assert_eq!(tags.len(), 5);
            assert!(tags.iter().all(|t| normal.contains(t)));
            assert!(heavy.contains(&round[5].tag.as_str()));
        }
        assert_eq!(units.last().unwrap().index, 18);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let (schema, rows) = sample();
        let make = |seed| {
            let profile = QueryProfile::build(&schema, &rows);
            drain(&mut QuerySource::new(profile, "trips", BackendKind::Sqlite, Some(2), None, seed, None))
        };
        assert_eq!(make(22), make(22));
        assert_ne!(make(22), make(23));
    }

    #[test]
    fn test_sqlite_dialect_avoids_quantile_cont() {
        let (schema, rows) = sample();
        let profile = QueryProfile::build(&schema, &rows);
        let ctx = Ctx { profile: &profile, table: "\"trips\"".into(), dialect: BackendKind::Sqlite };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sql = quantiles_entire_dataset(&ctx, &mut rng).unwrap();
        assert!(!sql.contains("quantile_cont"));
        assert!(sql.contains("AVG("));

        let duck = Ctx { dialect: BackendKind::DuckDb, ..ctx };
        assert!(quantiles_entire_dataset(&duck, &mut rng).unwrap().contains("quantile_cont"));
    }

    #[test]
    fn test_sqlite_datetime_range_normalizes_column() {
        let (schema, rows) = sample();
        let profile = QueryProfile::build(&schema, &rows);
        let ctx = Ctx { profile: &profile, table: "\"trips\"".into(), dialect: BackendKind::Sqlite };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let sql = datetime_range(&ctx, &mut rng).unwrap();
        assert!(sql.contains("WHERE datetime(\"tpep_pickup_datetime\") BETWEEN"), "{}", sql);
    }

    #[test]
    fn test_thin_profile_skips_templates() {
        let header = vec!["note".to_string()];
        let rows: Vec<Row> = (0..100).map(|i| vec![format!("free text {}", i)]).collect();
        let schema = TableSchema::infer("notes", &header, &rows).unwrap();
        let profile = QueryProfile::build(&schema, &rows);
        let mut source = QuerySource::new(profile, "notes", BackendKind::Sqlite, Some(1), None, 22, None);
        let units = drain(&mut source);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].tag, "basic_window");
    }

    #[test]
    fn test_zero_rounds_is_empty() {
        let (schema, rows) = sample();
        let profile = QueryProfile::build(&schema, &rows);
        let mut source = QuerySource::new(profile, "trips", BackendKind::DuckDb, Some(0), None, 22, None);
        assert!(source.next_unit().unwrap().is_none());
    }
}
