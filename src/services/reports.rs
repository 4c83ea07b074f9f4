//! Read-only aggregations behind the dashboard and report endpoints.
//!
//! Queries load the purchases of a window once; bucketing and ranking are
//! plain functions over [`PurchaseRecord`]s so they can be tested without a
//! database.

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        item::{self, Entity as Item},
        neighbor::Entity as Neighbor,
        purchase::{self, Entity as Purchase},
    },
    errors::ServiceError,
    services::{
        forecasting::{
            month_label, next_month, Forecaster, ForecastInput, ItemDemand, MonthlyDemand,
            Prediction,
        },
        purchases::{attach_line_items, PurchaseRecord},
        sales::parse_dob,
    },
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const UNKNOWN_ITEM: &str = "Unknown Item";

/// Longest span, in days between start and end, a report window may cover.
pub const MAX_WINDOW_DAYS: i64 = 366;

/// Upper bounds (exclusive) of the age bands; anything else falls into `65+`.
const AGE_BANDS: [(i32, i32, &str); 8] = [
    (0, 6, "0-5"),
    (6, 18, "6-17"),
    (18, 25, "18-24"),
    (25, 30, "25-29"),
    (30, 36, "30-35"),
    (36, 50, "36-49"),
    (50, 60, "50-59"),
    (60, 65, "60-64"),
];
const AGE_CATCH_ALL: &str = "65+";

/// Optional report window. Both snake and camel case names are accepted.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateRangeQuery {
    /// `YYYY-MM-DD` or RFC 3339; defaults to the configured number of days before today
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339; defaults to today
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
}

/// Inclusive UTC window running from the start of its first day to the last millisecond of its last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last_ms = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last_ms))
}

impl DateWindow {
    pub fn for_days(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start_of_day(start),
            end: end_of_day(end),
        }
    }

    pub fn resolve(
        query: &DateRangeQuery,
        now: DateTime<Utc>,
        default_days: i64,
    ) -> Result<Self, ServiceError> {
        let parse = |field: &str, raw: &Option<String>| -> Result<Option<NaiveDate>, ServiceError> {
            match raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                None => Ok(None),
                Some(value) => parse_dob(value).map(Some).ok_or_else(|| {
                    ServiceError::ValidationError(format!("{} must be a date (YYYY-MM-DD)", field))
                }),
            }
        };

        let start = parse("start_date", &query.start_date)?
            .unwrap_or_else(|| (now - Duration::days(default_days)).date_naive());
        let end = parse("end_date", &query.end_date)?.unwrap_or_else(|| now.date_naive());
        if start > end {
            return Err(ServiceError::ValidationError(
                "start_date must not be after end_date".into(),
            ));
        }
        if (end - start).num_days() > MAX_WINDOW_DAYS {
            return Err(ServiceError::ValidationError(format!(
                "date window cannot span more than {} days",
                MAX_WINDOW_DAYS
            )));
        }
        Ok(Self::for_days(start, end))
    }

    /// Every calendar day in the window, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let last = self.end.date_naive();
        let mut day = self.start.date_naive();
        let mut days = Vec::new();
        while day <= last {
            days.push(day);
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        days
    }

    pub fn start_day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_day(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct NeighborCount {
    pub number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeriesPoint {
    /// Day label, `YYYY-MM-DD`
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PopularItemReport {
    pub item_id: Option<Uuid>,
    pub name: Option<String>,
    pub total: i64,
    pub data: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LowStockReport {
    pub low_stock_items: Vec<item::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VisitCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VisitsReport {
    pub start_date: String,
    pub end_date: String,
    pub visits: Vec<VisitCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UnitsReport {
    pub total_units: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn of_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Fall,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SeasonReport {
    /// Units per calendar month, keyed `1..=12`; months without purchases are omitted
    pub monthly: BTreeMap<u32, i64>,
    /// Always carries all four seasons
    pub season_data: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GenderReport {
    pub gender_data: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AgeBandCount {
    pub age_group: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AgeReport {
    pub age_data: Vec<AgeBandCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ForecastReport {
    pub success: bool,
    pub predictions: Vec<Prediction>,
}

pub fn distinct_neighbors(purchases: &[PurchaseRecord]) -> usize {
    purchases
        .iter()
        .map(|p| p.neighbor_id)
        .collect::<HashSet<_>>()
        .len()
}

pub fn total_units(purchases: &[PurchaseRecord]) -> i64 {
    purchases.iter().map(PurchaseRecord::total_quantity).sum()
}

pub fn item_totals(purchases: &[PurchaseRecord]) -> HashMap<Uuid, i64> {
    let mut totals = HashMap::new();
    for line in purchases.iter().flat_map(|p| &p.items) {
        *totals.entry(line.item_id).or_insert(0) += i64::from(line.quantity);
    }
    totals
}

/// Highest total wins; ties go to the lexically smaller name, then the smaller id.
pub fn pick_top_item(
    totals: &HashMap<Uuid, i64>,
    names: &HashMap<Uuid, String>,
) -> Option<(Uuid, i64)> {
    let name_of = |id: &Uuid| names.get(id).map(String::as_str).unwrap_or(UNKNOWN_ITEM);
    totals
        .iter()
        .min_by(|(a_id, a_total), (b_id, b_total)| {
            b_total
                .cmp(a_total)
                .then_with(|| name_of(a_id).cmp(name_of(b_id)))
                .then_with(|| a_id.cmp(b_id))
        })
        .map(|(id, total)| (*id, *total))
}

/// Per-day quantity of one item, with a zero for every day that has none.
pub fn daily_item_series(
    purchases: &[PurchaseRecord],
    item_id: Uuid,
    window: &DateWindow,
) -> Vec<SeriesPoint> {
    let mut per_day: HashMap<NaiveDate, i64> = HashMap::new();
    for purchase in purchases {
        let day = purchase.purchase_date.date_naive();
        for line in purchase.items.iter().filter(|l| l.item_id == item_id) {
            *per_day.entry(day).or_insert(0) += i64::from(line.quantity);
        }
    }
    window
        .days()
        .into_iter()
        .map(|day| SeriesPoint {
            name: day.to_string(),
            value: per_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

/// Purchases per day; every day of the window appears.
pub fn daily_visits(purchases: &[PurchaseRecord], window: &DateWindow) -> Vec<VisitCount> {
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for purchase in purchases {
        *per_day.entry(purchase.purchase_date.date_naive()).or_insert(0) += 1;
    }
    window
        .days()
        .into_iter()
        .map(|day| VisitCount {
            date: day.to_string(),
            count: per_day.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

pub fn monthly_totals(purchases: &[PurchaseRecord]) -> BTreeMap<u32, i64> {
    let mut months = BTreeMap::new();
    for purchase in purchases {
        *months.entry(purchase.purchase_date.month()).or_insert(0) += purchase.total_quantity();
    }
    months
}

pub fn season_totals(monthly: &BTreeMap<u32, i64>) -> BTreeMap<String, i64> {
    let mut seasons: BTreeMap<String, i64> = [
        Season::Winter,
        Season::Spring,
        Season::Summer,
        Season::Fall,
    ]
    .iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();
    for (month, total) in monthly {
        *seasons
            .entry(Season::of_month(*month).as_str().to_string())
            .or_insert(0) += total;
    }
    seasons
}

pub fn age_band(age: i32) -> &'static str {
    AGE_BANDS
        .iter()
        .find(|(low, high, _)| (*low..*high).contains(&age))
        .map(|(_, _, label)| *label)
        .unwrap_or(AGE_CATCH_ALL)
}

pub fn age_distribution(ages: impl IntoIterator<Item = i32>) -> Vec<AgeBandCount> {
    let mut counts: HashMap<&'static str, u64> = HashMap::new();
    for age in ages {
        *counts.entry(age_band(age)).or_insert(0) += 1;
    }
    AGE_BANDS
        .iter()
        .map(|(_, _, label)| *label)
        .chain(std::iter::once(AGE_CATCH_ALL))
        .map(|label| AgeBandCount {
            age_group: label.to_string(),
            value: counts.get(label).copied().unwrap_or(0),
        })
        .collect()
}

pub fn gender_distribution<'a>(genders: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for gender in genders {
        *counts.entry(gender.to_string()).or_insert(0) += 1;
    }
    counts
}

/// An item is low when its stock has fallen below `threshold` times its last restock.
pub fn is_low_stock(item: &item::Model, threshold: f64) -> bool {
    match item.last_restock_quantity {
        Some(restocked) => f64::from(item.current_quantity) < f64::from(restocked) * threshold,
        None => false,
    }
}

/// Builds zero-filled monthly demand, from the month of the first purchase
/// through `as_of`, for every known item that has been taken at least once.
pub fn build_forecast_input(
    purchases: &[PurchaseRecord],
    items: &[item::Model],
    as_of: NaiveDate,
) -> ForecastInput {
    let as_of = as_of.with_day(1).unwrap_or(as_of);
    let mut demand: HashMap<Uuid, BTreeMap<String, i64>> = HashMap::new();
    let mut first_month = as_of;
    for purchase in purchases {
        let date = purchase.purchase_date.date_naive();
        let month = date.with_day(1).unwrap_or(date);
        if month > as_of {
            continue;
        }
        first_month = first_month.min(month);
        for line in &purchase.items {
            *demand
                .entry(line.item_id)
                .or_default()
                .entry(month_label(month))
                .or_insert(0) += i64::from(line.quantity);
        }
    }

    let mut months = Vec::new();
    let mut cursor = first_month;
    while cursor <= as_of {
        months.push(month_label(cursor));
        cursor = next_month(cursor);
    }

    let mut items: Vec<&item::Model> = items.iter().filter(|i| demand.contains_key(&i.id)).collect();
    items.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    ForecastInput {
        as_of: month_label(as_of),
        items: items
            .into_iter()
            .map(|item| {
                let per_month = demand.get(&item.id);
                ItemDemand {
                    item_code: item.id.to_string(),
                    name: item.name.clone(),
                    monthly: months
                        .iter()
                        .map(|m| MonthlyDemand {
                            month: m.clone(),
                            quantity: per_month.and_then(|d| d.get(m)).copied().unwrap_or(0),
                        })
                        .collect(),
                }
            })
            .collect(),
    }
}

/// Largest predicted quantity first, ties by item code, at most `limit` entries.
pub fn rank_predictions(mut predictions: Vec<Prediction>, limit: usize) -> Vec<Prediction> {
    predictions.sort_by(|a, b| {
        b.predicted_qty
            .cmp(&a.predicted_qty)
            .then_with(|| a.item_code.cmp(&b.item_code))
    });
    predictions.truncate(limit);
    predictions
}

/// Report tunables taken from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub window_days: i64,
    pub low_stock_threshold: f64,
    pub forecast_limit: usize,
}

impl From<&AppConfig> for ReportSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            window_days: config.report_window_days,
            low_stock_threshold: config.low_stock_threshold,
            forecast_limit: config.forecast_limit,
        }
    }
}

/// Service answering dashboard and report queries
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
    forecaster: Arc<dyn Forecaster>,
    settings: ReportSettings,
}

impl ReportService {
    pub fn new(db: Arc<DbPool>, forecaster: Arc<dyn Forecaster>, settings: ReportSettings) -> Self {
        Self {
            db,
            forecaster,
            settings,
        }
    }

    pub fn window(&self, query: &DateRangeQuery) -> Result<DateWindow, ServiceError> {
        DateWindow::resolve(query, Utc::now(), self.settings.window_days)
    }

    async fn purchases_between(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PurchaseRecord>, ServiceError> {
        let mut query = Purchase::find().filter(purchase::Column::PurchaseDate.gte(start));
        if let Some(end) = end {
            query = query.filter(purchase::Column::PurchaseDate.lte(end));
        }
        let purchases = query
            .order_by_asc(purchase::Column::PurchaseDate)
            .all(&*self.db)
            .await?;
        attach_line_items(&*self.db, purchases).await
    }

    async fn all_purchases(&self) -> Result<Vec<PurchaseRecord>, ServiceError> {
        let purchases = Purchase::find()
            .order_by_asc(purchase::Column::PurchaseDate)
            .all(&*self.db)
            .await?;
        attach_line_items(&*self.db, purchases).await
    }

    #[instrument(skip(self))]
    pub async fn weekly_neighbors(&self, query: DateRangeQuery) -> Result<NeighborCount, ServiceError> {
        let window = self.window(&query)?;
        let purchases = self.purchases_between(window.start, Some(window.end)).await?;
        Ok(NeighborCount {
            number: distinct_neighbors(&purchases),
        })
    }

    #[instrument(skip(self))]
    pub async fn popular_items(
        &self,
        query: DateRangeQuery,
    ) -> Result<PopularItemReport, ServiceError> {
        let window = self.window(&query)?;
        let purchases = self.purchases_between(window.start, Some(window.end)).await?;
        let totals = item_totals(&purchases);
        if totals.is_empty() {
            return Ok(PopularItemReport {
                item_id: None,
                name: None,
                total: 0,
                data: Vec::new(),
            });
        }

        let names: HashMap<Uuid, String> = Item::find()
            .filter(item::Column::Id.is_in(totals.keys().copied().collect::<Vec<_>>()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|i| (i.id, i.name))
            .collect();

        let Some((item_id, total)) = pick_top_item(&totals, &names) else {
            return Err(ServiceError::InternalError("no top item among non-empty totals".into()));
        };
        Ok(PopularItemReport {
            item_id: Some(item_id),
            name: Some(
                names
                    .get(&item_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_ITEM.to_string()),
            ),
            total,
            data: daily_item_series(&purchases, item_id, &window),
        })
    }

    #[instrument(skip(self))]
    pub async fn low_stock_items(&self) -> Result<LowStockReport, ServiceError> {
        let items = Item::find()
            .filter(item::Column::LastRestockQuantity.is_not_null())
            .order_by_asc(item::Column::Name)
            .all(&*self.db)
            .await?;
        let threshold = self.settings.low_stock_threshold;
        Ok(LowStockReport {
            low_stock_items: items
                .into_iter()
                .filter(|i| is_low_stock(i, threshold))
                .collect(),
        })
    }

    #[instrument(skip(self))]
    pub async fn weekly_visits(&self, query: DateRangeQuery) -> Result<VisitsReport, ServiceError> {
        let window = self.window(&query)?;
        let purchases = self.purchases_between(window.start, Some(window.end)).await?;
        Ok(VisitsReport {
            start_date: window.start_day().to_string(),
            end_date: window.end_day().to_string(),
            visits: daily_visits(&purchases, &window),
        })
    }

    #[instrument(skip(self))]
    pub async fn total_units_taken(&self, query: DateRangeQuery) -> Result<UnitsReport, ServiceError> {
        let window = self.window(&query)?;
        let purchases = self.purchases_between(window.start, Some(window.end)).await?;
        Ok(UnitsReport {
            total_units: total_units(&purchases),
        })
    }

    /// Distinct neighbors served since the start of the day `window_days` ago.
    #[instrument(skip(self))]
    pub async fn items_weekly(&self) -> Result<NeighborCount, ServiceError> {
        let since = (Utc::now() - Duration::days(self.settings.window_days)).date_naive();
        let purchases = self.purchases_between(start_of_day(since), None).await?;
        Ok(NeighborCount {
            number: distinct_neighbors(&purchases),
        })
    }

    #[instrument(skip(self))]
    pub async fn items_by_season(&self) -> Result<SeasonReport, ServiceError> {
        let purchases = self.all_purchases().await?;
        let monthly = monthly_totals(&purchases);
        let season_data = season_totals(&monthly);
        Ok(SeasonReport {
            monthly,
            season_data,
        })
    }

    #[instrument(skip(self))]
    pub async fn gender_distribution(&self) -> Result<GenderReport, ServiceError> {
        let neighbors = Neighbor::find().all(&*self.db).await?;
        Ok(GenderReport {
            gender_data: gender_distribution(neighbors.iter().map(|n| n.gender.as_str())),
        })
    }

    #[instrument(skip(self))]
    pub async fn age_distribution(&self) -> Result<AgeReport, ServiceError> {
        let neighbors = Neighbor::find().all(&*self.db).await?;
        Ok(AgeReport {
            age_data: age_distribution(neighbors.iter().map(|n| n.age)),
        })
    }

    /// Runs the injected forecaster over the full demand history.
    #[instrument(skip(self), fields(forecaster = self.forecaster.name()))]
    pub async fn forecast(&self) -> Result<ForecastReport, ServiceError> {
        let purchases = self.all_purchases().await?;
        let items = Item::find().all(&*self.db).await?;
        let input = build_forecast_input(&purchases, &items, Utc::now().date_naive());

        match self.forecaster.forecast(&input).await {
            Ok(predictions) => {
                crate::metrics::FORECAST_RUNS.with_label_values(&["ok"]).inc();
                let predictions = rank_predictions(predictions, self.settings.forecast_limit);
                info!(
                    items = input.items.len(),
                    predictions = predictions.len(),
                    "forecast produced"
                );
                Ok(ForecastReport {
                    success: true,
                    predictions,
                })
            }
            Err(e) => {
                crate::metrics::FORECAST_RUNS.with_label_values(&["error"]).inc();
                warn!(error = %e, "forecast failed");
                Err(e)
            }
        }
    }
}
