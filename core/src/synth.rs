//! Deterministic synthetic cohorts.
//!
//! RULE: Nothing here may call any platform RNG.
//! All randomness flows from the single seed in `SynthConfig`, so the
//! same config always produces byte-identical tables.
//!
//! The generated tables follow the input schema exactly and are
//! well-formed: every user has a source, a science user also finishes
//! the stage, and spend days sit one day before the matching cohort day.

use crate::{
    loader::{RawAction, RawAdCost, RawTables, RawUserSource},
    types::{BuildingType, Source},
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Share of users per source, in `Source::ALL` order.
const SOURCE_WEIGHTS: [f64; 4] = [0.35, 0.20, 0.25, 0.20];

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub seed: u64,
    pub users: usize,
    /// First cohort day; spend starts the day before.
    pub start: NaiveDate,
    pub cohort_days: u32,
    pub science_probability: f64,
    pub warrior_probability: f64,
    /// Exact copies of existing action rows appended at the end.
    pub duplicate_rows: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            users: 400,
            start: NaiveDate::from_ymd_opt(2020, 5, 4).unwrap_or(NaiveDate::MIN),
            cohort_days: 7,
            science_probability: 0.10,
            warrior_probability: 0.30,
            duplicate_rows: 1,
        }
    }
}

/// Thin deterministic wrapper over PCG.
struct SynthRng {
    inner: Pcg64Mcg,
}

impl SynthRng {
    fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Roll a float in [0.0, 1.0).
    fn next_f64(&mut self) -> f64 {
        (self.inner.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll an integer in [lo, hi].
    fn between(&mut self, lo: i64, hi: i64) -> i64 {
        let span = (hi - lo + 1) as u64;
        lo + (self.inner.next_u64() % span) as i64
    }

    fn weighted(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        let mut roll = self.next_f64() * total;
        for (i, w) in weights.iter().enumerate() {
            if roll < *w {
                return i;
            }
            roll -= w;
        }
        weights.len() - 1
    }
}

fn timestamp(ts: NaiveDateTime) -> Option<String> {
    Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn building_label(kind: BuildingType) -> &'static str {
    match kind {
        BuildingType::AssemblyShop   => "assembly_shop",
        BuildingType::Spaceport      => "spaceport",
        BuildingType::ResearchCenter => "research_center",
    }
}

fn action(ts: NaiveDateTime, event: &str, building: Option<BuildingType>, user: &str, project: Option<&str>) -> RawAction {
    RawAction {
        event_datetime: timestamp(ts),
        event: Some(event.to_string()),
        building_type: building.map(|b| building_label(b).to_string()),
        user_id: Some(user.to_string()),
        project_type: project.map(str::to_string),
    }
}

/// Generate the three raw tables for a synthetic cohort.
pub fn generate(config: &SynthConfig) -> RawTables {
    let mut rng = SynthRng::new(config.seed);
    let mut tables = RawTables::default();
    let day_count = config.cohort_days.max(1) as i64;

    for i in 0..config.users {
        let user_id = format!("synth-{:08x}-{i:05}", rng.inner.next_u64() as u32);
        let source = Source::ALL[rng.weighted(&SOURCE_WEIGHTS)];
        tables.sources.push(RawUserSource {
            user_id: Some(user_id.clone()),
            source: Some(source.as_str().to_string()),
        });

        let day = config.start + Duration::days(rng.between(0, day_count - 1));
        let mut ts = day.and_time(NaiveTime::default()) + Duration::seconds(rng.between(0, 86_399));

        let buildings = rng.between(2, 20);
        for b in 0..buildings {
            let kind = if b == 0 {
                BuildingType::AssemblyShop
            } else {
                [BuildingType::AssemblyShop, BuildingType::Spaceport, BuildingType::ResearchCenter]
                    [rng.between(0, 2) as usize]
            };
            tables.actions.push(action(ts, "building", Some(kind), &user_id, None));
            ts += Duration::minutes(rng.between(30, 48 * 60));
        }

        let roll = rng.next_f64();
        if roll < config.science_probability {
            // Projects take longer than fights.
            ts += Duration::hours(rng.between(72, 240));
            tables.actions.push(action(ts, "project", None, &user_id, Some("satellite_orbital_assembly")));
            ts += Duration::minutes(rng.between(1, 120));
            tables.actions.push(action(ts, "finished_stage_1", None, &user_id, None));
        } else if roll < config.science_probability + config.warrior_probability {
            ts += Duration::hours(rng.between(1, 48));
            tables.actions.push(action(ts, "finished_stage_1", None, &user_id, None));
        }
    }

    for d in 0..day_count {
        let spend_day = config.start + Duration::days(d - 1);
        for source in Source::ALL {
            let cost = 100.0 + rng.next_f64() * 800.0 / (d + 1) as f64;
            tables.costs.push(RawAdCost {
                day: Some(spend_day.format("%Y-%m-%d").to_string()),
                source: Some(source.as_str().to_string()),
                cost: Some(format!("{cost:.6}")),
            });
        }
    }

    if !tables.actions.is_empty() {
        for k in 0..config.duplicate_rows {
            let idx = rng.between(0, tables.actions.len() as i64 - 1) as usize;
            let copy = tables.actions[idx].clone();
            tables.actions.push(copy);
            log::debug!("synthetic duplicate {k} copies action row {idx}");
        }
    }

    tables
}
