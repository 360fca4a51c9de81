use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CaseSource, DateWindow, Technician};
use crate::sources::{
    BusinessCaseRow, CaseStore, ContractCaseRow, IndividualCaseRow, PositionFix, RawCase,
    RosterProvider, ScheduleProvider, ScheduledHours, TelemetryProvider,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed case stores, roster, schedule and vehicle positions.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn completed_statuses(source: CaseSource) -> Vec<String> {
    source
        .completed_statuses()
        .iter()
        .map(|status| status.to_string())
        .collect()
}

fn case_query(source: CaseSource) -> &'static str {
    match source {
        CaseSource::Individual => {
            r#"
            SELECT id, assigned_technician_id, status, price, pest_type, completed_date
            FROM pest_analytics.private_cases
            WHERE assigned_technician_id = ANY($1)
              AND status = ANY($2)
              AND price IS NOT NULL
              AND completed_date >= $3 AND completed_date < $4
            "#
        }
        CaseSource::Business => {
            r#"
            SELECT id, primary_assignee_id, status, case_price, pest_category, completed_at
            FROM pest_analytics.business_cases
            WHERE primary_assignee_id = ANY($1)
              AND status = ANY($2)
              AND case_price IS NOT NULL
              AND completed_at >= $3 AND completed_at < $4
            "#
        }
        CaseSource::Contract => {
            r#"
            SELECT id, technician_id, case_status, total_amount, pest_kind, closed_at
            FROM pest_analytics.contract_cases
            WHERE technician_id = ANY($1)
              AND case_status = ANY($2)
              AND total_amount IS NOT NULL
              AND closed_at >= $3 AND closed_at < $4
            "#
        }
    }
}

fn decode_case(source: CaseSource, row: &PgRow) -> Result<RawCase, sqlx::Error> {
    Ok(match source {
        CaseSource::Individual => RawCase::Individual(IndividualCaseRow {
            id: row.try_get("id")?,
            assigned_technician_id: row.try_get("assigned_technician_id")?,
            status: row.try_get("status")?,
            price: row.try_get("price")?,
            pest_type: row.try_get("pest_type")?,
            completed_date: row.try_get("completed_date")?,
        }),
        CaseSource::Business => RawCase::Business(BusinessCaseRow {
            id: row.try_get("id")?,
            primary_assignee_id: row.try_get("primary_assignee_id")?,
            status: row.try_get("status")?,
            case_price: row.try_get("case_price")?,
            pest_category: row.try_get("pest_category")?,
            completed_at: row.try_get("completed_at")?,
        }),
        CaseSource::Contract => RawCase::Contract(ContractCaseRow {
            id: row.try_get("id")?,
            technician_id: row.try_get("technician_id")?,
            case_status: row.try_get("case_status")?,
            total_amount: row.try_get("total_amount")?,
            pest_kind: row.try_get("pest_kind")?,
            closed_at: row.try_get("closed_at")?,
        }),
    })
}

#[async_trait]
impl CaseStore for PgStore {
    async fn fetch_completed(
        &self,
        source: CaseSource,
        technician_ids: &[Uuid],
        window: DateWindow,
    ) -> anyhow::Result<Vec<RawCase>> {
        let rows = sqlx::query(case_query(source))
            .bind(technician_ids.to_vec())
            .bind(completed_statuses(source))
            .bind(window.starts_at())
            .bind(window.ends_before())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("querying {source} cases for {window}"))?;

        rows.iter()
            .map(|row| decode_case(source, row).with_context(|| format!("decoding {source} case")))
            .collect()
    }
}

#[async_trait]
impl RosterProvider for PgStore {
    async fn technicians(&self) -> anyhow::Result<Vec<Technician>> {
        let rows = sqlx::query(
            "SELECT id, full_name, role, email, active \
             FROM pest_analytics.technicians ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading technician roster")?;

        let mut technicians = Vec::with_capacity(rows.len());
        for row in rows {
            technicians.push(Technician {
                id: row.try_get("id")?,
                name: row.try_get("full_name")?,
                role: row.try_get("role")?,
                email: row.try_get("email")?,
                active: row.try_get("active")?,
            });
        }
        Ok(technicians)
    }
}

#[async_trait]
impl ScheduleProvider for PgStore {
    async fn hours(
        &self,
        technician_ids: &[Uuid],
        window: DateWindow,
    ) -> anyhow::Result<Vec<ScheduledHours>> {
        let rows = sqlx::query(
            r#"
            SELECT technician_id,
                   COALESCE(SUM(scheduled_hours), 0)::float8 AS scheduled_hours,
                   COALESCE(SUM(work_hours), 0)::float8 AS work_hours,
                   COALESCE(SUM(absence_hours), 0)::float8 AS absence_hours
            FROM pest_analytics.technician_schedules
            WHERE technician_id = ANY($1)
              AND work_date BETWEEN $2 AND $3
            GROUP BY technician_id
            "#,
        )
        .bind(technician_ids.to_vec())
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading schedules for {window}"))?;

        let mut hours = Vec::with_capacity(rows.len());
        for row in rows {
            hours.push(ScheduledHours {
                technician_id: row.try_get("technician_id")?,
                scheduled_hours: row.try_get("scheduled_hours")?,
                original_work_hours: row.try_get("work_hours")?,
                absence_hours: row.try_get("absence_hours")?,
            });
        }
        Ok(hours)
    }
}

#[async_trait]
impl TelemetryProvider for PgStore {
    async fn positions(
        &self,
        technician_ids: &[Uuid],
        date: NaiveDate,
    ) -> anyhow::Result<Vec<PositionFix>> {
        let day = DateWindow::single_day(date);
        let rows = sqlx::query(
            r#"
            SELECT technician_id, recorded_at, latitude, longitude
            FROM pest_analytics.vehicle_positions
            WHERE technician_id = ANY($1)
              AND recorded_at >= $2 AND recorded_at < $3
            ORDER BY technician_id, recorded_at
            "#,
        )
        .bind(technician_ids.to_vec())
        .bind(day.starts_at())
        .bind(day.ends_before())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("loading vehicle positions for {date}"))?;

        let mut fixes = Vec::with_capacity(rows.len());
        for row in rows {
            fixes.push(PositionFix {
                technician_id: row.try_get("technician_id")?,
                recorded_at: row.try_get("recorded_at")?,
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
            });
        }
        Ok(fixes)
    }
}

struct NewCase {
    source: CaseSource,
    source_key: String,
    technician_id: Uuid,
    status: String,
    amount: Option<Decimal>,
    pest_type: Option<String>,
    completed_at: DateTime<Utc>,
}

async fn insert_case(pool: &PgPool, case: &NewCase) -> anyhow::Result<bool> {
    let sql = match case.source {
        CaseSource::Individual => {
            r#"
            INSERT INTO pest_analytics.private_cases
            (id, source_key, assigned_technician_id, status, price, pest_type, completed_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#
        }
        CaseSource::Business => {
            r#"
            INSERT INTO pest_analytics.business_cases
            (id, source_key, primary_assignee_id, status, case_price, pest_category, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#
        }
        CaseSource::Contract => {
            r#"
            INSERT INTO pest_analytics.contract_cases
            (id, source_key, technician_id, case_status, total_amount, pest_kind, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#
        }
    };

    let result = sqlx::query(sql)
        .bind(Uuid::new_v4())
        .bind(&case.source_key)
        .bind(case.technician_id)
        .bind(&case.status)
        .bind(case.amount)
        .bind(&case.pest_type)
        .bind(case.completed_at)
        .execute(pool)
        .await
        .with_context(|| format!("inserting {} case {}", case.source, case.source_key))?;

    Ok(result.rows_affected() > 0)
}

async fn upsert_technician(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    role: &str,
    email: &str,
    active: bool,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO pest_analytics.technicians (id, full_name, role, email, active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, role = EXCLUDED.role, active = EXCLUDED.active
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(role)
    .bind(email)
    .bind(active)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

/// Demo roster: three active technicians and one who has left.
const SEED_ROSTER: [(Uuid, &str, &str, &str, bool); 4] = [
    (
        Uuid::from_u128(0xa9f83283_2b7a_4167_94b6_197b42daf835),
        "Sanna Lindqvist",
        "technician",
        "sanna.lindqvist@example.com",
        true,
    ),
    (
        Uuid::from_u128(0x781e26e4_fe2e_4662_a3b9_170c72bf5b18),
        "Omar Haddad",
        "technician",
        "omar.haddad@example.com",
        true,
    ),
    (
        Uuid::from_u128(0x75731b41_f295_4e7c_aba8_d92efab08d37),
        "Petra Nyberg",
        "senior technician",
        "petra.nyberg@example.com",
        true,
    ),
    (
        Uuid::from_u128(0x5dd3bb3c_d980_4027_b36d_9f2fe7a45098),
        "Jonas Ek",
        "technician",
        "jonas.ek@example.com",
        false,
    ),
];

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let mut ids = Vec::new();
    for (id, name, role, email, active) in SEED_ROSTER {
        ids.push(upsert_technician(pool, id, name, role, email, active).await?);
    }

    let now = Utc::now();
    let cases = vec![
        ("seed-p-001", CaseSource::Individual, 0, "completed", "4200.00", Some("rats"), 3),
        ("seed-p-002", CaseSource::Individual, 1, "completed", "1850.00", Some("wasps"), 9),
        ("seed-p-003", CaseSource::Individual, 2, "completed", "3100.00", Some("bedbugs"), 21),
        ("seed-p-004", CaseSource::Individual, 0, "scheduled", "900.00", Some("ants"), 1),
        ("seed-b-001", CaseSource::Business, 1, "completed", "12500.00", Some("rats"), 5),
        ("seed-b-002", CaseSource::Business, 2, "completed", "8800.00", None, 40),
        ("seed-b-003", CaseSource::Business, 0, "completed", "6400.00", Some("cockroaches"), 70),
        ("seed-c-001", CaseSource::Contract, 2, "invoiced", "20000.00", Some("rats"), 12),
        ("seed-c-002", CaseSource::Contract, 0, "closed", "15750.00", Some("mice"), 33),
        ("seed-c-003", CaseSource::Contract, 1, "completed", "9900.00", Some("birds"), 95),
        ("seed-c-004", CaseSource::Contract, 3, "completed", "7000.00", Some("rats"), 15),
    ];

    for (source_key, source, who, status, amount, pest, days_ago) in cases {
        let case = NewCase {
            source,
            source_key: source_key.to_string(),
            technician_id: ids[who],
            status: status.to_string(),
            amount: Some(Decimal::from_str(amount)?),
            pest_type: pest.map(str::to_string),
            completed_at: now - Duration::days(days_ago),
        };
        insert_case(pool, &case).await?;
    }

    let today = now.date_naive();
    for (index, technician_id) in ids.iter().take(3).enumerate() {
        for offset in 0..7 {
            let work_date = today - Duration::days(offset);
            let absence = if index == 1 && offset < 2 { 8.0 } else { 0.0 };
            sqlx::query(
                r#"
                INSERT INTO pest_analytics.technician_schedules
                (technician_id, work_date, scheduled_hours, work_hours, absence_hours)
                VALUES ($1, $2, $3, 8.0, $4)
                ON CONFLICT (technician_id, work_date) DO NOTHING
                "#,
            )
            .bind(technician_id)
            .bind(work_date)
            .bind(5.0 + index as f64 * 1.5)
            .bind(absence)
            .execute(pool)
            .await?;
        }
    }

    let morning = today.and_time(NaiveTime::MIN).and_utc() + Duration::hours(7);
    let track = [(59.3293, 18.0686), (59.3421, 18.0502), (59.3610, 18.0330), (59.3345, 18.0121)];
    for (step, (latitude, longitude)) in track.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO pest_analytics.vehicle_positions
            (technician_id, recorded_at, latitude, longitude)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (technician_id, recorded_at) DO NOTHING
            "#,
        )
        .bind(ids[0])
        .bind(morning + Duration::minutes(90 * step as i64))
        .bind(latitude)
        .bind(longitude)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        source: String,
        source_key: Option<String>,
        technician_email: String,
        status: String,
        amount: Option<String>,
        pest_type: Option<String>,
        completed_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("opening {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("reading CSV record {}", line + 1))?;
        let source: CaseSource = row.source.parse()?;

        let technician_id: Uuid = sqlx::query(
            "SELECT id FROM pest_analytics.technicians WHERE email = $1",
        )
        .bind(&row.technician_email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no technician with email {}", row.technician_email))?
        .try_get("id")?;

        let amount = match row.amount.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => Some(
                Decimal::from_str(value)
                    .with_context(|| format!("invalid amount '{value}' on CSV record {}", line + 1))?,
            ),
            _ => None,
        };

        let case = NewCase {
            source,
            source_key: row
                .source_key
                .unwrap_or_else(|| format!("import-{}", Uuid::new_v4())),
            technician_id,
            status: row.status,
            amount,
            pest_type: row.pest_type.filter(|pest| !pest.trim().is_empty()),
            completed_at: row.completed_at,
        };

        if insert_case(pool, &case).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
