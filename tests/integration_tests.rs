use chrono::NaiveDate;
use financial_period_reconciler::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn load_csv(kind: StatementKind, report_type: ReportType, data: &str) -> anyhow::Result<StatementTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect::<Vec<String>>());
    }

    Ok(StatementTable::from_string_rows(kind, report_type, &header, rows)?)
}

const NVDA_QUARTERLY_INCOME: &str = "\
Date,Total Revenue,Net Income,Diluted EPS
2025-10-31 00:00:00,57006000000,31910000000,1.30
2025-07-27 00:00:00,46743000000,26422000000,1.08
2025-01-26 00:00:00,39331000000,22091000000,0.89
";

const NVDA_QUARTERLY_BALANCE: &str = "\
Date,Ordinary Shares Number,Share Issued,Total Assets
2025-10-31,24305000000,24305000000,161148000000
2025-07-27,24347000000,24347000000,140740000000
2025-01-26,24477000000,24477000000,111601000000
";

const NVDA_QUARTERLY_CASH_FLOW: &str = "\
Date,Free Cash Flow,Net Income
2025-10-31,22089000000,31910000000
2025-07-27,13450000000,26422000000
2025-01-26,15519000000,NaN
";

fn nvda_bundle() -> anyhow::Result<StatementBundle> {
    Ok(StatementBundle::new()
        .with_table(load_csv(
            StatementKind::Income,
            ReportType::Quarterly,
            NVDA_QUARTERLY_INCOME,
        )?)
        .with_table(load_csv(
            StatementKind::BalanceSheet,
            ReportType::Quarterly,
            NVDA_QUARTERLY_BALANCE,
        )?)
        .with_table(load_csv(
            StatementKind::CashFlow,
            ReportType::Quarterly,
            NVDA_QUARTERLY_CASH_FLOW,
        )?))
}

fn nvda_prices(today: NaiveDate) -> PriceHistory {
    PriceHistory::from_config(&ReconcilerConfig::default(), today).with_closes(
        "NVDA",
        vec![
            (date(2025, 2, 26), 131.28),
            (date(2025, 8, 27), 181.60),
            (date(2025, 11, 19), 186.52),
        ],
    )
}

#[test]
fn test_nvda_fiscal_year_wraps_into_next_calendar_year() -> anyhow::Result<()> {
    let today = date(2025, 12, 15);
    let tables = nvda_bundle()?.to_raw_tables("NVDA")?;
    // Fiscal year ending 2025-01-26
    let profile = CompanyFiscalProfile::from_last_fiscal_year_end(
        "NVDA",
        Some(1_737_849_600),
        Some(24_300_000_000.0),
    );
    let calendar = [date(2025, 2, 26), date(2025, 8, 27), date(2025, 11, 19)];

    let pipeline = ReconciliationPipeline::new(ReconcilerConfig::default(), today)?;
    let result = pipeline.reconcile(
        TickerInputs {
            ticker: "NVDA",
            statement_tables: &tables,
            calendar_dates: &calendar,
            share_history: &[],
            profile: Some(&profile),
        },
        &nvda_prices(today),
        &MemoryStore::new(),
    )?;

    let periods: Vec<(NaiveDate, String)> = result
        .records
        .iter()
        .map(|r| (r.report_period, r.fiscal_period().to_string()))
        .collect();
    assert_eq!(
        periods,
        vec![
            (date(2025, 10, 31), "FY2026 Q3".to_string()),
            (date(2025, 7, 27), "FY2026 Q2".to_string()),
            (date(2025, 1, 26), "FY2025 Q4".to_string()),
        ]
    );

    let latest = &result.records[0];
    assert_eq!(latest.announce_date, date(2025, 11, 19));
    assert_eq!(latest.adj_close_price, Some(186.52));
    assert_eq!(latest.shares_outstanding, Some(24_305_000_000.0));
    assert_eq!(latest.provenance.fiscal, FiscalSource::Profile);
    assert!((latest.market_cap.unwrap() - 186.52 * 24.305).abs() < 1e-6);

    // Cash flow "NaN" must not erase the income statement's value.
    let oldest = &result.records[2];
    assert_eq!(
        oldest.merged_metrics.get("Net Income"),
        Some(&Some(22_091_000_000.0))
    );
    assert!(result.conflicts.is_empty());

    println!("✓ NVDA fiscal wrap-around test passed");
    Ok(())
}

#[test]
fn test_second_run_is_a_no_op() -> anyhow::Result<()> {
    let today = date(2025, 12, 15);
    let tables = nvda_bundle()?.to_raw_tables("NVDA")?;
    let calendar = [date(2025, 2, 26), date(2025, 8, 27), date(2025, 11, 19)];
    let pipeline = ReconciliationPipeline::new(ReconcilerConfig::default(), today)?;
    let prices = nvda_prices(today);
    let inputs = TickerInputs {
        ticker: "NVDA",
        statement_tables: &tables,
        calendar_dates: &calendar,
        share_history: &[],
        profile: None,
    };

    let mut store = MemoryStore::new();
    let first = pipeline.reconcile(inputs, &prices, &store)?;
    assert_eq!(first.records.len(), 3);
    for record in first.records {
        assert!(store.persist(record)?);
    }

    let second = pipeline.reconcile(inputs, &prices, &store)?;
    assert!(second.records.is_empty());
    assert_eq!(second.skipped_existing, 3);
    assert_eq!(store.len(), 3);
    Ok(())
}

#[test]
fn test_same_key_persisted_twice_is_stored_once() -> anyhow::Result<()> {
    let today = date(2025, 12, 15);
    let tables = nvda_bundle()?.to_raw_tables("NVDA")?;
    let pipeline = ReconciliationPipeline::new(ReconcilerConfig::default(), today)?;
    let prices = |_: &str, _: NaiveDate| -> SourceResult<f64> { Ok(Some(150.0)) };
    let inputs = TickerInputs {
        ticker: "NVDA",
        statement_tables: &tables,
        calendar_dates: &[],
        share_history: &[],
        profile: None,
    };

    // Two independent runs against an empty store both emit the same keys.
    let a = pipeline.reconcile(inputs, &prices, &MemoryStore::new())?;
    let mut b = pipeline.reconcile(inputs, &prices, &MemoryStore::new())?;
    b.records[0].adj_close_price = Some(999.0);
    b.records[0].market_cap = Some(1.0);

    let mut store = MemoryStore::new();
    for record in a.records.into_iter().chain(b.records) {
        store.persist(record)?;
    }
    assert_eq!(store.len(), 3);
    let key = RecordKey::new("NVDA", date(2025, 10, 31), ReportType::Quarterly);
    assert_eq!(store.get(&key).unwrap().adj_close_price, Some(150.0));
    Ok(())
}

#[test]
fn test_share_count_falls_back_to_history() -> anyhow::Result<()> {
    let balance = load_csv(
        StatementKind::BalanceSheet,
        ReportType::Annual,
        "Date,Ordinary Shares Number,Share Issued\n2020-09-26,0,\n",
    )?;
    let tables = StatementBundle::new()
        .with_table(balance)
        .to_raw_tables("AAPL")?;
    let history = [
        ShareHistoryPoint {
            date: date(2020, 10, 16),
            shares: 17_001_802_000.0,
        },
        ShareHistoryPoint {
            date: date(2021, 6, 1),
            shares: 16_687_631_000.0,
        },
    ];
    let prices = PriceHistory::from_config(&ReconcilerConfig::default(), date(2024, 1, 1))
        .with_closes("AAPL", vec![(date(2020, 10, 30), 108.86)]);

    let result = reconcile(
        "AAPL",
        &tables,
        &[date(2020, 10, 29)],
        &history,
        Some(&CompanyFiscalProfile {
            ticker: "AAPL".to_string(),
            fiscal_year_end_month: Some(9),
            current_shares_outstanding: Some(14_840_390_000.0),
        }),
        &prices,
        &MemoryStore::new(),
    )?;

    let record = &result.records[0];
    assert_eq!(record.shares_outstanding, Some(17_001_802_000.0));
    assert_eq!(record.provenance.shares, Some(SharesSource::History));
    assert_eq!(record.adj_close_price, Some(108.86));
    assert_eq!(record.fiscal_period().to_string(), "FY2020 FY");
    Ok(())
}

#[test]
fn test_conflicting_metrics_are_flagged() -> anyhow::Result<()> {
    let income = load_csv(
        StatementKind::Income,
        ReportType::Annual,
        "Date,Net Income\n2023-06-30,72361000000\n",
    )?;
    let cash_flow = load_csv(
        StatementKind::CashFlow,
        ReportType::Annual,
        "Date,Net Income,Ordinary Shares Number\n2023-06-30,72400000000,7432000000\n",
    )?;
    let tables = StatementBundle::new()
        .with_table(cash_flow)
        .with_table(income)
        .to_raw_tables("MSFT")?;
    let prices = |_: &str, _: NaiveDate| -> SourceResult<f64> { Ok(Some(327.0)) };

    let result = reconcile(
        "MSFT",
        &tables,
        &[],
        &[],
        None,
        &prices,
        &MemoryStore::new(),
    )?;

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].metric, "Net Income");
    assert_eq!(result.conflicts[0].kept, 72_400_000_000.0);
    assert_eq!(
        result.records[0].merged_metrics.get("Net Income"),
        Some(&Some(72_400_000_000.0))
    );
    Ok(())
}

#[test]
fn test_runner_withholds_and_skips() -> anyhow::Result<()> {
    let today = date(2025, 12, 15);
    let materialized = MaterializedSource::new("fixtures")
        .with_statements("NVDA", nvda_bundle()?)
        .with_calendar("NVDA", vec![date(2025, 8, 27), date(2025, 11, 19)])
        .with_statements("AMD", nvda_bundle()?)
        .failing_for("AMD");

    // AMD's calendar fails on the primary and has no data on the fallback.
    let calendars: SourceChain<dyn CalendarSource> = SourceChain::<dyn CalendarSource>::new()
        .with_source(Box::new(materialized.clone()))
        .with_source(Box::new(MaterializedSource::new("empty")));

    let statements: SourceChain<dyn StatementSource> = SourceChain::<dyn StatementSource>::new()
        .with_source(Box::new(MaterializedSource::new("fixtures-b").with_statements("AMD", nvda_bundle()?)))
        .with_source(Box::new(materialized.clone()));

    // No close anywhere near 2025-01-26's announcement.
    let prices = PriceHistory::from_config(&ReconcilerConfig::default(), today).with_closes(
        "NVDA",
        vec![(date(2025, 8, 27), 181.60), (date(2025, 11, 19), 186.52)],
    );

    let pipeline = ReconciliationPipeline::new(ReconcilerConfig::default(), today)?;
    let runner = ReconciliationRunner::new(
        pipeline,
        Box::new(statements),
        Box::new(calendars),
        Box::new(materialized.clone()),
        Box::new(prices),
    )
    .with_profiles(Box::new(materialized));

    let mut store = MemoryStore::new();
    let summary = runner.run(&["AMD", "NVDA"], &mut store);

    // AMD: statements come from the second source, its calendar chain yields no data,
    // then share history fails.
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].ticker, "AMD");
    assert_eq!(summary.failures[0].stage, RunStage::ShareHistory);

    let nvda = summary.outcome("NVDA").unwrap();
    assert_eq!(nvda.records.len(), 2);
    assert_eq!(nvda.withheld.len(), 1);
    assert_eq!(nvda.withheld[0].reason, WithholdReason::PriceUnavailable);
    assert_eq!(nvda.withheld[0].key.report_period, date(2025, 1, 26));

    assert_eq!(summary.persisted, 2);
    assert_eq!(store.len(), 2);
    assert!(!store.contains(&RecordKey::new(
        "NVDA",
        date(2025, 1, 26),
        ReportType::Quarterly
    )));
    Ok(())
}

#[test]
fn test_store_snapshot_file_roundtrip() -> anyhow::Result<()> {
    let today = date(2025, 12, 15);
    let tables = nvda_bundle()?.to_raw_tables("NVDA")?;
    let result = FinancialPeriodReconciler::reconcile_with(
        &ReconcilerConfig::default(),
        today,
        TickerInputs {
            ticker: "NVDA",
            statement_tables: &tables,
            calendar_dates: &[date(2025, 2, 26), date(2025, 8, 27), date(2025, 11, 19)],
            share_history: &[],
            profile: None,
        },
        &nvda_prices(today),
        &MemoryStore::new(),
    )?;

    let mut store = MemoryStore::new();
    for record in result.records {
        store.persist(record)?;
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("store.json");
    store.save(&path)?;
    let restored = MemoryStore::load(&path)?;

    assert_eq!(restored.len(), 3);
    let json = restored.to_json()?;
    assert!(!json.contains("NaN"));
    assert!(json.contains("\"market_cap_billions\""));
    assert!(json.contains("\"data_source\": \"yfinance\""));

    let newer = json.replacen("\"schema_version\": 1", "\"schema_version\": 2", 1);
    assert!(matches!(
        MemoryStore::from_json(&newer),
        Err(ReconciliationError::UnsupportedSchemaVersion { found: 2, .. })
    ));
    Ok(())
}

#[test]
fn test_config_overrides_from_json() -> anyhow::Result<()> {
    let config = ReconcilerConfig::from_json_str(
        r#"{
            "announcement": { "max_offset_days": 45 },
            "fiscal_year_end_defaults": { "ORCL": 5 },
            "data_source": "fixtures"
        }"#,
    )?;

    assert_eq!(config.announcement.min_offset_days, 10);
    assert_eq!(config.announcement.max_offset_days, 45);
    assert_eq!(config.fiscal_year_end_default("ORCL"), Some(5));
    assert_eq!(config.fiscal_year_end_default("NVDA"), None);
    assert_eq!(config.data_source, "fixtures");

    let invalid = ReconcilerConfig::from_json_str(r#"{"fiscal_year_end_defaults": {"X": 13}}"#);
    assert!(matches!(
        invalid,
        Err(ReconciliationError::InvalidFiscalYearEndMonth(13))
    ));
    Ok(())
}

#[test]
fn test_schema_generation() {
    let record_schema = FinancialRecord::schema_as_json().unwrap();
    assert!(record_schema.contains("announce_date"));
    assert!(record_schema.contains("merged_metrics"));

    let config_schema = ReconcilerConfig::schema_as_json().unwrap();
    assert!(config_schema.contains("fiscal_year_end_defaults"));
    assert!(config_schema.contains("field_aliases"));
}
