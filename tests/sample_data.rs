//! Checks against the bundled sample dataset.

use std::path::Path;

use askdf::dataset::{DatasetHolder, LoadOptions};
use askdf::sandbox::{ExecutionOutcome, Sandbox};
use std::time::Duration;

const SAMPLE: &str = "data/sample_sales_data.csv";

#[test]
fn sample_sales_data_has_the_expected_shape() {
    let mut holder = DatasetHolder::new(5);
    let profile = holder.load(Path::new(SAMPLE), &LoadOptions::default()).expect("load sample");
    assert_eq!(profile.rows, 500);
    assert!(!profile.column_names().is_empty());
    assert!(profile.column_names().contains(&"product_category"));
    assert!(profile.column_names().contains(&"total_amount"));
}

#[test]
fn profile_reports_missing_satisfaction_scores() {
    let mut holder = DatasetHolder::new(5);
    let profile = holder.load(Path::new(SAMPLE), &LoadOptions::default()).expect("load sample");
    let satisfaction = profile
        .fields
        .iter()
        .find(|c| c.name == "customer_satisfaction")
        .expect("satisfaction column");
    assert!(satisfaction.null_count > 0, "sample data ships with some missing scores");
}

#[test]
fn revenue_by_category_pipeline_runs_on_the_sample() {
    let mut holder = DatasetHolder::new(5);
    holder.load(Path::new(SAMPLE), &LoadOptions::default()).expect("load sample");
    let sandbox = Sandbox::new(Duration::from_secs(10));
    let out = sandbox
        .execute(
            "groupby product_category agg sum(total_amount) as revenue, count(order_id) as orders | sort revenue desc",
            holder.current().expect("frame"),
        )
        .expect("execute");
    match out {
        ExecutionOutcome::Table(df) => {
            assert_eq!(df.width(), 3);
            assert!(df.height() >= 5, "all six categories should appear");
        }
        other => panic!("expected table, got {:?}", other),
    }
}

#[test]
fn row_count_scalar_matches_the_file() {
    let mut holder = DatasetHolder::new(5);
    holder.load(Path::new(SAMPLE), &LoadOptions::default()).expect("load sample");
    let sandbox = Sandbox::new(Duration::from_secs(10));
    let out = sandbox.execute("count", holder.current().expect("frame")).expect("execute");
    match out {
        ExecutionOutcome::Scalar { name, value } => {
            assert_eq!(name, "count");
            assert_eq!(value, "500");
        }
        other => panic!("expected scalar, got {:?}", other),
    }
}
