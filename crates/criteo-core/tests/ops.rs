use std::collections::HashMap;

use criteo_core::ops::{
    bucket_for, hash_value, AddConstant, FillMissing, FrequencyFilter, HashBucket, LogOp,
    Operator,
};
use criteo_core::PreprocError;
use polars::prelude::*;

#[test]
fn fill_missing_handles_float_and_int_columns() -> anyhow::Result<()> {
    let floats = Series::new("int_0".into(), vec![Some(1.5f64), None, Some(-2.0)]);
    let filled = FillMissing { value: 0.0 }.transform(&floats)?;
    let values: Vec<Option<f64>> = filled.f64()?.into_iter().collect();
    assert_eq!(values, vec![Some(1.5), Some(0.0), Some(-2.0)]);

    let ints = Series::new("cat_0".into(), vec![None, Some(7i64)]);
    let filled = FillMissing::default().transform(&ints)?;
    assert_eq!(filled.dtype(), &DataType::Int64);
    let values: Vec<Option<i64>> = filled.i64()?.into_iter().collect();
    assert_eq!(values, vec![Some(0), Some(7)]);
    Ok(())
}

#[test]
fn continuous_chain_is_log_of_x_plus_three() -> anyhow::Result<()> {
    let raw = Series::new("int_3".into(), vec![None, Some(0i64), Some(5)]);
    let filled = FillMissing::default().transform(&raw)?;
    let shifted = AddConstant { value: 2.0 }.transform(&filled)?;
    let logged = LogOp.transform(&shifted)?;

    let values: Vec<f64> = logged.f64()?.into_iter().flatten().collect();
    assert!((values[0] - 3f64.ln()).abs() < 1e-12);
    assert!((values[1] - 3f64.ln()).abs() < 1e-12);
    assert!((values[2] - 8f64.ln()).abs() < 1e-12);
    Ok(())
}

#[test]
fn log_op_does_not_clip_out_of_domain_values() -> anyhow::Result<()> {
    let raw = Series::new("int_1".into(), vec![-1.0f64, -2.0]);
    let logged = LogOp.transform(&raw)?;
    let values = logged.f64()?;
    assert_eq!(values.get(0), Some(f64::NEG_INFINITY));
    assert!(values.get(1).is_some_and(f64::is_nan));
    Ok(())
}

#[test]
fn hash_bucket_is_deterministic_and_in_range() -> anyhow::Result<()> {
    let op = HashBucket::new(HashMap::from([("cat_5".to_string(), 3u64)]))?;
    let raw = Series::new("cat_5".into(), (0..200i64).collect::<Vec<_>>());

    let first = op.transform(&raw)?;
    let second = op.transform(&raw)?;
    assert!(first.equals(&second));

    let buckets: Vec<i64> = first.i64()?.into_iter().flatten().collect();
    assert_eq!(buckets.len(), 200);
    assert!(buckets.iter().all(|b| (0..3).contains(b)));
    for bucket in 0..3 {
        assert!(buckets.contains(&bucket), "bucket {bucket} never used");
    }

    assert_eq!(hash_value(42), hash_value(42));
    assert_ne!(hash_value(42), hash_value(43));
    assert_eq!(bucket_for(42, 1), 0);
    Ok(())
}

#[test]
fn hash_bucket_rejects_unknown_columns_and_zero_buckets() {
    let op = HashBucket::new(HashMap::from([("cat_0".to_string(), 10u64)])).unwrap();
    let err = op
        .transform(&Series::new("cat_1".into(), vec![1i64]))
        .expect_err("unknown column");
    assert!(matches!(err, PreprocError::UnknownColumn { .. }));

    let err = HashBucket::from_columns(&["cat_0".to_string()], &[0]).expect_err("zero buckets");
    assert!(matches!(err, PreprocError::Config(_)));

    let err = HashBucket::from_columns(&["cat_0".to_string()], &[1, 2]).expect_err("mismatch");
    assert!(matches!(err, PreprocError::Config(_)));
}

#[test]
fn frequency_filter_drops_rare_values_after_fit() -> anyhow::Result<()> {
    let raw = Series::new(
        "cat_2".into(),
        vec![Some(1i64), Some(1), Some(1), Some(2), None, Some(3), Some(3)],
    );

    let mut op = FrequencyFilter::new(2);
    let err = op.transform(&raw).expect_err("not fitted");
    assert!(matches!(err, PreprocError::NotFitted("FrequencyFilter")));

    op.fit(&raw)?;
    let filtered = op.transform(&raw)?;
    let values: Vec<Option<i64>> = filtered.i64()?.into_iter().collect();
    assert_eq!(
        values,
        vec![Some(1), Some(1), Some(1), None, None, Some(3), Some(3)]
    );
    assert_eq!(op.kept_values("cat_2"), 2);
    assert_eq!(op.describe()["threshold"], 2);
    Ok(())
}
