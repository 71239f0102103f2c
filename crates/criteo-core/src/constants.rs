use once_cell::sync::Lazy;

/// Number of day files in the Criteo 1TB click logs.
pub const DAYS: usize = 24;

pub const INT_FEATURE_COUNT: usize = 13;
pub const CAT_FEATURE_COUNT: usize = 26;

pub const DEFAULT_LABEL_NAME: &str = "label";

/// Minimum occurrence count used when frequency filtering is switched on.
pub const FREQUENCY_THRESHOLD: u64 = 3;

pub const NUM_EMBEDDINGS_PER_FEATURE: [u64; CAT_FEATURE_COUNT] = [
    40_000_000, 39_060, 17_295, 7_424, 20_265, 3, 7_122, 1_543, 63, 40_000_000, 3_067_956,
    405_282, 10, 2_209, 11_938, 155, 4, 976, 14, 40_000_000, 40_000_000, 40_000_000, 590_152,
    12_973, 108, 36,
];

pub static DEFAULT_INT_NAMES: Lazy<Vec<String>> =
    Lazy::new(|| (0..INT_FEATURE_COUNT).map(|idx| format!("int_{idx}")).collect());

pub static DEFAULT_CAT_NAMES: Lazy<Vec<String>> =
    Lazy::new(|| (0..CAT_FEATURE_COUNT).map(|idx| format!("cat_{idx}")).collect());

/// `label, int_0..int_12, cat_0..cat_25`, the on-disk column order.
pub static DEFAULT_COLUMN_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut names = Vec::with_capacity(1 + INT_FEATURE_COUNT + CAT_FEATURE_COUNT);
    names.push(DEFAULT_LABEL_NAME.to_string());
    names.extend(DEFAULT_INT_NAMES.iter().cloned());
    names.extend(DEFAULT_CAT_NAMES.iter().cloned());
    names
});

pub const INPUT_DIR_NAME: &str = "criteo_parquet";
pub const OUTPUT_DIR_NAME: &str = "criteo_preproc";

pub fn train_file_names() -> Vec<String> {
    (0..DAYS - 1).map(|day| format!("day_{day}.parquet")).collect()
}

pub fn validation_file_name() -> String {
    format!("day_{}.part0.parquet", DAYS - 1)
}

pub fn test_file_name() -> String {
    format!("day_{}.part1.parquet", DAYS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_order_is_label_ints_cats() {
        assert_eq!(DEFAULT_COLUMN_NAMES.len(), 40);
        assert_eq!(DEFAULT_COLUMN_NAMES[0], "label");
        assert_eq!(DEFAULT_COLUMN_NAMES[1], "int_0");
        assert_eq!(DEFAULT_COLUMN_NAMES[13], "int_12");
        assert_eq!(DEFAULT_COLUMN_NAMES[14], "cat_0");
        assert_eq!(DEFAULT_COLUMN_NAMES[39], "cat_25");
    }

    #[test]
    fn split_file_names_use_last_day() {
        let train = train_file_names();
        assert_eq!(train.len(), 23);
        assert_eq!(train.last().map(String::as_str), Some("day_22.parquet"));
        assert_eq!(validation_file_name(), "day_23.part0.parquet");
        assert_eq!(test_file_name(), "day_23.part1.parquet");
    }
}
