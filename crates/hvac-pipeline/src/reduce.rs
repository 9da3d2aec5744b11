//! Window reduction.
//!
//! Numeric items reduce to the median of the window; boolean, enum and text
//! items reduce to the most recently received value.

use chrono::{DateTime, Utc};
use hvac_model::{DataType, PlantValue};

/// One buffered telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: PlantValue,
    pub received_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: PlantValue, received_at: DateTime<Utc>) -> Self {
        Self { value, received_at }
    }
}

/// Median of a set of values: sorted, the middle element for an odd count,
/// the mean of the two middle elements for an even count.
pub fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Reduce a window of samples for an item of the given data type.
///
/// Returns `None` for an empty window; nothing is synthesised.
pub fn reduce(data_type: &DataType, samples: &[Sample]) -> Option<PlantValue> {
    if samples.is_empty() {
        return None;
    }
    if data_type.is_numeric() {
        let values: Vec<f64> = samples
            .iter()
            .filter_map(|sample| sample.value.as_f64())
            .collect();
        return median(values).map(PlantValue::Float);
    }
    samples.last().map(|sample| sample.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: PlantValue) -> Sample {
        Sample::new(value, Utc::now())
    }

    #[test]
    fn test_median_odd_count_is_middle_element() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![5.0]), Some(5.0));
    }

    #[test]
    fn test_median_even_count_averages_the_middle_pair() {
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(vec![10.0, 20.0]), Some(15.0));
    }

    #[test]
    fn test_median_empty_is_none() {
        assert_eq!(median(vec![]), None);
    }

    #[test]
    fn test_numeric_reduction_uses_median() {
        let samples: Vec<Sample> = [3.0, 1.0, 2.0]
            .into_iter()
            .map(|v| sample(PlantValue::Float(v)))
            .collect();
        assert_eq!(
            reduce(&DataType::Float, &samples),
            Some(PlantValue::Float(2.0))
        );
    }

    #[test]
    fn test_integer_items_reduce_through_the_numeric_path() {
        let samples: Vec<Sample> = [4, 1, 3, 2]
            .into_iter()
            .map(|v| sample(PlantValue::Integer(v)))
            .collect();
        assert_eq!(
            reduce(&DataType::Integer, &samples),
            Some(PlantValue::Float(2.5))
        );
    }

    #[test]
    fn test_non_numeric_reduction_keeps_the_last_value() {
        let samples = vec![
            sample(PlantValue::Text("OFF".into())),
            sample(PlantValue::Text("OFF".into())),
            sample(PlantValue::Text("ON".into())),
        ];
        let data_type = DataType::Enum { options: vec![] };
        assert_eq!(
            reduce(&data_type, &samples),
            Some(PlantValue::Text("ON".into()))
        );

        let flips = vec![
            sample(PlantValue::Boolean(true)),
            sample(PlantValue::Boolean(false)),
        ];
        assert_eq!(
            reduce(&DataType::Boolean, &flips),
            Some(PlantValue::Boolean(false))
        );
    }

    #[test]
    fn test_empty_window_reduces_to_nothing() {
        assert_eq!(reduce(&DataType::Float, &[]), None);
    }
}
