use std::fmt::Write as _;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::types::{Metric, Sample, SampleValue, Unit};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedSample {
    /// Unsigned 64-bit nanoseconds, as a decimal string.
    pub elapsed_since_start_ns: String,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedSeries {
    pub unit: Unit,
    pub values: Vec<SerializedSample>,
}

/// Snapshot of every non-empty metric series, in metric declaration order.
///
/// Serializes as a map from metric key to `{unit, values}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerializedMetrics {
    entries: Vec<(Metric, SerializedSeries)>,
}

impl SerializedMetrics {
    /// Formats a store snapshot. Series without samples are left out.
    pub fn from_snapshot(snapshot: Vec<(Metric, Vec<Sample>)>) -> Self {
        let mut entries: Vec<(Metric, SerializedSeries)> = snapshot
            .into_iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(metric, samples)| {
                let values = samples
                    .iter()
                    .map(|sample| SerializedSample {
                        elapsed_since_start_ns: sample.elapsed_ns.to_string(),
                        value: sample.value,
                    })
                    .collect();
                (metric, SerializedSeries { unit: metric.unit(), values })
            })
            .collect();
        entries.sort_by_key(|(metric, _)| *metric);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, metric: Metric) -> Option<&SerializedSeries> {
        self.entries.iter().find(|(m, _)| *m == metric).map(|(_, series)| series)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(metric, _)| metric.key()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &SerializedSeries)> {
        self.entries.iter().map(|(metric, series)| (*metric, series))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable table of the collected series.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n{:=^72}", " METRIC PROFILE ");
        let _ = writeln!(
            out,
            "{:<18} | {:<20} | {:>8} | {:>16}",
            "Metric", "Unit", "Samples", "Last value"
        );
        let _ = writeln!(out, "{:-^72}", "");
        for (metric, series) in self.iter() {
            let last = series
                .values
                .last()
                .map(|s| format_value(&s.value))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "{:<18} | {:<20} | {:>8} | {:>16}",
                metric.key(),
                series.unit.name(),
                series.values.len(),
                last
            );
        }
        let _ = writeln!(out, "{:=^72}", "");
        out
    }
}

fn format_value(value: &SampleValue) -> String {
    match value {
        SampleValue::Bytes(bytes) => format!("{bytes} B"),
        SampleValue::Percentage(percent) => format!("{percent:.2}%"),
        SampleValue::Flag(flag) => flag.to_string(),
        SampleValue::MemoryPressure(level) => format!("{level:?}"),
        SampleValue::ThermalState(state) => format!("{state:?}"),
    }
}

impl Serialize for SerializedMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (metric, series) in &self.entries {
            map.serialize_entry(metric.key(), series)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThermalState;
    use pretty_assertions::assert_eq;

    fn sample(elapsed_ns: u64, value: SampleValue) -> Sample {
        Sample { elapsed_ns, value }
    }

    #[test]
    fn test_empty_series_omitted() {
        let snapshot = vec![
            (Metric::MemoryFootprint, vec![sample(5, SampleValue::Bytes(2048))]),
            (Metric::MemoryPressure, vec![]),
            (Metric::CpuUsage, vec![sample(5, SampleValue::Percentage(12.5))]),
        ];
        let metrics = SerializedMetrics::from_snapshot(snapshot);
        assert_eq!(metrics.keys(), vec!["memory_footprint", "cpu_usage_format"]);
        assert!(metrics.get(Metric::MemoryPressure).is_none());
    }

    #[test]
    fn test_declaration_order_regardless_of_input() {
        let snapshot = vec![
            (Metric::CpuUsage, vec![sample(1, SampleValue::Percentage(1.0))]),
            (
                Metric::ThermalState,
                vec![sample(1, SampleValue::ThermalState(ThermalState::Fair))],
            ),
            (Metric::PowerState, vec![sample(1, SampleValue::Flag(true))]),
        ];
        let metrics = SerializedMetrics::from_snapshot(snapshot);
        assert_eq!(metrics.keys(), vec!["power_state", "thermal_state", "cpu_usage_format"]);
    }

    #[test]
    fn test_json_layout() {
        let snapshot = vec![
            (
                Metric::MemoryFootprint,
                vec![
                    sample(0, SampleValue::Bytes(1024)),
                    sample(u64::MAX, SampleValue::Bytes(4096)),
                ],
            ),
            (
                Metric::ThermalState,
                vec![sample(7, SampleValue::ThermalState(ThermalState::Critical))],
            ),
        ];
        let json = SerializedMetrics::from_snapshot(snapshot).to_json().unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"memory_footprint":{"unit":"byte","values":["#,
                r#"{"elapsed_since_start_ns":"0","value":1024},"#,
                r#"{"elapsed_since_start_ns":"18446744073709551615","value":4096}]},"#,
                r#""thermal_state":{"unit":"thermal_state_enum","values":["#,
                r#"{"elapsed_since_start_ns":"7","value":3}]}}"#
            )
        );
    }

    #[test]
    fn test_empty_serializes_to_empty_map() {
        let metrics = SerializedMetrics::default();
        assert!(metrics.is_empty());
        assert_eq!(metrics.to_json().unwrap(), "{}");
    }

    #[test]
    fn test_summary_lists_series() {
        let snapshot = vec![(Metric::CpuUsage, vec![sample(3, SampleValue::Percentage(42.0))])];
        let summary = SerializedMetrics::from_snapshot(snapshot).summary();
        assert!(summary.contains("cpu_usage_format"));
        assert!(summary.contains("42.00%"));
    }
}
