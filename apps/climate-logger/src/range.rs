use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeLabel {
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    Week,
}

/// How slot labels are rendered for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    /// `14:30`
    HourMinute,
    /// `Oct 16 14h`
    DayHour,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeSpec {
    pub label: RangeLabel,
    pub point_count: u32,
    pub interval_minutes: u32,
}

impl RangeLabel {
    pub const ALL: [RangeLabel; 4] = [
        RangeLabel::SixHours,
        RangeLabel::Day,
        RangeLabel::ThreeDays,
        RangeLabel::Week,
    ];

    pub const DEFAULT: RangeLabel = RangeLabel::Day;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "6h" => Some(RangeLabel::SixHours),
            "24h" => Some(RangeLabel::Day),
            "3d" => Some(RangeLabel::ThreeDays),
            "1w" => Some(RangeLabel::Week),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RangeLabel::SixHours => "6h",
            RangeLabel::Day => "24h",
            RangeLabel::ThreeDays => "3d",
            RangeLabel::Week => "1w",
        }
    }

    pub fn spec(self) -> RangeSpec {
        let (point_count, interval_minutes) = match self {
            RangeLabel::SixHours => (36, 10),
            RangeLabel::Day => (24, 60),
            RangeLabel::ThreeDays => (24, 180),
            RangeLabel::Week => (28, 360),
        };
        RangeSpec {
            label: self,
            point_count,
            interval_minutes,
        }
    }

    pub fn label_style(self) -> LabelStyle {
        match self {
            RangeLabel::SixHours | RangeLabel::Day => LabelStyle::HourMinute,
            RangeLabel::ThreeDays | RangeLabel::Week => LabelStyle::DayHour,
        }
    }
}

/// Maps a window label to its fixed grid. Anything unrecognised gets the 24h
/// grid; the dashboard always renders.
pub fn resolve(label: &str) -> RangeSpec {
    RangeLabel::parse(label)
        .unwrap_or_else(|| {
            tracing::debug!(label, "unknown range label; using default window");
            RangeLabel::DEFAULT
        })
        .spec()
}

impl RangeSpec {
    pub fn slot_count(&self) -> usize {
        self.point_count as usize + 1
    }

    pub fn span_minutes(&self) -> i64 {
        i64::from(self.point_count) * i64::from(self.interval_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_fixed_windows() {
        let table: Vec<(&str, u32, u32)> = RangeLabel::ALL
            .iter()
            .map(|label| {
                let spec = resolve(label.as_str());
                (label.as_str(), spec.point_count, spec.interval_minutes)
            })
            .collect();
        assert_eq!(
            table,
            vec![("6h", 36, 10), ("24h", 24, 60), ("3d", 24, 180), ("1w", 28, 360)]
        );
    }

    #[test]
    fn unknown_labels_fall_back_to_day() {
        let day = resolve("24h");
        for raw in ["bogus", "", "6H", " 6h", "1m"] {
            assert_eq!(resolve(raw), day, "label {raw:?}");
        }
    }

    #[test]
    fn spans_and_label_styles() {
        assert_eq!(resolve("6h").span_minutes(), 6 * 60);
        assert_eq!(resolve("1w").span_minutes(), 7 * 24 * 60);
        assert_eq!(resolve("1w").slot_count(), 29);
        assert_eq!(RangeLabel::Day.label_style(), LabelStyle::HourMinute);
        assert_eq!(RangeLabel::ThreeDays.label_style(), LabelStyle::DayHour);
    }
}
