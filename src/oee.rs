//! Overall equipment effectiveness figures derived from the OEE inputs.

use serde::Serialize;

use crate::field_key::SEPARATOR;
use crate::flatten::FlatMap;
use crate::form::FormSurface;

pub const OEE_PREFIX: &str = "data.oee";

pub const INPUT_FIELDS: [&str; 6] = [
    "runtime",
    "planneddowntime",
    "unplanneddowntime",
    "total_parts_produced",
    "nominalcycletime",
    "totalscrap",
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OeeInputs {
    /// Hours.
    pub runtime: f64,
    /// Minutes.
    pub planned_downtime: f64,
    /// Minutes.
    pub unplanned_downtime: f64,
    pub total_parts: f64,
    /// Ideal seconds per part.
    pub cycle_time: f64,
    pub total_scrap: f64,
}

impl OeeInputs {
    /// Reads the inputs out of a flat map. Blank or unparsable values count
    /// as zero.
    pub fn from_fields(fields: &FlatMap) -> Self {
        let number = |name: &str| -> f64 {
            fields
                .get(oee_key(name).as_str())
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite())
                .unwrap_or(0.0)
        };
        Self {
            runtime: number("runtime"),
            planned_downtime: number("planneddowntime"),
            unplanned_downtime: number("unplanneddowntime"),
            total_parts: number("total_parts_produced"),
            cycle_time: number("nominalcycletime"),
            total_scrap: number("totalscrap"),
        }
    }
}

/// Whole-number results, percentages on a 0-100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OeeFigures {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
    pub capacity: f64,
    pub total_produced: f64,
}

pub fn oee_key(field: &str) -> String {
    format!("{OEE_PREFIX}{SEPARATOR}{field}")
}

pub fn is_input_key(key: &str) -> bool {
    key.strip_prefix(OEE_PREFIX)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .is_some_and(|field| INPUT_FIELDS.contains(&field))
}

fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

pub fn compute(inputs: &OeeInputs) -> OeeFigures {
    let runtime_sec = inputs.runtime * 3600.0;
    let planned_production = (runtime_sec - inputs.planned_downtime * 60.0).max(0.0);
    let operating = (planned_production - inputs.unplanned_downtime * 60.0).max(0.0);

    let availability = percent(operating, planned_production);
    let ideal_parts = if inputs.cycle_time > 0.0 {
        operating / inputs.cycle_time
    } else {
        0.0
    };
    let performance = percent(inputs.total_parts, ideal_parts);
    let good_parts = (inputs.total_parts - inputs.total_scrap).max(0.0);
    let quality = percent(good_parts, inputs.total_parts);
    let oee = availability * performance * quality / 10_000.0;
    let capacity = if inputs.runtime > 0.0 {
        inputs.total_parts / inputs.runtime
    } else {
        0.0
    };

    // Halves round to even.
    OeeFigures {
        availability: availability.round_ties_even(),
        performance: performance.round_ties_even(),
        quality: quality.round_ties_even(),
        oee: oee.round_ties_even(),
        capacity: capacity.round_ties_even(),
        total_produced: inputs.total_parts.round_ties_even(),
    }
}

impl OeeFigures {
    /// Display key and rendered value of every figure.
    pub fn displays(&self) -> [(String, String); 6] {
        [
            ("availability", self.availability),
            ("performance", self.performance),
            ("quality", self.quality),
            ("oee", self.oee),
            ("capacity", self.capacity),
            ("totalproduced", self.total_produced),
        ]
        .map(|(field, value)| (oee_key(field), format!("{value:.0}")))
    }
}

/// Pushes the figures into their display controls. Returns how many
/// displays were present.
pub fn write_displays(form: &mut dyn FormSurface, figures: &OeeFigures) -> usize {
    figures
        .displays()
        .iter()
        .filter(|(key, value)| form.write(key.as_str(), value.as_str()))
        .count()
}
