use crate::model::enrichment::{TaxEstimate, TaxMethod};

/// Municipal residential mill rates for cities the table knows.
const CITY_RATES: &[(&str, &str, f64)] = &[
    ("toronto", "ON", 0.0063),
    ("ottawa", "ON", 0.0112),
    ("mississauga", "ON", 0.0087),
    ("hamilton", "ON", 0.0129),
    ("vancouver", "BC", 0.0028),
    ("victoria", "BC", 0.0052),
    ("calgary", "AB", 0.0065),
    ("edmonton", "AB", 0.0094),
    ("montreal", "QC", 0.0059),
    ("halifax", "NS", 0.0110),
];

/// Province-wide fallback rates when the city has no entry.
const PROVINCE_RATES: &[(&str, f64)] = &[
    ("ON", 0.011),
    ("BC", 0.0045),
    ("AB", 0.0080),
    ("QC", 0.0085),
    ("NS", 0.0115),
    ("MB", 0.0125),
    ("SK", 0.0105),
    ("NB", 0.0130),
];

/// Unknown-province flat rate.
const UNKNOWN_RATE: f64 = 0.01;

/// Rate-table annual tax estimate: city match → province default → unknown,
/// each tagged with how the figure was derived.
pub fn estimate_annual_tax(city: &str, province: &str, assessed_value: f64) -> TaxEstimate {
    let city_lower = city.to_lowercase();
    let province_upper = province.to_uppercase();

    if let Some((_, _, rate)) = CITY_RATES
        .iter()
        .find(|(c, p, _)| *c == city_lower && *p == province_upper)
    {
        return TaxEstimate {
            annual_estimate: assessed_value * rate,
            method: TaxMethod::RateTable,
        };
    }

    if let Some((_, rate)) = PROVINCE_RATES.iter().find(|(p, _)| *p == province_upper) {
        return TaxEstimate {
            annual_estimate: assessed_value * rate,
            method: TaxMethod::RateTable,
        };
    }

    TaxEstimate {
        annual_estimate: assessed_value * UNKNOWN_RATE,
        method: TaxMethod::Unknown,
    }
}
