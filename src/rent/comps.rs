use chrono::{DateTime, Utc};

use crate::config::EstimatorConfig;
use crate::model::listing::{Listing, PropertyType};
use crate::model::rent::CompSample;

/// A raw rental observation from the comps universe (recent leases and
/// rental listings), before any filtering.
#[derive(Debug, Clone)]
pub struct RentalComp {
    pub listing_id: String,
    pub monthly_rent: f64,
    pub beds: u32,
    pub baths: u32,
    pub sqft: Option<u32>,
    pub property_type: PropertyType,
    pub city: String,
    pub fsa: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub observed_at: DateTime<Utc>,
}

/// Supplies candidate comps near a listing. The pipeline only sees the
/// trait; tests and the demo feed a static set.
pub trait CompsSource: Send + Sync {
    fn candidates_for(&self, listing: &Listing) -> Vec<RentalComp>;
}

/// A fixed in-memory comps universe.
#[derive(Default)]
pub struct StaticComps {
    pub comps: Vec<RentalComp>,
}

impl CompsSource for StaticComps {
    fn candidates_for(&self, _listing: &Listing) -> Vec<RentalComp> {
        self.comps.clone()
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Apply the comparability filter: beds ±1, baths ±1, sqft ±20 % (when both
/// sides know it), same property type, same city or FSA, inside the radius
/// and recency window. Returns samples annotated with distance and age.
pub fn filter_comps(
    listing: &Listing,
    listing_lat: f64,
    listing_lng: f64,
    candidates: &[RentalComp],
    cfg: &EstimatorConfig,
    now: DateTime<Utc>,
) -> Vec<CompSample> {
    let listing_fsa = listing.address.fsa();

    candidates
        .iter()
        .filter_map(|comp| {
            if comp.listing_id == listing.id {
                return None;
            }
            if comp.property_type != listing.property_type {
                return None;
            }
            if comp.beds.abs_diff(listing.beds) > 1 || comp.baths.abs_diff(listing.baths) > 1 {
                return None;
            }
            if let (Some(a), Some(b)) = (listing.sqft, comp.sqft) {
                let (a, b) = (a as f64, b as f64);
                if (b - a).abs() / a > 0.20 {
                    return None;
                }
            }

            let same_city = comp.city.eq_ignore_ascii_case(&listing.address.city);
            let same_fsa = match (&listing_fsa, &comp.fsa) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            };
            if !same_city && !same_fsa {
                return None;
            }

            let age_days = (now - comp.observed_at).num_days();
            if age_days < 0 || age_days > cfg.comps_window_days {
                return None;
            }

            let distance_km = haversine_km(listing_lat, listing_lng, comp.lat, comp.lng);
            if distance_km > cfg.comps_radius_km {
                return None;
            }

            Some(CompSample {
                listing_id: comp.listing_id.clone(),
                monthly_rent: comp.monthly_rent,
                beds: comp.beds,
                baths: comp.baths,
                sqft: comp.sqft,
                distance_km,
                age_days,
            })
        })
        .collect()
}

/// Linear-interpolation percentile over a sorted copy of the rents.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Sample standard deviation; `None` below two observations.
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_median_of_odd_set() {
        let sorted = [2000.0, 2400.0, 2600.0];
        assert_eq!(percentile(&sorted, 0.5), 2400.0);
    }

    #[test]
    fn percentile_interpolates_even_set() {
        let sorted = [2000.0, 3000.0];
        assert_eq!(percentile(&sorted, 0.5), 2500.0);
        assert_eq!(percentile(&sorted, 0.25), 2250.0);
    }

    #[test]
    fn stdev_of_constant_set_is_zero() {
        let s = sample_stdev(&[2500.0, 2500.0, 2500.0]).unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn haversine_downtown_toronto_block_is_short() {
        // Union Station to City Hall, about 1 km.
        let d = haversine_km(43.6453, -79.3806, 43.6534, -79.3841);
        assert!(d > 0.5 && d < 1.5, "got {d}");
    }
}
