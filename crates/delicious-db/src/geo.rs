/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const METRES_PER_DEGREE_LAT: f64 = 111_320.0;

/// Great-circle distance between two points, in metres.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lng2 - lng1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Lat/lng rectangle that contains every point within `radius_m` of the centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lng: f64, radius_m: f64) -> Self {
        let dlat = radius_m / METRES_PER_DEGREE_LAT;
        let cos_lat = lat.to_radians().cos();

        // Near the poles or across the antimeridian the longitude window is
        // the whole circle; the haversine pass does the real filtering.
        let dlng = if cos_lat < 1e-6 {
            180.0
        } else {
            radius_m / (METRES_PER_DEGREE_LAT * cos_lat)
        };
        let (min_lng, max_lng) = if lng - dlng < -180.0 || lng + dlng > 180.0 {
            (-180.0, 180.0)
        } else {
            (lng - dlng, lng + dlng)
        };

        Self {
            min_lat: (lat - dlat).max(-90.0),
            max_lat: (lat + dlat).min(90.0),
            min_lng,
            max_lng,
        }
    }
}

pub fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}
