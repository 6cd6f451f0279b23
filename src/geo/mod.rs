use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

/// Coarse lat/lng window that contains every point within `radius_km` of a
/// center. Callers refine matches with [`haversine_km`].
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    center: GeoPoint,
    lat_delta: f64,
    lng_delta: Option<f64>,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km.max(0.0) / EARTH_RADIUS_KM;
        let lat_delta = angular.to_degrees();

        // Widest longitude span of a great circle of that radius. Near the
        // poles the circle wraps every meridian.
        let cos_lat = center.lat.to_radians().cos();
        let ratio = angular.sin() / cos_lat;
        let lng_delta = if angular < std::f64::consts::FRAC_PI_2 && ratio < 1.0 {
            Some(ratio.asin().to_degrees())
        } else {
            None
        };

        Self {
            center,
            lat_delta,
            lng_delta,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        if (point.lat - self.center.lat).abs() > self.lat_delta {
            return false;
        }

        match self.lng_delta {
            Some(max_delta) => longitude_gap(self.center.lng, point.lng) <= max_delta,
            None => true,
        }
    }
}

fn longitude_gap(a: f64, b: f64) -> f64 {
    let gap = (a - b).abs() % 360.0;
    if gap > 180.0 { 360.0 - gap } else { gap }
}
