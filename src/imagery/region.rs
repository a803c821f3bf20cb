//! 中心点＋バッファ（メートル）から緯度経度の矩形を求める

/// 1度あたりのメートル数（赤道近似）
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// 極からこの角度以内の緯度は受け付けない
pub const POLE_EPSILON_DEG: f64 = 1e-6;

const MIN_COS_LATITUDE: f64 = 1e-9;

/// 座標・バッファの入力エラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("buffer must be a positive number of meters, got {0}")]
    InvalidBuffer(f64),

    #[error("latitude must be within [-90, 90], got {0}")]
    LatitudeOutOfRange(f64),

    #[error("longitude must be within [-180, 180], got {0}")]
    LongitudeOutOfRange(f64),

    /// 極付近では経度方向のオフセットが発散する
    #[error("latitude {0} is too close to a pole to build a region")]
    NearPole(f64),

    /// 矩形が極を越える、または経度方向に一周を超える
    #[error("buffer of {buffer_m} m around latitude {lat} extends beyond the globe")]
    BufferTooLarge { lat: f64, buffer_m: f64 },
}

/// 地理座標の矩形（度）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRegion {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub center_lat: f64,
    pub center_lon: f64,
    pub buffer_m: f64,
}

impl ImageRegion {
    /// 中心点の周囲 `buffer_m` メートルの矩形を作成
    pub fn around(lat: f64, lon: f64, buffer_m: f64) -> Result<Self, GeoError> {
        if !buffer_m.is_finite() || buffer_m <= 0.0 {
            return Err(GeoError::InvalidBuffer(buffer_m));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeOutOfRange(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::LongitudeOutOfRange(lon));
        }
        if 90.0 - lat.abs() < POLE_EPSILON_DEG {
            return Err(GeoError::NearPole(lat));
        }

        let (dlat, dlon) = degree_offsets(lat, buffer_m)?;

        Ok(Self {
            west: lon - dlon,
            south: lat - dlat,
            east: lon + dlon,
            north: lat + dlat,
            center_lat: lat,
            center_lon: lon,
            buffer_m,
        })
    }

    pub fn width_deg(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    /// 左上（北西）の角 `(lon, lat)`
    pub fn top_left(&self) -> (f64, f64) {
        (self.west, self.north)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_lon, self.center_lat)
    }

    /// 閉じたリング（反時計回り）`[[lon, lat], ...]`
    pub fn as_polygon(&self) -> Vec<[f64; 2]> {
        vec![
            [self.west, self.south],
            [self.east, self.south],
            [self.east, self.north],
            [self.west, self.north],
            [self.west, self.south],
        ]
    }
}

/// バッファを緯度・経度方向の度数に換算
fn degree_offsets(lat: f64, buffer_m: f64) -> Result<(f64, f64), GeoError> {
    let dlat = buffer_m / METERS_PER_DEGREE;

    let cos_lat = lat.to_radians().cos();
    if cos_lat.abs() < MIN_COS_LATITUDE {
        return Err(GeoError::NearPole(lat));
    }

    let dlon = dlat / cos_lat;
    if !dlon.is_finite() {
        return Err(GeoError::NearPole(lat));
    }
    if lat + dlat > 90.0 || lat - dlat < -90.0 || dlon > 180.0 {
        return Err(GeoError::BufferTooLarge { lat, buffer_m });
    }

    Ok((dlat, dlon))
}
