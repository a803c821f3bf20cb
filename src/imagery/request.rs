//! 画像リクエスト記述 - 提供元に依存しないサムネイル要求の組み立て

use chrono::{Days, NaiveDate};

use super::region::ImageRegion;

pub const DEFAULT_COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";
pub const DEFAULT_CLOUD_PROPERTY: &str = "CLOUDY_PIXEL_PERCENTAGE";
pub const DEFAULT_MAX_CLOUD_PERCENT: f64 = 20.0;
pub const DEFAULT_DIMENSION: u32 = 640;
pub const DEFAULT_DISPLAY_MIN: f64 = 0.0;
pub const DEFAULT_DISPLAY_MAX: f64 = 3000.0;
pub const GEOGRAPHIC_CRS: &str = "EPSG:4326";

/// リクエスト組み立て時のエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("date range start {start} is after end {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("cloud cover threshold must be within 0-100, got {0}")]
    InvalidCloudThreshold(f64),

    #[error("display range min ({min}) must be below max ({max})")]
    InvalidDisplayRange { min: f64, max: f64 },

    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("collection id must not be empty")]
    EmptyCollection,

    #[error("unknown reduction policy '{0}', expected 'median' or 'least_cloudy'")]
    UnknownPolicy(String),
}

/// 両端を含む日付範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RequestError> {
        if start > end {
            return Err(RequestError::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// `YYYY-MM-DD` 文字列から作成
    pub fn parse(start: &str, end: &str) -> Result<Self, RequestError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| RequestError::InvalidDate(s.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 提供元の半開区間に合わせた終端（終了日の翌日）
    pub fn end_exclusive(&self) -> NaiveDate {
        self.end.checked_add_days(Days::new(1)).unwrap_or(self.end)
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
        }
    }
}

/// シーンの集約方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionPolicy {
    /// 雲量が最も少ない1シーンを採用
    LeastCloudy,
    /// ピクセル単位の中央値合成
    #[default]
    Median,
}

impl std::str::FromStr for ReductionPolicy {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(Self::Median),
            "least_cloudy" | "least-cloudy" | "first" => Ok(Self::LeastCloudy),
            other => Err(RequestError::UnknownPolicy(other.to_string())),
        }
    }
}

/// ピクセル → 地理座標のアフィン変換
///
/// `lon = translate_x + col * scale_x + row * shear_x`
/// `lat = translate_y + col * shear_y + row * scale_y`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub scale_x: f64,
    pub shear_x: f64,
    pub translate_x: f64,
    pub shear_y: f64,
    pub scale_y: f64,
    pub translate_y: f64,
}

/// 出力画像のピクセルグリッド
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
    pub crs_code: String,
    pub transform: AffineTransform,
    buffer_m: f64,
}

impl PixelGrid {
    /// 矩形を `width` x `height` に割り付ける
    ///
    /// 範囲はバッファの2倍、行は上から下なので縦方向のスケールは負になる。
    pub fn for_region(region: &ImageRegion, width: u32, height: u32) -> Self {
        let (west, north) = region.top_left();
        Self {
            width,
            height,
            crs_code: GEOGRAPHIC_CRS.to_string(),
            transform: AffineTransform {
                scale_x: region.width_deg() / width as f64,
                shear_x: 0.0,
                translate_x: west,
                shear_y: 0.0,
                scale_y: -region.height_deg() / height as f64,
                translate_y: north,
            },
            buffer_m: region.buffer_m,
        }
    }

    /// 1ピクセルあたりの地上距離（メートル）`(x, y)`、yは負
    pub fn ground_scale(&self) -> (f64, f64) {
        let extent = 2.0 * self.buffer_m;
        (extent / self.width as f64, -extent / self.height as f64)
    }

    /// ピクセル位置 `(col, row)` を `(lon, lat)` に変換
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.transform;
        (
            t.translate_x + col * t.scale_x + row * t.shear_x,
            t.translate_y + col * t.shear_y + row * t.scale_y,
        )
    }
}

/// 表示用に生の値を8bitへ伸張する範囲
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

/// サムネイル要求の完全な記述
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryRequest {
    pub region: ImageRegion,
    pub collection: String,
    pub date_range: DateRange,
    pub cloud_property: String,
    pub max_cloud_percent: f64,
    pub reduction: ReductionPolicy,
    pub bands: [String; 3],
    pub display_range: DisplayRange,
    pub grid: PixelGrid,
}

impl ImageryRequest {
    pub fn builder(region: ImageRegion) -> ImageryRequestBuilder {
        ImageryRequestBuilder::new(region)
    }

    /// 画面表示用の取得元ラベル
    pub fn source_label(&self) -> String {
        match self.collection.as_str() {
            c if c.starts_with("COPERNICUS/S2") => "Sentinel-2 (Google Earth Engine)".to_string(),
            c if c.starts_with("LANDSAT/") => "Landsat (Google Earth Engine)".to_string(),
            c => format!("{} (Google Earth Engine)", c),
        }
    }
}

/// `ImageryRequest` のビルダー
#[derive(Debug, Clone)]
pub struct ImageryRequestBuilder {
    region: ImageRegion,
    collection: String,
    date_range: DateRange,
    cloud_property: String,
    max_cloud_percent: f64,
    reduction: ReductionPolicy,
    bands: [String; 3],
    display_range: DisplayRange,
    width: u32,
    height: u32,
}

impl ImageryRequestBuilder {
    fn new(region: ImageRegion) -> Self {
        Self {
            region,
            collection: DEFAULT_COLLECTION.to_string(),
            date_range: DateRange::default(),
            cloud_property: DEFAULT_CLOUD_PROPERTY.to_string(),
            max_cloud_percent: DEFAULT_MAX_CLOUD_PERCENT,
            reduction: ReductionPolicy::default(),
            bands: ["B4".to_string(), "B3".to_string(), "B2".to_string()],
            display_range: DisplayRange {
                min: DEFAULT_DISPLAY_MIN,
                max: DEFAULT_DISPLAY_MAX,
            },
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
        }
    }

    pub fn collection(mut self, id: impl Into<String>) -> Self {
        self.collection = id.into();
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    pub fn cloud_property(mut self, property: impl Into<String>) -> Self {
        self.cloud_property = property.into();
        self
    }

    pub fn max_cloud_percent(mut self, percent: f64) -> Self {
        self.max_cloud_percent = percent;
        self
    }

    pub fn reduction(mut self, policy: ReductionPolicy) -> Self {
        self.reduction = policy;
        self
    }

    /// 赤・緑・青に割り当てるバンド
    pub fn bands(mut self, red: &str, green: &str, blue: &str) -> Self {
        self.bands = [red.to_string(), green.to_string(), blue.to_string()];
        self
    }

    pub fn display_range(mut self, min: f64, max: f64) -> Self {
        self.display_range = DisplayRange { min, max };
        self
    }

    pub fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn build(self) -> Result<ImageryRequest, RequestError> {
        if self.collection.trim().is_empty() {
            return Err(RequestError::EmptyCollection);
        }
        if !(0.0..=100.0).contains(&self.max_cloud_percent) {
            return Err(RequestError::InvalidCloudThreshold(self.max_cloud_percent));
        }
        let DisplayRange { min, max } = self.display_range;
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(RequestError::InvalidDisplayRange { min, max });
        }
        if self.width == 0 || self.height == 0 {
            return Err(RequestError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }

        let grid = PixelGrid::for_region(&self.region, self.width, self.height);

        Ok(ImageryRequest {
            region: self.region,
            collection: self.collection,
            date_range: self.date_range,
            cloud_property: self.cloud_property,
            max_cloud_percent: self.max_cloud_percent,
            reduction: self.reduction,
            bands: self.bands,
            display_range: self.display_range,
            grid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagery::region::METERS_PER_DEGREE;

    const EPS: f64 = 1e-12;

    fn region(buffer: f64) -> ImageRegion {
        ImageRegion::around(-3.4653, -62.2159, buffer).unwrap()
    }

    #[test]
    fn test_ground_scale_is_twice_buffer_over_size() {
        let req = ImageryRequest::builder(region(1000.0))
            .dimensions(512, 512)
            .build()
            .unwrap();
        let (sx, sy) = req.grid.ground_scale();
        assert!((sx - 2000.0 / 512.0).abs() < EPS);
        assert!((sy - -2000.0 / 512.0).abs() < EPS);

        let req = ImageryRequest::builder(region(500.0))
            .dimensions(512, 256)
            .build()
            .unwrap();
        let (sx, sy) = req.grid.ground_scale();
        assert!((sx - 1000.0 / 512.0).abs() < EPS);
        assert!((sy - -1000.0 / 256.0).abs() < EPS);
    }

    #[test]
    fn test_transform_covers_region() {
        let r = region(500.0);
        let req = ImageryRequest::builder(r).dimensions(512, 512).build().unwrap();
        let t = req.grid.transform;

        assert_eq!((t.translate_x, t.translate_y), r.top_left());
        assert!(t.scale_y < 0.0);
        assert!((t.scale_x - r.width_deg() / 512.0).abs() < EPS);
        assert!((t.scale_y + r.height_deg() / 512.0).abs() < EPS);
        assert!((t.scale_y - req.grid.ground_scale().1 / METERS_PER_DEGREE).abs() < 1e-12);

        let (lon, lat) = req.grid.pixel_to_geo(512.0, 512.0);
        assert!((lon - r.east).abs() < 1e-9);
        assert!((lat - r.south).abs() < 1e-9);

        let (lon, lat) = req.grid.pixel_to_geo(256.0, 256.0);
        assert!((lon - r.center_lon).abs() < 1e-9);
        assert!((lat - r.center_lat).abs() < 1e-9);
    }

    #[test]
    fn test_defaults() {
        let req = ImageryRequest::builder(region(500.0)).build().unwrap();
        assert_eq!(req.collection, DEFAULT_COLLECTION);
        assert_eq!(req.bands, ["B4", "B3", "B2"].map(String::from));
        assert_eq!(req.reduction, ReductionPolicy::Median);
        assert_eq!(req.grid.width, 640);
        assert_eq!(req.grid.crs_code, "EPSG:4326");
        assert_eq!(req.display_range, DisplayRange { min: 0.0, max: 3000.0 });
        assert_eq!(req.date_range.start().to_string(), "2023-01-01");
        assert_eq!(req.date_range.end_exclusive().to_string(), "2025-01-01");
        assert_eq!(req.source_label(), "Sentinel-2 (Google Earth Engine)");
    }

    #[test]
    fn test_builder_rejects_invalid_parameters() {
        let r = region(500.0);
        assert_eq!(
            ImageryRequest::builder(r).dimensions(0, 10).build(),
            Err(RequestError::InvalidDimensions { width: 0, height: 10 })
        );
        assert_eq!(
            ImageryRequest::builder(r).max_cloud_percent(120.0).build(),
            Err(RequestError::InvalidCloudThreshold(120.0))
        );
        assert!(matches!(
            ImageryRequest::builder(r).display_range(10.0, 10.0).build(),
            Err(RequestError::InvalidDisplayRange { .. })
        ));
        assert_eq!(
            ImageryRequest::builder(r).collection(" ").build(),
            Err(RequestError::EmptyCollection)
        );
    }

    #[test]
    fn test_date_range() {
        assert!(DateRange::parse("2024-01-01", "2023-01-01").is_err());
        assert_eq!(
            DateRange::parse("2024-1-x", "2024-02-01"),
            Err(RequestError::InvalidDate("2024-1-x".to_string()))
        );
        let same_day = DateRange::parse("2024-02-28", "2024-02-28").unwrap();
        assert_eq!(same_day.end_exclusive().to_string(), "2024-02-29");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("median".parse::<ReductionPolicy>(), Ok(ReductionPolicy::Median));
        assert_eq!("Least_Cloudy".parse::<ReductionPolicy>(), Ok(ReductionPolicy::LeastCloudy));
        assert!("mosaic".parse::<ReductionPolicy>().is_err());
    }
}
