//! 候補地点の読み込み - ヘッダー付きCSVから `CandidatePoint` を作成

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 候補地点と環境共変量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePoint {
    pub longitude: f64,
    pub latitude: f64,
    pub temp_seasonality: f64,
    pub temp_annual_range: f64,
    pub precip_driest_quarter: f64,
    pub max_temp_warmest_month: f64,
    pub annual_precipitation: f64,
    pub precip_coldest_quarter: f64,
    pub isothermality: f64,
    pub elevation: f64,
    pub sand_frac_pct: f64,
    pub gravel_frac_pct: f64,
}

/// 読み込み結果
#[derive(Debug, Clone, Default, Serialize)]
pub struct CandidateSet {
    #[serde(rename = "candidates")]
    pub points: Vec<CandidatePoint>,
    /// 読み飛ばした不正な行の数
    pub skipped: usize,
}

/// CSVを解析（不正な行は読み飛ばす）
pub fn parse_candidates<R: Read>(reader: R) -> CandidateSet {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut set = CandidateSet::default();
    for (index, row) in csv_reader.deserialize::<CandidatePoint>().enumerate() {
        match row {
            Ok(point) if point.latitude.is_finite() && point.longitude.is_finite() => {
                set.points.push(point)
            }
            Ok(_) => {
                warn!(row = index + 1, "skipping candidate with non-finite coordinates");
                set.skipped += 1;
            }
            Err(e) => {
                warn!(row = index + 1, error = %e, "skipping malformed candidate row");
                set.skipped += 1;
            }
        }
    }
    set
}

/// ファイルから候補地点を読み込む
pub fn load_candidates(path: impl AsRef<Path>) -> std::io::Result<CandidateSet> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let set = parse_candidates(file);
    info!(
        path = %path.display(),
        loaded = set.points.len(),
        skipped = set.skipped,
        "loaded candidate points"
    );
    Ok(set)
}
