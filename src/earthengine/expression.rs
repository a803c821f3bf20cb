//! Earth Engine 式グラフ - `ImageryRequest` をREST APIの本文に変換

use serde::Serialize;
use serde_json::{Value, json};

use crate::imagery::{ImageryRequest, ReductionPolicy};

/// 取得する画像形式
pub const FILE_FORMAT: &str = "PNG";

fn constant(value: impl Serialize) -> Value {
    json!({ "constantValue": value })
}

fn invoke(function_name: &str, arguments: Value) -> Value {
    json!({
        "functionInvocationValue": {
            "functionName": function_name,
            "arguments": arguments,
        }
    })
}

fn filter_collection(collection: Value, filter: Value) -> Value {
    invoke(
        "Collection.filter",
        json!({ "collection": collection, "filter": filter }),
    )
}

/// 対象範囲のポリゴン
fn region_geometry(request: &ImageryRequest) -> Value {
    invoke(
        "GeometryConstructors.Polygon",
        json!({
            "coordinates": constant([request.region.as_polygon()]),
            "geodesic": constant(false),
        }),
    )
}

/// 画像を返す式を組み立てる
///
/// 読み込み → 範囲・期間・雲量で絞り込み → 集約 → バンド選択。
pub fn image_expression(request: &ImageryRequest) -> Value {
    let collection = invoke(
        "ImageCollection.load",
        json!({ "id": constant(&request.collection) }),
    );

    let collection = filter_collection(
        collection,
        invoke(
            "Filter.intersects",
            json!({
                "leftField": constant(".all"),
                "rightValue": region_geometry(request),
            }),
        ),
    );

    let start = request.date_range.start().format("%Y-%m-%d").to_string();
    let end = request.date_range.end_exclusive().format("%Y-%m-%d").to_string();
    let collection = filter_collection(
        collection,
        invoke(
            "Filter.dateRangeContains",
            json!({
                "leftValue": invoke(
                    "DateRange",
                    json!({ "start": constant(start), "end": constant(end) }),
                ),
                "rightField": constant("system:time_start"),
            }),
        ),
    );

    let collection = filter_collection(
        collection,
        invoke(
            "Filter.lessThan",
            json!({
                "leftField": constant(&request.cloud_property),
                "rightValue": constant(request.max_cloud_percent),
            }),
        ),
    );

    let image = match request.reduction {
        ReductionPolicy::Median => invoke("reduce.median", json!({ "collection": collection })),
        ReductionPolicy::LeastCloudy => invoke(
            "Collection.first",
            json!({
                "collection": invoke(
                    "Collection.limit",
                    json!({
                        "collection": collection,
                        "key": constant(&request.cloud_property),
                        "ascending": constant(true),
                    }),
                ),
            }),
        ),
    };

    let image = invoke(
        "Image.select",
        json!({
            "input": image,
            "bandSelectors": constant(&request.bands),
        }),
    );

    json!({
        "result": "0",
        "values": { "0": image },
    })
}

#[derive(Debug, Serialize)]
struct Dimensions {
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AffineTransformBody {
    scale_x: f64,
    shear_x: f64,
    translate_x: f64,
    shear_y: f64,
    scale_y: f64,
    translate_y: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GridBody {
    dimensions: Dimensions,
    affine_transform: AffineTransformBody,
    crs_code: String,
}

#[derive(Debug, Serialize)]
struct Range {
    min: f64,
    max: f64,
}

#[derive(Debug, Serialize)]
struct VisualizationOptions {
    ranges: Vec<Range>,
}

/// `image:computePixels` / `thumbnails` 共通の本文
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelsRequest {
    expression: Value,
    file_format: &'static str,
    grid: GridBody,
    visualization_options: VisualizationOptions,
}

impl PixelsRequest {
    pub fn new(request: &ImageryRequest) -> Self {
        let grid = &request.grid;
        let t = grid.transform;
        Self {
            expression: image_expression(request),
            file_format: FILE_FORMAT,
            grid: GridBody {
                dimensions: Dimensions {
                    width: grid.width,
                    height: grid.height,
                },
                affine_transform: AffineTransformBody {
                    scale_x: t.scale_x,
                    shear_x: t.shear_x,
                    translate_x: t.translate_x,
                    shear_y: t.shear_y,
                    scale_y: t.scale_y,
                    translate_y: t.translate_y,
                },
                crs_code: grid.crs_code.clone(),
            },
            visualization_options: VisualizationOptions {
                ranges: vec![Range {
                    min: request.display_range.min,
                    max: request.display_range.max,
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imagery::ImageRegion;

    fn request(policy: ReductionPolicy) -> ImageryRequest {
        let region = ImageRegion::around(-3.4653, -62.2159, 500.0).unwrap();
        ImageryRequest::builder(region)
            .reduction(policy)
            .dimensions(512, 512)
            .build()
            .unwrap()
    }

    fn function_name(value: &Value) -> &str {
        value["functionInvocationValue"]["functionName"]
            .as_str()
            .unwrap()
    }

    fn arguments(value: &Value) -> &Value {
        &value["functionInvocationValue"]["arguments"]
    }

    #[test]
    fn test_median_expression_chain() {
        let expr = image_expression(&request(ReductionPolicy::Median));
        assert_eq!(expr["result"], "0");

        let select = &expr["values"]["0"];
        assert_eq!(function_name(select), "Image.select");
        assert_eq!(
            arguments(select)["bandSelectors"]["constantValue"],
            json!(["B4", "B3", "B2"])
        );

        let median = &arguments(select)["input"];
        assert_eq!(function_name(median), "reduce.median");

        let cloud = &arguments(median)["collection"];
        let cloud_filter = &arguments(cloud)["filter"];
        assert_eq!(function_name(cloud_filter), "Filter.lessThan");
        assert_eq!(
            arguments(cloud_filter)["leftField"]["constantValue"],
            "CLOUDY_PIXEL_PERCENTAGE"
        );
        assert_eq!(arguments(cloud_filter)["rightValue"]["constantValue"], 20.0);

        let dates = &arguments(cloud)["collection"];
        let date_filter = &arguments(dates)["filter"];
        assert_eq!(function_name(date_filter), "Filter.dateRangeContains");
        let range = arguments(&arguments(date_filter)["leftValue"]).clone();
        assert_eq!(range["start"]["constantValue"], "2023-01-01");
        assert_eq!(range["end"]["constantValue"], "2025-01-01");

        let bounds = &arguments(dates)["collection"];
        assert_eq!(
            function_name(&arguments(bounds)["filter"]),
            "Filter.intersects"
        );
        let load = &arguments(bounds)["collection"];
        assert_eq!(function_name(load), "ImageCollection.load");
        assert_eq!(
            arguments(load)["id"]["constantValue"],
            "COPERNICUS/S2_SR_HARMONIZED"
        );
    }

    #[test]
    fn test_least_cloudy_expression_sorts_ascending() {
        let expr = image_expression(&request(ReductionPolicy::LeastCloudy));
        let first = &arguments(&expr["values"]["0"])["input"];
        assert_eq!(function_name(first), "Collection.first");

        let limit = &arguments(first)["collection"];
        assert_eq!(function_name(limit), "Collection.limit");
        assert_eq!(
            arguments(limit)["key"]["constantValue"],
            "CLOUDY_PIXEL_PERCENTAGE"
        );
        assert_eq!(arguments(limit)["ascending"]["constantValue"], true);
    }

    #[test]
    fn test_pixels_request_body() {
        let req = request(ReductionPolicy::Median);
        let body = serde_json::to_value(PixelsRequest::new(&req)).unwrap();

        assert_eq!(body["fileFormat"], "PNG");
        assert_eq!(body["grid"]["dimensions"], json!({ "width": 512, "height": 512 }));
        assert_eq!(body["grid"]["crsCode"], "EPSG:4326");
        assert_eq!(
            body["visualizationOptions"]["ranges"],
            json!([{ "min": 0.0, "max": 3000.0 }])
        );

        let affine = &body["grid"]["affineTransform"];
        assert_eq!(affine["translateX"], json!(req.region.west));
        assert_eq!(affine["translateY"], json!(req.region.north));
        assert!(affine["scaleY"].as_f64().unwrap() < 0.0);
        assert_eq!(affine["shearX"], json!(0.0));
    }
}
